use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by the scheduling primitives.
///
/// Cloneable on purpose: a queue poisoned by one failing task re-surfaces
/// the stored failure to every later submission without re-running
/// anything, so the same root error reaches multiple callers.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// The queue or flow was disposed before the operation could run.
    #[error("queue disposed")]
    Disposed,
    /// A task or draw callback failed.
    #[error("task failed: {0}")]
    Task(Arc<anyhow::Error>),
}

impl FlowError {
    pub(crate) fn task(err: anyhow::Error) -> Self {
        FlowError::Task(Arc::new(err))
    }

    /// True when both errors carry the same root failure. Poison
    /// propagation clones the enum but shares the original error, so
    /// callers skipped by the same poisoning task compare equal here.
    pub fn same_failure(&self, other: &FlowError) -> bool {
        match (self, other) {
            (FlowError::Disposed, FlowError::Disposed) => true,
            (FlowError::Task(a), FlowError::Task(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
