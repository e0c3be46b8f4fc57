use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::error::FlowError;

/// Outcome of one chain link, observed by the next submission.
#[derive(Clone)]
enum Settlement {
    Healthy,
    Poisoned(FlowError),
}

struct Chain {
    disposed: bool,
    tail: Option<oneshot::Receiver<Settlement>>,
}

/// Serial task executor.
///
/// Tasks run one at a time, in submission order, each chained onto the
/// settlement of the previous one. A task submitted with `bail = true`
/// that fails poisons the chain: every later submission is skipped
/// without being invoked and resolves with the stored failure, until a
/// `bail = false` submission swallows the poison and the chain settles
/// healthy again. [`dispose`](TaskQueue::dispose) is terminal; tasks
/// not yet running fail with [`FlowError::Disposed`] instead.
pub struct TaskQueue {
    chain: Arc<Mutex<Chain>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            chain: Arc::new(Mutex::new(Chain {
                disposed: false,
                tail: None,
            })),
        }
    }

    /// Runs `task` after every previously submitted task has settled
    /// and returns its result.
    ///
    /// With `bail = true` a failure leaves the chain poisoned for later
    /// submissions; with `bail = false` the failure still reaches this
    /// caller but the chain settles healthy. A task skipped because of
    /// an earlier poison is never invoked: its caller receives the
    /// original poisoning failure, and the link re-poisons or swallows
    /// according to its own `bail` flag.
    pub async fn enqueue<T, F, Fut>(&self, task: F, bail: bool) -> Result<T, FlowError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let (settle_tx, settle_rx) = oneshot::channel();
        let prev = {
            let mut chain = self.chain.lock().unwrap();
            if chain.disposed {
                return Err(FlowError::Disposed);
            }
            chain.tail.replace(settle_rx)
        };

        // Wait for the predecessor. A dropped link (its submitter went
        // away before settling) counts as healthy.
        let prior = match prev {
            Some(rx) => rx.await.unwrap_or(Settlement::Healthy),
            None => Settlement::Healthy,
        };

        // Disposal wins over everything else at execution time.
        if self.chain.lock().unwrap().disposed {
            let _ = settle_tx.send(Settlement::Healthy);
            return Err(FlowError::Disposed);
        }

        if let Settlement::Poisoned(err) = prior {
            // Skip without invoking the task body; re-surface the
            // original failure to this caller.
            let settlement = if bail {
                Settlement::Poisoned(err.clone())
            } else {
                Settlement::Healthy
            };
            let _ = settle_tx.send(settlement);
            return Err(err);
        }

        match task().await {
            Ok(value) => {
                let _ = settle_tx.send(Settlement::Healthy);
                Ok(value)
            }
            Err(err) => {
                let err = FlowError::task(err);
                let settlement = if bail {
                    Settlement::Poisoned(err.clone())
                } else {
                    Settlement::Healthy
                };
                let _ = settle_tx.send(settlement);
                Err(err)
            }
        }
    }

    /// Marks the queue terminal. A task that is already executing is
    /// not cancelled; everything not yet running fails with
    /// [`FlowError::Disposed`] without being invoked.
    pub fn dispose(&self) {
        let mut chain = self.chain.lock().unwrap();
        if !chain.disposed {
            chain.disposed = true;
            log::debug!("TaskQueue disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.chain.lock().unwrap().disposed
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod queue_test;
