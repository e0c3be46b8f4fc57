use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Frame accounting for one render pipeline.
///
/// Owned by the flow that created it and disposed exactly once, on the
/// first of graceful close, abort or hard dispose. Counts stay readable
/// after disposal.
#[derive(Debug, Default)]
pub struct RenderStats {
    rendered: AtomicU64,
    displayed: AtomicU64,
    skipped: AtomicU64,
    disposed: AtomicBool,
}

impl RenderStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame handed to the consumer.
    pub fn increase_frames_rendered(&self) {
        self.rendered.fetch_add(1, Ordering::Relaxed);
    }

    /// Frame actually painted by the downstream surface.
    pub fn increase_frames_displayed(&self) {
        self.displayed.fetch_add(1, Ordering::Relaxed);
    }

    /// Frame coalesced away before the draw loop took it.
    pub fn increase_frames_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_rendered(&self) -> u64 {
        self.rendered.load(Ordering::Relaxed)
    }

    pub fn frames_displayed(&self) -> u64 {
        self.displayed.load(Ordering::Relaxed)
    }

    pub fn frames_skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Stops the counter. Only the first call takes effect.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            log::debug!(
                "RenderStats disposed: rendered={} displayed={} skipped={}",
                self.frames_rendered(),
                self.frames_displayed(),
                self.frames_skipped()
            );
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
