use std::fmt::{Display, Formatter};
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use bytes::Bytes;

/// Pixel layout of a decoded frame buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba,
    Bgra,
    Yuv420p,
}

/// Allocation ledger for decoded frame buffers.
///
/// Every live [`VideoFrame`] holds a lease on the pool that created it;
/// the lease is returned on drop. `live()` therefore counts frames that
/// have been handed out but not yet released, which is the invariant
/// the whole pipeline is built around: exactly one release per handle,
/// no handle outliving its release.
#[derive(Debug, Default)]
pub struct FramePool {
    live: AtomicUsize,
    allocated: AtomicU64,
}

impl FramePool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wraps a decoded buffer in a pooled frame handle.
    pub fn alloc(
        self: &Arc<Self>,
        data: impl Into<Bytes>,
        width: u32,
        height: u32,
        format: PixelFormat,
        pts: i64,
    ) -> VideoFrame {
        VideoFrame {
            data: data.into(),
            width,
            height,
            format,
            pts,
            lease: FrameLease::take(self),
        }
    }

    /// Frames handed out and not yet released, clones included.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Total handles ever created, clones included.
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::SeqCst)
    }
}

/// A decoded video frame.
///
/// Single-owner handle: ownership moves at every transfer point
/// (producer → slot → draw loop → consumer) and the pool lease is
/// returned exactly once, on drop. `clone` produces an independent,
/// separately-owned handle; the payload is shared refcounted through
/// [`Bytes`], the lease is not.
#[derive(Debug)]
pub struct VideoFrame {
    data: Bytes,
    width: u32,
    height: u32,
    format: PixelFormat,
    pts: i64,
    lease: FrameLease,
}

impl VideoFrame {
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pts(&self) -> i64 {
        self.pts
    }
}

impl Clone for VideoFrame {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            width: self.width,
            height: self.height,
            format: self.format,
            pts: self.pts,
            lease: self.lease.renew(),
        }
    }
}

impl Display for VideoFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "VideoFrame {{ {}x{} {:?} pts: {} data: {} }}",
            self.width,
            self.height,
            self.format,
            self.pts,
            self.data.len()
        )
    }
}

#[derive(Debug)]
struct FrameLease {
    pool: Arc<FramePool>,
}

impl FrameLease {
    fn take(pool: &Arc<FramePool>) -> Self {
        pool.live.fetch_add(1, Ordering::SeqCst);
        pool.allocated.fetch_add(1, Ordering::SeqCst);
        Self {
            pool: Arc::clone(pool),
        }
    }

    fn renew(&self) -> Self {
        Self::take(&self.pool)
    }
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        self.pool.live.fetch_sub(1, Ordering::SeqCst);
    }
}
