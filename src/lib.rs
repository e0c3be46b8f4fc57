//! Frame flow-control and coalescing scheduler.
//!
//! Absorbs a bursty frame producer (a decoder) and drives a slower,
//! possibly-async consumer (a renderer or draw callback) without
//! unbounded queuing:
//!
//! ```text
//! decoder ──► RenderFlow (coalescing slot + draw loop) ──► consumer
//!                                                            │
//!                               RedrawController ◄───────────┘
//!                                (TaskQueue, bail/poison)
//! ```
//!
//! - [`queue::TaskQueue`] runs submitted work one unit at a time, in
//!   submission order, with per-task bail/poison semantics.
//! - [`redraw::RedrawController`] coalesces draw/redraw requests into
//!   at most one in-flight operation plus one pending redraw.
//! - [`flow::RenderFlow`] is the decode-to-render transform: it accepts
//!   frames at producer rate, keeps only the newest unconsumed one and
//!   drains it to the consumer through a self-scheduled draw loop,
//!   counting every coalesced frame as skipped.
//!
//! Frames are single-owner handles ([`frame::VideoFrame`]) whose
//! release is `Drop`; a [`frame::FramePool`] keeps the live-handle
//! ledger so leaks and double releases are observable.

pub mod error;
pub mod flow;
pub mod frame;
pub mod queue;
pub mod redraw;
pub mod stats;

pub use error::FlowError;
pub use flow::{FrameOutput, RenderFlow, RenderFlowBuilder};
pub use frame::{FramePool, PixelFormat, VideoFrame};
pub use queue::TaskQueue;
pub use redraw::{DrawFn, RedrawController};
pub use stats::RenderStats;
