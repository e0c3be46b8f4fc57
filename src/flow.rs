use std::{
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{error::FlowError, frame::VideoFrame, stats::RenderStats};

/// Builds a [`RenderFlow`] / [`FrameOutput`] pair.
pub struct RenderFlowBuilder {
    stats: Option<Arc<RenderStats>>,
    capacity: usize,
}

impl RenderFlowBuilder {
    /// Share an externally owned stats counter instead of creating one.
    pub fn stats(mut self, stats: Arc<RenderStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Capacity of the output handoff channel. Defaults to 1: one
    /// frame in flight toward the consumer, everything else coalesces
    /// in the slot.
    pub fn output_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> (RenderFlow, FrameOutput) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let flow = RenderFlow {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    capture_frame: None,
                    next_frame: None,
                    loop_active: false,
                    draw_task: None,
                    out_tx: Some(tx),
                    closed: false,
                    shut_down: false,
                }),
                stats: self.stats.unwrap_or_default(),
                cancel: CancellationToken::new(),
            }),
        };
        (flow, FrameOutput { rx })
    }
}

impl Default for RenderFlowBuilder {
    fn default() -> Self {
        Self {
            stats: None,
            capacity: 1,
        }
    }
}

struct State {
    /// Clone of the most recently accepted frame, for inspection only.
    capture_frame: Option<VideoFrame>,
    /// Coalescing slot: the single frame awaiting the draw loop.
    next_frame: Option<VideoFrame>,
    /// True while a draw loop owns the slot. Cleared by the loop under
    /// this same mutex, so `write` cannot race a dying loop.
    loop_active: bool,
    draw_task: Option<JoinHandle<()>>,
    out_tx: Option<mpsc::Sender<Result<VideoFrame, FlowError>>>,
    /// Input side no longer accepts frames. Set by shutdown and by
    /// consumer-initiated termination alike.
    closed: bool,
    /// A close, abort or dispose already ran. Distinct from `closed`:
    /// a consumer going away refuses further input but must not rob
    /// the first shutdown of its drain and stats disposal.
    shut_down: bool,
}

struct Shared {
    state: Mutex<State>,
    stats: Arc<RenderStats>,
    cancel: CancellationToken,
}

/// Decode-to-render coalescing transform.
///
/// The producer side accepts frames at whatever rate they arrive and
/// never waits for the consumer; when the consumer lags, only the most
/// recent unconsumed frame is kept and everything it superseded is
/// released and counted as skipped. A self-scheduled draw loop drains
/// the slot toward the [`FrameOutput`] end.
pub struct RenderFlow {
    shared: Arc<Shared>,
}

impl RenderFlow {
    pub fn builder() -> RenderFlowBuilder {
        RenderFlowBuilder::default()
    }

    /// Accepts a frame from the producer, taking ownership of it.
    ///
    /// Never blocks. When the slot still holds an unconsumed frame,
    /// that frame is released and the skip counter increments. Fails
    /// with [`FlowError::Disposed`] once the flow is closed, aborted,
    /// disposed, or the consumer has terminated; a rejected frame is
    /// released here.
    pub fn write(&self, frame: VideoFrame) -> Result<(), FlowError> {
        let mut state = self.shared.state.lock().unwrap();
        if state.closed {
            return Err(FlowError::Disposed);
        }

        // Consumer-initiated termination propagates back here: stop
        // accepting instead of coalescing frames nobody will take.
        let consumer_gone = match &state.out_tx {
            Some(tx) => tx.is_closed(),
            None => true,
        };
        if consumer_gone {
            state.closed = true;
            log::debug!("RenderFlow: consumer terminated, rejecting input");
            return Err(FlowError::Disposed);
        }

        state.capture_frame = Some(frame.clone());

        // `replace` drops the previous occupant, releasing it.
        if state.next_frame.replace(frame).is_some() {
            self.shared.stats.increase_frames_skipped();
        }

        if !state.loop_active {
            state.loop_active = true;
            let shared = Arc::clone(&self.shared);
            state.draw_task = Some(tokio::spawn(draw_loop(shared)));
        }
        Ok(())
    }

    /// Clone of the most recently accepted frame, kept for snapshots
    /// and inspection. Survives graceful close; cleared by
    /// [`dispose`](Self::dispose).
    pub fn capture(&self) -> Option<VideoFrame> {
        self.shared.state.lock().unwrap().capture_frame.clone()
    }

    pub fn stats(&self) -> Arc<RenderStats> {
        Arc::clone(&self.shared.stats)
    }

    /// Graceful shutdown of the producer side.
    ///
    /// Waits for the in-flight draw loop to drain the slot (`write`
    /// never waited, so shutdown must, or slot contents would vanish
    /// silently), then ends the output side, then disposes the stats
    /// counter. The capture frame stays available.
    pub async fn close(&self) -> Result<(), FlowError> {
        self.shutdown(None).await
    }

    /// As [`close`](Self::close), but the output side ends with `err`
    /// after the remaining slot contents have been delivered.
    pub async fn abort(&self, err: anyhow::Error) -> Result<(), FlowError> {
        self.shutdown(Some(FlowError::task(err))).await
    }

    async fn shutdown(&self, err: Option<FlowError>) -> Result<(), FlowError> {
        let task = {
            let mut state = self.shared.state.lock().unwrap();
            if state.shut_down {
                return Err(FlowError::Disposed);
            }
            state.shut_down = true;
            state.closed = true;
            state.draw_task.take()
        };

        if let Some(task) = task {
            let _ = task.await;
        }

        let tx = self.shared.state.lock().unwrap().out_tx.take();
        if let Some(tx) = tx {
            if let Some(err) = err {
                log::warn!("RenderFlow: aborted: {err}");
                let _ = tx.send(Err(err)).await;
            }
            // Dropping the sender ends the output stream.
        }

        self.shared.stats.dispose();
        log::debug!("RenderFlow: closed");
        Ok(())
    }

    /// Emergency teardown, distinct from [`close`](Self::close): not a
    /// drain.
    ///
    /// Synchronously releases the capture frame and any slot contents,
    /// disposes the stats counter, force-closes the output side and
    /// errors the producer side, all without waiting for an in-flight
    /// draw loop; the loop is cancelled and releases whatever frame it
    /// was delivering.
    pub fn dispose(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.closed = true;
            state.shut_down = true;
            state.capture_frame = None;
            state.next_frame = None;
            state.out_tx = None;
            // Detached, not awaited.
            state.draw_task = None;
        }
        self.shared.cancel.cancel();
        self.shared.stats.dispose();
        log::debug!("RenderFlow: disposed");
    }
}

/// Drains the coalescing slot toward the consumer. At most one instance
/// runs per flow; it exits only when the slot is empty at the moment of
/// a check, clearing `loop_active` under the same lock `write` uses to
/// start it.
async fn draw_loop(shared: Arc<Shared>) {
    loop {
        let (frame, tx) = {
            let mut state = shared.state.lock().unwrap();
            match state.next_frame.take() {
                Some(frame) => (frame, state.out_tx.clone()),
                None => {
                    state.loop_active = false;
                    return;
                }
            }
        };

        let Some(tx) = tx else {
            // Output force-closed mid-drain; release and keep draining.
            drop(frame);
            continue;
        };

        tokio::select! {
            sent = tx.send(Ok(frame)) => match sent {
                Ok(()) => shared.stats.increase_frames_rendered(),
                Err(mpsc::error::SendError(rejected)) => {
                    // Consumer terminated before taking ownership: the
                    // frame comes back and is released here, and the
                    // loop keeps draining so nothing already queued
                    // leaks.
                    drop(rejected);
                }
            },
            _ = shared.cancel.cancelled() => {
                // Hard dispose. The send future owns the in-flight
                // frame; dropping it releases the frame.
                return;
            }
        }
    }
}

/// Consumer end of a render flow.
///
/// Yields `Ok(frame)` per delivered frame, ends after graceful close,
/// and yields the terminal `Err` once after an abort.
pub struct FrameOutput {
    rx: mpsc::Receiver<Result<VideoFrame, FlowError>>,
}

impl FrameOutput {
    /// Next frame, or `None` once the flow has shut down.
    pub async fn recv(&mut self) -> Option<Result<VideoFrame, FlowError>> {
        self.rx.recv().await
    }

    /// Consumer-initiated termination. Frames already handed over stay
    /// readable; everything after propagates back to the producer side
    /// as rejection.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl Stream for FrameOutput {
    type Item = Result<VideoFrame, FlowError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

#[cfg(test)]
#[path = "flow_test.rs"]
mod flow_test;
