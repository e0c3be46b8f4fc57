use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::{error::FlowError, frame::VideoFrame, queue::TaskQueue};

/// Draw callback invoked with the frame to paint.
///
/// Borrows the frame for the duration of the call; the controller owns
/// the frame and releases it when the call settles, on success and on
/// failure alike. Never invoked concurrently with itself.
pub type DrawFn =
    Arc<dyn for<'a> Fn(&'a VideoFrame) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync>;

struct RedrawState {
    last_frame: Option<VideoFrame>,
    pending: Option<CancellationToken>,
}

/// Coalesces draw and redraw requests into at most one in-flight
/// operation plus at most one pending redraw.
///
/// Requests are serialized on a [`TaskQueue`] with `bail = true`
/// throughout, so one failing draw callback poisons the controller:
/// every later `draw`/`redraw` resolves with the original failure
/// without invoking the callback, until the controller is disposed and
/// recreated. Fail-stop by design, protecting a possibly-corrupted
/// render surface.
pub struct RedrawController {
    queue: TaskQueue,
    state: Arc<Mutex<RedrawState>>,
    callback: DrawFn,
}

impl RedrawController {
    pub fn new<F>(callback: F) -> Self
    where
        F: for<'a> Fn(&'a VideoFrame) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            queue: TaskQueue::new(),
            state: Arc::new(Mutex::new(RedrawState {
                last_frame: None,
                pending: None,
            })),
            callback: Arc::new(callback),
        }
    }

    /// Paints `frame`, taking ownership of it.
    ///
    /// Preempts any pending redraw (its callback body will never run)
    /// and retains an independent clone of the frame for later
    /// [`redraw`](Self::redraw) calls, releasing the previously
    /// retained one.
    pub async fn draw(&self, frame: VideoFrame) -> Result<(), FlowError> {
        if self.queue.is_disposed() {
            return Err(FlowError::Disposed);
        }

        {
            let mut state = self.state.lock().unwrap();
            if let Some(token) = state.pending.take() {
                token.cancel();
            }
            state.last_frame = Some(frame.clone());
        }

        let callback = Arc::clone(&self.callback);
        self.queue
            .enqueue(move || async move { callback(&frame).await }, true)
            .await
    }

    /// Repaints the most recently drawn frame.
    ///
    /// Immediate no-op when nothing has been drawn yet or a redraw is
    /// already pending, so at most one redraw ever waits in the queue.
    pub async fn redraw(&self) -> Result<(), FlowError> {
        if self.queue.is_disposed() {
            return Err(FlowError::Disposed);
        }

        let token = {
            let mut state = self.state.lock().unwrap();
            if state.last_frame.is_none() || state.pending.is_some() {
                return Ok(());
            }
            let token = CancellationToken::new();
            state.pending = Some(token.clone());
            token
        };

        let callback = Arc::clone(&self.callback);
        let state = Arc::clone(&self.state);
        let task_token = token.clone();
        let result = self
            .queue
            .enqueue(
                move || async move {
                    // Cancellation is checked when the task runs, not
                    // when it was submitted.
                    if task_token.is_cancelled() {
                        return Ok(());
                    }
                    let frame = {
                        let mut state = state.lock().unwrap();
                        state.pending = None;
                        match &state.last_frame {
                            Some(frame) => frame.clone(),
                            None => return Ok(()),
                        }
                    };
                    callback(&frame).await
                },
                true,
            )
            .await;

        // A token that was never cancelled and whose request failed
        // means the body never cleared the pending marker (poisoned or
        // disposed queue skipped it). Drop the marker so the failure
        // stays visible on every later redraw instead of turning them
        // into silent no-ops.
        if result.is_err() && !token.is_cancelled() {
            self.state.lock().unwrap().pending = None;
        }
        result
    }

    /// Cancels any pending redraw, releases the retained frame and
    /// disposes the underlying queue.
    pub fn dispose(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(token) = state.pending.take() {
                token.cancel();
            }
            state.last_frame = None;
        }
        self.queue.dispose();
    }
}

#[cfg(test)]
#[path = "redraw_test.rs"]
mod redraw_test;
