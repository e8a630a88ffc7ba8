//! Render-stage boundary: an opaque frame sink drained on its own thread.
//!
//! The pipeline core knows nothing about decoding or drawing; it hands
//! completed frames to a [`RenderSink`] through a dispatcher thread that
//! drains the [`FrameQueue`] independently of the reader. A slow or failing
//! sink can therefore never block the transport reader; at worst the queue
//! drops its oldest frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::frame_queue::FrameQueue;
use crate::reassembler::Frame;

/// How long the dispatcher waits on an empty queue before rechecking for
/// shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Consumer of completed frames. Decode and draw behavior live entirely
/// behind this boundary.
pub trait RenderSink: Send + 'static {
    /// Accept one frame. Errors are logged by the dispatcher and never
    /// reach the reader thread.
    ///
    /// # Errors
    ///
    /// Whatever the sink considers a failed submission.
    fn submit(&mut self, frame: Frame) -> anyhow::Result<()>;
}

impl<F> RenderSink for F
where
    F: FnMut(Frame) -> anyhow::Result<()> + Send + 'static,
{
    fn submit(&mut self, frame: Frame) -> anyhow::Result<()> {
        self(frame)
    }
}

/// Drains a frame queue into a [`RenderSink`] on a dedicated thread.
pub struct RenderDispatcher {
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl RenderDispatcher {
    /// Launch the dispatcher thread over `queue`, submitting each frame to
    /// `sink` in arrival order.
    pub fn spawn<S: RenderSink>(queue: Arc<FrameQueue>, mut sink: S) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop_flag);

        let thread = std::thread::spawn(move || {
            log::debug!("render dispatcher started");
            let mut submitted = 0u64;
            while !flag.load(Ordering::Acquire) {
                let Some(frame) = queue.poll_timeout(POLL_INTERVAL) else {
                    continue;
                };
                submitted += 1;
                if let Err(e) = sink.submit(frame) {
                    log::warn!("render sink rejected frame: {:#}", e);
                }
                if submitted % 30 == 0 {
                    log::debug!("dispatched {} frames", submitted);
                }
            }
            log::debug!("render dispatcher stopped after {} frames", submitted);
        });

        Self {
            stop_flag,
            thread: Some(thread),
        }
    }

    /// Stop the dispatcher and join its thread. Frames still queued are
    /// left for the caller.
    pub fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("render dispatcher thread panicked");
            }
        }
    }
}

impl Drop for RenderDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
