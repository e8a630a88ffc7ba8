//! Camera session lifecycle and the transport reader loop.
//!
//! A [`CameraSession`] owns one transport, one frame queue and at most one
//! reader thread. The lifecycle is `Idle -> Initialized -> Streaming ->
//! Initialized` (stop) with a terminal `Released` state:
//!
//! ```text
//! initialize()   open device, find streaming endpoint, claim interface
//! start()        reset buffer and queue, launch the reader thread
//! stop()         signal the reader, join it (bounded by one read timeout)
//! release()      stop, release the interface, close the device; terminal
//! ```
//!
//! The reader thread pulls raw chunks with a blocking timed read and feeds
//! them straight into the reassembler on the same thread; completed frames
//! go into the shared [`FrameQueue`]. Errors inside the thread never cross
//! the thread boundary: a hard transport failure ends the loop and is
//! reported through the session event channel so the caller can tell an
//! unexpected end from a requested stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;

use crate::capture::ChunkCapture;
use crate::frame_queue::{self, FrameQueue};
use crate::reassembler::FrameReassembler;
use crate::transport::{StreamEndpoint, Transport, TransportError};

/// Errors returned by session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The operation requires an initialized session.
    #[error("session is not initialized")]
    NotInitialized,

    /// `initialize` was called on an already-initialized session.
    #[error("session is already initialized")]
    AlreadyInitialized,

    /// The session was released; no further operations are valid.
    #[error("session has been released")]
    Released,

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No device opened yet.
    Idle,
    /// Device opened and interface claimed, not streaming.
    Initialized,
    /// Reader thread launched.
    Streaming,
    /// Terminal: interface released and device closed.
    Released,
}

/// Why streaming ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The caller asked for the stop.
    Requested,
    /// A hard transport failure ended the reader loop.
    TransportError,
}

/// Notifications observable by the session owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Streaming ended, either on request or unexpectedly.
    Ended(EndReason),
}

/// Tunables for a streaming session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Timeout for each blocking transport read.
    pub read_timeout: Duration,
    /// Size of the scratch buffer handed to each read.
    pub read_buffer_size: usize,
    /// Capacity of the frame queue.
    pub queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(1000),
            read_buffer_size: 1024 * 1024,
            queue_capacity: frame_queue::DEFAULT_CAPACITY,
        }
    }
}

/// One camera streaming session: transport, queue, reader thread.
///
/// Sessions share nothing with each other; each owns an independent
/// buffer, queue and thread.
pub struct CameraSession<T: Transport + 'static> {
    transport: Arc<Mutex<T>>,
    config: SessionConfig,
    state: SessionState,
    endpoint: Option<StreamEndpoint>,
    queue: Arc<FrameQueue>,
    stop_flag: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    events_tx: Sender<SessionEvent>,
    events_rx: Option<Receiver<SessionEvent>>,
    capture: Option<Arc<ChunkCapture>>,
}

impl<T: Transport + 'static> CameraSession<T> {
    /// Create a session over `transport` with default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    /// Create a session with explicit configuration.
    pub fn with_config(transport: T, config: SessionConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        let queue = Arc::new(FrameQueue::with_capacity(config.queue_capacity));
        Self {
            transport: Arc::new(Mutex::new(transport)),
            config,
            state: SessionState::Idle,
            endpoint: None,
            queue,
            stop_flag: Arc::new(AtomicBool::new(false)),
            reader: None,
            events_tx,
            events_rx: Some(events_rx),
            capture: None,
        }
    }

    fn lock_transport(&self) -> MutexGuard<'_, T> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the device, locate the streaming endpoint and claim its
    /// interface.
    ///
    /// On failure the transport is closed and the session stays `Idle`, so
    /// the caller may retry.
    ///
    /// # Errors
    ///
    /// [`SessionError::Transport`] for open, endpoint-discovery or claim
    /// failures; [`SessionError::AlreadyInitialized`] /
    /// [`SessionError::Released`] for invalid states.
    pub fn initialize(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Released => return Err(SessionError::Released),
            SessionState::Initialized | SessionState::Streaming => {
                return Err(SessionError::AlreadyInitialized)
            }
            SessionState::Idle => {}
        }

        let mut transport = self.lock_transport();
        let endpoint = match transport.open() {
            Ok(endpoint) => endpoint,
            Err(e) => {
                log::error!("failed to open transport: {}", e);
                transport.close();
                return Err(e.into());
            }
        };
        log::info!(
            "streaming endpoint 0x{:02x} ({:?}) on interface {}, maxPacket={}",
            endpoint.address,
            endpoint.transfer_kind,
            endpoint.interface_number,
            endpoint.max_packet_size
        );

        if let Err(e) = transport.claim_interface(endpoint.interface_number) {
            log::error!(
                "failed to claim interface {}: {}",
                endpoint.interface_number,
                e
            );
            transport.close();
            return Err(e.into());
        }
        drop(transport);

        self.endpoint = Some(endpoint);
        self.state = SessionState::Initialized;
        log::info!("camera session initialized");
        Ok(())
    }

    /// Launch the reader thread.
    ///
    /// Idempotent while streaming: a second `start` without an intervening
    /// `stop` is a no-op and never spawns a second reader. A reader that
    /// already exited on its own (transport failure) is joined and
    /// replaced. Resets the reassembly state and clears the queue.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotInitialized`] from `Idle`,
    /// [`SessionError::Released`] after release.
    pub fn start(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Released => return Err(SessionError::Released),
            SessionState::Idle => return Err(SessionError::NotInitialized),
            SessionState::Streaming => {
                if self.reader.as_ref().is_some_and(|h| !h.is_finished()) {
                    log::debug!("start requested while already streaming");
                    return Ok(());
                }
                // The reader died on its own; clean up and relaunch.
                self.join_reader();
            }
            SessionState::Initialized => {}
        }

        let endpoint = self
            .endpoint
            .clone()
            .ok_or(SessionError::NotInitialized)?;

        self.queue.clear();
        self.stop_flag.store(false, Ordering::Release);

        let transport = Arc::clone(&self.transport);
        let queue = Arc::clone(&self.queue);
        let stop_flag = Arc::clone(&self.stop_flag);
        let events = self.events_tx.clone();
        let capture = self.capture.clone();
        let config = self.config.clone();

        self.reader = Some(std::thread::spawn(move || {
            reader_loop(transport, &endpoint, &queue, &stop_flag, &events, capture, &config);
        }));
        self.state = SessionState::Streaming;
        log::info!("streaming started");
        Ok(())
    }

    /// Signal the reader to halt and join it. Idempotent; a stop on a
    /// session that is not streaming does nothing. Bounded by one read
    /// timeout.
    pub fn stop(&mut self) {
        if self.state != SessionState::Streaming {
            return;
        }
        self.stop_flag.store(true, Ordering::Release);
        self.join_reader();
        self.state = SessionState::Initialized;
        log::info!("streaming stopped");
    }

    /// Stop streaming, release the claimed interface and close the device.
    /// Terminal: every later operation returns [`SessionError::Released`].
    pub fn release(&mut self) {
        if self.state == SessionState::Released {
            return;
        }
        self.stop();

        if let Some(endpoint) = self.endpoint.take() {
            let mut transport = self.lock_transport();
            transport.release_interface(endpoint.interface_number);
            transport.close();
        }

        self.state = SessionState::Released;
        log::info!("camera session released");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the reader thread is currently alive and streaming.
    pub fn is_streaming(&self) -> bool {
        self.state == SessionState::Streaming
            && self.reader.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Shared handle to the frame queue for the consuming side.
    pub fn frames(&self) -> Arc<FrameQueue> {
        Arc::clone(&self.queue)
    }

    /// Take the session event receiver. Can only be taken once.
    pub fn take_events(&mut self) -> Option<Receiver<SessionEvent>> {
        self.events_rx.take()
    }

    /// Attach a diagnostic chunk capture; every raw chunk read while it is
    /// active gets recorded.
    pub fn attach_capture(&mut self, capture: Arc<ChunkCapture>) {
        self.capture = Some(capture);
    }

    fn join_reader(&mut self) {
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                log::error!("reader thread panicked");
            }
        }
    }
}

impl<T: Transport + 'static> Drop for CameraSession<T> {
    fn drop(&mut self) {
        if self.state != SessionState::Released {
            self.release();
        }
    }
}

/// The transport reader loop, run on a dedicated thread.
///
/// One blocking timed read per iteration; chunks go straight into the
/// reassembler on this thread. Timeouts and zero-length reads loop
/// silently. A hard transport failure ends the loop and is reported as an
/// [`EndReason::TransportError`] event.
fn reader_loop<T: Transport>(
    transport: Arc<Mutex<T>>,
    endpoint: &StreamEndpoint,
    queue: &FrameQueue,
    stop_flag: &AtomicBool,
    events: &Sender<SessionEvent>,
    capture: Option<Arc<ChunkCapture>>,
    config: &SessionConfig,
) {
    log::info!(
        "reader loop started on endpoint 0x{:02x}",
        endpoint.address
    );

    let mut read_buf = vec![0u8; config.read_buffer_size];
    let mut reassembler = FrameReassembler::new();
    let mut frame_count = 0u64;

    while !stop_flag.load(Ordering::Acquire) {
        let result = match transport.lock() {
            Ok(mut transport) => {
                transport.read(endpoint.address, &mut read_buf, config.read_timeout)
            }
            Err(_) => {
                log::error!("transport lock poisoned, ending reader loop");
                let _ = events.send(SessionEvent::Ended(EndReason::TransportError));
                return;
            }
        };

        match result {
            Ok(0) => {}
            Ok(bytes_read) => {
                if let Some(capture) = &capture {
                    capture.record_chunk(&read_buf[..bytes_read]);
                }
                for frame in reassembler.ingest(&read_buf[..bytes_read]) {
                    frame_count += 1;
                    if let Some(capture) = &capture {
                        capture.record_frame();
                    }
                    if queue.offer(frame).is_some() {
                        log::debug!("frame queue full, dropped oldest frame");
                    }
                    if frame_count % 30 == 0 {
                        log::info!("reassembled {} frames", frame_count);
                    }
                }
            }
            Err(TransportError::Timeout) => {
                log::trace!("transport read timeout");
            }
            Err(e) => {
                log::error!("transport read failed: {}", e);
                let _ = events.send(SessionEvent::Ended(EndReason::TransportError));
                return;
            }
        }
    }

    log::debug!("reader loop observed stop request");
    let _ = events.send(SessionEvent::Ended(EndReason::Requested));
}
