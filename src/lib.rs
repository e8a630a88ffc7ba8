//! `uvc-stream` — UVC byte-stream to video-frame reassembly pipeline.
//!
//! Reconstructs discrete video frames from the continuous, chunked byte
//! stream of a USB Video Class bulk/isochronous endpoint:
//!
//! ```text
//! Transport reader ── raw chunks ──> FrameReassembler ── frames ──> FrameQueue ──> RenderSink
//!   (dedicated thread, timed reads)    (accumulate, scan,            (bounded,      (own thread)
//!                                       compact)                      drop-oldest)
//! ```
//!
//! A [`CameraSession`] drives the lifecycle (`initialize` / `start` /
//! `stop` / `release`) over a pluggable device [`Transport`]; the reader
//! thread feeds the reassembler synchronously and completed frames flow
//! through a capacity-bounded queue to an independent render consumer.
//! Device discovery, permission handling and pixel decoding live outside
//! this crate.
//!
//! Real hardware is reached through `usb_transport::UsbTransport`
//! (cargo feature `usb`); recorded streams replay through
//! [`replay::ReplayTransport`] for desktop development and tests.

pub mod capture;
pub mod frame_queue;
pub mod reassembler;
pub mod render;
pub mod replay;
pub mod session;
pub mod test_utils;
pub mod transport;

#[cfg(feature = "usb")]
pub mod usb_transport;

pub use frame_queue::FrameQueue;
pub use reassembler::{Frame, FrameReassembler};
pub use render::{RenderDispatcher, RenderSink};
pub use session::{
    CameraSession, EndReason, SessionConfig, SessionError, SessionEvent, SessionState,
};
pub use transport::{StreamEndpoint, TransferKind, Transport, TransportError};
