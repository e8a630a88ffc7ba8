//! Device transport boundary.
//!
//! The pipeline core depends on a narrow capability set — open, claim,
//! timed read, release, close — not on device enumeration or permission
//! handling. Real hardware is reached through the libusb-backed transport
//! (`usb` feature); desktop development and tests use
//! [`ReplayTransport`](crate::replay::ReplayTransport) or scripted
//! implementations.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by a device transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The device could not be opened.
    #[error("failed to open device: {0}")]
    OpenFailed(String),

    /// No video streaming interface with a usable endpoint was found.
    #[error("no video streaming interface or endpoint found")]
    EndpointNotFound,

    /// The streaming interface could not be claimed.
    #[error("interface claim rejected: {0}")]
    ClaimRejected(String),

    /// A read hit its timeout before any data arrived. Not a failure;
    /// the reader loop simply tries again.
    #[error("read timed out")]
    Timeout,

    /// The device went away.
    #[error("device disconnected")]
    Disconnected,

    /// Any other transport I/O failure. Fatal to the streaming session.
    #[error("transport I/O error: {0}")]
    Io(String),
}

/// How an endpoint moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Bulk transfers, read with a blocking timed primitive.
    Bulk,
    /// Isochronous transfers.
    Isochronous,
}

/// The streaming endpoint selected during [`Transport::open`].
#[derive(Debug, Clone)]
pub struct StreamEndpoint {
    /// Endpoint address, direction bit included.
    pub address: u8,
    /// Interface the endpoint belongs to.
    pub interface_number: u8,
    /// Transfer type of the endpoint.
    pub transfer_kind: TransferKind,
    /// Maximum packet size in bytes.
    pub max_packet_size: u16,
}

/// Blocking, timeout-bounded access to a UVC device.
///
/// Implementations must be [`Send`]: the session moves reads onto a
/// dedicated reader thread.
pub trait Transport: Send {
    /// Open the device and locate the video streaming interface and a
    /// bulk or isochronous IN endpoint.
    ///
    /// # Errors
    ///
    /// [`TransportError::OpenFailed`] when the device cannot be opened,
    /// [`TransportError::EndpointNotFound`] when no usable streaming
    /// endpoint exists.
    fn open(&mut self) -> Result<StreamEndpoint, TransportError>;

    /// Claim the streaming interface.
    ///
    /// # Errors
    ///
    /// [`TransportError::ClaimRejected`] when the claim is refused.
    fn claim_interface(&mut self, interface_number: u8) -> Result<(), TransportError>;

    /// Read one chunk from the endpoint into `buf`, blocking at most
    /// `timeout`. Returns the number of bytes read; zero-length reads are
    /// allowed and carry no data.
    ///
    /// # Errors
    ///
    /// [`TransportError::Timeout`] when the timeout elapses with no data
    /// (the caller loops); any other variant is fatal to the session.
    fn read(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Release a previously claimed interface. Best effort.
    fn release_interface(&mut self, interface_number: u8);

    /// Close the device. Best effort; further calls are invalid.
    fn close(&mut self);
}
