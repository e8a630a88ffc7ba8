//! Chunk replay for desktop development without physical hardware.
//!
//! [`ReplayTransport`] implements the device [`Transport`] over a recorded
//! chunk list, so a full [`CameraSession`](crate::session::CameraSession)
//! can stream from a capture file exactly as it would from a camera. Once
//! the recording is exhausted, reads behave like an idle device (timeout),
//! or wrap around when loop playback is enabled.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::path::Path;
//! use uvc_stream::replay::ReplayTransport;
//! use uvc_stream::session::CameraSession;
//!
//! let transport = ReplayTransport::load(Path::new("chunks_12345.bin"))?;
//! let mut session = CameraSession::new(transport);
//! session.initialize()?;
//! session.start()?;
//! ```

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::capture::{self, CaptureError};
use crate::reassembler::{Frame, FrameReassembler};
use crate::transport::{StreamEndpoint, TransferKind, Transport, TransportError};

/// Errors that can occur while loading or replaying a capture.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// The capture file could not be read or was malformed.
    #[error("capture file error: {0}")]
    Capture(#[from] CaptureError),
}

/// A [`Transport`] that serves recorded chunks in order.
pub struct ReplayTransport {
    chunks: Vec<Vec<u8>>,
    cursor: usize,
    loop_playback: bool,
    opened: bool,
}

impl ReplayTransport {
    /// Load chunks from a binary capture file
    /// (`[u32 LE: length][bytes]...`).
    ///
    /// # Errors
    ///
    /// [`ReplayError::Capture`] if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let chunks = capture::read_chunks(path)?;
        log::info!("loaded {} chunks from {}", chunks.len(), path.display());
        Ok(Self::from_chunks(chunks))
    }

    /// Build a replay directly from in-memory chunks.
    pub fn from_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            cursor: 0,
            loop_playback: false,
            opened: false,
        }
    }

    /// Enable or disable wrap-around once the recording is exhausted.
    #[must_use]
    pub fn looped(mut self, loop_playback: bool) -> Self {
        self.loop_playback = loop_playback;
        self
    }

    /// Number of recorded chunks.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

impl Transport for ReplayTransport {
    fn open(&mut self) -> Result<StreamEndpoint, TransportError> {
        self.opened = true;
        self.cursor = 0;
        // Synthetic bulk endpoint matching a typical high-speed camera
        Ok(StreamEndpoint {
            address: 0x81,
            interface_number: 1,
            transfer_kind: TransferKind::Bulk,
            max_packet_size: 512,
        })
    }

    fn claim_interface(&mut self, interface_number: u8) -> Result<(), TransportError> {
        log::debug!("replay transport claims interface {}", interface_number);
        Ok(())
    }

    fn read(
        &mut self,
        _endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        if !self.opened {
            return Err(TransportError::Io("replay transport is not open".into()));
        }

        if self.cursor >= self.chunks.len() {
            if self.loop_playback && !self.chunks.is_empty() {
                self.cursor = 0;
            } else {
                // Exhausted recording reads like an idle camera
                std::thread::sleep(Duration::from_millis(1));
                return Err(TransportError::Timeout);
            }
        }

        let chunk = &self.chunks[self.cursor];
        self.cursor += 1;

        let n = chunk.len().min(buf.len());
        if n < chunk.len() {
            log::warn!(
                "read buffer smaller than recorded chunk, truncating {} -> {} bytes",
                chunk.len(),
                n
            );
        }
        buf[..n].copy_from_slice(&chunk[..n]);
        Ok(n)
    }

    fn release_interface(&mut self, interface_number: u8) {
        log::debug!("replay transport releases interface {}", interface_number);
    }

    fn close(&mut self) {
        self.opened = false;
    }
}

/// Push every recorded chunk through a fresh reassembler and return all
/// complete frames, without timing or threads.
///
/// # Errors
///
/// [`ReplayError::Capture`] if the file cannot be read.
pub fn replay_frames(path: &Path) -> Result<Vec<Frame>, ReplayError> {
    let chunks = capture::read_chunks(path)?;
    let mut reassembler = FrameReassembler::new();
    let mut frames = Vec::new();
    for chunk in &chunks {
        frames.extend(reassembler.ingest(chunk));
    }
    log::debug!(
        "replayed {} chunks into {} frames",
        chunks.len(),
        frames.len()
    );
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::stream_generator::{chunked, framed};
    use std::io::Write;
    use tempfile::tempdir;

    fn write_capture_file(chunks: &[Vec<u8>]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chunks_test.bin");
        let mut file = std::fs::File::create(&path).unwrap();
        for chunk in chunks {
            file.write_all(&(chunk.len() as u32).to_le_bytes()).unwrap();
            file.write_all(chunk).unwrap();
        }
        (dir, path)
    }

    #[test]
    fn test_load_empty_capture() {
        let (_dir, path) = write_capture_file(&[]);
        let replay = ReplayTransport::load(&path).unwrap();
        assert_eq!(replay.chunk_count(), 0);
    }

    #[test]
    fn test_read_serves_chunks_in_order() {
        let chunks = vec![vec![1u8, 2, 3], vec![4u8, 5]];
        let mut replay = ReplayTransport::from_chunks(chunks);
        replay.open().unwrap();

        let mut buf = [0u8; 64];
        assert_eq!(replay.read(0x81, &mut buf, Duration::from_millis(10)), Ok(3));
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(replay.read(0x81, &mut buf, Duration::from_millis(10)), Ok(2));
        assert_eq!(&buf[..2], &[4, 5]);
    }

    #[test]
    fn test_exhausted_replay_times_out() {
        let mut replay = ReplayTransport::from_chunks(vec![vec![1u8]]);
        replay.open().unwrap();

        let mut buf = [0u8; 8];
        replay.read(0x81, &mut buf, Duration::from_millis(10)).unwrap();
        assert_eq!(
            replay.read(0x81, &mut buf, Duration::from_millis(10)),
            Err(TransportError::Timeout)
        );
    }

    #[test]
    fn test_looped_replay_wraps_around() {
        let mut replay = ReplayTransport::from_chunks(vec![vec![7u8], vec![8u8]]).looped(true);
        replay.open().unwrap();

        let mut buf = [0u8; 8];
        let mut seen = Vec::new();
        for _ in 0..5 {
            let n = replay.read(0x81, &mut buf, Duration::from_millis(10)).unwrap();
            seen.push(buf[..n].to_vec());
        }
        assert_eq!(seen, vec![vec![7], vec![8], vec![7], vec![8], vec![7]]);
    }

    #[test]
    fn test_read_before_open_fails() {
        let mut replay = ReplayTransport::from_chunks(vec![vec![1u8]]);
        let mut buf = [0u8; 8];
        assert!(matches!(
            replay.read(0x81, &mut buf, Duration::from_millis(10)),
            Err(TransportError::Io(_))
        ));
    }

    #[test]
    fn test_replay_frames_from_file() {
        let mut stream = framed(&[1, 2, 3]);
        stream.extend_from_slice(&framed(&[4, 5, 6, 7]));
        let chunks = chunked(&stream, 7);
        let (_dir, path) = write_capture_file(&chunks);

        let frames = replay_frames(&path).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload(), &[1, 2, 3]);
        assert_eq!(frames[1].payload(), &[4, 5, 6, 7]);
    }

    #[test]
    fn test_replay_frames_missing_file() {
        let result = replay_frames(Path::new("/nonexistent/chunks.bin"));
        assert!(matches!(result, Err(ReplayError::Capture(_))));
    }
}
