//! Raw chunk capture for debugging and offline replay.
//!
//! Records the raw byte chunks read from the device transport so a
//! problematic stream can be analyzed or replayed at a desk without the
//! camera. Recording is cheap enough to leave attached to a live session:
//! the active check and the counters are lock-free, and the chunk store
//! takes one short lock per read.
//!
//! # File Format
//!
//! - `chunks_<timestamp>.bin`: sequence of `[u32 LE: length][bytes: data]...`
//! - `metadata_<timestamp>.json`: device and capture information
//!
//! # Example
//!
//! ```ignore
//! let capture = ChunkCapture::new();
//! capture.start(CaptureMetadata {
//!     vendor_id: 0x1234,
//!     product_id: 0x5678,
//!     ..Default::default()
//! })?;
//!
//! // On the reader thread:
//! capture.record_chunk(&chunk);
//!
//! // When done:
//! let result = capture.stop(Path::new("/output"))?;
//! ```

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use thiserror::Error;

/// Errors that can occur during chunk capture operations.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Capture is not currently active when trying to stop.
    #[error("capture is not active")]
    NotActive,

    /// Capture is already active when trying to start.
    #[error("capture is already active")]
    AlreadyActive,

    /// Failed to acquire lock on internal state.
    #[error("failed to acquire lock: {0}")]
    Lock(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Output directory does not exist.
    #[error("output directory does not exist: {0}")]
    DirectoryNotFound(String),
}

/// Result type alias for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Metadata about the capture session and device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureMetadata {
    /// USB vendor ID of the device.
    pub vendor_id: u16,
    /// USB product ID of the device.
    pub product_id: u16,
    /// Total number of chunks captured.
    #[serde(default)]
    pub total_chunks: u64,
    /// Total number of complete frames reassembled during the capture.
    #[serde(default)]
    pub total_frames: u64,
    /// Capture duration in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
    /// Total bytes captured.
    #[serde(default)]
    pub total_bytes: u64,
    /// Optional description or notes about the capture.
    #[serde(default)]
    pub description: String,
}

/// Result returned when a capture stops successfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureResult {
    /// Path to the saved chunks file.
    pub chunks_path: String,
    /// Path to the saved metadata file.
    pub metadata_path: String,
    /// Summary of the capture session.
    pub metadata: CaptureMetadata,
}

/// Thread-safe recorder for raw transport chunks.
pub struct ChunkCapture {
    /// Whether capture is currently active.
    is_capturing: AtomicBool,
    /// Captured chunk data.
    chunks: Mutex<Vec<Vec<u8>>>,
    /// When the capture started.
    start_time: Mutex<Option<Instant>>,
    /// Metadata about the capture session.
    metadata: Mutex<CaptureMetadata>,
    /// Atomic counter for total chunks (fast path for the reader thread).
    chunk_count: AtomicU64,
    /// Atomic counter for total bytes (fast path for the reader thread).
    byte_count: AtomicU64,
}

impl ChunkCapture {
    /// Creates a new capture with no active recording.
    #[must_use]
    pub fn new() -> Self {
        Self {
            is_capturing: AtomicBool::new(false),
            chunks: Mutex::new(Vec::new()),
            start_time: Mutex::new(None),
            metadata: Mutex::new(CaptureMetadata::default()),
            chunk_count: AtomicU64::new(0),
            byte_count: AtomicU64::new(0),
        }
    }

    /// Returns whether capture is currently active.
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.is_capturing.load(Ordering::Acquire)
    }

    /// Returns the current chunk count (lock-free).
    #[must_use]
    pub fn chunk_count(&self) -> u64 {
        self.chunk_count.load(Ordering::Relaxed)
    }

    /// Returns the current byte count (lock-free).
    #[must_use]
    pub fn byte_count(&self) -> u64 {
        self.byte_count.load(Ordering::Relaxed)
    }

    /// Starts a new capture session.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::AlreadyActive`] if a capture is already in
    /// progress, [`CaptureError::Lock`] if internal state is unreachable.
    pub fn start(&self, metadata: CaptureMetadata) -> Result<()> {
        if self
            .is_capturing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaptureError::AlreadyActive);
        }

        {
            let mut chunks = self
                .chunks
                .lock()
                .map_err(|e| CaptureError::Lock(e.to_string()))?;
            chunks.clear();
        }

        self.chunk_count.store(0, Ordering::Release);
        self.byte_count.store(0, Ordering::Release);

        {
            let mut start_time = self
                .start_time
                .lock()
                .map_err(|e| CaptureError::Lock(e.to_string()))?;
            *start_time = Some(Instant::now());
        }

        {
            let mut meta = self
                .metadata
                .lock()
                .map_err(|e| CaptureError::Lock(e.to_string()))?;
            *meta = metadata;
        }

        log::info!("chunk capture started");
        Ok(())
    }

    /// Records one raw chunk.
    ///
    /// Designed to be called from the reader thread; a silent no-op while
    /// no capture is active.
    pub fn record_chunk(&self, chunk: &[u8]) {
        if !self.is_capturing.load(Ordering::Acquire) {
            return;
        }

        self.chunk_count.fetch_add(1, Ordering::Relaxed);
        self.byte_count
            .fetch_add(chunk.len() as u64, Ordering::Relaxed);

        if let Ok(mut chunks) = self.chunks.lock() {
            chunks.push(chunk.to_vec());
        } else {
            log::warn!("failed to acquire lock for chunk recording");
        }
    }

    /// Increments the frame counter in metadata. Call when the reassembler
    /// emits a complete frame.
    pub fn record_frame(&self) {
        if !self.is_capturing.load(Ordering::Acquire) {
            return;
        }

        if let Ok(mut meta) = self.metadata.lock() {
            meta.total_frames += 1;
        }
    }

    /// Stops the capture and saves data to disk.
    ///
    /// # Errors
    ///
    /// [`CaptureError::NotActive`] if no capture is in progress,
    /// [`CaptureError::DirectoryNotFound`] if the output directory is
    /// missing, [`CaptureError::Io`] / [`CaptureError::Json`] on write
    /// failures.
    pub fn stop(&self, output_dir: &Path) -> Result<CaptureResult> {
        if self
            .is_capturing
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaptureError::NotActive);
        }

        if !output_dir.exists() {
            return Err(CaptureError::DirectoryNotFound(
                output_dir.display().to_string(),
            ));
        }

        let duration_ms = {
            let start_time = self
                .start_time
                .lock()
                .map_err(|e| CaptureError::Lock(e.to_string()))?;
            start_time
                .map(|t| t.elapsed().as_millis() as u64)
                .unwrap_or(0)
        };

        let total_chunks = self.chunk_count.load(Ordering::Acquire);
        let total_bytes = self.byte_count.load(Ordering::Acquire);

        let metadata = {
            let mut meta = self
                .metadata
                .lock()
                .map_err(|e| CaptureError::Lock(e.to_string()))?;
            meta.duration_ms = duration_ms;
            meta.total_chunks = total_chunks;
            meta.total_bytes = total_bytes;
            meta.clone()
        };

        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let chunks_path = output_dir.join(format!("chunks_{}.bin", timestamp));
        self.save_chunks(&chunks_path)?;

        let metadata_path = output_dir.join(format!("metadata_{}.json", timestamp));
        let json = serde_json::to_string_pretty(&metadata)?;
        std::fs::write(&metadata_path, json)?;

        log::info!(
            "capture stopped: {} chunks, {} bytes, {} ms",
            total_chunks,
            total_bytes,
            duration_ms
        );

        Ok(CaptureResult {
            chunks_path: chunks_path.display().to_string(),
            metadata_path: metadata_path.display().to_string(),
            metadata,
        })
    }

    /// Cancels the current capture without saving.
    pub fn cancel(&self) {
        self.is_capturing.store(false, Ordering::Release);
        if let Ok(mut chunks) = self.chunks.lock() {
            chunks.clear();
        }
        log::info!("capture cancelled");
    }

    /// Saves chunks as `[u32 LE: length][bytes: data]...`.
    fn save_chunks(&self, path: &Path) -> Result<()> {
        let chunks = self
            .chunks
            .lock()
            .map_err(|e| CaptureError::Lock(e.to_string()))?;

        let mut file = std::fs::File::create(path)?;
        for chunk in chunks.iter() {
            let len = chunk.len() as u32;
            file.write_all(&len.to_le_bytes())?;
            file.write_all(chunk)?;
        }
        file.flush()?;

        log::debug!("saved {} chunks to {}", chunks.len(), path.display());
        Ok(())
    }
}

impl Default for ChunkCapture {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads chunks back from a binary capture file.
///
/// # Errors
///
/// Returns [`CaptureError::Io`] if file operations fail or the file is
/// truncated mid-chunk.
pub fn read_chunks(path: &Path) -> Result<Vec<Vec<u8>>> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut chunks = Vec::new();

    loop {
        let mut len_bytes = [0u8; 4];
        match file.read_exact(&mut len_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(CaptureError::Io(e)),
        }

        let len = u32::from_le_bytes(len_bytes) as usize;
        let mut chunk = vec![0u8; len];
        file.read_exact(&mut chunk)?;
        chunks.push(chunk);
    }

    Ok(chunks)
}

/// Reads capture metadata from a JSON file.
///
/// # Errors
///
/// Returns [`CaptureError::Io`] if the file cannot be read,
/// [`CaptureError::Json`] if the JSON is invalid.
pub fn read_metadata(path: &Path) -> Result<CaptureMetadata> {
    let json = std::fs::read_to_string(path)?;
    let metadata: CaptureMetadata = serde_json::from_str(&json)?;
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn test_new_capture_is_inactive() {
        let capture = ChunkCapture::new();
        assert!(!capture.is_capturing());
        assert_eq!(capture.chunk_count(), 0);
        assert_eq!(capture.byte_count(), 0);
    }

    #[test]
    fn test_start_twice_fails() {
        let capture = ChunkCapture::new();
        capture.start(CaptureMetadata::default()).unwrap();
        let result = capture.start(CaptureMetadata::default());
        assert!(matches!(result, Err(CaptureError::AlreadyActive)));
    }

    #[test]
    fn test_record_chunk_counts() {
        let capture = ChunkCapture::new();
        capture.start(CaptureMetadata::default()).unwrap();

        capture.record_chunk(&[1, 2, 3, 4]);
        capture.record_chunk(&[5, 6, 7, 8, 9]);

        assert_eq!(capture.chunk_count(), 2);
        assert_eq!(capture.byte_count(), 9);
    }

    #[test]
    fn test_record_chunk_ignored_when_inactive() {
        let capture = ChunkCapture::new();
        capture.record_chunk(&[1, 2, 3]);
        assert_eq!(capture.chunk_count(), 0);
    }

    #[test]
    fn test_cancel_allows_restart() {
        let capture = ChunkCapture::new();
        capture.start(CaptureMetadata::default()).unwrap();
        capture.record_chunk(&[1, 2]);

        capture.cancel();
        assert!(!capture.is_capturing());

        capture.start(CaptureMetadata::default()).unwrap();
        assert!(capture.is_capturing());
        assert_eq!(capture.chunk_count(), 0);
    }

    #[test]
    fn test_stop_without_start_fails() {
        let capture = ChunkCapture::new();
        let dir = tempdir().unwrap();
        assert!(matches!(
            capture.stop(dir.path()),
            Err(CaptureError::NotActive)
        ));
    }

    #[test]
    fn test_stop_missing_directory_fails() {
        let capture = ChunkCapture::new();
        capture.start(CaptureMetadata::default()).unwrap();
        let result = capture.stop(Path::new("/nonexistent/capture/dir"));
        assert!(matches!(result, Err(CaptureError::DirectoryNotFound(_))));
    }

    #[test]
    fn test_concurrent_recording() {
        let capture = Arc::new(ChunkCapture::new());
        capture.start(CaptureMetadata::default()).unwrap();

        let mut handles = vec![];
        for i in 0..10 {
            let capture = Arc::clone(&capture);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let chunk = vec![(i * 100 + j) as u8; 10];
                    capture.record_chunk(&chunk);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(capture.chunk_count(), 1000);
        assert_eq!(capture.byte_count(), 10000);
    }

    #[test]
    fn test_full_capture_round_trip() {
        let dir = tempdir().unwrap();
        let capture = ChunkCapture::new();

        capture
            .start(CaptureMetadata {
                vendor_id: 0xABCD,
                product_id: 0xEF01,
                description: "bench capture".to_string(),
                ..Default::default()
            })
            .unwrap();

        let chunks: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i; (i as usize + 1) * 10]).collect();
        for chunk in &chunks {
            capture.record_chunk(chunk);
        }
        capture.record_frame();
        capture.record_frame();

        let result = capture.stop(dir.path()).unwrap();
        assert_eq!(result.metadata.vendor_id, 0xABCD);
        assert_eq!(result.metadata.total_chunks, 10);
        assert_eq!(result.metadata.total_frames, 2);

        let restored = read_chunks(Path::new(&result.chunks_path)).unwrap();
        assert_eq!(restored, chunks);

        let meta = read_metadata(Path::new(&result.metadata_path)).unwrap();
        assert_eq!(meta.product_id, 0xEF01);
        assert_eq!(meta.description, "bench capture");
    }
}
