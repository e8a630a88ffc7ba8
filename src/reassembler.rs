//! Frame reassembly from a chunked UVC byte stream.
//!
//! Transport reads arrive as arbitrarily-sized, arbitrarily-aligned chunks.
//! The [`FrameReassembler`] accumulates them, scans for length-prefixed
//! payload headers and emits each complete frame, keeping any trailing
//! partial frame for the next chunk.
//!
//! # Framing
//!
//! A frame starts with a header whose first byte is the header length
//! (valid headers are at least 12 bytes). Bytes 2 and 3 of the header carry
//! the payload length as a little-endian `u16`. A complete frame is exactly
//! `header_length + payload_length` bytes. A byte that cannot begin a valid
//! header is skipped one at a time (byte-level resynchronization); the
//! protocol offers no other recovery signal.
//!
//! # Usage
//!
//! ```rust,ignore
//! use uvc_stream::reassembler::FrameReassembler;
//!
//! let mut reassembler = FrameReassembler::new();
//!
//! for chunk in transport_reads {
//!     for frame in reassembler.ingest(&chunk) {
//!         queue.offer(frame);
//!     }
//! }
//! ```

/// Minimum valid header length in bytes. Headers claiming less are treated
/// as invalid framing.
pub const MIN_HEADER_LEN: usize = 12;

/// Initial accumulation buffer capacity (2 MiB).
const DEFAULT_BUFFER_CAPACITY: usize = 2 * 1024 * 1024;

/// Growable byte arena with an explicit write cursor.
///
/// Bytes in `[0, position)` are valid unconsumed stream data; bytes beyond
/// the cursor are undefined. Capacity doubles when an incoming chunk would
/// overflow it, copying the live prefix. Owned exclusively by the
/// reassembler on the reader thread, so it needs no locking.
#[derive(Debug)]
pub struct AccumulationBuffer {
    data: Vec<u8>,
    position: usize,
}

impl AccumulationBuffer {
    /// Create a buffer with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    /// Create a buffer with a specific initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity.max(1)],
            position: 0,
        }
    }

    /// Number of valid unconsumed bytes.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Current arena capacity.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Append a chunk, doubling capacity as needed and preserving the
    /// already-accumulated prefix.
    pub fn append(&mut self, chunk: &[u8]) {
        let required = self.position + chunk.len();
        if required > self.data.len() {
            let mut new_capacity = self.data.len().max(1);
            while new_capacity < required {
                new_capacity *= 2;
            }
            log::debug!(
                "growing accumulation buffer {} -> {} bytes",
                self.data.len(),
                new_capacity
            );
            let mut grown = vec![0u8; new_capacity];
            grown[..self.position].copy_from_slice(&self.data[..self.position]);
            self.data = grown;
        }
        self.data[self.position..required].copy_from_slice(chunk);
        self.position = required;
    }

    /// The valid bytes `[0, position)`.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.position]
    }

    /// Discard `offset` consumed bytes from the front, shifting the
    /// remaining live bytes down to offset zero.
    pub fn consume(&mut self, offset: usize) {
        if offset == 0 {
            return;
        }
        if offset >= self.position {
            self.position = 0;
            return;
        }
        self.data.copy_within(offset..self.position, 0);
        self.position -= offset;
    }

    /// Reset the cursor, discarding all accumulated bytes.
    pub fn clear(&mut self) {
        self.position = 0;
    }
}

impl Default for AccumulationBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// A complete reassembled frame: header plus payload, owned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    header_len: usize,
}

impl Frame {
    /// Construct a frame from raw bytes and the header length recorded at
    /// scan time.
    pub fn new(data: Vec<u8>, header_len: usize) -> Self {
        Self { data, header_len }
    }

    /// Full frame bytes (header followed by payload).
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The header bytes.
    pub fn header(&self) -> &[u8] {
        &self.data[..self.header_len]
    }

    /// The payload bytes following the header.
    pub fn payload(&self) -> &[u8] {
        &self.data[self.header_len..]
    }

    /// Header length in bytes.
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Payload length in bytes.
    pub fn payload_len(&self) -> usize {
        self.data.len() - self.header_len
    }

    /// Total frame length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame carries no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume the frame, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Reconstructs discrete frames from an unaligned chunk stream.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    buffer: AccumulationBuffer,
}

impl FrameReassembler {
    /// Create a reassembler with the default buffer capacity.
    pub fn new() -> Self {
        Self {
            buffer: AccumulationBuffer::new(),
        }
    }

    /// Create a reassembler with a specific initial buffer capacity.
    pub fn with_buffer_capacity(capacity: usize) -> Self {
        Self {
            buffer: AccumulationBuffer::with_capacity(capacity),
        }
    }

    /// Append a chunk and extract every frame that is now complete.
    ///
    /// Scans from the front of the accumulated bytes; a header is only
    /// inspected while strictly more than [`MIN_HEADER_LEN`] bytes remain
    /// past the scan offset. Invalid header bytes are skipped one at a time.
    /// A recognized header with insufficient trailing payload stops the
    /// scan without advancing, so it is re-examined once more data arrives.
    /// Consumed bytes are discarded afterwards; a trailing partial frame is
    /// kept for the next call.
    pub fn ingest(&mut self, chunk: &[u8]) -> Vec<Frame> {
        if !chunk.is_empty() {
            self.buffer.append(chunk);
        }

        let mut frames = Vec::new();
        let mut offset = 0usize;
        {
            let data = self.buffer.as_slice();
            let position = data.len();

            while offset + MIN_HEADER_LEN < position {
                let header_len = data[offset] as usize;
                if header_len < MIN_HEADER_LEN {
                    // Invalid framing byte, resynchronize one byte at a time
                    offset += 1;
                    continue;
                }

                let payload_len =
                    u16::from_le_bytes([data[offset + 2], data[offset + 3]]) as usize;
                let total = header_len + payload_len;

                if offset + total <= position {
                    frames.push(Frame::new(data[offset..offset + total].to_vec(), header_len));
                    offset += total;
                } else {
                    // Not enough data for a complete frame, wait for more
                    break;
                }
            }
        }

        self.buffer.consume(offset);

        if !frames.is_empty() {
            log::trace!(
                "ingest emitted {} frame(s), {} byte(s) buffered",
                frames.len(),
                self.buffer.position()
            );
        }
        frames
    }

    /// Discard all accumulated bytes (stop/start transitions).
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of unconsumed bytes waiting for more data.
    pub fn buffered_len(&self) -> usize {
        self.buffer.position()
    }

    /// The unconsumed bytes, for diagnostics.
    pub fn buffered(&self) -> &[u8] {
        self.buffer.as_slice()
    }
}
