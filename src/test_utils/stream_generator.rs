//! Synthetic framed-stream generation for tests.
//!
//! Builds byte streams in the wire framing the reassembler consumes: a
//! header whose first byte is the header length (at least 12), with the
//! payload length as a little-endian `u16` in header bytes 2 and 3,
//! followed by the payload. Splitting helpers simulate the arbitrary chunk
//! boundaries of real transport reads.

use crate::reassembler::MIN_HEADER_LEN;

/// Build a frame with the minimum 12-byte header around `payload`.
///
/// # Panics
///
/// Panics if the payload exceeds `u16::MAX` bytes.
pub fn framed(payload: &[u8]) -> Vec<u8> {
    framed_with_header_len(MIN_HEADER_LEN as u8, payload)
}

/// Build a frame with an explicit header length.
///
/// Header byte 1 carries the end-of-header flag real cameras set; the
/// remaining header bytes stay zero.
///
/// # Panics
///
/// Panics if `header_len` is below the minimum or the payload exceeds
/// `u16::MAX` bytes.
pub fn framed_with_header_len(header_len: u8, payload: &[u8]) -> Vec<u8> {
    assert!(header_len as usize >= MIN_HEADER_LEN, "header too short");
    assert!(payload.len() <= u16::MAX as usize, "payload too long");

    let mut bytes = Vec::with_capacity(header_len as usize + payload.len());
    bytes.push(header_len);
    bytes.push(0x80); // EOH flag
    bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    bytes.resize(header_len as usize, 0);
    bytes.extend_from_slice(payload);
    bytes
}

/// Bytes that can never start a valid header (every value below the
/// minimum header length), for resynchronization tests.
pub fn garbage(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % MIN_HEADER_LEN) as u8).collect()
}

/// Split a stream into fixed-size chunks, the last one possibly shorter.
///
/// # Panics
///
/// Panics if `chunk_size` is zero.
pub fn chunked(stream: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    assert!(chunk_size > 0, "chunk size must be positive");
    stream.chunks(chunk_size).map(<[u8]>::to_vec).collect()
}
