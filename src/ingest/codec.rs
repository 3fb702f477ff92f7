//! Wire-frame decoding.
//!
//! Each frame is a fixed 24-byte header followed by up to 16
//! little-endian u64 payload slots:
//!
//! ```text
//! offset  size  field
//!      0     8  timestamp_ns
//!      8     8  thread_id
//!     16     4  pid
//!     20     2  event_id (non-zero)
//!     22     1  payload_len (slot count, <= 16)
//!     23     1  reserved
//!     24   8*n  payload slots
//! ```
//!
//! Length checks happen once per frame; fixed-width reads below them
//! use unchecked unaligned loads.

use thiserror::Error;

use super::event::{RawEvent, MAX_PAYLOAD_SLOTS};

/// Frame header size in bytes.
pub const HEADER_SIZE: usize = 24;

/// Largest frame the wire format permits.
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SLOTS * 8;

/// Errors produced while decoding a frame.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("truncated header: {size} bytes")]
    TruncatedHeader { size: usize },

    #[error("zero event id")]
    ZeroEventId,

    #[error("payload of {slots} slots exceeds the {MAX_PAYLOAD_SLOTS}-slot limit")]
    PayloadTooLarge { slots: usize },

    #[error("truncated payload: need {need} bytes, have {have}")]
    TruncatedPayload { need: usize, have: usize },
}

/// Total frame length implied by a header's payload_len byte.
pub const fn frame_len(payload_len: u8) -> usize {
    HEADER_SIZE + payload_len as usize * 8
}

/// Decode one frame. Bytes past the declared payload are ignored.
pub fn decode_frame(data: &[u8]) -> Result<RawEvent, FrameError> {
    if data.len() < HEADER_SIZE {
        return Err(FrameError::TruncatedHeader { size: data.len() });
    }

    let event_id = read_u16_le(data, 20);
    if event_id == 0 {
        return Err(FrameError::ZeroEventId);
    }

    let slots = data[22] as usize;
    if slots > MAX_PAYLOAD_SLOTS {
        return Err(FrameError::PayloadTooLarge { slots });
    }

    let need = frame_len(slots as u8);
    if data.len() < need {
        return Err(FrameError::TruncatedPayload {
            need,
            have: data.len(),
        });
    }

    let mut payload = [0u64; MAX_PAYLOAD_SLOTS];
    for (i, slot) in payload.iter_mut().take(slots).enumerate() {
        *slot = read_u64_le(data, HEADER_SIZE + i * 8);
    }

    Ok(RawEvent::new(
        event_id,
        read_u64_le(data, 0),
        read_u64_le(data, 8),
        read_u32_le(data, 16),
        &payload[..slots],
    ))
}

// ---------------------------------------------------------------------------
// Byte readers
// ---------------------------------------------------------------------------

#[inline(always)]
fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> [u8; N] {
    debug_assert!(offset + N <= data.len());
    // Bounds were checked by the caller against the declared frame
    // length; avoid a second slice-index check in the hot path.
    unsafe {
        let ptr = data.as_ptr().add(offset) as *const [u8; N];
        ptr.read_unaligned()
    }
}

#[inline(always)]
fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(read_fixed::<2>(data, offset))
}

#[inline(always)]
fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(read_fixed::<4>(data, offset))
}

#[inline(always)]
fn read_u64_le(data: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(read_fixed::<8>(data, offset))
}
