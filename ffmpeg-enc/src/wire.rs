//! Byte layout of request and reply bodies.
//!
//! A request body is 1..=GOP raw YUV 4:2:0 frames back to back. The frame
//! count is implied by the body length.
//!
//! A reply body is one record per packet, in frame order:
//!
//! ```text
//! +-------------+--------------+-------------------+
//! | flags (u32) | length (u32) | payload (length)  |  x frames
//! +-------------+--------------+-------------------+
//! ```
//!
//! Both integers use the host's native byte order; client and server share
//! the machine. There is no leading count: a reader walks records until the
//! buffer is exhausted.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    error::WireError,
    frame::{Frame, FrameLayout},
    packet::{Packet, PacketFlags},
};

/// Size of the fixed part of a reply record (flags + length).
pub const RECORD_HEADER_LEN: usize = 8;

/// Splits a request body into frames. Frames share the body's allocation.
pub fn decode_batch(
    body: Bytes,
    layout: FrameLayout,
    gop: usize,
) -> Result<Vec<Frame>, WireError> {
    let frame_size = layout.frame_size();
    if body.is_empty() {
        return Err(WireError::Empty);
    }
    if frame_size == 0 || body.len() % frame_size != 0 {
        return Err(WireError::LengthMismatch {
            len: body.len(),
            frame_size,
        });
    }
    let frames = body.len() / frame_size;
    if frames > gop {
        return Err(WireError::TooManyFrames { frames, gop });
    }

    Ok((0..frames)
        .map(|i| {
            let start = i * frame_size;
            Frame::new(i, layout, body.slice(start..start + frame_size))
        })
        .collect())
}

/// Serializes packets into a reply body.
pub fn encode_reply(packets: &[Packet]) -> Bytes {
    let len = packets
        .iter()
        .map(|p| RECORD_HEADER_LEN + p.size())
        .sum();
    let mut buf = BytesMut::with_capacity(len);
    for packet in packets {
        buf.put_u32_ne(packet.flags().bits());
        buf.put_u32_ne(packet.size() as u32);
        buf.put_slice(packet.data());
    }
    buf.freeze()
}

/// Concatenates raw frame payloads into a request body.
pub fn encode_batch(frames: &[&[u8]]) -> Bytes {
    let mut buf = BytesMut::with_capacity(frames.iter().map(|f| f.len()).sum());
    for frame in frames {
        buf.put_slice(frame);
    }
    buf.freeze()
}

/// Walks a reply body record by record. An empty body yields no packets.
pub fn decode_reply(mut body: Bytes) -> Result<Vec<Packet>, WireError> {
    let total = body.len();
    let mut packets = Vec::new();
    while body.has_remaining() {
        let offset = total - body.remaining();
        if body.remaining() < RECORD_HEADER_LEN {
            return Err(WireError::TruncatedRecord { offset });
        }
        let flags = PacketFlags::from_bits(body.get_u32_ne());
        let len = body.get_u32_ne() as usize;
        if body.remaining() < len {
            return Err(WireError::TruncatedRecord { offset });
        }
        packets.push(Packet::new(flags, body.split_to(len)));
    }
    Ok(packets)
}

#[cfg(test)]
#[path = "wire_test.rs"]
mod wire_test;
