//! Length-prefixed packet framing
//!
//! Serializes a sequence of encoded packets into one contiguous buffer: each
//! record is a 2-byte little-endian length followed by the raw payload. The
//! format round-trips exactly, zero-length packets included.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::FramingError;
use crate::protocol::Packet;

/// Largest payload a 2-byte length prefix can describe.
pub const MAX_PACKET_LEN: usize = u16::MAX as usize;

/// Pack packets into a flat buffer. Packets larger than [`MAX_PACKET_LEN`]
/// are skipped with a warning; the call still succeeds.
pub fn pack(packets: &[Packet]) -> Vec<u8> {
    let total: usize = packets.iter().map(|p| 2 + p.len()).sum();
    let mut out = BytesMut::with_capacity(total);

    for packet in packets {
        if packet.len() > MAX_PACKET_LEN {
            tracing::warn!(len = packet.len(), "pack: packet too large, skipping");
            continue;
        }
        out.put_u16_le(packet.len() as u16);
        out.put_slice(packet);
    }

    out.to_vec()
}

/// Unpack a buffer produced by [`pack`]. Fails if a declared length reads
/// past the end or if trailing bytes remain after the last complete record.
pub fn unpack(buffer: &[u8]) -> Result<Vec<Packet>, FramingError> {
    let mut buf = buffer;
    let mut packets = Vec::new();

    while buf.remaining() >= 2 {
        let len = buf.get_u16_le() as usize;
        if len > buf.remaining() {
            return Err(FramingError::Truncated {
                need: len,
                have: buf.remaining(),
            });
        }
        packets.push(buf.copy_to_bytes(len));
    }

    if buf.has_remaining() {
        return Err(FramingError::TrailingBytes(buf.remaining()));
    }

    Ok(packets)
}
