//! Wire types shared across the streaming pipeline
//!
//! Everything that crosses the transport boundary lives here: the stream
//! header, chunks, and the transfer message envelope. All types serialize
//! with serde so the fabric can carry them as bincode frames.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One logical audio stream transfer, spanning header -> chunks -> end.
///
/// Chosen by the sender; must not collide with any session currently active
/// in that sender's outgoing table.
pub type SessionId = Uuid;

/// Raw encoded-audio payload, produced and consumed whole by the codec.
pub type Packet = Bytes;

/// Stream parameters, immutable once a transfer begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHeader {
    pub sample_rate: u32,
    pub channels: u8,
    pub bitrate: u32,
    /// Frame duration in milliseconds.
    pub frame_ms: u32,
    /// Total packet count; 0 means unknown at stream start.
    pub num_packets: u32,
}

impl Default for StreamHeader {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 1,
            bitrate: 32_000,
            frame_ms: 20,
            num_packets: 0,
        }
    }
}

impl fmt::Display for StreamHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Opus header: SR={} Hz  Ch={}  Bitrate={} bps  Frame={} ms  Packets={}",
            self.sample_rate, self.channels, self.bitrate, self.frame_ms, self.num_packets
        )
    }
}

/// One indexed encoded frame as transmitted over the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Sequential frame index starting from zero, dense, no gaps as emitted.
    pub index: u32,
    pub packet: Packet,
}

/// Payload of a transfer message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferPayload {
    Start(StreamHeader),
    Chunk(Chunk),
    End,
}

/// The unit the transport carries: a session id plus one payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMessage {
    pub session: SessionId,
    pub payload: TransferPayload,
}

impl TransferMessage {
    pub fn start(session: SessionId, header: StreamHeader) -> Self {
        Self {
            session,
            payload: TransferPayload::Start(header),
        }
    }

    pub fn chunk(session: SessionId, chunk: Chunk) -> Self {
        Self {
            session,
            payload: TransferPayload::Chunk(chunk),
        }
    }

    pub fn end(session: SessionId) -> Self {
        Self {
            session,
            payload: TransferPayload::End,
        }
    }
}
