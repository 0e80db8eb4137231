//! Incoming transfer reassembler
//!
//! Accepts chunks in arbitrary order, indexes them by sequence number, and
//! detects completion. Header and chunks may arrive in either order, and a
//! duplicate or out-of-range chunk must never be fatal: the sender is a
//! fallible remote peer.

use crate::protocol::{Chunk, Packet, StreamHeader};

/// Receiver-side state for one session.
///
/// A slot counts as filled once it holds a non-empty packet; later
/// duplicates for the same index are ignored.
pub struct IncomingTransfer {
    header: StreamHeader,
    /// Indexed packet slots; empty payload marks a missing slot.
    packets: Vec<Packet>,
    /// Raw chunk-arrival events, duplicates and strays included.
    received: u32,
    started: bool,
    ended: bool,
}

impl Default for IncomingTransfer {
    fn default() -> Self {
        Self::new()
    }
}

impl IncomingTransfer {
    pub fn new() -> Self {
        Self {
            header: StreamHeader::default(),
            packets: Vec::new(),
            received: 0,
            started: false,
            ended: false,
        }
    }

    /// (Re)initialize from the stream header: slot storage is sized to the
    /// declared packet count and counters reset.
    pub fn on_header(&mut self, header: StreamHeader) {
        self.header = header;
        self.packets = vec![Packet::new(); header.num_packets as usize];
        self.received = 0;
        self.started = true;
        self.ended = false;
    }

    /// Record one chunk arrival. In-range indices fill their slot; when the
    /// total is unknown (or the index is out of the declared range) the
    /// packet is appended sequentially as a fallback.
    pub fn on_chunk(&mut self, chunk: Chunk) {
        if !self.started {
            // Chunk outran its header on the fan-out path.
            self.started = true;
        }

        let expected = self.header.num_packets as usize;
        if expected > 0 && self.packets.len() < expected {
            self.packets.resize(expected, Packet::new());
        }

        let index = chunk.index as usize;
        if expected > 0 && index < self.packets.len() {
            if self.packets[index].is_empty() {
                self.packets[index] = chunk.packet;
            } else {
                tracing::debug!(index, "duplicate chunk ignored");
            }
        } else {
            if expected > 0 {
                tracing::warn!(index, expected, "chunk index out of declared range");
            }
            self.packets.push(chunk.packet);
        }

        self.received += 1;
    }

    /// Mark end-of-stream.
    pub fn on_end(&mut self) {
        self.ended = true;
    }

    /// Number of distinct declared slots holding data. Strays appended past
    /// the declared range do not count toward completion.
    pub fn unique_received(&self) -> u32 {
        let window = if self.expected() > 0 {
            self.expected() as usize
        } else {
            self.packets.len()
        };
        self.packets
            .iter()
            .take(window)
            .filter(|p| !p.is_empty())
            .count() as u32
    }

    /// Declared total; 0 means the sender never told us.
    pub fn expected(&self) -> u32 {
        self.header.num_packets
    }

    pub fn missing_count(&self) -> u32 {
        if self.expected() > 0 {
            self.expected().saturating_sub(self.unique_received())
        } else {
            0
        }
    }

    /// Indices still empty, when the total is known.
    pub fn missing_indices(&self) -> Vec<u32> {
        if self.expected() == 0 {
            return Vec::new();
        }
        (0..self.expected() as usize)
            .filter(|&i| self.packets.get(i).map_or(true, |p| p.is_empty()))
            .map(|i| i as u32)
            .collect()
    }

    /// True once the end marker arrived and no declared slot is missing.
    /// Raw arrival counts are not trusted; duplicates are not progress.
    pub fn ready_to_assemble(&self) -> bool {
        self.ended && (self.expected() == 0 || self.missing_count() == 0)
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// Raw arrival-event count; may exceed `unique_received` on duplicates.
    pub fn received_events(&self) -> u32 {
        self.received
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn ended(&self) -> bool {
        self.ended
    }
}
