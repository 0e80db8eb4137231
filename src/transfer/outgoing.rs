//! Outgoing transfer state machine
//!
//! Owns the ordered chunk list for one session and paces delivery across
//! scheduling ticks. Emits transport messages; the caller decides where
//! they go.

use crate::protocol::{Chunk, Packet, SessionId, StreamHeader, TransferMessage};

/// Lifecycle of an outgoing transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Created,
    HeaderSent,
    Draining,
    Ended,
}

/// Sender-side state for one session.
///
/// `next_index` never decreases; the end marker is emitted only once every
/// chunk has been emitted (or on cancel).
pub struct OutgoingTransfer {
    session: SessionId,
    header: StreamHeader,
    chunks: Vec<Chunk>,
    next_index: usize,
    header_sent: bool,
    end_sent: bool,
}

impl OutgoingTransfer {
    /// Build a transfer from an ordered packet list. The header's packet
    /// count is corrected to the real chunk count so receivers always know
    /// the expected total.
    pub fn new(session: SessionId, mut header: StreamHeader, packets: Vec<Packet>) -> Self {
        header.num_packets = packets.len() as u32;
        let chunks = packets
            .into_iter()
            .enumerate()
            .map(|(index, packet)| Chunk {
                index: index as u32,
                packet,
            })
            .collect();

        Self {
            session,
            header,
            chunks,
            next_index: 0,
            header_sent: false,
            end_sent: false,
        }
    }

    /// The start-of-stream message. Marks the header as sent; call exactly
    /// once, before the first `advance`.
    pub fn start_message(&mut self) -> TransferMessage {
        self.header_sent = true;
        TransferMessage::start(self.session, self.header)
    }

    /// One scheduling tick: emit up to `max_chunks` chunk messages, plus the
    /// end marker once the cursor reaches the end of the list. A no-op until
    /// the header has been sent.
    pub fn advance(&mut self, max_chunks: usize) -> Vec<TransferMessage> {
        if !self.header_sent || self.end_sent {
            return Vec::new();
        }

        let mut out = Vec::new();
        let mut sent_this_tick = 0;
        while self.next_index < self.chunks.len() && sent_this_tick < max_chunks {
            out.push(TransferMessage::chunk(
                self.session,
                self.chunks[self.next_index].clone(),
            ));
            self.next_index += 1;
            sent_this_tick += 1;
        }

        if self.next_index >= self.chunks.len() && !self.end_sent {
            self.end_sent = true;
            out.push(TransferMessage::end(self.session));
        }

        out
    }

    /// End the transfer early. Returns the end marker if the header went out
    /// but the end marker has not; receivers must never be left believing
    /// the transfer is still open.
    pub fn cancel_message(&mut self) -> Option<TransferMessage> {
        if self.header_sent && !self.end_sent {
            self.end_sent = true;
            Some(TransferMessage::end(self.session))
        } else {
            None
        }
    }

    pub fn phase(&self) -> TransferPhase {
        if self.end_sent {
            TransferPhase::Ended
        } else if self.next_index > 0 {
            TransferPhase::Draining
        } else if self.header_sent {
            TransferPhase::HeaderSent
        } else {
            TransferPhase::Created
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Chunks emitted so far.
    pub fn sent_chunks(&self) -> usize {
        self.next_index
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn header_sent(&self) -> bool {
        self.header_sent
    }

    pub fn end_sent(&self) -> bool {
        self.end_sent
    }

    /// True once every chunk and the end marker have been emitted.
    pub fn is_finished(&self) -> bool {
        self.end_sent && self.next_index >= self.chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TransferPayload;
    use bytes::Bytes;
    use uuid::Uuid;

    fn packets(n: usize) -> Vec<Packet> {
        (0..n).map(|i| Bytes::from(vec![i as u8; 4])).collect()
    }

    fn transfer(n: usize) -> OutgoingTransfer {
        OutgoingTransfer::new(Uuid::new_v4(), StreamHeader::default(), packets(n))
    }

    #[test]
    fn header_count_is_corrected() {
        let tr = transfer(7);
        assert_eq!(tr.header().num_packets, 7);
    }

    #[test]
    fn advance_before_header_is_noop() {
        let mut tr = transfer(3);
        assert!(tr.advance(32).is_empty());
        assert_eq!(tr.phase(), TransferPhase::Created);
    }

    #[test]
    fn paces_100_chunks_in_4_ticks_of_32() {
        let mut tr = transfer(100);
        tr.start_message();

        let mut cumulative = 0;
        for tick in 1..=4 {
            let msgs = tr.advance(32);
            cumulative += msgs
                .iter()
                .filter(|m| matches!(m.payload, TransferPayload::Chunk(_)))
                .count();
            assert_eq!(cumulative, 100.min(32 * tick));
        }
        assert!(tr.is_finished());
        assert_eq!(tr.phase(), TransferPhase::Ended);
    }

    #[test]
    fn end_marker_follows_last_chunk_in_same_tick() {
        let mut tr = transfer(2);
        tr.start_message();
        let msgs = tr.advance(32);
        assert_eq!(msgs.len(), 3);
        assert!(matches!(msgs[2].payload, TransferPayload::End));
    }

    #[test]
    fn exact_multiple_finishes_on_full_tick() {
        let mut tr = transfer(64);
        tr.start_message();
        tr.advance(32);
        let msgs = tr.advance(32);
        assert!(matches!(msgs.last().unwrap().payload, TransferPayload::End));
        assert!(tr.is_finished());
    }

    #[test]
    fn chunks_are_emitted_in_index_order() {
        let mut tr = transfer(5);
        tr.start_message();
        let msgs = tr.advance(5);
        let indices: Vec<u32> = msgs
            .iter()
            .filter_map(|m| match &m.payload {
                TransferPayload::Chunk(c) => Some(c.index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn cancel_after_header_emits_end_once() {
        let mut tr = transfer(5);
        tr.start_message();
        let first = tr.cancel_message();
        assert!(matches!(
            first,
            Some(TransferMessage {
                payload: TransferPayload::End,
                ..
            })
        ));
        assert!(tr.cancel_message().is_none());
    }

    #[test]
    fn cancel_before_header_emits_nothing() {
        let mut tr = transfer(5);
        assert!(tr.cancel_message().is_none());
    }

    #[test]
    fn no_chunks_flow_after_cancel() {
        let mut tr = transfer(5);
        tr.start_message();
        tr.cancel_message();
        let msgs = tr.advance(32);
        assert!(msgs.is_empty());
    }
}
