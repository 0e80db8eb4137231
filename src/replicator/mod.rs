//! Per-endpoint stream component
//!
//! Owns the outgoing transfers this endpoint is sending and the incoming
//! transfers it is reassembling. Pacing is tick-driven: the host calls
//! [`Replicator::tick`] once per scheduling step and delivers received
//! frames through [`Replicator::handle_frame`]. All state transitions are
//! synchronous; there is no internal threading.

use std::collections::HashMap;

use uuid::Uuid;

use crate::config::StreamConfig;
use crate::error::TransferError;
use crate::identity::ReplicatorId;
use crate::network::{decode_frame, Transport};
use crate::protocol::{Packet, SessionId, StreamHeader, TransferMessage, TransferPayload};
use crate::registry::SessionRegistry;
use crate::report::{IncomingReport, OutgoingReport};
use crate::transfer::{IncomingTransfer, OutgoingTransfer, TransferPhase};

/// Incoming activity surfaced to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent {
    Started {
        session: SessionId,
        header: StreamHeader,
    },
    ChunkReceived {
        session: SessionId,
        index: u32,
    },
    Ended {
        session: SessionId,
    },
}

/// One endpoint's audio stream component.
pub struct Replicator {
    id: ReplicatorId,
    /// True when the local endpoint is authoritative for this component's
    /// stream; only then may transfers start here.
    locally_owned: bool,
    max_chunks_per_tick: usize,
    /// Pending outgoing transfers owned by this endpoint.
    outgoing: HashMap<SessionId, OutgoingTransfer>,
    /// Incoming transfers assembled on this endpoint.
    incoming: HashMap<SessionId, IncomingTransfer>,
}

impl Replicator {
    pub fn new(locally_owned: bool, config: &StreamConfig) -> Self {
        Self {
            id: ReplicatorId::next(),
            locally_owned,
            max_chunks_per_tick: config.max_chunks_per_tick as usize,
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
        }
    }

    pub fn id(&self) -> ReplicatorId {
        self.id
    }

    pub fn locally_owned(&self) -> bool {
        self.locally_owned
    }

    /// Start broadcasting an encoded packet list. The header goes out
    /// immediately; chunks begin flowing on the next tick.
    ///
    /// Fails if this endpoint does not own the stream, the packet list is
    /// empty, or the supplied session id is already active. With no id
    /// supplied, a fresh one is generated (retrying on collision).
    pub fn start_broadcast<T: Transport>(
        &mut self,
        packets: Vec<Packet>,
        header: StreamHeader,
        session: Option<SessionId>,
        transport: &mut T,
    ) -> Result<SessionId, TransferError> {
        if !self.locally_owned {
            return Err(TransferError::NotOwner);
        }
        if packets.is_empty() {
            return Err(TransferError::EmptyTransfer);
        }

        let session = match session {
            Some(requested) => {
                if self.outgoing.contains_key(&requested) {
                    return Err(TransferError::SessionConflict(requested));
                }
                requested
            }
            None => {
                let mut candidate = Uuid::new_v4();
                while self.outgoing.contains_key(&candidate) {
                    candidate = Uuid::new_v4();
                }
                candidate
            }
        };

        let mut transfer = OutgoingTransfer::new(session, header, packets);
        transport.send_to_authority(transfer.start_message());
        tracing::info!(
            session = %session,
            chunks = transfer.total_chunks(),
            "broadcast started"
        );
        self.outgoing.insert(session, transfer);

        Ok(session)
    }

    /// Abort an active transfer early. If the header went out but the end
    /// marker has not, the end marker is sent before local state is dropped.
    pub fn cancel<T: Transport>(
        &mut self,
        session: SessionId,
        transport: &mut T,
    ) -> Result<(), TransferError> {
        if !self.locally_owned {
            return Err(TransferError::NotOwner);
        }

        if let Some(mut transfer) = self.outgoing.remove(&session) {
            if let Some(end) = transfer.cancel_message() {
                transport.send_to_authority(end);
            }
            tracing::info!(session = %session, "broadcast cancelled");
        }
        Ok(())
    }

    /// One scheduling tick: pump every outgoing transfer, bounded by the
    /// per-tick chunk cap, and drop the ones that finished.
    pub fn tick<T: Transport>(&mut self, transport: &mut T) {
        if !self.locally_owned {
            return;
        }

        let mut finished = Vec::new();
        for (session, transfer) in self.outgoing.iter_mut() {
            for message in transfer.advance(self.max_chunks_per_tick) {
                transport.send_to_authority(message);
            }
            if transfer.is_finished() {
                finished.push(*session);
            }
        }
        for session in finished {
            self.outgoing.remove(&session);
        }
    }

    /// Handle one frame delivered by the fabric. Undecodable frames are
    /// dropped with a warning; a buggy peer must not be able to crash us.
    pub fn handle_frame(
        &mut self,
        frame: &[u8],
        registry: &mut SessionRegistry,
    ) -> Option<TransferEvent> {
        match decode_frame(frame) {
            Ok(message) => Some(self.handle_message(message, registry)),
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable frame");
                None
            }
        }
    }

    /// Handle one decoded transfer message.
    pub fn handle_message(
        &mut self,
        message: TransferMessage,
        registry: &mut SessionRegistry,
    ) -> TransferEvent {
        let session = message.session;
        match message.payload {
            TransferPayload::Start(header) => {
                self.incoming.entry(session).or_default().on_header(header);
                TransferEvent::Started { session, header }
            }
            TransferPayload::Chunk(chunk) => {
                let index = chunk.index;
                self.incoming.entry(session).or_default().on_chunk(chunk);
                TransferEvent::ChunkReceived { session, index }
            }
            TransferPayload::End => {
                if let Some(transfer) = self.incoming.get_mut(&session) {
                    transfer.on_end();
                }
                registry.notify_session_activity(session, self.id);
                TransferEvent::Ended { session }
            }
        }
    }

    /// Access the reassembled data for a session.
    pub fn received_packets(&self, session: SessionId) -> Option<(&StreamHeader, &[Packet])> {
        self.incoming
            .get(&session)
            .map(|transfer| (transfer.header(), transfer.packets()))
    }

    pub fn incoming(&self, session: SessionId) -> Option<&IncomingTransfer> {
        self.incoming.get(&session)
    }

    pub fn outgoing_phase(&self, session: SessionId) -> Option<TransferPhase> {
        self.outgoing.get(&session).map(OutgoingTransfer::phase)
    }

    /// Sessions still draining on the sender side.
    pub fn active_outgoing(&self) -> usize {
        self.outgoing.len()
    }

    pub fn outgoing_report(&self, session: SessionId) -> Option<OutgoingReport> {
        self.outgoing.get(&session).map(OutgoingReport::from_transfer)
    }

    pub fn incoming_report(&self, session: SessionId) -> Option<IncomingReport> {
        self.incoming
            .get(&session)
            .map(|transfer| IncomingReport::from_transfer(session, transfer))
    }
}
