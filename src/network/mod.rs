//! Transport contract and in-memory fabric
//!
//! The core assumes two delivery guarantees from its host network: an
//! ordered-reliable unicast from any endpoint to the authoritative endpoint,
//! and an ordered-reliable fan-out from the authority to every endpoint,
//! origin included. [`LocalFabric`] provides both in memory for tests and
//! demos, carrying messages as bincode frames the way a real wire would.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;

use crate::identity::EndpointId;
use crate::protocol::TransferMessage;

/// Outbound half of the network contract consumed by the core.
pub trait Transport {
    /// Ordered-reliable unicast toward the authoritative endpoint. The
    /// authority relays every transfer message to all endpoints.
    fn send_to_authority(&mut self, message: TransferMessage);

    /// Ordered-reliable fan-out from the authority to every endpoint,
    /// including the origin.
    fn send_to_all(&mut self, message: TransferMessage);
}

/// Serialize a message into the byte frame the fabric carries.
pub fn encode_frame(message: &TransferMessage) -> Option<Bytes> {
    match bincode::serialize(message) {
        Ok(frame) => Some(Bytes::from(frame)),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode transfer message");
            None
        }
    }
}

/// Decode a byte frame back into a message.
pub fn decode_frame(frame: &[u8]) -> Result<TransferMessage, bincode::Error> {
    bincode::deserialize(frame)
}

/// In-memory fabric: per-endpoint FIFO inboxes with authority fan-out.
///
/// The authority's only behavior in this protocol is the reliable relay, so
/// `send_to_authority` models it directly as a fan-out to every joined
/// endpoint in join order.
pub struct LocalFabric {
    endpoints: Vec<EndpointId>,
    inboxes: HashMap<EndpointId, VecDeque<Bytes>>,
}

impl Default for LocalFabric {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalFabric {
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            inboxes: HashMap::new(),
        }
    }

    /// Add an endpoint to the fan-out set. Joining twice is a no-op.
    pub fn join(&mut self, endpoint: EndpointId) {
        if !self.endpoints.contains(&endpoint) {
            self.endpoints.push(endpoint);
            self.inboxes.insert(endpoint, VecDeque::new());
        }
    }

    /// Remove an endpoint; queued frames for it are dropped.
    pub fn leave(&mut self, endpoint: EndpointId) {
        self.endpoints.retain(|e| *e != endpoint);
        self.inboxes.remove(&endpoint);
    }

    /// Take every frame queued for an endpoint, in delivery order.
    pub fn drain(&mut self, endpoint: EndpointId) -> Vec<Bytes> {
        self.inboxes
            .get_mut(&endpoint)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }

    /// Total frames queued across all inboxes.
    pub fn pending(&self) -> usize {
        self.inboxes.values().map(VecDeque::len).sum()
    }

    fn fan_out(&mut self, frame: Bytes) {
        for endpoint in &self.endpoints {
            if let Some(inbox) = self.inboxes.get_mut(endpoint) {
                inbox.push_back(frame.clone());
            }
        }
    }
}

impl Transport for LocalFabric {
    fn send_to_authority(&mut self, message: TransferMessage) {
        if let Some(frame) = encode_frame(&message) {
            self.fan_out(frame);
        }
    }

    fn send_to_all(&mut self, message: TransferMessage) {
        if let Some(frame) = encode_frame(&message) {
            self.fan_out(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Chunk, StreamHeader};
    use uuid::Uuid;

    #[test]
    fn frame_roundtrip() {
        let msg = TransferMessage::start(Uuid::new_v4(), StreamHeader::default());
        let frame = encode_frame(&msg).unwrap();
        assert_eq!(decode_frame(&frame).unwrap(), msg);
    }

    #[test]
    fn fan_out_reaches_every_endpoint_in_order() {
        let mut fabric = LocalFabric::new();
        let a = EndpointId::new(1);
        let b = EndpointId::new(2);
        fabric.join(a);
        fabric.join(b);

        let session = Uuid::new_v4();
        fabric.send_to_authority(TransferMessage::start(session, StreamHeader::default()));
        fabric.send_to_authority(TransferMessage::chunk(
            session,
            Chunk {
                index: 0,
                packet: Bytes::from_static(b"x"),
            },
        ));
        fabric.send_to_authority(TransferMessage::end(session));

        for endpoint in [a, b] {
            let frames = fabric.drain(endpoint);
            assert_eq!(frames.len(), 3);
            let first = decode_frame(&frames[0]).unwrap();
            assert!(matches!(
                first.payload,
                crate::protocol::TransferPayload::Start(_)
            ));
            let last = decode_frame(&frames[2]).unwrap();
            assert!(matches!(last.payload, crate::protocol::TransferPayload::End));
        }
        assert_eq!(fabric.pending(), 0);
    }

    #[test]
    fn left_endpoint_receives_nothing() {
        let mut fabric = LocalFabric::new();
        let a = EndpointId::new(1);
        let b = EndpointId::new(2);
        fabric.join(a);
        fabric.join(b);
        fabric.leave(b);

        fabric.send_to_all(TransferMessage::end(Uuid::new_v4()));
        assert_eq!(fabric.drain(a).len(), 1);
        assert!(fabric.drain(b).is_empty());
    }
}
