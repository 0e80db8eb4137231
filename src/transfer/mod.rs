//! Per-session transfer state
//!
//! Sender-side pacing state machine and receiver-side reassembly.

pub mod incoming;
pub mod outgoing;

pub use incoming::IncomingTransfer;
pub use outgoing::{OutgoingTransfer, TransferPhase};
