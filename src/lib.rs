//! # Audio Replicator
//!
//! Chunked Opus audio streaming between networked peers: PCM is encoded
//! into discrete Opus packets, packets are wrapped as indexed chunks and
//! paced over an ordered-reliable fabric, and each receiver reassembles the
//! stream losslessly for decoding. A per-space session registry lets
//! decoupled listeners discover who is streaming what without polling.
//!
//! ## Architecture Overview
//!
//! ```text
//!  SENDER ENDPOINT
//!  ┌────────────┐    ┌───────────────┐    ┌──────────────────────┐
//!  │  PCM16     │───►│ OpusAdapter   │───►│ Replicator (outgoing)│
//!  │  samples   │    │ encode frames │    │ header + paced chunks│
//!  └────────────┘    └───────────────┘    └──────────┬───────────┘
//!                                                    │ send_to_authority
//!                                                    ▼
//!                                     ┌──────────────────────────┐
//!                                     │ Transport (authority     │
//!                                     │ fan-out, ordered-reliable│
//!                                     └──────────┬───────────────┘
//!                     ┌──────────────────────────┼─────────────┐
//!                     ▼                          ▼             ▼
//!  EVERY ENDPOINT  ┌──────────────────────┐  ┌─────────┐  ┌─────────┐
//!                  │ Replicator (incoming)│  │   ...   │  │   ...   │
//!                  │ reassemble by index  │  └─────────┘  └─────────┘
//!                  └──────────┬───────────┘
//!                             │ on end-of-stream
//!                             ▼
//!                  ┌──────────────────────┐    ┌──────────────────┐
//!                  │ SessionRegistry      │───►│ subscribers:     │
//!                  │ last sender per      │    │ "who is sending  │
//!                  │ session/participant  │    │  session S?"     │
//!                  └──────────────────────┘    └──────────────────┘
//! ```
//!
//! The core is single-threaded and tick-driven: the host calls
//! [`replicator::Replicator::tick`] once per scheduling step and feeds
//! delivered frames back in. There is no internal locking or timing.

pub mod codec;
pub mod config;
pub mod error;
pub mod framing;
pub mod identity;
pub mod network;
pub mod protocol;
pub mod registry;
pub mod replicator;
pub mod report;
pub mod transfer;

pub use error::{Error, Result};

/// Crate-wide constants
pub mod constants {
    /// Default sample rate for audio processing
    pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

    /// Default channel count (mono)
    pub const DEFAULT_CHANNELS: u8 = 1;

    /// Default Opus bitrate in bits per second
    pub const DEFAULT_BITRATE: u32 = 32_000;

    /// Default frame duration in milliseconds
    pub const DEFAULT_FRAME_MS: u32 = 20;

    /// Default cap on chunks sent per scheduling tick
    pub const DEFAULT_MAX_CHUNKS_PER_TICK: u32 = 32;
}
