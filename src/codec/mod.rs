//! Opus codec adapter
//!
//! Turns interleaved PCM16 into discrete encoded packets and back.

pub mod adapter;

pub use adapter::{CodecStats, OpusAdapter};
