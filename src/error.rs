//! Error types for the audio replication core

use thiserror::Error;

use crate::protocol::SessionId;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Unsupported codec configuration: {0}")]
    UnsupportedConfig(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),
}

/// Packet framing errors
#[derive(Error, Debug)]
pub enum FramingError {
    #[error("Truncated buffer: record declares {need} bytes, {have} remain")]
    Truncated { need: usize, have: usize },

    #[error("Trailing bytes after last record: {0}")]
    TrailingBytes(usize),
}

/// Transfer lifecycle errors
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Session {0} is already active")]
    SessionConflict(SessionId),

    #[error("Caller is not the owning endpoint for this stream")]
    NotOwner,

    #[error("Transfer has no packets")]
    EmptyTransfer,
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
