//! Error types for the streaming pipelines

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Codec errors, recoverable per frame unless raised at session start
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoder initialization failed: {0}")]
    EncoderInit(String),

    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Invalid frame size: {0} samples")]
    InvalidFrameSize(usize),

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),
}

/// Configuration errors, fatal to session start
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unsupported channel count: {0} (only mono or stereo)")]
    UnsupportedChannels(u16),

    #[error("Frame size {0} is not a legal Opus frame size")]
    InvalidFrameSize(u32),

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

/// Transport boundary errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Peer disconnected")]
    Disconnected,

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Session header framing errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Packet too short for header: {got} of {want} declared bytes")]
    Truncated { want: usize, got: usize },

    #[error("Declared header length {0} is not usable")]
    BadLength(usize),

    #[error("Unexpected field length {got} (expected {want})")]
    BadFieldLength { want: usize, got: usize },
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
