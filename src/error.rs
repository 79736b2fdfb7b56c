//! Error types for the tutor voice session

use thiserror::Error;

/// Result type alias for voice session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a voice session
#[derive(Debug, Error)]
pub enum Error {
    /// Microphone access refused by the user or OS
    #[error("media access denied: {0}")]
    MediaAccessDenied(String),

    /// Live connection failed to open or dropped unexpectedly
    #[error("connection error: {0}")]
    Connection(String),

    /// Malformed inbound audio payload
    #[error("decode error: {0}")]
    Decode(String),

    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Session used from an invalid state
    #[error("session error: {0}")]
    Session(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Self::Decode(e.to_string())
    }
}
