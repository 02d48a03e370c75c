//! Error types for firemesh mesh operations.
//!
//! Covers inbound message validation and both transport primitives. None of
//! these are fatal to a running node except a failed socket bind at startup.

use thiserror::Error;

/// Errors that can occur in mesh operations.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Inbound bytes are not a usable mesh message
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Network I/O errors
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Uplink connect or send exceeded its time bound
    #[error("Uplink to {destination} timed out after {timeout_ms} ms")]
    UplinkTimeout {
        /// Uplink target
        destination: String,
        /// Time bound that expired
        timeout_ms: u64,
    },

    /// An in-process medium has no remaining endpoints
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// External sensor collaborator failed
    #[error("Sensor error: {0}")]
    Sensor(String),
}

/// Result type for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;
