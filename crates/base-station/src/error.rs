//! Error types for the base station.

use firemesh_mesh::MeshError;
use thiserror::Error;

/// Errors raised while receiving and recording uplinked messages.
#[derive(Debug, Error)]
pub enum BaseError {
    /// Uplinked bytes are not a mesh message
    #[error("Malformed uplink: {0}")]
    Malformed(#[from] MeshError),

    /// Peer closed the connection without sending anything
    #[error("Connection closed without data")]
    EmptyConnection,

    /// Peer sent more than the per-message limit
    #[error("Uplink exceeds {0} bytes")]
    Oversized(usize),

    /// Peer did not finish sending within the receive timeout
    #[error("Receive timed out after {0} ms")]
    ReceiveTimeout(u64),

    #[error("Incident transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("Incident backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A mesh message that cannot become an incident.
#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("Message payload is {0:?}, not an alert")]
    NotAnAlert(String),

    /// Payload says `alert` but its body does not decode as one
    #[error("Alert payload does not decode")]
    MalformedAlert,

    #[error("Message is missing required field `{0}`")]
    MissingField(&'static str),
}

/// Incident backend failures. All are reported, none are fatal.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Backend could not be reached or did not answer in time
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Backend answered with something other than a creation acknowledgment
    #[error("Backend rejected incident with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Document store failure
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored data that no longer decodes
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Incident not found: {0}")]
    NotFound(String),
}

/// Result type for base station operations.
pub type BaseResult<T> = Result<T, BaseError>;
