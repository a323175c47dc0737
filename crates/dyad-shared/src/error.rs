use thiserror::Error;

/// Errors produced at the wire boundary.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A frame could not be decoded into a known event.
    #[error("Malformed event frame: {0}")]
    Decode(#[from] serde_json::Error),

    /// An id string did not parse.
    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] uuid::Error),
}
