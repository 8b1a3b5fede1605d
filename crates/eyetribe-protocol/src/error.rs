/// Errors that can occur while encoding or decoding tracker messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The payload is not a structurally valid tracker message.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// JSON serialization error on an outbound message.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A reply lacked a field the caller asked for.
    #[error("missing field '{0}' in reply")]
    MissingField(&'static str),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
