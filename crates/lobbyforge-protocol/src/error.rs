//! Error types for the protocol layer.

/// Errors raised while building or (de)serializing session data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a value into bytes failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes could not be parsed back into the expected type.
    ///
    /// On a shared LAN this is usually a beacon from an incompatible
    /// build, or a truncated datagram.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A parameter block violates its own constraints, e.g. a session
    /// with zero public connections or a search capped at zero results.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}
