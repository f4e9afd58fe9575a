use thiserror::Error;

/// Errors that can occur in the session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Invalid construction parameters. Fatal: no coordinator is created.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// A general network-level error.
    #[error("network error: {reason}")]
    Network { reason: String },

    /// Failed to encode or decode a message.
    #[error("codec error: {reason}")]
    Codec { reason: String },

    /// Message exceeds maximum allowed size.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Peer is running an incompatible protocol version.
    #[error("protocol version mismatch: peer sent v{peer}, we run v{ours}")]
    VersionMismatch { peer: u8, ours: u8 },

    /// The coordinator has been torn down.
    #[error("session closed")]
    Closed,

    /// A stream or resource transfer did not complete.
    #[error("transfer failed: {reason}")]
    TransferFailed { reason: String },
}

impl From<huddle_types::error::HuddleError> for SessionError {
    fn from(e: huddle_types::error::HuddleError) -> Self {
        SessionError::Config {
            reason: e.to_string(),
        }
    }
}

/// Outcome of a failed ownership request, delivered through the request's
/// completion. Exactly one of these (or success) is observed per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OwnershipError {
    /// The current owner refused to release the object.
    #[error("ownership denied")]
    Denied,

    /// No response within the transport's timeout window.
    #[error("ownership request timed out")]
    TimedOut,

    /// The coordinator was torn down before the request resolved.
    #[error("session closed")]
    SessionClosed,
}
