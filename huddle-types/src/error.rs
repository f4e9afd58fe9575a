use thiserror::Error;

/// Validation and configuration errors shared across the huddle crates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HuddleError {
    /// The service name does not satisfy the transport naming constraint.
    #[error("invalid service name: {0}")]
    InvalidServiceName(String),

    /// The peer display name is empty or too long.
    #[error("invalid peer name: {0}")]
    InvalidPeerName(String),

    /// The encoded DiscoveryInfo map exceeds the advertisement ceiling.
    #[error("discovery info too large: {size} bytes (max {max})")]
    DiscoveryInfoTooLarge { size: usize, max: usize },

    /// A compatibility token failed to serialize or parse.
    #[error("invalid compatibility token: {reason}")]
    InvalidToken { reason: String },
}
