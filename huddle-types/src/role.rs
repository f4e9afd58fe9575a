use serde::{Deserialize, Serialize};

/// What a coordinator does on the network.
///
/// A `Host` advertises and accepts join invitations, a `Peer` browses for
/// advertisers and issues invitations, and `Both` does both so that every
/// participant is equal. Fixed for the coordinator's lifetime; to change
/// role, tear the coordinator down and build a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    Host,
    Peer,
    Both,
}

impl SessionRole {
    /// Whether this role carries host responsibilities (advertising,
    /// accepting invitations).
    pub fn is_host(&self) -> bool {
        matches!(self, SessionRole::Host | SessionRole::Both)
    }

    /// Whether this role carries peer responsibilities (browsing, issuing
    /// invitations).
    pub fn is_peer(&self) -> bool {
        matches!(self, SessionRole::Peer | SessionRole::Both)
    }

    /// Short lowercase identifier (for CLI/config).
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionRole::Host => "host",
            SessionRole::Peer => "peer",
            SessionRole::Both => "both",
        }
    }

    /// Parse from a string identifier.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "host" => Some(SessionRole::Host),
            "peer" => Some(SessionRole::Peer),
            "both" => Some(SessionRole::Both),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
