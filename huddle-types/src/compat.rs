use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::PROTOCOL_VERSION;
use crate::error::HuddleError;

/// Verdict of comparing two compatibility tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    Compatible,
    Incompatible,
}

/// Opaque version marker exchanged during discovery so that incompatible
/// peers are rejected before a session forms.
///
/// Carried inside DiscoveryInfo as a JSON string under the reserved
/// `compatibility-token` key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct CompatibilityToken {
    pub protocol_version: u8,
}

impl CompatibilityToken {
    /// The token for this build of the protocol.
    pub fn local() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
        }
    }

    /// Compare against another token. Tokens are compatible iff they carry
    /// the same protocol version.
    pub fn compatibility_with(&self, other: &CompatibilityToken) -> Compatibility {
        if self.protocol_version == other.protocol_version {
            Compatibility::Compatible
        } else {
            Compatibility::Incompatible
        }
    }

    /// Serialize to the JSON string embedded in DiscoveryInfo.
    pub fn to_json(&self) -> Result<String, HuddleError> {
        serde_json::to_string(self).map_err(|e| HuddleError::InvalidToken {
            reason: e.to_string(),
        })
    }

    /// Parse a token back out of its DiscoveryInfo JSON string.
    pub fn from_json(s: &str) -> Result<Self, HuddleError> {
        serde_json::from_str(s).map_err(|e| HuddleError::InvalidToken {
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_matches_itself() {
        let token = CompatibilityToken::local();
        assert_eq!(
            token.compatibility_with(&CompatibilityToken::local()),
            Compatibility::Compatible
        );
    }

    #[test]
    fn test_version_mismatch_incompatible() {
        let ours = CompatibilityToken::local();
        let theirs = CompatibilityToken {
            protocol_version: ours.protocol_version + 1,
        };
        assert_eq!(
            ours.compatibility_with(&theirs),
            Compatibility::Incompatible
        );
    }

    #[test]
    fn test_json_roundtrip_preserves_verdict() {
        let ours = CompatibilityToken::local();
        let json = ours.to_json().unwrap();
        let parsed = CompatibilityToken::from_json(&json).unwrap();
        // The round-tripped token must yield the identical verdict as a
        // direct in-process comparison.
        assert_eq!(
            parsed.compatibility_with(&ours),
            ours.compatibility_with(&ours)
        );
        assert_eq!(parsed, ours);
    }

    #[test]
    fn test_garbage_json_rejected() {
        assert!(CompatibilityToken::from_json("not json").is_err());
        assert!(CompatibilityToken::from_json("{}").is_err());
    }
}
