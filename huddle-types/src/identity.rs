use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// A stable identifier for a node in a session.
///
/// The display name is what applications address peers by; the opaque id is
/// the transport's stable peer identifier and is the sole basis for
/// equality. Two peers may claim the same display name, but they are still
/// distinct identities.
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct PeerIdentity {
    display_name: String,
    opaque_id: Vec<u8>,
}

impl PeerIdentity {
    pub fn new(display_name: impl Into<String>, opaque_id: Vec<u8>) -> Self {
        Self {
            display_name: display_name.into(),
            opaque_id,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn opaque_id(&self) -> &[u8] {
        &self.opaque_id
    }
}

impl PartialEq for PeerIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.opaque_id == other.opaque_id
    }
}

impl Eq for PeerIdentity {}

impl std::hash::Hash for PeerIdentity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.opaque_id.hash(state);
    }
}

impl std::fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.display_name)
    }
}
