use huddle_types::identity::PeerIdentity;
use libp2p::PeerId;
use std::collections::HashMap;

/// The live set of joined peers.
///
/// The `joined` map is the authoritative in-process view, updated on every
/// join/leave event. The display-name index is only a lookup cache: a miss
/// (or a stale hit) clears and rebuilds it from `joined`, so it can never
/// drift permanently out of sync.
#[derive(Debug, Default)]
pub struct PeerRoster {
    joined: HashMap<PeerId, PeerIdentity>,
    by_name: HashMap<String, PeerId>,
}

impl PeerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a joined peer. Replaces any previous entry for the same peer id
    /// and claims the display name in the cache (display names are unique;
    /// a later peer with the same name takes the name over).
    pub fn insert(&mut self, peer_id: PeerId, identity: PeerIdentity) {
        self.by_name
            .insert(identity.display_name().to_string(), peer_id);
        self.joined.insert(peer_id, identity);
    }

    /// Remove a peer, returning its identity if it was joined.
    pub fn remove(&mut self, peer_id: &PeerId) -> Option<PeerIdentity> {
        let identity = self.joined.remove(peer_id)?;
        // Only drop the cache entry if it still points at this peer.
        if self.by_name.get(identity.display_name()) == Some(peer_id) {
            self.by_name.remove(identity.display_name());
        }
        Some(identity)
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.joined.contains_key(peer_id)
    }

    pub fn identity(&self, peer_id: &PeerId) -> Option<&PeerIdentity> {
        self.joined.get(peer_id)
    }

    /// Look up a peer by display name.
    ///
    /// Checks the cache first; on a miss or a stale entry the cache is
    /// recalculated from the joined map before answering.
    pub fn find_by_name(&mut self, name: &str) -> Option<PeerId> {
        if let Some(peer_id) = self.by_name.get(name) {
            if self.joined.contains_key(peer_id) {
                return Some(*peer_id);
            }
        }
        // Cache is out of sync; rebuild it from the authoritative map.
        self.by_name.clear();
        for (peer_id, identity) in &self.joined {
            self.by_name
                .insert(identity.display_name().to_string(), *peer_id);
        }
        self.by_name.get(name).copied()
    }

    /// All joined identities, ordered by display name.
    pub fn identities(&self) -> Vec<PeerIdentity> {
        let mut out: Vec<_> = self.joined.values().cloned().collect();
        out.sort_by(|a, b| a.display_name().cmp(b.display_name()));
        out
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.joined.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.joined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joined.is_empty()
    }
}
