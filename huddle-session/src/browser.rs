use huddle_types::discovery::DiscoveryInfo;
use huddle_types::identity::PeerIdentity;
use libp2p::PeerId;
use std::collections::HashMap;

use crate::delegate::SessionDelegate;

/// Peer-side lifecycle: scanning for advertisers and issuing invitations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserState {
    Idle,
    Browsing,
    Stopped,
}

/// Handshake progress for a discovered peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Advertisement seen; dialing.
    Discovered,
    /// Connected; discovery info requested.
    Probed,
    /// Invitation sent; awaiting the advertiser's decision.
    Invited,
    /// Filtered out (incompatible or delegate veto); ignored until its
    /// advertisement expires.
    Skipped,
}

#[derive(Debug)]
struct Tracked {
    phase: Phase,
    display_name: Option<String>,
}

/// The peer half of the handshake.
///
/// Tracks per-peer progress so that an already-connected or already-pending
/// peer is never dialed or invited twice. Browsing pauses after the first
/// successful join; discoveries arriving while paused are ignored.
pub struct Browser {
    state: BrowserState,
    tracked: HashMap<PeerId, Tracked>,
}

impl Browser {
    pub fn new() -> Self {
        Self {
            state: BrowserState::Idle,
            tracked: HashMap::new(),
        }
    }

    pub fn start(&mut self) {
        if self.state == BrowserState::Idle {
            self.state = BrowserState::Browsing;
        }
    }

    pub fn stop(&mut self) {
        self.state = BrowserState::Stopped;
        self.tracked.clear();
    }

    pub fn state(&self) -> BrowserState {
        self.state
    }

    pub fn is_browsing(&self) -> bool {
        self.state == BrowserState::Browsing
    }

    /// An advertisement appeared. Returns true when the peer should be
    /// dialed: browsing, not already joined, and not already in progress.
    pub fn on_discovered(&mut self, peer: PeerId, already_joined: bool) -> bool {
        if self.state != BrowserState::Browsing || already_joined {
            return false;
        }
        if self.tracked.contains_key(&peer) {
            return false;
        }
        self.tracked.insert(
            peer,
            Tracked {
                phase: Phase::Discovered,
                display_name: None,
            },
        );
        true
    }

    /// A connection to a discovered peer came up. Returns true when the
    /// discovery probe should be sent (exactly once per handshake).
    pub fn should_probe(&mut self, peer: &PeerId) -> bool {
        match self.tracked.get_mut(peer) {
            Some(tracked) if tracked.phase == Phase::Discovered => {
                tracked.phase = Phase::Probed;
                true
            }
            _ => false,
        }
    }

    /// The advertiser answered the probe. Consults the delegate (default:
    /// compatibility token gate) and returns true when an invitation should
    /// be issued.
    pub fn on_discovery_reply(
        &mut self,
        peer: &PeerId,
        identity: &PeerIdentity,
        info: &DiscoveryInfo,
        delegate: &dyn SessionDelegate,
    ) -> bool {
        let Some(tracked) = self.tracked.get_mut(peer) else {
            return false;
        };
        if tracked.phase != Phase::Probed {
            return false;
        }
        tracked.display_name = Some(identity.display_name().to_string());
        if delegate.should_invite_peer(identity, info) {
            tracked.phase = Phase::Invited;
            true
        } else {
            // Incompatible peers are a filtering decision, not an error.
            tracked.phase = Phase::Skipped;
            false
        }
    }

    /// The invitation was accepted; the peer is joining the roster.
    pub fn on_invite_accepted(&mut self, peer: &PeerId) {
        self.tracked.remove(peer);
    }

    /// The handshake with this peer fell through: the probe failed, or the
    /// invitation was declined or expired (a silent non-join). The peer may
    /// be re-invited if its advertisement is seen again.
    pub fn on_handshake_failed(&mut self, peer: &PeerId) {
        self.tracked.remove(peer);
    }

    /// The connection dropped mid-handshake.
    pub fn on_disconnected(&mut self, peer: &PeerId) {
        self.tracked.remove(peer);
    }

    /// A peer joined the session (either side of the handshake). Pauses
    /// browsing to avoid duplicate invites in a busy discovery environment.
    pub fn on_joined(&mut self) {
        if self.state == BrowserState::Browsing {
            self.state = BrowserState::Stopped;
            self.tracked.clear();
        }
    }

    /// An advertisement expired without the peer ever joining. Returns the
    /// last known display name (if any) when the loss should be reported.
    pub fn on_expired(&mut self, peer: &PeerId) -> Option<Option<String>> {
        self.tracked
            .remove(peer)
            .map(|tracked| tracked.display_name)
    }
}

impl Default for Browser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::NoDelegate;
    use huddle_types::compat::CompatibilityToken;

    fn compatible_info() -> DiscoveryInfo {
        let mut info = DiscoveryInfo::new();
        info.set_token(&CompatibilityToken::local()).unwrap();
        info
    }

    fn identity_for(peer: &PeerId, name: &str) -> PeerIdentity {
        PeerIdentity::new(name, peer.to_bytes())
    }

    #[test]
    fn test_full_handshake_walk() {
        let mut browser = Browser::new();
        browser.start();
        let peer = PeerId::random();

        assert!(browser.on_discovered(peer, false));
        // Re-discovery while in progress must not dial again.
        assert!(!browser.on_discovered(peer, false));

        assert!(browser.should_probe(&peer));
        assert!(!browser.should_probe(&peer));

        let identity = identity_for(&peer, "alice");
        assert!(browser.on_discovery_reply(&peer, &identity, &compatible_info(), &NoDelegate));

        browser.on_invite_accepted(&peer);
        // Handshake state is gone.
        assert!(!browser.should_probe(&peer));
    }

    #[test]
    fn test_idle_and_stopped_ignore_discoveries() {
        let mut browser = Browser::new();
        let peer = PeerId::random();
        assert!(!browser.on_discovered(peer, false));
        browser.start();
        browser.stop();
        assert!(!browser.on_discovered(peer, false));
    }

    #[test]
    fn test_already_joined_peer_not_dialed() {
        let mut browser = Browser::new();
        browser.start();
        let peer = PeerId::random();
        assert!(!browser.on_discovered(peer, true));
    }

    #[test]
    fn test_incompatible_peer_skipped_until_expiry() {
        let mut browser = Browser::new();
        browser.start();
        let peer = PeerId::random();
        browser.on_discovered(peer, false);
        browser.should_probe(&peer);

        let identity = identity_for(&peer, "alice");
        let empty = DiscoveryInfo::new(); // no token: incompatible
        assert!(!browser.on_discovery_reply(&peer, &identity, &empty, &NoDelegate));

        // Still tracked as skipped: re-discovery does not restart the
        // handshake until the advertisement expires.
        assert!(!browser.on_discovered(peer, false));
        assert_eq!(browser.on_expired(&peer), Some(Some("alice".to_string())));
        assert!(browser.on_discovered(peer, false));
    }

    #[test]
    fn test_delegate_veto_overrides_compatible_token() {
        struct VetoAll;
        impl SessionDelegate for VetoAll {
            fn should_invite_peer(&self, _peer: &PeerIdentity, _info: &DiscoveryInfo) -> bool {
                false
            }
        }
        let mut browser = Browser::new();
        browser.start();
        let peer = PeerId::random();
        browser.on_discovered(peer, false);
        browser.should_probe(&peer);
        let identity = identity_for(&peer, "alice");
        assert!(!browser.on_discovery_reply(&peer, &identity, &compatible_info(), &VetoAll));
    }

    #[test]
    fn test_invite_failure_allows_retry_on_rediscovery() {
        let mut browser = Browser::new();
        browser.start();
        let peer = PeerId::random();
        browser.on_discovered(peer, false);
        browser.should_probe(&peer);
        let identity = identity_for(&peer, "alice");
        browser.on_discovery_reply(&peer, &identity, &compatible_info(), &NoDelegate);

        browser.on_handshake_failed(&peer);
        assert!(browser.on_discovered(peer, false));
    }

    #[test]
    fn test_pause_after_join() {
        let mut browser = Browser::new();
        browser.start();
        let other = PeerId::random();
        browser.on_discovered(other, false);

        browser.on_joined();
        assert!(!browser.is_browsing());
        // Pending handshakes are dropped along with the pause.
        assert!(!browser.should_probe(&other));
    }

    #[test]
    fn test_expired_unknown_peer_reports_nothing() {
        let mut browser = Browser::new();
        browser.start();
        assert_eq!(browser.on_expired(&PeerId::random()), None);
    }
}
