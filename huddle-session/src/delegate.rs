use huddle_types::compat::CompatibilityToken;
use huddle_types::discovery::DiscoveryInfo;
use huddle_types::identity::PeerIdentity;
use huddle_types::wire::ObjectId;

use crate::error::SessionError;
use crate::transfer::InboundStream;

/// Application hooks for session events and policy decisions.
///
/// Every method has a documented default, so implementers override only what
/// they care about. All methods are invoked from the coordinator's event
/// loop: they should return promptly and must not call back into the
/// coordinator synchronously.
pub trait SessionDelegate: Send + Sync {
    /// A payload arrived from a joined peer. Default: ignore.
    fn on_data_received(&self, _payload: &[u8], _from: &PeerIdentity) {}

    /// A peer joined the session. Fires exactly once per connection
    /// lifetime, always before any `on_data_received` from that peer.
    /// Default: ignore.
    fn on_peer_joined(&self, _peer: &PeerIdentity) {}

    /// A joined peer disconnected. Fires at most once per connection
    /// lifetime. Default: ignore.
    fn on_peer_left(&self, _peer: &PeerIdentity) {}

    /// A discovered peer's advertisement expired before it ever joined.
    /// Default: ignore.
    fn on_peer_lost(&self, _peer: &PeerIdentity) {}

    /// Whether to invite a discovered peer, given its advertised info.
    /// Default: invite if and only if the peer's compatibility token is
    /// compatible with ours.
    fn should_invite_peer(&self, _peer: &PeerIdentity, info: &DiscoveryInfo) -> bool {
        info.is_compatible_with(&CompatibilityToken::local())
    }

    /// Whether to accept an incoming invitation. `context` is whatever the
    /// inviter attached. Default: accept.
    fn should_accept_invitation(&self, _peer: &PeerIdentity, _context: Option<&[u8]>) -> bool {
        true
    }

    /// Extra entries for the advertised DiscoveryInfo. Reserved keys
    /// (compatibility token, OS version, platform) are overwritten by the
    /// coordinator after this hook runs. Default: empty.
    fn contribute_discovery_info(&self) -> DiscoveryInfo {
        DiscoveryInfo::new()
    }

    /// A peer opened a named byte stream toward us. Frames arrive on the
    /// stream's channel in order. Default: drop the stream.
    fn on_stream_received(&self, _stream: InboundStream, _from: &PeerIdentity) {}

    /// A resource transfer started. `len` is the total size the sender
    /// declared. Default: ignore.
    fn on_resource_started(&self, _name: &str, _from: &PeerIdentity, _len: u64) {}

    /// A resource transfer finished, with the assembled bytes or the reason
    /// it failed. Default: ignore.
    fn on_resource_finished(
        &self,
        _name: &str,
        _from: &PeerIdentity,
        _result: Result<Vec<u8>, SessionError>,
    ) {
    }

    /// Policy gate on a newly established connection, on top of the
    /// transport's own authenticated encryption. Default: trust every peer.
    /// This default is deliberately permissive; applications that need peer
    /// allow-listing must override it.
    fn should_trust_peer(&self, _peer: &PeerIdentity) -> bool {
        true
    }

    /// Whether to hand ownership of a locally owned object to `requester`.
    /// Default: grant.
    fn should_grant_ownership(&self, _object: &ObjectId, _requester: &PeerIdentity) -> bool {
        true
    }
}

/// A delegate that accepts every default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelegate;

impl SessionDelegate for NoDelegate {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_invite_policy_follows_token() {
        let delegate = NoDelegate;
        let peer = PeerIdentity::new("alice", vec![1]);

        let mut compatible = DiscoveryInfo::new();
        compatible.set_token(&CompatibilityToken::local()).unwrap();
        assert!(delegate.should_invite_peer(&peer, &compatible));

        let empty = DiscoveryInfo::new();
        assert!(!delegate.should_invite_peer(&peer, &empty));

        let mut mismatched = DiscoveryInfo::new();
        mismatched
            .set_token(&CompatibilityToken {
                protocol_version: CompatibilityToken::local().protocol_version + 1,
            })
            .unwrap();
        assert!(!delegate.should_invite_peer(&peer, &mismatched));
    }

    #[test]
    fn test_default_accept_and_trust() {
        let delegate = NoDelegate;
        let peer = PeerIdentity::new("alice", vec![1]);
        assert!(delegate.should_accept_invitation(&peer, None));
        assert!(delegate.should_trust_peer(&peer));
        assert!(delegate.should_grant_ownership(&[0u8; 32], &peer));
    }
}
