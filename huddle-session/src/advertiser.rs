use tracing::warn;

use huddle_types::compat::CompatibilityToken;
use huddle_types::discovery::{DiscoveryInfo, OS_VERSION_KEY, PLATFORM_KEY};
use huddle_types::identity::PeerIdentity;

use crate::delegate::SessionDelegate;
use crate::provider::LocalInfoProvider;

/// Host-side lifecycle: broadcasting presence and answering invitations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiserState {
    Idle,
    Advertising,
    Stopped,
}

/// The host half of the handshake.
///
/// The transport layer broadcasts the advertisement at its native interval;
/// this state machine decides what the advertisement says and whether an
/// incoming invitation joins the session. It never times out on its own;
/// only an explicit `stop` ends advertising.
pub struct Advertiser {
    state: AdvertiserState,
}

impl Advertiser {
    pub fn new() -> Self {
        Self {
            state: AdvertiserState::Idle,
        }
    }

    pub fn start(&mut self) {
        if self.state == AdvertiserState::Idle {
            self.state = AdvertiserState::Advertising;
        }
    }

    pub fn stop(&mut self) {
        self.state = AdvertiserState::Stopped;
    }

    pub fn state(&self) -> AdvertiserState {
        self.state
    }

    pub fn is_advertising(&self) -> bool {
        self.state == AdvertiserState::Advertising
    }

    /// Assemble the advertised DiscoveryInfo: the delegate's contribution
    /// first, then the reserved keys, which always win. An oversized
    /// contribution is dropped (with a warning) rather than propagated, so
    /// the reserved keys still go out.
    pub fn discovery_info(
        &self,
        delegate: &dyn SessionDelegate,
        provider: &dyn LocalInfoProvider,
        token: &CompatibilityToken,
    ) -> DiscoveryInfo {
        let mut info = delegate.contribute_discovery_info();

        let mut with_reserved = info.clone();
        Self::overwrite_reserved(&mut with_reserved, provider, token);
        if let Err(e) = with_reserved.validate() {
            warn!("discovery info contribution dropped: {}", e);
            info = DiscoveryInfo::new();
        }

        Self::overwrite_reserved(&mut info, provider, token);
        info
    }

    fn overwrite_reserved(
        info: &mut DiscoveryInfo,
        provider: &dyn LocalInfoProvider,
        token: &CompatibilityToken,
    ) {
        if let Err(e) = info.set_token(token) {
            // Token serialization is infallible for well-formed tokens;
            // log and advertise without one (browsers will skip us).
            warn!("failed to embed compatibility token: {}", e);
        }
        info.insert(OS_VERSION_KEY, provider.os_version());
        info.insert(PLATFORM_KEY, provider.platform());
    }

    /// Decide an incoming invitation. Only an advertising host accepts;
    /// the delegate may veto, and the default is to accept.
    pub fn handle_invite(
        &self,
        peer: &PeerIdentity,
        context: Option<&[u8]>,
        delegate: &dyn SessionDelegate,
    ) -> bool {
        if self.state != AdvertiserState::Advertising {
            return false;
        }
        delegate.should_accept_invitation(peer, context)
    }
}

impl Default for Advertiser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::NoDelegate;
    use crate::provider::LocalInfoProvider;
    use huddle_types::discovery::COMPATIBILITY_TOKEN_KEY;

    struct FixedInfo;

    impl LocalInfoProvider for FixedInfo {
        fn display_name(&self) -> String {
            "test-host".to_string()
        }
        fn os_version(&self) -> String {
            "6.1".to_string()
        }
        fn platform(&self) -> String {
            "linux".to_string()
        }
    }

    struct ChattyDelegate;

    impl SessionDelegate for ChattyDelegate {
        fn contribute_discovery_info(&self) -> DiscoveryInfo {
            let mut info = DiscoveryInfo::new();
            info.insert("room", "studio");
            // Attempts to squat a reserved key; the system must win.
            info.insert(COMPATIBILITY_TOKEN_KEY, "bogus");
            info
        }
    }

    struct OversizedDelegate;

    impl SessionDelegate for OversizedDelegate {
        fn contribute_discovery_info(&self) -> DiscoveryInfo {
            let mut info = DiscoveryInfo::new();
            info.insert("blob", "x".repeat(1000));
            info
        }
    }

    struct RefusingDelegate;

    impl SessionDelegate for RefusingDelegate {
        fn should_accept_invitation(&self, _peer: &PeerIdentity, _ctx: Option<&[u8]>) -> bool {
            false
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut adv = Advertiser::new();
        assert_eq!(adv.state(), AdvertiserState::Idle);
        adv.start();
        assert!(adv.is_advertising());
        adv.stop();
        assert_eq!(adv.state(), AdvertiserState::Stopped);
        // Stopped is terminal.
        adv.start();
        assert_eq!(adv.state(), AdvertiserState::Stopped);
    }

    #[test]
    fn test_discovery_info_reserved_keys_win() {
        let adv = Advertiser::new();
        let token = CompatibilityToken::local();
        let info = adv.discovery_info(&ChattyDelegate, &FixedInfo, &token);
        assert_eq!(info.get("room"), Some("studio"));
        assert_eq!(info.token(), Some(token));
        assert_eq!(info.get(OS_VERSION_KEY), Some("6.1"));
        assert_eq!(info.get(PLATFORM_KEY), Some("linux"));
    }

    #[test]
    fn test_oversized_contribution_dropped() {
        let adv = Advertiser::new();
        let token = CompatibilityToken::local();
        let info = adv.discovery_info(&OversizedDelegate, &FixedInfo, &token);
        assert_eq!(info.get("blob"), None);
        // Reserved keys still present.
        assert_eq!(info.token(), Some(token));
        assert!(info.validate().is_ok());
    }

    #[test]
    fn test_invite_only_while_advertising() {
        let peer = PeerIdentity::new("alice", vec![1]);
        let mut adv = Advertiser::new();
        assert!(!adv.handle_invite(&peer, None, &NoDelegate));
        adv.start();
        assert!(adv.handle_invite(&peer, None, &NoDelegate));
        adv.stop();
        assert!(!adv.handle_invite(&peer, None, &NoDelegate));
    }

    #[test]
    fn test_delegate_can_refuse_invite() {
        let peer = PeerIdentity::new("alice", vec![1]);
        let mut adv = Advertiser::new();
        adv.start();
        assert!(!adv.handle_invite(&peer, None, &RefusingDelegate));
    }

    #[test]
    fn test_invite_context_reaches_delegate() {
        struct ContextCheck;
        impl SessionDelegate for ContextCheck {
            fn should_accept_invitation(&self, _peer: &PeerIdentity, ctx: Option<&[u8]>) -> bool {
                ctx == Some(b"secret".as_slice())
            }
        }
        let peer = PeerIdentity::new("alice", vec![1]);
        let mut adv = Advertiser::new();
        adv.start();
        assert!(adv.handle_invite(&peer, Some(b"secret"), &ContextCheck));
        assert!(!adv.handle_invite(&peer, Some(b"wrong"), &ContextCheck));
        assert!(!adv.handle_invite(&peer, None, &ContextCheck));
    }
}
