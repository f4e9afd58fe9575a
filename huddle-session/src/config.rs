use std::time::Duration;

use huddle_types::constants::DEFAULT_INVITE_TIMEOUT;
use huddle_types::error::HuddleError;
use huddle_types::name::{validate_peer_name, validate_service_name};
use huddle_types::role::SessionRole;

/// Configuration for a session coordinator.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Service name peers advertise and browse for. Must be short lowercase
    /// ASCII (alphanumeric + hyphens, at most 15 characters).
    pub service_name: String,
    /// Which of advertiser/browser this coordinator runs.
    pub role: SessionRole,
    /// Display name for the local peer. `None` derives one from the local
    /// info provider (host name). Must be non-empty and at most 63 UTF-8
    /// bytes.
    pub peer_name: Option<String>,
    /// Retained for API compatibility: this transport stack encrypts every
    /// connection (Noise) regardless, so `false` never weakens the link.
    pub require_encryption: bool,
    /// How long invitations and other direct requests (ownership requests
    /// included) may remain unanswered. Expiry is the only cancellation.
    pub invite_timeout: Duration,
    /// TCP port to listen on. 0 picks an ephemeral port.
    pub port: u16,
    /// Optional keypair seed (32 bytes) for a deterministic peer identity.
    /// If None, generates random.
    pub keypair_seed: Option<[u8; 32]>,
}

impl SessionConfig {
    pub fn new(service_name: impl Into<String>, role: SessionRole) -> Self {
        Self {
            service_name: service_name.into(),
            role,
            peer_name: None,
            require_encryption: true,
            invite_timeout: DEFAULT_INVITE_TIMEOUT,
            port: 0,
            keypair_seed: None,
        }
    }

    /// Validate construction parameters. Called by the coordinator before
    /// any network state is created, so a failure cannot leave a
    /// half-initialized session behind.
    pub fn validate(&self) -> Result<(), HuddleError> {
        validate_service_name(&self.service_name)?;
        if let Some(name) = &self.peer_name {
            validate_peer_name(name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::new("demo", SessionRole::Both);
        assert!(config.require_encryption);
        assert_eq!(config.invite_timeout, DEFAULT_INVITE_TIMEOUT);
        assert_eq!(config.port, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_service_name_rejected() {
        let config = SessionConfig::new("Not Valid!", SessionRole::Both);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_peer_name_rejected() {
        let mut config = SessionConfig::new("demo", SessionRole::Host);
        config.peer_name = Some(String::new());
        assert!(config.validate().is_err());

        config.peer_name = Some("a".repeat(64));
        assert!(config.validate().is_err());

        config.peer_name = Some("Kitchen iPad".to_string());
        assert!(config.validate().is_ok());
    }
}
