use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::compat::{Compatibility, CompatibilityToken};
use crate::constants::MAX_DISCOVERY_INFO_BYTES;
use crate::error::HuddleError;

/// Reserved key carrying the JSON-encoded compatibility token.
pub const COMPATIBILITY_TOKEN_KEY: &str = "compatibility-token";

/// Reserved key carrying the advertiser's OS version string.
pub const OS_VERSION_KEY: &str = "os-version";

/// Reserved key carrying the advertiser's platform name.
pub const PLATFORM_KEY: &str = "platform";

/// Small key-value metadata attached to an advertisement.
///
/// Applications may contribute entries through the delegate hook; the
/// reserved keys above are always overwritten by the system afterwards.
/// Backed by a BTreeMap so the encoded size is deterministic.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct DiscoveryInfo {
    entries: BTreeMap<String, String>,
}

impl DiscoveryInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encoded size in bytes: each entry counts as `key=value` plus a
    /// separator, the representation advertisement records use.
    pub fn encoded_len(&self) -> usize {
        self.entries
            .iter()
            .map(|(k, v)| k.len() + v.len() + 2)
            .sum()
    }

    /// Check the encoded size against the advertisement ceiling.
    pub fn validate(&self) -> Result<(), HuddleError> {
        let size = self.encoded_len();
        if size > MAX_DISCOVERY_INFO_BYTES {
            return Err(HuddleError::DiscoveryInfoTooLarge {
                size,
                max: MAX_DISCOVERY_INFO_BYTES,
            });
        }
        Ok(())
    }

    /// Embed a compatibility token under its reserved key.
    pub fn set_token(&mut self, token: &CompatibilityToken) -> Result<(), HuddleError> {
        let json = token.to_json()?;
        self.insert(COMPATIBILITY_TOKEN_KEY, json);
        Ok(())
    }

    /// Parse the embedded compatibility token, if present and well-formed.
    pub fn token(&self) -> Option<CompatibilityToken> {
        self.get(COMPATIBILITY_TOKEN_KEY)
            .and_then(|s| CompatibilityToken::from_json(s).ok())
    }

    /// Whether the embedded token is compatible with `local`. A missing or
    /// unparsable token counts as incompatible.
    pub fn is_compatible_with(&self, local: &CompatibilityToken) -> bool {
        match self.token() {
            Some(token) => token.compatibility_with(local) == Compatibility::Compatible,
            None => false,
        }
    }
}

impl From<BTreeMap<String, String>> for DiscoveryInfo {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }
}
