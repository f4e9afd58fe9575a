use crate::constants::{MAX_PEER_NAME_BYTES, MAX_SERVICE_NAME_LEN};
use crate::error::HuddleError;

/// Validate a service name: lowercase alphanumeric + hyphens, 1-15 chars,
/// no leading/trailing hyphens. This is the constraint local-network service
/// registration imposes on service type labels.
pub fn validate_service_name(name: &str) -> Result<(), HuddleError> {
    if name.is_empty() || name.len() > MAX_SERVICE_NAME_LEN {
        return Err(HuddleError::InvalidServiceName(format!(
            "service name must be 1-{} characters, got {}",
            MAX_SERVICE_NAME_LEN,
            name.len()
        )));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(HuddleError::InvalidServiceName(
            "service name must not start or end with a hyphen".to_string(),
        ));
    }
    for c in name.chars() {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
            return Err(HuddleError::InvalidServiceName(format!(
                "service name must be lowercase alphanumeric or hyphens, found '{}'",
                c
            )));
        }
    }
    Ok(())
}

/// Validate a peer display name: non-empty, at most 63 UTF-8 bytes.
pub fn validate_peer_name(name: &str) -> Result<(), HuddleError> {
    if name.is_empty() {
        return Err(HuddleError::InvalidPeerName(
            "peer name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_PEER_NAME_BYTES {
        return Err(HuddleError::InvalidPeerName(format!(
            "peer name must be at most {} UTF-8 bytes, got {}",
            MAX_PEER_NAME_BYTES,
            name.len()
        )));
    }
    Ok(())
}
