/// Wire protocol version carried in every framed message. Re-exported from
/// huddle-types so the codec and the compatibility token always agree.
pub use huddle_types::constants::PROTOCOL_VERSION;

/// Direct request-response protocol for a given service name.
pub fn direct_protocol(service_name: &str) -> String {
    format!("/huddle/{}/1.0.0", service_name)
}

/// Gossip topic carrying unreliable broadcast payloads for a service.
pub fn data_topic(service_name: &str) -> String {
    format!("huddle/{}/data", service_name)
}

/// Protocol string reported through identify.
pub fn identify_protocol(service_name: &str) -> String {
    format!("/huddle/{}/id/1.0.0", service_name)
}

/// Agent string reported through identify.
pub fn agent_version() -> String {
    format!("huddle/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_names_scoped_by_service() {
        assert_eq!(direct_protocol("demo"), "/huddle/demo/1.0.0");
        assert_eq!(data_topic("demo"), "huddle/demo/data");
        assert_ne!(direct_protocol("demo"), direct_protocol("other"));
    }

    #[test]
    fn test_agent_version_prefix() {
        assert!(agent_version().starts_with("huddle/"));
    }
}
