use libp2p::gossipsub;
use libp2p::identity::Keypair;
use libp2p::request_response;
use libp2p::swarm::NetworkBehaviour;
use libp2p::StreamProtocol;
use libp2p::{identify, mdns};
use std::time::Duration;

use crate::codec::HuddleCodec;
use crate::config::SessionConfig;
use crate::protocol;

/// Combined network behaviour for a huddle session.
#[derive(NetworkBehaviour)]
pub struct HuddleBehaviour {
    /// mDNS advertisement and discovery on the local network.
    pub mdns: mdns::tokio::Behaviour,
    /// Gossipsub for unreliable broadcast payloads.
    pub gossipsub: gossipsub::Behaviour,
    /// Request-response for the handshake, direct messaging, and ownership
    /// negotiation.
    pub direct: request_response::Behaviour<HuddleCodec>,
    /// Identify protocol for peer identification.
    pub identify: identify::Behaviour,
}

/// Build a HuddleBehaviour from a keypair and the session configuration.
///
/// Returns `Result<HuddleBehaviour, Box<dyn Error + Send + Sync>>` to conform
/// to the `TryIntoBehaviour` trait expected by `SwarmBuilder::with_behaviour`.
pub fn build_behaviour(
    keypair: &Keypair,
    config: &SessionConfig,
) -> Result<HuddleBehaviour, Box<dyn std::error::Error + Send + Sync>> {
    let local_peer_id = keypair.public().to_peer_id();

    // --- mDNS ---
    let mdns = mdns::tokio::Behaviour::new(mdns::Config::default(), local_peer_id)
        .map_err(|e| format!("mdns behaviour: {}", e))?;

    // --- Gossipsub ---
    let message_id_fn = |message: &gossipsub::Message| {
        // Deduplicate based on content hash.
        let hash = blake3::hash(&message.data);
        gossipsub::MessageId::from(hash.as_bytes().to_vec())
    };

    let gossipsub_config = gossipsub::ConfigBuilder::default()
        .heartbeat_interval(Duration::from_secs(1))
        .validation_mode(gossipsub::ValidationMode::Strict)
        .message_id_fn(message_id_fn)
        .build()
        .map_err(|e| format!("gossipsub config: {}", e))?;

    let gossipsub = gossipsub::Behaviour::new(
        gossipsub::MessageAuthenticity::Signed(keypair.clone()),
        gossipsub_config,
    )
    .map_err(|e| format!("gossipsub behaviour: {}", e))?;

    // --- Request-Response ---
    let rr_protocol =
        StreamProtocol::try_from_owned(protocol::direct_protocol(&config.service_name))
            .map_err(|e| format!("invalid protocol: {:?}", e))?;

    let direct = request_response::Behaviour::with_codec(
        HuddleCodec,
        [(rr_protocol, request_response::ProtocolSupport::Full)],
        request_response::Config::default().with_request_timeout(config.invite_timeout),
    );

    // --- Identify ---
    let identify = identify::Behaviour::new(
        identify::Config::new(
            protocol::identify_protocol(&config.service_name),
            keypair.public(),
        )
        .with_agent_version(protocol::agent_version()),
    );

    Ok(HuddleBehaviour {
        mdns,
        gossipsub,
        direct,
        identify,
    })
}
