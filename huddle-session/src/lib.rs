//! Peer-to-peer session coordination over the local network.
//!
//! Built on libp2p: mDNS for discovering nearby peers, a request-response
//! protocol for the mutual-join handshake, direct messaging, and shared-object
//! ownership negotiation, and gossipsub for unreliable broadcast. Connections
//! are encrypted and authenticated by the transport (Noise).

pub mod advertiser;
pub mod behaviour;
pub mod browser;
pub mod codec;
pub mod config;
pub mod delegate;
pub mod error;
pub mod ownership;
pub mod protocol;
pub mod provider;
pub mod roster;
pub mod session;
pub mod transfer;
