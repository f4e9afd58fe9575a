use futures::StreamExt;
use huddle_types::compat::CompatibilityToken;
use huddle_types::constants::{MAX_MESSAGE_SIZE, MAX_RESOURCE_BYTES};
use huddle_types::identity::PeerIdentity;
use huddle_types::name::validate_peer_name;
use huddle_types::wire::{ObjectId, StreamId, WireMessage};
use libp2p::gossipsub::{self, IdentTopic};
use libp2p::request_response::{self, OutboundFailure, OutboundRequestId, ResponseChannel};
use libp2p::swarm::dial_opts::DialOpts;
use libp2p::swarm::SwarmEvent;
use libp2p::{identify, mdns, Multiaddr, PeerId, Swarm, SwarmBuilder};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::advertiser::Advertiser;
use crate::behaviour::{build_behaviour, HuddleBehaviour, HuddleBehaviourEvent};
use crate::browser::Browser;
use crate::codec;
use crate::config::SessionConfig;
use crate::delegate::SessionDelegate;
use crate::error::{OwnershipError, SessionError};
use crate::ownership::{OwnershipBroker, RequestAction};
use crate::protocol;
use crate::provider::{LocalInfoProvider, SystemInfo};
use crate::roster::PeerRoster;
use crate::transfer::TransferManager;

/// Requests from the public handle into the driver loop.
enum Command {
    SendToAll {
        payload: Vec<u8>,
        reliable: bool,
        reply: oneshot::Sender<bool>,
    },
    SendTo {
        peer_name: String,
        payload: Vec<u8>,
        reliable: bool,
        reply: oneshot::Sender<bool>,
    },
    ConnectedPeers {
        reply: oneshot::Sender<Vec<PeerIdentity>>,
    },
    RegisterObject {
        object: ObjectId,
        reply: oneshot::Sender<()>,
    },
    RequestOwnership {
        object: ObjectId,
        reply: oneshot::Sender<Result<(), OwnershipError>>,
    },
    SendResource {
        peer_name: String,
        name: String,
        bytes: Vec<u8>,
        reply: oneshot::Sender<bool>,
    },
    OpenStream {
        peer_name: String,
        name: String,
        reply: oneshot::Sender<Option<(PeerId, StreamId)>>,
    },
    SendStreamFrame {
        peer: PeerId,
        stream: StreamId,
        seq: u64,
        data: Vec<u8>,
        reply: oneshot::Sender<bool>,
    },
    CloseStream {
        peer: PeerId,
        stream: StreamId,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

/// Sending half of a named byte stream toward one peer.
pub struct OutboundStream {
    peer: PeerId,
    stream: StreamId,
    seq: u64,
    cmd_tx: mpsc::Sender<Command>,
}

impl OutboundStream {
    /// Send one frame. Returns false when the peer left the roster or the
    /// coordinator was torn down.
    pub async fn send(&mut self, data: Vec<u8>) -> bool {
        self.seq += 1;
        let (tx, rx) = oneshot::channel();
        let cmd = Command::SendStreamFrame {
            peer: self.peer,
            stream: self.stream,
            seq: self.seq,
            data,
            reply: tx,
        };
        if self.cmd_tx.send(cmd).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Close the stream; the receiver's channel ends after buffered frames
    /// drain.
    pub async fn close(self) {
        let _ = self
            .cmd_tx
            .send(Command::CloseStream {
                peer: self.peer,
                stream: self.stream,
            })
            .await;
    }
}

/// The top-level session facade.
///
/// Construction starts advertising and/or browsing immediately according to
/// the configured role; there is no separate start call. All coordinator
/// state lives in a driver task that owns the swarm and serializes every
/// mutation, so the handle is cheap to clone across tasks.
///
/// `disconnect_all` is terminal: discard the coordinator afterwards and
/// build a new one to reconnect.
#[derive(Clone)]
pub struct SessionCoordinator {
    local_identity: PeerIdentity,
    cmd_tx: mpsc::Sender<Command>,
}

impl SessionCoordinator {
    /// Create a coordinator and start discovery. Fails on invalid
    /// configuration without leaving any network state behind.
    pub async fn spawn(
        config: SessionConfig,
        delegate: Arc<dyn SessionDelegate>,
    ) -> Result<Self, SessionError> {
        Self::spawn_with_provider(config, delegate, Arc::new(SystemInfo)).await
    }

    /// Like [`spawn`](Self::spawn), with an injected local info provider
    /// controlling the default display name and platform details.
    pub async fn spawn_with_provider(
        config: SessionConfig,
        delegate: Arc<dyn SessionDelegate>,
        provider: Arc<dyn LocalInfoProvider>,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        let display_name = match &config.peer_name {
            Some(name) => name.clone(),
            None => {
                let name = provider.display_name();
                validate_peer_name(&name)?;
                name
            }
        };

        let keypair = if let Some(seed) = &config.keypair_seed {
            let mut seed_bytes = *seed;
            libp2p::identity::Keypair::ed25519_from_bytes(&mut seed_bytes).map_err(|e| {
                SessionError::Config {
                    reason: format!("invalid keypair seed: {}", e),
                }
            })?
        } else {
            libp2p::identity::Keypair::generate_ed25519()
        };

        let mut swarm = SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                libp2p::tcp::Config::default(),
                libp2p::noise::Config::new,
                libp2p::yamux::Config::default,
            )
            .map_err(|e| SessionError::Network {
                reason: format!("tcp transport: {}", e),
            })?
            .with_behaviour(|key| build_behaviour(key, &config))
            .map_err(|e| SessionError::Network {
                reason: format!("behaviour: {}", e),
            })?
            .with_swarm_config(|cfg| {
                cfg.with_idle_connection_timeout(std::time::Duration::from_secs(60))
            })
            .build();

        let topic = IdentTopic::new(protocol::data_topic(&config.service_name));
        swarm
            .behaviour_mut()
            .gossipsub
            .subscribe(&topic)
            .map_err(|e| SessionError::Network {
                reason: format!("subscribe: {}", e),
            })?;

        let listen_addr: Multiaddr = format!("/ip4/0.0.0.0/tcp/{}", config.port)
            .parse()
            .map_err(|e| SessionError::Network {
                reason: format!("parse listen addr: {}", e),
            })?;
        swarm
            .listen_on(listen_addr)
            .map_err(|e| SessionError::Network {
                reason: format!("listen: {}", e),
            })?;

        let local_peer_id = *swarm.local_peer_id();
        let local_identity = PeerIdentity::new(display_name, local_peer_id.to_bytes());

        let mut advertiser = Advertiser::new();
        let mut browser = Browser::new();
        if config.role.is_host() {
            advertiser.start();
        }
        if config.role.is_peer() {
            browser.start();
        }

        info!(
            peer_id = %local_peer_id,
            service = %config.service_name,
            role = %config.role,
            name = %local_identity,
            "session coordinator started"
        );

        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        let driver = SessionDriver {
            swarm,
            local_identity: local_identity.clone(),
            delegate,
            provider,
            roster: PeerRoster::new(),
            advertiser,
            browser,
            broker: OwnershipBroker::new(),
            transfers: TransferManager::new(),
            topic,
            local_token: CompatibilityToken::local(),
            pending_probes: HashMap::new(),
            pending_invites: HashMap::new(),
            pending_ownership: HashMap::new(),
            outbound_seq: HashMap::new(),
            inbound_data: HashMap::new(),
            cmd_rx,
        };
        tokio::spawn(driver.run());

        Ok(Self {
            local_identity,
            cmd_tx,
        })
    }

    /// The identity this coordinator presents to peers.
    pub fn local_identity(&self) -> &PeerIdentity {
        &self.local_identity
    }

    /// Send a payload to every joined peer. Returns false when the roster
    /// is empty (no transport call is made), the payload is oversized, or
    /// the coordinator is torn down.
    pub async fn send_to_all(&self, payload: impl Into<Vec<u8>>, reliable: bool) -> bool {
        let payload = payload.into();
        self.request(|reply| Command::SendToAll {
            payload,
            reliable,
            reply,
        })
        .await
        .unwrap_or(false)
    }

    /// Send a payload to the peer with the given display name. Returns
    /// false when no such peer is joined.
    pub async fn send_to(
        &self,
        peer_name: &str,
        payload: impl Into<Vec<u8>>,
        reliable: bool,
    ) -> bool {
        let peer_name = peer_name.to_string();
        let payload = payload.into();
        self.request(|reply| Command::SendTo {
            peer_name,
            payload,
            reliable,
            reply,
        })
        .await
        .unwrap_or(false)
    }

    /// The currently joined peers, ordered by display name. Reflects the
    /// session's current truth, not a cached lookup table.
    pub async fn connected_peers(&self) -> Vec<PeerIdentity> {
        self.request(|reply| Command::ConnectedPeers { reply })
            .await
            .unwrap_or_default()
    }

    /// Record a locally created shared object as owned by this node and
    /// announce it to joined peers.
    pub async fn register_object(&self, object: ObjectId) {
        let _ = self
            .request(|reply| Command::RegisterObject { object, reply })
            .await;
    }

    /// Request exclusive mutation rights over a shared object.
    ///
    /// Resolves exactly once: `Ok` when ownership is held or granted,
    /// `Denied` when the owner refuses, `TimedOut` when the owner does not
    /// answer within the transport's timeout window, and `SessionClosed`
    /// when the coordinator was torn down first. An already-owned object
    /// resolves without touching the network. Concurrent requests for the
    /// same object share a single wire request.
    pub async fn request_ownership(&self, object: ObjectId) -> Result<(), OwnershipError> {
        self.request(|reply| Command::RequestOwnership { object, reply })
            .await
            .unwrap_or(Err(OwnershipError::SessionClosed))
    }

    /// Transfer a named byte buffer to one peer. Returns false when the
    /// peer is not joined or the resource exceeds the size cap.
    pub async fn send_resource(&self, peer_name: &str, name: &str, bytes: Vec<u8>) -> bool {
        let peer_name = peer_name.to_string();
        let name = name.to_string();
        self.request(|reply| Command::SendResource {
            peer_name,
            name,
            bytes,
            reply,
        })
        .await
        .unwrap_or(false)
    }

    /// Open a named byte stream toward one peer. Returns None when the
    /// peer is not joined.
    pub async fn open_stream(&self, peer_name: &str, name: &str) -> Option<OutboundStream> {
        let peer_name = peer_name.to_string();
        let name = name.to_string();
        let (peer, stream) = self
            .request(|reply| Command::OpenStream {
                peer_name,
                name,
                reply,
            })
            .await
            .flatten()?;
        Some(OutboundStream {
            peer,
            stream,
            seq: 0,
            cmd_tx: self.cmd_tx.clone(),
        })
    }

    /// Stop advertising and browsing and close every connection. Pending
    /// ownership requests resolve as `SessionClosed`. Idempotent; the
    /// coordinator is terminal afterwards.
    pub async fn disconnect_all(&self) {
        let _ = self.request(|reply| Command::Disconnect { reply }).await;
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx.send(make(tx)).await.ok()?;
        rx.await.ok()
    }
}

/// Per-peer reordering state for reliable payloads.
struct InOrderData {
    next_seq: u64,
    held: BTreeMap<u64, Vec<u8>>,
}

impl Default for InOrderData {
    fn default() -> Self {
        Self {
            next_seq: 1,
            held: BTreeMap::new(),
        }
    }
}

/// Owns the swarm and every piece of mutable session state. The run loop is
/// the single serialization point: transport events and handle commands are
/// both funneled here, so the roster, the broker, and the handshake state
/// machines are never touched concurrently.
struct SessionDriver {
    swarm: Swarm<HuddleBehaviour>,
    local_identity: PeerIdentity,
    delegate: Arc<dyn SessionDelegate>,
    provider: Arc<dyn LocalInfoProvider>,
    roster: PeerRoster,
    advertiser: Advertiser,
    browser: Browser,
    broker: OwnershipBroker,
    transfers: TransferManager,
    topic: IdentTopic,
    local_token: CompatibilityToken,
    pending_probes: HashMap<OutboundRequestId, PeerId>,
    pending_invites: HashMap<OutboundRequestId, PeerId>,
    pending_ownership: HashMap<OutboundRequestId, ObjectId>,
    outbound_seq: HashMap<PeerId, u64>,
    inbound_data: HashMap<PeerId, InOrderData>,
    cmd_rx: mpsc::Receiver<Command>,
}

impl SessionDriver {
    async fn run(mut self) {
        loop {
            tokio::select! {
                maybe_cmd = self.cmd_rx.recv() => {
                    match maybe_cmd {
                        Some(cmd) => {
                            if self.handle_command(cmd) {
                                break;
                            }
                        }
                        // Every handle dropped: tear down.
                        None => break,
                    }
                }
                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event);
                }
            }
        }
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.advertiser.stop();
        self.browser.stop();
        self.broker.fail_all(OwnershipError::SessionClosed);
        for identity in self.roster.identities() {
            self.delegate.on_peer_left(&identity);
        }
        // Dropping the swarm when the driver returns closes every connection.
        info!("session coordinator stopped");
    }

    /// Returns true when the driver should shut down.
    fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::SendToAll {
                payload,
                reliable,
                reply,
            } => {
                let peers = self.roster.peer_ids();
                let sent = self.send_data(&peers, payload, reliable, true);
                let _ = reply.send(sent);
            }
            Command::SendTo {
                peer_name,
                payload,
                reliable,
                reply,
            } => {
                let sent = match self.roster.find_by_name(&peer_name) {
                    Some(peer) => self.send_data(&[peer], payload, reliable, false),
                    None => false,
                };
                let _ = reply.send(sent);
            }
            Command::ConnectedPeers { reply } => {
                let _ = reply.send(self.roster.identities());
            }
            Command::RegisterObject { object, reply } => {
                self.broker.register(object);
                for peer in self.roster.peer_ids() {
                    self.swarm
                        .behaviour_mut()
                        .direct
                        .send_request(&peer, WireMessage::ObjectAnnounce { object });
                }
                let _ = reply.send(());
            }
            Command::RequestOwnership { object, reply } => {
                if let RequestAction::Send(owner) = self.broker.request(object, reply) {
                    let rid = self
                        .swarm
                        .behaviour_mut()
                        .direct
                        .send_request(&owner, WireMessage::OwnershipRequest { object });
                    self.pending_ownership.insert(rid, object);
                }
            }
            Command::SendResource {
                peer_name,
                name,
                bytes,
                reply,
            } => {
                let sent = self.send_resource(&peer_name, &name, bytes);
                let _ = reply.send(sent);
            }
            Command::OpenStream {
                peer_name,
                name,
                reply,
            } => {
                let opened = self.roster.find_by_name(&peer_name).map(|peer| {
                    let stream = self.transfers.allocate_stream_id();
                    self.swarm
                        .behaviour_mut()
                        .direct
                        .send_request(&peer, WireMessage::StreamOpen { stream, name });
                    (peer, stream)
                });
                let _ = reply.send(opened);
            }
            Command::SendStreamFrame {
                peer,
                stream,
                seq,
                data,
                reply,
            } => {
                let sent = if self.roster.contains(&peer) && data.len() <= MAX_MESSAGE_SIZE {
                    self.swarm
                        .behaviour_mut()
                        .direct
                        .send_request(&peer, WireMessage::StreamFrame { stream, seq, data });
                    true
                } else {
                    false
                };
                let _ = reply.send(sent);
            }
            Command::CloseStream { peer, stream } => {
                if self.roster.contains(&peer) {
                    self.swarm
                        .behaviour_mut()
                        .direct
                        .send_request(&peer, WireMessage::StreamClose { stream });
                }
            }
            Command::Disconnect { reply } => {
                let _ = reply.send(());
                return true;
            }
        }
        false
    }

    /// Send an application payload. Reliable payloads go per-peer over the
    /// direct protocol with a sequence number; unreliable broadcasts ride
    /// the gossip topic, and unreliable unicasts ride the direct protocol
    /// without a sequence number (delivered on arrival, unordered).
    fn send_data(
        &mut self,
        peers: &[PeerId],
        payload: Vec<u8>,
        reliable: bool,
        broadcast: bool,
    ) -> bool {
        if peers.is_empty() {
            return false;
        }
        if payload.len() > MAX_MESSAGE_SIZE {
            warn!(
                size = payload.len(),
                max = MAX_MESSAGE_SIZE,
                "payload rejected: too large"
            );
            return false;
        }
        if reliable {
            for peer in peers {
                let counter = self.outbound_seq.entry(*peer).or_insert(0);
                *counter += 1;
                let seq = *counter;
                self.swarm.behaviour_mut().direct.send_request(
                    peer,
                    WireMessage::Data {
                        seq,
                        payload: payload.clone(),
                    },
                );
            }
            true
        } else if broadcast {
            let msg = WireMessage::Data { seq: 0, payload };
            match codec::encode_message(&msg) {
                Ok(bytes) => match self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .publish(self.topic.clone(), bytes)
                {
                    Ok(_) => true,
                    Err(e) => {
                        warn!("unreliable broadcast failed: {}", e);
                        false
                    }
                },
                Err(e) => {
                    warn!("payload encode failed: {}", e);
                    false
                }
            }
        } else {
            for peer in peers {
                self.swarm.behaviour_mut().direct.send_request(
                    peer,
                    WireMessage::Data {
                        seq: 0,
                        payload: payload.clone(),
                    },
                );
            }
            true
        }
    }

    fn send_resource(&mut self, peer_name: &str, name: &str, bytes: Vec<u8>) -> bool {
        let Some(peer) = self.roster.find_by_name(peer_name) else {
            return false;
        };
        if bytes.len() > MAX_RESOURCE_BYTES {
            warn!(
                size = bytes.len(),
                max = MAX_RESOURCE_BYTES,
                "resource rejected: too large"
            );
            return false;
        }
        let transfer = self.transfers.allocate_transfer_id();
        for msg in TransferManager::chunk_resource(transfer, name, &bytes) {
            self.swarm.behaviour_mut().direct.send_request(&peer, msg);
        }
        true
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<HuddleBehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(event) => self.handle_behaviour_event(event),
            SwarmEvent::ConnectionEstablished {
                peer_id,
                num_established,
                ..
            } => {
                debug!(%peer_id, "connection established");
                if u32::from(num_established) == 1 {
                    let identity = self.identity_of(&peer_id);
                    if !self.delegate.should_trust_peer(&identity) {
                        warn!(%peer_id, "peer rejected by trust policy, disconnecting");
                        let _ = self.swarm.disconnect_peer_id(peer_id);
                        return;
                    }
                }
                if self.browser.should_probe(&peer_id) {
                    let rid = self
                        .swarm
                        .behaviour_mut()
                        .direct
                        .send_request(&peer_id, WireMessage::DiscoveryRequest);
                    self.pending_probes.insert(rid, peer_id);
                }
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                cause,
                ..
            } => {
                debug!(%peer_id, ?cause, "connection closed");
                if num_established == 0 {
                    self.handle_peer_disconnected(peer_id);
                }
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "listening on new address");
            }
            other => {
                debug!(?other, "other swarm event");
            }
        }
    }

    fn handle_behaviour_event(&mut self, event: HuddleBehaviourEvent) {
        match event {
            HuddleBehaviourEvent::Mdns(mdns::Event::Discovered(peers)) => {
                for (peer_id, addr) in peers {
                    if self
                        .browser
                        .on_discovered(peer_id, self.roster.contains(&peer_id))
                    {
                        debug!(%peer_id, %addr, "discovered advertiser, dialing");
                        let opts = DialOpts::peer_id(peer_id).addresses(vec![addr]).build();
                        if let Err(e) = self.swarm.dial(opts) {
                            debug!(%peer_id, "dial failed: {}", e);
                            self.browser.on_disconnected(&peer_id);
                        }
                    }
                }
            }
            HuddleBehaviourEvent::Mdns(mdns::Event::Expired(peers)) => {
                for (peer_id, _) in peers {
                    let Some(known_name) = self.browser.on_expired(&peer_id) else {
                        continue;
                    };
                    if !self.roster.contains(&peer_id) {
                        let identity = match known_name {
                            Some(name) => PeerIdentity::new(name, peer_id.to_bytes()),
                            None => self.identity_of(&peer_id),
                        };
                        debug!(peer = %identity, "peer lost");
                        self.delegate.on_peer_lost(&identity);
                    }
                }
            }
            HuddleBehaviourEvent::Direct(request_response::Event::Message { peer, message }) => {
                match message {
                    request_response::Message::Request {
                        request, channel, ..
                    } => self.handle_request(peer, request, channel),
                    request_response::Message::Response {
                        request_id,
                        response,
                    } => self.handle_response(peer, request_id, response),
                }
            }
            HuddleBehaviourEvent::Direct(request_response::Event::OutboundFailure {
                peer,
                request_id,
                error,
            }) => {
                self.handle_outbound_failure(peer, request_id, error);
            }
            HuddleBehaviourEvent::Direct(_) => {}
            HuddleBehaviourEvent::Gossipsub(gossipsub::Event::Message {
                propagation_source,
                message,
                ..
            }) => {
                self.handle_broadcast(propagation_source, message);
            }
            HuddleBehaviourEvent::Gossipsub(_) => {}
            HuddleBehaviourEvent::Identify(identify::Event::Received { peer_id, info, .. }) => {
                debug!(
                    %peer_id,
                    protocol = %info.protocol_version,
                    agent = %info.agent_version,
                    "identified peer"
                );
            }
            HuddleBehaviourEvent::Identify(_) => {}
        }
    }

    fn handle_request(
        &mut self,
        peer: PeerId,
        request: WireMessage,
        channel: ResponseChannel<WireMessage>,
    ) {
        let response = match request {
            WireMessage::DiscoveryRequest => {
                if self.advertiser.is_advertising() {
                    let info = self.advertiser.discovery_info(
                        self.delegate.as_ref(),
                        self.provider.as_ref(),
                        &self.local_token,
                    );
                    WireMessage::DiscoveryInfoReply {
                        display_name: self.local_identity.display_name().to_string(),
                        info,
                    }
                } else {
                    // Not advertising: nothing to offer.
                    WireMessage::Ack
                }
            }
            WireMessage::Invite {
                display_name,
                context,
            } => {
                let identity = PeerIdentity::new(display_name, peer.to_bytes());
                if self
                    .advertiser
                    .handle_invite(&identity, context.as_deref(), self.delegate.as_ref())
                {
                    self.peer_joined(peer, identity);
                    WireMessage::InviteAccepted {
                        display_name: self.local_identity.display_name().to_string(),
                    }
                } else {
                    debug!(%peer, "invitation declined");
                    WireMessage::InviteDeclined
                }
            }
            WireMessage::Data { seq, payload } => {
                self.deliver_data(peer, seq, payload);
                WireMessage::Ack
            }
            WireMessage::OwnershipRequest { object } => {
                if self.roster.contains(&peer) {
                    let identity = self.identity_of(&peer);
                    let policy = self.delegate.should_grant_ownership(&object, &identity);
                    if self.broker.handle_remote_request(object, peer, policy) {
                        debug!(peer = %identity, "ownership granted");
                        WireMessage::OwnershipGranted { object }
                    } else {
                        debug!(peer = %identity, "ownership denied");
                        WireMessage::OwnershipDenied { object }
                    }
                } else {
                    WireMessage::OwnershipDenied { object }
                }
            }
            WireMessage::ObjectAnnounce { object } => {
                if self.roster.contains(&peer) {
                    self.broker.handle_announce(object, peer);
                }
                WireMessage::Ack
            }
            WireMessage::StreamOpen { stream, name } => {
                if self.roster.contains(&peer) {
                    let identity = self.identity_of(&peer);
                    let inbound = self.transfers.open_inbound(peer, stream, name);
                    self.delegate.on_stream_received(inbound, &identity);
                }
                WireMessage::Ack
            }
            WireMessage::StreamFrame { stream, seq, data } => {
                self.transfers.on_frame(&peer, stream, seq, data);
                WireMessage::Ack
            }
            WireMessage::StreamClose { stream } => {
                self.transfers.close_inbound(&peer, stream);
                WireMessage::Ack
            }
            WireMessage::ResourceStart { transfer, name, len } => {
                if self.roster.contains(&peer) {
                    let identity = self.identity_of(&peer);
                    match self.transfers.start_resource(peer, transfer, name.clone(), len) {
                        Ok(()) => self.delegate.on_resource_started(&name, &identity, len),
                        Err(e) => warn!(%peer, "resource transfer refused: {}", e),
                    }
                }
                WireMessage::Ack
            }
            WireMessage::ResourceChunk {
                transfer,
                offset,
                data,
            } => {
                self.transfers.on_chunk(&peer, transfer, offset, data);
                WireMessage::Ack
            }
            WireMessage::ResourceEnd { transfer } => {
                if let Some((name, result)) = self.transfers.finish_resource(&peer, transfer) {
                    let identity = self.identity_of(&peer);
                    self.delegate.on_resource_finished(&name, &identity, result);
                }
                WireMessage::Ack
            }
            other => {
                debug!(%peer, ?other, "unexpected request");
                WireMessage::Ack
            }
        };

        if self
            .swarm
            .behaviour_mut()
            .direct
            .send_response(channel, response)
            .is_err()
        {
            debug!(%peer, "response channel closed before reply");
        }
    }

    fn handle_response(
        &mut self,
        peer: PeerId,
        request_id: OutboundRequestId,
        response: WireMessage,
    ) {
        if self.pending_probes.remove(&request_id).is_some() {
            if let WireMessage::DiscoveryInfoReply { display_name, info } = response {
                let identity = PeerIdentity::new(display_name, peer.to_bytes());
                if self.browser.on_discovery_reply(
                    &peer,
                    &identity,
                    &info,
                    self.delegate.as_ref(),
                ) {
                    debug!(peer = %identity, "inviting peer");
                    let rid = self.swarm.behaviour_mut().direct.send_request(
                        &peer,
                        WireMessage::Invite {
                            display_name: self.local_identity.display_name().to_string(),
                            context: None,
                        },
                    );
                    self.pending_invites.insert(rid, peer);
                } else {
                    // Incompatible or vetoed: silently skip this peer.
                    debug!(peer = %identity, "peer filtered out");
                }
            } else {
                self.browser.on_handshake_failed(&peer);
            }
            return;
        }

        if self.pending_invites.remove(&request_id).is_some() {
            match response {
                WireMessage::InviteAccepted { display_name } => {
                    self.browser.on_invite_accepted(&peer);
                    let identity = PeerIdentity::new(display_name, peer.to_bytes());
                    self.peer_joined(peer, identity);
                }
                _ => {
                    debug!(%peer, "invitation not accepted");
                    self.browser.on_handshake_failed(&peer);
                }
            }
            return;
        }

        if let Some(object) = self.pending_ownership.remove(&request_id) {
            match response {
                WireMessage::OwnershipGranted { .. } => {
                    self.broker.resolve(object, Ok(()));
                    // Announce the new holder so peers' tables converge.
                    for peer_id in self.roster.peer_ids() {
                        self.swarm
                            .behaviour_mut()
                            .direct
                            .send_request(&peer_id, WireMessage::ObjectAnnounce { object });
                    }
                }
                WireMessage::OwnershipDenied { .. } => {
                    self.broker.resolve(object, Err(OwnershipError::Denied));
                }
                other => {
                    debug!(?other, "unexpected ownership response");
                    self.broker.resolve(object, Err(OwnershipError::Denied));
                }
            }
        }
        // Acks for data, stream, and resource sends need no bookkeeping.
    }

    fn handle_outbound_failure(
        &mut self,
        peer: PeerId,
        request_id: OutboundRequestId,
        error: OutboundFailure,
    ) {
        if self.pending_probes.remove(&request_id).is_some() {
            debug!(%peer, "discovery probe failed: {}", error);
            self.browser.on_handshake_failed(&peer);
            return;
        }
        if self.pending_invites.remove(&request_id).is_some() {
            // An expired invitation is a silent non-join.
            debug!(%peer, "invitation expired: {}", error);
            self.browser.on_handshake_failed(&peer);
            return;
        }
        if let Some(object) = self.pending_ownership.remove(&request_id) {
            // An unreachable owner looks the same as a silent one; only an
            // explicit refusal maps to a denial.
            debug!(%peer, "ownership request failed: {}", error);
            self.broker.resolve(object, Err(OwnershipError::TimedOut));
            return;
        }
        debug!(%peer, "send failed: {}", error);
    }

    fn handle_broadcast(&mut self, propagation_source: PeerId, message: gossipsub::Message) {
        let sender = message.source.unwrap_or(propagation_source);
        match codec::decode_message(&message.data) {
            Ok(WireMessage::Data { payload, .. }) => {
                if self.roster.contains(&sender) {
                    let identity = self.identity_of(&sender);
                    self.delegate.on_data_received(&payload, &identity);
                } else {
                    debug!(%sender, "broadcast from non-member dropped");
                }
            }
            Ok(other) => {
                debug!(?other, "unexpected broadcast message");
            }
            Err(e) => {
                warn!("failed to decode broadcast: {}", e);
            }
        }
    }

    fn peer_joined(&mut self, peer_id: PeerId, identity: PeerIdentity) {
        if self.roster.contains(&peer_id) {
            return;
        }
        self.roster.insert(peer_id, identity.clone());
        info!(peer = %identity, "peer joined");
        self.browser.on_joined();
        self.delegate.on_peer_joined(&identity);
        // Share this node's owner table with the newcomer.
        for object in self.broker.local_objects() {
            self.swarm
                .behaviour_mut()
                .direct
                .send_request(&peer_id, WireMessage::ObjectAnnounce { object });
        }
    }

    fn handle_peer_disconnected(&mut self, peer_id: PeerId) {
        self.browser.on_disconnected(&peer_id);
        self.outbound_seq.remove(&peer_id);
        self.inbound_data.remove(&peer_id);
        let failed_transfers = self.transfers.abort_peer(&peer_id);
        if !failed_transfers.is_empty() {
            let identity = self.identity_of(&peer_id);
            for name in failed_transfers {
                self.delegate.on_resource_finished(
                    &name,
                    &identity,
                    Err(SessionError::TransferFailed {
                        reason: "peer disconnected".to_string(),
                    }),
                );
            }
        }
        if let Some(identity) = self.roster.remove(&peer_id) {
            info!(peer = %identity, "peer left");
            self.delegate.on_peer_left(&identity);
        }
    }

    /// Deliver an application payload, releasing sequenced (reliable)
    /// payloads in send order. Payloads from peers that never joined are
    /// dropped: `on_peer_joined` always precedes `on_data_received`.
    fn deliver_data(&mut self, peer: PeerId, seq: u64, payload: Vec<u8>) {
        if !self.roster.contains(&peer) {
            debug!(%peer, "payload from non-member dropped");
            return;
        }
        let identity = self.identity_of(&peer);
        if seq == 0 {
            // Unreliable unicast: delivered on arrival.
            self.delegate.on_data_received(&payload, &identity);
            return;
        }
        let entry = self.inbound_data.entry(peer).or_default();
        if seq < entry.next_seq {
            return; // duplicate
        }
        entry.held.insert(seq, payload);
        while let Some(next) = entry.held.remove(&entry.next_seq) {
            entry.next_seq += 1;
            self.delegate.on_data_received(&next, &identity);
        }
    }

    fn identity_of(&self, peer_id: &PeerId) -> PeerIdentity {
        self.roster
            .identity(peer_id)
            .cloned()
            .unwrap_or_else(|| PeerIdentity::new(peer_id.to_base58(), peer_id.to_bytes()))
    }
}
