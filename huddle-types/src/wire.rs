use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveryInfo;

/// Identifier of a shared mutable object whose ownership is negotiated
/// between peers.
pub type ObjectId = [u8; 32];

/// Identifier of a named byte stream within a session.
pub type StreamId = u64;

/// Identifier of an in-flight resource transfer.
pub type TransferId = u64;

/// Top-level huddle protocol message.
///
/// Everything rides over a single direct protocol (plus the gossip topic for
/// unreliable broadcast), so one enum covers the whole wire surface:
/// discovery probing, the invite handshake, application payloads, ownership
/// negotiation, and stream/resource transfer framing.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum WireMessage {
    /// Browser asks an advertiser for its discovery info.
    DiscoveryRequest,
    /// Advertiser's discovery info, including the compatibility token.
    DiscoveryInfoReply {
        display_name: String,
        info: DiscoveryInfo,
    },
    /// Browser invites the advertiser's node into the session.
    Invite {
        display_name: String,
        /// Opaque context the inviter may attach for the accept decision.
        context: Option<Vec<u8>>,
    },
    /// Advertiser accepted the invitation.
    InviteAccepted { display_name: String },
    /// Advertiser declined the invitation.
    InviteDeclined,
    /// An application payload. The coordinator places no structure
    /// requirement on the bytes. `seq` is a per-peer counter (starting at 1)
    /// used to release reliable payloads in send order; unreliable payloads
    /// ride the gossip topic with `seq` 0 and no ordering guarantee.
    Data { seq: u64, payload: Vec<u8> },
    /// Acknowledgement response for requests that carry no reply data.
    Ack,
    /// Ask the owner of `object` to hand over mutation rights.
    OwnershipRequest { object: ObjectId },
    /// Ownership granted to the requester.
    OwnershipGranted { object: ObjectId },
    /// Ownership refused (or the responder is not the owner).
    OwnershipDenied { object: ObjectId },
    /// The sender owns `object`; lets peers keep their owner tables fresh.
    ObjectAnnounce { object: ObjectId },
    /// Open a named byte stream toward the receiver.
    StreamOpen { stream: StreamId, name: String },
    /// A frame on an open stream. `seq` starts at 1 per stream; receivers
    /// release frames in order.
    StreamFrame {
        stream: StreamId,
        seq: u64,
        data: Vec<u8>,
    },
    /// Close an open stream.
    StreamClose { stream: StreamId },
    /// Start of a named resource transfer of `len` total bytes.
    ResourceStart {
        transfer: TransferId,
        name: String,
        len: u64,
    },
    /// A chunk of resource bytes at `offset` into the transfer. Chunks may
    /// arrive out of order; the receiver assembles by offset.
    ResourceChunk {
        transfer: TransferId,
        offset: u64,
        data: Vec<u8>,
    },
    /// End of a resource transfer; the receiver should have `len` bytes.
    ResourceEnd { transfer: TransferId },
}
