use huddle_types::constants::{DEFAULT_RESOURCE_CHUNK, MAX_RESOURCE_BYTES};
use huddle_types::wire::{StreamId, TransferId, WireMessage};
use libp2p::PeerId;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SessionError;

/// Frames buffered per inbound stream before the receiver must drain them.
const STREAM_CHANNEL_CAPACITY: usize = 256;

/// Receiving end of a named byte stream opened by a remote peer.
///
/// Frames arrive in the order the sender wrote them. The channel closes when
/// the sender closes the stream or disconnects.
pub struct InboundStream {
    pub name: String,
    pub frames: mpsc::Receiver<Vec<u8>>,
}

impl std::fmt::Debug for InboundStream {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("InboundStream")
            .field("name", &self.name)
            .finish()
    }
}

struct InboundStreamState {
    tx: mpsc::Sender<Vec<u8>>,
    next_seq: u64,
    held: BTreeMap<u64, Vec<u8>>,
}

struct InboundResource {
    name: String,
    len: u64,
    buf: Vec<u8>,
    received: u64,
    failed: bool,
}

/// Bookkeeping for in-flight stream and resource transfers.
///
/// Stream frames and resource chunks ride separate transport substreams and
/// may arrive out of order; frames are released by sequence number and
/// chunks assembled by offset.
pub struct TransferManager {
    next_stream: StreamId,
    next_transfer: TransferId,
    streams: HashMap<(PeerId, StreamId), InboundStreamState>,
    resources: HashMap<(PeerId, TransferId), InboundResource>,
}

impl TransferManager {
    pub fn new() -> Self {
        Self {
            next_stream: 1,
            next_transfer: 1,
            streams: HashMap::new(),
            resources: HashMap::new(),
        }
    }

    pub fn allocate_stream_id(&mut self) -> StreamId {
        let id = self.next_stream;
        self.next_stream += 1;
        id
    }

    pub fn allocate_transfer_id(&mut self) -> TransferId {
        let id = self.next_transfer;
        self.next_transfer += 1;
        id
    }

    /// A peer opened a stream toward us. Returns the receiver half handed
    /// to the delegate.
    pub fn open_inbound(&mut self, peer: PeerId, stream: StreamId, name: String) -> InboundStream {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        self.streams.insert(
            (peer, stream),
            InboundStreamState {
                tx,
                next_seq: 1,
                held: BTreeMap::new(),
            },
        );
        InboundStream { name, frames: rx }
    }

    /// A frame arrived. Releases it (and any held successors) in sequence
    /// order. Frames for unknown or abandoned streams are dropped.
    pub fn on_frame(&mut self, peer: &PeerId, stream: StreamId, seq: u64, data: Vec<u8>) {
        let key = (*peer, stream);
        let Some(state) = self.streams.get_mut(&key) else {
            debug!(stream, "frame for unknown stream dropped");
            return;
        };
        if seq < state.next_seq {
            return; // duplicate
        }
        state.held.insert(seq, data);
        let mut abandoned = false;
        while let Some(frame) = state.held.remove(&state.next_seq) {
            match state.tx.try_send(frame) {
                Ok(()) => state.next_seq += 1,
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    abandoned = true;
                    break;
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(stream, "inbound stream receiver is not draining; frame dropped");
                    state.next_seq += 1;
                }
            }
        }
        if abandoned {
            self.streams.remove(&key);
        }
    }

    /// The sender closed the stream; dropping the sender half closes the
    /// receiver's channel once buffered frames are drained.
    pub fn close_inbound(&mut self, peer: &PeerId, stream: StreamId) {
        self.streams.remove(&(*peer, stream));
    }

    /// A resource transfer started. Rejects transfers over the size cap.
    pub fn start_resource(
        &mut self,
        peer: PeerId,
        transfer: TransferId,
        name: String,
        len: u64,
    ) -> Result<(), SessionError> {
        if len as usize > MAX_RESOURCE_BYTES {
            return Err(SessionError::MessageTooLarge {
                size: len as usize,
                max: MAX_RESOURCE_BYTES,
            });
        }
        self.resources.insert(
            (peer, transfer),
            InboundResource {
                name,
                len,
                buf: vec![0u8; len as usize],
                received: 0,
                failed: false,
            },
        );
        Ok(())
    }

    /// A chunk arrived; written at its declared offset.
    pub fn on_chunk(&mut self, peer: &PeerId, transfer: TransferId, offset: u64, data: Vec<u8>) {
        let Some(resource) = self.resources.get_mut(&(*peer, transfer)) else {
            debug!(transfer, "chunk for unknown transfer dropped");
            return;
        };
        let end = offset + data.len() as u64;
        if end > resource.len {
            warn!(transfer, "resource chunk exceeds declared length");
            resource.failed = true;
            return;
        }
        resource.buf[offset as usize..end as usize].copy_from_slice(&data);
        resource.received += data.len() as u64;
    }

    /// The sender declared the transfer complete. Returns the resource name
    /// and either the assembled bytes or the failure.
    pub fn finish_resource(
        &mut self,
        peer: &PeerId,
        transfer: TransferId,
    ) -> Option<(String, Result<Vec<u8>, SessionError>)> {
        let resource = self.resources.remove(&(*peer, transfer))?;
        let result = if resource.failed {
            Err(SessionError::TransferFailed {
                reason: "chunk exceeded declared length".to_string(),
            })
        } else if resource.received != resource.len {
            Err(SessionError::TransferFailed {
                reason: format!(
                    "incomplete transfer: {} of {} bytes",
                    resource.received, resource.len
                ),
            })
        } else {
            Ok(resource.buf)
        };
        Some((resource.name, result))
    }

    /// A peer disconnected: abandon its streams and fail its transfers.
    /// Returns the failed resource names so the delegate can be told.
    pub fn abort_peer(&mut self, peer: &PeerId) -> Vec<String> {
        self.streams.retain(|(owner, _), _| owner != peer);
        let mut failed = Vec::new();
        self.resources.retain(|(owner, _), resource| {
            if owner == peer {
                failed.push(resource.name.clone());
                false
            } else {
                true
            }
        });
        failed
    }

    /// Split a resource into wire messages: a start marker, offset-tagged
    /// chunks, and an end marker.
    pub fn chunk_resource(transfer: TransferId, name: &str, bytes: &[u8]) -> Vec<WireMessage> {
        let mut out = Vec::with_capacity(2 + bytes.len() / DEFAULT_RESOURCE_CHUNK);
        out.push(WireMessage::ResourceStart {
            transfer,
            name: name.to_string(),
            len: bytes.len() as u64,
        });
        for (index, chunk) in bytes.chunks(DEFAULT_RESOURCE_CHUNK).enumerate() {
            out.push(WireMessage::ResourceChunk {
                transfer,
                offset: (index * DEFAULT_RESOURCE_CHUNK) as u64,
                data: chunk.to_vec(),
            });
        }
        out.push(WireMessage::ResourceEnd { transfer });
        out
    }
}

impl Default for TransferManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_frames_released_in_order() {
        let mut transfers = TransferManager::new();
        let peer = PeerId::random();
        let mut inbound = transfers.open_inbound(peer, 1, "positions".to_string());

        // Frames 2 and 3 arrive before frame 1.
        transfers.on_frame(&peer, 1, 2, vec![2]);
        transfers.on_frame(&peer, 1, 3, vec![3]);
        assert!(inbound.frames.try_recv().is_err());

        transfers.on_frame(&peer, 1, 1, vec![1]);
        assert_eq!(inbound.frames.try_recv().unwrap(), vec![1]);
        assert_eq!(inbound.frames.try_recv().unwrap(), vec![2]);
        assert_eq!(inbound.frames.try_recv().unwrap(), vec![3]);
    }

    #[test]
    fn test_duplicate_frame_dropped() {
        let mut transfers = TransferManager::new();
        let peer = PeerId::random();
        let mut inbound = transfers.open_inbound(peer, 1, "s".to_string());
        transfers.on_frame(&peer, 1, 1, vec![1]);
        assert_eq!(inbound.frames.try_recv().unwrap(), vec![1]);
        transfers.on_frame(&peer, 1, 1, vec![9]);
        assert!(inbound.frames.try_recv().is_err());
    }

    #[test]
    fn test_close_ends_channel() {
        let mut transfers = TransferManager::new();
        let peer = PeerId::random();
        let mut inbound = transfers.open_inbound(peer, 1, "s".to_string());
        transfers.on_frame(&peer, 1, 1, vec![1]);
        transfers.close_inbound(&peer, 1);
        // Buffered frame still delivered, then the channel closes.
        assert_eq!(inbound.frames.try_recv().unwrap(), vec![1]);
        assert!(matches!(
            inbound.frames.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_dropped_receiver_abandons_stream() {
        let mut transfers = TransferManager::new();
        let peer = PeerId::random();
        let inbound = transfers.open_inbound(peer, 1, "s".to_string());
        drop(inbound);
        transfers.on_frame(&peer, 1, 1, vec![1]);
        assert!(transfers.streams.is_empty());
    }

    #[test]
    fn test_resource_assembly_out_of_order() {
        let mut transfers = TransferManager::new();
        let peer = PeerId::random();
        transfers
            .start_resource(peer, 1, "scene.bin".to_string(), 6)
            .unwrap();
        transfers.on_chunk(&peer, 1, 3, vec![4, 5, 6]);
        transfers.on_chunk(&peer, 1, 0, vec![1, 2, 3]);
        let (name, result) = transfers.finish_resource(&peer, 1).unwrap();
        assert_eq!(name, "scene.bin");
        assert_eq!(result.unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_incomplete_resource_fails() {
        let mut transfers = TransferManager::new();
        let peer = PeerId::random();
        transfers
            .start_resource(peer, 1, "scene.bin".to_string(), 6)
            .unwrap();
        transfers.on_chunk(&peer, 1, 0, vec![1, 2, 3]);
        let (_, result) = transfers.finish_resource(&peer, 1).unwrap();
        assert!(matches!(result, Err(SessionError::TransferFailed { .. })));
    }

    #[test]
    fn test_overflowing_chunk_fails_transfer() {
        let mut transfers = TransferManager::new();
        let peer = PeerId::random();
        transfers
            .start_resource(peer, 1, "scene.bin".to_string(), 4)
            .unwrap();
        transfers.on_chunk(&peer, 1, 2, vec![1, 2, 3]);
        let (_, result) = transfers.finish_resource(&peer, 1).unwrap();
        assert!(matches!(result, Err(SessionError::TransferFailed { .. })));
    }

    #[test]
    fn test_oversized_resource_rejected() {
        let mut transfers = TransferManager::new();
        let peer = PeerId::random();
        let result = transfers.start_resource(
            peer,
            1,
            "huge".to_string(),
            (MAX_RESOURCE_BYTES as u64) + 1,
        );
        assert!(matches!(result, Err(SessionError::MessageTooLarge { .. })));
    }

    #[test]
    fn test_abort_peer_reports_failed_resources() {
        let mut transfers = TransferManager::new();
        let peer = PeerId::random();
        let other = PeerId::random();
        transfers
            .start_resource(peer, 1, "a.bin".to_string(), 10)
            .unwrap();
        transfers
            .start_resource(other, 1, "b.bin".to_string(), 10)
            .unwrap();
        let failed = transfers.abort_peer(&peer);
        assert_eq!(failed, vec!["a.bin".to_string()]);
        // The other peer's transfer is untouched.
        assert!(transfers.finish_resource(&other, 1).is_some());
    }

    #[test]
    fn test_chunk_resource_framing() {
        let bytes = vec![7u8; DEFAULT_RESOURCE_CHUNK + 10];
        let messages = TransferManager::chunk_resource(5, "scene.bin", &bytes);
        assert_eq!(messages.len(), 4); // start + 2 chunks + end
        assert!(matches!(
            &messages[0],
            WireMessage::ResourceStart { transfer: 5, name, len }
                if name == "scene.bin" && *len == bytes.len() as u64
        ));
        assert!(matches!(
            &messages[2],
            WireMessage::ResourceChunk { offset, data, .. }
                if *offset == DEFAULT_RESOURCE_CHUNK as u64 && data.len() == 10
        ));
        assert!(matches!(&messages[3], WireMessage::ResourceEnd { transfer: 5 }));
    }

    #[test]
    fn test_id_allocation_monotone() {
        let mut transfers = TransferManager::new();
        assert_eq!(transfers.allocate_stream_id(), 1);
        assert_eq!(transfers.allocate_stream_id(), 2);
        assert_eq!(transfers.allocate_transfer_id(), 1);
        assert_eq!(transfers.allocate_transfer_id(), 2);
    }
}
