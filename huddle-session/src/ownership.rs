use huddle_types::wire::ObjectId;
use libp2p::PeerId;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::OwnershipError;

/// Who may currently mutate a shared object, as far as this node knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// This node owns the object.
    Local,
    /// A remote peer owns it (last-known holder; hints arrive via object
    /// announcements and grants, so the table is eventually consistent).
    Remote(PeerId),
}

/// Completion channel for a local ownership request.
pub type OwnershipReply = oneshot::Sender<Result<(), OwnershipError>>;

/// What the driver should do after a local ownership request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    /// The request resolved without touching the network.
    Resolved,
    /// A wire request for this object is already in flight; the caller was
    /// queued behind it.
    Queued,
    /// Send exactly one wire request to the recorded owner.
    Send(PeerId),
}

/// Brokers exclusive mutation rights over shared objects.
///
/// Concurrent local requests for the same object are serialized: the first
/// issues the single wire request, later ones queue behind it, and every
/// queued caller observes that request's outcome exactly once. The broker
/// never reassigns ownership on peer disconnection; it only reports
/// grant, denial, or timeout.
pub struct OwnershipBroker {
    owners: HashMap<ObjectId, Owner>,
    pending: HashMap<ObjectId, Vec<OwnershipReply>>,
}

impl OwnershipBroker {
    pub fn new() -> Self {
        Self {
            owners: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Record a locally created object as locally owned.
    pub fn register(&mut self, object: ObjectId) {
        self.owners.insert(object, Owner::Local);
    }

    pub fn owner_of(&self, object: &ObjectId) -> Option<Owner> {
        self.owners.get(object).copied()
    }

    pub fn is_owned_locally(&self, object: &ObjectId) -> bool {
        self.owner_of(object) == Some(Owner::Local)
    }

    /// Objects this node currently owns (announced to newly joined peers).
    pub fn local_objects(&self) -> Vec<ObjectId> {
        self.owners
            .iter()
            .filter(|(_, owner)| **owner == Owner::Local)
            .map(|(object, _)| *object)
            .collect()
    }

    /// A local caller wants ownership of `object`.
    ///
    /// Already-owned objects resolve immediately with success and never
    /// touch the network. Objects with no recorded owner resolve as denied.
    pub fn request(&mut self, object: ObjectId, reply: OwnershipReply) -> RequestAction {
        if self.is_owned_locally(&object) {
            let _ = reply.send(Ok(()));
            return RequestAction::Resolved;
        }
        if let Some(waiters) = self.pending.get_mut(&object) {
            waiters.push(reply);
            return RequestAction::Queued;
        }
        match self.owner_of(&object) {
            Some(Owner::Remote(owner)) => {
                self.pending.insert(object, vec![reply]);
                RequestAction::Send(owner)
            }
            _ => {
                // No recorded owner: nothing to negotiate with.
                debug!("ownership request for unknown object denied locally");
                let _ = reply.send(Err(OwnershipError::Denied));
                RequestAction::Resolved
            }
        }
    }

    /// Resolve the in-flight request for `object`, waking every queued
    /// caller with the same outcome. A grant flips the object to local
    /// ownership.
    pub fn resolve(&mut self, object: ObjectId, outcome: Result<(), OwnershipError>) {
        if outcome.is_ok() {
            self.owners.insert(object, Owner::Local);
        }
        if let Some(waiters) = self.pending.remove(&object) {
            for waiter in waiters {
                let _ = waiter.send(outcome);
            }
        }
    }

    /// A remote peer asked for ownership. Grants (and records the new
    /// owner) only when the object is locally owned and the policy allows;
    /// everything else is a denial.
    pub fn handle_remote_request(
        &mut self,
        object: ObjectId,
        from: PeerId,
        policy_grants: bool,
    ) -> bool {
        if self.is_owned_locally(&object) && policy_grants {
            self.owners.insert(object, Owner::Remote(from));
            true
        } else {
            false
        }
    }

    /// A peer announced it owns `object`. Local ownership is never
    /// overridden by an announcement; the grant path is the only way to
    /// lose an object.
    pub fn handle_announce(&mut self, object: ObjectId, from: PeerId) {
        match self.owners.get(&object) {
            Some(Owner::Local) => {
                warn!(%from, "ignoring ownership announcement for a locally owned object");
            }
            _ => {
                self.owners.insert(object, Owner::Remote(from));
            }
        }
    }

    /// Fail every in-flight request, e.g. at teardown. Late completions
    /// then observe the error instead of acting on a dead coordinator.
    pub fn fail_all(&mut self, error: OwnershipError) {
        for (_, waiters) in self.pending.drain() {
            for waiter in waiters {
                let _ = waiter.send(Err(error));
            }
        }
    }

    /// Whether a wire request for `object` is in flight.
    pub fn has_pending(&self, object: &ObjectId) -> bool {
        self.pending.contains_key(object)
    }
}

impl Default for OwnershipBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBJECT: ObjectId = [7u8; 32];

    fn reply() -> (
        OwnershipReply,
        oneshot::Receiver<Result<(), OwnershipError>>,
    ) {
        oneshot::channel()
    }

    #[test]
    fn test_already_owned_resolves_immediately() {
        let mut broker = OwnershipBroker::new();
        broker.register(OBJECT);
        let (tx, mut rx) = reply();
        assert_eq!(broker.request(OBJECT, tx), RequestAction::Resolved);
        assert_eq!(rx.try_recv().unwrap(), Ok(()));
        assert!(!broker.has_pending(&OBJECT));
    }

    #[test]
    fn test_unknown_object_denied_without_wire_traffic() {
        let mut broker = OwnershipBroker::new();
        let (tx, mut rx) = reply();
        assert_eq!(broker.request(OBJECT, tx), RequestAction::Resolved);
        assert_eq!(rx.try_recv().unwrap(), Err(OwnershipError::Denied));
    }

    #[test]
    fn test_remote_owner_triggers_single_wire_request() {
        let mut broker = OwnershipBroker::new();
        let owner = PeerId::random();
        broker.handle_announce(OBJECT, owner);

        let (tx1, mut rx1) = reply();
        assert_eq!(broker.request(OBJECT, tx1), RequestAction::Send(owner));

        // A second concurrent local request queues, producing no second
        // wire request.
        let (tx2, mut rx2) = reply();
        assert_eq!(broker.request(OBJECT, tx2), RequestAction::Queued);

        broker.resolve(OBJECT, Ok(()));
        assert_eq!(rx1.try_recv().unwrap(), Ok(()));
        assert_eq!(rx2.try_recv().unwrap(), Ok(()));
        assert!(broker.is_owned_locally(&OBJECT));
    }

    #[test]
    fn test_denial_fans_out_to_all_waiters() {
        let mut broker = OwnershipBroker::new();
        let owner = PeerId::random();
        broker.handle_announce(OBJECT, owner);

        let (tx1, mut rx1) = reply();
        let (tx2, mut rx2) = reply();
        broker.request(OBJECT, tx1);
        broker.request(OBJECT, tx2);
        broker.resolve(OBJECT, Err(OwnershipError::Denied));

        assert_eq!(rx1.try_recv().unwrap(), Err(OwnershipError::Denied));
        assert_eq!(rx2.try_recv().unwrap(), Err(OwnershipError::Denied));
        // Denial does not change the recorded owner.
        assert_eq!(broker.owner_of(&OBJECT), Some(Owner::Remote(owner)));
    }

    #[test]
    fn test_grant_flips_owner_to_requester() {
        let mut broker = OwnershipBroker::new();
        broker.register(OBJECT);
        let requester = PeerId::random();
        assert!(broker.handle_remote_request(OBJECT, requester, true));
        assert_eq!(broker.owner_of(&OBJECT), Some(Owner::Remote(requester)));
        // A second request after the grant is refused: no longer the owner.
        assert!(!broker.handle_remote_request(OBJECT, PeerId::random(), true));
    }

    #[test]
    fn test_policy_veto_denies() {
        let mut broker = OwnershipBroker::new();
        broker.register(OBJECT);
        let requester = PeerId::random();
        assert!(!broker.handle_remote_request(OBJECT, requester, false));
        assert!(broker.is_owned_locally(&OBJECT));
    }

    #[test]
    fn test_announce_never_overrides_local_ownership() {
        let mut broker = OwnershipBroker::new();
        broker.register(OBJECT);
        broker.handle_announce(OBJECT, PeerId::random());
        assert!(broker.is_owned_locally(&OBJECT));
    }

    #[test]
    fn test_fail_all_wakes_waiters_with_error() {
        let mut broker = OwnershipBroker::new();
        broker.handle_announce(OBJECT, PeerId::random());
        let (tx, mut rx) = reply();
        broker.request(OBJECT, tx);
        broker.fail_all(OwnershipError::SessionClosed);
        assert_eq!(rx.try_recv().unwrap(), Err(OwnershipError::SessionClosed));
        assert!(!broker.has_pending(&OBJECT));
    }

    #[test]
    fn test_timeout_reported_as_timed_out() {
        let mut broker = OwnershipBroker::new();
        broker.handle_announce(OBJECT, PeerId::random());
        let (tx, mut rx) = reply();
        broker.request(OBJECT, tx);
        broker.resolve(OBJECT, Err(OwnershipError::TimedOut));
        assert_eq!(rx.try_recv().unwrap(), Err(OwnershipError::TimedOut));
    }
}
