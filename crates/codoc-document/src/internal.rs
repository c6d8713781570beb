//! The authoritative replica state.

use crate::change::Change;
use crate::error::{DocError, Result};
use crate::event::DocEvent;
use crate::pack::{ChangePack, Snapshot};
use crate::presence::{Presence, PresenceMap};
use codoc_core::{ActorID, ChangeID, Checkpoint, DocumentKey, Ticket};
use codoc_crdt::Root;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Lifecycle status of a replica.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    /// Not connected to a server document.
    Detached,
    /// Attached; changes are being exchanged.
    Attached,
    /// Removed on the server. Terminal: all mutation fails.
    Removed,
}

/// The authoritative replica: the element graph, presences, local change
/// log, checkpoint, and lifecycle status. User code never touches this state
/// directly; the facade stages everything through a clone first.
#[derive(Clone, Debug)]
pub struct InternalDocument {
    key: DocumentKey,
    status: DocumentStatus,
    root: Root,
    presences: PresenceMap,
    online_clients: HashSet<String>,
    change_id: ChangeID,
    checkpoint: Checkpoint,
    local_changes: Vec<Change>,
    corrupted: bool,
}

impl InternalDocument {
    /// Create a detached replica for the given key.
    pub fn new(key: DocumentKey) -> Self {
        InternalDocument {
            key,
            status: DocumentStatus::Detached,
            root: Root::new(),
            presences: PresenceMap::new(),
            online_clients: HashSet::new(),
            change_id: ChangeID::initial(),
            checkpoint: Checkpoint::INITIAL,
            local_changes: Vec::new(),
            corrupted: false,
        }
    }

    /// The document key.
    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    /// The lifecycle status.
    pub fn status(&self) -> DocumentStatus {
        self.status
    }

    /// Set the lifecycle status.
    pub fn set_status(&mut self, status: DocumentStatus) {
        self.status = status;
    }

    /// Whether the replica is attached.
    pub fn is_attached(&self) -> bool {
        self.status == DocumentStatus::Attached
    }

    /// Whether an internal invariant violation has poisoned the replica.
    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }

    pub(crate) fn mark_corrupted(&mut self) {
        self.corrupted = true;
    }

    /// The actor currently editing this replica.
    pub fn actor_id(&self) -> ActorID {
        self.change_id.actor()
    }

    /// Install the server-assigned actor, rewriting every pending local
    /// change and the presence entry staged under the old identity. Tickets
    /// already applied to the authoritative graph are left as they are.
    pub fn set_actor(&mut self, actor: ActorID) {
        let old = self.change_id.actor();
        self.change_id = self.change_id.with_actor(actor);
        for change in &mut self.local_changes {
            change.set_actor(actor);
        }
        self.presences.rename(&old.to_hex(), &actor.to_hex());
    }

    /// The current change id.
    pub fn change_id(&self) -> ChangeID {
        self.change_id
    }

    pub(crate) fn set_change_id(&mut self, id: ChangeID) {
        self.change_id = id;
    }

    /// The current checkpoint.
    pub fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }

    /// Forward the checkpoint with a server-acknowledged one.
    pub fn forward_checkpoint(&mut self, other: Checkpoint) {
        self.checkpoint = self.checkpoint.forward(&other);
    }

    /// The authoritative element graph.
    pub fn root(&self) -> &Root {
        &self.root
    }

    /// Execute one change against the authoritative graph and presences.
    pub(crate) fn execute_change(&mut self, change: &Change) -> Result<()> {
        change.execute(&mut self.root, &mut self.presences)
    }

    /// All known presences.
    pub fn presences(&self) -> &PresenceMap {
        &self.presences
    }

    /// The presence of a specific actor.
    pub fn presence(&self, actor: &ActorID) -> Option<Presence> {
        self.presences.load(&actor.to_hex()).cloned()
    }

    /// The presence of the local actor.
    pub fn my_presence(&self) -> Presence {
        self.presence(&self.actor_id()).unwrap_or_default()
    }

    /// The presence of an actor, only if that actor is online.
    pub fn online_presence(&self, actor: &ActorID) -> Option<Presence> {
        if self.online_clients.contains(&actor.to_hex()) {
            self.presence(actor)
        } else {
            None
        }
    }

    /// Replace the online client set.
    pub fn set_online_clients(&mut self, actors: impl IntoIterator<Item = ActorID>) {
        self.online_clients = actors.into_iter().map(|a| a.to_hex()).collect();
    }

    /// Add an actor to the online set.
    pub fn add_online_client(&mut self, actor: &ActorID) {
        self.online_clients.insert(actor.to_hex());
    }

    /// Remove an actor from the online set.
    pub fn remove_online_client(&mut self, actor: &ActorID) {
        self.online_clients.remove(&actor.to_hex());
    }

    /// Whether any local changes await acknowledgement.
    pub fn has_local_changes(&self) -> bool {
        !self.local_changes.is_empty()
    }

    /// The unacknowledged local changes.
    pub fn local_changes(&self) -> &[Change] {
        &self.local_changes
    }

    pub(crate) fn append_local_change(&mut self, change: Change) {
        self.local_changes.push(change);
    }

    /// Drop local changes the server has acknowledged.
    pub fn prune_local_changes(&mut self, acked_client_seq: u32) {
        let before = self.local_changes.len();
        self.local_changes
            .retain(|change| change.client_seq() > acked_client_seq);
        let pruned = before - self.local_changes.len();
        if pruned > 0 {
            debug!(pruned, acked_client_seq, "pruned acknowledged local changes");
        }
    }

    /// Package the local changes for the server.
    pub fn create_change_pack(&self) -> ChangePack {
        ChangePack::new(
            self.key.clone(),
            self.checkpoint,
            self.local_changes.clone(),
        )
    }

    /// Apply remote changes in pack order, keeping the Lamport discipline and
    /// collecting a presence event per change that carried a delta.
    pub fn apply_changes(&mut self, changes: &[Change]) -> Result<Vec<DocEvent>> {
        let mut events = Vec::new();
        for change in changes {
            change.execute(&mut self.root, &mut self.presences)?;
            self.change_id = self.change_id.sync_lamport(change.id().lamport());

            if change.presence_change().is_some() {
                let actor = change.id().actor().to_hex();
                let presence = self.presences.load(&actor).cloned().unwrap_or_default();
                events.push(DocEvent::presence_changed(actor, presence));
            }
        }
        debug!(count = changes.len(), "applied remote changes");
        Ok(events)
    }

    /// Replace the state from a snapshot. Unacknowledged local changes
    /// survive and will be resent.
    pub fn apply_snapshot(&mut self, bytes: &[u8], server_seq: u64) -> Result<()> {
        let snapshot = Snapshot::decode(bytes)?;
        self.root = snapshot.root;
        self.presences = snapshot.presences;
        self.change_id = self.change_id.sync_lamport(self.root.max_lamport());
        self.checkpoint = self.checkpoint.with_server_seq(server_seq);
        debug!(server_seq, "applied snapshot");
        Ok(())
    }

    /// The count of garbage items currently held.
    pub fn garbage_len(&self) -> usize {
        self.root.garbage_len()
    }

    /// Purge tombstones safe at the given min-synced ticket.
    pub fn garbage_collect(&mut self, min_synced: &Ticket) -> Result<usize> {
        match self.root.garbage_collect(min_synced) {
            Ok(count) => {
                if count > 0 {
                    debug!(count, min_synced = %min_synced, "collected garbage");
                }
                Ok(count)
            }
            Err(err) => {
                self.corrupted = true;
                Err(DocError::from(err))
            }
        }
    }

    /// The JSON encoding of the document.
    pub fn marshal(&self) -> String {
        self.root.marshal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{ElementSeed, Operation};
    use crate::presence::PresenceChange;
    use codoc_crdt::PrimitiveValue;
    use serde_json::json;

    fn actor(last: u8) -> ActorID {
        let mut bytes = [0u8; 12];
        bytes[11] = last;
        ActorID::from_bytes(bytes)
    }

    fn key() -> DocumentKey {
        DocumentKey::try_new("test-doc").unwrap()
    }

    fn set_change(author: ActorID, client_seq: u32, lamport: u64, k: &str, v: i64) -> Change {
        Change::new(
            ChangeID::new(client_seq, lamport, author),
            "",
            vec![Operation::Set {
                parent_created_at: Root::root_ticket(),
                key: k.to_string(),
                value: ElementSeed::Primitive(PrimitiveValue::Integer(v)),
                executed_at: Ticket::new(lamport, 1, author),
            }],
            None,
        )
    }

    #[test]
    fn test_apply_changes_syncs_lamport() {
        let mut doc = InternalDocument::new(key());
        let remote = set_change(actor(2), 1, 9, "x", 1);

        doc.apply_changes(&[remote]).unwrap();
        assert_eq!(doc.marshal(), r#"{"x":1}"#);
        assert_eq!(doc.change_id().lamport(), 10);
    }

    #[test]
    fn test_prune_local_changes() {
        let mut doc = InternalDocument::new(key());
        for seq in 1..=3 {
            doc.append_local_change(set_change(actor(1), seq, seq as u64, "x", seq as i64));
        }

        doc.prune_local_changes(2);
        let remaining: Vec<u32> = doc.local_changes().iter().map(Change::client_seq).collect();
        assert_eq!(remaining, vec![3]);
    }

    #[test]
    fn test_set_actor_rewrites_pending_and_presence() {
        let mut doc = InternalDocument::new(key());
        let mut change = set_change(ActorID::INITIAL, 1, 1, "x", 1);
        let mut presence = Presence::new();
        presence.set("name", json!("alice"));
        change = Change::new(
            change.id(),
            "",
            change.operations().to_vec(),
            Some(PresenceChange::Put(presence.clone())),
        );
        doc.execute_change(&change).unwrap();
        doc.append_local_change(change);

        let assigned = actor(7);
        doc.set_actor(assigned);

        assert_eq!(doc.actor_id(), assigned);
        for change in doc.local_changes() {
            assert_eq!(change.id().actor(), assigned);
            for op in change.operations() {
                assert_eq!(op.executed_at().actor(), assigned);
            }
        }
        assert_eq!(doc.my_presence().get("name"), Some(&json!("alice")));
        assert!(doc.presences().load(&ActorID::INITIAL.to_hex()).is_none());
    }

    #[test]
    fn test_snapshot_preserves_local_changes() {
        let mut doc = InternalDocument::new(key());
        doc.append_local_change(set_change(actor(1), 1, 1, "mine", 1));

        let mut remote = InternalDocument::new(key());
        remote
            .apply_changes(&[set_change(actor(2), 1, 5, "theirs", 2)])
            .unwrap();
        let snapshot = Snapshot {
            root: remote.root().clone(),
            presences: remote.presences().clone(),
        };

        doc.apply_snapshot(&snapshot.encode().unwrap(), 42).unwrap();

        assert_eq!(doc.marshal(), r#"{"theirs":2}"#);
        assert!(doc.has_local_changes());
        assert_eq!(doc.checkpoint().server_seq(), 42);
        // Clock moved past the snapshot's high water mark.
        assert!(doc.change_id().lamport() > 5);
    }

    #[test]
    fn test_online_presence() {
        let mut doc = InternalDocument::new(key());
        let peer = actor(2);
        let mut change = set_change(peer, 1, 1, "x", 1);
        let mut presence = Presence::new();
        presence.set("name", json!("bob"));
        change = Change::new(change.id(), "", Vec::new(), Some(PresenceChange::Put(presence)));
        doc.apply_changes(&[change]).unwrap();

        assert!(doc.online_presence(&peer).is_none());
        doc.add_online_client(&peer);
        assert!(doc.online_presence(&peer).is_some());
        doc.remove_online_client(&peer);
        assert!(doc.online_presence(&peer).is_none());
    }

    #[test]
    fn test_presence_events_emitted_regardless_of_online_status() {
        let mut doc = InternalDocument::new(key());
        let peer = actor(2);

        // The online set is orthogonal to the presence map: a presence
        // change arriving before the peer is marked online still fires.
        let mut presence = Presence::new();
        presence.set("cursor", json!(1));
        let change = Change::new(
            ChangeID::new(1, 1, peer),
            "",
            Vec::new(),
            Some(PresenceChange::Put(presence)),
        );

        let events = doc.apply_changes(&[change]).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].presences[&peer.to_hex()].get("cursor"),
            Some(&json!(1))
        );

        doc.add_online_client(&peer);
        let change2 = Change::new(
            ChangeID::new(2, 2, peer),
            "",
            Vec::new(),
            Some(PresenceChange::Clear),
        );
        let events = doc.apply_changes(&[change2]).unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].presences[&peer.to_hex()].is_empty());
    }
}
