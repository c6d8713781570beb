//! The document facade.
//!
//! User code edits through [`Document`], never against the authoritative
//! replica directly: updaters run against a deep-copied clone, and only an
//! updater that returns success has its recorded operations committed. A
//! failing updater poisons the clone and leaves the authoritative state
//! untouched.

use crate::change::Change;
use crate::context::ChangeContext;
use crate::error::{DocError, Result};
use crate::event::{DocEvent, EVENT_CAPACITY};
use crate::internal::{DocumentStatus, InternalDocument};
use crate::json::{self, JsonObject};
use crate::pack::ChangePack;
use crate::presence::{Presence, PresenceChange, PresenceMap, PresenceProxy};
use codoc_core::{ActorID, Checkpoint, DocumentKey, Ticket};
use codoc_crdt::Root;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::debug;

/// A document replica as seen by the user.
pub struct Document {
    doc: InternalDocument,
    clone_root: Option<Root>,
    clone_presences: Option<PresenceMap>,
    event_tx: broadcast::Sender<DocEvent>,
}

impl Document {
    /// Create a detached replica for the given key.
    pub fn new(key: DocumentKey) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Document {
            doc: InternalDocument::new(key),
            clone_root: None,
            clone_presences: None,
            event_tx,
        }
    }

    /// Subscribe to document events. The channel holds a single event;
    /// lagging consumers lose older ones, which is harmless because presence
    /// is last-writer-wins.
    pub fn subscribe(&self) -> broadcast::Receiver<DocEvent> {
        self.event_tx.subscribe()
    }

    /// Run an updater against the document.
    ///
    /// On success the authoritative state reflects exactly the operations
    /// the updater recorded, and they are queued as one local change. On
    /// failure the clone is dropped, the authoritative state is untouched,
    /// and the updater's error is returned as-is.
    pub fn update<F>(&mut self, updater: F) -> Result<()>
    where
        F: FnOnce(&mut JsonObject<'_, '_>, &mut PresenceProxy<'_>) -> Result<()>,
    {
        self.update_with_message("", updater)
    }

    /// [`Document::update`] with a change message.
    pub fn update_with_message<F>(&mut self, message: &str, updater: F) -> Result<()>
    where
        F: FnOnce(&mut JsonObject<'_, '_>, &mut PresenceProxy<'_>) -> Result<()>,
    {
        self.guard()?;
        if self.doc.status() == DocumentStatus::Removed {
            return Err(DocError::DocumentRemoved);
        }
        self.ensure_clone();

        let next_id = self.doc.change_id().next();
        let actor_key = next_id.actor().to_hex();

        let clone_root = self.clone_root.as_mut().expect("clone ensured");
        let clone_presences = self.clone_presences.as_mut().expect("clone ensured");
        let my_presence = clone_presences.load_or_store(&actor_key);

        let mut ctx = ChangeContext::new(next_id, message, clone_root);
        let mut presence_change: Option<PresenceChange> = None;

        let outcome = {
            let mut root_proxy = json::root_proxy(&mut ctx);
            let mut presence_proxy = PresenceProxy::new(my_presence, &mut presence_change);
            updater(&mut root_proxy, &mut presence_proxy)
        };

        if let Err(err) = outcome {
            // The clone is contaminated by whatever the updater did before
            // failing; the next update rebuilds it from the authoritative
            // state.
            self.clone_root = None;
            self.clone_presences = None;
            return Err(err);
        }

        if ctx.has_ops() || presence_change.is_some() {
            let change = ctx.into_change(presence_change);
            if let Err(err) = self.doc.execute_change(&change) {
                // The clone accepted what the authoritative graph refused.
                self.doc.mark_corrupted();
                self.clone_root = None;
                self.clone_presences = None;
                return Err(err);
            }
            self.doc.set_change_id(change.id());
            let has_presence = change.presence_change().is_some();
            debug!(
                client_seq = change.client_seq(),
                ops = change.operations().len(),
                "staged local change"
            );
            self.doc.append_local_change(change);

            if has_presence {
                let presence = self.doc.my_presence();
                self.publish(DocEvent::presence_changed(actor_key, presence));
            }
        }
        Ok(())
    }

    /// Apply a pack received from the server.
    ///
    /// Changes are validated against the clone before touching the
    /// authoritative state; a pack that fails validation is rejected whole,
    /// with the authoritative state unmodified and the clone dropped.
    pub fn apply_change_pack(&mut self, pack: &ChangePack) -> Result<()> {
        self.guard()?;

        if pack.has_snapshot() {
            self.clone_root = None;
            self.clone_presences = None;
            let snapshot = pack.snapshot.as_deref().expect("snapshot present");
            self.doc
                .apply_snapshot(snapshot, pack.checkpoint.server_seq())?;
        } else {
            self.ensure_clone();
            let validation: Result<()> = {
                let clone_root = self.clone_root.as_mut().expect("clone ensured");
                let clone_presences = self.clone_presences.as_mut().expect("clone ensured");
                pack.changes
                    .iter()
                    .try_for_each(|change| change.execute(clone_root, clone_presences))
            };
            if let Err(err) = validation {
                self.clone_root = None;
                self.clone_presences = None;
                return Err(err);
            }

            let events = match self.doc.apply_changes(&pack.changes) {
                Ok(events) => events,
                Err(err) => {
                    self.doc.mark_corrupted();
                    self.clone_root = None;
                    self.clone_presences = None;
                    return Err(err);
                }
            };
            for event in events {
                self.publish(event);
            }
        }

        self.doc.prune_local_changes(pack.checkpoint.client_seq());
        self.doc.forward_checkpoint(pack.checkpoint);
        self.garbage_collect(&pack.min_synced_ticket)?;

        if pack.is_removed {
            self.set_status(DocumentStatus::Removed);
        }
        Ok(())
    }

    /// Package the unacknowledged local changes for the server.
    pub fn create_change_pack(&self) -> ChangePack {
        self.doc.create_change_pack()
    }

    /// Purge tombstones whose removal every replica has observed. Runs on
    /// both the clone (if materialized) and the authoritative graph; returns
    /// the authoritative count.
    pub fn garbage_collect(&mut self, min_synced: &Ticket) -> Result<usize> {
        if let Some(clone_root) = self.clone_root.as_mut() {
            if let Err(err) = clone_root.garbage_collect(min_synced) {
                self.doc.mark_corrupted();
                self.clone_root = None;
                self.clone_presences = None;
                return Err(DocError::from(err));
            }
        }
        self.doc.garbage_collect(min_synced)
    }

    /// The count of garbage items currently held.
    pub fn garbage_len(&self) -> usize {
        self.doc.garbage_len()
    }

    /// The JSON encoding of the authoritative document.
    pub fn marshal(&self) -> String {
        self.doc.marshal()
    }

    /// A consistent read view of the staged document.
    ///
    /// Requires a non-removed replica; panics otherwise.
    pub fn root(&mut self) -> &Root {
        assert!(
            self.doc.status() != DocumentStatus::Removed,
            "document is removed"
        );
        self.ensure_clone();
        self.clone_root.as_ref().expect("clone ensured")
    }

    /// The document key.
    pub fn key(&self) -> &DocumentKey {
        self.doc.key()
    }

    /// The lifecycle status.
    pub fn status(&self) -> DocumentStatus {
        self.doc.status()
    }

    /// Set the lifecycle status. Entering `Removed` drops the clone; the
    /// replica accepts no further mutation.
    pub fn set_status(&mut self, status: DocumentStatus) {
        self.doc.set_status(status);
        if status == DocumentStatus::Removed {
            self.clone_root = None;
            self.clone_presences = None;
        }
    }

    /// Whether the replica is attached.
    pub fn is_attached(&self) -> bool {
        self.doc.is_attached()
    }

    /// The current checkpoint.
    pub fn checkpoint(&self) -> Checkpoint {
        self.doc.checkpoint()
    }

    /// Whether local changes await acknowledgement.
    pub fn has_local_changes(&self) -> bool {
        self.doc.has_local_changes()
    }

    /// The unacknowledged local changes.
    pub fn local_changes(&self) -> &[Change] {
        self.doc.local_changes()
    }

    /// The actor editing this replica.
    pub fn actor_id(&self) -> ActorID {
        self.doc.actor_id()
    }

    /// Install the server-assigned actor, rewriting pending local changes.
    /// The clone is dropped; it is rebuilt on the next access.
    pub fn set_actor(&mut self, actor: ActorID) {
        self.doc.set_actor(actor);
        self.clone_root = None;
        self.clone_presences = None;
    }

    /// All known presences, keyed by actor id.
    pub fn presences(&self) -> HashMap<String, Presence> {
        self.doc.presences().to_map()
    }

    /// The presence of a specific actor.
    pub fn presence(&self, actor: &ActorID) -> Option<Presence> {
        self.doc.presence(actor)
    }

    /// The local actor's presence.
    pub fn my_presence(&self) -> Presence {
        self.doc.my_presence()
    }

    /// The presence of an actor, only if online.
    pub fn online_presence(&self, actor: &ActorID) -> Option<Presence> {
        self.doc.online_presence(actor)
    }

    /// Replace the online client set.
    pub fn set_online_clients(&mut self, actors: impl IntoIterator<Item = ActorID>) {
        self.doc.set_online_clients(actors);
    }

    /// Mark an actor online. Publishes a watched event when the actor
    /// already has a known presence.
    pub fn add_online_client(&mut self, actor: &ActorID) {
        self.doc.add_online_client(actor);
        if let Some(presence) = self.doc.presence(actor) {
            self.publish(DocEvent::watched(actor.to_hex(), presence));
        }
    }

    /// Mark an actor offline.
    pub fn remove_online_client(&mut self, actor: &ActorID) {
        self.doc.remove_online_client(actor);
    }

    /// The authoritative replica, for inspection.
    pub fn internal(&self) -> &InternalDocument {
        &self.doc
    }

    /// Whether the staging clone is currently materialized.
    pub fn has_clone(&self) -> bool {
        self.clone_root.is_some()
    }

    fn ensure_clone(&mut self) {
        if self.clone_root.is_none() {
            self.clone_root = Some(self.doc.root().clone());
        }
        if self.clone_presences.is_none() {
            self.clone_presences = Some(self.doc.presences().clone());
        }
    }

    fn publish(&self, event: DocEvent) {
        // Send never blocks; without subscribers the event is dropped.
        let _ = self.event_tx.send(event);
    }

    fn guard(&self) -> Result<()> {
        if self.doc.is_corrupted() {
            Err(DocError::Corrupted(
                "replica previously failed an internal invariant".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_doc() -> Document {
        Document::new(DocumentKey::try_new("test-doc").unwrap())
    }

    #[test]
    fn test_update_commits_to_authoritative() {
        let mut doc = new_doc();
        doc.update(|root, _| root.set("x", 1i64)).unwrap();

        assert_eq!(doc.marshal(), r#"{"x":1}"#);
        assert!(doc.has_local_changes());
        assert_eq!(doc.local_changes()[0].client_seq(), 1);
    }

    #[test]
    fn test_failing_updater_poisons_only_the_clone() {
        let mut doc = new_doc();
        doc.update(|root, _| root.set("x", 1i64)).unwrap();

        let err = doc
            .update(|root, _| {
                root.set("y", 2i64)?;
                Err(DocError::Aborted("boom".to_string()))
            })
            .unwrap_err();

        assert_eq!(err, DocError::Aborted("boom".to_string()));
        assert_eq!(doc.marshal(), r#"{"x":1}"#);
        assert_eq!(doc.local_changes().len(), 1);
        assert!(!doc.has_clone());

        // The next update works against a fresh clone.
        doc.update(|root, _| root.set("z", 3i64)).unwrap();
        assert_eq!(doc.marshal(), r#"{"x":1,"z":3}"#);
    }

    #[test]
    fn test_update_on_removed_document_fails() {
        let mut doc = new_doc();
        doc.set_status(DocumentStatus::Removed);

        let err = doc.update(|root, _| root.set("x", 1i64)).unwrap_err();
        assert_eq!(err, DocError::DocumentRemoved);
    }

    #[test]
    fn test_local_presence_update_publishes_event() {
        let mut doc = new_doc();
        let mut events = doc.subscribe();

        doc.update(|_, presence| {
            presence.set("name", json!("alice"));
            Ok(())
        })
        .unwrap();

        let event = events.try_recv().unwrap();
        assert_eq!(event.event_type, crate::event::DocEventType::PresenceChanged);
        let presence = event.presences.values().next().unwrap();
        assert_eq!(presence.get("name"), Some(&json!("alice")));
    }

    #[test]
    fn test_empty_update_records_no_change() {
        let mut doc = new_doc();
        doc.update(|_, _| Ok(())).unwrap();

        assert!(!doc.has_local_changes());
        assert_eq!(doc.marshal(), "{}");
    }
}
