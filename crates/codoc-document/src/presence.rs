//! Presence - per-actor session metadata.
//!
//! Presence is not part of the document tree: it is a plain mapping from
//! actor to metadata, replicated with last-writer-wins semantics. A change
//! ships an actor's presence as a full-map replacement (or a clear), never a
//! per-key merge.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One actor's presence metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Presence(HashMap<String, serde_json::Value>);

impl Presence {
    /// Create empty presence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a metadata entry.
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }

    /// Get a metadata entry.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Iterate over entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The presence delta carried by a change: a full replacement of the
/// author's map, or a clear.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PresenceChange {
    Put(Presence),
    Clear,
}

/// All actors' presences, keyed by actor id in hex form.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceMap(HashMap<String, Presence>);

impl PresenceMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// An actor's presence, if known.
    pub fn load(&self, actor: &str) -> Option<&Presence> {
        self.0.get(actor)
    }

    /// An actor's presence, created empty if absent.
    pub fn load_or_store(&mut self, actor: &str) -> &mut Presence {
        self.0.entry(actor.to_string()).or_default()
    }

    /// Install an actor's presence, replacing any previous map.
    pub fn store(&mut self, actor: &str, presence: Presence) {
        self.0.insert(actor.to_string(), presence);
    }

    /// Drop an actor's presence.
    pub fn remove(&mut self, actor: &str) -> Option<Presence> {
        self.0.remove(actor)
    }

    /// Move an actor's presence under a new key, for actor rewrite.
    pub fn rename(&mut self, old: &str, new: &str) {
        if let Some(presence) = self.0.remove(old) {
            self.0.insert(new.to_string(), presence);
        }
    }

    /// Iterate over (actor, presence) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Presence)> {
        self.0.iter()
    }

    /// A plain map copy, for the read accessors and events.
    pub fn to_map(&self) -> HashMap<String, Presence> {
        self.0.clone()
    }
}

/// The presence handle passed to updaters.
///
/// Mutations are staged against the clone's presence entry and recorded as a
/// full-map replacement on the in-progress change.
pub struct PresenceProxy<'a> {
    presence: &'a mut Presence,
    recorded: &'a mut Option<PresenceChange>,
}

impl<'a> PresenceProxy<'a> {
    pub(crate) fn new(
        presence: &'a mut Presence,
        recorded: &'a mut Option<PresenceChange>,
    ) -> Self {
        PresenceProxy { presence, recorded }
    }

    /// Set a metadata entry on this actor's presence.
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.presence.set(key, value);
        *self.recorded = Some(PresenceChange::Put(self.presence.clone()));
    }

    /// Read back a staged entry.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.presence.get(key)
    }

    /// Erase this actor's presence entirely.
    pub fn clear(&mut self) {
        *self.presence = Presence::default();
        *self.recorded = Some(PresenceChange::Clear);
    }
}
