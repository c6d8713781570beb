//! Document events.

use crate::presence::Presence;
use std::collections::HashMap;

/// Capacity of a document's event channel. Presence is last-writer-wins, so
/// a lagging consumer losing stale events is harmless; a mutator must never
/// block on a slow consumer.
pub const EVENT_CAPACITY: usize = 1;

/// The kind of event that occurred in the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocEventType {
    /// A client established a connection and is now watching the document.
    Watched,
    /// The presences of clients editing the document changed.
    PresenceChanged,
}

/// An event emitted by a document, carrying the affected presences keyed by
/// actor id.
#[derive(Clone, Debug, PartialEq)]
pub struct DocEvent {
    pub event_type: DocEventType,
    pub presences: HashMap<String, Presence>,
}

impl DocEvent {
    /// A presence-changed event for a single actor.
    pub fn presence_changed(actor: String, presence: Presence) -> Self {
        DocEvent {
            event_type: DocEventType::PresenceChanged,
            presences: HashMap::from([(actor, presence)]),
        }
    }

    /// A watched event for a single actor.
    pub fn watched(actor: String, presence: Presence) -> Self {
        DocEvent {
            event_type: DocEventType::Watched,
            presences: HashMap::from([(actor, presence)]),
        }
    }
}
