//! Object member table with last-writer-wins field semantics.

use codoc_core::Ticket;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Result of setting an object member.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberSet {
    /// The ticket that holds the field after the set.
    pub winner: Ticket,
    /// The previous holder, if it was displaced by this set.
    pub displaced: Option<Ticket>,
}

impl MemberSet {
    /// Whether the set installed the new value.
    pub fn inserted(&self, created_at: Ticket) -> bool {
        self.winner == created_at
    }
}

/// The member table of an object element.
///
/// Each key maps to the creation ticket of the element currently holding the
/// field; the element with the higher creation ticket wins a concurrent set.
/// A reverse ticket index supports O(1) purge during garbage collection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Ticket>", into = "BTreeMap<String, Ticket>")]
pub struct ObjectValue {
    members: HashMap<String, Ticket>,
    by_ticket: HashMap<Ticket, String>,
}

impl ObjectValue {
    /// Create an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a member. The higher creation ticket keeps the field; the loser is
    /// reported so the caller can tombstone it.
    pub fn set(&mut self, key: &str, created_at: Ticket) -> MemberSet {
        match self.members.get(key).copied() {
            Some(current) if !created_at.after(&current) => MemberSet {
                winner: current,
                displaced: None,
            },
            current => {
                if let Some(old) = current {
                    self.by_ticket.remove(&old);
                }
                self.members.insert(key.to_string(), created_at);
                self.by_ticket.insert(created_at, key.to_string());
                MemberSet {
                    winner: created_at,
                    displaced: current,
                }
            }
        }
    }

    /// The ticket currently holding a member.
    pub fn get(&self, key: &str) -> Option<Ticket> {
        self.members.get(key).copied()
    }

    /// Whether the given ticket currently holds a member.
    pub fn holds(&self, ticket: &Ticket) -> bool {
        self.by_ticket.contains_key(ticket)
    }

    /// Drop the member held by a purged child, returning its key.
    pub fn purge(&mut self, ticket: &Ticket) -> Option<String> {
        let key = self.by_ticket.remove(ticket)?;
        self.members.remove(&key);
        Some(key)
    }

    /// Iterate over (key, ticket) members. Removed children are filtered by
    /// the caller, which owns the arena.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Ticket)> {
        self.members.iter()
    }

    /// The tickets of all current members.
    pub fn member_tickets(&self) -> Vec<Ticket> {
        self.members.values().copied().collect()
    }
}

impl From<BTreeMap<String, Ticket>> for ObjectValue {
    fn from(members: BTreeMap<String, Ticket>) -> Self {
        let by_ticket = members.iter().map(|(k, t)| (*t, k.clone())).collect();
        ObjectValue {
            members: members.into_iter().collect(),
            by_ticket,
        }
    }
}

impl From<ObjectValue> for BTreeMap<String, Ticket> {
    fn from(value: ObjectValue) -> Self {
        value.members.into_iter().collect()
    }
}
