//! Root of the element graph.
//!
//! `Root` owns every element in an arena keyed by creation ticket. The arena
//! doubles as the lookup index operations use to resolve their targets, and
//! a side set tracks tombstoned elements until garbage collection proves
//! every replica has seen their removal.

use crate::element::{Element, ElementBody};
use codoc_core::Ticket;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Fatal inconsistency between the arena and the tombstone set.
///
/// A replica that observes this is permanently unusable; the document layer
/// surfaces it and refuses further mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("corrupted element graph: {0}")]
pub struct CorruptedGraph(pub String);

/// The authoritative element graph of one document replica.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RootRepr", into = "RootRepr")]
pub struct Root {
    /// Every live or tombstoned element, keyed by creation ticket.
    nodes: HashMap<Ticket, Element>,
    /// Creation tickets of tombstoned elements awaiting purge.
    removed: HashSet<Ticket>,
}

impl Root {
    /// Create a graph holding only the empty root object, created at the
    /// initial ticket.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            Ticket::INITIAL,
            Element::new(Ticket::INITIAL, None, ElementBody::Object(Default::default())),
        );
        Root {
            nodes,
            removed: HashSet::new(),
        }
    }

    /// The root object's creation ticket.
    pub fn root_ticket() -> Ticket {
        Ticket::INITIAL
    }

    /// Look up an element by creation ticket.
    pub fn find(&self, ticket: &Ticket) -> Option<&Element> {
        self.nodes.get(ticket)
    }

    /// Look up an element mutably.
    pub fn find_mut(&mut self, ticket: &Ticket) -> Option<&mut Element> {
        self.nodes.get_mut(ticket)
    }

    /// Whether an element is registered.
    pub fn contains(&self, ticket: &Ticket) -> bool {
        self.nodes.contains_key(ticket)
    }

    /// Register a freshly created element. Re-registering an existing ticket
    /// is ignored; element identity is immutable.
    pub fn register(&mut self, element: Element) {
        self.nodes.entry(element.created_at()).or_insert(element);
    }

    /// Tombstone an element. Returns false if the element is unknown, already
    /// removed, or the stamp does not follow its creation.
    pub fn tombstone(&mut self, ticket: &Ticket, removed_at: Ticket) -> bool {
        let Some(element) = self.nodes.get_mut(ticket) else {
            return false;
        };
        if element.remove(removed_at) {
            self.removed.insert(*ticket);
            true
        } else {
            false
        }
    }

    /// The number of registered elements, tombstones included.
    pub fn elements_len(&self) -> usize {
        self.nodes.len()
    }

    /// The number of garbage items held: tombstoned elements, their
    /// descendants, and tombstoned text chunks.
    pub fn garbage_len(&self) -> usize {
        let mut seen = HashSet::new();
        for ticket in &self.removed {
            self.collect_subtree(*ticket, &mut seen);
        }
        let mut count = seen.len();
        for element in self.nodes.values() {
            if let ElementBody::Text(text) | ElementBody::RichText(text) = element.body() {
                count += text.removed_len();
            }
        }
        count
    }

    /// Purge every tombstone removed at or before `min_synced`. Returns the
    /// number of elements and text chunks released.
    pub fn garbage_collect(&mut self, min_synced: &Ticket) -> Result<usize, CorruptedGraph> {
        let mut targets = Vec::new();
        for ticket in &self.removed {
            let Some(element) = self.nodes.get(ticket) else {
                return Err(CorruptedGraph(format!(
                    "tombstone set references missing element {ticket}"
                )));
            };
            let Some(removed_at) = element.removed_at() else {
                return Err(CorruptedGraph(format!(
                    "tombstone set references live element {ticket}"
                )));
            };
            if !removed_at.after(min_synced) {
                targets.push(*ticket);
            }
        }

        let mut count = 0;
        for ticket in targets {
            // May already be gone as a descendant of an earlier target.
            if !self.nodes.contains_key(&ticket) {
                continue;
            }
            if let Some(parent) = self.nodes[&ticket].parent() {
                if let Some(parent_elem) = self.nodes.get_mut(&parent) {
                    parent_elem.purge_child(&ticket);
                }
            }
            count += self.purge_subtree(ticket);
        }

        for element in self.nodes.values_mut() {
            if let ElementBody::Text(text) | ElementBody::RichText(text) = element.body_mut() {
                count += text.purge_removed_before(min_synced);
            }
        }

        Ok(count)
    }

    /// The highest lamport stamped anywhere in the graph. Used to rebuild
    /// the logical clock after a snapshot installs fresh state.
    pub fn max_lamport(&self) -> u64 {
        self.nodes
            .values()
            .map(Element::max_lamport)
            .max()
            .unwrap_or(0)
    }

    /// The canonical JSON encoding of the visible document.
    pub fn marshal(&self) -> String {
        self.to_json().to_string()
    }

    /// The visible document as a `serde_json::Value`.
    pub fn to_json(&self) -> serde_json::Value {
        self.element_to_json(&Ticket::INITIAL)
    }

    fn element_to_json(&self, ticket: &Ticket) -> serde_json::Value {
        let Some(element) = self.nodes.get(ticket) else {
            return serde_json::Value::Null;
        };
        match element.body() {
            ElementBody::Primitive(value) => value.to_json(),
            ElementBody::Counter(n) => serde_json::Value::Number((*n).into()),
            ElementBody::Object(object) => {
                let mut map = serde_json::Map::new();
                for (key, child) in object.iter() {
                    if self.is_visible(child) {
                        map.insert(key.clone(), self.element_to_json(child));
                    }
                }
                serde_json::Value::Object(map)
            }
            ElementBody::Array(array) => serde_json::Value::Array(
                array
                    .iter()
                    .filter(|child| self.is_visible(child))
                    .map(|child| self.element_to_json(&child))
                    .collect(),
            ),
            ElementBody::Text(text) => serde_json::Value::String(text.to_plain()),
            ElementBody::RichText(text) => serde_json::Value::Array(
                text.spans()
                    .into_iter()
                    .map(|(attrs, content)| {
                        serde_json::json!({ "attrs": attrs, "val": content })
                    })
                    .collect(),
            ),
        }
    }

    fn is_visible(&self, ticket: &Ticket) -> bool {
        self.nodes
            .get(ticket)
            .is_some_and(|element| !element.is_removed())
    }

    fn purge_subtree(&mut self, ticket: Ticket) -> usize {
        let Some(element) = self.nodes.remove(&ticket) else {
            return 0;
        };
        self.removed.remove(&ticket);
        let mut count = 1;
        for child in element.child_tickets() {
            count += self.purge_subtree(child);
        }
        count
    }

    fn collect_subtree(&self, ticket: Ticket, seen: &mut HashSet<Ticket>) {
        if !self.nodes.contains_key(&ticket) || !seen.insert(ticket) {
            return;
        }
        if let Some(element) = self.nodes.get(&ticket) {
            for child in element.child_tickets() {
                self.collect_subtree(child, seen);
            }
        }
    }
}

impl Default for Root {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized form: elements ordered by creation ticket.
#[derive(Serialize, Deserialize)]
struct RootRepr {
    elements: Vec<Element>,
    removed: Vec<Ticket>,
}

impl From<Root> for RootRepr {
    fn from(root: Root) -> Self {
        let mut elements: Vec<Element> = root.nodes.into_values().collect();
        elements.sort_by_key(Element::created_at);
        let mut removed: Vec<Ticket> = root.removed.into_iter().collect();
        removed.sort();
        RootRepr { elements, removed }
    }
}

impl From<RootRepr> for Root {
    fn from(repr: RootRepr) -> Self {
        Root {
            nodes: repr
                .elements
                .into_iter()
                .map(|element| (element.created_at(), element))
                .collect(),
            removed: repr.removed.into_iter().collect(),
        }
    }
}
