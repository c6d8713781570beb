//! Elements - the nodes of the document tree.

use crate::array::ArrayValue;
use crate::object::ObjectValue;
use crate::text::TextValue;
use crate::value::PrimitiveValue;
use codoc_core::Ticket;
use serde::{Deserialize, Serialize};

/// The variant-specific body of an element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ElementBody {
    Primitive(PrimitiveValue),
    Counter(i64),
    Object(ObjectValue),
    Array(ArrayValue),
    Text(TextValue),
    RichText(TextValue),
}

impl ElementBody {
    /// The variant name, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            ElementBody::Primitive(_) => "primitive",
            ElementBody::Counter(_) => "counter",
            ElementBody::Object(_) => "object",
            ElementBody::Array(_) => "array",
            ElementBody::Text(_) => "text",
            ElementBody::RichText(_) => "rich text",
        }
    }
}

/// A node of the document tree.
///
/// An element is identified by its creation ticket for its entire life.
/// Containers reference children by ticket; the parent is likewise held as a
/// ticket handle and resolved through the arena, so the tree owns no
/// back-references.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Element {
    created_at: Ticket,
    parent: Option<Ticket>,
    removed_at: Option<Ticket>,
    body: ElementBody,
}

impl Element {
    /// Create an element.
    pub fn new(created_at: Ticket, parent: Option<Ticket>, body: ElementBody) -> Self {
        Element {
            created_at,
            parent,
            removed_at: None,
            body,
        }
    }

    /// The creation ticket.
    pub fn created_at(&self) -> Ticket {
        self.created_at
    }

    /// The parent's creation ticket, `None` for the root object.
    pub fn parent(&self) -> Option<Ticket> {
        self.parent
    }

    /// The removal ticket, if tombstoned.
    pub fn removed_at(&self) -> Option<Ticket> {
        self.removed_at
    }

    /// Whether the element is tombstoned.
    pub fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }

    /// Tombstone the element. The first removal wins; a stamp that is not
    /// after the creation ticket is refused.
    pub fn remove(&mut self, removed_at: Ticket) -> bool {
        if self.removed_at.is_none() && removed_at.after(&self.created_at) {
            self.removed_at = Some(removed_at);
            true
        } else {
            false
        }
    }

    /// The body.
    pub fn body(&self) -> &ElementBody {
        &self.body
    }

    /// The body, mutably.
    pub fn body_mut(&mut self) -> &mut ElementBody {
        &mut self.body
    }

    /// The tickets of the element's children, if it is a container.
    /// Text chunks are internal to the text body and are not elements.
    pub fn child_tickets(&self) -> Vec<Ticket> {
        match &self.body {
            ElementBody::Object(obj) => obj.member_tickets(),
            ElementBody::Array(arr) => arr.child_tickets(),
            _ => Vec::new(),
        }
    }

    /// Detach a purged child from the container's index.
    pub fn purge_child(&mut self, ticket: &Ticket) -> bool {
        match &mut self.body {
            ElementBody::Object(obj) => obj.purge(ticket).is_some(),
            ElementBody::Array(arr) => arr.purge(ticket),
            _ => false,
        }
    }

    /// The highest lamport stamped anywhere on this element.
    pub fn max_lamport(&self) -> u64 {
        let mut max = self.created_at.lamport();
        if let Some(removed_at) = self.removed_at {
            max = max.max(removed_at.lamport());
        }
        if let ElementBody::Text(text) | ElementBody::RichText(text) = &self.body {
            max = max.max(text.max_lamport());
        }
        max
    }
}
