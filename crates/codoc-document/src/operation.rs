//! Operations - the replicated mutations inside a change.
//!
//! Every operation carries the ticket it executed at and the creation ticket
//! of the container it targets. An operation whose target is no longer in
//! the element index is dropped without error: redelivered or stale
//! operations must be harmless.

use crate::error::{DocError, Result};
use codoc_core::{ActorID, Ticket};
use codoc_crdt::{Element, ElementBody, PrimitiveValue, Root, TextPos};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

/// The payload of a creation operation: the body the new element starts
/// with. Containers are always created empty and filled by subsequent
/// operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ElementSeed {
    Primitive(PrimitiveValue),
    Counter(i64),
    Object,
    Array,
    Text,
    RichText,
}

impl ElementSeed {
    fn to_body(&self) -> ElementBody {
        match self {
            ElementSeed::Primitive(value) => ElementBody::Primitive(value.clone()),
            ElementSeed::Counter(n) => ElementBody::Counter(*n),
            ElementSeed::Object => ElementBody::Object(Default::default()),
            ElementSeed::Array => ElementBody::Array(Default::default()),
            ElementSeed::Text => ElementBody::Text(Default::default()),
            ElementSeed::RichText => ElementBody::RichText(Default::default()),
        }
    }
}

/// A single replicated mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Set an object member. The new element is created at `executed_at`;
    /// the higher creation ticket wins a concurrent set of the same key.
    Set {
        parent_created_at: Ticket,
        key: String,
        value: ElementSeed,
        executed_at: Ticket,
    },
    /// Insert an array element after `prev_created_at` (the initial ticket
    /// anchors at the array head).
    Add {
        parent_created_at: Ticket,
        prev_created_at: Ticket,
        value: ElementSeed,
        executed_at: Ticket,
    },
    /// Tombstone the element created at `created_at`.
    Remove {
        parent_created_at: Ticket,
        created_at: Ticket,
        executed_at: Ticket,
    },
    /// Replace a text range. `max_created_by_actor` is the editor's causal
    /// knowledge; chunks it had not seen survive the deletion.
    Edit {
        parent_created_at: Ticket,
        from: TextPos,
        to: TextPos,
        content: String,
        max_created_by_actor: HashMap<ActorID, Ticket>,
        executed_at: Ticket,
    },
    /// Apply attributes over a rich text range, last writer wins per key.
    Style {
        parent_created_at: Ticket,
        from: TextPos,
        to: TextPos,
        attributes: BTreeMap<String, String>,
        executed_at: Ticket,
    },
    /// Add a delta to a counter.
    Increase {
        parent_created_at: Ticket,
        delta: i64,
        executed_at: Ticket,
    },
}

impl Operation {
    /// The ticket this operation executed at.
    pub fn executed_at(&self) -> Ticket {
        match self {
            Operation::Set { executed_at, .. }
            | Operation::Add { executed_at, .. }
            | Operation::Remove { executed_at, .. }
            | Operation::Edit { executed_at, .. }
            | Operation::Style { executed_at, .. }
            | Operation::Increase { executed_at, .. } => *executed_at,
        }
    }

    /// The creation ticket of the container this operation targets.
    pub fn parent_created_at(&self) -> Ticket {
        match self {
            Operation::Set {
                parent_created_at, ..
            }
            | Operation::Add {
                parent_created_at, ..
            }
            | Operation::Remove {
                parent_created_at, ..
            }
            | Operation::Edit {
                parent_created_at, ..
            }
            | Operation::Style {
                parent_created_at, ..
            }
            | Operation::Increase {
                parent_created_at, ..
            } => *parent_created_at,
        }
    }

    /// Rewrite the executing actor, for pending changes staged before the
    /// server assigned this replica its identity.
    pub fn set_actor(&mut self, actor: ActorID) {
        match self {
            Operation::Set { executed_at, .. }
            | Operation::Add { executed_at, .. }
            | Operation::Remove { executed_at, .. }
            | Operation::Edit { executed_at, .. }
            | Operation::Style { executed_at, .. }
            | Operation::Increase { executed_at, .. } => {
                *executed_at = executed_at.with_actor(actor);
            }
        }
    }

    /// Execute against a graph. Unknown targets are dropped silently; a
    /// target of the wrong variant is an error and fails the whole change.
    pub fn execute(&self, root: &mut Root) -> Result<()> {
        match self {
            Operation::Set {
                parent_created_at,
                key,
                value,
                executed_at,
            } => {
                let Some(parent) = root.find_mut(parent_created_at) else {
                    trace!(parent = %parent_created_at, "dropping set on unknown parent");
                    return Ok(());
                };
                let object = match parent.body_mut() {
                    ElementBody::Object(object) => object,
                    other => return Err(type_mismatch("object", other)),
                };
                let outcome = object.set(key, *executed_at);
                root.register(Element::new(
                    *executed_at,
                    Some(*parent_created_at),
                    value.to_body(),
                ));
                if let Some(displaced) = outcome.displaced {
                    root.tombstone(&displaced, *executed_at);
                }
                if !outcome.inserted(*executed_at) {
                    // Lost to a concurrent set: tombstone immediately so the
                    // loser is still resolvable until garbage collected.
                    root.tombstone(executed_at, outcome.winner);
                }
                Ok(())
            }
            Operation::Add {
                parent_created_at,
                prev_created_at,
                value,
                executed_at,
            } => {
                let Some(parent) = root.find_mut(parent_created_at) else {
                    trace!(parent = %parent_created_at, "dropping add on unknown parent");
                    return Ok(());
                };
                let array = match parent.body_mut() {
                    ElementBody::Array(array) => array,
                    other => return Err(type_mismatch("array", other)),
                };
                if !array.insert_after(*prev_created_at, *executed_at) {
                    trace!(prev = %prev_created_at, "dropping add on unknown anchor");
                    return Ok(());
                }
                root.register(Element::new(
                    *executed_at,
                    Some(*parent_created_at),
                    value.to_body(),
                ));
                Ok(())
            }
            Operation::Remove {
                parent_created_at,
                created_at,
                executed_at,
            } => {
                let Some(target) = root.find(created_at) else {
                    trace!(target = %created_at, "dropping remove on unknown element");
                    return Ok(());
                };
                if target.parent() != Some(*parent_created_at) {
                    trace!(target = %created_at, "dropping misdirected remove");
                    return Ok(());
                }
                root.tombstone(created_at, *executed_at);
                Ok(())
            }
            Operation::Edit {
                parent_created_at,
                from,
                to,
                content,
                max_created_by_actor,
                executed_at,
            } => {
                let Some(parent) = root.find_mut(parent_created_at) else {
                    trace!(parent = %parent_created_at, "dropping edit on unknown parent");
                    return Ok(());
                };
                let text = match parent.body_mut() {
                    ElementBody::Text(text) | ElementBody::RichText(text) => text,
                    other => return Err(type_mismatch("text", other)),
                };
                if text
                    .edit(*from, *to, content, *executed_at, Some(max_created_by_actor))
                    .is_none()
                {
                    trace!(parent = %parent_created_at, "dropping edit on unknown boundary");
                }
                Ok(())
            }
            Operation::Style {
                parent_created_at,
                from,
                to,
                attributes,
                executed_at,
            } => {
                let Some(parent) = root.find_mut(parent_created_at) else {
                    trace!(parent = %parent_created_at, "dropping style on unknown parent");
                    return Ok(());
                };
                let text = match parent.body_mut() {
                    ElementBody::RichText(text) => text,
                    other => return Err(type_mismatch("rich text", other)),
                };
                if text.style(*from, *to, attributes, *executed_at).is_none() {
                    trace!(parent = %parent_created_at, "dropping style on unknown boundary");
                }
                Ok(())
            }
            Operation::Increase {
                parent_created_at,
                delta,
                ..
            } => {
                let Some(parent) = root.find_mut(parent_created_at) else {
                    trace!(parent = %parent_created_at, "dropping increase on unknown counter");
                    return Ok(());
                };
                let n = match parent.body_mut() {
                    ElementBody::Counter(n) => n,
                    other => return Err(type_mismatch("counter", other)),
                };
                *n += delta;
                Ok(())
            }
        }
    }
}

fn type_mismatch(expected: &str, found: &ElementBody) -> DocError {
    DocError::TypeMismatch {
        expected: expected.to_string(),
        found: found.type_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(last: u8) -> ActorID {
        let mut bytes = [0u8; 12];
        bytes[11] = last;
        ActorID::from_bytes(bytes)
    }

    fn ticket(lamport: u64, a: u8) -> Ticket {
        Ticket::new(lamport, 1, actor(a))
    }

    fn set_op(key: &str, value: i64, at: Ticket) -> Operation {
        Operation::Set {
            parent_created_at: Root::root_ticket(),
            key: key.to_string(),
            value: ElementSeed::Primitive(PrimitiveValue::Integer(value)),
            executed_at: at,
        }
    }

    #[test]
    fn test_set_and_marshal() {
        let mut root = Root::new();
        set_op("x", 1, ticket(1, 1)).execute(&mut root).unwrap();

        assert_eq!(root.marshal(), r#"{"x":1}"#);
    }

    #[test]
    fn test_concurrent_set_higher_ticket_wins_either_order() {
        let older = set_op("k", 1, ticket(5, 1));
        let newer = set_op("k", 2, ticket(6, 2));

        let mut forward = Root::new();
        older.execute(&mut forward).unwrap();
        newer.execute(&mut forward).unwrap();

        let mut reverse = Root::new();
        newer.execute(&mut reverse).unwrap();
        older.execute(&mut reverse).unwrap();

        assert_eq!(forward.marshal(), r#"{"k":2}"#);
        assert_eq!(forward.marshal(), reverse.marshal());
        // The loser is garbage on both sides.
        assert_eq!(forward.garbage_len(), 1);
        assert_eq!(reverse.garbage_len(), 1);
    }

    #[test]
    fn test_unknown_parent_dropped() {
        let mut root = Root::new();
        let op = Operation::Set {
            parent_created_at: ticket(99, 9),
            key: "x".to_string(),
            value: ElementSeed::Primitive(PrimitiveValue::Integer(1)),
            executed_at: ticket(100, 9),
        };

        op.execute(&mut root).unwrap();
        assert_eq!(root.marshal(), "{}");
        assert!(!root.contains(&ticket(100, 9)));
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let mut root = Root::new();
        set_op("x", 1, ticket(1, 1)).execute(&mut root).unwrap();

        let bad = Operation::Increase {
            parent_created_at: ticket(1, 1),
            delta: 1,
            executed_at: ticket(2, 1),
        };
        assert!(matches!(
            bad.execute(&mut root),
            Err(DocError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_array_add_and_remove() {
        let mut root = Root::new();
        let array_at = ticket(1, 1);
        Operation::Set {
            parent_created_at: Root::root_ticket(),
            key: "items".to_string(),
            value: ElementSeed::Array,
            executed_at: array_at,
        }
        .execute(&mut root)
        .unwrap();

        let first = ticket(2, 1);
        Operation::Add {
            parent_created_at: array_at,
            prev_created_at: Ticket::INITIAL,
            value: ElementSeed::Primitive(PrimitiveValue::from("a")),
            executed_at: first,
        }
        .execute(&mut root)
        .unwrap();
        Operation::Add {
            parent_created_at: array_at,
            prev_created_at: first,
            value: ElementSeed::Primitive(PrimitiveValue::from("b")),
            executed_at: ticket(3, 1),
        }
        .execute(&mut root)
        .unwrap();

        assert_eq!(root.marshal(), r#"{"items":["a","b"]}"#);

        Operation::Remove {
            parent_created_at: array_at,
            created_at: first,
            executed_at: ticket(4, 1),
        }
        .execute(&mut root)
        .unwrap();

        assert_eq!(root.marshal(), r#"{"items":["b"]}"#);
        assert_eq!(root.garbage_len(), 1);
    }

    #[test]
    fn test_set_actor_rewrites_executed_at() {
        let mut op = set_op("x", 1, ticket(1, 0));
        let assigned = actor(7);
        op.set_actor(assigned);

        assert_eq!(op.executed_at().actor(), assigned);
        assert_eq!(op.executed_at().lamport(), 1);
    }

    #[test]
    fn test_increase() {
        let mut root = Root::new();
        let counter_at = ticket(1, 1);
        Operation::Set {
            parent_created_at: Root::root_ticket(),
            key: "votes".to_string(),
            value: ElementSeed::Counter(10),
            executed_at: counter_at,
        }
        .execute(&mut root)
        .unwrap();

        Operation::Increase {
            parent_created_at: counter_at,
            delta: 5,
            executed_at: ticket(2, 1),
        }
        .execute(&mut root)
        .unwrap();
        Operation::Increase {
            parent_created_at: counter_at,
            delta: -3,
            executed_at: ticket(3, 2),
        }
        .execute(&mut root)
        .unwrap();

        assert_eq!(root.marshal(), r#"{"votes":12}"#);
    }
}
