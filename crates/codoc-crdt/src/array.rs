//! Array element order - an RGA over child tickets.
//!
//! The array body stores only ordering: a doubly linked list of child
//! tickets rooted at a virtual head. Concurrent inserts after the same
//! element are ordered newest-first by creation ticket, which makes the
//! final order independent of delivery order.

use codoc_core::Ticket;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Links {
    prev: Ticket,
    next: Option<Ticket>,
}

/// The ordering structure of an array element.
///
/// The virtual head is keyed by [`Ticket::INITIAL`]; inserting after the
/// head prepends. Tombstoned children stay linked until purged so that
/// concurrent inserts anchored on them still resolve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Ticket>", into = "Vec<Ticket>")]
pub struct ArrayValue {
    links: HashMap<Ticket, Links>,
}

impl ArrayValue {
    /// Create an empty array.
    pub fn new() -> Self {
        let mut links = HashMap::new();
        links.insert(
            Ticket::INITIAL,
            Links {
                prev: Ticket::INITIAL,
                next: None,
            },
        );
        ArrayValue { links }
    }

    /// Whether the given child (or the virtual head) is linked.
    pub fn contains(&self, ticket: &Ticket) -> bool {
        self.links.contains_key(ticket)
    }

    /// Insert a child after `prev` (the virtual head for a prepend).
    ///
    /// Skips over concurrently inserted siblings with higher creation
    /// tickets so that every replica lands the child in the same slot.
    /// Returns false when `prev` is unknown, e.g. already purged.
    pub fn insert_after(&mut self, prev: Ticket, created_at: Ticket) -> bool {
        if !self.links.contains_key(&prev) || self.links.contains_key(&created_at) {
            return false;
        }

        let mut left = prev;
        while let Some(next) = self.links[&left].next {
            if !next.after(&created_at) {
                break;
            }
            left = next;
        }

        let next = self.links[&left].next;
        self.links.insert(
            created_at,
            Links {
                prev: left,
                next,
            },
        );
        self.links.get_mut(&left).unwrap().next = Some(created_at);
        if let Some(next) = next {
            self.links.get_mut(&next).unwrap().prev = created_at;
        }
        true
    }

    /// Unlink a purged child.
    pub fn purge(&mut self, ticket: &Ticket) -> bool {
        let Some(links) = self.links.remove(ticket) else {
            return false;
        };
        self.links.get_mut(&links.prev).unwrap().next = links.next;
        if let Some(next) = links.next {
            self.links.get_mut(&next).unwrap().prev = links.prev;
        }
        true
    }

    /// Child tickets in list order, tombstones included.
    pub fn iter(&self) -> impl Iterator<Item = Ticket> + '_ {
        let mut cursor = self.links[&Ticket::INITIAL].next;
        std::iter::from_fn(move || {
            let ticket = cursor?;
            cursor = self.links[&ticket].next;
            Some(ticket)
        })
    }

    /// All child tickets, in list order.
    pub fn child_tickets(&self) -> Vec<Ticket> {
        self.iter().collect()
    }
}

impl Default for ArrayValue {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Ticket>> for ArrayValue {
    fn from(ordered: Vec<Ticket>) -> Self {
        let mut array = ArrayValue::new();
        let mut prev = Ticket::INITIAL;
        for ticket in ordered {
            array.links.insert(
                ticket,
                Links {
                    prev,
                    next: None,
                },
            );
            array.links.get_mut(&prev).unwrap().next = Some(ticket);
            prev = ticket;
        }
        array
    }
}

impl From<ArrayValue> for Vec<Ticket> {
    fn from(value: ArrayValue) -> Self {
        value.child_tickets()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codoc_core::ActorID;

    fn ticket(lamport: u64) -> Ticket {
        Ticket::new(lamport, 1, ActorID::INITIAL)
    }

    #[test]
    fn test_append_order() {
        let mut array = ArrayValue::new();
        assert!(array.insert_after(Ticket::INITIAL, ticket(1)));
        assert!(array.insert_after(ticket(1), ticket(2)));
        assert!(array.insert_after(ticket(2), ticket(3)));

        assert_eq!(array.child_tickets(), vec![ticket(1), ticket(2), ticket(3)]);
    }

    #[test]
    fn test_concurrent_inserts_converge() {
        // Two replicas insert after the same anchor; either delivery order
        // must produce the same list.
        let mut forward = ArrayValue::new();
        forward.insert_after(Ticket::INITIAL, ticket(1));
        forward.insert_after(ticket(1), ticket(5));
        forward.insert_after(ticket(1), ticket(3));

        let mut reverse = ArrayValue::new();
        reverse.insert_after(Ticket::INITIAL, ticket(1));
        reverse.insert_after(ticket(1), ticket(3));
        reverse.insert_after(ticket(1), ticket(5));

        assert_eq!(forward.child_tickets(), reverse.child_tickets());
        assert_eq!(
            forward.child_tickets(),
            vec![ticket(1), ticket(5), ticket(3)]
        );
    }

    #[test]
    fn test_unknown_anchor_rejected() {
        let mut array = ArrayValue::new();
        assert!(!array.insert_after(ticket(9), ticket(10)));
        assert!(array.child_tickets().is_empty());
    }

    #[test]
    fn test_purge_unlinks() {
        let mut array = ArrayValue::new();
        array.insert_after(Ticket::INITIAL, ticket(1));
        array.insert_after(ticket(1), ticket(2));
        array.insert_after(ticket(2), ticket(3));

        assert!(array.purge(&ticket(2)));
        assert_eq!(array.child_tickets(), vec![ticket(1), ticket(3)]);
        assert!(!array.purge(&ticket(2)));

        // Inserting after a purged anchor is refused.
        assert!(!array.insert_after(ticket(2), ticket(4)));
    }

    #[test]
    fn test_serde_round_trip() {
        let mut array = ArrayValue::new();
        array.insert_after(Ticket::INITIAL, ticket(1));
        array.insert_after(ticket(1), ticket(2));

        let json = serde_json::to_string(&array).unwrap();
        let back: ArrayValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back.child_tickets(), array.child_tickets());

        // Links are rebuilt, not just the order.
        let mut back = back;
        assert!(back.insert_after(ticket(1), ticket(7)));
        assert_eq!(
            back.child_tickets(),
            vec![ticket(1), ticket(7), ticket(2)]
        );
    }
}
