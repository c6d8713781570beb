//! Tickets - totally ordered logical timestamps.
//!
//! A ticket is the creation/removal stamp of every CRDT node and the
//! execution stamp of every operation. Tickets are immutable once assigned
//! and compare lexicographically on (lamport, delimiter, actor), which gives
//! a total order consistent with causality.

use crate::actor::ActorID;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Delimiter of the first ticket issued within an update.
pub const INITIAL_DELIMITER: u32 = 0;

/// A globally unique, totally ordered logical timestamp.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ticket {
    lamport: u64,
    delimiter: u32,
    actor: ActorID,
}

impl Ticket {
    /// The minimum ticket. The root object of every document is created at
    /// this ticket, and containers use it as their virtual head.
    pub const INITIAL: Ticket = Ticket {
        lamport: 0,
        delimiter: INITIAL_DELIMITER,
        actor: ActorID::INITIAL,
    };

    /// The maximum ticket. Garbage collecting at this ticket purges every
    /// tombstone unconditionally.
    pub const MAX: Ticket = Ticket {
        lamport: u64::MAX,
        delimiter: u32::MAX,
        actor: ActorID::MAX,
    };

    /// Create a ticket.
    pub fn new(lamport: u64, delimiter: u32, actor: ActorID) -> Self {
        Ticket {
            lamport,
            delimiter,
            actor,
        }
    }

    /// The lamport component.
    pub fn lamport(&self) -> u64 {
        self.lamport
    }

    /// The delimiter component.
    pub fn delimiter(&self) -> u32 {
        self.delimiter
    }

    /// The issuing actor.
    pub fn actor(&self) -> ActorID {
        self.actor
    }

    /// Whether this ticket is strictly after the other.
    pub fn after(&self, other: &Ticket) -> bool {
        self > other
    }

    /// The same ticket stamped with a different actor. Used when a replica
    /// attaches and rewrites the tickets of its pending operations.
    pub fn with_actor(&self, actor: ActorID) -> Ticket {
        Ticket {
            lamport: self.lamport,
            delimiter: self.delimiter,
            actor,
        }
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.lamport, self.delimiter, self.actor)
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ticket({}:{}:{})", self.lamport, self.delimiter, self.actor)
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

    #[test]
    fn test_total_order() {
        let a = Ticket::new(1, 0, actor(1));
        let b = Ticket::new(1, 1, actor(1));
        let c = Ticket::new(2, 0, actor(1));
        let d = Ticket::new(2, 0, actor(2));

        assert!(b.after(&a));
        assert!(c.after(&b));
        assert!(d.after(&c));
        assert!(!a.after(&a));
    }

    #[test]
    fn test_bounds() {
        let t = Ticket::new(42, 7, ActorID::random());
        assert!(t.after(&Ticket::INITIAL));
        assert!(Ticket::MAX.after(&t));
    }

    #[test]
    fn test_with_actor() {
        let t = Ticket::new(3, 1, actor(1));
        let rewritten = t.with_actor(actor(9));
        assert_eq!(rewritten.lamport(), 3);
        assert_eq!(rewritten.delimiter(), 1);
        assert_eq!(rewritten.actor(), actor(9));
    }
}
