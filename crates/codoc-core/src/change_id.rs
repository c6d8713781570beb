//! Change identifiers.
//!
//! A change id names one change produced by one actor: its client-local
//! sequence number, the server-assigned sequence (zero until acknowledged),
//! and the Lamport stamp under which its tickets were issued.

use crate::actor::ActorID;
use crate::ticket::Ticket;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a single change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeID {
    client_seq: u32,
    server_seq: u64,
    lamport: u64,
    actor: ActorID,
}

impl ChangeID {
    /// The id state of a fresh replica: nothing issued yet.
    pub fn initial() -> Self {
        ChangeID {
            client_seq: 0,
            server_seq: 0,
            lamport: 0,
            actor: ActorID::INITIAL,
        }
    }

    /// Create a change id.
    pub fn new(client_seq: u32, lamport: u64, actor: ActorID) -> Self {
        ChangeID {
            client_seq,
            server_seq: 0,
            lamport,
            actor,
        }
    }

    /// The client-local sequence number.
    pub fn client_seq(&self) -> u32 {
        self.client_seq
    }

    /// The server-assigned sequence number, zero until acknowledged.
    pub fn server_seq(&self) -> u64 {
        self.server_seq
    }

    /// The lamport stamp.
    pub fn lamport(&self) -> u64 {
        self.lamport
    }

    /// The issuing actor.
    pub fn actor(&self) -> ActorID {
        self.actor
    }

    /// The id of the next local change: client sequence and lamport both
    /// advance by one.
    pub fn next(&self) -> ChangeID {
        ChangeID {
            client_seq: self.client_seq + 1,
            server_seq: 0,
            lamport: self.lamport + 1,
            actor: self.actor,
        }
    }

    /// Advance the lamport past a remotely observed stamp:
    /// `max(local, remote) + 1`.
    pub fn sync_lamport(&self, remote_lamport: u64) -> ChangeID {
        ChangeID {
            lamport: self.lamport.max(remote_lamport) + 1,
            ..*self
        }
    }

    /// The same id under a different actor.
    pub fn with_actor(&self, actor: ActorID) -> ChangeID {
        ChangeID { actor, ..*self }
    }

    /// The same id with a server sequence assigned.
    pub fn with_server_seq(&self, server_seq: u64) -> ChangeID {
        ChangeID {
            server_seq,
            ..*self
        }
    }

    /// Issue the ticket with the given delimiter under this id's clock.
    pub fn ticket(&self, delimiter: u32) -> Ticket {
        Ticket::new(self.lamport, delimiter, self.actor)
    }
}

impl fmt::Display for ChangeID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.client_seq, self.lamport, self.actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_advances_both_counters() {
        let id = ChangeID::initial();
        let next = id.next();
        assert_eq!(next.client_seq(), 1);
        assert_eq!(next.lamport(), 1);

        let after = next.next();
        assert_eq!(after.client_seq(), 2);
        assert_eq!(after.lamport(), 2);
    }

    #[test]
    fn test_sync_lamport() {
        let id = ChangeID::new(3, 5, ActorID::INITIAL);

        // Remote behind: local still advances.
        assert_eq!(id.sync_lamport(2).lamport(), 6);
        // Remote ahead: jump past it.
        assert_eq!(id.sync_lamport(9).lamport(), 10);
        // Client sequence is untouched either way.
        assert_eq!(id.sync_lamport(9).client_seq(), 3);
    }

    #[test]
    fn test_ticket_issuance() {
        let actor = ActorID::random();
        let id = ChangeID::new(1, 7, actor);

        let t0 = id.ticket(1);
        let t1 = id.ticket(2);
        assert_eq!(t0.lamport(), 7);
        assert_eq!(t0.actor(), actor);
        assert!(t1.after(&t0));
    }

    #[test]
    fn test_with_actor() {
        let actor = ActorID::random();
        let id = ChangeID::new(1, 1, ActorID::INITIAL).with_actor(actor);
        assert_eq!(id.actor(), actor);
        assert_eq!(id.next().actor(), actor);
    }
}
