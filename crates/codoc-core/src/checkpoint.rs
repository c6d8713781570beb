//! Checkpoints - the last point at which client and server states agreed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A monotonic (server sequence, client sequence) pair.
///
/// The server sequence is the last change the server has durably applied for
/// this document; the client sequence is the last local change the server
/// has acknowledged. Checkpoints only ever move forward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    server_seq: u64,
    client_seq: u32,
}

impl Checkpoint {
    /// The checkpoint of a fresh replica.
    pub const INITIAL: Checkpoint = Checkpoint {
        server_seq: 0,
        client_seq: 0,
    };

    /// Create a checkpoint.
    pub fn new(server_seq: u64, client_seq: u32) -> Self {
        Checkpoint {
            server_seq,
            client_seq,
        }
    }

    /// The server sequence component.
    pub fn server_seq(&self) -> u64 {
        self.server_seq
    }

    /// The client sequence component.
    pub fn client_seq(&self) -> u32 {
        self.client_seq
    }

    /// Merge forward: component-wise maximum. Idempotent and commutative.
    pub fn forward(&self, other: &Checkpoint) -> Checkpoint {
        Checkpoint {
            server_seq: self.server_seq.max(other.server_seq),
            client_seq: self.client_seq.max(other.client_seq),
        }
    }

    /// The same checkpoint with the server sequence replaced. Used when a
    /// snapshot installs a new server high-water mark.
    pub fn with_server_seq(&self, server_seq: u64) -> Checkpoint {
        Checkpoint {
            server_seq,
            client_seq: self.client_seq,
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "serverSeq={}, clientSeq={}", self.server_seq, self.client_seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_takes_maxima() {
        let a = Checkpoint::new(10, 2);
        let b = Checkpoint::new(7, 5);

        let merged = a.forward(&b);
        assert_eq!(merged, Checkpoint::new(10, 5));
    }

    #[test]
    fn test_forward_idempotent_and_commutative() {
        let a = Checkpoint::new(3, 9);
        let b = Checkpoint::new(8, 1);

        assert_eq!(a.forward(&a), a);
        assert_eq!(a.forward(&b), b.forward(&a));
    }

    #[test]
    fn test_with_server_seq() {
        let cp = Checkpoint::new(3, 9).with_server_seq(42);
        assert_eq!(cp.server_seq(), 42);
        assert_eq!(cp.client_seq(), 9);
    }
}
