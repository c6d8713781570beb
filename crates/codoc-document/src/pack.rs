//! Change packs - the envelope exchanged with the server.

use crate::change::Change;
use crate::error::{DocError, Result};
use crate::presence::PresenceMap;
use codoc_core::{Checkpoint, DocumentKey, Ticket};
use codoc_crdt::Root;
use serde::{Deserialize, Serialize};

/// The unit shipped between client and server: either a list of changes or
/// a full snapshot, plus the checkpoint and GC metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangePack {
    /// The document this pack belongs to.
    pub document_key: DocumentKey,
    /// The latest point acknowledged by the server.
    pub checkpoint: Checkpoint,
    /// The changes, empty when a snapshot is present.
    pub changes: Vec<Change>,
    /// A full serialized state for catch-up; replaces the replica's state.
    pub snapshot: Option<Vec<u8>>,
    /// The cluster-wide minimum synced ticket, driving tombstone GC.
    pub min_synced_ticket: Ticket,
    /// Whether the document was removed on the server.
    pub is_removed: bool,
}

impl ChangePack {
    /// Create a pack of changes.
    pub fn new(
        document_key: DocumentKey,
        checkpoint: Checkpoint,
        changes: Vec<Change>,
    ) -> Self {
        ChangePack {
            document_key,
            checkpoint,
            changes,
            snapshot: None,
            min_synced_ticket: Ticket::INITIAL,
            is_removed: false,
        }
    }

    /// Whether this pack carries a snapshot instead of changes.
    pub fn has_snapshot(&self) -> bool {
        self.snapshot.as_ref().is_some_and(|bytes| !bytes.is_empty())
    }

    /// The number of changes carried.
    pub fn changes_len(&self) -> usize {
        self.changes.len()
    }
}

/// A full serialized document state: the element graph and the presences.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub root: Root,
    pub presences: PresenceMap,
}

impl Snapshot {
    /// Serialize for shipping inside a pack.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|err| DocError::SnapshotDecode(err.to_string()))
    }

    /// Decode a snapshot received from the server.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|err| DocError::SnapshotDecode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_round_trip() {
        let snapshot = Snapshot {
            root: Root::new(),
            presences: PresenceMap::new(),
        };

        let bytes = snapshot.encode().unwrap();
        let back = Snapshot::decode(&bytes).unwrap();
        assert_eq!(back.root.marshal(), snapshot.root.marshal());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            Snapshot::decode(b"not a snapshot"),
            Err(DocError::SnapshotDecode(_))
        ));
    }

    #[test]
    fn test_pack_defaults() {
        let key = DocumentKey::try_new("doc-1").unwrap();
        let pack = ChangePack::new(key, Checkpoint::INITIAL, Vec::new());

        assert!(!pack.has_snapshot());
        assert!(!pack.is_removed);
        assert_eq!(pack.min_synced_ticket, Ticket::INITIAL);
    }
}
