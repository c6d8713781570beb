//! Convergence tests: replicas syncing through a sequencing server reach
//! identical state regardless of how their edits interleave.

use codoc_core::{ActorID, Checkpoint, DocumentKey, Ticket};
use codoc_document::{Change, ChangePack, Document};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn actor(last: u8) -> ActorID {
    let mut bytes = [0u8; 12];
    bytes[11] = last;
    ActorID::from_bytes(bytes)
}

/// A minimal stand-in for the server: it sequences changes and hands each
/// replica the suffix it has not seen yet. Change semantics stay opaque to
/// it, exactly as the protocol assumes.
struct SyncServer {
    key: DocumentKey,
    log: Vec<Change>,
}

impl SyncServer {
    fn new(key: DocumentKey) -> Self {
        SyncServer {
            key,
            log: Vec::new(),
        }
    }

    /// Push the replica's local changes, then pull everything it has not
    /// observed. `seen` is the replica's position in the server log.
    fn sync(&mut self, doc: &mut Document, seen: &mut usize) {
        let pack = doc.create_change_pack();
        let mut acked_client_seq = pack.checkpoint.client_seq();
        for change in pack.changes {
            acked_client_seq = acked_client_seq.max(change.client_seq());
            self.log.push(change);
        }

        let pulled: Vec<Change> = self.log[*seen..]
            .iter()
            .filter(|change| change.id().actor() != doc.actor_id())
            .cloned()
            .collect();
        *seen = self.log.len();

        let response = ChangePack::new(
            self.key.clone(),
            Checkpoint::new(self.log.len() as u64, acked_client_seq),
            pulled,
        );
        doc.apply_change_pack(&response).unwrap();
    }
}

fn cluster(n: u8) -> (SyncServer, Vec<Document>, Vec<usize>) {
    let key = DocumentKey::try_new("convergence-doc").unwrap();
    let server = SyncServer::new(key.clone());
    let docs = (1..=n)
        .map(|i| {
            let mut doc = Document::new(key.clone());
            doc.set_actor(actor(i));
            doc
        })
        .collect();
    (server, docs, vec![0; n as usize])
}

#[test]
fn test_disjoint_keys_converge() {
    let (mut server, mut docs, mut seen) = cluster(3);

    for (i, doc) in docs.iter_mut().enumerate() {
        let key = format!("key-{i}");
        doc.update(move |root, _| root.set(key.as_str(), i as i64))
            .unwrap();
    }
    for _ in 0..2 {
        for (doc, seen) in docs.iter_mut().zip(seen.iter_mut()) {
            server.sync(doc, seen);
        }
    }

    let expected = docs[0].marshal();
    for doc in &docs {
        assert_eq!(doc.marshal(), expected);
        assert!(!doc.has_local_changes());
    }
    assert_eq!(expected, r#"{"key-0":0,"key-1":1,"key-2":2}"#);
}

#[test]
fn test_same_key_converges_to_one_winner() {
    let (mut server, mut docs, mut seen) = cluster(3);

    for (i, doc) in docs.iter_mut().enumerate() {
        doc.update(move |root, _| root.set("k", i as i64)).unwrap();
    }
    for _ in 0..2 {
        for (doc, seen) in docs.iter_mut().zip(seen.iter_mut()) {
            server.sync(doc, seen);
        }
    }

    let expected = docs[0].marshal();
    for doc in &docs {
        assert_eq!(doc.marshal(), expected);
    }
}

#[test]
fn test_concurrent_array_inserts_converge() {
    let (mut server, mut docs, mut seen) = cluster(3);

    docs[0]
        .update(|root, _| {
            let mut items = root.new_array("items")?;
            items.push("seed")?;
            Ok(())
        })
        .unwrap();
    for (doc, seen) in docs.iter_mut().zip(seen.iter_mut()) {
        server.sync(doc, seen);
    }

    // Everyone appends concurrently.
    for (i, doc) in docs.iter_mut().enumerate() {
        let value = format!("from-{i}");
        doc.update(move |root, _| root.array("items")?.push(value.as_str()))
            .unwrap();
    }
    for _ in 0..2 {
        for (doc, seen) in docs.iter_mut().zip(seen.iter_mut()) {
            server.sync(doc, seen);
        }
    }

    let expected = docs[0].marshal();
    for doc in &docs {
        assert_eq!(doc.marshal(), expected);
    }
    for i in 0..3 {
        assert!(expected.contains(&format!("from-{i}")));
    }
}

#[test]
fn test_concurrent_text_edits_converge() {
    let (mut server, mut docs, mut seen) = cluster(2);

    docs[0]
        .update(|root, _| {
            let mut text = root.new_text("body")?;
            text.edit(0, 0, "the quick brown fox")?;
            Ok(())
        })
        .unwrap();
    for (doc, seen) in docs.iter_mut().zip(seen.iter_mut()) {
        server.sync(doc, seen);
    }

    // One replica deletes a word while the other types inside the range.
    docs[0]
        .update(|root, _| root.text("body")?.edit(4, 9, ""))
        .unwrap();
    docs[1]
        .update(|root, _| root.text("body")?.edit(9, 9, "-ish"))
        .unwrap();

    for _ in 0..2 {
        for (doc, seen) in docs.iter_mut().zip(seen.iter_mut()) {
            server.sync(doc, seen);
        }
    }

    assert_eq!(docs[0].marshal(), docs[1].marshal());
    // The concurrent insertion survives the overlapping deletion.
    assert!(docs[0].marshal().contains("-ish"));
}

#[test]
fn test_randomized_workload_converges() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let (mut server, mut docs, mut seen) = cluster(3);

    docs[0]
        .update(|root, _| {
            root.new_array("items")?;
            let mut text = root.new_text("body")?;
            text.edit(0, 0, "seed text")?;
            root.new_counter("votes", 0)?;
            Ok(())
        })
        .unwrap();
    for (doc, seen) in docs.iter_mut().zip(seen.iter_mut()) {
        server.sync(doc, seen);
    }

    for step in 0..40 {
        let i = rng.gen_range(0..docs.len());
        match rng.gen_range(0..4) {
            0 => {
                let key = format!("k{}", rng.gen_range(0..5));
                docs[i]
                    .update(move |root, _| root.set(key.as_str(), step as i64))
                    .unwrap();
            }
            1 => {
                let value = format!("v{step}");
                docs[i]
                    .update(move |root, _| root.array("items")?.push(value.as_str()))
                    .unwrap();
            }
            2 => {
                docs[i]
                    .update(move |root, _| {
                        let mut text = root.text("body")?;
                        let len = text.len();
                        text.edit(len, len, "x")
                    })
                    .unwrap();
            }
            _ => {
                docs[i]
                    .update(move |root, _| root.counter("votes")?.increase(1))
                    .unwrap();
            }
        }
        if rng.gen_bool(0.3) {
            let j = rng.gen_range(0..docs.len());
            let seen_j = &mut seen[j];
            server.sync(&mut docs[j], seen_j);
        }
    }

    // Settle: everyone pushes and pulls until no replica is behind.
    for _ in 0..3 {
        for (doc, seen) in docs.iter_mut().zip(seen.iter_mut()) {
            server.sync(doc, seen);
        }
    }

    let expected = docs[0].marshal();
    for doc in &docs {
        assert_eq!(doc.marshal(), expected);
        assert!(!doc.has_local_changes());
    }
}

#[test]
fn test_gc_after_full_sync() {
    let (mut server, mut docs, mut seen) = cluster(2);

    docs[0]
        .update(|root, _| {
            let mut items = root.new_array("items")?;
            items.push("a")?;
            items.push("b")?;
            items.push("c")?;
            Ok(())
        })
        .unwrap();
    for (doc, seen) in docs.iter_mut().zip(seen.iter_mut()) {
        server.sync(doc, seen);
    }

    docs[1]
        .update(|root, _| root.array("items")?.remove(1))
        .unwrap();
    for _ in 0..2 {
        for (doc, seen) in docs.iter_mut().zip(seen.iter_mut()) {
            server.sync(doc, seen);
        }
    }
    assert_eq!(docs[0].marshal(), docs[1].marshal());
    assert_eq!(docs[0].garbage_len(), 1);
    assert_eq!(docs[1].garbage_len(), 1);

    // Every replica has seen the removal; the server broadcasts a
    // min-synced ticket that covers it.
    let mut pack = ChangePack::new(
        docs[0].key().clone(),
        Checkpoint::new(server.log.len() as u64, 0),
        Vec::new(),
    );
    pack.min_synced_ticket = Ticket::MAX;
    for doc in docs.iter_mut() {
        let mut pack = pack.clone();
        pack.checkpoint = Checkpoint::new(server.log.len() as u64, doc.checkpoint().client_seq());
        doc.apply_change_pack(&pack).unwrap();
        assert_eq!(doc.garbage_len(), 0);
    }
    assert_eq!(docs[0].marshal(), docs[1].marshal());
}
