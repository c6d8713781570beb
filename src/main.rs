//! codoc sync simulation runner.
//!
//! Spins up a set of document replicas against an in-memory sequencing
//! server, drives a randomized editing workload, and verifies that every
//! replica converges to identical state.

use codoc_core::{ActorID, Checkpoint, DocumentKey, Ticket};
use codoc_document::{Change, ChangePack, Document};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

/// In-memory stand-in for the sync server: assigns server sequence numbers
/// by log position and stays passive toward change semantics.
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
        doc.apply_change_pack(&response)
            .expect("server-ordered changes apply cleanly");
    }

    fn broadcast_min_synced(&self, doc: &mut Document) -> usize {
        let mut pack = ChangePack::new(
            self.key.clone(),
            Checkpoint::new(self.log.len() as u64, doc.checkpoint().client_seq()),
            Vec::new(),
        );
        pack.min_synced_ticket = Ticket::MAX;
        let before = doc.garbage_len();
        doc.apply_change_pack(&pack).expect("gc pack applies");
        before
    }
}

struct SessionStats {
    replicas: usize,
    steps: usize,
    syncs: usize,
    changes: usize,
    garbage_purged: usize,
    elapsed_ms: f64,
    converged: bool,
}

impl SessionStats {
    fn print(&self) {
        println!(
            "  {:>8} │ {:>6} │ {:>6} │ {:>7} │ {:>7} │ {:>9.2} │ {:>9}",
            self.replicas,
            self.steps,
            self.syncs,
            self.changes,
            self.garbage_purged,
            self.elapsed_ms,
            if self.converged { "✓" } else { "✗" }
        );
    }
}

fn run_session(num_replicas: u8, steps: usize, seed: u64) -> SessionStats {
    let start = Instant::now();
    let key = DocumentKey::try_new("simulation-doc").unwrap();
    let mut server = SyncServer::new(key.clone());
    let mut rng = StdRng::seed_from_u64(seed);

    let mut docs: Vec<Document> = (0..num_replicas)
        .map(|_| {
            let mut doc = Document::new(key.clone());
            doc.set_actor(ActorID::random());
            doc
        })
        .collect();
    let mut seen = vec![0usize; docs.len()];

    // Replica 0 lays down the shared containers first.
    docs[0]
        .update(|root, _| {
            root.new_array("items")?;
            let mut text = root.new_text("body")?;
            text.edit(0, 0, "shared document body")?;
            root.new_counter("edits", 0)?;
            Ok(())
        })
        .unwrap();
    let mut syncs = 0;
    for (doc, seen) in docs.iter_mut().zip(seen.iter_mut()) {
        server.sync(doc, seen);
        syncs += 1;
    }

    for step in 0..steps {
        let i = rng.gen_range(0..docs.len());
        match rng.gen_range(0..5) {
            0 => {
                let field = format!("field-{}", rng.gen_range(0..8));
                docs[i]
                    .update(move |root, _| root.set(field.as_str(), step as i64))
                    .unwrap();
            }
            1 => {
                let value = format!("item-{step}");
                docs[i]
                    .update(move |root, _| root.array("items")?.push(value.as_str()))
                    .unwrap();
            }
            2 => {
                docs[i]
                    .update(move |root, _| {
                        let mut text = root.text("body")?;
                        let len = text.len();
                        text.edit(len, len, " word")
                    })
                    .unwrap();
            }
            3 => {
                docs[i]
                    .update(move |root, _| root.counter("edits")?.increase(1))
                    .unwrap();
            }
            _ => {
                let cursor = rng.gen_range(0..100);
                docs[i]
                    .update(move |_, presence| {
                        presence.set("cursor", serde_json::json!(cursor));
                        Ok(())
                    })
                    .unwrap();
            }
        }
        if rng.gen_bool(0.25) {
            let j = rng.gen_range(0..docs.len());
            server.sync(&mut docs[j], &mut seen[j]);
            syncs += 1;
        }
    }

    // Settle until every replica has pushed and pulled everything.
    for _ in 0..3 {
        for (doc, seen) in docs.iter_mut().zip(seen.iter_mut()) {
            server.sync(doc, seen);
            syncs += 1;
        }
    }

    let mut garbage_purged = 0;
    for doc in docs.iter_mut() {
        garbage_purged += server.broadcast_min_synced(doc);
    }

    let expected = docs[0].marshal();
    let converged = docs
        .iter()
        .all(|doc| doc.marshal() == expected && !doc.has_local_changes());

    SessionStats {
        replicas: num_replicas as usize,
        steps,
        syncs,
        changes: server.log.len(),
        garbage_purged,
        elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        converged: converged && docs.iter().all(|d| d.garbage_len() == 0),
    }
}

fn print_header() {
    println!("  Replicas │  Steps │  Syncs │ Changes │  Purged │ Time (ms) │ Converged");
    println!("  ─────────┼────────┼────────┼─────────┼─────────┼───────────┼──────────");
}

fn run_quick() {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║            CODOC QUICK CONVERGENCE CHECK                   ║");
    println!("╚════════════════════════════════════════════════════════════╝\n");

    print_header();
    run_session(2, 50, 1).print();
    run_session(3, 100, 2).print();

    println!("\n✓ Quick check completed");
}

fn run_full() {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║            CODOC FULL SIMULATION SUITE                     ║");
    println!("╚════════════════════════════════════════════════════════════╝\n");

    print_header();
    for (replicas, steps) in [(2, 100), (3, 200), (5, 400), (8, 600)] {
        for seed in 0..3 {
            run_session(replicas, steps, seed).print();
        }
    }

    println!("\n✓ Full suite completed");
}

fn print_usage() {
    println!("Usage: cargo run [suite]");
    println!();
    println!("Available suites:");
    println!("  quick    - Two short sessions (default)");
    println!("  full     - Larger replica counts and workloads");
    println!("  help     - Show this help message");
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        None | Some("quick") => run_quick(),
        Some("full") => run_full(),
        Some("help") | Some("--help") | Some("-h") => print_usage(),
        Some(other) => {
            println!("Unknown suite: {other}");
            print_usage();
        }
    }
}
