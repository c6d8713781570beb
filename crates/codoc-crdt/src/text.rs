//! Text element body - an RGA of splittable chunks.
//!
//! Text content is a linked sequence of chunks. A chunk keeps the creation
//! ticket of the edit that produced it plus a character offset, so an edit
//! landing inside an existing run splits it without minting new identity.
//! Edit positions are expressed as [`TextPos`] boundaries (run ticket +
//! absolute character offset), which stay valid under concurrent edits.
//!
//! Range deletion ships the editor's causal knowledge (the newest chunk it
//! had seen per actor) with the operation; on replay, chunks created by an
//! edit the deleter had not seen survive the deletion. This is what keeps
//! concurrent insert-into-deleted-range convergent.

use codoc_core::{ActorID, Ticket};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// A boundary between characters: after `offset` characters of the run
/// created at `created_at`. `(Ticket::INITIAL, 0)` is the document head.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextPos {
    pub created_at: Ticket,
    pub offset: u32,
}

impl TextPos {
    /// The boundary before the first character.
    pub const HEAD: TextPos = TextPos {
        created_at: Ticket::INITIAL,
        offset: 0,
    };
}

/// Identity of one chunk: its run's creation ticket and the chunk's base
/// character offset within that run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct ChunkId {
    created_at: Ticket,
    offset: u32,
}

const HEAD: ChunkId = ChunkId {
    created_at: Ticket::INITIAL,
    offset: 0,
};

/// A styled attribute value with its LWW stamp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrValue {
    pub value: String,
    pub updated_at: Ticket,
}

#[derive(Clone, Debug, PartialEq)]
struct Chunk {
    content: String,
    removed_at: Option<Ticket>,
    attrs: BTreeMap<String, AttrValue>,
    prev: ChunkId,
    next: Option<ChunkId>,
}

impl Chunk {
    fn char_len(&self) -> u32 {
        self.content.chars().count() as u32
    }

    fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }
}

/// The body of a text or rich text element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<ChunkRepr>", into = "Vec<ChunkRepr>")]
pub struct TextValue {
    chunks: HashMap<ChunkId, Chunk>,
    /// Base offsets of the live chunks of each run, for boundary lookup.
    runs: HashMap<Ticket, BTreeSet<u32>>,
    /// Tombstoned chunks awaiting purge.
    removed: HashSet<ChunkId>,
}

impl TextValue {
    /// Create empty text.
    pub fn new() -> Self {
        let mut chunks = HashMap::new();
        chunks.insert(
            HEAD,
            Chunk {
                content: String::new(),
                removed_at: None,
                attrs: BTreeMap::new(),
                prev: HEAD,
                next: None,
            },
        );
        TextValue {
            chunks,
            runs: HashMap::new(),
            removed: HashSet::new(),
        }
    }

    /// The visible character length.
    pub fn len(&self) -> usize {
        self.visible().map(|(_, c)| c.char_len() as usize).sum()
    }

    /// Whether no visible characters remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The visible content as a plain string.
    pub fn to_plain(&self) -> String {
        self.visible().map(|(_, c)| c.content.as_str()).collect()
    }

    /// Visible spans with their attributes, adjacent equal-attribute spans
    /// merged. Used for the rich text marshal form.
    pub fn spans(&self) -> Vec<(BTreeMap<String, String>, String)> {
        let mut spans: Vec<(BTreeMap<String, String>, String)> = Vec::new();
        for (_, chunk) in self.visible() {
            let attrs: BTreeMap<String, String> = chunk
                .attrs
                .iter()
                .map(|(k, v)| (k.clone(), v.value.clone()))
                .collect();
            match spans.last_mut() {
                Some((last_attrs, last_content)) if *last_attrs == attrs => {
                    last_content.push_str(&chunk.content);
                }
                _ => spans.push((attrs, chunk.content.clone())),
            }
        }
        spans
    }

    /// The boundary at a visible character index, or None if out of range.
    pub fn pos_at(&self, index: usize) -> Option<TextPos> {
        if index == 0 {
            return Some(TextPos::HEAD);
        }
        let mut acc = 0usize;
        for (id, chunk) in self.visible() {
            let len = chunk.char_len() as usize;
            if acc + len >= index {
                return Some(TextPos {
                    created_at: id.created_at,
                    offset: id.offset + (index - acc) as u32,
                });
            }
            acc += len;
        }
        None
    }

    /// Apply an edit: tombstone the range `(from, to]` boundaries enclose and
    /// insert `content` at `from`.
    ///
    /// `known` is the editor's causal knowledge: the newest chunk creation
    /// ticket it had seen per actor when it staged the edit. `None` means the
    /// edit is being staged right now (everything currently in range is
    /// known); the returned map is then embedded in the operation for replay.
    ///
    /// Returns `None` when a boundary is unknown - the caller drops the
    /// operation.
    pub fn edit(
        &mut self,
        from: TextPos,
        to: TextPos,
        content: &str,
        executed_at: Ticket,
        known: Option<&HashMap<ActorID, Ticket>>,
    ) -> Option<HashMap<ActorID, Ticket>> {
        let left = self.boundary(from)?;
        let right = self.boundary(to)?;

        let mut latest: HashMap<ActorID, Ticket> = HashMap::new();
        if left != right {
            let mut cursor = self.chunks[&left].next;
            loop {
                let id = cursor?;
                let deletable = match known {
                    None => true,
                    Some(map) => map
                        .get(&id.created_at.actor())
                        .is_some_and(|seen| !id.created_at.after(seen)),
                };
                if deletable {
                    let chunk = self.chunks.get_mut(&id).expect("linked chunk");
                    if chunk.removed_at.is_none() {
                        chunk.removed_at = Some(executed_at);
                        self.removed.insert(id);
                    }
                }
                if known.is_none() {
                    let entry = latest.entry(id.created_at.actor()).or_insert(id.created_at);
                    if id.created_at.after(entry) {
                        *entry = id.created_at;
                    }
                }
                if id == right {
                    break;
                }
                cursor = self.chunks[&id].next;
            }
        }

        if !content.is_empty() {
            let new_id = ChunkId {
                created_at: executed_at,
                offset: 0,
            };
            if !self.chunks.contains_key(&new_id) {
                // RGA placement: skip concurrently inserted newer siblings.
                let mut prev = left;
                while let Some(next) = self.chunks[&prev].next {
                    if !next.created_at.after(&executed_at) {
                        break;
                    }
                    prev = next;
                }
                self.link_after(
                    prev,
                    new_id,
                    Chunk {
                        content: content.to_string(),
                        removed_at: None,
                        attrs: BTreeMap::new(),
                        prev,
                        next: None,
                    },
                );
            }
        }

        Some(latest)
    }

    /// Apply attributes over the range the boundaries enclose, last writer
    /// wins per attribute key. Returns `None` when a boundary is unknown.
    pub fn style(
        &mut self,
        from: TextPos,
        to: TextPos,
        attrs: &BTreeMap<String, String>,
        executed_at: Ticket,
    ) -> Option<()> {
        let left = self.boundary(from)?;
        let right = self.boundary(to)?;
        if left == right {
            return Some(());
        }

        let mut cursor = self.chunks[&left].next;
        loop {
            let id = cursor?;
            let chunk = self.chunks.get_mut(&id).expect("linked chunk");
            if !chunk.is_removed() {
                for (key, value) in attrs {
                    let stale = chunk
                        .attrs
                        .get(key)
                        .is_some_and(|cur| !executed_at.after(&cur.updated_at));
                    if !stale {
                        chunk.attrs.insert(
                            key.clone(),
                            AttrValue {
                                value: value.clone(),
                                updated_at: executed_at,
                            },
                        );
                    }
                }
            }
            if id == right {
                break;
            }
            cursor = self.chunks[&id].next;
        }
        Some(())
    }

    /// Purge tombstoned chunks removed at or before `min`. Returns the count.
    pub fn purge_removed_before(&mut self, min: &Ticket) -> usize {
        let targets: Vec<ChunkId> = self
            .removed
            .iter()
            .copied()
            .filter(|id| {
                self.chunks[id]
                    .removed_at
                    .is_some_and(|removed_at| !removed_at.after(min))
            })
            .collect();

        for id in &targets {
            let chunk = self.chunks.remove(id).expect("tombstoned chunk");
            self.chunks.get_mut(&chunk.prev).expect("prev chunk").next = chunk.next;
            if let Some(next) = chunk.next {
                self.chunks.get_mut(&next).expect("next chunk").prev = chunk.prev;
            }
            if let Some(bases) = self.runs.get_mut(&id.created_at) {
                bases.remove(&id.offset);
                if bases.is_empty() {
                    self.runs.remove(&id.created_at);
                }
            }
            self.removed.remove(id);
        }
        targets.len()
    }

    /// The number of tombstoned chunks still held.
    pub fn removed_len(&self) -> usize {
        self.removed.len()
    }

    /// The highest lamport among chunk tickets, removal stamps, and styles.
    pub fn max_lamport(&self) -> u64 {
        let mut max = 0;
        for (id, chunk) in &self.chunks {
            max = max.max(id.created_at.lamport());
            if let Some(removed_at) = chunk.removed_at {
                max = max.max(removed_at.lamport());
            }
            for attr in chunk.attrs.values() {
                max = max.max(attr.updated_at.lamport());
            }
        }
        max
    }

    /// Find the chunk ending exactly at `pos`, splitting if the boundary
    /// falls inside a chunk.
    fn boundary(&mut self, pos: TextPos) -> Option<ChunkId> {
        if pos == TextPos::HEAD {
            return Some(HEAD);
        }
        let base = self
            .runs
            .get(&pos.created_at)?
            .range(..=pos.offset)
            .next_back()
            .copied()?;
        let id = ChunkId {
            created_at: pos.created_at,
            offset: base,
        };
        if pos.offset == base {
            return Some(self.chunks[&id].prev);
        }
        let len = self.chunks[&id].char_len();
        if pos.offset < base + len {
            self.split(id, pos.offset);
            Some(id)
        } else if pos.offset == base + len {
            Some(id)
        } else {
            None
        }
    }

    /// Split a chunk at an absolute run offset strictly inside it.
    fn split(&mut self, id: ChunkId, at: u32) {
        let chunk = self.chunks.get_mut(&id).expect("split target");
        let local = (at - id.offset) as usize;
        let right_content: String = chunk.content.chars().skip(local).collect();
        chunk.content = chunk.content.chars().take(local).collect();

        let right_id = ChunkId {
            created_at: id.created_at,
            offset: at,
        };
        let right = Chunk {
            content: right_content,
            removed_at: chunk.removed_at,
            attrs: chunk.attrs.clone(),
            prev: id,
            next: chunk.next,
        };
        chunk.next = Some(right_id);
        if let Some(next) = right.next {
            self.chunks.get_mut(&next).expect("next chunk").prev = right_id;
        }
        if right.removed_at.is_some() {
            self.removed.insert(right_id);
        }
        self.chunks.insert(right_id, right);
        self.runs
            .entry(id.created_at)
            .or_default()
            .insert(at);
    }

    fn link_after(&mut self, prev: ChunkId, id: ChunkId, mut chunk: Chunk) {
        chunk.next = self.chunks[&prev].next;
        chunk.prev = prev;
        if let Some(next) = chunk.next {
            self.chunks.get_mut(&next).expect("next chunk").prev = id;
        }
        self.chunks.get_mut(&prev).expect("prev chunk").next = Some(id);
        self.chunks.insert(id, chunk);
        self.runs
            .entry(id.created_at)
            .or_default()
            .insert(id.offset);
    }

    fn visible(&self) -> impl Iterator<Item = (ChunkId, &Chunk)> {
        let mut cursor = self.chunks[&HEAD].next;
        std::iter::from_fn(move || loop {
            let id = cursor?;
            let chunk = &self.chunks[&id];
            cursor = chunk.next;
            if !chunk.is_removed() {
                return Some((id, chunk));
            }
        })
    }
}

impl Default for TextValue {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized form: chunks in linked order, head excluded.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct ChunkRepr {
    id: ChunkId,
    content: String,
    removed_at: Option<Ticket>,
    attrs: BTreeMap<String, AttrValue>,
}

impl From<TextValue> for Vec<ChunkRepr> {
    fn from(text: TextValue) -> Self {
        let mut out = Vec::new();
        let mut cursor = text.chunks[&HEAD].next;
        while let Some(id) = cursor {
            let chunk = &text.chunks[&id];
            cursor = chunk.next;
            out.push(ChunkRepr {
                id,
                content: chunk.content.clone(),
                removed_at: chunk.removed_at,
                attrs: chunk.attrs.clone(),
            });
        }
        out
    }
}

impl From<Vec<ChunkRepr>> for TextValue {
    fn from(reprs: Vec<ChunkRepr>) -> Self {
        let mut text = TextValue::new();
        let mut prev = HEAD;
        for repr in reprs {
            let chunk = Chunk {
                content: repr.content,
                removed_at: repr.removed_at,
                attrs: repr.attrs,
                prev,
                next: None,
            };
            text.chunks.get_mut(&prev).expect("prev chunk").next = Some(repr.id);
            if chunk.removed_at.is_some() {
                text.removed.insert(repr.id);
            }
            text.runs
                .entry(repr.id.created_at)
                .or_default()
                .insert(repr.id.offset);
            text.chunks.insert(repr.id, chunk);
            prev = repr.id;
        }
        text
    }
}
