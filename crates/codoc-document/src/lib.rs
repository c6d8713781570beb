//! Document replica and change pipeline for codoc.
//!
//! This crate ties the element graph to the replication protocol: local
//! edits are staged against a clone through JSON proxies, frozen into
//! changes, and queued for the server; remote change packs are validated on
//! the clone, applied to the authoritative state, and acknowledged through
//! checkpoints. Tombstones are purged once the server proves every replica
//! has observed their removal.

pub mod change;
pub mod context;
pub mod document;
pub mod error;
pub mod event;
pub mod internal;
pub mod json;
pub mod operation;
pub mod pack;
pub mod presence;

pub use change::Change;
pub use document::Document;
pub use error::{DocError, Result};
pub use event::{DocEvent, DocEventType};
pub use internal::{DocumentStatus, InternalDocument};
pub use json::{JsonArray, JsonCounter, JsonObject, JsonRichText, JsonText};
pub use operation::{ElementSeed, Operation};
pub use pack::{ChangePack, Snapshot};
pub use presence::{Presence, PresenceChange, PresenceMap, PresenceProxy};
