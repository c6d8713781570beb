//! Logical clock primitives shared by the codoc crate family.
//!
//! Every CRDT node and operation in a codoc document is stamped with a
//! [`Ticket`]: a globally unique, totally ordered timestamp derived from a
//! Lamport clock, a per-update delimiter, and the issuing replica's
//! [`ActorID`]. Changes are identified by a [`ChangeID`] and acknowledged via
//! [`Checkpoint`]s.

pub mod actor;
pub mod change_id;
pub mod checkpoint;
pub mod key;
pub mod ticket;

pub use actor::ActorID;
pub use change_id::ChangeID;
pub use checkpoint::Checkpoint;
pub use key::DocumentKey;
pub use ticket::Ticket;
