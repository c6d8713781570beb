//! CRDT element graph for codoc documents.
//!
//! The document state is a tree of elements - objects, arrays, text,
//! rich text, counters, and primitives - each stamped with its creation
//! ticket. [`Root`] owns the tree as an arena keyed by ticket and tracks
//! tombstones awaiting garbage collection. Container bodies reference their
//! children by ticket only; all resolution goes through the arena, so the
//! graph has no reference cycles.

pub mod array;
pub mod element;
pub mod object;
pub mod root;
pub mod text;
pub mod value;

pub use array::ArrayValue;
pub use element::{Element, ElementBody};
pub use object::{MemberSet, ObjectValue};
pub use root::{CorruptedGraph, Root};
pub use text::{TextPos, TextValue};
pub use value::PrimitiveValue;
