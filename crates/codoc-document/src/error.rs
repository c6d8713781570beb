//! Error types for the document layer.

use codoc_crdt::CorruptedGraph;
use thiserror::Error;

/// Errors that can occur while editing or synchronizing a document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocError {
    #[error("document is removed")]
    DocumentRemoved,

    #[error("replica is corrupted: {0}")]
    Corrupted(String),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("index out of bounds: {index} (length: {length})")]
    IndexOutOfBounds { index: usize, length: usize },

    #[error("snapshot decode failed: {0}")]
    SnapshotDecode(String),

    /// An updater-supplied abort, surfaced to the caller unchanged.
    #[error("{0}")]
    Aborted(String),
}

impl From<CorruptedGraph> for DocError {
    fn from(err: CorruptedGraph) -> Self {
        DocError::Corrupted(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DocError>;
