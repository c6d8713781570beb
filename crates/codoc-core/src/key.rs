//! Document keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error returned for malformed document keys.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid document key: {0}")]
pub struct InvalidDocumentKey(pub String);

/// A validated document key: 4 to 120 characters of `[a-z0-9-._~]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentKey(String);

impl DocumentKey {
    /// Validate and construct a key.
    pub fn try_new(key: impl Into<String>) -> Result<Self, InvalidDocumentKey> {
        let key = key.into();
        let valid_len = (4..=120).contains(&key.len());
        let valid_chars = key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "-._~".contains(c));
        if valid_len && valid_chars {
            Ok(DocumentKey(key))
        } else {
            Err(InvalidDocumentKey(key))
        }
    }

    /// The key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
