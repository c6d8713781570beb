//! Actor identity.
//!
//! An actor is the replica-local author of changes. The server assigns a
//! 12-byte opaque identifier on attach; before that, replicas operate under
//! [`ActorID::INITIAL`] and rewrite their pending changes once attached.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Size of an actor identifier in bytes.
pub const ACTOR_ID_SIZE: usize = 12;

/// Error returned when parsing an actor identifier from hex.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid actor id: {0}")]
pub struct InvalidActorID(pub String);

/// A 12-byte opaque replica identity.
///
/// Ordered lexicographically on the raw bytes; the all-zero value is the
/// pre-attach placeholder and the minimum of the order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorID([u8; ACTOR_ID_SIZE]);

impl ActorID {
    /// The placeholder identity used before the server assigns one.
    pub const INITIAL: ActorID = ActorID([0x00; ACTOR_ID_SIZE]);

    /// The maximum identity, used as the actor of the maximum ticket.
    pub const MAX: ActorID = ActorID([0xff; ACTOR_ID_SIZE]);

    /// Create an actor id from raw bytes.
    pub fn from_bytes(bytes: [u8; ACTOR_ID_SIZE]) -> Self {
        ActorID(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; ACTOR_ID_SIZE] {
        &self.0
    }

    /// Generate a random actor id. Real deployments receive their id from
    /// the server on attach; this is for tests and simulations.
    pub fn random() -> Self {
        let mut bytes = [0u8; ACTOR_ID_SIZE];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes[..]);
        ActorID(bytes)
    }

    /// Whether this is the pre-attach placeholder.
    pub fn is_initial(&self) -> bool {
        *self == Self::INITIAL
    }

    /// Parse from a 24-character lowercase hex string.
    pub fn from_hex(s: &str) -> Result<Self, InvalidActorID> {
        if s.len() != ACTOR_ID_SIZE * 2 {
            return Err(InvalidActorID(s.to_string()));
        }
        let mut bytes = [0u8; ACTOR_ID_SIZE];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| InvalidActorID(s.to_string()))?;
        }
        Ok(ActorID(bytes))
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(ACTOR_ID_SIZE * 2);
        for byte in &self.0 {
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }
}

impl fmt::Display for ActorID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ActorID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorID({})", self.to_hex())
    }
}

impl FromStr for ActorID {
    type Err = InvalidActorID;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ActorID {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ActorID {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ActorID::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
