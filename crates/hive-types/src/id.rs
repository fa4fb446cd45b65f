use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{HiveError, HiveResult};

/// Content-addressed identifier for any stored object.
///
/// An `ObjectId` is the BLAKE3 hash of an object's content bytes and of
/// nothing else -- never a path, never metadata. Identical content always
/// produces the same `ObjectId`, which is what makes objects
/// deduplicatable and self-verifying.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    /// Compute an `ObjectId` from a byte slice.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create an `ObjectId` from a pre-computed 32-byte hash.
    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full lowercase hex encoding (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex form (first 8 characters), for logs.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string. Rejects anything that is not exactly
    /// 64 lowercase-insensitive hex characters.
    pub fn from_hex(s: &str) -> HiveResult<Self> {
        if s.len() != 64 {
            return Err(HiveError::Serialization(format!(
                "object id must be 64 hex chars, got {}",
                s.len()
            )));
        }
        let bytes = hex::decode(s)
            .map_err(|e| HiveError::Serialization(format!("invalid object id: {e}")))?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// Serialized as a hex string so trees and manifests have a stable,
// readable wire form.
impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ObjectId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Streaming hasher producing an [`ObjectId`].
///
/// Used by the import path to hash content while it is being copied to
/// storage, so the written bytes and the computed identity are guaranteed
/// consistent in a single pass.
#[derive(Default)]
pub struct IdHasher(blake3::Hasher);

impl IdHasher {
    pub fn new() -> Self {
        Self(blake3::Hasher::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(&self) -> ObjectId {
        ObjectId(*self.0.finalize().as_bytes())
    }
}
