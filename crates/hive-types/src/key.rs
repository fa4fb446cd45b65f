use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HiveError, HiveResult};

/// Characters that are never allowed in a manifest name or tag.
///
/// `:` is the display separator; `\` is hostile to every path scheme the
/// store is exported into.
const FORBIDDEN: &[char] = &[':', '\\'];

fn validate(field: &'static str, value: &str) -> HiveResult<()> {
    if value.is_empty() {
        return Err(HiveError::InvalidKey {
            field,
            value: value.to_string(),
        });
    }
    if value.contains(FORBIDDEN) {
        return Err(HiveError::InvalidKey {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Identity of a manifest: a validated `(name, tag)` pair.
///
/// Equality and ordering are lexicographic by name, then tag. The content
/// a key points at is recorded separately (the manifest's root tree id);
/// two manifests with the same key are the same logical entity.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "KeyParts", into = "KeyParts")]
pub struct ManifestKey {
    name: String,
    tag: String,
}

/// Wire form of a key; conversion re-validates on deserialization.
#[derive(Serialize, Deserialize)]
struct KeyParts {
    name: String,
    tag: String,
}

impl TryFrom<KeyParts> for ManifestKey {
    type Error = HiveError;

    fn try_from(parts: KeyParts) -> HiveResult<Self> {
        ManifestKey::new(parts.name, parts.tag)
    }
}

impl From<ManifestKey> for KeyParts {
    fn from(key: ManifestKey) -> Self {
        KeyParts {
            name: key.name,
            tag: key.tag,
        }
    }
}

impl ManifestKey {
    /// Build a key, validating both components.
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> HiveResult<Self> {
        let name = name.into();
        let tag = tag.into();
        validate("name", &name)?;
        validate("tag", &tag)?;
        Ok(Self { name, tag })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for ManifestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

impl fmt::Debug for ManifestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ManifestKey({self})")
    }
}

impl FromStr for ManifestKey {
    type Err = HiveError;

    /// Parse `name:tag`.
    fn from_str(s: &str) -> HiveResult<Self> {
        match s.split_once(':') {
            Some((name, tag)) => Self::new(name, tag),
            None => Err(HiveError::InvalidKey {
                field: "key",
                value: s.to_string(),
            }),
        }
    }
}
