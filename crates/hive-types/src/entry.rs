use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of object a tree entry points at.
///
/// The kind is part of the entry's key: one tree may hold a blob and a
/// nested tree under the same name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Raw content bytes.
    Blob,
    /// A nested tree.
    Tree,
    /// A reference to another manifest (via a serialized reference blob).
    Manifest,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blob => write!(f, "blob"),
            Self::Tree => write!(f, "tree"),
            Self::Manifest => write!(f, "manifest"),
        }
    }
}
