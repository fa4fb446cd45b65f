use thiserror::Error;

use crate::entry::EntryKind;
use crate::id::ObjectId;
use crate::key::ManifestKey;

/// The closed error taxonomy shared by every hive crate.
///
/// Variants group into five classes:
///
/// - *not found*: [`ObjectNotFound`], [`ManifestNotFound`],
///   [`GenerationNotFound`] -- something required was absent.
/// - *conflict*: [`DuplicateEntry`], [`ManifestExists`], [`MissingRoot`],
///   [`InvalidKey`] -- the caller asked for something contradictory.
/// - *integrity*: [`CycleDetected`], [`Damaged`] -- the store's invariants
///   are violated; never repaired silently.
/// - *transfer*: [`TransferIncomplete`] -- a non-partial archive is
///   missing required content.
/// - *transient*: [`Transient`] -- a race that bounded retry is expected
///   to absorb before it ever reaches a caller.
///
/// [`ObjectNotFound`]: HiveError::ObjectNotFound
/// [`ManifestNotFound`]: HiveError::ManifestNotFound
/// [`GenerationNotFound`]: HiveError::GenerationNotFound
/// [`DuplicateEntry`]: HiveError::DuplicateEntry
/// [`ManifestExists`]: HiveError::ManifestExists
/// [`MissingRoot`]: HiveError::MissingRoot
/// [`InvalidKey`]: HiveError::InvalidKey
/// [`CycleDetected`]: HiveError::CycleDetected
/// [`Damaged`]: HiveError::Damaged
/// [`TransferIncomplete`]: HiveError::TransferIncomplete
/// [`Transient`]: HiveError::Transient
#[derive(Debug, Error)]
pub enum HiveError {
    /// A referenced object is absent where presence was required.
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// A requested manifest name (or name:tag) does not exist.
    #[error("manifest not found: {name}{}", .tag.as_deref().map(|t| format!(":{t}")).unwrap_or_default())]
    ManifestNotFound {
        name: String,
        tag: Option<String>,
    },

    /// No generation of a meta-manifest could be loaded after retries.
    #[error("no readable generation of {name} after {attempts} attempts")]
    GenerationNotFound { name: String, attempts: u32 },

    /// Two entries with the same (name, kind) in one tree builder.
    #[error("duplicate tree entry: {name} ({kind})")]
    DuplicateEntry { name: String, kind: EntryKind },

    /// A manifest key already exists with different content.
    #[error("manifest {key} already exists with root {existing}, refusing {offered}")]
    ManifestExists {
        key: ManifestKey,
        existing: ObjectId,
        offered: ObjectId,
    },

    /// A manifest was built without a root tree.
    #[error("manifest {0} has no root tree")]
    MissingRoot(ManifestKey),

    /// A manifest name or tag contains forbidden characters or is empty.
    #[error("invalid manifest {field}: {value:?}")]
    InvalidKey {
        field: &'static str,
        value: String,
    },

    /// The manifest reference graph contains a cycle.
    #[error("manifest reference cycle through {0}")]
    CycleDetected(ManifestKey),

    /// An object is present but fails decoding or checksum verification.
    #[error("damaged object {id}: {reason}")]
    Damaged { id: ObjectId, reason: String },

    /// A non-partial transfer arrived missing required content.
    #[error("transfer incomplete: {missing} required objects absent")]
    TransferIncomplete { missing: usize },

    /// Momentary unavailability caused by a concurrent writer.
    #[error("transient: {0}")]
    Transient(String),

    /// The operation was cancelled cooperatively.
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error from the storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl HiveError {
    /// Returns `true` for conditions a bounded retry is expected to clear.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns `true` for any not-found class variant.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ObjectNotFound(_) | Self::ManifestNotFound { .. } | Self::GenerationNotFound { .. }
        )
    }

    /// Shorthand for a manifest-not-found error with a full key.
    pub fn manifest_not_found(key: &ManifestKey) -> Self {
        Self::ManifestNotFound {
            name: key.name().to_string(),
            tag: Some(key.tag().to_string()),
        }
    }

    /// Shorthand for a manifest-not-found error with a name only.
    pub fn manifest_name_not_found(name: &str) -> Self {
        Self::ManifestNotFound {
            name: name.to_string(),
            tag: None,
        }
    }
}

/// Result alias used across the workspace.
pub type HiveResult<T> = Result<T, HiveError>;
