use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use hive_types::{HiveError, HiveResult, ManifestKey, ObjectId};

use crate::traits::ObjectDatabase;

/// A named, tagged, immutable pointer to a root tree plus a label map.
///
/// The key is the manifest's identity; the root tree's object identity is
/// its content identity. Labels are free-form string metadata and do not
/// participate in content identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    key: ManifestKey,
    root: ObjectId,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

impl Manifest {
    /// Start building a manifest for the given key.
    pub fn builder(key: ManifestKey) -> ManifestBuilder {
        ManifestBuilder {
            key,
            root: None,
            labels: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &ManifestKey {
        &self.key
    }

    /// The root tree's object identity -- the manifest's content identity.
    pub fn root(&self) -> &ObjectId {
        &self.root
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    pub fn encode(&self) -> HiveResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| HiveError::Serialization(e.to_string()))
    }

    pub fn decode(data: &[u8]) -> HiveResult<Self> {
        serde_json::from_slice(data).map_err(|e| HiveError::Serialization(e.to_string()))
    }
}

/// Builder for a [`Manifest`]: key fixed at construction, root required
/// before `build()`, labels last-write-wins per key.
#[derive(Debug)]
pub struct ManifestBuilder {
    key: ManifestKey,
    root: Option<ObjectId>,
    labels: BTreeMap<String, String>,
}

impl ManifestBuilder {
    pub fn root(mut self, id: ObjectId) -> Self {
        self.root = Some(id);
        self
    }

    pub fn add_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> HiveResult<Manifest> {
        let root = self.root.ok_or(HiveError::MissingRoot(self.key.clone()))?;
        Ok(Manifest {
            key: self.key,
            root,
            labels: self.labels,
        })
    }
}

/// The payload of a manifest-reference entry.
///
/// Tree entries of kind [`EntryKind::Manifest`] point at a small
/// serialized blob carrying the referenced manifest's key; resolving the
/// reference goes blob -> key -> registry -> manifest -> root tree.
///
/// [`EntryKind::Manifest`]: hive_types::EntryKind::Manifest
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRef {
    key: ManifestKey,
}

impl ManifestRef {
    pub fn new(key: ManifestKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &ManifestKey {
        &self.key
    }

    pub fn encode(&self) -> HiveResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| HiveError::Serialization(e.to_string()))
    }

    /// Decode a reference blob stored under `id`.
    pub fn decode(id: &ObjectId, data: &[u8]) -> HiveResult<Self> {
        serde_json::from_slice(data).map_err(|e| HiveError::Damaged {
            id: *id,
            reason: format!("manifest reference does not parse: {e}"),
        })
    }

    /// Serialize and import into the object database.
    pub fn store(&self, db: &dyn ObjectDatabase) -> HiveResult<ObjectId> {
        db.import_bytes(&self.encode()?)
    }

    /// Load and decode a reference blob.
    pub fn load(db: &dyn ObjectDatabase, id: &ObjectId) -> HiveResult<Self> {
        let data = db.read_bytes(id)?;
        Self::decode(id, &data)
    }
}
