use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use hive_types::{EntryKind, HiveError, HiveResult, ObjectId};

use crate::traits::ObjectDatabase;

/// A single entry in a tree: one named pointer at an object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub kind: EntryKind,
    pub id: ObjectId,
}

impl TreeEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind, id: ObjectId) -> Self {
        Self {
            name: name.into(),
            kind,
            id,
        }
    }
}

/// One immutable directory level: a sorted mapping from `(name, kind)` to
/// an object identity.
///
/// Trees are frozen at construction and never mutated. Entries are kept
/// sorted by name then kind so the serialized form -- and therefore the
/// tree's own content identity -- is deterministic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Start building a tree.
    pub fn builder() -> TreeBuilder {
        TreeBuilder::default()
    }

    /// An empty tree.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// The entries, sorted by name then kind.
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// Look up an entry by its composite key.
    pub fn get(&self, name: &str, kind: EntryKind) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| (e.name.as_str(), e.kind).cmp(&(name, kind)))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deterministic serialized form.
    pub fn encode(&self) -> HiveResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| HiveError::Serialization(e.to_string()))
    }

    /// Decode a tree that was stored under `id`. A payload that fails to
    /// parse, or whose entries are out of order or duplicated, is damage,
    /// not a caller error.
    pub fn decode(id: &ObjectId, data: &[u8]) -> HiveResult<Self> {
        let tree: Tree = serde_json::from_slice(data).map_err(|e| HiveError::Damaged {
            id: *id,
            reason: format!("tree does not parse: {e}"),
        })?;
        for pair in tree.entries.windows(2) {
            let a = (&pair[0].name, pair[0].kind);
            let b = (&pair[1].name, pair[1].kind);
            if a >= b {
                return Err(HiveError::Damaged {
                    id: *id,
                    reason: format!("tree entries out of order at {}", pair[1].name),
                });
            }
        }
        Ok(tree)
    }

    /// Serialize and import into the object database, returning the
    /// tree's content identity.
    pub fn store(&self, db: &dyn ObjectDatabase) -> HiveResult<ObjectId> {
        db.import_bytes(&self.encode()?)
    }

    /// Load and decode a tree from the object database.
    pub fn load(db: &dyn ObjectDatabase, id: &ObjectId) -> HiveResult<Self> {
        let data = db.read_bytes(id)?;
        Self::decode(id, &data)
    }
}

/// Mutable builder for a [`Tree`]. Single-use: `build()` consumes it.
///
/// Owned, unsynchronized; wrap it yourself in the unlikely case two
/// threads must feed one tree.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    entries: BTreeMap<(String, EntryKind), ObjectId>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Fails with [`HiveError::DuplicateEntry`] if the
    /// `(name, kind)` key is already present.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        kind: EntryKind,
        id: ObjectId,
    ) -> HiveResult<&mut Self> {
        let name = name.into();
        if self.entries.contains_key(&(name.clone(), kind)) {
            return Err(HiveError::DuplicateEntry { name, kind });
        }
        self.entries.insert((name, kind), id);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freeze into an immutable tree.
    pub fn build(self) -> Tree {
        let entries = self
            .entries
            .into_iter()
            .map(|((name, kind), id)| TreeEntry { name, kind, id })
            .collect();
        Tree { entries }
    }
}
