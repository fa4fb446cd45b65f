//! Tree diffing by identity.
//!
//! Two trees are compared by flattening each traversal into a map keyed
//! by full entry path, then classifying paths as only-left, only-right,
//! or changed. Comparison is purely identity-based: equal identity means
//! equal content under the content-addressing invariant, so no bytes are
//! ever re-read. For manifest-reference entries the *referenced* root
//! identity is compared in addition to the reference blob's own identity,
//! so repointing a reference at a new generation shows up even when the
//! reference blob happens to be reused.

use std::collections::BTreeMap;

use hive_registry::ManifestRegistry;
use hive_scan::{ScanControl, ScanEvent, TreeScanner};
use hive_store::ObjectDatabase;
use hive_types::{EntryKind, HiveResult, ObjectId};

/// One side of a flattened entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlatEntry {
    pub kind: EntryKind,
    pub id: ObjectId,
    /// Resolved root of the referenced manifest, for entries of kind
    /// `Manifest`; `None` otherwise (or when the reference is dangling).
    pub target_root: Option<ObjectId>,
}

/// One difference between two trees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffEntry {
    /// The path exists only in the left tree.
    OnlyLeft { path: String, entry: FlatEntry },
    /// The path exists only in the right tree.
    OnlyRight { path: String, entry: FlatEntry },
    /// The path exists on both sides with different identities.
    Changed {
        path: String,
        left: FlatEntry,
        right: FlatEntry,
    },
}

impl DiffEntry {
    pub fn path(&self) -> &str {
        match self {
            Self::OnlyLeft { path, .. }
            | Self::OnlyRight { path, .. }
            | Self::Changed { path, .. } => path,
        }
    }
}

/// Identity-based differ over two tree snapshots.
pub struct TreeDiffer<'a> {
    db: &'a dyn ObjectDatabase,
    registry: &'a dyn ManifestRegistry,
}

impl<'a> TreeDiffer<'a> {
    pub fn new(db: &'a dyn ObjectDatabase, registry: &'a dyn ManifestRegistry) -> Self {
        Self { db, registry }
    }

    /// Compare the trees rooted at `left` and `right`. The result is
    /// sorted by path.
    pub fn diff(&self, left: &ObjectId, right: &ObjectId) -> HiveResult<Vec<DiffEntry>> {
        let left_map = self.flatten(left)?;
        let right_map = self.flatten(right)?;

        let mut diffs = Vec::new();
        for (path, left_entry) in &left_map {
            match right_map.get(path) {
                None => diffs.push(DiffEntry::OnlyLeft {
                    path: path.clone(),
                    entry: *left_entry,
                }),
                Some(right_entry) if right_entry != left_entry => {
                    diffs.push(DiffEntry::Changed {
                        path: path.clone(),
                        left: *left_entry,
                        right: *right_entry,
                    })
                }
                Some(_) => {}
            }
        }
        for (path, right_entry) in &right_map {
            if !left_map.contains_key(path) {
                diffs.push(DiffEntry::OnlyRight {
                    path: path.clone(),
                    entry: *right_entry,
                });
            }
        }
        diffs.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(diffs)
    }

    /// Flatten one traversal into a path-keyed map. Paths are unique
    /// within a traversal by construction (tree keys are unique and the
    /// kind disambiguates same-named entries -- see below).
    fn flatten(&self, root: &ObjectId) -> HiveResult<BTreeMap<String, FlatEntry>> {
        let mut map = BTreeMap::new();
        let scanner = TreeScanner::new(self.db, self.registry);
        let mut visitor = |event: ScanEvent<'_>| -> HiveResult<ScanControl> {
            match event {
                // The scan root itself has no path and is represented by
                // the diff of its children.
                ScanEvent::Tree { path: "", .. } => {}
                ScanEvent::Tree { path, id } => {
                    insert(&mut map, path, EntryKind::Tree, id, None);
                }
                ScanEvent::Blob { path, id } => {
                    insert(&mut map, path, EntryKind::Blob, id, None);
                }
                ScanEvent::ManifestRef { path, id, root, .. } => {
                    insert(&mut map, path, EntryKind::Manifest, id, root);
                }
                // Absent objects still have identities; the diff stays
                // purely identity-based either way.
                ScanEvent::Missing { path, id, kind } => {
                    insert(&mut map, path, kind, id, None);
                }
                ScanEvent::Damaged { .. } | ScanEvent::Skipped { .. } => {}
            }
            Ok(ScanControl::Continue)
        };
        scanner.scan(root, &mut visitor)?;
        Ok(map)
    }
}

fn insert(
    map: &mut BTreeMap<String, FlatEntry>,
    path: &str,
    kind: EntryKind,
    id: ObjectId,
    target_root: Option<ObjectId>,
) {
    // A blob and a tree may share a name within one parent; suffix the
    // path with the kind so both survive flattening.
    let key = match kind {
        EntryKind::Blob => path.to_string(),
        EntryKind::Tree => format!("{path}//tree"),
        EntryKind::Manifest => format!("{path}//manifest"),
    };
    map.insert(
        key,
        FlatEntry {
            kind,
            id,
            target_root,
        },
    );
}
