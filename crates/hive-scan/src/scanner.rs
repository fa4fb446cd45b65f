use tracing::trace;

use hive_registry::ManifestRegistry;
use hive_store::{ManifestRef, ObjectDatabase, Tree};
use hive_types::{CancelToken, EntryKind, HiveError, HiveResult, ObjectId};

use crate::event::{ScanControl, ScanEvent, TreeVisitor};

/// Traversal options.
#[derive(Clone, Debug, Default)]
pub struct ScanOptions {
    /// Descend into the root trees of resolvable manifest references.
    pub follow_manifest_refs: bool,
    /// Maximum tree nesting depth; the scan root is depth 0. Entries
    /// beyond the limit surface as [`ScanEvent::Skipped`].
    pub max_depth: Option<usize>,
    /// Re-hash blob content against its identity (consistency-check
    /// traversal); mismatches surface as [`ScanEvent::Damaged`].
    pub verify_objects: bool,
    /// Checked between entries.
    pub cancel: CancelToken,
}

/// Recursive pre-order tree traversal.
pub struct TreeScanner<'a> {
    db: &'a dyn ObjectDatabase,
    registry: &'a dyn ManifestRegistry,
    options: ScanOptions,
}

impl<'a> TreeScanner<'a> {
    pub fn new(db: &'a dyn ObjectDatabase, registry: &'a dyn ManifestRegistry) -> Self {
        Self::with_options(db, registry, ScanOptions::default())
    }

    pub fn with_options(
        db: &'a dyn ObjectDatabase,
        registry: &'a dyn ManifestRegistry,
        options: ScanOptions,
    ) -> Self {
        Self {
            db,
            registry,
            options,
        }
    }

    /// Walk the tree rooted at `root`. The root tree is announced with
    /// the empty path before its children.
    pub fn scan(&self, root: &ObjectId, visitor: &mut dyn TreeVisitor) -> HiveResult<()> {
        self.visit_tree(root, "", 0, visitor)
    }

    fn visit_tree(
        &self,
        id: &ObjectId,
        path: &str,
        depth: usize,
        visitor: &mut dyn TreeVisitor,
    ) -> HiveResult<()> {
        if visitor.visit(ScanEvent::Tree { path, id: *id })? == ScanControl::SkipChildren {
            return Ok(());
        }
        self.walk_children(id, path, depth, visitor)
    }

    fn walk_children(
        &self,
        id: &ObjectId,
        path: &str,
        depth: usize,
        visitor: &mut dyn TreeVisitor,
    ) -> HiveResult<()> {
        // A tree that is absent or undecodable is reported in place;
        // sibling traversal above this point continues.
        let tree = match self.load_tree(id) {
            Ok(tree) => tree,
            Err(HiveError::ObjectNotFound(_)) => {
                visitor.visit(ScanEvent::Missing {
                    path,
                    id: *id,
                    kind: EntryKind::Tree,
                })?;
                return Ok(());
            }
            Err(HiveError::Damaged { reason, .. }) => {
                visitor.visit(ScanEvent::Damaged {
                    path,
                    id: *id,
                    reason: &reason,
                })?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        for entry in tree.entries() {
            self.options.cancel.checkpoint()?;
            let child_path = join(path, &entry.name);
            trace!(path = %child_path, kind = %entry.kind, "scan entry");

            match entry.kind {
                EntryKind::Blob => {
                    if !self.db.exists(&entry.id)? {
                        visitor.visit(ScanEvent::Missing {
                            path: &child_path,
                            id: entry.id,
                            kind: EntryKind::Blob,
                        })?;
                    } else if self.options.verify_objects {
                        match self.db.verify(&entry.id) {
                            Ok(()) => {
                                visitor.visit(ScanEvent::Blob {
                                    path: &child_path,
                                    id: entry.id,
                                })?;
                            }
                            Err(HiveError::Damaged { reason, .. }) => {
                                visitor.visit(ScanEvent::Damaged {
                                    path: &child_path,
                                    id: entry.id,
                                    reason: &reason,
                                })?;
                            }
                            Err(e) => return Err(e),
                        }
                    } else {
                        visitor.visit(ScanEvent::Blob {
                            path: &child_path,
                            id: entry.id,
                        })?;
                    }
                }
                EntryKind::Tree => {
                    if self.beyond_limit(depth + 1) {
                        visitor.visit(ScanEvent::Skipped {
                            path: &child_path,
                            id: entry.id,
                            kind: EntryKind::Tree,
                        })?;
                    } else {
                        self.visit_tree(&entry.id, &child_path, depth + 1, visitor)?;
                    }
                }
                EntryKind::Manifest => {
                    self.visit_reference(entry.id, &child_path, depth, visitor)?;
                }
            }
        }
        Ok(())
    }

    fn visit_reference(
        &self,
        id: ObjectId,
        path: &str,
        depth: usize,
        visitor: &mut dyn TreeVisitor,
    ) -> HiveResult<()> {
        let reference = match ManifestRef::load(self.db, &id) {
            Ok(reference) => reference,
            Err(HiveError::ObjectNotFound(_)) => {
                visitor.visit(ScanEvent::Missing {
                    path,
                    id,
                    kind: EntryKind::Manifest,
                })?;
                return Ok(());
            }
            Err(HiveError::Damaged { reason, .. }) => {
                visitor.visit(ScanEvent::Damaged {
                    path,
                    id,
                    reason: &reason,
                })?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let root = self
            .registry
            .get(reference.key())?
            .map(|manifest| *manifest.root());
        let control = visitor.visit(ScanEvent::ManifestRef {
            path,
            id,
            key: reference.key(),
            root,
        })?;

        if self.options.follow_manifest_refs && control == ScanControl::Continue {
            match root {
                // Following a reference implies a tree visit for the
                // referenced root, at the reference's own path.
                Some(root) => {
                    if self.beyond_limit(depth + 1) {
                        visitor.visit(ScanEvent::Skipped {
                            path,
                            id: root,
                            kind: EntryKind::Tree,
                        })?;
                    } else {
                        self.visit_tree(&root, path, depth + 1, visitor)?;
                    }
                }
                None => {
                    visitor.visit(ScanEvent::Missing {
                        path,
                        id,
                        kind: EntryKind::Manifest,
                    })?;
                }
            }
        }
        Ok(())
    }

    fn load_tree(&self, id: &ObjectId) -> HiveResult<Tree> {
        Tree::load(self.db, id)
    }

    fn beyond_limit(&self, depth: usize) -> bool {
        matches!(self.options.max_depth, Some(limit) if depth > limit)
    }
}

fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_registry::{ManifestRegistry, MemoryManifestRegistry};
    use hive_store::{Manifest, MemoryObjectDb};
    use hive_types::ManifestKey;

    /// Visitor that records `(label, path)` pairs.
    #[derive(Default)]
    struct Log {
        events: Vec<(String, String)>,
    }

    impl TreeVisitor for Log {
        fn visit(&mut self, event: ScanEvent<'_>) -> HiveResult<ScanControl> {
            let label = match &event {
                ScanEvent::Blob { .. } => "blob",
                ScanEvent::Tree { .. } => "tree",
                ScanEvent::ManifestRef { .. } => "ref",
                ScanEvent::Missing { .. } => "missing",
                ScanEvent::Damaged { .. } => "damaged",
                ScanEvent::Skipped { .. } => "skipped",
            };
            self.events.push((label.into(), event.path().to_string()));
            Ok(ScanControl::Continue)
        }
    }

    struct Fixture {
        db: MemoryObjectDb,
        registry: MemoryManifestRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                db: MemoryObjectDb::new(),
                registry: MemoryManifestRegistry::new(),
            }
        }

        fn scanner(&self) -> TreeScanner<'_> {
            TreeScanner::new(&self.db, &self.registry)
        }

        fn scanner_with(&self, options: ScanOptions) -> TreeScanner<'_> {
            TreeScanner::with_options(&self.db, &self.registry, options)
        }

        fn blob(&self, content: &[u8]) -> ObjectId {
            self.db.import_bytes(content).unwrap()
        }
    }

    #[test]
    fn pre_order_deterministic_by_name() {
        let fx = Fixture::new();
        let inner_blob = fx.blob(b"inner");
        let mut inner = Tree::builder();
        inner.add("z.txt", EntryKind::Blob, inner_blob).unwrap();
        let inner_id = inner.build().store(&fx.db).unwrap();

        let mut root = Tree::builder();
        root.add("b.txt", EntryKind::Blob, fx.blob(b"b")).unwrap();
        root.add("a-dir", EntryKind::Tree, inner_id).unwrap();
        root.add("c.txt", EntryKind::Blob, fx.blob(b"c")).unwrap();
        let root_id = root.build().store(&fx.db).unwrap();

        let mut log = Log::default();
        fx.scanner().scan(&root_id, &mut log).unwrap();
        let got: Vec<(&str, &str)> = log
            .events
            .iter()
            .map(|(l, p)| (l.as_str(), p.as_str()))
            .collect();
        assert_eq!(
            got,
            [
                ("tree", ""),
                ("tree", "a-dir"),
                ("blob", "a-dir/z.txt"),
                ("blob", "b.txt"),
                ("blob", "c.txt"),
            ]
        );
    }

    #[test]
    fn missing_blob_is_reported_and_siblings_continue() {
        let fx = Fixture::new();
        let mut root = Tree::builder();
        root.add("gone.txt", EntryKind::Blob, ObjectId::from_bytes(b"absent"))
            .unwrap();
        root.add("here.txt", EntryKind::Blob, fx.blob(b"here")).unwrap();
        let root_id = root.build().store(&fx.db).unwrap();

        let mut log = Log::default();
        fx.scanner().scan(&root_id, &mut log).unwrap();
        assert!(log.events.contains(&("missing".into(), "gone.txt".into())));
        assert!(log.events.contains(&("blob".into(), "here.txt".into())));
    }

    #[test]
    fn damaged_subtree_is_reported_and_siblings_continue() {
        let fx = Fixture::new();
        // Bytes that are stored fine but do not decode as a tree.
        let junk = fx.blob(b"certainly not a tree");
        let mut root = Tree::builder();
        root.add("bad", EntryKind::Tree, junk).unwrap();
        root.add("ok.txt", EntryKind::Blob, fx.blob(b"ok")).unwrap();
        let root_id = root.build().store(&fx.db).unwrap();

        let mut log = Log::default();
        fx.scanner().scan(&root_id, &mut log).unwrap();
        assert!(log.events.contains(&("damaged".into(), "bad".into())));
        assert!(log.events.contains(&("blob".into(), "ok.txt".into())));
    }

    #[test]
    fn depth_limit_skips_instead_of_descending() {
        let fx = Fixture::new();
        let mut deep = Tree::builder();
        deep.add("leaf.txt", EntryKind::Blob, fx.blob(b"leaf")).unwrap();
        let deep_id = deep.build().store(&fx.db).unwrap();
        let mut mid = Tree::builder();
        mid.add("deep", EntryKind::Tree, deep_id).unwrap();
        let mid_id = mid.build().store(&fx.db).unwrap();
        let mut root = Tree::builder();
        root.add("mid", EntryKind::Tree, mid_id).unwrap();
        let root_id = root.build().store(&fx.db).unwrap();

        let mut log = Log::default();
        fx.scanner_with(ScanOptions {
            max_depth: Some(1),
            ..ScanOptions::default()
        })
        .scan(&root_id, &mut log)
        .unwrap();

        assert!(log.events.contains(&("tree".into(), "mid".into())));
        assert!(log.events.contains(&("skipped".into(), "mid/deep".into())));
        assert!(!log
            .events
            .iter()
            .any(|(_, p)| p == "mid/deep/leaf.txt"));
    }

    #[test]
    fn skip_children_control_prunes_descent() {
        let fx = Fixture::new();
        let mut inner = Tree::builder();
        inner.add("inner.txt", EntryKind::Blob, fx.blob(b"x")).unwrap();
        let inner_id = inner.build().store(&fx.db).unwrap();
        let mut root = Tree::builder();
        root.add("sub", EntryKind::Tree, inner_id).unwrap();
        let root_id = root.build().store(&fx.db).unwrap();

        let mut seen = Vec::new();
        let mut visitor = |event: ScanEvent<'_>| -> HiveResult<ScanControl> {
            seen.push(event.path().to_string());
            if matches!(event, ScanEvent::Tree { path, .. } if path == "sub") {
                Ok(ScanControl::SkipChildren)
            } else {
                Ok(ScanControl::Continue)
            }
        };
        fx.scanner().scan(&root_id, &mut visitor).unwrap();
        assert!(seen.contains(&"sub".to_string()));
        assert!(!seen.contains(&"sub/inner.txt".to_string()));
    }

    #[test]
    fn manifest_ref_resolves_and_follows() {
        let fx = Fixture::new();
        // Referenced manifest with its own one-blob tree.
        let dep_blob = fx.blob(b"dep data");
        let mut dep_tree = Tree::builder();
        dep_tree.add("data.txt", EntryKind::Blob, dep_blob).unwrap();
        let dep_root = dep_tree.build().store(&fx.db).unwrap();
        let dep_key = ManifestKey::new("dep", "1").unwrap();
        let dep = Manifest::builder(dep_key.clone()).root(dep_root).build().unwrap();
        fx.registry.insert(&dep).unwrap();

        let ref_id = ManifestRef::new(dep_key).store(&fx.db).unwrap();
        let mut root = Tree::builder();
        root.add("dep", EntryKind::Manifest, ref_id).unwrap();
        let root_id = root.build().store(&fx.db).unwrap();

        // Without following: the reference is announced, nothing below.
        let mut log = Log::default();
        fx.scanner().scan(&root_id, &mut log).unwrap();
        assert!(log.events.contains(&("ref".into(), "dep".into())));
        assert!(!log.events.iter().any(|(_, p)| p == "dep/data.txt"));

        // Following: the referenced root gets its tree visit at the
        // reference's path, then its children.
        let mut log = Log::default();
        fx.scanner_with(ScanOptions {
            follow_manifest_refs: true,
            ..ScanOptions::default()
        })
        .scan(&root_id, &mut log)
        .unwrap();
        assert!(log.events.contains(&("ref".into(), "dep".into())));
        assert!(log.events.contains(&("tree".into(), "dep".into())));
        assert!(log.events.contains(&("blob".into(), "dep/data.txt".into())));
    }

    #[test]
    fn unresolvable_reference_reports_missing_when_following() {
        let fx = Fixture::new();
        let ref_id = ManifestRef::new(ManifestKey::new("ghost", "1").unwrap())
            .store(&fx.db)
            .unwrap();
        let mut root = Tree::builder();
        root.add("ghost", EntryKind::Manifest, ref_id).unwrap();
        let root_id = root.build().store(&fx.db).unwrap();

        let mut log = Log::default();
        fx.scanner_with(ScanOptions {
            follow_manifest_refs: true,
            ..ScanOptions::default()
        })
        .scan(&root_id, &mut log)
        .unwrap();
        assert!(log.events.contains(&("ref".into(), "ghost".into())));
        assert!(log.events.contains(&("missing".into(), "ghost".into())));
    }

    #[test]
    fn missing_root_tree_is_reported_not_thrown() {
        let fx = Fixture::new();
        let absent = ObjectId::from_bytes(b"no such tree");
        let mut log = Log::default();
        fx.scanner().scan(&absent, &mut log).unwrap();
        assert_eq!(log.events[0].0, "tree");
        assert_eq!(log.events[1].0, "missing");
    }

    #[test]
    fn verification_reports_tampered_blobs() {
        use hive_store::FsObjectDb;

        let dir = tempfile::tempdir().unwrap();
        let db = FsObjectDb::open(dir.path().join("objects")).unwrap();
        let registry = MemoryManifestRegistry::new();

        let blob = db.import_bytes(b"pristine bytes").unwrap();
        let mut root = Tree::builder();
        root.add("victim.txt", EntryKind::Blob, blob).unwrap();
        let root_id = root.build().store(&db).unwrap();

        // Corrupt the stored blob behind the store's back.
        let hex = blob.to_hex();
        let path = db.root().join(&hex[..2]).join(&hex[2..4]).join(&hex);
        std::fs::write(&path, b"tampered bytes").unwrap();

        let scanner = TreeScanner::with_options(
            &db,
            &registry,
            ScanOptions {
                verify_objects: true,
                ..ScanOptions::default()
            },
        );
        let mut log = Log::default();
        scanner.scan(&root_id, &mut log).unwrap();
        assert!(log.events.contains(&("damaged".into(), "victim.txt".into())));
    }

    #[test]
    fn cancellation_aborts_scan() {
        let fx = Fixture::new();
        let mut root = Tree::builder();
        root.add("a.txt", EntryKind::Blob, fx.blob(b"a")).unwrap();
        let root_id = root.build().store(&fx.db).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let mut log = Log::default();
        let err = fx
            .scanner_with(ScanOptions {
                cancel,
                ..ScanOptions::default()
            })
            .scan(&root_id, &mut log)
            .unwrap_err();
        assert!(matches!(err, HiveError::Cancelled));
    }
}
