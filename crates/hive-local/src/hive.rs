use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use hive_notify::{SpawnNotifier, SpawnObserver};
use hive_registry::{FsManifestRegistry, ManifestRegistry, MemoryManifestRegistry};
use hive_store::{
    FsObjectDb, Manifest, ManifestRef, MemoryObjectDb, ObjectDatabase, Tree,
};
use hive_txn::{NamedLocks, Transaction};
use hive_types::{
    CancelToken, EntryKind, HiveError, HiveResult, ManifestKey, ObjectId,
};

use crate::config::HiveConfig;
use crate::export::export_tree;
use crate::import::import_directory;

/// Store-level counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HiveStats {
    pub manifests: usize,
    pub objects: usize,
}

/// Outcome of a prune pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub examined: usize,
    pub removed: usize,
}

/// A local hive: object database + manifest registry + transactions +
/// spawn notification.
pub struct Hive {
    db: Arc<dyn ObjectDatabase>,
    registry: Arc<dyn ManifestRegistry>,
    locks: NamedLocks,
    notifier: SpawnNotifier,
    config: HiveConfig,
}

impl Hive {
    /// A fully in-memory hive with default configuration.
    pub fn in_memory() -> Self {
        Self::in_memory_with(HiveConfig::default())
    }

    /// A fully in-memory hive.
    pub fn in_memory_with(config: HiveConfig) -> Self {
        Self::assemble(
            Arc::new(MemoryObjectDb::new()),
            Arc::new(MemoryManifestRegistry::new()),
            config,
        )
    }

    /// Open (creating if necessary) a filesystem-backed hive under
    /// `root`, with objects in `root/objects` and manifests in
    /// `root/manifests`.
    pub fn open(root: impl AsRef<Path>, config: HiveConfig) -> HiveResult<Self> {
        let root = root.as_ref();
        let db = FsObjectDb::open(root.join("objects"))?;
        let registry = FsManifestRegistry::open(root.join("manifests"))?;
        info!(root = %root.display(), "hive opened");
        Ok(Self::assemble(Arc::new(db), Arc::new(registry), config))
    }

    fn assemble(
        db: Arc<dyn ObjectDatabase>,
        registry: Arc<dyn ManifestRegistry>,
        config: HiveConfig,
    ) -> Self {
        let notifier = SpawnNotifier::new(config.debounce);
        Self {
            db,
            registry,
            locks: NamedLocks::new(),
            notifier,
            config,
        }
    }

    pub fn db(&self) -> &dyn ObjectDatabase {
        self.db.as_ref()
    }

    pub fn registry(&self) -> &dyn ManifestRegistry {
        self.registry.as_ref()
    }

    /// The shared named-lock registry (manifest names, meta streams).
    pub fn locks(&self) -> &NamedLocks {
        &self.locks
    }

    pub fn config(&self) -> &HiveConfig {
        &self.config
    }

    /// Register a spawn observer.
    pub fn subscribe_spawns<O: SpawnObserver + 'static>(&self, observer: O) {
        self.notifier.subscribe(observer);
    }

    // -----------------------------------------------------------------
    // Transactions and manifest operations
    // -----------------------------------------------------------------

    /// Open a transaction scope.
    pub fn begin(&self) -> Transaction<'_> {
        Transaction::new(
            self.db.as_ref(),
            self.registry.as_ref(),
            &self.locks,
            Some(&self.notifier),
        )
    }

    /// Insert one manifest in its own transaction. Returns the newly
    /// inserted keys (empty for an idempotent re-insert).
    pub fn insert_manifest(&self, manifest: Manifest) -> HiveResult<Vec<ManifestKey>> {
        let mut txn = self.begin();
        txn.stage_manifest(manifest)?;
        txn.commit()
    }

    /// Look up a manifest. `Ok(None)` if absent.
    pub fn manifest(&self, key: &ManifestKey) -> HiveResult<Option<Manifest>> {
        self.registry.get(key)
    }

    /// Load a manifest, failing with `ManifestNotFound` if absent.
    pub fn load_manifest(&self, key: &ManifestKey) -> HiveResult<Manifest> {
        self.registry
            .get(key)?
            .ok_or_else(|| HiveError::manifest_not_found(key))
    }

    /// Every manifest, sorted by key.
    pub fn list_manifests(&self) -> HiveResult<Vec<Manifest>> {
        self.registry.list()
    }

    /// Remove a manifest under its name lock. Maintenance operation; the
    /// content it referenced stays until the next prune.
    pub fn remove_manifest(&self, key: &ManifestKey) -> HiveResult<bool> {
        let lock = self.locks.handle(key.name());
        let _guard = lock.lock().expect("named lock poisoned");
        let removed = self.registry.remove(key)?;
        if removed {
            debug!(key = %key, "manifest removed");
        }
        Ok(removed)
    }

    /// Key -> root identity for the named manifests (all tags of each
    /// name), or for every manifest when `names` is empty. An explicitly
    /// requested name with no manifests is `ManifestNotFound`.
    pub fn manifest_inventory(
        &self,
        names: &[String],
    ) -> HiveResult<BTreeMap<ManifestKey, ObjectId>> {
        let all = self.registry.inventory()?;
        if names.is_empty() {
            return Ok(all.into_iter().collect());
        }
        let mut out = BTreeMap::new();
        for name in names {
            let mut found = false;
            for (key, root) in &all {
                if key.name() == name.as_str() {
                    out.insert(key.clone(), *root);
                    found = true;
                }
            }
            if !found {
                return Err(HiveError::manifest_name_not_found(name));
            }
        }
        Ok(out)
    }

    /// Subset of `ids` absent from the object database.
    pub fn missing_objects(&self, ids: &[ObjectId]) -> HiveResult<BTreeSet<ObjectId>> {
        Ok(self.db.missing(ids)?.into_iter().collect())
    }

    // -----------------------------------------------------------------
    // Reachability closures (the sync protocol's building blocks)
    // -----------------------------------------------------------------

    /// Transitive set of tree identities reachable from `root`: the root
    /// itself, nested trees, and -- through the registry -- the root
    /// trees of referenced manifests. References that do not resolve
    /// locally are skipped; the scanner is the diagnosis tool for those.
    pub fn tree_closure(&self, root: &ObjectId) -> HiveResult<BTreeSet<ObjectId>> {
        let mut trees = BTreeSet::new();
        let mut queue: VecDeque<ObjectId> = VecDeque::new();
        trees.insert(*root);
        queue.push_back(*root);

        while let Some(tree_id) = queue.pop_front() {
            let tree = Tree::load(self.db.as_ref(), &tree_id)?;
            for entry in tree.entries() {
                match entry.kind {
                    EntryKind::Blob => {}
                    EntryKind::Tree => {
                        if trees.insert(entry.id) {
                            queue.push_back(entry.id);
                        }
                    }
                    EntryKind::Manifest => {
                        let Ok(reference) = ManifestRef::load(self.db.as_ref(), &entry.id)
                        else {
                            continue;
                        };
                        if let Some(manifest) = self.registry.get(reference.key())? {
                            if trees.insert(*manifest.root()) {
                                queue.push_back(*manifest.root());
                            }
                        }
                    }
                }
            }
        }
        Ok(trees)
    }

    /// Non-tree objects (blobs and manifest-reference blobs) required to
    /// materialize `trees`, excluding anything reachable only through
    /// trees in `exclude` -- a locally-present tree's content is assumed
    /// locally present too.
    pub fn object_closure(
        &self,
        trees: &BTreeSet<ObjectId>,
        exclude: &BTreeSet<ObjectId>,
    ) -> HiveResult<BTreeSet<ObjectId>> {
        let mut objects = BTreeSet::new();
        let mut visited: HashSet<ObjectId> = HashSet::new();
        let mut queue: VecDeque<ObjectId> = VecDeque::new();
        for tree_id in trees {
            if !exclude.contains(tree_id) && visited.insert(*tree_id) {
                queue.push_back(*tree_id);
            }
        }

        while let Some(tree_id) = queue.pop_front() {
            let tree = Tree::load(self.db.as_ref(), &tree_id)?;
            for entry in tree.entries() {
                match entry.kind {
                    EntryKind::Blob | EntryKind::Manifest => {
                        objects.insert(entry.id);
                    }
                    EntryKind::Tree => {
                        if !exclude.contains(&entry.id) && visited.insert(entry.id) {
                            queue.push_back(entry.id);
                        }
                    }
                }
            }
        }
        Ok(objects)
    }

    // -----------------------------------------------------------------
    // Import / export
    // -----------------------------------------------------------------

    /// Import a directory into the object database, returning the root
    /// tree identity. Files become blobs, subdirectories nested trees;
    /// file imports run on the configured worker count.
    pub fn import_dir(&self, dir: &Path) -> HiveResult<ObjectId> {
        self.import_dir_cancellable(dir, &CancelToken::new())
    }

    /// [`import_dir`](Self::import_dir) with a cooperative cancellation
    /// token, checked between files.
    pub fn import_dir_cancellable(
        &self,
        dir: &Path,
        cancel: &CancelToken,
    ) -> HiveResult<ObjectId> {
        import_directory(self.db.as_ref(), dir, self.config.parallelism, cancel)
    }

    /// Materialize a manifest's tree into `dest`. Manifest-reference
    /// entries are not exported; they are pointers, not content.
    pub fn export(&self, key: &ManifestKey, dest: &Path) -> HiveResult<()> {
        let manifest = self.load_manifest(key)?;
        export_tree(self.db.as_ref(), manifest.root(), dest)
    }

    // -----------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------

    /// Delete every object unreachable from the live manifest set.
    pub fn prune(&self) -> HiveResult<PruneReport> {
        let mut reachable: BTreeSet<ObjectId> = BTreeSet::new();
        for manifest in self.registry.list()? {
            let trees = self.tree_closure(manifest.root())?;
            let objects = self.object_closure(&trees, &BTreeSet::new())?;
            reachable.extend(trees);
            reachable.extend(objects);
        }

        let mut report = PruneReport::default();
        for id in self.db.list()? {
            report.examined += 1;
            if !reachable.contains(&id) {
                self.db.delete(&id)?;
                report.removed += 1;
            }
        }
        info!(
            examined = report.examined,
            removed = report.removed,
            "prune complete"
        );
        Ok(report)
    }

    pub fn stats(&self) -> HiveResult<HiveStats> {
        Ok(HiveStats {
            manifests: self.registry.list()?.len(),
            objects: self.db.list()?.len(),
        })
    }
}

impl std::fmt::Debug for Hive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hive")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str, tag: &str) -> ManifestKey {
        ManifestKey::new(name, tag).unwrap()
    }

    /// Store a one-blob tree and return its id.
    fn store_tree(hive: &Hive, content: &[u8]) -> ObjectId {
        let blob = hive.db().import_bytes(content).unwrap();
        let mut builder = Tree::builder();
        builder.add("data", EntryKind::Blob, blob).unwrap();
        builder.build().store(hive.db()).unwrap()
    }

    fn insert(hive: &Hive, name: &str, tag: &str, content: &[u8]) -> Manifest {
        let root = store_tree(hive, content);
        let manifest = Manifest::builder(key(name, tag)).root(root).build().unwrap();
        hive.insert_manifest(manifest.clone()).unwrap();
        manifest
    }

    #[test]
    fn insert_load_list() {
        let hive = Hive::in_memory();
        let m = insert(&hive, "app", "1", b"v1");
        assert_eq!(hive.load_manifest(m.key()).unwrap(), m);
        assert_eq!(hive.list_manifests().unwrap().len(), 1);
    }

    #[test]
    fn load_missing_manifest_fails() {
        let hive = Hive::in_memory();
        let err = hive.load_manifest(&key("ghost", "1")).unwrap_err();
        assert!(matches!(err, HiveError::ManifestNotFound { .. }));
    }

    #[test]
    fn remove_manifest() {
        let hive = Hive::in_memory();
        let m = insert(&hive, "app", "1", b"v1");
        assert!(hive.remove_manifest(m.key()).unwrap());
        assert!(!hive.remove_manifest(m.key()).unwrap());
        assert!(hive.manifest(m.key()).unwrap().is_none());
    }

    #[test]
    fn inventory_all_and_by_name() {
        let hive = Hive::in_memory();
        let a1 = insert(&hive, "a", "1", b"a1");
        let a2 = insert(&hive, "a", "2", b"a2");
        insert(&hive, "b", "1", b"b1");

        let all = hive.manifest_inventory(&[]).unwrap();
        assert_eq!(all.len(), 3);

        let only_a = hive.manifest_inventory(&["a".to_string()]).unwrap();
        assert_eq!(only_a.len(), 2);
        assert_eq!(only_a[a1.key()], *a1.root());
        assert_eq!(only_a[a2.key()], *a2.root());
    }

    #[test]
    fn inventory_unknown_name_fails() {
        let hive = Hive::in_memory();
        insert(&hive, "a", "1", b"a1");
        let err = hive.manifest_inventory(&["nope".to_string()]).unwrap_err();
        assert!(matches!(err, HiveError::ManifestNotFound { .. }));
    }

    #[test]
    fn tree_closure_includes_nested_and_referenced_roots() {
        let hive = Hive::in_memory();
        let dep = insert(&hive, "dep", "1", b"dep content");

        let ref_id = ManifestRef::new(dep.key().clone()).store(hive.db()).unwrap();
        let inner_blob = hive.db().import_bytes(b"inner").unwrap();
        let mut inner = Tree::builder();
        inner.add("file", EntryKind::Blob, inner_blob).unwrap();
        let inner_id = inner.build().store(hive.db()).unwrap();

        let mut outer = Tree::builder();
        outer.add("sub", EntryKind::Tree, inner_id).unwrap();
        outer.add("dep", EntryKind::Manifest, ref_id).unwrap();
        let root = outer.build().store(hive.db()).unwrap();

        let closure = hive.tree_closure(&root).unwrap();
        assert!(closure.contains(&root));
        assert!(closure.contains(&inner_id));
        assert!(closure.contains(dep.root()));
        assert_eq!(closure.len(), 3);
    }

    #[test]
    fn object_closure_collects_blobs_and_refs() {
        let hive = Hive::in_memory();
        let dep = insert(&hive, "dep", "1", b"dep content");

        let ref_id = ManifestRef::new(dep.key().clone()).store(hive.db()).unwrap();
        let blob = hive.db().import_bytes(b"payload").unwrap();
        let mut builder = Tree::builder();
        builder.add("file", EntryKind::Blob, blob).unwrap();
        builder.add("dep", EntryKind::Manifest, ref_id).unwrap();
        let root = builder.build().store(hive.db()).unwrap();

        let trees: BTreeSet<ObjectId> = [root].into_iter().collect();
        let objects = hive.object_closure(&trees, &BTreeSet::new()).unwrap();
        assert!(objects.contains(&blob));
        assert!(objects.contains(&ref_id));
        assert_eq!(objects.len(), 2);
    }

    #[test]
    fn object_closure_honors_exclusion() {
        let hive = Hive::in_memory();
        let excluded_blob = hive.db().import_bytes(b"excluded").unwrap();
        let mut inner = Tree::builder();
        inner.add("x", EntryKind::Blob, excluded_blob).unwrap();
        let inner_id = inner.build().store(hive.db()).unwrap();

        let kept_blob = hive.db().import_bytes(b"kept").unwrap();
        let mut outer = Tree::builder();
        outer.add("keep", EntryKind::Blob, kept_blob).unwrap();
        outer.add("sub", EntryKind::Tree, inner_id).unwrap();
        let root = outer.build().store(hive.db()).unwrap();

        let trees: BTreeSet<ObjectId> = [root].into_iter().collect();
        let exclude: BTreeSet<ObjectId> = [inner_id].into_iter().collect();
        let objects = hive.object_closure(&trees, &exclude).unwrap();
        assert!(objects.contains(&kept_blob));
        assert!(!objects.contains(&excluded_blob));
    }

    #[test]
    fn missing_objects_subsets_correctly() {
        let hive = Hive::in_memory();
        let present = hive.db().import_bytes(b"present").unwrap();
        let absent = ObjectId::from_bytes(b"absent");
        let missing = hive.missing_objects(&[present, absent]).unwrap();
        assert_eq!(missing.into_iter().collect::<Vec<_>>(), vec![absent]);
    }

    #[test]
    fn prune_removes_unreachable_objects() {
        let hive = Hive::in_memory();
        insert(&hive, "app", "1", b"live");
        let orphan = hive.db().import_bytes(b"orphan bytes").unwrap();

        let report = hive.prune().unwrap();
        assert_eq!(report.removed, 1);
        assert!(!hive.db().exists(&orphan).unwrap());

        // Live content stayed.
        let m = hive.load_manifest(&key("app", "1")).unwrap();
        assert!(hive.db().exists(m.root()).unwrap());
    }

    #[test]
    fn prune_keeps_referenced_manifest_content() {
        let hive = Hive::in_memory();
        let dep = insert(&hive, "dep", "1", b"dep content");

        let ref_id = ManifestRef::new(dep.key().clone()).store(hive.db()).unwrap();
        let mut builder = Tree::builder();
        builder.add("dep", EntryKind::Manifest, ref_id).unwrap();
        let root = builder.build().store(hive.db()).unwrap();
        let top = Manifest::builder(key("top", "1")).root(root).build().unwrap();
        hive.insert_manifest(top).unwrap();

        // Remove the dep manifest from the registry but keep top; top's
        // reference no longer resolves, so dep's content is garbage.
        hive.remove_manifest(dep.key()).unwrap();
        let report = hive.prune().unwrap();
        assert!(report.removed > 0);
        assert!(!hive.db().exists(dep.root()).unwrap());
        // Top's own tree and reference blob survive.
        assert!(hive.db().exists(&root).unwrap());
        assert!(hive.db().exists(&ref_id).unwrap());
    }

    #[test]
    fn stats_counts() {
        let hive = Hive::in_memory();
        insert(&hive, "app", "1", b"v1");
        let stats = hive.stats().unwrap();
        assert_eq!(stats.manifests, 1);
        assert_eq!(stats.objects, 2); // blob + tree
    }

    #[test]
    fn fs_backed_hive_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let m = {
            let hive = Hive::open(dir.path(), HiveConfig::default()).unwrap();
            insert(&hive, "app", "1", b"persisted")
        };
        let hive = Hive::open(dir.path(), HiveConfig::default()).unwrap();
        assert_eq!(hive.load_manifest(m.key()).unwrap(), m);
        assert!(hive.db().exists(m.root()).unwrap());
    }

    #[test]
    fn spawn_observers_hear_about_inserts() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let hive = Hive::in_memory_with(HiveConfig {
            debounce: std::time::Duration::from_millis(20),
            ..HiveConfig::default()
        });
        let count = Arc::new(AtomicUsize::new(0));
        let obs = Arc::clone(&count);
        hive.subscribe_spawns(move |keys: &[ManifestKey]| {
            obs.fetch_add(keys.len(), Ordering::SeqCst);
        });

        insert(&hive, "app", "1", b"v1");
        insert(&hive, "app", "2", b"v2");
        std::thread::sleep(std::time::Duration::from_millis(120));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_bulk_insert_notifies_every_key_exactly_once() {
        use std::sync::{Arc, Mutex};

        let hive = Arc::new(Hive::in_memory());
        let seen = Arc::new(Mutex::new(std::collections::BTreeSet::new()));
        let obs = Arc::clone(&seen);
        hive.subscribe_spawns(move |keys: &[ManifestKey]| {
            let mut set = obs.lock().unwrap();
            for k in keys {
                assert!(set.insert(k.clone()), "duplicate notification for {k}");
            }
        });

        let workers: Vec<_> = (0..20)
            .map(|w| {
                let hive = Arc::clone(&hive);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let content = format!("creation {w}-{i}");
                        let root = store_tree(&hive, content.as_bytes());
                        let manifest = Manifest::builder(
                            key("spawned", &format!("{w}-{i}")),
                        )
                        .root(root)
                        .build()
                        .unwrap();
                        hive.insert_manifest(manifest).unwrap();
                    }
                })
            })
            .collect();
        for h in workers {
            h.join().unwrap();
        }

        // Debounce window plus a grace period.
        std::thread::sleep(std::time::Duration::from_millis(500));
        assert_eq!(seen.lock().unwrap().len(), 1000);
    }
}
