use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Instant;

use tracing::{debug, info, warn};

use hive_archive::ArchiveWriter;
use hive_local::Hive;
use hive_store::{referenced_keys, Manifest, ObjectDatabase};
use hive_types::{HiveResult, ManifestKey, ObjectId};

use crate::remote::RemoteHive;
use crate::stats::TransferStats;

/// Pushes manifests to a remote hive, transferring only what the remote
/// lacks.
pub struct PushEngine<'a> {
    local: &'a Hive,
}

impl<'a> PushEngine<'a> {
    pub fn new(local: &'a Hive) -> Self {
        Self { local }
    }

    /// Push the named manifests (all their tags), or everything when
    /// `names` is empty.
    ///
    /// Before any delta is computed the requested set is expanded to
    /// include every transitively referenced manifest, so the remote
    /// never receives a manifest pointing at another one it cannot
    /// resolve. The archive is a deliberate delta
    /// (`partial_allowed = true` on the receiving side).
    pub async fn push(
        &self,
        remote: &dyn RemoteHive,
        names: &[String],
    ) -> HiveResult<TransferStats> {
        let started = Instant::now();

        // Requested manifests, then transitive reference expansion.
        let requested = self.local.manifest_inventory(names)?;
        let expanded = self.expand(requested)?;

        // Manifest-level diff: what the remote does not already have.
        let remote_inventory = remote.manifests(&[]).await?;
        let to_send: Vec<&Manifest> = expanded
            .values()
            .filter(|m| !remote_inventory.contains_key(m.key()))
            .collect();
        if to_send.is_empty() {
            return Ok(TransferStats {
                duration: started.elapsed(),
                ..TransferStats::default()
            });
        }

        // Tree-level diff, this time asking the remote what it lacks.
        let mut required_trees: BTreeSet<ObjectId> = BTreeSet::new();
        for manifest in &to_send {
            required_trees.extend(self.local.tree_closure(manifest.root())?);
        }
        let trees_vec: Vec<ObjectId> = required_trees.iter().copied().collect();
        let missing_trees = remote.missing_objects(&trees_vec).await?;
        let trees_reused = required_trees.len() - missing_trees.len();
        let present_trees: BTreeSet<ObjectId> = required_trees
            .difference(&missing_trees)
            .copied()
            .collect();

        // Object-level diff over the missing trees only.
        let candidate_objects = self.local.object_closure(&missing_trees, &present_trees)?;
        let objects_vec: Vec<ObjectId> = candidate_objects.iter().copied().collect();
        let missing_objects = remote.missing_objects(&objects_vec).await?;

        // Package the delta and hand it over.
        let mut writer = ArchiveWriter::with_level(self.local.config().archive_level);
        let mut transfer: BTreeSet<ObjectId> = missing_trees;
        transfer.extend(missing_objects);
        for id in &transfer {
            writer.add_object(*id, self.local.db().read_bytes(id)?);
        }
        for manifest in &to_send {
            writer.add_manifest((*manifest).clone());
        }
        let archive = writer.finish()?;
        let bytes = archive.len() as u64;
        remote.push(archive).await?;

        let stats = TransferStats {
            manifests: to_send.len(),
            trees_reused,
            objects: transfer.len(),
            bytes,
            duration: started.elapsed(),
        };
        info!(%stats, "push complete");
        Ok(stats)
    }

    /// Join every transitively referenced manifest to the requested set.
    /// A reference that does not resolve locally is a pre-existing local
    /// condition push cannot repair; it is logged and skipped rather
    /// than blocking all replication.
    fn expand(
        &self,
        requested: BTreeMap<ManifestKey, ObjectId>,
    ) -> HiveResult<BTreeMap<ManifestKey, Manifest>> {
        let mut expanded: BTreeMap<ManifestKey, Manifest> = BTreeMap::new();
        let mut queue: VecDeque<ManifestKey> = VecDeque::new();

        for key in requested.into_keys() {
            let manifest = self.local.load_manifest(&key)?;
            expanded.insert(key.clone(), manifest);
            queue.push_back(key);
        }

        while let Some(key) = queue.pop_front() {
            let root = *expanded[&key].root();
            for referenced in referenced_keys(self.local.db(), &root)? {
                if expanded.contains_key(&referenced) {
                    continue;
                }
                match self.local.manifest(&referenced)? {
                    Some(manifest) => {
                        debug!(key = %referenced, via = %key, "expanded referenced manifest");
                        expanded.insert(referenced.clone(), manifest);
                        queue.push_back(referenced);
                    }
                    None => {
                        warn!(key = %referenced, via = %key, "dangling manifest reference, not pushed");
                    }
                }
            }
        }
        Ok(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::LocalEndpoint;
    use crate::fetch::FetchEngine;
    use hive_store::{ManifestRef, Tree};
    use hive_types::EntryKind;
    use std::sync::Arc;

    fn key(name: &str, tag: &str) -> ManifestKey {
        ManifestKey::new(name, tag).unwrap()
    }

    fn populate(hive: &Hive, name: &str, marker: &[u8]) -> Manifest {
        let blob = hive.db().import_bytes(marker).unwrap();
        let nested_blob = hive.db().import_bytes(b"nested content").unwrap();
        let mut nested = Tree::builder();
        nested.add("file.txt", EntryKind::Blob, nested_blob).unwrap();
        let nested_id = nested.build().store(hive.db()).unwrap();

        let mut root = Tree::builder();
        root.add("test.txt", EntryKind::Blob, blob).unwrap();
        root.add("dir", EntryKind::Tree, nested_id).unwrap();
        let root_id = root.build().store(hive.db()).unwrap();

        let manifest = Manifest::builder(key(name, "1")).root(root_id).build().unwrap();
        hive.insert_manifest(manifest.clone()).unwrap();
        manifest
    }

    #[tokio::test]
    async fn push_round_trip() {
        let local = Hive::in_memory();
        let manifest = populate(&local, "app", b"pushed leaf");

        let destination = Arc::new(Hive::in_memory());
        let remote = LocalEndpoint::new(Arc::clone(&destination));

        let stats = PushEngine::new(&local)
            .push(&remote, &["app".to_string()])
            .await
            .unwrap();
        assert_eq!(stats.manifests, 1);
        assert_eq!(stats.objects, 4); // 2 trees + 2 blobs
        assert!(stats.bytes > 0);

        let received = destination.load_manifest(manifest.key()).unwrap();
        assert_eq!(received.root(), manifest.root());
        assert_eq!(destination.db().list().unwrap(), local.db().list().unwrap());
    }

    #[tokio::test]
    async fn repush_transfers_nothing() {
        let local = Hive::in_memory();
        populate(&local, "app", b"leaf");
        let destination = Arc::new(Hive::in_memory());
        let remote = LocalEndpoint::new(Arc::clone(&destination));

        let engine = PushEngine::new(&local);
        engine.push(&remote, &["app".to_string()]).await.unwrap();
        let stats = engine.push(&remote, &["app".to_string()]).await.unwrap();
        assert_eq!(stats.manifests, 0);
        assert_eq!(stats.objects, 0, "idempotent re-push moves no objects");
        assert_eq!(stats.bytes, 0);
    }

    #[tokio::test]
    async fn push_expands_referenced_manifests() {
        let local = Hive::in_memory();
        let dep = populate(&local, "dep", b"dep leaf");

        let ref_id = ManifestRef::new(dep.key().clone()).store(local.db()).unwrap();
        let mut root = Tree::builder();
        root.add("dep", EntryKind::Manifest, ref_id).unwrap();
        let root_id = root.build().store(local.db()).unwrap();
        let top = Manifest::builder(key("top", "1")).root(root_id).build().unwrap();
        local.insert_manifest(top.clone()).unwrap();

        let destination = Arc::new(Hive::in_memory());
        let remote = LocalEndpoint::new(Arc::clone(&destination));

        // Only "top" is requested; "dep" must ride along.
        let stats = PushEngine::new(&local)
            .push(&remote, &["top".to_string()])
            .await
            .unwrap();
        assert_eq!(stats.manifests, 2);
        assert!(destination.manifest(dep.key()).unwrap().is_some());
        assert!(destination.manifest(top.key()).unwrap().is_some());
    }

    #[tokio::test]
    async fn push_then_fetch_reproduces_the_original() {
        // Populate A, push A to B, fetch B into C; C's manifest, tree,
        // and object content must equal A's by identity, and the
        // transferred object count must equal A's reachable set.
        let a = Hive::in_memory();
        let manifest = populate(&a, "app", b"round trip leaf");

        let b = Arc::new(Hive::in_memory());
        let push_stats = PushEngine::new(&a)
            .push(&LocalEndpoint::new(Arc::clone(&b)), &["app".to_string()])
            .await
            .unwrap();
        assert_eq!(push_stats.objects, a.db().list().unwrap().len());

        let c = Hive::in_memory();
        let fetch_stats = FetchEngine::new(&c)
            .fetch(&LocalEndpoint::new(Arc::clone(&b)), &["app".to_string()])
            .await
            .unwrap();
        assert_eq!(fetch_stats.objects, push_stats.objects);

        let replica = c.load_manifest(manifest.key()).unwrap();
        assert_eq!(replica.root(), manifest.root());
        assert_eq!(c.db().list().unwrap(), a.db().list().unwrap());
    }

    #[tokio::test]
    async fn push_unknown_name_fails_locally() {
        let local = Hive::in_memory();
        let destination = Arc::new(Hive::in_memory());
        let remote = LocalEndpoint::new(Arc::clone(&destination));
        let err = PushEngine::new(&local)
            .push(&remote, &["ghost".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, hive_types::HiveError::ManifestNotFound { .. }));
    }

    #[tokio::test]
    async fn partial_push_reuses_remote_trees() {
        let local = Hive::in_memory();
        populate(&local, "app", b"v1 leaf");

        let destination = Arc::new(Hive::in_memory());
        let remote = LocalEndpoint::new(Arc::clone(&destination));
        let engine = PushEngine::new(&local);
        engine.push(&remote, &["app".to_string()]).await.unwrap();

        // A second manifest sharing the nested subtree.
        let v1 = local.load_manifest(&key("app", "1")).unwrap();
        let v1_tree = Tree::load(local.db(), v1.root()).unwrap();
        let shared_dir = v1_tree.get("dir", EntryKind::Tree).unwrap().id;

        let new_blob = local.db().import_bytes(b"v2 only").unwrap();
        let mut v2 = Tree::builder();
        v2.add("dir", EntryKind::Tree, shared_dir).unwrap();
        v2.add("new.txt", EntryKind::Blob, new_blob).unwrap();
        let v2_root = v2.build().store(local.db()).unwrap();
        local
            .insert_manifest(Manifest::builder(key("app", "2")).root(v2_root).build().unwrap())
            .unwrap();

        let stats = engine.push(&remote, &["app".to_string()]).await.unwrap();
        assert_eq!(stats.manifests, 1);
        assert!(stats.trees_reused >= 1);
        // Only the new root tree and the new blob move.
        assert_eq!(stats.objects, 2);
        assert!(destination.manifest(&key("app", "2")).unwrap().is_some());
    }
}
