use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;

use hive_archive::ArchiveWriter;
use hive_local::Hive;
use hive_store::ObjectDatabase;
use hive_types::{HiveResult, ManifestKey, ObjectId};

use crate::apply::apply_archive;
use crate::remote::{FetchSpec, RemoteHive};

/// [`RemoteHive`] served directly by an in-process [`Hive`].
///
/// This is the protocol's reference endpoint: tests run the full fetch
/// and push flows against it, and a network server is just this struct
/// behind an RPC layer.
pub struct LocalEndpoint {
    hive: Arc<Hive>,
}

impl LocalEndpoint {
    pub fn new(hive: Arc<Hive>) -> Self {
        Self { hive }
    }

    pub fn hive(&self) -> &Hive {
        &self.hive
    }
}

#[async_trait]
impl RemoteHive for LocalEndpoint {
    async fn manifests(&self, names: &[String]) -> HiveResult<BTreeMap<ManifestKey, ObjectId>> {
        self.hive.manifest_inventory(names)
    }

    async fn missing_objects(&self, ids: &[ObjectId]) -> HiveResult<BTreeSet<ObjectId>> {
        self.hive.missing_objects(ids)
    }

    async fn tree_objects(
        &self,
        trees: &[ObjectId],
        exclude: &[ObjectId],
    ) -> HiveResult<BTreeSet<ObjectId>> {
        let trees: BTreeSet<ObjectId> = trees.iter().copied().collect();
        let exclude: BTreeSet<ObjectId> = exclude.iter().copied().collect();
        self.hive.object_closure(&trees, &exclude)
    }

    async fn tree_trees(&self, root: &ObjectId) -> HiveResult<BTreeSet<ObjectId>> {
        self.hive.tree_closure(root)
    }

    async fn push(&self, archive: Vec<u8>) -> HiveResult<()> {
        // A push intentionally carries only deltas.
        apply_archive(&self.hive, archive, true)?;
        Ok(())
    }

    async fn fetch(&self, spec: &FetchSpec) -> HiveResult<Vec<u8>> {
        let mut writer = ArchiveWriter::with_level(self.hive.config().archive_level);
        for id in &spec.objects {
            writer.add_object(*id, self.hive.db().read_bytes(id)?);
        }
        for key in &spec.manifests {
            writer.add_manifest(self.hive.load_manifest(key)?);
        }
        writer.finish()
    }

    async fn remove_manifest(&self, key: &ManifestKey) -> HiveResult<bool> {
        self.hive.remove_manifest(key)
    }

    async fn prune(&self) -> HiveResult<u64> {
        Ok(self.hive.prune()?.removed as u64)
    }
}
