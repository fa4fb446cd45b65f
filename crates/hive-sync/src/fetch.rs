use std::collections::BTreeSet;
use std::time::Instant;

use tracing::{debug, info};

use hive_local::Hive;
use hive_store::ObjectDatabase;
use hive_types::{HiveResult, ManifestKey, ObjectId};

use crate::apply::apply_archive;
use crate::remote::{FetchSpec, RemoteHive};
use crate::stats::TransferStats;

/// Pulls manifests from a remote hive, transferring only what the local
/// store lacks.
pub struct FetchEngine<'a> {
    local: &'a Hive,
}

impl<'a> FetchEngine<'a> {
    pub fn new(local: &'a Hive) -> Self {
        Self { local }
    }

    /// Fetch the named manifests (all their tags), or the remote's whole
    /// manifest set when `names` is empty.
    ///
    /// Steps 1–6 only query; nothing is transferred or written until the
    /// final archive request, and applying that archive is one
    /// transaction with `partial_allowed = false`.
    pub async fn fetch(
        &self,
        remote: &dyn RemoteHive,
        names: &[String],
    ) -> HiveResult<TransferStats> {
        let started = Instant::now();

        // 1. Remote inventory; an explicitly named absent manifest fails
        //    on the remote side before anything else happens.
        let inventory = remote.manifests(names).await?;

        // 2. Manifests already present locally are not re-fetched.
        let mut wanted: Vec<(ManifestKey, ObjectId)> = Vec::new();
        for (key, root) in inventory {
            if self.local.manifest(&key)?.is_none() {
                wanted.push((key, root));
            } else {
                debug!(key = %key, "already present, skipping");
            }
        }
        if wanted.is_empty() {
            return Ok(TransferStats {
                duration: started.elapsed(),
                ..TransferStats::default()
            });
        }

        // 3. Transitive tree requirement, computed remotely.
        let mut required_trees: BTreeSet<ObjectId> = BTreeSet::new();
        for (_, root) in &wanted {
            required_trees.extend(remote.tree_trees(root).await?);
        }

        // 4. Subtract the trees this store already has.
        let mut missing_trees: BTreeSet<ObjectId> = BTreeSet::new();
        let mut present_trees: BTreeSet<ObjectId> = BTreeSet::new();
        for id in required_trees {
            if self.local.db().exists(&id)? {
                present_trees.insert(id);
            } else {
                missing_trees.insert(id);
            }
        }

        // 5. Objects needed for the missing trees; content under a
        //    locally-present tree is assumed locally present.
        let trees_vec: Vec<ObjectId> = missing_trees.iter().copied().collect();
        let exclude_vec: Vec<ObjectId> = present_trees.iter().copied().collect();
        let candidate_objects = remote.tree_objects(&trees_vec, &exclude_vec).await?;

        // 6. Subtract the objects this store already has.
        let mut transfer: BTreeSet<ObjectId> = missing_trees;
        for id in candidate_objects {
            if !self.local.db().exists(&id)? {
                transfer.insert(id);
            }
        }

        // 7. One packaged transfer, applied transactionally. A fetch
        //    result must be self-contained.
        let spec = FetchSpec {
            objects: transfer.iter().copied().collect(),
            manifests: wanted.iter().map(|(key, _)| key.clone()).collect(),
        };
        let archive = remote.fetch(&spec).await?;
        let bytes = archive.len() as u64;
        apply_archive(self.local, archive, false)?;

        // 8. Accounting.
        let stats = TransferStats {
            manifests: wanted.len(),
            trees_reused: present_trees.len(),
            objects: spec.objects.len(),
            bytes,
            duration: started.elapsed(),
        };
        info!(%stats, "fetch complete");
        Ok(stats)
    }
}
