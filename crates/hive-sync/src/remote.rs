use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use hive_types::{HiveResult, ManifestKey, ObjectId};

/// What one side asks the other to package: exactly these objects and
/// these manifests, nothing more.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSpec {
    pub objects: Vec<ObjectId>,
    pub manifests: Vec<ManifestKey>,
}

/// The verb set a store endpoint exposes to its peers.
///
/// Implementations wrap a transport (or, for [`LocalEndpoint`], nothing
/// at all). All calls are read-only except `push`, `remove_manifest`,
/// and `prune`.
///
/// [`LocalEndpoint`]: crate::LocalEndpoint
#[async_trait]
pub trait RemoteHive: Send + Sync {
    /// Key -> root identity for the named manifests; empty `names` means
    /// every manifest. An explicitly named manifest that is absent is a
    /// `ManifestNotFound` failure.
    async fn manifests(&self, names: &[String]) -> HiveResult<BTreeMap<ManifestKey, ObjectId>>;

    /// Subset of `ids` absent on this endpoint.
    async fn missing_objects(&self, ids: &[ObjectId]) -> HiveResult<BTreeSet<ObjectId>>;

    /// Objects required to materialize `trees`, pruned of anything
    /// reachable only through `exclude`.
    async fn tree_objects(
        &self,
        trees: &[ObjectId],
        exclude: &[ObjectId],
    ) -> HiveResult<BTreeSet<ObjectId>>;

    /// Transitive nested-tree closure of a root, manifest references
    /// included.
    async fn tree_trees(&self, root: &ObjectId) -> HiveResult<BTreeSet<ObjectId>>;

    /// Apply a packaged transfer (deltas allowed).
    async fn push(&self, archive: Vec<u8>) -> HiveResult<()>;

    /// Package exactly the requested objects and manifests.
    async fn fetch(&self, spec: &FetchSpec) -> HiveResult<Vec<u8>>;

    /// Maintenance: drop a manifest.
    async fn remove_manifest(&self, key: &ManifestKey) -> HiveResult<bool>;

    /// Maintenance: delete unreachable objects. Returns how many were
    /// removed.
    async fn prune(&self) -> HiveResult<u64>;
}
