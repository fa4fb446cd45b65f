use hive_store::Manifest;
use hive_types::{HiveResult, ManifestKey, ObjectId};

/// Keyed manifest storage.
///
/// A plain map from [`ManifestKey`] to [`Manifest`]. Implementations are
/// safe for concurrent use; serialization of conflicting writers happens
/// above this trait, in the transaction layer.
pub trait ManifestRegistry: Send + Sync {
    /// Look up a manifest by key. `Ok(None)` if absent.
    fn get(&self, key: &ManifestKey) -> HiveResult<Option<Manifest>>;

    /// Insert or replace a manifest unconditionally.
    fn insert(&self, manifest: &Manifest) -> HiveResult<()>;

    /// Remove a manifest. Returns `true` if it existed.
    fn remove(&self, key: &ManifestKey) -> HiveResult<bool>;

    /// Every manifest, sorted by key.
    fn list(&self) -> HiveResult<Vec<Manifest>>;

    /// Whether a key is present.
    fn contains(&self, key: &ManifestKey) -> HiveResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// All keys, sorted.
    fn keys(&self) -> HiveResult<Vec<ManifestKey>> {
        Ok(self.list()?.into_iter().map(|m| m.key().clone()).collect())
    }

    /// All tags recorded under a name, sorted.
    fn tags_of(&self, name: &str) -> HiveResult<Vec<String>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|m| m.key().name() == name)
            .map(|m| m.key().tag().to_string())
            .collect())
    }

    /// Key -> root-tree identity for every manifest, sorted by key.
    fn inventory(&self) -> HiveResult<Vec<(ManifestKey, ObjectId)>> {
        Ok(self
            .list()?
            .into_iter()
            .map(|m| (m.key().clone(), *m.root()))
            .collect())
    }
}
