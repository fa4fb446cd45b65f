use std::collections::BTreeMap;
use std::sync::RwLock;

use hive_store::Manifest;
use hive_types::{HiveResult, ManifestKey};

use crate::traits::ManifestRegistry;

/// In-memory manifest registry for tests and ephemeral stores.
#[derive(Debug, Default)]
pub struct MemoryManifestRegistry {
    manifests: RwLock<BTreeMap<ManifestKey, Manifest>>,
}

impl MemoryManifestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.manifests.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.read().expect("lock poisoned").is_empty()
    }
}

impl ManifestRegistry for MemoryManifestRegistry {
    fn get(&self, key: &ManifestKey) -> HiveResult<Option<Manifest>> {
        Ok(self.manifests.read().expect("lock poisoned").get(key).cloned())
    }

    fn insert(&self, manifest: &Manifest) -> HiveResult<()> {
        self.manifests
            .write()
            .expect("lock poisoned")
            .insert(manifest.key().clone(), manifest.clone());
        Ok(())
    }

    fn remove(&self, key: &ManifestKey) -> HiveResult<bool> {
        Ok(self
            .manifests
            .write()
            .expect("lock poisoned")
            .remove(key)
            .is_some())
    }

    fn list(&self) -> HiveResult<Vec<Manifest>> {
        Ok(self
            .manifests
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect())
    }
}
