//! Meta-manifest streams: versioned key/value attachments for manifests.
//!
//! A [`MetaStream`] hangs typed metadata off a parent manifest without
//! ever mutating it. Each write creates a fresh generation -- a manifest
//! whose name is derived from the parent's key and whose tag is a
//! strictly increasing integer -- and prunes everything but the newest
//! few generations. Classes multiplex into one manifest per parent, one
//! blob entry per class, so writing one class carries the others
//! forward.
//!
//! Reads resolve the highest generation. A concurrent writer may prune
//! that generation between discovery and load; reads absorb the race
//! with a small bounded retry before surfacing a failure.

use std::marker::PhantomData;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use hive_local::Hive;
use hive_registry::ManifestRegistry;
use hive_store::{Manifest, ObjectDatabase, Tree};
use hive_types::{EntryKind, HiveError, HiveResult, ManifestKey};

/// Attempts before a racing read gives up.
const READ_ATTEMPTS: u32 = 3;
/// Pause between read attempts.
const RETRY_PAUSE: Duration = Duration::from_millis(5);

/// Typed, versioned metadata stream bound to a parent manifest key and a
/// metadata class.
pub struct MetaStream<T> {
    parent: ManifestKey,
    class: String,
    retention: Option<usize>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> MetaStream<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(parent: ManifestKey, class: impl Into<String>) -> Self {
        Self {
            parent,
            class: class.into(),
            retention: None,
            _marker: PhantomData,
        }
    }

    /// Override the hive-configured generation retention.
    pub fn with_retention(mut self, generations: usize) -> Self {
        self.retention = Some(generations);
        self
    }

    /// The derived manifest name all generations share.
    pub fn meta_name(&self) -> String {
        format!("{}.{}.meta", self.parent.name(), self.parent.tag())
    }

    /// Latest value of this class, or `None` if never written (or
    /// deleted). Retries a bounded number of times when a concurrent
    /// writer prunes the generation mid-read.
    pub fn read(&self, hive: &Hive) -> HiveResult<Option<T>> {
        for attempt in 0..READ_ATTEMPTS {
            let Some((_, key)) = self.generations(hive)?.pop() else {
                return Ok(None);
            };
            match self.read_generation(hive, &key) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_not_found() => {
                    debug!(key = %key, attempt, "generation vanished mid-read, retrying");
                    std::thread::sleep(RETRY_PAUSE);
                }
                Err(e) => return Err(e),
            }
        }
        Err(HiveError::GenerationNotFound {
            name: self.meta_name(),
            attempts: READ_ATTEMPTS,
        })
    }

    /// Write a new generation carrying `value` for this class (or
    /// deleting the class when `None`), then prune old generations.
    pub fn write(&self, hive: &Hive, value: Option<&T>) -> HiveResult<()> {
        let lock = hive.locks().handle(&format!("meta:{}", self.meta_name()));
        let _guard = lock.lock().expect("meta lock poisoned");

        let generations = self.generations(hive)?;
        let next = generations.last().map(|(g, _)| g + 1).unwrap_or(1);

        // Carry the other classes forward from the newest generation.
        let mut builder = Tree::builder();
        if let Some((_, newest)) = generations.last() {
            if let Some(previous) = hive.manifest(newest)? {
                let tree = Tree::load(hive.db(), previous.root())?;
                for entry in tree.entries() {
                    if entry.kind == EntryKind::Blob && entry.name != self.class {
                        builder.add(entry.name.clone(), EntryKind::Blob, entry.id)?;
                    }
                }
            }
        }
        if let Some(value) = value {
            let data = serde_json::to_vec(value)
                .map_err(|e| HiveError::Serialization(e.to_string()))?;
            let blob = hive.db().import_bytes(&data)?;
            builder.add(self.class.clone(), EntryKind::Blob, blob)?;
        }

        let root = builder.build().store(hive.db())?;
        let key = ManifestKey::new(self.meta_name(), next.to_string())?;
        let manifest = Manifest::builder(key.clone()).root(root).build()?;
        hive.insert_manifest(manifest)?;
        debug!(key = %key, class = %self.class, "meta generation written");

        self.prune(hive)?;
        Ok(())
    }

    fn read_generation(&self, hive: &Hive, key: &ManifestKey) -> HiveResult<Option<T>> {
        let manifest = hive.load_manifest(key)?;
        let tree = Tree::load(hive.db(), manifest.root())?;
        let Some(entry) = tree.get(&self.class, EntryKind::Blob) else {
            return Ok(None);
        };
        let data = hive.db().read_bytes(&entry.id)?;
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| HiveError::Damaged {
                id: entry.id,
                reason: format!("meta payload does not parse: {e}"),
            })
    }

    /// Generations of this stream, ascending by number.
    fn generations(&self, hive: &Hive) -> HiveResult<Vec<(u64, ManifestKey)>> {
        let name = self.meta_name();
        let mut generations = Vec::new();
        for tag in hive.registry().tags_of(&name)? {
            match tag.parse::<u64>() {
                Ok(generation) => {
                    generations.push((generation, ManifestKey::new(name.clone(), tag)?));
                }
                Err(_) => {
                    warn!(name = %name, tag = %tag, "ignoring non-numeric meta generation tag");
                }
            }
        }
        generations.sort_by_key(|(generation, _)| *generation);
        Ok(generations)
    }

    fn prune(&self, hive: &Hive) -> HiveResult<()> {
        let retention = self
            .retention
            .unwrap_or_else(|| hive.config().meta_retention);
        let generations = self.generations(hive)?;
        if generations.len() <= retention {
            return Ok(());
        }
        let cutoff = generations.len() - retention;
        for (generation, key) in &generations[..cutoff] {
            hive.remove_manifest(key)?;
            debug!(key = %key, generation, "meta generation pruned");
        }
        Ok(())
    }
}

impl<T> std::fmt::Debug for MetaStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaStream")
            .field("parent", &self.parent)
            .field("class", &self.class)
            .finish()
    }
}
