use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::{Arc, RwLock};

use hive_types::{HiveError, HiveResult, IdHasher, ObjectId};

use crate::traits::ObjectDatabase;

/// In-memory, HashMap-based object database.
///
/// Intended for tests and embedding. Content is held behind a `RwLock`;
/// readers get a cheap `Arc` clone of the stored bytes.
pub struct MemoryObjectDb {
    objects: RwLock<HashMap<ObjectId, Arc<Vec<u8>>>>,
}

impl MemoryObjectDb {
    /// Create a new empty database.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|data| data.len() as u64)
            .sum()
    }
}

impl Default for MemoryObjectDb {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectDatabase for MemoryObjectDb {
    fn exists(&self, id: &ObjectId) -> HiveResult<bool> {
        Ok(self.objects.read().expect("lock poisoned").contains_key(id))
    }

    fn import(&self, source: &mut dyn Read) -> HiveResult<ObjectId> {
        let mut data = Vec::new();
        let mut hasher = IdHasher::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = source.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            data.extend_from_slice(&buf[..n]);
        }
        let id = hasher.finalize();
        let mut map = self.objects.write().expect("lock poisoned");
        // Content addressing: if present, the stored bytes are the same.
        map.entry(id).or_insert_with(|| Arc::new(data));
        Ok(id)
    }

    fn open_read(&self, id: &ObjectId) -> HiveResult<Box<dyn Read + Send>> {
        let map = self.objects.read().expect("lock poisoned");
        let data = map.get(id).ok_or(HiveError::ObjectNotFound(*id))?;
        Ok(Box::new(Cursor::new(data.as_ref().clone())))
    }

    fn delete(&self, id: &ObjectId) -> HiveResult<bool> {
        Ok(self
            .objects
            .write()
            .expect("lock poisoned")
            .remove(id)
            .is_some())
    }

    fn list(&self) -> HiveResult<Vec<ObjectId>> {
        let map = self.objects.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = map.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}

impl std::fmt::Debug for MemoryObjectDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryObjectDb")
            .field("object_count", &self.len())
            .finish()
    }
}
