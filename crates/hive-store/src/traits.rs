use std::io::Read;

use hive_types::{HiveError, HiveResult, IdHasher, ObjectId};

/// Append-only, content-addressed object database.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written; the same bytes always map to the
///   same identity.
/// - [`import`](Self::import) hashes while copying, so the written bytes
///   and the returned identity are consistent by construction. No normal
///   operation re-hashes stored bytes; only the explicit
///   [`verify`](Self::verify) path does.
/// - Concurrent readers are always safe. Concurrent writers of identical
///   bytes converge on one stored object.
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectDatabase: Send + Sync {
    /// Check whether an object exists.
    fn exists(&self, id: &ObjectId) -> HiveResult<bool>;

    /// Import content from a stream, computing its identity in the same
    /// pass that copies the bytes into storage. Re-importing existing
    /// content is a safe no-op.
    fn import(&self, source: &mut dyn Read) -> HiveResult<ObjectId>;

    /// Open an object for reading. Fails with
    /// [`HiveError::ObjectNotFound`] if absent.
    fn open_read(&self, id: &ObjectId) -> HiveResult<Box<dyn Read + Send>>;

    /// Delete an object. Returns `true` if it existed. Intended for the
    /// prune path only; deleting a referenced object corrupts the store.
    fn delete(&self, id: &ObjectId) -> HiveResult<bool>;

    /// All object ids currently stored, sorted.
    fn list(&self) -> HiveResult<Vec<ObjectId>>;

    /// Import an in-memory byte slice.
    fn import_bytes(&self, data: &[u8]) -> HiveResult<ObjectId> {
        let mut cursor = data;
        self.import(&mut cursor)
    }

    /// Read an object fully into memory.
    fn read_bytes(&self, id: &ObjectId) -> HiveResult<Vec<u8>> {
        let mut reader = self.open_read(id)?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Subset of `ids` that are absent from this database.
    fn missing(&self, ids: &[ObjectId]) -> HiveResult<Vec<ObjectId>> {
        let mut absent = Vec::new();
        for id in ids {
            if !self.exists(id)? {
                absent.push(*id);
            }
        }
        Ok(absent)
    }

    /// Consistency check: re-hash the stored bytes and compare with the
    /// identity they are filed under. This is the one sanctioned place
    /// where a hash is computed from already-stored content.
    fn verify(&self, id: &ObjectId) -> HiveResult<()> {
        let mut reader = self.open_read(id)?;
        let mut hasher = IdHasher::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let computed = hasher.finalize();
        if computed != *id {
            return Err(HiveError::Damaged {
                id: *id,
                reason: format!("content hashes to {computed}"),
            });
        }
        Ok(())
    }
}
