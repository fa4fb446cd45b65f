use tracing::debug;

use hive_store::Manifest;
use hive_types::{HiveError, HiveResult, ObjectId};

use crate::{encode_varint, MAGIC, VERSION};

/// Builds an archive from objects and manifests.
pub struct ArchiveWriter {
    entries: Vec<(ObjectId, Vec<u8>)>,
    manifests: Vec<Manifest>,
    level: i32,
}

impl ArchiveWriter {
    /// Create a writer with the default compression level.
    pub fn new() -> Self {
        Self::with_level(3)
    }

    /// Create a writer with an explicit zstd level.
    pub fn with_level(level: i32) -> Self {
        Self {
            entries: Vec::new(),
            manifests: Vec::new(),
            level,
        }
    }

    /// Queue an object. The caller vouches that `id` is the content
    /// identity of `data`; readers re-verify on extraction.
    pub fn add_object(&mut self, id: ObjectId, data: Vec<u8>) {
        self.entries.push((id, data));
    }

    /// Queue a manifest for the archive's manifest table.
    pub fn add_manifest(&mut self, manifest: Manifest) {
        self.manifests.push(manifest);
    }

    pub fn object_count(&self) -> usize {
        self.entries.len()
    }

    pub fn manifest_count(&self) -> usize {
        self.manifests.len()
    }

    /// Serialize the archive.
    pub fn finish(self) -> HiveResult<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_be_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());

        for (id, data) in &self.entries {
            let compressed = zstd::encode_all(data.as_slice(), self.level)
                .map_err(|e| HiveError::Serialization(format!("zstd encode: {e}")))?;
            out.extend_from_slice(id.as_bytes());
            encode_varint(&mut out, data.len() as u64);
            encode_varint(&mut out, compressed.len() as u64);
            out.extend_from_slice(&crc32fast::hash(&compressed).to_be_bytes());
            out.extend_from_slice(&compressed);
        }

        out.extend_from_slice(&(self.manifests.len() as u32).to_be_bytes());
        let table = bincode::serialize(&self.manifests)
            .map_err(|e| HiveError::Serialization(format!("manifest table: {e}")))?;
        encode_varint(&mut out, table.len() as u64);
        out.extend_from_slice(&table);

        let checksum = blake3::hash(&out);
        out.extend_from_slice(checksum.as_bytes());
        debug!(
            objects = self.entries.len(),
            manifests = self.manifests.len(),
            bytes = out.len(),
            "archive packaged"
        );
        Ok(out)
    }
}

impl Default for ArchiveWriter {
    fn default() -> Self {
        Self::new()
    }
}
