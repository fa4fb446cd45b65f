use std::collections::BTreeMap;
use std::ops::Range;

use hive_store::Manifest;
use hive_types::{HiveError, HiveResult, ObjectId};

use crate::{decode_varint, MAGIC, VERSION};

#[derive(Debug)]
struct EntryIndex {
    raw_len: u64,
    crc: u32,
    compressed: Range<usize>,
}

/// Read-only view over a serialized archive: a miniature store.
///
/// `open` verifies the container checksum and builds an in-memory index;
/// object bytes are decompressed and identity-verified on demand.
#[derive(Debug)]
pub struct ArchiveReader {
    data: Vec<u8>,
    index: BTreeMap<ObjectId, EntryIndex>,
    manifests: Vec<Manifest>,
}

impl ArchiveReader {
    /// Parse and verify an archive.
    pub fn open(data: Vec<u8>) -> HiveResult<Self> {
        let corrupt = |reason: &str| HiveError::Serialization(format!("archive: {reason}"));

        if data.len() < MAGIC.len() + 8 + 32 {
            return Err(corrupt("truncated container"));
        }
        let (body, trailer) = data.split_at(data.len() - 32);
        if blake3::hash(body).as_bytes() != trailer {
            return Err(corrupt("container checksum mismatch"));
        }
        if &body[..4] != MAGIC {
            return Err(corrupt("bad magic"));
        }
        let version = u32::from_be_bytes(body[4..8].try_into().expect("4 bytes"));
        if version != VERSION {
            return Err(corrupt(&format!("unsupported version {version}")));
        }
        let object_count = u32::from_be_bytes(body[8..12].try_into().expect("4 bytes"));

        let mut pos = 12usize;
        let mut index = BTreeMap::new();
        for _ in 0..object_count {
            if body.len() < pos + 32 {
                return Err(corrupt("truncated entry header"));
            }
            let mut id_bytes = [0u8; 32];
            id_bytes.copy_from_slice(&body[pos..pos + 32]);
            let id = ObjectId::from_hash(id_bytes);
            pos += 32;

            let (raw_len, used) =
                decode_varint(&body[pos..]).ok_or_else(|| corrupt("bad raw length"))?;
            pos += used;
            let (comp_len, used) =
                decode_varint(&body[pos..]).ok_or_else(|| corrupt("bad compressed length"))?;
            pos += used;
            if body.len() < pos + 4 {
                return Err(corrupt("truncated entry crc"));
            }
            let crc = u32::from_be_bytes(body[pos..pos + 4].try_into().expect("4 bytes"));
            pos += 4;
            let comp_len = usize::try_from(comp_len).map_err(|_| corrupt("entry too large"))?;
            if body.len() < pos + comp_len {
                return Err(corrupt("truncated entry data"));
            }
            index.insert(
                id,
                EntryIndex {
                    raw_len,
                    crc,
                    compressed: pos..pos + comp_len,
                },
            );
            pos += comp_len;
        }

        if body.len() < pos + 4 {
            return Err(corrupt("truncated manifest count"));
        }
        let manifest_count = u32::from_be_bytes(body[pos..pos + 4].try_into().expect("4 bytes"));
        pos += 4;
        let (table_len, used) =
            decode_varint(&body[pos..]).ok_or_else(|| corrupt("bad manifest table length"))?;
        pos += used;
        let table_len = usize::try_from(table_len).map_err(|_| corrupt("table too large"))?;
        if body.len() < pos + table_len {
            return Err(corrupt("truncated manifest table"));
        }
        let manifests: Vec<Manifest> = bincode::deserialize(&body[pos..pos + table_len])
            .map_err(|e| corrupt(&format!("manifest table does not parse: {e}")))?;
        if manifests.len() != manifest_count as usize {
            return Err(corrupt("manifest count mismatch"));
        }

        Ok(Self {
            data,
            index,
            manifests,
        })
    }

    /// Identities of every object carried by the archive, sorted.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.index.keys().copied().collect()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.contains_key(id)
    }

    pub fn object_count(&self) -> usize {
        self.index.len()
    }

    /// The manifests carried by the archive.
    pub fn manifests(&self) -> &[Manifest] {
        &self.manifests
    }

    /// Total serialized size in bytes.
    pub fn byte_len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Extract one object, verifying the entry CRC and the content
    /// identity of the decompressed bytes.
    pub fn read_object(&self, id: &ObjectId) -> HiveResult<Vec<u8>> {
        let entry = self.index.get(id).ok_or(HiveError::ObjectNotFound(*id))?;
        let compressed = &self.data[entry.compressed.clone()];
        if crc32fast::hash(compressed) != entry.crc {
            return Err(HiveError::Damaged {
                id: *id,
                reason: "archive entry crc mismatch".into(),
            });
        }
        let raw = zstd::decode_all(compressed).map_err(|e| HiveError::Damaged {
            id: *id,
            reason: format!("zstd decode: {e}"),
        })?;
        if raw.len() as u64 != entry.raw_len {
            return Err(HiveError::Damaged {
                id: *id,
                reason: "decompressed length mismatch".into(),
            });
        }
        let computed = ObjectId::from_bytes(&raw);
        if computed != *id {
            return Err(HiveError::Damaged {
                id: *id,
                reason: format!("content hashes to {computed}"),
            });
        }
        Ok(raw)
    }
}
