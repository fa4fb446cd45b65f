use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use hive_types::{HiveError, HiveResult, IdHasher, ObjectId};

use crate::traits::ObjectDatabase;

/// Filesystem-backed object database.
///
/// Objects live under a two-level hex fan-out (`ab/cd/<64-hex>`) so no
/// single directory grows unboundedly. Writes stream through a temp file
/// in the same filesystem and land with an atomic rename; two writers of
/// identical bytes race harmlessly because the loser finds the target
/// already present.
pub struct FsObjectDb {
    root: PathBuf,
}

impl FsObjectDb {
    /// Open (creating if necessary) a database rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> HiveResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..4]).join(hex)
    }
}

impl ObjectDatabase for FsObjectDb {
    fn exists(&self, id: &ObjectId) -> HiveResult<bool> {
        Ok(self.object_path(id).exists())
    }

    fn import(&self, source: &mut dyn Read) -> HiveResult<ObjectId> {
        // Hash and copy in one pass into a temp file next to the final
        // location, then rename once the identity is known.
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        let mut hasher = IdHasher::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = source.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            tmp.write_all(&buf[..n])?;
        }
        let id = hasher.finalize();

        let path = self.object_path(&id);
        if path.exists() {
            // Deduplicated; the temp file is discarded on drop.
            return Ok(id);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        tmp.as_file().sync_all()?;
        match tmp.persist(&path) {
            Ok(_) => {
                debug!(id = %id.short_hex(), "object written");
                Ok(id)
            }
            // A concurrent writer of the same content won the rename.
            Err(_) if path.exists() => Ok(id),
            Err(e) => Err(HiveError::Io(e.error)),
        }
    }

    fn open_read(&self, id: &ObjectId) -> HiveResult<Box<dyn Read + Send>> {
        let path = self.object_path(id);
        match File::open(&path) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(HiveError::ObjectNotFound(*id))
            }
            Err(e) => Err(HiveError::Io(e)),
        }
    }

    fn delete(&self, id: &ObjectId) -> HiveResult<bool> {
        let path = self.object_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(HiveError::Io(e)),
        }
    }

    fn list(&self) -> HiveResult<Vec<ObjectId>> {
        let mut ids = Vec::new();
        for l1 in fs::read_dir(&self.root)? {
            let l1 = l1?;
            if !l1.file_type()?.is_dir() {
                continue;
            }
            for l2 in fs::read_dir(l1.path())? {
                let l2 = l2?;
                if !l2.file_type()?.is_dir() {
                    continue;
                }
                for entry in fs::read_dir(l2.path())? {
                    let entry = entry?;
                    let name = entry.file_name();
                    if let Some(name) = name.to_str() {
                        if let Ok(id) = ObjectId::from_hex(name) {
                            ids.push(id);
                        }
                    }
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl std::fmt::Debug for FsObjectDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsObjectDb").field("root", &self.root).finish()
    }
}
