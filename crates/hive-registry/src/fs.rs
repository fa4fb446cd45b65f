use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use hive_store::Manifest;
use hive_types::{HiveError, HiveResult, ManifestKey};

use crate::traits::ManifestRegistry;

/// Filesystem-backed manifest registry.
///
/// One JSON file per manifest. Filenames are the BLAKE3 hash of the
/// display key, which keeps arbitrary manifest names out of the
/// filesystem namespace; the key itself is recorded inside the file.
/// Writes go through a temp file and an atomic rename.
pub struct FsManifestRegistry {
    root: PathBuf,
}

impl FsManifestRegistry {
    /// Open (creating if necessary) a registry rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> HiveResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn manifest_path(&self, key: &ManifestKey) -> PathBuf {
        let digest = blake3::hash(key.to_string().as_bytes());
        self.root.join(format!("{}.json", hex::encode(digest.as_bytes())))
    }
}

impl ManifestRegistry for FsManifestRegistry {
    fn get(&self, key: &ManifestKey) -> HiveResult<Option<Manifest>> {
        let path = self.manifest_path(key);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(HiveError::Io(e)),
        };
        Ok(Some(Manifest::decode(&data)?))
    }

    fn insert(&self, manifest: &Manifest) -> HiveResult<()> {
        let path = self.manifest_path(manifest.key());
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&manifest.encode()?)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| HiveError::Io(e.error))?;
        debug!(key = %manifest.key(), "manifest written");
        Ok(())
    }

    fn remove(&self, key: &ManifestKey) -> HiveResult<bool> {
        match fs::remove_file(self.manifest_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(HiveError::Io(e)),
        }
    }

    fn list(&self) -> HiveResult<Vec<Manifest>> {
        let mut manifests = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let data = fs::read(&path)?;
            manifests.push(Manifest::decode(&data)?);
        }
        manifests.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(manifests)
    }
}

impl std::fmt::Debug for FsManifestRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsManifestRegistry")
            .field("root", &self.root)
            .finish()
    }
}
