//! Export: materialize a stored tree back onto the filesystem.

use std::fs::{self, File};
use std::path::Path;

use tracing::debug;

use hive_store::{ObjectDatabase, Tree};
use hive_types::{EntryKind, HiveResult, ObjectId};

/// Write the tree rooted at `root` into `dest`, creating directories as
/// needed. Blob entries become files, tree entries directories;
/// manifest-reference entries are pointers into the registry and produce
/// nothing on disk.
pub fn export_tree(
    db: &dyn ObjectDatabase,
    root: &ObjectId,
    dest: &Path,
) -> HiveResult<()> {
    fs::create_dir_all(dest)?;
    let tree = Tree::load(db, root)?;
    for entry in tree.entries() {
        let target = dest.join(&entry.name);
        match entry.kind {
            EntryKind::Blob => {
                let mut reader = db.open_read(&entry.id)?;
                let mut file = File::create(&target)?;
                std::io::copy(&mut reader, &mut file)?;
            }
            EntryKind::Tree => {
                export_tree(db, &entry.id, &target)?;
            }
            EntryKind::Manifest => {
                debug!(name = %entry.name, "manifest reference not exported");
            }
        }
    }
    Ok(())
}
