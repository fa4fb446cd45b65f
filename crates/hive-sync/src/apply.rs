//! Applying a received archive to a local hive.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use hive_archive::ArchiveReader;
use hive_local::Hive;
use hive_store::{ObjectDatabase, Tree};
use hive_types::{EntryKind, HiveError, HiveResult, ManifestKey, ObjectId};

/// What an application pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Objects actually imported (already-present objects are skipped).
    pub objects_imported: usize,
    /// Keys of manifests that were new to this hive.
    pub new_manifests: Vec<ManifestKey>,
}

/// Merge an archive into `hive` through the normal import path.
///
/// With `partial_allowed = false` the archive must be self-contained:
/// every tree and object reachable from its manifests has to resolve
/// from the archive or from content already present locally, checked
/// *before* anything is written. Manifest inserts run in one
/// transaction, so a failure applying them publishes nothing.
pub fn apply_archive(
    hive: &Hive,
    archive: Vec<u8>,
    partial_allowed: bool,
) -> HiveResult<ApplyOutcome> {
    let reader = ArchiveReader::open(archive)?;

    if !partial_allowed {
        let missing = count_unresolvable(hive, &reader)?;
        if missing > 0 {
            return Err(HiveError::TransferIncomplete { missing });
        }
    }

    // Content first. Identity verification happens inside read_object.
    let mut imported = 0usize;
    for id in reader.object_ids() {
        if hive.db().exists(&id)? {
            continue;
        }
        let data = reader.read_object(&id)?;
        hive.db().import_bytes(&data)?;
        imported += 1;
    }

    // Manifests last, in one transaction; ordering, cycle rejection, and
    // the first-writer-wins conflict policy all live in commit.
    let mut txn = hive.begin();
    for manifest in reader.manifests() {
        txn.stage_manifest(manifest.clone())?;
    }
    let new_manifests = txn.commit()?;

    debug!(
        objects = imported,
        manifests = new_manifests.len(),
        "archive applied"
    );
    Ok(ApplyOutcome {
        objects_imported: imported,
        new_manifests,
    })
}

/// Walk every manifest the archive carries and count references that
/// resolve neither from the archive nor from the local store.
fn count_unresolvable(hive: &Hive, reader: &ArchiveReader) -> HiveResult<usize> {
    let mut missing = 0usize;
    let mut visited: HashSet<ObjectId> = HashSet::new();
    let mut queue: VecDeque<ObjectId> = VecDeque::new();

    for manifest in reader.manifests() {
        if visited.insert(*manifest.root()) {
            queue.push_back(*manifest.root());
        }
    }

    while let Some(tree_id) = queue.pop_front() {
        let Some(data) = read_either(hive, reader, &tree_id)? else {
            missing += 1;
            continue;
        };
        let tree = Tree::decode(&tree_id, &data)?;
        for entry in tree.entries() {
            match entry.kind {
                EntryKind::Tree => {
                    if visited.insert(entry.id) {
                        queue.push_back(entry.id);
                    }
                }
                EntryKind::Blob | EntryKind::Manifest => {
                    if !reader.contains(&entry.id) && !hive.db().exists(&entry.id)? {
                        missing += 1;
                    }
                }
            }
        }
    }
    Ok(missing)
}

fn read_either(
    hive: &Hive,
    reader: &ArchiveReader,
    id: &ObjectId,
) -> HiveResult<Option<Vec<u8>>> {
    if reader.contains(id) {
        return reader.read_object(id).map(Some);
    }
    if hive.db().exists(id)? {
        return hive.db().read_bytes(id).map(Some);
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_archive::ArchiveWriter;
    use hive_store::Manifest;

    fn key(name: &str) -> ManifestKey {
        ManifestKey::new(name, "1").unwrap()
    }

    /// Archive carrying one manifest with a one-blob tree.
    fn complete_archive() -> Vec<u8> {
        let scratch = Hive::in_memory();
        let blob = scratch.db().import_bytes(b"payload").unwrap();
        let mut builder = Tree::builder();
        builder.add("data", EntryKind::Blob, blob).unwrap();
        let tree = builder.build();
        let root = tree.store(scratch.db()).unwrap();

        let mut writer = ArchiveWriter::new();
        writer.add_object(blob, b"payload".to_vec());
        writer.add_object(root, tree.encode().unwrap());
        writer.add_manifest(Manifest::builder(key("app")).root(root).build().unwrap());
        writer.finish().unwrap()
    }

    #[test]
    fn complete_archive_applies() {
        let hive = Hive::in_memory();
        let outcome = apply_archive(&hive, complete_archive(), false).unwrap();
        assert_eq!(outcome.objects_imported, 2);
        assert_eq!(outcome.new_manifests, vec![key("app")]);
        assert!(hive.manifest(&key("app")).unwrap().is_some());
    }

    #[test]
    fn reapply_is_idempotent() {
        let hive = Hive::in_memory();
        apply_archive(&hive, complete_archive(), false).unwrap();
        let outcome = apply_archive(&hive, complete_archive(), false).unwrap();
        assert_eq!(outcome.objects_imported, 0);
        assert!(outcome.new_manifests.is_empty());
    }

    #[test]
    fn incomplete_archive_is_rejected_before_any_write() {
        let scratch = Hive::in_memory();
        let blob = scratch.db().import_bytes(b"payload").unwrap();
        let mut builder = Tree::builder();
        builder.add("data", EntryKind::Blob, blob).unwrap();
        let tree = builder.build();
        let root = tree.store(scratch.db()).unwrap();

        // Tree and manifest, but the blob is left out.
        let mut writer = ArchiveWriter::new();
        writer.add_object(root, tree.encode().unwrap());
        writer.add_manifest(Manifest::builder(key("app")).root(root).build().unwrap());
        let archive = writer.finish().unwrap();

        let hive = Hive::in_memory();
        let err = apply_archive(&hive, archive, false).unwrap_err();
        assert!(matches!(err, HiveError::TransferIncomplete { missing: 1 }));
        // Nothing landed.
        assert!(hive.db().list().unwrap().is_empty());
        assert!(hive.list_manifests().unwrap().is_empty());
    }

    #[test]
    fn partial_archive_is_accepted_when_allowed_and_content_is_local() {
        let hive = Hive::in_memory();
        // The blob is already present locally; the delta only carries
        // the tree and the manifest.
        let blob = hive.db().import_bytes(b"payload").unwrap();
        let mut builder = Tree::builder();
        builder.add("data", EntryKind::Blob, blob).unwrap();
        let tree = builder.build();
        let root = tree.store(hive.db()).unwrap();

        let mut writer = ArchiveWriter::new();
        writer.add_object(root, tree.encode().unwrap());
        writer.add_manifest(Manifest::builder(key("app")).root(root).build().unwrap());

        let outcome = apply_archive(&hive, writer.finish().unwrap(), true).unwrap();
        assert_eq!(outcome.new_manifests, vec![key("app")]);
    }

    #[test]
    fn self_containment_accepts_locally_present_content() {
        let hive = Hive::in_memory();
        let blob = hive.db().import_bytes(b"already here").unwrap();
        let mut builder = Tree::builder();
        builder.add("data", EntryKind::Blob, blob).unwrap();
        let tree = builder.build();
        let root = tree.store(hive.db()).unwrap();

        // Non-partial archive whose blob resolves locally: acceptable.
        let mut writer = ArchiveWriter::new();
        writer.add_object(root, tree.encode().unwrap());
        writer.add_manifest(Manifest::builder(key("app")).root(root).build().unwrap());
        apply_archive(&hive, writer.finish().unwrap(), false).unwrap();
    }
}
