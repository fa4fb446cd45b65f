//! Dependency ordering over the manifest reference graph.
//!
//! Manifests reference other manifests through tree entries of kind
//! `Manifest`. Those references form a directed graph that must stay
//! acyclic: [`order_manifests`] sorts a set so every manifest appears
//! after the manifests it depends on, and fails hard on a cycle instead
//! of silently truncating.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use hive_types::{EntryKind, HiveError, HiveResult, ManifestKey, ObjectId};

use crate::manifest::{Manifest, ManifestRef};
use crate::traits::ObjectDatabase;
use crate::tree::Tree;

/// Keys of every manifest directly referenced from the tree rooted at
/// `root`, discovered by walking nested trees (manifest references are
/// collected, not followed).
pub fn referenced_keys(
    db: &dyn ObjectDatabase,
    root: &ObjectId,
) -> HiveResult<BTreeSet<ManifestKey>> {
    let mut keys = BTreeSet::new();
    let mut seen: HashSet<ObjectId> = HashSet::new();
    let mut queue: VecDeque<ObjectId> = VecDeque::new();
    seen.insert(*root);
    queue.push_back(*root);

    while let Some(tree_id) = queue.pop_front() {
        let tree = Tree::load(db, &tree_id)?;
        for entry in tree.entries() {
            match entry.kind {
                EntryKind::Blob => {}
                EntryKind::Tree => {
                    if seen.insert(entry.id) {
                        queue.push_back(entry.id);
                    }
                }
                EntryKind::Manifest => {
                    let reference = ManifestRef::load(db, &entry.id)?;
                    keys.insert(reference.key().clone());
                }
            }
        }
    }
    Ok(keys)
}

/// Sort `manifests` so dependencies come before dependents.
///
/// Edges are discovered by walking each manifest's tree closure; only
/// references to manifests *within the given set* order the result.
/// A reference cycle is an [`HiveError::CycleDetected`] integrity
/// failure.
pub fn order_manifests(
    db: &dyn ObjectDatabase,
    manifests: Vec<Manifest>,
) -> HiveResult<Vec<Manifest>> {
    let by_key: BTreeMap<ManifestKey, Manifest> = manifests
        .into_iter()
        .map(|m| (m.key().clone(), m))
        .collect();

    // dependents[k] = keys whose manifests reference k.
    let mut dependents: BTreeMap<ManifestKey, Vec<ManifestKey>> = BTreeMap::new();
    let mut in_degree: BTreeMap<ManifestKey, usize> = BTreeMap::new();
    for key in by_key.keys() {
        in_degree.insert(key.clone(), 0);
    }
    for (key, manifest) in &by_key {
        for referenced in referenced_keys(db, manifest.root())? {
            if referenced == *key || !by_key.contains_key(&referenced) {
                continue;
            }
            dependents
                .entry(referenced.clone())
                .or_default()
                .push(key.clone());
            *in_degree.get_mut(key).expect("key present") += 1;
        }
    }

    // Kahn's algorithm; BTreeMap iteration keeps the output deterministic.
    let mut queue: VecDeque<ManifestKey> = in_degree
        .iter()
        .filter(|&(_, deg)| *deg == 0)
        .map(|(k, _)| k.clone())
        .collect();
    let mut ordered = Vec::with_capacity(by_key.len());

    while let Some(key) = queue.pop_front() {
        if let Some(children) = dependents.get(&key) {
            for child in children.clone() {
                let deg = in_degree.get_mut(&child).expect("child present");
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(child);
                }
            }
        }
        ordered.push(by_key[&key].clone());
    }

    if ordered.len() != by_key.len() {
        // Anything still carrying in-degree sits on a cycle.
        let stuck = in_degree
            .iter()
            .find(|&(_, deg)| *deg > 0)
            .map(|(k, _)| k.clone())
            .expect("cycle implies a positive in-degree");
        return Err(HiveError::CycleDetected(stuck));
    }
    Ok(ordered)
}
