use std::io::Read;

use tracing::{debug, warn};

use hive_notify::SpawnNotifier;
use hive_registry::ManifestRegistry;
use hive_store::{order_manifests, Manifest, ObjectDatabase, Tree};
use hive_types::{HiveError, HiveResult, ManifestKey, ObjectId};

use crate::locks::NamedLocks;

/// Lifecycle of a transaction scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnState {
    Open,
    Committed,
    RolledBack,
}

/// A scoped batch of mutating operations.
///
/// Content writes (`import_object`, `store_tree`) pass straight through
/// to the append-only object database: until a manifest points at them
/// they are unreachable, so a crashed or rolled-back scope leaves only
/// harmless orphans for the prune pass. Manifest inserts are *staged* and
/// applied at `commit()` under per-name locks, dependencies first.
///
/// Every code path closes the scope exactly once: `commit()` and
/// `rollback()` consume the guard, and dropping an open transaction rolls
/// it back.
pub struct Transaction<'a> {
    db: &'a dyn ObjectDatabase,
    registry: &'a dyn ManifestRegistry,
    locks: &'a NamedLocks,
    notifier: Option<&'a SpawnNotifier>,
    staged: Vec<Manifest>,
    state: TxnState,
}

impl<'a> Transaction<'a> {
    pub fn new(
        db: &'a dyn ObjectDatabase,
        registry: &'a dyn ManifestRegistry,
        locks: &'a NamedLocks,
        notifier: Option<&'a SpawnNotifier>,
    ) -> Self {
        Self {
            db,
            registry,
            locks,
            notifier,
            staged: Vec::new(),
            state: TxnState::Open,
        }
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Import content into the object database (write order: content
    /// first).
    pub fn import_object(&self, source: &mut dyn Read) -> HiveResult<ObjectId> {
        self.db.import(source)
    }

    /// Import an in-memory byte slice.
    pub fn import_object_bytes(&self, data: &[u8]) -> HiveResult<ObjectId> {
        self.db.import_bytes(data)
    }

    /// Store a tree (write order: trees after their content).
    pub fn store_tree(&self, tree: &Tree) -> HiveResult<ObjectId> {
        tree.store(self.db)
    }

    /// Stage a manifest for insertion at commit.
    ///
    /// Staging the same key twice with the same root is a no-op; with a
    /// different root it is a conflict, mirroring the commit-time policy.
    pub fn stage_manifest(&mut self, manifest: Manifest) -> HiveResult<()> {
        if let Some(prior) = self.staged.iter().find(|m| m.key() == manifest.key()) {
            if prior.root() == manifest.root() {
                return Ok(());
            }
            return Err(HiveError::ManifestExists {
                key: manifest.key().clone(),
                existing: *prior.root(),
                offered: *manifest.root(),
            });
        }
        self.staged.push(manifest);
        Ok(())
    }

    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    /// Apply the staged manifests and close the scope.
    ///
    /// Returns the keys that were genuinely new. Idempotent re-inserts
    /// (same key, same root) are skipped; a key that exists with
    /// different content fails the whole commit, and manifests already
    /// applied by this commit are removed again so the batch is
    /// all-or-nothing.
    pub fn commit(mut self) -> HiveResult<Vec<ManifestKey>> {
        let staged = std::mem::take(&mut self.staged);

        // Dependencies first; this also walks every staged tree, so a
        // missing root or nested tree surfaces here, before anything is
        // applied, and a reference cycle is rejected outright.
        let ordered = match order_manifests(self.db, staged) {
            Ok(ordered) => ordered,
            Err(e) => {
                self.state = TxnState::RolledBack;
                return Err(e);
            }
        };

        let mut new_keys: Vec<ManifestKey> = Vec::new();
        for manifest in &ordered {
            let key = manifest.key().clone();
            let lock = self.locks.handle(key.name());
            let _guard = lock.lock().expect("named lock poisoned");

            let outcome = match self.registry.get(&key) {
                Ok(None) => self.registry.insert(manifest).map(|()| {
                    debug!(key = %key, root = %manifest.root().short_hex(), "manifest inserted");
                    new_keys.push(key.clone());
                }),
                Ok(Some(existing)) if existing.root() == manifest.root() => {
                    debug!(key = %key, "manifest already present; insert is a no-op");
                    Ok(())
                }
                Ok(Some(existing)) => Err(HiveError::ManifestExists {
                    key: key.clone(),
                    existing: *existing.root(),
                    offered: *manifest.root(),
                }),
                Err(e) => Err(e),
            };

            if let Err(e) = outcome {
                drop(_guard);
                self.undo(&new_keys);
                self.state = TxnState::RolledBack;
                return Err(e);
            }
        }

        self.state = TxnState::Committed;
        if let Some(notifier) = self.notifier {
            notifier.publish(new_keys.clone());
        }
        Ok(new_keys)
    }

    /// Discard the staged writes and close the scope.
    pub fn rollback(mut self) {
        self.staged.clear();
        self.state = TxnState::RolledBack;
        debug!("transaction rolled back");
    }

    /// Remove manifests this commit already applied. A removal that fails
    /// here leaves the registry inconsistent with the caller's view and
    /// can only be repaired by a consistency-check pass.
    fn undo(&self, applied: &[ManifestKey]) {
        for key in applied {
            let lock = self.locks.handle(key.name());
            let _guard = lock.lock().expect("named lock poisoned");
            if let Err(e) = self.registry.remove(key) {
                warn!(key = %key, error = %e, "rollback could not remove manifest; consistency check required");
            }
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state == TxnState::Open {
            self.staged.clear();
            self.state = TxnState::RolledBack;
            debug!("open transaction dropped; rolled back");
        }
    }
}
