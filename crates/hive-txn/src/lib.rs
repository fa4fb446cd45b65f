//! Transactional write path for the hive.
//!
//! Objects and trees go straight into the append-only object database --
//! unreferenced content is invisible, so those writes need no
//! coordination. Manifests are what make content reachable, and manifest
//! inserts are what the [`Transaction`] guard buffers: nothing becomes
//! visible to readers until `commit()`, and a dropped or failed scope
//! publishes nothing. Write order is therefore always
//! content -> tree -> manifest.
//!
//! Conflicting writers are serialized by [`NamedLocks`], one lock per
//! manifest name. Readers never take these locks.

pub mod locks;
pub mod txn;

pub use locks::NamedLocks;
pub use txn::{Transaction, TxnState};
