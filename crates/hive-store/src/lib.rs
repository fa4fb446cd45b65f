//! Content-addressed object storage and the hive's immutable data model.
//!
//! Every piece of content in a hive -- file bytes, serialized trees,
//! manifest reference blobs -- is stored as an immutable object identified
//! by the BLAKE3 hash of its bytes. On top of the raw store sit the two
//! model types:
//!
//! - [`Tree`] -- an immutable, sorted mapping from `(name, kind)` to
//!   object identities, one directory level deep
//! - [`Manifest`] -- a named, tagged pointer to a root tree plus a label
//!   map
//!
//! # Design Rules
//!
//! 1. Identities are computed from content bytes only, in the same pass
//!    that writes the bytes (see [`ObjectDatabase::import`]).
//! 2. Objects are immutable once written; re-importing identical content
//!    is a no-op net of hashing cost.
//! 3. The store never interprets object contents. Decoding belongs to the
//!    model types, which surface malformed payloads as damage, never as
//!    panics.
//! 4. Manifest references form a directed graph that must stay acyclic;
//!    [`order::order_manifests`] rejects cycles outright.

pub mod fs;
pub mod manifest;
pub mod memory;
pub mod order;
pub mod traits;
pub mod tree;

pub use fs::FsObjectDb;
pub use manifest::{Manifest, ManifestBuilder, ManifestRef};
pub use memory::MemoryObjectDb;
pub use order::{order_manifests, referenced_keys};
pub use traits::ObjectDatabase;
pub use tree::{Tree, TreeBuilder, TreeEntry};
