//! Manifest registry: the keyed side of a hive.
//!
//! The object database addresses content by hash; the registry addresses
//! manifests by [`ManifestKey`]. Backends implement [`ManifestRegistry`]:
//!
//! - [`MemoryManifestRegistry`] -- `BTreeMap` behind a `RwLock`, for tests
//!   and embedding
//! - [`FsManifestRegistry`] -- one JSON file per manifest under a hashed
//!   filename, written atomically
//!
//! Insert policy (idempotence vs. conflict) is *not* enforced here; the
//! transaction layer owns it. The registry is a dumb keyed map.
//!
//! [`ManifestKey`]: hive_types::ManifestKey

pub mod fs;
pub mod memory;
pub mod traits;

pub use fs::FsManifestRegistry;
pub use memory::MemoryManifestRegistry;
pub use traits::ManifestRegistry;
