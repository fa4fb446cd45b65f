//! Foundation types for the hive.
//!
//! Everything stored in a hive is addressed by an [`ObjectId`], the BLAKE3
//! hash of its content bytes. Manifests are named by a [`ManifestKey`]
//! (name + tag). All crates in the workspace share the closed error
//! taxonomy in [`error`], so callers distinguish a missing object from a
//! conflict or an integrity violation by matching variants rather than by
//! inspecting messages.

pub mod cancel;
pub mod entry;
pub mod error;
pub mod id;
pub mod key;

pub use cancel::CancelToken;
pub use entry::EntryKind;
pub use error::{HiveError, HiveResult};
pub use id::{IdHasher, ObjectId};
pub use key::ManifestKey;
