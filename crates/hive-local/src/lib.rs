//! The local hive.
//!
//! [`Hive`] wires the storage pieces into one store: a content-addressed
//! object database, a keyed manifest registry, the transactional write
//! path, and debounced spawn notification. It also provides the
//! operations the surrounding layers consume -- directory import/export,
//! manifest load/list/insert/remove, reachability closures for the sync
//! protocol, and prune.
//!
//! Two configurations ship out of the box: fully in-memory
//! ([`Hive::in_memory`]) and filesystem-backed ([`Hive::open`]).

pub mod config;
pub mod export;
pub mod hive;
pub mod import;

pub use config::HiveConfig;
pub use hive::{Hive, HiveStats, PruneReport};
