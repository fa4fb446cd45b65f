//! Peer-to-peer synchronization between hives.
//!
//! The sync protocol moves the minimal delta between a local and a
//! remote store. Both directions follow the same shape: inventory the
//! manifests, subtract what the destination already has at each level
//! (manifests, then trees, then objects), package exactly the missing
//! set into an archive, and apply it transactionally on the destination.
//!
//! [`RemoteHive`] is the wire-verb boundary; the RPC transport behind it
//! is someone else's concern. [`LocalEndpoint`] implements the trait
//! over an in-process [`Hive`](hive_local::Hive), which is what tests
//! and same-process replication use.
//!
//! Failure discipline: every existence query happens before any transfer
//! is requested, so a failed negotiation leaves both sides untouched;
//! a failed archive application rolls back its transaction.

pub mod apply;
pub mod endpoint;
pub mod fetch;
pub mod push;
pub mod remote;
pub mod stats;

pub use apply::{apply_archive, ApplyOutcome};
pub use endpoint::LocalEndpoint;
pub use fetch::FetchEngine;
pub use push::PushEngine;
pub use remote::{FetchSpec, RemoteHive};
pub use stats::TransferStats;
