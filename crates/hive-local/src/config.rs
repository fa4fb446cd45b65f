use std::time::Duration;

/// Tunables for a [`Hive`](crate::Hive).
#[derive(Clone, Debug)]
pub struct HiveConfig {
    /// Worker threads for independent import sub-operations. `1` means
    /// fully sequential.
    pub parallelism: usize,
    /// Debounce window for spawn notification.
    pub debounce: Duration,
    /// Generations of a meta-manifest stream kept after a write.
    pub meta_retention: usize,
    /// zstd level used when packaging transfer archives.
    pub archive_level: i32,
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            parallelism: 1,
            debounce: Duration::from_millis(100),
            meta_retention: 2,
            archive_level: 3,
        }
    }
}
