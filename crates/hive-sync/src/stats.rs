use std::fmt;
use std::time::Duration;

/// Byte-exact accounting of one fetch or push.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Manifests transferred.
    pub manifests: usize,
    /// Trees the destination already had (not transferred).
    pub trees_reused: usize,
    /// Objects transferred (trees included).
    pub objects: usize,
    /// Serialized archive size, zero when nothing moved.
    pub bytes: u64,
    /// Wall-clock time for the whole operation.
    pub duration: Duration,
}

impl fmt::Display for TransferStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} manifests, {} objects, {} trees reused, {} bytes in {:?}",
            self.manifests, self.objects, self.trees_reused, self.bytes, self.duration
        )
    }
}
