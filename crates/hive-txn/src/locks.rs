use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Registry of named locks, created on first use and never evicted.
///
/// One entry exists per distinct logical resource name (a manifest name,
/// a meta-manifest stream). The map grows monotonically by design: names
/// are expected to be revisited for the lifetime of the process, and the
/// bounded cardinality of real-world name sets makes the memory cost of
/// never evicting a deliberate tradeoff, not a leak.
#[derive(Debug, Default)]
pub struct NamedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NamedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock handle for `name`, creating it on first use.
    ///
    /// The registry's own mutex is held only long enough to clone the
    /// handle; callers block on the named lock, never on the map.
    pub fn handle(&self, name: &str) -> Arc<Mutex<()>> {
        let mut map = self.locks.lock().expect("lock registry poisoned");
        Arc::clone(
            map.entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Number of distinct names seen so far.
    pub fn len(&self) -> usize {
        self.locks.lock().expect("lock registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
