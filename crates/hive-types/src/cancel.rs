use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{HiveError, HiveResult};

/// Cooperative cancellation signal for long-running scans and transfers.
///
/// Cloning is cheap and all clones observe the same flag. Workers check
/// the token between units of work (between files during import, between
/// entries during a scan); there is no forced preemption.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to every holder of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Fail with [`HiveError::Cancelled`] if the token has been triggered.
    pub fn checkpoint(&self) -> HiveResult<()> {
        if self.is_cancelled() {
            Err(HiveError::Cancelled)
        } else {
            Ok(())
        }
    }
}
