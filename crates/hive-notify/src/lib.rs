//! Spawn notification: observers learn about newly inserted manifests.
//!
//! Inserts arrive at the notifier from transaction commits; a background
//! worker coalesces everything that lands within one debounce window
//! (~100 ms by default) and delivers a single deduplicated, sorted batch
//! to every observer. Bulk imports therefore cost one notification per
//! window instead of one per manifest.
//!
//! Observer failures are isolated: a panicking observer is caught and
//! logged, other observers still receive the batch, and the insert that
//! triggered delivery is never affected (it committed long before).

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use hive_types::ManifestKey;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Callback invoked with each coalesced batch of newly inserted keys.
pub trait SpawnObserver: Send + Sync {
    fn on_spawn(&self, keys: &[ManifestKey]);
}

impl<F> SpawnObserver for F
where
    F: Fn(&[ManifestKey]) + Send + Sync,
{
    fn on_spawn(&self, keys: &[ManifestKey]) {
        self(keys)
    }
}

type ObserverList = Arc<RwLock<Vec<Arc<dyn SpawnObserver>>>>;

/// Debouncing fan-out of manifest spawn events.
pub struct SpawnNotifier {
    tx: mpsc::Sender<Vec<ManifestKey>>,
    observers: ObserverList,
    worker: Option<JoinHandle<()>>,
}

impl SpawnNotifier {
    /// Create a notifier with the given debounce window.
    pub fn new(window: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<Vec<ManifestKey>>();
        let observers: ObserverList = Arc::new(RwLock::new(Vec::new()));
        let worker_observers = Arc::clone(&observers);

        let worker = std::thread::Builder::new()
            .name("hive-spawn-notify".into())
            .spawn(move || run_worker(rx, worker_observers, window))
            .expect("spawn notifier thread");

        Self {
            tx,
            observers,
            worker: Some(worker),
        }
    }

    /// Register an observer. Delivery starts with the next batch.
    pub fn subscribe<O: SpawnObserver + 'static>(&self, observer: O) {
        self.observers
            .write()
            .expect("observer lock poisoned")
            .push(Arc::new(observer));
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.read().expect("observer lock poisoned").len()
    }

    /// Queue newly inserted keys for coalesced delivery.
    ///
    /// Called at the transaction-commit boundary. Never blocks on
    /// observers; after shutdown it is a silent no-op.
    pub fn publish(&self, keys: Vec<ManifestKey>) {
        if keys.is_empty() {
            return;
        }
        let _ = self.tx.send(keys);
    }
}

impl Default for SpawnNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl Drop for SpawnNotifier {
    fn drop(&mut self) {
        // Closing the channel lets the worker flush pending keys and exit.
        let (dead_tx, _) = mpsc::channel();
        drop(std::mem::replace(&mut self.tx, dead_tx));
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for SpawnNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnNotifier")
            .field("observers", &self.observer_count())
            .finish()
    }
}

fn run_worker(
    rx: mpsc::Receiver<Vec<ManifestKey>>,
    observers: ObserverList,
    window: Duration,
) {
    loop {
        // Block until the first keys of a burst arrive.
        let mut pending: BTreeSet<ManifestKey> = match rx.recv() {
            Ok(keys) => keys.into_iter().collect(),
            Err(_) => return,
        };

        // Coalesce everything else that lands within the window.
        let deadline = Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match rx.recv_timeout(remaining) {
                Ok(keys) => pending.extend(keys),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    deliver(&observers, &pending);
                    return;
                }
            }
        }
        deliver(&observers, &pending);
    }
}

fn deliver(observers: &ObserverList, pending: &BTreeSet<ManifestKey>) {
    if pending.is_empty() {
        return;
    }
    let batch: Vec<ManifestKey> = pending.iter().cloned().collect();
    let snapshot: Vec<Arc<dyn SpawnObserver>> = observers
        .read()
        .expect("observer lock poisoned")
        .iter()
        .cloned()
        .collect();
    debug!(keys = batch.len(), observers = snapshot.len(), "spawn batch");
    for observer in snapshot {
        if catch_unwind(AssertUnwindSafe(|| observer.on_spawn(&batch))).is_err() {
            warn!("spawn observer panicked; continuing with remaining observers");
        }
    }
}
