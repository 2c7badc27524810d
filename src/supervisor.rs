//! Named exclusive background tasks.
//!
//! The dashboard's long operations — refresh, detail-view population, PR
//! fetch — are *exclusive*: starting a task under a name supersedes any task
//! already running under that name. Cancellation is cooperative only: a
//! superseded task's in-flight subprocess is never killed, its result is
//! simply discarded when it eventually resolves. Staleness is checked twice,
//! once by the worker before sending and once by the receiver before
//! yielding, so a result produced in the window between a supersede and the
//! send still never reaches the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;

/// Debounce applied to detail-view population so that rapid cursor movement
/// does not spawn a query per row.
pub const DETAIL_DEBOUNCE: Duration = Duration::from_millis(100);

struct Registry {
    current: DashMap<String, u64>,
    counter: AtomicU64,
}

impl Registry {
    fn begin(&self, name: &str) -> u64 {
        let generation = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.current.insert(name.to_string(), generation);
        generation
    }

    fn is_current(&self, name: &str, generation: u64) -> bool {
        self.current
            .get(name)
            .map(|current| *current == generation)
            .unwrap_or(false)
    }
}

struct Envelope<T> {
    name: String,
    generation: u64,
    payload: T,
}

/// Supervises exclusive named tasks. Results arrive over a channel; stale
/// ones are dropped before the caller sees them.
pub struct Supervisor<T> {
    registry: Arc<Registry>,
    tx: Sender<Envelope<T>>,
    rx: Receiver<Envelope<T>>,
}

impl<T: Send + 'static> Supervisor<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            registry: Arc::new(Registry {
                current: DashMap::new(),
                counter: AtomicU64::new(0),
            }),
            tx,
            rx,
        }
    }

    /// Start `job` under `name`, superseding any task already running there.
    pub fn spawn(&self, name: &str, job: impl FnOnce() -> T + Send + 'static) {
        self.spawn_debounced(name, Duration::ZERO, job);
    }

    /// Like [`spawn`](Self::spawn), but wait `delay` first. A task
    /// superseded during its delay never runs at all, which coalesces bursts
    /// of spawns into one execution of the latest job.
    pub fn spawn_debounced(
        &self,
        name: &str,
        delay: Duration,
        job: impl FnOnce() -> T + Send + 'static,
    ) {
        let generation = self.registry.begin(name);
        let registry = Arc::clone(&self.registry);
        let tx = self.tx.clone();
        let name = name.to_string();
        thread::spawn(move || {
            if !delay.is_zero() {
                thread::sleep(delay);
                if !registry.is_current(&name, generation) {
                    return;
                }
            }
            let payload = job();
            if !registry.is_current(&name, generation) {
                return;
            }
            let _ = tx.send(Envelope {
                name,
                generation,
                payload,
            });
        });
    }

    /// Invalidate whatever is in flight under `name` without starting a
    /// replacement.
    pub fn cancel(&self, name: &str) {
        self.registry.begin(name);
    }

    /// Next completed, still-current result, without blocking.
    pub fn try_recv(&self) -> Option<(String, T)> {
        while let Ok(envelope) = self.rx.try_recv() {
            if self
                .registry
                .is_current(&envelope.name, envelope.generation)
            {
                return Some((envelope.name, envelope.payload));
            }
        }
        None
    }

    /// Wait up to `timeout` for the next still-current result.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<(String, T)> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let envelope = self.rx.recv_timeout(remaining).ok()?;
            if self
                .registry
                .is_current(&envelope.name, envelope.generation)
            {
                return Some((envelope.name, envelope.payload));
            }
        }
    }
}

impl<T: Send + 'static> Default for Supervisor<T> {
    fn default() -> Self {
        Self::new()
    }
}
