//! Serialized GATT command queue.
//!
//! The dongle firmware serializes at the link layer and drops reports that
//! arrive faster than it can process, so every outgoing write (keyboard,
//! mouse, gamepad, unicode and command traffic alike) funnels through one
//! FIFO with a single consumer task. At most one write is in flight at any
//! instant; `Delay` actions only stall the consumer, never the callers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::domain::models::QueuedAction;
use crate::infrastructure::bluetooth::transport::GattTransport;

/// Upper bound on a single queued delay; firmware pacing never needs more.
pub const MAX_DELAY: Duration = Duration::from_millis(50);

#[derive(Default)]
struct Inner {
    queue: Mutex<VecDeque<QueuedAction>>,
    wakeup: Notify,
    /// Open only while the session phase is Connected. Enforced at
    /// transmission time so enqueue never blocks.
    gate_open: AtomicBool,
    /// Bumped by `clear`; a completion observed under a different
    /// generation than its write was issued in is stale and discarded.
    generation: AtomicU64,
    shutdown: AtomicBool,
    /// Signalled when a transport write fails. The session router awaits
    /// this and tears the session down.
    failure: Notify,
}

/// Handle to the shared queue. Cheap to clone; all clones feed the same
/// consumer task.
#[derive(Clone)]
pub struct CommandScheduler {
    inner: Arc<Inner>,
}

impl CommandScheduler {
    /// Create the queue and spawn its consumer over `transport`.
    pub fn spawn(transport: Arc<dyn GattTransport>) -> Self {
        let inner = Arc::new(Inner::default());
        tokio::spawn(Self::run(Arc::clone(&inner), transport));
        Self { inner }
    }

    /// Append one action. Never blocks; wakes the consumer if idle.
    pub fn enqueue(&self, action: QueuedAction) {
        self.inner.queue.lock().unwrap().push_back(action);
        self.inner.wakeup.notify_one();
    }

    /// Append a batch without interleaving with other callers' batches.
    pub fn enqueue_all(&self, actions: impl IntoIterator<Item = QueuedAction>) {
        {
            let mut queue = self.inner.queue.lock().unwrap();
            queue.extend(actions);
        }
        self.inner.wakeup.notify_one();
    }

    /// Allow writes to reach the transport (session became Connected).
    pub fn open_gate(&self) {
        self.inner.gate_open.store(true, Ordering::SeqCst);
    }

    pub fn close_gate(&self) {
        self.inner.gate_open.store(false, Ordering::SeqCst);
    }

    /// Drop everything queued and invalidate any in-flight completion.
    pub fn clear(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.queue.lock().unwrap().clear();
    }

    /// Immediate teardown: close the gate, drop the queue, stop the
    /// consumer. In-flight completions arriving afterwards are discarded.
    pub fn shutdown(&self) {
        self.close_gate();
        self.clear();
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.wakeup.notify_one();
    }

    pub fn queued_len(&self) -> usize {
        self.inner.queue.lock().unwrap().len()
    }

    /// Resolves once a transport write has failed. The gate is already
    /// closed by then; the caller owns the session teardown.
    pub async fn write_failure(&self) {
        self.inner.failure.notified().await;
    }

    async fn run(inner: Arc<Inner>, transport: Arc<dyn GattTransport>) {
        loop {
            if inner.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let action = inner.queue.lock().unwrap().pop_front();
            let Some(action) = action else {
                inner.wakeup.notified().await;
                continue;
            };

            match action {
                QueuedAction::Delay { millis } => {
                    if !inner.gate_open.load(Ordering::SeqCst) {
                        continue;
                    }
                    let wait = Duration::from_millis(millis).min(MAX_DELAY);
                    tokio::time::sleep(wait).await;
                }
                QueuedAction::Write {
                    characteristic,
                    payload,
                } => {
                    if !inner.gate_open.load(Ordering::SeqCst) {
                        debug!(?characteristic, "discarding write while not connected");
                        continue;
                    }

                    let generation = inner.generation.load(Ordering::SeqCst);
                    let result = transport.write(characteristic, &payload).await;

                    if inner.generation.load(Ordering::SeqCst) != generation {
                        trace!(?characteristic, "stale write completion discarded");
                        continue;
                    }

                    if let Err(error) = result {
                        // Fail fast: a dropped keystroke is safer than a
                        // corrupted one, so nothing queued is replayed. The
                        // session router picks the failure up and tears the
                        // session down.
                        warn!(%error, ?characteristic, "write failed, dropping queue");
                        inner.gate_open.store(false, Ordering::SeqCst);
                        inner.queue.lock().unwrap().clear();
                        inner.failure.notify_one();
                    }
                }
            }
        }
        trace!("scheduler consumer stopped");
    }
}
