//! Timed activation scheduler.
//!
//! The scheduler owns one worker thread. Activations arrive over a bounded
//! channel and sit in a min-heap keyed by fire time. The worker sleeps on
//! `recv_timeout` until the earliest item is due, then fires it through the
//! working memory's agenda. It holds only weak references to working memories,
//! so a dropped working memory never fires again.

use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, error, info};

use crate::agenda::Activation;
use crate::error::{ConsequenceError, ReteError, SchedulerError};
use crate::working_memory::WorkingMemory;

#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Max queued schedule requests not yet picked up by the worker.
    pub queue_capacity: usize,
    /// Worker thread name.
    pub thread_name: String,
    /// Worker wake-up interval while nothing is pending.
    pub idle_poll: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            thread_name: "kyrorete-scheduler".to_string(),
            idle_poll: Duration::from_millis(50),
        }
    }
}

/// Delays longer than this are clamped so the fire time stays representable.
const MAX_DELAY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

struct PendingFire {
    fire_at: Instant,
    seq: u64,
    activation: Arc<Activation>,
    memory: Weak<WorkingMemory>,
}

impl std::fmt::Debug for PendingFire {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingFire")
            .field("seq", &self.seq)
            .field("activation", &self.activation.id())
            .finish_non_exhaustive()
    }
}

impl PartialEq for PendingFire {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl Eq for PendingFire {}

impl PartialOrd for PendingFire {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

// Reversed so the heap pops the earliest item; `seq` keeps equal times FIFO.
impl Ord for PendingFire {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct SchedulerStats {
    pending: AtomicUsize,
    fired: AtomicU64,
}

/// Fires activations after their rule's duration has elapsed.
///
/// Construct one explicitly and share it between rule bases and working
/// memories. Dropping the last handle stops the worker; items still pending at
/// that point are discarded.
#[derive(Debug)]
pub struct Scheduler {
    cfg: SchedulerConfig,
    tx: Sender<PendingFire>,
    seq: AtomicU64,
    stats: Arc<SchedulerStats>,
    worker: ThreadId,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(cfg: SchedulerConfig) -> Result<Self, SchedulerError> {
        let (tx, rx) = bounded::<PendingFire>(cfg.queue_capacity.max(1));
        let stats = Arc::new(SchedulerStats::default());

        let thread_stats = Arc::clone(&stats);
        let idle_poll = cfg.idle_poll;
        let join = thread::Builder::new()
            .name(cfg.thread_name.clone())
            .spawn(move || worker_loop(rx, idle_poll, thread_stats))
            .map_err(|e| SchedulerError::Spawn {
                message: e.to_string(),
            })?;
        let worker = join.thread().id();

        info!(thread = %cfg.thread_name, capacity = cfg.queue_capacity, "scheduler started");
        Ok(Self {
            cfg,
            tx,
            seq: AtomicU64::new(0),
            stats,
            worker,
            join: Mutex::new(Some(join)),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.cfg
    }

    /// Schedules `activation` to fire after its rule's duration for its tuple.
    ///
    /// Non-blocking: a full queue is reported as [`SchedulerError::QueueFull`].
    pub fn schedule_agenda_item(
        &self,
        activation: Arc<Activation>,
        memory: &Arc<WorkingMemory>,
    ) -> Result<(), SchedulerError> {
        let delay = activation
            .rule()
            .duration_for(activation.tuple())
            .unwrap_or(Duration::ZERO);
        let fire_at = Instant::now()
            .checked_add(delay.min(MAX_DELAY))
            .ok_or(SchedulerError::DelayOutOfRange { delay })?;
        let item = PendingFire {
            fire_at,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            activation,
            memory: Arc::downgrade(memory),
        };

        self.stats.pending.fetch_add(1, Ordering::AcqRel);
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.stats.pending.fetch_sub(1, Ordering::AcqRel);
                Err(SchedulerError::QueueFull {
                    capacity: self.cfg.queue_capacity,
                })
            }
            Err(TrySendError::Disconnected(_)) => {
                self.stats.pending.fetch_sub(1, Ordering::AcqRel);
                Err(SchedulerError::Disconnected)
            }
        }
    }

    /// Items scheduled but not yet fired or skipped.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.stats.pending.load(Ordering::Acquire)
    }

    /// Consequences run by the worker so far, including failed ones.
    #[must_use]
    pub fn fired(&self) -> u64 {
        self.stats.fired.load(Ordering::Acquire)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Close the channel so the worker's recv returns Disconnected.
        let (dummy_tx, _) = bounded::<PendingFire>(1);
        drop(std::mem::replace(&mut self.tx, dummy_tx));

        let Ok(mut guard) = self.join.lock() else {
            return;
        };
        let Some(handle) = guard.take() else {
            return;
        };
        if thread::current().id() == self.worker {
            // Last handle released from inside a consequence; the worker exits
            // on its next loop iteration.
            drop(handle);
        } else if handle.join().is_err() {
            error!(thread = %self.cfg.thread_name, "scheduler worker panicked");
        }
    }
}

fn worker_loop(rx: Receiver<PendingFire>, idle_poll: Duration, stats: Arc<SchedulerStats>) {
    let mut heap: BinaryHeap<PendingFire> = BinaryHeap::new();

    loop {
        let now = Instant::now();
        while heap.peek().is_some_and(|p| p.fire_at <= now) {
            if let Some(due) = heap.pop() {
                stats.pending.fetch_sub(1, Ordering::AcqRel);
                fire(due, &stats);
            }
        }

        let timeout = heap
            .peek()
            .map_or(idle_poll, |p| p.fire_at.saturating_duration_since(Instant::now()));
        match rx.recv_timeout(timeout) {
            Ok(item) => heap.push(item),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if !heap.is_empty() {
        debug!(discarded = heap.len(), "scheduler stopping with pending items");
        stats.pending.fetch_sub(heap.len(), Ordering::AcqRel);
    }
    info!("scheduler stopped");
}

fn fire(due: PendingFire, stats: &SchedulerStats) {
    let Some(memory) = due.memory.upgrade() else {
        debug!(id = %due.activation.id(), "working memory dropped; discarding activation");
        return;
    };

    let activation = due.activation;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        memory.agenda().fire_scheduled(&activation, &memory)
    }));

    match outcome {
        Ok(Ok(false)) => {}
        Ok(Ok(true)) => {
            stats.fired.fetch_add(1, Ordering::AcqRel);
        }
        Ok(Err(ReteError::Consequence(err))) => {
            stats.fired.fetch_add(1, Ordering::AcqRel);
            memory.handle_async_exception(&err);
        }
        Ok(Err(other)) => {
            error!(rule = activation.rule().name(), error = %other, "scheduled activation failed");
        }
        Err(payload) => {
            stats.fired.fetch_add(1, Ordering::AcqRel);
            let err =
                ConsequenceError::new(activation.rule().name(), panic_message(payload.as_ref()));
            memory.handle_async_exception(&err);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("consequence panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("consequence panicked: {s}")
    } else {
        "consequence panicked".to_string()
    }
}
