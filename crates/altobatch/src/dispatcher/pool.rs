use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};

use crate::batch::record::{Batch, BatchState};
use crate::dispatcher::process::{BatchOutcome, BatchProcess, QueueKey, SharedBatch};
use crate::error::DispatchError;

struct PendingEntry {
    key: QueueKey,
    process: Box<dyn BatchProcess>,
    outcome_tx: Sender<BatchOutcome>,
}

impl PartialEq for PendingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for PendingEntry {}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.key.cmp(&other.key)
    }
}

struct Shared {
    queue: Mutex<BinaryHeap<PendingEntry>>,
    available: Condvar,
    shutdown: AtomicBool,
}

/// Allows the caller to await a submitted batch and retrieve its outcome.
#[derive(Debug)]
pub struct BatchHandle {
    batch_id: i32,
    record: SharedBatch,
    outcome_rx: Receiver<BatchOutcome>,
}

impl BatchHandle {
    pub fn batch_id(&self) -> i32 {
        self.batch_id
    }

    pub fn record(&self) -> SharedBatch {
        Arc::clone(&self.record)
    }

    /// Blocks until the batch reaches a terminal outcome. Returns
    /// `DispatchError::ShutDown` if the batch was discarded before it
    /// started.
    pub fn wait(&self) -> Result<BatchOutcome, DispatchError> {
        self.outcome_rx.recv().map_err(|_| DispatchError::ShutDown)
    }

    pub fn try_wait(&self) -> Option<BatchOutcome> {
        self.outcome_rx.try_recv().ok()
    }
}

/// Bounded concurrent executor for batch processes.
///
/// Exactly `max_processes` worker threads share one priority-ordered pending
/// queue. The pool size is fixed for the dispatcher's lifetime and running
/// jobs are never preempted. Submissions are accepted before `start`, which
/// lets callers enqueue a burst and observe deterministic dequeue order.
pub struct Dispatcher {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    next_seq: AtomicU64,
    max_processes: usize,
}

impl Dispatcher {
    /// # Panics
    /// Panics if `max_processes` is 0.
    pub fn new(max_processes: usize) -> Self {
        assert!(max_processes > 0, "max_processes must be > 0");
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(BinaryHeap::new()),
                available: Condvar::new(),
                shutdown: AtomicBool::new(false),
            }),
            workers: Mutex::new(Vec::with_capacity(max_processes)),
            started: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
            max_processes,
        }
    }

    pub fn max_processes(&self) -> usize {
        self.max_processes
    }

    /// Spawns the worker threads. Calling it more than once has no effect.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut workers = lock(&self.workers);
        for worker_id in 0..self.max_processes {
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name(format!("batch-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, shared))
                .expect("failed to spawn batch worker");
            workers.push(handle);
        }

        info!("Started {} batch workers", self.max_processes);
    }

    /// Accepts a batch into the pending queue, moving its record to
    /// `Planned`. Never blocks beyond the cost of queue insertion.
    pub fn submit(&self, process: Box<dyn BatchProcess>) -> Result<BatchHandle, DispatchError> {
        if self.shared.shutdown.load(Ordering::SeqCst) {
            return Err(DispatchError::ShutDown);
        }

        let record = process.record();
        let (batch_id, key) = {
            let mut batch = lock_record(&record);
            batch.transition(BatchState::Planned)?;
            let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
            (batch.id(), QueueKey::new(batch.priority(), seq))
        };

        let (outcome_tx, outcome_rx) = bounded(1);
        lock(&self.shared.queue).push(PendingEntry {
            key,
            process,
            outcome_tx,
        });
        self.shared.available.notify_one();

        debug!("Batch {} queued", batch_id);
        Ok(BatchHandle {
            batch_id,
            record,
            outcome_rx,
        })
    }

    /// Stops accepting submissions and wakes idle workers. In-flight batches
    /// finish; pending batches are never started.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Dispatcher shutting down; pending batches will not be started");
        self.shared.available.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    /// Shuts down and joins all workers. Dropping the dispatcher afterwards
    /// drops the pending queue, which closes the outcome channels of batches
    /// that were never started.
    pub fn join(self) {
        self.shutdown();

        let workers = std::mem::take(&mut *lock(&self.workers));
        for (i, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Batch worker {} panicked: {:?}", i, e);
            } else {
                debug!("Batch worker {} finished", i);
            }
        }

        info!("All batch workers have stopped");
    }
}

// A panicking process may leave a mutex poisoned; the protected data is still
// consistent (records are mutated through the state machine), so recover it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn lock_record(record: &SharedBatch) -> MutexGuard<'_, Batch> {
    lock(record)
}

fn run_worker(worker_id: usize, shared: Arc<Shared>) {
    debug!("Batch worker {} started", worker_id);

    'outer: loop {
        let entry = {
            let mut queue = lock(&shared.queue);
            loop {
                if shared.shutdown.load(Ordering::SeqCst) {
                    break 'outer;
                }
                match queue.pop() {
                    Some(entry) => break entry,
                    None => {
                        queue = shared
                            .available
                            .wait(queue)
                            .unwrap_or_else(|e| e.into_inner());
                    }
                }
            }
        };

        execute(worker_id, entry);
    }

    debug!("Batch worker {} stopped", worker_id);
}

fn execute(worker_id: usize, entry: PendingEntry) {
    let PendingEntry {
        key: _,
        mut process,
        outcome_tx,
    } = entry;

    let record = process.record();
    let batch_id = {
        let mut batch = lock_record(&record);
        if let Err(e) = batch.transition(BatchState::Running) {
            // Typically a batch killed while it was still pending.
            let outcome = match batch.state() {
                BatchState::Killed => BatchOutcome::Killed,
                _ => BatchOutcome::Failed {
                    error: e.to_string(),
                },
            };
            warn!("Batch {} is not runnable: {}", batch.id(), e);
            let _ = outcome_tx.send(outcome);
            return;
        }
        batch.id()
    };

    debug!("Worker {} running batch {}", worker_id, batch_id);

    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| process.run())) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let thread = thread::current();
            error!(
                "Uncaught panic in batch {} on thread '{}': {}",
                batch_id,
                thread.name().unwrap_or("batch-worker"),
                message
            );

            let mut batch = lock_record(&record);
            if !batch.state().is_terminal() {
                if let Err(e) = batch.fail(&format!("uncaught panic: {}", message)) {
                    error!("Failed to mark batch {} as failed: {}", batch_id, e);
                }
            }
            BatchOutcome::Failed { error: message }
        }
    };

    debug!(
        "Worker {} finished batch {}: {:?}",
        worker_id, batch_id, outcome
    );

    if outcome_tx.send(outcome).is_err() {
        debug!("Outcome of batch {} dropped, handle is gone", batch_id);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
