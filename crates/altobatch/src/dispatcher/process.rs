use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::batch::record::{Batch, BatchPriority};

/// Handle to a batch record. The record is exclusively driven by its process
/// while running; the dispatcher only touches it on the panic path.
pub type SharedBatch = Arc<Mutex<Batch>>;

/// Terminal outcome of one executed unit of work, reported through the
/// submission handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// All items processed without error.
    Completed,
    /// Processing completed but some items failed; details are in the batch
    /// log.
    CompletedWithWarnings { failed_items: u32 },
    /// An unrecoverable fault stopped processing.
    Failed { error: String },
    /// Cooperative cancellation observed at a checkpoint.
    Killed,
}

/// Executable wrapper around one batch record.
///
/// The dispatcher performs the `Planned -> Running` transition before calling
/// `run`; `run` must leave the record in a terminal state. Each instance is
/// run at most once — re-submission of the same logical job is a new record
/// plus a new process.
pub trait BatchProcess: Send {
    fn record(&self) -> SharedBatch;

    /// Runs the batch to completion on the calling worker thread.
    fn run(&mut self) -> BatchOutcome;
}

/// Queue position of a pending process, fixed at submission time so later
/// record mutations cannot reorder the heap: higher priority dequeues first,
/// equal priorities dequeue in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueKey {
    priority: BatchPriority,
    seq: u64,
}

impl QueueKey {
    pub(crate) fn new(priority: BatchPriority, seq: u64) -> Self {
        Self { priority, seq }
    }
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap pops the greatest entry, so the earlier submission must
        // compare greater within a priority class.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// Cooperative cancellation flag, checked by processes between items and
/// never mid-item. Created by the submitting caller; the dispatcher is
/// unaware of it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
