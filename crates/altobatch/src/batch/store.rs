use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::RwLock;

use crate::batch::record::{Batch, BatchPriority, BatchState, BatchType};
use crate::error::StoreError;
use crate::pid::Pid;

/// Persistence seam for batch records.
///
/// `update` must write the whole record in one step so `state`, `substate`,
/// `object_id`, `log` and `update_date` are never observed half-written.
pub trait BatchStore: Send + Sync {
    fn create(
        &self,
        pid: Pid,
        instance: &str,
        kind: BatchType,
        priority: BatchPriority,
    ) -> Result<Batch, StoreError>;

    fn get(&self, id: i32) -> Result<Batch, StoreError>;

    fn update(&self, batch: &Batch) -> Result<(), StoreError>;

    fn find_by_state(&self, state: BatchState) -> Result<Vec<Batch>, StoreError>;
}

/// Whole-record in-memory store. Durable stores live outside the engine.
#[derive(Default)]
pub struct InMemoryBatchStore {
    batches: RwLock<HashMap<i32, Batch>>,
    next_id: AtomicI32,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Poisoning only happens if a writer panicked mid-operation; the map is
    // still a consistent snapshot of whole records, so recover it.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<i32, Batch>> {
        self.batches.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<i32, Batch>> {
        self.batches.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl BatchStore for InMemoryBatchStore {
    fn create(
        &self,
        pid: Pid,
        instance: &str,
        kind: BatchType,
        priority: BatchPriority,
    ) -> Result<Batch, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let batch = Batch::new(id, pid, instance, kind, priority);
        self.write().insert(id, batch.clone());
        Ok(batch)
    }

    fn get(&self, id: i32) -> Result<Batch, StoreError> {
        self.read().get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    fn update(&self, batch: &Batch) -> Result<(), StoreError> {
        let mut batches = self.write();
        if !batches.contains_key(&batch.id()) {
            return Err(StoreError::NotFound(batch.id()));
        }
        batches.insert(batch.id(), batch.clone());
        Ok(())
    }

    fn find_by_state(&self, state: BatchState) -> Result<Vec<Batch>, StoreError> {
        let mut found: Vec<Batch> = self
            .read()
            .values()
            .filter(|b| b.state() == state)
            .cloned()
            .collect();
        found.sort_by_key(Batch::id);
        Ok(found)
    }
}
