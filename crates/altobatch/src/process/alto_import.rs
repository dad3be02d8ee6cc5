use std::collections::VecDeque;
use std::sync::{Arc, MutexGuard};

use log::{info, warn};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::batch::record::{Batch, BatchSubstate};
use crate::batch::store::BatchStore;
use crate::dispatcher::process::{BatchOutcome, BatchProcess, CancelToken, SharedBatch};
use crate::error::{EngineError, KrameriusError, StoreError};
use crate::kramerius::{KrameriusGateway, ObjectMetadata};
use crate::pid::Pid;

/// Receives fetched page content. ALTO version storage lives outside the
/// engine.
pub trait AltoSink: Send + Sync {
    fn store_version(&self, pid: &Pid, alto: &[u8], ocr: &str) -> Result<(), StoreError>;
}

/// Imports the ALTO/OCR text layers of a digital object.
///
/// Walks the object hierarchy breadth-first; pages get their ALTO and OCR
/// fetched, checked and handed to the sink, container objects contribute
/// their children to the queue. A failed page is logged and skipped (the
/// batch ends in `Warning`), a failed hierarchy lookup aborts the batch
/// (`Error`). Cancellation is observed between items.
pub struct AltoImportProcess {
    record: SharedBatch,
    store: Arc<dyn BatchStore>,
    kramerius: Arc<dyn KrameriusGateway>,
    sink: Arc<dyn AltoSink>,
    cancel: CancelToken,
}

impl AltoImportProcess {
    pub fn new(
        record: SharedBatch,
        store: Arc<dyn BatchStore>,
        kramerius: Arc<dyn KrameriusGateway>,
        sink: Arc<dyn AltoSink>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            record,
            store,
            kramerius,
            sink,
            cancel,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Batch> {
        self.record.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Writes the current record state through the store. Persistence
    /// problems are logged but do not abort processing.
    fn persist(&self) {
        let batch = self.lock();
        if let Err(e) = self.store.update(&batch) {
            warn!("Failed to persist batch {}: {}", batch.id(), e);
        }
    }

    fn mark_failed(&self, reason: &str) -> BatchOutcome {
        {
            let mut batch = self.lock();
            if let Err(e) = batch.fail(reason) {
                warn!("Batch {}: {}", batch.id(), e);
            }
        }
        self.persist();
        BatchOutcome::Failed {
            error: reason.to_string(),
        }
    }

    fn mark_killed(&self) -> BatchOutcome {
        {
            let mut batch = self.lock();
            if let Err(e) = batch.kill("cancellation requested") {
                warn!("Batch {}: {}", batch.id(), e);
            }
        }
        self.persist();
        BatchOutcome::Killed
    }

    fn set_substate(&self, substate: BatchSubstate) {
        self.lock().set_substate(Some(substate));
        self.persist();
    }

    fn import_page(&self, meta: &ObjectMetadata, instance: &str) -> Result<(), EngineError> {
        let alto = self.kramerius.alto(&meta.pid, instance)?;
        validate_alto(&meta.pid, &alto)?;

        self.set_substate(BatchSubstate::Saving);
        let ocr = self.kramerius.ocr_text(&meta.pid, instance)?;
        self.sink.store_version(&meta.pid, &alto, &ocr)?;
        Ok(())
    }
}

impl BatchProcess for AltoImportProcess {
    fn record(&self) -> SharedBatch {
        Arc::clone(&self.record)
    }

    fn run(&mut self) -> BatchOutcome {
        let (batch_id, pid, instance) = {
            let batch = self.lock();
            (batch.id(), batch.pid(), batch.instance().to_string())
        };

        self.set_substate(BatchSubstate::Fetching);

        let root = match self.kramerius.object_metadata(&pid, &instance) {
            Ok(Some(meta)) => meta,
            Ok(None) => {
                return self.mark_failed(&format!(
                    "Object {} not found in Kramerius instance {}",
                    pid, instance
                ));
            }
            Err(e) => {
                return self.mark_failed(&format!("Failed to fetch metadata of {}: {}", pid, e));
            }
        };

        let mut queue: VecDeque<ObjectMetadata> = VecDeque::new();
        queue.push_back(root);

        let mut processed: u32 = 0;
        let mut failed_items: u32 = 0;

        while let Some(meta) = queue.pop_front() {
            // Cancellation checkpoint, between items only.
            if self.cancel.is_canceled() {
                return self.mark_killed();
            }

            if meta.is_page() {
                processed += 1;
                {
                    let mut batch = self.lock();
                    let known_pages =
                        processed + queue.iter().filter(|m| m.is_page()).count() as u32;
                    let estimate = batch.estimate_item_number().unwrap_or(0).max(known_pages);
                    if let Err(e) = batch.set_estimate_item_number(estimate) {
                        warn!("Batch {}: {}", batch_id, e);
                    }
                    if let Err(e) = batch.set_object_id(processed) {
                        warn!("Batch {}: {}", batch_id, e);
                    }
                    batch.set_substate(Some(BatchSubstate::Transforming));
                }
                self.persist();

                if let Err(e) = self.import_page(&meta, &instance) {
                    failed_items += 1;
                    self.lock()
                        .append_log(&format!("page {}: {}", meta.pid, e));
                    self.persist();
                }
            } else {
                self.set_substate(BatchSubstate::Fetching);
                match self.kramerius.children_metadata(&meta.pid, &instance) {
                    Ok(children) => queue.extend(children),
                    Err(e) => {
                        return self.mark_failed(&format!(
                            "Failed to fetch children of {}: {}",
                            meta.pid, e
                        ));
                    }
                }
            }
        }

        let outcome = if failed_items == 0 {
            let mut batch = self.lock();
            if let Err(e) = batch.finish() {
                warn!("Batch {}: {}", batch_id, e);
            }
            BatchOutcome::Completed
        } else {
            let mut batch = self.lock();
            if let Err(e) = batch
                .finish_with_warnings(&format!("{} of {} pages failed", failed_items, processed))
            {
                warn!("Batch {}: {}", batch_id, e);
            }
            BatchOutcome::CompletedWithWarnings { failed_items }
        };
        self.persist();

        info!(
            "Batch {} imported {} pages ({} failed)",
            batch_id, processed, failed_items
        );
        outcome
    }
}

/// Rejects payloads that are not well-formed XML before they reach the sink.
fn validate_alto(pid: &Pid, bytes: &[u8]) -> Result<(), KrameriusError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => return Ok(()),
            Ok(_) => {}
            Err(e) => {
                return Err(KrameriusError::MalformedAlto {
                    pid: pid.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::batch::record::{BatchPriority, BatchState, BatchType};
    use crate::batch::store::InMemoryBatchStore;
    use crate::error::KrameriusError;
    use uuid::Uuid;

    const ALTO_SAMPLE: &[u8] = b"<?xml version=\"1.0\"?><alto><Layout/></alto>";

    fn pid() -> Pid {
        Pid::new(Uuid::new_v4())
    }

    fn page(pid: Pid) -> ObjectMetadata {
        ObjectMetadata {
            pid,
            model: "page".to_string(),
            title: None,
        }
    }

    fn container(pid: Pid, model: &str) -> ObjectMetadata {
        ObjectMetadata {
            pid,
            model: model.to_string(),
            title: None,
        }
    }

    /// Gateway backed by maps; page PIDs listed in `broken_pages` serve
    /// garbage instead of ALTO.
    #[derive(Default)]
    struct MockGateway {
        objects: HashMap<Pid, ObjectMetadata>,
        children: HashMap<Pid, Vec<ObjectMetadata>>,
        broken_pages: Vec<Pid>,
        fail_children: bool,
    }

    impl MockGateway {
        fn with_root(root: ObjectMetadata) -> Self {
            let mut gateway = Self::default();
            gateway.objects.insert(root.pid, root);
            gateway
        }
    }

    impl KrameriusGateway for MockGateway {
        fn object_metadata(
            &self,
            pid: &Pid,
            _instance: &str,
        ) -> Result<Option<ObjectMetadata>, KrameriusError> {
            Ok(self.objects.get(pid).cloned())
        }

        fn children_metadata(
            &self,
            pid: &Pid,
            _instance: &str,
        ) -> Result<Vec<ObjectMetadata>, KrameriusError> {
            if self.fail_children {
                return Err(KrameriusError::Status {
                    url: format!("http://test/{}", pid),
                    status: 503,
                });
            }
            Ok(self.children.get(pid).cloned().unwrap_or_default())
        }

        fn alto(&self, pid: &Pid, _instance: &str) -> Result<Vec<u8>, KrameriusError> {
            if self.broken_pages.contains(pid) {
                Ok(b"<alto><unclosed>".to_vec())
            } else {
                Ok(ALTO_SAMPLE.to_vec())
            }
        }

        fn ocr_text(&self, _pid: &Pid, _instance: &str) -> Result<String, KrameriusError> {
            Ok("Lorem ipsum".to_string())
        }
    }

    #[derive(Default)]
    struct MockSink {
        stored: Mutex<Vec<Pid>>,
    }

    impl AltoSink for MockSink {
        fn store_version(&self, pid: &Pid, _alto: &[u8], _ocr: &str) -> Result<(), StoreError> {
            self.stored.lock().unwrap().push(*pid);
            Ok(())
        }
    }

    struct Fixture {
        record: SharedBatch,
        store: Arc<InMemoryBatchStore>,
        sink: Arc<MockSink>,
        cancel: CancelToken,
    }

    impl Fixture {
        fn new(root_pid: Pid) -> Self {
            let store = Arc::new(InMemoryBatchStore::new());
            let mut batch = store
                .create(root_pid, "k7-test", BatchType::AltoImport, BatchPriority::Medium)
                .unwrap();
            batch.transition(BatchState::Planned).unwrap();
            batch.transition(BatchState::Running).unwrap();
            store.update(&batch).unwrap();

            Self {
                record: Arc::new(Mutex::new(batch)),
                store,
                sink: Arc::new(MockSink::default()),
                cancel: CancelToken::new(),
            }
        }

        fn process(&self, gateway: MockGateway) -> AltoImportProcess {
            AltoImportProcess::new(
                Arc::clone(&self.record),
                Arc::clone(&self.store) as Arc<dyn BatchStore>,
                Arc::new(gateway),
                Arc::clone(&self.sink) as Arc<dyn AltoSink>,
                self.cancel.clone(),
            )
        }
    }

    #[test]
    fn test_single_page_import_completes() {
        let root = pid();
        let fixture = Fixture::new(root);
        let mut process = fixture.process(MockGateway::with_root(page(root)));

        assert_eq!(process.run(), BatchOutcome::Completed);

        let batch = fixture.record.lock().unwrap();
        assert_eq!(batch.state(), BatchState::Done);
        assert_eq!(batch.object_id(), Some(1));
        assert_eq!(batch.estimate_item_number(), Some(1));
        assert_eq!(*fixture.sink.stored.lock().unwrap(), vec![root]);

        // terminal state reached the store too
        assert_eq!(
            fixture.store.get(batch.id()).unwrap().state(),
            BatchState::Done
        );
    }

    #[test]
    fn test_hierarchy_is_walked_breadth_first() {
        let root = pid();
        let (p1, p2, p3) = (pid(), pid(), pid());

        let mut gateway = MockGateway::with_root(container(root, "periodical"));
        gateway
            .children
            .insert(root, vec![page(p1), page(p2), page(p3)]);

        let fixture = Fixture::new(root);
        let mut process = fixture.process(gateway);

        assert_eq!(process.run(), BatchOutcome::Completed);

        let batch = fixture.record.lock().unwrap();
        assert_eq!(batch.object_id(), Some(3));
        assert_eq!(batch.estimate_item_number(), Some(3));
        assert_eq!(*fixture.sink.stored.lock().unwrap(), vec![p1, p2, p3]);
    }

    #[test]
    fn test_malformed_page_lands_in_warning() {
        let root = pid();
        let (good, broken) = (pid(), pid());

        let mut gateway = MockGateway::with_root(container(root, "monograph"));
        gateway.children.insert(root, vec![page(broken), page(good)]);
        gateway.broken_pages.push(broken);

        let fixture = Fixture::new(root);
        let mut process = fixture.process(gateway);

        assert_eq!(
            process.run(),
            BatchOutcome::CompletedWithWarnings { failed_items: 1 }
        );

        let batch = fixture.record.lock().unwrap();
        assert_eq!(batch.state(), BatchState::Warning);
        assert!(batch.log().contains(&broken.to_string()));
        assert!(batch.log().contains("1 of 2 pages failed"));
        assert_eq!(*fixture.sink.stored.lock().unwrap(), vec![good]);
    }

    #[test]
    fn test_missing_root_fails() {
        let root = pid();
        let fixture = Fixture::new(root);
        let mut process = fixture.process(MockGateway::default());

        assert!(matches!(process.run(), BatchOutcome::Failed { .. }));
        assert_eq!(fixture.record.lock().unwrap().state(), BatchState::Error);
    }

    #[test]
    fn test_hierarchy_lookup_failure_aborts() {
        let root = pid();
        let mut gateway = MockGateway::with_root(container(root, "periodical"));
        gateway.fail_children = true;

        let fixture = Fixture::new(root);
        let mut process = fixture.process(gateway);

        assert!(matches!(process.run(), BatchOutcome::Failed { .. }));

        let batch = fixture.record.lock().unwrap();
        assert_eq!(batch.state(), BatchState::Error);
        assert!(batch.log().contains("Failed to fetch children"));
        assert!(fixture.sink.stored.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cancellation_observed_before_first_item() {
        let root = pid();
        let fixture = Fixture::new(root);
        fixture.cancel.cancel();
        let mut process = fixture.process(MockGateway::with_root(page(root)));

        assert_eq!(process.run(), BatchOutcome::Killed);
        assert_eq!(fixture.record.lock().unwrap().state(), BatchState::Killed);
        assert!(fixture.sink.stored.lock().unwrap().is_empty());
    }

    #[test]
    fn test_validate_alto() {
        let sample = pid();
        assert!(validate_alto(&sample, ALTO_SAMPLE).is_ok());
        assert!(matches!(
            validate_alto(&sample, b"<alto><broken>"),
            Err(KrameriusError::MalformedAlto { .. })
        ));
    }
}
