use std::str::FromStr;
use std::sync::{Arc, Mutex};

use log::info;

use crate::batch::record::{BatchPriority, BatchType};
use crate::batch::store::BatchStore;
use crate::config::EngineConfig;
use crate::dispatcher::pool::{BatchHandle, Dispatcher};
use crate::dispatcher::process::{CancelToken, SharedBatch};
use crate::error::Result;
use crate::kramerius::KrameriusGateway;
use crate::pid::Pid;
use crate::process::alto_import::{AltoImportProcess, AltoSink};

/// Front door of the engine: validates requests, creates records and hands
/// processes to the dispatcher.
pub struct BatchEngine {
    store: Arc<dyn BatchStore>,
    kramerius: Arc<dyn KrameriusGateway>,
    sink: Arc<dyn AltoSink>,
    dispatcher: Dispatcher,
}

impl BatchEngine {
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn BatchStore>,
        kramerius: Arc<dyn KrameriusGateway>,
        sink: Arc<dyn AltoSink>,
    ) -> Self {
        Self {
            store,
            kramerius,
            sink,
            dispatcher: Dispatcher::new(config.max_processes),
        }
    }

    pub fn start(&self) {
        self.dispatcher.start();
    }

    /// Plans and submits an ALTO import for one digital object.
    ///
    /// The PID is validated first; a malformed identifier fails here, before
    /// any record exists or anything is enqueued. The caller keeps the
    /// `cancel` token to request cooperative cancellation.
    pub fn plan_alto_import(
        &self,
        pid: &str,
        instance: &str,
        priority: BatchPriority,
        cancel: CancelToken,
    ) -> Result<BatchHandle> {
        let pid = Pid::from_str(pid)?;

        let batch = self
            .store
            .create(pid, instance, BatchType::AltoImport, priority)?;
        info!(
            "Planned ALTO import batch {} for {} ({})",
            batch.id(),
            pid,
            instance
        );

        let record: SharedBatch = Arc::new(Mutex::new(batch));
        let process = AltoImportProcess::new(
            Arc::clone(&record),
            Arc::clone(&self.store),
            Arc::clone(&self.kramerius),
            Arc::clone(&self.sink),
            cancel,
        );

        let handle = self.dispatcher.submit(Box::new(process))?;

        // The record moved to Planned during submission; make the store
        // reflect that.
        {
            let batch = record.lock().unwrap_or_else(|e| e.into_inner());
            self.store.update(&batch)?;
        }

        Ok(handle)
    }

    pub fn shutdown(&self) {
        self.dispatcher.shutdown();
    }

    pub fn join(self) {
        self.dispatcher.join();
    }
}
