//! Batch scheduling and dispatch engine for ALTO/OCR text editing.
//!
//! Batches are persisted records with a monotonic state machine; a
//! [`BatchProcess`] wraps one record and runs it to completion on a worker
//! thread owned by the [`Dispatcher`], which bounds concurrency and always
//! dequeues the highest-priority pending batch first.

pub mod batch;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod kramerius;
pub mod pid;
pub mod process;
pub mod roles;

pub use batch::{Batch, BatchPriority, BatchState, BatchStore, BatchSubstate, BatchType, InMemoryBatchStore};
pub use config::{load_config, load_config_from_str, EngineConfig, InstanceConfig};
pub use dispatcher::{BatchHandle, BatchOutcome, BatchProcess, CancelToken, Dispatcher, SharedBatch};
pub use engine::BatchEngine;
pub use error::{
    BatchError, ConfigError, DispatchError, EngineError, KrameriusError, PidError, Result,
    StoreError,
};
pub use kramerius::{KrameriusClient, KrameriusGateway, ObjectMetadata};
pub use pid::Pid;
pub use process::{AltoImportProcess, AltoSink};
pub use roles::{resolve_permissions, Role, RoleMapping, UserPermissions};
