pub mod record;
pub mod store;

pub use record::{Batch, BatchPriority, BatchState, BatchSubstate, BatchType};
pub use store::{BatchStore, InMemoryBatchStore};
