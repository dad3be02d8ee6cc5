pub mod pool;
pub mod process;

pub use pool::{BatchHandle, Dispatcher};
pub use process::{BatchOutcome, BatchProcess, CancelToken, QueueKey, SharedBatch};
