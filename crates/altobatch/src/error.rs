use std::path::PathBuf;
use thiserror::Error;

use crate::batch::record::BatchState;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    #[error("Invalid PID: {0}")]
    Pid(#[from] PidError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Kramerius error: {0}")]
    Kramerius(#[from] KrameriusError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Illegal state transition {from:?} -> {to:?}")]
    InvalidTransition { from: BatchState, to: BatchState },

    #[error("Object index {object_id} exceeds estimated item number {estimate}")]
    ObjectIdOutOfRange { object_id: u32, estimate: u32 },
}

#[derive(Error, Debug)]
pub enum PidError {
    #[error("PID '{value}' is missing the 'uuid:' prefix")]
    MissingPrefix { value: String },

    #[error("PID '{value}' does not contain a valid UUID: {source}")]
    InvalidUuid {
        value: String,
        #[source]
        source: uuid::Error,
    },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Batch {0} not found")]
    NotFound(i32),

    #[error("Failed to store ALTO version for {pid}: {reason}")]
    Version { pid: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Dispatcher is shut down")]
    ShutDown,

    #[error("Batch rejected: {0}")]
    Rejected(#[from] BatchError),
}

#[derive(Error, Debug)]
pub enum KrameriusError {
    #[error("Unknown Kramerius instance '{0}'")]
    UnknownInstance(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Malformed ALTO for {pid}: {reason}")]
    MalformedAlto { pid: String, reason: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;
