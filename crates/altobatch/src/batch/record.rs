use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BatchError;
use crate::pid::Pid;

/// Coarse lifecycle stage of a batch.
///
/// `Done`, `Warning`, `Error` and `Killed` are terminal; no transition may
/// leave them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Created,
    Planned,
    Running,
    Done,
    Warning,
    Error,
    Killed,
}

impl BatchState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BatchState::Done | BatchState::Warning | BatchState::Error | BatchState::Killed
        )
    }

    fn can_transition(self, next: BatchState) -> bool {
        match (self, next) {
            // Cancellation is reachable from any non-terminal state.
            (from, BatchState::Killed) if !from.is_terminal() => true,
            (BatchState::Created, BatchState::Planned) => true,
            (BatchState::Planned, BatchState::Running) => true,
            (
                BatchState::Running,
                BatchState::Done | BatchState::Warning | BatchState::Error,
            ) => true,
            _ => false,
        }
    }
}

/// Scheduling precedence of a batch. Derived ordering: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchPriority {
    Low,
    Medium,
    High,
}

/// Job kind, distinguishing processing pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchType {
    AltoImport,
    HierarchyRetrieval,
    Reindex,
}

/// Fine-grained phase within the `Running` state. Carries no scheduling
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchSubstate {
    Fetching,
    Transforming,
    Saving,
}

/// Persisted description of one unit of batch work.
///
/// Fields are private so every mutation goes through the state machine:
/// terminal states never regress, `kind` and `priority` are immutable after
/// creation, and `update_date` is refreshed on every change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    id: i32,
    pid: Pid,
    instance: String,
    #[serde(rename = "type")]
    kind: BatchType,
    priority: BatchPriority,
    state: BatchState,
    substate: Option<BatchSubstate>,
    object_id: Option<u32>,
    estimate_item_number: Option<u32>,
    log: String,
    create_date: DateTime<Utc>,
    update_date: DateTime<Utc>,
}

impl Batch {
    pub fn new(
        id: i32,
        pid: Pid,
        instance: impl Into<String>,
        kind: BatchType,
        priority: BatchPriority,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            pid,
            instance: instance.into(),
            kind,
            priority,
            state: BatchState::Created,
            substate: None,
            object_id: None,
            estimate_item_number: None,
            log: String::new(),
            create_date: now,
            update_date: now,
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn kind(&self) -> BatchType {
        self.kind
    }

    pub fn priority(&self) -> BatchPriority {
        self.priority
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn substate(&self) -> Option<BatchSubstate> {
        self.substate
    }

    pub fn object_id(&self) -> Option<u32> {
        self.object_id
    }

    pub fn estimate_item_number(&self) -> Option<u32> {
        self.estimate_item_number
    }

    pub fn log(&self) -> &str {
        &self.log
    }

    pub fn create_date(&self) -> DateTime<Utc> {
        self.create_date
    }

    pub fn update_date(&self) -> DateTime<Utc> {
        self.update_date
    }

    fn touch(&mut self) {
        self.update_date = Utc::now();
    }

    /// Appends a timestamped line to the operator-facing log.
    pub fn append_log(&mut self, message: &str) {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
        self.log.push_str(&format!("[{}] {}\n", timestamp, message));
        self.touch();
    }

    /// Moves the batch to `next`, rejecting anything the state machine does
    /// not allow. Clears the substate when leaving `Running`.
    pub fn transition(&mut self, next: BatchState) -> Result<(), BatchError> {
        if !self.state.can_transition(next) {
            return Err(BatchError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        self.append_log(&format!("state: {:?} -> {:?}", self.state, next));
        self.state = next;
        if next != BatchState::Running {
            self.substate = None;
        }
        self.touch();
        Ok(())
    }

    pub fn set_substate(&mut self, substate: Option<BatchSubstate>) {
        self.substate = substate;
        self.touch();
    }

    pub fn set_estimate_item_number(&mut self, estimate: u32) -> Result<(), BatchError> {
        if let Some(object_id) = self.object_id {
            if object_id > estimate {
                return Err(BatchError::ObjectIdOutOfRange {
                    object_id,
                    estimate,
                });
            }
        }
        self.estimate_item_number = Some(estimate);
        self.touch();
        Ok(())
    }

    /// Records the index of the item currently being processed.
    pub fn set_object_id(&mut self, object_id: u32) -> Result<(), BatchError> {
        if let Some(estimate) = self.estimate_item_number {
            if object_id > estimate {
                return Err(BatchError::ObjectIdOutOfRange {
                    object_id,
                    estimate,
                });
            }
        }
        self.object_id = Some(object_id);
        self.touch();
        Ok(())
    }

    pub fn finish(&mut self) -> Result<(), BatchError> {
        self.transition(BatchState::Done)
    }

    pub fn finish_with_warnings(&mut self, reason: &str) -> Result<(), BatchError> {
        self.append_log(reason);
        self.transition(BatchState::Warning)
    }

    pub fn fail(&mut self, reason: &str) -> Result<(), BatchError> {
        self.append_log(reason);
        self.transition(BatchState::Error)
    }

    pub fn kill(&mut self, reason: &str) -> Result<(), BatchError> {
        self.append_log(reason);
        self.transition(BatchState::Killed)
    }
}
