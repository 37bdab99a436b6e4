use serde::{Deserialize, Serialize};

use super::command::WorkerCommand;
use super::report::ReportBuffer;
use crate::utils::allocator::ObjectId;

/// Control envelopes the worker posts besides reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params", rename_all = "camelCase")]
pub enum ControlMessage {
    /// The native engine finished loading.
    AmmoLoaded,
    /// `makeWorld` completed.
    WorldReady,
    /// A body was built and registered under this id.
    ObjectReady(ObjectId),
}

/// Main thread to worker.
#[derive(Debug, Clone, PartialEq)]
pub enum ToWorker {
    Command(WorkerCommand),
    /// A report buffer handed back for reuse.
    Reclaim(ReportBuffer),
}

impl From<WorkerCommand> for ToWorker {
    fn from(command: WorkerCommand) -> Self {
        ToWorker::Command(command)
    }
}

/// Worker to main thread.
#[derive(Debug, Clone, PartialEq)]
pub enum FromWorker {
    Report(ReportBuffer),
    Control(ControlMessage),
}

impl From<ControlMessage> for FromWorker {
    fn from(message: ControlMessage) -> Self {
        FromWorker::Control(message)
    }
}

impl From<ReportBuffer> for FromWorker {
    fn from(buffer: ReportBuffer) -> Self {
        FromWorker::Report(buffer)
    }
}
