//! Wire protocol shared by the worker and the main thread.

pub mod command;
pub mod message;
pub mod report;

pub use command::WorkerCommand;
pub use message::{ControlMessage, FromWorker, ToWorker};
pub use report::{
    CollisionRecord, ConstraintRecord, ReportBuffer, ReportKind, SoftKind, SoftRecord,
    VehicleRecord, WorldRecord,
};
