//! Error types shared by the worker and main-thread halves of the bridge.

use thiserror::Error;

use crate::protocol::report::ReportKind;
use crate::utils::allocator::{NodeId, ObjectId};

/// Errors raised while handling commands or decoding reports.
///
/// Worker handlers are fire-and-forget: these errors are logged at the
/// dispatch site and never travel back across the transport.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BridgeError {
    #[error("native engine is not loaded yet")]
    EngineNotLoaded,
    #[error("physics world has not been created")]
    WorldNotCreated,
    #[error("engine failed to load: {0}")]
    EngineLoad(String),
    #[error("no object registered under id {0}")]
    UnknownObject(ObjectId),
    #[error("no constraint registered under id {0}")]
    UnknownConstraint(ObjectId),
    #[error("no vehicle registered under id {0}")]
    UnknownVehicle(ObjectId),
    #[error("id {0} is already in use")]
    DuplicateId(ObjectId),
    #[error("object {0} has the wrong body kind for this command")]
    WrongBodyKind(ObjectId),
    #[error("shape description for object {0} could not be built")]
    UnknownShape(ObjectId),
    #[error("geometry for object {0} is empty")]
    EmptyGeometry(ObjectId),
    #[error("constraint {0} does not support this operation")]
    WrongConstraintKind(ObjectId),
    #[error("constraint {0} references bodies that are not registered")]
    DanglingConstraint(ObjectId),
    #[error("scene node {0:?} is missing or has no physics body")]
    NoPhysicsBody(NodeId),
    #[error("transport channel closed")]
    TransportClosed,
    #[error("worker thread could not be started: {0}")]
    WorkerSpawn(String),
    #[error("unknown report tag {0}")]
    UnknownReportTag(f32),
    #[error("malformed {kind:?} report: expected at least {expected} values, got {actual}")]
    MalformedReport {
        kind: ReportKind,
        expected: usize,
        actual: usize,
    },
}

/// Convenient Result alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_the_id() {
        let err = BridgeError::UnknownObject(ObjectId(7));
        assert!(err.to_string().contains('7'));
    }
}
