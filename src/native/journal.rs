//! Records native resource lifecycle calls so teardown order can be inspected.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{BodyHandle, ConstraintHandle, MotionStateHandle, ShapeHandle, VehicleHandle};

/// A lifecycle call made against the native engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeCall {
    CreateShape(ShapeHandle),
    DestroyShape(ShapeHandle),
    CreateMotionState(MotionStateHandle),
    DestroyMotionState(MotionStateHandle),
    CreateBody(BodyHandle),
    AddRigidBody(BodyHandle),
    RemoveRigidBody(BodyHandle),
    AddSoftBody(BodyHandle),
    RemoveSoftBody(BodyHandle),
    DestroyBody(BodyHandle),
    CreateConstraint(ConstraintHandle),
    AddConstraint(ConstraintHandle),
    RemoveConstraint(ConstraintHandle),
    DestroyConstraint(ConstraintHandle),
    CreateVehicle(VehicleHandle),
    AddVehicle(VehicleHandle),
    RemoveVehicle(VehicleHandle),
    DestroyVehicle(VehicleHandle),
}

/// Shared, append-only log of [`NativeCall`]s.
///
/// Cloning yields another view of the same log, so a test can keep one half
/// while the engine moves onto the worker thread.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    calls: Arc<Mutex<Vec<NativeCall>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: NativeCall) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<NativeCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Index of the first occurrence of `call`.
    pub fn position(&self, call: NativeCall) -> Option<usize> {
        self.calls.lock().iter().position(|recorded| *recorded == call)
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }
}

/// Number of native resources currently alive, by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceCounts {
    pub shapes: usize,
    pub motion_states: usize,
    pub bodies: usize,
    pub constraints: usize,
    pub vehicles: usize,
}

impl ResourceCounts {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
