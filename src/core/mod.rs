//! Core value types and the plain-data descriptions that cross the worker boundary.

pub mod constraint;
pub mod description;
pub mod types;
pub mod vehicle;

pub use constraint::{ConstraintDescription, ConstraintKind, JointOp, Limits, Motor};
pub use description::{
    ActivationState, ChildDescription, ObjectDescription, ShapeParams, SoftBodyParams,
};
pub use types::{Transform, Velocity};
pub use vehicle::{VehicleDescription, VehicleTuning, WheelDescription};
