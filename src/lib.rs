//! Particle Bridge – a worker-hosted physics bridge for scene graphs.
//!
//! The simulation runs behind a message channel, usually on its own thread.
//! The main thread talks to it through [`WorldModule`], which mirrors the
//! scene, sends commands and applies the compact numeric reports the worker
//! posts back after every step. The worker side is [`SimulationWorld`],
//! which drives any engine implementing [`NativeEngine`].

pub mod bridge;
pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod native;
pub mod protocol;
pub mod transport;
pub mod utils;
pub mod world;

pub use glam::{Mat4, Quat, Vec3};

pub use bridge::{
    CollisionEvent, ConstraintMirror, PhysicsBody, Scene, SceneNode, SoftMesh, VehicleMirror,
    WorldEvent, WorldModule,
};
pub use config::{BroadphaseConfig, BroadphaseKind, WorldConfig};
pub use crate::core::{
    ActivationState, ChildDescription, ConstraintDescription, ConstraintKind, JointOp,
    ObjectDescription, ShapeParams, Transform, VehicleDescription, VehicleTuning, Velocity,
    WheelDescription,
};
pub use error::{BridgeError, Result};
pub use native::{
    EngineLoader, Journal, NativeCall, NativeEngine, ReferenceEngine, ReferenceLoader,
    ResourceCounts,
};
pub use protocol::{
    report::{ReportBuffer, ReportKind, SoftKind},
    ControlMessage, FromWorker, ToWorker, WorkerCommand,
};
pub use transport::{WorkerEndpoint, WorkerLink};
pub use utils::allocator::{IdCounter, NodeId, ObjectId};
pub use world::SimulationWorld;
