//! Capability interface to the native physics engine.
//!
//! The worker only ever talks to the engine through [`NativeEngine`]. Every
//! native resource is an opaque handle; resources the engine does not clean
//! up on its own (motion states, non-cached and compound shapes) are owned by
//! the worker registry and must be destroyed explicitly.

pub mod journal;
pub mod reference;

use glam::Vec3;

use crate::config::WorldConfig;
use crate::core::{
    ActivationState, ConstraintKind, JointOp, SoftBodyParams, Transform, VehicleTuning, Velocity,
    WheelDescription,
};
use crate::error::Result;
use crate::protocol::report::SoftKind;

pub use journal::{Journal, NativeCall, ResourceCounts};
pub use reference::{ReferenceEngine, ReferenceLoader};

macro_rules! native_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);
    };
}

native_handle!(
    /// Collision shape.
    ShapeHandle
);
native_handle!(
    /// Rigid or soft body. The value doubles as the native pointer reported in manifolds.
    BodyHandle
);
native_handle!(MotionStateHandle);
native_handle!(ConstraintHandle);
native_handle!(VehicleHandle);

/// Geometry handed to the engine when building a collision shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeGeometry {
    Compound,
    /// Static plane through the body origin.
    Plane { normal: Vec3 },
    Box { half_extents: Vec3 },
    Sphere { radius: f32 },
    Cylinder { half_extents: Vec3 },
    Capsule { radius: f32, height: f32 },
    Cone { radius: f32, height: f32 },
    TriangleMesh { triangles: Vec<[Vec3; 3]> },
    ConvexHull { points: Vec<Vec3> },
    Heightfield {
        columns: u32,
        rows: u32,
        heights: Vec<f32>,
        min_height: f32,
        max_height: f32,
        cell_scale: Vec3,
    },
}

/// Construction info for a rigid body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidBodySetup {
    pub mass: f32,
    pub motion_state: MotionStateHandle,
    pub shape: ShapeHandle,
    pub local_inertia: Vec3,
    pub friction: f32,
    pub restitution: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
}

/// Source geometry of a soft body.
#[derive(Debug, Clone, PartialEq)]
pub enum SoftGeometry {
    Trimesh {
        vertices: Vec<Vec3>,
        indices: Vec<[u32; 3]>,
    },
    /// Cloth patch: corners top-left, top-right, bottom-left, bottom-right.
    Patch {
        corners: [Vec3; 4],
        resolution: [u32; 2],
        fixed_corners: u32,
    },
    Rope {
        start: Vec3,
        end: Vec3,
        segments: u32,
        fixed_ends: u32,
    },
}

impl SoftGeometry {
    pub fn kind(&self) -> SoftKind {
        match self {
            SoftGeometry::Trimesh { .. } => SoftKind::Trimesh,
            SoftGeometry::Patch { .. } => SoftKind::Cloth,
            SoftGeometry::Rope { .. } => SoftKind::Rope,
        }
    }
}

/// Soft-body material applied after construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftMaterial {
    pub params: SoftBodyParams,
    pub friction: f32,
    pub damping: f32,
    pub margin: f32,
}

/// Node of a soft body as exposed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SoftNode {
    pub position: Vec3,
    pub normal: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintSetup {
    pub kind: ConstraintKind,
    pub body_a: BodyHandle,
    pub body_b: Option<BodyHandle>,
    /// Pivot in body A's local frame.
    pub pivot_a: Vec3,
    /// Pivot in body B's local frame, or a world anchor when there is no body B.
    pub pivot_b: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    /// Contact normal on body 1, pointing towards body 0.
    pub normal_world_on_b: Vec3,
    pub position_world_on_a: Vec3,
    pub position_world_on_b: Vec3,
    /// Signed separation; negative when penetrating.
    pub distance: f32,
    pub applied_impulse: f32,
}

/// Contact points between one pair of bodies after the last step.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactManifold {
    pub body0: BodyHandle,
    pub body1: BodyHandle,
    pub points: Vec<ContactPoint>,
}

/// Operations the worker needs from a native physics engine.
pub trait NativeEngine: Send {
    fn name(&self) -> &str;

    // world
    fn create_world(&mut self, config: &WorldConfig);
    fn set_gravity(&mut self, gravity: Vec3);
    /// Advances by `time_step`, running at most `max_sub_steps` fixed substeps.
    /// Returns the number of substeps taken.
    fn step_simulation(&mut self, time_step: f32, max_sub_steps: u32, fixed_time_step: f32)
        -> u32;
    /// Drops any accumulated, not yet simulated time.
    fn reset_accumulator(&mut self);

    // shapes
    fn create_shape(&mut self, geometry: ShapeGeometry) -> ShapeHandle;
    fn add_child_shape(&mut self, compound: ShapeHandle, child: ShapeHandle, offset: Transform);
    fn set_local_scaling(&mut self, shape: ShapeHandle, scale: Vec3);
    fn set_margin(&mut self, shape: ShapeHandle, margin: f32);
    fn calculate_local_inertia(&self, shape: ShapeHandle, mass: f32) -> Vec3;
    fn destroy_shape(&mut self, shape: ShapeHandle);

    // rigid bodies
    fn create_motion_state(&mut self, transform: Transform) -> MotionStateHandle;
    fn destroy_motion_state(&mut self, state: MotionStateHandle);
    fn create_rigid_body(&mut self, setup: &RigidBodySetup) -> BodyHandle;
    /// Adds to the world, with an explicit group/mask or the default filter.
    fn add_rigid_body(&mut self, body: BodyHandle, filter: Option<(i32, i32)>);
    fn remove_rigid_body(&mut self, body: BodyHandle);
    fn destroy_body(&mut self, body: BodyHandle);
    fn body_shape(&self, body: BodyHandle) -> Option<ShapeHandle>;

    fn set_activation_state(&mut self, body: BodyHandle, state: ActivationState);
    fn activate(&mut self, body: BodyHandle);
    fn is_active(&self, body: BodyHandle) -> bool;
    fn set_collision_flags(&mut self, body: BodyHandle, flags: u32);
    fn world_transform(&self, body: BodyHandle) -> Transform;
    fn set_world_transform(&mut self, body: BodyHandle, transform: Transform);
    fn velocity(&self, body: BodyHandle) -> Velocity;
    fn set_linear_velocity(&mut self, body: BodyHandle, velocity: Vec3);
    fn set_angular_velocity(&mut self, body: BodyHandle, velocity: Vec3);
    fn set_linear_factor(&mut self, body: BodyHandle, factor: Vec3);
    fn set_angular_factor(&mut self, body: BodyHandle, factor: Vec3);
    fn set_damping(&mut self, body: BodyHandle, linear: f32, angular: f32);
    fn set_ccd_motion_threshold(&mut self, body: BodyHandle, threshold: f32);
    fn set_ccd_swept_sphere_radius(&mut self, body: BodyHandle, radius: f32);
    fn set_mass_props(&mut self, body: BodyHandle, mass: f32, inertia: Vec3);

    fn apply_central_impulse(&mut self, body: BodyHandle, impulse: Vec3);
    fn apply_impulse(&mut self, body: BodyHandle, impulse: Vec3, relative_position: Vec3);
    fn apply_torque(&mut self, body: BodyHandle, torque: Vec3);
    fn apply_central_force(&mut self, body: BodyHandle, force: Vec3);
    fn apply_force(&mut self, body: BodyHandle, force: Vec3, relative_position: Vec3);

    // soft bodies
    /// Returns `None` when the geometry is empty.
    fn create_soft_body(&mut self, geometry: &SoftGeometry) -> Option<BodyHandle>;
    fn configure_soft_body(&mut self, body: BodyHandle, material: &SoftMaterial);
    /// Bakes rotation, scale and translation into the node positions.
    fn transform_soft_body(&mut self, body: BodyHandle, transform: Transform, scale: Vec3);
    fn set_soft_total_mass(&mut self, body: BodyHandle, mass: f32);
    fn add_soft_body(&mut self, body: BodyHandle, group: i32, mask: i32);
    fn remove_soft_body(&mut self, body: BodyHandle);
    fn soft_nodes(&self, body: BodyHandle) -> Vec<SoftNode>;
    fn soft_faces(&self, body: BodyHandle) -> Vec<[usize; 3]>;
    fn append_anchor(
        &mut self,
        body: BodyHandle,
        node: usize,
        rigid: BodyHandle,
        disable_collision: bool,
        influence: f32,
    );
    fn append_link(&mut self, body: BodyHandle, node_a: usize, node_b: usize);
    fn link_nodes(&mut self, body_a: BodyHandle, node_a: usize, body_b: BodyHandle, node_b: usize);

    // constraints
    fn create_constraint(&mut self, setup: &ConstraintSetup) -> ConstraintHandle;
    fn add_constraint(&mut self, constraint: ConstraintHandle, disable_collision: bool);
    fn remove_constraint(&mut self, constraint: ConstraintHandle);
    fn destroy_constraint(&mut self, constraint: ConstraintHandle);
    fn apply_joint_op(&mut self, constraint: ConstraintHandle, op: &JointOp);
    fn set_breaking_impulse_threshold(&mut self, constraint: ConstraintHandle, threshold: f32);
    fn breaking_impulse_threshold(&self, constraint: ConstraintHandle) -> f32;

    // vehicles
    fn create_vehicle(&mut self, chassis: BodyHandle, tuning: &VehicleTuning) -> VehicleHandle;
    fn add_vehicle(&mut self, vehicle: VehicleHandle);
    fn remove_vehicle(&mut self, vehicle: VehicleHandle);
    fn destroy_vehicle(&mut self, vehicle: VehicleHandle);
    fn add_wheel(&mut self, vehicle: VehicleHandle, wheel: &WheelDescription) -> usize;
    fn set_steering(&mut self, vehicle: VehicleHandle, wheel: usize, steering: f32);
    fn set_brake(&mut self, vehicle: VehicleHandle, wheel: usize, brake: f32);
    fn apply_engine_force(&mut self, vehicle: VehicleHandle, wheel: usize, force: f32);
    fn wheel_count(&self, vehicle: VehicleHandle) -> usize;
    fn wheel_transform(&self, vehicle: VehicleHandle, wheel: usize) -> Transform;

    /// Manifolds produced by the last substep.
    fn manifolds(&self) -> &[ContactManifold];

    /// Native resources currently alive.
    fn live_resources(&self) -> ResourceCounts;
}

/// Loads the native engine in response to `init`.
///
/// The script location and binary in the config are opaque here; a loader
/// may use them or ignore them.
pub trait EngineLoader: Send {
    fn load(&self, config: &WorldConfig) -> Result<Box<dyn NativeEngine>>;
}

impl<F> EngineLoader for F
where
    F: Fn(&WorldConfig) -> Result<Box<dyn NativeEngine>> + Send,
{
    fn load(&self, config: &WorldConfig) -> Result<Box<dyn NativeEngine>> {
        self(config)
    }
}

