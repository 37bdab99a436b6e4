use glam::Vec3;

use crate::config::{DEFAULT_COLLISION_GROUP, DEFAULT_COLLISION_MASK};
use crate::core::{ActivationState, Transform, Velocity};
use crate::native::{MotionStateHandle, RigidBodySetup, ShapeHandle};
use crate::utils::math::safe_recip;

pub const COLLISION_FLAG_STATIC: u32 = 1;
pub const COLLISION_FLAG_KINEMATIC: u32 = 2;
pub const COLLISION_FLAG_NO_CONTACT_RESPONSE: u32 = 4;

const SLEEP_LINEAR_THRESHOLD: f32 = 0.8;
const SLEEP_ANGULAR_THRESHOLD: f32 = 1.0;
const TIME_TO_SLEEP: f32 = 2.0;

/// Simulation state of one rigid body inside the reference engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidState {
    pub shape: ShapeHandle,
    pub motion_state: MotionStateHandle,
    pub transform: Transform,
    pub velocity: Velocity,
    pub force: Vec3,
    pub torque: Vec3,
    pub mass: f32,
    pub inverse_mass: f32,
    /// Diagonal of the inverse inertia tensor in body space.
    pub inverse_inertia: Vec3,
    pub friction: f32,
    pub restitution: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub linear_factor: Vec3,
    pub angular_factor: Vec3,
    pub activation: ActivationState,
    pub sleep_timer: f32,
    pub collision_flags: u32,
    pub group: i32,
    pub mask: i32,
    pub in_world: bool,
    pub ccd_motion_threshold: f32,
    pub ccd_swept_sphere_radius: f32,
}

impl RigidState {
    pub fn new(setup: &RigidBodySetup, transform: Transform) -> Self {
        let mut state = Self {
            shape: setup.shape,
            motion_state: setup.motion_state,
            transform,
            velocity: Velocity::default(),
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            mass: 0.0,
            inverse_mass: 0.0,
            inverse_inertia: Vec3::ZERO,
            friction: setup.friction,
            restitution: setup.restitution,
            linear_damping: setup.linear_damping,
            angular_damping: setup.angular_damping,
            linear_factor: Vec3::ONE,
            angular_factor: Vec3::ONE,
            activation: ActivationState::Active,
            sleep_timer: 0.0,
            collision_flags: 0,
            group: DEFAULT_COLLISION_GROUP,
            mask: DEFAULT_COLLISION_MASK,
            in_world: false,
            ccd_motion_threshold: 0.0,
            ccd_swept_sphere_radius: 0.0,
        };
        state.set_mass_props(setup.mass, setup.local_inertia);
        state
    }

    /// Zero mass keeps the body static, with infinite mass and inertia.
    pub fn set_mass_props(&mut self, mass: f32, inertia: Vec3) {
        self.mass = mass.max(0.0);
        self.inverse_mass = safe_recip(self.mass);
        self.inverse_inertia = Vec3::new(
            safe_recip(inertia.x),
            safe_recip(inertia.y),
            safe_recip(inertia.z),
        );
        if self.mass == 0.0 {
            self.collision_flags |= COLLISION_FLAG_STATIC;
        } else {
            self.collision_flags &= !COLLISION_FLAG_STATIC;
        }
    }

    pub fn set_collision_flags(&mut self, flags: u32) {
        self.collision_flags = flags;
        if self.mass == 0.0 {
            self.collision_flags |= COLLISION_FLAG_STATIC;
        }
    }

    /// Static or kinematic: never moved by the solver.
    pub fn is_static(&self) -> bool {
        self.inverse_mass == 0.0
            || self.collision_flags & (COLLISION_FLAG_STATIC | COLLISION_FLAG_KINEMATIC) != 0
    }

    pub fn is_awake(&self) -> bool {
        !matches!(
            self.activation,
            ActivationState::IslandSleeping | ActivationState::DisableSimulation
        )
    }

    pub fn has_contact_response(&self) -> bool {
        self.collision_flags & COLLISION_FLAG_NO_CONTACT_RESPONSE == 0
    }

    /// Moves the body by solver impulses this substep.
    pub fn is_simulated(&self) -> bool {
        self.in_world && !self.is_static() && self.is_awake()
    }

    /// Ignored while deactivation or simulation is disabled, as in the native engine.
    pub fn set_activation_state(&mut self, state: ActivationState) {
        if matches!(
            self.activation,
            ActivationState::DisableDeactivation | ActivationState::DisableSimulation
        ) {
            return;
        }
        self.activation = state;
    }

    pub fn activate(&mut self) {
        if !matches!(
            self.activation,
            ActivationState::DisableDeactivation | ActivationState::DisableSimulation
        ) {
            self.activation = ActivationState::Active;
        }
        self.sleep_timer = 0.0;
    }

    pub fn inverse_inertia_world(&self, vector: Vec3) -> Vec3 {
        let rotation = self.transform.rotation;
        rotation * (self.inverse_inertia * (rotation.conjugate() * vector))
    }

    pub fn velocity_at(&self, relative_position: Vec3) -> Vec3 {
        self.velocity.at_offset(relative_position)
    }

    pub fn apply_central_impulse(&mut self, impulse: Vec3) {
        self.velocity.linear += impulse * self.inverse_mass * self.linear_factor;
    }

    pub fn apply_torque_impulse(&mut self, torque: Vec3) {
        self.velocity.angular += self.inverse_inertia_world(torque) * self.angular_factor;
    }

    pub fn apply_impulse(&mut self, impulse: Vec3, relative_position: Vec3) {
        if self.inverse_mass == 0.0 {
            return;
        }
        self.apply_central_impulse(impulse);
        self.apply_torque_impulse(relative_position.cross(impulse * self.linear_factor));
    }

    pub fn apply_central_force(&mut self, force: Vec3) {
        self.force += force * self.linear_factor;
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        self.torque += torque * self.angular_factor;
    }

    pub fn apply_force(&mut self, force: Vec3, relative_position: Vec3) {
        self.apply_central_force(force);
        self.apply_torque(relative_position.cross(force * self.linear_factor));
    }

    pub fn clear_forces(&mut self) {
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
    }

    /// Effective inverse mass of the body along `direction` at `relative_position`.
    pub fn inverse_mass_along(&self, relative_position: Vec3, direction: Vec3) -> f32 {
        if self.is_static() {
            return 0.0;
        }
        let arm = relative_position.cross(direction);
        self.inverse_mass + self.inverse_inertia_world(arm).cross(relative_position).dot(direction)
    }

    /// Advances the sleep timer; puts the body to sleep once it has been slow long enough.
    pub fn update_sleep(&mut self, dt: f32) {
        if self.is_static()
            || matches!(
                self.activation,
                ActivationState::DisableDeactivation
                    | ActivationState::DisableSimulation
                    | ActivationState::IslandSleeping
            )
        {
            return;
        }
        if self.velocity.linear.length() < SLEEP_LINEAR_THRESHOLD
            && self.velocity.angular.length() < SLEEP_ANGULAR_THRESHOLD
        {
            self.sleep_timer += dt;
        } else {
            self.sleep_timer = 0.0;
            self.activation = ActivationState::Active;
        }
        if self.sleep_timer > TIME_TO_SLEEP {
            self.activation = ActivationState::IslandSleeping;
            self.velocity = Velocity::default();
        } else if self.sleep_timer > TIME_TO_SLEEP * 0.5 {
            self.activation = ActivationState::WantsDeactivation;
        }
    }
}

/// Mutable access to two distinct slice elements.
pub fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> Option<(&mut T, &mut T)> {
    if a == b || a >= items.len() || b >= items.len() {
        return None;
    }
    if a < b {
        let (left, right) = items.split_at_mut(b);
        Some((&mut left[a], &mut right[0]))
    } else {
        let (left, right) = items.split_at_mut(a);
        Some((&mut right[0], &mut left[b]))
    }
}
