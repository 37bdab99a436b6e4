use glam::{Quat, Vec3};
use log::debug;

use super::rigid::RigidState;
use crate::core::{ConstraintKind, JointOp, Limits, Motor};
use crate::native::{BodyHandle, ConstraintSetup};

/// Fraction of the positional error fed back into the velocity target each substep.
const BAUMGARTE: f32 = 0.2;

/// Stored limit and motor settings, written by [`JointOp`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct JointSettings {
    pub hinge_limits: Option<Limits>,
    pub hinge_softness: (f32, f32),
    pub hinge_motor: Option<Motor>,
    pub slider_linear_limits: Option<Limits>,
    pub slider_angular_limits: Option<Limits>,
    pub slider_restitution: (f32, f32),
    pub slider_linear_motor: Option<Motor>,
    pub slider_angular_motor: Option<Motor>,
    /// Swing 1, swing 2 and twist spans.
    pub cone_limits: Option<(f32, f32, f32)>,
    pub cone_motor_enabled: bool,
    pub cone_max_motor_impulse: f32,
    pub cone_motor_target: Quat,
    pub dof_linear_lower: Vec3,
    pub dof_linear_upper: Vec3,
    pub dof_angular_lower: Vec3,
    pub dof_angular_upper: Vec3,
    pub dof_motors: [Option<Motor>; 3],
    pub dof_motor_enabled: [bool; 3],
    pub dof_motor_limits: [Option<Limits>; 3],
}

impl Default for JointSettings {
    fn default() -> Self {
        Self {
            hinge_limits: None,
            hinge_softness: (0.3, 1.0),
            hinge_motor: None,
            slider_linear_limits: None,
            slider_angular_limits: None,
            slider_restitution: (0.0, 0.0),
            slider_linear_motor: None,
            slider_angular_motor: None,
            cone_limits: None,
            cone_motor_enabled: false,
            cone_max_motor_impulse: f32::MAX,
            cone_motor_target: Quat::IDENTITY,
            dof_linear_lower: Vec3::ZERO,
            dof_linear_upper: Vec3::ZERO,
            dof_angular_lower: Vec3::ZERO,
            dof_angular_upper: Vec3::ZERO,
            dof_motors: [None; 3],
            dof_motor_enabled: [false; 3],
            dof_motor_limits: [None; 3],
        }
    }
}

/// Two-body (or body-to-world) joint solved at the velocity level.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub kind: ConstraintKind,
    pub body_a: BodyHandle,
    pub body_b: Option<BodyHandle>,
    pub pivot_a: Vec3,
    pub pivot_b: Vec3,
    pub enabled: bool,
    pub in_world: bool,
    pub disable_collision: bool,
    pub breaking_threshold: f32,
    /// Linear impulse spent by the last substep.
    pub applied_impulse: f32,
    pub settings: JointSettings,
}

impl Joint {
    pub fn new(setup: &ConstraintSetup) -> Self {
        Self {
            kind: setup.kind,
            body_a: setup.body_a,
            body_b: setup.body_b,
            pivot_a: setup.pivot_a,
            pivot_b: setup.pivot_b,
            enabled: true,
            in_world: false,
            disable_collision: false,
            breaking_threshold: f32::MAX,
            applied_impulse: 0.0,
            settings: JointSettings::default(),
        }
    }

    /// Whether this joint suppresses contacts between `a` and `b`.
    pub fn ignores_pair(&self, a: BodyHandle, b: BodyHandle) -> bool {
        self.in_world
            && self.disable_collision
            && self.body_b.is_some_and(|body_b| {
                (self.body_a == a && body_b == b) || (self.body_a == b && body_b == a)
            })
    }

    pub fn apply(&mut self, op: &JointOp) {
        let settings = &mut self.settings;
        match *op {
            JointOp::HingeLimits {
                limits,
                bias_factor,
                relaxation_factor,
            } => {
                settings.hinge_limits = Some(limits);
                settings.hinge_softness = (bias_factor, relaxation_factor);
            }
            JointOp::HingeMotor(motor) => settings.hinge_motor = motor,
            JointOp::SliderLimits { linear, angular } => {
                settings.slider_linear_limits = Some(linear);
                settings.slider_angular_limits = Some(angular);
            }
            JointOp::SliderRestitution { linear, angular } => {
                settings.slider_restitution = (linear, angular)
            }
            JointOp::SliderLinearMotor(motor) => settings.slider_linear_motor = motor,
            JointOp::SliderAngularMotor(motor) => settings.slider_angular_motor = motor,
            JointOp::ConetwistLimit {
                swing1,
                swing2,
                twist,
            } => settings.cone_limits = Some((swing1, swing2, twist)),
            JointOp::ConetwistMotorEnabled(enabled) => settings.cone_motor_enabled = enabled,
            JointOp::ConetwistMaxMotorImpulse(max) => settings.cone_max_motor_impulse = max,
            JointOp::ConetwistMotorTarget(target) => settings.cone_motor_target = target,
            JointOp::DofLinearLowerLimit(limit) => settings.dof_linear_lower = limit,
            JointOp::DofLinearUpperLimit(limit) => settings.dof_linear_upper = limit,
            JointOp::DofAngularLowerLimit(limit) => settings.dof_angular_lower = limit,
            JointOp::DofAngularUpperLimit(limit) => settings.dof_angular_upper = limit,
            JointOp::DofAngularMotorEnabled { axis, enabled } => {
                if let Some(slot) = settings.dof_motor_enabled.get_mut(axis) {
                    *slot = enabled;
                }
            }
            JointOp::DofConfigureAngularMotor {
                axis,
                limits,
                motor,
            } => {
                if axis < 3 {
                    settings.dof_motors[axis] = Some(motor);
                    settings.dof_motor_limits[axis] = Some(limits);
                }
            }
        }
    }

    /// World-space pivots of body A and body B (or the world anchor).
    pub fn world_pivots(&self, a: &RigidState, b: Option<&RigidState>) -> (Vec3, Vec3) {
        let pivot_a = a.transform.transform_point(self.pivot_a);
        let pivot_b = match b {
            Some(b) => b.transform.transform_point(self.pivot_b),
            None => self.pivot_b,
        };
        (pivot_a, pivot_b)
    }

    /// Axis directions along which relative translation is free, in world space.
    fn free_linear_axes(&self, a: &RigidState, offset: Vec3) -> Vec<(Vec3, f32)> {
        match self.kind {
            ConstraintKind::Slider { axis } => {
                let axis = (a.transform.rotation * axis).normalize_or(Vec3::X);
                let along = offset.dot(axis);
                let allowed = match self.settings.slider_linear_limits {
                    Some(limits) if limits.lower <= limits.upper => {
                        along.clamp(limits.lower, limits.upper)
                    }
                    _ => along,
                };
                vec![(axis, allowed)]
            }
            ConstraintKind::Dof { .. } => {
                let lower = self.settings.dof_linear_lower;
                let upper = self.settings.dof_linear_upper;
                (0..3)
                    .filter_map(|i| {
                        let mut unit = Vec3::ZERO;
                        unit[i] = 1.0;
                        let axis = a.transform.rotation * unit;
                        let along = offset.dot(axis);
                        if lower[i] > upper[i] {
                            Some((axis, along))
                        } else if lower[i] < upper[i] {
                            Some((axis, along.clamp(lower[i], upper[i])))
                        } else {
                            None
                        }
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// One velocity iteration. Returns `false` when the joint broke this iteration.
    pub fn solve(&mut self, a: &mut RigidState, mut b: Option<&mut RigidState>, dt: f32) -> bool {
        if !self.enabled || !self.in_world {
            return true;
        }
        let (pivot_a, pivot_b) = self.world_pivots(a, b.as_deref());
        let r_a = pivot_a - a.transform.position;
        let r_b = b
            .as_deref()
            .map(|b| pivot_b - b.transform.position)
            .unwrap_or(Vec3::ZERO);

        // positional error from pivot A to pivot B, minus what the free axes allow
        let offset = pivot_b - pivot_a;
        let mut error = offset;
        let velocity_a = a.velocity_at(r_a);
        let velocity_b = b.as_deref().map(|b| b.velocity_at(r_b)).unwrap_or(Vec3::ZERO);
        let mut relative = velocity_a - velocity_b;
        for (axis, allowed) in self.free_linear_axes(a, offset) {
            error -= axis * allowed;
            if offset.dot(axis) == allowed {
                relative -= axis * relative.dot(axis);
            }
        }

        let inv_a = if a.is_static() { 0.0 } else { a.inverse_mass };
        let inv_b = b
            .as_deref()
            .map(|b| if b.is_static() { 0.0 } else { b.inverse_mass })
            .unwrap_or(0.0);
        let total = inv_a + inv_b;
        if total > 1e-9 {
            let desired = error * (BAUMGARTE / dt);
            let impulse = (desired - relative) / total;
            self.applied_impulse = impulse.length();
            if !a.is_static() {
                a.apply_impulse(impulse, r_a);
            }
            if let Some(b) = b.as_deref_mut() {
                if !b.is_static() {
                    b.apply_impulse(-impulse, r_b);
                }
            }
        }

        self.solve_angular(a, b.as_deref_mut(), dt);

        if self.applied_impulse > self.breaking_threshold {
            debug!(
                "joint broke: impulse {:.3} > threshold {:.3}",
                self.applied_impulse, self.breaking_threshold
            );
            self.enabled = false;
            return false;
        }
        true
    }

    fn solve_angular(&mut self, a: &mut RigidState, mut b: Option<&mut RigidState>, dt: f32) {
        let rotation = a.transform.rotation;
        match self.kind {
            ConstraintKind::Hinge { axis } => {
                let axis = (rotation * axis).normalize_or(Vec3::Y);
                lock_angular_except(a, b.as_deref_mut(), Some(axis));
                if let Some(motor) = self.settings.hinge_motor {
                    drive_angular(a, b, axis, motor);
                }
            }
            ConstraintKind::Slider { axis } => {
                let axis = (rotation * axis).normalize_or(Vec3::X);
                if let Some(motor) = self.settings.slider_linear_motor {
                    drive_linear(a, b.as_deref_mut(), axis, motor);
                }
                if let Some(motor) = self.settings.slider_angular_motor {
                    drive_angular(a, b, axis, motor);
                }
            }
            ConstraintKind::Conetwist { .. } => {
                if self.settings.cone_motor_enabled {
                    let current = match b.as_deref() {
                        Some(b) => b.transform.rotation.conjugate() * a.transform.rotation,
                        None => a.transform.rotation,
                    };
                    let (axis, angle) =
                        (self.settings.cone_motor_target * current.conjugate()).to_axis_angle();
                    if angle.abs() > 1e-4 {
                        let motor = Motor {
                            velocity: wrap_angle(angle) / dt,
                            max_impulse: self.settings.cone_max_motor_impulse,
                        };
                        drive_angular(a, b, axis, motor);
                    }
                }
            }
            ConstraintKind::Dof { .. } => {
                for i in 0..3 {
                    if !self.settings.dof_motor_enabled[i] {
                        continue;
                    }
                    let Some(motor) = self.settings.dof_motors[i] else {
                        continue;
                    };
                    let mut unit = Vec3::ZERO;
                    unit[i] = 1.0;
                    drive_angular(a, b.as_deref_mut(), rotation * unit, motor);
                }
            }
            ConstraintKind::Point => {}
        }
    }
}

fn wrap_angle(angle: f32) -> f32 {
    if angle > std::f32::consts::PI {
        angle - std::f32::consts::TAU
    } else {
        angle
    }
}

fn angular_inverse_mass(body: &RigidState, axis: Vec3) -> f32 {
    if body.is_static() {
        0.0
    } else {
        body.inverse_inertia_world(axis).dot(axis)
    }
}

/// Removes relative angular velocity except around `free_axis`.
fn lock_angular_except(a: &mut RigidState, b: Option<&mut RigidState>, free_axis: Option<Vec3>) {
    let angular_b = b.as_deref().map(|b| b.velocity.angular).unwrap_or(Vec3::ZERO);
    let mut relative = a.velocity.angular - angular_b;
    if let Some(axis) = free_axis {
        relative -= axis * relative.dot(axis);
    }
    let share_a = if a.is_static() { 0.0 } else { 1.0 };
    let share_b = b
        .as_deref()
        .map(|b| if b.is_static() { 0.0 } else { 1.0 })
        .unwrap_or(0.0);
    let total = share_a + share_b;
    if total == 0.0 {
        return;
    }
    a.velocity.angular -= relative * (share_a / total);
    if let Some(b) = b {
        b.velocity.angular += relative * (share_b / total);
    }
}

fn drive_angular(a: &mut RigidState, b: Option<&mut RigidState>, axis: Vec3, motor: Motor) {
    let angular_b = b.as_deref().map(|b| b.velocity.angular).unwrap_or(Vec3::ZERO);
    let current = (a.velocity.angular - angular_b).dot(axis);
    let k = angular_inverse_mass(a, axis) + b.as_deref().map(|b| angular_inverse_mass(b, axis)).unwrap_or(0.0);
    if k <= 1e-9 {
        return;
    }
    let limit = motor.max_impulse.abs();
    let impulse = ((motor.velocity - current) / k).clamp(-limit, limit);
    if !a.is_static() {
        a.apply_torque_impulse(axis * impulse);
    }
    if let Some(b) = b {
        if !b.is_static() {
            b.apply_torque_impulse(-axis * impulse);
        }
    }
}

fn drive_linear(a: &mut RigidState, b: Option<&mut RigidState>, axis: Vec3, motor: Motor) {
    let velocity_b = b.as_deref().map(|b| b.velocity.linear).unwrap_or(Vec3::ZERO);
    let current = (a.velocity.linear - velocity_b).dot(axis);
    let inv_a = if a.is_static() { 0.0 } else { a.inverse_mass };
    let inv_b = b
        .as_deref()
        .map(|b| if b.is_static() { 0.0 } else { b.inverse_mass })
        .unwrap_or(0.0);
    if inv_a + inv_b <= 1e-9 {
        return;
    }
    let limit = motor.max_impulse.abs();
    let impulse = ((motor.velocity - current) / (inv_a + inv_b)).clamp(-limit, limit);
    if !a.is_static() {
        a.apply_central_impulse(axis * impulse);
    }
    if let Some(b) = b {
        if !b.is_static() {
            b.apply_central_impulse(-axis * impulse);
        }
    }
}
