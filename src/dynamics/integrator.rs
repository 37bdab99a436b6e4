use glam::{Quat, Vec3};

use super::rigid::RigidState;

/// Semi-implicit Euler integrator for rigid bodies.
#[derive(Debug, Clone)]
pub struct Integrator {
    pub gravity: Vec3,
}

impl Integrator {
    pub fn new(gravity: Vec3) -> Self {
        Self { gravity }
    }

    /// Applies gravity and accumulated forces, then damping.
    ///
    /// Forces stay applied for every substep until the engine clears them.
    pub fn integrate_velocity(&self, body: &mut RigidState, dt: f32) {
        if !body.is_simulated() {
            return;
        }

        let acceleration = self.gravity * body.linear_factor + body.force * body.inverse_mass;
        body.velocity.linear += acceleration * dt;
        let angular_acceleration = body.inverse_inertia_world(body.torque) * body.angular_factor;
        body.velocity.angular += angular_acceleration * dt;

        body.velocity.linear *= (1.0 - body.linear_damping * dt).max(0.0);
        body.velocity.angular *= (1.0 - body.angular_damping * dt).max(0.0);
    }

    pub fn integrate_position(&self, body: &mut RigidState, dt: f32) {
        if !body.is_simulated() {
            return;
        }

        body.transform.position += body.velocity.linear * dt;

        let omega_mag = body.velocity.angular.length();
        if omega_mag > 1e-6 {
            let axis = body.velocity.angular / omega_mag;
            let delta = Quat::from_axis_angle(axis, omega_mag * dt);
            body.transform.rotation = (delta * body.transform.rotation).normalize();
        }
    }
}
