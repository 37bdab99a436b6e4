use glam::Vec3;

use super::rigid::{pair_mut, RigidState};
use crate::native::BodyHandle;

/// Closing speeds below this do not bounce.
const RESTITUTION_VELOCITY_THRESHOLD: f32 = 0.5;

/// Contact between two bodies, addressed by their index in the step's body list.
#[derive(Debug, Clone)]
pub struct Contact {
    pub body_a: usize,
    pub body_b: usize,
    /// Normal on B pointing towards A.
    pub normal: Vec3,
    pub point_a: Vec3,
    pub point_b: Vec3,
    pub distance: f32,
    pub friction: f32,
    /// Target normal velocity from restitution, fixed when the contact is created.
    pub bounce: f32,
    pub accumulated_normal_impulse: f32,
}

impl Contact {
    pub fn new(
        bodies: &[(BodyHandle, RigidState)],
        body_a: usize,
        body_b: usize,
        normal: Vec3,
        point_a: Vec3,
        point_b: Vec3,
        distance: f32,
    ) -> Self {
        let a = &bodies[body_a].1;
        let b = &bodies[body_b].1;
        let r_a = point_a - a.transform.position;
        let r_b = point_b - b.transform.position;
        let closing = (a.velocity_at(r_a) - b.velocity_at(r_b)).dot(normal);
        let restitution = a.restitution * b.restitution;
        let bounce = if -closing > RESTITUTION_VELOCITY_THRESHOLD {
            -closing * restitution
        } else {
            0.0
        };
        Self {
            body_a,
            body_b,
            normal,
            point_a,
            point_b,
            distance,
            friction: a.friction * b.friction,
            bounce,
            accumulated_normal_impulse: 0.0,
        }
    }
}

/// Sequential-impulse contact solver.
#[derive(Debug, Clone)]
pub struct ContactSolver {
    pub iterations: u32,
    pub slop: f32,
    pub correction: f32,
}

impl Default for ContactSolver {
    fn default() -> Self {
        Self {
            iterations: 10,
            slop: 0.005,
            correction: 0.8,
        }
    }
}

impl ContactSolver {
    pub fn solve_velocities(
        &self,
        bodies: &mut [(BodyHandle, RigidState)],
        contacts: &mut [Contact],
        dt: f32,
    ) {
        for _ in 0..self.iterations {
            for contact in contacts.iter_mut() {
                if let Some(((_, a), (_, b))) = pair_mut(bodies, contact.body_a, contact.body_b) {
                    Self::resolve_contact(a, b, contact, dt);
                }
            }
        }
    }

    fn resolve_contact(a: &mut RigidState, b: &mut RigidState, contact: &mut Contact, dt: f32) {
        if a.is_static() && b.is_static() {
            return;
        }
        let r_a = contact.point_a - a.transform.position;
        let r_b = contact.point_b - b.transform.position;
        let relative_vel = a.velocity_at(r_a) - b.velocity_at(r_b);
        let vel_along_normal = relative_vel.dot(contact.normal);

        // speculative contacts may close the remaining gap but not cross it
        let target = if contact.distance > 0.0 {
            -contact.distance / dt
        } else {
            contact.bounce
        };

        let k = a.inverse_mass_along(r_a, contact.normal) + b.inverse_mass_along(r_b, contact.normal);
        if k <= 1e-9 {
            return;
        }
        let lambda = (target - vel_along_normal) / k;
        let accumulated = (contact.accumulated_normal_impulse + lambda).max(0.0);
        let delta = accumulated - contact.accumulated_normal_impulse;
        contact.accumulated_normal_impulse = accumulated;

        let impulse = contact.normal * delta;
        if !a.is_static() {
            a.apply_impulse(impulse, r_a);
        }
        if !b.is_static() {
            b.apply_impulse(-impulse, r_b);
        }

        Self::apply_friction(a, b, contact, r_a, r_b);
    }

    fn apply_friction(
        a: &mut RigidState,
        b: &mut RigidState,
        contact: &Contact,
        r_a: Vec3,
        r_b: Vec3,
    ) {
        let normal_impulse = contact.accumulated_normal_impulse;
        if normal_impulse <= f32::EPSILON {
            return;
        }
        let relative_vel = a.velocity_at(r_a) - b.velocity_at(r_b);
        let tangent_velocity = relative_vel - contact.normal * relative_vel.dot(contact.normal);
        let speed = tangent_velocity.length();
        if speed < 1e-6 {
            return;
        }
        let tangent = tangent_velocity / speed;
        let k = a.inverse_mass_along(r_a, tangent) + b.inverse_mass_along(r_b, tangent);
        if k <= 1e-9 {
            return;
        }
        let magnitude = (speed / k).min(contact.friction * normal_impulse);
        let impulse = -tangent * magnitude;
        if !a.is_static() {
            a.apply_impulse(impulse, r_a);
        }
        if !b.is_static() {
            b.apply_impulse(-impulse, r_b);
        }
    }

    /// Pushes penetrating bodies apart, split by inverse mass.
    ///
    /// Depths are reduced by what earlier contacts already pushed, so several
    /// points of one manifold do not add up their corrections.
    pub fn correct_positions(&self, bodies: &mut [(BodyHandle, RigidState)], contacts: &[Contact]) {
        let start: Vec<Vec3> = bodies.iter().map(|(_, s)| s.transform.position).collect();
        for contact in contacts {
            let Some(((_, a), (_, b))) = pair_mut(bodies, contact.body_a, contact.body_b) else {
                continue;
            };
            let moved = ((a.transform.position - start[contact.body_a])
                - (b.transform.position - start[contact.body_b]))
                .dot(contact.normal);
            let inv_a = if a.is_static() { 0.0 } else { a.inverse_mass };
            let inv_b = if b.is_static() { 0.0 } else { b.inverse_mass };
            let total_inv_mass = inv_a + inv_b;
            if total_inv_mass <= 1e-6 {
                continue;
            }
            let depth = -contact.distance - moved;
            let correction = (depth - self.slop).max(0.0) * self.correction;
            if correction <= 0.0 {
                continue;
            }
            let push = contact.normal * (correction / total_inv_mass);
            a.transform.position += push * inv_a;
            b.transform.position -= push * inv_b;
        }
    }
}
