use glam::{Quat, Vec3};

use super::rigid::RigidState;
use crate::collision::{Proxy, Raycast, RaycastQuery};
use crate::core::{Transform, VehicleTuning, WheelDescription};
use crate::native::BodyHandle;

/// Suspension travel in the tuning is given in centimetres.
const TRAVEL_UNITS: f32 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct Wheel {
    pub description: WheelDescription,
    pub steering: f32,
    pub brake: f32,
    pub engine_force: f32,
    pub suspension_length: f32,
    pub suspension_force: f32,
    pub in_contact: bool,
    /// Accumulated spin about the axle.
    pub rotation: f32,
    pub world: Transform,
}

impl Wheel {
    fn new(description: WheelDescription) -> Self {
        Self {
            description,
            steering: 0.0,
            brake: 0.0,
            engine_force: 0.0,
            suspension_length: description.suspension_rest_length,
            suspension_force: 0.0,
            in_contact: false,
            rotation: 0.0,
            world: Transform::default(),
        }
    }

    fn travel_bounds(&self) -> (f32, f32) {
        let rest = self.description.suspension_rest_length;
        let travel = self.description.tuning.max_suspension_travel * TRAVEL_UNITS;
        ((rest - travel).max(0.0), rest + travel)
    }
}

/// Frame of one wheel in world space.
struct WheelFrame {
    hard_point: Vec3,
    direction: Vec3,
    axle: Vec3,
    forward: Vec3,
}

fn wheel_frame(chassis: &Transform, wheel: &Wheel) -> WheelFrame {
    let description = &wheel.description;
    let hard_point = chassis.transform_point(description.connection_point);
    let direction = (chassis.rotation * description.wheel_direction).normalize_or(Vec3::NEG_Y);
    let steer = Quat::from_axis_angle(-direction, wheel.steering);
    let axle = (steer * (chassis.rotation * description.wheel_axle)).normalize_or(Vec3::NEG_X);
    WheelFrame {
        hard_point,
        direction,
        axle,
        forward: axle.cross(direction).normalize_or(Vec3::Z),
    }
}

/// Raycast vehicle: a chassis body carried by suspension rays.
#[derive(Debug, Clone, PartialEq)]
pub struct RaycastVehicle {
    pub chassis: BodyHandle,
    pub tuning: VehicleTuning,
    pub wheels: Vec<Wheel>,
    pub in_world: bool,
}

impl RaycastVehicle {
    pub fn new(chassis: BodyHandle, tuning: VehicleTuning) -> Self {
        Self {
            chassis,
            tuning,
            wheels: Vec::new(),
            in_world: false,
        }
    }

    /// Returns the new wheel's index.
    pub fn add_wheel(&mut self, description: WheelDescription, chassis: &Transform) -> usize {
        let mut wheel = Wheel::new(description);
        wheel.world = Self::pose(chassis, &wheel);
        self.wheels.push(wheel);
        self.wheels.len() - 1
    }

    pub fn wheel_mut(&mut self, index: usize) -> Option<&mut Wheel> {
        self.wheels.get_mut(index)
    }

    fn pose(chassis: &Transform, wheel: &Wheel) -> Transform {
        let frame = wheel_frame(chassis, wheel);
        let steer = Quat::from_axis_angle(-frame.direction, wheel.steering);
        let spin = Quat::from_axis_angle(frame.axle, -wheel.rotation);
        Transform::new(
            frame.hard_point + frame.direction * wheel.suspension_length,
            (spin * steer * chassis.rotation).normalize(),
        )
    }

    /// Runs suspension, drive and tyre friction for one substep.
    pub fn update(&mut self, chassis: &mut RigidState, obstacles: &[(BodyHandle, Proxy)], dt: f32) {
        if !self.in_world || self.wheels.is_empty() {
            return;
        }
        let share = chassis.mass / self.wheels.len() as f32;
        for wheel in &mut self.wheels {
            let frame = wheel_frame(&chassis.transform, wheel);
            let radius = wheel.description.wheel_radius;
            let query = RaycastQuery {
                origin: frame.hard_point,
                direction: frame.direction,
                max_distance: wheel.description.suspension_rest_length + radius,
            };
            let (min_length, max_length) = wheel.travel_bounds();
            let hit = Raycast::closest(&query, obstacles, Some(self.chassis));
            wheel.in_contact = hit.is_some();
            wheel.suspension_force = 0.0;
            let Some(hit) = hit else {
                wheel.suspension_length = wheel.description.suspension_rest_length;
                wheel.world = Self::pose(&chassis.transform, wheel);
                continue;
            };
            wheel.suspension_length = (hit.distance - radius).clamp(min_length, max_length);

            let arm = frame.hard_point - chassis.transform.position;
            let up = -frame.direction;
            let tuning = &wheel.description.tuning;
            let compression = wheel.description.suspension_rest_length - wheel.suspension_length;
            let closing = chassis.velocity_at(arm).dot(up);
            let damping = if closing < 0.0 {
                tuning.suspension_compression
            } else {
                tuning.suspension_damping
            };
            let force = ((tuning.suspension_stiffness * compression - damping * closing) * share)
                .clamp(0.0, tuning.max_suspension_force.max(0.0));
            wheel.suspension_force = force;

            if !chassis.is_static() {
                chassis.apply_impulse(up * force * dt, arm);

                let contact_arm = hit.point - chassis.transform.position;
                let velocity = chassis.velocity_at(contact_arm);
                chassis.apply_impulse(frame.forward * wheel.engine_force * dt, contact_arm);

                let rolling = velocity.dot(frame.forward);
                let brake_limit = wheel.brake.abs() * dt;
                let brake = (-rolling * share).clamp(-brake_limit, brake_limit);
                chassis.apply_impulse(frame.forward * brake, contact_arm);

                let lateral = velocity.dot(frame.axle);
                let grip = tuning.friction_slip.abs() * force * dt;
                let side = (-lateral * share).clamp(-grip, grip);
                chassis.apply_impulse(frame.axle * side, contact_arm);
            }

            let rolling = chassis.velocity_at(arm).dot(frame.forward);
            if radius > 0.0 {
                wheel.rotation += rolling * dt / radius;
            }
            wheel.world = Self::pose(&chassis.transform, wheel);
        }
    }

    /// Recomputes wheel poses without simulating, e.g. after the chassis was teleported.
    pub fn refresh_transforms(&mut self, chassis: &Transform) {
        for wheel in &mut self.wheels {
            wheel.world = Self::pose(chassis, wheel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::Primitive;
    use crate::native::{MotionStateHandle, RigidBodySetup, ShapeHandle};
    use approx::assert_relative_eq;

    fn chassis(height: f32) -> RigidState {
        let mut body = RigidState::new(
            &RigidBodySetup {
                mass: 800.0,
                motion_state: MotionStateHandle(1),
                shape: ShapeHandle(1),
                local_inertia: Vec3::splat(400.0),
                friction: 0.5,
                restitution: 0.0,
                linear_damping: 0.0,
                angular_damping: 0.0,
            },
            Transform::from_position(Vec3::new(0.0, height, 0.0)),
        );
        body.in_world = true;
        body
    }

    fn ground() -> Vec<(BodyHandle, Proxy)> {
        vec![(
            BodyHandle(2),
            Proxy::new(Primitive::Plane { normal: Vec3::Y }, Transform::default()),
        )]
    }

    fn vehicle(body: &RigidState) -> RaycastVehicle {
        let mut vehicle = RaycastVehicle::new(BodyHandle(1), VehicleTuning::default());
        vehicle.in_world = true;
        vehicle.add_wheel(WheelDescription::new(Vec3::ZERO, 0.5, 0.4), &body.transform);
        vehicle
    }

    #[test]
    fn compressed_suspension_pushes_up() {
        let mut body = chassis(0.8);
        let mut car = vehicle(&body);
        car.update(&mut body, &ground(), 1.0 / 60.0);
        assert!(car.wheels[0].in_contact);
        assert!(car.wheels[0].suspension_force > 0.0);
        assert!(body.velocity.linear.y > 0.0);
        assert_relative_eq!(car.wheels[0].world.position.y, 0.4, epsilon = 1e-4);
    }

    #[test]
    fn airborne_wheel_hangs_at_rest_length() {
        let mut body = chassis(5.0);
        let mut car = vehicle(&body);
        car.update(&mut body, &ground(), 1.0 / 60.0);
        assert!(!car.wheels[0].in_contact);
        assert_relative_eq!(car.wheels[0].world.position.y, 4.5, epsilon = 1e-4);
    }

    #[test]
    fn engine_force_drives_forward() {
        let mut body = chassis(0.8);
        let mut car = vehicle(&body);
        car.wheel_mut(0).unwrap().engine_force = 2000.0;
        car.update(&mut body, &ground(), 1.0 / 60.0);
        assert!(body.velocity.linear.z > 0.0);
    }
}
