//! Command dispatcher: one handler per worker command.

use glam::{Quat, Vec3};
use log::{debug, trace};

use super::session::Session;
use crate::core::{JointOp, Transform};
use crate::error::{BridgeError, Result};
use crate::native::{BodyHandle, NativeEngine};
use crate::protocol::{ControlMessage, FromWorker, WorkerCommand};
use crate::utils::allocator::ObjectId;

impl Session {
    /// Runs one command against the world. `init` and `makeWorld` belong to
    /// the owning [`SimulationWorld`](super::SimulationWorld) and never get here.
    pub(crate) fn dispatch(
        &mut self,
        command: WorkerCommand,
        outbox: &mut Vec<FromWorker>,
    ) -> Result<()> {
        use WorkerCommand::*;
        trace!("dispatch {}", command.name());
        match command {
            Init(_) | MakeWorld(_) => Ok(()),
            SetGravity { x, y, z } => {
                let gravity = Vec3::new(x, y, z);
                self.config.gravity = gravity;
                self.engine.set_gravity(gravity);
                Ok(())
            }
            OnSimulationResume => {
                self.engine.reset_accumulator();
                Ok(())
            }
            Simulate {
                time_step,
                max_sub_steps,
            } => {
                self.simulate(time_step, max_sub_steps, outbox);
                Ok(())
            }
            AddObject(description) => {
                self.add_object(&description)?;
                outbox.push(ControlMessage::ObjectReady(description.id).into());
                Ok(())
            }
            RemoveObject { id } => self.remove_object(id),
            AddVehicle(description) => self.add_vehicle(&description),
            RemoveVehicle { id } => self.remove_vehicle(id),
            AddWheel(description) => self.add_wheel(&description),
            AddConstraint(description) => self.add_constraint(&description),
            RemoveConstraint { id } => self.remove_constraint(id),

            UpdateTransform { id, pos, quat } => self.update_transform(id, pos, quat),
            UpdateMass { id, mass } => self.update_mass(id, mass),

            ApplyCentralImpulse { id, x, y, z } => self.with_rigid_awake(id, |engine, body| {
                engine.apply_central_impulse(body, Vec3::new(x, y, z))
            }),
            ApplyImpulse {
                id,
                impulse_x,
                impulse_y,
                impulse_z,
                x,
                y,
                z,
            } => self.with_rigid_awake(id, |engine, body| {
                engine.apply_impulse(
                    body,
                    Vec3::new(impulse_x, impulse_y, impulse_z),
                    Vec3::new(x, y, z),
                )
            }),
            ApplyTorque {
                id,
                torque_x,
                torque_y,
                torque_z,
            } => self.with_rigid_awake(id, |engine, body| {
                engine.apply_torque(body, Vec3::new(torque_x, torque_y, torque_z))
            }),
            ApplyCentralForce { id, x, y, z } => self.with_rigid_awake(id, |engine, body| {
                engine.apply_central_force(body, Vec3::new(x, y, z))
            }),
            ApplyForce {
                id,
                force_x,
                force_y,
                force_z,
                x,
                y,
                z,
            } => self.with_rigid_awake(id, |engine, body| {
                engine.apply_force(
                    body,
                    Vec3::new(force_x, force_y, force_z),
                    Vec3::new(x, y, z),
                )
            }),

            SetAngularVelocity { id, x, y, z } => self.with_rigid_awake(id, |engine, body| {
                engine.set_angular_velocity(body, Vec3::new(x, y, z))
            }),
            SetLinearVelocity { id, x, y, z } => self.with_rigid_awake(id, |engine, body| {
                engine.set_linear_velocity(body, Vec3::new(x, y, z))
            }),
            SetAngularFactor { id, x, y, z } => {
                let body = self.registry.rigid(id)?;
                self.engine.set_angular_factor(body, Vec3::new(x, y, z));
                Ok(())
            }
            SetLinearFactor { id, x, y, z } => {
                let body = self.registry.rigid(id)?;
                self.engine.set_linear_factor(body, Vec3::new(x, y, z));
                Ok(())
            }
            SetDamping {
                id,
                linear,
                angular,
            } => {
                let body = self.registry.rigid(id)?;
                self.engine.set_damping(body, linear, angular);
                Ok(())
            }
            SetCcdMotionThreshold { id, threshold } => {
                let body = self.registry.rigid(id)?;
                self.engine.set_ccd_motion_threshold(body, threshold);
                Ok(())
            }
            SetCcdSweptSphereRadius { id, radius } => {
                let body = self.registry.rigid(id)?;
                self.engine.set_ccd_swept_sphere_radius(body, radius);
                Ok(())
            }

            AppendAnchor {
                obj,
                node,
                obj2,
                collision_between_linked_bodies,
                influence,
            } => {
                let soft = self.registry.soft(obj)?;
                let rigid = self.registry.rigid(obj2)?;
                self.engine.append_anchor(
                    soft,
                    node,
                    rigid,
                    !collision_between_linked_bodies,
                    influence,
                );
                Ok(())
            }
            AppendLink { body, node1, node2 } => {
                let soft = self.registry.soft(body)?;
                self.engine.append_link(soft, node1, node2);
                Ok(())
            }
            LinkNodes {
                body,
                other,
                node1,
                node2,
            } => {
                let soft = self.registry.soft(body)?;
                let other = self.registry.soft(other)?;
                self.engine.link_nodes(soft, node1, other, node2);
                Ok(())
            }

            SetSteering {
                id,
                wheel,
                steering,
            } => {
                let vehicle = self.registry.vehicle(id)?.handle;
                self.engine.set_steering(vehicle, wheel, steering);
                Ok(())
            }
            SetBrake { id, wheel, brake } => {
                let vehicle = self.registry.vehicle(id)?.handle;
                self.engine.set_brake(vehicle, wheel, brake);
                Ok(())
            }
            ApplyEngineForce { id, wheel, force } => {
                let vehicle = self.registry.vehicle(id)?.handle;
                self.engine.apply_engine_force(vehicle, wheel, force);
                Ok(())
            }

            ConstraintSetBreakingImpulseThreshold {
                constraint,
                threshold,
            } => {
                let handle = self.registry.constraint(constraint)?.handle;
                self.engine.set_breaking_impulse_threshold(handle, threshold);
                Ok(())
            }
            command @ (HingeSetLimits { .. }
            | HingeEnableAngularMotor { .. }
            | HingeDisableMotor { .. }
            | SliderSetLimits { .. }
            | SliderSetRestitution { .. }
            | SliderEnableLinearMotor { .. }
            | SliderDisableLinearMotor { .. }
            | SliderEnableAngularMotor { .. }
            | SliderDisableAngularMotor { .. }
            | ConetwistSetLimit { .. }
            | ConetwistEnableMotor { .. }
            | ConetwistSetMaxMotorImpulse { .. }
            | ConetwistSetMotorTarget { .. }
            | ConetwistDisableMotor { .. }
            | DofSetLinearLowerLimit { .. }
            | DofSetLinearUpperLimit { .. }
            | DofSetAngularLowerLimit { .. }
            | DofSetAngularUpperLimit { .. }
            | DofEnableAngularMotor { .. }
            | DofConfigureAngularMotor { .. }
            | DofDisableAngularMotor { .. }) => match command.joint_op() {
                Some((constraint, op)) => self.apply_joint_op(constraint, &op),
                None => Ok(()),
            },
        }
    }

    /// Runs `apply` on a rigid body and wakes it, since a sleeping body
    /// ignores whatever was applied to it.
    fn with_rigid_awake(
        &mut self,
        id: ObjectId,
        apply: impl FnOnce(&mut dyn NativeEngine, BodyHandle),
    ) -> Result<()> {
        let body = self.registry.rigid(id)?;
        apply(&mut *self.engine, body);
        self.engine.activate(body);
        Ok(())
    }

    fn update_transform(
        &mut self,
        id: ObjectId,
        position: Option<Vec3>,
        rotation: Option<Quat>,
    ) -> Result<()> {
        let body = self.registry.rigid(id)?;
        let current = self.engine.world_transform(body);
        let transform = Transform::new(
            position.unwrap_or(current.position),
            rotation.map_or(current.rotation, |q| q.normalize()),
        );
        self.engine.set_world_transform(body, transform);
        self.engine.activate(body);
        Ok(())
    }

    /// Mass changes move the body between broadphase buckets, so it leaves
    /// and re-enters the world around the update.
    fn update_mass(&mut self, id: ObjectId, mass: f32) -> Result<()> {
        let entry = *self.registry.body(id)?;
        if entry.is_soft() {
            return Err(BridgeError::WrongBodyKind(id));
        }
        let body = entry.handle;
        let engine = &mut *self.engine;
        engine.remove_rigid_body(body);
        let inertia = match engine.body_shape(body) {
            Some(shape) if mass > 0.0 => engine.calculate_local_inertia(shape, mass),
            _ => Vec3::ZERO,
        };
        engine.set_mass_props(body, mass, inertia);
        engine.add_rigid_body(body, entry.filter);
        engine.activate(body);
        debug!("object {id} mass set to {mass}");
        Ok(())
    }

    /// Applies a motor or limit change and wakes both constrained bodies.
    fn apply_joint_op(&mut self, id: ObjectId, op: &JointOp) -> Result<()> {
        let constraint = *self.registry.constraint(id)?;
        if !op.applies_to(&constraint.kind) {
            return Err(BridgeError::WrongConstraintKind(id));
        }
        self.engine.apply_joint_op(constraint.handle, op);
        let bodies = [Some(constraint.body_a), constraint.body_b];
        for body in bodies.into_iter().flatten() {
            if let Ok(entry) = self.registry.body(body) {
                self.engine.activate(entry.handle);
            }
        }
        Ok(())
    }
}
