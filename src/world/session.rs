//! A created physics world: the engine plus everything registered in it.

use log::{debug, warn};

use super::factory::ShapeCache;
use super::registry::{BodyKind, ConstraintEntry, Registry, VehicleEntry};
use super::reports::ReportSlots;
use crate::config::WorldConfig;
use crate::core::{ActivationState, ConstraintDescription, VehicleDescription, WheelDescription};
use crate::error::{BridgeError, Result};
use crate::native::{ConstraintSetup, NativeEngine};
use crate::utils::allocator::ObjectId;

pub(crate) struct Session {
    pub(crate) engine: Box<dyn NativeEngine>,
    pub(crate) config: WorldConfig,
    pub(crate) registry: Registry,
    pub(crate) shapes: ShapeCache,
    pub(crate) reports: ReportSlots,
}

impl Session {
    pub(crate) fn new(mut engine: Box<dyn NativeEngine>, config: WorldConfig) -> Self {
        engine.create_world(&config);
        let reports = ReportSlots::new(config.report_chunk_size(), config.transferable);
        debug!(
            "world created on {} (fixed step {}, chunk {})",
            engine.name(),
            config.effective_fixed_time_step(),
            config.report_chunk_size()
        );
        Self {
            engine,
            config,
            registry: Registry::new(),
            shapes: ShapeCache::default(),
            reports,
        }
    }

    /// Releases every native resource and hands the engine back.
    pub(crate) fn teardown(mut self) -> Box<dyn NativeEngine> {
        for id in self.registry.constraints.ids() {
            log_failure("removeConstraint", self.remove_constraint(id));
        }
        for id in self.registry.vehicles.ids() {
            log_failure("removeVehicle", self.remove_vehicle(id));
        }
        for id in self.registry.objects.ids() {
            log_failure("removeObject", self.remove_object(id));
        }
        for shape in self.shapes.drain() {
            self.engine.destroy_shape(shape);
        }
        self.engine
    }

    /// Takes a body out of the world and destroys it with its owned resources.
    ///
    /// World removal precedes destruction, and the body goes before the
    /// shapes it references.
    pub(crate) fn remove_object(&mut self, id: ObjectId) -> Result<()> {
        let entry = *self.registry.body(id)?;
        let engine = &mut *self.engine;
        match entry.kind {
            BodyKind::Soft => engine.remove_soft_body(entry.handle),
            BodyKind::Rigid => {
                engine.remove_rigid_body(entry.handle);
                if let Some(&state) = self.registry.motion_states.get(id) {
                    engine.destroy_motion_state(state);
                }
            }
        }
        engine.destroy_body(entry.handle);
        if let Some(compound) = self.registry.compound_shapes.get(id) {
            engine.destroy_shape(compound.shape);
            for &child in &compound.owned_children {
                engine.destroy_shape(child);
            }
        }
        if let Some(&shape) = self.registry.noncached_shapes.get(id) {
            engine.destroy_shape(shape);
        }
        self.registry.unregister_body(id);

        let dangling = self
            .registry
            .constraints
            .iter()
            .filter(|(_, c)| c.body_a == id || c.body_b == Some(id))
            .count();
        if dangling > 0 {
            warn!("object {id} removed while {dangling} constraint(s) still reference it");
        }
        debug!("removed object {id}");
        Ok(())
    }

    pub(crate) fn add_vehicle(&mut self, description: &VehicleDescription) -> Result<()> {
        let id = description.id;
        if self.registry.is_live(id) {
            return Err(BridgeError::DuplicateId(id));
        }
        let chassis = self.registry.rigid(description.rigid_body)?;
        let handle = self.engine.create_vehicle(chassis, &description.tuning);
        self.engine
            .set_activation_state(chassis, ActivationState::DisableDeactivation);
        self.engine.add_vehicle(handle);
        self.registry.vehicles.insert(
            id,
            VehicleEntry {
                handle,
                chassis: description.rigid_body,
            },
        );
        debug!("added vehicle {id} on chassis {}", description.rigid_body);
        Ok(())
    }

    pub(crate) fn remove_vehicle(&mut self, id: ObjectId) -> Result<()> {
        let vehicle = self
            .registry
            .vehicles
            .remove(id)
            .ok_or(BridgeError::UnknownVehicle(id))?;
        self.engine.remove_vehicle(vehicle.handle);
        self.engine.destroy_vehicle(vehicle.handle);
        debug!("removed vehicle {id}");
        Ok(())
    }

    /// `description.id` names the vehicle the wheel is attached to.
    pub(crate) fn add_wheel(&mut self, description: &WheelDescription) -> Result<()> {
        let vehicle = *self.registry.vehicle(description.id)?;
        let index = self.engine.add_wheel(vehicle.handle, description);
        debug!("vehicle {} gained wheel {index}", description.id);
        Ok(())
    }

    pub(crate) fn add_constraint(&mut self, description: &ConstraintDescription) -> Result<()> {
        let id = description.id;
        if self.registry.is_live(id) {
            return Err(BridgeError::DuplicateId(id));
        }
        let dangling = |_: BridgeError| BridgeError::DanglingConstraint(id);
        let body_a = self.registry.rigid(description.objecta).map_err(dangling)?;
        let body_b = description
            .objectb
            .map(|other| self.registry.rigid(other))
            .transpose()
            .map_err(dangling)?;
        // without a second body the pivot is pinned where it sits in the world now
        let pivot_b = match body_b {
            Some(_) => description.positionb,
            None => self
                .engine
                .world_transform(body_a)
                .transform_point(description.positiona),
        };
        let handle = self.engine.create_constraint(&ConstraintSetup {
            kind: description.kind,
            body_a,
            body_b,
            pivot_a: description.positiona,
            pivot_b,
        });
        self.engine
            .add_constraint(handle, description.disable_collision);
        self.registry.constraints.insert(
            id,
            ConstraintEntry {
                handle,
                kind: description.kind,
                body_a: description.objecta,
                body_b: description.objectb,
                pivot_a: description.positiona,
            },
        );
        debug!("added {} constraint {id}", description.kind.name());
        Ok(())
    }

    pub(crate) fn remove_constraint(&mut self, id: ObjectId) -> Result<()> {
        let constraint = self
            .registry
            .constraints
            .remove(id)
            .ok_or(BridgeError::UnknownConstraint(id))?;
        self.engine.remove_constraint(constraint.handle);
        self.engine.destroy_constraint(constraint.handle);
        debug!("removed constraint {id}");
        Ok(())
    }
}

fn log_failure(command: &str, result: Result<()>) {
    if let Err(err) = result {
        warn!("{command} during teardown failed: {err}");
    }
}
