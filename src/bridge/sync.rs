//! Per-frame synchronisation: stepping requests out, reports in.

use std::time::Duration;

use glam::Vec3;
use log::{debug, trace, warn};

use super::events::{track_collisions, ContactSet, WorldEvent};
use super::scene::{PhysicsBody, SoftMesh};
use super::WorldModule;
use crate::error::Result;
use crate::protocol::report::{ReportBuffer, ReportKind, SoftKind};
use crate::protocol::{ControlMessage, FromWorker, ToWorker, WorkerCommand};
use crate::utils::allocator::ObjectId;

impl WorldModule {
    /// Asks the worker for one step.
    ///
    /// Transforms the user changed since the last report go out first as
    /// `updateTransform`. Returns `false` without sending anything while the
    /// previous step's world report is still outstanding.
    pub fn simulate(&mut self, time_step: Option<f32>, max_sub_steps: Option<u32>) -> bool {
        if self.is_simulating {
            trace!("simulate skipped, previous step still in flight");
            return false;
        }
        if !self.world_ready {
            debug!("simulate ignored until the world is ready");
            return false;
        }

        let mut updates = Vec::new();
        for (id, &node) in self.objects.iter() {
            let Some(scene_node) = self.scene.node_mut(node) else {
                continue;
            };
            let (dirty_position, dirty_rotation) =
                (scene_node.dirty_position(), scene_node.dirty_rotation());
            if !dirty_position && !dirty_rotation {
                continue;
            }
            updates.push(WorkerCommand::UpdateTransform {
                id,
                pos: dirty_position.then(|| scene_node.position()),
                quat: dirty_rotation.then(|| scene_node.rotation()),
            });
            scene_node.clear_dirty();
        }
        for update in updates {
            if let Err(err) = self.link.send(update) {
                warn!("updateTransform not sent: {err}");
            }
        }

        if self
            .link
            .send(WorkerCommand::Simulate {
                time_step,
                max_sub_steps,
            })
            .is_err()
        {
            return false;
        }
        self.is_simulating = true;
        true
    }

    /// Applies everything the worker has posted. Returns the number of messages.
    pub fn poll(&mut self) -> usize {
        let messages = self.link.poll();
        let count = messages.len();
        for message in messages {
            self.receive(message);
        }
        count
    }

    /// Waits up to `timeout` for one worker message and applies it.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        match self.link.wait(timeout) {
            Some(message) => {
                self.receive(message);
                true
            }
            None => false,
        }
    }

    pub fn receive(&mut self, message: FromWorker) {
        match message {
            FromWorker::Control(control) => self.on_control(control),
            FromWorker::Report(buffer) => self.on_report(buffer),
        }
    }

    fn on_control(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::AmmoLoaded => {
                if self.engine_loaded {
                    return;
                }
                self.engine_loaded = true;
                self.events.push(WorldEvent::EngineLoaded);
                if let Err(err) = self.link.send(WorkerCommand::MakeWorld(self.config.clone())) {
                    warn!("makeWorld not sent: {err}");
                }
                let deferred = self.gate.open();
                self.replay(deferred);
            }
            ControlMessage::WorldReady => {
                self.world_ready = true;
                self.is_simulating = false;
                self.events.push(WorldEvent::WorldReady);
            }
            ControlMessage::ObjectReady(id) => {
                let Some(node) = self.objects.get(id).copied() else {
                    debug!("objectReady for unknown object {id}");
                    return;
                };
                if let Some(physics) = self
                    .scene
                    .node_mut(node)
                    .and_then(|scene_node| scene_node.physics.as_mut())
                {
                    physics.ready = true;
                }
                self.events.push(WorldEvent::Ready { node, id });
            }
        }
    }

    fn on_report(&mut self, buffer: ReportBuffer) {
        let kind = buffer.kind();
        let applied = match kind {
            ReportKind::World => self.update_scene(&buffer),
            ReportKind::Collision => self.update_collisions(&buffer),
            ReportKind::Vehicle => self.update_vehicles(&buffer),
            ReportKind::Constraint => self.update_constraints(&buffer),
            ReportKind::Soft => self.update_soft_bodies(&buffer),
        };
        if let Err(err) = applied {
            warn!("discarding {kind:?} report: {err}");
        }
        if self.link.transferable() {
            if let Err(err) = self.link.send(ToWorker::Reclaim(buffer)) {
                debug!("report buffer not returned: {err}");
            }
        }
        if kind == ReportKind::World {
            self.is_simulating = false;
            self.events.push(WorldEvent::Update);
        }
    }

    fn update_scene(&mut self, buffer: &ReportBuffer) -> Result<()> {
        for record in buffer.world_records()? {
            let Some(node) = self
                .objects
                .get(record.id)
                .and_then(|&node| self.scene.node_mut(node))
            else {
                continue;
            };
            node.apply_simulated(
                record.position,
                record.rotation,
                record.linear_velocity,
                record.angular_velocity,
            );
        }
        Ok(())
    }

    fn update_collisions(&mut self, buffer: &ReportBuffer) -> Result<()> {
        let contacts = ContactSet::from_records(&buffer.collision_records()?);
        let events = track_collisions(&mut self.scene, &self.objects, &contacts);
        self.events
            .extend(events.into_iter().map(WorldEvent::Collision));
        Ok(())
    }

    fn update_vehicles(&mut self, buffer: &ReportBuffer) -> Result<()> {
        for record in buffer.vehicle_records()? {
            let Some(wheel) = self
                .vehicles
                .get(record.vehicle)
                .and_then(|vehicle| vehicle.wheels.get(record.wheel))
                .copied()
            else {
                continue;
            };
            if let Some(node) = self.scene.node_mut(wheel) {
                node.place(record.position, record.rotation);
            }
        }
        Ok(())
    }

    /// Stores each constraint's pivot in world space, computed from body A's
    /// current pose and the body-local anchor.
    fn update_constraints(&mut self, buffer: &ReportBuffer) -> Result<()> {
        for record in buffer.constraint_records()? {
            let Some(body) = self
                .objects
                .get(record.body)
                .and_then(|&node| self.scene.node(node))
            else {
                continue;
            };
            let anchor = body.position() + body.rotation() * record.anchor;
            let Some(constraint) = self.constraints.get_mut(record.constraint) else {
                continue;
            };
            constraint.anchor = anchor;
            constraint.applied_impulse = record.impulse;
            if let Some(marker) = constraint.marker.and_then(|marker| self.scene.node_mut(marker))
            {
                marker.place(record.anchor, marker.rotation());
            }
        }
        Ok(())
    }

    fn update_soft_bodies(&mut self, buffer: &ReportBuffer) -> Result<()> {
        let soft_kind = |id: ObjectId| -> Option<SoftKind> {
            self.objects
                .get(id)
                .and_then(|&node| self.scene.node(node))
                .and_then(|node| node.physics.as_ref())
                .and_then(PhysicsBody::soft_kind)
        };
        let records = buffer.soft_records(|id| soft_kind(id).map(SoftKind::stride))?;
        let meshes: Vec<_> = records
            .iter()
            .filter_map(|record| {
                let kind = soft_kind(record.id)?;
                Some((record.id, soft_mesh(kind, record.data)))
            })
            .collect();

        for (id, mesh) in meshes {
            if let Some(physics) = self
                .objects
                .get(id)
                .copied()
                .and_then(|node| self.scene.node_mut(node))
                .and_then(|node| node.physics.as_mut())
            {
                physics.soft_mesh = Some(mesh);
            }
        }
        Ok(())
    }
}

fn vec3(values: &[f32]) -> Vec3 {
    Vec3::new(values[0], values[1], values[2])
}

/// Ropes carry positions only; cloths and trimesh faces interleave position
/// and normal per vertex.
fn soft_mesh(kind: SoftKind, data: &[f32]) -> SoftMesh {
    match kind {
        SoftKind::Rope => SoftMesh {
            positions: data.chunks_exact(3).map(vec3).collect(),
            normals: Vec::new(),
        },
        SoftKind::Cloth | SoftKind::Trimesh => {
            let (positions, normals) = data
                .chunks_exact(6)
                .map(|vertex| (vec3(&vertex[0..3]), vec3(&vertex[3..6])))
                .unzip();
            SoftMesh { positions, normals }
        }
    }
}
