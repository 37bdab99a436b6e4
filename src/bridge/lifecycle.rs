//! Scene lifecycle glue: adding and removing nodes, vehicles and constraints.

use log::debug;

use super::loader::Deferred;
use super::scene::SceneNode;
use super::{ConstraintMirror, VehicleMirror, WorldEvent, WorldModule};
use crate::core::{
    ChildDescription, ConstraintDescription, ObjectDescription, VehicleDescription, VehicleTuning,
    WheelDescription,
};
use crate::error::{BridgeError, Result};
use crate::protocol::WorkerCommand;
use crate::utils::allocator::{NodeId, ObjectId};
use crate::utils::math::relative_pose;

impl WorldModule {
    /// Registers a node's body and sends it to the worker once the engine is up.
    ///
    /// Descendants that carry their own physics component become children of
    /// this body's compound shape instead of separate bodies.
    pub fn add(&mut self, node: NodeId) -> Result<ObjectId> {
        let existing = self
            .scene
            .node(node)
            .and_then(|scene_node| scene_node.physics.as_ref())
            .ok_or(BridgeError::NoPhysicsBody(node))?
            .id;
        let id = match existing {
            Some(id) if self.objects.contains(id) => return Err(BridgeError::DuplicateId(id)),
            Some(id) => id,
            None => self.ids.next_id(),
        };
        if let Some(scene_node) = self.scene.node_mut(node) {
            scene_node.clear_dirty();
            if let Some(physics) = &mut scene_node.physics {
                physics.id = Some(id);
                physics.touches.clear();
                physics.ready = false;
            }
        }
        self.objects.insert(id, node);
        if let Some(work) = self.gate.defer(Deferred::AddNode(node)) {
            self.run(work)?;
        }
        Ok(id)
    }

    /// Spawns `node` at the scene root and adds it.
    pub fn spawn_body(&mut self, node: SceneNode) -> Result<(NodeId, ObjectId)> {
        let handle = self.scene.spawn(node);
        let id = self.add(handle)?;
        Ok((handle, id))
    }

    pub(crate) fn send_add(&mut self, node: NodeId) -> Result<()> {
        let description = self.describe(node)?;
        let id = description.id;
        self.link.send(WorkerCommand::AddObject(description))?;
        self.events.push(WorldEvent::Added { node, id });
        debug!("sent object {id}");
        Ok(())
    }

    /// Full description of a registered node with its current pose.
    pub fn describe(&self, node: NodeId) -> Result<ObjectDescription> {
        let scene_node = self.scene.node(node).ok_or(BridgeError::NoPhysicsBody(node))?;
        let physics = scene_node
            .physics
            .as_ref()
            .ok_or(BridgeError::NoPhysicsBody(node))?;
        let mut description = physics.description.clone();
        description.id = physics.id.unwrap_or_default();
        description.position = scene_node.position();
        description.rotation = scene_node.rotation();
        description.scale = scene_node.scale();
        let children = self.flatten_children(node);
        // with children the compound container carries the scale instead
        if children.is_empty() {
            description.shape.bake_scale(description.scale);
        }
        description.children.extend(children);
        Ok(description)
    }

    /// Posed shape descriptions of every physical descendant of `root`.
    fn flatten_children(&self, root: NodeId) -> Vec<ChildDescription> {
        let Some(root_matrix) = self.scene.world_matrix(root) else {
            return Vec::new();
        };
        self.scene
            .descendants(root)
            .into_iter()
            .filter_map(|child| {
                let node = self.scene.node(child)?;
                let physics = node.physics.as_ref()?;
                let (position_offset, rotation) =
                    relative_pose(&root_matrix, &self.scene.world_matrix(child)?);
                let mut shape = physics.description.shape.clone();
                shape.bake_scale(node.scale());
                Some(ChildDescription {
                    shape,
                    position_offset,
                    rotation,
                    scale: node.scale(),
                    margin: physics.description.margin,
                })
            })
            .collect()
    }

    /// Unregisters a node's body and tells the worker to destroy it.
    pub fn remove(&mut self, node: NodeId) -> Result<ObjectId> {
        let id = self
            .scene
            .node(node)
            .and_then(SceneNode::object_id)
            .filter(|id| self.objects.get(*id) == Some(&node))
            .ok_or(BridgeError::NoPhysicsBody(node))?;
        self.objects.remove(id);
        if let Some(physics) = self
            .scene
            .node_mut(node)
            .and_then(|scene_node| scene_node.physics.as_mut())
        {
            physics.touches.clear();
            physics.ready = false;
        }
        if self.gate.forget_node(node) {
            debug!("object {id} removed before it was sent");
            return Ok(id);
        }
        self.execute(WorkerCommand::RemoveObject { id })?;
        Ok(id)
    }

    /// Wraps an added chassis body into a raycast vehicle.
    pub fn add_vehicle(&mut self, chassis: NodeId, tuning: VehicleTuning) -> Result<ObjectId> {
        let chassis_id = self
            .scene
            .node(chassis)
            .and_then(SceneNode::object_id)
            .filter(|id| self.objects.contains(*id))
            .ok_or(BridgeError::NoPhysicsBody(chassis))?;
        let id = self.ids.next_id();
        self.vehicles.insert(
            id,
            VehicleMirror {
                chassis: chassis_id,
                wheels: Vec::new(),
            },
        );
        self.execute(WorkerCommand::AddVehicle(VehicleDescription {
            id,
            rigid_body: chassis_id,
            tuning,
        }))?;
        Ok(id)
    }

    /// Adds a wheel to `vehicle`; `wheel_node` follows the reported wheel pose.
    pub fn add_wheel(
        &mut self,
        vehicle: ObjectId,
        mut description: WheelDescription,
        wheel_node: NodeId,
    ) -> Result<usize> {
        let mirror = self
            .vehicles
            .get_mut(vehicle)
            .ok_or(BridgeError::UnknownVehicle(vehicle))?;
        mirror.wheels.push(wheel_node);
        let index = mirror.wheels.len() - 1;
        description.id = vehicle;
        self.execute(WorkerCommand::AddWheel(description))?;
        Ok(index)
    }

    /// Drops the vehicle, then its wheel nodes, then the chassis body and node.
    pub fn remove_vehicle(&mut self, id: ObjectId) -> Result<()> {
        let mirror = self
            .vehicles
            .remove(id)
            .ok_or(BridgeError::UnknownVehicle(id))?;
        self.execute(WorkerCommand::RemoveVehicle { id })?;
        for wheel in mirror.wheels {
            self.scene.despawn(wheel);
        }
        if let Some(chassis) = self.objects.get(mirror.chassis).copied() {
            self.remove(chassis)?;
            self.scene.despawn(chassis);
        }
        debug!("removed vehicle {id} with chassis {}", mirror.chassis);
        Ok(())
    }

    /// Assigns the constraint an id and sends it. With `show_marker` a small
    /// marker node is parented to body A at the pivot.
    pub fn add_constraint(
        &mut self,
        mut description: ConstraintDescription,
        show_marker: bool,
    ) -> Result<ObjectId> {
        let id = self.ids.next_id();
        description.id = id;
        let marker = if show_marker {
            self.objects.get(description.objecta).copied().and_then(|body| {
                self.scene.spawn_child(
                    body,
                    SceneNode::new("constraint marker").at(description.positiona),
                )
            })
        } else {
            None
        };
        self.constraints.insert(
            id,
            ConstraintMirror {
                description,
                marker,
                anchor: description.positiona,
                applied_impulse: 0.0,
            },
        );
        self.execute(WorkerCommand::AddConstraint(description))?;
        Ok(id)
    }

    pub fn remove_constraint(&mut self, id: ObjectId) -> Result<()> {
        let mirror = self
            .constraints
            .remove(id)
            .ok_or(BridgeError::UnknownConstraint(id))?;
        if let Some(marker) = mirror.marker {
            self.scene.despawn(marker);
        }
        self.execute(WorkerCommand::RemoveConstraint { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::scene::SceneNode;
    use crate::config::WorldConfig;
    use crate::core::{ConstraintKind, ShapeParams};
    use crate::protocol::{ControlMessage, ToWorker};
    use crate::transport::{WorkerEndpoint, WorkerLink};
    use approx::assert_relative_eq;
    use glam::Vec3;

    fn module() -> (WorldModule, WorkerEndpoint) {
        let (link, endpoint) = WorkerLink::detached();
        let world = WorldModule::with_link(WorldConfig::default(), link).unwrap();
        endpoint.drain();
        (world, endpoint)
    }

    fn loaded() -> (WorldModule, WorkerEndpoint) {
        let (mut world, endpoint) = module();
        endpoint.post(ControlMessage::AmmoLoaded).unwrap();
        world.poll();
        endpoint.drain();
        (world, endpoint)
    }

    fn commands(endpoint: &WorkerEndpoint) -> Vec<WorkerCommand> {
        endpoint
            .drain()
            .into_iter()
            .filter_map(|message| match message {
                ToWorker::Command(command) => Some(command),
                ToWorker::Reclaim(_) => None,
            })
            .collect()
    }

    #[test]
    fn additions_wait_for_the_engine() {
        let (mut world, endpoint) = module();
        let (_, id) = world
            .spawn_body(SceneNode::new("ball").with_physics(ObjectDescription::sphere(1.0)))
            .unwrap();
        assert_eq!(id, ObjectId(1));
        assert!(commands(&endpoint).is_empty());

        endpoint.post(ControlMessage::AmmoLoaded).unwrap();
        world.poll();
        let sent = commands(&endpoint);
        assert!(matches!(sent[0], WorkerCommand::MakeWorld(_)));
        assert!(matches!(&sent[1], WorkerCommand::AddObject(d) if d.id == id));
    }

    #[test]
    fn ids_are_never_reused() {
        let (mut world, _endpoint) = loaded();
        let (node, first) = world
            .spawn_body(SceneNode::new("a").with_physics(ObjectDescription::sphere(1.0)))
            .unwrap();
        world.remove(node).unwrap();
        let (_, second) = world
            .spawn_body(SceneNode::new("b").with_physics(ObjectDescription::sphere(1.0)))
            .unwrap();
        let constraint = world
            .add_constraint(
                ConstraintDescription::new(ConstraintKind::Point, second, Vec3::ZERO),
                false,
            )
            .unwrap();
        assert!(first < second && second < constraint);
    }

    #[test]
    fn physical_children_are_flattened_into_the_root() {
        let (mut world, endpoint) = loaded();
        let root = world.scene_mut().spawn(
            SceneNode::new("table")
                .at(Vec3::new(0.0, 5.0, 0.0))
                .with_physics(ObjectDescription::box_shape(2.0, 0.2, 2.0).with_mass(3.0)),
        );
        world
            .scene_mut()
            .spawn_child(
                root,
                SceneNode::new("leg")
                    .at(Vec3::new(0.9, -0.5, 0.9))
                    .with_physics(ObjectDescription::box_shape(0.1, 1.0, 0.1)),
            )
            .unwrap();
        world.add(root).unwrap();

        let sent = commands(&endpoint);
        let WorkerCommand::AddObject(description) = &sent[0] else {
            panic!("expected addObject, got {sent:?}");
        };
        assert_eq!(description.children.len(), 1);
        let child = &description.children[0];
        assert!(matches!(child.shape, ShapeParams::Box { .. }));
        assert_relative_eq!(child.position_offset.x, 0.9, epsilon = 1e-5);
        assert_relative_eq!(child.position_offset.y, -0.5, epsilon = 1e-5);
        assert_eq!(description.position, Vec3::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn removing_before_load_sends_nothing() {
        let (mut world, endpoint) = module();
        let (node, _) = world
            .spawn_body(SceneNode::new("ball").with_physics(ObjectDescription::sphere(1.0)))
            .unwrap();
        world.remove(node).unwrap();
        endpoint.post(ControlMessage::AmmoLoaded).unwrap();
        world.poll();
        let sent = commands(&endpoint);
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], WorkerCommand::MakeWorld(_)));
    }

    #[test]
    fn removing_a_vehicle_takes_its_wheels_and_chassis() {
        let (mut world, endpoint) = loaded();
        let (chassis, chassis_id) = world
            .spawn_body(
                SceneNode::new("chassis")
                    .with_physics(ObjectDescription::box_shape(2.0, 0.5, 4.0).with_mass(800.0)),
            )
            .unwrap();
        let vehicle = world.add_vehicle(chassis, VehicleTuning::default()).unwrap();
        let wheel = world.scene_mut().spawn(SceneNode::new("wheel"));
        world
            .add_wheel(
                vehicle,
                WheelDescription::new(Vec3::new(-1.0, 0.0, 1.5), 0.6, 0.4),
                wheel,
            )
            .unwrap();
        commands(&endpoint);

        world.remove_vehicle(vehicle).unwrap();
        assert_eq!(
            commands(&endpoint),
            vec![
                WorkerCommand::RemoveVehicle { id: vehicle },
                WorkerCommand::RemoveObject { id: chassis_id },
            ]
        );
        assert!(world.scene().node(wheel).is_none());
        assert!(world.scene().node(chassis).is_none());
        assert!(world.vehicle(vehicle).is_none());
        assert_eq!(world.object_count(), 0);
        assert!(matches!(
            world.remove_vehicle(vehicle),
            Err(BridgeError::UnknownVehicle(_))
        ));
    }

    #[test]
    fn scaled_primitives_are_sent_at_their_scaled_size() {
        let (mut world, endpoint) = loaded();
        world
            .spawn_body(
                SceneNode::new("crate")
                    .scaled(Vec3::new(4.0, 2.0, 1.0))
                    .with_physics(ObjectDescription::box_shape(1.0, 1.0, 1.0).with_mass(1.0)),
            )
            .unwrap();
        let sent = commands(&endpoint);
        let WorkerCommand::AddObject(description) = &sent[0] else {
            panic!("expected addObject, got {sent:?}");
        };
        assert_eq!(
            description.shape,
            ShapeParams::Box {
                width: 4.0,
                height: 2.0,
                depth: 1.0
            }
        );
        assert_eq!(description.shape.cache_key().as_deref(), Some("box_4_2_1"));
    }

    #[test]
    fn constraint_marker_hangs_off_body_a() {
        let (mut world, _endpoint) = loaded();
        let (body, id) = world
            .spawn_body(SceneNode::new("door").with_physics(ObjectDescription::box_shape(1.0, 2.0, 0.1)))
            .unwrap();
        let constraint = world
            .add_constraint(
                ConstraintDescription::new(ConstraintKind::Point, id, Vec3::new(0.5, 0.0, 0.0)),
                true,
            )
            .unwrap();
        let marker = world.constraint(constraint).unwrap().marker.unwrap();
        assert_eq!(world.scene().node(marker).unwrap().parent(), Some(body));
        world.remove_constraint(constraint).unwrap();
        assert!(world.scene().node(marker).is_none());
    }
}
