//! Events raised by the world module and the per-step collision tracking
//! that produces the collision ones.

use std::collections::{BTreeMap, HashMap};

use glam::Vec3;

use super::scene::{PhysicsBody, Scene};
use crate::protocol::report::CollisionRecord;
use crate::utils::allocator::{NodeId, ObjectId, SparseTable};

/// A new touch between two bodies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEvent {
    pub object: ObjectId,
    pub other: ObjectId,
    pub node: NodeId,
    pub other_node: NodeId,
    /// `object` velocity minus `other` velocity at the time of the report.
    pub relative_velocity: Vec3,
    /// Same value as `relative_velocity`; listeners receive both.
    pub impact_velocity: Vec3,
    /// Contact normal oriented from `other` towards `object`.
    pub normal: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorldEvent {
    /// The worker finished loading the native engine.
    EngineLoaded,
    /// The worker created the physics world.
    WorldReady,
    /// A node's body description was sent to the worker.
    Added { node: NodeId, id: ObjectId },
    /// The worker built the body.
    Ready { node: NodeId, id: ObjectId },
    Collision(CollisionEvent),
    /// A world report was applied.
    Update,
}

/// Who touches whom in one collision report.
#[derive(Debug, Default)]
pub struct ContactSet {
    adjacency: BTreeMap<ObjectId, Vec<ObjectId>>,
    normals: HashMap<(ObjectId, ObjectId), Vec3>,
}

impl ContactSet {
    /// Registers every record in both directions. The normal stored for
    /// `(a, b)` is the reported one negated; `(b, a)` keeps it as is.
    pub fn from_records(records: &[CollisionRecord]) -> Self {
        let mut contacts = Self::default();
        for record in records {
            let (a, b) = (record.body_a, record.body_b);
            contacts.normals.insert((a, b), -record.normal);
            contacts.normals.insert((b, a), record.normal);
            contacts.adjacency.entry(a).or_default().push(b);
            contacts.adjacency.entry(b).or_default().push(a);
        }
        contacts
    }

    pub fn touching(&self, id: ObjectId) -> Option<&[ObjectId]> {
        self.adjacency.get(&id).map(Vec::as_slice)
    }

    pub fn normal(&self, id: ObjectId, other: ObjectId) -> Option<Vec3> {
        self.normals.get(&(id, other)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }
}

fn physics_mut(scene: &mut Scene, node: NodeId) -> Option<&mut PhysicsBody> {
    scene.node_mut(node).and_then(|node| node.physics.as_mut())
}

fn velocity(scene: &Scene, node: NodeId) -> Vec3 {
    scene
        .node(node)
        .map_or(Vec3::ZERO, |node| node.linear_velocity())
}

/// Updates every body's touch list from `contacts` and returns one event per
/// pair that started touching this step.
pub(crate) fn track_collisions(
    scene: &mut Scene,
    objects: &SparseTable<NodeId>,
    contacts: &ContactSet,
) -> Vec<CollisionEvent> {
    let mut events = Vec::new();
    for (id, &node) in objects.iter() {
        let Some(current) = contacts.touching(id) else {
            if let Some(physics) = physics_mut(scene, node) {
                physics.touches.clear();
            }
            continue;
        };
        if let Some(physics) = physics_mut(scene, node) {
            physics.touches.retain(|touch| current.contains(touch));
        }

        for &other in current {
            let Some(&other_node) = objects.get(other) else {
                continue;
            };
            let Some(physics) = physics_mut(scene, node) else {
                continue;
            };
            if physics.touches.contains(&other) {
                continue;
            }
            physics.touches.push(other);
            if let Some(other_physics) = physics_mut(scene, other_node) {
                if !other_physics.touches.contains(&id) {
                    other_physics.touches.push(id);
                }
            }

            let relative_velocity = velocity(scene, node) - velocity(scene, other_node);
            let impact_velocity = velocity(scene, node) - velocity(scene, other_node);
            events.push(CollisionEvent {
                object: id,
                other,
                node,
                other_node,
                relative_velocity,
                impact_velocity,
                normal: contacts.normal(id, other).unwrap_or(Vec3::ZERO),
            });
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::scene::SceneNode;
    use crate::core::ObjectDescription;

    fn scene_with(ids: &[u32]) -> (Scene, SparseTable<NodeId>) {
        let mut scene = Scene::new();
        let mut objects = SparseTable::new();
        for &raw in ids {
            let mut node = SceneNode::new("body").with_physics(ObjectDescription::sphere(1.0));
            if let Some(physics) = &mut node.physics {
                physics.id = Some(ObjectId(raw));
                physics.linear_velocity = Vec3::new(raw as f32, 0.0, 0.0);
            }
            objects.insert(ObjectId(raw), scene.spawn(node));
        }
        (scene, objects)
    }

    fn record(a: u32, b: u32, normal: Vec3) -> CollisionRecord {
        CollisionRecord {
            body_a: ObjectId(a),
            body_b: ObjectId(b),
            normal,
        }
    }

    fn touches(scene: &Scene, objects: &SparseTable<NodeId>, id: u32) -> Vec<ObjectId> {
        let node = objects.get(ObjectId(id)).copied().unwrap();
        scene.node(node).unwrap().physics.as_ref().unwrap().touches.clone()
    }

    #[test]
    fn one_event_per_new_pair() {
        let (mut scene, objects) = scene_with(&[1, 2]);
        let contacts = ContactSet::from_records(&[record(1, 2, Vec3::Y)]);
        let events = track_collisions(&mut scene, &objects, &contacts);
        assert_eq!(events.len(), 1);
        assert_eq!(touches(&scene, &objects, 1), vec![ObjectId(2)]);
        assert_eq!(touches(&scene, &objects, 2), vec![ObjectId(1)]);

        let event = events[0];
        assert_eq!(event.object, ObjectId(1));
        assert_eq!(event.normal, -Vec3::Y);
        assert_eq!(event.relative_velocity, Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(event.relative_velocity, event.impact_velocity);

        // still touching: no new event
        assert!(track_collisions(&mut scene, &objects, &contacts).is_empty());
    }

    #[test]
    fn separation_clears_touches() {
        let (mut scene, objects) = scene_with(&[1, 2, 3]);
        let contacts =
            ContactSet::from_records(&[record(1, 2, Vec3::Y), record(3, 1, Vec3::X)]);
        assert_eq!(track_collisions(&mut scene, &objects, &contacts).len(), 2);
        assert_eq!(touches(&scene, &objects, 1), vec![ObjectId(2), ObjectId(3)]);

        let contacts = ContactSet::from_records(&[record(1, 3, Vec3::X)]);
        assert!(track_collisions(&mut scene, &objects, &contacts).is_empty());
        assert_eq!(touches(&scene, &objects, 1), vec![ObjectId(3)]);
        assert!(touches(&scene, &objects, 2).is_empty());
    }

    #[test]
    fn reversed_records_keep_the_reported_normal() {
        let contacts = ContactSet::from_records(&[record(4, 9, Vec3::Z)]);
        assert_eq!(contacts.normal(ObjectId(9), ObjectId(4)), Some(Vec3::Z));
        assert_eq!(contacts.normal(ObjectId(4), ObjectId(9)), Some(-Vec3::Z));
    }
}
