//! Main-thread scene mirror: nodes with transforms, dirty flags and an
//! optional physics component.

use glam::{Mat4, Quat, Vec3};

use crate::core::ObjectDescription;
use crate::protocol::report::SoftKind;
use crate::utils::allocator::{Arena, NodeId, ObjectId};

/// Deformed geometry of a soft body, rewritten by every soft report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoftMesh {
    pub positions: Vec<Vec3>,
    /// Empty for ropes.
    pub normals: Vec<Vec3>,
}

/// Physics state attached to a scene node.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsBody {
    /// Shape and material template. Id and pose are filled in when added.
    pub description: ObjectDescription,
    pub id: Option<ObjectId>,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    /// Objects this body was touching after the last collision report.
    pub touches: Vec<ObjectId>,
    pub soft_mesh: Option<SoftMesh>,
    /// Set once the worker acknowledged the body with `objectReady`.
    pub ready: bool,
}

impl PhysicsBody {
    pub fn new(description: ObjectDescription) -> Self {
        Self {
            description,
            id: None,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            touches: Vec::new(),
            soft_mesh: None,
            ready: false,
        }
    }

    pub fn soft_kind(&self) -> Option<SoftKind> {
        use crate::core::ShapeParams;
        match self.description.shape {
            ShapeParams::SoftRopeMesh { .. } => Some(SoftKind::Rope),
            ShapeParams::SoftClothMesh { .. } => Some(SoftKind::Cloth),
            ShapeParams::SoftTrimesh { .. } => Some(SoftKind::Trimesh),
            _ => None,
        }
    }
}

/// One node of the scene graph.
///
/// Writes through [`set_position`](Self::set_position) and
/// [`set_rotation`](Self::set_rotation) mark the node dirty so the next step
/// pushes them to the worker instead of overwriting them.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: String,
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
    dirty_position: bool,
    dirty_rotation: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    pub physics: Option<PhysicsBody>,
}

impl Default for SceneNode {
    fn default() -> Self {
        Self::new("node")
    }
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            dirty_position: false,
            dirty_rotation: false,
            parent: None,
            children: Vec::new(),
            physics: None,
        }
    }

    pub fn with_physics(mut self, description: ObjectDescription) -> Self {
        self.physics = Some(PhysicsBody::new(description));
        self
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotated(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn scaled(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.dirty_position = true;
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.dirty_rotation = true;
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
    }

    pub fn dirty_position(&self) -> bool {
        self.dirty_position
    }

    pub fn dirty_rotation(&self) -> bool {
        self.dirty_rotation
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        self.physics.as_ref().and_then(|physics| physics.id)
    }

    pub fn linear_velocity(&self) -> Vec3 {
        self.physics
            .as_ref()
            .map_or(Vec3::ZERO, |physics| physics.linear_velocity)
    }

    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty_position = false;
        self.dirty_rotation = false;
    }

    /// Writes a simulated pose without touching the dirty flags.
    pub(crate) fn place(&mut self, position: Vec3, rotation: Quat) {
        self.position = position;
        self.rotation = rotation;
    }

    /// Applies a world report record: pose components the user changed since
    /// the last step are kept, velocities are always taken.
    pub(crate) fn apply_simulated(
        &mut self,
        position: Vec3,
        rotation: Quat,
        linear_velocity: Vec3,
        angular_velocity: Vec3,
    ) {
        if !self.dirty_position {
            self.position = position;
        }
        if !self.dirty_rotation {
            self.rotation = rotation;
        }
        if let Some(physics) = &mut self.physics {
            physics.linear_velocity = linear_velocity;
            physics.angular_velocity = angular_velocity;
        }
    }
}

/// Arena-backed scene graph.
#[derive(Debug, Default)]
pub struct Scene {
    nodes: Arena<SceneNode>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, node: SceneNode) -> NodeId {
        self.nodes.insert(node)
    }

    /// Spawns `node` as a child of `parent`. Returns `None` if the parent is gone.
    pub fn spawn_child(&mut self, parent: NodeId, mut node: SceneNode) -> Option<NodeId> {
        self.nodes.get(parent)?;
        node.parent = Some(parent);
        let child = self.nodes.insert(node);
        self.nodes.get_mut(parent)?.children.push(child);
        Some(child)
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id)
    }

    /// Removes `id` and its whole subtree.
    pub fn despawn(&mut self, id: NodeId) -> Option<SceneNode> {
        let node = self.nodes.remove(id)?;
        if let Some(parent) = node.parent.and_then(|parent| self.nodes.get_mut(parent)) {
            parent.children.retain(|child| *child != id);
        }
        for &child in &node.children {
            self.despawn(child);
        }
        Some(node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn world_matrix(&self, id: NodeId) -> Option<Mat4> {
        let node = self.nodes.get(id)?;
        let local = node.local_matrix();
        match node.parent {
            Some(parent) => Some(self.world_matrix(parent)? * local),
            None => Some(local),
        }
    }

    /// Every descendant of `id`, depth first.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self
            .nodes
            .get(id)
            .map(|node| node.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            found.push(next);
            if let Some(node) = self.nodes.get(next) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn user_writes_set_dirty_flags() {
        let mut node = SceneNode::new("crate");
        assert!(!node.dirty_position() && !node.dirty_rotation());
        node.set_position(Vec3::X);
        assert!(node.dirty_position());
        assert!(!node.dirty_rotation());
        node.set_rotation(Quat::from_rotation_y(1.0));
        assert!(node.dirty_rotation());
    }

    #[test]
    fn simulated_pose_respects_dirty_components() {
        let mut node = SceneNode::new("crate").with_physics(ObjectDescription::sphere(1.0));
        node.set_position(Vec3::new(5.0, 0.0, 0.0));
        node.apply_simulated(Vec3::Y, Quat::from_rotation_x(0.5), Vec3::X, Vec3::Z);
        assert_eq!(node.position(), Vec3::new(5.0, 0.0, 0.0));
        assert_relative_eq!(node.rotation().x, Quat::from_rotation_x(0.5).x);
        assert_eq!(node.linear_velocity(), Vec3::X);
    }

    #[test]
    fn despawn_takes_the_subtree() {
        let mut scene = Scene::new();
        let root = scene.spawn(SceneNode::new("root"));
        let child = scene.spawn_child(root, SceneNode::new("child")).unwrap();
        let grandchild = scene
            .spawn_child(child, SceneNode::new("grandchild"))
            .unwrap();
        assert_eq!(scene.descendants(root), vec![child, grandchild]);
        scene.despawn(child);
        assert!(scene.node(grandchild).is_none());
        assert!(scene.node(root).unwrap().children().is_empty());
    }

    #[test]
    fn world_matrix_composes_parents() {
        let mut scene = Scene::new();
        let root = scene.spawn(SceneNode::new("root").at(Vec3::new(1.0, 0.0, 0.0)));
        let child = scene
            .spawn_child(root, SceneNode::new("child").at(Vec3::new(0.0, 2.0, 0.0)))
            .unwrap();
        let (_, _, translation) = scene
            .world_matrix(child)
            .unwrap()
            .to_scale_rotation_translation();
        assert_relative_eq!(translation.x, 1.0);
        assert_relative_eq!(translation.y, 2.0);
    }
}
