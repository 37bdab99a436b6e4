//! Position-based soft bodies: ropes, cloth patches and closed trimeshes.

use std::collections::HashSet;

use glam::{Quat, Vec3};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::collision::Proxy;
use crate::config::{DEFAULT_COLLISION_GROUP, DEFAULT_COLLISION_MASK, DEFAULT_SOFT_MARGIN};
use crate::core::{SoftBodyParams, Transform};
use crate::native::{BodyHandle, SoftGeometry, SoftMaterial, SoftNode};
use crate::protocol::report::SoftKind;

const DEFAULT_POSITION_ITERATIONS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeState {
    pub position: Vec3,
    pub previous: Vec3,
    pub velocity: Vec3,
    pub normal: Vec3,
    /// Zero pins the node in place.
    pub inverse_mass: f32,
}

impl NodeState {
    fn new(position: Vec3) -> Self {
        Self {
            position,
            previous: position,
            velocity: Vec3::ZERO,
            normal: Vec3::ZERO,
            inverse_mass: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    pub a: usize,
    pub b: usize,
    pub rest_length: f32,
}

/// Node pinned to a point fixed in a rigid body's frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub node: usize,
    pub body: BodyHandle,
    pub local: Vec3,
    pub influence: f32,
    pub disable_collision: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoftBody {
    pub kind: SoftKind,
    pub nodes: Vec<NodeState>,
    pub links: Vec<Link>,
    pub faces: Vec<[usize; 3]>,
    pub anchors: Vec<Anchor>,
    pub material: SoftMaterial,
    pub group: i32,
    pub mask: i32,
    pub in_world: bool,
}

impl SoftBody {
    /// Builds the node topology. Returns `None` for empty geometry.
    pub fn from_geometry(geometry: &SoftGeometry) -> Option<Self> {
        let (nodes, links, faces) = match geometry {
            SoftGeometry::Rope {
                start,
                end,
                segments,
                fixed_ends,
            } => build_rope(*start, *end, *segments, *fixed_ends)?,
            SoftGeometry::Patch {
                corners,
                resolution,
                fixed_corners,
            } => build_patch(corners, *resolution, *fixed_corners)?,
            SoftGeometry::Trimesh { vertices, indices } => build_trimesh(vertices, indices)?,
        };
        let mut body = Self {
            kind: geometry.kind(),
            nodes,
            links,
            faces,
            anchors: Vec::new(),
            material: SoftMaterial {
                params: SoftBodyParams::default(),
                friction: 0.5,
                damping: 0.0,
                margin: DEFAULT_SOFT_MARGIN,
            },
            group: DEFAULT_COLLISION_GROUP,
            mask: DEFAULT_COLLISION_MASK,
            in_world: false,
        };
        body.update_normals();
        Some(body)
    }

    /// Bakes scale, rotation and translation into the nodes and link rest lengths.
    pub fn transform(&mut self, transform: Transform, scale: Vec3) {
        let rotation: Quat = transform.rotation;
        for node in &mut self.nodes {
            node.position = transform.position + rotation * (node.position * scale);
            node.previous = node.position;
        }
        for link in &mut self.links {
            link.rest_length = self.nodes[link.a].position.distance(self.nodes[link.b].position);
        }
        self.update_normals();
    }

    /// Spreads `mass` over the free nodes; pinned nodes stay pinned.
    pub fn set_total_mass(&mut self, mass: f32) {
        let free = self.nodes.iter().filter(|n| n.inverse_mass > 0.0).count();
        if free == 0 {
            return;
        }
        let per_node = mass / free as f32;
        let inverse = if per_node > 0.0 { 1.0 / per_node } else { 0.0 };
        for node in self.nodes.iter_mut().filter(|n| n.inverse_mass > 0.0) {
            node.inverse_mass = inverse;
        }
    }

    pub fn append_link(&mut self, a: usize, b: usize) -> bool {
        if a == b || a >= self.nodes.len() || b >= self.nodes.len() {
            return false;
        }
        let rest_length = self.nodes[a].position.distance(self.nodes[b].position);
        self.links.push(Link { a, b, rest_length });
        true
    }

    pub fn append_anchor(&mut self, anchor: Anchor) -> bool {
        if anchor.node >= self.nodes.len() {
            return false;
        }
        self.anchors.push(anchor);
        true
    }

    pub fn exposed_nodes(&self) -> Vec<SoftNode> {
        self.nodes
            .iter()
            .map(|node| SoftNode {
                position: node.position,
                normal: node.normal,
            })
            .collect()
    }

    fn stiffness(&self) -> f32 {
        self.material.params.klst.unwrap_or(1.0).clamp(0.0, 1.0)
    }

    fn anchor_hardness(&self) -> f32 {
        self.material.params.anchor_hardness.unwrap_or(0.7).clamp(0.0, 1.0)
    }

    /// Advances one substep.
    ///
    /// `anchor_target` maps an anchor's body and local point to world space;
    /// anchors whose body is gone are skipped.
    pub fn step<F>(&mut self, dt: f32, gravity: Vec3, colliders: &[Proxy], anchor_target: F)
    where
        F: Fn(BodyHandle, Vec3) -> Option<Vec3>,
    {
        if dt <= 0.0 || !self.in_world {
            return;
        }
        let damping = (1.0 - self.material.damping * dt).max(0.0);
        predict_nodes(&mut self.nodes, gravity, damping, dt);

        let stiffness = self.stiffness();
        let hardness = self.anchor_hardness();
        let margin = self.material.margin;
        let iterations = self
            .material
            .params
            .piterations
            .unwrap_or(DEFAULT_POSITION_ITERATIONS)
            .max(1);
        for _ in 0..iterations {
            for link in &self.links {
                solve_link(&mut self.nodes, link, stiffness);
            }
            for anchor in &self.anchors {
                if let Some(target) = anchor_target(anchor.body, anchor.local) {
                    let node = &mut self.nodes[anchor.node];
                    node.position += (target - node.position) * (hardness * anchor.influence);
                }
            }
            for node in self.nodes.iter_mut().filter(|n| n.inverse_mass > 0.0) {
                for proxy in colliders {
                    let (distance, normal) = proxy.signed_distance(node.position);
                    if distance < margin {
                        node.position += normal * (margin - distance);
                    }
                }
            }
        }

        let inverse_dt = 1.0 / dt;
        for node in &mut self.nodes {
            node.velocity = if node.inverse_mass > 0.0 {
                (node.position - node.previous) * inverse_dt
            } else {
                Vec3::ZERO
            };
        }
        self.update_normals();
    }

    pub fn update_normals(&mut self) {
        if self.faces.is_empty() {
            return;
        }
        let mut normals = vec![Vec3::ZERO; self.nodes.len()];
        for &[a, b, c] in &self.faces {
            let pa = self.nodes[a].position;
            let face = (self.nodes[b].position - pa).cross(self.nodes[c].position - pa);
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }
        for (node, normal) in self.nodes.iter_mut().zip(normals) {
            node.normal = normal.normalize_or_zero();
        }
    }

    /// Approximate world-space bounds as center and radius.
    pub fn bounds(&self) -> (Vec3, f32) {
        if self.nodes.is_empty() {
            return (Vec3::ZERO, 0.0);
        }
        let center =
            self.nodes.iter().map(|n| n.position).sum::<Vec3>() / self.nodes.len() as f32;
        let radius = self
            .nodes
            .iter()
            .map(|n| n.position.distance(center))
            .fold(0.0_f32, f32::max);
        (center, radius + self.material.margin)
    }
}

/// Holds two nodes, possibly from different bodies, together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossLink {
    pub body_a: BodyHandle,
    pub node_a: usize,
    pub body_b: BodyHandle,
    pub node_b: usize,
}

#[cfg(feature = "parallel")]
fn predict_nodes(nodes: &mut [NodeState], gravity: Vec3, damping: f32, dt: f32) {
    nodes.par_iter_mut().for_each(|node| predict_node(node, gravity, damping, dt));
}

#[cfg(not(feature = "parallel"))]
fn predict_nodes(nodes: &mut [NodeState], gravity: Vec3, damping: f32, dt: f32) {
    nodes.iter_mut().for_each(|node| predict_node(node, gravity, damping, dt));
}

fn predict_node(node: &mut NodeState, gravity: Vec3, damping: f32, dt: f32) {
    node.previous = node.position;
    if node.inverse_mass == 0.0 {
        return;
    }
    node.velocity = (node.velocity + gravity * dt) * damping;
    node.position += node.velocity * dt;
}

fn solve_link(nodes: &mut [NodeState], link: &Link, stiffness: f32) {
    let delta = nodes[link.b].position - nodes[link.a].position;
    let length = delta.length();
    let weight = nodes[link.a].inverse_mass + nodes[link.b].inverse_mass;
    if length < 1e-6 || weight == 0.0 {
        return;
    }
    let correction = delta * ((length - link.rest_length) / (length * weight) * stiffness);
    let wa = nodes[link.a].inverse_mass;
    let wb = nodes[link.b].inverse_mass;
    nodes[link.a].position += correction * wa;
    nodes[link.b].position -= correction * wb;
}

type Topology = (Vec<NodeState>, Vec<Link>, Vec<[usize; 3]>);

fn link_between(nodes: &[NodeState], a: usize, b: usize) -> Link {
    Link {
        a,
        b,
        rest_length: nodes[a].position.distance(nodes[b].position),
    }
}

fn build_rope(start: Vec3, end: Vec3, segments: u32, fixed_ends: u32) -> Option<Topology> {
    if segments == 0 {
        return None;
    }
    let count = segments as usize + 1;
    let mut nodes: Vec<NodeState> = (0..count)
        .map(|i| NodeState::new(start.lerp(end, i as f32 / segments as f32)))
        .collect();
    if fixed_ends & 1 != 0 {
        nodes[0].inverse_mass = 0.0;
    }
    if fixed_ends & 2 != 0 {
        nodes[count - 1].inverse_mass = 0.0;
    }
    let links = (1..count).map(|i| link_between(&nodes, i - 1, i)).collect();
    Some((nodes, links, Vec::new()))
}

fn build_patch(corners: &[Vec3; 4], resolution: [u32; 2], fixed_corners: u32) -> Option<Topology> {
    let rx = resolution[0] as usize + 1;
    let ry = resolution[1] as usize + 1;
    if resolution[0] == 0 || resolution[1] == 0 {
        return None;
    }
    let [c00, c10, c01, c11] = *corners;
    let index = |ix: usize, iy: usize| iy * rx + ix;
    let mut nodes = Vec::with_capacity(rx * ry);
    for iy in 0..ry {
        let ty = iy as f32 / (ry - 1) as f32;
        let left = c00.lerp(c01, ty);
        let right = c10.lerp(c11, ty);
        for ix in 0..rx {
            let tx = ix as f32 / (rx - 1) as f32;
            nodes.push(NodeState::new(left.lerp(right, tx)));
        }
    }
    for (bit, node) in [
        (1, index(0, 0)),
        (2, index(rx - 1, 0)),
        (4, index(0, ry - 1)),
        (8, index(rx - 1, ry - 1)),
    ] {
        if fixed_corners & bit != 0 {
            nodes[node].inverse_mass = 0.0;
        }
    }

    let mut links = Vec::new();
    let mut faces = Vec::new();
    for iy in 0..ry {
        for ix in 0..rx {
            if ix + 1 < rx {
                links.push(link_between(&nodes, index(ix, iy), index(ix + 1, iy)));
            }
            if iy + 1 < ry {
                links.push(link_between(&nodes, index(ix, iy), index(ix, iy + 1)));
            }
            if ix + 1 < rx && iy + 1 < ry {
                let (a, b, c, d) = (
                    index(ix, iy),
                    index(ix + 1, iy),
                    index(ix, iy + 1),
                    index(ix + 1, iy + 1),
                );
                links.push(link_between(&nodes, a, d));
                faces.push([a, b, d]);
                faces.push([a, d, c]);
            }
        }
    }
    Some((nodes, links, faces))
}

fn build_trimesh(vertices: &[Vec3], indices: &[[u32; 3]]) -> Option<Topology> {
    if vertices.is_empty() || indices.is_empty() {
        return None;
    }
    let nodes: Vec<NodeState> = vertices.iter().copied().map(NodeState::new).collect();
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    let mut faces = Vec::with_capacity(indices.len());
    for triangle in indices {
        let [a, b, c] = triangle.map(|i| i as usize);
        if a >= nodes.len() || b >= nodes.len() || c >= nodes.len() {
            continue;
        }
        faces.push([a, b, c]);
        for (from, to) in [(a, b), (b, c), (c, a)] {
            if seen.insert((from.min(to), from.max(to))) {
                links.push(link_between(&nodes, from, to));
            }
        }
    }
    if faces.is_empty() {
        return None;
    }
    Some((nodes, links, faces))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::Primitive;
    use approx::assert_relative_eq;

    fn rope(segments: u32, fixed: u32) -> SoftBody {
        let mut body = SoftBody::from_geometry(&SoftGeometry::Rope {
            start: Vec3::new(0.0, 2.0, 0.0),
            end: Vec3::new(2.0, 2.0, 0.0),
            segments,
            fixed_ends: fixed,
        })
        .unwrap();
        body.in_world = true;
        body
    }

    #[test]
    fn rope_has_one_node_per_segment_end() {
        let body = rope(4, 0);
        assert_eq!(body.nodes.len(), 5);
        assert_eq!(body.links.len(), 4);
        assert_relative_eq!(body.links[0].rest_length, 0.5);
    }

    #[test]
    fn empty_geometry_is_rejected() {
        assert!(SoftBody::from_geometry(&SoftGeometry::Trimesh {
            vertices: Vec::new(),
            indices: Vec::new(),
        })
        .is_none());
        assert!(SoftBody::from_geometry(&SoftGeometry::Rope {
            start: Vec3::ZERO,
            end: Vec3::X,
            segments: 0,
            fixed_ends: 0,
        })
        .is_none());
    }

    #[test]
    fn pinned_rope_end_stays_put() {
        let mut body = rope(4, 1);
        for _ in 0..30 {
            body.step(1.0 / 60.0, Vec3::new(0.0, -9.81, 0.0), &[], |_, _| None);
        }
        assert_eq!(body.nodes[0].position, Vec3::new(0.0, 2.0, 0.0));
        assert!(body.nodes[4].position.y < 2.0);
    }

    #[test]
    fn cloth_corners_and_normals() {
        let body = SoftBody::from_geometry(&SoftGeometry::Patch {
            corners: [
                Vec3::new(-1.0, 0.0, -1.0),
                Vec3::new(1.0, 0.0, -1.0),
                Vec3::new(-1.0, 0.0, 1.0),
                Vec3::new(1.0, 0.0, 1.0),
            ],
            resolution: [2, 2],
            fixed_corners: 1 | 2,
        })
        .unwrap();
        assert_eq!(body.nodes.len(), 9);
        assert_eq!(body.faces.len(), 8);
        assert_eq!(body.nodes[0].inverse_mass, 0.0);
        assert_eq!(body.nodes[2].inverse_mass, 0.0);
        assert!(body.nodes[4].normal.y.abs() > 0.99);
    }

    #[test]
    fn trimesh_links_are_shared_between_faces() {
        let body = SoftBody::from_geometry(&SoftGeometry::Trimesh {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE],
            indices: vec![[0, 1, 2], [1, 3, 2]],
        })
        .unwrap();
        assert_eq!(body.faces.len(), 2);
        assert_eq!(body.links.len(), 5);
    }

    #[test]
    fn nodes_rest_on_the_ground_plane() {
        let mut body = rope(2, 0);
        body.transform(Transform::from_position(Vec3::new(0.0, -1.5, 0.0)), Vec3::ONE);
        let ground = Proxy::new(Primitive::Plane { normal: Vec3::Y }, Transform::default());
        for _ in 0..120 {
            body.step(1.0 / 60.0, Vec3::new(0.0, -9.81, 0.0), &[ground], |_, _| None);
        }
        for node in &body.nodes {
            assert!(node.position.y >= body.material.margin - 1e-3);
        }
    }

    #[test]
    fn total_mass_keeps_pins() {
        let mut body = rope(3, 2);
        body.set_total_mass(3.0);
        assert_relative_eq!(body.nodes[0].inverse_mass, 1.0);
        assert_eq!(body.nodes[3].inverse_mass, 0.0);
    }
}
