use std::collections::HashMap;

use glam::Vec3;

use crate::core::Transform;
use crate::native::{ShapeGeometry, ShapeHandle};
use crate::utils::math::{inertia_box, inertia_sphere};

/// Compound nesting deeper than this is treated as empty.
const MAX_COMPOUND_DEPTH: usize = 16;

/// Collision primitive understood by the narrow phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    /// Plane through the proxy origin with a local-space normal.
    Plane { normal: Vec3 },
    Sphere { radius: f32 },
    Cuboid { half_extents: Vec3 },
}

/// Primitive placed in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proxy {
    pub primitive: Primitive,
    pub transform: Transform,
}

impl Proxy {
    pub fn new(primitive: Primitive, transform: Transform) -> Self {
        Self {
            primitive,
            transform,
        }
    }

    pub fn bounding_radius(&self) -> f32 {
        match self.primitive {
            Primitive::Plane { .. } => f32::INFINITY,
            Primitive::Sphere { radius } => radius,
            Primitive::Cuboid { half_extents } => half_extents.length(),
        }
    }

    /// World normal and plane constant (`n . x = d`), for plane proxies.
    pub fn world_plane(&self) -> Option<(Vec3, f32)> {
        match self.primitive {
            Primitive::Plane { normal } => {
                let normal = (self.transform.rotation * normal).normalize_or(Vec3::Y);
                Some((normal, normal.dot(self.transform.position)))
            }
            _ => None,
        }
    }

    /// Deepest point of the proxy along `direction`.
    pub fn support(&self, direction: Vec3) -> Vec3 {
        match self.primitive {
            Primitive::Plane { .. } => self.transform.position,
            Primitive::Sphere { radius } => {
                self.transform.position + direction.normalize_or_zero() * radius
            }
            Primitive::Cuboid { half_extents } => {
                let local = self.transform.rotation.conjugate() * direction;
                let corner = Vec3::new(
                    if local.x >= 0.0 { half_extents.x } else { -half_extents.x },
                    if local.y >= 0.0 { half_extents.y } else { -half_extents.y },
                    if local.z >= 0.0 { half_extents.z } else { -half_extents.z },
                );
                self.transform.transform_point(corner)
            }
        }
    }

    /// Signed distance from `point` to the surface and the outward normal there.
    pub fn signed_distance(&self, point: Vec3) -> (f32, Vec3) {
        match self.primitive {
            Primitive::Plane { .. } => {
                let (normal, constant) = self.world_plane().unwrap_or((Vec3::Y, 0.0));
                (normal.dot(point) - constant, normal)
            }
            Primitive::Sphere { radius } => {
                let offset = point - self.transform.position;
                let distance = offset.length();
                (distance - radius, offset.normalize_or(Vec3::Y))
            }
            Primitive::Cuboid { half_extents } => {
                let local = self.transform.inverse_transform_point(point);
                let clamped = local.clamp(-half_extents, half_extents);
                if clamped != local {
                    let outside = local - clamped;
                    let normal = self.transform.rotation * outside.normalize_or(Vec3::Y);
                    return (outside.length(), normal);
                }
                let (axis, depth) = shallowest_face(local, half_extents);
                (-depth, self.transform.rotation * axis)
            }
        }
    }
}

/// Face of a box nearest to an interior point, as a local normal and depth.
pub(crate) fn shallowest_face(local: Vec3, half_extents: Vec3) -> (Vec3, f32) {
    let gaps = half_extents - local.abs();
    let mut axis = 0;
    for candidate in 1..3 {
        if gaps[candidate] < gaps[axis] {
            axis = candidate;
        }
    }
    let mut normal = Vec3::ZERO;
    normal[axis] = if local[axis] >= 0.0 { 1.0 } else { -1.0 };
    (normal, gaps[axis])
}

/// A collision shape owned by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeRecord {
    pub geometry: ShapeGeometry,
    pub children: Vec<(Transform, ShapeHandle)>,
    pub scaling: Vec3,
    pub margin: f32,
}

impl ShapeRecord {
    pub fn new(geometry: ShapeGeometry) -> Self {
        Self {
            geometry,
            children: Vec::new(),
            scaling: Vec3::ONE,
            margin: 0.0,
        }
    }
}

/// Storage for every live collision shape.
#[derive(Debug, Default)]
pub struct ShapeStore {
    shapes: HashMap<ShapeHandle, ShapeRecord>,
}

impl ShapeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: ShapeHandle, record: ShapeRecord) {
        self.shapes.insert(handle, record);
    }

    pub fn get(&self, handle: ShapeHandle) -> Option<&ShapeRecord> {
        self.shapes.get(&handle)
    }

    pub fn get_mut(&mut self, handle: ShapeHandle) -> Option<&mut ShapeRecord> {
        self.shapes.get_mut(&handle)
    }

    pub fn remove(&mut self, handle: ShapeHandle) -> Option<ShapeRecord> {
        self.shapes.remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// World-space proxies for a body using `handle` at `body`.
    pub fn proxies(&self, handle: ShapeHandle, body: &Transform) -> Vec<Proxy> {
        let mut local = Vec::new();
        self.collect_local(handle, Transform::default(), Vec3::ONE, 0, &mut local);
        local
            .into_iter()
            .map(|(offset, primitive)| Proxy::new(primitive, body.combine(&offset)))
            .collect()
    }

    /// Diagonal inertia for `mass` spread over the shape.
    ///
    /// Single spheres are exact; everything else uses the box around its proxies.
    pub fn local_inertia(&self, handle: ShapeHandle, mass: f32) -> Vec3 {
        if mass <= 0.0 {
            return Vec3::ZERO;
        }
        let mut local = Vec::new();
        self.collect_local(handle, Transform::default(), Vec3::ONE, 0, &mut local);
        if let [(offset, Primitive::Sphere { radius })] = local.as_slice() {
            if offset.position == Vec3::ZERO {
                return inertia_sphere(*radius, mass);
            }
        }
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for (offset, primitive) in &local {
            let extent = match primitive {
                Primitive::Plane { .. } => return Vec3::ZERO,
                Primitive::Sphere { radius } => Vec3::splat(*radius),
                Primitive::Cuboid { half_extents } => rotated_extent(offset, *half_extents),
            };
            min = min.min(offset.position - extent);
            max = max.max(offset.position + extent);
        }
        if local.is_empty() {
            return Vec3::ZERO;
        }
        inertia_box(max - min, mass)
    }

    fn collect_local(
        &self,
        handle: ShapeHandle,
        offset: Transform,
        inherited_scale: Vec3,
        depth: usize,
        out: &mut Vec<(Transform, Primitive)>,
    ) {
        let Some(record) = self.shapes.get(&handle) else {
            return;
        };
        if depth > MAX_COMPOUND_DEPTH {
            return;
        }
        let scale = record.scaling * inherited_scale;
        match &record.geometry {
            ShapeGeometry::Compound => {
                for (child_offset, child) in &record.children {
                    let scaled = Transform::new(child_offset.position * scale, child_offset.rotation);
                    self.collect_local(*child, offset.combine(&scaled), scale, depth + 1, out);
                }
            }
            ShapeGeometry::Plane { normal } => {
                out.push((offset, Primitive::Plane { normal: *normal }));
            }
            ShapeGeometry::Sphere { radius } => out.push((
                offset,
                Primitive::Sphere {
                    radius: radius * scale.max_element() + record.margin,
                },
            )),
            ShapeGeometry::Box { half_extents } | ShapeGeometry::Cylinder { half_extents } => {
                out.push((
                    offset,
                    Primitive::Cuboid {
                        half_extents: *half_extents * scale,
                    },
                ))
            }
            ShapeGeometry::Capsule { radius, height } => out.push((
                offset,
                Primitive::Cuboid {
                    half_extents: Vec3::new(*radius, height * 0.5 + radius, *radius) * scale,
                },
            )),
            ShapeGeometry::Cone { radius, height } => out.push((
                offset,
                Primitive::Cuboid {
                    half_extents: Vec3::new(*radius, height * 0.5, *radius) * scale,
                },
            )),
            ShapeGeometry::TriangleMesh { triangles } => {
                let points = triangles.iter().flatten().copied();
                if let Some(bounds) = bounds_proxy(points, scale) {
                    out.push((offset.combine(&bounds.0), bounds.1));
                }
            }
            ShapeGeometry::ConvexHull { points } => {
                if let Some(bounds) = bounds_proxy(points.iter().copied(), scale) {
                    out.push((offset.combine(&bounds.0), bounds.1));
                }
            }
            ShapeGeometry::Heightfield {
                columns,
                rows,
                min_height,
                max_height,
                cell_scale,
                ..
            } => {
                // the grid is centred on its own bounds, like the native heightfield
                let half_extents = Vec3::new(
                    (columns.saturating_sub(1)) as f32 * cell_scale.x * 0.5,
                    (max_height - min_height) * cell_scale.y * 0.5,
                    (rows.saturating_sub(1)) as f32 * cell_scale.z * 0.5,
                ) * scale;
                out.push((offset, Primitive::Cuboid { half_extents }));
            }
        }
    }
}

fn rotated_extent(offset: &Transform, half_extents: Vec3) -> Vec3 {
    let axes = [
        offset.rotation * Vec3::X,
        offset.rotation * Vec3::Y,
        offset.rotation * Vec3::Z,
    ];
    axes[0].abs() * half_extents.x + axes[1].abs() * half_extents.y + axes[2].abs() * half_extents.z
}

fn bounds_proxy(points: impl Iterator<Item = Vec3>, scale: Vec3) -> Option<(Transform, Primitive)> {
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    let mut any = false;
    for point in points {
        let point = point * scale;
        min = min.min(point);
        max = max.max(point);
        any = true;
    }
    any.then(|| {
        (
            Transform::from_position((min + max) * 0.5),
            Primitive::Cuboid {
                half_extents: ((max - min) * 0.5).max(Vec3::splat(1e-3)),
            },
        )
    })
}
