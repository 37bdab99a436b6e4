//! Shape and body factory: turns object descriptions into native bodies.

use std::collections::HashMap;

use glam::Vec3;
use log::{debug, warn};

use super::registry::{BodyEntry, CompoundEntry};
use super::session::Session;
use crate::config::{DEFAULT_COLLISION_GROUP, DEFAULT_COLLISION_MASK};
use crate::core::{ObjectDescription, ShapeParams, Transform};
use crate::error::{BridgeError, Result};
use crate::native::{
    NativeEngine, RigidBodySetup, ShapeGeometry, ShapeHandle, SoftGeometry, SoftMaterial,
};
use crate::protocol::report::SoftKind;
use crate::utils::allocator::ObjectId;

/// A shape either shared through the cache or owned by a single body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltShape {
    Cached(ShapeHandle),
    Unique(ShapeHandle),
}

impl BuiltShape {
    pub fn handle(self) -> ShapeHandle {
        match self {
            BuiltShape::Cached(handle) | BuiltShape::Unique(handle) => handle,
        }
    }

    pub fn is_unique(self) -> bool {
        matches!(self, BuiltShape::Unique(_))
    }
}

/// Primitive shapes keyed by type and dimensions. Entries live as long as the world.
#[derive(Debug, Default)]
pub struct ShapeCache {
    shapes: HashMap<String, ShapeHandle>,
}

impl ShapeCache {
    pub fn get(&self, key: &str) -> Option<ShapeHandle> {
        self.shapes.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub(crate) fn drain(&mut self) -> Vec<ShapeHandle> {
        self.shapes.drain().map(|(_, handle)| handle).collect()
    }

    /// Returns the cached primitive for `params`, or builds a fresh shape.
    ///
    /// Mesh-derived shapes are never cached since their geometry is unique
    /// to one object.
    pub fn create_shape(
        &mut self,
        engine: &mut dyn NativeEngine,
        id: ObjectId,
        params: &ShapeParams,
    ) -> Result<BuiltShape> {
        let Some(key) = params.cache_key() else {
            let geometry = shape_geometry(id, params)?;
            return Ok(BuiltShape::Unique(engine.create_shape(geometry)));
        };
        if let Some(&handle) = self.shapes.get(&key) {
            return Ok(BuiltShape::Cached(handle));
        }
        let handle = engine.create_shape(shape_geometry(id, params)?);
        debug!("cached shape {key}");
        self.shapes.insert(key, handle);
        Ok(BuiltShape::Cached(handle))
    }
}

fn vec3(values: &[f32]) -> Vec3 {
    Vec3::new(values[0], values[1], values[2])
}

/// Native geometry for a rigid shape description.
pub fn shape_geometry(id: ObjectId, params: &ShapeParams) -> Result<ShapeGeometry> {
    let geometry = match params {
        ShapeParams::Compound => ShapeGeometry::Compound,
        ShapeParams::Plane { normal } => ShapeGeometry::Plane {
            normal: normal.normalize_or(Vec3::Y),
        },
        ShapeParams::Box {
            width,
            height,
            depth,
        } => ShapeGeometry::Box {
            half_extents: Vec3::new(*width, *height, *depth) * 0.5,
        },
        ShapeParams::Sphere { radius } => ShapeGeometry::Sphere { radius: *radius },
        ShapeParams::Cylinder {
            width,
            height,
            depth,
        } => ShapeGeometry::Cylinder {
            half_extents: Vec3::new(*width, *height, *depth) * 0.5,
        },
        ShapeParams::Capsule { radius, height } => ShapeGeometry::Capsule {
            radius: *radius,
            height: *height,
        },
        ShapeParams::Cone { radius, height } => ShapeGeometry::Cone {
            radius: *radius,
            height: *height,
        },
        ShapeParams::Concave { data } => {
            let triangles: Vec<[Vec3; 3]> = data
                .chunks_exact(9)
                .map(|t| [vec3(&t[0..3]), vec3(&t[3..6]), vec3(&t[6..9])])
                .collect();
            if triangles.is_empty() {
                return Err(BridgeError::EmptyGeometry(id));
            }
            ShapeGeometry::TriangleMesh { triangles }
        }
        ShapeParams::Convex { data } => {
            let points: Vec<Vec3> = data.chunks_exact(3).map(vec3).collect();
            if points.is_empty() {
                return Err(BridgeError::EmptyGeometry(id));
            }
            ShapeGeometry::ConvexHull { points }
        }
        ShapeParams::Heightfield {
            xpts,
            ypts,
            xsize,
            ysize,
            points,
        } => {
            let samples = (*xpts as usize) * (*ypts as usize);
            if *xpts < 2 || *ypts < 2 || points.len() < samples {
                return Err(BridgeError::EmptyGeometry(id));
            }
            let heights = points[..samples].to_vec();
            let (min_height, max_height) = heights
                .iter()
                .fold((f32::MAX, f32::MIN), |(lo, hi), &h| (lo.min(h), hi.max(h)));
            ShapeGeometry::Heightfield {
                columns: *xpts,
                rows: *ypts,
                heights,
                min_height,
                max_height,
                cell_scale: Vec3::new(
                    xsize / (*xpts - 1) as f32,
                    1.0,
                    ysize / (*ypts - 1) as f32,
                ),
            }
        }
        ShapeParams::SoftTrimesh { .. }
        | ShapeParams::SoftClothMesh { .. }
        | ShapeParams::SoftRopeMesh { .. }
        | ShapeParams::Unknown => return Err(BridgeError::UnknownShape(id)),
    };
    Ok(geometry)
}

/// Native geometry for a soft body description.
pub fn soft_geometry(id: ObjectId, params: &ShapeParams) -> Result<SoftGeometry> {
    match params {
        ShapeParams::SoftTrimesh {
            a_vertices,
            a_indices,
        } => {
            let vertices: Vec<Vec3> = a_vertices.chunks_exact(3).map(vec3).collect();
            let indices: Vec<[u32; 3]> = a_indices
                .chunks_exact(3)
                .map(|face| [face[0], face[1], face[2]])
                .collect();
            if vertices.is_empty() || indices.is_empty() {
                return Err(BridgeError::EmptyGeometry(id));
            }
            Ok(SoftGeometry::Trimesh { vertices, indices })
        }
        ShapeParams::SoftClothMesh {
            corners,
            segments,
            fixed_corners,
        } => Ok(SoftGeometry::Patch {
            corners: *corners,
            resolution: *segments,
            fixed_corners: *fixed_corners,
        }),
        ShapeParams::SoftRopeMesh {
            start,
            end,
            segments,
            fixed_ends,
        } => Ok(SoftGeometry::Rope {
            start: *start,
            end: *end,
            segments: *segments,
            fixed_ends: *fixed_ends,
        }),
        _ => Err(BridgeError::UnknownShape(id)),
    }
}

impl Session {
    /// Builds and registers one body. Nothing is registered when this fails.
    pub(crate) fn add_object(&mut self, description: &ObjectDescription) -> Result<()> {
        if self.registry.is_live(description.id) {
            return Err(BridgeError::DuplicateId(description.id));
        }
        if description.is_soft() {
            self.add_soft_body(description)
        } else {
            self.add_rigid_body(description)
        }
    }

    fn add_soft_body(&mut self, description: &ObjectDescription) -> Result<()> {
        let id = description.id;
        let geometry = soft_geometry(id, &description.shape)?;
        let kind = geometry.kind();
        let engine = &mut *self.engine;
        let body = engine
            .create_soft_body(&geometry)
            .ok_or(BridgeError::EmptyGeometry(id))?;
        engine.configure_soft_body(
            body,
            &SoftMaterial {
                params: description.soft,
                friction: description.friction,
                damping: description.damping,
                margin: description.effective_margin(),
            },
        );
        engine.transform_soft_body(
            body,
            Transform::new(description.position, description.rotation.normalize()),
            description.scale,
        );
        engine.set_soft_total_mass(body, description.mass);
        engine.add_soft_body(body, DEFAULT_COLLISION_GROUP, DEFAULT_COLLISION_MASK);

        let elements = match kind {
            SoftKind::Trimesh => engine.soft_faces(body).len(),
            SoftKind::Rope | SoftKind::Cloth => engine.soft_nodes(body).len(),
        };
        self.registry
            .register_body(id, BodyEntry::soft(body, kind, elements));
        debug!(
            "added {} {id} with {elements} elements",
            description.shape.type_name()
        );
        Ok(())
    }

    fn add_rigid_body(&mut self, description: &ObjectDescription) -> Result<()> {
        let id = description.id;
        let engine = &mut *self.engine;
        let root = self.shapes.create_shape(engine, id, &description.shape)?;

        let mut compound = None;
        let mut noncached = None;
        let shape = if description.children.is_empty() {
            match (root, &description.shape) {
                (BuiltShape::Unique(handle), ShapeParams::Compound) => {
                    compound = Some(CompoundEntry::new(handle));
                }
                (BuiltShape::Unique(handle), _) => noncached = Some(handle),
                (BuiltShape::Cached(_), _) => {}
            }
            root.handle()
        } else {
            let mut entry = match (root, &description.shape) {
                (BuiltShape::Unique(handle), ShapeParams::Compound) => CompoundEntry::new(handle),
                _ => {
                    let container = engine.create_shape(ShapeGeometry::Compound);
                    let mut entry = CompoundEntry::new(container);
                    engine.add_child_shape(container, root.handle(), Transform::default());
                    if root.is_unique() {
                        entry.owned_children.push(root.handle());
                    }
                    entry
                }
            };
            for child in &description.children {
                let built = match self.shapes.create_shape(engine, id, &child.shape) {
                    Ok(built) => built,
                    Err(err) => {
                        warn!("skipping {} child of object {id}: {err}", child.shape.type_name());
                        continue;
                    }
                };
                if let Some(margin) = child.margin {
                    engine.set_margin(built.handle(), margin);
                }
                if built.is_unique() {
                    engine.set_local_scaling(built.handle(), child.scale);
                    entry.owned_children.push(built.handle());
                }
                engine.add_child_shape(
                    entry.shape,
                    built.handle(),
                    Transform::new(child.position_offset, child.rotation.normalize()),
                );
            }
            let container = entry.shape;
            compound = Some(entry);
            container
        };

        // cached shapes are shared, so only an explicit margin may touch them
        if root.is_unique() || description.margin.is_some() {
            engine.set_margin(shape, description.effective_margin());
        }
        if compound.is_some() || noncached.is_some() {
            engine.set_local_scaling(shape, description.scale);
        }

        let inertia = if description.mass > 0.0 {
            engine.calculate_local_inertia(shape, description.mass)
        } else {
            Vec3::ZERO
        };
        let motion_state = engine.create_motion_state(Transform::new(
            description.position,
            description.rotation.normalize(),
        ));
        let body = engine.create_rigid_body(&RigidBodySetup {
            mass: description.mass,
            motion_state,
            shape,
            local_inertia: inertia,
            friction: description.friction,
            restitution: description.restitution,
            linear_damping: description.damping,
            angular_damping: description.angular_damping,
        });
        if let Some(state) = description.activation_state {
            engine.set_activation_state(body, state);
        }
        if let Some(flags) = description.collision_flags {
            engine.set_collision_flags(body, flags);
        }
        let filter = description.collision_filter();
        engine.add_rigid_body(body, filter);

        self.registry
            .register_body(id, BodyEntry::rigid(body).with_filter(filter));
        self.registry.motion_states.insert(id, motion_state);
        if let Some(entry) = compound {
            self.registry.compound_shapes.insert(id, entry);
        }
        if let Some(handle) = noncached {
            self.registry.noncached_shapes.insert(id, handle);
        }
        debug!(
            "added {} {id} (mass {}, inertia {inertia})",
            description.shape.type_name(),
            description.mass
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxes_use_half_extents() {
        let geometry = shape_geometry(
            ObjectId(1),
            &ShapeParams::Box {
                width: 2.0,
                height: 4.0,
                depth: 6.0,
            },
        )
        .unwrap();
        assert_eq!(
            geometry,
            ShapeGeometry::Box {
                half_extents: Vec3::new(1.0, 2.0, 3.0)
            }
        );
    }

    #[test]
    fn empty_meshes_are_rejected() {
        let id = ObjectId(2);
        assert_eq!(
            shape_geometry(id, &ShapeParams::Concave { data: vec![0.0; 8] }),
            Err(BridgeError::EmptyGeometry(id))
        );
        assert_eq!(
            soft_geometry(
                id,
                &ShapeParams::SoftTrimesh {
                    a_vertices: vec![0.0; 9],
                    a_indices: vec![],
                }
            ),
            Err(BridgeError::EmptyGeometry(id))
        );
        assert_eq!(
            shape_geometry(id, &ShapeParams::Unknown),
            Err(BridgeError::UnknownShape(id))
        );
    }

    #[test]
    fn heightfield_spacing_follows_grid_size() {
        let geometry = shape_geometry(
            ObjectId(3),
            &ShapeParams::Heightfield {
                xpts: 3,
                ypts: 2,
                xsize: 10.0,
                ysize: 4.0,
                points: vec![0.0, 1.0, 2.0, -1.0, 0.5, 3.0],
            },
        )
        .unwrap();
        let ShapeGeometry::Heightfield {
            min_height,
            max_height,
            cell_scale,
            ..
        } = geometry
        else {
            panic!("expected a heightfield");
        };
        assert_eq!((min_height, max_height), (-1.0, 3.0));
        assert_eq!(cell_scale, Vec3::new(5.0, 1.0, 4.0));
    }
}
