//! Plain-data object descriptions produced by shape builders and consumed once by the factory.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::utils::allocator::ObjectId;

/// Geometry of an object, tagged by the `type` field on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ShapeParams {
    /// Root of a compound; the geometry lives in the description's children.
    Compound,
    Plane {
        normal: Vec3,
    },
    Box {
        width: f32,
        height: f32,
        depth: f32,
    },
    Sphere {
        radius: f32,
    },
    Cylinder {
        width: f32,
        height: f32,
        depth: f32,
    },
    Capsule {
        radius: f32,
        height: f32,
    },
    Cone {
        radius: f32,
        height: f32,
    },
    /// Static triangle mesh, nine floats per triangle.
    Concave {
        data: Vec<f32>,
    },
    /// Convex hull over a flat xyz point cloud.
    Convex {
        data: Vec<f32>,
    },
    /// Regular grid of sample heights, `xpts * ypts` values in row-major order.
    Heightfield {
        xpts: u32,
        ypts: u32,
        xsize: f32,
        ysize: f32,
        points: Vec<f32>,
    },
    SoftTrimesh {
        a_vertices: Vec<f32>,
        a_indices: Vec<u32>,
    },
    SoftClothMesh {
        /// Corners in order: top-left, top-right, bottom-left, bottom-right.
        corners: [Vec3; 4],
        segments: [u32; 2],
        /// Bit mask of pinned corners, same order as `corners`.
        #[serde(default)]
        fixed_corners: u32,
    },
    SoftRopeMesh {
        start: Vec3,
        end: Vec3,
        segments: u32,
        /// Bit 0 pins the start node, bit 1 pins the end node.
        #[serde(default)]
        fixed_ends: u32,
    },
    /// Any type tag this build does not know about.
    #[serde(other)]
    Unknown,
}

impl ShapeParams {
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            ShapeParams::SoftTrimesh { .. }
                | ShapeParams::SoftClothMesh { .. }
                | ShapeParams::SoftRopeMesh { .. }
        )
    }

    /// Wire name of the type tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            ShapeParams::Compound => "compound",
            ShapeParams::Plane { .. } => "plane",
            ShapeParams::Box { .. } => "box",
            ShapeParams::Sphere { .. } => "sphere",
            ShapeParams::Cylinder { .. } => "cylinder",
            ShapeParams::Capsule { .. } => "capsule",
            ShapeParams::Cone { .. } => "cone",
            ShapeParams::Concave { .. } => "concave",
            ShapeParams::Convex { .. } => "convex",
            ShapeParams::Heightfield { .. } => "heightfield",
            ShapeParams::SoftTrimesh { .. } => "softTrimesh",
            ShapeParams::SoftClothMesh { .. } => "softClothMesh",
            ShapeParams::SoftRopeMesh { .. } => "softRopeMesh",
            ShapeParams::Unknown => "unknown",
        }
    }

    /// Cache key for primitive shapes; `None` for shapes that are unique per instance.
    pub fn cache_key(&self) -> Option<String> {
        match self {
            ShapeParams::Plane { normal } => {
                Some(format!("plane_{}_{}_{}", normal.x, normal.y, normal.z))
            }
            ShapeParams::Box {
                width,
                height,
                depth,
            } => Some(format!("box_{width}_{height}_{depth}")),
            ShapeParams::Sphere { radius } => Some(format!("sphere_{radius}")),
            ShapeParams::Cylinder {
                width,
                height,
                depth,
            } => Some(format!("cylinder_{width}_{height}_{depth}")),
            ShapeParams::Capsule { radius, height } => Some(format!("capsule_{radius}_{height}")),
            ShapeParams::Cone { radius, height } => Some(format!("cone_{radius}_{height}")),
            _ => None,
        }
    }

    /// Folds a node scale into primitive dimensions, since cached primitives
    /// are shared and never locally scaled. Returns false for shapes that
    /// keep their geometry and rely on the engine's local scaling instead.
    ///
    /// Round cross sections take the larger of the x/z factors.
    pub fn bake_scale(&mut self, scale: Vec3) -> bool {
        let scale = scale.abs();
        let radial = scale.x.max(scale.z);
        match self {
            ShapeParams::Box {
                width,
                height,
                depth,
            }
            | ShapeParams::Cylinder {
                width,
                height,
                depth,
            } => {
                *width *= scale.x;
                *height *= scale.y;
                *depth *= scale.z;
            }
            ShapeParams::Sphere { radius } => *radius *= scale.max_element(),
            ShapeParams::Capsule { radius, height } | ShapeParams::Cone { radius, height } => {
                *radius *= radial;
                *height *= scale.y;
            }
            _ => return false,
        }
        true
    }
}

/// Native activation states, numbered as the engine numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ActivationState {
    #[default]
    Active = 1,
    IslandSleeping = 2,
    WantsDeactivation = 3,
    DisableDeactivation = 4,
    DisableSimulation = 5,
}

/// Soft-body solver and material settings. Unset values keep engine defaults.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SoftBodyParams {
    pub viterations: Option<u32>,
    pub piterations: Option<u32>,
    pub diterations: Option<u32>,
    pub citerations: Option<u32>,
    pub pressure: Option<f32>,
    pub drag: Option<f32>,
    pub lift: Option<f32>,
    pub anchor_hardness: Option<f32>,
    pub rigid_hardness: Option<f32>,
    /// Linear stiffness coefficient.
    pub klst: Option<f32>,
    /// Angular stiffness coefficient.
    pub kast: Option<f32>,
    /// Volume stiffness coefficient.
    pub kvst: Option<f32>,
}

/// One flattened compound child, posed relative to the compound root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildDescription {
    #[serde(flatten)]
    pub shape: ShapeParams,
    pub position_offset: Vec3,
    #[serde(default = "identity_quat")]
    pub rotation: Quat,
    #[serde(default = "unit_scale")]
    pub scale: Vec3,
    #[serde(default)]
    pub margin: Option<f32>,
}

/// Everything the worker needs to build one body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDescription {
    #[serde(default)]
    pub id: ObjectId,
    #[serde(flatten)]
    pub shape: ShapeParams,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default = "identity_quat")]
    pub rotation: Quat,
    #[serde(default = "unit_scale")]
    pub scale: Vec3,
    #[serde(default)]
    pub mass: f32,
    #[serde(default = "default_friction")]
    pub friction: f32,
    #[serde(default)]
    pub restitution: f32,
    #[serde(default)]
    pub damping: f32,
    #[serde(default)]
    pub angular_damping: f32,
    #[serde(default)]
    pub margin: Option<f32>,
    #[serde(default)]
    pub group: Option<i32>,
    #[serde(default)]
    pub mask: Option<i32>,
    #[serde(default)]
    pub collision_flags: Option<u32>,
    #[serde(default)]
    pub activation_state: Option<ActivationState>,
    #[serde(default)]
    pub children: Vec<ChildDescription>,
    #[serde(flatten)]
    pub soft: SoftBodyParams,
}

fn identity_quat() -> Quat {
    Quat::IDENTITY
}

fn unit_scale() -> Vec3 {
    Vec3::ONE
}

fn default_friction() -> f32 {
    0.5
}

impl ObjectDescription {
    pub fn new(shape: ShapeParams) -> Self {
        Self {
            id: ObjectId::default(),
            shape,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            mass: 0.0,
            friction: default_friction(),
            restitution: 0.0,
            damping: 0.0,
            angular_damping: 0.0,
            margin: None,
            group: None,
            mask: None,
            collision_flags: None,
            activation_state: None,
            children: Vec::new(),
            soft: SoftBodyParams::default(),
        }
    }

    pub fn box_shape(width: f32, height: f32, depth: f32) -> Self {
        Self::new(ShapeParams::Box {
            width,
            height,
            depth,
        })
    }

    pub fn sphere(radius: f32) -> Self {
        Self::new(ShapeParams::Sphere { radius })
    }

    pub fn plane(normal: Vec3) -> Self {
        Self::new(ShapeParams::Plane { normal })
    }

    pub fn with_id(mut self, id: ObjectId) -> Self {
        self.id = id;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_material(mut self, friction: f32, restitution: f32) -> Self {
        self.friction = friction;
        self.restitution = restitution;
        self
    }

    pub fn with_collision_filter(mut self, group: i32, mask: i32) -> Self {
        self.group = Some(group);
        self.mask = Some(mask);
        self
    }

    pub fn with_child(mut self, child: ChildDescription) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_soft(&self) -> bool {
        self.shape.is_soft()
    }

    /// Margin to apply when the description does not set one.
    pub fn effective_margin(&self) -> f32 {
        self.margin.unwrap_or(if self.is_soft() {
            crate::config::DEFAULT_SOFT_MARGIN
        } else {
            crate::config::DEFAULT_RIGID_MARGIN
        })
    }

    /// Explicit group/mask, only when both halves are present.
    pub fn collision_filter(&self) -> Option<(i32, i32)> {
        match (self.group, self.mask) {
            (Some(group), Some(mask)) => Some((group, mask)),
            _ => None,
        }
    }
}

impl ChildDescription {
    pub fn new(shape: ShapeParams, position_offset: Vec3, rotation: Quat) -> Self {
        Self {
            shape,
            position_offset,
            rotation,
            scale: Vec3::ONE,
            margin: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_cache_keys_follow_dimensions() {
        let a = ShapeParams::Box {
            width: 1.0,
            height: 2.0,
            depth: 3.0,
        };
        assert_eq!(a.cache_key().as_deref(), Some("box_1_2_3"));
        assert_eq!(
            ShapeParams::Sphere { radius: 0.5 }.cache_key().as_deref(),
            Some("sphere_0.5")
        );
        assert!(ShapeParams::Convex { data: vec![] }.cache_key().is_none());
    }

    #[test]
    fn scale_folds_into_primitive_dimensions() {
        let mut crate_box = ShapeParams::Box {
            width: 1.0,
            height: 2.0,
            depth: 3.0,
        };
        assert!(crate_box.bake_scale(Vec3::new(2.0, 0.5, 1.0)));
        assert_eq!(crate_box.cache_key().as_deref(), Some("box_2_1_3"));

        let mut pill = ShapeParams::Capsule {
            radius: 0.5,
            height: 1.0,
        };
        assert!(pill.bake_scale(Vec3::new(2.0, 3.0, 4.0)));
        assert_eq!(
            pill,
            ShapeParams::Capsule {
                radius: 2.0,
                height: 3.0
            }
        );

        let mut ground = ShapeParams::Plane { normal: Vec3::Y };
        assert!(!ground.bake_scale(Vec3::splat(3.0)));
        assert_eq!(ground, ShapeParams::Plane { normal: Vec3::Y });
    }

    #[test]
    fn soft_margin_defaults_differ_from_rigid() {
        let rigid = ObjectDescription::sphere(1.0);
        assert_eq!(rigid.effective_margin(), 0.0);

        let soft = ObjectDescription::new(ShapeParams::SoftRopeMesh {
            start: Vec3::ZERO,
            end: Vec3::X,
            segments: 4,
            fixed_ends: 0,
        });
        assert!((soft.effective_margin() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn filter_requires_both_group_and_mask() {
        let mut desc = ObjectDescription::sphere(1.0);
        desc.group = Some(2);
        assert!(desc.collision_filter().is_none());
        desc.mask = Some(4);
        assert_eq!(desc.collision_filter(), Some((2, 4)));
    }
}
