//! Ray queries against contact proxies, used by the vehicle suspension.

use glam::Vec3;

use super::shapes::{Primitive, Proxy};
use crate::native::BodyHandle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastQuery {
    pub origin: Vec3,
    pub direction: Vec3,
    pub max_distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub body: BodyHandle,
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

pub struct Raycast;

impl Raycast {
    /// Closest hit among `proxies`, skipping proxies owned by `exclude`.
    pub fn closest(
        query: &RaycastQuery,
        proxies: &[(BodyHandle, Proxy)],
        exclude: Option<BodyHandle>,
    ) -> Option<RaycastHit> {
        let dir = query.direction.normalize_or_zero();
        if dir == Vec3::ZERO {
            return None;
        }
        proxies
            .iter()
            .filter(|(body, _)| Some(*body) != exclude)
            .filter_map(|(body, proxy)| {
                let (distance, normal) = Self::entry(query.origin, dir, proxy)?;
                (distance <= query.max_distance).then(|| RaycastHit {
                    body: *body,
                    point: query.origin + dir * distance,
                    normal,
                    distance,
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    /// Distance along `dir` where the ray enters `proxy`, with the surface normal there.
    fn entry(origin: Vec3, dir: Vec3, proxy: &Proxy) -> Option<(f32, Vec3)> {
        let pose = &proxy.transform;
        match proxy.primitive {
            Primitive::Plane { .. } => {
                let (normal, constant) = proxy.world_plane()?;
                let facing = normal.dot(dir);
                if facing.abs() < 1e-6 {
                    return None;
                }
                let t = (constant - normal.dot(origin)) / facing;
                let side = if facing < 0.0 { normal } else { -normal };
                (t >= 0.0).then_some((t, side))
            }
            Primitive::Sphere { radius } => {
                let to_origin = origin - pose.position;
                let half_b = to_origin.dot(dir);
                let c = to_origin.length_squared() - radius * radius;
                let root = half_b * half_b - c;
                if root < 0.0 {
                    return None;
                }
                let t = -half_b - root.sqrt();
                if t < 0.0 {
                    return None;
                }
                let normal = (origin + dir * t - pose.position).normalize_or(Vec3::Y);
                Some((t, normal))
            }
            Primitive::Cuboid { half_extents } => {
                // slab test in the box frame
                let local_origin = pose.inverse_transform_point(origin);
                let local_dir = pose.rotation.conjugate() * dir;
                let (t, axis) = slab_entry(local_origin, local_dir, half_extents)?;
                let mut normal = Vec3::ZERO;
                normal[axis] = -local_dir[axis].signum();
                Some((t, pose.rotation * normal))
            }
        }
    }
}

/// Entry distance and entry axis of a ray against an origin-centred box.
fn slab_entry(origin: Vec3, dir: Vec3, half_extents: Vec3) -> Option<(f32, usize)> {
    let mut enter = (0.0_f32, 0_usize);
    let mut exit = f32::INFINITY;
    for axis in 0..3 {
        if dir[axis].abs() < 1e-6 {
            if origin[axis].abs() > half_extents[axis] {
                return None;
            }
            continue;
        }
        let near = (-half_extents[axis].copysign(dir[axis]) - origin[axis]) / dir[axis];
        let far = (half_extents[axis].copysign(dir[axis]) - origin[axis]) / dir[axis];
        if near > enter.0 {
            enter = (near, axis);
        }
        exit = exit.min(far);
        if enter.0 > exit {
            return None;
        }
    }
    Some(enter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transform;
    use approx::assert_relative_eq;

    fn down_from(height: f32, reach: f32) -> RaycastQuery {
        RaycastQuery {
            origin: Vec3::new(0.0, height, 0.0),
            direction: Vec3::NEG_Y,
            max_distance: reach,
        }
    }

    #[test]
    fn downward_ray_hits_ground_plane() {
        let proxies = [(
            BodyHandle(1),
            Proxy::new(Primitive::Plane { normal: Vec3::Y }, Transform::default()),
        )];
        let query = down_from(2.0, 5.0);
        let hit = Raycast::closest(&query, &proxies, None).unwrap();
        assert_relative_eq!(hit.distance, 2.0);
        assert_relative_eq!(hit.normal.y, 1.0);
        assert!(Raycast::closest(&query, &proxies, Some(BodyHandle(1))).is_none());
        assert!(Raycast::closest(&down_from(2.0, 1.5), &proxies, None).is_none());
    }

    #[test]
    fn ray_hits_box_top_face() {
        let proxies = [(
            BodyHandle(2),
            Proxy::new(
                Primitive::Cuboid {
                    half_extents: Vec3::splat(0.5),
                },
                Transform::default(),
            ),
        )];
        let hit = Raycast::closest(&down_from(3.0, 10.0), &proxies, None).unwrap();
        assert_relative_eq!(hit.distance, 2.5);
        assert_relative_eq!(hit.normal.y, 1.0);
        assert_relative_eq!(hit.point.y, 0.5);
    }

    #[test]
    fn nearest_of_stacked_proxies_wins() {
        let proxies = [
            (
                BodyHandle(1),
                Proxy::new(Primitive::Plane { normal: Vec3::Y }, Transform::default()),
            ),
            (
                BodyHandle(2),
                Proxy::new(
                    Primitive::Sphere { radius: 1.0 },
                    Transform::new(Vec3::new(0.0, 1.0, 0.0), glam::Quat::IDENTITY),
                ),
            ),
        ];
        let hit = Raycast::closest(&down_from(4.0, 10.0), &proxies, None).unwrap();
        assert_eq!(hit.body, BodyHandle(2));
        assert_relative_eq!(hit.distance, 2.0, epsilon = 1e-5);
    }
}
