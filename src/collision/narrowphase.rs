use glam::Vec3;

use super::shapes::{shallowest_face, Primitive, Proxy};

/// Closest-feature result between two proxies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProxyContact {
    /// Normal on proxy B, pointing towards proxy A.
    pub normal_on_b: Vec3,
    pub point_on_a: Vec3,
    pub point_on_b: Vec3,
    /// Signed separation, negative while penetrating.
    pub distance: f32,
}

impl ProxyContact {
    fn flipped(self) -> Self {
        Self {
            normal_on_b: -self.normal_on_b,
            point_on_a: self.point_on_b,
            point_on_b: self.point_on_a,
            distance: self.distance,
        }
    }
}

/// Narrow phase over plane, sphere and cuboid proxies.
pub struct NarrowPhase;

impl NarrowPhase {
    /// Returns a contact when the proxies are closer than `threshold`.
    pub fn collide(a: &Proxy, b: &Proxy, threshold: f32) -> Option<ProxyContact> {
        match (a.primitive, b.primitive) {
            (Primitive::Plane { .. }, Primitive::Plane { .. }) => None,
            (_, Primitive::Plane { .. }) => Self::against_plane(a, b, threshold),
            (Primitive::Plane { .. }, _) => {
                Self::against_plane(b, a, threshold).map(ProxyContact::flipped)
            }
            (Primitive::Sphere { radius: ra }, Primitive::Sphere { radius: rb }) => {
                Self::spheres(a, ra, b, rb, threshold)
            }
            (Primitive::Sphere { radius }, Primitive::Cuboid { half_extents }) => {
                Self::sphere_cuboid(a, radius, b, half_extents, threshold)
            }
            (Primitive::Cuboid { half_extents }, Primitive::Sphere { radius }) => {
                Self::sphere_cuboid(b, radius, a, half_extents, threshold)
                    .map(ProxyContact::flipped)
            }
            (
                Primitive::Cuboid {
                    half_extents: half_a,
                },
                Primitive::Cuboid {
                    half_extents: half_b,
                },
            ) => SATAlgorithm::intersect_boxes(a, half_a, b, half_b, threshold),
        }
    }

    /// All contact points between two proxies.
    ///
    /// Cuboids report every corner within `threshold`, other pairs their closest feature.
    pub fn manifold(a: &Proxy, b: &Proxy, threshold: f32) -> Vec<ProxyContact> {
        match (a.primitive, b.primitive) {
            (Primitive::Cuboid { half_extents }, Primitive::Plane { .. }) => {
                Self::corners_against(a, half_extents, b, threshold)
            }
            (Primitive::Plane { .. }, Primitive::Cuboid { half_extents }) => {
                Self::corners_against(b, half_extents, a, threshold)
                    .into_iter()
                    .map(ProxyContact::flipped)
                    .collect()
            }
            (
                Primitive::Cuboid {
                    half_extents: half_a,
                },
                Primitive::Cuboid {
                    half_extents: half_b,
                },
            ) => Self::cuboid_pair(a, half_a, b, half_b, threshold),
            _ => Self::collide(a, b, threshold).into_iter().collect(),
        }
    }

    /// Corners of the smaller cuboid against the other's face along the SAT normal.
    fn cuboid_pair(
        a: &Proxy,
        half_a: Vec3,
        b: &Proxy,
        half_b: Vec3,
        threshold: f32,
    ) -> Vec<ProxyContact> {
        let Some(closest) = SATAlgorithm::intersect_boxes(a, half_a, b, half_b, threshold) else {
            return Vec::new();
        };
        let normal = closest.normal_on_b;
        let mut points = Vec::new();
        if half_a.x * half_a.y * half_a.z <= half_b.x * half_b.y * half_b.z {
            let face = normal.dot(b.support(normal));
            for corner in box_corners(a, half_a) {
                let distance = normal.dot(corner) - face;
                if distance < threshold {
                    points.push(ProxyContact {
                        normal_on_b: normal,
                        point_on_a: corner,
                        point_on_b: corner - normal * distance,
                        distance,
                    });
                }
            }
        } else {
            let face = normal.dot(a.support(-normal));
            for corner in box_corners(b, half_b) {
                let distance = face - normal.dot(corner);
                if distance < threshold {
                    points.push(ProxyContact {
                        normal_on_b: normal,
                        point_on_a: corner + normal * distance,
                        point_on_b: corner,
                        distance,
                    });
                }
            }
        }
        if points.is_empty() {
            points.push(closest);
        }
        points
    }

    /// Corners of cuboid `a` lying within `threshold` of `b`'s surface.
    fn corners_against(
        a: &Proxy,
        half_extents: Vec3,
        b: &Proxy,
        threshold: f32,
    ) -> Vec<ProxyContact> {
        let mut points = Vec::new();
        for corner in box_corners(a, half_extents) {
            let (distance, normal) = b.signed_distance(corner);
            if distance < threshold {
                points.push(ProxyContact {
                    normal_on_b: normal,
                    point_on_a: corner,
                    point_on_b: corner - normal * distance,
                    distance,
                });
            }
        }
        points
    }

    fn against_plane(a: &Proxy, plane: &Proxy, threshold: f32) -> Option<ProxyContact> {
        let (normal, constant) = plane.world_plane()?;
        let deepest = a.support(-normal);
        let distance = normal.dot(deepest) - constant;
        (distance < threshold).then(|| ProxyContact {
            normal_on_b: normal,
            point_on_a: deepest,
            point_on_b: deepest - normal * distance,
            distance,
        })
    }

    fn spheres(a: &Proxy, ra: f32, b: &Proxy, rb: f32, threshold: f32) -> Option<ProxyContact> {
        let offset = a.transform.position - b.transform.position;
        let length = offset.length();
        let distance = length - ra - rb;
        if distance >= threshold {
            return None;
        }
        let normal = if length > 1e-6 { offset / length } else { Vec3::Y };
        Some(ProxyContact {
            normal_on_b: normal,
            point_on_a: a.transform.position - normal * ra,
            point_on_b: b.transform.position + normal * rb,
            distance,
        })
    }

    fn sphere_cuboid(
        sphere: &Proxy,
        radius: f32,
        cuboid: &Proxy,
        half_extents: Vec3,
        threshold: f32,
    ) -> Option<ProxyContact> {
        let center = sphere.transform.position;
        let local = cuboid.transform.inverse_transform_point(center);
        let clamped = local.clamp(-half_extents, half_extents);

        let (normal_local, surface_local, distance) = if clamped != local {
            let outside = local - clamped;
            let length = outside.length();
            (outside / length, clamped, length - radius)
        } else {
            let (axis, depth) = shallowest_face(local, half_extents);
            let mut surface = local;
            let index = if axis.x != 0.0 {
                0
            } else if axis.y != 0.0 {
                1
            } else {
                2
            };
            surface[index] = half_extents[index] * axis[index];
            (axis, surface, -depth - radius)
        };

        if distance >= threshold {
            return None;
        }
        let normal = cuboid.transform.rotation * normal_local;
        Some(ProxyContact {
            normal_on_b: normal,
            point_on_a: center - normal * radius,
            point_on_b: cuboid.transform.transform_point(surface_local),
            distance,
        })
    }
}

fn box_corners(proxy: &Proxy, half_extents: Vec3) -> [Vec3; 8] {
    std::array::from_fn(|i| {
        let local = Vec3::new(
            if i & 1 == 0 { -half_extents.x } else { half_extents.x },
            if i & 2 == 0 { -half_extents.y } else { half_extents.y },
            if i & 4 == 0 { -half_extents.z } else { half_extents.z },
        );
        proxy.transform.transform_point(local)
    })
}

/// Separating axis test for oriented boxes.
pub struct SATAlgorithm;

impl SATAlgorithm {
    pub fn intersect_boxes(
        a: &Proxy,
        half_extents_a: Vec3,
        b: &Proxy,
        half_extents_b: Vec3,
        threshold: f32,
    ) -> Option<ProxyContact> {
        let relative_pos = b.transform.position - a.transform.position;

        let axes_a = [
            a.transform.rotation * Vec3::X,
            a.transform.rotation * Vec3::Y,
            a.transform.rotation * Vec3::Z,
        ];
        let axes_b = [
            b.transform.rotation * Vec3::X,
            b.transform.rotation * Vec3::Y,
            b.transform.rotation * Vec3::Z,
        ];

        let mut test_axes = Vec::with_capacity(15);
        test_axes.extend_from_slice(&axes_a);
        test_axes.extend_from_slice(&axes_b);
        for axis_a in &axes_a {
            for axis_b in &axes_b {
                let axis = axis_a.cross(*axis_b);
                if axis.length_squared() > 1e-6 {
                    test_axes.push(axis.normalize());
                }
            }
        }

        let mut min_overlap = f32::MAX;
        let mut min_axis = Vec3::ZERO;

        for axis in test_axes {
            let extent_a = axes_a[0].dot(axis).abs() * half_extents_a.x
                + axes_a[1].dot(axis).abs() * half_extents_a.y
                + axes_a[2].dot(axis).abs() * half_extents_a.z;
            let extent_b = axes_b[0].dot(axis).abs() * half_extents_b.x
                + axes_b[1].dot(axis).abs() * half_extents_b.y
                + axes_b[2].dot(axis).abs() * half_extents_b.z;

            let projection = relative_pos.dot(axis);
            let overlap = (extent_a + extent_b) - projection.abs();

            if overlap <= -threshold {
                return None;
            }
            if overlap < min_overlap {
                min_overlap = overlap;
                // points from A towards B
                min_axis = if projection < 0.0 { -axis } else { axis };
            }
        }

        let normal_on_b = -min_axis.normalize_or(Vec3::Y);
        let distance = -min_overlap;
        let point_on_a = a.support(-normal_on_b);
        Some(ProxyContact {
            normal_on_b,
            point_on_a,
            point_on_b: point_on_a - normal_on_b * distance,
            distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transform;
    use approx::assert_relative_eq;
    use glam::Quat;

    fn cuboid(position: Vec3, half: f32) -> Proxy {
        Proxy::new(
            Primitive::Cuboid {
                half_extents: Vec3::splat(half),
            },
            Transform::from_position(position),
        )
    }

    fn ground() -> Proxy {
        Proxy::new(Primitive::Plane { normal: Vec3::Y }, Transform::default())
    }

    #[test]
    fn resting_box_touches_plane() {
        let contact =
            NarrowPhase::collide(&cuboid(Vec3::new(0.0, 0.49, 0.0), 0.5), &ground(), 0.02)
                .unwrap();
        assert_relative_eq!(contact.distance, -0.01, epsilon = 1e-5);
        assert_relative_eq!(contact.normal_on_b.y, 1.0);
    }

    #[test]
    fn swapped_order_flips_the_normal() {
        let contact =
            NarrowPhase::collide(&ground(), &cuboid(Vec3::new(0.0, 0.49, 0.0), 0.5), 0.02)
                .unwrap();
        assert_relative_eq!(contact.normal_on_b.y, -1.0);
    }

    #[test]
    fn resting_box_reports_its_bottom_face() {
        let points =
            NarrowPhase::manifold(&cuboid(Vec3::new(0.0, 0.5, 0.0), 0.5), &ground(), 0.02);
        assert_eq!(points.len(), 4);
        assert!(points.iter().all(|p| p.normal_on_b.y > 0.99));

        let stacked = NarrowPhase::manifold(
            &cuboid(Vec3::new(0.0, 1.0, 0.0), 0.5),
            &cuboid(Vec3::ZERO, 0.5),
            0.02,
        );
        assert!(!stacked.is_empty());
        assert!(stacked.iter().all(|p| p.normal_on_b.y > 0.99));
    }

    #[test]
    fn separated_spheres_do_not_touch() {
        let a = Proxy::new(
            Primitive::Sphere { radius: 0.5 },
            Transform::from_position(Vec3::ZERO),
        );
        let b = Proxy::new(
            Primitive::Sphere { radius: 0.5 },
            Transform::from_position(Vec3::X * 2.0),
        );
        assert!(NarrowPhase::collide(&a, &b, 0.02).is_none());
    }

    #[test]
    fn sat_normal_points_from_b_to_a() {
        let a = cuboid(Vec3::new(0.0, 0.9, 0.0), 0.5);
        let b = Proxy::new(
            Primitive::Cuboid {
                half_extents: Vec3::splat(0.5),
            },
            Transform::new(Vec3::ZERO, Quat::IDENTITY),
        );
        let contact = NarrowPhase::collide(&a, &b, 0.0).unwrap();
        assert_relative_eq!(contact.normal_on_b.y, 1.0);
        assert_relative_eq!(contact.distance, -0.1, epsilon = 1e-5);
    }

    #[test]
    fn sphere_inside_box_is_pushed_through_nearest_face() {
        let sphere = Proxy::new(
            Primitive::Sphere { radius: 0.25 },
            Transform::from_position(Vec3::new(0.9, 0.0, 0.0)),
        );
        let contact = NarrowPhase::collide(&sphere, &cuboid(Vec3::ZERO, 1.0), 0.0).unwrap();
        assert_relative_eq!(contact.normal_on_b.x, 1.0);
        assert_relative_eq!(contact.distance, -0.35, epsilon = 1e-5);
    }
}
