//! Additional math helpers layered on top of `glam`.

use glam::{Mat4, Quat, Vec3};

/// Expresses `child` relative to `root`, returning the local translation and rotation.
///
/// Scale is dropped here; it travels separately as the child's own scale.
pub fn relative_pose(root: &Mat4, child: &Mat4) -> (Vec3, Quat) {
    let local = root.inverse() * *child;
    let (_, rotation, translation) = local.to_scale_rotation_translation();
    (translation, rotation.normalize())
}

/// Diagonal inertia of a solid box with full extents `size`.
pub fn inertia_box(size: Vec3, mass: f32) -> Vec3 {
    let factor = mass / 12.0;
    Vec3::new(
        factor * (size.y * size.y + size.z * size.z),
        factor * (size.x * size.x + size.z * size.z),
        factor * (size.x * size.x + size.y * size.y),
    )
}

pub fn inertia_sphere(radius: f32, mass: f32) -> Vec3 {
    Vec3::splat(0.4 * mass * radius * radius)
}

/// Reciprocal that maps zero (infinite mass or inertia) to zero.
pub fn safe_recip(value: f32) -> f32 {
    if value.abs() < f32::EPSILON {
        0.0
    } else {
        1.0 / value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn relative_pose_recovers_offset() {
        let root = Mat4::from_rotation_translation(
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            Vec3::new(1.0, 0.0, 0.0),
        );
        let child = root * Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0));
        let (offset, rotation) = relative_pose(&root, &child);
        assert_relative_eq!(offset.y, 2.0, epsilon = 1e-5);
        assert_relative_eq!(offset.x, 0.0, epsilon = 1e-5);
        assert!(rotation.angle_between(Quat::IDENTITY) < 1e-3);
    }

    #[test]
    fn zero_mass_has_zero_inverse() {
        assert_eq!(safe_recip(0.0), 0.0);
        assert_relative_eq!(safe_recip(4.0), 0.25);
    }
}
