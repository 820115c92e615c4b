//! Affine transformations for placing electrode arrays.
//!
//! An implant is described in its own frame (centred on the origin, rows
//! along x) and then rotated about the surface normal and translated to its
//! implanted location. Positions receive the full affine map; orientation
//! vectors only the linear part.

use nalgebra::{Matrix3, Rotation3, Vector3};

/// An affine transformation: rotation/scale matrix + translation.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// 3x3 rotation/scale matrix.
    pub matrix: Matrix3<f64>,
    /// Translation vector (µm).
    pub translation: Vector3<f64>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            matrix: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }
}

impl Transform {
    /// Create a pure translation.
    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        Self {
            matrix: Matrix3::identity(),
            translation: Vector3::new(dx, dy, dz),
        }
    }

    /// Create a uniform scale about the origin.
    pub fn uniform_scale(factor: f64) -> Self {
        Self {
            matrix: Matrix3::identity() * factor,
            translation: Vector3::zeros(),
        }
    }

    /// Rotation about the surface normal (the z axis), counter-clockwise.
    pub fn rotation_z(angle_rad: f64) -> Self {
        let rot = Rotation3::from_axis_angle(&Vector3::z_axis(), angle_rad);
        Self {
            matrix: *rot.matrix(),
            translation: Vector3::zeros(),
        }
    }

    /// Apply this transformation to a 3D point.
    pub fn apply(&self, point: &[f64; 3]) -> [f64; 3] {
        let v = Vector3::new(point[0], point[1], point[2]);
        let result = self.matrix * v + self.translation;
        [result.x, result.y, result.z]
    }

    /// Apply the linear part to a direction and renormalise it.
    ///
    /// Returns the input unchanged if the transformed vector degenerates.
    pub fn apply_direction(&self, direction: &[f64; 3]) -> [f64; 3] {
        let v = self.matrix * Vector3::new(direction[0], direction[1], direction[2]);
        let norm = v.norm();
        if norm < 1e-12 {
            return *direction;
        }
        [v.x / norm, v.y / norm, v.z / norm]
    }

    /// Compose two transforms: self followed by other.
    pub fn then(&self, other: &Transform) -> Transform {
        Transform {
            matrix: other.matrix * self.matrix,
            translation: other.matrix * self.translation + other.translation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_identity_transform() {
        let t = Transform::default();
        let p = [1.0, 2.0, 3.0];
        let result = t.apply(&p);
        assert_abs_diff_eq!(result[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result[1], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result[2], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotate_then_translate() {
        let t = Transform::rotation_z(std::f64::consts::FRAC_PI_2)
            .then(&Transform::translation(100.0, 0.0, 0.0));
        let result = t.apply(&[10.0, 0.0, 5.0]);
        assert_abs_diff_eq!(result[0], 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result[1], 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result[2], 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_direction_ignores_translation() {
        let t = Transform::uniform_scale(3.0).then(&Transform::translation(5.0, 5.0, 5.0));
        let d = t.apply_direction(&[0.0, 0.0, 1.0]);
        assert_abs_diff_eq!(d[2], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(d[0], 0.0, epsilon = 1e-12);
    }
}
