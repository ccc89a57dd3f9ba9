//! Homogeneous transforms with a cached inverse

use axispost_core::{ConfigurationError, Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// 4x4 homogeneous transform together with its inverse
///
/// The inverse is derived once at construction and recomputed whenever
/// the matrix is rescaled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedTransform {
    matrix: Matrix4<f64>,
    inverse: Matrix4<f64>,
}

impl CachedTransform {
    /// Wrap `matrix`, failing when it cannot be inverted
    pub fn new(matrix: Matrix4<f64>, what: &str) -> Result<Self, ConfigurationError> {
        let inverse = matrix
            .try_inverse()
            .ok_or_else(|| ConfigurationError::SingularTransform {
                what: what.to_string(),
            })?;
        Ok(Self { matrix, inverse })
    }

    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
            inverse: Matrix4::identity(),
        }
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    pub fn inverse(&self) -> &Matrix4<f64> {
        &self.inverse
    }

    pub fn apply_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.matrix.transform_point(p)
    }

    pub fn apply_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.matrix.transform_vector(v)
    }

    pub fn invert_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.inverse.transform_point(p)
    }

    pub fn invert_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.inverse.transform_vector(v)
    }

    /// Scale the translation part by `factor` and refresh the inverse
    pub fn scaled(&self, factor: f64) -> Self {
        let mut matrix = self.matrix;
        for row in 0..3 {
            matrix[(row, 3)] *= factor;
        }
        // Scaling a translation never makes an invertible matrix singular
        let inverse = matrix.try_inverse().unwrap_or(self.inverse);
        Self { matrix, inverse }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singular_matrix_rejected() {
        let err = CachedTransform::new(Matrix4::zeros(), "workpiece transform").unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::SingularTransform {
                what: "workpiece transform".to_string()
            }
        );
    }

    #[test]
    fn test_point_roundtrip_and_scaling() {
        let m = Matrix4::new_translation(&Vector3::new(10.0, 0.0, -5.0));
        let t = CachedTransform::new(m, "holder").unwrap();
        let p = Point3::new(1.0, 2.0, 3.0);
        let q = t.apply_point(&p);
        assert_eq!(q, Point3::new(11.0, 2.0, -2.0));
        assert!((t.invert_point(&q) - p).norm() < 1e-12);
        assert_eq!(t.apply_vector(&Vector3::x()), Vector3::x());

        let s = t.scaled(2.0);
        assert_eq!(s.apply_point(&Point3::origin()), Point3::new(20.0, 0.0, -10.0));
        let back = s.invert_point(&Point3::new(20.0, 0.0, -10.0));
        assert!((back - Point3::origin()).norm() < 1e-12);
    }
}
