//! Construction-time checks for machine definitions
//!
//! Every check fails with a [`ConfigurationError`] so a malformed machine is
//! rejected before any move is solved.

use axispost_core::geometry::{are_parallel, normalized, PARALLEL_TOL};
use axispost_core::{ConfigurationError, Matrix3, Vector3};

use crate::axis::{rotary_axis_name, translation_axis_name, RotaryAxis, TranslationAxes};

/// Determinant magnitude below which translation directions count as coplanar
const COPLANAR_TOL: f64 = 1e-9;

/// Unit vector along `v` or a null-vector error naming `what`
pub fn unit_or_err(v: &Vector3<f64>, what: &str) -> Result<Vector3<f64>, ConfigurationError> {
    normalized(v).ok_or_else(|| ConfigurationError::NullVector {
        what: what.to_string(),
    })
}

pub fn check_limits(axis: &str, min: f64, max: f64) -> Result<(), ConfigurationError> {
    if min > max {
        return Err(ConfigurationError::InvertedLimit {
            axis: axis.to_string(),
            min,
            max,
        });
    }
    Ok(())
}

/// Normalize a rotary axis and check its limits
pub fn normalize_rotary(axis: &RotaryAxis, index: usize) -> Result<RotaryAxis, ConfigurationError> {
    let name = rotary_axis_name(index);
    let direction = unit_or_err(&axis.direction, &format!("rotary axis {} direction", name))?;
    check_limits(&name, axis.min_deg, axis.max_deg)?;
    Ok(RotaryAxis {
        direction,
        ..axis.clone()
    })
}

/// Normalize translation directions, check limits, and return `D^-1`
/// where the columns of `D` are the axis directions
pub fn normalize_translation(
    axes: &TranslationAxes,
) -> Result<(TranslationAxes, Matrix3<f64>), ConfigurationError> {
    let mut out = axes.clone();
    for i in 0..3 {
        let name = translation_axis_name(i);
        out.directions[i] =
            unit_or_err(&axes.directions[i], &format!("translation axis {} direction", name))?;
        check_limits(name, axes.min[i], axes.max[i])?;
    }
    let d = Matrix3::from_columns(&out.directions);
    if d.determinant().abs() < COPLANAR_TOL {
        return Err(ConfigurationError::DegenerateTranslationAxes);
    }
    let inverse = d
        .try_inverse()
        .ok_or(ConfigurationError::DegenerateTranslationAxes)?;
    Ok((out, inverse))
}

pub fn check_not_parallel(
    a: &Vector3<f64>,
    b: &Vector3<f64>,
    first: usize,
    second: usize,
) -> Result<(), ConfigurationError> {
    if are_parallel(a, b, PARALLEL_TOL) {
        return Err(ConfigurationError::ParallelRotaryAxes { first, second });
    }
    Ok(())
}

/// A rotary axis that has to tilt the spindle must not lie along it
pub fn check_spindle_not_along(
    spindle: &Vector3<f64>,
    axis_dir: &Vector3<f64>,
    axis: usize,
) -> Result<(), ConfigurationError> {
    if are_parallel(spindle, axis_dir, PARALLEL_TOL) {
        return Err(ConfigurationError::SpindleParallelToAxis { axis });
    }
    Ok(())
}

/// Normalize a saw direction and reject one along the spindle
pub fn normalize_saw(
    saw: &Vector3<f64>,
    spindle: &Vector3<f64>,
) -> Result<Vector3<f64>, ConfigurationError> {
    let saw = unit_or_err(saw, "saw direction")?;
    if are_parallel(&saw, spindle, PARALLEL_TOL) {
        return Err(ConfigurationError::SawParallelToSpindle);
    }
    Ok(saw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_vector_named() {
        let err = unit_or_err(&Vector3::zeros(), "spindle direction").unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::NullVector {
                what: "spindle direction".to_string()
            }
        );
    }

    #[test]
    fn test_inverted_rotary_limits() {
        let axis = crate::axis::RotaryAxis::new(Vector3::z(), crate::axis::Mounting::Head)
            .with_limits(10.0, -10.0);
        let err = normalize_rotary(&axis, 1).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvertedLimit { ref axis, .. } if axis == "R2"));
    }

    #[test]
    fn test_coplanar_translation_axes() {
        let mut axes = TranslationAxes::default();
        axes.directions[2] = Vector3::new(1.0, 1.0, 0.0);
        assert_eq!(
            normalize_translation(&axes).unwrap_err(),
            ConfigurationError::DegenerateTranslationAxes
        );
    }

    #[test]
    fn test_translation_inverse_for_skewed_axes() {
        let mut axes = TranslationAxes::default();
        axes.directions[0] = Vector3::new(2.0, 0.0, 0.0);
        let (norm, inv) = normalize_translation(&axes).unwrap();
        assert!((norm.directions[0].norm() - 1.0).abs() < 1e-12);
        assert!((inv - Matrix3::identity()).norm() < 1e-12);
    }

    #[test]
    fn test_saw_along_spindle_rejected() {
        assert_eq!(
            normalize_saw(&Vector3::new(0.0, 0.0, -2.0), &Vector3::z()).unwrap_err(),
            ConfigurationError::SawParallelToSpindle
        );
        assert!(normalize_saw(&Vector3::x(), &Vector3::z()).is_ok());
    }
}
