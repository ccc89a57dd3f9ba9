//! Geometry helpers shared by the kinematic stages
//!
//! Thin wrappers over `nalgebra` for axis rotations, projections and the
//! angle arithmetic (wrapping, winding, blending) used throughout posting.

use nalgebra::{Point3, Rotation3, Unit, Vector3};
use std::f64::consts::PI;

/// Vectors shorter than this are treated as null
pub const ZERO_LENGTH_TOL: f64 = 1e-12;

/// Angular tolerance (radians) for parallel / coincident axis checks
pub const PARALLEL_TOL: f64 = 1e-9;

/// `acos` that never produces NaN for arguments drifting outside [-1, 1]
pub fn clamped_acos(x: f64) -> f64 {
    x.clamp(-1.0, 1.0).acos()
}

pub fn is_null(v: &Vector3<f64>) -> bool {
    v.norm() <= ZERO_LENGTH_TOL
}

/// Unit vector along `v`, or `None` for a null vector
pub fn normalized(v: &Vector3<f64>) -> Option<Vector3<f64>> {
    if is_null(v) {
        None
    } else {
        Some(v / v.norm())
    }
}

/// Unsigned angle between two vectors in radians, stable near 0 and PI
pub fn angle_between(u: &Vector3<f64>, v: &Vector3<f64>) -> f64 {
    u.cross(v).norm().atan2(u.dot(v))
}

/// True when `u` and `v` point along the same line (either sense)
pub fn are_parallel(u: &Vector3<f64>, v: &Vector3<f64>, tol: f64) -> bool {
    let angle = angle_between(u, v);
    angle <= tol || PI - angle <= tol
}

/// Rotate a vector about a direction through the origin
pub fn rotate(v: &Vector3<f64>, axis: &Vector3<f64>, angle: f64) -> Vector3<f64> {
    Rotation3::from_axis_angle(&Unit::new_normalize(*axis), angle) * v
}

/// Rotate a point about the line through `base` along `axis`
pub fn rotate_point_about(
    p: &Point3<f64>,
    base: &Point3<f64>,
    axis: &Vector3<f64>,
    angle: f64,
) -> Point3<f64> {
    base + rotate(&(p - base), axis, angle)
}

/// Component of `v` orthogonal to the unit vector `n`
pub fn project_on_plane(v: &Vector3<f64>, n: &Vector3<f64>) -> Vector3<f64> {
    v - n * n.dot(v)
}

/// Signed rotation about the unit `axis` that carries `from` onto `to`,
/// measured on the plane orthogonal to `axis`
pub fn signed_angle_about(from: &Vector3<f64>, to: &Vector3<f64>, axis: &Vector3<f64>) -> f64 {
    let f = project_on_plane(from, axis);
    let t = project_on_plane(to, axis);
    axis.dot(&f.cross(&t)).atan2(f.dot(&t))
}

/// Some unit vector orthogonal to `v`
pub fn any_perpendicular(v: &Vector3<f64>) -> Vector3<f64> {
    let helper = if v.x.abs() <= v.y.abs() && v.x.abs() <= v.z.abs() {
        Vector3::x()
    } else if v.y.abs() <= v.z.abs() {
        Vector3::y()
    } else {
        Vector3::z()
    };
    let p = v.cross(&helper);
    p / p.norm()
}

/// Index (0 = x) of the largest absolute component
pub fn dominant_axis(v: &Vector3<f64>) -> usize {
    let a = v.abs();
    if a.x >= a.y && a.x >= a.z {
        0
    } else if a.y >= a.z {
        1
    } else {
        2
    }
}

/// Angle in radians mapped into (-PI, PI]
pub fn normalize_angle_rad(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a <= -PI {
        a += 2.0 * PI;
    } else if a > PI {
        a -= 2.0 * PI;
    }
    a
}

/// Angle in degrees mapped into (-180, 180]
pub fn normalize_angle_deg(angle: f64) -> f64 {
    let mut a = angle % 360.0;
    if a <= -180.0 {
        a += 360.0;
    } else if a > 180.0 {
        a -= 360.0;
    }
    a
}

/// The 360-degree equivalent of `angle` closest to `reference`
///
/// The returned delta to `reference` lies in (-180, 180].
pub fn nearest_equivalent_deg(angle: f64, reference: f64) -> f64 {
    reference + normalize_angle_deg(angle - reference)
}

/// Cubic ease (3t^2 - 2t^3) with zero slope at both ends
pub fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Spherical blend between two unit vectors
///
/// Returns `None` when the vectors are exactly opposite and the blending
/// plane is therefore undefined.
pub fn slerp(a: &Vector3<f64>, b: &Vector3<f64>, t: f64) -> Option<Vector3<f64>> {
    let omega = angle_between(a, b);
    if PI - omega <= 1e-12 {
        return None;
    }
    if omega <= 1e-15 {
        return normalized(&(a + (b - a) * t)).or(Some(*a));
    }
    let s = omega.sin();
    let v = a * (((1.0 - t) * omega).sin() / s) + b * ((t * omega).sin() / s);
    normalized(&v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_clamped_acos_never_nan() {
        assert_eq!(clamped_acos(1.0 + 1e-12), 0.0);
        assert!(close(clamped_acos(-1.0 - 1e-9), PI));
        assert!(close(clamped_acos(0.0), PI / 2.0));
    }

    #[test]
    fn test_signed_angle_about_z() {
        let a = signed_angle_about(&Vector3::x(), &Vector3::y(), &Vector3::z());
        assert!(close(a, PI / 2.0));
        let a = signed_angle_about(&Vector3::y(), &Vector3::x(), &Vector3::z());
        assert!(close(a, -PI / 2.0));
    }

    #[test]
    fn test_rotate_point_about_offset_axis() {
        let p = Point3::new(2.0, 0.0, 0.0);
        let base = Point3::new(1.0, 0.0, 0.0);
        let r = rotate_point_about(&p, &base, &Vector3::z(), PI / 2.0);
        assert!(close(r.x, 1.0) && close(r.y, 1.0) && close(r.z, 0.0));
    }

    #[test]
    fn test_angle_wrapping() {
        assert!(close(normalize_angle_deg(190.0), -170.0));
        assert!(close(normalize_angle_deg(-180.0), 180.0));
        assert!(close(normalize_angle_deg(540.0), 180.0));
        assert!(close(normalize_angle_rad(3.0 * PI), PI));
        assert!(close(nearest_equivalent_deg(10.0, 350.0), 370.0));
        assert!(close(nearest_equivalent_deg(-170.0, 170.0), 190.0));
    }

    #[test]
    fn test_smoothstep() {
        assert!(close(smoothstep(0.5), 0.5));
        assert!(close(smoothstep(0.0), 0.0));
        assert!(close(smoothstep(1.0), 1.0));
    }

    #[test]
    fn test_slerp_rejects_opposite() {
        assert!(slerp(&Vector3::z(), &(-Vector3::z()), 0.5).is_none());
        let mid = slerp(&Vector3::z(), &Vector3::x(), 0.5).unwrap();
        assert!(close(angle_between(&mid, &Vector3::z()), PI / 4.0));
    }

    #[test]
    fn test_perpendicular_and_parallel() {
        let v = Vector3::new(0.0, 0.3, 0.9);
        let p = any_perpendicular(&v);
        assert!(close(p.dot(&v), 0.0));
        assert!(are_parallel(&Vector3::z(), &(-Vector3::z()), PARALLEL_TOL));
        assert!(!are_parallel(&Vector3::z(), &Vector3::x(), PARALLEL_TOL));
        assert_eq!(dominant_axis(&Vector3::new(0.1, -0.9, 0.2)), 1);
    }
}
