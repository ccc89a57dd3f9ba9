//! Property tests for the angle arithmetic helpers

use axispost_core::geometry::{
    angle_between, clamped_acos, nearest_equivalent_deg, normalize_angle_deg, slerp,
};
use axispost_core::Vector3;
use proptest::prelude::*;

proptest! {
    #[test]
    fn clamped_acos_is_always_finite(x in -10.0f64..10.0) {
        let a = clamped_acos(x);
        prop_assert!(a.is_finite());
        prop_assert!((0.0..=std::f64::consts::PI).contains(&a));
    }

    #[test]
    fn normalized_degrees_stay_in_half_open_range(a in -5000.0f64..5000.0) {
        let n = normalize_angle_deg(a);
        prop_assert!(n > -180.0 && n <= 180.0);
        let turns = (a - n) / 360.0;
        prop_assert!((turns - turns.round()).abs() < 1e-9);
    }

    #[test]
    fn nearest_equivalent_is_within_half_turn(a in -2000.0f64..2000.0, r in -2000.0f64..2000.0) {
        let e = nearest_equivalent_deg(a, r);
        prop_assert!(e - r > -180.0 - 1e-9 && e - r <= 180.0 + 1e-9);
    }

    #[test]
    fn slerp_steps_are_even(
        ax in -1.0f64..1.0, ay in -1.0f64..1.0, az in 0.2f64..1.0,
        bx in -1.0f64..1.0, by in -1.0f64..1.0, bz in 0.2f64..1.0,
    ) {
        let a = Vector3::new(ax, ay, az).normalize();
        let b = Vector3::new(bx, by, bz).normalize();
        let total = angle_between(&a, &b);
        let mid = slerp(&a, &b, 0.25).unwrap();
        prop_assert!((mid.norm() - 1.0).abs() < 1e-9);
        prop_assert!((angle_between(&a, &mid) - total * 0.25).abs() < 1e-7);
    }
}
