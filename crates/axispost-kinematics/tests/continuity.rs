//! Selected angle sequences reproduce the requested orientations and stay
//! continuous

use axispost_core::{Point3, Vector3};
use axispost_kinematics::{
    ContinuitySelector, ContinuityState, KinematicSolver, SelectContext, SolveRequest,
    SolverTolerances,
};
use axispost_machine::{FiveAxisTopology, FrameDefinition, Machine, Mounting, RotaryAxis};
use axispost_settings::PostParameters;
use proptest::prelude::*;

fn machines() -> Vec<Machine> {
    vec![
        Machine::default_five_axis().unwrap(),
        Machine::five_axis(
            FrameDefinition::default(),
            FiveAxisTopology::HeadHead,
            [
                RotaryAxis::new(Vector3::z(), Mounting::Head),
                RotaryAxis::new(Vector3::x(), Mounting::Head),
            ],
        )
        .unwrap(),
        Machine::five_axis(
            FrameDefinition::default(),
            FiveAxisTopology::TableTableNew,
            [
                RotaryAxis::new(Vector3::x(), Mounting::Table),
                RotaryAxis::new(Vector3::z(), Mounting::Table),
            ],
        )
        .unwrap(),
    ]
}

fn direction(tilt_deg: f64, azimuth_deg: f64) -> Vector3<f64> {
    let (t, a) = (tilt_deg.to_radians(), azimuth_deg.to_radians());
    Vector3::new(t.sin() * a.cos(), t.sin() * a.sin(), t.cos())
}

proptest! {
    #[test]
    fn selected_angles_reproduce_orientations(
        start_tilt in 5.0f64..80.0,
        start_azimuth in -180.0f64..180.0,
        steps in prop::collection::vec((-4.0f64..4.0, -15.0f64..15.0), 1..40),
    ) {
        let params = PostParameters::default();
        for machine in machines() {
            let selector = ContinuitySelector::new(&machine, &params, 30.0);
            let mut state = ContinuityState::new();
            let part = Point3::new(1.0, 2.0, 3.0);
            let (mut tilt, mut azimuth) = (start_tilt, start_azimuth);
            let mut previous = None;

            for (i, (dt, da)) in steps.iter().enumerate() {
                tilt = (tilt + dt).clamp(5.0, 80.0);
                azimuth += da;
                let o = direction(tilt, azimuth);
                let request = selector.request_for(o, None, &state);
                let solution = selector.solver().solve(&request).unwrap();
                let out = selector
                    .select(&solution, &SelectContext::new(&part, i), &mut state)
                    .unwrap();

                let back = machine.orientation_from_angles(&out.angles.to_radians());
                prop_assert!((back - o).norm() < 1e-8, "{}: {:?} vs {:?}", machine.kind_name(), back, o);

                if let Some(prev) = previous {
                    let (_, delta) = out.angles.max_delta(&prev);
                    prop_assert!(delta <= params.angle_change_limit || out.rewind.is_some());
                }
                previous = Some(out.angles);
            }
        }
    }

    #[test]
    fn solving_is_repeatable(tilt in 0.0f64..179.0, azimuth in -180.0f64..180.0) {
        let tolerances = SolverTolerances::default();
        for machine in machines() {
            let solver = KinematicSolver::new(&machine, tolerances);
            let request = SolveRequest::new(direction(tilt, azimuth));
            let a = solver.solve(&request);
            let b = solver.solve(&request);
            prop_assert_eq!(a, b);
        }
    }
}
