use axispost_core::{Point3, Vector3};
use axispost_kinematics::{
    ContinuitySelector, ContinuityState, KinematicSolver, SelectContext, SolveRequest,
    SolverTolerances,
};
use axispost_machine::Machine;
use axispost_settings::PostParameters;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn orientations(n: usize) -> Vec<Vector3<f64>> {
    (0..n)
        .map(|i| {
            let t = i as f64 / n as f64;
            let tilt = 0.6 * (t * 7.0).sin();
            let azimuth = t * std::f64::consts::TAU * 3.0;
            Vector3::new(
                tilt.sin() * azimuth.cos(),
                tilt.sin() * azimuth.sin(),
                tilt.cos(),
            )
        })
        .collect()
}

fn bench_solve(c: &mut Criterion) {
    let five = Machine::default_five_axis().expect("default 5-axis machine");
    let six = Machine::default_six_axis_contour().expect("default 6-axis machine");
    let dirs = orientations(1000);

    c.bench_function("solve_five_axis_1000", |b| {
        let solver = KinematicSolver::new(&five, SolverTolerances::default());
        b.iter(|| {
            for o in &dirs {
                let _ = black_box(solver.solve(&SolveRequest::new(*o)));
            }
        })
    });

    c.bench_function("solve_six_axis_1000", |b| {
        let solver = KinematicSolver::new(&six, SolverTolerances::default());
        b.iter(|| {
            for o in &dirs {
                let saw = o.cross(&Vector3::z()).try_normalize(1e-9).unwrap_or_else(Vector3::x);
                let request = SolveRequest::new(*o).with_saw(Some(saw));
                let _ = black_box(solver.solve(&request));
            }
        })
    });
}

fn bench_select(c: &mut Criterion) {
    let machine = Machine::default_five_axis().expect("default 5-axis machine");
    let params = PostParameters::default();
    let dirs = orientations(1000);
    let part = Point3::origin();

    c.bench_function("select_five_axis_1000", |b| {
        let selector = ContinuitySelector::new(&machine, &params, 50.0);
        b.iter(|| {
            let mut state = ContinuityState::new();
            for (i, o) in dirs.iter().enumerate() {
                let request = selector.request_for(*o, None, &state);
                if let Ok(solution) = selector.solver().solve(&request) {
                    let _ = black_box(selector.select(&solution, &SelectContext::new(&part, i), &mut state));
                }
            }
        })
    });
}

criterion_group!(benches, bench_solve, bench_select);
criterion_main!(benches);
