//! Kinematic solver: tool orientation to rotary axis angles
//!
//! Pure geometric inversion over the machine's orientation chain. Two-link
//! chains `o = R(e1, a) R(e2, b) s` are solved by fixing `b` from the
//! component of `o` along `e1`, which gives two branches, and then reading
//! `a` off the plane orthogonal to `e1`. Three-link contour chains are
//! decomposed into three rotations about the chain axes.
//!
//! Every solution is checked against the request by forward kinematics, so a
//! returned tuple always reproduces the requested orientation.

use axispost_core::geometry::{
    angle_between, any_perpendicular, clamped_acos, normalize_angle_rad, normalized, rotate,
    signed_angle_about,
};
use axispost_core::{AngleState, AngleTuple, PostError, Result, Vector3};
use axispost_machine::{ChainLink, Machine};
use axispost_settings::PostParameters;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Lower bound on the forward-kinematics check, well above trig round-off
const VERIFY_FLOOR: f64 = 1e-9;

/// Tolerances the solver works with
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverTolerances {
    /// Orientations closer than this to an outer axis are poles (degrees)
    pub pole_angle_deg: f64,
    /// Allowed deviation between requested and reproduced directions
    pub orientation: f64,
}

impl Default for SolverTolerances {
    fn default() -> Self {
        Self {
            pole_angle_deg: 0.01,
            orientation: 1e-10,
        }
    }
}

impl SolverTolerances {
    pub fn from_params(params: &PostParameters) -> Self {
        Self {
            pole_angle_deg: params.pole_angle_tol_deg,
            orientation: params.toolpath_tolerance,
        }
    }

    fn pole_rad(&self) -> f64 {
        self.pole_angle_deg.to_radians()
    }

    fn verify(&self) -> f64 {
        self.orientation.max(VERIFY_FLOOR)
    }
}

/// Input of one solve
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SolveRequest {
    /// Tool orientation in workpiece coordinates
    pub orientation: Vector3<f64>,
    /// Requested saw direction in workpiece coordinates
    pub saw_direction: Option<Vector3<f64>>,
    /// Angle given to the free axis at a pole (radians)
    pub pole_hint_rad: Option<f64>,
    /// Contour axis angle used when no saw direction is requested (radians)
    pub contour_hint_rad: Option<f64>,
}

impl SolveRequest {
    pub fn new(orientation: Vector3<f64>) -> Self {
        Self {
            orientation,
            ..Self::default()
        }
    }

    pub fn with_saw(mut self, saw: Option<Vector3<f64>>) -> Self {
        self.saw_direction = saw;
        self
    }

    pub fn with_pole_hint(mut self, hint_rad: Option<f64>) -> Self {
        self.pole_hint_rad = hint_rad;
        self
    }

    pub fn with_contour_hint(mut self, hint_rad: Option<f64>) -> Self {
        self.contour_hint_rad = hint_rad;
        self
    }
}

/// How an inner axis is tied to the free axis at a pole
///
/// With the free axis moved by `d`, the coupled axis has to move by
/// `-sign * d` for the tool frame to stay put.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coupling {
    pub axis: usize,
    pub sign: f64,
}

/// Set the free axis of `angles` to `value`, dragging a coupled axis along
///
/// Works in whatever angle unit `angles` and `value` share.
pub fn rebase_pole_value(
    angles: &mut AngleTuple,
    pole_axis: usize,
    coupling: Option<Coupling>,
    value: f64,
) {
    let delta = value - angles[pole_axis];
    angles[pole_axis] = value;
    if let Some(c) = coupling {
        angles[c.axis] -= c.sign * delta;
    }
}

/// The two candidate angle tuples for one orientation (radians)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub first: AngleTuple,
    pub second: AngleTuple,
    pub state: AngleState,
    /// Axis whose angle is arbitrary, when the orientation is at a pole
    pub pole_axis: Option<usize>,
    pub coupling: Option<Coupling>,
}

impl Solution {
    fn single(angles: AngleTuple) -> Self {
        Self {
            first: angles,
            second: angles,
            state: AngleState::Determined,
            pole_axis: None,
            coupling: None,
        }
    }

    pub fn candidates(&self) -> [AngleTuple; 2] {
        [self.first, self.second]
    }

    pub fn is_pole(&self) -> bool {
        self.pole_axis.is_some()
    }

    /// Move the free angle of both tuples to `value_rad`
    ///
    /// A coupled inner angle is shifted so the combined rotation, and with it
    /// the tool frame, stays unchanged. No-op away from a pole.
    pub fn rebase_pole_angle(&mut self, value_rad: f64) {
        let Some(axis) = self.pole_axis else {
            return;
        };
        for tuple in [&mut self.first, &mut self.second] {
            rebase_pole_value(tuple, axis, self.coupling, value_rad);
            *tuple = tuple.map(normalize_angle_rad);
        }
    }
}

/// Inverse kinematics for one machine
#[derive(Debug, Clone)]
pub struct KinematicSolver<'a> {
    machine: &'a Machine,
    tolerances: SolverTolerances,
    chain: Vec<ChainLink>,
}

impl<'a> KinematicSolver<'a> {
    pub fn new(machine: &'a Machine, tolerances: SolverTolerances) -> Self {
        Self {
            machine,
            tolerances,
            chain: machine.orientation_chain(),
        }
    }

    pub fn machine(&self) -> &'a Machine {
        self.machine
    }

    pub fn tolerances(&self) -> &SolverTolerances {
        &self.tolerances
    }

    /// Axis that becomes free at a pole: the outer link of the chain
    pub fn pole_axis(&self) -> Option<usize> {
        if self.chain.len() >= 2 {
            self.chain.first().map(|l| l.axis)
        } else {
            None
        }
    }

    /// Contour axis of a 5+1 machine
    pub fn contour_axis(&self) -> Option<usize> {
        match self.machine {
            Machine::FivePlusOne(_) => Some(2),
            _ => None,
        }
    }

    /// Solve one orientation request
    pub fn solve(&self, request: &SolveRequest) -> Result<Solution> {
        let target = normalized(&self.machine.to_table_frame(&request.orientation))
            .ok_or_else(|| PostError::infeasible("tool orientation has zero length"))?;
        let spindle = self.machine.tool_spindle();

        let solution = match self.machine {
            Machine::ThreeAxis(_) => self.solve_fixed(&spindle, &target)?,
            Machine::FourAxis(_) => self.solve_one(&spindle, &target)?,
            Machine::FiveAxis(_) => {
                self.solve_two(&self.chain[0], &self.chain[1], &spindle, &target, request)?
            }
            Machine::FivePlusOne(_) => self.solve_five_plus_one(&spindle, &target, request)?,
            Machine::SixAxisContour(_) => self.solve_six(&target, request)?,
        };

        self.verify(&solution, &target, request)?;
        Ok(solution)
    }

    fn solve_fixed(&self, spindle: &Vector3<f64>, target: &Vector3<f64>) -> Result<Solution> {
        let deviation = (target - spindle).norm();
        if deviation > self.tolerances.orientation {
            return Err(PostError::infeasible(format!(
                "orientation deviates from the spindle by {:.3e}",
                deviation
            )));
        }
        Ok(Solution::single(AngleTuple::zeros(0)))
    }

    fn solve_one(&self, spindle: &Vector3<f64>, target: &Vector3<f64>) -> Result<Solution> {
        let link = &self.chain[0];
        let e = &link.direction;
        let cone = (e.dot(target) - e.dot(spindle)).abs();
        if cone > self.tolerances.orientation {
            return Err(PostError::infeasible(format!(
                "orientation is outside the reachable cone of rotary axis {} ({:.3e})",
                link.axis, cone
            )));
        }
        let mut angles = AngleTuple::zeros(1);
        angles[link.axis] = normalize_angle_rad(signed_angle_about(spindle, target, e));
        Ok(Solution::single(angles))
    }

    /// Two-link inversion; `hint` fixes the outer angle at a pole
    fn two_link_angles(
        &self,
        outer: &ChainLink,
        inner: &ChainLink,
        spindle: &Vector3<f64>,
        target: &Vector3<f64>,
        hint: Option<f64>,
    ) -> ([(f64, f64); 2], bool) {
        let e1 = &outer.direction;
        let e2 = &inner.direction;
        let e12 = e1.dot(e2);
        let s2 = e2.dot(spindle);
        let a = e1.dot(spindle) - s2 * e12;
        let b = e1.dot(&e2.cross(spindle));
        let c = s2 * e12;
        let r = a.hypot(b);
        let phi = b.atan2(a);
        let spread = if r > 0.0 {
            clamped_acos((e1.dot(target) - c) / r)
        } else {
            0.0
        };
        let betas = [phi + spread, phi - spread];

        let off_axis = angle_between(target, e1);
        let pole = off_axis <= self.tolerances.pole_rad()
            || std::f64::consts::PI - off_axis <= self.tolerances.pole_rad();

        if pole {
            let alpha = hint.unwrap_or(0.0);
            let wanted = rotate(target, e1, -alpha);
            let beta = betas
                .iter()
                .copied()
                .min_by(|x, y| {
                    let dx = (rotate(spindle, e2, *x) - wanted).norm();
                    let dy = (rotate(spindle, e2, *y) - wanted).norm();
                    dx.total_cmp(&dy)
                })
                .unwrap_or(phi);
            trace!(
                "Pole on rotary axis {}: free angle {:.6} rad",
                outer.axis,
                alpha
            );
            return ([(alpha, beta), (alpha, beta)], true);
        }

        let pair = |beta: f64| {
            let tilted = rotate(spindle, e2, beta);
            (signed_angle_about(&tilted, target, e1), beta)
        };
        ([pair(betas[0]), pair(betas[1])], false)
    }

    fn solve_two(
        &self,
        outer: &ChainLink,
        inner: &ChainLink,
        spindle: &Vector3<f64>,
        target: &Vector3<f64>,
        request: &SolveRequest,
    ) -> Result<Solution> {
        let (pairs, pole) =
            self.two_link_angles(outer, inner, spindle, target, request.pole_hint_rad);
        let n = self.machine.rotary_axis_count();
        let tuple = |(alpha, beta): (f64, f64)| {
            let mut t = AngleTuple::zeros(n);
            t[outer.axis] = normalize_angle_rad(alpha);
            t[inner.axis] = normalize_angle_rad(beta);
            t
        };
        Ok(Solution {
            first: tuple(pairs[0]),
            second: tuple(pairs[1]),
            state: if pole {
                AngleState::undetermined_axis(outer.axis)
            } else {
                AngleState::Determined
            },
            pole_axis: pole.then_some(outer.axis),
            coupling: None,
        })
    }

    fn solve_five_plus_one(
        &self,
        spindle: &Vector3<f64>,
        target: &Vector3<f64>,
        request: &SolveRequest,
    ) -> Result<Solution> {
        let tilting: Vec<&ChainLink> = self.chain.iter().filter(|l| l.axis < 2).collect();
        let contour = self
            .chain
            .iter()
            .find(|l| l.axis == 2)
            .ok_or_else(|| PostError::other("5+1 machine without a contour axis"))?;
        let (outer, inner) = (tilting[0], tilting[1]);
        let mut solution = self.solve_two(outer, inner, spindle, target, request)?;

        let saw = self
            .machine
            .tool_saw()
            .ok_or_else(|| PostError::other("5+1 machine without a saw direction"))?;
        let wanted_saw = request
            .saw_direction
            .and_then(|w| normalized(&self.machine.to_table_frame(&w)));

        for tuple in [&mut solution.first, &mut solution.second] {
            let kappa = match wanted_saw {
                Some(w) => {
                    let local = rotate(
                        &rotate(&w, &outer.direction, -tuple[outer.axis]),
                        &inner.direction,
                        -tuple[inner.axis],
                    );
                    signed_angle_about(&saw, &local, &contour.direction)
                }
                None => request.contour_hint_rad.unwrap_or(0.0),
            };
            tuple[contour.axis] = normalize_angle_rad(kappa);
        }

        if solution.is_pole() && wanted_saw.is_some() {
            let tilted = rotate(&contour.direction, &inner.direction, solution.first[inner.axis]);
            let sign = tilted.dot(&outer.direction).signum();
            solution.coupling = Some(Coupling {
                axis: contour.axis,
                sign,
            });
            solution.state = pole_case(sign);
        }
        Ok(solution)
    }

    fn solve_six(&self, target: &Vector3<f64>, request: &SolveRequest) -> Result<Solution> {
        let spindle = self.machine.tool_spindle();
        let saw = self
            .machine
            .tool_saw()
            .ok_or_else(|| PostError::other("contour machine without a saw direction"))?;
        let wanted_saw = request
            .saw_direction
            .and_then(|w| normalized(&self.machine.to_table_frame(&w)))
            .ok_or_else(|| PostError::infeasible("6-axis move without a saw direction"))?;

        // Tool frame rotation that carries the spindle onto the target and
        // the saw onto the requested saw direction
        let tool_frame = frame_from(&spindle, &saw)?;
        let target_frame = frame_from(target, &wanted_saw)?;
        let rotation = target_frame * tool_frame.transpose();

        let [a, b, c] = [&self.chain[0], &self.chain[1], &self.chain[2]];
        let c_target = rotation * c.direction;
        let (pairs, pole) =
            self.two_link_angles(a, b, &c.direction, &c_target, request.pole_hint_rad);

        let probe = any_perpendicular(&c.direction);
        let rotated_probe = rotation * probe;
        let mut tuples = [AngleTuple::zeros(3); 2];
        for (tuple, (alpha, beta)) in tuples.iter_mut().zip(pairs) {
            let residual = rotate(
                &rotate(&rotated_probe, &a.direction, -alpha),
                &b.direction,
                -beta,
            );
            let gamma = signed_angle_about(&probe, &residual, &c.direction);
            tuple[a.axis] = normalize_angle_rad(alpha);
            tuple[b.axis] = normalize_angle_rad(beta);
            tuple[c.axis] = normalize_angle_rad(gamma);
        }

        let (state, coupling) = if pole {
            let tilted = rotate(&c.direction, &b.direction, tuples[0][b.axis]);
            let sign = tilted.dot(&a.direction).signum();
            (
                pole_case(sign),
                Some(Coupling {
                    axis: c.axis,
                    sign,
                }),
            )
        } else {
            (AngleState::Determined, None)
        };

        Ok(Solution {
            first: tuples[0],
            second: tuples[1],
            state,
            pole_axis: pole.then_some(a.axis),
            coupling,
        })
    }

    fn verify(&self, solution: &Solution, target: &Vector3<f64>, request: &SolveRequest) -> Result<()> {
        let mut tol = self.tolerances.verify();
        if solution.is_pole() {
            tol += 2.0 * self.tolerances.pole_rad();
        }
        for tuple in solution.candidates() {
            let reached = self.machine.table_orientation(&tuple);
            let miss = (reached - target).norm();
            if miss > tol {
                return Err(PostError::infeasible(format!(
                    "orientation not reachable by the rotary axes (miss {:.3e})",
                    miss
                )));
            }
            if let (Some(wanted), Some(saw)) = (request.saw_direction, self.machine.tool_saw()) {
                let Some(wanted) = normalized(&self.machine.to_table_frame(&wanted)) else {
                    continue;
                };
                let reached_saw = self.machine.chain_rotate(&saw, &tuple);
                let miss = (reached_saw - wanted).norm();
                if miss > tol {
                    return Err(PostError::infeasible(format!(
                        "saw direction not reachable (miss {:.3e})",
                        miss
                    )));
                }
            }
        }
        Ok(())
    }
}

fn pole_case(sign: f64) -> AngleState {
    if sign >= 0.0 {
        AngleState::UndeterminedCaseEqual
    } else {
        AngleState::UndeterminedCaseOpposite
    }
}

/// Orthonormal frame with `primary` as first column and `secondary`
/// orthogonalized against it as second
fn frame_from(
    primary: &Vector3<f64>,
    secondary: &Vector3<f64>,
) -> Result<axispost_core::Matrix3<f64>> {
    let x = normalized(primary).ok_or_else(|| PostError::infeasible("null direction"))?;
    let y = normalized(&(secondary - x * x.dot(secondary)))
        .ok_or_else(|| PostError::infeasible("saw direction is parallel to the tool orientation"))?;
    let z = x.cross(&y);
    Ok(axispost_core::Matrix3::from_columns(&[x, y, z]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axispost_machine::{FiveAxisTopology, FrameDefinition, Mounting, RotaryAxis};
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    fn solver(machine: &Machine) -> KinematicSolver<'_> {
        KinematicSolver::new(machine, SolverTolerances::default())
    }

    #[test]
    fn test_three_axis_accepts_only_spindle() {
        let m = Machine::three_axis(FrameDefinition::default()).unwrap();
        let s = solver(&m);
        let sol = s.solve(&SolveRequest::new(Vector3::z())).unwrap();
        assert!(sol.first.is_empty());
        assert!(sol.state.is_determined());
        let err = s.solve(&SolveRequest::new(Vector3::x())).unwrap_err();
        assert!(err.is_infeasible());
    }

    #[test]
    fn test_four_axis_cone() {
        let m = Machine::four_axis(
            FrameDefinition::default(),
            RotaryAxis::new(Vector3::x(), Mounting::Head),
        )
        .unwrap();
        let s = solver(&m);
        let sol = s
            .solve(&SolveRequest::new(Vector3::new(0.0, -1.0, 1.0)))
            .unwrap();
        assert!((sol.first[0] - FRAC_PI_4).abs() < 1e-12);
        assert_eq!(sol.first, sol.second);
        // Any X component is out of reach for an A axis
        assert!(s.solve(&SolveRequest::new(Vector3::new(1.0, 0.0, 1.0))).is_err());
    }

    #[test]
    fn test_five_axis_two_branches() {
        let m = Machine::default_five_axis().unwrap();
        let s = solver(&m);
        let o = Vector3::new(1.0, 1.0, 1.0).normalize();
        let sol = s.solve(&SolveRequest::new(o)).unwrap();
        assert!(sol.state.is_determined());
        assert_ne!(sol.first, sol.second);
        for t in sol.candidates() {
            assert!((m.orientation_from_angles(&t) - o).norm() < 1e-9);
        }
        // The branches tilt in opposite directions
        assert!((sol.first[1] + sol.second[1]).abs() < 1e-9);
    }

    #[test]
    fn test_pole_on_outer_axis() {
        let m = Machine::default_five_axis().unwrap();
        let s = solver(&m);
        let sol = s.solve(&SolveRequest::new(Vector3::z())).unwrap();
        assert_eq!(sol.state, AngleState::Rot1Undetermined);
        assert_eq!(sol.pole_axis, Some(0));
        assert_eq!(sol.first[0], 0.0);
        assert!(sol.first[1].abs() < 1e-12);

        let hinted = s
            .solve(&SolveRequest::new(Vector3::z()).with_pole_hint(Some(0.5)))
            .unwrap();
        assert_eq!(hinted.first[0], 0.5);
    }

    #[test]
    fn test_pole_inside_tolerance() {
        let m = Machine::default_five_axis().unwrap();
        let s = solver(&m);
        let tilt = 0.001f64.to_radians();
        let o = Vector3::new(tilt.sin(), 0.0, tilt.cos());
        let sol = s.solve(&SolveRequest::new(o)).unwrap();
        assert_eq!(sol.pole_axis, Some(0));
    }

    #[test]
    fn test_solving_is_repeatable() {
        let m = Machine::default_five_axis().unwrap();
        let s = solver(&m);
        let req = SolveRequest::new(Vector3::new(0.3, -0.2, 0.9).normalize());
        assert_eq!(s.solve(&req).unwrap(), s.solve(&req).unwrap());
    }

    #[test]
    fn test_unreachable_orientation_on_head_head() {
        // Both axes tilt within 45 deg cones, so pointing down is out of reach
        let m = Machine::five_axis(
            FrameDefinition::default(),
            FiveAxisTopology::HeadHead,
            [
                RotaryAxis::new(Vector3::new(0.0, 1.0, 1.0), Mounting::Head),
                RotaryAxis::new(Vector3::new(1.0, 0.0, 1.0), Mounting::Head),
            ],
        )
        .unwrap();
        let err = solver(&m).solve(&SolveRequest::new(-Vector3::z())).unwrap_err();
        assert!(err.is_infeasible());
    }

    #[test]
    fn test_five_plus_one_aligns_saw() {
        let m = Machine::five_plus_one(
            FrameDefinition::default(),
            FiveAxisTopology::HeadTable,
            [
                RotaryAxis::new(-Vector3::z(), Mounting::Table),
                RotaryAxis::new(-Vector3::y(), Mounting::Head),
            ],
            RotaryAxis::new(Vector3::z(), Mounting::Head),
            Vector3::x(),
        )
        .unwrap();
        let s = solver(&m);
        let o = Vector3::new(0.0, 1.0, 1.0).normalize();
        let saw = Vector3::new(1.0, 0.0, 0.0);
        let sol = s.solve(&SolveRequest::new(o).with_saw(Some(saw))).unwrap();
        for t in sol.candidates() {
            assert!((m.saw_from_angles(&t).unwrap() - saw).norm() < 1e-9);
        }

        let sol = s
            .solve(&SolveRequest::new(o).with_contour_hint(Some(0.25)))
            .unwrap();
        assert!((sol.first[2] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_six_axis_reproduces_frame() {
        let m = Machine::default_six_axis_contour().unwrap();
        let s = solver(&m);
        let o = Vector3::new(0.2, -0.4, 0.8).normalize();
        let saw = o.cross(&Vector3::y()).normalize();
        let sol = s.solve(&SolveRequest::new(o).with_saw(Some(saw))).unwrap();
        assert!(sol.state.is_determined());
        for t in sol.candidates() {
            assert!((m.orientation_from_angles(&t) - o).norm() < 1e-9);
            assert!((m.saw_from_angles(&t).unwrap() - saw).norm() < 1e-9);
        }
    }

    #[test]
    fn test_six_axis_pole_and_rebase() {
        let m = Machine::default_six_axis_contour().unwrap();
        let s = solver(&m);
        // Outer chain link is table axis 2, (+1,0,0) in the table frame
        let chain = m.orientation_chain();
        let a = chain[0].direction;
        let c = chain[2].direction;
        // Choose a target frame that puts the inner axis along the outer one
        let o = rotate(&Vector3::z(), &chain[1].direction, FRAC_PI_2);
        let saw = rotate(&Vector3::x(), &chain[1].direction, FRAC_PI_2);
        let mut sol = s.solve(&SolveRequest::new(o).with_saw(Some(saw))).unwrap();
        assert!(!sol.state.is_determined(), "{:?}", sol.state);
        assert_eq!(sol.pole_axis, Some(chain[0].axis));
        assert!(matches!(
            sol.state,
            AngleState::UndeterminedCaseEqual | AngleState::UndeterminedCaseOpposite
        ));
        assert!(a.dot(&c).abs() < 1e-12);

        sol.rebase_pole_angle(PI / 3.0);
        assert!((sol.first[chain[0].axis] - PI / 3.0).abs() < 1e-12);
        assert!((m.orientation_from_angles(&sol.first) - o).norm() < 1e-9);
        assert!((m.saw_from_angles(&sol.first).unwrap() - saw).norm() < 1e-9);
    }

    #[test]
    fn test_rebase_pole_value_coupled() {
        let mut t = AngleTuple::from_slice(&[10.0, 20.0, 30.0]);
        rebase_pole_value(&mut t, 0, Some(Coupling { axis: 2, sign: 1.0 }), 15.0);
        assert_eq!(t.as_slice(), &[15.0, 20.0, 25.0]);
        rebase_pole_value(&mut t, 0, Some(Coupling { axis: 2, sign: -1.0 }), 5.0);
        assert_eq!(t.as_slice(), &[5.0, 20.0, 35.0]);
        rebase_pole_value(&mut t, 1, None, 0.0);
        assert_eq!(t.as_slice(), &[5.0, 0.0, 35.0]);
    }
}
