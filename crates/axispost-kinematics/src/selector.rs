//! Solution continuity selector
//!
//! Picks one of the solver's candidate tuples per move so the emitted angle
//! sequence stays continuous. Decision order for a move:
//! - first move of a run: configured start policy
//! - pole: free angle from the pole handling policy
//! - pair choice: auto (smallest total change) or fixed first / other pair
//! - machine limits: shift by whole turns or force the other candidate
//! - jump check against `angle_change_limit`
//!
//! Angles are wound: every axis is taken as the 360-degree equivalent
//! closest to the previous accepted value, so output never wraps.

use axispost_core::geometry::{nearest_equivalent_deg, normalize_angle_deg};
use axispost_core::{AngleState, AngleTuple, Point3, PostError, Result, Vector3};
use axispost_machine::{LimitHit, Machine, MachineType};
use axispost_settings::{PoleHandling, PostParameters, SolutionForStartAngle, StartAngleType};
use std::cmp::Ordering;
use tracing::{debug, trace};

use crate::head_table::{HeadTableStrategy, PoleMove};
use crate::solver::{rebase_pole_value, Coupling, KinematicSolver, SolveRequest, Solution, SolverTolerances};
use crate::state::{ContinuityState, PoleSegment};

/// Widest outward search for a free angle that keeps translations in range
const POLE_SEARCH_SPAN_DEG: i32 = 180;

/// Per-move input besides the solved candidates
#[derive(Debug, Clone, Copy)]
pub struct SelectContext<'a> {
    /// Tool tip in workpiece coordinates
    pub part: &'a Point3<f64>,
    pub rapid: bool,
    /// Original toolpath index, for error reporting
    pub index: usize,
    /// Axis left out of the jump check
    pub ignore_axis_in_jump: Option<usize>,
}

impl<'a> SelectContext<'a> {
    pub fn new(part: &'a Point3<f64>, index: usize) -> Self {
        Self {
            part,
            rapid: false,
            index,
            ignore_axis_in_jump: None,
        }
    }

    pub fn with_rapid(mut self, rapid: bool) -> Self {
        self.rapid = rapid;
        self
    }

    pub fn ignoring_axis(mut self, axis: Option<usize>) -> Self {
        self.ignore_axis_in_jump = axis;
        self
    }
}

/// Why a retract / rewind has to precede the selected move
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RewindCause {
    /// Rotary axis change above the limit (signed degrees)
    AngleJump { axis: usize, delta: f64 },
    /// The continuous solution left the machine limits
    Limit(LimitHit),
}

/// Result of selecting a move
#[derive(Debug, Clone, PartialEq)]
pub struct Selected {
    /// Wound angles in degrees
    pub angles: AngleTuple,
    /// Translation axis coordinates
    pub machine: Point3<f64>,
    pub state: AngleState,
    pub rewind: Option<RewindCause>,
    /// Free axis and its coupling when the move sits at a pole
    pub pole: Option<(usize, Option<Coupling>)>,
}

/// Candidate after limit handling
struct Fitted {
    angles: AngleTuple,
    machine: Point3<f64>,
}

/// Continuity selector for one machine and parameter set
#[derive(Debug, Clone)]
pub struct ContinuitySelector<'a> {
    machine: &'a Machine,
    params: &'a PostParameters,
    solver: KinematicSolver<'a>,
    tool_length: f64,
}

impl<'a> ContinuitySelector<'a> {
    pub fn new(machine: &'a Machine, params: &'a PostParameters, tool_length: f64) -> Self {
        Self {
            machine,
            params,
            solver: KinematicSolver::new(machine, SolverTolerances::from_params(params)),
            tool_length,
        }
    }

    pub fn solver(&self) -> &KinematicSolver<'a> {
        &self.solver
    }

    pub fn tool_length(&self) -> f64 {
        self.tool_length
    }

    /// Solve request carrying the previous free and contour angles as hints
    pub fn request_for(
        &self,
        orientation: Vector3<f64>,
        saw: Option<Vector3<f64>>,
        state: &ContinuityState,
    ) -> SolveRequest {
        let pole_hint = self.solver.pole_axis().and_then(|a| state.previous_rad(a));
        let contour_hint = self.solver.contour_axis().and_then(|a| state.previous_rad(a));
        SolveRequest::new(orientation)
            .with_saw(saw)
            .with_pole_hint(pole_hint)
            .with_contour_hint(contour_hint)
    }

    /// Candidate closest to `previous`, wound onto it (degrees)
    pub fn wind_nearest(&self, solution: &Solution, previous: &AngleTuple) -> AngleTuple {
        let [a, b] = solution
            .candidates()
            .map(|c| wind_onto(&c.to_degrees(), previous));
        if b.total_delta(previous) < a.total_delta(previous) {
            b
        } else {
            a
        }
    }

    /// Translation axis coordinates for wound degrees
    pub fn machine_position(&self, part: &Point3<f64>, angles_deg: &AngleTuple) -> Point3<f64> {
        self.machine
            .machine_position(part, &angles_deg.to_radians(), self.tool_length)
    }

    /// Choose the posted angles for one solved move and record them in `state`
    pub fn select(
        &self,
        solution: &Solution,
        ctx: &SelectContext<'_>,
        state: &mut ContinuityState,
    ) -> Result<Selected> {
        let mut candidates = solution.candidates().map(|c| c.to_degrees());
        let pole = solution.pole_axis.map(|axis| (axis, solution.coupling));

        if let Some((axis, coupling)) = pole {
            let value = self.pole_value(&candidates[0], axis, coupling, ctx, state);
            for c in candidates.iter_mut() {
                rebase_pole_value(c, axis, coupling, value);
            }
            trace!("Pole on rotary axis {} resolved to {:.6} deg", axis, value);
        } else {
            if state.pole_segment.as_ref().is_some_and(PoleSegment::is_empty) {
                // Segment without held moves has nothing to fill
                state.pole_segment = None;
            }
            if state.head_table.is_active() {
                HeadTableStrategy::new(self.machine, self.params).reset_strategy(
                    &mut state.head_table,
                    false,
                    None,
                );
            }
        }

        let previous = state.previous_angles;
        match previous {
            Some(prev) => {
                for c in candidates.iter_mut() {
                    *c = wind_onto(c, &prev);
                }
            }
            None => {
                let steered = self.params.start_angle_type.preferred_axis();
                let preferred = self.params.preferred_start_angle;
                for c in candidates.iter_mut() {
                    *c = c.map(normalize_angle_deg);
                    if let Some(axis) = steered.filter(|&a| a < c.len()) {
                        c[axis] = nearest_equivalent_deg(c[axis], preferred);
                    }
                }
            }
        }
        if let (Some((axis, coupling)), None) = (pole, previous) {
            // A wrapped free angle may have been set on purpose
            if let Some(value) = self.first_pole_value(axis) {
                for c in candidates.iter_mut() {
                    rebase_pole_value(c, axis, coupling, value);
                }
            }
        }

        let preferred = match previous {
            None => self.start_choice(&candidates, ctx),
            Some(prev) => self.pair_choice(&candidates, &prev),
        };
        let other = 1 - preferred;

        let (mut chosen, mut forced) = self.fit_limits(&candidates, preferred, other, ctx)?;

        let mut rewind = None;
        if let Some(prev) = previous.filter(|_| !ctx.rapid) {
            if let Some((axis, delta)) = self.jump(&chosen.angles, &prev, ctx) {
                let alternative = self
                    .params
                    .solution_change_for_min_retracts_and_rewinds
                    .then(|| self.fit_one(&candidates[other], ctx).ok())
                    .flatten()
                    .filter(|alt| self.jump(&alt.angles, &prev, ctx).is_none());
                if let Some(alt) = alternative {
                    debug!("Move {}: other solution avoids a {:.3} deg jump", ctx.index, delta);
                    chosen = alt;
                    forced = None;
                } else if self.params.retract_and_rewind {
                    debug!(
                        "Move {}: rotary axis {} jumps {:.3} deg, rewinding",
                        ctx.index, axis, delta
                    );
                    rewind = Some(match forced {
                        Some(hit) => RewindCause::Limit(hit),
                        None => RewindCause::AngleJump { axis, delta },
                    });
                } else {
                    return Err(PostError::AngleJump {
                        index: Some(ctx.index),
                        axis,
                        delta,
                        limit: self.params.angle_change_limit,
                    });
                }
            }
        }
        if let Some(hit) = forced {
            trace!("Move {}: limit {} forced the other solution", ctx.index, hit.axis);
        }

        let before = state.winding;
        state.accept(chosen.angles, chosen.machine);
        if before != state.winding {
            debug!("Move {}: winding now {:?}", ctx.index, state.winding);
        }

        Ok(Selected {
            angles: chosen.angles,
            machine: chosen.machine,
            state: solution.state,
            rewind,
            pole,
        })
    }

    /// Free angle of a pole move on a later move of the run (degrees)
    fn pole_value(
        &self,
        representative: &AngleTuple,
        axis: usize,
        coupling: Option<Coupling>,
        ctx: &SelectContext<'_>,
        state: &mut ContinuityState,
    ) -> f64 {
        let Some(previous) = state.previous_angles.and_then(|p| p.get(axis)) else {
            return representative[axis];
        };
        let segment = state
            .pole_segment
            .get_or_insert_with(|| PoleSegment::new(axis, coupling, previous));
        let fixed = segment.fixed_value;
        let mv = PoleMove {
            angles_deg: representative,
            axis,
            coupling,
            part: ctx.part,
            tool_length: self.tool_length,
        };

        let head_table = self.params.pole_handling == PoleHandling::ForceHeadAndTable
            || self.machine.machine_type() == MachineType::ConstantTranslation;
        if head_table {
            let strategy = HeadTableStrategy::new(self.machine, self.params);
            let previous_machine = state.previous_machine;
            return strategy.adjust_move(
                &mut state.head_table,
                &mv,
                previous,
                previous_machine.as_ref(),
            );
        }

        match self.params.pole_handling {
            PoleHandling::Freeze
            | PoleHandling::LinearInterpolation
            | PoleHandling::SmoothInterpolation
            | PoleHandling::ForceHeadAndTable => previous,
            PoleHandling::UseRotationToAvoidLimits => self.search_free_angle(&mv, previous),
            PoleHandling::FindHeadOrTableFixPosition => match fixed {
                Some(value) => value,
                None => {
                    let value = self.search_free_angle(&mv, previous);
                    if let Some(segment) = state.pole_segment.as_mut() {
                        segment.fixed_value = Some(value);
                    }
                    debug!("Pole segment fixed at {:.6} deg", value);
                    value
                }
            },
        }
    }

    /// Free angle of a pole on the first move, when a policy fixes it
    fn first_pole_value(&self, axis: usize) -> Option<f64> {
        let steered = self.params.start_angle_type.preferred_axis() == Some(axis);
        (self.params.start_rotation_angle || steered).then_some(self.params.preferred_start_angle)
    }

    /// Nearest free angle to `previous`, searched outward in whole degrees,
    /// that keeps every axis inside the machine limits
    fn search_free_angle(&self, mv: &PoleMove<'_>, previous: f64) -> f64 {
        for step in 0..=POLE_SEARCH_SPAN_DEG {
            for sign in [1.0, -1.0] {
                if step == 0 && sign < 0.0 {
                    continue;
                }
                let theta = previous + sign * f64::from(step);
                if self.within_limits(&mv.angles_at(theta), &mv.machine_at(self.machine, theta)) {
                    return theta;
                }
            }
        }
        debug!("No free angle keeps the translations in range, keeping {:.6}", previous);
        previous
    }

    fn within_limits(&self, angles: &AngleTuple, machine: &Point3<f64>) -> bool {
        let limits = self.params.machine_limits;
        let translation_ok =
            !limits.translation() || self.machine.translation_limit_violation(machine).is_none();
        let rotation_ok = !limits.rotation()
            || self
                .machine
                .rotary_limit_violation(angles, self.params.angle_tol_for_mach_limits)
                .is_none();
        translation_ok && rotation_ok
    }

    /// Candidate index for the first move of a run
    fn start_choice(&self, candidates: &[AngleTuple; 2], ctx: &SelectContext<'_>) -> usize {
        match self.params.start_angle_type {
            StartAngleType::ProvideTranslationAxis => self.translation_axis_choice(candidates, ctx),
            t => match t.preferred_axis().filter(|&a| a < candidates[0].len()) {
                Some(axis) => self.preferred_angle_choice(candidates, axis),
                None => self.two_solution_choice(candidates),
            },
        }
    }

    fn two_solution_choice(&self, candidates: &[AngleTuple; 2]) -> usize {
        let magnitude = |c: &AngleTuple| c.iter().map(f64::abs).sum::<f64>();
        let first = if self.params.first_solution_closer_to_zero
            && magnitude(&candidates[1]) < magnitude(&candidates[0])
        {
            1
        } else {
            0
        };
        match self.params.solution_for_start_angle {
            SolutionForStartAngle::First => first,
            SolutionForStartAngle::Other => 1 - first,
        }
    }

    fn preferred_angle_choice(&self, candidates: &[AngleTuple; 2], axis: usize) -> usize {
        let target = self.params.preferred_start_angle;
        let distance =
            |c: &AngleTuple| (nearest_equivalent_deg(c[axis], target) - target).abs();
        if distance(&candidates[1]) < distance(&candidates[0]) {
            1
        } else {
            0
        }
    }

    /// Candidate placing the tool furthest along the seeded translation
    /// direction
    fn translation_axis_choice(&self, candidates: &[AngleTuple; 2], ctx: &SelectContext<'_>) -> usize {
        let direction = match self.params.solution_for_start_translation.axis_and_sign() {
            Some((axis, sign)) => {
                let mut d = Vector3::zeros();
                d[axis] = sign;
                d
            }
            None => self.params.custom_trans_axis_dir,
        };
        let score = |c: &AngleTuple| self.machine_position(ctx.part, c).coords.dot(&direction);
        if score(&candidates[1]) > score(&candidates[0]) {
            1
        } else {
            0
        }
    }

    /// Candidate index for a move with a predecessor
    fn pair_choice(&self, candidates: &[AngleTuple; 2], previous: &AngleTuple) -> usize {
        if !self.params.angle_select_auto_from_two_pairs {
            return usize::from(self.params.angle_select_other_pair);
        }
        let key = |c: &AngleTuple| c.total_delta(previous);
        match key(&candidates[0]).partial_cmp(&key(&candidates[1])) {
            Some(Ordering::Less) | None => 0,
            Some(Ordering::Greater) => 1,
            Some(Ordering::Equal) => {
                let deltas = |c: &AngleTuple| -> Vec<f64> {
                    c.iter().zip(previous.iter()).map(|(a, b)| (a - b).abs()).collect()
                };
                match deltas(&candidates[1]).partial_cmp(&deltas(&candidates[0])) {
                    Some(Ordering::Less) => 1,
                    _ => 0,
                }
            }
        }
    }

    /// Preferred candidate if it fits the limits, else the other one
    fn fit_limits(
        &self,
        candidates: &[AngleTuple; 2],
        preferred: usize,
        other: usize,
        ctx: &SelectContext<'_>,
    ) -> Result<(Fitted, Option<LimitHit>)> {
        match self.fit_one(&candidates[preferred], ctx) {
            Ok(fitted) => Ok((fitted, None)),
            Err(hit) => match self.fit_one(&candidates[other], ctx) {
                Ok(fitted) => Ok((fitted, Some(hit))),
                Err(_) => Err(hit.into_error(Some(ctx.index))),
            },
        }
    }

    /// Bring a candidate inside the limits by whole turns, if enforced
    fn fit_one(&self, candidate: &AngleTuple, ctx: &SelectContext<'_>) -> std::result::Result<Fitted, LimitHit> {
        let limits = self.params.machine_limits;
        let mut angles = *candidate;
        if limits.rotation() {
            let tol = self.params.angle_tol_for_mach_limits;
            for (i, axis) in self.machine.rotary_axes().iter().enumerate() {
                if axis.within_limits(angles[i], tol) {
                    continue;
                }
                let shifted = turn_into_range(angles[i], axis.min_deg - tol, axis.max_deg + tol);
                if let Some(v) = shifted {
                    angles[i] = v;
                }
            }
            if let Some(hit) = self.machine.rotary_limit_violation(&angles, tol) {
                return Err(hit);
            }
        }
        let machine = self.machine_position(ctx.part, &angles);
        if limits.translation() {
            if let Some(hit) = self.machine.translation_limit_violation(&machine) {
                return Err(hit);
            }
        }
        Ok(Fitted { angles, machine })
    }

    /// Largest change above the jump limit, if any (signed degrees)
    fn jump(
        &self,
        angles: &AngleTuple,
        previous: &AngleTuple,
        ctx: &SelectContext<'_>,
    ) -> Option<(usize, f64)> {
        angles
            .iter()
            .zip(previous.iter())
            .enumerate()
            .filter(|(i, _)| Some(*i) != ctx.ignore_axis_in_jump)
            .map(|(i, (a, b))| (i, a - b))
            .filter(|(_, d)| d.abs() > self.params.angle_change_limit)
            .max_by(|x, y| x.1.abs().total_cmp(&y.1.abs()))
    }
}

/// Every axis of `angles` as its equivalent nearest to `previous`
pub fn wind_onto(angles: &AngleTuple, previous: &AngleTuple) -> AngleTuple {
    angles.zip_map(previous, nearest_equivalent_deg)
}

/// `value` shifted by whole turns into `[min, max]`, nearest to `value`
fn turn_into_range(value: f64, min: f64, max: f64) -> Option<f64> {
    let lowest = ((min - value) / 360.0).ceil() as i64;
    let highest = ((max - value) / 360.0).floor() as i64;
    (lowest..=highest)
        .min_by_key(|k| k.abs())
        .map(|k| value + 360.0 * k as f64)
}
