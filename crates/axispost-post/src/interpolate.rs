//! Toolpath interpolator
//!
//! Inserts intermediate moves between two solved moves so that no step
//! exceeds the configured distance or angle thresholds. The basis decides
//! what is blended:
//! - `Vectors`: tool orientation (spherical) and tip position, re-solved
//! - `Angles`: rotary angles and tip position
//! - `AxisValues`: translation coordinates and rotary angles as they are

use axispost_core::geometry::{angle_between, normalize_angle_rad, slerp};
use axispost_core::{AngleTuple, PostError, PostedMove, Result};
use axispost_kinematics::{rebase_pole_value, ContinuitySelector};
use axispost_machine::Machine;
use axispost_settings::{InterpolationType, PostParameters};
use tracing::trace;

/// Slack on step counts so exact multiples of a threshold need no extra step
const STEP_SLACK: f64 = 1e-9;

/// Inserts intermediate moves between consecutive posted moves
#[derive(Debug, Clone, Copy)]
pub struct Interpolator<'s, 'a> {
    selector: &'s ContinuitySelector<'a>,
    machine: &'a Machine,
    params: &'a PostParameters,
}

impl<'s, 'a> Interpolator<'s, 'a> {
    pub fn new(
        selector: &'s ContinuitySelector<'a>,
        machine: &'a Machine,
        params: &'a PostParameters,
    ) -> Self {
        Self {
            selector,
            machine,
            params,
        }
    }

    /// Distance between two moves in the active basis
    pub fn distance(&self, from: &PostedMove, to: &PostedMove) -> f64 {
        match self.params.interpolation {
            InterpolationType::AxisValues => (to.machine_position - from.machine_position).norm(),
            _ => (to.part_position - from.part_position).norm(),
        }
    }

    /// Angle between two moves in the active basis (degrees)
    pub fn angle(&self, from: &PostedMove, to: &PostedMove) -> f64 {
        match self.params.interpolation {
            InterpolationType::Vectors => {
                angle_between(&from.orientation, &to.orientation).to_degrees()
            }
            _ => to.angles.max_delta(&from.angles).1,
        }
    }

    /// Number of steps from `from` to `to`; 1 means no intermediate moves
    pub fn step_count(&self, from: &PostedMove, to: &PostedMove) -> usize {
        let rapid = to.is_rapid();
        let steps = |metric: f64, threshold: Option<f64>| match threshold {
            Some(t) if t > 0.0 => (metric / t - STEP_SLACK).ceil().max(1.0) as usize,
            _ => 1,
        };
        let by_distance = steps(self.distance(from, to), self.params.distance_step(rapid));
        let by_angle = steps(self.angle(from, to), self.params.angle_step(rapid));
        by_distance.max(by_angle)
    }

    /// Intermediate moves strictly between `from` and `to`
    pub fn interpolate(&self, from: &PostedMove, to: &PostedMove) -> Result<Vec<PostedMove>> {
        let n = self.step_count(from, to);
        if n <= 1 {
            return Ok(Vec::new());
        }
        trace!(
            "Interpolating {} steps towards move {}",
            n,
            to.original_index
        );

        let mut out: Vec<PostedMove> = Vec::with_capacity(n - 1);
        for k in 1..n {
            let t = k as f64 / n as f64;
            let previous = out.last().unwrap_or(from);
            let mv = match self.params.interpolation {
                InterpolationType::Vectors => self.blend_vectors(from, to, previous, t)?,
                InterpolationType::Angles => self.blend_angles(from, to, t),
                InterpolationType::AxisValues => self.blend_axis_values(from, to, t),
            };
            out.push(mv);
        }
        Ok(out)
    }

    fn blend_vectors(
        &self,
        from: &PostedMove,
        to: &PostedMove,
        previous: &PostedMove,
        t: f64,
    ) -> Result<PostedMove> {
        let orientation = slerp(&from.orientation, &to.orientation, t).ok_or(
            PostError::AmbiguousInterpolation {
                from: from.original_index,
                to: to.original_index,
            },
        )?;
        let part = from.part_position + (to.part_position - from.part_position) * t;
        let angles_t = lerp_angles(&from.angles, &to.angles, t);

        // Carry the blended free angle so a pole crossed mid-move stays put
        let solver = self.selector.solver();
        let hint = |axis: Option<usize>| {
            axis.and_then(|a| angles_t.get(a))
                .map(|v| normalize_angle_rad(v.to_radians()))
        };
        let saw = match (from.saw_direction, to.saw_direction) {
            (Some(a), Some(b)) => slerp(&a, &b, t),
            (_, b) => b,
        };
        let request = axispost_kinematics::SolveRequest::new(orientation)
            .with_saw(saw)
            .with_pole_hint(hint(solver.pole_axis()))
            .with_contour_hint(hint(solver.contour_axis()));
        let solution = solver.solve(&request)?;

        let mut angles = self.selector.wind_nearest(&solution, &previous.angles);
        if let Some(axis) = solution.pole_axis {
            rebase_pole_value(&mut angles, axis, solution.coupling, angles_t[axis]);
        }

        let mut mv = to.synthesized(to.role);
        mv.part_position = part;
        mv.orientation = orientation;
        mv.saw_direction = saw;
        mv.angles = angles;
        mv.angle_state = solution.state;
        mv.machine_position = self.selector.machine_position(&part, &angles);
        Ok(mv)
    }

    fn blend_angles(&self, from: &PostedMove, to: &PostedMove, t: f64) -> PostedMove {
        let angles = lerp_angles(&from.angles, &to.angles, t);
        let part = from.part_position + (to.part_position - from.part_position) * t;
        let radians = angles.to_radians();

        let mut mv = to.synthesized(to.role);
        mv.part_position = part;
        mv.orientation = self.machine.orientation_from_angles(&radians);
        mv.saw_direction = self.machine.saw_from_angles(&radians);
        mv.angles = angles;
        mv.machine_position = self.selector.machine_position(&part, &angles);
        mv
    }

    fn blend_axis_values(&self, from: &PostedMove, to: &PostedMove, t: f64) -> PostedMove {
        let angles = lerp_angles(&from.angles, &to.angles, t);
        let machine =
            from.machine_position + (to.machine_position - from.machine_position) * t;
        let radians = angles.to_radians();

        let mut mv = to.synthesized(to.role);
        mv.machine_position = machine;
        mv.part_position =
            self.machine
                .part_position(&machine, &radians, self.selector.tool_length());
        mv.orientation = self.machine.orientation_from_angles(&radians);
        mv.saw_direction = self.machine.saw_from_angles(&radians);
        mv.angles = angles;
        mv
    }
}

/// Straight blend of two wound angle tuples
pub fn lerp_angles(from: &AngleTuple, to: &AngleTuple, t: f64) -> AngleTuple {
    from.zip_map(to, |a, b| a + (b - a) * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axispost_core::{Point3, ToolpathPoint, Vector3};
    use axispost_kinematics::{ContinuityState, SelectContext};

    fn posted(
        sel: &ContinuitySelector<'_>,
        state: &mut ContinuityState,
        point: ToolpathPoint,
        index: usize,
    ) -> PostedMove {
        let request = sel.request_for(point.orientation, None, state);
        let solution = sel.solver().solve(&request).unwrap();
        let out = sel
            .select(&solution, &SelectContext::new(&point.position, index), state)
            .unwrap();
        let mut mv = PostedMove::from_point(&point, index);
        mv.angles = out.angles;
        mv.machine_position = out.machine;
        mv.angle_state = out.state;
        mv
    }

    #[test]
    fn test_step_count_takes_the_strictest_criterion() {
        let m = Machine::default_five_axis().unwrap();
        let p = PostParameters {
            interpolation_dist: 1.0,
            interpolation_angle_step: 5.0,
            ..PostParameters::default()
        };
        let sel = ContinuitySelector::new(&m, &p, 0.0);
        let interp = Interpolator::new(&sel, &m, &p);
        let mut state = ContinuityState::new();
        let a = posted(&sel, &mut state, ToolpathPoint::new(Point3::origin(), Vector3::x()), 0);
        let o = Vector3::new(1.0, 0.0, 1.0).normalize();
        let b = posted(&sel, &mut state, ToolpathPoint::new(Point3::new(3.0, 0.0, 0.0), o), 1);
        // 45 degrees in 5 degree steps beats 3 mm in 1 mm steps
        assert_eq!(interp.step_count(&a, &b), 9);

        let rapid = PostParameters {
            rapid_interpolation_dist_flag: false,
            ..p.clone()
        };
        let interp = Interpolator::new(&sel, &m, &rapid);
        let mut b_rapid = b.clone();
        b_rapid.flags.rapid = true;
        // Rapid angle stepping is off by default and the distance flag is off here
        assert_eq!(interp.step_count(&a, &b_rapid), 1);
    }

    #[test]
    fn test_vector_interpolation_density() {
        let m = Machine::default_five_axis().unwrap();
        let p = PostParameters {
            interpolation_dist: 0.5,
            interpolation_angle_step: 2.0,
            ..PostParameters::default()
        };
        let sel = ContinuitySelector::new(&m, &p, 20.0);
        let interp = Interpolator::new(&sel, &m, &p);
        let mut state = ContinuityState::new();
        let a = posted(
            &sel,
            &mut state,
            ToolpathPoint::new(Point3::origin(), Vector3::new(0.0, 1.0, 2.0).normalize()),
            0,
        );
        let b = posted(
            &sel,
            &mut state,
            ToolpathPoint::new(Point3::new(2.0, 1.0, 0.0), Vector3::new(1.0, 0.0, 1.0).normalize()),
            1,
        );
        let subs = interp.interpolate(&a, &b).unwrap();
        assert!(!subs.is_empty());
        let mut chain = vec![a.clone()];
        chain.extend(subs.iter().cloned());
        chain.push(b.clone());
        for w in chain.windows(2) {
            assert!(interp.distance(&w[0], &w[1]) <= 0.5 + 1e-9);
            assert!(interp.angle(&w[0], &w[1]) <= 2.0 + 1e-9);
        }
        for s in &subs {
            assert!(s.added_by_post);
            assert_eq!(s.original_index, 1);
            let o = m.orientation_from_angles(&s.angles.to_radians());
            assert!((o - s.orientation).norm() < 1e-8);
        }
    }

    #[test]
    fn test_opposite_orientations_are_ambiguous() {
        let m = Machine::default_five_axis().unwrap();
        let p = PostParameters::default();
        let sel = ContinuitySelector::new(&m, &p, 0.0);
        let interp = Interpolator::new(&sel, &m, &p);
        let mut a = PostedMove::from_point(&ToolpathPoint::new(Point3::origin(), Vector3::x()), 4);
        a.angles = AngleTuple::from_slice(&[0.0, -90.0]);
        let mut b = PostedMove::from_point(&ToolpathPoint::new(Point3::origin(), -Vector3::x()), 5);
        b.angles = AngleTuple::from_slice(&[0.0, 90.0]);
        let err = interp.interpolate(&a, &b).unwrap_err();
        assert_eq!(err, PostError::AmbiguousInterpolation { from: 4, to: 5 });
    }

    #[test]
    fn test_angle_and_axis_value_bases() {
        let m = Machine::default_five_axis().unwrap();
        for interpolation in [InterpolationType::Angles, InterpolationType::AxisValues] {
            let p = PostParameters {
                interpolation,
                interpolation_angle_step: 10.0,
                interpolation_dist_flag: false,
                ..PostParameters::default()
            };
            let sel = ContinuitySelector::new(&m, &p, 10.0);
            let interp = Interpolator::new(&sel, &m, &p);
            let mut state = ContinuityState::new();
            let a = posted(&sel, &mut state, ToolpathPoint::new(Point3::origin(), Vector3::z()), 0);
            let b = posted(
                &sel,
                &mut state,
                ToolpathPoint::new(Point3::new(5.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 1.0).normalize()),
                1,
            );
            let subs = interp.interpolate(&a, &b).unwrap();
            assert_eq!(subs.len(), 4, "{:?}", interpolation);
            let mut prev = a.angles;
            for s in subs.iter().chain(std::iter::once(&b)) {
                assert!(s.angles.max_delta(&prev).1 <= 10.0 + 1e-9);
                prev = s.angles;
                let back = m.part_position(&s.machine_position, &s.angles.to_radians(), 10.0);
                assert!((back - s.part_position).norm() < 1e-9);
            }
        }
    }
}
