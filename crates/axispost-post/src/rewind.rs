//! Retract / rewind synthesizer
//!
//! Bridges a rotary jump between two posted moves by taking the tool off
//! the part, unwinding the angles in the clear and coming back:
//! 1. retract along the tool axis of the previous move
//! 2. rewind steps with the tip held at the retract point
//! 3. optional additional retract along a machine-frame direction
//! 4. re-approach above the next move along its tool axis
//!
//! The next move itself is emitted by the caller.

use axispost_core::geometry::normalized;
use axispost_core::{MoveRole, Point3, PostError, PostedMove, Result};
use axispost_kinematics::ContinuitySelector;
use axispost_machine::Machine;
use axispost_settings::PostParameters;
use tracing::{debug, warn};

use crate::interpolate::lerp_angles;

/// Builds retract / rewind sequences
#[derive(Debug, Clone, Copy)]
pub struct RewindSynthesizer<'s, 'a> {
    selector: &'s ContinuitySelector<'a>,
    machine: &'a Machine,
    params: &'a PostParameters,
}

impl<'s, 'a> RewindSynthesizer<'s, 'a> {
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

    /// Moves to insert between `previous` and `next`
    pub fn synthesize(&self, previous: &PostedMove, next: &PostedMove) -> Result<Vec<PostedMove>> {
        if self.machine.rotary_axis_count() == 0 {
            return Err(PostError::RewindFailed {
                index: Some(next.original_index),
                reason: "machine has no rotary axis to rewind".to_string(),
            });
        }

        let mut out = Vec::new();

        let retract_distance = self.retract_distance(previous)?;
        let retract_point = previous.part_position + previous.orientation * retract_distance;
        let retract = self.synthesized_at(previous, next, MoveRole::RewindRetract, &retract_point);
        out.push(retract.clone());

        let steps = self.rewind_steps(previous, next);
        for k in 1..=steps {
            let t = k as f64 / steps as f64;
            let mut mv = next.synthesized(MoveRole::Rewind);
            mv.flags.rapid = true;
            mv.angles = lerp_angles(&previous.angles, &next.angles, t);
            let radians = mv.angles.to_radians();
            mv.orientation = self.machine.orientation_from_angles(&radians);
            mv.saw_direction = self.machine.saw_from_angles(&radians);
            mv.part_position = retract_point;
            mv.machine_position = self.selector.machine_position(&retract_point, &mv.angles);
            out.push(mv);
        }

        if self.params.additional_retract {
            let last = out.last().cloned().unwrap_or(retract);
            out.push(self.additional_retract(&last)?);
        }

        let approach_distance = self.retract_distance(next)?;
        let approach_point = next.part_position + next.orientation * approach_distance;
        out.push(self.synthesized_at(next, next, MoveRole::RewindApproach, &approach_point));

        debug!(
            "Rewind before move {}: {} synthesized moves, retract {:.4}",
            next.original_index,
            out.len(),
            retract_distance
        );
        Ok(out)
    }

    /// Copy of `pose` moved to `part`, tagged as a synthesized rapid for `next`
    fn synthesized_at(
        &self,
        pose: &PostedMove,
        next: &PostedMove,
        role: MoveRole,
        part: &Point3<f64>,
    ) -> PostedMove {
        let mut mv = pose.synthesized(role);
        mv.flags.rapid = true;
        mv.original_index = next.original_index;
        mv.part_position = *part;
        mv.machine_position = self.selector.machine_position(part, &pose.angles);
        mv
    }

    /// Retract length along the tool axis of `mv`
    fn retract_distance(&self, mv: &PostedMove) -> Result<f64> {
        let configured = self.params.retract_distance;
        let reach = self.tool_axis_reach(mv);
        let distance = if self.params.retract_tool_at_max {
            if reach.is_finite() {
                reach
            } else {
                configured
            }
        } else if self.params.machine_limits.translation() && reach < configured {
            warn!(
                "Retract at move {} clamped to {:.4} by translation limits",
                mv.original_index, reach
            );
            reach
        } else {
            configured
        };
        if distance <= 0.0 && configured > 0.0 && self.params.machine_limits.translation() {
            return Err(PostError::RewindFailed {
                index: Some(mv.original_index),
                reason: "no room to retract inside the translation limits".to_string(),
            });
        }
        Ok(distance)
    }

    /// How far the tool can back off along its axis before a translation
    /// limit stops it
    fn tool_axis_reach(&self, mv: &PostedMove) -> f64 {
        let direction = self
            .machine
            .axis_direction(&mv.orientation, &mv.angles.to_radians());
        self.machine.retract_reach(&mv.machine_position, &direction)
    }

    fn rewind_steps(&self, previous: &PostedMove, next: &PostedMove) -> usize {
        if self.params.rewind_in_one_step {
            return 1;
        }
        let (_, delta) = next.angles.max_delta(&previous.angles);
        ((delta / self.params.rewind_angle_step) - 1e-9).ceil().max(1.0) as usize
    }

    fn additional_retract(&self, last: &PostedMove) -> Result<PostedMove> {
        let direction = normalized(&self.params.additional_retract_direction).ok_or(
            PostError::RewindFailed {
                index: Some(last.original_index),
                reason: "additional retract direction has zero length".to_string(),
            },
        )?;
        let reach = self.machine.retract_reach(&last.machine_position, &direction);
        let distance = if self.params.additional_retract_tool_at_max && reach.is_finite() {
            reach
        } else if self.params.machine_limits.translation() {
            self.params.additional_retract_distance.min(reach)
        } else {
            self.params.additional_retract_distance
        };

        let mut mv = last.synthesized(MoveRole::RewindRetract);
        mv.flags.rapid = true;
        // Direction is given in axis coordinates
        mv.machine_position = last.machine_position + direction * distance;
        mv.part_position = self.machine.part_position(
            &mv.machine_position,
            &mv.angles.to_radians(),
            self.selector.tool_length(),
        );
        Ok(mv)
    }
}
