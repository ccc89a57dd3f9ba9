//! Posting pipeline
//!
//! `Poster` drives every toolpath point through solve, select, pole
//! blending, rewind and interpolation, in order. All run state lives in
//! `ContinuityState`, so a toolpath may be posted whole or chunk by chunk
//! with the state handed across: both give the same moves.

use std::sync::Arc;

use axispost_core::geometry::{angle_between, any_perpendicular, clamped_acos, normalized, smoothstep};
use axispost_core::{
    AngleTuple, ConfigurationError, Matrix3, PostError, PostedMove, Result, ToolpathPoint, Vector3,
};
use axispost_kinematics::{
    rebase_pole_value, ContinuitySelector, ContinuityState, PoleSegment, SelectContext,
};
use axispost_machine::{Machine, MachineType};
use axispost_settings::{PoleHandling, PostParameters};
use nalgebra::{Rotation3, Unit};
use thiserror::Error;
use tracing::{debug, info};

use crate::interpolate::Interpolator;
use crate::rewind::RewindSynthesizer;

/// Input moves closer than this to the last posted move are duplicates
pub const DUPLICATE_TOL: f64 = 1e-12;

/// Moves produced by one chunk, with the state to hand to the next chunk
#[derive(Debug, Clone)]
pub struct ChunkOutput {
    pub moves: Vec<PostedMove>,
    pub state: ContinuityState,
}

/// A chunk that could not be posted
///
/// `boundary` is the state the chunk started from, so the caller can retry
/// the same chunk with different parameters.
#[derive(Error, Debug, Clone)]
#[error("Chunk {chunk} failed at move {failed_index}: {error}")]
pub struct ChunkError {
    pub chunk: usize,
    /// Global index of the input move that failed
    pub failed_index: usize,
    #[source]
    pub error: PostError,
    pub boundary: Box<ContinuityState>,
}

/// Posts toolpaths for one machine, parameter set and tool
#[derive(Debug, Clone)]
pub struct Poster {
    machine: Arc<Machine>,
    params: Arc<PostParameters>,
    tool_length: f64,
}

impl Poster {
    /// Check the parameters against the machine and build a poster
    pub fn new(machine: Arc<Machine>, params: Arc<PostParameters>, tool_length: f64) -> Result<Self> {
        if machine.units() != params.units {
            return Err(ConfigurationError::UnitsMismatch {
                machine: machine.units().to_string(),
                parameters: params.units.to_string(),
            }
            .into());
        }
        params.validate()?;
        debug!(
            "Poster for {} machine, tool length {}, pole handling {}",
            machine.kind_name(),
            tool_length,
            params.pole_handling
        );
        Ok(Self {
            machine,
            params,
            tool_length,
        })
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn params(&self) -> &PostParameters {
        &self.params
    }

    pub fn tool_length(&self) -> f64 {
        self.tool_length
    }

    /// Post a whole toolpath in one pass
    pub fn post(&self, toolpath: &[ToolpathPoint]) -> Result<Vec<PostedMove>> {
        let ChunkOutput { mut moves, mut state } = self
            .post_chunk(toolpath, ContinuityState::new())
            .map_err(|e| e.error)?;
        moves.extend(self.finish(&mut state)?);
        Ok(moves)
    }

    /// Post one chunk, resuming from `state`
    pub fn post_chunk(
        &self,
        chunk: &[ToolpathPoint],
        state: ContinuityState,
    ) -> std::result::Result<ChunkOutput, ChunkError> {
        let boundary = state.clone();
        let mut state = state;
        let selector = self.selector();
        let mut moves = Vec::with_capacity(chunk.len());

        for point in chunk {
            let index = state.next_index;
            if let Err(error) = self.post_point(&selector, point, index, &mut state, &mut moves) {
                return Err(ChunkError {
                    chunk: boundary.chunks_processed,
                    failed_index: index,
                    error: error.at_index(index),
                    boundary: Box::new(boundary),
                });
            }
            state.next_index += 1;
        }

        state.chunks_processed += 1;
        info!(
            "Posted chunk {} ({} input moves, {} output moves)",
            boundary.chunks_processed,
            chunk.len(),
            moves.len()
        );
        Ok(ChunkOutput { moves, state })
    }

    /// Flush moves still held at the end of the run
    ///
    /// A pole segment never closed by a determined move keeps its frozen
    /// free angle.
    pub fn finish(&self, state: &mut ContinuityState) -> Result<Vec<PostedMove>> {
        let mut out = Vec::new();
        if let Some(segment) = state.pole_segment.take() {
            if !segment.is_empty() {
                debug!("Flushing {} held pole moves", segment.pending.len());
                let selector = self.selector();
                for (mv, rewind) in segment.pending.into_iter().zip(segment.pending_rewind) {
                    self.emit(&selector, mv, rewind, state, &mut out)?;
                }
            }
        }
        Ok(out)
    }

    fn selector(&self) -> ContinuitySelector<'_> {
        ContinuitySelector::new(&self.machine, &self.params, self.tool_length)
    }

    /// Pole moves are held back and blended once the segment closes
    fn blends_poles(&self) -> bool {
        self.params.pole_handling.is_blending()
            && self.machine.machine_type() != MachineType::ConstantTranslation
    }

    fn post_point(
        &self,
        selector: &ContinuitySelector<'_>,
        point: &ToolpathPoint,
        index: usize,
        state: &mut ContinuityState,
        out: &mut Vec<PostedMove>,
    ) -> Result<()> {
        let point = self.aligned(point, state);

        if self.params.filter_duplicate_moves && self.is_duplicate(&point, state) {
            debug!("Move {} duplicates the previous move, skipped", index);
            return Ok(());
        }

        let request = selector.request_for(point.orientation, point.saw_direction, state);
        let solution = selector.solver().solve(&request)?;

        let closing_axis = state
            .pole_segment
            .as_ref()
            .filter(|s| !s.is_empty() && !solution.is_pole())
            .map(|s| s.axis);
        let ctx = SelectContext::new(&point.position, index)
            .with_rapid(point.flags.rapid)
            .ignoring_axis(closing_axis);
        let selected = selector.select(&solution, &ctx, state)?;

        let mut mv = PostedMove::from_point(&point, index);
        mv.machine_position = selected.machine;
        mv.angles = selected.angles;
        mv.angle_state = selected.state;
        let rewind = selected.rewind.is_some();

        if let Some((axis, coupling)) = selected.pole {
            if self.blends_poles() {
                let segment = state
                    .pole_segment
                    .get_or_insert_with(|| PoleSegment::new(axis, coupling, mv.angles[axis]));
                if segment.pending.is_empty() && segment.anchor.is_none() {
                    segment.anchor = state.last_posted.clone();
                }
                segment.pending.push(mv);
                segment.pending_rewind.push(rewind);
                return Ok(());
            }
            return self.emit(selector, mv, rewind, state, out);
        }

        let mut rewind = rewind;
        if let Some(segment) = state.pole_segment.take() {
            if !segment.is_empty() {
                self.close_segment(selector, segment, &mv, state, out)?;
                // The selector skipped the pole axis against the held moves
                rewind |= self.exceeds_jump_limit(&mv, state)?;
            }
        }
        self.emit(selector, mv, rewind, state, out)
    }

    /// Fill the free angle of held pole moves from the segment start value
    /// to the closing move's value, by travelled distance
    fn close_segment(
        &self,
        selector: &ContinuitySelector<'_>,
        segment: PoleSegment,
        closing: &PostedMove,
        state: &mut ContinuityState,
        out: &mut Vec<PostedMove>,
    ) -> Result<()> {
        let PoleSegment {
            axis,
            coupling,
            start_value,
            anchor,
            pending,
            pending_rewind,
            ..
        } = segment;
        let end_value = closing.angles[axis];

        let origin = anchor
            .as_ref()
            .map(|a| a.part_position)
            .unwrap_or(pending[0].part_position);
        let mut travelled = Vec::with_capacity(pending.len());
        let mut total = 0.0;
        let mut last = origin;
        for mv in &pending {
            total += (mv.part_position - last).norm();
            travelled.push(total);
            last = mv.part_position;
        }
        total += (closing.part_position - last).norm();

        let smooth = self.params.pole_handling == PoleHandling::SmoothInterpolation;
        let count = pending.len() as f64;
        debug!(
            "Blending {} pole moves on axis {} from {:.4} to {:.4} deg",
            pending.len(),
            axis,
            start_value,
            end_value
        );

        for (i, ((mut mv, rewind), distance)) in pending
            .into_iter()
            .zip(pending_rewind)
            .zip(travelled)
            .enumerate()
        {
            let t = if total > f64::EPSILON {
                distance / total
            } else {
                (i as f64 + 1.0) / (count + 1.0)
            };
            let t = if smooth { smoothstep(t) } else { t };
            let value = start_value + (end_value - start_value) * t;
            rebase_pole_value(&mut mv.angles, axis, coupling, value);
            mv.machine_position = selector.machine_position(&mv.part_position, &mv.angles);
            let rewind = rewind || self.exceeds_jump_limit(&mv, state)?;
            self.emit(selector, mv, rewind, state, out)?;
        }
        Ok(())
    }

    /// Check a blended move against the last posted one
    ///
    /// Returns whether a rewind has to bridge the step, or `AngleJump` when
    /// retract and rewind is off. Rapid moves are exempt.
    fn exceeds_jump_limit(&self, mv: &PostedMove, state: &ContinuityState) -> Result<bool> {
        let Some(previous) = state.last_posted.as_ref() else {
            return Ok(false);
        };
        if mv.is_rapid() {
            return Ok(false);
        }
        let (axis, magnitude) = mv.angles.max_delta(&previous.angles);
        if magnitude <= self.params.angle_change_limit {
            return Ok(false);
        }
        let delta = mv.angles[axis] - previous.angles[axis];
        if !self.params.retract_and_rewind {
            return Err(PostError::AngleJump {
                index: Some(mv.original_index),
                axis,
                delta,
                limit: self.params.angle_change_limit,
            });
        }
        debug!(
            "Blended move {} changes axis {} by {:.4} deg, rewinding",
            mv.original_index, axis, delta
        );
        Ok(true)
    }

    /// Append `mv` with the moves leading up to it
    fn emit(
        &self,
        selector: &ContinuitySelector<'_>,
        mv: PostedMove,
        rewind: bool,
        state: &mut ContinuityState,
        out: &mut Vec<PostedMove>,
    ) -> Result<()> {
        if let Some(previous) = state.last_posted.as_ref() {
            if rewind {
                let synthesizer = RewindSynthesizer::new(selector, &self.machine, &self.params);
                out.extend(synthesizer.synthesize(previous, &mv)?);
            } else {
                let interpolator = Interpolator::new(selector, &self.machine, &self.params);
                out.extend(interpolator.interpolate(previous, &mv)?);
            }
        }
        out.push(mv.clone());
        state.last_posted = Some(mv);
        Ok(())
    }

    fn is_duplicate(&self, point: &ToolpathPoint, state: &ContinuityState) -> bool {
        let last = state
            .pole_segment
            .as_ref()
            .and_then(|s| s.pending.last())
            .or(state.last_posted.as_ref());
        last.is_some_and(|last| last.is_repeated_by(point, DUPLICATE_TOL))
    }

    /// Apply the toolpath alignment rotation, fixing it on the first move
    fn aligned(&self, point: &ToolpathPoint, state: &mut ContinuityState) -> ToolpathPoint {
        if !self.params.toolpath_alignment || self.machine.rotary_axis_count() > 1 {
            return point.clone();
        }
        let rotation = *state
            .alignment
            .get_or_insert_with(|| self.alignment_for(&point.orientation));
        let mut aligned = point.clone();
        aligned.position = rotation * point.position;
        aligned.orientation = rotation * point.orientation;
        aligned.saw_direction = point.saw_direction.map(|s| rotation * s);
        aligned.contact_point = point.contact_point.map(|c| rotation * c);
        aligned
    }

    /// Rotation taking `first` onto the nearest orientation the machine reaches
    fn alignment_for(&self, first: &Vector3<f64>) -> Matrix3<f64> {
        let Some(first) = normalized(first) else {
            return Matrix3::identity();
        };
        let spindle = self.machine.orientation_from_angles(&AngleTuple::default());
        let rotation = match self.machine.orientation_chain().first() {
            // 4-axis: tilt onto the cone swept by the spindle about the axis
            Some(link) => {
                let axis = match normalized(&self.machine.to_part_frame(&link.direction)) {
                    Some(a) => a,
                    None => return Matrix3::identity(),
                };
                let wanted = angle_between(&axis, &spindle);
                let current = clamped_acos(axis.dot(&first));
                let pivot = normalized(&axis.cross(&first)).unwrap_or_else(|| any_perpendicular(&axis));
                Rotation3::from_axis_angle(&Unit::new_normalize(pivot), wanted - current)
            }
            // 3-axis: onto the spindle
            None => Rotation3::rotation_between(&first, &spindle).unwrap_or_else(|| {
                Rotation3::from_axis_angle(
                    &Unit::new_normalize(any_perpendicular(&first)),
                    std::f64::consts::PI,
                )
            }),
        };
        debug!("Toolpath alignment rotation {:?}", rotation.angle().to_degrees());
        rotation.into_inner()
    }
}
