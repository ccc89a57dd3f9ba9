//! Continuity state carried from move to move
//!
//! Everything the selector, the head/table strategy and the posting
//! pipeline remember between moves lives here, so handing this value from
//! one chunk to the next resumes posting exactly where it stopped.

use axispost_core::{AngleTuple, Matrix3, Point3, PostedMove, MAX_ROTARY_AXES};
use serde::{Deserialize, Serialize};

use crate::head_table::HeadTableState;
use crate::solver::Coupling;

/// Moves sitting at a pole whose free angle is filled in once the segment
/// closes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoleSegment {
    /// Free rotary axis
    pub axis: usize,
    pub coupling: Option<Coupling>,
    /// Free angle (degrees) the segment starts from
    pub start_value: f64,
    /// Move preceding the segment, used as the distance origin
    pub anchor: Option<PostedMove>,
    /// Moves held back until the segment closes
    pub pending: Vec<PostedMove>,
    /// Pending moves that still need a rewind check against their predecessor
    pub pending_rewind: Vec<bool>,
    /// Free angle fixed once for the whole segment
    pub fixed_value: Option<f64>,
}

impl PoleSegment {
    pub fn new(axis: usize, coupling: Option<Coupling>, start_value: f64) -> Self {
        Self {
            axis,
            coupling,
            start_value,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Per-run mutable state
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContinuityState {
    /// Last accepted angles in degrees, already wound
    pub previous_angles: Option<AngleTuple>,
    /// Translation axis coordinates of the last accepted move
    pub previous_machine: Option<Point3<f64>>,
    /// Multiples of 360 degrees applied per rotary axis
    pub winding: [i64; MAX_ROTARY_AXES],
    pub head_table: HeadTableState,
    /// Open pole segment, if any
    pub pole_segment: Option<PoleSegment>,
    /// Last move handed to the output (or held as segment anchor)
    pub last_posted: Option<PostedMove>,
    /// Global index of the next input move
    pub next_index: usize,
    pub chunks_processed: usize,
    /// Rotation applied to every input move when toolpath alignment is on
    pub alignment: Option<Matrix3<f64>>,
}

impl ContinuityState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True before the first move of the run was accepted
    pub fn is_first_move(&self) -> bool {
        self.previous_angles.is_none()
    }

    /// Record an accepted tuple and refresh the winding counters
    pub fn accept(&mut self, angles_deg: AngleTuple, machine: Point3<f64>) {
        for (i, a) in angles_deg.iter().enumerate() {
            self.winding[i] = winding_of(a);
        }
        self.previous_angles = Some(angles_deg);
        self.previous_machine = Some(machine);
    }

    /// Previous angle of `axis` in radians, wrapped into (-PI, PI]
    pub fn previous_rad(&self, axis: usize) -> Option<f64> {
        let a = self.previous_angles?.get(axis)?;
        Some(axispost_core::geometry::normalize_angle_rad(a.to_radians()))
    }
}

/// Number of whole turns separating `angle_deg` from its (-180, 180] value
pub fn winding_of(angle_deg: f64) -> i64 {
    let wrapped = axispost_core::geometry::normalize_angle_deg(angle_deg);
    ((angle_deg - wrapped) / 360.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winding_counters() {
        assert_eq!(winding_of(10.0), 0);
        assert_eq!(winding_of(370.0), 1);
        assert_eq!(winding_of(-190.0), -1);
        assert_eq!(winding_of(180.0), 0);
        assert_eq!(winding_of(-720.5), -2);
    }

    #[test]
    fn test_accept_updates_state() {
        let mut s = ContinuityState::new();
        assert!(s.is_first_move());
        s.accept(AngleTuple::from_slice(&[400.0, -10.0]), Point3::origin());
        assert!(!s.is_first_move());
        assert_eq!(s.winding, [1, 0, 0]);
        let r = s.previous_rad(0).unwrap();
        assert!((r - 40f64.to_radians()).abs() < 1e-12);
        assert_eq!(s.previous_rad(2), None);
    }

    #[test]
    fn test_state_serializes() {
        let mut s = ContinuityState::new();
        s.accept(AngleTuple::from_slice(&[1.0, 2.0]), Point3::new(1.0, 2.0, 3.0));
        s.pole_segment = Some(PoleSegment::new(0, None, 12.0));
        let json = serde_json::to_string(&s).unwrap();
        let back: ContinuityState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_corrupt_state_is_rejected() {
        let mut s = ContinuityState::new();
        s.accept(AngleTuple::from_slice(&[1.0, 2.0]), Point3::origin());
        let json = serde_json::to_string(&s)
            .unwrap()
            .replace("[1.0,2.0]", "[1.0,2.0,3.0,4.0,5.0]");
        assert!(serde_json::from_str::<ContinuityState>(&json).is_err());
    }
}
