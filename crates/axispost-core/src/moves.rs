//! Toolpath input records and posted machine moves

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::angles::{AngleState, AngleTuple};

/// Role of a move within the toolpath
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveRole {
    Approach,
    EntryMacro,
    ConnectionNotClearance,
    ConnectionClearance,
    ExitMacro,
    Retract,
    #[default]
    Contour,
    /// Withdrawal synthesized before a rewind
    RewindRetract,
    /// Angle-unwinding move synthesized while retracted
    Rewind,
    /// Return to the contour after a rewind
    RewindApproach,
    Dwell,
    ToolChange,
}

impl MoveRole {
    /// Roles only ever produced by the rewind synthesizer
    pub fn is_rewind_role(&self) -> bool {
        matches!(self, Self::RewindRetract | Self::Rewind | Self::RewindApproach)
    }
}

impl fmt::Display for MoveRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Approach => "approach",
            Self::EntryMacro => "entry macro",
            Self::ConnectionNotClearance => "connection (not clearance)",
            Self::ConnectionClearance => "connection (clearance)",
            Self::ExitMacro => "exit macro",
            Self::Retract => "retract",
            Self::Contour => "contour",
            Self::RewindRetract => "rewind retract",
            Self::Rewind => "rewind",
            Self::RewindApproach => "rewind approach",
            Self::Dwell => "dwell",
            Self::ToolChange => "tool change",
        };
        f.write_str(name)
    }
}

/// Marker flags carried through posting unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MoveFlags {
    /// Rapid (non-cutting) motion
    pub rapid: bool,
    /// Move ends at a toolpath corner
    pub corner: bool,
    /// Move should be reported to downstream consumers
    pub report: bool,
}

/// One record of the input toolpath, in workpiece coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolpathPoint {
    /// Tool tip position
    pub position: Point3<f64>,
    /// Tool orientation (unit vector pointing from tip towards the holder)
    pub orientation: Vector3<f64>,
    /// Requested saw / cutting direction for contour machines
    pub saw_direction: Option<Vector3<f64>>,
    pub feed: f64,
    pub flags: MoveFlags,
    pub role: MoveRole,
    /// Potential surface contact point, passed through untouched
    pub contact_point: Option<Point3<f64>>,
}

impl ToolpathPoint {
    /// Feed move at `position` with orientation `orientation`
    pub fn new(position: Point3<f64>, orientation: Vector3<f64>) -> Self {
        Self {
            position,
            orientation,
            saw_direction: None,
            feed: 0.0,
            flags: MoveFlags::default(),
            role: MoveRole::Contour,
            contact_point: None,
        }
    }

    pub fn with_feed(mut self, feed: f64) -> Self {
        self.feed = feed;
        self
    }

    pub fn with_rapid(mut self, rapid: bool) -> Self {
        self.flags.rapid = rapid;
        self
    }

    pub fn with_role(mut self, role: MoveRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_saw_direction(mut self, saw: Vector3<f64>) -> Self {
        self.saw_direction = Some(saw);
        self
    }

    pub fn with_contact_point(mut self, contact: Point3<f64>) -> Self {
        self.contact_point = Some(contact);
        self
    }
}

/// A solved machine position, the unit of posting output
///
/// Angles are in degrees and already wound, so consecutive values move
/// continuously rather than wrapping at 360.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostedMove {
    /// Translation axis coordinates in the machine frame
    pub machine_position: Point3<f64>,
    /// Tool tip in workpiece coordinates
    pub part_position: Point3<f64>,
    /// Tool orientation in workpiece coordinates
    pub orientation: Vector3<f64>,
    pub angles: AngleTuple,
    pub angle_state: AngleState,
    pub feed: f64,
    pub flags: MoveFlags,
    pub role: MoveRole,
    /// Index of the input toolpath point this move belongs to
    ///
    /// Synthesized moves reference the next original move.
    pub original_index: usize,
    /// True for moves inserted by posting rather than taken from the input
    pub added_by_post: bool,
    pub contact_point: Option<Point3<f64>>,
    pub saw_direction: Option<Vector3<f64>>,
}

impl PostedMove {
    /// Posted counterpart of an input point, before kinematics fill in the rest
    pub fn from_point(point: &ToolpathPoint, index: usize) -> Self {
        Self {
            machine_position: point.position,
            part_position: point.position,
            orientation: point.orientation,
            angles: AngleTuple::default(),
            angle_state: AngleState::Determined,
            feed: point.feed,
            flags: point.flags,
            role: point.role,
            original_index: index,
            added_by_post: false,
            contact_point: point.contact_point,
            saw_direction: point.saw_direction,
        }
    }

    pub fn is_rapid(&self) -> bool {
        self.flags.rapid
    }

    /// Copy of this move re-tagged as a synthesized move with `role`
    pub fn synthesized(&self, role: MoveRole) -> Self {
        let mut m = self.clone();
        m.role = role;
        m.added_by_post = true;
        m.flags.corner = false;
        m.flags.report = false;
        m
    }

    /// True when `point` asks for this move again, within `tol`
    ///
    /// Moves added by the post never count as a repeat.
    pub fn is_repeated_by(&self, point: &ToolpathPoint, tol: f64) -> bool {
        !self.added_by_post
            && (self.part_position - point.position).norm() <= tol
            && (self.orientation - point.orientation).norm() <= tol
            && match (self.saw_direction, point.saw_direction) {
                (Some(a), Some(b)) => (a - b).norm() <= tol,
                (None, None) => true,
                _ => false,
            }
    }
}
