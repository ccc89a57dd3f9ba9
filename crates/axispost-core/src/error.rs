//! Error handling for axispost
//!
//! Provides the error taxonomy shared by every posting stage:
//! - Configuration errors (malformed machine definitions or parameters)
//! - Geometric infeasibility (orientation not reachable by the machine)
//! - Limit violations (rotary or translation axis outside its range)
//! - Interpolation and rewind failures
//!
//! All error types use `thiserror` for ergonomic error handling.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error type
///
/// Raised while building a machine model or validating post parameters,
/// always before the first move is solved.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// A required direction vector has zero length
    #[error("Vector with length 0 passed for {what}")]
    NullVector {
        /// Which vector was null (e.g. "spindle direction").
        what: String,
    },

    /// Two rotary axes that must differ point along the same line
    #[error("Rotary axis {first} and rotary axis {second} are parallel")]
    ParallelRotaryAxes {
        /// Index of the first rotary axis.
        first: usize,
        /// Index of the second rotary axis.
        second: usize,
    },

    /// The spindle lies along a rotary axis that has to tilt it
    #[error("Spindle direction is parallel to rotary axis {axis}")]
    SpindleParallelToAxis {
        /// Index of the offending rotary axis.
        axis: usize,
    },

    /// The saw (cutting) direction lies along the spindle
    #[error("Saw direction is parallel to the spindle direction")]
    SawParallelToSpindle,

    /// The contour axis of a 5+1 machine does not turn about the spindle
    #[error("Contour axis must be parallel to the spindle direction")]
    ContourAxisNotAlongSpindle,

    /// A declared limit has min greater than max
    #[error("Invalid limits for {axis}: min {min} is greater than max {max}")]
    InvertedLimit {
        /// Axis name (X, Y, Z, R1, R2, R3).
        axis: String,
        /// Declared minimum.
        min: f64,
        /// Declared maximum.
        max: f64,
    },

    /// Translation axis directions do not span 3D space
    #[error("Translation axis directions are coplanar")]
    DegenerateTranslationAxes,

    /// A homogeneous transform cannot be inverted
    #[error("Singular matrix passed for {what}")]
    SingularTransform {
        /// Which transform was singular.
        what: String,
    },

    /// Machine and parameter unit systems disagree
    #[error("Unit mismatch: machine is {machine}, parameters are {parameters}")]
    UnitsMismatch {
        /// Machine unit system.
        machine: String,
        /// Parameter unit system.
        parameters: String,
    },

    /// A post parameter has an unusable value
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Machine axis limit that was exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimitAxis {
    XMin,
    YMin,
    ZMin,
    R1Min,
    R2Min,
    R3Min,
    XMax,
    YMax,
    ZMax,
    R1Max,
    R2Max,
    R3Max,
}

impl LimitAxis {
    /// Limit tag for translation axis `index` (0 = X).
    pub fn translation(index: usize, is_max: bool) -> Self {
        match (index, is_max) {
            (0, false) => Self::XMin,
            (1, false) => Self::YMin,
            (_, false) => Self::ZMin,
            (0, true) => Self::XMax,
            (1, true) => Self::YMax,
            (_, true) => Self::ZMax,
        }
    }

    /// Limit tag for rotary axis `index` (0 = R1).
    pub fn rotary(index: usize, is_max: bool) -> Self {
        match (index, is_max) {
            (0, false) => Self::R1Min,
            (1, false) => Self::R2Min,
            (_, false) => Self::R3Min,
            (0, true) => Self::R1Max,
            (1, true) => Self::R2Max,
            (_, true) => Self::R3Max,
        }
    }

    pub fn is_rotary(&self) -> bool {
        matches!(
            self,
            Self::R1Min | Self::R2Min | Self::R3Min | Self::R1Max | Self::R2Max | Self::R3Max
        )
    }

    pub fn is_max(&self) -> bool {
        matches!(
            self,
            Self::XMax | Self::YMax | Self::ZMax | Self::R1Max | Self::R2Max | Self::R3Max
        )
    }
}

impl fmt::Display for LimitAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::XMin => "X_MIN",
            Self::YMin => "Y_MIN",
            Self::ZMin => "Z_MIN",
            Self::R1Min => "R1_MIN",
            Self::R2Min => "R2_MIN",
            Self::R3Min => "R3_MIN",
            Self::XMax => "X_MAX",
            Self::YMax => "Y_MAX",
            Self::ZMax => "Z_MAX",
            Self::R1Max => "R1_MAX",
            Self::R2Max => "R2_MAX",
            Self::R3Max => "R3_MAX",
        };
        f.write_str(name)
    }
}

fn at_move(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" at move {}", i),
        None => String::new(),
    }
}

/// Main error type for posting
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PostError {
    /// Configuration error
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The requested orientation cannot be reached by the machine topology
    #[error("Orientation not reachable{}: {reason}", at_move(.index))]
    GeometricInfeasibility {
        /// Original toolpath index, when known.
        index: Option<usize>,
        /// What made the move infeasible.
        reason: String,
    },

    /// An axis leaves its configured range and nothing resolves it
    #[error("Limit {axis} exceeded{}: value {value:.6}, limit {limit:.6}", at_move(.index))]
    LimitViolation {
        /// Original toolpath index, when known.
        index: Option<usize>,
        /// The violated limit.
        axis: LimitAxis,
        /// Offending value.
        value: f64,
        /// Configured limit.
        limit: f64,
    },

    /// Angle change above the configured limit with rewinding disabled
    #[error("Angle change of {delta:.3} deg on rotary axis {axis} exceeds limit {limit:.3}{}", at_move(.index))]
    AngleJump {
        /// Original toolpath index, when known.
        index: Option<usize>,
        /// Rotary axis index.
        axis: usize,
        /// Signed change in degrees.
        delta: f64,
        /// Configured angle change limit in degrees.
        limit: f64,
    },

    /// Start and end orientations are exactly opposite
    #[error("Cannot interpolate between opposite orientations (moves {from} and {to})")]
    AmbiguousInterpolation {
        /// Original index of the start move.
        from: usize,
        /// Original index of the end move.
        to: usize,
    },

    /// The retract/rewind sequence could not be built
    #[error("Rewind failed{}: {reason}", at_move(.index))]
    RewindFailed {
        /// Original toolpath index, when known.
        index: Option<usize>,
        /// Why rewinding failed.
        reason: String,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl PostError {
    /// Create a generic error from a message
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create a geometric infeasibility error without a move index
    pub fn infeasible(reason: impl Into<String>) -> Self {
        Self::GeometricInfeasibility {
            index: None,
            reason: reason.into(),
        }
    }

    /// Attach the original toolpath index if the error does not carry one yet
    pub fn at_index(self, at: usize) -> Self {
        match self {
            Self::GeometricInfeasibility { index: None, reason } => {
                Self::GeometricInfeasibility {
                    index: Some(at),
                    reason,
                }
            }
            Self::LimitViolation {
                index: None,
                axis,
                value,
                limit,
            } => Self::LimitViolation {
                index: Some(at),
                axis,
                value,
                limit,
            },
            Self::AngleJump {
                index: None,
                axis,
                delta,
                limit,
            } => Self::AngleJump {
                index: Some(at),
                axis,
                delta,
                limit,
            },
            Self::RewindFailed { index: None, reason } => Self::RewindFailed {
                index: Some(at),
                reason,
            },
            other => other,
        }
    }

    /// Original toolpath index carried by the error, if any
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::GeometricInfeasibility { index, .. }
            | Self::LimitViolation { index, .. }
            | Self::AngleJump { index, .. }
            | Self::RewindFailed { index, .. } => *index,
            Self::AmbiguousInterpolation { to, .. } => Some(*to),
            _ => None,
        }
    }

    /// Check if this is a configuration error
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Check if this is a limit violation
    pub fn is_limit_violation(&self) -> bool {
        matches!(self, Self::LimitViolation { .. })
    }

    /// Check if this is a geometric infeasibility
    pub fn is_infeasible(&self) -> bool {
        matches!(self, Self::GeometricInfeasibility { .. })
    }
}

/// Result type for posting operations
pub type Result<T> = std::result::Result<T, PostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = ConfigurationError::NullVector {
            what: "spindle direction".to_string(),
        };
        assert_eq!(err.to_string(), "Vector with length 0 passed for spindle direction");

        let err = ConfigurationError::InvertedLimit {
            axis: "R1".to_string(),
            min: 10.0,
            max: -10.0,
        };
        assert_eq!(
            err.to_string(),
            "Invalid limits for R1: min 10 is greater than max -10"
        );
    }

    #[test]
    fn test_limit_axis_names() {
        assert_eq!(LimitAxis::translation(0, false).to_string(), "X_MIN");
        assert_eq!(LimitAxis::translation(2, true).to_string(), "Z_MAX");
        assert_eq!(LimitAxis::rotary(1, true).to_string(), "R2_MAX");
        assert!(LimitAxis::R3Min.is_rotary());
        assert!(!LimitAxis::YMax.is_rotary());
        assert!(LimitAxis::YMax.is_max());
    }

    #[test]
    fn test_post_error_display_with_index() {
        let err = PostError::LimitViolation {
            index: Some(4),
            axis: LimitAxis::R1Max,
            value: 120.0,
            limit: 90.0,
        };
        assert_eq!(
            err.to_string(),
            "Limit R1_MAX exceeded at move 4: value 120.000000, limit 90.000000"
        );

        let err = PostError::infeasible("not along spindle");
        assert_eq!(err.to_string(), "Orientation not reachable: not along spindle");
        assert_eq!(
            err.at_index(7).to_string(),
            "Orientation not reachable at move 7: not along spindle"
        );
    }

    #[test]
    fn test_at_index_keeps_existing_index() {
        let err = PostError::RewindFailed {
            index: Some(2),
            reason: "no room".to_string(),
        };
        assert_eq!(err.at_index(9).index(), Some(2));
    }

    #[test]
    fn test_error_conversion() {
        let config_err = ConfigurationError::DegenerateTranslationAxes;
        let err: PostError = config_err.into();
        assert!(err.is_configuration_error());
        assert!(!err.is_limit_violation());
        assert_eq!(err.to_string(), "Translation axis directions are coplanar");
    }
}
