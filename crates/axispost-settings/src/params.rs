//! Post parameters
//!
//! One immutable snapshot of every option the posting stages read:
//! - Angle pair selection and start angle policy
//! - Machine limit enforcement and tolerances
//! - Pole handling and the head/table rotation strategy
//! - Interpolation basis and step thresholds
//! - Retract / rewind distances and policies
//!
//! Linear quantities follow `units`; angles are always degrees.

use axispost_core::{ConfigurationError, Units, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// How the first move of a run picks its solution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartAngleType {
    #[default]
    SelectBetweenTwoSolutions,
    UseFirstRotAngle,
    UseSecondRotAngle,
    UseThirdRotAngle,
    /// Start solution chosen by the head/table translation-axis rule
    ProvideTranslationAxis,
}

impl StartAngleType {
    /// Rotary axis whose value is steered towards the preferred start angle
    pub fn preferred_axis(self) -> Option<usize> {
        match self {
            Self::UseFirstRotAngle => Some(0),
            Self::UseSecondRotAngle => Some(1),
            Self::UseThirdRotAngle => Some(2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionForStartAngle {
    #[default]
    First,
    Other,
}

/// Seed for the head/table strategy: which translation axis is held first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionForStartTranslation {
    #[default]
    FirstPositive,
    FirstNegative,
    SecondPositive,
    SecondNegative,
    ThirdPositive,
    ThirdNegative,
    /// Use `custom_trans_axis_dir`
    Custom,
}

impl SolutionForStartTranslation {
    /// Translation axis index and direction sign, or `None` for custom
    pub fn axis_and_sign(self) -> Option<(usize, f64)> {
        match self {
            Self::FirstPositive => Some((0, 1.0)),
            Self::FirstNegative => Some((0, -1.0)),
            Self::SecondPositive => Some((1, 1.0)),
            Self::SecondNegative => Some((1, -1.0)),
            Self::ThirdPositive => Some((2, 1.0)),
            Self::ThirdNegative => Some((2, -1.0)),
            Self::Custom => None,
        }
    }
}

/// Which machine limits the selector enforces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineLimits {
    #[default]
    NoLimits,
    Translation,
    Rotation,
    Both,
}

impl MachineLimits {
    pub fn translation(self) -> bool {
        matches!(self, Self::Translation | Self::Both)
    }

    pub fn rotation(self) -> bool {
        matches!(self, Self::Rotation | Self::Both)
    }
}

/// What happens to the free angle while the tool sits at a pole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoleHandling {
    /// Keep the previous angle
    Freeze,
    /// Turn the free axis to stay inside the translation limits
    UseRotationToAvoidLimits,
    LinearInterpolation,
    #[default]
    SmoothInterpolation,
    ForceHeadAndTable,
    /// Fix the free angle once per pole segment so translations stay in range
    FindHeadOrTableFixPosition,
}

impl PoleHandling {
    /// Policies that fill a pole segment once its closing move is known
    pub fn is_blending(self) -> bool {
        matches!(self, Self::LinearInterpolation | Self::SmoothInterpolation)
    }
}

impl fmt::Display for PoleHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Freeze => "freeze",
            Self::UseRotationToAvoidLimits => "rotate to avoid limits",
            Self::LinearInterpolation => "linear interpolation",
            Self::SmoothInterpolation => "smooth interpolation",
            Self::ForceHeadAndTable => "force head and table",
            Self::FindHeadOrTableFixPosition => "find head or table fix position",
        };
        f.write_str(name)
    }
}

/// Interpolation basis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationType {
    /// Blend orientation vectors and re-solve
    #[default]
    Vectors,
    /// Blend rotary angles (controller RTCP on)
    Angles,
    /// Blend raw axis values (controller RTCP off)
    AxisValues,
}

/// Configuration snapshot shared by every posting stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostParameters {
    pub units: Units,

    // Solution selection
    pub angle_select_auto_from_two_pairs: bool,
    pub angle_select_other_pair: bool,
    /// Largest angle change in degrees between consecutive feed moves
    pub angle_change_limit: f64,
    pub solution_change_for_min_retracts_and_rewinds: bool,
    pub start_angle_type: StartAngleType,
    pub solution_for_start_angle: SolutionForStartAngle,
    pub preferred_start_angle: f64,
    /// Use `preferred_start_angle` for a first move that sits at a pole
    pub start_rotation_angle: bool,
    pub first_solution_closer_to_zero: bool,

    // Limits and tolerances
    pub machine_limits: MachineLimits,
    pub angle_tol_for_mach_limits: f64,
    pub pole_angle_tol_deg: f64,
    pub toolpath_tolerance: f64,

    // Poles and head/table rotation
    pub pole_handling: PoleHandling,
    pub solution_for_start_translation: SolutionForStartTranslation,
    pub limit_linear_axis_travel: bool,
    pub avoid_rotation_axis_direction_change: bool,
    pub custom_trans_axis_dir: Vector3<f64>,

    // Interpolation
    pub interpolation: InterpolationType,
    /// Rotate 3/4-axis toolpaths so their first orientation is reachable
    pub toolpath_alignment: bool,
    pub interpolation_angle_step: f64,
    pub rapid_interpolation_angle_step: f64,
    pub interpolation_dist: f64,
    pub rapid_interpolation_dist: f64,
    pub interpolation_dist_flag: bool,
    pub rapid_interpolation_dist_flag: bool,
    pub interpolation_angle_step_flag: bool,
    pub rapid_interpolation_angle_step_flag: bool,
    pub filter_duplicate_moves: bool,

    // Retract and rewind
    pub retract_and_rewind: bool,
    pub retract_tool_at_max: bool,
    pub retract_distance: f64,
    pub additional_retract: bool,
    pub additional_retract_tool_at_max: bool,
    pub additional_retract_distance: f64,
    /// Machine-frame direction of the additional retract
    pub additional_retract_direction: Vector3<f64>,
    pub rewind_in_one_step: bool,
    pub rewind_angle_step: f64,
}

impl Default for PostParameters {
    fn default() -> Self {
        Self::for_units(Units::Metric)
    }
}

impl PostParameters {
    /// Defaults with linear thresholds chosen for `units`
    pub fn for_units(units: Units) -> Self {
        Self {
            units,
            angle_select_auto_from_two_pairs: true,
            angle_select_other_pair: false,
            angle_change_limit: 120.0,
            solution_change_for_min_retracts_and_rewinds: false,
            start_angle_type: StartAngleType::SelectBetweenTwoSolutions,
            solution_for_start_angle: SolutionForStartAngle::First,
            preferred_start_angle: 0.0,
            start_rotation_angle: false,
            first_solution_closer_to_zero: true,
            machine_limits: MachineLimits::NoLimits,
            angle_tol_for_mach_limits: 0.0001,
            pole_angle_tol_deg: 0.01,
            toolpath_tolerance: 1e-10,
            pole_handling: PoleHandling::SmoothInterpolation,
            solution_for_start_translation: SolutionForStartTranslation::FirstPositive,
            limit_linear_axis_travel: true,
            avoid_rotation_axis_direction_change: false,
            custom_trans_axis_dir: Vector3::x(),
            interpolation: InterpolationType::Vectors,
            toolpath_alignment: false,
            interpolation_angle_step: 3.0,
            rapid_interpolation_angle_step: 10.0,
            interpolation_dist: units.pick(2.5, 0.1),
            rapid_interpolation_dist: units.pick(2.5, 0.1),
            interpolation_dist_flag: true,
            rapid_interpolation_dist_flag: true,
            interpolation_angle_step_flag: true,
            rapid_interpolation_angle_step_flag: false,
            filter_duplicate_moves: true,
            retract_and_rewind: true,
            retract_tool_at_max: false,
            retract_distance: units.pick(100.0, 4.0),
            additional_retract: false,
            additional_retract_tool_at_max: true,
            additional_retract_distance: units.pick(100.0, 4.0),
            additional_retract_direction: Vector3::x(),
            rewind_in_one_step: true,
            rewind_angle_step: 10.0,
        }
    }

    /// Distance step for a move, or `None` when the criterion is off
    pub fn distance_step(&self, rapid: bool) -> Option<f64> {
        if rapid {
            self.rapid_interpolation_dist_flag
                .then_some(self.rapid_interpolation_dist)
        } else {
            self.interpolation_dist_flag.then_some(self.interpolation_dist)
        }
    }

    /// Angle step in degrees for a move, or `None` when the criterion is off
    pub fn angle_step(&self, rapid: bool) -> Option<f64> {
        if rapid {
            self.rapid_interpolation_angle_step_flag
                .then_some(self.rapid_interpolation_angle_step)
        } else {
            self.interpolation_angle_step_flag
                .then_some(self.interpolation_angle_step)
        }
    }

    /// Check every value the posting stages rely on
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let positive = [
            ("angle_change_limit", self.angle_change_limit),
            ("interpolation_angle_step", self.interpolation_angle_step),
            ("rapid_interpolation_angle_step", self.rapid_interpolation_angle_step),
            ("interpolation_dist", self.interpolation_dist),
            ("rapid_interpolation_dist", self.rapid_interpolation_dist),
            ("rewind_angle_step", self.rewind_angle_step),
            ("toolpath_tolerance", self.toolpath_tolerance),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(name, format!("must be a positive number, got {}", value)));
            }
        }

        let non_negative = [
            ("angle_tol_for_mach_limits", self.angle_tol_for_mach_limits),
            ("pole_angle_tol_deg", self.pole_angle_tol_deg),
            ("retract_distance", self.retract_distance),
            ("additional_retract_distance", self.additional_retract_distance),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(name, format!("must not be negative, got {}", value)));
            }
        }

        if self.pole_angle_tol_deg >= 90.0 {
            return Err(invalid("pole_angle_tol_deg", "must be below 90 degrees".to_string()));
        }
        if !self.preferred_start_angle.is_finite() {
            return Err(invalid("preferred_start_angle", "must be finite".to_string()));
        }
        if self.additional_retract && self.additional_retract_direction.norm() <= 1e-12 {
            return Err(ConfigurationError::NullVector {
                what: "additional retract direction".to_string(),
            });
        }
        if self.solution_for_start_translation == SolutionForStartTranslation::Custom
            && self.custom_trans_axis_dir.norm() <= 1e-12
        {
            return Err(ConfigurationError::NullVector {
                what: "custom translation axis direction".to_string(),
            });
        }
        Ok(())
    }

    /// Rescale linear thresholds and distances by `factor` and switch units
    pub fn scale(&mut self, units: Units, factor: f64) {
        debug!(
            "Scaling post parameters from {} to {} by {}",
            self.units, units, factor
        );
        self.units = units;
        self.interpolation_dist *= factor;
        self.rapid_interpolation_dist *= factor;
        self.retract_distance *= factor;
        self.additional_retract_distance *= factor;
    }

    /// Copy converted to `units`
    pub fn converted_to(&self, units: Units) -> Self {
        let mut copy = self.clone();
        copy.scale(units, self.units.factor_to(units));
        copy
    }
}

fn invalid(name: &str, reason: String) -> ConfigurationError {
    ConfigurationError::InvalidParameter {
        name: name.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_units() {
        let metric = PostParameters::default();
        assert_eq!(metric.units, Units::Metric);
        assert_eq!(metric.interpolation_dist, 2.5);
        assert_eq!(metric.retract_distance, 100.0);
        assert_eq!(metric.angle_change_limit, 120.0);
        assert_eq!(metric.pole_handling, PoleHandling::SmoothInterpolation);

        let inch = PostParameters::for_units(Units::Inch);
        assert_eq!(inch.interpolation_dist, 0.1);
        assert_eq!(inch.retract_distance, 4.0);
        assert_eq!(inch.rewind_angle_step, 10.0);
        assert!(metric.validate().is_ok());
        assert!(inch.validate().is_ok());
    }

    #[test]
    fn test_step_lookup_respects_flags() {
        let p = PostParameters::default();
        assert_eq!(p.distance_step(false), Some(2.5));
        assert_eq!(p.angle_step(false), Some(3.0));
        assert_eq!(p.angle_step(true), None);
        assert_eq!(p.distance_step(true), Some(2.5));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let p = PostParameters {
            angle_change_limit: 0.0,
            ..PostParameters::default()
        };
        assert!(matches!(
            p.validate(),
            Err(ConfigurationError::InvalidParameter { ref name, .. }) if name == "angle_change_limit"
        ));

        let p = PostParameters {
            retract_distance: -1.0,
            ..PostParameters::default()
        };
        assert!(p.validate().is_err());

        let p = PostParameters {
            additional_retract: true,
            additional_retract_direction: Vector3::zeros(),
            ..PostParameters::default()
        };
        assert!(matches!(p.validate(), Err(ConfigurationError::NullVector { .. })));
    }

    #[test]
    fn test_scale_to_inch() {
        let p = PostParameters::default().converted_to(Units::Inch);
        assert_eq!(p.units, Units::Inch);
        assert!((p.retract_distance - 100.0 / 25.4).abs() < 1e-12);
        assert!((p.interpolation_dist - 2.5 / 25.4).abs() < 1e-12);
        // Angles never scale
        assert_eq!(p.interpolation_angle_step, 3.0);
    }

    #[test]
    fn test_enum_helpers() {
        assert!(MachineLimits::Both.translation());
        assert!(!MachineLimits::Rotation.translation());
        assert!(MachineLimits::Rotation.rotation());
        assert_eq!(StartAngleType::UseThirdRotAngle.preferred_axis(), Some(2));
        assert_eq!(
            SolutionForStartTranslation::SecondNegative.axis_and_sign(),
            Some((1, -1.0))
        );
        assert!(PoleHandling::LinearInterpolation.is_blending());
        assert!(!PoleHandling::Freeze.is_blending());
    }
}
