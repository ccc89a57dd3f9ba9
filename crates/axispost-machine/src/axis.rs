//! Axis descriptions: rotary axes, translation axes and machine classification

use axispost_core::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default rotary limit magnitude in degrees (effectively unlimited)
pub const DEFAULT_ROTARY_LIMIT: f64 = 100_000.0;

/// Default translation limit magnitude (effectively unlimited)
pub const DEFAULT_TRANSLATION_LIMIT: f64 = 100_000.0;

/// Whether a rotary axis turns the spindle or the workpiece
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mounting {
    #[default]
    Head,
    Table,
}

impl Mounting {
    /// Sign applied to the axis direction when solving in the table frame
    pub fn orientation_sign(self) -> f64 {
        match self {
            Self::Head => 1.0,
            Self::Table => -1.0,
        }
    }
}

/// Kinematic topology of a two-rotary machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiveAxisTopology {
    /// Both table axes, axis 0 nested inside axis 1 (outdated layout)
    TableTableLegacy,
    HeadHead,
    /// Axis 0 on the table, axis 1 on the head
    #[default]
    HeadTable,
    /// Both table axes, axis 1 nested inside axis 0
    TableTableNew,
}

impl FiveAxisTopology {
    /// Mounting of rotary axis 0 and 1
    pub fn mountings(self) -> [Mounting; 2] {
        match self {
            Self::HeadHead => [Mounting::Head, Mounting::Head],
            Self::HeadTable => [Mounting::Table, Mounting::Head],
            Self::TableTableLegacy | Self::TableTableNew => [Mounting::Table, Mounting::Table],
        }
    }
}

/// What the machine is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineType {
    #[default]
    Milling,
    Turning,
    Contour,
    Laser,
    KnifeGrinding,
    Robotic,
    /// Poles are always resolved through head/table rotation
    ConstantTranslation,
}

impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Milling => "milling",
            Self::Turning => "turning",
            Self::Contour => "contour",
            Self::Laser => "laser",
            Self::KnifeGrinding => "knife grinding",
            Self::Robotic => "robotic",
            Self::ConstantTranslation => "constant translation",
        };
        f.write_str(name)
    }
}

/// A rotary axis with its limits in degrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotaryAxis {
    pub direction: Vector3<f64>,
    /// Any point on the rotation line
    pub base_point: Point3<f64>,
    pub min_deg: f64,
    pub max_deg: f64,
    pub mounting: Mounting,
}

impl RotaryAxis {
    pub fn new(direction: Vector3<f64>, mounting: Mounting) -> Self {
        Self {
            direction,
            base_point: Point3::origin(),
            min_deg: -DEFAULT_ROTARY_LIMIT,
            max_deg: DEFAULT_ROTARY_LIMIT,
            mounting,
        }
    }

    pub fn with_base_point(mut self, base_point: Point3<f64>) -> Self {
        self.base_point = base_point;
        self
    }

    pub fn with_limits(mut self, min_deg: f64, max_deg: f64) -> Self {
        self.min_deg = min_deg;
        self.max_deg = max_deg;
        self
    }

    /// True when `angle_deg` lies in `[min - tol, max + tol]`
    pub fn within_limits(&self, angle_deg: f64, tol: f64) -> bool {
        angle_deg >= self.min_deg - tol && angle_deg <= self.max_deg + tol
    }

    /// Direction as seen from the table frame (negated for table axes)
    pub fn effective_direction(&self) -> Vector3<f64> {
        self.direction * self.mounting.orientation_sign()
    }
}

/// Translation axes of the machine and their travel limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationAxes {
    /// Directions of X, Y and Z in the machine frame
    pub directions: [Vector3<f64>; 3],
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Default for TranslationAxes {
    fn default() -> Self {
        Self {
            directions: [Vector3::x(), Vector3::y(), Vector3::z()],
            min: [-DEFAULT_TRANSLATION_LIMIT; 3],
            max: [DEFAULT_TRANSLATION_LIMIT; 3],
        }
    }
}

impl TranslationAxes {
    pub fn with_limits(mut self, min: [f64; 3], max: [f64; 3]) -> Self {
        self.min = min;
        self.max = max;
        self
    }
}

/// Name used in diagnostics for rotary axis `index`
pub fn rotary_axis_name(index: usize) -> String {
    format!("R{}", index + 1)
}

/// Name used in diagnostics for translation axis `index`
pub fn translation_axis_name(index: usize) -> &'static str {
    match index {
        0 => "X",
        1 => "Y",
        _ => "Z",
    }
}
