//! Unit system handling
//!
//! Machine definitions and post parameters each carry a unit system.
//! Linear quantities are rescaled when switching between them; angles never are.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Millimetres per inch
pub const MM_PER_INCH: f64 = 25.4;

/// Unit system for linear quantities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Millimetres
    #[default]
    Metric,
    /// Inches
    Inch,
}

impl Units {
    /// Factor that converts a length in `self` into `target`
    pub fn factor_to(self, target: Units) -> f64 {
        match (self, target) {
            (Self::Metric, Self::Inch) => 1.0 / MM_PER_INCH,
            (Self::Inch, Self::Metric) => MM_PER_INCH,
            _ => 1.0,
        }
    }

    /// Pick the metric or inch flavour of a default value
    pub fn pick(self, metric: f64, inch: f64) -> f64 {
        match self {
            Self::Metric => metric,
            Self::Inch => inch,
        }
    }

    /// Short unit label ("mm" or "in")
    pub fn label(self) -> &'static str {
        match self {
            Self::Metric => "mm",
            Self::Inch => "in",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metric => write!(f, "Metric"),
            Self::Inch => write!(f, "Inch"),
        }
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "metric" | "mm" => Ok(Self::Metric),
            "inch" | "in" | "imperial" => Ok(Self::Inch),
            _ => Err(format!("Unknown unit system: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_between_systems() {
        assert_eq!(Units::Metric.factor_to(Units::Metric), 1.0);
        assert!((Units::Inch.factor_to(Units::Metric) - 25.4).abs() < 1e-12);
        assert!((Units::Metric.factor_to(Units::Inch) * 25.4 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pick_default_by_units() {
        assert_eq!(Units::Metric.pick(2.5, 0.1), 2.5);
        assert_eq!(Units::Inch.pick(2.5, 0.1), 0.1);
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("mm".parse::<Units>().unwrap(), Units::Metric);
        assert_eq!("IN".parse::<Units>().unwrap(), Units::Inch);
        assert!("furlong".parse::<Units>().is_err());
        assert_eq!(Units::Inch.to_string(), "Inch");
        assert_eq!(Units::Metric.label(), "mm");
    }
}
