//! # axispost Settings
//!
//! Post parameters: the configuration snapshot read by every posting stage,
//! with per-unit defaults, validation, unit rescaling and JSON / TOML
//! persistence in the platform configuration directory.

pub mod params;
pub mod persistence;

pub use params::{
    InterpolationType, MachineLimits, PoleHandling, PostParameters, SolutionForStartAngle,
    SolutionForStartTranslation, StartAngleType,
};
