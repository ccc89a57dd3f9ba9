//! # axispost Core
//!
//! Core types shared by every posting stage: the error taxonomy, unit
//! systems, geometry helpers, rotary angle tuples and the toolpath / posted
//! move records that flow between the solver, selector, interpolator and
//! rewind synthesizer.

pub mod angles;
pub mod error;
pub mod geometry;
pub mod moves;
pub mod units;

pub use angles::{AngleState, AngleTuple, MAX_ROTARY_AXES};
pub use error::{ConfigurationError, LimitAxis, PostError, Result};
pub use moves::{MoveFlags, MoveRole, PostedMove, ToolpathPoint};
pub use units::Units;

// Re-export the math types used in every public signature
pub use nalgebra::{Matrix3, Matrix4, Point3, Vector3};
