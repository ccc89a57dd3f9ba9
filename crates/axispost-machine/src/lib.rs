//! # axispost Machine
//!
//! Machine kinematic model: the closed set of supported machine variants,
//! construction-time validation, unit rescaling and the forward / inverse
//! kinematics used by the solver and the posting pipeline.

pub mod axis;
pub mod kinematics;
pub mod machine;
pub mod transform;
pub mod validate;

pub use axis::{
    FiveAxisTopology, MachineType, Mounting, RotaryAxis, TranslationAxes, DEFAULT_ROTARY_LIMIT,
    DEFAULT_TRANSLATION_LIMIT,
};
pub use kinematics::{ChainLink, LimitHit, TRANSLATION_LIMIT_TOL};
pub use machine::{
    FiveAxisDefinition, FiveAxisMachine, FivePlusOneDefinition, FivePlusOneMachine,
    FourAxisDefinition, FourAxisMachine, FrameDefinition, Machine, MachineDefinition,
    MachineFrame, SixAxisContourDefinition, SixAxisContourMachine, ThreeAxisDefinition,
    ThreeAxisMachine,
};
pub use transform::CachedTransform;
