//! # axispost Kinematics
//!
//! Turns tool orientations into rotary axis angles:
//! - `solver`: pure inverse kinematics, two candidate tuples per orientation
//! - `selector`: continuity, start policies, limits, poles and jumps
//! - `head_table`: pole resolution by holding a translation axis
//! - `state`: what is carried from one move (and chunk) to the next

pub mod head_table;
pub mod selector;
pub mod solver;
pub mod state;

pub use head_table::{Case, HeadTableState, HeadTableStrategy, Plane, PoleMove, Strategy};
pub use selector::{wind_onto, ContinuitySelector, RewindCause, SelectContext, Selected};
pub use solver::{
    rebase_pole_value, Coupling, KinematicSolver, SolveRequest, Solution, SolverTolerances,
};
pub use state::{winding_of, ContinuityState, PoleSegment};
