//! # axispost
//!
//! Multi-axis post-processing for machine tools: turns a toolpath given
//! as tool-tip positions and tool orientations in the workpiece frame into
//! machine axis values for 3-, 4-, 5-, 5+1- and 6-axis machines.
//!
//! ## Architecture
//!
//! The workspace is split by concern:
//!
//! 1. **axispost-core** - errors, units, geometry helpers, moves and angles
//! 2. **axispost-machine** - machine kinematic models and forward kinematics
//! 3. **axispost-settings** - post parameters and their persistence
//! 4. **axispost-kinematics** - inverse kinematics, solution continuity, pole strategies
//! 5. **axispost-post** - interpolation, retract/rewind and the posting pipeline
//! 6. **axispost** - this facade

use std::sync::Arc;

pub use axispost_kinematics as kinematics;
pub use axispost_machine as machine;
pub use axispost_post as post;
pub use axispost_settings as settings;

pub use axispost_core::{
    AngleState, AngleTuple, ConfigurationError, LimitAxis, MoveFlags, MoveRole, Point3,
    PostError, PostedMove, Result, ToolpathPoint, Units, Vector3,
};
pub use axispost_kinematics::{ContinuityState, KinematicSolver, SolveRequest, Solution};
pub use axispost_machine::{Machine, MachineDefinition, MachineType};
pub use axispost_post::{optimal_chunk_sizes, post_pipelined, ChunkError, ChunkOutput, Poster};
pub use axispost_settings::{InterpolationType, MachineLimits, PoleHandling, PostParameters};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("AXISPOST_BUILD_DATE");

/// Build a machine from its definition and a poster for it
pub fn poster_from_definition(
    definition: &MachineDefinition,
    params: PostParameters,
    tool_length: f64,
) -> Result<Poster> {
    let machine = Machine::from_definition(definition)?;
    Poster::new(Arc::new(machine), Arc::new(params), tool_length)
}

/// Initialize logging with the default configuration
///
/// Pretty console output filtered through `RUST_LOG`, at `info` unless
/// the environment says otherwise.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    tracing::info!("axispost {} (built {})", VERSION, BUILD_DATE);
    Ok(())
}
