//! # axispost Post
//!
//! The posting pipeline: solved and selected moves are densified by the
//! interpolator, bridged by retract / rewind sequences where the rotary
//! axes jump, and emitted in order. Long toolpaths can be posted in chunks
//! with the continuity state handed from one chunk to the next.

pub mod interpolate;
pub mod pipeline;
pub mod rewind;
pub mod stream;

pub use interpolate::{lerp_angles, Interpolator};
pub use pipeline::{ChunkError, ChunkOutput, Poster, DUPLICATE_TOL};
pub use rewind::RewindSynthesizer;
pub use stream::{optimal_chunk_sizes, post_pipelined};
