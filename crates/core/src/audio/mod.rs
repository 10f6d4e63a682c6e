//! Audio primitives: WAV and container I/O, effects, format normalization,
//! and the synthesized-speech quality gate.

pub mod effects;
pub mod io;
pub mod normalize;
pub mod quality;

pub use normalize::{NormalizedSegment, normalize};
pub use quality::QualityGate;
