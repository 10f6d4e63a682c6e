//! Drilltrack core: bilingual sentence tables in, a drilled-practice audio
//! track and matching subtitles out.

pub mod audio;
pub mod drill;
pub mod error;
pub mod synth;
pub mod types;

pub use error::DrillError;
