//! Drill assembly: sentence table loading, the per-row repetition timeline,
//! SRT rendering, and the run loop tying them to a synthesizer.

pub mod run;
pub mod subtitle;
pub mod table;
pub mod timeline;

pub use run::{DingConfig, DrillConfig, DrillOutput, ExportPaths, export, load_table, prepare_scratch_dir, run_drill};
pub use table::{LoadedTable, load_rows};
pub use timeline::{DrillPattern, Timeline};
