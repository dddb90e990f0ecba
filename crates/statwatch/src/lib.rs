//! StatWatch — change detection and delta reports for periodically scraped statistics.

pub mod engine;
pub mod normalize;
pub mod render;
pub mod types;

pub use engine::{ChangeEngine, Comparison, ReportResult};
pub use normalize::CategoryNormalizer;
pub use render::{render_report, render_totals, Emphasis, ReportStyle, DEFAULT_TITLE};
pub use types::*;
