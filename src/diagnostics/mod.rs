//! Serializable run reports.
//!
//! `CalibrationReport` and `AlignmentReport` summarize what each stage
//! produced (counts, lattice dimensions, fit quality, output shape) together
//! with a `TimingBreakdown`. The CLI writes them as pretty JSON.

pub mod reports;
pub mod timing;

pub use reports::{AlignmentReport, CalibrationReport, FitSummary, LatticeSummary};
pub use timing::{StageTiming, TimingBreakdown};
