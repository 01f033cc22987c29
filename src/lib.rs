#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod alignment;
pub mod calibration;
pub mod diagnostics;
pub mod error;
pub mod image;
pub mod lattice;
pub mod params;
pub mod persist;
pub mod pipeline;
pub mod progress;

// Building blocks, public for tools and tests.
pub mod config;
pub mod filters;
pub mod homography;

// --- High-level re-exports -------------------------------------------------

// Main entry points: calibration and alignment jobs.
pub use crate::pipeline::{AlignmentOutcome, Aligner, CalibrationOutcome, Calibrator};
pub use crate::error::{LfError, Result};
pub use crate::params::PipelineParams;

// Sensor data.
pub use crate::image::{ImageF32, SensorImage};

// Lattice model shared by every stage.
pub use crate::lattice::{grid_gen, Centroid, CentroidList, Mic, MlaGeometry, Pattern};

// Cancellation and status reporting.
pub use crate::progress::{CancelToken, LogStatus, NullStatus, Progress, StatusSink};

// --- Prelude ---------------------------------------------------------------

/// Small prelude for quick experiments.
///
/// ```no_run
/// use lfp_align::prelude::*;
/// use std::path::Path;
///
/// # fn main() -> lfp_align::Result<()> {
/// let white = load_sensor_image(Path::new("white.png"))?;
/// let token = CancelToken::new();
/// let progress = Progress::new(&token, &LogStatus);
///
/// let calibrator = Calibrator::new(PipelineParams::default())?;
/// if let Some(cal) = calibrator.calibrate(&white, &progress)? {
///     let capture = load_sensor_image(Path::new("capture.png"))?;
///     let aligner = Aligner::new(PipelineParams::default())?;
///     if let Some(out) = aligner.align(&capture, &cal.centroids, &progress)? {
///         println!("aligned shape {:?}", out.light_field.shape());
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    pub use crate::image::io::load_sensor_image;
    pub use crate::{
        Aligner, CalibrationOutcome, Calibrator, CancelToken, CentroidList, ImageF32, LogStatus, PipelineParams, Progress,
        SensorImage,
    };
}

// --- Stage-level API (for tools & advanced users) --------------------------

pub mod stages {
    // Calibration stages.
    pub use crate::calibration::{
        CentroidExtractor, CentroidRefiner, CentroidSorter, Extraction, GridFit, GridFitter, LatticeLayout,
        PitchEstimate, PitchEstimator, StepPolicy,
    };

    // Alignment stages.
    pub use crate::alignment::{align_patch, pitch_eval, AlignedLightField, ResamplingEngine, Rotator};

    // Persistence and reports.
    pub use crate::diagnostics::{AlignmentReport, CalibrationReport, StageTiming, TimingBreakdown};
    pub use crate::persist::{save_light_field, CalibrationRecord, CalibrationStore};
}
