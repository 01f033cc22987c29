//! End-to-end calibration and alignment jobs.
//!
//! `Calibrator` runs pitch estimation, extraction, refinement, sorting and
//! the optional grid fit on a white image. `Aligner` optionally removes the
//! sensor rotation and resamples a capture on the calibrated lattice. Both
//! return `Ok(None)` when the job is cancelled.
use crate::alignment::{ResamplingEngine, Rotator};
use crate::alignment::AlignedLightField;
use crate::calibration::{CentroidExtractor, CentroidRefiner, CentroidSorter, GridFitter, PitchEstimator};
use crate::diagnostics::{AlignmentReport, CalibrationReport, FitSummary, LatticeSummary, TimingBreakdown};
use crate::error::{LfError, Result};
use crate::image::io::load_sensor_image;
use crate::image::{ImageF32, SensorImage};
use crate::lattice::CentroidList;
use crate::params::{FitMode, PipelineParams};
use crate::persist::CalibrationStore;
use crate::progress::Progress;

use log::{info, warn};
use std::path::Path;

/// Calibrated lattice of a white image.
#[derive(Clone, Debug)]
pub struct CalibrationOutcome {
    pub centroids: CentroidList,
    pub report: CalibrationReport,
    /// LoG response the centroids were detected on (absent when cached).
    pub response: Option<ImageF32>,
}

pub struct Calibrator {
    params: PipelineParams,
}

impl Calibrator {
    pub fn new(params: PipelineParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    pub fn calibrate(&self, white: &SensorImage, progress: &Progress) -> Result<Option<CalibrationOutcome>> {
        let mut timings = TimingBreakdown::default();
        let mut report = CalibrationReport::default();
        let gray = white.luminance();

        let diameter = match self.params.pitch.diameter {
            Some(d) => {
                report.diameter_configured = true;
                d
            }
            None => {
                progress.begin("Estimating micro image pitch");
                let estimator = PitchEstimator::new(self.params.pitch.clone());
                let Some(estimate) = timings.measure("pitch", || estimator.estimate(&gray, progress)) else {
                    return Ok(None);
                };
                report.coarse_diameter = Some(estimate.coarse_diameter);
                estimate.diameter
            }
        };
        if diameter < 2 {
            return Err(LfError::degenerate(format!(
                "micro image diameter {diameter} could not be determined"
            )));
        }
        report.diameter = diameter;
        info!("calibrate: micro image diameter {diameter}px");

        let extractor = CentroidExtractor::new(self.params.extract.clone());
        let Some(extraction) = timings.measure("extract", || extractor.extract(&gray, diameter, progress))? else {
            return Ok(None);
        };
        report.candidates = extraction.centroids.len();

        let refiner = CentroidRefiner::new(self.params.refine.clone());
        let Some(refined) =
            timings.measure("refine", || refiner.refine(&extraction.response, &extraction.centroids, diameter, progress))?
        else {
            return Ok(None);
        };
        report.refined = refined.len();

        let sorter = CentroidSorter::new(self.params.sort.clone());
        let Some(sorted) = timings.measure("sort", || sorter.sort(&refined, progress))? else {
            return Ok(None);
        };

        let centroids = match self.params.fit.mode {
            FitMode::Off => sorted,
            mode => {
                let fitter = GridFitter::new(self.params.fit.clone());
                match timings.measure("fit", || fitter.fit(&sorted, progress)) {
                    Ok(Some(fit)) => {
                        let h = fit.homography;
                        report.fit = Some(FitSummary {
                            mode,
                            residual: self.params.fit.residual,
                            rmse_px: fit.rmse,
                            iterations: fit.iterations,
                            homography: [
                                [h[(0, 0)], h[(0, 1)], h[(0, 2)]],
                                [h[(1, 0)], h[(1, 1)], h[(1, 2)]],
                                [h[(2, 0)], h[(2, 1)], h[(2, 2)]],
                            ],
                        });
                        fit.grid
                    }
                    Ok(None) => return Ok(None),
                    Err(err) if err.is_degenerate() => {
                        warn!("calibrate: grid fit skipped: {err}");
                        report.fit_fallback = Some(err.to_string());
                        sorted
                    }
                    Err(err) => return Err(err),
                }
            }
        };
        report.lattice = Some(LatticeSummary::of(&centroids));
        report.timings = timings;
        info!(
            "calibrate: {}x{} {} lattice from {} centroids",
            centroids.rows(),
            centroids.cols(),
            centroids.pattern().as_str(),
            report.refined
        );
        Ok(Some(CalibrationOutcome {
            centroids,
            report,
            response: Some(extraction.response),
        }))
    }

    /// Load stored metadata for `white_path` or calibrate and store it.
    ///
    /// A stored lattice whose `(rows, cols)` differ from `expected` is stale
    /// and triggers recalibration.
    pub fn calibrate_cached(
        &self,
        white_path: &Path,
        store: &CalibrationStore,
        force: bool,
        expected: Option<(usize, usize)>,
        progress: &Progress,
    ) -> Result<Option<CalibrationOutcome>> {
        if !force {
            if let Some(centroids) = store.load(expected)? {
                info!("calibrate: using stored calibration {}", store.path().display());
                let report = CalibrationReport {
                    lattice: Some(LatticeSummary::of(&centroids)),
                    cached: true,
                    ..CalibrationReport::default()
                };
                return Ok(Some(CalibrationOutcome {
                    centroids,
                    report,
                    response: None,
                }));
            }
        }
        let white = load_sensor_image(white_path)?;
        let Some(outcome) = self.calibrate(&white, progress)? else {
            return Ok(None);
        };
        if let Some((rows, cols)) = expected {
            if (outcome.centroids.rows(), outcome.centroids.cols()) != (rows, cols) {
                warn!(
                    "calibrate: measured lattice {}x{} differs from the expected {rows}x{cols}",
                    outcome.centroids.rows(),
                    outcome.centroids.cols()
                );
            }
        }
        store.save(&outcome.centroids)?;
        Ok(Some(outcome))
    }
}

#[derive(Clone, Debug)]
pub struct AlignmentOutcome {
    pub light_field: AlignedLightField,
    /// Lattice the capture was resampled on (de-rotated when rotation ran).
    pub centroids: CentroidList,
    pub report: AlignmentReport,
}

pub struct Aligner {
    params: PipelineParams,
}

impl Aligner {
    pub fn new(params: PipelineParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn align(&self, image: &SensorImage, list: &CentroidList, progress: &Progress) -> Result<Option<AlignmentOutcome>> {
        let mut timings = TimingBreakdown::default();
        let rotate = self.params.rotate.enabled || self.params.rotate.angle_rad.is_some();
        let rotated;
        let (image, list, rotation) = if rotate {
            let rotator = Rotator::new(self.params.rotate.clone());
            let Some((img, centroids, angle)) = timings.measure("rotate", || rotator.apply(image, list, progress))? else {
                return Ok(None);
            };
            rotated = (img, centroids);
            (&rotated.0, &rotated.1, Some(angle))
        } else {
            (image, list, None)
        };

        let engine = ResamplingEngine::new(self.params.resample.clone());
        let Some(light_field) = timings.measure("resample", || engine.resample(image, list, progress))? else {
            return Ok(None);
        };
        let (h, w, c) = light_field.shape();
        let report = AlignmentReport {
            lattice: LatticeSummary::of(list),
            rotation_deg: rotation.map(f64::to_degrees),
            requested_patch: self.params.resample.patch_size,
            patch: light_field.patch,
            interpolation: self.params.resample.interpolation,
            mode: self.params.resample.mode,
            shape: [h, w, c],
            timings,
        };
        Ok(Some(AlignmentOutcome {
            light_field,
            centroids: list.clone(),
            report,
        }))
    }
}
