//! Parameter types configuring the calibration and alignment stages.
//!
//! Every struct deserializes with `#[serde(default)]`, so a JSON config only
//! needs the knobs it changes. [`PipelineParams::validate`] rejects values no
//! stage can work with before any image is touched.
use crate::error::{LfError, Result};
use serde::{Deserialize, Serialize};

/// Micro-image diameter estimation from a white image.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchParams {
    /// Fraction of each axis kept around the image centre.
    pub crop_ratio: f64,
    /// Skip estimation and use this diameter in pixels.
    pub diameter: Option<usize>,
    /// Replace the scale-space estimate by the measured neighbour spacing of
    /// the micro-image centres.
    pub refine_lattice: bool,
}

impl Default for PitchParams {
    fn default() -> Self {
        Self {
            crop_ratio: 1.0 / 3.0,
            diameter: None,
            refine_lattice: true,
        }
    }
}

/// LoG response and peak detection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractParams {
    /// Ratio between the micro-image quarter diameter and the LoG σ.
    pub sigma_divisor: f64,
    /// Maxima weaker than this fraction of the strongest one are dropped.
    pub min_response_ratio: f32,
}

impl Default for ExtractParams {
    fn default() -> Self {
        Self {
            sigma_divisor: 1.18,
            min_response_ratio: 0.05,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefineMethod {
    /// Mean coordinate of the pixels above the window median.
    Area,
    /// Intensity-weighted centroid, negative responses clipped.
    Peak,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineParams {
    pub method: RefineMethod,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            method: RefineMethod::Area,
        }
    }
}

/// Lattice classification and neighbour tracing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SortParams {
    /// Relative tolerance on the along-axis step length.
    pub along_tol: f64,
    /// Half opening angle of the search trapezoid in degrees.
    pub half_angle_deg: f64,
    /// Missing lattice steps bridged while counting border chains.
    pub max_jump: usize,
    /// Accepted relative mismatch between the implied pitches and the
    /// pattern aspect during side-count refinement.
    pub aspect_tol: f64,
}

impl Default for SortParams {
    fn default() -> Self {
        Self {
            along_tol: 0.4,
            half_angle_deg: 20.0,
            max_jump: 5,
            aspect_tol: 0.02,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Least squares over every lattice point.
    Full,
    /// Exact transform through the four lattice corners.
    Corners,
    /// Keep the measured centroids.
    Off,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualMode {
    /// Two residuals per point: `dy` and `dx`.
    ElementWise,
    /// One residual per point: the Euclidean distance.
    Euclidean,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FitParams {
    pub mode: FitMode,
    pub residual: ResidualMode,
    /// Optimize all nine matrix entries instead of fixing `h33 = 1`.
    pub full_matrix: bool,
    /// Weight of the penalty on fits narrower than the measured spread.
    /// Zero disables it.
    pub spread_penalty: f64,
    pub max_iterations: usize,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            mode: FitMode::Full,
            residual: ResidualMode::ElementWise,
            full_matrix: false,
            spread_penalty: 0.0,
            max_iterations: 100,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RotateParams {
    pub enabled: bool,
    /// Known rotation in radians; skips estimation.
    pub angle_rad: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Nearest,
    Linear,
    Cubic,
    Quintic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleMode {
    /// Rectangular lattices are copied patch by patch; hexagonal ones use
    /// the diagonal-average stretch.
    Standard,
    /// Hexagonal lattices blend the four neighbours at half-pitch positions.
    HexAlternate,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleParams {
    /// Requested micro-image size `Mn`; adjusted by `pitch_eval`.
    pub patch_size: usize,
    pub interpolation: Interpolation,
    pub mode: ResampleMode,
}

impl Default for ResampleParams {
    fn default() -> Self {
        Self {
            patch_size: 9,
            interpolation: Interpolation::Cubic,
            mode: ResampleMode::Standard,
        }
    }
}

/// All stage parameters of a calibration plus alignment job.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    pub pitch: PitchParams,
    pub extract: ExtractParams,
    pub refine: RefineParams,
    pub sort: SortParams,
    pub fit: FitParams,
    pub rotate: RotateParams,
    pub resample: ResampleParams,
}

impl PipelineParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.pitch.crop_ratio > 0.0 && self.pitch.crop_ratio <= 1.0) {
            return Err(LfError::config("pitch.crop_ratio must lie in (0, 1]"));
        }
        if matches!(self.pitch.diameter, Some(d) if d < 2) {
            return Err(LfError::config("pitch.diameter must be at least 2"));
        }
        if self.extract.sigma_divisor <= 0.0 {
            return Err(LfError::config("extract.sigma_divisor must be positive"));
        }
        if !(0.0..1.0).contains(&self.extract.min_response_ratio) {
            return Err(LfError::config("extract.min_response_ratio must lie in [0, 1)"));
        }
        if !(self.sort.along_tol > 0.0 && self.sort.along_tol < 1.0) {
            return Err(LfError::config("sort.along_tol must lie in (0, 1)"));
        }
        if !(self.sort.half_angle_deg > 0.0 && self.sort.half_angle_deg < 60.0) {
            return Err(LfError::config("sort.half_angle_deg must lie in (0, 60)"));
        }
        if self.sort.max_jump == 0 {
            return Err(LfError::config("sort.max_jump must be at least 1"));
        }
        if self.fit.spread_penalty < 0.0 {
            return Err(LfError::config("fit.spread_penalty must not be negative"));
        }
        if self.resample.patch_size == 0 {
            return Err(LfError::config("resample.patch_size must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{ "refine": { "method": "peak" }, "fit": { "residual": "euclidean" } }"#;
        let params: PipelineParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.refine.method, RefineMethod::Peak);
        assert_eq!(params.fit.residual, ResidualMode::Euclidean);
        assert_eq!(params.resample.patch_size, 9);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let mut params = PipelineParams::default();
        params.sort.along_tol = 1.5;
        assert!(matches!(params.validate(), Err(LfError::Config(_))));
        let mut params = PipelineParams::default();
        params.pitch.diameter = Some(1);
        assert!(params.validate().is_err());
    }
}
