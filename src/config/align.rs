use super::{HasParams, OutputConfig};
use crate::params::PipelineParams;
use crate::persist::CalibrationStore;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Clone, Debug, Deserialize)]
pub struct AlignConfig {
    /// Light-field capture to resample.
    pub light_field: PathBuf,
    /// White image the calibration is keyed by; calibrated on demand when no
    /// metadata is stored yet.
    pub white_image: PathBuf,
    #[serde(default)]
    pub calibration: Option<PathBuf>,
    /// Lattice `[rows, cols]` the stored metadata must match to be reused.
    #[serde(default)]
    pub expected_dims: Option<[usize; 2]>,
    /// 16-bit output image of the aligned light field.
    pub output_image: PathBuf,
    #[serde(default)]
    pub params: PipelineParams,
    #[serde(default)]
    pub output: OutputConfig,
}

impl AlignConfig {
    pub fn store(&self) -> CalibrationStore {
        match &self.calibration {
            Some(path) => CalibrationStore::at(path.clone()),
            None => CalibrationStore::for_white_image(&self.white_image),
        }
    }

    pub fn expected_lattice(&self) -> Option<(usize, usize)> {
        self.expected_dims.map(|[rows, cols]| (rows, cols))
    }
}

impl HasParams for AlignConfig {
    fn params(&self) -> &PipelineParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Interpolation, ResampleMode};

    #[test]
    fn resample_section_parses() {
        let json = r#"{
            "light_field": "lf.png",
            "white_image": "white.png",
            "calibration": "cal/white.lfcal.json",
            "expected_dims": [40, 52],
            "output_image": "out/aligned.png",
            "params": { "resample": { "patch_size": 7, "interpolation": "quintic", "mode": "hex_alternate" } }
        }"#;
        let cfg: AlignConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.params.resample.patch_size, 7);
        assert_eq!(cfg.params.resample.interpolation, Interpolation::Quintic);
        assert_eq!(cfg.params.resample.mode, ResampleMode::HexAlternate);
        assert!(cfg.store().path().ends_with("cal/white.lfcal.json"));
        assert_eq!(cfg.expected_lattice(), Some((40, 52)));
    }
}
