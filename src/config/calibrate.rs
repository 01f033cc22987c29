use super::{HasParams, OutputConfig};
use crate::params::PipelineParams;
use crate::persist::CalibrationStore;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Clone, Debug, Deserialize)]
pub struct CalibrateConfig {
    /// White image of the micro-lens array.
    pub white_image: PathBuf,
    /// Metadata path; defaults to `<white stem>.lfcal.json` beside the image.
    #[serde(default)]
    pub calibration: Option<PathBuf>,
    /// Recompute even when stored metadata exists.
    #[serde(default)]
    pub force: bool,
    /// Lattice `[rows, cols]` the stored metadata must match to be reused.
    #[serde(default)]
    pub expected_dims: Option<[usize; 2]>,
    #[serde(default)]
    pub params: PipelineParams,
    #[serde(default)]
    pub output: OutputConfig,
}

impl CalibrateConfig {
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

impl HasParams for CalibrateConfig {
    fn params(&self) -> &PipelineParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RefineMethod;
    use std::path::Path;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg: CalibrateConfig = serde_json::from_str(r#"{ "white_image": "data/white.tif" }"#).unwrap();
        assert!(!cfg.force);
        assert_eq!(cfg.params.refine.method, RefineMethod::Area);
        assert_eq!(cfg.store().path(), Path::new("data/white.lfcal.json"));        assert!(cfg.expected_lattice().is_none());
    }

    #[test]
    fn expected_dims_key_the_stored_lattice() {
        let cfg: CalibrateConfig =
            serde_json::from_str(r#"{ "white_image": "w.png", "expected_dims": [9, 11], "force": true }"#).unwrap();
        assert_eq!(cfg.expected_lattice(), Some((9, 11)));
        assert!(cfg.force);
    }
}
