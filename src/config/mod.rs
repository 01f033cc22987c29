//! JSON run configurations for the `lfp_align` binary.
//!
//! Each subcommand reads one file: input paths, optional outputs and the
//! stage parameters. Missing parameter sections fall back to their defaults;
//! the parameters are validated on load.
pub mod align;
pub mod calibrate;

pub use align::AlignConfig;
pub use calibrate::CalibrateConfig;

use crate::error::{LfError, Result};
use crate::params::PipelineParams;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Optional artifacts shared by both subcommands.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Run report as pretty JSON.
    pub report_json: Option<PathBuf>,
    /// Directory for intermediate images (response map previews).
    pub debug_dir: Option<PathBuf>,
}

/// Configs that carry stage parameters.
pub trait HasParams {
    fn params(&self) -> &PipelineParams;
}

/// Read and parse a config, then validate its parameters.
pub fn load_config<T: DeserializeOwned + HasParams>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .map_err(|e| LfError::config(format!("failed to read config {}: {e}", path.display())))?;
    let config: T = serde_json::from_str(&contents)
        .map_err(|e| LfError::config(format!("failed to parse config {}: {e}", path.display())))?;
    config.params().validate()?;
    Ok(config)
}
