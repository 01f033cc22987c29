//! On-disk calibration metadata and aligned light-field output.
//!
//! Calibration is stored next to the white image as `<stem>.lfcal.json`:
//!
//! ```json
//! { "pattern": "hex", "pitch_mean": [12.1, 14.0], "mic_list": [[y, x, row, col], ...] }
//! ```
//!
//! Writes go to a sibling temporary file that is renamed into place, so an
//! aborted run never leaves a truncated file behind.
use crate::alignment::AlignedLightField;
use crate::error::{LfError, Result};
use crate::image::io::{ensure_parent_dir, save_planes_u16};
use crate::image::ImageF32;
use crate::lattice::{derive_hex_odd, CentroidList, Mic, MlaGeometry, Pattern};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Serialized form of a calibrated lattice.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub pattern: Pattern,
    pub pitch_mean: [f64; 2],
    pub mic_list: Vec<[f64; 4]>,
}

impl CalibrationRecord {
    pub fn from_list(list: &CentroidList) -> Self {
        Self {
            pattern: list.pattern(),
            pitch_mean: list.geometry().pitch,
            mic_list: list
                .mics()
                .iter()
                .map(|m| [m.y, m.x, m.row as f64, m.col as f64])
                .collect(),
        }
    }

    /// Rebuild the lattice; dimensions come from the largest indices and the
    /// row parity is re-derived from the positions.
    pub fn into_list(self) -> Result<CentroidList> {
        let mut mics = Vec::with_capacity(self.mic_list.len());
        for e in &self.mic_list {
            if e[2] < 0.0 || e[3] < 0.0 || e[2].fract() != 0.0 || e[3].fract() != 0.0 {
                return Err(LfError::degenerate(format!("invalid lattice index ({}, {})", e[2], e[3])));
            }
            mics.push(Mic {
                y: e[0],
                x: e[1],
                row: e[2] as usize,
                col: e[3] as usize,
            });
        }
        let rows = mics.iter().map(|m| m.row + 1).max().unwrap_or(0);
        let cols = mics.iter().map(|m| m.col + 1).max().unwrap_or(0);
        mics.sort_by_key(|m| (m.row, m.col));
        let hex_odd = if self.pattern == Pattern::Hexagonal && mics.len() == rows * cols {
            let positions: Vec<[f64; 2]> = mics.iter().map(Mic::yx).collect();
            derive_hex_odd(&positions, rows, cols)
        } else {
            false
        };
        let geometry = MlaGeometry {
            pattern: self.pattern,
            pitch: self.pitch_mean,
            hex_odd,
        };
        CentroidList::new(mics, rows, cols, geometry)
    }
}

/// Temporary sibling of `path` that keeps its extension, so encoders that
/// pick the format from the name still work.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".partial-{name}"))
}

fn commit(tmp: &Path, path: &Path) -> Result<()> {
    if let Err(e) = fs::rename(tmp, path) {
        let _ = fs::remove_file(tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Calibration metadata file keyed by the white image path.
#[derive(Clone, Debug)]
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    pub fn for_white_image(white: &Path) -> Self {
        Self {
            path: white.with_extension("lfcal.json"),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn save(&self, list: &CentroidList) -> Result<()> {
        ensure_parent_dir(&self.path)?;
        let json = serde_json::to_string(&CalibrationRecord::from_list(list))?;
        let tmp = temp_sibling(&self.path);
        fs::write(&tmp, json)?;
        commit(&tmp, &self.path)?;
        debug!("persist: wrote {} centroids to {}", list.len(), self.path.display());
        Ok(())
    }

    /// Parse the stored lattice, reporting corruption as
    /// [`LfError::Persistence`].
    pub fn read(&self) -> Result<CentroidList> {
        let bad = |reason: String| LfError::Persistence {
            path: self.path.clone(),
            reason,
        };
        let text = fs::read_to_string(&self.path)?;
        let record: CalibrationRecord = serde_json::from_str(&text).map_err(|e| bad(e.to_string()))?;
        record.into_list().map_err(|e| bad(e.to_string()))
    }

    /// Stored lattice, or `None` when the image has to be (re)calibrated:
    /// the file is missing, corrupt (it is deleted) or its lattice does not
    /// match `expected = (rows, cols)`.
    pub fn load(&self, expected: Option<(usize, usize)>) -> Result<Option<CentroidList>> {
        let list = match self.read() {
            Ok(list) => list,
            Err(LfError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                debug!("persist: no calibration at {}", self.path.display());
                return Ok(None);
            }
            Err(err @ LfError::Persistence { .. }) => {
                warn!("persist: {err}; removing it");
                self.remove()?;
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        if let Some((rows, cols)) = expected {
            if (list.rows(), list.cols()) != (rows, cols) {
                info!(
                    "persist: stored lattice {}x{} does not match {}x{}; recalibrating",
                    list.rows(),
                    list.cols(),
                    rows,
                    cols
                );
                return Ok(None);
            }
        }
        Ok(Some(list))
    }

    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Save the aligned light field as a 16-bit image, scaled so the brightest
/// sample maps to 65535.
pub fn save_light_field(lf: &AlignedLightField, path: &Path) -> Result<()> {
    let max = lf.planes.iter().map(ImageF32::max_value).fold(0.0f32, f32::max);
    let scale = if max > 0.0 { 1.0 / max } else { 0.0 };
    let planes: Vec<ImageF32> = lf
        .planes
        .iter()
        .map(|p| ImageF32 {
            w: p.w,
            h: p.h,
            stride: p.stride,
            data: p.data.iter().map(|v| v * scale).collect(),
        })
        .collect();
    let tmp = temp_sibling(path);
    save_planes_u16(&planes, &tmp)?;
    commit(&tmp, path)
}
