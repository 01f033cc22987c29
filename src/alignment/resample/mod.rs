//! Resampling of a light-field capture into an aligned array of equally
//! sized micro-images.
//!
//! Every micro-image is re-centred on its sub-pixel centroid with the chosen
//! kernel, giving an `Mn × Mn` patch. Rectangular lattices place the patches
//! directly; hexagonal lattices interleave half-pitch samples and stretch each
//! row by `2/√3` so the output grid is square.
mod hex;
mod rect;

use super::interp::{sample, Border};
use crate::error::{LfError, Result};
use crate::image::{ImageF32, ImageView, ImageViewMut, SensorImage};
use crate::lattice::{CentroidList, Pattern};
use crate::params::{Interpolation, ResampleMode, ResampleParams};
use crate::progress::Progress;

use log::{debug, info};

/// One resampled micro-image in row-major order, `Mn × Mn` samples.
pub(crate) type Patch = Vec<f32>;

/// Aligned light field: `rows × cols` micro-images of `patch × patch`
/// pixels per channel.
#[derive(Clone, Debug)]
pub struct AlignedLightField {
    pub rows: usize,
    pub cols: usize,
    pub patch: usize,
    pub planes: Vec<ImageF32>,
}

impl AlignedLightField {
    pub fn new(rows: usize, cols: usize, patch: usize, channels: usize) -> Self {
        Self {
            rows,
            cols,
            patch,
            planes: vec![ImageF32::new(cols * patch, rows * patch); channels],
        }
    }

    /// `(height, width, channels)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.rows * self.patch, self.cols * self.patch, self.planes.len())
    }

    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    /// Copy of the micro-image at lattice position `(row, col)`.
    pub fn micro_image(&self, row: usize, col: usize, channel: usize) -> ImageF32 {
        let m = self.patch;
        self.planes[channel].crop(col * m, row * m, m, m)
    }

    pub(crate) fn write_patch(&mut self, row: usize, col: usize, channel: usize, patch: &[f32]) {
        let m = self.patch;
        let plane = &mut self.planes[channel];
        for (i, src) in patch.chunks_exact(m).enumerate() {
            plane.row_mut(row * m + i)[col * m..(col + 1) * m].copy_from_slice(src);
        }
    }
}

/// Largest odd integer not above `v` (0 for `v < 1`).
fn floor_odd(v: f64) -> usize {
    let f = v.max(0.0).floor() as usize;
    if f % 2 == 0 {
        f.saturating_sub(1)
    } else {
        f
    }
}

/// Effective micro-image size for a requested `Mn` and measured pitch.
///
/// Even sizes drop to the next odd value; sizes above the pitch are clamped
/// to the largest odd value below it; sizes under 3 are raised to 3 when the
/// pitch allows, otherwise the request cannot be met.
pub fn pitch_eval(requested: usize, mean_pitch: f64, progress: &Progress) -> Result<usize> {
    let mut mn = if requested % 2 == 0 {
        requested.saturating_sub(1)
    } else {
        requested
    };
    let max_odd = floor_odd(mean_pitch);
    if mn > max_odd {
        progress.status(&format!(
            "Micro image size {mn} exceeds the pitch {mean_pitch:.2}; using {max_odd}"
        ));
        mn = max_odd;
    }
    if mn < 3 {
        if max_odd < 3 {
            return Err(LfError::config(format!(
                "micro image pitch {mean_pitch:.2} is too small for a 3 pixel patch"
            )));
        }
        progress.status(&format!("Micro image size {mn} is below 3; using 3"));
        mn = 3;
    }
    Ok(mn)
}

/// Re-centre the micro-image around `center = [y, x]` into `mn × mn`
/// samples. Pixel `(k, k)` with `k = mn / 2` lands exactly on the centre;
/// reads beyond the sensor clamp to its edge.
pub fn align_patch(plane: &ImageF32, center: [f64; 2], mn: usize, kind: Interpolation) -> Patch {
    let k = (mn / 2) as f64;
    let (y0, x0) = (center[0] - k, center[1] - k);
    let mut out = Vec::with_capacity(mn * mn);
    for i in 0..mn {
        for j in 0..mn {
            out.push(sample(plane, x0 + j as f64, y0 + i as f64, kind, Border::Clamp));
        }
    }
    out
}

/// Aligned patches of lattice row `row`, indexed `[channel][col]`.
pub(crate) fn row_patches(planes: &[ImageF32], list: &CentroidList, row: usize, mn: usize, kind: Interpolation) -> Vec<Vec<Patch>> {
    planes
        .iter()
        .map(|plane| {
            list.row(row)
                .iter()
                .map(|m| align_patch(plane, m.yx(), mn, kind))
                .collect()
        })
        .collect()
}

/// Output column count of a stretched hexagonal row.
pub fn stretched_cols(cols: usize) -> usize {
    ((2.0 * cols as f64) / 3f64.sqrt()).round().max(1.0) as usize
}

pub struct ResamplingEngine {
    params: ResampleParams,
}

impl ResamplingEngine {
    pub fn new(params: ResampleParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ResampleParams {
        &self.params
    }

    /// Resample `image` on the lattice `list`. `None` when cancelled; a
    /// cancelled run leaves nothing behind.
    pub fn resample(&self, image: &SensorImage, list: &CentroidList, progress: &Progress) -> Result<Option<AlignedLightField>> {
        if list.is_empty() {
            return Err(LfError::degenerate("empty centroid list"));
        }
        let mean_pitch = list.geometry().mean_pitch();
        let mn = pitch_eval(self.params.patch_size, mean_pitch, progress)?;
        progress.begin("Resampling light field");
        let kind = self.params.interpolation;
        let out = match (list.pattern(), self.params.mode) {
            (Pattern::Rectangular, mode) => {
                if mode == ResampleMode::HexAlternate {
                    debug!("resample: alternate hexagonal mode ignored for a rectangular lattice");
                }
                rect::resample(image.planes(), list, mn, kind, progress)
            }
            (Pattern::Hexagonal, ResampleMode::Standard) => hex::resample(image.planes(), list, mn, kind, false, progress),
            (Pattern::Hexagonal, ResampleMode::HexAlternate) => hex::resample(image.planes(), list, mn, kind, true, progress),
        };
        if let Some(lf) = &out {
            let (h, w, c) = lf.shape();
            info!(
                "resample: {}x{} micro images of {}px -> {}x{}x{}",
                lf.rows, lf.cols, mn, h, w, c
            );
        }
        Ok(out)
    }
}
