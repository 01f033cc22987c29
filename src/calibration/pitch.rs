//! Micro-image diameter estimation from a white image.
//!
//! Two stages:
//! - coarse: the central crop is made zero-mean and windowed, then a dyadic
//!   difference-of-Gaussians scale space is built. The periodic micro-image
//!   pattern produces the strongest band-pass response at the scale matching
//!   its pitch; that scale is converted to a diameter.
//! - lattice: micro-image centres are detected at the coarse scale around the
//!   image centre, refined to sub-pixel intensity centroids, and the median
//!   spacing between neighbours becomes the diameter.
use super::nms::scanline_nms;
use super::sorter::median_neighbor_distance;
use crate::filters::{convolve_separable, decimate, log_response, GaussianFilter};
use crate::image::{ImageF32, ImageView, ImageViewMut};
use crate::lattice::spatial::PointGrid;
use crate::params::PitchParams;
use crate::progress::Progress;

use log::debug;
use serde::Serialize;
use std::f64::consts::PI;

/// Ratio between the micro-image half diameter and the scale σ.
const FWHM_FACTOR: f64 = 1.18;
/// Scale-space entries per octave.
const OCTAVE: usize = 2;
/// Detection σ relative to the assumed diameter.
const DETECT_SIGMA: f64 = 0.3;
/// Assumed diameter in pixels of the downsampled detection plane.
const DETECT_DIAMETER: usize = 16;
/// The measured region spans at least this many assumed diameters per axis.
const REGION_DIAMETERS: usize = 8;
/// Accepted neighbour distances relative to the nearest-neighbour median.
const NEIGHBOUR_BAND: (f64, f64) = (0.75, 1.25);
/// Relative disagreement between seed and measurement that triggers a rerun.
const RESEED_TOLERANCE: f64 = 0.3;
const MAX_PASSES: usize = 3;
const CENTROID_ITERATIONS: usize = 3;

#[derive(Clone, Debug, Serialize)]
pub struct PitchEstimate {
    /// Estimated micro-image diameter `M` in pixels (0 when undetermined).
    pub diameter: usize,
    /// Diameter implied by the scale space alone.
    pub coarse_diameter: usize,
    /// Median centre spacing, when the lattice stage succeeded.
    pub spacing: Option<f64>,
    /// Fractional scale-space index of the selected maximum.
    pub scale_index: f64,
    /// Equivalent Gaussian σ of that index.
    pub sigma: f64,
    /// Per-entry response maxima, two entries per octave.
    pub maxima: Vec<f32>,
}

pub struct PitchEstimator {
    params: PitchParams,
}

enum Spacing {
    Measured(f64),
    Unmeasured,
    Interrupted,
}

impl PitchEstimator {
    pub fn new(params: PitchParams) -> Self {
        Self { params }
    }

    /// A degenerate image yields `diameter == 0`; `None` means interrupted.
    pub fn estimate(&self, white: &ImageF32, progress: &Progress) -> Option<PitchEstimate> {
        let mut crop = crop_center(white, self.params.crop_ratio);
        let mean = crop.mean();
        crop.data.iter_mut().for_each(|v| *v -= mean);
        apply_hann_window(&mut crop);
        let maxima = scale_space_maxima(&crop);
        if !progress.busy() {
            return None;
        }
        let Some(scale_index) = select_scale(&maxima) else {
            debug!("pitch: empty scale space for {}x{} crop", crop.w, crop.h);
            return Some(PitchEstimate {
                diameter: 0,
                coarse_diameter: 0,
                spacing: None,
                scale_index: 0.0,
                sigma: 0.0,
                maxima,
            });
        };
        let sigma = sigma_for_index(scale_index);
        let coarse = (4.0 * FWHM_FACTOR * sigma).round().max(0.0) as usize;
        debug!(
            "pitch: {} scale entries, index {:.2}, sigma {:.2}, coarse M = {}",
            maxima.len(),
            scale_index,
            sigma,
            coarse
        );

        let spacing = if self.params.refine_lattice && coarse >= 2 {
            self.measure_spacing(white, [crop.w, crop.h], coarse, progress)?
        } else {
            None
        };
        let diameter = spacing.map_or(coarse, |d| d.round() as usize);
        debug!("pitch: M = {diameter} (coarse {coarse}, spacing {spacing:?})");
        Some(PitchEstimate {
            diameter,
            coarse_diameter: coarse,
            spacing,
            scale_index,
            sigma,
            maxima,
        })
    }

    /// Spacing seeded by `coarse`. A seed far from the measurement is
    /// replaced and the lattice is measured again; a measurement far below
    /// its seed means the detection scale was too fine.
    fn measure_spacing(
        &self,
        white: &ImageF32,
        crop: [usize; 2],
        coarse: usize,
        progress: &Progress,
    ) -> Option<Option<f64>> {
        let mut seed = coarse as f64;
        for pass in 0..MAX_PASSES {
            let d = match lattice_spacing(white, crop, seed, progress) {
                Spacing::Interrupted => return None,
                Spacing::Unmeasured => break,
                Spacing::Measured(d) => d,
            };
            debug!("pitch: pass {pass}, seed {seed:.1}, spacing {d:.3}");
            if (d - seed).abs() <= RESEED_TOLERANCE * seed {
                return Some(Some(d));
            }
            seed = if d < seed { 1.5 * seed } else { d };
        }
        debug!("pitch: lattice spacing not confirmed, keeping coarse M = {coarse}");
        Some(None)
    }
}

/// Representative σ of entry `k`, the geometric mean of the two blurs whose
/// difference it records.
pub fn sigma_for_index(k: f64) -> f64 {
    2f64.powf((k + 0.5) / 2.0)
}

fn crop_center(img: &ImageF32, ratio: f64) -> ImageF32 {
    let cw = ((img.w as f64 * ratio).round() as usize).clamp(1, img.w.max(1));
    let ch = ((img.h as f64 * ratio).round() as usize).clamp(1, img.h.max(1));
    img.crop((img.w - cw.min(img.w)) / 2, (img.h - ch.min(img.h)) / 2, cw, ch)
}

fn hann(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| (0.5 - 0.5 * (2.0 * PI * i as f64 / (n - 1) as f64).cos()) as f32)
        .collect()
}

fn apply_hann_window(img: &mut ImageF32) {
    let wx = hann(img.w);
    let wy = hann(img.h);
    for (y, &fy) in wy.iter().enumerate() {
        for (v, &fx) in img.row_mut(y).iter_mut().zip(&wx) {
            *v *= fx * fy;
        }
    }
}

/// Maximum of `prev − next` over the plane.
fn max_negated_difference(prev: &ImageF32, next: &ImageF32) -> f32 {
    prev.data
        .iter()
        .zip(&next.data)
        .map(|(a, b)| a - b)
        .fold(f32::NEG_INFINITY, f32::max)
}

/// Two entries per octave: `σ=1 → √2` and `√2 → 2` relative to the octave
/// base, then decimation.
fn scale_space_maxima(img: &ImageF32) -> Vec<f32> {
    let g1 = GaussianFilter::new(1.0);
    let g2 = GaussianFilter::new(std::f32::consts::SQRT_2);
    let mut maxima = Vec::new();
    if img.is_empty() {
        return maxima;
    }
    let mut base = convolve_separable(img, &g1);
    while base.w >= 3 && base.h >= 3 {
        let first = convolve_separable(&base, &g1);
        maxima.push(max_negated_difference(&base, &first));
        let second = convolve_separable(&first, &g2);
        maxima.push(max_negated_difference(&first, &second));
        base = decimate(&second);
    }
    maxima
}

/// Offset in `[-0.5, 0.5]` of the parabola vertex through `k - 1, k, k + 1`.
fn vertex_offset(values: &[f64], k: usize) -> f64 {
    if k == 0 || k + 1 >= values.len() {
        return 0.0;
    }
    let (a, b, c) = (values[k - 1], values[k], values[k + 1]);
    let denom = a - 2.0 * b + c;
    if denom >= 0.0 {
        return 0.0;
    }
    (0.5 * (a - c) / denom).clamp(-0.5, 0.5)
}

/// Fractional index of the scale-space entry describing the lattice.
///
/// The global maximum wins unless an earlier local maximum less than one
/// octave below it carries a larger `value / scale` ratio.
fn select_scale(maxima: &[f32]) -> Option<f64> {
    let values: Vec<f64> = maxima.iter().map(|&v| v as f64).collect();
    let global = values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)?;
    let ratio = |i: usize| values[i] / (i as f64 + 1.0);
    let is_local_max =
        |k: usize| k > 0 && k + 1 < values.len() && values[k] >= values[k - 1] && values[k] > values[k + 1];
    let pick = (global.saturating_sub(OCTAVE)..global)
        .filter(|&k| is_local_max(k))
        .find(|&k| ratio(k) >= ratio(global))
        .unwrap_or(global);
    Some(pick as f64 + vertex_offset(&values, pick))
}

/// Mean of `s × s` blocks; a partial trailing block is dropped.
fn box_downsample(img: &ImageF32, s: usize) -> ImageF32 {
    if s <= 1 {
        return img.clone();
    }
    let norm = 1.0 / (s * s) as f32;
    ImageF32::from_fn(img.w / s, img.h / s, |bx, by| {
        let mut sum = 0.0;
        for y in by * s..(by + 1) * s {
            sum += img.row(y)[bx * s..(bx + 1) * s].iter().sum::<f32>();
        }
        sum * norm
    })
}

/// Intensity centroid `[y, x]` of `img − min` inside a disc of `radius`,
/// recentred a few times. A flat disc keeps the starting point.
fn disc_centroid(img: &ImageF32, start: [f64; 2], radius: f64) -> Option<[f64; 2]> {
    let mut c = start;
    for _ in 0..CENTROID_ITERATIONS {
        let y0 = (c[0] - radius).floor().max(0.0) as usize;
        let x0 = (c[1] - radius).floor().max(0.0) as usize;
        let y1 = ((c[0] + radius).ceil().max(0.0) as usize).min(img.h.checked_sub(1)?);
        let x1 = ((c[1] + radius).ceil().max(0.0) as usize).min(img.w.checked_sub(1)?);
        let inside = |x: usize, y: usize| (y as f64 - c[0]).powi(2) + (x as f64 - c[1]).powi(2) <= radius * radius;
        let mut floor = f32::INFINITY;
        for y in y0..=y1 {
            for x in x0..=x1 {
                if inside(x, y) {
                    floor = floor.min(img.get(x, y));
                }
            }
        }
        if !floor.is_finite() {
            return None;
        }
        let (mut sw, mut sy, mut sx) = (0.0f64, 0.0f64, 0.0f64);
        for y in y0..=y1 {
            for x in x0..=x1 {
                if inside(x, y) {
                    let w = (img.get(x, y) - floor) as f64;
                    sw += w;
                    sy += w * y as f64;
                    sx += w * x as f64;
                }
            }
        }
        if sw <= 1e-12 {
            return Some(c);
        }
        c = [sy / sw, sx / sw];
    }
    Some(c)
}

/// Median distance between neighbouring micro-image centres around the
/// image centre, assuming a diameter of `seed` pixels.
fn lattice_spacing(white: &ImageF32, crop: [usize; 2], seed: f64, progress: &Progress) -> Spacing {
    let side = (REGION_DIAMETERS as f64 * seed).ceil() as usize;
    let rw = crop[0].max(side).min(white.w);
    let rh = crop[1].max(side).min(white.h);
    let region = white.crop((white.w - rw) / 2, (white.h - rh) / 2, rw, rh);

    let s = (seed.round() as usize / DETECT_DIAMETER).max(1);
    let small = box_downsample(&region, s);
    let sigma = (DETECT_SIGMA * seed / s as f64).max(0.8);
    let len = ((6.0 * sigma).round() as usize).max(3) | 1;
    let response = log_response(&small, sigma as f32, len);
    let Some(peaks) = scanline_nms(&response, progress) else {
        return Spacing::Interrupted;
    };
    let strongest = peaks.iter().map(|&(x, y)| response.get(x, y)).fold(0.0f32, f32::max);
    let half = len / 2;
    let offset = (s as f64 - 1.0) / 2.0;
    let candidates: Vec<[f64; 2]> = peaks
        .iter()
        .filter(|&&(x, y)| {
            let v = response.get(x, y);
            v > 0.0
                && v >= 0.05 * strongest
                && x >= half
                && y >= half
                && x + half < small.w
                && y + half < small.h
        })
        .map(|&(x, y)| [(y * s) as f64 + offset, (x * s) as f64 + offset])
        .collect();
    if candidates.len() < 2 {
        return Spacing::Unmeasured;
    }
    let Some(nearest) = median_neighbor_distance(&candidates) else {
        return Spacing::Unmeasured;
    };
    if !progress.busy() {
        return Spacing::Interrupted;
    }

    let radius = 0.5 * nearest;
    let (h, w) = (region.h as f64, region.w as f64);
    let centres: Vec<[f64; 2]> = candidates
        .iter()
        .filter(|c| {
            c[0] > radius + 1.0 && c[1] > radius + 1.0 && c[0] < h - 2.0 - radius && c[1] < w - 2.0 - radius
        })
        .filter_map(|&c| disc_centroid(&region, c, radius))
        .collect();
    let grid = PointGrid::new(&centres, nearest);
    let (lo, hi) = (NEIGHBOUR_BAND.0 * nearest, NEIGHBOUR_BAND.1 * nearest);
    let mut distances = Vec::new();
    for (i, &c) in centres.iter().enumerate() {
        grid.for_each_within(c, hi, |j, d2| {
            let d = d2.sqrt();
            if j > i && d >= lo {
                distances.push(d);
            }
        });
    }
    debug!(
        "pitch: {} centres in {}x{} region (downsampled {s}x), nearest {:.2}, {} neighbour pairs",
        centres.len(),
        rw,
        rh,
        nearest,
        distances.len()
    );
    if distances.is_empty() {
        return Spacing::Unmeasured;
    }
    let mid = distances.len() / 2;
    distances.select_nth_unstable_by(mid, f64::total_cmp);
    Spacing::Measured(distances[mid])
}
