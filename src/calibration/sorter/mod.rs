//! Lattice classification and dense `(row, col)` indexing of centroids.
//!
//! Steps:
//! - bucket grid over the centroids for neighbour queries,
//! - bounding corners from the extremes of `y ± x`,
//! - pitch from the median nearest-neighbour distance, refined by matching
//!   the bounding box side counts against the pattern aspect,
//! - pattern from the lower neighbour of the most central centroid,
//! - lattice dimensions from neighbour chains walked along each side,
//! - row-by-row tracing from the upper-left corner, resolving each step as
//!   [`StepPolicy::Single`], [`StepPolicy::Averaged`] or
//!   [`StepPolicy::Extrapolated`].
mod trace;

pub use trace::{Step, StepPolicy};

use self::trace::{add, scale, sub, Tracer};
use crate::error::{LfError, Result};
use crate::lattice::spatial::PointGrid;
use crate::lattice::{Centroid, CentroidList, MlaGeometry, Pattern, HEX_ROW_FACTOR};
use crate::params::SortParams;
use crate::progress::Progress;

use log::{debug, warn};
use serde::Serialize;

const MIN_CENTROIDS: usize = 4;
/// Upper bound on the points sampled for the nearest-neighbour median.
const NN_SAMPLES: usize = 4096;
const SIDE_COUNT_ITERATIONS: usize = 8;

/// Indices (into the centroid slice) of the four bounding corners.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Corners {
    pub upper_left: usize,
    pub upper_right: usize,
    pub lower_left: usize,
    pub lower_right: usize,
}

/// Everything the sorter learns before indexing.
#[derive(Clone, Debug, Serialize)]
pub struct LatticeLayout {
    pub pattern: Pattern,
    /// `[vertical, horizontal]` pitch in pixels.
    pub pitch: [f64; 2],
    pub rows: usize,
    pub cols: usize,
    pub hex_odd: bool,
    pub corners: Corners,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct PolicyCounts {
    pub single: usize,
    pub averaged: usize,
    pub extrapolated: usize,
}

impl PolicyCounts {
    fn record(&mut self, step: &Step) {
        match step.policy {
            StepPolicy::Single => self.single += 1,
            StepPolicy::Averaged => self.averaged += 1,
            StepPolicy::Extrapolated => self.extrapolated += 1,
        }
    }
}

pub struct CentroidSorter {
    params: SortParams,
}

fn bounding_corners(points: &[[f64; 2]]) -> Corners {
    let arg = |key: &dyn Fn(&[f64; 2]) -> f64| {
        points
            .iter()
            .enumerate()
            .max_by(|a, b| key(a.1).total_cmp(&key(b.1)))
            .map_or(0, |(i, _)| i)
    };
    Corners {
        upper_left: arg(&|p: &[f64; 2]| -(p[0] + p[1])),
        lower_right: arg(&|p: &[f64; 2]| p[0] + p[1]),
        upper_right: arg(&|p: &[f64; 2]| p[1] - p[0]),
        lower_left: arg(&|p: &[f64; 2]| p[0] - p[1]),
    }
}

fn nearest_expanding(grid: &PointGrid, center: [f64; 2], radius: f64, exclude: Option<usize>) -> Option<(usize, f64)> {
    let mut r = radius;
    for _ in 0..8 {
        if let Some(hit) = grid.nearest(center, r, exclude) {
            return Some(hit);
        }
        r *= 2.0;
    }
    None
}

/// Median nearest-neighbour distance over an evenly strided sample.
pub(crate) fn median_neighbor_distance(points: &[[f64; 2]]) -> Option<f64> {
    let (mut a0, mut a1, mut b0, mut b1) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
    for p in points {
        a0 = a0.min(p[0]);
        a1 = a1.max(p[0]);
        b0 = b0.min(p[1]);
        b1 = b1.max(p[1]);
    }
    let n = points.len() as f64;
    let area = (a1 - a0) * (b1 - b0);
    let cell = if area > 0.0 {
        (area / n).sqrt()
    } else {
        (a1 - a0).max(b1 - b0) / n
    };
    if !(cell > 0.0) {
        return None;
    }
    let grid = PointGrid::new(points, cell);
    let stride = points.len() / NN_SAMPLES + 1;
    let mut dists: Vec<f64> = (0..points.len())
        .step_by(stride)
        .filter_map(|i| nearest_expanding(&grid, points[i], cell, Some(i)).map(|(_, d)| d))
        .filter(|&d| d > 0.0)
        .collect();
    if dists.is_empty() {
        return None;
    }
    let mid = dists.len() / 2;
    dists.select_nth_unstable_by(mid, f64::total_cmp);
    Some(dists[mid])
}

impl CentroidSorter {
    pub fn new(params: SortParams) -> Self {
        Self { params }
    }

    /// Classify the lattice and measure its dimensions without indexing.
    pub fn analyze(&self, centroids: &[Centroid]) -> Result<LatticeLayout> {
        if centroids.len() < MIN_CENTROIDS {
            return Err(LfError::degenerate(format!(
                "need at least {MIN_CENTROIDS} centroids to sort, got {}",
                centroids.len()
            )));
        }
        let points: Vec<[f64; 2]> = centroids.iter().map(Centroid::yx).collect();
        let nn = median_neighbor_distance(&points)
            .ok_or_else(|| LfError::degenerate("zero lattice pitch"))?;
        let grid = PointGrid::new(&points, nn);
        let corners = bounding_corners(&points);
        let pattern = classify_pattern(&points, &grid, nn, &corners)?;
        let pitch = self.refine_pitch(&points, &corners, nn, pattern);
        let tracer = Tracer::new(&grid, &self.params);

        let hex_odd = match pattern {
            Pattern::Rectangular => false,
            Pattern::Hexagonal => {
                match tracer.diagonal_sign(points[corners.upper_left], pitch, true) {
                    Some(s) => s > 0.0,
                    None => {
                        warn!("sorter: no diagonal neighbour below the upper-left corner, assuming odd rows shifted");
                        true
                    }
                }
            }
        };
        let (rows, cols) = mla_dims(&tracer, &points, &corners, pattern, pitch);
        debug!(
            "sorter: {} centroids, pattern {}, pitch [{:.3}, {:.3}], {}x{}, hex_odd {}",
            points.len(),
            pattern.as_str(),
            pitch[0],
            pitch[1],
            rows,
            cols,
            hex_odd
        );
        Ok(LatticeLayout {
            pattern,
            pitch,
            rows,
            cols,
            hex_odd,
            corners,
        })
    }

    /// Assign a dense `(row, col)` index to every lattice position.
    ///
    /// Positions without a detection are filled by extrapolation; duplicate
    /// detections are averaged. Polls cancellation once per row.
    pub fn sort(&self, centroids: &[Centroid], progress: &Progress) -> Result<Option<CentroidList>> {
        progress.begin("Sorting centroids");
        let layout = self.analyze(centroids)?;
        let points: Vec<[f64; 2]> = centroids.iter().map(Centroid::yx).collect();
        let grid = PointGrid::new(&points, layout.pitch[1]);
        let tracer = Tracer::new(&grid, &self.params);
        let geometry = MlaGeometry {
            pattern: layout.pattern,
            pitch: layout.pitch,
            hex_odd: layout.hex_odd,
        };
        let (rows, cols) = (layout.rows, layout.cols);

        let mut right = [0.0, layout.pitch[1]];
        let mut vertical = [layout.pitch[0], 0.0];
        let mut row_start = points[layout.corners.upper_left];
        let mut positions = Vec::with_capacity(rows * cols);
        let mut counts = PolicyCounts::default();

        for r in 0..rows {
            if !progress.tick(r, rows) {
                return Ok(None);
            }
            if r > 0 {
                // Offset of this row's first cell relative to the previous one.
                let lateral = match (layout.pattern, geometry.row_shifted(r - 1)) {
                    (Pattern::Rectangular, _) => [0.0, 0.0],
                    (Pattern::Hexagonal, true) => scale(right, -0.5),
                    (Pattern::Hexagonal, false) => scale(right, 0.5),
                };
                let step = tracer.step(row_start, add(vertical, lateral));
                counts.record(&step);
                if step.is_measured() {
                    let measured = sub(sub(step.position, row_start), lateral);
                    vertical = scale(add(vertical, measured), 0.5);
                }
                row_start = step.position;
            }
            positions.push(row_start);
            let mut cur = row_start;
            let mut row_right = right;
            for _ in 1..cols {
                let step = tracer.step(cur, row_right);
                counts.record(&step);
                if step.is_measured() {
                    row_right = scale(add(row_right, sub(step.position, cur)), 0.5);
                }
                cur = step.position;
                positions.push(cur);
            }
            if cols > 1 {
                right = row_right;
            }
        }
        debug!(
            "sorter: indexed {}x{} ({} single, {} averaged, {} extrapolated)",
            rows, cols, counts.single, counts.averaged, counts.extrapolated
        );
        if counts.extrapolated > 0 {
            warn!(
                "sorter: {} lattice positions had no detection and were extrapolated",
                counts.extrapolated
            );
        }
        let list = CentroidList::from_positions(&positions, rows, cols, layout.pattern)?;
        if list.geometry().pitch[1] <= 0.0 {
            return Err(LfError::degenerate("zero lattice pitch after indexing"));
        }
        Ok(Some(list))
    }

    /// Side-count refinement of the nearest-neighbour pitch.
    ///
    /// An integer column count is assumed for the bounding-box width; the
    /// implied row count and vertical pitch must match the pattern aspect
    /// within `aspect_tol`, otherwise the column count is nudged.
    fn refine_pitch(&self, points: &[[f64; 2]], corners: &Corners, nn: f64, pattern: Pattern) -> [f64; 2] {
        let f = pattern.row_factor();
        let fallback = [nn * f, nn];
        let p = |i: usize| points[i];
        let width = 0.5
            * ((p(corners.upper_right)[1] - p(corners.upper_left)[1])
                + (p(corners.lower_right)[1] - p(corners.lower_left)[1]));
        let height = 0.5
            * ((p(corners.lower_left)[0] - p(corners.upper_left)[0])
                + (p(corners.lower_right)[0] - p(corners.upper_right)[0]));
        if width < nn || height < nn * f * 0.5 {
            return fallback;
        }
        let mut cols = (width / nn).round().max(1.0) as usize + 1;
        for _ in 0..SIDE_COUNT_ITERATIONS {
            let ph = width / (cols - 1) as f64;
            let rows = (height / (ph * f)).round().max(1.0) as usize + 1;
            let pv = height / (rows - 1) as f64;
            let ratio = pv / (ph * f);
            if (ratio - 1.0).abs() <= self.params.aspect_tol {
                if (ph / nn - 1.0).abs() < 0.25 {
                    return [pv, ph];
                }
                break;
            }
            cols = if ratio > 1.0 { (cols - 1).max(2) } else { cols + 1 };
        }
        fallback
    }
}

/// Compare the lower neighbour of the most central centroid with the two
/// lattice row spacings.
fn classify_pattern(points: &[[f64; 2]], grid: &PointGrid, nn: f64, corners: &Corners) -> Result<Pattern> {
    let c4 = [
        points[corners.upper_left],
        points[corners.upper_right],
        points[corners.lower_left],
        points[corners.lower_right],
    ];
    let center = [
        c4.iter().map(|p| p[0]).sum::<f64>() / 4.0,
        c4.iter().map(|p| p[1]).sum::<f64>() / 4.0,
    ];
    let (ci, _) = nearest_expanding(grid, center, nn, None)
        .ok_or_else(|| LfError::degenerate("no centroid near the lattice centre"))?;
    let c = points[ci];
    for sign in [1.0, -1.0] {
        let mut best: Option<(f64, f64)> = None;
        grid.for_each_within(c, 1.6 * nn, |i, d2| {
            let dy = (points[i][0] - c[0]) * sign;
            let dx = points[i][1] - c[1];
            if dy >= 0.5 * nn && dy <= 1.3 * nn && dx.abs() <= 0.75 * nn && best.map_or(true, |(b, _)| d2 < b) {
                best = Some((d2, dy));
            }
        });
        if let Some((_, dy)) = best {
            let rect = (dy - nn).abs();
            let hex = (dy - nn * HEX_ROW_FACTOR).abs();
            return Ok(if rect < hex {
                Pattern::Rectangular
            } else {
                Pattern::Hexagonal
            });
        }
    }
    Err(LfError::degenerate("no neighbour above or below the central centroid"))
}

/// Lattice rows and columns as the longest neighbour chains walked from the
/// four bounding corners.
fn mla_dims(tracer: &Tracer, points: &[[f64; 2]], corners: &Corners, pattern: Pattern, pitch: [f64; 2]) -> (usize, usize) {
    let (pv, ph) = (pitch[0], pitch[1]);
    let horizontal = [
        (corners.upper_left, 1.0),
        (corners.lower_left, 1.0),
        (corners.upper_right, -1.0),
        (corners.lower_right, -1.0),
    ];
    let cols = horizontal
        .iter()
        .map(|&(i, sx)| tracer.chain_length(points[i], [0.0, sx * ph], false))
        .max()
        .unwrap_or(1);
    let vertical = [
        (corners.upper_left, true),
        (corners.upper_right, true),
        (corners.lower_left, false),
        (corners.lower_right, false),
    ];
    let rows = vertical
        .iter()
        .map(|&(i, down)| {
            let sy = if down { 1.0 } else { -1.0 };
            match pattern {
                Pattern::Rectangular => tracer.chain_length(points[i], [sy * pv, 0.0], false),
                Pattern::Hexagonal => {
                    let sx = tracer.diagonal_sign(points[i], pitch, down).unwrap_or(1.0);
                    tracer.chain_length(points[i], [sy * pv, sx * 0.5 * ph], true)
                }
            }
        })
        .max()
        .unwrap_or(1);
    (rows, cols)
}
