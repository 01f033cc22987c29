//! Hexagonal resampling.
//!
//! Each lattice row yields its own `cols` patches plus `cols - 1` samples
//! at the half-pitch positions between them. Interleaved, they form a row of
//! `2·cols - 1` patches spaced half a pitch apart, which is stretched onto a
//! raster of `round(2·cols/√3)` columns shared by shifted and unshifted rows.
use super::{row_patches, stretched_cols, AlignedLightField, Patch};
use crate::image::ImageF32;
use crate::lattice::CentroidList;
use crate::params::Interpolation;
use crate::progress::Progress;

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Weighted sum of equally sized patches.
fn mix(parts: &[(&Patch, f32)]) -> Patch {
    let len = parts.first().map_or(0, |(p, _)| p.len());
    let mut out = vec![0.0f32; len];
    for (patch, w) in parts {
        for (o, v) in out.iter_mut().zip(patch.iter()) {
            *o += w * v;
        }
    }
    out
}

/// Half-pitch samples between `straight[c]` and `straight[c + 1]`.
///
/// The diagonal neighbours sit in rows `r ± 1` at column `c + 1` when row
/// `r` is shifted and at `c` otherwise. Without them (single-row lattices)
/// the two horizontal neighbours are averaged. In `alternate` mode all four
/// neighbours are blended with weights `1/(2(1+√3))` (vertical pair) and
/// `√3/(2(1+√3))` (horizontal pair); a missing vertical neighbour falls back
/// to the horizontal average.
fn half_samples(
    straight: &[Patch],
    up: Option<&[Patch]>,
    down: Option<&[Patch]>,
    shifted: bool,
    alternate: bool,
) -> Vec<Patch> {
    let w_v = (1.0 / (2.0 * (1.0 + SQRT_3))) as f32;
    let w_h = (SQRT_3 / (2.0 * (1.0 + SQRT_3))) as f32;
    (0..straight.len().saturating_sub(1))
        .map(|c| {
            let (left, right) = (&straight[c], &straight[c + 1]);
            let diag = c + usize::from(shifted);
            let up = up.map(|u| &u[diag]);
            let down = down.map(|d| &d[diag]);
            match (alternate, up, down) {
                (true, Some(u), Some(d)) => mix(&[(u, w_v), (d, w_v), (left, w_h), (right, w_h)]),
                (false, Some(u), Some(d)) => mix(&[(u, 0.5), (d, 0.5)]),
                (false, Some(v), None) | (false, None, Some(v)) => v.clone(),
                _ => mix(&[(left, 0.5), (right, 0.5)]),
            }
        })
        .collect()
}

/// Stretch the interleaved row (spacing half a pitch, first sample at
/// lattice column `start`) onto the shared output raster.
fn stretch_row(lf: &mut AlignedLightField, row: usize, channel: usize, seq: &[&Patch], cols: usize, start: f64) {
    let out_cols = lf.cols;
    if cols < 2 || seq.len() < 2 {
        for j in 0..out_cols {
            lf.write_patch(row, j, channel, seq[0]);
        }
        return;
    }
    let last = (seq.len() - 1) as f64;
    let span = cols as f64 - 1.5;
    for j in 0..out_cols {
        let x = if out_cols > 1 {
            0.5 + j as f64 * span / (out_cols - 1) as f64
        } else {
            0.5
        };
        let t = ((x - start) * 2.0).clamp(0.0, last);
        let i0 = (t.floor() as usize).min(seq.len() - 2);
        let f = (t - i0 as f64) as f32;
        let patch = mix(&[(seq[i0], 1.0 - f), (seq[i0 + 1], f)]);
        lf.write_patch(row, j, channel, &patch);
    }
}

pub(super) fn resample(
    planes: &[ImageF32],
    list: &CentroidList,
    mn: usize,
    kind: Interpolation,
    alternate: bool,
    progress: &Progress,
) -> Option<AlignedLightField> {
    let (rows, cols) = (list.rows(), list.cols());
    let geometry = *list.geometry();
    let mut lf = AlignedLightField::new(rows, stretched_cols(cols), mn, planes.len());

    let mut prev: Option<Vec<Vec<Patch>>> = None;
    let mut cur = row_patches(planes, list, 0, mn, kind);
    for r in 0..rows {
        if !progress.tick(r, rows) {
            return None;
        }
        let next = (r + 1 < rows).then(|| row_patches(planes, list, r + 1, mn, kind));
        let shifted = geometry.row_shifted(r);
        let start = if shifted { 0.5 } else { 0.0 };
        for (ch, straight) in cur.iter().enumerate() {
            let halves = half_samples(
                straight,
                prev.as_ref().map(|p| p[ch].as_slice()),
                next.as_ref().map(|n| n[ch].as_slice()),
                shifted,
                alternate,
            );
            let mut seq: Vec<&Patch> = Vec::with_capacity(2 * cols);
            for (c, s) in straight.iter().enumerate() {
                seq.push(s);
                if let Some(h) = halves.get(c) {
                    seq.push(h);
                }
            }
            stretch_row(&mut lf, r, ch, &seq, cols, start);
        }
        prev = Some(std::mem::replace(&mut cur, next.unwrap_or_default()));
    }
    Some(lf)
}
