use super::{row_patches, AlignedLightField};
use crate::image::ImageF32;
use crate::lattice::CentroidList;
use crate::params::Interpolation;
use crate::progress::Progress;

/// Place each aligned patch at `(row·Mn, col·Mn)`.
pub(super) fn resample(
    planes: &[ImageF32],
    list: &CentroidList,
    mn: usize,
    kind: Interpolation,
    progress: &Progress,
) -> Option<AlignedLightField> {
    let (rows, cols) = (list.rows(), list.cols());
    let mut lf = AlignedLightField::new(rows, cols, mn, planes.len());
    for r in 0..rows {
        if !progress.tick(r, rows) {
            return None;
        }
        for (ch, patches) in row_patches(planes, list, r, mn, kind).iter().enumerate() {
            for (c, patch) in patches.iter().enumerate() {
                lf.write_patch(r, c, ch, patch);
            }
        }
    }
    Some(lf)
}
