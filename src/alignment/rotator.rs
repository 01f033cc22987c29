//! Global sensor rotation: estimated from the central lattice row and
//! column, removed from both the image and the centroid list.
use super::interp::{sample, Border};
use crate::error::{LfError, Result};
use crate::image::{ImageF32, ImageViewMut, SensorImage};
use crate::lattice::CentroidList;
use crate::params::{Interpolation, RotateParams};
use crate::progress::Progress;

use log::{debug, info};

pub struct Rotator {
    params: RotateParams,
}

/// Least-squares slope of `b` over `a`.
fn regression_slope(points: impl Iterator<Item = (f64, f64)> + Clone) -> Option<f64> {
    let n = points.clone().count();
    if n < 2 {
        return None;
    }
    let (sa, sb) = points.clone().fold((0.0, 0.0), |(x, y), (a, b)| (x + a, y + b));
    let (ma, mb) = (sa / n as f64, sb / n as f64);
    let (mut cov, mut var) = (0.0, 0.0);
    for (a, b) in points {
        cov += (a - ma) * (b - mb);
        var += (a - ma) * (a - ma);
    }
    (var > 1e-12).then(|| cov / var)
}

/// `(y, x)` of the rotation centre of an `h × w` image.
fn image_center(dims: (usize, usize)) -> [f64; 2] {
    [(dims.0 as f64 - 1.0) / 2.0, (dims.1 as f64 - 1.0) / 2.0]
}

impl Rotator {
    pub fn new(params: RotateParams) -> Self {
        Self { params }
    }

    /// Lattice rotation in radians; positive when rows descend to the right.
    pub fn estimate_angle(list: &CentroidList) -> Result<f64> {
        let row = list.row(list.rows() / 2);
        let row_slope = regression_slope(row.iter().map(|m| (m.x, m.y)))
            .ok_or_else(|| LfError::degenerate("central lattice row is too short to estimate rotation"))?;
        let col = list.cols() / 2;
        let column = (0..list.rows()).step_by(2).map(|r| list.get(r, col));
        let col_slope = regression_slope(column.map(|m| (m.y, m.x)))
            .ok_or_else(|| LfError::degenerate("central lattice column is too short to estimate rotation"))?;
        let angle = 0.5 * (row_slope.atan() - col_slope.atan());
        debug!(
            "rotator: row slope {:.5}, column slope {:.5}, angle {:.4} deg",
            row_slope,
            col_slope,
            angle.to_degrees()
        );
        Ok(angle)
    }

    /// Rotate `plane` by `-angle` about its centre (bicubic, zero outside).
    pub fn rotate_plane(plane: &ImageF32, angle: f64, progress: &Progress, done: usize, total: usize) -> Option<ImageF32> {
        let (s, c) = angle.sin_cos();
        let [cy, cx] = image_center((plane.h, plane.w));
        let mut out = ImageF32::new(plane.w, plane.h);
        for y in 0..plane.h {
            if !progress.tick(done + y, total) {
                return None;
            }
            let dy_out = y as f64 - cy;
            for (x, px) in out.row_mut(y).iter_mut().enumerate() {
                let dx_out = x as f64 - cx;
                let dx = dx_out * c - dy_out * s;
                let dy = dx_out * s + dy_out * c;
                *px = sample(plane, cx + dx, cy + dy, Interpolation::Cubic, Border::Zero);
            }
        }
        Some(out)
    }

    /// Rotate every plane; `None` when cancelled.
    pub fn rotate_image(image: &SensorImage, angle: f64, progress: &Progress) -> Result<Option<SensorImage>> {
        progress.begin("Rotating image");
        let total = image.height() * image.channels();
        let mut planes = Vec::with_capacity(image.channels());
        for (i, plane) in image.planes().iter().enumerate() {
            let Some(rotated) = Self::rotate_plane(plane, angle, progress, i * plane.h, total) else {
                return Ok(None);
            };
            planes.push(rotated);
        }
        SensorImage::from_planes(planes).map(Some)
    }

    /// Rotate centroids about the centre of an image of `dims = (h, w)` so
    /// they follow the de-rotated image.
    pub fn rotate_centroids(list: &CentroidList, angle: f64, dims: (usize, usize)) -> Result<CentroidList> {
        let (s, c) = angle.sin_cos();
        let [cy, cx] = image_center(dims);
        let positions: Vec<[f64; 2]> = list
            .mics()
            .iter()
            .map(|m| {
                let (dy, dx) = (m.y - cy, m.x - cx);
                [cy - dx * s + dy * c, cx + dx * c + dy * s]
            })
            .collect();
        list.with_positions(&positions)
    }

    /// Estimate (unless preset) and remove the rotation from `image` and
    /// `list`. Returns the angle used.
    pub fn apply(
        &self,
        image: &SensorImage,
        list: &CentroidList,
        progress: &Progress,
    ) -> Result<Option<(SensorImage, CentroidList, f64)>> {
        let angle = match self.params.angle_rad {
            Some(a) => a,
            None => Self::estimate_angle(list)?,
        };
        info!("rotator: removing {:.4} deg", angle.to_degrees());
        let Some(rotated) = Self::rotate_image(image, angle, progress)? else {
            return Ok(None);
        };
        let centroids = Self::rotate_centroids(list, angle, image.dims())?;
        Ok(Some((rotated, centroids, angle)))
    }
}
