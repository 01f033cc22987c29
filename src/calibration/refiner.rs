use crate::error::{LfError, Result};
use crate::image::ImageF32;
use crate::lattice::Centroid;
use crate::params::{RefineMethod, RefineParams};
use crate::progress::Progress;

use log::debug;

/// Sub-pixel refinement of integer peak positions on the response map.
pub struct CentroidRefiner {
    params: RefineParams,
}

/// Disc of `radius` pixels around a rounded centre, clipped to the image.
#[derive(Clone, Copy, Debug)]
struct Window {
    cy: usize,
    cx: usize,
    radius: usize,
    y0: usize,
    y1: usize,
    x0: usize,
    x1: usize,
}

impl Window {
    fn around(img: &ImageF32, c: Centroid, radius: usize) -> Option<Self> {
        if img.w == 0 || img.h == 0 {
            return None;
        }
        let cy = (c.y.round().max(0.0) as usize).min(img.h - 1);
        let cx = (c.x.round().max(0.0) as usize).min(img.w - 1);
        Some(Self {
            cy,
            cx,
            radius,
            y0: cy.saturating_sub(radius),
            y1: (cy + radius).min(img.h - 1),
            x0: cx.saturating_sub(radius),
            x1: (cx + radius).min(img.w - 1),
        })
    }

    fn values<'a>(&self, img: &'a ImageF32) -> impl Iterator<Item = (usize, usize, f32)> + 'a {
        let Window { cy, cx, radius, y0, y1, x0, x1 } = *self;
        let r2 = radius * radius;
        (y0..=y1).flat_map(move |y| {
            (x0..=x1)
                .filter(move |&x| y.abs_diff(cy).pow(2) + x.abs_diff(cx).pow(2) <= r2)
                .map(move |x| (y, x, img.get(x, y)))
        })
    }
}

/// Linear-interpolated percentile of `values` (sorted in place).
fn percentile(values: &mut [f32], q: f64) -> f32 {
    values.sort_by(f32::total_cmp);
    let pos = q * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let t = (pos - lo as f64) as f32;
    values[lo] + (values[hi] - values[lo]) * t
}

fn area_centroid(img: &ImageF32, win: Window) -> Option<Centroid> {
    let mut vals: Vec<f32> = win.values(img).map(|(_, _, v)| v).collect();
    if vals.is_empty() {
        return None;
    }
    let threshold = percentile(&mut vals, 0.5);
    let (mut sy, mut sx, mut n) = (0.0f64, 0.0f64, 0usize);
    for (y, x, v) in win.values(img) {
        if v > threshold {
            sy += y as f64;
            sx += x as f64;
            n += 1;
        }
    }
    (n > 0).then(|| Centroid::new(sy / n as f64, sx / n as f64))
}

fn peak_centroid(img: &ImageF32, win: Window) -> Option<Centroid> {
    let (mut sy, mut sx, mut mass) = (0.0f64, 0.0f64, 0.0f64);
    for (y, x, v) in win.values(img) {
        let w = v.max(0.0) as f64;
        sy += w * y as f64;
        sx += w * x as f64;
        mass += w;
    }
    (mass > 0.0).then(|| Centroid::new(sy / mass, sx / mass))
}

impl CentroidRefiner {
    pub fn new(params: RefineParams) -> Self {
        Self { params }
    }

    /// Refine every centroid inside a disc of radius `diameter / 2`.
    ///
    /// The output has the same length and order as `centroids`.
    pub fn refine(
        &self,
        response: &ImageF32,
        centroids: &[Centroid],
        diameter: usize,
        progress: &Progress,
    ) -> Result<Option<Vec<Centroid>>> {
        progress.begin("Refining centroids");
        let radius = (diameter / 2).max(1);
        let total = centroids.len();
        let mut refined = Vec::with_capacity(total);
        for (i, &c) in centroids.iter().enumerate() {
            if !progress.tick(i, total) {
                return Ok(None);
            }
            let win = Window::around(response, c, radius)
                .ok_or_else(|| LfError::degenerate("empty response image"))?;
            let found = match self.params.method {
                RefineMethod::Area => area_centroid(response, win),
                RefineMethod::Peak => peak_centroid(response, win),
            };
            let r = found.ok_or_else(|| {
                LfError::degenerate(format!(
                    "no pixel above threshold around ({:.1}, {:.1})",
                    c.y, c.x
                ))
            })?;
            refined.push(r);
        }
        debug!(
            "refiner: {} centroids, {:?} mode, radius {}",
            refined.len(),
            self.params.method,
            radius
        );
        Ok(Some(refined))
    }
}
