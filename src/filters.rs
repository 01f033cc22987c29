//! Separable Gaussian smoothing, the Laplacian-of-Gaussian response and
//! plain decimation.
//!
//! Borders replicate the nearest edge pixel. With the `parallel` feature the
//! row passes run on rayon's pool.
use crate::image::{ImageF32, ImageView, ImageViewMut};

/// Trait implemented by separable 1D filters.
pub trait SeparableFilter {
    /// Return the 1D taps (in left-to-right order). The kernel is assumed to
    /// be symmetric around its centre, but the implementation does not rely
    /// on it.
    fn taps(&self) -> &[f32];
}

/// Normalized, odd-length sampled Gaussian.
#[derive(Clone, Debug)]
pub struct GaussianFilter {
    sigma: f32,
    taps: Vec<f32>,
}

impl GaussianFilter {
    /// Kernel covering ±3σ.
    pub fn new(sigma: f32) -> Self {
        let radius = (3.0 * sigma).ceil().max(1.0) as usize;
        Self::with_length(sigma, 2 * radius + 1)
    }

    /// Kernel with an explicit tap count; even lengths are bumped to odd.
    pub fn with_length(sigma: f32, len: usize) -> Self {
        let len = len.max(1) | 1;
        let radius = (len / 2) as isize;
        let sigma = sigma.max(1e-3);
        let denom = 2.0 * sigma * sigma;
        let mut taps: Vec<f32> = (-radius..=radius)
            .map(|i| (-((i * i) as f32) / denom).exp())
            .collect();
        let sum: f32 = taps.iter().sum();
        for t in &mut taps {
            *t /= sum;
        }
        Self { sigma, taps }
    }

    pub fn sigma(&self) -> f32 {
        self.sigma
    }
}

impl SeparableFilter for GaussianFilter {
    #[inline]
    fn taps(&self) -> &[f32] {
        &self.taps
    }
}

#[inline]
fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

fn filter_row(src: &[f32], dst: &mut [f32], taps: &[f32]) {
    let radius = (taps.len() / 2) as isize;
    let n = src.len();
    for (x, out) in dst.iter_mut().enumerate() {
        let mut acc = 0.0f32;
        for (k, &t) in taps.iter().enumerate() {
            let xi = clamp_index(x as isize + k as isize - radius, n);
            acc += t * src[xi];
        }
        *out = acc;
    }
}

fn filter_column_into(src: &ImageF32, y: usize, dst: &mut [f32], taps: &[f32]) {
    let radius = (taps.len() / 2) as isize;
    dst.fill(0.0);
    for (k, &t) in taps.iter().enumerate() {
        let yi = clamp_index(y as isize + k as isize - radius, src.h);
        for (out, &v) in dst.iter_mut().zip(src.row(yi)) {
            *out += t * v;
        }
    }
}

/// Horizontal then vertical pass of `filter` over `src`.
pub fn convolve_separable(src: &ImageF32, filter: &dyn SeparableFilter) -> ImageF32 {
    if src.is_empty() {
        return src.clone();
    }
    let taps = filter.taps();
    let w = src.w;
    let mut tmp = ImageF32::new(src.w, src.h);
    let mut out = ImageF32::new(src.w, src.h);

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        tmp.data
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(y, row)| filter_row(src.row(y), row, taps));
        out.data
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(y, row)| filter_column_into(&tmp, y, row, taps));
    }
    #[cfg(not(feature = "parallel"))]
    {
        for y in 0..src.h {
            filter_row(src.row(y), tmp.row_mut(y), taps);
        }
        for (y, row) in out.data.chunks_mut(w).enumerate() {
            filter_column_into(&tmp, y, row, taps);
        }
    }
    out
}

/// Negated 4-neighbour Laplacian: `4·c − (up + down + left + right)`.
pub fn negated_laplacian(src: &ImageF32) -> ImageF32 {
    let mut out = ImageF32::new(src.w, src.h);
    for y in 0..src.h {
        let yi = y as isize;
        for x in 0..src.w {
            let xi = x as isize;
            let c = src.get(x, y);
            let sum = src.get_clamped(xi - 1, yi)
                + src.get_clamped(xi + 1, yi)
                + src.get_clamped(xi, yi - 1)
                + src.get_clamped(xi, yi + 1);
            out.set(x, y, 4.0 * c - sum);
        }
    }
    out
}

/// "Mexican hat" response: bright blobs of scale `sigma` become positive
/// peaks.
///
/// The Gaussian of `len` taps is applied separably and the Laplacian stencil
/// afterwards. Convolution is associative, so this equals a single pass with
/// the `(len + 2)²` LoG kernel away from the borders.
pub fn log_response(src: &ImageF32, sigma: f32, len: usize) -> ImageF32 {
    let blurred = convolve_separable(src, &GaussianFilter::with_length(sigma, len));
    negated_laplacian(&blurred)
}

/// Keep every other pixel in both directions.
pub fn decimate(src: &ImageF32) -> ImageF32 {
    let nw = src.w.div_ceil(2);
    let nh = src.h.div_ceil(2);
    ImageF32::from_fn(nw, nh, |x, y| src.get(2 * x, 2 * y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_kernel(sigma: f32, len: usize) -> (Vec<f32>, usize) {
        let g = GaussianFilter::with_length(sigma, len);
        let t = g.taps();
        let n = t.len();
        let size = n + 2;
        let mut gauss = vec![0.0f32; size * size];
        for i in 0..n {
            for j in 0..n {
                gauss[(i + 1) * size + (j + 1)] = t[i] * t[j];
            }
        }
        let at = |y: isize, x: isize| -> f32 {
            if y < 0 || x < 0 || y >= size as isize || x >= size as isize {
                0.0
            } else {
                gauss[y as usize * size + x as usize]
            }
        };
        let mut k = vec![0.0f32; size * size];
        for y in 0..size as isize {
            for x in 0..size as isize {
                let s = at(y - 1, x) + at(y + 1, x) + at(y, x - 1) + at(y, x + 1);
                k[y as usize * size + x as usize] = 4.0 * at(y, x) - s;
            }
        }
        (k, size)
    }

    #[test]
    fn gaussian_taps_are_normalized_and_odd() {
        let g = GaussianFilter::with_length(1.5, 8);
        assert_eq!(g.taps().len(), 9);
        let sum: f32 = g.taps().iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert_eq!(GaussianFilter::new(1.0).taps().len(), 7);
    }

    #[test]
    fn separable_log_matches_direct_kernel_in_interior() {
        let img = ImageF32::from_fn(40, 36, |x, y| {
            let dx = x as f32 - 17.3;
            let dy = y as f32 - 19.1;
            (-(dx * dx + dy * dy) / 30.0).exp() + 0.01 * ((x * 7 + y * 13) % 5) as f32
        });
        let sigma = 2.0;
        let len = 11;
        let fast = log_response(&img, sigma, len);
        let (k, size) = log_kernel(sigma, len);
        let r = size / 2;
        for y in r + 1..img.h - r - 1 {
            for x in r + 1..img.w - r - 1 {
                let mut acc = 0.0f32;
                for ky in 0..size {
                    for kx in 0..size {
                        acc += k[ky * size + kx] * img.get(x + kx - r, y + ky - r);
                    }
                }
                assert!((acc - fast.get(x, y)).abs() < 1e-4, "({x},{y})");
            }
        }
    }

    #[test]
    fn blob_centre_is_a_positive_log_peak() {
        let img = ImageF32::from_fn(31, 31, |x, y| {
            let dx = x as f32 - 15.0;
            let dy = y as f32 - 15.0;
            (-(dx * dx + dy * dy) / 18.0).exp()
        });
        let resp = log_response(&img, 2.5, 15);
        let centre = resp.get(15, 15);
        assert!(centre > 0.0);
        assert!(centre >= resp.get(14, 15) && centre >= resp.get(15, 16));
    }

    #[test]
    fn decimate_rounds_up() {
        let img = ImageF32::from_fn(5, 3, |x, y| (x + 10 * y) as f32);
        let d = decimate(&img);
        assert_eq!((d.w, d.h), (3, 2));
        assert_eq!(d.get(2, 1), 24.0);
    }
}
