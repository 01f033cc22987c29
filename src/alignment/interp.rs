//! Separable interpolation kernels and 2-D sampling on `ImageF32`.
use crate::image::ImageF32;
use crate::params::Interpolation;

/// Keys cubic convolution parameter.
const KEYS_A: f64 = -0.5;
const MAX_TAPS: usize = 6;

/// Weights for the samples at `base + first .. base + first + len`.
#[derive(Clone, Copy, Debug)]
pub struct Taps {
    pub first: isize,
    pub len: usize,
    pub weights: [f32; MAX_TAPS],
}

/// What a read outside the plane returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Border {
    /// Nearest edge pixel.
    Clamp,
    /// Zero.
    Zero,
}

fn keys(d: f64) -> f64 {
    let d = d.abs();
    if d <= 1.0 {
        (KEYS_A + 2.0) * d * d * d - (KEYS_A + 3.0) * d * d + 1.0
    } else if d < 2.0 {
        KEYS_A * (d * d * d - 5.0 * d * d + 8.0 * d - 4.0)
    } else {
        0.0
    }
}

impl Interpolation {
    /// Kernel support in samples.
    pub fn support(self) -> usize {
        match self {
            Self::Nearest => 1,
            Self::Linear => 2,
            Self::Cubic => 4,
            Self::Quintic => 6,
        }
    }

    /// Taps for a fractional offset `t ∈ [0, 1)` past the base sample.
    pub fn taps(self, t: f64) -> Taps {
        let mut weights = [0.0f32; MAX_TAPS];
        match self {
            Self::Nearest => {
                weights[0] = 1.0;
                Taps {
                    first: if t < 0.5 { 0 } else { 1 },
                    len: 1,
                    weights,
                }
            }
            Self::Linear => {
                weights[0] = (1.0 - t) as f32;
                weights[1] = t as f32;
                Taps {
                    first: 0,
                    len: 2,
                    weights,
                }
            }
            Self::Cubic => {
                for (k, w) in weights.iter_mut().take(4).enumerate() {
                    *w = keys(t - (k as f64 - 1.0)) as f32;
                }
                Taps {
                    first: -1,
                    len: 4,
                    weights,
                }
            }
            Self::Quintic => {
                // Lagrange basis on the nodes -2..=3.
                for (k, w) in weights.iter_mut().enumerate() {
                    let xk = k as f64 - 2.0;
                    let mut l = 1.0;
                    for j in 0..MAX_TAPS {
                        let xj = j as f64 - 2.0;
                        if j != k {
                            l *= (t - xj) / (xk - xj);
                        }
                    }
                    *w = l as f32;
                }
                Taps {
                    first: -2,
                    len: 6,
                    weights,
                }
            }
        }
    }
}

#[inline]
fn read(img: &ImageF32, x: isize, y: isize, border: Border) -> f32 {
    match border {
        Border::Clamp => img.get_clamped(x, y),
        Border::Zero => {
            if x < 0 || y < 0 || x >= img.w as isize || y >= img.h as isize {
                0.0
            } else {
                img.get(x as usize, y as usize)
            }
        }
    }
}

/// Interpolated value at the sub-pixel position `(x, y)`.
pub fn sample(img: &ImageF32, x: f64, y: f64, kind: Interpolation, border: Border) -> f32 {
    if img.w == 0 || img.h == 0 || !x.is_finite() || !y.is_finite() {
        return 0.0;
    }
    let (xf, yf) = (x.floor(), y.floor());
    let tx = kind.taps(x - xf);
    let ty = kind.taps(y - yf);
    let (bx, by) = (xf as isize + tx.first, yf as isize + ty.first);
    let mut acc = 0.0f32;
    for (j, wy) in ty.weights[..ty.len].iter().enumerate() {
        let yy = by + j as isize;
        let mut row = 0.0f32;
        for (i, wx) in tx.weights[..tx.len].iter().enumerate() {
            row += wx * read(img, bx + i as isize, yy, border);
        }
        acc += wy * row;
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    const KINDS: [Interpolation; 4] = [
        Interpolation::Nearest,
        Interpolation::Linear,
        Interpolation::Cubic,
        Interpolation::Quintic,
    ];

    #[test]
    fn weights_partition_unity() {
        for kind in KINDS {
            for t in [0.0, 0.1, 0.37, 0.5, 0.9] {
                let taps = kind.taps(t);
                let sum: f32 = taps.weights[..taps.len].iter().sum();
                assert!((sum - 1.0).abs() < 1e-5, "{kind:?} t={t}");
                assert_eq!(taps.len, kind.support());
            }
        }
    }

    #[test]
    fn integer_positions_are_exact() {
        let img = ImageF32::from_fn(9, 7, |x, y| ((x * 31 + y * 17) % 11) as f32);
        for kind in KINDS {
            for (x, y) in [(0usize, 0usize), (4, 3), (8, 6)] {
                let v = sample(&img, x as f64, y as f64, kind, Border::Clamp);
                assert!((v - img.get(x, y)).abs() < 1e-5, "{kind:?}");
            }
        }
    }

    #[test]
    fn higher_orders_reproduce_polynomials() {
        let img = ImageF32::from_fn(16, 4, |x, _| {
            let x = x as f32;
            0.01 * x * x * x - 0.2 * x * x + x
        });
        let f = |x: f64| 0.01 * x * x * x - 0.2 * x * x + x;
        let linear = |x: f64| {
            let v = sample(&img, x, 1.0, Interpolation::Linear, Border::Clamp);
            (v as f64 - f(x)).abs()
        };
        let quintic = (sample(&img, 7.3, 1.0, Interpolation::Quintic, Border::Clamp) as f64 - f(7.3)).abs();
        assert!(quintic < 1e-3, "quintic {quintic}");
        assert!(linear(7.5) > quintic);
        let cubic = (sample(&img, 7.5, 1.0, Interpolation::Cubic, Border::Clamp) as f64 - f(7.5)).abs();
        assert!(cubic < linear(7.5));
    }

    #[test]
    fn zero_border_fades_outside() {
        let img = ImageF32::from_fn(4, 4, |_, _| 1.0);
        assert_eq!(sample(&img, -3.0, 1.0, Interpolation::Cubic, Border::Zero), 0.0);
        assert_eq!(sample(&img, -3.0, 1.0, Interpolation::Cubic, Border::Clamp), 1.0);
        let edge = sample(&img, -0.5, 1.0, Interpolation::Linear, Border::Zero);
        assert!((edge - 0.5).abs() < 1e-6);
    }
}
