//! Projective fit of the ideal lattice to the indexed centroids.
//!
//! The ideal lattice (unit spacing scaled by the measured mean pitch) is
//! mapped to sensor coordinates by a homography. The full fit starts from a
//! DLT estimate and refines it with Levenberg-Marquardt in Hartley-normalized
//! frames; the corner fit solves the exact transform through the four
//! extreme lattice corners.
use super::lm::{self, numeric_jacobian, LmConfig, LmProblem};
use crate::error::{LfError, Result};
use crate::homography::{estimate_homography_dlt, normalize_points, normalize_scale, project};
use crate::lattice::{grid_gen, CentroidList, Mic, Pattern};
use crate::params::{FitMode, FitParams, ResidualMode};
use crate::progress::Progress;

use log::{debug, warn};
use nalgebra::Matrix3;

/// Fitted lattice: same indices as the input, positions projected from the
/// ideal grid.
#[derive(Clone, Debug)]
pub struct GridFit {
    pub grid: CentroidList,
    /// Maps ideal `[y, x]` (pixels) to sensor `[y, x]`.
    pub homography: Matrix3<f64>,
    /// Root mean squared distance between fitted and measured centres.
    pub rmse: f64,
    pub iterations: usize,
}

pub struct GridFitter {
    params: FitParams,
}

/// Smallest lattice worth fitting, per pattern.
fn min_dim(pattern: Pattern) -> usize {
    match pattern {
        Pattern::Rectangular => 4,
        Pattern::Hexagonal => 6,
    }
}

fn matrix_from(params: &[f64]) -> Matrix3<f64> {
    let h22 = params.get(8).copied().unwrap_or(1.0);
    Matrix3::new(
        params[0], params[1], params[2], params[3], params[4], params[5], params[6], params[7], h22,
    )
}

/// RMS distance of the points from their mean.
fn spread(points: impl Iterator<Item = [f64; 2]> + Clone) -> f64 {
    let n = points.clone().count().max(1) as f64;
    let (sa, sb) = points.clone().fold((0.0, 0.0), |(a, b), p| (a + p[0], b + p[1]));
    let (ma, mb) = (sa / n, sb / n);
    (points.map(|p| (p[0] - ma).powi(2) + (p[1] - mb).powi(2)).sum::<f64>() / n).sqrt()
}

/// Ideal-to-measured reprojection in normalized frames.
struct LatticeProblem<'a> {
    ideal: &'a [[f64; 2]],
    measured: &'a [[f64; 2]],
    residual: ResidualMode,
    spread_weight: f64,
    measured_spread: f64,
}

impl LatticeProblem<'_> {
    fn point_residuals<const N: usize>(&self, params: &[f64; N], out: &mut Vec<f64>) {
        let h = matrix_from(params);
        for (s, d) in self.ideal.iter().zip(self.measured) {
            let p = project(&h, *s).unwrap_or([f64::INFINITY, f64::INFINITY]);
            let (da, db) = (p[0] - d[0], p[1] - d[1]);
            match self.residual {
                ResidualMode::ElementWise => {
                    out.push(da);
                    out.push(db);
                }
                ResidualMode::Euclidean => out.push((da * da + db * db).sqrt()),
            }
        }
    }

    fn spread_residual<const N: usize>(&self, params: &[f64; N], out: &mut Vec<f64>) {
        let h = matrix_from(params);
        let fitted = spread(self.ideal.iter().map(|s| project(&h, *s).unwrap_or([0.0, 0.0])));
        out.push(self.spread_weight * (self.measured_spread - fitted).max(0.0));
    }
}

impl<const N: usize> LmProblem<N> for LatticeProblem<'_> {
    fn residuals(&self, params: &[f64; N], out: &mut Vec<f64>) {
        out.clear();
        self.point_residuals(params, out);
        if self.spread_weight > 0.0 {
            self.spread_residual(params, out);
        }
    }

    fn jacobian(&self, params: &[f64; N], out: &mut Vec<[f64; N]>) {
        out.clear();
        let h = matrix_from(params);
        for (s, d) in self.ideal.iter().zip(self.measured) {
            let (a, b) = (s[0], s[1]);
            let w = h[(2, 0)] * a + h[(2, 1)] * b + h[(2, 2)];
            let w = if w.abs() < 1e-12 { 1e-12 } else { w };
            let u = (h[(0, 0)] * a + h[(0, 1)] * b + h[(0, 2)]) / w;
            let v = (h[(1, 0)] * a + h[(1, 1)] * b + h[(1, 2)]) / w;
            let full = [
                [a / w, b / w, 1.0 / w, 0.0, 0.0, 0.0, -u * a / w, -u * b / w, -u / w],
                [0.0, 0.0, 0.0, a / w, b / w, 1.0 / w, -v * a / w, -v * b / w, -v / w],
            ];
            let mut du = [0.0; N];
            let mut dv = [0.0; N];
            du.copy_from_slice(&full[0][..N]);
            dv.copy_from_slice(&full[1][..N]);
            match self.residual {
                ResidualMode::ElementWise => {
                    out.push(du);
                    out.push(dv);
                }
                ResidualMode::Euclidean => {
                    let (da, db) = (u - d[0], v - d[1]);
                    let r = (da * da + db * db).sqrt();
                    let mut row = [0.0; N];
                    if r > 1e-12 {
                        for k in 0..N {
                            row[k] = (da * du[k] + db * dv[k]) / r;
                        }
                    }
                    out.push(row);
                }
            }
        }
        if self.spread_weight > 0.0 {
            let mut row = Vec::new();
            let penalty = |p: &[f64; N], r: &mut Vec<f64>| {
                r.clear();
                self.spread_residual(p, r);
            };
            numeric_jacobian(penalty, params, &mut row);
            out.extend(row);
        }
    }
}

impl GridFitter {
    pub fn new(params: FitParams) -> Self {
        Self { params }
    }

    /// Ideal lattice for `list`, in pixels: unit spacing times mean pitch.
    pub fn ideal_grid(list: &CentroidList) -> Vec<[f64; 2]> {
        let g = list.geometry();
        let scale = g.mean_pitch();
        grid_gen(list.rows(), list.cols(), g.pattern, g.hex_odd, false)
            .iter()
            .map(|m| [m.y * scale, m.x * scale])
            .collect()
    }

    fn check_size(list: &CentroidList) -> Result<()> {
        let min = min_dim(list.pattern());
        if list.rows() < min || list.cols() < min {
            return Err(LfError::degenerate(format!(
                "{}x{} {} lattice is too small to fit",
                list.rows(),
                list.cols(),
                list.pattern().as_str()
            )));
        }
        Ok(())
    }

    /// Fit according to the configured mode.
    pub fn fit(&self, list: &CentroidList, progress: &Progress) -> Result<Option<GridFit>> {
        match self.params.mode {
            FitMode::Full => self.full_fit(list, progress),
            FitMode::Corners => self.corner_fit(list).map(Some),
            FitMode::Off => Err(LfError::config("grid fitting is disabled")),
        }
    }

    /// Least-squares fit over every lattice point.
    pub fn full_fit(&self, list: &CentroidList, progress: &Progress) -> Result<Option<GridFit>> {
        Self::check_size(list)?;
        progress.begin("Fitting grid");
        let ideal = Self::ideal_grid(list);
        let measured = list.positions();
        let (t_src, ideal_n) = normalize_points(&ideal);
        let (t_dst, measured_n) = normalize_points(&measured);
        let initial = t_dst * estimate_homography_dlt(&ideal, &measured)? * invert(&t_src)?;
        let initial = normalize_scale(initial);

        let problem = LatticeProblem {
            ideal: &ideal_n,
            measured: &measured_n,
            residual: self.params.residual,
            spread_weight: self.params.spread_penalty,
            measured_spread: spread(measured_n.iter().copied()),
        };
        let config = LmConfig {
            max_iterations: self.params.max_iterations,
            ..LmConfig::default()
        };
        let max_it = config.max_iterations;
        let keep_going = |i: usize| progress.tick(i, max_it);
        let flat: Vec<f64> = initial.transpose().iter().copied().collect();

        let (h_norm, iterations) = if self.params.full_matrix {
            let mut p = [0.0; 9];
            p.copy_from_slice(&flat);
            let res = lm::optimize::<9, _>(&problem, p, &config, keep_going);
            if res.interrupted {
                return Ok(None);
            }
            (matrix_from(&res.params), res.iterations)
        } else {
            let mut p = [0.0; 8];
            p.copy_from_slice(&flat[..8]);
            let res = lm::optimize::<8, _>(&problem, p, &config, keep_going);
            if res.interrupted {
                return Ok(None);
            }
            (matrix_from(&res.params), res.iterations)
        };
        let homography = normalize_scale(invert(&t_dst)? * h_norm * t_src);
        let fit = self.finish(list, &ideal, homography, iterations)?;
        debug!(
            "fitter: {}x{} lattice, {} iterations, rmse {:.4} px",
            list.rows(),
            list.cols(),
            fit.iterations,
            fit.rmse
        );
        Ok(Some(fit))
    }

    /// Exact transform through the four extreme lattice corners.
    pub fn corner_fit(&self, list: &CentroidList) -> Result<GridFit> {
        Self::check_size(list)?;
        let ideal = Self::ideal_grid(list);
        let (r1, c1) = (list.rows() - 1, list.cols() - 1);
        let corners = [(0, 0), (0, c1), (r1, 0), (r1, c1)];
        let idx = |r: usize, c: usize| r * list.cols() + c;
        let src: Vec<[f64; 2]> = corners.iter().map(|&(r, c)| ideal[idx(r, c)]).collect();
        let dst: Vec<[f64; 2]> = corners.iter().map(|&(r, c)| list.get(r, c).yx()).collect();
        let homography = estimate_homography_dlt(&src, &dst)?;
        let fit = self.finish(list, &ideal, homography, 0)?;
        debug!("fitter: corner fit, rmse {:.4} px", fit.rmse);
        Ok(fit)
    }

    fn finish(&self, list: &CentroidList, ideal: &[[f64; 2]], homography: Matrix3<f64>, iterations: usize) -> Result<GridFit> {
        let mut sq = 0.0;
        let mut mics = Vec::with_capacity(list.len());
        for (m, s) in list.mics().iter().zip(ideal) {
            let p = project(&homography, *s)
                .ok_or_else(|| LfError::degenerate("fitted transform maps a lattice point to infinity"))?;
            sq += (p[0] - m.y).powi(2) + (p[1] - m.x).powi(2);
            mics.push(Mic {
                y: p[0],
                x: p[1],
                row: m.row,
                col: m.col,
            });
        }
        let rmse = (sq / list.len().max(1) as f64).sqrt();
        if rmse > 0.25 * list.geometry().mean_pitch() {
            warn!("fitter: rmse {:.3} px is large relative to the pitch", rmse);
        }
        let grid = CentroidList::new(mics, list.rows(), list.cols(), *list.geometry())?;
        Ok(GridFit {
            grid,
            homography,
            rmse,
            iterations,
        })
    }
}

fn invert(m: &Matrix3<f64>) -> Result<Matrix3<f64>> {
    m.try_inverse()
        .ok_or_else(|| LfError::degenerate("singular normalization transform"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::homography::apply_homography_points;
    use crate::progress::CancelToken;

    fn warped_list(rows: usize, cols: usize, pattern: Pattern, noise: f64) -> (CentroidList, Matrix3<f64>) {
        let h = Matrix3::new(1.01, 0.02, 150.0, -0.015, 0.995, 220.0, 2.0e-6, -1.0e-6, 1.0);
        let ideal: Vec<[f64; 2]> = grid_gen(rows, cols, pattern, true, false)
            .iter()
            .map(|m| [m.y * 12.0, m.x * 12.0])
            .collect();
        let mut pts = apply_homography_points(&h, &ideal).unwrap();
        for (i, p) in pts.iter_mut().enumerate() {
            // Deterministic zero-mean jitter.
            let s = ((i * 7919) % 13) as f64 / 6.0 - 1.0;
            let t = ((i * 104_729) % 11) as f64 / 5.0 - 1.0;
            p[0] += noise * s;
            p[1] += noise * t;
        }
        (CentroidList::from_positions(&pts, rows, cols, pattern).unwrap(), h)
    }

    #[test]
    fn full_fit_reproduces_a_noise_free_lattice() {
        let (list, _) = warped_list(12, 14, Pattern::Rectangular, 0.0);
        let token = CancelToken::new();
        let fit = GridFitter::new(FitParams::default())
            .fit(&list, &Progress::silent(&token))
            .unwrap()
            .unwrap();
        assert!(fit.rmse < 1e-3, "rmse {}", fit.rmse);
        assert_eq!(fit.grid.rows(), 12);
        assert_eq!(fit.grid.cols(), 14);
        assert_eq!(fit.grid.get(5, 7).row, 5);
    }

    #[test]
    fn fit_smooths_jitter_on_hex_lattices() {
        let (noisy, _) = warped_list(10, 10, Pattern::Hexagonal, 0.3);
        let (clean, _) = warped_list(10, 10, Pattern::Hexagonal, 0.0);
        let token = CancelToken::new();
        for residual in [ResidualMode::ElementWise, ResidualMode::Euclidean] {
            for full_matrix in [false, true] {
                let params = FitParams {
                    residual,
                    full_matrix,
                    ..FitParams::default()
                };
                let fit = GridFitter::new(params)
                    .full_fit(&noisy, &Progress::silent(&token))
                    .unwrap()
                    .unwrap();
                let err_fit = fit
                    .grid
                    .mics()
                    .iter()
                    .zip(clean.mics())
                    .map(|(a, b)| (a.y - b.y).hypot(a.x - b.x))
                    .fold(0.0f64, f64::max);
                assert!(err_fit < 0.3, "{residual:?} full={full_matrix}: {err_fit}");
                assert!(fit.rmse > 0.05 && fit.rmse < 0.6);
            }
        }
    }

    #[test]
    fn corner_fit_is_exact_for_projective_lattices() {
        let (list, _) = warped_list(8, 9, Pattern::Rectangular, 0.0);
        let fit = GridFitter::new(FitParams::default()).corner_fit(&list).unwrap();
        assert!(fit.rmse < 1e-6);
        assert_eq!(fit.iterations, 0);
    }

    #[test]
    fn small_lattices_are_degenerate() {
        let (rect, _) = warped_list(3, 10, Pattern::Rectangular, 0.0);
        let (hex, _) = warped_list(5, 9, Pattern::Hexagonal, 0.0);
        let fitter = GridFitter::new(FitParams::default());
        let token = CancelToken::new();
        assert!(fitter.fit(&rect, &Progress::silent(&token)).unwrap_err().is_degenerate());
        assert!(fitter.corner_fit(&hex).unwrap_err().is_degenerate());
    }

    #[test]
    fn spread_penalty_keeps_the_fit_valid() {
        let (list, _) = warped_list(9, 9, Pattern::Rectangular, 0.2);
        let token = CancelToken::new();
        let params = FitParams {
            spread_penalty: 10.0,
            ..FitParams::default()
        };
        let fit = GridFitter::new(params)
            .full_fit(&list, &Progress::silent(&token))
            .unwrap()
            .unwrap();
        assert!(fit.rmse < 0.5);
    }

    #[test]
    fn cancelled_fit_returns_none() {
        let (list, _) = warped_list(8, 8, Pattern::Rectangular, 0.0);
        let token = CancelToken::new();
        token.cancel();
        let out = GridFitter::new(FitParams::default())
            .full_fit(&list, &Progress::silent(&token))
            .unwrap();
        assert!(out.is_none());
    }
}
