//! Levenberg-Marquardt over a fixed number of parameters.
//!
//! Normal equations `(JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀr` are accumulated row by
//! row, so problems with many residuals never materialize `J`.

#[derive(Clone, Debug)]
pub(crate) struct LmConfig {
    pub max_iterations: usize,
    pub initial_lambda: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
    /// Stop once the relative cost decrease falls below this value.
    pub cost_tolerance: f64,
    /// Stop once every parameter step is below this value.
    pub step_tolerance: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
            cost_tolerance: 1e-12,
            step_tolerance: 1e-12,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct LmResult<const N: usize> {
    pub params: [f64; N],
    /// Sum of squared residuals at `params`.
    pub cost: f64,
    pub iterations: usize,
    pub converged: bool,
    pub interrupted: bool,
}

/// Least-squares problem in `N` parameters.
pub(crate) trait LmProblem<const N: usize> {
    /// Residuals at `params`, written into `out` (cleared first).
    fn residuals(&self, params: &[f64; N], out: &mut Vec<f64>);

    /// Jacobian rows matching [`LmProblem::residuals`]. Central differences
    /// unless overridden.
    fn jacobian(&self, params: &[f64; N], out: &mut Vec<[f64; N]>) {
        numeric_jacobian(|p, r| self.residuals(p, r), params, out);
    }
}

/// Central-difference Jacobian of `f` at `params`.
pub(crate) fn numeric_jacobian<const N: usize>(
    f: impl Fn(&[f64; N], &mut Vec<f64>),
    params: &[f64; N],
    out: &mut Vec<[f64; N]>,
) {
    let mut base = Vec::new();
    f(params, &mut base);
    out.clear();
    out.resize(base.len(), [0.0; N]);
    let (mut plus, mut minus) = (Vec::new(), Vec::new());
    for k in 0..N {
        let h = 1e-7 * params[k].abs().max(1.0);
        let mut p = *params;
        p[k] += h;
        f(&p, &mut plus);
        p[k] = params[k] - h;
        f(&p, &mut minus);
        for (row, (a, b)) in out.iter_mut().zip(plus.iter().zip(&minus)) {
            row[k] = (a - b) / (2.0 * h);
        }
    }
}

/// `JᵀJ` (upper triangle accumulated, then mirrored) and `Jᵀr`.
#[allow(clippy::needless_range_loop)]
fn normal_equations<const N: usize>(jacobian: &[[f64; N]], residuals: &[f64]) -> ([[f64; N]; N], [f64; N]) {
    let mut jtj = [[0.0f64; N]; N];
    let mut jtr = [0.0f64; N];
    for (row, &r) in jacobian.iter().zip(residuals) {
        for i in 0..N {
            jtr[i] += row[i] * r;
            for j in i..N {
                jtj[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 1..N {
        for j in 0..i {
            jtj[i][j] = jtj[j][i];
        }
    }
    (jtj, jtr)
}

/// Gaussian elimination with partial pivoting. `None` for a singular system.
#[allow(clippy::needless_range_loop)]
fn solve<const N: usize>(mut a: [[f64; N]; N], mut b: [f64; N]) -> Option<[f64; N]> {
    let scale = a.iter().flatten().fold(0.0f64, |m, v| m.max(v.abs()));
    if !(scale > 0.0) || !scale.is_finite() {
        return None;
    }
    for col in 0..N {
        let pivot = (col..N).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() <= 1e-15 * scale {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..N {
            let f = a[row][col] / a[col][col];
            let pivot_row = a[col];
            for (j, v) in a[row].iter_mut().enumerate().skip(col) {
                *v -= f * pivot_row[j];
            }
            b[row] -= f * b[col];
        }
    }
    let mut x = [0.0f64; N];
    for i in (0..N).rev() {
        let mut sum = b[i];
        for j in i + 1..N {
            sum -= a[i][j] * x[j];
        }
        x[i] = sum / a[i][i];
    }
    Some(x)
}

fn cost_of(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

/// Minimize `Σ r²` from `initial`. `keep_going(iteration)` is polled before
/// every iteration; returning `false` stops with `interrupted` set.
pub(crate) fn optimize<const N: usize, P: LmProblem<N>>(
    problem: &P,
    initial: [f64; N],
    config: &LmConfig,
    mut keep_going: impl FnMut(usize) -> bool,
) -> LmResult<N> {
    let mut params = initial;
    let mut residuals = Vec::new();
    let mut jacobian = Vec::new();
    problem.residuals(&params, &mut residuals);
    let mut cost = cost_of(&residuals);
    let mut lambda = config.initial_lambda;
    let mut converged = false;
    let mut iterations = 0;
    let mut trial = Vec::new();

    while iterations < config.max_iterations {
        if !keep_going(iterations) {
            return LmResult {
                params,
                cost,
                iterations,
                converged: false,
                interrupted: true,
            };
        }
        iterations += 1;
        problem.jacobian(&params, &mut jacobian);
        let (jtj, jtr) = normal_equations(&jacobian, &residuals);
        let rhs = jtr.map(|g| -g);

        let mut improved = false;
        while lambda < 1e12 {
            let mut damped = jtj;
            for (i, row) in damped.iter_mut().enumerate() {
                row[i] += lambda * jtj[i][i].max(1e-12);
            }
            let Some(delta) = solve(damped, rhs) else {
                lambda *= config.lambda_up;
                continue;
            };
            let mut next = params;
            for (p, d) in next.iter_mut().zip(delta.iter()) {
                *p += d;
            }
            problem.residuals(&next, &mut trial);
            let next_cost = cost_of(&trial);
            if next_cost.is_finite() && next_cost < cost {
                let decrease = (cost - next_cost) / cost.max(f64::MIN_POSITIVE);
                let step = delta.iter().fold(0.0f64, |m, d| m.max(d.abs()));
                params = next;
                cost = next_cost;
                std::mem::swap(&mut residuals, &mut trial);
                lambda = (lambda * config.lambda_down).max(1e-12);
                improved = true;
                if decrease < config.cost_tolerance || step < config.step_tolerance {
                    converged = true;
                }
                break;
            }
            lambda *= config.lambda_up;
        }
        if !improved {
            // No downhill step at any damping: a (local) minimum.
            converged = true;
        }
        if converged {
            break;
        }
    }
    LmResult {
        params,
        cost,
        iterations,
        converged,
        interrupted: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y = a·exp(b·t) sampled without noise.
    struct ExpCurve {
        t: Vec<f64>,
        y: Vec<f64>,
    }

    impl LmProblem<2> for ExpCurve {
        fn residuals(&self, p: &[f64; 2], out: &mut Vec<f64>) {
            out.clear();
            out.extend(self.t.iter().zip(&self.y).map(|(t, y)| p[0] * (p[1] * t).exp() - y));
        }
    }

    fn curve() -> ExpCurve {
        let t: Vec<f64> = (0..20).map(|i| i as f64 * 0.1).collect();
        let y = t.iter().map(|t| 2.5 * (-1.3 * t).exp()).collect();
        ExpCurve { t, y }
    }

    #[test]
    fn recovers_exponential_parameters() {
        let res = optimize(&curve(), [1.0, 0.0], &LmConfig::default(), |_| true);
        assert!(res.converged);
        assert!((res.params[0] - 2.5).abs() < 1e-6, "{:?}", res.params);
        assert!((res.params[1] + 1.3).abs() < 1e-6, "{:?}", res.params);
        assert!(res.cost < 1e-12);
    }

    #[test]
    fn numeric_jacobian_matches_analytic() {
        let problem = curve();
        let p = [2.0, -1.0];
        let mut jac = Vec::new();
        problem.jacobian(&p, &mut jac);
        for (row, t) in jac.iter().zip(&problem.t) {
            let e = (p[1] * t).exp();
            assert!((row[0] - e).abs() < 1e-6);
            assert!((row[1] - p[0] * t * e).abs() < 1e-6);
        }
    }

    #[test]
    fn solver_handles_pivoting_and_singularity() {
        let x = solve([[0.0, 2.0], [3.0, 1.0]], [4.0, 5.0]).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12 && (x[1] - 2.0).abs() < 1e-12);
        assert!(solve([[1.0, 2.0], [2.0, 4.0]], [1.0, 2.0]).is_none());
    }

    #[test]
    fn interruption_keeps_last_parameters() {
        let res = optimize(&curve(), [1.0, 0.0], &LmConfig::default(), |i| i < 1);
        assert!(res.interrupted);
        assert_eq!(res.iterations, 1);
    }
}
