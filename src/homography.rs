//! Planar projective transforms between the ideal lattice and sensor
//! coordinates.
//!
//! Points are `[a, b]` pairs; callers use `[y, x]` throughout, the
//! homography does not care about the axis naming.
use crate::error::{LfError, Result};
use nalgebra::{DMatrix, Matrix3, SymmetricEigen, Vector3};

const EPS: f64 = 1e-12;

/// Project a point through `h`. `None` when it lands on the line at infinity.
#[inline]
pub fn project(h: &Matrix3<f64>, p: [f64; 2]) -> Option<[f64; 2]> {
    let v = h * Vector3::new(p[0], p[1], 1.0);
    let w = v[2];
    if !w.is_finite() || w.abs() <= EPS || !v[0].is_finite() || !v[1].is_finite() {
        return None;
    }
    Some([v[0] / w, v[1] / w])
}

pub fn apply_homography_points(h: &Matrix3<f64>, pts: &[[f64; 2]]) -> Option<Vec<[f64; 2]>> {
    pts.iter().map(|&p| project(h, p)).collect()
}

/// Hartley normalization: centroid to origin, mean distance √2.
pub(crate) fn normalize_points(pts: &[[f64; 2]]) -> (Matrix3<f64>, Vec<[f64; 2]>) {
    let n = pts.len().max(1) as f64;
    let ca = pts.iter().map(|p| p[0]).sum::<f64>() / n;
    let cb = pts.iter().map(|p| p[1]).sum::<f64>() / n;
    let mean_dist = pts
        .iter()
        .map(|p| ((p[0] - ca).powi(2) + (p[1] - cb).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > EPS {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    let t = Matrix3::new(s, 0.0, -s * ca, 0.0, s, -s * cb, 0.0, 0.0, 1.0);
    let normalized = pts.iter().map(|p| [s * (p[0] - ca), s * (p[1] - cb)]).collect();
    (t, normalized)
}

/// Scale `h` so that `h[(2, 2)] == 1` when possible.
pub fn normalize_scale(h: Matrix3<f64>) -> Matrix3<f64> {
    let s = h[(2, 2)];
    if s.abs() <= EPS {
        h
    } else {
        h / s
    }
}

/// Direct linear transform from at least four correspondences, so that
/// `dst ≈ project(H, src)`. Four points in general position give the exact
/// transform.
pub fn estimate_homography_dlt(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Result<Matrix3<f64>> {
    let n = src.len();
    if n < 4 || dst.len() != n {
        return Err(LfError::degenerate(format!(
            "homography needs 4+ matched points, got {} and {}",
            n,
            dst.len()
        )));
    }
    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    let mut a = DMatrix::zeros(2 * n, 9);
    for i in 0..n {
        let (sa, sb) = (src_n[i][0], src_n[i][1]);
        let (da, db) = (dst_n[i][0], dst_n[i][1]);

        a[(2 * i, 3)] = -sa;
        a[(2 * i, 4)] = -sb;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = db * sa;
        a[(2 * i, 7)] = db * sb;
        a[(2 * i, 8)] = db;

        a[(2 * i + 1, 0)] = sa;
        a[(2 * i + 1, 1)] = sb;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -da * sa;
        a[(2 * i + 1, 7)] = -da * sb;
        a[(2 * i + 1, 8)] = -da;
    }

    // Null vector of A: eigenvector of AᵀA with the smallest eigenvalue.
    let ata = a.transpose() * &a;
    let eig = SymmetricEigen::new(ata);
    let min_idx = eig
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|(_, x), (_, y)| x.abs().total_cmp(&y.abs()))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let col = eig.eigenvectors.column(min_idx);
    let h_norm = Matrix3::new(
        col[0], col[1], col[2], col[3], col[4], col[5], col[6], col[7], col[8],
    );
    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| LfError::degenerate("point set collapsed during normalization"))?;
    Ok(normalize_scale(t_dst_inv * h_norm * t_src))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_h() -> Matrix3<f64> {
        Matrix3::new(
            1.02, 0.03, 12.0, -0.02, 0.98, 7.5, 1.0e-5, -2.0e-5, 1.0,
        )
    }

    #[test]
    fn dlt_recovers_exact_transform() {
        let h = sample_h();
        let src: Vec<[f64; 2]> = (0..5)
            .flat_map(|r| (0..6).map(move |c| [r as f64 * 20.0, c as f64 * 20.0]))
            .collect();
        let dst = apply_homography_points(&h, &src).unwrap();
        let est = estimate_homography_dlt(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(&dst) {
            let p = project(&est, *s).unwrap();
            assert!((p[0] - d[0]).abs() < 1e-6 && (p[1] - d[1]).abs() < 1e-6);
        }
    }

    #[test]
    fn four_corners_are_enough() {
        let h = sample_h();
        let src = [[0.0, 0.0], [0.0, 100.0], [80.0, 0.0], [80.0, 100.0]];
        let dst = apply_homography_points(&h, &src).unwrap();
        let est = estimate_homography_dlt(&src, &dst).unwrap();
        let p = project(&est, [40.0, 50.0]).unwrap();
        let q = project(&h, [40.0, 50.0]).unwrap();
        assert!((p[0] - q[0]).abs() < 1e-6 && (p[1] - q[1]).abs() < 1e-6);
    }

    #[test]
    fn too_few_points_is_degenerate() {
        let pts = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let err = estimate_homography_dlt(&pts, &pts).unwrap_err();
        assert!(err.is_degenerate());
    }
}
