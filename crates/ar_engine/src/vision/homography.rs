//! Plane-to-image homography from point correspondences
//!
//! Direct linear transform with Hartley normalization on both point sets.
//! The marker solve only ever feeds four points, but nothing here assumes it.

use nalgebra::{DMatrix, SymmetricEigen};
use thiserror::Error;

use crate::foundation::math::{Mat3d, Vec3d};

/// Homography estimation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HomographyError {
    /// Fewer than four correspondences
    #[error("Need at least 4 correspondences, got {0}")]
    TooFewPoints(usize),

    /// Source and destination point counts differ
    #[error("Point count mismatch: {src} source vs {dst} destination")]
    CountMismatch {
        /// Source point count
        src: usize,
        /// Destination point count
        dst: usize,
    },

    /// The linear system has no usable solution
    #[error("Degenerate configuration")]
    Degenerate,
}

/// Map a plane point through `h`
///
/// Returns `None` when the point maps to infinity.
pub fn apply(h: &Mat3d, point: [f64; 2]) -> Option<[f64; 2]> {
    let p = h * Vec3d::new(point[0], point[1], 1.0);
    if p.z.abs() < 1e-15 {
        return None;
    }
    Some([p.x / p.z, p.y / p.z])
}

/// Similarity that moves the centroid to the origin and scales the mean
/// distance from it to sqrt(2)
fn normalizing_transform(points: &[[f64; 2]]) -> Mat3d {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = points.iter().map(|p| p[1]).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| (p[0] - cx).hypot(p[1] - cy))
        .sum::<f64>()
        / n;

    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    Mat3d::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

/// Estimate `H` such that `dst ~ H * src`
///
/// The result is scaled so that `H[(2, 2)] == 1` when that entry is not
/// vanishing; callers that need a specific scale re-derive it themselves.
pub fn estimate(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Result<Mat3d, HomographyError> {
    if src.len() != dst.len() {
        return Err(HomographyError::CountMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    let n = src.len();
    if n < 4 {
        return Err(HomographyError::TooFewPoints(n));
    }

    let t_src = normalizing_transform(src);
    let t_dst = normalizing_transform(dst);

    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (s, d)) in src.iter().zip(dst).enumerate() {
        let s = t_src * Vec3d::new(s[0], s[1], 1.0);
        let d = t_dst * Vec3d::new(d[0], d[1], 1.0);
        let (sx, sy) = (s.x, s.y);
        let (dx, dy) = (d.x, d.y);

        let r = 2 * i;
        a[(r, 3)] = -sx;
        a[(r, 4)] = -sy;
        a[(r, 5)] = -1.0;
        a[(r, 6)] = dy * sx;
        a[(r, 7)] = dy * sy;
        a[(r, 8)] = dy;

        a[(r + 1, 0)] = sx;
        a[(r + 1, 1)] = sy;
        a[(r + 1, 2)] = 1.0;
        a[(r + 1, 6)] = -dx * sx;
        a[(r + 1, 7)] = -dx * sy;
        a[(r + 1, 8)] = -dx;
    }

    // Null vector of A is the eigenvector of AᵀA with the smallest eigenvalue
    let eig = SymmetricEigen::new(a.transpose() * &a);
    let (min_idx, _) = eig
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|(_, x), (_, y)| x.abs().total_cmp(&y.abs()))
        .ok_or(HomographyError::Degenerate)?;
    let h = eig.eigenvectors.column(min_idx);
    let h_norm = Mat3d::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let t_dst_inv = t_dst.try_inverse().ok_or(HomographyError::Degenerate)?;
    let mut result = t_dst_inv * h_norm * t_src;

    if result.iter().any(|v| !v.is_finite()) {
        return Err(HomographyError::Degenerate);
    }
    let scale = result[(2, 2)];
    if scale.abs() > 1e-12 {
        result /= scale;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_recovers_known_homography() {
        let truth = Mat3d::new(1.2, 0.1, 30.0, -0.05, 0.9, 12.0, 0.0004, -0.0002, 1.0);
        let src = [[0.0, 0.0], [100.0, 0.0], [100.0, 80.0], [0.0, 80.0], [50.0, 40.0]];
        let dst: Vec<[f64; 2]> = src.iter().map(|p| apply(&truth, *p).unwrap()).collect();

        let h = estimate(&src, &dst).unwrap();
        for p in &src {
            let expected = apply(&truth, *p).unwrap();
            let actual = apply(&h, *p).unwrap();
            assert_relative_eq!(actual[0], expected[0], epsilon = 1e-6);
            assert_relative_eq!(actual[1], expected[1], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_too_few_points() {
        let pts = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]];
        assert_eq!(estimate(&pts, &pts), Err(HomographyError::TooFewPoints(3)));
    }

    #[test]
    fn test_count_mismatch() {
        let src = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        let dst = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]];
        assert!(matches!(
            estimate(&src, &dst),
            Err(HomographyError::CountMismatch { src: 4, dst: 3 })
        ));
    }
}
