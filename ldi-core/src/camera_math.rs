//! C6: Camera Math.
//!
//! Pure 3x3 matrix algebra: the slant/roll/skew/focal primitives from
//! §4.3 and the composition the raycaster needs (`P = FSKR1 * inv(FSKR2)`,
//! `C = FSKR1 * (C2 - C1)`). Everything here is `#[inline]`-friendly free
//! functions over `glam::Mat3`/`glam::Vec3` rather than a bespoke matrix
//! type, matching how `stitch::camera::proj` leans on `glam` throughout.

use glam::{Mat3, Vec3};

/// Below this determinant magnitude a matrix is treated as singular: its
/// inverse is not computed, and the caller should mark the pixel's
/// confidence as zero rather than propagate NaNs.
pub const SINGULAR_DET_THRESHOLD: f32 = 1e-6;

/// Orthonormalized rotation from tangent-space slant (§4.3). Columns are
/// expressed directly per the spec; the transpose convention matches the
/// reference shader, so this returns the matrix row-major as `glam`
/// expects column vectors — callers multiply `M * v` as usual.
pub fn m_slant(sl_x: f32, sl_y: f32) -> Mat3 {
    let inv = 1.0 / (1.0 + sl_x * sl_x + sl_y * sl_y).sqrt();
    let col0 = Vec3::new(1.0 / (1.0 + sl_x * sl_x).sqrt(), 0.0, -sl_x * inv);
    let col1 = Vec3::new(0.0, 1.0 / (1.0 + sl_y * sl_y).sqrt(), -sl_y * inv);
    let col2 = Vec3::new(sl_x * inv, sl_y * inv, inv);
    Mat3::from_cols(col0, col1, col2)
}

/// 2D rotation in XY embedded in a 3x3 identity on Z.
pub fn m_roll(theta_deg: f32) -> Mat3 {
    let theta = theta_deg.to_radians();
    let (s, c) = theta.sin_cos();
    Mat3::from_cols(
        Vec3::new(c, s, 0.0),
        Vec3::new(-s, c, 0.0),
        Vec3::new(0.0, 0.0, 1.0),
    )
}

/// Frustum skew: identity with `(-sk_x, -sk_y, 1)` in the third column.
pub fn m_skew(sk_x: f32, sk_y: f32) -> Mat3 {
    Mat3::from_cols(
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(-sk_x, -sk_y, 1.0),
    )
}

/// Diagonal focal scaling.
pub fn m_focal(f_x: f32, f_y: f32) -> Mat3 {
    Mat3::from_diagonal(Vec3::new(f_x, f_y, 1.0))
}

/// `FSKR = M_focal . M_skew . M_roll . M_slant` for one layer.
pub fn fskr(focal: (f32, f32), skew: (f32, f32), roll_degrees: f32, slant: (f32, f32)) -> Mat3 {
    m_focal(focal.0, focal.1) * m_skew(skew.0, skew.1) * m_roll(roll_degrees) * m_slant(slant.0, slant.1)
}

/// Inverts `m` via the adjugate formula, clamping near-singular input
/// instead of panicking (§4.3). `det` is computed as the dot product of
/// the first row with its cofactor minors, matching the reference
/// shader's formulation.
///
/// Returns `None` when `|det| < SINGULAR_DET_THRESHOLD`; callers must
/// treat that as "projection undefined for this pixel" (confidence 0),
/// never as a hard error.
pub fn inverse_clamped(m: Mat3) -> Option<Mat3> {
    let cols = m.to_cols_array_2d();
    let minor = |r0: usize, r1: usize, c0: usize, c1: usize| {
        cols[c0][r0] * cols[c1][r1] - cols[c1][r0] * cols[c0][r1]
    };

    // Cofactor matrix entries (unnormalized adjugate, transposed below).
    let c00 = minor(1, 2, 1, 2);
    let c01 = -minor(1, 2, 0, 2);
    let c02 = minor(1, 2, 0, 1);

    let det = cols[0][0] * c00 + cols[0][1] * c01 + cols[0][2] * c02;
    if det.abs() < SINGULAR_DET_THRESHOLD {
        return None;
    }

    let c10 = -minor(0, 2, 1, 2);
    let c11 = minor(0, 2, 0, 2);
    let c12 = -minor(0, 2, 0, 1);

    let c20 = minor(0, 1, 1, 2);
    let c21 = -minor(0, 1, 0, 2);
    let c22 = minor(0, 1, 0, 1);

    let inv_det = 1.0 / det;
    // adjugate = transpose of cofactor matrix
    Some(Mat3::from_cols(
        Vec3::new(c00, c01, c02) * inv_det,
        Vec3::new(c10, c11, c12) * inv_det,
        Vec3::new(c20, c21, c22) * inv_det,
    ))
}

/// Per-pixel raycast projection parameters derived from two FSKR
/// matrices and their camera-space positions: `P = FSKR1 . inv(FSKR2)`,
/// `C = FSKR1 . (C2 - C1)`. Returns `None` if `FSKR2` is near-singular.
pub fn project(fskr1: Mat3, c1: Vec3, fskr2: Mat3, c2: Vec3) -> Option<(Mat3, Vec3)> {
    let fskr2_inv = inverse_clamped(fskr2)?;
    let p = fskr1 * fskr2_inv;
    let c = fskr1 * (c2 - c1);
    Some((p, c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_slant_and_skew_are_identity() {
        assert!(m_slant(0.0, 0.0).abs_diff_eq(Mat3::IDENTITY, 1e-6));
        assert!(m_skew(0.0, 0.0).abs_diff_eq(Mat3::IDENTITY, 1e-6));
        assert!(m_roll(0.0).abs_diff_eq(Mat3::IDENTITY, 1e-6));
    }

    #[test]
    fn inverse_of_identity_is_identity() {
        let inv = inverse_clamped(Mat3::IDENTITY).expect("invertible");
        assert!(inv.abs_diff_eq(Mat3::IDENTITY, 1e-6));
    }

    #[test]
    fn inverse_roundtrips_a_focal_skew_matrix() {
        let m = fskr((1.5, 1.5), (0.05, -0.02), 3.0, (0.1, -0.05));
        let inv = inverse_clamped(m).expect("invertible");
        let roundtrip = m * inv;
        assert!(roundtrip.abs_diff_eq(Mat3::IDENTITY, 1e-4));
    }

    #[test]
    fn singular_matrix_yields_none_instead_of_panicking() {
        let singular = Mat3::from_cols(Vec3::ZERO, Vec3::Y, Vec3::Z);
        assert!(inverse_clamped(singular).is_none());
    }

    #[test]
    fn project_matches_camera_when_views_are_identical() {
        let fskr1 = fskr((1.0, 1.0), (0.0, 0.0), 0.0, (0.0, 0.0));
        let (p, c) = project(fskr1, Vec3::ZERO, fskr1, Vec3::ZERO).expect("invertible");
        assert!(p.abs_diff_eq(Mat3::IDENTITY, 1e-5));
        assert!(c.abs_diff_eq(Vec3::ZERO, 1e-5));
    }
}
