//! Camera calibration data and the pixel → world mapping.
//!
//! The camera observes a flat working plane (the table). A planar homography,
//! estimated once from chessboard corner correspondences, maps pixel
//! coordinates onto that plane in world millimeters. When a request supplies
//! a depth hint the resulting point is lifted to that height; otherwise the
//! working-plane height is assumed.

use crate::errors::ArmError;
use crate::frame::Pose3D;
use nalgebra::{DMatrix, Matrix3, Point2, Vector3};

/// Determinant magnitude below which the homography is treated as singular.
const SINGULAR_DET_EPS: f64 = 1e-12;

/// Projective scale magnitude below which a mapped pixel has no finite image.
const PROJECTIVE_W_EPS: f64 = 1e-9;

/// Reference chessboard used to derive the homography.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChessboardSpec {
    /// Inner corners per row and per column.
    pub corners: (usize, usize),
    /// Edge length of one square in millimeters.
    pub square_size: f64,
}

impl ChessboardSpec {
    /// The 9×6 board with 30 mm squares used for bench calibration.
    pub fn bench_default() -> Self {
        ChessboardSpec {
            corners: (9, 6),
            square_size: 30.0,
        }
    }

    /// World-plane positions of the inner corners, row-major, in the same
    /// order a corner detector reports them.
    pub fn world_corners(&self) -> Vec<Point2<f64>> {
        let (cols, rows) = self.corners;
        let mut points = Vec::with_capacity(cols * rows);
        for row in 0..rows {
            for col in 0..cols {
                points.push(Point2::new(
                    col as f64 * self.square_size,
                    row as f64 * self.square_size,
                ));
            }
        }
        points
    }
}

/// Immutable result of a completed calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationParams {
    /// Pixel → world-plane homography.
    pub homography: Matrix3<f64>,
    /// The chessboard geometry the homography was derived from.
    pub board: ChessboardSpec,
    /// Height of the working plane in world millimeters.
    pub working_plane_z: f64,
}

/// Holds calibration parameters and answers pixel → world lookups.
///
/// Starts uninitialized; any pixel-based request fails with
/// [`ArmError::Calibration`] until parameters are installed.
#[derive(Debug, Default)]
pub struct CalibrationStore {
    params: Option<CalibrationParams>,
}

impl CalibrationStore {
    pub fn new() -> Self {
        CalibrationStore { params: None }
    }

    pub fn with_params(params: CalibrationParams) -> Result<Self, ArmError> {
        let mut store = CalibrationStore::new();
        store.install(params)?;
        Ok(store)
    }

    /// Installs calibration parameters, rejecting a singular homography.
    pub fn install(&mut self, params: CalibrationParams) -> Result<(), ArmError> {
        if !params.homography.iter().all(|v| v.is_finite()) {
            return Err(ArmError::Calibration(
                "homography contains non-finite entries".to_string(),
            ));
        }
        if params.homography.determinant().abs() < SINGULAR_DET_EPS {
            return Err(ArmError::Calibration(
                "homography is singular".to_string(),
            ));
        }
        self.params = Some(params);
        Ok(())
    }

    /// The installed parameters, if any.
    pub fn params(&self) -> Option<&CalibrationParams> {
        self.params.as_ref()
    }

    /// Maps a pixel to a world-frame point on the working plane.
    ///
    /// `depth_hint` overrides the working-plane height when the caller knows
    /// the object height (e.g. from a depth sensor or object model).
    pub fn pixel_to_world(
        &self,
        pixel: (f64, f64),
        depth_hint: Option<f64>,
    ) -> Result<Pose3D, ArmError> {
        let params = self.params.as_ref().ok_or_else(|| {
            ArmError::Calibration("no calibration installed".to_string())
        })?;
        let (u, v) = pixel;
        if !u.is_finite() || !v.is_finite() {
            return Err(ArmError::InvalidPose(format!(
                "pixel coordinates ({}, {}) are not finite",
                u, v
            )));
        }
        let mapped = params.homography * Vector3::new(u, v, 1.0);
        if mapped.z.abs() < PROJECTIVE_W_EPS {
            return Err(ArmError::Calibration(format!(
                "pixel ({}, {}) maps to the plane at infinity",
                u, v
            )));
        }
        let z = depth_hint.unwrap_or(params.working_plane_z);
        Ok(Pose3D::at(mapped.x / mapped.z, mapped.y / mapped.z, z))
    }
}

/// Estimates the pixel → world-plane homography from point correspondences
/// using the normalized direct linear transform.
///
/// At least four correspondences are required; with a full chessboard the
/// system is strongly overdetermined and solved in the least-squares sense.
pub fn estimate_homography(
    pixels: &[Point2<f64>],
    world: &[Point2<f64>],
) -> Result<Matrix3<f64>, ArmError> {
    if pixels.len() != world.len() {
        return Err(ArmError::Calibration(format!(
            "correspondence count mismatch: {} pixels vs {} world points",
            pixels.len(),
            world.len()
        )));
    }
    if pixels.len() < 4 {
        return Err(ArmError::Calibration(format!(
            "need at least 4 correspondences, got {}",
            pixels.len()
        )));
    }
    if pixels
        .iter()
        .chain(world.iter())
        .any(|p| !p.x.is_finite() || !p.y.is_finite())
    {
        return Err(ArmError::Calibration(
            "correspondences contain non-finite coordinates".to_string(),
        ));
    }

    // Hartley normalization keeps the DLT system well conditioned.
    let t_pix = normalizing_transform(pixels);
    let t_world = normalizing_transform(world);

    let n = pixels.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for i in 0..n {
        let p = apply_similarity(&t_pix, &pixels[i]);
        let w = apply_similarity(&t_world, &world[i]);
        let (u, v) = (p.x, p.y);
        let (x, y) = (w.x, w.y);
        let r = 2 * i;
        a[(r, 0)] = -u;
        a[(r, 1)] = -v;
        a[(r, 2)] = -1.0;
        a[(r, 6)] = x * u;
        a[(r, 7)] = x * v;
        a[(r, 8)] = x;
        a[(r + 1, 3)] = -u;
        a[(r + 1, 4)] = -v;
        a[(r + 1, 5)] = -1.0;
        a[(r + 1, 6)] = y * u;
        a[(r + 1, 7)] = y * v;
        a[(r + 1, 8)] = y;
    }

    let svd = a.svd(false, true);
    let v_t = svd
        .v_t
        .as_ref()
        .ok_or_else(|| ArmError::Calibration("SVD failed to converge".to_string()))?;

    // The homography is the null vector: the right singular vector with the
    // smallest singular value (not assumed to be sorted).
    let mut min_idx = 0;
    for (i, s) in svd.singular_values.iter().enumerate() {
        if *s < svd.singular_values[min_idx] {
            min_idx = i;
        }
    }
    let h = v_t.row(min_idx);
    let h_norm = Matrix3::new(
        h[0], h[1], h[2], //
        h[3], h[4], h[5], //
        h[6], h[7], h[8],
    );

    // Undo the normalization: H = T_world⁻¹ · H_norm · T_pix.
    let t_world_inv = t_world.try_inverse().ok_or_else(|| {
        ArmError::Calibration("degenerate world point distribution".to_string())
    })?;
    let mut homography = t_world_inv * h_norm * t_pix;

    if homography.determinant().abs() < SINGULAR_DET_EPS {
        return Err(ArmError::Calibration(
            "estimated homography is singular (degenerate correspondences)".to_string(),
        ));
    }
    // Fix the projective scale so the bottom-right entry is 1.
    let scale = homography[(2, 2)];
    if scale.abs() > PROJECTIVE_W_EPS {
        homography /= scale;
    }
    Ok(homography)
}

/// Similarity transform moving the centroid to the origin and scaling the
/// mean distance from it to √2.
fn normalizing_transform(points: &[Point2<f64>]) -> Matrix3<f64> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > 0.0 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    Matrix3::new(
        s, 0.0, -s * cx, //
        0.0, s, -s * cy, //
        0.0, 0.0, 1.0,
    )
}

fn apply_similarity(t: &Matrix3<f64>, p: &Point2<f64>) -> Point2<f64> {
    let v = t * Vector3::new(p.x, p.y, 1.0);
    Point2::new(v.x / v.z, v.y / v.z)
}
