use nalgebra as na;
use num_traits::Float;
use serde_derive::{Deserialize, Serialize};

use crate::error::Error;

/// Fixed camera setup: an image-plane quadrilateral and the ground-plane
/// rectangle it corresponds to.
///
/// Target coordinates must be given in meters for downstream speed figures
/// to come out in km/h.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Calibration {
    pub source: [[f32; 2]; 4],
    pub target: [[f32; 2]; 4],
}

impl Calibration {
    fn source_points(&self) -> [na::Point2<f64>; 4] {
        self.source
            .map(|[x, y]| na::Point2::new(x as f64, y as f64))
    }

    fn target_points(&self) -> [na::Point2<f64>; 4] {
        self.target
            .map(|[x, y]| na::Point2::new(x as f64, y as f64))
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            source: [[1252., 787.], [2298., 803.], [5039., 2159.], [-550., 2159.]],
            target: [[0., 0.], [25., 0.], [25., 250.], [0., 250.]],
        }
    }
}

/// Planar homography from the calibration quadrilateral to the ground
/// rectangle, fixed for the lifetime of one video.
pub struct PerspectiveMapper {
    m: na::Matrix3<f64>,
}

impl PerspectiveMapper {
    pub fn new(calibration: &Calibration) -> Result<Self, Error> {
        let m = homography(&calibration.source_points(), &calibration.target_points())
            .ok_or_else(|| Error::Calibration("points are collinear or coincident".into()))?;

        Ok(Self { m })
    }

    /// Maps image-plane points to ground-plane coordinates, preserving order.
    ///
    /// Points outside the calibration quadrilateral extrapolate; vehicle
    /// anchors routinely sit outside the marked region.
    pub fn transform(&self, points: &[na::Point2<f32>]) -> Vec<na::Point2<f32>> {
        points
            .iter()
            .map(|p| {
                let (x, y) = (p.x as f64, p.y as f64);
                let w = self.m[(2, 0)] * x + self.m[(2, 1)] * y + self.m[(2, 2)];
                let tx = (self.m[(0, 0)] * x + self.m[(0, 1)] * y + self.m[(0, 2)]) / w;
                let ty = (self.m[(1, 0)] * x + self.m[(1, 1)] * y + self.m[(1, 2)]) / w;

                na::Point2::new(tx as f32, ty as f32)
            })
            .collect()
    }
}

/// Exact solution of the 4-correspondence planar projective mapping, as the
/// 8x8 linear system in the homography coefficients (h22 fixed to 1).
fn homography<T: na::ComplexField + Float>(
    src: &[na::Point2<T>; 4],
    dst: &[na::Point2<T>; 4],
) -> Option<na::Matrix3<T>> {
    let mut a = na::SMatrix::<T, 8, 8>::zeros();
    let mut b = na::SVector::<T, 8>::zeros();

    for i in 0..4 {
        let (x, y) = (src[i].x, src[i].y);
        let (u, v) = (dst[i].x, dst[i].y);
        let r = i * 2;

        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = T::one();
        a[(r, 6)] = -x * u;
        a[(r, 7)] = -y * u;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = T::one();
        a[(r + 1, 6)] = -x * v;
        a[(r + 1, 7)] = -y * v;
        b[r + 1] = v;
    }

    let h = a.lu().solve(&b)?;

    Some(na::Matrix3::new(
        h[0],
        h[1],
        h[2],
        h[3],
        h[4],
        h[5],
        h[6],
        h[7],
        T::one(),
    ))
}
