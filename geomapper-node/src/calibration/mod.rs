//! Camera models resolved from calibration sources.
//!
//! A [`CameraCalibration`] is built once at startup and never mutated afterwards; every derived
//! quantity the projector needs (focal lengths in pixels, optical center, orientation) is resolved
//! here so that projecting a pixel does no parsing or validation work.

pub mod loader;

use nalgebra::Matrix3;

use crate::projector;

pub use loader::{build, load, read_params, CalibrationParams, CalibrationSource};

/// Pinhole intrinsics in pixel units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub image_width_px: f64,
    pub image_height_px: f64,
    pub focal_x_px: f64,
    pub focal_y_px: f64,
    pub center_x_px: f64,
    pub center_y_px: f64,
}

/// Pose of the camera relative to the ground below it.
///
/// `tilt_deg` is measured from the nadir: 0° looks straight down, 90° looks at the horizon.
/// `heading_deg` is the compass direction of the optical axis, clockwise from north.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extrinsics {
    pub elevation_m: f64,
    pub tilt_deg: f64,
    pub heading_deg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPosition {
    pub lat: f64,
    pub lon: f64,
}

/// Cubic radial lens model, `r_d = r_u * (a*r_u^3 + b*r_u^2 + c*r_u + d)` with `d = 1 - a - b - c`.
///
/// Radii are normalized by half the shorter image side.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RadialDistortion {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

const UNDISTORT_MAX_ITERS: usize = 20;
const UNDISTORT_EPS: f64 = 1e-12;

impl RadialDistortion {
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    pub fn is_identity(&self) -> bool {
        self.a == 0.0 && self.b == 0.0 && self.c == 0.0
    }

    fn d(&self) -> f64 {
        1.0 - self.a - self.b - self.c
    }

    /// Undistorted radius to distorted radius.
    pub fn distort_radius(&self, r: f64) -> f64 {
        r * (((self.a * r + self.b) * r + self.c) * r + self.d())
    }

    /// Inverts [`distort_radius`](Self::distort_radius) with Newton iterations.
    pub fn undistort_radius(&self, r_distorted: f64) -> Option<f64> {
        if self.is_identity() {
            return Some(r_distorted);
        }

        let d = self.d();
        let mut r = r_distorted;
        for _ in 0..UNDISTORT_MAX_ITERS {
            let f = self.distort_radius(r) - r_distorted;
            let df = ((4.0 * self.a * r + 3.0 * self.b) * r + 2.0 * self.c) * r + d;
            if !df.is_finite() || df.abs() < 1e-12 {
                return None;
            }

            let step = f / df;
            r -= step;
            if !r.is_finite() {
                return None;
            }
            if step.abs() <= UNDISTORT_EPS {
                break;
            }
        }

        // A negative radius means the model folded over; there is no physical inverse.
        if r < 0.0 {
            return None;
        }
        Some(r)
    }
}

/// Fully resolved model of one calibrated camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraCalibration {
    pub stream_id: String,
    pub intrinsics: Intrinsics,
    pub extrinsics: Extrinsics,
    pub position: GeoPosition,
    pub distortion: RadialDistortion,
    world_from_camera: Matrix3<f64>,
}

impl CameraCalibration {
    pub fn new(
        stream_id: impl Into<String>,
        intrinsics: Intrinsics,
        extrinsics: Extrinsics,
        position: GeoPosition,
        distortion: RadialDistortion,
    ) -> Self {
        let world_from_camera = projector::world_from_camera(&extrinsics);
        Self {
            stream_id: stream_id.into(),
            intrinsics,
            extrinsics,
            position,
            distortion,
            world_from_camera,
        }
    }

    /// Rotation taking camera-frame rays (x right, y down, z forward) into east/north/up.
    pub fn world_from_camera(&self) -> &Matrix3<f64> {
        &self.world_from_camera
    }

    /// Pixel distance corresponding to a normalized lens radius of 1.
    pub fn distortion_scale_px(&self) -> f64 {
        self.intrinsics.image_width_px.min(self.intrinsics.image_height_px) / 2.0
    }
}

/// What the mapper does with messages from a configured camera.
#[derive(Debug, Clone, PartialEq)]
pub enum CameraMode {
    Passthrough,
    Calibrated(CameraCalibration),
}
