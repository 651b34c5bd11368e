//! Pixel to ground-point projection.
//!
//! The world frame is a local tangent plane centred below the camera: x points east, y north and
//! z up, with the camera at `(0, 0, elevation_m)`. The camera frame follows the usual image
//! convention: x right, y down, z along the optical axis.
//!
//! A pixel is undistorted, turned into a pinhole ray, rotated into the world frame, intersected
//! with the horizontal plane at the assumed object height and finally converted to latitude and
//! longitude with an equirectangular approximation around the camera position. The approximation
//! is only meant for camera-scale distances (a few hundred meters).

use nalgebra::{Matrix3, Rotation3, Vector3};

use crate::calibration::{CameraCalibration, Extrinsics};
use crate::error::ProjectionError;

/// Mean earth radius used by the tangent-plane conversion.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Rays whose downward component is smaller than this are treated as parallel to the ground.
const MIN_DESCENT: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeodeticPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Camera frame of a camera looking straight down with the top of the image towards north.
fn nadir_from_camera() -> Matrix3<f64> {
    Matrix3::from_diagonal(&Vector3::new(1.0, -1.0, -1.0))
}

/// Orientation of the camera: pitched up from the nadir by `tilt_deg`, then yawed clockwise
/// from north by `heading_deg`.
pub fn world_from_camera(extrinsics: &Extrinsics) -> Matrix3<f64> {
    let yaw = Rotation3::from_axis_angle(&Vector3::z_axis(), -extrinsics.heading_deg.to_radians());
    let pitch = Rotation3::from_axis_angle(&Vector3::x_axis(), extrinsics.tilt_deg.to_radians());
    (yaw * pitch).into_inner() * nadir_from_camera()
}

/// Removes lens distortion from a pixel position.
pub fn undistort(calibration: &CameraCalibration, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
    if calibration.distortion.is_identity() {
        return Ok((x, y));
    }

    let cx = calibration.intrinsics.center_x_px;
    let cy = calibration.intrinsics.center_y_px;
    let scale = calibration.distortion_scale_px();

    let r_distorted = ((x - cx).powi(2) + (y - cy).powi(2)).sqrt() / scale;
    if r_distorted == 0.0 {
        return Ok((x, y));
    }

    let r = calibration
        .distortion
        .undistort_radius(r_distorted)
        .ok_or(ProjectionError::Undistortion { x, y })?;
    let factor = r / r_distorted;
    Ok((cx + (x - cx) * factor, cy + (y - cy) * factor))
}

/// Viewing ray through an undistorted pixel, in world coordinates.
pub fn pixel_ray(calibration: &CameraCalibration, x: f64, y: f64) -> Vector3<f64> {
    let intrinsics = &calibration.intrinsics;
    let ray_camera = Vector3::new(
        (x - intrinsics.center_x_px) / intrinsics.focal_x_px,
        (y - intrinsics.center_y_px) / intrinsics.focal_y_px,
        1.0,
    );
    calibration.world_from_camera() * ray_camera
}

/// East/north offset in meters converted to a position relative to `origin`.
pub fn offset_to_geodetic(origin_lat: f64, origin_lon: f64, east_m: f64, north_m: f64) -> GeodeticPoint {
    let lat = origin_lat + (north_m / EARTH_RADIUS_M).to_degrees();
    let lon = origin_lon + (east_m / (EARTH_RADIUS_M * origin_lat.to_radians().cos())).to_degrees();
    GeodeticPoint { lat, lon }
}

/// Projects an image pixel onto the horizontal plane `object_height_m` above the ground.
pub fn project(
    calibration: &CameraCalibration,
    pixel_x: f64,
    pixel_y: f64,
    object_height_m: f64,
) -> Result<GeodeticPoint, ProjectionError> {
    let elevation_m = calibration.extrinsics.elevation_m;
    if object_height_m >= elevation_m {
        return Err(ProjectionError::PlaneNotBelowCamera {
            plane_m: object_height_m,
            elevation_m,
        });
    }

    let (x, y) = undistort(calibration, pixel_x, pixel_y)?;
    let ray = pixel_ray(calibration, x, y);
    if !(ray.z < -MIN_DESCENT) {
        return Err(ProjectionError::RayNotDescending {
            x: pixel_x,
            y: pixel_y,
            vertical: ray.z,
        });
    }

    let t = (object_height_m - elevation_m) / ray.z;
    let east_m = t * ray.x;
    let north_m = t * ray.y;

    Ok(offset_to_geodetic(
        calibration.position.lat,
        calibration.position.lon,
        east_m,
        north_m,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{GeoPosition, Intrinsics, RadialDistortion};

    const LAT: f64 = 52.52;
    const LON: f64 = 13.405;

    fn camera(tilt_deg: f64, heading_deg: f64, distortion: RadialDistortion) -> CameraCalibration {
        CameraCalibration::new(
            "cam",
            Intrinsics {
                image_width_px: 1920.0,
                image_height_px: 1080.0,
                focal_x_px: 1000.0,
                focal_y_px: 1000.0,
                center_x_px: 960.0,
                center_y_px: 540.0,
            },
            Extrinsics {
                elevation_m: 10.0,
                tilt_deg,
                heading_deg,
            },
            GeoPosition { lat: LAT, lon: LON },
            distortion,
        )
    }

    /// Meters east/north of the camera for a projected point.
    fn local_offset(point: GeodeticPoint) -> (f64, f64) {
        let north = (point.lat - LAT).to_radians() * EARTH_RADIUS_M;
        let east = (point.lon - LON).to_radians() * EARTH_RADIUS_M * LAT.to_radians().cos();
        (east, north)
    }

    #[test]
    fn test_nadir_center_pixel_hits_camera_position() {
        let cam = camera(0.0, 0.0, RadialDistortion::default());
        let point = project(&cam, 960.0, 540.0, 0.0).unwrap();
        assert!((point.lat - LAT).abs() < 1e-6);
        assert!((point.lon - LON).abs() < 1e-6);
    }

    #[test]
    fn test_forty_five_degrees_lands_one_elevation_away_along_heading() {
        for (heading, expected_east, expected_north) in
            [(0.0, 0.0, 10.0), (90.0, 10.0, 0.0), (180.0, 0.0, -10.0), (270.0, -10.0, 0.0)]
        {
            let cam = camera(45.0, heading, RadialDistortion::default());
            let (east, north) = local_offset(project(&cam, 960.0, 540.0, 0.0).unwrap());
            assert!((east - expected_east).abs() < 1e-6, "heading {}: east {}", heading, east);
            assert!((north - expected_north).abs() < 1e-6, "heading {}: north {}", heading, north);
        }
    }

    #[test]
    fn test_image_axes_follow_camera_orientation() {
        // Looking north: pixels right of center land east, lower pixels land closer
        let cam = camera(45.0, 0.0, RadialDistortion::default());
        let (center_east, center_north) = local_offset(project(&cam, 960.0, 540.0, 0.0).unwrap());
        let (right_east, _) = local_offset(project(&cam, 1400.0, 540.0, 0.0).unwrap());
        let (_, low_north) = local_offset(project(&cam, 960.0, 900.0, 0.0).unwrap());
        assert!(right_east > center_east);
        assert!(low_north < center_north);
    }

    #[test]
    fn test_object_height_shortens_the_ray() {
        let cam = camera(45.0, 0.0, RadialDistortion::default());
        let (_, ground) = local_offset(project(&cam, 960.0, 540.0, 0.0).unwrap());
        let (_, raised) = local_offset(project(&cam, 960.0, 540.0, 1.0).unwrap());
        assert!((ground - 10.0).abs() < 1e-6);
        assert!((raised - 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_projection_is_deterministic() {
        let cam = camera(60.0, 33.0, RadialDistortion::new(0.01, -0.02, 0.005));
        let first = project(&cam, 321.5, 777.25, 0.8).unwrap();
        for _ in 0..10 {
            assert_eq!(project(&cam, 321.5, 777.25, 0.8).unwrap(), first);
        }
    }

    #[test]
    fn test_identity_distortion_leaves_pixels_untouched() {
        let cam = camera(45.0, 0.0, RadialDistortion::default());
        for (x, y) in [(0.0, 0.0), (960.0, 540.0), (1919.0, 1079.0), (13.7, 1000.1)] {
            assert_eq!(undistort(&cam, x, y).unwrap(), (x, y));
        }
    }

    #[test]
    fn test_distortion_moves_pixels_radially() {
        let cam = camera(45.0, 0.0, RadialDistortion::new(0.0, 0.0, 0.1));
        let (x, y) = undistort(&cam, 1400.0, 540.0).unwrap();
        assert_eq!(y, 540.0);
        assert!(x != 1400.0);
        assert_eq!(undistort(&cam, 960.0, 540.0).unwrap(), (960.0, 540.0));
    }

    #[test]
    fn test_ray_above_horizon_fails_for_every_pixel() {
        let cam = camera(150.0, 0.0, RadialDistortion::default());
        for (x, y) in [(0.0, 0.0), (960.0, 540.0), (1920.0, 1080.0), (0.0, 1080.0)] {
            assert!(matches!(
                project(&cam, x, y, 0.0),
                Err(ProjectionError::RayNotDescending { .. })
            ));
        }
    }

    #[test]
    fn test_horizontal_center_ray_fails() {
        let cam = camera(90.0, 0.0, RadialDistortion::default());
        assert!(project(&cam, 960.0, 540.0, 0.0).is_err());
        // below the center the ray dips under the horizon again
        assert!(project(&cam, 960.0, 1000.0, 0.0).is_ok());
    }

    #[test]
    fn test_plane_above_camera_fails() {
        let cam = camera(0.0, 0.0, RadialDistortion::default());
        assert!(matches!(
            project(&cam, 960.0, 540.0, 12.0),
            Err(ProjectionError::PlaneNotBelowCamera { .. })
        ));
    }
}
