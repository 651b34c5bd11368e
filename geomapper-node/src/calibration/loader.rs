use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use super::{CameraCalibration, Extrinsics, GeoPosition, Intrinsics, RadialDistortion};
use crate::error::CalibrationLoadError;

/// Raw calibration record, either inlined in the camera config or stored in a YAML/JSON file.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct CalibrationParams {
    #[serde(default)]
    pub focallength_mm: Option<f64>,
    #[serde(default)]
    pub sensor_width_mm: Option<f64>,
    #[serde(default)]
    pub sensor_height_mm: Option<f64>,
    #[serde(default)]
    pub view_x_deg: Option<f64>,
    #[serde(default)]
    pub view_y_deg: Option<f64>,
    #[serde(default)]
    pub image_width_px: Option<u32>,
    #[serde(default)]
    pub image_height_px: Option<u32>,
    #[serde(default)]
    pub elevation_m: Option<f64>,
    #[serde(default)]
    pub tilt_deg: Option<f64>,
    #[serde(default)]
    pub heading_deg: Option<f64>,
    #[serde(default)]
    pub pos_lat: Option<f64>,
    #[serde(default)]
    pub pos_lon: Option<f64>,
    #[serde(default)]
    pub abc_distortion_a: f64,
    #[serde(default)]
    pub abc_distortion_b: f64,
    #[serde(default)]
    pub abc_distortion_c: f64,
}

#[derive(Debug, Clone, Copy)]
pub enum CalibrationSource<'a> {
    Inline(&'a CalibrationParams),
    File(&'a Path),
}

pub fn load(
    stream_id: &str,
    source: CalibrationSource<'_>,
) -> Result<CameraCalibration, CalibrationLoadError> {
    let calibration = match source {
        CalibrationSource::Inline(params) => build(stream_id, params)?,
        CalibrationSource::File(path) => {
            let params = read_params(stream_id, path)?;
            build(stream_id, &params)?
        }
    };

    info!(
        "Loaded calibration for camera {} at ({:.6}, {:.6}), elevation {} m",
        stream_id, calibration.position.lat, calibration.position.lon, calibration.extrinsics.elevation_m
    );
    Ok(calibration)
}

pub fn read_params(stream_id: &str, path: &Path) -> Result<CalibrationParams, CalibrationLoadError> {
    let raw = std::fs::read_to_string(path).map_err(|e| CalibrationLoadError::Unreadable {
        stream_id: stream_id.to_string(),
        path: path.display().to_string(),
        source: e,
    })?;

    // YAML is a superset of JSON, so both file flavours go through the same parser
    serde_yaml::from_str(&raw).map_err(|e| CalibrationLoadError::Malformed {
        stream_id: stream_id.to_string(),
        reason: e.to_string(),
    })
}

pub fn build(
    stream_id: &str,
    params: &CalibrationParams,
) -> Result<CameraCalibration, CalibrationLoadError> {
    let width = required(stream_id, "image_width_px", params.image_width_px.map(f64::from))?;
    let height = required(stream_id, "image_height_px", params.image_height_px.map(f64::from))?;
    positive(stream_id, "image_width_px", width)?;
    positive(stream_id, "image_height_px", height)?;

    let (focal_x_px, focal_y_px) = focal_lengths_px(stream_id, params, width, height)?;

    let elevation_m = required(stream_id, "elevation_m", params.elevation_m)?;
    positive(stream_id, "elevation_m", elevation_m)?;
    let tilt_deg = finite(stream_id, "tilt_deg", required(stream_id, "tilt_deg", params.tilt_deg)?)?;
    let heading_deg = finite(stream_id, "heading_deg", required(stream_id, "heading_deg", params.heading_deg)?)?;

    let lat = required(stream_id, "pos_lat", params.pos_lat)?;
    let lon = required(stream_id, "pos_lon", params.pos_lon)?;
    if !lat.is_finite() || lat.abs() > 90.0 {
        return Err(invalid(stream_id, "pos_lat", lat));
    }
    if !lon.is_finite() || lon.abs() > 180.0 {
        return Err(invalid(stream_id, "pos_lon", lon));
    }

    let distortion = RadialDistortion::new(
        finite(stream_id, "abc_distortion_a", params.abc_distortion_a)?,
        finite(stream_id, "abc_distortion_b", params.abc_distortion_b)?,
        finite(stream_id, "abc_distortion_c", params.abc_distortion_c)?,
    );

    debug!(
        "Camera {}: fx={:.2}px fy={:.2}px tilt={} heading={}",
        stream_id, focal_x_px, focal_y_px, tilt_deg, heading_deg
    );

    Ok(CameraCalibration::new(
        stream_id,
        Intrinsics {
            image_width_px: width,
            image_height_px: height,
            focal_x_px,
            focal_y_px,
            center_x_px: width / 2.0,
            center_y_px: height / 2.0,
        },
        Extrinsics {
            elevation_m,
            tilt_deg,
            heading_deg,
        },
        GeoPosition { lat, lon },
        distortion,
    ))
}

/// Resolves focal lengths in pixels from the sensor geometry or, failing that, the field of view.
///
/// A single sensor dimension or a single view angle is enough; the other axis assumes square pixels.
fn focal_lengths_px(
    stream_id: &str,
    params: &CalibrationParams,
    width: f64,
    height: f64,
) -> Result<(f64, f64), CalibrationLoadError> {
    let has_sensor = params.sensor_width_mm.is_some() || params.sensor_height_mm.is_some();

    if let (Some(focal_mm), true) = (params.focallength_mm, has_sensor) {
        positive(stream_id, "focallength_mm", focal_mm)?;
        let sensor_w = params
            .sensor_width_mm
            .or_else(|| params.sensor_height_mm.map(|h| h * width / height))
            .unwrap_or_default();
        let sensor_h = params
            .sensor_height_mm
            .or_else(|| params.sensor_width_mm.map(|w| w * height / width))
            .unwrap_or_default();
        positive(stream_id, "sensor_width_mm", sensor_w)?;
        positive(stream_id, "sensor_height_mm", sensor_h)?;

        return Ok((focal_mm / sensor_w * width, focal_mm / sensor_h * height));
    }

    let fx = params
        .view_x_deg
        .map(|deg| focal_from_view(stream_id, "view_x_deg", deg, width))
        .transpose()?;
    let fy = params
        .view_y_deg
        .map(|deg| focal_from_view(stream_id, "view_y_deg", deg, height))
        .transpose()?;

    match (fx, fy) {
        (Some(fx), Some(fy)) => Ok((fx, fy)),
        (Some(f), None) | (None, Some(f)) => Ok((f, f)),
        (None, None) => Err(CalibrationLoadError::MissingIntrinsics(stream_id.to_string())),
    }
}

fn focal_from_view(
    stream_id: &str,
    field: &'static str,
    view_deg: f64,
    extent_px: f64,
) -> Result<f64, CalibrationLoadError> {
    if !view_deg.is_finite() || view_deg <= 0.0 || view_deg >= 180.0 {
        return Err(invalid(stream_id, field, view_deg));
    }
    Ok(extent_px / (2.0 * (view_deg.to_radians() / 2.0).tan()))
}

fn required(
    stream_id: &str,
    field: &'static str,
    value: Option<f64>,
) -> Result<f64, CalibrationLoadError> {
    value.ok_or_else(|| CalibrationLoadError::MissingField {
        stream_id: stream_id.to_string(),
        field,
    })
}

fn positive(stream_id: &str, field: &'static str, value: f64) -> Result<f64, CalibrationLoadError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(invalid(stream_id, field, value))
    }
}

fn finite(stream_id: &str, field: &'static str, value: f64) -> Result<f64, CalibrationLoadError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(invalid(stream_id, field, value))
    }
}

fn invalid(stream_id: &str, field: &'static str, value: f64) -> CalibrationLoadError {
    CalibrationLoadError::InvalidValue {
        stream_id: stream_id.to_string(),
        field,
        value,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sensor_params() -> CalibrationParams {
        CalibrationParams {
            focallength_mm: Some(4.0),
            sensor_width_mm: Some(6.4),
            sensor_height_mm: Some(4.8),
            image_width_px: Some(1920),
            image_height_px: Some(1440),
            elevation_m: Some(10.0),
            tilt_deg: Some(45.0),
            heading_deg: Some(0.0),
            pos_lat: Some(52.52),
            pos_lon: Some(13.405),
            ..Default::default()
        }
    }

    #[test]
    fn test_sensor_geometry_scales_to_pixels() {
        let calibration = build("cam", &sensor_params()).unwrap();
        assert!((calibration.intrinsics.focal_x_px - 1200.0).abs() < 1e-9);
        assert!((calibration.intrinsics.focal_y_px - 1200.0).abs() < 1e-9);
        assert_eq!(calibration.intrinsics.center_x_px, 960.0);
        assert_eq!(calibration.intrinsics.center_y_px, 720.0);
    }

    #[test]
    fn test_single_sensor_dimension_assumes_square_pixels() {
        let params = CalibrationParams {
            sensor_height_mm: None,
            ..sensor_params()
        };
        let calibration = build("cam", &params).unwrap();
        assert!((calibration.intrinsics.focal_y_px - calibration.intrinsics.focal_x_px).abs() < 1e-9);
    }

    #[test]
    fn test_field_of_view_path() {
        let params = CalibrationParams {
            focallength_mm: None,
            sensor_width_mm: None,
            sensor_height_mm: None,
            view_x_deg: Some(90.0),
            ..sensor_params()
        };
        let calibration = build("cam", &params).unwrap();
        // 90° across 1920 px puts the focal length at half the width
        assert!((calibration.intrinsics.focal_x_px - 960.0).abs() < 1e-9);
        assert_eq!(calibration.intrinsics.focal_x_px, calibration.intrinsics.focal_y_px);
    }

    #[test]
    fn test_neither_sensor_nor_view_is_rejected() {
        let params = CalibrationParams {
            sensor_width_mm: None,
            sensor_height_mm: None,
            ..sensor_params()
        };
        let err = build("cam", &params).unwrap_err();
        assert!(matches!(err, CalibrationLoadError::MissingIntrinsics(ref id) if id == "cam"));
    }

    #[test]
    fn test_missing_position_is_rejected() {
        let params = CalibrationParams {
            pos_lat: None,
            ..sensor_params()
        };
        let err = build("cam", &params).unwrap_err();
        assert!(matches!(err, CalibrationLoadError::MissingField { field: "pos_lat", .. }));
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let params = CalibrationParams {
            view_x_deg: Some(180.0),
            focallength_mm: None,
            ..sensor_params()
        };
        assert!(matches!(
            build("cam", &params),
            Err(CalibrationLoadError::InvalidValue { field: "view_x_deg", .. })
        ));

        let params = CalibrationParams {
            elevation_m: Some(0.0),
            ..sensor_params()
        };
        assert!(matches!(
            build("cam", &params),
            Err(CalibrationLoadError::InvalidValue { field: "elevation_m", .. })
        ));
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let path = Path::new("/nonexistent/geomapper/cam.yaml");
        let err = load("cam", CalibrationSource::File(path)).unwrap_err();
        assert!(matches!(err, CalibrationLoadError::Unreadable { .. }));
    }

    #[test]
    fn test_json_file_is_parsed() {
        let path = std::env::temp_dir().join(format!("geomapper-calib-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"focallength_mm": 4.0, "sensor_width_mm": 6.4, "sensor_height_mm": 4.8,
                "image_width_px": 1920, "image_height_px": 1440, "elevation_m": 12.5,
                "tilt_deg": 60, "heading_deg": 270, "pos_lat": 48.1, "pos_lon": 11.5,
                "abc_distortion_a": 0.001}"#,
        )
        .unwrap();

        let calibration = load("cam", CalibrationSource::File(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(calibration.extrinsics.elevation_m, 12.5);
        assert_eq!(calibration.extrinsics.heading_deg, 270.0);
        assert_eq!(calibration.distortion.a, 0.001);
    }

    #[test]
    fn test_garbage_file_is_malformed() {
        let path = std::env::temp_dir().join(format!("geomapper-garbage-{}.yaml", std::process::id()));
        std::fs::write(&path, "elevation_m: [not, a, number]").unwrap();
        let err = load("cam", CalibrationSource::File(&path)).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, CalibrationLoadError::Malformed { .. }));
    }
}
