use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use validator::Validate;

use crate::calibration::CalibrationParams;
use crate::error::{GeoMapperError, Result};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeoMapperConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
    /// Assumed height above ground of the projected point of every object.
    #[serde(default)]
    pub object_center_elevation_m: f64,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(default)]
pub struct RedisConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    pub input_stream_prefix: String,
    pub output_stream_prefix: String,
    /// Approximate length cap of each output stream.
    pub output_stream_maxlen: usize,
    pub read_block_ms: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
pub struct CameraConfig {
    #[validate(length(min = 1))]
    pub stream_id: String,
    #[serde(default)]
    pub passthrough: bool,
    /// Calibration file (YAML or JSON). Ignored when `calibration` is given inline.
    #[serde(default)]
    pub cam_config_path: Option<PathBuf>,
    #[serde(default)]
    pub calibration: Option<CalibrationParams>,
    /// `[lon, lat]` vertices of the area in which detections are kept.
    #[serde(default)]
    pub mapping_area: Option<Vec<[f64; 2]>>,
    #[serde(default)]
    pub remove_unmapped_detections: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enable_metrics: bool,
    #[validate(range(min = 1))]
    pub metrics_port: u16,
}

fn default_log_level() -> String {
    "WARNING".to_string()
}

impl GeoMapperConfig {
    pub fn validate(&self) -> Result<()> {
        self.redis.validate()?;
        self.monitoring.validate()?;

        let mut seen = HashSet::new();
        for camera in &self.cameras {
            camera.validate()?;
            if !seen.insert(camera.stream_id.as_str()) {
                return Err(GeoMapperError::ConfigError(format!(
                    "Camera {} is configured more than once",
                    camera.stream_id
                )));
            }
        }

        if !self.object_center_elevation_m.is_finite() || self.object_center_elevation_m < 0.0 {
            return Err(GeoMapperError::ConfigError(format!(
                "object_center_elevation_m must be a non-negative number, got {}",
                self.object_center_elevation_m
            )));
        }

        Ok(())
    }

    pub fn input_stream(&self, stream_id: &str) -> String {
        format!("{}:{}", self.redis.input_stream_prefix, stream_id)
    }

    pub fn output_stream(&self, stream_id: &str) -> String {
        format!("{}:{}", self.redis.output_stream_prefix, stream_id)
    }
}

/// Reads the YAML file at `path` and overlays `GEOMAPPER__*` environment variables.
pub fn load_config(path: &str) -> Result<GeoMapperConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(
            config::Environment::with_prefix("GEOMAPPER")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: GeoMapperConfig = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

pub fn parse_yaml(raw: &str) -> Result<GeoMapperConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::from_str(raw, config::FileFormat::Yaml))
        .build()?;

    let config: GeoMapperConfig = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

impl Default for GeoMapperConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            redis: RedisConfig::default(),
            cameras: vec![],
            object_center_elevation_m: 0.0,
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            input_stream_prefix: "objecttracker".to_string(),
            output_stream_prefix: "geomapper".to_string(),
            output_stream_maxlen: 100,
            read_block_ms: 2000,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            metrics_port: 8000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
log_level: DEBUG
object_center_elevation_m: 0.9
redis:
  host: redis
  port: 6380
  input_stream_prefix: objecttracker
  output_stream_prefix: geomapper
  output_stream_maxlen: 50
  read_block_ms: 500
cameras:
  - stream_id: stream1
    passthrough: false
    calibration:
      focallength_mm: 4.0
      sensor_width_mm: 6.4
      sensor_height_mm: 4.8
      image_width_px: 1920
      image_height_px: 1440
      elevation_m: 10
      tilt_deg: 45
      heading_deg: 90
      pos_lat: 52.52
      pos_lon: 13.405
    mapping_area:
      - [13.40, 52.51]
      - [13.40, 52.53]
      - [13.41, 52.53]
      - [13.41, 52.51]
    remove_unmapped_detections: true
  - stream_id: stream2
    passthrough: true
"#;

    #[test]
    fn test_parse_sample() {
        let config = parse_yaml(SAMPLE).unwrap();
        assert_eq!(config.log_level, "DEBUG");
        assert_eq!(config.object_center_elevation_m, 0.9);
        assert_eq!(config.redis.port, 6380);
        assert_eq!(config.cameras.len(), 2);

        let cam = &config.cameras[0];
        assert!(cam.remove_unmapped_detections);
        assert_eq!(cam.mapping_area.as_ref().unwrap().len(), 4);
        assert_eq!(cam.calibration.as_ref().unwrap().image_width_px, Some(1920));
        assert!(config.cameras[1].passthrough);
        assert!(config.cameras[1].calibration.is_none());
    }

    #[test]
    fn test_defaults() {
        let config = parse_yaml("redis:\n  read_block_ms: 1000\n").unwrap();
        assert_eq!(config.log_level, "WARNING");
        assert_eq!(config.redis.read_block_ms, 1000);
        assert!(config.cameras.is_empty());
        assert_eq!(config.redis.host, "localhost");
        assert_eq!(config.redis.port, 6379);
        assert_eq!(config.object_center_elevation_m, 0.0);
        assert!(config.monitoring.enable_metrics);
    }

    #[test]
    fn test_stream_names_use_prefixes() {
        let config = GeoMapperConfig::default();
        assert_eq!(config.input_stream("stream1"), "objecttracker:stream1");
        assert_eq!(config.output_stream("stream1"), "geomapper:stream1");
    }

    #[test]
    fn test_duplicate_cameras_rejected() {
        let raw = "cameras:\n  - stream_id: a\n    passthrough: true\n  - stream_id: a\n    passthrough: true\n";
        assert!(matches!(parse_yaml(raw), Err(GeoMapperError::ConfigError(_))));
    }

    #[test]
    fn test_port_zero_rejected() {
        let mut config = GeoMapperConfig::default();
        config.redis.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_metrics_port_zero_rejected() {
        let raw = "monitoring:\n  metrics_port: 0\n";
        assert!(matches!(parse_yaml(raw), Err(GeoMapperError::ConfigError(_))));

        let mut config = GeoMapperConfig::default();
        config.monitoring.metrics_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_stream_id_rejected() {
        let raw = "cameras:\n  - stream_id: ''\n    passthrough: true\n";
        assert!(parse_yaml(raw).is_err());
    }
}
