use thiserror::Error;

/// Raised while building camera models and mapping areas. Always fatal at startup.
#[derive(Error, Debug)]
pub enum CalibrationLoadError {
    #[error("Camera {stream_id}: calibration source {path} could not be read: {source}")]
    Unreadable {
        stream_id: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Camera {stream_id}: calibration could not be parsed: {reason}")]
    Malformed { stream_id: String, reason: String },

    #[error("Camera {0}: no calibration source configured")]
    MissingSource(String),

    #[error("Camera {stream_id}: missing required field `{field}`")]
    MissingField { stream_id: String, field: &'static str },

    #[error("Camera {0}: needs either focallength_mm with sensor dimensions or view_x_deg/view_y_deg")]
    MissingIntrinsics(String),

    #[error("Camera {stream_id}: invalid value for `{field}`: {value}")]
    InvalidValue {
        stream_id: String,
        field: &'static str,
        value: f64,
    },

    #[error("Camera {stream_id}: invalid mapping area: {reason}")]
    InvalidMappingArea { stream_id: String, reason: String },
}

/// A pixel whose viewing ray never reaches the target plane.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("Ray through pixel ({x:.1}, {y:.1}) does not descend (vertical component {vertical:.4})")]
    RayNotDescending { x: f64, y: f64, vertical: f64 },

    #[error("Target plane at {plane_m} m is not below the camera at {elevation_m} m")]
    PlaneNotBelowCamera { plane_m: f64, elevation_m: f64 },

    #[error("Lens model could not be inverted at pixel ({x:.1}, {y:.1})")]
    Undistortion { x: f64, y: f64 },
}

#[derive(Error, Debug)]
pub enum GeoMapperError {
    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationLoadError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Messaging error: {0}")]
    MessagingError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<redis::RedisError> for GeoMapperError {
    fn from(error: redis::RedisError) -> Self {
        GeoMapperError::MessagingError(error.to_string())
    }
}

impl From<prometheus::Error> for GeoMapperError {
    fn from(error: prometheus::Error) -> Self {
        GeoMapperError::MetricsError(error.to_string())
    }
}

impl From<config::ConfigError> for GeoMapperError {
    fn from(error: config::ConfigError) -> Self {
        GeoMapperError::ConfigError(error.to_string())
    }
}

impl From<validator::ValidationErrors> for GeoMapperError {
    fn from(error: validator::ValidationErrors) -> Self {
        GeoMapperError::ConfigError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GeoMapperError>;
