//! Ground-plane geolocation of tracked detections.
//!
//! [`GeoMapper`] takes scene messages from calibrated cameras and writes a latitude/longitude onto
//! the latest snapshot of every tracklet, optionally restricted to a per-camera mapping area.

pub mod area_filter;
pub mod calibration;
pub mod config;
pub mod error;
pub mod mapper;
pub mod messaging;
pub mod metrics;
pub mod projector;
pub mod worker;

pub use area_filter::{AreaFilter, MappingArea};
pub use calibration::{CameraCalibration, CameraMode};
pub use config::GeoMapperConfig;
pub use error::{CalibrationLoadError, GeoMapperError, ProjectionError, Result};
pub use mapper::GeoMapper;
pub use projector::{project, GeodeticPoint};
