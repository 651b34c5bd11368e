use std::collections::HashMap;
use std::sync::Arc;

use geomapper_common::{codec, CodecError, GeoCoordinate, SaeMessage, TrackletsByCamera};
use tracing::{debug, instrument, warn};

use crate::{
    area_filter::{AreaFilter, MappingArea},
    calibration::{self, CalibrationSource, CameraCalibration, CameraMode},
    config::GeoMapperConfig,
    error::{CalibrationLoadError, Result},
    metrics::Metrics,
    projector,
};

/// Everything the mapper knows about one configured camera.
#[derive(Debug, Clone)]
pub struct CameraEntry {
    pub mode: CameraMode,
    pub remove_unmapped_detections: bool,
}

/// Outcome for the latest snapshot of one tracklet.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Placement {
    Mapped(GeoCoordinate),
    OutsideArea,
    Unprojectable,
}

/// Annotates scene messages with ground coordinates.
///
/// Camera models and mapping areas are fixed at construction; `process` only reads them, so one
/// instance can be shared by any number of workers.
pub struct GeoMapper {
    cameras: HashMap<String, CameraEntry>,
    area_filter: AreaFilter,
    object_center_elevation_m: f64,
    metrics: Arc<Metrics>,
}

impl GeoMapper {
    pub fn new(
        cameras: HashMap<String, CameraEntry>,
        area_filter: AreaFilter,
        object_center_elevation_m: f64,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cameras,
            area_filter,
            object_center_elevation_m,
            metrics,
        }
    }

    /// Loads every camera of the configuration. Any calibration or mapping-area problem is fatal.
    pub fn from_config(config: &GeoMapperConfig, metrics: Arc<Metrics>) -> Result<Self> {
        let mut cameras = HashMap::new();
        let mut area_filter = AreaFilter::new();

        for cam_conf in &config.cameras {
            let mode = if cam_conf.passthrough {
                debug!("Camera {} configured as passthrough", cam_conf.stream_id);
                CameraMode::Passthrough
            } else {
                let source = match (&cam_conf.calibration, &cam_conf.cam_config_path) {
                    (Some(params), _) => CalibrationSource::Inline(params),
                    (None, Some(path)) => CalibrationSource::File(path.as_path()),
                    (None, None) => {
                        return Err(CalibrationLoadError::MissingSource(cam_conf.stream_id.clone()).into())
                    }
                };
                CameraMode::Calibrated(calibration::load(&cam_conf.stream_id, source)?)
            };

            if let Some(vertices) = &cam_conf.mapping_area {
                area_filter.insert(
                    cam_conf.stream_id.clone(),
                    MappingArea::new(&cam_conf.stream_id, vertices)?,
                );
            }

            cameras.insert(
                cam_conf.stream_id.clone(),
                CameraEntry {
                    mode,
                    remove_unmapped_detections: cam_conf.remove_unmapped_detections,
                },
            );
        }

        Ok(Self::new(
            cameras,
            area_filter,
            config.object_center_elevation_m,
            metrics,
        ))
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Byte-level entry point: decode, annotate, encode.
    ///
    /// Messages from unknown or passthrough cameras are returned as the exact input bytes.
    pub fn get(&self, input: &[u8]) -> std::result::Result<Vec<u8>, CodecError> {
        let _timer = self.metrics.get_duration.start_timer();

        let message = {
            let _timer = self.metrics.deserialization_duration.start_timer();
            codec::decode(input).map_err(|e| {
                self.metrics.rejected_messages.inc();
                e
            })?
        };

        if self.calibration_for(message.source_id()).is_none() {
            return Ok(input.to_vec());
        }

        let message = self.process(message);

        let _timer = self.metrics.serialization_duration.start_timer();
        codec::encode(&message)
    }

    /// Annotates the latest snapshot of every tracklet seen by the message's source camera.
    #[instrument(skip(self, message), fields(source_id = %message.frame.source_id), level = "debug")]
    pub fn process(&self, mut message: SaeMessage) -> SaeMessage {
        let cam_id = message.frame.source_id.clone();

        // Unknown and passthrough cameras leave before any calibration value is touched
        let Some(entry) = self.cameras.get(&cam_id) else {
            debug!("No camera configured for {}, passing through", cam_id);
            return message;
        };
        let calibration = match &entry.mode {
            CameraMode::Passthrough => return message,
            CameraMode::Calibrated(calibration) => calibration,
        };

        let Some(tracklets) = message.trajectory.cameras.get_mut(&cam_id) else {
            return message;
        };

        let _timer = self.metrics.transform_duration.start_timer();
        self.annotate(&cam_id, calibration, entry.remove_unmapped_detections, tracklets);

        message
    }

    fn calibration_for(&self, cam_id: &str) -> Option<&CameraCalibration> {
        match self.cameras.get(cam_id).map(|entry| &entry.mode) {
            Some(CameraMode::Calibrated(calibration)) => Some(calibration),
            _ => None,
        }
    }

    fn annotate(
        &self,
        cam_id: &str,
        calibration: &CameraCalibration,
        remove_unmapped: bool,
        tracklets: &mut TrackletsByCamera,
    ) {
        for (track_id, tracklet) in tracklets.tracklets.iter_mut() {
            let Some(detection) = tracklet.latest_mut() else {
                continue;
            };

            let placement = self.place(cam_id, calibration, &detection.bounding_box, track_id);
            match placement {
                Placement::Mapped(coordinate) => {
                    detection.geo_coordinate = Some(coordinate);
                    self.metrics.object_counter.inc();
                    continue;
                }
                Placement::OutsideArea => {
                    debug!(
                        "SKIPPED: cls {}, oid {}, track {}",
                        detection.class_id,
                        detection.object_id.simple(),
                        track_id
                    );
                }
                Placement::Unprojectable => {}
            }

            if remove_unmapped {
                tracklet.detections_info.pop();
            }
        }
    }

    fn place(
        &self,
        cam_id: &str,
        calibration: &CameraCalibration,
        bbox: &geomapper_common::BoundingBox,
        track_id: &str,
    ) -> Placement {
        let (x, y) = bbox.pixel_center(
            calibration.intrinsics.image_width_px,
            calibration.intrinsics.image_height_px,
        );

        let point = match projector::project(calibration, x, y, self.object_center_elevation_m) {
            Ok(point) => point,
            Err(e) => {
                self.metrics.projection_failures.inc();
                warn!("Camera {}, track {}: {}", cam_id, track_id, e);
                return Placement::Unprojectable;
            }
        };

        if !self.area_filter.contains(cam_id, point.lat, point.lon) {
            self.metrics.filtered_detections.inc();
            debug!(
                "Camera {}, track {}: ({:.7}, {:.7}) outside mapping area",
                cam_id, track_id, point.lat, point.lon
            );
            return Placement::OutsideArea;
        }

        Placement::Mapped(GeoCoordinate {
            latitude: point.lat,
            longitude: point.lon,
        })
    }
}
