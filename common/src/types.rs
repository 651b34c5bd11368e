use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Bounding box in normalized image coordinates, each component in `[0, 1]`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl BoundingBox {
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self { min_x, max_x, min_y, max_y }
    }

    /// Center of the box in pixels for an image of the given size.
    pub fn pixel_center(&self, image_width_px: f64, image_height_px: f64) -> (f64, f64) {
        (
            (self.min_x as f64 + self.max_x as f64) * image_width_px / 2.0,
            (self.min_y as f64 + self.max_y as f64) * image_height_px / 2.0,
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub confidence: f32,
    pub class_id: u32,
    pub object_id: Uuid,
    /// Unset until the detection has been mapped onto the ground plane.
    pub geo_coordinate: Option<GeoCoordinate>,
}

impl Detection {
    pub fn new(bounding_box: BoundingBox, class_id: u32, object_id: Uuid) -> Self {
        Self {
            bounding_box,
            confidence: 1.0,
            class_id,
            object_id,
            geo_coordinate: None,
        }
    }
}

/// History of one tracked object, oldest snapshot first.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Tracklet {
    pub detections_info: Vec<Detection>,
}

impl Tracklet {
    pub fn latest_mut(&mut self) -> Option<&mut Detection> {
        self.detections_info.last_mut()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct TrackletsByCamera {
    pub tracklets: BTreeMap<String, Tracklet>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Trajectory {
    pub cameras: BTreeMap<String, TrackletsByCamera>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct VideoFrame {
    pub source_id: String,
    pub timestamp_utc_ms: u64,
    pub frame_width_px: u32,
    pub frame_height_px: u32,
}

/// Scene message exchanged between the pipeline stages.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct SaeMessage {
    pub frame: VideoFrame,
    pub trajectory: Trajectory,
}

impl SaeMessage {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            frame: VideoFrame {
                source_id: source_id.into(),
                ..Default::default()
            },
            trajectory: Trajectory::default(),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.frame.source_id
    }

    /// Appends a snapshot to the given tracklet of the given camera, creating both as needed.
    pub fn push_detection(&mut self, camera_id: &str, track_id: &str, detection: Detection) {
        self.trajectory
            .cameras
            .entry(camera_id.to_string())
            .or_default()
            .tracklets
            .entry(track_id.to_string())
            .or_default()
            .detections_info
            .push(detection);
    }

    pub fn tracklet(&self, camera_id: &str, track_id: &str) -> Option<&Tracklet> {
        self.trajectory
            .cameras
            .get(camera_id)
            .and_then(|camera| camera.tracklets.get(track_id))
    }
}
