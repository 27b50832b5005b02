//! In-memory holder for everything the review of one video works on.

use serde::{Deserialize, Serialize};

use crate::api::types::{BoundingBox, FrameRange, JobResults, TrackedObject};

/// Immutable per-session description of the loaded video. Values come from
/// the server's probe at upload time and are never re-derived locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoDescriptor {
    pub fps: f64,
    pub total_frames: usize,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
}

/// Owns the detection log and the tracked objects for one review session.
///
/// The log is immutable once loaded; objects are mutated through the
/// editing operations below and through the range drag machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionStore {
    log: Vec<Vec<BoundingBox>>,
    objects: Vec<TrackedObject>,
}

impl DetectionStore {
    /// Builds the store from a finished job's payload. Empty labels get a
    /// positional placeholder and ranges are clamped into the frame domain.
    /// Ranges keep their order and overlaps.
    pub fn from_results(results: JobResults, total_frames: usize) -> DetectionStore {
        let mut objects = results.objects;
        for (idx, obj) in objects.iter_mut().enumerate() {
            if obj.label.trim().is_empty() {
                obj.label = format!("Face {}", idx + 1);
            }
            for range in &mut obj.ranges {
                range.start = range.start.min(total_frames);
                range.end = range.end.clamp(range.start, total_frames);
            }
        }

        DetectionStore {
            log: results.detection_log,
            objects,
        }
    }

    pub fn from_parts(log: Vec<Vec<BoundingBox>>, objects: Vec<TrackedObject>) -> DetectionStore {
        DetectionStore { log, objects }
    }

    /// Boxes detected on `frame`. Frames beyond the recorded log are
    /// simply "no detections", never an error.
    pub fn boxes_at(&self, frame: usize) -> &[BoundingBox] {
        self.log.get(frame).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn frame_count(&self) -> usize {
        self.log.len()
    }

    pub fn log(&self) -> &[Vec<BoundingBox>] {
        &self.log
    }

    pub fn objects(&self) -> &[TrackedObject] {
        &self.objects
    }

    pub fn object_by_id(&self, id: &str) -> Option<&TrackedObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn object_by_id_mut(&mut self, id: &str) -> Option<&mut TrackedObject> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    /// Flips the blur flag; returns the new value, or None for an unknown id.
    pub fn toggle_blur(&mut self, id: &str) -> Option<bool> {
        let obj = self.object_by_id_mut(id)?;
        obj.meta.blur = !obj.meta.blur;
        Some(obj.meta.blur)
    }

    pub fn set_blur(&mut self, id: &str, blur: bool) -> bool {
        match self.object_by_id_mut(id) {
            Some(obj) => {
                obj.meta.blur = blur;
                true
            }
            None => false,
        }
    }

    pub fn set_label(&mut self, id: &str, label: &str) -> bool {
        match self.object_by_id_mut(id) {
            Some(obj) => {
                obj.label = label.to_string();
                true
            }
            None => false,
        }
    }

    pub fn ranges_of(&self, id: &str) -> Option<&[FrameRange]> {
        self.object_by_id(id).map(|o| o.ranges.as_slice())
    }
}
