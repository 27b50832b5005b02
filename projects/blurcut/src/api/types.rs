//! Wire types for the face-blur service.
//!
//! The service stores per-frame boxes, track `meta` and track `ranges` as
//! JSON-encoded strings in its database and, depending on revision, returns
//! them either re-encoded inline or still as strings. Decoding here accepts
//! both shapes so the client keeps working across server versions.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

/// Metadata returned by the upload endpoint after the server has probed
/// the file. All values are authoritative; the client never re-probes.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub video_id: i64,
    pub fps: f64,
    pub total_frames: usize,
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub size_mb: f64,
    #[serde(default)]
    pub filename_original: Option<String>,
}

/// Acknowledgement for a newly created processing job.
#[derive(Debug, Clone, Deserialize)]
pub struct JobCreated {
    pub job_id: i64,
    #[serde(default)]
    pub progress: f64,
}

/// One status poll of a running job.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusResponse {
    pub status: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Job lifecycle states the status endpoint is allowed to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Queued,
    Running,
    Rendering,
    Completed,
    Done,
    Failed,
}

impl JobState {
    /// Strict parse. Anything outside the documented vocabulary is `None`
    /// and callers must treat it as a failure, not keep polling.
    pub fn parse(status: &str) -> Option<JobState> {
        match status {
            "pending" => Some(JobState::Pending),
            "queued" => Some(JobState::Queued),
            "running" => Some(JobState::Running),
            "rendering" => Some(JobState::Rendering),
            "completed" => Some(JobState::Completed),
            "done" => Some(JobState::Done),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, JobState::Completed | JobState::Done)
    }

    pub fn is_terminal(self) -> bool {
        self.is_success() || self == JobState::Failed
    }
}

/// One detected face box on one frame, in original video pixel units
/// with the origin at the top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(deserialize_with = "de_flexible_id")]
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// Inclusive frame interval in which a track is considered present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: usize,
    pub end: usize,
}

impl FrameRange {
    pub fn contains(&self, frame: usize) -> bool {
        self.start <= frame && frame <= self.end
    }
}

/// Per-track flags. The server seeds every new track with `blur: true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMeta {
    #[serde(default = "default_blur")]
    pub blur: bool,
}

impl Default for TrackMeta {
    fn default() -> Self {
        TrackMeta { blur: true }
    }
}

fn default_blur() -> bool {
    true
}

/// One tracked face with its user-editable review state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    #[serde(deserialize_with = "de_flexible_id")]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, deserialize_with = "de_maybe_encoded")]
    pub meta: TrackMeta,
    #[serde(default, deserialize_with = "de_maybe_encoded")]
    pub ranges: Vec<FrameRange>,
}

/// Full detection payload for a finished job.
#[derive(Debug, Clone, Deserialize)]
pub struct JobResults {
    #[serde(default, deserialize_with = "de_frame_log")]
    pub detection_log: Vec<Vec<BoundingBox>>,
    #[serde(default)]
    pub objects: Vec<TrackedObject>,
}

/// Acknowledgement for submitted track edits.
#[derive(Debug, Clone, Deserialize)]
pub struct EditsResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Track ids arrive as integers from the tracker but as strings once a
/// track has been round-tripped through an edit. Normalize to strings.
fn de_flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Num(i64),
        Text(String),
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::Num(n) => n.to_string(),
        Repr::Text(s) => s,
    })
}

/// Accepts either a value or a JSON-encoded string holding that value.
fn de_maybe_encoded<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: DeserializeOwned,
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr<T> {
        Plain(T),
        Encoded(String),
    }

    match Repr::<T>::deserialize(deserializer)? {
        Repr::Plain(value) => Ok(value),
        Repr::Encoded(text) => serde_json::from_str(&text).map_err(de::Error::custom),
    }
}

/// The detection log is an array indexed by frame; each entry is a box
/// list, itself possibly string-encoded.
fn de_frame_log<'de, D>(deserializer: D) -> Result<Vec<Vec<BoundingBox>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Entry {
        Plain(Vec<BoundingBox>),
        Encoded(String),
    }

    let entries = Vec::<Entry>::deserialize(deserializer)?;
    entries
        .into_iter()
        .map(|entry| match entry {
            Entry::Plain(boxes) => Ok(boxes),
            Entry::Encoded(text) => serde_json::from_str(&text).map_err(de::Error::custom),
        })
        .collect()
}
