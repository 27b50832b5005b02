//! On-disk workspace for review sessions.
//!
//! Each upload creates one directory under the workdir holding the session
//! state, the fetched detections, the evolving track edits and any images
//! the compositor produces. Commands that do not name a session operate on
//! the most recently created one.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use walkdir::WalkDir;

use crate::api::types::{BoundingBox, TrackedObject};
use crate::editor::store::{DetectionStore, VideoDescriptor};
use crate::error::ClientError;

const STATE_FILE: &str = "session.json";
const DETECTIONS_FILE: &str = "detections.json";
const TRACKS_FILE: &str = "tracks.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub source_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub video_id: i64,
    pub job_id: Option<i64>,
    pub export_job_id: Option<i64>,
    pub video: VideoDescriptor,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub dir: PathBuf,
    pub state: SessionState,
}

impl Session {
    /// Creates the workspace for a freshly uploaded video.
    pub fn create(
        workdir: &Path,
        source_path: &Path,
        video_id: i64,
        video: VideoDescriptor,
    ) -> Result<Session, ClientError> {
        let stem = source_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("video");
        let dir_name = format!("{}_{}", stem, Utc::now().format("%Y%m%d_%H%M%S"));

        fs::create_dir_all(workdir)?;
        let dir = workdir.join(dir_name);
        fs::create_dir(&dir)?;
        for sub in ["previews", "renders", "downloads"] {
            fs::create_dir_all(dir.join(sub))?;
        }

        let session = Session {
            dir,
            state: SessionState {
                source_path: source_path.to_path_buf(),
                created_at: Utc::now(),
                video_id,
                job_id: None,
                export_job_id: None,
                video,
            },
        };
        session.save_state()?;
        info!("created session at {}", session.dir.display());
        Ok(session)
    }

    /// Opens the newest session under the workdir.
    pub fn load_latest(workdir: &Path) -> Result<Session, ClientError> {
        let mut sessions = list_sessions(workdir)?;
        sessions
            .pop()
            .ok_or_else(|| ClientError::NoSession(workdir.display().to_string()))
    }

    pub fn save_state(&self) -> Result<(), ClientError> {
        let content = serde_json::to_string_pretty(&self.state)?;
        fs::write(self.dir.join(STATE_FILE), content)?;
        Ok(())
    }

    /// Records the analysis job and persists immediately, so an interrupted
    /// poll can resume from `status` later.
    pub fn set_job(&mut self, job_id: i64) -> Result<(), ClientError> {
        self.state.job_id = Some(job_id);
        self.save_state()
    }

    pub fn set_export_job(&mut self, job_id: i64) -> Result<(), ClientError> {
        self.state.export_job_id = Some(job_id);
        self.save_state()
    }

    pub fn require_job(&self) -> Result<i64, ClientError> {
        self.state.job_id.ok_or(ClientError::MissingJobId)
    }

    pub fn previews_dir(&self) -> PathBuf {
        self.dir.join("previews")
    }

    pub fn renders_dir(&self) -> PathBuf {
        self.dir.join("renders")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.dir.join("downloads")
    }

    /// Persists the detection log once, after analysis completes.
    pub fn save_detections(&self, log: &[Vec<BoundingBox>]) -> Result<(), ClientError> {
        let content = serde_json::to_string(log)?;
        fs::write(self.dir.join(DETECTIONS_FILE), content)?;
        Ok(())
    }

    /// Persists the track array; called after every edit command.
    pub fn save_tracks(&self, objects: &[TrackedObject]) -> Result<(), ClientError> {
        let content = serde_json::to_string_pretty(objects)?;
        fs::write(self.dir.join(TRACKS_FILE), content)?;
        Ok(())
    }

    pub fn has_results(&self) -> bool {
        self.dir.join(DETECTIONS_FILE).exists() && self.dir.join(TRACKS_FILE).exists()
    }

    /// Rebuilds the detection store from the persisted session files.
    pub fn load_store(&self) -> Result<DetectionStore, ClientError> {
        if !self.has_results() {
            return Err(ClientError::NoResults);
        }
        let log: Vec<Vec<BoundingBox>> =
            serde_json::from_str(&fs::read_to_string(self.dir.join(DETECTIONS_FILE))?)?;
        let objects: Vec<TrackedObject> =
            serde_json::from_str(&fs::read_to_string(self.dir.join(TRACKS_FILE))?)?;
        Ok(DetectionStore::from_parts(log, objects))
    }
}

/// All sessions under the workdir, oldest first.
pub fn list_sessions(workdir: &Path) -> Result<Vec<Session>, ClientError> {
    let mut sessions = Vec::new();
    if !workdir.exists() {
        return Ok(sessions);
    }

    for entry in WalkDir::new(workdir)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_file() && entry.file_name() == STATE_FILE {
            let content = fs::read_to_string(entry.path())?;
            let state: SessionState = serde_json::from_str(&content)?;
            let dir = entry
                .path()
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            sessions.push(Session { dir, state });
        }
    }

    sessions.sort_by_key(|s| s.state.created_at);
    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{FrameRange, TrackMeta};
    use chrono::Duration;

    fn descriptor() -> VideoDescriptor {
        VideoDescriptor {
            fps: 25.0,
            total_frames: 500,
            width: 1280,
            height: 720,
            duration: 20.0,
        }
    }

    #[test]
    fn test_create_and_reload_session() {
        let workdir = tempfile::tempdir().unwrap();
        let mut session = Session::create(
            workdir.path(),
            Path::new("/videos/interview.mp4"),
            42,
            descriptor(),
        )
        .unwrap();
        session.set_job(7).unwrap();

        let loaded = Session::load_latest(workdir.path()).unwrap();
        assert_eq!(loaded.state.video_id, 42);
        assert_eq!(loaded.state.job_id, Some(7));
        assert_eq!(loaded.state.video.total_frames, 500);
        assert!(loaded.previews_dir().is_dir());
        assert!(loaded.renders_dir().is_dir());
        assert!(loaded.downloads_dir().is_dir());
    }

    #[test]
    fn test_load_latest_picks_newest() {
        let workdir = tempfile::tempdir().unwrap();
        let older =
            Session::create(workdir.path(), Path::new("first.mp4"), 1, descriptor()).unwrap();
        let mut newer =
            Session::create(workdir.path(), Path::new("second.mp4"), 2, descriptor()).unwrap();
        // session dirs can share a creation second; order by recorded time
        newer.state.created_at = older.state.created_at + Duration::seconds(5);
        newer.save_state().unwrap();

        let latest = Session::load_latest(workdir.path()).unwrap();
        assert_eq!(latest.state.video_id, 2);
        assert_eq!(list_sessions(workdir.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_load_latest_without_sessions() {
        let workdir = tempfile::tempdir().unwrap();
        let err = Session::load_latest(workdir.path()).unwrap_err();
        assert!(matches!(err, ClientError::NoSession(_)));
        // missing workdir behaves the same as an empty one
        let err = Session::load_latest(&workdir.path().join("nope")).unwrap_err();
        assert!(matches!(err, ClientError::NoSession(_)));
    }

    #[test]
    fn test_store_roundtrip_through_files() {
        let workdir = tempfile::tempdir().unwrap();
        let session =
            Session::create(workdir.path(), Path::new("clip.mov"), 3, descriptor()).unwrap();

        let err = session.load_store().unwrap_err();
        assert!(matches!(err, ClientError::NoResults));

        let log = vec![vec![BoundingBox {
            id: "1".into(),
            x: 5.0,
            y: 6.0,
            w: 7.0,
            h: 8.0,
        }]];
        let tracks = vec![TrackedObject {
            id: "1".into(),
            label: "Face 1".into(),
            meta: TrackMeta { blur: false },
            ranges: vec![FrameRange { start: 3, end: 9 }],
        }];
        session.save_detections(&log).unwrap();
        session.save_tracks(&tracks).unwrap();

        let store = session.load_store().unwrap();
        assert_eq!(store.boxes_at(0).len(), 1);
        assert!(!store.object_by_id("1").unwrap().meta.blur);
        assert_eq!(
            store.ranges_of("1").unwrap(),
            &[FrameRange { start: 3, end: 9 }]
        );
    }

    #[test]
    fn test_require_job() {
        let workdir = tempfile::tempdir().unwrap();
        let mut session =
            Session::create(workdir.path(), Path::new("clip.avi"), 9, descriptor()).unwrap();
        assert!(matches!(
            session.require_job().unwrap_err(),
            ClientError::MissingJobId
        ));
        session.set_job(11).unwrap();
        assert_eq!(session.require_job().unwrap(), 11);
    }
}
