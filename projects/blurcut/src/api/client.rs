//! HTTP client for the face-blur service.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::multipart;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::api::types::{
    EditsResponse, JobCreated, JobResults, JobStatusResponse, TrackedObject, UploadResponse,
};
use crate::error::ClientError;

/// File extensions the service accepts. Checked client-side so a rejected
/// file never costs an upload round-trip.
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["mp4", "avi", "mov"];

/// Async wrapper over the service endpoints. One instance is shared by
/// upload, polling and edit submission; reqwest pools the connections.
#[derive(Debug, Clone)]
pub struct FaceBlurApi {
    base_url: String,
    http: reqwest::Client,
}

impl FaceBlurApi {
    pub fn new(base_url: &str) -> Self {
        FaceBlurApi {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Uploads a video and returns the metadata the server probed from it.
    /// Those values are authoritative for every later frame computation.
    pub async fn upload_video(&self, path: &Path) -> Result<UploadResponse, ClientError> {
        check_extension(path)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.mp4".to_string());
        let bytes = tokio::fs::read(path).await?;
        info!("uploading {} ({} bytes)", file_name, bytes.len());

        let part = multipart::Part::bytes(bytes).file_name(file_name);
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(self.url("/videos/"))
            .multipart(form)
            .send()
            .await?;
        parse_response(response).await
    }

    /// Starts a detection job for an uploaded video.
    pub async fn create_job(&self, video_id: i64) -> Result<JobCreated, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/videos/{video_id}/jobs")))
            .send()
            .await?;
        parse_response(response).await
    }

    /// One status poll.
    pub async fn job_status(&self, job_id: i64) -> Result<JobStatusResponse, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/jobs/{job_id}/status")))
            .send()
            .await?;
        parse_response(response).await
    }

    /// Fetches the full detection payload of a finished job.
    pub async fn job_results(&self, job_id: i64) -> Result<JobResults, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/jobs/{job_id}/results")))
            .send()
            .await?;
        parse_response(response).await
    }

    /// Pushes the current track array back to the server. The body is the
    /// bare array, not an envelope.
    pub async fn submit_edits(
        &self,
        job_id: i64,
        objects: &[TrackedObject],
    ) -> Result<EditsResponse, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/jobs/{job_id}/edits")))
            .json(&objects)
            .send()
            .await?;
        parse_response(response).await
    }

    /// Asks the server to render the final blurred video.
    pub async fn start_export(&self, job_id: i64) -> Result<ExportStarted, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/jobs/{job_id}/export")))
            .send()
            .await?;
        parse_response(response).await
    }

    /// Downloads the rendered video into `dir`. The file name comes from
    /// Content-Disposition when present, otherwise it is synthesized from
    /// the job id. Returns the path written.
    pub async fn download_result(&self, job_id: i64, dir: &Path) -> Result<PathBuf, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/jobs/{job_id}/download")))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let file_name = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_filename)
            .unwrap_or_else(|| format!("blurred_{job_id}.mp4"));
        let dest = dir.join(file_name);

        write_body_to_file(response, &dest).await?;
        info!("downloaded result to {}", dest.display());
        Ok(dest)
    }

    /// Fetches an in-progress preview frame. `preview_url` may be absolute
    /// or a path relative to the service root.
    pub async fn fetch_preview(&self, preview_url: &str, dest: &Path) -> Result<(), ClientError> {
        let url = if preview_url.starts_with("http://") || preview_url.starts_with("https://") {
            preview_url.to_string()
        } else if preview_url.starts_with('/') {
            self.url(preview_url)
        } else {
            self.url(&format!("/{preview_url}"))
        };
        debug!("fetching preview from {url}");

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }
        write_body_to_file(response, dest).await
    }
}

/// Acknowledgement for an export request. Some server revisions hand back
/// a dedicated render job id, others re-use the detection job.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ExportStarted {
    #[serde(default)]
    pub job_id: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Client-side gate on the upload path. Case-insensitive on the extension.
pub fn check_extension(path: &Path) -> Result<(), ClientError> {
    let allowed = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| ALLOWED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if allowed {
        Ok(())
    } else {
        Err(ClientError::InputRejected(path.display().to_string()))
    }
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<T>().await?)
}

async fn write_body_to_file(response: reqwest::Response, dest: &Path) -> Result<(), ClientError> {
    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}

/// Extracts the filename from a Content-Disposition header value.
fn disposition_filename(value: &str) -> Option<String> {
    let marker = "filename=";
    let idx = value.find(marker)?;
    let raw = value[idx + marker.len()..].trim();
    let raw = raw.split(';').next()?.trim();
    let name = raw.trim_matches('"').trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{FrameRange, TrackMeta};
    use axum::extract::State;
    use axum::http::header;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_check_extension_accepts_supported_types() {
        for name in ["clip.mp4", "clip.avi", "clip.mov", "CLIP.MP4", "a.b.MoV"] {
            assert!(check_extension(Path::new(name)).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_check_extension_rejects_everything_else() {
        for name in ["clip.mkv", "clip.webm", "clip", "clip.mp4.txt", ".mp4"] {
            let err = check_extension(Path::new(name)).unwrap_err();
            assert!(
                matches!(err, ClientError::InputRejected(_)),
                "{name} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_disposition_filename_variants() {
        // 1. quoted
        assert_eq!(
            disposition_filename("attachment; filename=\"out.mp4\""),
            Some("out.mp4".to_string())
        );
        // 2. bare
        assert_eq!(
            disposition_filename("attachment; filename=out.mp4"),
            Some("out.mp4".to_string())
        );
        // 3. trailing parameters after the name
        assert_eq!(
            disposition_filename("attachment; filename=out.mp4; size=12"),
            Some("out.mp4".to_string())
        );
        // 4. missing entirely
        assert_eq!(disposition_filename("attachment"), None);
        assert_eq!(disposition_filename("attachment; filename=\"\""), None);
    }

    #[test]
    fn test_base_url_trailing_slash_normalized() {
        let api = FaceBlurApi::new("http://localhost:8000/");
        assert_eq!(api.url("/videos/"), "http://localhost:8000/videos/");
        let api = FaceBlurApi::new("http://localhost:8000");
        assert_eq!(api.url("/jobs/3/status"), "http://localhost:8000/jobs/3/status");
    }

    type SeenEdits = Arc<Mutex<Option<serde_json::Value>>>;

    async fn upload_handler() -> Json<serde_json::Value> {
        Json(serde_json::json!({
            "video_id": 12, "fps": 25.0, "duration": 20.0,
            "total_frames": 500, "width": 1280, "height": 720, "size_mb": 1.4
        }))
    }

    async fn edits_handler(
        State(seen): State<SeenEdits>,
        Json(body): Json<serde_json::Value>,
    ) -> Json<serde_json::Value> {
        *seen.lock().unwrap() = Some(body);
        Json(serde_json::json!({"message": "edits saved"}))
    }

    async fn export_handler() -> Json<serde_json::Value> {
        Json(serde_json::json!({"job_id": 77, "message": "render queued"}))
    }

    async fn download_handler() -> impl axum::response::IntoResponse {
        (
            [(header::CONTENT_DISPOSITION, "attachment; filename=\"clean.mp4\"")],
            b"mp4bytes".as_slice(),
        )
    }

    async fn spawn_service(seen: SeenEdits) -> String {
        let app = Router::new()
            .route("/videos/", post(upload_handler))
            .route("/jobs/:id/edits", post(edits_handler))
            .route("/jobs/:id/export", post(export_handler))
            .route("/jobs/:id/download", get(download_handler))
            .with_state(seen);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_client_flow_against_stub_service() {
        let seen = SeenEdits::default();
        let url = spawn_service(seen.clone()).await;
        let api = FaceBlurApi::new(&url);
        let dir = tempfile::tempdir().unwrap();

        // 1. upload goes out as multipart and the probed metadata comes back
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&clip, b"not really a video").unwrap();
        let uploaded = api.upload_video(&clip).await.unwrap();
        assert_eq!(uploaded.video_id, 12);
        assert_eq!(uploaded.total_frames, 500);
        assert_eq!(uploaded.width, 1280);

        // 2. edits go out as the bare track array, no envelope
        let objects = vec![TrackedObject {
            id: "3".to_string(),
            label: "Face 1".to_string(),
            meta: TrackMeta { blur: false },
            ranges: vec![FrameRange { start: 10, end: 20 }],
        }];
        api.submit_edits(9, &objects).await.unwrap();
        let body = seen.lock().unwrap().clone().unwrap();
        assert!(body.is_array());
        assert_eq!(body[0]["id"], "3");
        assert_eq!(body[0]["meta"]["blur"], false);
        assert_eq!(body[0]["ranges"][0]["start"], 10);

        // 3. the export ack carries the render job id
        let started = api.start_export(9).await.unwrap();
        assert_eq!(started.job_id, Some(77));

        // 4. the download lands under the Content-Disposition name
        let saved = api.download_result(77, dir.path()).await.unwrap();
        assert_eq!(saved.file_name().unwrap().to_str().unwrap(), "clean.mp4");
        assert_eq!(std::fs::read(&saved).unwrap(), b"mp4bytes");
    }
}
