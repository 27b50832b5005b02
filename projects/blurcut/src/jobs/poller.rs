//! Fixed-interval polling of server-side jobs until a terminal status.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::api::types::{JobState, JobStatusResponse};
use crate::api::FaceBlurApi;
use crate::error::ClientError;

/// The documented service polling cadence.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Starting,
    Polling,
    Completed,
    Failed,
}

/// Receives poll-loop events. The CLI feeds a progress bar and renders
/// preview frames from these; tests record them.
pub trait PollObserver {
    fn on_status(&mut self, _status: &JobStatusResponse) {}
    fn on_preview(&mut self, _path: &Path) {}
}

/// Drives one job to its terminal state.
///
/// Status flow: in-flight statuses keep the loop polling; completed/done
/// resolve it; failed and unknown status strings reject it. A transport
/// error on any single poll rejects too, with no retry, so one lost
/// request fails the watch even when the job itself later succeeds.
/// Fetching results is left to the caller, which does it exactly once
/// after a successful resolve.
pub struct JobPoller {
    api: FaceBlurApi,
    interval: Duration,
    preview_dir: Option<PathBuf>,
    state: PollerState,
}

impl JobPoller {
    pub fn new(api: FaceBlurApi, interval: Duration) -> JobPoller {
        JobPoller {
            api,
            interval,
            preview_dir: None,
            state: PollerState::Starting,
        }
    }

    /// Enables preview capture: while the job runs, any advertised preview
    /// frame is downloaded into `dir` and announced to the observer.
    pub fn with_preview_dir(mut self, dir: PathBuf) -> JobPoller {
        self.preview_dir = Some(dir);
        self
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub async fn run(
        &mut self,
        job_id: i64,
        observer: &mut dyn PollObserver,
    ) -> Result<JobStatusResponse, ClientError> {
        self.state = PollerState::Polling;
        info!("polling job {job_id} every {:?}", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;

            let status = match self.api.job_status(job_id).await {
                Ok(s) => s,
                Err(err) => {
                    self.state = PollerState::Failed;
                    return Err(err);
                }
            };
            observer.on_status(&status);

            match JobState::parse(&status.status) {
                Some(state) if state.is_terminal() => {
                    if state.is_success() {
                        info!("job {job_id} finished: {}", status.status);
                        self.state = PollerState::Completed;
                        return Ok(status);
                    }
                    self.state = PollerState::Failed;
                    return Err(ClientError::JobFailed(status.error_message.clone()));
                }
                Some(_) => {
                    self.capture_preview(&status, observer).await;
                }
                None => {
                    self.state = PollerState::Failed;
                    return Err(ClientError::UnknownJobStatus(status.status.clone()));
                }
            }
        }
    }

    /// Preview frames are cosmetic; a failed fetch never fails the job.
    async fn capture_preview(&self, status: &JobStatusResponse, observer: &mut dyn PollObserver) {
        let (dir, url) = match (&self.preview_dir, &status.preview_url) {
            (Some(dir), Some(url)) => (dir, url),
            _ => return,
        };
        let dest = dir.join("preview.jpg");
        match self.api.fetch_preview(url, &dest).await {
            Ok(()) => observer.on_preview(&dest),
            Err(err) => warn!("preview fetch failed: {err}"),
        }
    }
}
