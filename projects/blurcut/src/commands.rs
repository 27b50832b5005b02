//! One function per CLI subcommand, plus the shared wiring between the
//! session workspace, the service client and the review engine.

use std::path::Path;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use opencv::core::Vector;
use opencv::imgcodecs;
use opencv::prelude::*;
use tracing::{debug, info, warn};

use crate::api::types::JobStatusResponse;
use crate::api::FaceBlurApi;
use crate::cli::{Args, Command};
use crate::editor::compositor::Compositor;
use crate::editor::store::{DetectionStore, VideoDescriptor};
use crate::editor::{ClickOutcome, ReviewSession};
use crate::jobs::{JobPoller, PollObserver, POLL_INTERVAL};
use crate::session::{list_sessions, Session};
use crate::video::opencv_source::OpencvSource;
use crate::video::FrameSource;

pub async fn run(args: Args) -> Result<()> {
    let api = FaceBlurApi::new(&args.api_url);
    match &args.command {
        Command::Upload { file } => upload(&api, &args, file).await,
        Command::Analyze => analyze(&api, &args).await,
        Command::Status => status(&api, &args).await,
        Command::Sessions => sessions(&args),
        Command::Tracks => tracks(&args),
        Command::SetBlur { id, on } => set_blur(&args, id, *on),
        Command::SetLabel { id, label } => set_label(&args, id, label),
        Command::SetRange {
            id,
            index,
            start,
            end,
        } => set_range(&args, id, *index, *start, *end),
        Command::Select { id, time } => select(&args, id, *time),
        Command::Pick {
            x,
            y,
            time,
            element_width,
            element_height,
        } => pick(&args, *x, *y, *time, *element_width, *element_height),
        Command::Render { frame, time } => render(&args, *frame, *time),
        Command::Play { from, seconds } => play(&args, *from, *seconds),
        Command::Save => save(&api, &args).await,
        Command::Export => export(&api, &args).await,
        Command::Download => download(&api, &args).await,
    }
}

async fn upload(api: &FaceBlurApi, args: &Args, file: &Path) -> Result<()> {
    let response = api.upload_video(file).await?;
    let video = VideoDescriptor {
        fps: response.fps,
        total_frames: response.total_frames,
        width: response.width,
        height: response.height,
        duration: response.duration,
    };
    let session = Session::create(&args.workdir, file, response.video_id, video)?;

    println!("uploaded video {} ({:.1} MB)", response.video_id, response.size_mb);
    println!(
        "  {}x{}, {:.2} fps, {} frames, {:.2}s",
        response.width, response.height, response.fps, response.total_frames, response.duration
    );
    if let Some(name) = &response.filename_original {
        println!("  stored as {name}");
    }
    println!("session: {}", session.dir.display());
    Ok(())
}

/// Progress bar plus preview compositing while a job is polled.
struct WatchProgress {
    bar: ProgressBar,
    compositor: Compositor,
}

impl WatchProgress {
    fn new(args: &Args, label: &str) -> Result<WatchProgress> {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}% {msg}")?
                .progress_chars("#>-"),
        );
        bar.set_message(label.to_string());
        Ok(WatchProgress {
            bar,
            compositor: Compositor::new(args.canvas_width, args.canvas_height),
        })
    }

    fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl PollObserver for WatchProgress {
    fn on_status(&mut self, status: &JobStatusResponse) {
        if let Some(progress) = status.progress {
            self.bar.set_position(progress.clamp(0.0, 100.0) as u64);
        }
        self.bar.set_message(status.status.clone());
    }

    fn on_preview(&mut self, path: &Path) {
        if let Err(err) = self.composite_preview(path) {
            warn!("preview composite failed: {err:#}");
        }
    }
}

impl WatchProgress {
    fn composite_preview(&self, path: &Path) -> Result<()> {
        let image = imgcodecs::imread(
            path.to_str().context("non-utf8 preview path")?,
            imgcodecs::IMREAD_COLOR,
        )?;
        if image.empty() {
            bail!("preview image is empty");
        }
        let canvas = self.compositor.render_preview(&image)?;
        let dest = path.with_file_name("preview_canvas.jpg");
        imgcodecs::imwrite(
            dest.to_str().context("non-utf8 preview path")?,
            &canvas,
            &Vector::new(),
        )?;
        Ok(())
    }
}

async fn analyze(api: &FaceBlurApi, args: &Args) -> Result<()> {
    let mut session = Session::load_latest(&args.workdir)?;

    let job = api.create_job(session.state.video_id).await?;
    session.set_job(job.job_id)?;
    info!("analysis job {} started at {:.0}%", job.job_id, job.progress);

    let mut watch = WatchProgress::new(args, "starting")?;
    let mut poller =
        JobPoller::new(api.clone(), POLL_INTERVAL).with_preview_dir(session.previews_dir());
    let outcome = poller.run(job.job_id, &mut watch).await;
    debug!("analysis poller finished in {:?}", poller.state());
    outcome?;
    watch.finish("analysis complete");

    let results = api.job_results(job.job_id).await?;
    let store = DetectionStore::from_results(results, session.state.video.total_frames);
    session.save_detections(store.log())?;
    session.save_tracks(store.objects())?;

    println!(
        "analysis complete: {} frames with detections, {} tracks",
        store.frame_count(),
        store.objects().len()
    );
    print_tracks(&store);
    Ok(())
}

async fn status(api: &FaceBlurApi, args: &Args) -> Result<()> {
    let session = Session::load_latest(&args.workdir)?;
    let job_id = session
        .state
        .export_job_id
        .map(Ok)
        .unwrap_or_else(|| session.require_job())?;

    let response = api.job_status(job_id).await?;
    println!("job {}: {}", job_id, response.status);
    if let Some(progress) = response.progress {
        println!("  progress: {progress:.0}%");
    }
    if let Some(message) = &response.error_message {
        println!("  error: {message}");
    }
    if let Some(url) = &response.preview_url {
        let dest = session.previews_dir().join("preview.jpg");
        api.fetch_preview(url, &dest).await?;
        println!("  preview: {}", dest.display());
    }
    Ok(())
}

fn sessions(args: &Args) -> Result<()> {
    let sessions = list_sessions(&args.workdir)?;
    if sessions.is_empty() {
        println!("no sessions under {}", args.workdir.display());
        return Ok(());
    }
    for session in sessions.iter().rev() {
        println!(
            "{}  video {}  job {}  {}",
            session.state.created_at.format("%Y-%m-%d %H:%M:%S"),
            session.state.video_id,
            session
                .state
                .job_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            session.dir.display()
        );
    }
    Ok(())
}

fn print_tracks(store: &DetectionStore) {
    for obj in store.objects() {
        let ranges = if obj.ranges.is_empty() {
            "(none)".to_string()
        } else {
            obj.ranges
                .iter()
                .map(|r| format!("{}-{}", r.start, r.end))
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!(
            "  [{}] {:<20} blur={:<5} frames {}",
            obj.id, obj.label, obj.meta.blur, ranges
        );
    }
}

fn tracks(args: &Args) -> Result<()> {
    let session = Session::load_latest(&args.workdir)?;
    let store = session.load_store()?;
    println!("{} tracks:", store.objects().len());
    print_tracks(&store);
    Ok(())
}

fn set_blur(args: &Args, id: &str, on: bool) -> Result<()> {
    let session = Session::load_latest(&args.workdir)?;
    let mut store = session.load_store()?;
    if !store.set_blur(id, on) {
        bail!("no track with id {id}");
    }
    session.save_tracks(store.objects())?;
    println!("track {id}: blur={on}");
    Ok(())
}

fn set_label(args: &Args, id: &str, label: &str) -> Result<()> {
    let session = Session::load_latest(&args.workdir)?;
    let mut store = session.load_store()?;
    if !store.set_label(id, label) {
        bail!("no track with id {id}");
    }
    session.save_tracks(store.objects())?;
    println!("track {id}: label={label:?}");
    Ok(())
}

fn set_range(
    args: &Args,
    id: &str,
    index: usize,
    start: Option<usize>,
    end: Option<usize>,
) -> Result<()> {
    if start.is_none() && end.is_none() {
        bail!("nothing to move: pass --start and/or --end");
    }
    let session = Session::load_latest(&args.workdir)?;
    let mut review = load_review(&session, args)?;

    let range = match review.set_range_boundaries(id, index, start, end) {
        Some(r) => r,
        None => bail!("track {id} has no range {index} (or start > end was requested)"),
    };
    session.save_tracks(review.store.objects())?;
    println!(
        "track {id} range {index}: {}-{} (all: {})",
        range.start,
        range.end,
        review.range_text(id).unwrap_or_default()
    );
    Ok(())
}

fn select(args: &Args, id: &str, time: f64) -> Result<()> {
    let session = Session::load_latest(&args.workdir)?;
    let mut review = load_review(&session, args)?;
    review.playback.seek(time);

    if !review.select(id) {
        bail!("no track with id {id}");
    }
    if let Some(detail) = review.selection_detail() {
        println!(
            "selected [{}] {:?} blur={} frames {}",
            detail.id,
            detail.label,
            detail.blur,
            review.range_text(detail.id).unwrap_or_default()
        );
    }

    if let Err(err) = snapshot_frame(&review, &session) {
        warn!("snapshot skipped: {err:#}");
    }
    Ok(())
}

fn pick(
    args: &Args,
    x: f64,
    y: f64,
    time: f64,
    element_width: Option<f64>,
    element_height: Option<f64>,
) -> Result<()> {
    let session = Session::load_latest(&args.workdir)?;
    let mut review = load_review(&session, args)?;
    review.playback.seek(time);

    let element_w = element_width.unwrap_or(args.canvas_width as f64);
    let element_h = element_height.unwrap_or(args.canvas_height as f64);
    let outcome = review.handle_click(x, y, element_w, element_h);
    session.save_tracks(review.store.objects())?;

    match &outcome {
        ClickOutcome::Selected { object_id, blur } => {
            match blur {
                Some(on) => println!("hit track {object_id}: blur toggled to {on}"),
                None => println!("hit box {object_id} with no matching track"),
            }
            if let Some(detail) = review.selection_detail() {
                println!(
                    "  selected [{}] {:?} blur={} frames {}",
                    detail.id,
                    detail.label,
                    detail.blur,
                    review.range_text(detail.id).unwrap_or_default()
                );
            }
        }
        ClickOutcome::Cleared => println!("no box at ({x}, {y}); selection cleared"),
    }

    // redraw so the new outline colors and blur state are visible
    if let Err(err) = snapshot_frame(&review, &session) {
        warn!("snapshot skipped: {err:#}");
    }
    Ok(())
}

fn render(args: &Args, frame: Option<usize>, time: Option<f64>) -> Result<()> {
    let session = Session::load_latest(&args.workdir)?;
    let mut review = load_review(&session, args)?;

    let seconds = match (frame, time) {
        (Some(f), _) => f as f64 / session.state.video.fps,
        (None, Some(t)) => t,
        (None, None) => 0.0,
    };
    review.playback.seek(seconds);

    let path = snapshot_frame(&review, &session)?;
    println!("rendered frame {} to {}", review.playback.current_frame(), path.display());
    Ok(())
}

fn play(args: &Args, from: f64, seconds: f64) -> Result<()> {
    let session = Session::load_latest(&args.workdir)?;
    let mut review = load_review(&session, args)?;
    let mut source = open_source(&session)?;

    review.playback.seek(from);
    review.playback.play();
    let fps = session.state.video.fps.max(1.0);
    let dt = 1.0 / fps;
    let total_ticks = (seconds * fps).ceil() as u64;

    let bar = ProgressBar::new(total_ticks);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames")?
            .progress_chars("#>-"),
    );

    let renders = session.renders_dir();
    let mut ticks = 0u64;
    // level-triggered: each pass re-checks the playing flag via advance
    while let Some(frame_idx) = review.playback.advance(dt) {
        let frame = source.read_at(frame_idx)?;
        let canvas = review.render_frame(&frame, frame_idx)?;
        let dest = renders.join(format!("play_{frame_idx:06}.jpg"));
        imgcodecs::imwrite(
            dest.to_str().context("non-utf8 render path")?,
            &canvas,
            &Vector::new(),
        )?;
        bar.inc(1);

        ticks += 1;
        if ticks >= total_ticks {
            review.playback.pause();
        }
    }
    bar.finish();

    println!(
        "rendered {} frames to {}, stopped at {:.2}s",
        ticks,
        renders.display(),
        review.playback.position()
    );
    Ok(())
}

async fn save(api: &FaceBlurApi, args: &Args) -> Result<()> {
    let session = Session::load_latest(&args.workdir)?;
    let job_id = session.require_job()?;
    let store = session.load_store()?;

    let response = api.submit_edits(job_id, store.objects()).await?;
    println!(
        "saved {} tracks to job {}{}",
        store.objects().len(),
        job_id,
        response
            .message
            .map(|m| format!(": {m}"))
            .unwrap_or_default()
    );
    Ok(())
}

async fn export(api: &FaceBlurApi, args: &Args) -> Result<()> {
    let mut session = Session::load_latest(&args.workdir)?;
    let job_id = session.require_job()?;

    let started = api.start_export(job_id).await?;
    let export_job = started.job_id.unwrap_or(job_id);
    session.set_export_job(export_job)?;
    if let Some(message) = &started.message {
        info!("export: {message}");
    }

    let mut watch = WatchProgress::new(args, "exporting")?;
    let mut poller =
        JobPoller::new(api.clone(), POLL_INTERVAL).with_preview_dir(session.previews_dir());
    let outcome = poller.run(export_job, &mut watch).await;
    debug!("export poller finished in {:?}", poller.state());
    outcome?;
    watch.finish("export complete");

    println!("export finished for job {export_job}; run `download` to fetch the video");
    Ok(())
}

async fn download(api: &FaceBlurApi, args: &Args) -> Result<()> {
    let session = Session::load_latest(&args.workdir)?;
    let job_id = session
        .state
        .export_job_id
        .map(Ok)
        .unwrap_or_else(|| session.require_job())?;

    let path = api.download_result(job_id, &session.downloads_dir()).await?;
    println!("downloaded {}", path.display());
    Ok(())
}

fn load_review(session: &Session, args: &Args) -> Result<ReviewSession> {
    let store = session.load_store()?;
    Ok(ReviewSession::new(
        session.state.video.clone(),
        store,
        args.canvas_width,
        args.canvas_height,
    ))
}

/// Opens the session's local video and checks it still matches what the
/// server probed at upload. A replaced file would silently desync every
/// frame lookup, so mismatches are loud.
fn open_source(session: &Session) -> Result<OpencvSource> {
    let source = OpencvSource::open(
        session
            .state
            .source_path
            .to_str()
            .context("non-utf8 video path")?,
    )?;

    let video = &session.state.video;
    if source.dimensions() != (video.width, video.height) {
        warn!(
            "local file is {}x{} but the session was created from a {}x{} video",
            source.dimensions().0,
            source.dimensions().1,
            video.width,
            video.height
        );
    }
    if (source.fps() - video.fps).abs() > 0.01 || source.frame_count() != video.total_frames {
        warn!(
            "local file reports {:.2} fps / {} frames, session has {:.2} fps / {} frames",
            source.fps(),
            source.frame_count(),
            video.fps,
            video.total_frames
        );
    }
    Ok(source)
}

/// Renders the review's current frame to the session's renders directory.
fn snapshot_frame(review: &ReviewSession, session: &Session) -> Result<std::path::PathBuf> {
    let mut source = open_source(session)?;
    let frame_idx = review.playback.current_frame();
    let frame = source.read_at(frame_idx)?;
    let canvas = review.render_frame(&frame, frame_idx)?;

    let dest = session.renders_dir().join(format!("frame_{frame_idx:06}.jpg"));
    imgcodecs::imwrite(
        dest.to_str().context("non-utf8 render path")?,
        &canvas,
        &Vector::new(),
    )?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path as UrlPath, State};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct ServiceStub {
        statuses: Mutex<Vec<serde_json::Value>>,
        cursor: AtomicUsize,
        results_hits: AtomicUsize,
        edits: Mutex<Option<serde_json::Value>>,
        downloads: Mutex<Vec<i64>>,
    }

    async fn upload_handler() -> Json<serde_json::Value> {
        Json(serde_json::json!({
            "video_id": 12, "filename_original": "clip.mp4", "size_mb": 1.4,
            "fps": 25.0, "total_frames": 500, "duration": 20.0,
            "width": 1280, "height": 720
        }))
    }

    async fn job_create_handler() -> Json<serde_json::Value> {
        Json(serde_json::json!({"job_id": 7, "progress": 0.0}))
    }

    async fn status_handler(State(stub): State<Arc<ServiceStub>>) -> Json<serde_json::Value> {
        let statuses = stub.statuses.lock().unwrap();
        let idx = stub.cursor.fetch_add(1, Ordering::SeqCst).min(statuses.len() - 1);
        Json(statuses[idx].clone())
    }

    async fn results_handler(State(stub): State<Arc<ServiceStub>>) -> Json<serde_json::Value> {
        stub.results_hits.fetch_add(1, Ordering::SeqCst);
        Json(serde_json::json!({
            "detection_log": [[{"id": 1, "x": 100.0, "y": 80.0, "w": 60.0, "h": 60.0}]],
            "objects": [{"id": 1, "label": "", "meta": {"blur": true},
                         "ranges": [{"start": 0, "end": 120}]}]
        }))
    }

    async fn edits_handler(
        State(stub): State<Arc<ServiceStub>>,
        Json(body): Json<serde_json::Value>,
    ) -> Json<serde_json::Value> {
        *stub.edits.lock().unwrap() = Some(body);
        Json(serde_json::json!({"message": "edits saved"}))
    }

    // some server revisions answer the export ack without a job id
    async fn export_handler() -> Json<serde_json::Value> {
        Json(serde_json::json!({"message": "render queued"}))
    }

    async fn download_handler(
        UrlPath(job_id): UrlPath<i64>,
        State(stub): State<Arc<ServiceStub>>,
    ) -> Vec<u8> {
        stub.downloads.lock().unwrap().push(job_id);
        b"blurred-bytes".to_vec()
    }

    async fn spawn_service(statuses: Vec<serde_json::Value>) -> (String, Arc<ServiceStub>) {
        let stub = Arc::new(ServiceStub {
            statuses: Mutex::new(statuses),
            cursor: AtomicUsize::new(0),
            results_hits: AtomicUsize::new(0),
            edits: Mutex::new(None),
            downloads: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/videos/", post(upload_handler))
            .route("/videos/:id/jobs", post(job_create_handler))
            .route("/jobs/:id/status", get(status_handler))
            .route("/jobs/:id/results", get(results_handler))
            .route("/jobs/:id/edits", post(edits_handler))
            .route("/jobs/:id/export", post(export_handler))
            .route("/jobs/:id/download", get(download_handler))
            .with_state(stub.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), stub)
    }

    fn test_args(api_url: &str, workdir: &Path) -> Args {
        Args {
            api_url: api_url.to_string(),
            workdir: workdir.to_path_buf(),
            canvas_width: 960,
            canvas_height: 540,
            command: Command::Analyze,
        }
    }

    #[tokio::test]
    async fn test_review_flow_against_stub_service() {
        let (url, stub) = spawn_service(vec![
            serde_json::json!({"status": "running", "progress": 40.0}),
            serde_json::json!({"status": "completed", "progress": 100.0}),
            serde_json::json!({"status": "rendering", "progress": 60.0}),
            serde_json::json!({"status": "done", "progress": 100.0}),
        ])
        .await;
        let workdir = tempfile::tempdir().unwrap();
        let args = test_args(&url, workdir.path());
        let api = FaceBlurApi::new(&url);

        // 1. upload creates the session from the probed metadata
        let clip = workdir.path().join("clip.mp4");
        std::fs::write(&clip, b"not really a video").unwrap();
        upload(&api, &args, &clip).await.unwrap();
        let session = Session::load_latest(&args.workdir).unwrap();
        assert_eq!(session.state.video_id, 12);
        assert_eq!(session.state.video.total_frames, 500);

        // 2. analyze polls to completion and fetches results exactly once
        analyze(&api, &args).await.unwrap();
        let session = Session::load_latest(&args.workdir).unwrap();
        assert_eq!(session.state.job_id, Some(7));
        assert_eq!(stub.results_hits.load(Ordering::SeqCst), 1);
        let store = session.load_store().unwrap();
        assert_eq!(store.objects().len(), 1);
        assert_eq!(store.objects()[0].label, "Face 1");

        // 3. a local edit lands in the saved tracks and goes out as a bare array
        set_blur(&args, "1", false).unwrap();
        save(&api, &args).await.unwrap();
        let body = stub.edits.lock().unwrap().clone().unwrap();
        assert!(body.is_array());
        assert_eq!(body[0]["id"], "1");
        assert_eq!(body[0]["meta"]["blur"], false);

        // 4. the export ack named no job, so the detection job is polled
        export(&api, &args).await.unwrap();
        let session = Session::load_latest(&args.workdir).unwrap();
        assert_eq!(session.state.export_job_id, Some(7));

        // 5. download hits the export job and synthesizes the file name
        download(&api, &args).await.unwrap();
        assert_eq!(*stub.downloads.lock().unwrap(), vec![7]);
        let saved = std::fs::read(session.downloads_dir().join("blurred_7.mp4")).unwrap();
        assert_eq!(saved, b"blurred-bytes");
    }

    #[tokio::test]
    async fn test_download_prefers_export_job() {
        let (url, stub) = spawn_service(vec![serde_json::json!({"status": "done"})]).await;
        let workdir = tempfile::tempdir().unwrap();
        let args = test_args(&url, workdir.path());
        let api = FaceBlurApi::new(&url);

        let video = VideoDescriptor {
            fps: 25.0,
            total_frames: 500,
            width: 1280,
            height: 720,
            duration: 20.0,
        };
        let mut session = Session::create(workdir.path(), Path::new("clip.mp4"), 12, video).unwrap();
        session.set_job(5).unwrap();
        session.set_export_job(77).unwrap();

        download(&api, &args).await.unwrap();
        assert_eq!(*stub.downloads.lock().unwrap(), vec![77]);
        assert!(session.downloads_dir().join("blurred_77.mp4").exists());
    }
}
