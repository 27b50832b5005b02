use anyhow::{anyhow, Result};
use opencv::{
    prelude::*,
    videoio::{
        VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_FRAME_HEIGHT,
        CAP_PROP_FRAME_WIDTH, CAP_PROP_POS_FRAMES,
    },
};

use super::FrameSource;

/// Frame source backed by an OpenCV VideoCapture on the local file.
pub struct OpencvSource {
    capture: VideoCapture,
    fps: f64,
    total_frames: usize,
    width: u32,
    height: u32,
}

impl OpencvSource {
    pub fn open(path: &str) -> Result<Self> {
        let mut capture = VideoCapture::from_file(path, CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(anyhow!("Failed to open video file: {}", path));
        }

        let mut fps = capture.get(CAP_PROP_FPS)?;
        if fps <= 0.0 {
            tracing::warn!("OpencvSource: no FPS in metadata, falling back to 30.0");
            fps = 30.0;
        }
        let total_frames = capture.get(CAP_PROP_FRAME_COUNT)? as usize;
        let width = capture.get(CAP_PROP_FRAME_WIDTH)? as u32;
        let height = capture.get(CAP_PROP_FRAME_HEIGHT)? as u32;

        tracing::info!(
            "OpencvSource: opened {}, {}x{}, fps={:.2}, frames={}",
            path,
            width,
            height,
            fps,
            total_frames
        );

        Ok(Self {
            capture,
            fps,
            total_frames,
            width,
            height,
        })
    }

    fn read_next(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        let success = self.capture.read(&mut frame)?;
        if !success || frame.empty() {
            return Err(anyhow!("Failed to read frame"));
        }
        Ok(frame)
    }
}

impl FrameSource for OpencvSource {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> usize {
        self.total_frames
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_at(&mut self, frame_idx: usize) -> Result<Mat> {
        let current = self.capture.get(CAP_PROP_POS_FRAMES)? as usize;

        if frame_idx < current {
            // Must seek backwards
            self.capture.set(CAP_PROP_POS_FRAMES, frame_idx as f64)?;
        } else if frame_idx > current {
            // Skip forward efficiently
            for _ in 0..(frame_idx - current) {
                if !self.capture.grab()? {
                    return Err(anyhow!("Failed to grab frame at {}", frame_idx));
                }
            }
        }

        self.read_next()
    }
}
