//! Playback position and the redraw-driving play/pause flag.

use tracing::debug;

use crate::editor::timeline::frame_for_time;

/// Level-triggered playback clock.
///
/// The draw loop calls `advance` once per tick; the call itself checks the
/// playing flag, so flipping the flag stops the loop on the very next tick
/// with no cancellation handshake. While paused, redraws happen only on
/// explicit seeks.
#[derive(Debug)]
pub struct Playback {
    playing: bool,
    position: f64,
    duration: f64,
    fps: f64,
    last_frame: usize,
}

impl Playback {
    pub fn new(fps: f64, duration: f64, total_frames: usize) -> Playback {
        Playback {
            playing: false,
            position: 0.0,
            duration: duration.max(0.0),
            fps,
            last_frame: total_frames.saturating_sub(1),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Frame index for the current position. Positions in the final
    /// half-frame round to one past the last stored frame; the clock
    /// reports the last stored frame instead so the index is always
    /// readable from the file.
    pub fn current_frame(&self) -> usize {
        frame_for_time(self.position, self.fps).min(self.last_frame)
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Jumps to an absolute position. A seek during playback pauses first
    /// so the draw loop cannot race a discontinuous position change.
    pub fn seek(&mut self, seconds: f64) {
        if self.is_playing() {
            debug!("seek while playing, pausing first");
            self.pause();
        }
        self.position = seconds.clamp(0.0, self.duration);
    }

    /// One tick of the draw loop. Returns the frame to render, or None
    /// when paused (the caller's loop exits on None). Reaching the end of
    /// the video pauses after rendering the final frame.
    pub fn advance(&mut self, dt: f64) -> Option<usize> {
        if !self.playing {
            return None;
        }
        let frame = self.current_frame();
        self.position += dt;
        if self.position >= self.duration {
            self.position = self.duration;
            self.pause();
        }
        Some(frame)
    }
}
