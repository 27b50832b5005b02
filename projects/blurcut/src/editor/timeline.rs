//! Conversions between playback time, timeline position and frame index.
//!
//! The playback clock is the source of truth for position; everything else
//! derives a frame index from it. All helpers are pure so the drag machine
//! and the compositor can share them.

use crate::api::types::FrameRange;

/// Maps a playback position in seconds to the nearest frame index.
pub fn frame_for_time(seconds: f64, fps: f64) -> usize {
    (seconds * fps).round().max(0.0) as usize
}

/// Maps a timeline position (percent of track width, 0..=100) to a frame
/// index in [0, total_frames]. Callers clamp the percent first.
pub fn percent_to_frame(percent: f64, total_frames: usize) -> usize {
    (percent / 100.0 * total_frames as f64).round() as usize
}

/// Inverse of `percent_to_frame`, used to place range handles on the track.
pub fn frame_to_percent(frame: usize, total_frames: usize) -> f64 {
    if total_frames == 0 {
        return 0.0;
    }
    frame as f64 * 100.0 / total_frames as f64
}

/// True iff some range contains the frame, bounds inclusive. Ranges may
/// overlap and carry no ordering; any match wins. Empty list is never a
/// match.
pub fn frame_in_ranges(frame: usize, ranges: &[FrameRange]) -> bool {
    ranges.iter().any(|r| r.contains(frame))
}
