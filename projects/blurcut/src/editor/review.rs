//! Session context for one video under review.
//!
//! Owns the store, the cached draw transform, the drag machine, playback
//! state and the current selection. Created when a video's results load,
//! dropped (and rebuilt) when a new upload starts, so no editing state
//! leaks between videos.

use opencv::prelude::*;
use tracing::info;

use crate::api::types::FrameRange;
use crate::editor::compositor::Compositor;
use crate::editor::hit::resolve_click;
use crate::editor::playback::Playback;
use crate::editor::ranges::{Boundary, DragTarget, RangeEditor};
use crate::editor::store::{DetectionStore, VideoDescriptor};
use crate::editor::timeline::frame_to_percent;

/// What a canvas click did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// A box was hit: its track is now selected and, when the owner
    /// resolved, `blur` carries the toggled flag value.
    Selected {
        object_id: String,
        blur: Option<bool>,
    },
    /// The click landed outside every box; selection was cleared.
    Cleared,
}

/// Read-only view of the selected track for detail display.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionDetail<'a> {
    pub id: &'a str,
    pub label: &'a str,
    pub blur: bool,
    pub ranges: &'a [FrameRange],
}

pub struct ReviewSession {
    pub video: VideoDescriptor,
    pub store: DetectionStore,
    pub compositor: Compositor,
    pub ranges: RangeEditor,
    pub playback: Playback,
    selection: Option<String>,
}

impl ReviewSession {
    pub fn new(
        video: VideoDescriptor,
        store: DetectionStore,
        canvas_width: u32,
        canvas_height: u32,
    ) -> ReviewSession {
        let mut compositor = Compositor::new(canvas_width, canvas_height);
        let params = compositor.begin_session(&video);
        info!(
            "review session: {}x{} video, {} tracks, scale {:.3}",
            video.width,
            video.height,
            store.objects().len(),
            params.scale
        );

        let ranges = RangeEditor::new(video.total_frames);
        let playback = Playback::new(video.fps, video.duration, video.total_frames);
        ReviewSession {
            video,
            store,
            compositor,
            ranges,
            playback,
            selection: None,
        }
    }

    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    /// Selects a known track. Unknown ids leave the selection untouched.
    pub fn select(&mut self, object_id: &str) -> bool {
        if self.store.object_by_id(object_id).is_some() {
            self.selection = Some(object_id.to_string());
            true
        } else {
            false
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn selection_detail(&self) -> Option<SelectionDetail<'_>> {
        let id = self.selection.as_deref()?;
        let obj = self.store.object_by_id(id)?;
        Some(SelectionDetail {
            id: &obj.id,
            label: &obj.label,
            blur: obj.meta.blur,
            ranges: &obj.ranges,
        })
    }

    /// Resolves a canvas click at the current playback frame.
    ///
    /// A hit toggles the owning track's blur flag and selects the track in
    /// the same step; a miss clears the selection. Both outcomes require a
    /// redraw, which the caller performs.
    pub fn handle_click(
        &mut self,
        element_x: f64,
        element_y: f64,
        element_w: f64,
        element_h: f64,
    ) -> ClickOutcome {
        let frame = self.playback.current_frame();
        let (canvas_w, canvas_h) = self.compositor.canvas_size();
        let hit_id = self.compositor.params().and_then(|params| {
            resolve_click(
                params,
                self.store.boxes_at(frame),
                element_x,
                element_y,
                element_w,
                element_h,
                canvas_w,
                canvas_h,
            )
            .map(|b| b.id.clone())
        });

        match hit_id {
            Some(id) => {
                let blur = self.store.toggle_blur(&id);
                self.selection = Some(id.clone());
                ClickOutcome::Selected {
                    object_id: id,
                    blur,
                }
            }
            None => {
                self.clear_selection();
                ClickOutcome::Cleared
            }
        }
    }

    /// Moves a range's boundaries to the requested frames by replaying
    /// drag gestures, so every step obeys the drag clamping rules.
    ///
    /// Returns the resulting range, or None when the track or range index
    /// does not exist, `start > end` was requested, or a live drag already
    /// owns the range state.
    pub fn set_range_boundaries(
        &mut self,
        object_id: &str,
        range_index: usize,
        start: Option<usize>,
        end: Option<usize>,
    ) -> Option<FrameRange> {
        if self.ranges.is_dragging() {
            return None;
        }
        let exists = self
            .store
            .ranges_of(object_id)
            .map(|rs| range_index < rs.len())
            .unwrap_or(false);
        if !exists {
            return None;
        }
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return None;
            }
        }

        // Start, then end, then start again: the second start pass settles
        // exactly when both boundaries move past the old interval.
        if let Some(s) = start {
            self.drag_to(object_id, range_index, Boundary::Start, s);
        }
        if let Some(e) = end {
            self.drag_to(object_id, range_index, Boundary::End, e);
        }
        if let (Some(s), Some(_)) = (start, end) {
            self.drag_to(object_id, range_index, Boundary::Start, s);
        }

        self.store
            .ranges_of(object_id)
            .and_then(|rs| rs.get(range_index).copied())
    }

    fn drag_to(&mut self, object_id: &str, range_index: usize, boundary: Boundary, frame: usize) {
        let started = self.ranges.begin_drag(DragTarget {
            object_id: object_id.to_string(),
            range_index,
            boundary,
        });
        if started {
            let percent = frame_to_percent(frame.min(self.video.total_frames), self.video.total_frames);
            self.ranges.drag_move(&mut self.store, percent);
        }
        self.ranges.end_drag();
    }

    /// Human-readable range list for one track, refreshed after edits.
    pub fn range_text(&self, object_id: &str) -> Option<String> {
        let ranges = self.store.ranges_of(object_id)?;
        if ranges.is_empty() {
            return Some("(none)".to_string());
        }
        Some(
            ranges
                .iter()
                .map(|r| format!("{}-{}", r.start, r.end))
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    /// Renders one frame in edit mode. Callers pass the index of the frame
    /// they decoded so the box lookup matches the pixels.
    pub fn render_frame(&self, frame: &Mat, frame_idx: usize) -> anyhow::Result<Mat> {
        self.compositor
            .render_edit(frame, &self.store, frame_idx, self.selection())
    }
}
