//! Drag state machine for resizing a track's presence ranges.
//!
//! One drag at a time, system-wide. While a drag is live every move
//! re-clamps against the opposite boundary, so `start <= end` holds after
//! each individual move, not just at release.

use tracing::debug;

use crate::editor::store::DetectionStore;
use crate::editor::timeline::percent_to_frame;

/// Which end of the range the pointer grabbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Start,
    End,
}

/// Identifies the range being edited for the duration of one gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragTarget {
    pub object_id: String,
    pub range_index: usize,
    pub boundary: Boundary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DragState {
    Idle,
    Dragging(DragTarget),
}

/// Range boundary editor. Holds the drag state and writes every accepted
/// move straight into the detection store.
#[derive(Debug)]
pub struct RangeEditor {
    state: DragState,
    total_frames: usize,
}

impl RangeEditor {
    pub fn new(total_frames: usize) -> RangeEditor {
        RangeEditor {
            state: DragState::Idle,
            total_frames,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    pub fn target(&self) -> Option<&DragTarget> {
        match &self.state {
            DragState::Dragging(t) => Some(t),
            DragState::Idle => None,
        }
    }

    /// Idle -> Dragging. Rejected while another drag is live so a stray
    /// second pointer cannot corrupt the gesture.
    pub fn begin_drag(&mut self, target: DragTarget) -> bool {
        match self.state {
            DragState::Idle => {
                debug!(
                    "drag begin: object={} range={} boundary={:?}",
                    target.object_id, target.range_index, target.boundary
                );
                self.state = DragState::Dragging(target);
                true
            }
            DragState::Dragging(_) => false,
        }
    }

    /// One pointer move at `percent` of the timeline track width.
    ///
    /// The percent is clamped to [0, 100] before conversion, then the
    /// dragged boundary is clamped so it never crosses its partner:
    /// a start stops at the end, an end stops at the start. Returns the
    /// frame written, or None when idle or the target no longer resolves.
    pub fn drag_move(&mut self, store: &mut DetectionStore, percent: f64) -> Option<usize> {
        let target = self.target()?.clone();

        let frame = percent_to_frame(percent.clamp(0.0, 100.0), self.total_frames);

        let obj = store.object_by_id_mut(&target.object_id)?;
        let range = obj.ranges.get_mut(target.range_index)?;
        let applied = match target.boundary {
            Boundary::Start => {
                range.start = frame.min(range.end);
                range.start
            }
            Boundary::End => {
                range.end = frame.max(range.start);
                range.end
            }
        };
        Some(applied)
    }

    /// Dragging -> Idle. Always succeeds, even when no drag is live, so an
    /// interrupted gesture (focus loss, error) can call it unconditionally
    /// without leaking drag state into later clicks. Returns the released
    /// target so callers can refresh that object's range summary.
    pub fn end_drag(&mut self) -> Option<DragTarget> {
        match std::mem::replace(&mut self.state, DragState::Idle) {
            DragState::Dragging(t) => {
                debug!("drag end: object={}", t.object_id);
                Some(t)
            }
            DragState::Idle => None,
        }
    }
}
