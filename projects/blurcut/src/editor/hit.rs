//! Pointer-click resolution against the current frame's boxes.

use crate::api::types::BoundingBox;
use crate::editor::geometry::DrawParams;

/// Corrects for display scaling of the canvas: a click lands in on-screen
/// element pixels, while drawing happened in the canvas' intrinsic
/// resolution.
pub fn element_to_canvas(
    element_x: f64,
    element_y: f64,
    element_w: f64,
    element_h: f64,
    canvas_w: u32,
    canvas_h: u32,
) -> (f64, f64) {
    let sx = canvas_w as f64 / element_w.max(1.0);
    let sy = canvas_h as f64 / element_h.max(1.0);
    (element_x * sx, element_y * sy)
}

/// Topmost box containing the point, in video pixel space. Boxes are drawn
/// in list order, so the scan runs in reverse to prefer the one painted
/// last. Edges count as inside.
pub fn hit_box_at<'a>(boxes: &'a [BoundingBox], x: f64, y: f64) -> Option<&'a BoundingBox> {
    boxes
        .iter()
        .rev()
        .find(|b| x >= b.x && x <= b.x + b.w && y >= b.y && y <= b.y + b.h)
}

/// Full click pipeline: element pixels -> canvas pixels -> video pixels ->
/// topmost box. None means the click hit letterbox margin or empty frame
/// area, which callers must treat as "clear selection".
pub fn resolve_click<'a>(
    params: &DrawParams,
    boxes: &'a [BoundingBox],
    element_x: f64,
    element_y: f64,
    element_w: f64,
    element_h: f64,
    canvas_w: u32,
    canvas_h: u32,
) -> Option<&'a BoundingBox> {
    let (cx, cy) = element_to_canvas(element_x, element_y, element_w, element_h, canvas_w, canvas_h);
    let (vx, vy) = params.to_video(cx, cy);
    hit_box_at(boxes, vx, vy)
}
