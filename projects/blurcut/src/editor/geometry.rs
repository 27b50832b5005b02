//! Contain-fit mapping between video pixel space and canvas pixel space.

/// Cached contain-fit transform for one video/canvas pairing.
///
/// Computed once when a video enters editing and reused for every frame
/// draw and every hit test; preview images get a fresh fit per image
/// because their dimensions are not assumed constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawParams {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub draw_width: f64,
    pub draw_height: f64,
}

impl DrawParams {
    /// Largest centered fit of `source` inside `canvas` that preserves
    /// aspect ratio. Margins are letterboxed by the compositor.
    pub fn contain(source_w: u32, source_h: u32, canvas_w: u32, canvas_h: u32) -> DrawParams {
        let sw = source_w.max(1) as f64;
        let sh = source_h.max(1) as f64;
        let cw = canvas_w as f64;
        let ch = canvas_h as f64;

        let scale = (cw / sw).min(ch / sh);
        let draw_width = sw * scale;
        let draw_height = sh * scale;

        DrawParams {
            scale,
            offset_x: (cw - draw_width) / 2.0,
            offset_y: (ch - draw_height) / 2.0,
            draw_width,
            draw_height,
        }
    }

    /// Video space -> canvas space.
    pub fn to_canvas(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.scale + self.offset_x, y * self.scale + self.offset_y)
    }

    /// Scales a length; widths and heights carry no offset.
    pub fn to_canvas_len(&self, len: f64) -> f64 {
        len * self.scale
    }

    /// Canvas space -> video space. Exact inverse of `to_canvas` up to
    /// floating-point error.
    pub fn to_video(&self, canvas_x: f64, canvas_y: f64) -> (f64, f64) {
        (
            (canvas_x - self.offset_x) / self.scale,
            (canvas_y - self.offset_y) / self.scale,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1.0, "{a} vs {b}");
    }

    #[test]
    fn test_contain_wide_video_letterboxes_vertically() {
        // 1920x1080 into 960x540 fills exactly
        let p = DrawParams::contain(1920, 1080, 960, 540);
        assert_eq!(p.scale, 0.5);
        assert_eq!(p.offset_x, 0.0);
        assert_eq!(p.offset_y, 0.0);
        assert_eq!(p.draw_width, 960.0);
        assert_eq!(p.draw_height, 540.0);

        // ultrawide leaves vertical margins
        let p = DrawParams::contain(1920, 480, 960, 540);
        assert_eq!(p.draw_width, 960.0);
        assert_eq!(p.draw_height, 240.0);
        assert_eq!(p.offset_x, 0.0);
        assert_eq!(p.offset_y, 150.0);
    }

    #[test]
    fn test_contain_tall_video_letterboxes_horizontally() {
        let p = DrawParams::contain(540, 1080, 960, 540);
        assert_eq!(p.scale, 0.5);
        assert_eq!(p.draw_width, 270.0);
        assert_eq!(p.draw_height, 540.0);
        assert_eq!(p.offset_x, 345.0);
        assert_eq!(p.offset_y, 0.0);
    }

    #[test]
    fn test_round_trip_recovers_video_point() {
        // aspect ratios from square to extreme wide and tall
        let cases = [
            (100u32, 100u32),
            (1920, 1080),
            (4096, 128),
            (128, 4096),
            (853, 481), // non-integer scale
        ];
        for (vw, vh) in cases {
            let p = DrawParams::contain(vw, vh, 960, 540);
            for (x, y) in [(0.0, 0.0), (vw as f64 / 3.0, vh as f64 / 7.0), (vw as f64, vh as f64)] {
                let (cx, cy) = p.to_canvas(x, y);
                let (bx, by) = p.to_video(cx, cy);
                assert_close(bx, x);
                assert_close(by, y);
            }
        }
    }

    #[test]
    fn test_lengths_scale_without_offset() {
        let p = DrawParams::contain(1920, 1080, 960, 540);
        assert_eq!(p.to_canvas_len(100.0), 50.0);
    }

    #[test]
    fn test_degenerate_source_does_not_divide_by_zero() {
        let p = DrawParams::contain(0, 0, 960, 540);
        assert!(p.scale.is_finite());
        assert!(p.scale > 0.0);
    }
}
