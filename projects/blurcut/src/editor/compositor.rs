//! Canvas rendering: letterboxed frame draw, box overlays and region blur.

use anyhow::{bail, Result};
use opencv::prelude::*;
use opencv::{core, imgproc};

use crate::editor::geometry::DrawParams;
use crate::editor::store::{DetectionStore, VideoDescriptor};
use crate::editor::timeline::frame_in_ranges;

/// Renders review frames into a fixed-size canvas.
///
/// Edit mode reuses one `DrawParams` computed when the video is loaded;
/// preview mode fits every image fresh because server previews carry no
/// dimension guarantee.
#[derive(Debug)]
pub struct Compositor {
    canvas_width: u32,
    canvas_height: u32,
    params: Option<DrawParams>,
}

impl Compositor {
    pub fn new(canvas_width: u32, canvas_height: u32) -> Compositor {
        Compositor {
            canvas_width,
            canvas_height,
            params: None,
        }
    }

    /// Computes and caches the contain fit for a newly loaded video.
    /// Called once per session; a new upload replaces the cache.
    pub fn begin_session(&mut self, video: &VideoDescriptor) -> DrawParams {
        let params = DrawParams::contain(
            video.width,
            video.height,
            self.canvas_width,
            self.canvas_height,
        );
        self.params = Some(params);
        params
    }

    pub fn params(&self) -> Option<&DrawParams> {
        self.params.as_ref()
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        (self.canvas_width, self.canvas_height)
    }

    /// Preview mode: letterbox the server's in-progress frame. No boxes
    /// are drawn; detections are not final while the job runs.
    pub fn render_preview(&self, image: &Mat) -> Result<Mat> {
        let size = image.size()?;
        let params = DrawParams::contain(
            size.width.max(0) as u32,
            size.height.max(0) as u32,
            self.canvas_width,
            self.canvas_height,
        );

        let mut canvas = self.blank_canvas()?;
        self.blit_contained(image, &params, &mut canvas)?;
        Ok(canvas)
    }

    /// Edit mode: draw the current video frame, blur flagged regions and
    /// outline every detection on it.
    ///
    /// A box is blurred only when its owner has the blur flag set and
    /// `frame_idx` falls inside one of the owner's ranges. Every box gets
    /// an outline and label regardless; `selected` switches the hue so the
    /// picked track reads differently. A box whose owner is missing from
    /// the store keeps its raw id as label and is never blurred.
    pub fn render_edit(
        &self,
        frame: &Mat,
        store: &DetectionStore,
        frame_idx: usize,
        selected: Option<&str>,
    ) -> Result<Mat> {
        let params = match self.params {
            Some(p) => p,
            None => bail!("no video loaded for editing"),
        };

        let mut canvas = self.blank_canvas()?;
        self.blit_contained(frame, &params, &mut canvas)?;

        for b in store.boxes_at(frame_idx) {
            let (cx, cy) = params.to_canvas(b.x, b.y);
            let cw = params.to_canvas_len(b.w);
            let ch = params.to_canvas_len(b.h);
            let rect = match clamp_to_canvas(
                cx.round() as i32,
                cy.round() as i32,
                cw.round() as i32,
                ch.round() as i32,
                self.canvas_width as i32,
                self.canvas_height as i32,
            ) {
                Some(r) => r,
                None => continue,
            };

            let (label, blur_active) = match store.object_by_id(&b.id) {
                Some(obj) => (
                    obj.label.clone(),
                    obj.meta.blur && frame_in_ranges(frame_idx, &obj.ranges),
                ),
                None => (b.id.clone(), false),
            };

            if blur_active {
                blur_region(&mut canvas, rect)?;
            }

            let color = if selected == Some(b.id.as_str()) {
                core::Scalar::new(0.0, 215.0, 255.0, 0.0) // Gold
            } else {
                core::Scalar::new(0.0, 255.0, 0.0, 0.0) // Green
            };

            imgproc::rectangle(&mut canvas, rect, color, 2, imgproc::LINE_8, 0)?;
            let label_org = core::Point::new(rect.x, (rect.y - 10).max(12));
            imgproc::put_text(
                &mut canvas,
                &label,
                label_org,
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.5,
                color,
                2,
                imgproc::LINE_8,
                false,
            )?;
        }

        Ok(canvas)
    }

    fn blank_canvas(&self) -> Result<Mat> {
        let canvas = Mat::new_rows_cols_with_default(
            self.canvas_height as i32,
            self.canvas_width as i32,
            core::CV_8UC3,
            core::Scalar::all(0.0),
        )?;
        Ok(canvas)
    }

    /// Scales `source` to the fitted size and copies it into the canvas at
    /// the letterbox offsets.
    fn blit_contained(&self, source: &Mat, params: &DrawParams, canvas: &mut Mat) -> Result<()> {
        let rect = match clamp_to_canvas(
            params.offset_x.round() as i32,
            params.offset_y.round() as i32,
            params.draw_width.round() as i32,
            params.draw_height.round() as i32,
            self.canvas_width as i32,
            self.canvas_height as i32,
        ) {
            Some(r) => r,
            None => bail!("video does not fit the canvas at any scale"),
        };

        let mut resized = Mat::default();
        imgproc::resize(
            source,
            &mut resized,
            core::Size::new(rect.width, rect.height),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let mut target = Mat::roi_mut(canvas, rect)?;
        resized.copy_to(&mut target)?;
        Ok(())
    }
}

/// Gaussian-blurs one canvas rectangle in place. Kernel grows with the
/// region so large faces stay unrecognizable, and stays odd as the filter
/// requires.
fn blur_region(canvas: &mut Mat, rect: core::Rect) -> Result<()> {
    let patch = Mat::roi(canvas, rect)?.try_clone()?;
    let k = blur_kernel(rect.width, rect.height);
    let mut blurred = Mat::default();
    imgproc::gaussian_blur(
        &patch,
        &mut blurred,
        core::Size::new(k, k),
        0.0,
        0.0,
        core::BORDER_DEFAULT,
    )?;

    let mut target = Mat::roi_mut(canvas, rect)?;
    blurred.copy_to(&mut target)?;
    Ok(())
}

fn blur_kernel(w: i32, h: i32) -> i32 {
    (w.min(h) / 2).max(15) | 1
}

/// Intersects an integer rect with the canvas. None when nothing of it is
/// visible.
fn clamp_to_canvas(x: i32, y: i32, w: i32, h: i32, canvas_w: i32, canvas_h: i32) -> Option<core::Rect> {
    let x_clamped = x.clamp(0, canvas_w);
    let y_clamped = y.clamp(0, canvas_h);
    let w_clamped = (w - (x_clamped - x)).clamp(0, canvas_w - x_clamped);
    let h_clamped = (h - (y_clamped - y)).clamp(0, canvas_h - y_clamped);

    if w_clamped <= 0 || h_clamped <= 0 {
        return None;
    }
    Some(core::Rect::new(x_clamped, y_clamped, w_clamped, h_clamped))
}
