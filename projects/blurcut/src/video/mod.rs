pub mod opencv_source;

use anyhow::Result;
use opencv::core::Mat;

/// Random access to decoded video frames for local compositing.
///
/// The server's probe stays authoritative for fps and frame count; a
/// source only has to hand out pixels. Implementations may optimize
/// sequential access, the playback loop reads mostly forward.
pub trait FrameSource: Send {
    fn fps(&self) -> f64;
    fn frame_count(&self) -> usize;
    fn dimensions(&self) -> (u32, u32);
    /// Decodes the frame at `frame_idx`. Out-of-range indices are an error.
    fn read_at(&mut self, frame_idx: usize) -> Result<Mat>;
}
