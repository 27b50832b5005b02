pub mod compositor;
pub mod geometry;
pub mod hit;
pub mod playback;
pub mod ranges;
pub mod review;
pub mod store;
pub mod timeline;

pub use review::{ClickOutcome, ReviewSession};
