//! Frame ingestion.
//!
//! The inspector reads from exactly one camera. `CameraSource` covers both
//! real V4L2 devices (feature: ingest-v4l2) and synthetic `stub://` scenes
//! used for dry runs and tests.
//!
//! Every source hands out RGB `Frame`s. Device-specific pixel formats are
//! converted in `normalize` before a frame leaves this module.
//!
//! A source that fails to produce a frame ends the inspection loop; sources do
//! not retry on their own.

pub mod camera;
mod normalize;

use anyhow::Result;

use crate::frame::Frame;

pub use camera::{CameraConfig, CameraSource};
pub use normalize::{normalize_to_rgb, PixelFormat};

/// A producer of frames for the inspector loop.
pub trait FrameSource {
    /// Open the underlying device.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame. An error means the camera is done.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub device: String,
}
