//! Pump Inspector
//!
//! Live debug viewer for a part segmentation model. Frames come from a local
//! camera, a YOLO-style instance segmentation model finds parts in each one,
//! and the annotated result (mask outlines, class/score labels, frame rate)
//! is shown until the operator presses the quit key.
//!
//! # Module Structure
//!
//! - `config`: File, env and default settings
//! - `frame`: Captured RGB frames
//! - `ingest`: Camera sources (V4L2 devices, synthetic `stub://` scenes)
//! - `segment`: Segmentation backends and model output decoding
//! - `overlay`: Contours, labels and the FPS readout
//! - `display`: Debug window and headless sink
//! - `inspector`: The capture / segment / annotate / show loop
//!
//! Frames are independent: no tracking and no smoothing across frames.

pub mod config;
pub mod display;
pub mod frame;
pub mod ingest;
pub mod inspector;
pub mod overlay;
pub mod segment;

pub use config::InspectorConfig;
pub use frame::Frame;
pub use inspector::{Inspector, RunSummary, StepOutcome, StopReason};
pub use segment::{Instance, Segmentation, SegmenterBackend};
