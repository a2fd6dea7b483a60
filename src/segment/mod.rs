//! Instance segmentation.
//!
//! A `SegmenterBackend` turns one frame into a `Segmentation`: class id,
//! score, box and mask per detected part. The production backend runs a YOLO
//! segmentation export through tract (feature: backend-tract); the stub backend
//! thresholds luminance and needs no model.

mod backend;
mod backends;
pub mod decode;
mod nms;
mod result;

pub use backend::{SegmentParams, SegmenterBackend};
pub use backends::{open_backend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use nms::{non_max_suppression, Scored};
pub use result::{BoundingBox, Instance, Mask, Segmentation};
