use anyhow::Result;

use super::result::Segmentation;
use crate::frame::Frame;

/// Inference parameters shared by all backends.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentParams {
    /// Square model input size in pixels.
    pub imgsz: u32,
    /// Minimum class score for a proposal to survive.
    pub conf_threshold: f32,
    /// Overlap above which same-class proposals are suppressed.
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            imgsz: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

/// Instance segmentation backend.
///
/// Every call to `segment` must be independent of earlier calls: no tracking,
/// no smoothing, no state carried between frames that changes the output.
pub trait SegmenterBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class names indexed by class id.
    fn class_names(&self) -> &[String];

    /// Segment one frame. Masks in the result may be at any resolution; the
    /// overlay stage resizes them to the frame.
    fn segment(&mut self, frame: &Frame) -> Result<Segmentation>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Display name for a class id, falling back to `class<N>`.
    fn class_name(&self, class_id: usize) -> String {
        self.class_names()
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class{}", class_id))
    }
}

impl<B: SegmenterBackend + ?Sized> SegmenterBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn class_names(&self) -> &[String] {
        (**self).class_names()
    }

    fn segment(&mut self, frame: &Frame) -> Result<Segmentation> {
        (**self).segment(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
