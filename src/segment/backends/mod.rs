pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

use anyhow::Result;

use crate::config::{BackendKind, ModelSettings};
use crate::segment::backend::{SegmentParams, SegmenterBackend};

/// Open the backend selected in the model settings.
///
/// `model_path` is the already-resolved model file; the stub backend ignores it.
pub fn open_backend(
    settings: &ModelSettings,
    model_path: &std::path::Path,
) -> Result<Box<dyn SegmenterBackend>> {
    let params = SegmentParams::from(settings);
    match settings.backend {
        BackendKind::Stub => {
            let mut backend = StubBackend::new(params);
            if let Some(names) = &settings.class_names {
                backend = backend.with_class_names(names.clone());
            }
            Ok(Box::new(backend))
        }
        #[cfg(feature = "backend-tract")]
        BackendKind::Tract => {
            let mut backend = TractBackend::new(model_path, params)?;
            if let Some(names) = &settings.class_names {
                backend = backend.with_class_names(names.clone());
            }
            Ok(Box::new(backend))
        }
        #[cfg(not(feature = "backend-tract"))]
        BackendKind::Tract => Err(anyhow::anyhow!(
            "cannot load {}: the tract backend requires the backend-tract feature",
            model_path.display()
        )),
    }
}

impl From<&ModelSettings> for SegmentParams {
    fn from(settings: &ModelSettings) -> Self {
        Self {
            imgsz: settings.imgsz,
            conf_threshold: settings.conf_threshold,
            iou_threshold: settings.iou_threshold,
            max_detections: settings.max_detections,
        }
    }
}
