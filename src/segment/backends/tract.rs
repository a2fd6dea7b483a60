#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ndarray::{ArrayView2, ArrayView3};
use tract_onnx::prelude::*;

use crate::frame::Frame;
use crate::segment::backend::{SegmentParams, SegmenterBackend};
use crate::segment::decode::{parse_class_names, postprocess, to_nchw, Letterbox};
use crate::segment::result::Segmentation;

/// Tract-based backend for YOLO segmentation exports in ONNX format.
///
/// The model input is fixed at `1x3ximgszximgsz`. Frames of any size are
/// letterboxed into it and results are mapped back to frame pixels.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>,
    params: SegmentParams,
    class_names: Vec<String>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, params: SegmentParams) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.is_file() {
            return Err(anyhow!("model file {} does not exist", model_path.display()));
        }
        let onnx = tract_onnx::onnx();
        let proto = onnx
            .proto_model_for_path(model_path)
            .with_context(|| format!("failed to read ONNX model from {}", model_path.display()))?;
        let class_names = proto
            .metadata_props
            .iter()
            .find(|prop| prop.key == "names")
            .and_then(|prop| parse_class_names(&prop.value))
            .unwrap_or_default();

        let size = params.imgsz as usize;
        let model = onnx
            .model_for_proto_model(&proto)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} ({} classes, input {}x{})",
            model_path.display(),
            class_names.len(),
            size,
            size
        );

        Ok(Self {
            model,
            params,
            class_names,
        })
    }

    /// Replace the class names read from the model metadata.
    pub fn with_class_names(mut self, names: Vec<String>) -> Self {
        self.class_names = names;
        self
    }

    fn build_input(&self, letterbox: &Letterbox, frame: &Frame) -> Result<Tensor> {
        let input = letterbox.apply(frame.image());
        let size = self.params.imgsz as usize;
        Tensor::from_shape(&[1, 3, size, size], &to_nchw(&input))
            .context("failed to build input tensor")
    }
}

/// Split the two model outputs into predictions and prototypes by rank.
fn split_outputs(outputs: &TVec<TValue>) -> Result<(&Tensor, &Tensor)> {
    if outputs.len() < 2 {
        return Err(anyhow!(
            "segmentation model produced {} outputs, expected predictions and mask prototypes",
            outputs.len()
        ));
    }
    let predictions = outputs
        .iter()
        .find(|t| t.rank() == 3)
        .map(|t| &**t)
        .ok_or_else(|| anyhow!("no rank-3 prediction output"))?;
    let prototypes = outputs
        .iter()
        .find(|t| t.rank() == 4)
        .map(|t| &**t)
        .ok_or_else(|| anyhow!("no rank-4 mask prototype output"))?;
    Ok((predictions, prototypes))
}

impl SegmenterBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn warm_up(&mut self) -> Result<()> {
        let size = self.params.imgsz as usize;
        let input = Tensor::zero::<f32>(&[1, 3, size, size])?;
        self.model
            .run(tvec!(input.into()))
            .context("ONNX warm-up inference failed")?;
        Ok(())
    }

    fn segment(&mut self, frame: &Frame) -> Result<Segmentation> {
        let letterbox = Letterbox::new(frame.width(), frame.height(), self.params.imgsz)?;
        let input = self.build_input(&letterbox, frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let (predictions, prototypes) = split_outputs(&outputs)?;

        let pred_shape = predictions.shape();
        let predictions = ArrayView2::from_shape(
            (pred_shape[1], pred_shape[2]),
            predictions
                .as_slice::<f32>()
                .context("prediction tensor was not f32")?,
        )
        .context("prediction tensor has unexpected layout")?;

        let proto_shape = prototypes.shape();
        let prototypes = ArrayView3::from_shape(
            (proto_shape[1], proto_shape[2], proto_shape[3]),
            prototypes
                .as_slice::<f32>()
                .context("prototype tensor was not f32")?,
        )
        .context("prototype tensor has unexpected layout")?;

        postprocess(predictions, prototypes, &letterbox, &self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_fails_to_load() {
        let err = match TractBackend::new("/nonexistent/best.onnx", SegmentParams::default()) {
            Ok(_) => panic!("loading a missing model must fail"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn garbage_model_fails_to_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("best.onnx");
        std::fs::write(&path, b"not a protobuf")?;
        assert!(TractBackend::new(&path, SegmentParams::default()).is_err());
        Ok(())
    }
}
