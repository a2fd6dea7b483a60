//! YOLO segmentation head decoding.
//!
//! A YOLOv8-seg export produces two tensors:
//!
//! - predictions `[1, 4 + nc + nm, N]`: per proposal the box center/size in
//!   model-input pixels, `nc` class scores and `nm` mask coefficients;
//! - prototypes `[1, nm, mh, mw]`: a low-resolution mask basis.
//!
//! An instance mask is the sign of `coefficients · prototypes`, cropped to the
//! instance box. Masks here are produced directly at frame resolution by
//! sampling the prototype logits through the inverse letterbox transform, so
//! they line up with the camera frame without a separate resize.
//!
//! Everything in this module is pure and works on `ndarray` views, so it can be
//! exercised without a model file.

use anyhow::{anyhow, Result};
use image::{imageops, Rgb, RgbImage};
use ndarray::{ArrayView2, ArrayView3, Axis};

use super::backend::SegmentParams;
use super::nms::{non_max_suppression, Scored};
use super::result::{BoundingBox, Instance, Mask, Segmentation};

/// Gray level used for letterbox padding.
const LETTERBOX_FILL: Rgb<u8> = Rgb([114, 114, 114]);

/// Aspect-preserving fit of a frame into the square model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub src_width: u32,
    pub src_height: u32,
    pub size: u32,
    pub scale: f32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    pub fn new(src_width: u32, src_height: u32, size: u32) -> Result<Self> {
        if src_width == 0 || src_height == 0 || size == 0 {
            return Err(anyhow!(
                "cannot letterbox {}x{} into {}",
                src_width,
                src_height,
                size
            ));
        }
        let scale = (size as f32 / src_width as f32).min(size as f32 / src_height as f32);
        let scaled_width = ((src_width as f32 * scale).round() as u32).clamp(1, size);
        let scaled_height = ((src_height as f32 * scale).round() as u32).clamp(1, size);
        Ok(Self {
            src_width,
            src_height,
            size,
            scale,
            scaled_width,
            scaled_height,
            pad_x: (size - scaled_width) / 2,
            pad_y: (size - scaled_height) / 2,
        })
    }

    /// Resize and pad `image` into the square model input.
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let resized = imageops::resize(
            image,
            self.scaled_width,
            self.scaled_height,
            imageops::FilterType::Triangle,
        );
        let mut canvas = RgbImage::from_pixel(self.size, self.size, LETTERBOX_FILL);
        imageops::replace(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
        canvas
    }

    /// Frame coordinates to model-input coordinates.
    pub fn to_input(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.scale + self.pad_x as f32,
            y * self.scale + self.pad_y as f32,
        )
    }

    /// Model-input coordinates to frame coordinates.
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

/// Pack an RGB image as NCHW `f32` in `[0, 1]` (batch of one).
pub fn to_nchw(image: &RgbImage) -> Vec<f32> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let plane = width * height;
    let mut data = vec![0f32; plane * 3];
    for (i, pixel) in image.pixels().enumerate() {
        for channel in 0..3 {
            data[channel * plane + i] = pixel.0[channel] as f32 / 255.0;
        }
    }
    data
}

/// A proposal that passed the confidence threshold.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub class_id: usize,
    pub score: f32,
    /// Box in frame pixels, clamped to the frame.
    pub bbox: BoundingBox,
    pub coefficients: Vec<f32>,
}

impl Scored for Candidate {
    fn score(&self) -> f32 {
        self.score
    }

    fn class_id(&self) -> usize {
        self.class_id
    }

    fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }
}

/// Decode raw proposals.
///
/// `predictions` is `[4 + nc + nm, N]`, channels first as exported. Small
/// inputs produce fewer proposals than features, so the layout is never
/// inferred from the shape.
pub fn decode_candidates(
    predictions: ArrayView2<f32>,
    mask_dim: usize,
    letterbox: &Letterbox,
    conf_threshold: f32,
) -> Result<Vec<Candidate>> {
    let features = predictions.nrows();
    if features <= 4 + mask_dim {
        return Err(anyhow!(
            "prediction tensor has {} features, expected more than {} (4 box + {} mask)",
            features,
            4 + mask_dim,
            mask_dim
        ));
    }
    let num_classes = features - 4 - mask_dim;

    let mut candidates = Vec::new();
    for proposal in predictions.axis_iter(Axis(1)) {
        let (class_id, score) = proposal
            .iter()
            .skip(4)
            .take(num_classes)
            .copied()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |best, (id, s)| {
                if s > best.1 {
                    (id, s)
                } else {
                    best
                }
            });
        if score.is_nan() || score < conf_threshold {
            continue;
        }

        let input_box = BoundingBox::from_center(proposal[0], proposal[1], proposal[2], proposal[3]);
        let (x1, y1) = letterbox.to_source(input_box.x1, input_box.y1);
        let (x2, y2) = letterbox.to_source(input_box.x2, input_box.y2);
        let bbox = BoundingBox::new(x1, y1, x2, y2)
            .clamp_to(letterbox.src_width, letterbox.src_height);

        candidates.push(Candidate {
            class_id,
            score,
            bbox,
            coefficients: proposal.iter().skip(4 + num_classes).copied().collect(),
        });
    }
    Ok(candidates)
}

/// Build the frame-resolution mask for one instance.
pub fn instance_mask(
    coefficients: &[f32],
    prototypes: ArrayView3<f32>,
    bbox: &BoundingBox,
    letterbox: &Letterbox,
) -> Result<Mask> {
    let (mask_dim, proto_h, proto_w) = prototypes.dim();
    if coefficients.len() != mask_dim {
        return Err(anyhow!(
            "instance has {} mask coefficients, prototypes have {}",
            coefficients.len(),
            mask_dim
        ));
    }
    if proto_h == 0 || proto_w == 0 {
        return Err(anyhow!("mask prototypes are empty ({}x{})", proto_w, proto_h));
    }

    let mut logits = vec![0f32; proto_h * proto_w];
    for (plane, &coefficient) in prototypes.axis_iter(Axis(0)).zip(coefficients) {
        if coefficient == 0.0 {
            continue;
        }
        for (logit, &value) in logits.iter_mut().zip(plane.iter()) {
            *logit += coefficient * value;
        }
    }

    let scale_x = proto_w as f32 / letterbox.size as f32;
    let scale_y = proto_h as f32 / letterbox.size as f32;
    let (width, height) = (letterbox.src_width, letterbox.src_height);
    let mut mask = Mask::empty(width, height);

    let x_start = bbox.x1.floor().max(0.0) as u32;
    let y_start = bbox.y1.floor().max(0.0) as u32;
    let x_end = (bbox.x2.ceil().max(0.0) as u32).min(width);
    let y_end = (bbox.y2.ceil().max(0.0) as u32).min(height);

    for fy in y_start..y_end {
        let cy = fy as f32 + 0.5;
        if cy < bbox.y1 || cy > bbox.y2 {
            continue;
        }
        for fx in x_start..x_end {
            let cx = fx as f32 + 0.5;
            if cx < bbox.x1 || cx > bbox.x2 {
                continue;
            }
            let (ix, iy) = letterbox.to_input(cx, cy);
            let logit = sample_bilinear(
                &logits,
                proto_w,
                proto_h,
                ix * scale_x - 0.5,
                iy * scale_y - 0.5,
            );
            if logit > 0.0 {
                mask.set(fx, fy, true);
            }
        }
    }
    Ok(mask)
}

fn sample_bilinear(values: &[f32], width: usize, height: usize, x: f32, y: f32) -> f32 {
    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let top = values[y0 * width + x0] * (1.0 - fx) + values[y0 * width + x1] * fx;
    let bottom = values[y1 * width + x0] * (1.0 - fx) + values[y1 * width + x1] * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Full post-processing: threshold, NMS, masks.
pub fn postprocess(
    predictions: ArrayView2<f32>,
    prototypes: ArrayView3<f32>,
    letterbox: &Letterbox,
    params: &SegmentParams,
) -> Result<Segmentation> {
    let mask_dim = prototypes.dim().0;
    let candidates = decode_candidates(predictions, mask_dim, letterbox, params.conf_threshold)?;
    let kept = non_max_suppression(candidates, params.iou_threshold, params.max_detections);

    let mut instances = Vec::with_capacity(kept.len());
    for candidate in kept {
        let mask = instance_mask(&candidate.coefficients, prototypes, &candidate.bbox, letterbox)?;
        instances.push(Instance {
            class_id: candidate.class_id,
            score: candidate.score,
            bbox: candidate.bbox,
            mask,
        });
    }
    Ok(Segmentation { instances })
}

/// Parse the `names` metadata an Ultralytics export embeds, e.g.
/// `{0: 'inlet', 1: 'outlet'}`. Gaps in the ids are filled with `class<N>`.
pub fn parse_class_names(raw: &str) -> Option<Vec<String>> {
    let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
    let mut entries: Vec<(usize, String)> = Vec::new();
    let mut rest = body.trim_start();

    while !rest.is_empty() {
        let digits_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let id: usize = rest[..digits_end].parse().ok()?;
        rest = rest[digits_end..].trim_start().strip_prefix(':')?.trim_start();

        let quote = rest.chars().next().filter(|c| *c == '\'' || *c == '"')?;
        let value_end = rest[1..].find(quote)? + 1;
        entries.push((id, rest[1..value_end].to_string()));
        rest = rest[value_end + 1..].trim_start();

        if let Some(next) = rest.strip_prefix(',') {
            rest = next.trim_start();
        } else if !rest.is_empty() {
            return None;
        }
    }

    let count = entries.iter().map(|(id, _)| id + 1).max()?;
    let mut names: Vec<String> = (0..count).map(|id| format!("class{}", id)).collect();
    for (id, name) in entries {
        names[id] = name;
    }
    Some(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    #[test]
    fn letterbox_fits_wide_frames() -> Result<()> {
        let lb = Letterbox::new(1280, 720, 640)?;
        assert_eq!(lb.scale, 0.5);
        assert_eq!((lb.scaled_width, lb.scaled_height), (640, 360));
        assert_eq!((lb.pad_x, lb.pad_y), (0, 140));
        assert_eq!(lb.to_input(1280.0, 720.0), (640.0, 500.0));
        assert_eq!(lb.to_source(320.0, 320.0), (640.0, 360.0));

        let frame = RgbImage::from_pixel(1280, 720, Rgb([10, 20, 30]));
        let input = lb.apply(&frame);
        assert_eq!(input.dimensions(), (640, 640));
        assert_eq!(*input.get_pixel(0, 0), LETTERBOX_FILL);
        assert_eq!(*input.get_pixel(320, 320), Rgb([10, 20, 30]));
        Ok(())
    }

    #[test]
    fn nchw_packs_channel_planes() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([255, 0, 0]));
        image.put_pixel(1, 0, Rgb([0, 0, 255]));
        assert_eq!(to_nchw(&image), vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    fn predictions() -> Array2<f32> {
        // 4 box + 2 classes + 1 coefficient; proposals are columns, unused ones stay zero.
        let proposals = [
            [2.0, 2.0, 4.0, 4.0, 0.9, 0.1, 1.0],
            [2.0, 2.0, 4.0, 4.0, 0.8, 0.2, 1.0],
            [6.0, 6.0, 2.0, 2.0, 0.1, 0.2, 1.0],
        ];
        let mut predictions = Array2::<f32>::zeros((7, 8));
        for (i, proposal) in proposals.iter().enumerate() {
            predictions.column_mut(i).assign(&ndarray::arr1(proposal));
        }
        predictions
    }

    #[test]
    fn decode_filters_by_confidence_and_picks_best_class() -> Result<()> {
        let lb = Letterbox::new(8, 8, 8)?;
        let candidates = decode_candidates(predictions().view(), 1, &lb, 0.25)?;
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].class_id, 0);
        assert_eq!(candidates[0].bbox, BoundingBox::new(0.0, 0.0, 4.0, 4.0));
        assert_eq!(candidates[0].coefficients, vec![1.0]);
        Ok(())
    }

    #[test]
    fn decode_small_input_keeps_channels_first() -> Result<()> {
        // imgsz=32 with one class and 32 coefficients: 37 features, 21 proposals.
        let lb = Letterbox::new(32, 32, 32)?;
        let mut predictions = Array2::<f32>::zeros((37, 21));
        predictions[[0, 3]] = 16.0;
        predictions[[1, 3]] = 16.0;
        predictions[[2, 3]] = 8.0;
        predictions[[3, 3]] = 8.0;
        predictions[[4, 3]] = 0.9;
        predictions[[5, 3]] = 0.5;
        let candidates = decode_candidates(predictions.view(), 32, &lb, 0.25)?;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].class_id, 0);
        assert_eq!(candidates[0].score, 0.9);
        assert_eq!(candidates[0].bbox, BoundingBox::new(12.0, 12.0, 20.0, 20.0));
        assert_eq!(candidates[0].coefficients.len(), 32);
        assert_eq!(candidates[0].coefficients[0], 0.5);
        Ok(())
    }

    #[test]
    fn decode_rejects_too_few_features() -> Result<()> {
        let lb = Letterbox::new(8, 8, 8)?;
        let tiny = Array2::<f32>::zeros((5, 100));
        assert!(decode_candidates(tiny.view(), 1, &lb, 0.25).is_err());
        Ok(())
    }

    #[test]
    fn instance_mask_follows_prototype_sign_and_box() -> Result<()> {
        let lb = Letterbox::new(4, 4, 4)?;
        let protos = Array3::from_shape_fn((1, 4, 4), |(_, _, x)| if x < 2 { 1.0 } else { -1.0 });

        let whole = BoundingBox::new(0.0, 0.0, 4.0, 4.0);
        let mask = instance_mask(&[1.0], protos.view(), &whole, &lb)?;
        assert_eq!(mask.area(), 8);
        assert!(mask.get(1, 3));
        assert!(!mask.get(2, 0));

        let cropped = BoundingBox::new(0.0, 0.0, 1.0, 4.0);
        let mask = instance_mask(&[1.0], protos.view(), &cropped, &lb)?;
        assert_eq!(mask.area(), 4);
        assert!(!mask.get(1, 0));

        assert!(instance_mask(&[1.0, 2.0], protos.view(), &whole, &lb).is_err());
        Ok(())
    }

    #[test]
    fn postprocess_runs_nms_and_builds_frame_masks() -> Result<()> {
        let lb = Letterbox::new(8, 8, 8)?;
        let protos = Array3::from_elem((1, 2, 2), 1.0f32);
        let seg = postprocess(predictions().view(), protos.view(), &lb, &SegmentParams::default())?;
        // The two class-0 proposals share a box; only the stronger survives.
        assert_eq!(seg.len(), 1);
        let instance = &seg.instances[0];
        assert_eq!(instance.score, 0.9);
        assert_eq!((instance.mask.width(), instance.mask.height()), (8, 8));
        assert_eq!(instance.mask.area(), 16);
        Ok(())
    }

    #[test]
    fn class_names_from_metadata() {
        assert_eq!(
            parse_class_names("{0: 'inlet', 1: \"outlet, left\"}"),
            Some(vec!["inlet".to_string(), "outlet, left".to_string()])
        );
        assert_eq!(
            parse_class_names("{1: 'impeller'}"),
            Some(vec!["class0".to_string(), "impeller".to_string()])
        );
        assert_eq!(parse_class_names("['a', 'b']"), None);
        assert_eq!(parse_class_names("{}"), None);
    }
}
