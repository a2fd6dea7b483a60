use anyhow::Result;
use std::collections::VecDeque;

use crate::frame::Frame;
use crate::segment::backend::{SegmentParams, SegmenterBackend};
use crate::segment::result::{BoundingBox, Instance, Mask, Segmentation};

/// Luminance above which a pixel counts as "part".
const DEFAULT_LUMA_THRESHOLD: u8 = 128;
/// Regions smaller than this are treated as noise.
const MIN_REGION_PIXELS: usize = 16;

/// Model-free backend for dry runs and tests.
///
/// Every 4-connected region of bright pixels becomes one instance of class 0.
/// The score is the fraction of the region's bounding box the region fills,
/// so solid rectangles score 1.0 and thin diagonal shapes score low.
pub struct StubBackend {
    params: SegmentParams,
    luma_threshold: u8,
    class_names: Vec<String>,
}

impl StubBackend {
    pub fn new(params: SegmentParams) -> Self {
        Self {
            params,
            luma_threshold: DEFAULT_LUMA_THRESHOLD,
            class_names: vec!["part".to_string()],
        }
    }

    pub fn with_class_names(mut self, names: Vec<String>) -> Self {
        self.class_names = names;
        self
    }

    pub fn with_luma_threshold(mut self, threshold: u8) -> Self {
        self.luma_threshold = threshold;
        self
    }

    fn bright_pixels(&self, frame: &Frame) -> Vec<bool> {
        frame
            .image()
            .pixels()
            .map(|p| {
                let [r, g, b] = p.0;
                let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000;
                luma >= self.luma_threshold as u32
            })
            .collect()
    }
}

impl SegmenterBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn segment(&mut self, frame: &Frame) -> Result<Segmentation> {
        let (width, height) = (frame.width() as usize, frame.height() as usize);
        let bright = self.bright_pixels(frame);
        let mut visited = vec![false; bright.len()];
        let mut instances = Vec::new();
        let mut queue = VecDeque::new();

        for start in 0..bright.len() {
            if !bright[start] || visited[start] {
                continue;
            }
            visited[start] = true;
            queue.push_back(start);

            let mut region = Vec::new();
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (width, height, 0, 0);
            while let Some(idx) = queue.pop_front() {
                let (x, y) = (idx % width, idx / width);
                region.push(idx);
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);

                let mut visit = |n: usize| {
                    if bright[n] && !visited[n] {
                        visited[n] = true;
                        queue.push_back(n);
                    }
                };
                if x > 0 {
                    visit(idx - 1);
                }
                if x + 1 < width {
                    visit(idx + 1);
                }
                if y > 0 {
                    visit(idx - width);
                }
                if y + 1 < height {
                    visit(idx + width);
                }
            }

            if region.len() < MIN_REGION_PIXELS {
                continue;
            }
            let box_area = (max_x - min_x + 1) * (max_y - min_y + 1);
            let score = region.len() as f32 / box_area as f32;
            if score < self.params.conf_threshold {
                continue;
            }

            let mut mask = Mask::empty(width as u32, height as u32);
            for idx in region {
                mask.set((idx % width) as u32, (idx / width) as u32, true);
            }
            instances.push(Instance {
                class_id: 0,
                score,
                bbox: BoundingBox::new(
                    min_x as f32,
                    min_y as f32,
                    (max_x + 1) as f32,
                    (max_y + 1) as f32,
                ),
                mask,
            });
        }

        instances.sort_by(|a, b| b.score.total_cmp(&a.score));
        instances.truncate(self.params.max_detections);
        Ok(Segmentation { instances })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn frame_with_rects(rects: &[(u32, u32, u32, u32)]) -> Frame {
        let mut image = RgbImage::from_pixel(40, 30, Rgb([10, 10, 10]));
        for &(x0, y0, w, h) in rects {
            for y in y0..y0 + h {
                for x in x0..x0 + w {
                    image.put_pixel(x, y, Rgb([240, 240, 240]));
                }
            }
        }
        Frame::new(image, 1)
    }

    #[test]
    fn stub_backend_finds_each_bright_region() -> Result<()> {
        let mut backend = StubBackend::new(SegmentParams::default());
        let seg = backend.segment(&frame_with_rects(&[(2, 2, 6, 5), (20, 10, 8, 8)]))?;
        assert_eq!(seg.len(), 2);

        let boxes: Vec<_> = seg.instances.iter().map(|i| i.bbox).collect();
        assert!(boxes.contains(&BoundingBox::new(2.0, 2.0, 8.0, 7.0)));
        assert!(boxes.contains(&BoundingBox::new(20.0, 10.0, 28.0, 18.0)));
        for instance in &seg.instances {
            assert_eq!(instance.score, 1.0);
            assert_eq!(instance.mask.area() as f32, instance.bbox.area());
        }
        Ok(())
    }

    #[test]
    fn stub_backend_ignores_small_noise() -> Result<()> {
        let mut backend = StubBackend::new(SegmentParams::default());
        let seg = backend.segment(&frame_with_rects(&[(5, 5, 3, 3)]))?;
        assert!(seg.is_empty());
        Ok(())
    }

    #[test]
    fn stub_backend_has_no_memory_between_frames() -> Result<()> {
        let mut backend = StubBackend::new(SegmentParams::default());
        let first = backend.segment(&frame_with_rects(&[(2, 2, 6, 5)]))?;
        let empty = backend.segment(&frame_with_rects(&[]))?;
        let again = backend.segment(&frame_with_rects(&[(2, 2, 6, 5)]))?;
        assert_eq!(first.len(), 1);
        assert!(empty.is_empty());
        assert_eq!(again.instances[0].bbox, first.instances[0].bbox);
        Ok(())
    }

    #[test]
    fn class_name_falls_back_for_unknown_ids() {
        let backend = StubBackend::new(SegmentParams::default());
        assert_eq!(backend.class_name(0), "part");
        assert_eq!(backend.class_name(3), "class3");
    }
}
