use image::{GrayImage, Luma};

/// Axis-aligned box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from the center/size form YOLO heads emit.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &Self) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = ix * iy;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Clamp to `[0, width] x [0, height]`.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }

    /// Integer top-left corner (truncated, like the label anchor).
    pub fn top_left(&self) -> (i32, i32) {
        (self.x1 as i32, self.y1 as i32)
    }
}

/// Binary per-pixel instance mask. Stored as 0/255 luma so it can go through
/// `image` resizing unchanged.
#[derive(Clone, Debug, PartialEq)]
pub struct Mask(GrayImage);

impl Mask {
    pub const ON: Luma<u8> = Luma([255]);
    pub const OFF: Luma<u8> = Luma([0]);

    pub fn empty(width: u32, height: u32) -> Self {
        Self(GrayImage::new(width, height))
    }

    /// Wrap a gray image, treating any non-zero pixel as set.
    pub fn from_gray(image: GrayImage) -> Self {
        let mut image = image;
        for pixel in image.pixels_mut() {
            if pixel.0[0] != 0 {
                *pixel = Self::ON;
            }
        }
        Self(image)
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y).0[0] != 0
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.0
            .put_pixel(x, y, if value { Self::ON } else { Self::OFF });
    }

    /// Number of set pixels.
    pub fn area(&self) -> usize {
        self.0.pixels().filter(|p| p.0[0] != 0).count()
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.0
    }
}

/// One detected part.
#[derive(Clone, Debug)]
pub struct Instance {
    pub class_id: usize,
    /// Confidence in `[0, 1]`.
    pub score: f32,
    pub bbox: BoundingBox,
    pub mask: Mask,
}

/// Everything the model found in a single frame.
#[derive(Clone, Debug, Default)]
pub struct Segmentation {
    pub instances: Vec<Instance>,
}

impl Segmentation {
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&a), 1.0);
        assert_eq!(a.iou(&b), 0.0);

        let half = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&half) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn center_form_and_clamp() {
        let b = BoundingBox::from_center(5.0, 5.0, 20.0, 4.0);
        assert_eq!(b, BoundingBox::new(-5.0, 3.0, 15.0, 7.0));
        assert_eq!(b.clamp_to(10, 10), BoundingBox::new(0.0, 3.0, 10.0, 7.0));
    }

    #[test]
    fn mask_normalizes_nonzero_pixels() {
        let mut gray = GrayImage::new(3, 1);
        gray.put_pixel(1, 0, Luma([7]));
        let mask = Mask::from_gray(gray);
        assert!(mask.get(1, 0));
        assert!(!mask.get(0, 0));
        assert_eq!(mask.as_gray().get_pixel(1, 0).0[0], 255);
        assert_eq!(mask.area(), 1);
    }
}
