use image::imageops::{self, FilterType};

use crate::segment::Mask;

/// Resize `mask` to `width`x`height` with nearest-neighbour sampling.
///
/// Masks already at the target size are cloned as-is.
pub fn resize_to_frame(mask: &Mask, width: u32, height: u32) -> Mask {
    if mask.width() == width && mask.height() == height {
        return mask.clone();
    }
    if mask.width() == 0 || mask.height() == 0 {
        return Mask::empty(width, height);
    }
    Mask::from_gray(imageops::resize(
        mask.as_gray(),
        width,
        height,
        FilterType::Nearest,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upscaled_mask_keeps_its_footprint() {
        let mut mask = Mask::empty(4, 4);
        mask.set(1, 1, true);
        mask.set(2, 1, true);
        let resized = resize_to_frame(&mask, 8, 8);
        assert_eq!(resized.width(), 8);
        assert_eq!(resized.area(), 8);
        assert!(resized.get(2, 2));
        assert!(resized.get(5, 3));
        assert!(!resized.get(0, 0));
    }

    #[test]
    fn same_size_is_unchanged() {
        let mut mask = Mask::empty(3, 2);
        mask.set(2, 1, true);
        assert_eq!(resize_to_frame(&mask, 3, 2), mask);
    }

    #[test]
    fn degenerate_mask_becomes_empty() {
        let resized = resize_to_frame(&Mask::empty(0, 0), 5, 5);
        assert_eq!(resized.area(), 0);
        assert_eq!(resized.width(), 5);
    }
}
