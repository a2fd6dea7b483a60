//! Debug overlay rendering.
//!
//! This module is responsible for:
//! - resizing each instance mask to the frame
//! - outlining the mask's external contours
//! - stamping a class/score label above each instance
//! - drawing the frame-rate readout
//!
//! It MUST NOT run inference or touch the display; it only mutates pixels.

mod contour;
mod draw;
mod fps;
mod mask;

use image::{Rgb, RgbImage};

use crate::segment::{Instance, Segmentation};

pub use contour::{find_external_contours, Contour};
pub use draw::{draw_contour, draw_text, fill_rect};
pub use fps::{fps_from_elapsed, fps_text, FpsMeter};
pub use mask::resize_to_frame;

/// Colours and geometry of the overlay. Defaults reproduce the inspector's
/// debug look.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayStyle {
    pub contour_color: Rgb<u8>,
    pub contour_thickness: u32,
    pub label_background: Rgb<u8>,
    pub label_color: Rgb<u8>,
    /// Label box size; the box sits directly above the label anchor.
    pub label_box: (i32, i32),
    /// Distance from the label anchor up to the text baseline.
    pub label_baseline_offset: i32,
    pub fps_color: Rgb<u8>,
    pub fps_origin: (i32, i32),
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            contour_color: Rgb([0, 255, 0]),
            contour_thickness: 2,
            label_background: Rgb([0, 0, 0]),
            label_color: Rgb([255, 255, 255]),
            label_box: (200, 30),
            label_baseline_offset: 5,
            fps_color: Rgb([255, 255, 0]),
            fps_origin: (20, 40),
        }
    }
}

/// What was drawn for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OverlayStats {
    pub instances: usize,
    pub contours: usize,
}

/// `"<name> <percent>%"`, with the percentage truncated.
pub fn label_text(name: &str, score: f32) -> String {
    format!("{} {}%", name, (score * 100.0) as i32)
}

/// Draw contours and labels for every instance, in result order.
///
/// `class_name` maps a class id to its display name.
pub fn annotate<F>(
    image: &mut RgbImage,
    segmentation: &Segmentation,
    style: &OverlayStyle,
    class_name: F,
) -> OverlayStats
where
    F: Fn(usize) -> String,
{
    let mut stats = OverlayStats::default();
    for instance in &segmentation.instances {
        stats.contours += draw_instance(image, instance, style, &class_name);
        stats.instances += 1;
    }
    stats
}

fn draw_instance<F>(image: &mut RgbImage, instance: &Instance, style: &OverlayStyle, class_name: &F) -> usize
where
    F: Fn(usize) -> String,
{
    let mask = resize_to_frame(&instance.mask, image.width(), image.height());
    let contours = find_external_contours(&mask);
    for contour in &contours {
        draw_contour(image, contour, style.contour_color, style.contour_thickness);
    }

    let (x, y) = instance.bbox.top_left();
    let (box_w, box_h) = style.label_box;
    fill_rect(image, (x, y - box_h), (x + box_w, y), style.label_background);
    let text = label_text(&class_name(instance.class_id), instance.score);
    draw_text(
        image,
        &text,
        (x, y - style.label_baseline_offset),
        style.label_color,
    );
    contours.len()
}

/// Draw the `FPS: N` readout.
pub fn draw_fps(image: &mut RgbImage, fps: f32, style: &OverlayStyle) {
    draw_text(image, &fps_text(fps), style.fps_origin, style.fps_color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{BoundingBox, Mask};

    fn square_instance(frame_w: u32, frame_h: u32) -> Instance {
        let mut mask = Mask::empty(frame_w, frame_h);
        for y in 60..100 {
            for x in 40..120 {
                mask.set(x, y, true);
            }
        }
        Instance {
            class_id: 0,
            score: 0.876,
            bbox: BoundingBox::new(40.0, 60.0, 120.0, 100.0),
            mask,
        }
    }

    #[test]
    fn label_truncates_percentage() {
        assert_eq!(label_text("impeller", 0.876), "impeller 87%");
        assert_eq!(label_text("seal", 1.0), "seal 100%");
        assert_eq!(label_text("x", 0.0), "x 0%");
    }

    #[test]
    fn annotate_draws_contour_and_label() {
        let mut image = RgbImage::from_pixel(320, 240, Rgb([50, 50, 50]));
        let seg = Segmentation {
            instances: vec![square_instance(320, 240)],
        };
        let style = OverlayStyle::default();
        let stats = annotate(&mut image, &seg, &style, |_| "impeller".to_string());

        assert_eq!(stats, OverlayStats { instances: 1, contours: 1 });
        // Right edge of the part is outlined.
        assert_eq!(*image.get_pixel(119, 80), style.contour_color);
        // Inside the part is untouched.
        assert_eq!(*image.get_pixel(80, 80), Rgb([50, 50, 50]));
        // Label box spans (40,30)-(240,60); its far corner has no glyphs.
        assert_eq!(*image.get_pixel(235, 35), style.label_background);
        assert_eq!(*image.get_pixel(240, 59), style.label_background);
        assert_ne!(*image.get_pixel(241, 59), style.label_background);
        assert_ne!(*image.get_pixel(240, 29), style.label_background);
        let white = image
            .enumerate_pixels()
            .filter(|(x, y, p)| (40..=240).contains(x) && (30..60).contains(y) && **p == style.label_color)
            .count();
        assert!(white > 0);
    }

    #[test]
    fn label_text_sits_on_the_baseline() {
        let mut image = RgbImage::from_pixel(320, 240, Rgb([50, 50, 50]));
        let seg = Segmentation {
            instances: vec![square_instance(320, 240)],
        };
        let style = OverlayStyle::default();
        annotate(&mut image, &seg, &style, |_| "seal".to_string());

        // No descenders in "seal 87%", so nothing is drawn under the baseline.
        let white: Vec<(u32, u32)> = image
            .enumerate_pixels()
            .filter(|(_, _, p)| **p == style.label_color)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!white.is_empty());
        assert!(white.iter().all(|&(x, y)| (40..=240).contains(&x) && (30..=55).contains(&y)));
        assert!(white.iter().any(|&(_, y)| y >= 50));
    }

    #[test]
    fn low_resolution_masks_are_scaled_up() {
        let mut image = RgbImage::new(320, 240);
        let mut instance = square_instance(320, 240);
        instance.mask = resize_to_frame(&instance.mask, 80, 60);
        let seg = Segmentation {
            instances: vec![instance],
        };
        annotate(&mut image, &seg, &OverlayStyle::default(), |_| "p".into());
        assert_eq!(*image.get_pixel(119, 80), Rgb([0, 255, 0]));
    }

    #[test]
    fn label_near_top_edge_is_clipped() {
        let mut image = RgbImage::new(320, 240);
        let mut instance = square_instance(320, 240);
        instance.bbox = BoundingBox::new(40.0, 10.0, 120.0, 100.0);
        let seg = Segmentation {
            instances: vec![instance],
        };
        let stats = annotate(&mut image, &seg, &OverlayStyle::default(), |_| "p".into());
        assert_eq!(stats.instances, 1);
    }

    #[test]
    fn fps_readout_is_yellow() {
        let mut image = RgbImage::new(200, 80);
        draw_fps(&mut image, 24.6, &OverlayStyle::default());
        assert!(image.pixels().any(|p| *p == Rgb([255, 255, 0])));
    }
}
