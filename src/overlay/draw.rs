use std::convert::Infallible;

use embedded_graphics::{
    draw_target::DrawTarget,
    mono_font::{ascii::FONT_10X20, MonoTextStyle},
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{Polyline, PrimitiveStyle, Rectangle},
    text::{Baseline, Text, TextStyleBuilder},
};
use image::{Rgb, RgbImage};

use super::contour::Contour;

/// Draw `contour` as a closed polyline.
pub fn draw_contour(image: &mut RgbImage, contour: &Contour, color: Rgb<u8>, thickness: u32) {
    let Some(&first) = contour.points.first() else {
        return;
    };
    let points: Vec<Point> = contour
        .points
        .iter()
        .chain(std::iter::once(&first))
        .map(|&(x, y)| Point::new(x, y))
        .collect();
    let style = PrimitiveStyle::with_stroke(to_rgb888(color), thickness.max(1));
    draw_infallible(Polyline::new(&points).into_styled(style), image);
}

/// Fill the rectangle spanning both corners, inclusive.
pub fn fill_rect(image: &mut RgbImage, top_left: (i32, i32), bottom_right: (i32, i32), color: Rgb<u8>) {
    let rect = Rectangle::with_corners(
        Point::new(top_left.0, top_left.1),
        Point::new(bottom_right.0, bottom_right.1),
    );
    draw_infallible(
        rect.into_styled(PrimitiveStyle::with_fill(to_rgb888(color))),
        image,
    );
}

/// Draw `text` left-aligned with its baseline at `origin`.
pub fn draw_text(image: &mut RgbImage, text: &str, origin: (i32, i32), color: Rgb<u8>) {
    let character_style = MonoTextStyle::new(&FONT_10X20, to_rgb888(color));
    let text_style = TextStyleBuilder::new().baseline(Baseline::Alphabetic).build();
    draw_infallible(
        Text::with_text_style(
            text,
            Point::new(origin.0, origin.1),
            character_style,
            text_style,
        ),
        image,
    );
}

fn draw_infallible<D>(drawable: D, image: &mut RgbImage)
where
    D: Drawable<Color = Rgb888>,
{
    match drawable.draw(&mut Target(image)) {
        Ok(_) => {}
        Err(infallible) => match infallible {},
    }
}

fn to_rgb888(color: Rgb<u8>) -> Rgb888 {
    let [r, g, b] = color.0;
    Rgb888::new(r, g, b)
}

struct Target<'a>(&'a mut RgbImage);

impl Dimensions for Target<'_> {
    fn bounding_box(&self) -> Rectangle {
        Rectangle {
            top_left: Point { x: 0, y: 0 },
            size: Size {
                width: self.0.width(),
                height: self.0.height(),
            },
        }
    }
}

impl DrawTarget for Target<'_> {
    type Color = Rgb888;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x >= 0
                && (point.x as u32) < self.0.width()
                && point.y >= 0
                && (point.y as u32) < self.0.height()
            {
                self.0.put_pixel(
                    point.x as u32,
                    point.y as u32,
                    Rgb([color.r(), color.g(), color.b()]),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

    #[test]
    fn contour_is_closed() {
        let mut image = RgbImage::new(20, 20);
        let contour = Contour {
            points: vec![(2, 2), (12, 2), (12, 12), (2, 12)],
        };
        draw_contour(&mut image, &contour, GREEN, 2);
        // Closing edge from (2,12) back to (2,2).
        assert_eq!(*image.get_pixel(2, 7), GREEN);
        assert_eq!(*image.get_pixel(7, 2), GREEN);
        assert_eq!(*image.get_pixel(7, 7), Rgb([0, 0, 0]));
    }

    #[test]
    fn drawing_is_clipped_to_the_image() {
        let mut image = RgbImage::new(10, 10);
        fill_rect(&mut image, (-5, -30), (4, 3), Rgb([9, 9, 9]));
        assert_eq!(*image.get_pixel(0, 0), Rgb([9, 9, 9]));
        assert_eq!(*image.get_pixel(4, 3), Rgb([9, 9, 9]));
        assert_eq!(*image.get_pixel(5, 3), Rgb([0, 0, 0]));
    }

    #[test]
    fn text_lands_above_the_baseline() {
        let mut image = RgbImage::new(80, 40);
        draw_text(&mut image, "FPS", (2, 30), Rgb([255, 255, 0]));
        let lit_rows: Vec<u32> = image
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0 != [0, 0, 0])
            .map(|(_, y, _)| y)
            .collect();
        assert!(!lit_rows.is_empty());
        assert!(lit_rows.iter().all(|&y| y <= 30));
    }
}
