//! Page background patterns
//!
//! Patterns are evaluated in page coordinates, so they move with scroll and
//! scale with zoom like any other content.

use crate::images::ImageSource;
use crate::raster::{blend, clip, fill_rect, rgba};
use crate::transform::ViewTransform;
use image::RgbaImage;
use inkpage_model::{Background, Color, IntRect};

/// Distance between rules of the "lined" template
pub const LINE_SPACING: f32 = 80.0;
/// Grid pitch of the "dotted" and "squared" templates
pub const GRID_SPACING: f32 = 40.0;
/// Dot radius of the "dotted" template
pub const DOT_RADIUS: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Template {
    Blank,
    Lined,
    Dotted,
    Squared,
}

impl Template {
    fn parse(name: &str) -> Self {
        match name {
            "lined" => Template::Lined,
            "dotted" => Template::Dotted,
            "squared" => Template::Squared,
            "blank" => Template::Blank,
            other => {
                tracing::debug!(template = other, "Unknown background template, drawing blank");
                Template::Blank
            }
        }
    }
}

/// Distance from `v` to the nearest multiple of `spacing`
fn to_grid(v: f32, spacing: f32) -> f32 {
    let r = v.rem_euclid(spacing);
    r.min(spacing - r)
}

/// Paint the background of `rect` (screen pixels)
///
/// `page_width` is the logical width an image background is stretched to.
pub fn paint_background(
    target: &mut RgbaImage,
    rect: IntRect,
    transform: &ViewTransform,
    background: &Background,
    page_width: f32,
    images: &dyn ImageSource,
) {
    let Some(rect) = clip(target, rect) else {
        return;
    };
    let white = rgba(Color::WHITE);

    match background {
        Background::Blank => fill_rect(target, rect, white),
        Background::Native { template } => {
            let template = Template::parse(template);
            if template == Template::Blank {
                fill_rect(target, rect, white);
                return;
            }
            let ink = rgba(Color::LIGHT_GRAY);
            let half = transform.page_len(0.5).max(0.5);
            for y in rect.top..rect.bottom {
                for x in rect.left..rect.right {
                    let p = transform.pixel_center(x, y);
                    let on = match template {
                        Template::Lined => p.y >= LINE_SPACING && to_grid(p.y, LINE_SPACING) <= half,
                        Template::Squared => {
                            to_grid(p.x, GRID_SPACING) <= half || to_grid(p.y, GRID_SPACING) <= half
                        }
                        Template::Dotted => {
                            let dx = to_grid(p.x, GRID_SPACING);
                            let dy = to_grid(p.y, GRID_SPACING);
                            dx * dx + dy * dy <= DOT_RADIUS * DOT_RADIUS
                        }
                        Template::Blank => false,
                    };
                    target.put_pixel(x as u32, y as u32, if on { ink } else { white });
                }
            }
        }
        Background::Image { uri } => {
            let Some(src) = images.get(uri).filter(|s| s.width() > 0 && s.height() > 0) else {
                fill_rect(target, rect, white);
                return;
            };
            let scale = src.width() as f32 / page_width.max(1.0);
            for y in rect.top..rect.bottom {
                for x in rect.left..rect.right {
                    let p = transform.pixel_center(x, y);
                    let u = p.x * scale;
                    let v = p.y * scale;
                    let mut pixel = white;
                    if u >= 0.0 && v >= 0.0 && (u as u32) < src.width() && (v as u32) < src.height() {
                        blend(&mut pixel, *src.get_pixel(u as u32, v as u32));
                    }
                    target.put_pixel(x as u32, y as u32, pixel);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::{FileImageSource, NoImages};
    use image::Rgba;
    use inkpage_model::Offset;

    fn paint(background: &Background, transform: ViewTransform) -> RgbaImage {
        let mut img = RgbaImage::new(100, 100);
        paint_background(&mut img, IntRect::full(100, 100), &transform, background, 100.0, &NoImages);
        img
    }

    #[test]
    fn test_blank_is_white() {
        let img = paint(&Background::Blank, ViewTransform::default());
        assert!(img.pixels().all(|p| *p == rgba(Color::WHITE)));
        let img = paint(&Background::native("mystery"), ViewTransform::default());
        assert!(img.pixels().all(|p| *p == rgba(Color::WHITE)));
    }

    #[test]
    fn test_lined_follows_scroll() {
        let img = paint(&Background::native("lined"), ViewTransform::default());
        assert_eq!(*img.get_pixel(50, 80), rgba(Color::LIGHT_GRAY));
        assert_eq!(*img.get_pixel(50, 60), rgba(Color::WHITE));

        let scrolled = paint(
            &Background::native("lined"),
            ViewTransform::new(Offset::new(0.0, 20.0), 1.0),
        );
        assert_eq!(*scrolled.get_pixel(50, 60), rgba(Color::LIGHT_GRAY));
    }

    #[test]
    fn test_squared_and_dotted() {
        let img = paint(&Background::native("squared"), ViewTransform::default());
        assert_eq!(*img.get_pixel(40, 13), rgba(Color::LIGHT_GRAY));
        assert_eq!(*img.get_pixel(20, 13), rgba(Color::WHITE));

        let img = paint(&Background::native("dotted"), ViewTransform::default());
        assert_eq!(*img.get_pixel(40, 40), rgba(Color::LIGHT_GRAY));
        assert_eq!(*img.get_pixel(40, 20), rgba(Color::WHITE));
    }

    #[test]
    fn test_image_background_spans_width() {
        let source = FileImageSource::new();
        source.preload("bg", RgbaImage::from_pixel(10, 5, Rgba([0, 0, 255, 255])));
        let mut img = RgbaImage::new(100, 100);
        paint_background(
            &mut img,
            IntRect::full(100, 100),
            &ViewTransform::default(),
            &Background::Image { uri: "bg".into() },
            100.0,
            &source,
        );
        assert_eq!(img.get_pixel(99, 10).0, [0, 0, 255, 255]);
        // Aspect preserved: 10x5 over 100 wide covers 50 rows
        assert_eq!(*img.get_pixel(50, 60), rgba(Color::WHITE));

        let missing = paint(&Background::Image { uri: "nope".into() }, ViewTransform::default());
        assert_eq!(*missing.get_pixel(0, 0), rgba(Color::WHITE));
    }
}
