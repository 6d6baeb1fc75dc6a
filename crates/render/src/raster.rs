//! Deterministic software rasterizer
//!
//! Every pixel is decided from the page coordinate of its center alone, so
//! repainting any sub-rectangle reproduces exactly what a full repaint
//! would have produced there. No anti-aliasing.

use crate::transform::ViewTransform;
use image::{Rgba, RgbaImage};
use inkpage_model::{Color, Image, IntRect, Offset, Rect, Stroke, StrokePoint};

/// Smallest fraction of the nominal width a pressure-sensitive pen draws
pub const MIN_PRESSURE_SCALE: f32 = 0.25;

pub fn rgba(color: Color) -> Rgba<u8> {
    Rgba(color.to_rgba())
}

/// Source-over blend of straight-alpha `src` onto `dst`
pub fn blend(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    let sa = src.0[3] as u64;
    if sa == 255 {
        *dst = src;
        return;
    }
    if sa == 0 {
        return;
    }
    let da = dst.0[3] as u64;
    let out = sa * 255 + da * (255 - sa);
    if out == 0 {
        return;
    }
    for i in 0..3 {
        let c = src.0[i] as u64 * sa * 255 + dst.0[i] as u64 * da * (255 - sa);
        dst.0[i] = ((c + out / 2) / out) as u8;
    }
    dst.0[3] = ((out + 127) / 255) as u8;
}

/// Clip a pixel rectangle to the image bounds
pub fn clip(image: &RgbaImage, rect: IntRect) -> Option<IntRect> {
    rect.clip_to(image.width(), image.height())
}

pub fn fill_rect(image: &mut RgbaImage, rect: IntRect, color: Rgba<u8>) {
    let Some(rect) = clip(image, rect) else {
        return;
    };
    for y in rect.top..rect.bottom {
        for x in rect.left..rect.right {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

/// Radius in page units a stroke is drawn with at `point`
///
/// Pressure-sensitive pens scale with pressure; 0 means not reported.
pub fn point_radius(stroke: &Stroke, point: &StrokePoint) -> f32 {
    let half = stroke.half_width();
    if !stroke.pen.uses_pressure() || point.pressure <= 0.0 || stroke.max_pressure <= 0.0 {
        return half;
    }
    half * (point.pressure / stroke.max_pressure).clamp(MIN_PRESSURE_SCALE, 1.0)
}

/// Distance from `p` to segment `a`-`b`, and the projection parameter in [0, 1]
pub fn distance_to_segment(p: Offset, a: Offset, b: Offset) -> (f32, f32) {
    let ab = b - a;
    let len2 = ab.x * ab.x + ab.y * ab.y;
    let t = if len2 <= f32::EPSILON {
        0.0
    } else {
        (((p.x - a.x) * ab.x + (p.y - a.y) * ab.y) / len2).clamp(0.0, 1.0)
    };
    let closest = a + ab * t;
    (p.distance_to(closest), t)
}

/// Rasterize a stroke into `image`, touching only pixels inside `clip_rect`
///
/// Coverage is computed for the whole stroke before blending so
/// translucent pens do not darken where segments overlap.
pub fn draw_stroke(image: &mut RgbaImage, stroke: &Stroke, transform: &ViewTransform, clip_rect: IntRect) {
    if stroke.points.is_empty() {
        return;
    }
    let Some(region) = transform
        .page_rect_to_pixels(stroke.bounds)
        .intersection(&clip_rect)
        .and_then(|r| clip(image, r))
    else {
        return;
    };

    let min_radius = transform.page_len(0.5);
    let radii: Vec<f32> = stroke
        .points
        .iter()
        .map(|p| point_radius(stroke, p).max(min_radius))
        .collect();

    let w = region.width() as usize;
    let mut mask = vec![false; w * region.height() as usize];

    let mut cover = |a: Offset, b: Offset, ra: f32, rb: f32| {
        let reach = ra.max(rb);
        let seg = Rect::new(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y))
            .inflate(reach);
        let Some(px) = transform.page_rect_to_pixels(seg).intersection(&region) else {
            return;
        };
        for y in px.top..px.bottom {
            for x in px.left..px.right {
                let c = transform.pixel_center(x, y);
                let (dist, t) = distance_to_segment(c, a, b);
                if dist <= ra + (rb - ra) * t {
                    mask[(y - region.top) as usize * w + (x - region.left) as usize] = true;
                }
            }
        }
    };

    if stroke.points.len() == 1 {
        let p = stroke.points[0].position();
        cover(p, p, radii[0], radii[0]);
    } else {
        for (i, pair) in stroke.points.windows(2).enumerate() {
            cover(pair[0].position(), pair[1].position(), radii[i], radii[i + 1]);
        }
    }

    let alpha = (stroke.color.a as u32 * stroke.pen.opacity() as u32 / 255) as u8;
    let color = rgba(stroke.color.with_alpha(alpha));
    for (i, covered) in mask.iter().enumerate() {
        if *covered {
            let x = region.left as u32 + (i % w) as u32;
            let y = region.top as u32 + (i / w) as u32;
            blend(image.get_pixel_mut(x, y), color);
        }
    }
}

/// Draw an embedded image, or a placeholder when its source is unavailable
pub fn draw_image(
    image: &mut RgbaImage,
    placed: &Image,
    source: Option<&RgbaImage>,
    transform: &ViewTransform,
    clip_rect: IntRect,
) {
    let bounds = placed.bounds();
    if bounds.is_empty() {
        return;
    }
    let Some(region) = transform
        .page_rect_to_pixels(bounds)
        .intersection(&clip_rect)
        .and_then(|r| clip(image, r))
    else {
        return;
    };

    let placeholder = rgba(Color::LIGHT_GRAY);
    for y in region.top..region.bottom {
        for x in region.left..region.right {
            let c = transform.pixel_center(x, y);
            if c.x < bounds.left || c.x >= bounds.right || c.y < bounds.top || c.y >= bounds.bottom {
                continue;
            }
            let pixel = image.get_pixel_mut(x as u32, y as u32);
            match source {
                Some(src) if src.width() > 0 && src.height() > 0 => {
                    let u = ((c.x - bounds.left) / bounds.width() * src.width() as f32) as u32;
                    let v = ((c.y - bounds.top) / bounds.height() * src.height() as f32) as u32;
                    let sample = *src.get_pixel(u.min(src.width() - 1), v.min(src.height() - 1));
                    blend(pixel, sample);
                }
                _ => *pixel = placeholder,
            }
        }
    }
}
