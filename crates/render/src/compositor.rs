//! Region compositing: background, then images, then strokes

use crate::background::paint_background;
use crate::images::ImageSource;
use crate::raster::{clip, draw_image, draw_stroke};
use crate::transform::ViewTransform;
use image::RgbaImage;
use inkpage_model::{Background, Image, ImageId, IntRect, Stroke, StrokeId};
use std::collections::HashSet;

/// The vector content of one page, borrowed for a repaint
#[derive(Debug, Clone, Copy)]
pub struct Scene<'a> {
    pub background: &'a Background,
    pub strokes: &'a [Stroke],
    pub images: &'a [Image],
    /// Logical page width an image background is stretched to
    pub page_width: f32,
}

impl<'a> Scene<'a> {
    pub fn new(background: &'a Background, strokes: &'a [Stroke], images: &'a [Image], page_width: f32) -> Self {
        Self {
            background,
            strokes,
            images,
            page_width,
        }
    }
}

/// Items left out of a repaint, typically content being erased or moved
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    pub strokes: HashSet<StrokeId>,
    pub images: HashSet<ImageId>,
}

impl Exclusions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn strokes(ids: impl IntoIterator<Item = StrokeId>) -> Self {
        Self {
            strokes: ids.into_iter().collect(),
            images: HashSet::new(),
        }
    }

    pub fn with_images(mut self, ids: impl IntoIterator<Item = ImageId>) -> Self {
        self.images.extend(ids);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.images.is_empty()
    }
}

/// Repaint `rect` (screen pixels) of `target` from scratch
///
/// Returns the clipped rectangle actually painted, `None` when `rect` lies
/// outside the surface.
pub fn composite(
    target: &mut RgbaImage,
    rect: IntRect,
    transform: &ViewTransform,
    scene: &Scene<'_>,
    exclude: &Exclusions,
    images: &dyn ImageSource,
) -> Option<IntRect> {
    let rect = clip(target, rect)?;
    let page_rect = transform.pixels_to_page(rect);

    paint_background(target, rect, transform, scene.background, scene.page_width, images);

    let mut drawn_images = 0usize;
    for image in scene.images {
        if exclude.images.contains(&image.id) || !image.bounds().intersects(&page_rect) {
            continue;
        }
        let source = images.get(&image.uri);
        draw_image(target, image, source.as_deref(), transform, rect);
        drawn_images += 1;
    }

    let mut drawn_strokes = 0usize;
    for stroke in scene.strokes {
        if exclude.strokes.contains(&stroke.id) || !stroke.bounds.intersects(&page_rect) {
            continue;
        }
        draw_stroke(target, stroke, transform, rect);
        drawn_strokes += 1;
    }

    tracing::trace!(
        left = rect.left,
        top = rect.top,
        width = rect.width(),
        height = rect.height(),
        strokes = drawn_strokes,
        images = drawn_images,
        "Composited region"
    );
    Some(rect)
}
