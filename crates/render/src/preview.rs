//! Low-latency preview layer for in-progress stylus input
//!
//! Only the newest segments are rasterized per batch, into a transparent
//! overlay that is composited over the authoritative surface for
//! presentation. Committing a stroke repaints it properly into the
//! surface and clears the overlay.

use crate::raster::{blend, draw_stroke};
use crate::transform::ViewTransform;
use image::{Rgba, RgbaImage};
use inkpage_model::{Color, IntRect, PageId, Pen, Stroke, StrokePoint};

const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Pen settings of the stroke being previewed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewPen {
    pub pen: Pen,
    pub width: f32,
    pub color: Color,
}

#[derive(Debug)]
pub struct PreviewLayer {
    overlay: RgbaImage,
    pen: Option<PreviewPen>,
    last: Option<StrokePoint>,
    dirty: Option<IntRect>,
}

impl PreviewLayer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            overlay: RgbaImage::from_pixel(width, height, CLEAR),
            pen: None,
            last: None,
            dirty: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.pen.is_some()
    }

    /// Whether the overlay holds pixels not yet cleared or flushed
    pub fn has_content(&self) -> bool {
        self.dirty.is_some()
    }

    pub fn dirty(&self) -> Option<IntRect> {
        self.dirty
    }

    pub fn overlay(&self) -> &RgbaImage {
        &self.overlay
    }

    /// Start a new preview stroke
    pub fn begin(&mut self, pen: PreviewPen) {
        self.pen = Some(pen);
        self.last = None;
    }

    /// Rasterize the segments leading to `points`; returns the screen area touched
    pub fn add_points(&mut self, points: &[StrokePoint], transform: &ViewTransform) -> Option<IntRect> {
        let pen = self.pen?;
        if points.is_empty() {
            return None;
        }
        let mut run = Vec::with_capacity(points.len() + 1);
        run.extend(self.last);
        run.extend_from_slice(points);
        self.last = points.last().copied();

        let mut segment = Stroke::new(PageId::nil(), pen.pen, pen.width, pen.color, run);
        // Preview ignores pressure so the live line never thins mid-stroke
        segment.max_pressure = 0.0;
        let area = transform
            .page_rect_to_pixels(segment.bounds)
            .clip_to(self.overlay.width(), self.overlay.height())?;
        draw_stroke(&mut self.overlay, &segment, transform, area);
        self.dirty = Some(self.dirty.map_or(area, |d| d.union(&area)));
        Some(area)
    }

    /// End the preview stroke; returns the area that must be presented again
    pub fn clear(&mut self) -> Option<IntRect> {
        self.pen = None;
        self.last = None;
        let dirty = self.dirty.take()?;
        crate::raster::fill_rect(&mut self.overlay, dirty, CLEAR);
        Some(dirty)
    }

    /// Burn the overlay into `surface` and clear it, keeping the stroke open
    pub fn flush_into(&mut self, surface: &mut RgbaImage) -> Option<IntRect> {
        let dirty = self.dirty.take()?;
        blend_region(surface, &self.overlay, dirty);
        crate::raster::fill_rect(&mut self.overlay, dirty, CLEAR);
        Some(dirty)
    }

    /// Copy of `surface` with the overlay composited on top
    pub fn composite_over(&self, surface: &RgbaImage) -> RgbaImage {
        let mut out = surface.clone();
        if let Some(dirty) = self.dirty {
            blend_region(&mut out, &self.overlay, dirty);
        }
        out
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        *self = Self::new(width, height);
    }
}

fn blend_region(target: &mut RgbaImage, overlay: &RgbaImage, rect: IntRect) {
    let Some(rect) = rect
        .clip_to(target.width(), target.height())
        .and_then(|r| r.clip_to(overlay.width(), overlay.height()))
    else {
        return;
    };
    for y in rect.top as u32..rect.bottom as u32 {
        for x in rect.left as u32..rect.right as u32 {
            let src = *overlay.get_pixel(x, y);
            blend(target.get_pixel_mut(x, y), src);
        }
    }
}
