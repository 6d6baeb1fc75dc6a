//! Viewport renderer
//!
//! Owns the authoritative screen-resolution surface of the active page and
//! the transform between it and page space. Scroll and zoom reuse the pixels
//! already on the surface and repaint only what they expose.

use crate::compositor::{composite, Exclusions, Scene};
use crate::config::RenderConfig;
use crate::error::{RenderError, RenderResult};
use crate::images::ImageSource;
use crate::preview::{PreviewLayer, PreviewPen};
use crate::transform::ViewTransform;
use crate::zoom::ZoomPolicy;
use image::RgbaImage;
use inkpage_model::{IntRect, Offset, Rect, Stroke, StrokePoint};
use std::sync::Arc;

/// Result of a scroll request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollOutcome {
    /// Screen pixels the content actually moved by
    pub applied: Offset,
    /// Scroll offset after the request
    pub scroll: Offset,
    /// Whether the surface had to be repainted in full
    pub full_redraw: bool,
}

impl ScrollOutcome {
    pub fn moved(&self) -> bool {
        !self.applied.is_zero()
    }
}

/// Result of a zoom request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomOutcome {
    pub zoom: f32,
    pub scroll: Offset,
    pub changed: bool,
    /// Upscaled pixels stand in for a proper repaint, which is still owed
    pub approximate: bool,
}

pub struct ViewportRenderer {
    config: RenderConfig,
    surface: RgbaImage,
    transform: ViewTransform,
    preview: PreviewLayer,
    zoom_policy: ZoomPolicy,
    images: Arc<dyn ImageSource>,
}

impl std::fmt::Debug for ViewportRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewportRenderer")
            .field("size", &self.surface.dimensions())
            .field("transform", &self.transform)
            .field("config", &self.config)
            .finish()
    }
}

fn check_size(width: u32, height: u32) -> RenderResult<()> {
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidSize { width, height });
    }
    Ok(())
}

/// Whole-pixel scroll step along one axis: new scroll, pixel shift, and
/// whether the shift lands exactly on the pixel grid
fn scroll_axis(scroll: f32, delta_px: f32, zoom: f32) -> (f32, i32, bool) {
    let step = delta_px.round();
    let target = scroll + step / zoom;
    if target >= 0.0 {
        return (target, step as i32, true);
    }
    let shift = -scroll * zoom;
    let px = shift.round();
    (0.0, px as i32, (shift - px).abs() < 1e-3)
}

/// Parts of `full` outside `covered`, each grown by `overlap` into it
fn uncovered_bands(full: IntRect, covered: Option<IntRect>, overlap: i32) -> Vec<IntRect> {
    let Some(c) = covered else {
        return vec![full];
    };
    let mut bands = Vec::with_capacity(4);
    if c.top > full.top {
        bands.push(IntRect::new(full.left, full.top, full.right, c.top + overlap));
    }
    if c.bottom < full.bottom {
        bands.push(IntRect::new(full.left, c.bottom - overlap, full.right, full.bottom));
    }
    if c.left > full.left {
        bands.push(IntRect::new(full.left, c.top, c.left + overlap, c.bottom));
    }
    if c.right < full.right {
        bands.push(IntRect::new(c.right - overlap, c.top, full.right, c.bottom));
    }
    bands
        .into_iter()
        .filter_map(|b| b.intersection(&full))
        .collect()
}

impl ViewportRenderer {
    pub fn new(
        width: u32,
        height: u32,
        config: RenderConfig,
        images: Arc<dyn ImageSource>,
    ) -> RenderResult<Self> {
        check_size(width, height)?;
        config.validate().map_err(RenderError::InvalidConfig)?;
        Ok(Self {
            config,
            surface: RgbaImage::new(width, height),
            transform: ViewTransform::default(),
            preview: PreviewLayer::new(width, height),
            zoom_policy: ZoomPolicy::default(),
            images,
        })
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: RenderConfig) -> RenderResult<()> {
        config.validate().map_err(RenderError::InvalidConfig)?;
        self.config = config;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    pub fn bounds(&self) -> IntRect {
        IntRect::full(self.width(), self.height())
    }

    /// Logical page width: the surface width in page units at zoom 1
    pub fn page_width(&self) -> f32 {
        self.width() as f32
    }

    /// Device aspect ratio used for canonical zoom levels
    pub fn aspect_ratio(&self) -> f32 {
        self.config
            .aspect_ratio
            .unwrap_or(self.width() as f32 / self.height() as f32)
    }

    pub fn transform(&self) -> ViewTransform {
        self.transform
    }

    pub fn scroll(&self) -> Offset {
        self.transform.scroll
    }

    pub fn zoom(&self) -> f32 {
        self.transform.zoom
    }

    /// The authoritative surface, without the preview overlay
    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    pub fn snapshot(&self) -> RgbaImage {
        self.surface.clone()
    }

    /// Surface with the preview overlay composited on top
    pub fn present_with_preview(&self) -> RgbaImage {
        self.preview.composite_over(&self.surface)
    }

    /// Page area currently visible
    pub fn visible_page_rect(&self) -> Rect {
        self.transform.pixels_to_page(self.bounds())
    }

    /// Replace the view without repainting
    pub fn set_view(&mut self, scroll: Offset, zoom: f32) -> RenderResult<()> {
        if !(zoom.is_finite() && zoom > 0.0) {
            return Err(RenderError::InvalidZoom(zoom));
        }
        self.transform = ViewTransform::new(scroll.clamp_non_negative(), zoom);
        self.zoom_policy.reset(zoom);
        Ok(())
    }

    /// Show a previously rendered bitmap together with the view it was taken at
    pub fn load_bitmap(&mut self, bitmap: &RgbaImage, scroll: Offset, zoom: f32) -> RenderResult<()> {
        if bitmap.dimensions() != self.surface.dimensions() {
            return Err(RenderError::SizeMismatch {
                expected: self.surface.dimensions(),
                found: bitmap.dimensions(),
            });
        }
        self.set_view(scroll, zoom)?;
        self.surface = bitmap.clone();
        self.preview.clear();
        Ok(())
    }

    /// Repaint a screen rectangle; returns the clipped area painted
    pub fn draw_region(&mut self, rect: IntRect, scene: &Scene<'_>, exclude: &Exclusions) -> Option<IntRect> {
        composite(
            &mut self.surface,
            rect,
            &self.transform,
            scene,
            exclude,
            self.images.as_ref(),
        )
    }

    /// Repaint the screen area covering a page rectangle
    pub fn draw_page_region(&mut self, page: Rect, scene: &Scene<'_>, exclude: &Exclusions) -> Option<IntRect> {
        let rect = self.transform.page_rect_to_pixels(page);
        self.draw_region(rect, scene, exclude)
    }

    pub fn redraw_all(&mut self, scene: &Scene<'_>) -> IntRect {
        let full = self.bounds();
        self.draw_region(full, scene, &Exclusions::none());
        full
    }

    /// Scroll by `delta` screen pixels
    ///
    /// The in-flight preview is burnt into the surface first so it moves with
    /// the content. Scroll never goes negative.
    pub fn scroll_by(&mut self, delta: Offset, scene: &Scene<'_>) -> ScrollOutcome {
        self.preview.flush_into(&mut self.surface);

        let zoom = self.transform.zoom;
        let old = self.transform.scroll;
        let (sx, dx, exact_x) = scroll_axis(old.x, delta.x, zoom);
        let (sy, dy, exact_y) = scroll_axis(old.y, delta.y, zoom);
        let scroll = Offset::new(sx, sy);

        if dx == 0 && dy == 0 && scroll == old {
            return ScrollOutcome {
                applied: Offset::ZERO,
                scroll,
                full_redraw: false,
            };
        }
        self.transform.scroll = scroll;
        let applied = Offset::new(dx as f32, dy as f32);

        let (w, h) = (self.width() as i32, self.height() as i32);
        let full_redraw = self.config.simple_rendering
            || !(exact_x && exact_y)
            || dx.abs() >= w
            || dy.abs() >= h;
        if full_redraw {
            self.redraw_all(scene);
        } else {
            self.shift_pixels(dx, dy);
            let covered = IntRect::new((-dx).max(0), (-dy).max(0), (w - dx).min(w), (h - dy).min(h));
            let overlap = self.config.overlap_at(zoom);
            for band in uncovered_bands(self.bounds(), Some(covered), overlap) {
                self.draw_region(band, scene, &Exclusions::none());
            }
        }

        tracing::debug!(
            dx,
            dy,
            scroll_x = scroll.x,
            scroll_y = scroll.y,
            full_redraw,
            "Scrolled viewport"
        );
        ScrollOutcome {
            applied,
            scroll,
            full_redraw,
        }
    }

    /// Move surface pixels so that `new(x, y) = old(x + dx, y + dy)`
    fn shift_pixels(&mut self, dx: i32, dy: i32) {
        let (w, h) = (self.width() as i32, self.height() as i32);
        let mut shifted = RgbaImage::new(w as u32, h as u32);
        for y in 0..h {
            let sy = y + dy;
            if sy < 0 || sy >= h {
                continue;
            }
            for x in 0..w {
                let sx = x + dx;
                if sx < 0 || sx >= w {
                    continue;
                }
                shifted.put_pixel(x as u32, y as u32, *self.surface.get_pixel(sx as u32, sy as u32));
            }
        }
        self.surface = shifted;
    }

    /// Zoom by a multiplicative `factor` about `pivot` (screen pixels)
    pub fn zoom_by(&mut self, factor: f32, pivot: Offset, scene: &Scene<'_>) -> RenderResult<ZoomOutcome> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(RenderError::InvalidZoom(factor));
        }
        self.preview.flush_into(&mut self.surface);

        let old = self.transform;
        let aspect = self.aspect_ratio();
        let zoom = if self.config.continuous_zoom {
            self.zoom_policy.continuous(factor, aspect, &self.config)
        } else {
            self.zoom_policy.discrete(old.zoom, factor, aspect, &self.config)
        };
        if zoom == old.zoom {
            return Ok(ZoomOutcome {
                zoom,
                scroll: old.scroll,
                changed: false,
                approximate: false,
            });
        }

        let pivot_page = old.point_to_page(pivot);
        let scroll = (pivot_page - pivot / zoom).clamp_non_negative();
        let new = ViewTransform::new(scroll, zoom);
        self.transform = new;

        let approximate = if self.config.continuous_zoom && !self.config.simple_rendering {
            let covered = self.scale_surface(old, new);
            let overlap = self.config.overlap_at(zoom);
            for band in uncovered_bands(self.bounds(), covered, overlap) {
                self.draw_region(band, scene, &Exclusions::none());
            }
            zoom > old.zoom
        } else {
            self.redraw_all(scene);
            false
        };

        tracing::debug!(from = old.zoom, to = zoom, approximate, "Zoomed viewport");
        Ok(ZoomOutcome {
            zoom,
            scroll,
            changed: true,
            approximate,
        })
    }

    /// Resample the surface from `old` to `new` view, nearest neighbor.
    /// Returns the screen area fully covered by old pixels.
    fn scale_surface(&mut self, old: ViewTransform, new: ViewTransform) -> Option<IntRect> {
        let s = new.zoom / old.zoom;
        let origin = (old.scroll - new.scroll) * new.zoom;
        let (w, h) = (self.width(), self.height());
        let mut scaled = RgbaImage::new(w, h);

        for y in 0..h {
            let sy = ((y as f32 + 0.5 - origin.y) / s).floor();
            if sy < 0.0 || sy >= h as f32 {
                continue;
            }
            for x in 0..w {
                let sx = ((x as f32 + 0.5 - origin.x) / s).floor();
                if sx < 0.0 || sx >= w as f32 {
                    continue;
                }
                scaled.put_pixel(x, y, *self.surface.get_pixel(sx as u32, sy as u32));
            }
        }
        self.surface = scaled;

        IntRect::new(
            origin.x.ceil() as i32,
            origin.y.ceil() as i32,
            (origin.x + w as f32 * s).floor() as i32,
            (origin.y + h as f32 * s).floor() as i32,
        )
        .intersection(&self.bounds())
    }

    /// Back to zoom 1 with the horizontal scroll reset, repainted in full
    pub fn reset_zoom(&mut self, scene: &Scene<'_>) -> IntRect {
        self.preview.flush_into(&mut self.surface);
        self.transform = ViewTransform::new(Offset::new(0.0, self.transform.scroll.y), 1.0);
        self.zoom_policy.reset(1.0);
        self.redraw_all(scene)
    }

    /// Recreate the surface at a new size; zoom returns to 1
    pub fn resize(&mut self, width: u32, height: u32, scene: &Scene<'_>) -> RenderResult<IntRect> {
        check_size(width, height)?;
        self.surface = RgbaImage::new(width, height);
        self.preview.resize(width, height);
        self.transform.zoom = 1.0;
        self.zoom_policy.reset(1.0);
        tracing::info!(width, height, "Viewport resized");
        Ok(self.redraw_all(scene))
    }

    pub fn begin_preview(&mut self, pen: PreviewPen) {
        self.preview.begin(pen);
    }

    /// Rasterize live input (page coordinates) into the preview layer
    pub fn preview_points(&mut self, points: &[StrokePoint]) -> Option<IntRect> {
        self.preview.add_points(points, &self.transform)
    }

    pub fn is_previewing(&self) -> bool {
        self.preview.is_active()
    }

    /// Drop the preview without committing anything
    pub fn cancel_preview(&mut self) -> Option<IntRect> {
        self.preview.clear()
    }

    /// Rasterize a finished stroke into the surface and clear the preview
    ///
    /// `scene` must already contain the stroke. Returns the screen area to
    /// present again.
    pub fn commit_stroke(&mut self, stroke: &Stroke, scene: &Scene<'_>) -> Option<IntRect> {
        let cleared = self.preview.clear();
        let drawn = self.draw_page_region(stroke.bounds, scene, &Exclusions::none());
        match (cleared, drawn) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        }
    }
}
