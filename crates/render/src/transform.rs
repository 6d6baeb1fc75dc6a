//! Screen ↔ page coordinate transforms
//!
//! Page space is the logical, unbounded drawing surface. Screen space is the
//! pixel grid of the viewport surface. `scroll` is the page coordinate shown
//! at the top-left pixel; `zoom` is screen pixels per page unit.

use inkpage_model::{IntRect, Offset, Rect};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub scroll: Offset,
    pub zoom: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            scroll: Offset::default(),
            zoom: 1.0,
        }
    }
}

impl ViewTransform {
    pub fn new(scroll: Offset, zoom: f32) -> Self {
        Self { scroll, zoom }
    }

    pub fn to_screen(&self, page: Rect) -> Rect {
        (page - self.scroll) * self.zoom
    }

    pub fn to_page(&self, screen: Rect) -> Rect {
        screen / self.zoom + self.scroll
    }

    pub fn point_to_screen(&self, page: Offset) -> Offset {
        (page - self.scroll) * self.zoom
    }

    pub fn point_to_page(&self, screen: Offset) -> Offset {
        screen / self.zoom + self.scroll
    }

    /// Page coordinate of the center of pixel `(x, y)`
    pub fn pixel_center(&self, x: i32, y: i32) -> Offset {
        Offset::new(
            (x as f32 + 0.5) / self.zoom + self.scroll.x,
            (y as f32 + 0.5) / self.zoom + self.scroll.y,
        )
    }

    /// Pixels touched by a page rectangle, grown by one pixel for rounding
    pub fn page_rect_to_pixels(&self, page: Rect) -> IntRect {
        self.to_screen(page).round_out().inflate(1)
    }

    /// Page area covered by a pixel rectangle
    pub fn pixels_to_page(&self, pixels: IntRect) -> Rect {
        self.to_page(pixels.to_rect())
    }

    /// Length in page units of `pixels` screen pixels
    pub fn page_len(&self, pixels: f32) -> f32 {
        pixels / self.zoom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let t = ViewTransform::default();
        let r = Rect::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(t.to_screen(r), r);
        assert_eq!(t.to_page(r), r);
    }

    #[test]
    fn test_scroll_and_zoom() {
        let t = ViewTransform::new(Offset::new(10.0, 100.0), 2.0);
        let page = Rect::new(10.0, 100.0, 20.0, 110.0);
        assert_eq!(t.to_screen(page), Rect::new(0.0, 0.0, 20.0, 20.0));
        assert_eq!(t.to_page(Rect::new(0.0, 0.0, 20.0, 20.0)), page);
        assert_eq!(t.pixel_center(0, 0), Offset::new(10.25, 100.25));
    }

    #[test]
    fn test_page_rect_to_pixels_covers_fractional_edges() {
        let t = ViewTransform::new(Offset::new(0.0, 0.0), 1.0);
        let px = t.page_rect_to_pixels(Rect::new(0.4, 0.4, 9.6, 9.6));
        assert!(px.left <= 0 && px.top <= 0);
        assert!(px.right >= 10 && px.bottom >= 10);
    }
}
