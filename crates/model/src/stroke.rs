//! Vector content of a page: strokes and images
//!
//! Strokes and images are immutable once created. Displacement and resizing
//! produce new objects with fresh ids (replace-via-copy), so history entries
//! can hold plain clones without worrying about later mutation.

use crate::geometry::{Offset, Rect};
use serde::{Deserialize, Serialize};

/// Unique identifier for a page
pub type PageId = uuid::Uuid;

/// Unique identifier for a stroke
pub type StrokeId = uuid::Uuid;

/// Unique identifier for an embedded image
pub type ImageId = uuid::Uuid;

/// Default maximum pressure reported by stylus drivers that do not say otherwise
pub const DEFAULT_MAX_PRESSURE: f32 = 4096.0;

/// RGBA color representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Create a new color
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Same color with a different alpha
    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255, a: 255 };
    pub const GRAY: Color = Color { r: 128, g: 128, b: 128, a: 255 };
    pub const LIGHT_GRAY: Color = Color { r: 200, g: 200, b: 200, a: 255 };
    pub const RED: Color = Color { r: 255, g: 0, b: 0, a: 255 };
    pub const BLUE: Color = Color { r: 0, g: 0, b: 255, a: 255 };
}

/// Pen kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pen {
    Ballpen,
    Pencil,
    Brush,
    Marker,
    Fountain,
}

impl Pen {
    /// Whether the drawn radius follows stylus pressure
    pub fn uses_pressure(&self) -> bool {
        matches!(self, Pen::Pencil | Pen::Brush | Pen::Fountain)
    }

    /// Alpha applied on top of the stroke color
    pub fn opacity(&self) -> u8 {
        match self {
            Pen::Marker => 96,
            Pen::Pencil => 220,
            _ => 255,
        }
    }
}

/// A single stylus sample in page coordinates
///
/// Optional channels (pressure, tilt) use 0 to mean "not reported", which keeps
/// every consumer free of `Option` handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub pressure: f32,
    #[serde(default)]
    pub tilt_x: i32,
    #[serde(default)]
    pub tilt_y: i32,
}

impl StrokePoint {
    /// Point with only coordinates set
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            ..Default::default()
        }
    }

    pub fn with_pressure(mut self, pressure: f32) -> Self {
        self.pressure = pressure;
        self
    }

    pub fn with_tilt(mut self, tilt_x: i32, tilt_y: i32) -> Self {
        self.tilt_x = tilt_x;
        self.tilt_y = tilt_y;
        self
    }

    pub fn position(&self) -> Offset {
        Offset::new(self.x, self.y)
    }

    pub fn translated(&self, delta: Offset) -> Self {
        Self {
            x: self.x + delta.x,
            y: self.y + delta.y,
            ..*self
        }
    }
}

/// Bitmask of optional point channels present anywhere in a stroke
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointMask(u8);

impl PointMask {
    pub const NONE: PointMask = PointMask(0);
    pub const PRESSURE: PointMask = PointMask(0b001);
    pub const TILT_X: PointMask = PointMask(0b010);
    pub const TILT_Y: PointMask = PointMask(0b100);
    pub const ALL: PointMask = PointMask(0b111);

    /// Build a mask from raw bits, rejecting unknown bits
    pub fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::ALL.0 != 0 {
            None
        } else {
            Some(PointMask(bits))
        }
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: PointMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: PointMask) -> Self {
        PointMask(self.0 | other.0)
    }

    /// Mask of channels that are non-default for at least one point
    pub fn of_points(points: &[StrokePoint]) -> Self {
        points.iter().fold(PointMask::NONE, |mask, p| {
            let mut bits = mask.0;
            if p.pressure != 0.0 {
                bits |= Self::PRESSURE.0;
            }
            if p.tilt_x != 0 {
                bits |= Self::TILT_X.0;
            }
            if p.tilt_y != 0 {
                bits |= Self::TILT_Y.0;
            }
            PointMask(bits)
        })
    }
}

/// Bounding box violation detected when inserting a stroke
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("stroke {id} bounding box {bounds:?} does not contain its path inset by {inset}")]
pub struct BoundsViolation {
    pub id: StrokeId,
    pub bounds: Rect,
    pub inset: f32,
}

/// An immutable freehand stroke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: StrokeId,
    pub page_id: PageId,
    pub pen: Pen,
    /// Nominal stroke width in page units
    pub width: f32,
    pub color: Color,
    /// Maximum pressure the capturing device reports
    pub max_pressure: f32,
    /// Bounding box of the path inset by half the width
    pub bounds: Rect,
    pub points: Vec<StrokePoint>,
}

impl Stroke {
    /// Create a stroke with a fresh id, computing its bounding box
    pub fn new(
        page_id: PageId,
        pen: Pen,
        width: f32,
        color: Color,
        points: Vec<StrokePoint>,
    ) -> Self {
        let bounds = Self::compute_bounds(&points, width);
        Self {
            id: uuid::Uuid::new_v4(),
            page_id,
            pen,
            width,
            color,
            max_pressure: DEFAULT_MAX_PRESSURE,
            bounds,
            points,
        }
    }

    /// Bounding box of `points` inset by half of `width`
    pub fn compute_bounds(points: &[StrokePoint], width: f32) -> Rect {
        Rect::bounding(points.iter().map(StrokePoint::position))
            .unwrap_or_default()
            .inflate(width / 2.0)
    }

    /// Half of the nominal width, the largest radius any point is drawn with
    pub fn half_width(&self) -> f32 {
        self.width / 2.0
    }

    /// Check that the stored bounds contain every point plus the half-width inset
    pub fn validate_bounds(&self) -> Result<(), BoundsViolation> {
        let inset = self.half_width();
        let required = Self::compute_bounds(&self.points, self.width);
        if self.points.is_empty() || self.bounds.contains_rect(&required) {
            Ok(())
        } else {
            Err(BoundsViolation {
                id: self.id,
                bounds: self.bounds,
                inset,
            })
        }
    }

    /// Copy of this stroke with a new id and a subset of its points
    pub fn with_points(&self, points: Vec<StrokePoint>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            bounds: Self::compute_bounds(&points, self.width),
            points,
            ..self.clone()
        }
    }

    /// Copy displaced by `delta`, with a new id
    pub fn translated(&self, delta: Offset) -> Self {
        let points: Vec<StrokePoint> = self.points.iter().map(|p| p.translated(delta)).collect();
        Self {
            id: uuid::Uuid::new_v4(),
            bounds: Self::compute_bounds(&points, self.width),
            points,
            ..self.clone()
        }
    }

    /// Copy scaled by `factor` around `origin`, with a new id
    pub fn scaled(&self, factor: f32, origin: Offset) -> Self {
        let points: Vec<StrokePoint> = self
            .points
            .iter()
            .map(|p| StrokePoint {
                x: origin.x + (p.x - origin.x) * factor,
                y: origin.y + (p.y - origin.y) * factor,
                ..*p
            })
            .collect();
        let width = self.width * factor;
        Self {
            id: uuid::Uuid::new_v4(),
            width,
            bounds: Self::compute_bounds(&points, width),
            points,
            ..self.clone()
        }
    }

    /// Copy assigned to another page, with a new id
    pub fn moved_to_page(&self, page_id: PageId) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            page_id,
            ..self.clone()
        }
    }

    /// Optional channels used by this stroke's points
    pub fn point_mask(&self) -> PointMask {
        PointMask::of_points(&self.points)
    }
}

/// An embedded raster image placed on a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,
    pub page_id: PageId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Opaque source reference (URI or filesystem path)
    pub uri: String,
}

impl Image {
    pub fn new(page_id: PageId, x: f32, y: f32, width: f32, height: f32, uri: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            page_id,
            x,
            y,
            width,
            height,
            uri: uri.into(),
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_xywh(self.x, self.y, self.width, self.height)
    }

    /// Copy displaced by `delta`, with a new id
    pub fn translated(&self, delta: Offset) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            x: self.x + delta.x,
            y: self.y + delta.y,
            ..self.clone()
        }
    }

    /// Copy scaled by `factor` around `origin`, with a new id
    pub fn scaled(&self, factor: f32, origin: Offset) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            x: origin.x + (self.x - origin.x) * factor,
            y: origin.y + (self.y - origin.y) * factor,
            width: self.width * factor,
            height: self.height * factor,
            ..self.clone()
        }
    }

    /// Copy assigned to another page, with a new id
    pub fn moved_to_page(&self, page_id: PageId) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            page_id,
            ..self.clone()
        }
    }
}

/// Union of the bounds of a set of strokes
pub fn strokes_bounds<'a, I>(strokes: I) -> Option<Rect>
where
    I: IntoIterator<Item = &'a Stroke>,
{
    strokes
        .into_iter()
        .fold(None, |acc, s| Rect::union_opt(acc, s.bounds))
}

/// Union of the bounds of a set of images
pub fn images_bounds<'a, I>(images: I) -> Option<Rect>
where
    I: IntoIterator<Item = &'a Image>,
{
    images
        .into_iter()
        .fold(None, |acc, i| Rect::union_opt(acc, i.bounds()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(page: PageId) -> Stroke {
        Stroke::new(
            page,
            Pen::Ballpen,
            4.0,
            Color::BLACK,
            vec![StrokePoint::new(10.0, 10.0), StrokePoint::new(30.0, 50.0)],
        )
    }

    #[test]
    fn test_bounds_include_half_width() {
        let stroke = line(PageId::new_v4());
        assert_eq!(stroke.bounds, Rect::new(8.0, 8.0, 32.0, 52.0));
        assert!(stroke.validate_bounds().is_ok());
    }

    #[test]
    fn test_validate_bounds_rejects_tampered_box() {
        let mut stroke = line(PageId::new_v4());
        stroke.bounds = Rect::new(10.0, 10.0, 30.0, 50.0);
        assert!(stroke.validate_bounds().is_err());
    }

    #[test]
    fn test_translated_is_new_stroke() {
        let stroke = line(PageId::new_v4());
        let moved = stroke.translated(Offset::new(5.0, -5.0));
        assert_ne!(moved.id, stroke.id);
        assert_eq!(moved.points[0], StrokePoint::new(15.0, 5.0));
        assert!(moved.validate_bounds().is_ok());
        // Original untouched
        assert_eq!(stroke.points[0], StrokePoint::new(10.0, 10.0));
    }

    #[test]
    fn test_scaled_keeps_invariant() {
        let stroke = line(PageId::new_v4());
        let big = stroke.scaled(2.0, Offset::new(10.0, 10.0));
        assert_eq!(big.width, 8.0);
        assert_eq!(big.points[1], StrokePoint::new(50.0, 90.0));
        assert!(big.validate_bounds().is_ok());
    }

    #[test]
    fn test_point_mask() {
        let points = vec![
            StrokePoint::new(0.0, 0.0),
            StrokePoint::new(1.0, 1.0).with_pressure(120.0),
            StrokePoint::new(2.0, 2.0).with_tilt(0, -4),
        ];
        let mask = PointMask::of_points(&points);
        assert!(mask.contains(PointMask::PRESSURE));
        assert!(!mask.contains(PointMask::TILT_X));
        assert!(mask.contains(PointMask::TILT_Y));
        assert_eq!(mask.bits(), 0b101);
        assert!(PointMask::from_bits(0b1000).is_none());
    }

    #[test]
    fn test_image_bounds() {
        let image = Image::new(PageId::new_v4(), 10.0, 20.0, 100.0, 50.0, "file:///tmp/a.png");
        assert_eq!(image.bounds(), Rect::new(10.0, 20.0, 110.0, 70.0));
        let scaled = image.scaled(0.5, Offset::new(10.0, 20.0));
        assert_eq!(scaled.bounds(), Rect::new(10.0, 20.0, 60.0, 45.0));
    }
}
