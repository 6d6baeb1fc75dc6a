//! Input batches handed to the engine by the stylus/touch driver

use inkpage_model::{Color, Offset, Pen, Rect, StrokePoint};
use inkpage_render::ViewTransform;
use serde::{Deserialize, Serialize};

/// One raw sample in screen pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputPoint {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub pressure: Option<f32>,
    #[serde(default)]
    pub tilt_x: Option<i32>,
    #[serde(default)]
    pub tilt_y: Option<i32>,
    pub timestamp_ms: u64,
}

impl InputPoint {
    pub fn new(x: f32, y: f32, timestamp_ms: u64) -> Self {
        Self {
            x,
            y,
            pressure: None,
            tilt_x: None,
            tilt_y: None,
            timestamp_ms,
        }
    }

    pub fn with_pressure(mut self, pressure: f32) -> Self {
        self.pressure = Some(pressure);
        self
    }

    pub fn with_tilt(mut self, tilt_x: i32, tilt_y: i32) -> Self {
        self.tilt_x = Some(tilt_x);
        self.tilt_y = Some(tilt_y);
        self
    }

    pub fn position(&self) -> Offset {
        Offset::new(self.x, self.y)
    }

    /// Map into page space; missing channels become 0
    pub fn to_page(&self, transform: &ViewTransform) -> StrokePoint {
        let page = transform.point_to_page(self.position());
        StrokePoint {
            x: page.x,
            y: page.y,
            pressure: self.pressure.unwrap_or(0.0),
            tilt_x: self.tilt_x.unwrap_or(0),
            tilt_y: self.tilt_y.unwrap_or(0),
        }
    }
}

/// What the stylus is doing for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputTool {
    Pen,
    Eraser,
    Select,
}

/// An ordered run of samples sharing one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputBatch {
    pub tool: InputTool,
    pub points: Vec<InputPoint>,
}

impl InputBatch {
    pub fn new(tool: InputTool, points: Vec<InputPoint>) -> Self {
        Self { tool, points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn to_page(&self, transform: &ViewTransform) -> Vec<StrokePoint> {
        self.points.iter().map(|p| p.to_page(transform)).collect()
    }

    /// Page-space rectangle spanned by the batch, for rectangle tools
    pub fn page_bounds(&self, transform: &ViewTransform) -> Option<Rect> {
        Rect::bounding(self.points.iter().map(|p| transform.point_to_page(p.position())))
    }
}

/// Editing mode of the control surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditMode {
    #[default]
    Draw,
    Erase,
    Select,
    /// Draw straight segments between the first and last sample
    Line,
}

/// Pen used for new strokes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenSettings {
    pub pen: Pen,
    pub width: f32,
    pub color: Color,
}

impl Default for PenSettings {
    fn default() -> Self {
        Self {
            pen: Pen::Ballpen,
            width: 3.0,
            color: Color::BLACK,
        }
    }
}

/// How the eraser removes content
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EraserKind {
    /// Split strokes where the eraser path passes within `radius`
    Pen { radius: f32 },
    /// Remove everything fully inside the dragged rectangle
    Select,
}

impl Default for EraserKind {
    fn default() -> Self {
        EraserKind::Pen { radius: 10.0 }
    }
}

/// Keep only the endpoints of a sample run
pub fn straighten(points: &[StrokePoint]) -> Vec<StrokePoint> {
    match points {
        [] => Vec::new(),
        [only] => vec![*only],
        [first, .., last] => vec![*first, *last],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_page_applies_transform_and_defaults() {
        let transform = ViewTransform::new(Offset::new(0.0, 100.0), 2.0);
        let p = InputPoint::new(20.0, 40.0, 0).with_pressure(512.0).to_page(&transform);
        assert_eq!((p.x, p.y), (10.0, 120.0));
        assert_eq!(p.pressure, 512.0);
        assert_eq!((p.tilt_x, p.tilt_y), (0, 0));
    }

    #[test]
    fn test_straighten() {
        let pts: Vec<_> = (0..5).map(|i| StrokePoint::new(i as f32, 0.0)).collect();
        assert_eq!(straighten(&pts), vec![pts[0], pts[4]]);
        assert_eq!(straighten(&pts[..1]), vec![pts[0]]);
        assert!(straighten(&[]).is_empty());
    }

    #[test]
    fn test_batch_bounds() {
        let batch = InputBatch::new(
            InputTool::Select,
            vec![InputPoint::new(50.0, 10.0, 0), InputPoint::new(10.0, 30.0, 5)],
        );
        let bounds = batch.page_bounds(&ViewTransform::default()).unwrap();
        assert_eq!(bounds, Rect::new(10.0, 10.0, 50.0, 30.0));
    }
}
