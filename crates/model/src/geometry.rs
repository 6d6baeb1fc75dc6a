//! Page and screen geometry
//!
//! Page space is logically unbounded with the origin at the top-left of the
//! page, x growing right and y growing down. Screen space is the pixel grid of
//! the windowed surface. `Rect` is used for page-space regions and `IntRect`
//! for pixel regions.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A 2D offset or point in page coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    pub x: f32,
    pub y: f32,
}

impl Offset {
    pub const ZERO: Offset = Offset { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another offset
    pub fn distance_to(&self, other: Offset) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Clamp both components so neither goes below zero
    pub fn clamp_non_negative(self) -> Self {
        Self {
            x: self.x.max(0.0),
            y: self.y.max(0.0),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

impl Add for Offset {
    type Output = Offset;

    fn add(self, rhs: Offset) -> Offset {
        Offset::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Offset {
    type Output = Offset;

    fn sub(self, rhs: Offset) -> Offset {
        Offset::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Offset {
    type Output = Offset;

    fn mul(self, rhs: f32) -> Offset {
        Offset::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f32> for Offset {
    type Output = Offset;

    fn div(self, rhs: f32) -> Offset {
        Offset::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Offset {
    type Output = Offset;

    fn neg(self) -> Offset {
        Offset::new(-self.x, -self.y)
    }
}

/// Axis-aligned rectangle in page coordinates
///
/// Edges are inclusive on `left`/`top` and exclusive on `right`/`bottom` when
/// converted to pixels. An empty rectangle has `right <= left` or
/// `bottom <= top`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Build a rectangle from origin and size
    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    /// Smallest rectangle containing every point, or `None` for an empty iterator
    pub fn bounding<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Offset>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut rect = Rect::new(first.x, first.y, first.x, first.y);
        for p in iter {
            rect.left = rect.left.min(p.x);
            rect.top = rect.top.min(p.y);
            rect.right = rect.right.max(p.x);
            rect.bottom = rect.bottom.max(p.y);
        }
        Some(rect)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Grow (positive) or shrink (negative) every edge by `amount`
    pub fn inflate(&self, amount: f32) -> Self {
        Self::new(
            self.left - amount,
            self.top - amount,
            self.right + amount,
            self.bottom + amount,
        )
    }

    pub fn translate(&self, delta: Offset) -> Self {
        Self::new(
            self.left + delta.x,
            self.top + delta.y,
            self.right + delta.x,
            self.bottom + delta.y,
        )
    }

    pub fn scale(&self, factor: f32) -> Self {
        Self::new(
            self.left * factor,
            self.top * factor,
            self.right * factor,
            self.bottom * factor,
        )
    }

    /// Union of two rectangles (bounding box of both)
    pub fn union(&self, other: &Rect) -> Self {
        Self::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    /// Union over an optional accumulator, handy when folding dirty regions
    pub fn union_opt(acc: Option<Rect>, other: Rect) -> Option<Rect> {
        Some(match acc {
            Some(rect) => rect.union(&other),
            None => other,
        })
    }

    /// Intersection of two rectangles, `None` when they do not overlap
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let rect = Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        if rect.is_empty() {
            None
        } else {
            Some(rect)
        }
    }

    /// Whether the two rectangles overlap or touch
    pub fn intersects(&self, other: &Rect) -> bool {
        self.left <= other.right
            && other.left <= self.right
            && self.top <= other.bottom
            && other.top <= self.bottom
    }

    /// Whether `other` lies entirely inside this rectangle
    pub fn contains_rect(&self, other: &Rect) -> bool {
        self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }

    pub fn contains_point(&self, p: Offset) -> bool {
        p.x >= self.left && p.x <= self.right && p.y >= self.top && p.y <= self.bottom
    }

    /// Smallest pixel rectangle covering this rectangle
    pub fn round_out(&self) -> IntRect {
        IntRect::new(
            self.left.floor() as i32,
            self.top.floor() as i32,
            self.right.ceil() as i32,
            self.bottom.ceil() as i32,
        )
    }
}

impl Sub<Offset> for Rect {
    type Output = Rect;

    fn sub(self, rhs: Offset) -> Rect {
        self.translate(-rhs)
    }
}

impl Add<Offset> for Rect {
    type Output = Rect;

    fn add(self, rhs: Offset) -> Rect {
        self.translate(rhs)
    }
}

impl Mul<f32> for Rect {
    type Output = Rect;

    fn mul(self, rhs: f32) -> Rect {
        self.scale(rhs)
    }
}

impl Div<f32> for Rect {
    type Output = Rect;

    fn div(self, rhs: f32) -> Rect {
        self.scale(1.0 / rhs)
    }
}

/// Pixel rectangle on the windowed surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl IntRect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle covering a whole `width` x `height` surface
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    pub fn inflate(&self, amount: i32) -> Self {
        Self::new(
            self.left - amount,
            self.top - amount,
            self.right + amount,
            self.bottom + amount,
        )
    }

    pub fn union(&self, other: &IntRect) -> Self {
        Self::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    pub fn intersection(&self, other: &IntRect) -> Option<IntRect> {
        let rect = IntRect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        if rect.is_empty() {
            None
        } else {
            Some(rect)
        }
    }

    /// Clip to a `width` x `height` surface
    pub fn clip_to(&self, width: u32, height: u32) -> Option<IntRect> {
        self.intersection(&IntRect::full(width, height))
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(
            self.left as f32,
            self.top as f32,
            self.right as f32,
            self.bottom as f32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_rect() {
        let rect = Rect::bounding(vec![
            Offset::new(3.0, 4.0),
            Offset::new(-1.0, 10.0),
            Offset::new(5.0, 2.0),
        ])
        .expect("non-empty input");
        assert_eq!(rect, Rect::new(-1.0, 2.0, 5.0, 10.0));
        assert!(Rect::bounding(Vec::new()).is_none());
    }

    #[test]
    fn test_union_and_intersection() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 20.0, 20.0);
        assert_eq!(a.union(&b), Rect::new(0.0, 0.0, 20.0, 20.0));
        assert_eq!(a.intersection(&b), Some(Rect::new(5.0, 5.0, 10.0, 10.0)));

        let far = Rect::new(50.0, 50.0, 60.0, 60.0);
        assert!(a.intersection(&far).is_none());
        assert!(!a.intersects(&far));
    }

    #[test]
    fn test_round_out_covers_fractional_edges() {
        let rect = Rect::new(0.5, 1.2, 10.1, 10.9);
        assert_eq!(rect.round_out(), IntRect::new(0, 1, 11, 11));
    }

    #[test]
    fn test_int_rect_clip() {
        let rect = IntRect::new(-10, -10, 50, 50);
        assert_eq!(rect.clip_to(20, 30), Some(IntRect::new(0, 0, 20, 30)));
        assert!(IntRect::new(30, 30, 40, 40).clip_to(20, 20).is_none());
    }

    #[test]
    fn test_offset_clamp() {
        assert_eq!(
            Offset::new(-3.0, 4.0).clamp_non_negative(),
            Offset::new(0.0, 4.0)
        );
    }
}
