//! Erase geometry
//!
//! Pen erase removes the points of a stroke that fall within the eraser's
//! reach, along with both ends of any segment the eraser crosses between
//! samples, and splits the rest into surviving runs. Rectangle erase removes
//! every stroke and image whose bounding box lies inside the rectangle.

use crate::raster::distance_to_segment;
use inkpage_model::{Image, Offset, Rect, Stroke, StrokePoint};

/// Shortest run of points kept after a split
pub const MIN_RUN_POINTS: usize = 2;

/// Outcome of an erase pass; the caller applies it as one edit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EraseResult {
    pub removed_strokes: Vec<Stroke>,
    /// Surviving pieces of split strokes, with fresh ids
    pub added_strokes: Vec<Stroke>,
    pub removed_images: Vec<Image>,
    /// Union of the bounds of everything removed or modified
    pub dirty: Option<Rect>,
}

impl EraseResult {
    pub fn is_empty(&self) -> bool {
        self.removed_strokes.is_empty() && self.removed_images.is_empty()
    }

    fn remove_stroke(&mut self, stroke: &Stroke) {
        self.dirty = Rect::union_opt(self.dirty, stroke.bounds);
        self.removed_strokes.push(stroke.clone());
    }
}

/// Split `stroke` at the points for which `erased` holds
///
/// Returns `None` when nothing is erased, otherwise the surviving runs of at
/// least [`MIN_RUN_POINTS`] points (possibly none).
pub fn split_stroke<F>(stroke: &Stroke, erased: F) -> Option<Vec<Stroke>>
where
    F: Fn(&StrokePoint) -> bool,
{
    let mask: Vec<bool> = stroke.points.iter().map(erased).collect();
    split_by_mask(stroke, &mask)
}

fn split_by_mask(stroke: &Stroke, erased: &[bool]) -> Option<Vec<Stroke>> {
    if !erased.iter().any(|e| *e) {
        return None;
    }
    let runs = stroke
        .points
        .iter()
        .zip(erased)
        .collect::<Vec<_>>()
        .split(|(_, gone)| **gone)
        .filter(|run| run.len() >= MIN_RUN_POINTS)
        .map(|run| stroke.with_points(run.iter().map(|(p, _)| **p).collect()))
        .collect();
    Some(runs)
}

/// Distance from `p` to the eraser polyline
fn distance_to_path(p: Offset, path: &[Offset]) -> f32 {
    match path {
        [] => f32::INFINITY,
        [only] => p.distance_to(*only),
        _ => path
            .windows(2)
            .map(|w| distance_to_segment(p, w[0], w[1]).0)
            .fold(f32::INFINITY, f32::min),
    }
}

fn cross(o: Offset, a: Offset, b: Offset) -> f32 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Shortest distance between segments `a0-a1` and `b0-b1`
fn segment_distance(a0: Offset, a1: Offset, b0: Offset, b1: Offset) -> f32 {
    let straddles_b = cross(b0, b1, a0) * cross(b0, b1, a1) < 0.0;
    let straddles_a = cross(a0, a1, b0) * cross(a0, a1, b1) < 0.0;
    if straddles_a && straddles_b {
        return 0.0;
    }
    [
        distance_to_segment(a0, b0, b1).0,
        distance_to_segment(a1, b0, b1).0,
        distance_to_segment(b0, a0, a1).0,
        distance_to_segment(b1, a0, a1).0,
    ]
    .into_iter()
    .fold(f32::INFINITY, f32::min)
}

/// Distance from the stroke segment `a-b` to the eraser polyline
fn segment_distance_to_path(a: Offset, b: Offset, path: &[Offset]) -> f32 {
    match path {
        [] => f32::INFINITY,
        [only] => distance_to_segment(*only, a, b).0,
        _ => path
            .windows(2)
            .map(|w| segment_distance(a, b, w[0], w[1]))
            .fold(f32::INFINITY, f32::min),
    }
}

/// Points of `stroke` removed by the eraser
///
/// A segment crossed by the eraser while both of its ends stay out of
/// reach loses both ends, so a sparse stroke still breaks where it was hit.
fn erased_mask(stroke: &Stroke, path: &[Offset], radius: f32) -> Vec<bool> {
    let mut mask: Vec<bool> = stroke
        .points
        .iter()
        .map(|p| distance_to_path(p.position(), path) <= radius)
        .collect();
    for i in 1..stroke.points.len() {
        if mask[i - 1] || mask[i] {
            continue;
        }
        let (a, b) = (stroke.points[i - 1].position(), stroke.points[i].position());
        if segment_distance_to_path(a, b, path) <= radius {
            mask[i - 1] = true;
            mask[i] = true;
        }
    }
    mask
}

/// Erase along a pen path of radius `radius` (page units)
pub fn erase_with_path(strokes: &[Stroke], path: &[Offset], radius: f32) -> EraseResult {
    let mut result = EraseResult::default();
    let Some(reach) = Rect::bounding(path.iter().copied()).map(|r| r.inflate(radius)) else {
        return result;
    };

    for stroke in strokes.iter().filter(|s| s.bounds.intersects(&reach)) {
        let mask = erased_mask(stroke, path, radius);
        let Some(survivors) = split_by_mask(stroke, &mask) else {
            continue;
        };
        result.remove_stroke(stroke);
        result.added_strokes.extend(survivors);
    }

    tracing::debug!(
        removed = result.removed_strokes.len(),
        added = result.added_strokes.len(),
        "Pen erase"
    );
    result
}

/// Remove strokes and images whose bounds lie entirely inside `area`
pub fn erase_in_rect(strokes: &[Stroke], images: &[Image], area: Rect) -> EraseResult {
    let mut result = EraseResult::default();
    for stroke in strokes.iter().filter(|s| area.contains_rect(&s.bounds)) {
        result.remove_stroke(stroke);
    }
    for image in images.iter().filter(|i| area.contains_rect(&i.bounds())) {
        result.dirty = Rect::union_opt(result.dirty, image.bounds());
        result.removed_images.push(image.clone());
    }
    tracing::debug!(
        strokes = result.removed_strokes.len(),
        images = result.removed_images.len(),
        "Rectangle erase"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkpage_model::{Color, Pen};
    use uuid::Uuid;

    fn five_points() -> Stroke {
        let points = (0..5).map(|i| StrokePoint::new(10.0 + i as f32 * 10.0, 20.0)).collect();
        Stroke::new(Uuid::new_v4(), Pen::Ballpen, 2.0, Color::BLACK, points)
    }

    #[test]
    fn test_erase_middle_point_splits_in_two() {
        let stroke = five_points();
        let result = erase_with_path(&[stroke.clone()], &[Offset::new(30.0, 20.0)], 3.0);

        assert_eq!(result.removed_strokes, vec![stroke.clone()]);
        assert_eq!(result.added_strokes.len(), 2);
        for piece in &result.added_strokes {
            assert_eq!(piece.points.len(), 2);
            assert_ne!(piece.id, stroke.id);
            assert!(piece.validate_bounds().is_ok());
        }
        assert_eq!(result.added_strokes[0].points[1].x, 20.0);
        assert_eq!(result.added_strokes[1].points[0].x, 40.0);
        assert_eq!(result.dirty, Some(stroke.bounds));
    }

    #[test]
    fn test_erase_near_endpoint_keeps_one_run() {
        let stroke = five_points();
        let result = erase_with_path(&[stroke], &[Offset::new(20.0, 20.0)], 3.0);
        // Run [p0] is shorter than two points and is discarded
        assert_eq!(result.added_strokes.len(), 1);
        assert_eq!(result.added_strokes[0].points.len(), 3);
    }

    #[test]
    fn test_erase_miss_changes_nothing() {
        let result = erase_with_path(&[five_points()], &[Offset::new(30.0, 80.0)], 3.0);
        assert!(result.is_empty());
        assert!(result.dirty.is_none());
        assert!(erase_with_path(&[five_points()], &[], 3.0).is_empty());
    }

    #[test]
    fn test_path_segments_erase_between_samples() {
        let stroke = five_points();
        let path = [Offset::new(30.0, 0.0), Offset::new(30.0, 40.0)];
        let result = erase_with_path(&[stroke], &path, 1.0);
        assert_eq!(result.added_strokes.len(), 2);
    }

    #[test]
    fn test_eraser_crossing_sparse_stroke_removes_it() {
        let stroke = Stroke::new(
            Uuid::new_v4(),
            Pen::Ballpen,
            2.0,
            Color::BLACK,
            vec![StrokePoint::new(0.0, 50.0), StrokePoint::new(100.0, 50.0)],
        );
        let path = [Offset::new(50.0, 0.0), Offset::new(50.0, 100.0)];
        let result = erase_with_path(&[stroke.clone()], &path, 5.0);

        assert_eq!(result.removed_strokes, vec![stroke.clone()]);
        assert!(result.added_strokes.is_empty());
        assert_eq!(result.dirty, Some(stroke.bounds));

        // A single eraser sample near the segment's middle counts too
        let tap = erase_with_path(&[stroke], &[Offset::new(50.0, 53.0)], 5.0);
        assert_eq!(tap.removed_strokes.len(), 1);
    }

    #[test]
    fn test_crossed_segment_splits_longer_stroke() {
        let points = [0.0, 40.0, 80.0, 120.0, 160.0, 200.0]
            .iter()
            .map(|x| StrokePoint::new(*x, 10.0))
            .collect();
        let stroke = Stroke::new(Uuid::new_v4(), Pen::Ballpen, 2.0, Color::BLACK, points);
        // Crosses between the samples at x=80 and x=120
        let path = [Offset::new(100.0, -20.0), Offset::new(100.0, 40.0)];
        let result = erase_with_path(&[stroke], &path, 2.0);

        assert_eq!(result.removed_strokes.len(), 1);
        let xs: Vec<Vec<f32>> = result
            .added_strokes
            .iter()
            .map(|s| s.points.iter().map(|p| p.x).collect())
            .collect();
        assert_eq!(xs, vec![vec![0.0, 40.0], vec![160.0, 200.0]]);
    }

    #[test]
    fn test_parallel_eraser_out_of_reach_misses() {
        let stroke = Stroke::new(
            Uuid::new_v4(),
            Pen::Ballpen,
            2.0,
            Color::BLACK,
            vec![StrokePoint::new(0.0, 50.0), StrokePoint::new(100.0, 50.0)],
        );
        let path = [Offset::new(0.0, 60.0), Offset::new(100.0, 60.0)];
        assert!(erase_with_path(&[stroke], &path, 5.0).is_empty());
    }

    #[test]
    fn test_rect_erase_requires_containment() {
        let inside = five_points();
        let image = Image::new(Uuid::new_v4(), 0.0, 0.0, 5.0, 5.0, "a");
        let far = Image::new(Uuid::new_v4(), 200.0, 0.0, 5.0, 5.0, "b");

        let result = erase_in_rect(&[inside.clone()], &[image.clone(), far], Rect::new(-1.0, -1.0, 100.0, 100.0));
        assert_eq!(result.removed_strokes, vec![inside.clone()]);
        assert_eq!(result.removed_images, vec![image]);
        assert!(result.added_strokes.is_empty());

        let partial = erase_in_rect(&[inside], &[], Rect::new(0.0, 0.0, 30.0, 30.0));
        assert!(partial.is_empty());
    }
}
