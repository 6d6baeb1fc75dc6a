//! Rectangular selection and the edits derived from it

use crate::history::{Operation, OperationGroup};
use inkpage_model::{images_bounds, strokes_bounds, Image, Offset, PageId, Rect, Stroke};

/// Strokes and images currently selected on one page
///
/// Holds copies of the objects; content is immutable, so a copy stays valid
/// until the page changes it through an edit that also replaces the
/// selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub page_id: PageId,
    pub strokes: Vec<Stroke>,
    pub images: Vec<Image>,
}

impl Selection {
    pub fn new(page_id: PageId, strokes: Vec<Stroke>, images: Vec<Image>) -> Self {
        Self {
            page_id,
            strokes,
            images,
        }
    }

    /// Select everything whose bounding box intersects `area`
    pub fn from_region(page_id: PageId, strokes: &[Stroke], images: &[Image], area: Rect) -> Self {
        Self {
            page_id,
            strokes: strokes.iter().filter(|s| s.bounds.intersects(&area)).cloned().collect(),
            images: images.iter().filter(|i| i.bounds().intersects(&area)).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.images.is_empty()
    }

    pub fn len(&self) -> usize {
        self.strokes.len() + self.images.len()
    }

    pub fn bounds(&self) -> Option<Rect> {
        let strokes = strokes_bounds(&self.strokes);
        let images = images_bounds(&self.images);
        match (strokes, images) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        }
    }

    /// Group removing the selection from the page
    pub fn deletion(&self) -> OperationGroup {
        OperationGroup::new(self.page_id)
            .with(Operation::DeleteStrokes(self.strokes.clone()))
            .with(Operation::DeleteImages(self.images.clone()))
    }

    /// Replace the selection with a transformed copy
    ///
    /// Returns the group to apply and the selection of the new objects.
    fn replaced_by(&self, strokes: Vec<Stroke>, images: Vec<Image>) -> (OperationGroup, Selection) {
        let group = self
            .deletion()
            .with(Operation::AddStrokes(strokes.clone()))
            .with(Operation::AddImages(images.clone()));
        (group, Selection::new(self.page_id, strokes, images))
    }

    pub fn displaced(&self, delta: Offset) -> (OperationGroup, Selection) {
        let strokes = self.strokes.iter().map(|s| s.translated(delta)).collect();
        let images = self.images.iter().map(|i| i.translated(delta)).collect();
        self.replaced_by(strokes, images)
    }

    /// Scale around the center of the selection
    pub fn resized(&self, factor: f32) -> (OperationGroup, Selection) {
        let origin = self
            .bounds()
            .map(|b| Offset::new((b.left + b.right) / 2.0, (b.top + b.bottom) / 2.0))
            .unwrap_or_default();
        let strokes = self.strokes.iter().map(|s| s.scaled(factor, origin)).collect();
        let images = self.images.iter().map(|i| i.scaled(factor, origin)).collect();
        self.replaced_by(strokes, images)
    }

    /// Add displaced copies, leaving the originals in place
    pub fn duplicated(&self, offset: Offset) -> (OperationGroup, Selection) {
        let strokes: Vec<Stroke> = self.strokes.iter().map(|s| s.translated(offset)).collect();
        let images: Vec<Image> = self.images.iter().map(|i| i.translated(offset)).collect();
        let group = OperationGroup::new(self.page_id)
            .with(Operation::AddStrokes(strokes.clone()))
            .with(Operation::AddImages(images.clone()));
        (group, Selection::new(self.page_id, strokes, images))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkpage_model::{Color, Pen, StrokePoint};

    fn stroke(page: PageId, x: f32, y: f32) -> Stroke {
        Stroke::new(
            page,
            Pen::Ballpen,
            2.0,
            Color::BLACK,
            vec![StrokePoint::new(x, y), StrokePoint::new(x + 10.0, y + 10.0)],
        )
    }

    #[test]
    fn test_region_selects_intersecting() {
        let page = uuid::Uuid::new_v4();
        let strokes = vec![stroke(page, 0.0, 0.0), stroke(page, 100.0, 100.0)];
        let images = vec![Image::new(page, 5.0, 5.0, 10.0, 10.0, "x.png")];
        let sel = Selection::from_region(page, &strokes, &images, Rect::new(8.0, 8.0, 20.0, 20.0));
        assert_eq!(sel.strokes.len(), 1);
        assert_eq!(sel.strokes[0].id, strokes[0].id);
        assert_eq!(sel.len(), 2);
    }

    #[test]
    fn test_displaced_replaces_objects() {
        let page = uuid::Uuid::new_v4();
        let original = stroke(page, 0.0, 0.0);
        let sel = Selection::new(page, vec![original.clone()], vec![]);
        let (group, moved) = sel.displaced(Offset::new(50.0, 0.0));
        assert_eq!(group.operations.len(), 2);
        assert!(matches!(&group.operations[0], Operation::DeleteStrokes(s) if s[0].id == original.id));
        assert_ne!(moved.strokes[0].id, original.id);
        assert_eq!(moved.strokes[0].points[0].x, 50.0);
        assert!(moved.strokes[0].validate_bounds().is_ok());
    }

    #[test]
    fn test_resize_keeps_center() {
        let page = uuid::Uuid::new_v4();
        let sel = Selection::new(page, vec![], vec![Image::new(page, 0.0, 0.0, 100.0, 100.0, "a")]);
        let (_, resized) = sel.resized(0.5);
        let img = &resized.images[0];
        assert_eq!((img.x, img.y, img.width, img.height), (25.0, 25.0, 50.0, 50.0));
    }

    #[test]
    fn test_duplicate_adds_only() {
        let page = uuid::Uuid::new_v4();
        let sel = Selection::new(page, vec![stroke(page, 0.0, 0.0)], vec![]);
        let (group, copy) = sel.duplicated(Offset::new(20.0, 20.0));
        assert!(matches!(&group.operations[..], [Operation::AddStrokes(s)] if s.len() == 1));
        assert_eq!(copy.strokes[0].points[0].y, 20.0);
    }
}
