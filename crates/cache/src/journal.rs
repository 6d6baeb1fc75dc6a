//! Pending persistence work for one page
//!
//! Creations and deletions of the same id cancel out in memory so the store
//! only sees the net effect of a burst of edits. Store writes are upserts,
//! and deletes of unknown ids are no-ops.

use image::RgbaImage;
use inkpage_model::{Image, ImageId, Stroke, StrokeId};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct DirtyJournal {
    pub(crate) created_strokes: Vec<Stroke>,
    pub(crate) deleted_strokes: HashSet<StrokeId>,
    pub(crate) created_images: Vec<Image>,
    pub(crate) deleted_images: HashSet<ImageId>,
    pub(crate) scroll_y: Option<f32>,
    pub(crate) preview: Option<Arc<RgbaImage>>,
}

impl DirtyJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_content_changes() && self.scroll_y.is_none() && self.preview.is_none()
    }

    /// Stroke or image changes are pending
    pub fn has_content_changes(&self) -> bool {
        !self.created_strokes.is_empty()
            || !self.deleted_strokes.is_empty()
            || !self.created_images.is_empty()
            || !self.deleted_images.is_empty()
    }

    pub fn pending_strokes(&self) -> usize {
        self.created_strokes.len()
    }

    pub fn stroke_added(&mut self, stroke: Stroke) {
        self.deleted_strokes.remove(&stroke.id);
        self.created_strokes.retain(|s| s.id != stroke.id);
        self.created_strokes.push(stroke);
    }

    pub fn stroke_removed(&mut self, id: StrokeId) {
        self.created_strokes.retain(|s| s.id != id);
        self.deleted_strokes.insert(id);
    }

    pub fn image_added(&mut self, image: Image) {
        self.deleted_images.remove(&image.id);
        self.created_images.retain(|i| i.id != image.id);
        self.created_images.push(image);
    }

    pub fn image_removed(&mut self, id: ImageId) {
        self.created_images.retain(|i| i.id != id);
        self.deleted_images.insert(id);
    }

    pub fn scroll_changed(&mut self, scroll_y: f32) {
        self.scroll_y = Some(scroll_y);
    }

    pub fn preview_changed(&mut self, preview: Arc<RgbaImage>) {
        self.preview = Some(preview);
    }

    /// Move everything out, leaving the journal empty
    pub fn take(&mut self) -> DirtyJournal {
        std::mem::take(self)
    }

    /// Return work that failed to persist
    ///
    /// Anything recorded since `unsent` was taken is newer and wins: a stroke
    /// deleted after the failed flush stays deleted, a newer scroll position
    /// is kept.
    pub fn merge_back(&mut self, unsent: DirtyJournal) {
        for id in unsent.deleted_strokes {
            let recreated = self.created_strokes.iter().any(|s| s.id == id);
            if !recreated {
                self.deleted_strokes.insert(id);
            }
        }
        let mut strokes: Vec<Stroke> = unsent
            .created_strokes
            .into_iter()
            .filter(|s| !self.deleted_strokes.contains(&s.id))
            .filter(|s| !self.created_strokes.iter().any(|n| n.id == s.id))
            .collect();
        strokes.append(&mut self.created_strokes);
        self.created_strokes = strokes;

        for id in unsent.deleted_images {
            let recreated = self.created_images.iter().any(|i| i.id == id);
            if !recreated {
                self.deleted_images.insert(id);
            }
        }
        let mut images: Vec<Image> = unsent
            .created_images
            .into_iter()
            .filter(|i| !self.deleted_images.contains(&i.id))
            .filter(|i| !self.created_images.iter().any(|n| n.id == i.id))
            .collect();
        images.append(&mut self.created_images);
        self.created_images = images;

        if self.scroll_y.is_none() {
            self.scroll_y = unsent.scroll_y;
        }
        if self.preview.is_none() {
            self.preview = unsent.preview;
        }
    }
}
