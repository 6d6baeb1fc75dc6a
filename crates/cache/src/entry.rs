//! Per-page cache entry
//!
//! Content is kept in paint order. Each item carries a sequence number; a
//! removed item remembers its number so re-inserting it (undo of a delete)
//! lands it back at the same depth, until the page's undo history is
//! dropped and [`PageEntry::forget_removed`] clears those numbers.

use crate::error::{CacheError, CacheResult};
use image::RgbaImage;
use inkpage_model::{Background, Image, ImageId, Offset, PageContent, PageId, Rect, Stroke, StrokeId};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Something that lives on a page and can be addressed by id
pub trait PageItem: Clone {
    type Id: Copy + Eq + Hash + std::fmt::Debug;

    fn item_id(&self) -> Self::Id;
    fn item_page(&self) -> PageId;
    fn item_bounds(&self) -> Rect;
}

impl PageItem for Stroke {
    type Id = StrokeId;

    fn item_id(&self) -> StrokeId {
        self.id
    }
    fn item_page(&self) -> PageId {
        self.page_id
    }
    fn item_bounds(&self) -> Rect {
        self.bounds
    }
}

impl PageItem for Image {
    type Id = ImageId;

    fn item_id(&self) -> ImageId {
        self.id
    }
    fn item_page(&self) -> PageId {
        self.page_id
    }
    fn item_bounds(&self) -> Rect {
        self.bounds()
    }
}

/// Paint-ordered collection of page items
#[derive(Debug, Clone)]
pub struct Layer<T: PageItem> {
    items: Vec<T>,
    seqs: Vec<u64>,
    live: HashMap<T::Id, u64>,
    retired: HashMap<T::Id, u64>,
    next_seq: u64,
}

impl<T: PageItem> Default for Layer<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            seqs: Vec::new(),
            live: HashMap::new(),
            retired: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<T: PageItem> Layer<T> {
    pub fn from_vec(items: Vec<T>) -> Self {
        let mut layer = Self::default();
        for item in items {
            layer.insert(item);
        }
        layer
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: T::Id) -> bool {
        self.live.contains_key(&id)
    }

    pub fn get(&self, id: T::Id) -> Option<&T> {
        let seq = self.live.get(&id)?;
        let pos = self.seqs.binary_search(seq).ok()?;
        self.items.get(pos)
    }

    /// Insert an item; returns `false` if its id is already present
    pub fn insert(&mut self, item: T) -> bool {
        let id = item.item_id();
        if self.live.contains_key(&id) {
            return false;
        }
        let seq = self.retired.remove(&id).unwrap_or_else(|| {
            let seq = self.next_seq;
            self.next_seq += 1;
            seq
        });
        let pos = self.seqs.partition_point(|s| *s < seq);
        self.items.insert(pos, item);
        self.seqs.insert(pos, seq);
        self.live.insert(id, seq);
        true
    }

    pub fn remove(&mut self, id: T::Id) -> Option<T> {
        let seq = self.live.remove(&id)?;
        let pos = self.seqs.binary_search(&seq).ok()?;
        self.seqs.remove(pos);
        self.retired.insert(id, seq);
        Some(self.items.remove(pos))
    }

    /// Ids removed since the last [`forget_retired`](Self::forget_retired)
    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }

    /// Drop remembered depths; a later re-insert lands on top
    pub fn forget_retired(&mut self) {
        self.retired.clear();
        self.retired.shrink_to_fit();
    }

    /// Union of item bounds
    pub fn bounds(&self) -> Option<Rect> {
        self.items
            .iter()
            .fold(None, |acc, item| Rect::union_opt(acc, item.item_bounds()))
    }

    pub fn intersecting<'a>(&'a self, rect: &'a Rect) -> impl Iterator<Item = &'a T> + 'a {
        self.items
            .iter()
            .filter(move |item| item.item_bounds().intersects(rect))
    }
}

/// Last bitmap rendered for a page, with the view it was rendered at
#[derive(Debug, Clone, PartialEq)]
pub struct CachedBitmap {
    pub image: RgbaImage,
    pub scroll: Offset,
    pub zoom: f32,
}

/// Comparable copy of an entry's content, for tests and diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct PageSnapshot {
    pub background: Background,
    pub strokes: Vec<Stroke>,
    pub images: Vec<Image>,
    pub height: f32,
}

/// In-memory state of one page
#[derive(Debug, Clone)]
pub struct PageEntry {
    page_id: PageId,
    background: Background,
    strokes: Layer<Stroke>,
    images: Layer<Image>,
    scroll: Offset,
    zoom: f32,
    height: f32,
    bitmap: Option<Arc<CachedBitmap>>,
}

impl PageEntry {
    pub fn new(page_id: PageId) -> Self {
        Self::from_content(page_id, PageContent::empty(), 0.0)
    }

    /// Build an entry from persisted content
    ///
    /// A missing stored height is computed from the content.
    pub fn from_content(page_id: PageId, content: PageContent, margin: f32) -> Self {
        let mut entry = Self {
            page_id,
            background: content.background,
            strokes: Layer::from_vec(content.strokes),
            images: Layer::from_vec(content.images),
            scroll: content.scroll.clamp_non_negative(),
            zoom: 1.0,
            height: 0.0,
            bitmap: None,
        };
        entry.height = match content.height {
            Some(h) => h.max(entry.content_height(margin)),
            None => entry.content_height(margin),
        };
        entry
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn background(&self) -> &Background {
        &self.background
    }

    pub fn strokes(&self) -> &[Stroke] {
        self.strokes.as_slice()
    }

    pub fn images(&self) -> &[Image] {
        self.images.as_slice()
    }

    pub fn stroke_layer(&self) -> &Layer<Stroke> {
        &self.strokes
    }

    pub fn image_layer(&self) -> &Layer<Image> {
        &self.images
    }

    pub fn scroll(&self) -> Offset {
        self.scroll
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn bitmap(&self) -> Option<Arc<CachedBitmap>> {
        self.bitmap.clone()
    }

    /// Lowest content extent plus `margin`, or 0 for an empty page
    pub fn content_height(&self, margin: f32) -> f32 {
        let bounds = match (self.strokes.bounds(), self.images.bounds()) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        };
        bounds.map_or(0.0, |rect| rect.bottom + margin)
    }

    pub fn snapshot(&self) -> PageSnapshot {
        PageSnapshot {
            background: self.background.clone(),
            strokes: self.strokes().to_vec(),
            images: self.images().to_vec(),
            height: self.height,
        }
    }

    pub(crate) fn set_scroll(&mut self, scroll: Offset) {
        self.scroll = scroll.clamp_non_negative();
    }

    pub(crate) fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom;
    }

    pub(crate) fn set_height(&mut self, height: f32) {
        self.height = height;
    }

    pub(crate) fn set_bitmap(&mut self, bitmap: Option<Arc<CachedBitmap>>) {
        self.bitmap = bitmap;
    }

    /// Forget the depth of removed strokes and images
    ///
    /// Called once nothing can undo those removals any more.
    pub fn forget_removed(&mut self) {
        self.strokes.forget_retired();
        self.images.forget_retired();
    }
}

/// A change made through [`PageEdit`], kept for rollback and persistence
#[derive(Debug, Clone)]
pub(crate) enum Change {
    AddedStroke(Stroke),
    RemovedStroke(Stroke),
    AddedImage(Image),
    RemovedImage(Image),
    Height(f32),
}

/// Transactional view over one entry
///
/// Every call validates fully before mutating. If the closure passed to
/// [`PageCacheManager::edit`](crate::PageCacheManager::edit) returns an
/// error, everything done through the edit is rolled back.
pub struct PageEdit<'a> {
    entry: &'a mut PageEntry,
    log: Vec<Change>,
    margin: f32,
}

impl<'a> PageEdit<'a> {
    pub(crate) fn new(entry: &'a mut PageEntry, margin: f32) -> Self {
        Self {
            entry,
            log: Vec::new(),
            margin,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.entry.page_id
    }

    pub fn entry(&self) -> &PageEntry {
        self.entry
    }

    fn check_page(&self, page_id: PageId) -> CacheResult<()> {
        if page_id != self.entry.page_id {
            return Err(CacheError::WrongPage {
                expected: self.entry.page_id,
                found: page_id,
            });
        }
        Ok(())
    }

    fn grow_height(&mut self, bounds: Option<Rect>) {
        if let Some(rect) = bounds {
            let wanted = rect.bottom + self.margin;
            if wanted > self.entry.height {
                self.log.push(Change::Height(self.entry.height));
                self.entry.height = wanted;
            }
        }
    }

    /// Add strokes; returns the union of their bounds
    pub fn add_strokes(&mut self, strokes: Vec<Stroke>) -> CacheResult<Option<Rect>> {
        let mut seen = std::collections::HashSet::new();
        for stroke in &strokes {
            self.check_page(stroke.page_id)?;
            stroke.validate_bounds()?;
            if self.entry.strokes.contains(stroke.id) || !seen.insert(stroke.id) {
                return Err(CacheError::DuplicateStroke(stroke.id));
            }
        }

        let mut bounds = None;
        for stroke in strokes {
            bounds = Rect::union_opt(bounds, stroke.bounds);
            self.entry.strokes.insert(stroke.clone());
            self.log.push(Change::AddedStroke(stroke));
        }
        self.grow_height(bounds);
        Ok(bounds)
    }

    /// Remove strokes by id; fails without changes if any id is missing
    pub fn remove_strokes(&mut self, ids: &[StrokeId]) -> CacheResult<Vec<Stroke>> {
        for id in ids {
            if !self.entry.strokes.contains(*id) {
                return Err(CacheError::StrokeNotFound {
                    page_id: self.entry.page_id,
                    stroke_id: *id,
                });
            }
        }
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            // Duplicate ids in the request were validated above and are skipped here
            if let Some(stroke) = self.entry.strokes.remove(*id) {
                self.log.push(Change::RemovedStroke(stroke.clone()));
                removed.push(stroke);
            }
        }
        Ok(removed)
    }

    pub fn add_images(&mut self, images: Vec<Image>) -> CacheResult<Option<Rect>> {
        let mut seen = std::collections::HashSet::new();
        for image in &images {
            self.check_page(image.page_id)?;
            if self.entry.images.contains(image.id) || !seen.insert(image.id) {
                return Err(CacheError::DuplicateImage(image.id));
            }
        }

        let mut bounds = None;
        for image in images {
            bounds = Rect::union_opt(bounds, image.bounds());
            self.entry.images.insert(image.clone());
            self.log.push(Change::AddedImage(image));
        }
        self.grow_height(bounds);
        Ok(bounds)
    }

    pub fn remove_images(&mut self, ids: &[ImageId]) -> CacheResult<Vec<Image>> {
        for id in ids {
            if !self.entry.images.contains(*id) {
                return Err(CacheError::ImageNotFound {
                    page_id: self.entry.page_id,
                    image_id: *id,
                });
            }
        }
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(image) = self.entry.images.remove(*id) {
                self.log.push(Change::RemovedImage(image.clone()));
                removed.push(image);
            }
        }
        Ok(removed)
    }

    pub fn set_height(&mut self, height: f32) {
        if height != self.entry.height {
            self.log.push(Change::Height(self.entry.height));
            self.entry.height = height;
        }
    }

    /// Shrink or grow height to the content extent plus margin
    pub fn recompute_height(&mut self) -> f32 {
        let height = self.entry.content_height(self.margin);
        self.set_height(height);
        height
    }

    /// Whether anything was removed through this edit
    pub fn removed_anything(&self) -> bool {
        self.log
            .iter()
            .any(|c| matches!(c, Change::RemovedStroke(_) | Change::RemovedImage(_)))
    }

    pub(crate) fn rollback(self) {
        for change in self.log.into_iter().rev() {
            match change {
                Change::AddedStroke(stroke) => {
                    self.entry.strokes.remove(stroke.id);
                }
                Change::RemovedStroke(stroke) => {
                    self.entry.strokes.insert(stroke);
                }
                Change::AddedImage(image) => {
                    self.entry.images.remove(image.id);
                }
                Change::RemovedImage(image) => {
                    self.entry.images.insert(image);
                }
                Change::Height(height) => self.entry.height = height,
            }
        }
    }

    pub(crate) fn into_changes(self) -> Vec<Change> {
        self.log
    }
}
