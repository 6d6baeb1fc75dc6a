//! In-memory page store
//!
//! Stroke points are kept in their encoded form so every write and load
//! passes through the codec exactly as a database-backed store would.
//! Faults can be injected to exercise the engine's failure paths. Loads
//! return strokes and images in the order they were written.

use inkpage_model::codec::{self, DEFAULT_MAX_PAYLOAD};
use inkpage_model::{
    Background, Image, ImageId, Offset, PageContent, PageId, PageStore, StoreError, StoreResult,
    Stroke, StrokeId,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct PageRecord {
    background: Background,
    scroll_y: f32,
    height: Option<f32>,
}

#[derive(Debug, Clone)]
struct StoredStroke {
    /// Stroke with its points stripped
    header: Stroke,
    blob: Vec<u8>,
    seq: u64,
}

#[derive(Debug, Clone)]
struct StoredImage {
    image: Image,
    seq: u64,
}

/// Call counters, for asserting what reached the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub loads: usize,
    pub stroke_writes: usize,
    pub stroke_deletes: usize,
    pub image_writes: usize,
    pub image_deletes: usize,
    pub scroll_updates: usize,
}

#[derive(Debug, Clone)]
struct Faults {
    failing_loads: HashSet<PageId>,
    failing_writes: usize,
    load_latency: Duration,
    blob_limit: usize,
    batch_limit: Option<usize>,
}

impl Default for Faults {
    fn default() -> Self {
        Self {
            failing_loads: HashSet::new(),
            failing_writes: 0,
            load_latency: Duration::ZERO,
            blob_limit: DEFAULT_MAX_PAYLOAD,
            batch_limit: None,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    pages: HashMap<PageId, PageRecord>,
    removed_pages: HashSet<PageId>,
    strokes: HashMap<StrokeId, StoredStroke>,
    images: HashMap<ImageId, StoredImage>,
    next_seq: u64,
    previews: HashMap<PageId, Vec<u8>>,
    load_counts: HashMap<PageId, usize>,
    calls: StoreCalls,
}

impl State {
    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

/// Thread-safe in-memory [`PageStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    faults: Mutex<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ceiling for a single encoded stroke
    pub fn with_blob_limit(self, limit: usize) -> Self {
        self.faults().blob_limit = limit;
        self
    }

    /// Ceiling for the summed encoded size of one `create_strokes` call
    pub fn with_batch_limit(self, limit: usize) -> Self {
        self.faults().batch_limit = Some(limit);
        self
    }

    /// Delay applied to every load
    pub fn with_load_latency(self, latency: Duration) -> Self {
        self.faults().load_latency = latency;
        self
    }

    /// Make loads of `page_id` fail until [`heal_page`](Self::heal_page)
    pub fn fail_loads_for(&self, page_id: PageId) {
        self.faults().failing_loads.insert(page_id);
    }

    pub fn heal_page(&self, page_id: PageId) {
        self.faults().failing_loads.remove(&page_id);
    }

    /// Make the next `count` write calls fail with a transient backend error
    pub fn fail_next_writes(&self, count: usize) {
        self.faults().failing_writes = count;
    }

    /// Register a page with a background
    pub fn insert_page(&self, page_id: PageId, background: Background) {
        let mut state = self.state();
        state.removed_pages.remove(&page_id);
        state.pages.entry(page_id).or_default().background = background;
    }

    /// Forget a page; later loads fail with `PageNotFound`
    pub fn remove_page(&self, page_id: PageId) {
        let mut state = self.state();
        state.pages.remove(&page_id);
        state.removed_pages.insert(page_id);
        state.strokes.retain(|_, s| s.header.page_id != page_id);
        state.images.retain(|_, i| i.image.page_id != page_id);
    }

    pub fn calls(&self) -> StoreCalls {
        self.state().calls.clone()
    }

    pub fn load_count(&self, page_id: PageId) -> usize {
        self.state().load_counts.get(&page_id).copied().unwrap_or(0)
    }

    pub fn stroke_ids(&self, page_id: PageId) -> HashSet<StrokeId> {
        self.state()
            .strokes
            .values()
            .filter(|s| s.header.page_id == page_id)
            .map(|s| s.header.id)
            .collect()
    }

    pub fn image_ids(&self, page_id: PageId) -> HashSet<ImageId> {
        self.state()
            .images
            .values()
            .filter(|i| i.image.page_id == page_id)
            .map(|i| i.image.id)
            .collect()
    }

    pub fn scroll_y(&self, page_id: PageId) -> Option<f32> {
        self.state().pages.get(&page_id).map(|p| p.scroll_y)
    }

    pub fn has_preview(&self, page_id: PageId) -> bool {
        self.state().previews.contains_key(&page_id)
    }

    fn take_write_fault(&self) -> StoreResult<()> {
        let mut faults = self.faults();
        if faults.failing_writes > 0 {
            faults.failing_writes -= 1;
            return Err(StoreError::Backend("injected write failure".to_string()));
        }
        Ok(())
    }
}

impl PageStore for MemoryStore {
    fn load_page_content(&self, page_id: PageId) -> StoreResult<PageContent> {
        let (latency, failing) = {
            let faults = self.faults();
            (faults.load_latency, faults.failing_loads.contains(&page_id))
        };
        {
            let mut state = self.state();
            state.calls.loads += 1;
            *state.load_counts.entry(page_id).or_insert(0) += 1;
        }
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        if failing {
            return Err(StoreError::Backend(format!("injected load failure for {page_id}")));
        }

        let state = self.state();
        if state.removed_pages.contains(&page_id) {
            return Err(StoreError::PageNotFound(page_id));
        }
        let record = state.pages.get(&page_id).cloned().unwrap_or_default();

        let mut stored: Vec<&StoredStroke> = state
            .strokes
            .values()
            .filter(|s| s.header.page_id == page_id)
            .collect();
        stored.sort_by_key(|s| s.seq);
        let mut strokes = Vec::with_capacity(stored.len());
        for s in stored {
            strokes.push(Stroke {
                points: codec::decode(&s.blob)?,
                ..s.header.clone()
            });
        }
        let mut images: Vec<&StoredImage> = state
            .images
            .values()
            .filter(|i| i.image.page_id == page_id)
            .collect();
        images.sort_by_key(|i| i.seq);
        let images = images.into_iter().map(|i| i.image.clone()).collect();

        Ok(PageContent {
            background: record.background,
            strokes,
            images,
            scroll: Offset::new(0.0, record.scroll_y),
            height: record.height,
        })
    }

    fn create_strokes(&self, strokes: &[Stroke]) -> StoreResult<()> {
        self.take_write_fault()?;
        let (blob_limit, batch_limit) = {
            let faults = self.faults();
            (faults.blob_limit, faults.batch_limit)
        };

        let mut encoded = Vec::with_capacity(strokes.len());
        for stroke in strokes {
            encoded.push(codec::encode_with_limit(&stroke.points, blob_limit)?);
        }
        if let Some(limit) = batch_limit {
            let size: usize = encoded.iter().map(Vec::len).sum();
            if size > limit {
                return Err(StoreError::PayloadTooLarge { size, limit });
            }
        }

        let mut state = self.state();
        state.calls.stroke_writes += 1;
        for (stroke, blob) in strokes.iter().zip(encoded) {
            let header = Stroke {
                points: Vec::new(),
                ..stroke.clone()
            };
            let record = state.pages.entry(stroke.page_id).or_default();
            record.height = Some(record.height.unwrap_or(0.0).max(stroke.bounds.bottom));
            let seq = state.take_seq();
            state.strokes.insert(stroke.id, StoredStroke { header, blob, seq });
        }
        Ok(())
    }

    fn delete_strokes(&self, ids: &[StrokeId]) -> StoreResult<()> {
        self.take_write_fault()?;
        let mut state = self.state();
        state.calls.stroke_deletes += 1;
        for id in ids {
            state.strokes.remove(id);
        }
        Ok(())
    }

    fn create_images(&self, images: &[Image]) -> StoreResult<()> {
        self.take_write_fault()?;
        let mut state = self.state();
        state.calls.image_writes += 1;
        for image in images {
            state.pages.entry(image.page_id).or_default();
            let seq = state.take_seq();
            state.images.insert(
                image.id,
                StoredImage {
                    image: image.clone(),
                    seq,
                },
            );
        }
        Ok(())
    }

    fn delete_images(&self, ids: &[ImageId]) -> StoreResult<()> {
        self.take_write_fault()?;
        let mut state = self.state();
        state.calls.image_deletes += 1;
        for id in ids {
            state.images.remove(id);
        }
        Ok(())
    }

    fn update_page_scroll(&self, page_id: PageId, scroll_y: f32) -> StoreResult<()> {
        self.take_write_fault()?;
        let mut state = self.state();
        state.calls.scroll_updates += 1;
        state.pages.entry(page_id).or_default().scroll_y = scroll_y;
        Ok(())
    }

    fn save_preview(&self, page_id: PageId, png: &[u8]) -> StoreResult<()> {
        self.state().previews.insert(page_id, png.to_vec());
        Ok(())
    }

    fn load_preview(&self, page_id: PageId) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.state().previews.get(&page_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkpage_model::{Color, Pen, StrokePoint};
    use uuid::Uuid;

    fn stroke(page_id: PageId, n: usize) -> Stroke {
        let points = (0..n)
            .map(|i| StrokePoint::new(i as f32, 10.0).with_pressure(100.0))
            .collect();
        Stroke::new(page_id, Pen::Ballpen, 2.0, Color::BLACK, points)
    }

    #[test]
    fn test_unknown_page_loads_empty() {
        let store = MemoryStore::new();
        let content = store.load_page_content(Uuid::new_v4()).unwrap();
        assert_eq!(content, PageContent::empty());
    }

    #[test]
    fn test_strokes_round_trip_through_codec() {
        let store = MemoryStore::new();
        let page = Uuid::new_v4();
        let s = stroke(page, 5);
        store.create_strokes(std::slice::from_ref(&s)).unwrap();

        let content = store.load_page_content(page).unwrap();
        assert_eq!(content.strokes, vec![s.clone()]);
        assert_eq!(content.height, Some(s.bounds.bottom));

        store.delete_strokes(&[s.id]).unwrap();
        assert!(store.load_page_content(page).unwrap().strokes.is_empty());
    }

    #[test]
    fn test_loads_keep_write_order() {
        let store = MemoryStore::new();
        let page = Uuid::new_v4();
        let written: Vec<Stroke> = (2..22).map(|n| stroke(page, n)).collect();
        for s in &written {
            store.create_strokes(std::slice::from_ref(s)).unwrap();
        }
        let images: Vec<Image> = (0..8)
            .map(|i| Image::new(page, 0.0, i as f32, 4.0, 4.0, format!("img-{i}")))
            .collect();
        store.create_images(&images).unwrap();

        let content = store.load_page_content(page).unwrap();
        assert_eq!(content.strokes, written);
        assert_eq!(content.images, images);
    }

    #[test]
    fn test_blob_limit_rejects_whole_call() {
        let store = MemoryStore::new().with_blob_limit(64);
        let page = Uuid::new_v4();
        let small = stroke(page, 2);
        let big = stroke(page, 100);

        let err = store.create_strokes(&[small, big]).unwrap_err();
        assert!(err.is_payload_size());
        assert!(store.stroke_ids(page).is_empty());
    }

    #[test]
    fn test_batch_limit_correlates_with_size() {
        let page = Uuid::new_v4();
        let strokes: Vec<Stroke> = (0..4).map(|_| stroke(page, 10)).collect();
        let one = codec::encode(&strokes[0].points).unwrap().len();
        let store = MemoryStore::new().with_batch_limit(one * 2);

        assert!(store.create_strokes(&strokes).unwrap_err().is_payload_size());
        store.create_strokes(&strokes[..2]).unwrap();
        store.create_strokes(&strokes[2..]).unwrap();
        assert_eq!(store.stroke_ids(page).len(), 4);
    }

    #[test]
    fn test_injected_faults() {
        let store = MemoryStore::new();
        let page = Uuid::new_v4();

        store.fail_loads_for(page);
        assert!(store.load_page_content(page).is_err());
        store.heal_page(page);
        assert!(store.load_page_content(page).is_ok());
        assert_eq!(store.load_count(page), 2);

        store.fail_next_writes(1);
        assert!(store.update_page_scroll(page, 5.0).is_err());
        store.update_page_scroll(page, 5.0).unwrap();
        assert_eq!(store.scroll_y(page), Some(5.0));
        assert_eq!(store.load_page_content(page).unwrap().scroll.y, 5.0);
    }

    #[test]
    fn test_removed_page_not_found() {
        let store = MemoryStore::new();
        let page = Uuid::new_v4();
        store.insert_page(page, Background::native("lined"));
        assert_eq!(
            store.load_page_content(page).unwrap().background,
            Background::native("lined")
        );

        store.remove_page(page);
        assert!(matches!(
            store.load_page_content(page),
            Err(StoreError::PageNotFound(id)) if id == page
        ));
    }
}
