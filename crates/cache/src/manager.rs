//! Page cache manager with LRU eviction and neighbor prefetch
//!
//! Holds the working set of pages: vector content, the last rendered bitmap
//! and per-page view state. Misses are loaded from the [`PageStore`] on the
//! job scheduler, never on the caller's thread. The active page and its
//! neighbors in document order are pinned against eviction.
//!
//! Each page sits behind its own mutex so edits to one page never wait on
//! another. The index lock is never held while a page lock or the store is
//! in use.

use crate::config::CacheConfig;
use crate::entry::{CachedBitmap, PageEdit, PageEntry};
use crate::entry::Change;
use crate::error::{CacheError, CacheResult};
use crate::write_coordinator::WriteCoordinator;
use image::{ImageFormat, RgbaImage};
use inkpage_model::{
    EngineEvent, Image, ImageId, LoadStatus, Offset, PageContent, PageId, PageStore, Stroke,
    StrokeId,
};
use inkpage_scheduler::{CancellationToken, EventBus, JobPriority, JobScheduler, JobType};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Pages currently cached
    pub pages: usize,

    pub hits: u64,
    pub misses: u64,

    /// Pages dropped by eviction
    pub evictions: u64,

    /// Loads started, including prefetches
    pub loads: u64,
    pub failed_loads: u64,
    pub cancelled_loads: u64,
}

impl CacheStats {
    /// Calculate the activation hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct LoadInner {
    status: Mutex<Option<LoadStatus>>,
    done: Condvar,
}

/// Completion handle for a page load
///
/// Every activation of a page that is already loading receives a clone of
/// the same handle.
#[derive(Debug, Clone)]
pub struct LoadHandle {
    page_id: PageId,
    inner: Arc<LoadInner>,
    token: CancellationToken,
}

impl LoadHandle {
    fn pending(page_id: PageId) -> Self {
        Self {
            page_id,
            inner: Arc::new(LoadInner {
                status: Mutex::new(None),
                done: Condvar::new(),
            }),
            token: CancellationToken::new(),
        }
    }

    fn ready(page_id: PageId) -> Self {
        let handle = Self::pending(page_id);
        handle.resolve(LoadStatus::Loaded);
        handle
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_some()
    }

    pub fn status(&self) -> Option<LoadStatus> {
        lock(&self.inner.status).clone()
    }

    /// Block until the load resolves
    pub fn wait(&self) -> LoadStatus {
        let mut status = lock(&self.inner.status);
        loop {
            if let Some(s) = status.as_ref() {
                return s.clone();
            }
            status = self
                .inner
                .done
                .wait(status)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Block until the load resolves or `timeout` passes
    pub fn wait_timeout(&self, timeout: Duration) -> Option<LoadStatus> {
        let status = lock(&self.inner.status);
        let (status, _) = self
            .inner
            .done
            .wait_timeout_while(status, timeout, |s| s.is_none())
            .unwrap_or_else(|e| e.into_inner());
        status.clone()
    }

    fn same(&self, other: &LoadHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// First resolution wins
    fn resolve(&self, status: LoadStatus) {
        let mut current = lock(&self.inner.status);
        if current.is_none() {
            *current = Some(status);
            self.inner.done.notify_all();
        }
    }
}

/// Owned by a queued load job; resolves the handle as cancelled if the job
/// is dropped without running
struct LoadGuard {
    manager: Weak<PageCacheManager>,
    handle: LoadHandle,
}

impl LoadGuard {
    fn run(self, job_token: &CancellationToken) {
        if let Some(manager) = self.manager.upgrade() {
            manager.run_load(&self.handle, job_token);
        }
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        if self.handle.is_finished() {
            return;
        }
        match self.manager.upgrade() {
            Some(manager) => manager.finish_load(&self.handle, LoadStatus::Cancelled, None),
            None => self.handle.resolve(LoadStatus::Cancelled),
        }
    }
}

/// Internal index state
struct CacheState {
    entries: HashMap<PageId, Arc<Mutex<PageEntry>>>,

    /// LRU queue (most recently used at back, least recently used at front)
    lru_queue: VecDeque<PageId>,

    loads: HashMap<PageId, LoadHandle>,
    order: Vec<PageId>,
    active: Option<PageId>,
    stats: CacheStats,
}

impl CacheState {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            loads: HashMap::new(),
            order: Vec::new(),
            active: None,
            stats: CacheStats::default(),
        }
    }

    /// Move a page to the back of the LRU queue (mark as most recently used)
    fn touch(&mut self, page_id: PageId) {
        self.lru_queue.retain(|&p| p != page_id);
        self.lru_queue.push_back(page_id);
    }

    fn neighbors(&self, page_id: PageId, radius: usize) -> Vec<PageId> {
        let Some(index) = self.order.iter().position(|&p| p == page_id) else {
            return Vec::new();
        };
        let start = index.saturating_sub(radius);
        let end = (index + radius + 1).min(self.order.len());
        self.order[start..end]
            .iter()
            .copied()
            .filter(|&p| p != page_id)
            .collect()
    }

    /// Active page and its neighbors
    fn pinned(&self, radius: usize) -> HashSet<PageId> {
        let mut pinned = HashSet::new();
        if let Some(active) = self.active {
            pinned.insert(active);
            pinned.extend(self.neighbors(active, radius));
        }
        pinned
    }
}

/// Multi-page working set with prefetch and eviction
pub struct PageCacheManager {
    config: CacheConfig,
    store: Arc<dyn PageStore>,
    scheduler: Arc<JobScheduler>,
    writer: Arc<WriteCoordinator>,
    events: EventBus<EngineEvent>,
    state: Mutex<CacheState>,
    this: Weak<PageCacheManager>,
}

impl PageCacheManager {
    pub fn new(
        config: CacheConfig,
        store: Arc<dyn PageStore>,
        scheduler: Arc<JobScheduler>,
        writer: Arc<WriteCoordinator>,
        events: EventBus<EngineEvent>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            store,
            scheduler,
            writer,
            events,
            state: Mutex::new(CacheState::new()),
            this: this.clone(),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn writer(&self) -> &Arc<WriteCoordinator> {
        &self.writer
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        lock(&self.state)
    }

    /// Shared handle to a cached page, marking it recently used
    fn entry(&self, page_id: PageId) -> CacheResult<Arc<Mutex<PageEntry>>> {
        let mut state = self.state();
        let entry = state
            .entries
            .get(&page_id)
            .cloned()
            .ok_or(CacheError::PageNotCached(page_id))?;
        state.touch(page_id);
        Ok(entry)
    }

    // ---- activation and loading ----

    /// Make `page_id` the active page
    ///
    /// A cached page resolves immediately. Otherwise a load is queued, or the
    /// load already in flight is joined; completion is also published as
    /// [`EngineEvent::PageLoad`].
    pub fn activate(&self, page_id: PageId) -> LoadHandle {
        let handle = {
            let mut state = self.state();
            state.active = Some(page_id);
            if state.entries.contains_key(&page_id) {
                state.stats.hits += 1;
                state.touch(page_id);
                None
            } else {
                state.stats.misses += 1;
                Some(self.start_load(&mut state, page_id, JobPriority::Load))
            }
        };

        match handle {
            Some(handle) => handle,
            None => {
                self.prefetch_neighbors(page_id);
                LoadHandle::ready(page_id)
            }
        }
    }

    pub fn active_page(&self) -> Option<PageId> {
        self.state().active
    }

    fn start_load(&self, state: &mut CacheState, page_id: PageId, priority: JobPriority) -> LoadHandle {
        if let Some(existing) = state.loads.get(&page_id) {
            return existing.clone();
        }

        let handle = LoadHandle::pending(page_id);
        state.loads.insert(page_id, handle.clone());
        state.stats.loads += 1;

        let job_type = match priority {
            JobPriority::Prefetch => JobType::PrefetchPage { page_id },
            _ => JobType::LoadPage { page_id },
        };
        let guard = LoadGuard {
            manager: self.this.clone(),
            handle: handle.clone(),
        };
        self.scheduler
            .submit(priority, job_type, move |token| guard.run(token));
        debug!(page = %page_id, ?priority, "page load queued");
        handle
    }

    fn run_load(&self, handle: &LoadHandle, job_token: &CancellationToken) {
        let page_id = handle.page_id;
        let cancelled = || job_token.is_cancelled() || handle.token.is_cancelled();
        if cancelled() {
            self.finish_load(handle, LoadStatus::Cancelled, None);
            return;
        }

        let content = match self.store.load_page_content(page_id) {
            Ok(content) => content,
            Err(err) => {
                warn!(page = %page_id, error = %err, "page load failed");
                self.finish_load(handle, LoadStatus::Failed(err.to_string()), None);
                return;
            }
        };
        let mut entry = PageEntry::from_content(page_id, content, self.config.height_margin);
        entry.set_bitmap(self.load_preview(page_id, entry.scroll()));

        if cancelled() {
            self.finish_load(handle, LoadStatus::Cancelled, None);
            return;
        }
        self.finish_load(handle, LoadStatus::Loaded, Some(entry));
    }

    fn load_preview(&self, page_id: PageId, scroll: Offset) -> Option<Arc<CachedBitmap>> {
        let png = match self.store.load_preview(page_id) {
            Ok(png) => png?,
            Err(err) => {
                warn!(page = %page_id, error = %err, "could not read page preview");
                return None;
            }
        };
        match image::load_from_memory_with_format(&png, ImageFormat::Png) {
            Ok(decoded) => Some(Arc::new(CachedBitmap {
                image: decoded.to_rgba8(),
                scroll,
                zoom: 1.0,
            })),
            Err(err) => {
                warn!(page = %page_id, error = %err, "discarding unreadable page preview");
                None
            }
        }
    }

    /// Install (or discard) a load result and resolve its handle
    ///
    /// Only the handle currently registered for the page may install an
    /// entry; a superseded or cancelled load leaves the cache untouched.
    fn finish_load(&self, handle: &LoadHandle, status: LoadStatus, entry: Option<PageEntry>) {
        let page_id = handle.page_id;
        let (status, is_active) = {
            let mut state = self.state();
            let current = state.loads.get(&page_id).is_some_and(|h| h.same(handle));
            if current {
                state.loads.remove(&page_id);
            }

            let status = match (status, entry) {
                (LoadStatus::Loaded, Some(entry)) if current => {
                    if !state.entries.contains_key(&page_id) {
                        state.entries.insert(page_id, Arc::new(Mutex::new(entry)));
                        state.touch(page_id);
                    }
                    LoadStatus::Loaded
                }
                (LoadStatus::Loaded, _) => LoadStatus::Cancelled,
                (status, _) => status,
            };
            match status {
                LoadStatus::Loaded => {}
                LoadStatus::Failed(_) => state.stats.failed_loads += 1,
                LoadStatus::Cancelled => state.stats.cancelled_loads += 1,
            }
            state.stats.pages = state.entries.len();

            // Resolved under the index lock so waiters observe the entry
            handle.resolve(status.clone());
            (status, state.active == Some(page_id))
        };

        debug!(page = %page_id, ?status, "page load finished");
        self.events.publish(EngineEvent::PageLoad {
            page_id,
            status: status.clone(),
        });

        if status == LoadStatus::Loaded && is_active {
            self.prefetch_neighbors(page_id);
            self.reduce_cache();
        }
    }

    pub fn is_loading(&self, page_id: PageId) -> bool {
        self.state().loads.contains_key(&page_id)
    }

    /// Cancel an in-flight load; returns whether one was pending
    pub fn cancel_load(&self, page_id: PageId) -> bool {
        let handle = self.state().loads.remove(&page_id);
        let Some(handle) = handle else {
            return false;
        };
        handle.token.cancel();
        // Queued jobs are dropped here; their guards resolve the handle.
        // The index lock must not be held.
        self.scheduler.cancel_page_loads(page_id);
        debug!(page = %page_id, "page load cancelled");
        true
    }

    /// Cancel every in-flight load except those for `keep`
    pub fn cancel_loads_except(&self, keep: &[PageId]) -> usize {
        let pages: Vec<PageId> = self
            .state()
            .loads
            .keys()
            .copied()
            .filter(|p| !keep.contains(p))
            .collect();
        pages.into_iter().filter(|&p| self.cancel_load(p)).count()
    }

    // ---- document order and prefetch ----

    pub fn set_document_order(&self, order: Vec<PageId>) {
        self.state().order = order;
    }

    pub fn document_order(&self) -> Vec<PageId> {
        self.state().order.clone()
    }

    /// Pages within the configured radius of `page_id` in document order
    pub fn neighbors(&self, page_id: PageId) -> Vec<PageId> {
        self.state().neighbors(page_id, self.config.neighbor_radius)
    }

    /// Queue low-priority loads for uncached neighbors
    pub fn prefetch_neighbors(&self, page_id: PageId) -> Vec<LoadHandle> {
        let mut state = self.state();
        let neighbors = state.neighbors(page_id, self.config.neighbor_radius);
        let missing: Vec<PageId> = neighbors
            .into_iter()
            .filter(|p| !state.entries.contains_key(p))
            .collect();
        missing
            .into_iter()
            .map(|p| self.start_load(&mut state, p, JobPriority::Prefetch))
            .collect()
    }

    // ---- direct entry management ----

    /// Install a page from content already in hand (e.g. a newly created page)
    ///
    /// An existing entry is left as is.
    pub fn insert(&self, page_id: PageId, content: PageContent) {
        let mut state = self.state();
        if !state.entries.contains_key(&page_id) {
            let entry = PageEntry::from_content(page_id, content, self.config.height_margin);
            state.entries.insert(page_id, Arc::new(Mutex::new(entry)));
            state.stats.pages = state.entries.len();
        }
        state.touch(page_id);
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.state().entries.contains_key(&page_id)
    }

    /// Cached pages from least to most recently used
    pub fn cached_pages(&self) -> Vec<PageId> {
        self.state().lru_queue.iter().copied().collect()
    }

    /// Run `f` against a cached page
    pub fn with_page<R, F>(&self, page_id: PageId, f: F) -> CacheResult<R>
    where
        F: FnOnce(&PageEntry) -> R,
    {
        let entry = self.entry(page_id)?;
        let entry = lock(&entry);
        Ok(f(&entry))
    }

    /// Apply an edit atomically
    ///
    /// If `f` fails, every change made through the [`PageEdit`] is rolled
    /// back and nothing reaches the store. On success the changes are queued
    /// for persistence.
    pub fn edit<R, F>(&self, page_id: PageId, f: F) -> CacheResult<R>
    where
        F: FnOnce(&mut PageEdit<'_>) -> CacheResult<R>,
    {
        let entry = self.entry(page_id)?;
        let mut entry = lock(&entry);
        let mut edit = PageEdit::new(&mut entry, self.config.height_margin);
        match f(&mut edit) {
            Ok(value) => {
                let changes = edit.into_changes();
                if !changes.is_empty() {
                    self.record_changes(page_id, changes);
                }
                Ok(value)
            }
            Err(err) => {
                edit.rollback();
                Err(err)
            }
        }
    }

    fn record_changes(&self, page_id: PageId, changes: Vec<Change>) {
        self.writer.record(page_id, |journal| {
            for change in changes {
                match change {
                    Change::AddedStroke(stroke) => journal.stroke_added(stroke),
                    Change::RemovedStroke(stroke) => journal.stroke_removed(stroke.id),
                    Change::AddedImage(image) => journal.image_added(image),
                    Change::RemovedImage(image) => journal.image_removed(image.id),
                    Change::Height(_) => {}
                }
            }
        });
    }

    pub fn strokes(&self, page_id: PageId) -> CacheResult<Vec<Stroke>> {
        self.with_page(page_id, |e| e.strokes().to_vec())
    }

    pub fn images(&self, page_id: PageId) -> CacheResult<Vec<Image>> {
        self.with_page(page_id, |e| e.images().to_vec())
    }

    /// Replace a page's strokes; the difference is queued for persistence
    pub fn set_strokes(&self, page_id: PageId, strokes: Vec<Stroke>) -> CacheResult<()> {
        self.edit(page_id, |edit| {
            let wanted: HashMap<StrokeId, &Stroke> = strokes.iter().map(|s| (s.id, s)).collect();
            let stale: Vec<StrokeId> = edit
                .entry()
                .strokes()
                .iter()
                .filter(|s| wanted.get(&s.id).map_or(true, |w| *w != *s))
                .map(|s| s.id)
                .collect();
            edit.remove_strokes(&stale)?;
            let fresh: Vec<Stroke> = strokes
                .iter()
                .filter(|s| !edit.entry().stroke_layer().contains(s.id))
                .cloned()
                .collect();
            edit.add_strokes(fresh)?;
            Ok(())
        })
    }

    /// Replace a page's images; the difference is queued for persistence
    pub fn set_images(&self, page_id: PageId, images: Vec<Image>) -> CacheResult<()> {
        self.edit(page_id, |edit| {
            let wanted: HashMap<ImageId, &Image> = images.iter().map(|i| (i.id, i)).collect();
            let stale: Vec<ImageId> = edit
                .entry()
                .images()
                .iter()
                .filter(|i| wanted.get(&i.id).map_or(true, |w| *w != *i))
                .map(|i| i.id)
                .collect();
            edit.remove_images(&stale)?;
            let fresh: Vec<Image> = images
                .iter()
                .filter(|i| !edit.entry().image_layer().contains(i.id))
                .cloned()
                .collect();
            edit.add_images(fresh)?;
            Ok(())
        })
    }

    /// Drop the remembered depth of content removed from a page
    ///
    /// Only valid once no undo step can re-insert that content.
    pub fn forget_removed(&self, page_id: PageId) -> CacheResult<()> {
        let entry = self.entry(page_id)?;
        lock(&entry).forget_removed();
        Ok(())
    }

    /// Reset height to the content extent plus margin
    pub fn recompute_height(&self, page_id: PageId) -> CacheResult<f32> {
        self.edit(page_id, |edit| Ok(edit.recompute_height()))
    }

    // ---- view state ----

    /// Store the last rendered bitmap and queue it as the page preview
    pub fn cache_bitmap(
        &self,
        page_id: PageId,
        image: RgbaImage,
        scroll: Offset,
        zoom: f32,
    ) -> CacheResult<()> {
        let entry = self.entry(page_id)?;
        let preview = Arc::new(image);
        {
            let mut entry = lock(&entry);
            entry.set_bitmap(Some(Arc::new(CachedBitmap {
                image: (*preview).clone(),
                scroll,
                zoom,
            })));
        }
        self.writer.record(page_id, |journal| journal.preview_changed(preview));
        Ok(())
    }

    pub fn bitmap(&self, page_id: PageId) -> Option<Arc<CachedBitmap>> {
        self.with_page(page_id, |e| e.bitmap()).ok().flatten()
    }

    pub fn scroll(&self, page_id: PageId) -> CacheResult<Offset> {
        self.with_page(page_id, |e| e.scroll())
    }

    /// Update scroll; a vertical change is queued for persistence
    pub fn set_scroll(&self, page_id: PageId, scroll: Offset) -> CacheResult<()> {
        let entry = self.entry(page_id)?;
        let mut entry = lock(&entry);
        let before = entry.scroll();
        entry.set_scroll(scroll);
        let after = entry.scroll();
        if after.y != before.y {
            self.writer.record(page_id, |journal| journal.scroll_changed(after.y));
        }
        Ok(())
    }

    pub fn zoom(&self, page_id: PageId) -> CacheResult<f32> {
        self.with_page(page_id, |e| e.zoom())
    }

    pub fn set_zoom(&self, page_id: PageId, zoom: f32) -> CacheResult<()> {
        if !zoom.is_finite() || zoom <= 0.0 {
            return Err(CacheError::InvalidZoom(zoom));
        }
        let entry = self.entry(page_id)?;
        lock(&entry).set_zoom(zoom);
        Ok(())
    }

    pub fn height(&self, page_id: PageId) -> CacheResult<f32> {
        self.with_page(page_id, |e| e.height())
    }

    // ---- eviction and persistence ----

    /// Evict least recently used pages until at most `target` remain
    ///
    /// The active page and its neighbors are never evicted, so more than
    /// `target` pages may remain. Each victim is flushed first; a page whose
    /// flush fails stays cached. Returns the number of pages evicted.
    pub fn evict(&self, target: usize) -> usize {
        let candidates: Vec<PageId> = {
            let state = self.state();
            let pinned = state.pinned(self.config.neighbor_radius);
            let excess = state.entries.len().saturating_sub(target);
            state
                .lru_queue
                .iter()
                .copied()
                .filter(|p| !pinned.contains(p))
                .take(excess)
                .collect()
        };

        let mut evicted = 0;
        for page_id in candidates {
            if let Err(err) = self.writer.flush_page(page_id) {
                warn!(page = %page_id, error = %err, "keeping page cached, flush failed");
                continue;
            }
            let mut state = self.state();
            // The active page may have moved while flushing
            if state.pinned(self.config.neighbor_radius).contains(&page_id) {
                continue;
            }
            if state.entries.remove(&page_id).is_some() {
                state.lru_queue.retain(|&p| p != page_id);
                state.stats.evictions += 1;
                state.stats.pages = state.entries.len();
                evicted += 1;
            }
        }

        if evicted > 0 {
            info!(evicted, target, "pages evicted");
        }
        evicted
    }

    /// Evict down to the configured capacity
    pub fn reduce_cache(&self) -> usize {
        self.evict(self.config.max_pages)
    }

    pub fn flush_page(&self, page_id: PageId) -> CacheResult<bool> {
        self.writer.flush_page(page_id)
    }

    pub fn flush_all(&self) -> CacheResult<usize> {
        self.writer.flush_all()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state();
        CacheStats {
            pages: state.entries.len(),
            ..state.stats
        }
    }
}

impl std::fmt::Debug for PageCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCacheManager")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write_coordinator::WriteCoordinatorConfig;
    use inkpage_model::{Background, Color, Pen, StrokePoint};
    use inkpage_scheduler::{WorkerPool, WorkerPoolConfig};
    use inkpage_storage::MemoryStore;
    use uuid::Uuid;

    const WAIT: Duration = Duration::from_secs(5);

    struct Fixture {
        store: Arc<MemoryStore>,
        scheduler: Arc<JobScheduler>,
        cache: Arc<PageCacheManager>,
        events: EventBus<EngineEvent>,
        _pool: Option<WorkerPool>,
    }

    fn fixture(config: CacheConfig, store: MemoryStore, workers: usize) -> Fixture {
        let store = Arc::new(store);
        let scheduler = Arc::new(JobScheduler::new());
        let events = EventBus::new();
        let writer = Arc::new(WriteCoordinator::new(
            store.clone(),
            events.clone(),
            WriteCoordinatorConfig {
                enable_auto_save: false,
                ..Default::default()
            },
        ));
        let cache = PageCacheManager::new(config, store.clone(), scheduler.clone(), writer, events.clone());
        let pool = (workers > 0).then(|| {
            WorkerPool::new(
                scheduler.clone(),
                WorkerPoolConfig::new(workers).with_poll_interval(Duration::from_millis(5)),
            )
        });
        Fixture {
            store,
            scheduler,
            cache,
            events,
            _pool: pool,
        }
    }

    fn stroke(page_id: PageId, y: f32) -> Stroke {
        Stroke::new(
            page_id,
            Pen::Ballpen,
            2.0,
            Color::BLACK,
            vec![StrokePoint::new(0.0, y), StrokePoint::new(20.0, y + 5.0)],
        )
    }

    #[test]
    fn test_activate_miss_then_hit() {
        let fx = fixture(CacheConfig::default(), MemoryStore::new(), 1);
        let page = Uuid::new_v4();
        let s = stroke(page, 10.0);
        fx.store.create_strokes(std::slice::from_ref(&s)).unwrap();

        let handle = fx.cache.activate(page);
        assert_eq!(handle.wait_timeout(WAIT), Some(LoadStatus::Loaded));
        assert_eq!(fx.cache.strokes(page).unwrap(), vec![s]);

        let again = fx.cache.activate(page);
        assert_eq!(again.status(), Some(LoadStatus::Loaded));
        let stats = fx.cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(fx.cache.active_page(), Some(page));
    }

    #[test]
    fn test_duplicate_activation_joins_load() {
        let fx = fixture(
            CacheConfig::default(),
            MemoryStore::new().with_load_latency(Duration::from_millis(50)),
            2,
        );
        let page = Uuid::new_v4();
        let first = fx.cache.activate(page);
        let second = fx.cache.activate(page);
        assert!(first.same(&second));

        assert_eq!(first.wait_timeout(WAIT), Some(LoadStatus::Loaded));
        assert_eq!(second.wait(), LoadStatus::Loaded);
        assert_eq!(fx.store.load_count(page), 1);
    }

    #[test]
    fn test_failed_load_leaves_page_absent() {
        let store = MemoryStore::new();
        let page = Uuid::new_v4();
        store.fail_loads_for(page);
        let fx = fixture(CacheConfig::default(), store, 1);
        let rx = fx.events.subscribe();

        let status = fx.cache.activate(page).wait_timeout(WAIT);
        assert!(matches!(status, Some(LoadStatus::Failed(_))));
        assert!(!fx.cache.contains(page));
        assert!(!fx.cache.is_loading(page));
        assert!(matches!(
            rx.recv_timeout(WAIT),
            Ok(EngineEvent::PageLoad { status: LoadStatus::Failed(_), .. })
        ));

        // A retry re-fetches cleanly
        fx.store.heal_page(page);
        assert_eq!(fx.cache.activate(page).wait_timeout(WAIT), Some(LoadStatus::Loaded));
        assert_eq!(fx.store.load_count(page), 2);
    }

    #[test]
    fn test_cancel_queued_load() {
        // No workers, so the load stays queued until cancelled
        let fx = fixture(CacheConfig::default(), MemoryStore::new(), 0);
        let page = Uuid::new_v4();
        let handle = fx.cache.activate(page);
        assert!(fx.cache.is_loading(page));

        assert!(fx.cache.cancel_load(page));
        assert_eq!(handle.status(), Some(LoadStatus::Cancelled));
        assert!(!fx.cache.contains(page));
        assert_eq!(fx.scheduler.pending_jobs(), 0);
        assert_eq!(fx.cache.stats().cancelled_loads, 1);
        assert!(!fx.cache.cancel_load(page));
    }

    #[test]
    fn test_cancel_running_load_installs_nothing() {
        let fx = fixture(
            CacheConfig::default(),
            MemoryStore::new().with_load_latency(Duration::from_millis(100)),
            1,
        );
        let page = Uuid::new_v4();
        let handle = fx.cache.activate(page);
        std::thread::sleep(Duration::from_millis(30));
        fx.cache.cancel_load(page);

        assert_eq!(handle.wait_timeout(WAIT), Some(LoadStatus::Cancelled));
        assert!(fx.scheduler.wait_idle(WAIT));
        assert!(!fx.cache.contains(page));
    }

    #[test]
    fn test_neighbors_prefetched_after_load() {
        let fx = fixture(CacheConfig::default(), MemoryStore::new(), 2);
        let pages: Vec<PageId> = (0..4).map(|_| Uuid::new_v4()).collect();
        fx.cache.set_document_order(pages.clone());
        assert_eq!(fx.cache.neighbors(pages[0]), vec![pages[1]]);
        assert_eq!(fx.cache.neighbors(pages[2]), vec![pages[1], pages[3]]);

        fx.cache.activate(pages[1]).wait_timeout(WAIT);
        assert!(fx.scheduler.wait_idle(WAIT));
        assert!(fx.cache.contains(pages[0]));
        assert!(fx.cache.contains(pages[2]));
        assert!(!fx.cache.contains(pages[3]));
    }

    #[test]
    fn test_evict_keeps_active_and_neighbors() {
        let fx = fixture(CacheConfig::default(), MemoryStore::new(), 0);
        let pages: Vec<PageId> = (0..3).map(|_| Uuid::new_v4()).collect();
        fx.cache.set_document_order(pages.clone());
        for &p in &pages {
            fx.cache.insert(p, PageContent::empty());
        }
        fx.cache.activate(pages[1]);

        assert_eq!(fx.cache.evict(1), 0);
        assert_eq!(fx.cache.cached_pages().len(), 3);
        assert_eq!(fx.cache.evict(0), 0);
    }

    #[test]
    fn test_evict_without_neighbors_keeps_only_active() {
        let fx = fixture(CacheConfig::default().with_neighbor_radius(0), MemoryStore::new(), 0);
        let pages: Vec<PageId> = (0..3).map(|_| Uuid::new_v4()).collect();
        fx.cache.set_document_order(pages.clone());
        for &p in &pages {
            fx.cache.insert(p, PageContent::empty());
        }
        fx.cache.activate(pages[1]);

        assert_eq!(fx.cache.evict(1), 2);
        assert_eq!(fx.cache.cached_pages(), vec![pages[1]]);
        assert_eq!(fx.cache.stats().evictions, 2);
    }

    #[test]
    fn test_evict_follows_recency() {
        let fx = fixture(CacheConfig::default().with_neighbor_radius(0), MemoryStore::new(), 0);
        let pages: Vec<PageId> = (0..4).map(|_| Uuid::new_v4()).collect();
        for &p in &pages {
            fx.cache.insert(p, PageContent::empty());
        }
        // Touch the oldest so the second becomes least recent
        fx.cache.strokes(pages[0]).unwrap();

        assert_eq!(fx.cache.evict(3), 1);
        assert!(!fx.cache.contains(pages[1]));
        assert!(fx.cache.contains(pages[0]));
    }

    #[test]
    fn test_evict_flushes_first_and_skips_on_failure() {
        let fx = fixture(CacheConfig::default().with_neighbor_radius(0), MemoryStore::new(), 0);
        let page = Uuid::new_v4();
        fx.cache.insert(page, PageContent::empty());
        let s = stroke(page, 0.0);
        fx.cache
            .edit(page, |e| e.add_strokes(vec![s.clone()]).map(|_| ()))
            .unwrap();

        fx.store.fail_next_writes(1);
        assert_eq!(fx.cache.evict(0), 0);
        assert!(fx.cache.contains(page));

        assert_eq!(fx.cache.evict(0), 1);
        assert!(fx.store.stroke_ids(page).contains(&s.id));
    }

    #[test]
    fn test_edit_failure_rolls_back_and_queues_nothing() {
        let fx = fixture(CacheConfig::default(), MemoryStore::new(), 0);
        let page = Uuid::new_v4();
        fx.cache.insert(page, PageContent::empty());
        let before = fx.cache.with_page(page, |e| e.snapshot()).unwrap();

        let result: CacheResult<()> = fx.cache.edit(page, |edit| {
            edit.add_strokes(vec![stroke(page, 0.0)])?;
            edit.remove_strokes(&[Uuid::new_v4()])?;
            Ok(())
        });
        assert!(matches!(result, Err(CacheError::StrokeNotFound { .. })));
        assert_eq!(fx.cache.with_page(page, |e| e.snapshot()).unwrap(), before);
        assert!(!fx.cache.writer().is_dirty(page));
    }

    #[test]
    fn test_set_strokes_persists_difference() {
        let fx = fixture(CacheConfig::default(), MemoryStore::new(), 0);
        let page = Uuid::new_v4();
        let keep = stroke(page, 0.0);
        let gone = stroke(page, 50.0);
        fx.cache.insert(page, PageContent::empty());
        fx.cache.set_strokes(page, vec![keep.clone(), gone.clone()]).unwrap();
        fx.cache.flush_page(page).unwrap();

        let added = stroke(page, 100.0);
        fx.cache.set_strokes(page, vec![keep.clone(), added.clone()]).unwrap();
        fx.cache.flush_page(page).unwrap();

        let stored = fx.store.stroke_ids(page);
        assert!(stored.contains(&keep.id) && stored.contains(&added.id));
        assert!(!stored.contains(&gone.id));
    }

    #[test]
    fn test_height_grows_and_recomputes() {
        let fx = fixture(CacheConfig::default().with_height_margin(50.0), MemoryStore::new(), 0);
        let page = Uuid::new_v4();
        fx.cache.insert(page, PageContent::empty());
        let low = stroke(page, 500.0);
        fx.cache.set_strokes(page, vec![stroke(page, 0.0), low.clone()]).unwrap();
        assert_eq!(fx.cache.height(page).unwrap(), low.bounds.bottom + 50.0);

        fx.cache.edit(page, |e| e.remove_strokes(&[low.id]).map(|_| ())).unwrap();
        // Deletion alone never shrinks the page
        assert_eq!(fx.cache.height(page).unwrap(), low.bounds.bottom + 50.0);
        let height = fx.cache.recompute_height(page).unwrap();
        assert!(height < low.bounds.top);
    }

    #[test]
    fn test_scroll_and_bitmap_are_persisted() {
        let fx = fixture(CacheConfig::default(), MemoryStore::new(), 0);
        let page = Uuid::new_v4();
        fx.store.insert_page(page, Background::Blank);
        fx.cache.insert(page, PageContent::empty());

        fx.cache.set_scroll(page, Offset::new(0.0, -10.0)).unwrap();
        assert_eq!(fx.cache.scroll(page).unwrap(), Offset::new(0.0, 0.0));
        fx.cache.set_scroll(page, Offset::new(0.0, 120.0)).unwrap();
        fx.cache
            .cache_bitmap(page, RgbaImage::new(8, 8), Offset::new(0.0, 120.0), 1.0)
            .unwrap();
        assert!(fx.cache.bitmap(page).is_some());

        fx.cache.flush_all().unwrap();
        assert_eq!(fx.store.scroll_y(page), Some(120.0));
        assert!(fx.store.has_preview(page));
        assert!(matches!(fx.cache.set_zoom(page, 0.0), Err(CacheError::InvalidZoom(_))));
    }

    #[test]
    fn test_preview_shown_after_reload() {
        let fx = fixture(CacheConfig::default().with_neighbor_radius(0), MemoryStore::new(), 1);
        let page = Uuid::new_v4();
        let other = Uuid::new_v4();
        fx.cache.insert(page, PageContent::empty());
        fx.cache
            .cache_bitmap(page, RgbaImage::from_pixel(4, 4, image::Rgba([9, 9, 9, 255])), Offset::default(), 1.0)
            .unwrap();
        fx.cache.insert(other, PageContent::empty());
        fx.cache.activate(other);
        assert_eq!(fx.cache.evict(0), 1);

        assert_eq!(fx.cache.activate(page).wait_timeout(WAIT), Some(LoadStatus::Loaded));
        let bitmap = fx.cache.bitmap(page).unwrap();
        assert_eq!(bitmap.image.get_pixel(0, 0).0, [9, 9, 9, 255]);
    }

    #[test]
    fn test_unknown_page_errors() {
        let fx = fixture(CacheConfig::default(), MemoryStore::new(), 0);
        let page = Uuid::new_v4();
        assert!(matches!(fx.cache.strokes(page), Err(CacheError::PageNotCached(_))));
        assert!(fx.cache.bitmap(page).is_none());
    }

    #[test]
    fn test_random_navigation_never_loses_edits() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let fx = fixture(CacheConfig::default().with_max_pages(3), MemoryStore::new(), 2);
        let pages: Vec<PageId> = (0..8).map(|_| Uuid::new_v4()).collect();
        fx.cache.set_document_order(pages.clone());
        let mut rng = StdRng::seed_from_u64(7);

        let mut drawn = 0;
        for step in 0..40 {
            let page = pages[rng.gen_range(0..pages.len())];
            assert_eq!(fx.cache.activate(page).wait_timeout(WAIT), Some(LoadStatus::Loaded));
            fx.cache
                .edit(page, |e| e.add_strokes(vec![stroke(page, step as f32 * 10.0)]))
                .unwrap();
            drawn += 1;

            assert!(fx.scheduler.wait_idle(WAIT));
            fx.cache.reduce_cache();
            assert!(fx.cache.contains(page));
            assert!(fx.cache.cached_pages().len() <= 3);
        }

        fx.cache.flush_all().unwrap();
        let stored: usize = pages.iter().map(|p| fx.store.stroke_ids(*p).len()).sum();
        assert_eq!(stored, drawn);
    }
}
