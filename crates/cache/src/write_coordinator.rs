//! Write coordinator for debounced page persistence
//!
//! Edits land in a per-page [`DirtyJournal`] and reach the store once the
//! page has been quiet for the debounce window, or once the maximum delay
//! since the first unsaved change has passed. Writes are coalesced, never
//! cancelled.

use crate::error::{CacheError, CacheResult};
use crate::journal::DirtyJournal;
use image::ImageFormat;
use inkpage_model::{EngineEvent, PageId, PageStore, Stroke};
use inkpage_scheduler::EventBus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Configuration for the write coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteCoordinatorConfig {
    /// Quiet period after the last change before writing
    pub debounce_ms: u64,

    /// Maximum time a change may wait, even while changes keep arriving
    pub max_debounce_ms: u64,

    /// Whether the background thread writes automatically
    pub enable_auto_save: bool,

    /// Strokes sent to the store per create call before any halving
    pub max_batch_strokes: usize,

    /// Delay before retrying a failed flush; doubles per consecutive failure
    pub retry_backoff_ms: u64,

    pub max_retry_backoff_ms: u64,

    /// How often the background thread looks for due pages
    pub check_interval_ms: u64,
}

impl Default for WriteCoordinatorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            max_debounce_ms: 5000,
            enable_auto_save: true,
            max_batch_strokes: 1500,
            retry_backoff_ms: 500,
            max_retry_backoff_ms: 30_000,
            check_interval_ms: 100,
        }
    }
}

impl WriteCoordinatorConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn max_debounce(&self) -> Duration {
        Duration::from_millis(self.max_debounce_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(1))
    }

    fn backoff(&self, failures: u32) -> Duration {
        let factor = 1u64 << failures.saturating_sub(1).min(16);
        Duration::from_millis(
            self.retry_backoff_ms
                .saturating_mul(factor)
                .min(self.max_retry_backoff_ms),
        )
    }
}

/// Timing state for one page's unsaved changes
#[derive(Debug)]
struct PendingWrite {
    first_marked_at: Instant,
    last_marked_at: Instant,
    is_dirty: bool,
    failures: u32,
    last_failure: Option<Instant>,
}

impl PendingWrite {
    fn new() -> Self {
        Self {
            first_marked_at: Instant::now(),
            last_marked_at: Instant::now(),
            is_dirty: false,
            failures: 0,
            last_failure: None,
        }
    }

    fn mark_dirty(&mut self) {
        let now = Instant::now();
        if !self.is_dirty {
            self.first_marked_at = now;
        }
        self.last_marked_at = now;
        self.is_dirty = true;
    }

    fn clear(&mut self) {
        self.is_dirty = false;
    }

    fn mark_failed(&mut self) {
        self.failures += 1;
        self.last_failure = Some(Instant::now());
        self.is_dirty = true;
    }

    fn mark_succeeded(&mut self) {
        self.failures = 0;
        self.last_failure = None;
    }

    fn should_write(&self, config: &WriteCoordinatorConfig) -> bool {
        if !self.is_dirty {
            return false;
        }
        if let Some(failed_at) = self.last_failure {
            if failed_at.elapsed() < config.backoff(self.failures) {
                return false;
            }
        }

        // Quiet for the debounce window, or waiting longer than the max delay
        self.last_marked_at.elapsed() >= config.debounce()
            || self.first_marked_at.elapsed() >= config.max_debounce()
    }
}

#[derive(Debug)]
struct PageWrites {
    pending: PendingWrite,
    journal: DirtyJournal,
}

struct Shared {
    config: WriteCoordinatorConfig,
    store: Arc<dyn PageStore>,
    events: EventBus<EngineEvent>,
    pages: Mutex<HashMap<PageId, PageWrites>>,
    /// Serializes store traffic so flushes of a page apply in order
    flush_lock: Mutex<()>,
    should_stop: Mutex<bool>,
    wake: Condvar,
}

/// Work that could not be persisted, with the error that stopped it
struct PersistFailure {
    unsent: DirtyJournal,
    error: CacheError,
}

/// Debounced, batched writer from cache journals to the page store
pub struct WriteCoordinator {
    shared: Arc<Shared>,
    thread_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl WriteCoordinator {
    pub fn new(
        store: Arc<dyn PageStore>,
        events: EventBus<EngineEvent>,
        config: WriteCoordinatorConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                store,
                events,
                pages: Mutex::new(HashMap::new()),
                flush_lock: Mutex::new(()),
                should_stop: Mutex::new(false),
                wake: Condvar::new(),
            }),
            thread_handle: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &WriteCoordinatorConfig {
        &self.shared.config
    }

    /// Start the background thread if auto-save is enabled
    ///
    /// Calling this more than once is a no-op.
    pub fn start(&self) {
        if !self.shared.config.enable_auto_save {
            return;
        }
        let mut handle = lock(&self.thread_handle);
        if handle.is_some() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("inkpage-writer".to_string())
            .spawn(move || run_writer(shared))
        {
            Ok(h) => *handle = Some(h),
            Err(err) => error!(error = %err, "failed to spawn write coordinator thread"),
        }
    }

    /// Record changes to a page's journal and mark it dirty
    pub fn record<F>(&self, page_id: PageId, f: F)
    where
        F: FnOnce(&mut DirtyJournal),
    {
        let mut pages = lock(&self.shared.pages);
        let writes = pages.entry(page_id).or_insert_with(|| PageWrites {
            pending: PendingWrite::new(),
            journal: DirtyJournal::new(),
        });
        f(&mut writes.journal);
        if !writes.journal.is_empty() {
            writes.pending.mark_dirty();
        }
    }

    /// Whether the page has changes that have not reached the store
    pub fn is_dirty(&self, page_id: PageId) -> bool {
        lock(&self.shared.pages)
            .get(&page_id)
            .is_some_and(|w| w.pending.is_dirty || !w.journal.is_empty())
    }

    pub fn dirty_pages(&self) -> Vec<PageId> {
        lock(&self.shared.pages)
            .iter()
            .filter(|(_, w)| w.pending.is_dirty || !w.journal.is_empty())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Write a page's pending changes now
    ///
    /// Returns `Ok(true)` if anything was written, `Ok(false)` if there was
    /// nothing to write. On error the unsent changes stay queued.
    pub fn flush_page(&self, page_id: PageId) -> CacheResult<bool> {
        flush_page(&self.shared, page_id)
    }

    /// Flush every dirty page; returns the first error after trying all
    pub fn flush_all(&self) -> CacheResult<usize> {
        let mut written = 0;
        let mut first_error = None;
        for page_id in self.dirty_pages() {
            match self.flush_page(page_id) {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(written),
        }
    }

    /// Drop queued changes for a page without writing them
    pub fn discard(&self, page_id: PageId) {
        lock(&self.shared.pages).remove(&page_id);
    }

    /// Stop the background thread and wait for it to exit
    pub fn stop(&self) {
        *lock(&self.shared.should_stop) = true;
        self.shared.wake.notify_all();
        if let Some(handle) = lock(&self.thread_handle).take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WriteCoordinator {
    fn drop(&mut self) {
        self.stop();

        // Flush any pending writes before dropping
        if let Err(err) = self.flush_all() {
            warn!(error = %err, "unsaved changes remain at shutdown");
        }
    }
}

impl std::fmt::Debug for WriteCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteCoordinator")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn run_writer(shared: Arc<Shared>) {
    let check_interval = shared.config.check_interval();
    loop {
        {
            let stop = lock(&shared.should_stop);
            if *stop {
                break;
            }
            let (stop, _) = shared
                .wake
                .wait_timeout(stop, check_interval)
                .unwrap_or_else(|e| e.into_inner());
            if *stop {
                break;
            }
        }

        let due: Vec<PageId> = lock(&shared.pages)
            .iter()
            .filter(|(_, w)| w.pending.should_write(&shared.config))
            .map(|(id, _)| *id)
            .collect();

        for page_id in due {
            // Failures are logged and retried after backoff
            let _ = flush_page(&shared, page_id);
        }
    }
    debug!("write coordinator stopped");
}

fn flush_page(shared: &Shared, page_id: PageId) -> CacheResult<bool> {
    let _serial = lock(&shared.flush_lock);

    let journal = {
        let mut pages = lock(&shared.pages);
        let Some(writes) = pages.get_mut(&page_id) else {
            return Ok(false);
        };
        writes.pending.clear();
        writes.journal.take()
    };
    if journal.is_empty() {
        return Ok(false);
    }

    match persist(shared, page_id, journal) {
        Ok(()) => {
            let mut pages = lock(&shared.pages);
            if let Some(writes) = pages.get_mut(&page_id) {
                writes.pending.mark_succeeded();
                if !writes.pending.is_dirty && writes.journal.is_empty() {
                    pages.remove(&page_id);
                }
            }
            debug!(page = %page_id, "page flushed");
            Ok(true)
        }
        Err(PersistFailure { unsent, error }) => {
            let mut pages = lock(&shared.pages);
            let writes = pages.entry(page_id).or_insert_with(|| PageWrites {
                pending: PendingWrite::new(),
                journal: DirtyJournal::new(),
            });
            writes.journal.merge_back(unsent);
            writes.pending.mark_failed();
            warn!(
                page = %page_id,
                failures = writes.pending.failures,
                error = %error,
                "flush failed, changes kept for retry"
            );
            Err(error)
        }
    }
}

fn persist(shared: &Shared, page_id: PageId, mut journal: DirtyJournal) -> Result<(), PersistFailure> {
    let store = &shared.store;

    if !journal.deleted_strokes.is_empty() {
        let ids: Vec<_> = journal.deleted_strokes.iter().copied().collect();
        if let Err(err) = store.delete_strokes(&ids) {
            return Err(PersistFailure {
                unsent: journal,
                error: err.into(),
            });
        }
        journal.deleted_strokes.clear();
    }

    if !journal.deleted_images.is_empty() {
        let ids: Vec<_> = journal.deleted_images.iter().copied().collect();
        if let Err(err) = store.delete_images(&ids) {
            return Err(PersistFailure {
                unsent: journal,
                error: err.into(),
            });
        }
        journal.deleted_images.clear();
    }

    if !journal.created_images.is_empty() {
        if let Err(err) = store.create_images(&journal.created_images) {
            return Err(PersistFailure {
                unsent: journal,
                error: err.into(),
            });
        }
        journal.created_images.clear();
    }

    let strokes = std::mem::take(&mut journal.created_strokes);
    if let Err((remaining, error)) = create_strokes_batched(shared, page_id, strokes) {
        journal.created_strokes = remaining;
        return Err(PersistFailure {
            unsent: journal,
            error,
        });
    }

    if let Some(scroll_y) = journal.scroll_y {
        if let Err(err) = store.update_page_scroll(page_id, scroll_y) {
            return Err(PersistFailure {
                unsent: journal,
                error: err.into(),
            });
        }
        journal.scroll_y = None;
    }

    if let Some(preview) = journal.preview.take() {
        let mut png = Vec::new();
        match preview.write_to(&mut Cursor::new(&mut png), ImageFormat::Png) {
            Ok(()) => {
                if let Err(err) = store.save_preview(page_id, &png) {
                    warn!(page = %page_id, error = %err, "could not save page preview");
                }
            }
            Err(err) => warn!(page = %page_id, error = %err, "could not encode page preview"),
        }
    }

    Ok(())
}

/// Create strokes in batches, halving the batch whenever the store reports
/// the payload as too large
///
/// A single stroke that still does not fit is dropped and reported through
/// [`EngineEvent::PersistFailed`]. Any other error returns the strokes that
/// were not written.
fn create_strokes_batched(
    shared: &Shared,
    page_id: PageId,
    mut remaining: Vec<Stroke>,
) -> Result<(), (Vec<Stroke>, CacheError)> {
    let mut batch = shared.config.max_batch_strokes.max(1);

    while !remaining.is_empty() {
        let n = batch.min(remaining.len());
        match shared.store.create_strokes(&remaining[..n]) {
            Ok(()) => {
                remaining.drain(..n);
            }
            Err(err) if err.is_payload_size() => {
                if n == 1 {
                    let dropped = remaining.remove(0);
                    error!(
                        page = %page_id,
                        stroke = %dropped.id,
                        points = dropped.points.len(),
                        error = %err,
                        "stroke cannot be persisted at any batch size"
                    );
                    shared.events.publish(EngineEvent::PersistFailed {
                        page_id,
                        stroke_ids: vec![dropped.id],
                        reason: err.to_string(),
                    });
                } else {
                    batch = n / 2;
                    debug!(page = %page_id, batch, "payload too large, halving batch");
                }
            }
            Err(err) => return Err((remaining, err.into())),
        }
    }
    Ok(())
}
