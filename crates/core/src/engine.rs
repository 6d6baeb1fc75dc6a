//! Engine wiring
//!
//! Owns the worker pool, the event bus, the write coordinator, the page
//! cache and the edit controller, and hands live input to the workers.

use crate::config::EngineConfig;
use crate::editor::{EditController, EditorSettings};
use crate::error::EditResult;
use crate::input::InputBatch;
use crate::refresh::{DisplayRefresh, NoopRefresh};
use inkpage_cache::{LoadHandle, PageCacheManager, WriteCoordinator};
use inkpage_model::{EngineEvent, LoadStatus, PageId, PageStore};
use inkpage_render::{FileImageSource, ImageSource, NoImages, ViewportRenderer};
use inkpage_scheduler::{EventBus, JobId, JobPriority, JobScheduler, JobType, WorkerPool, WorkerPoolConfig};
use inkpage_storage::FileStore;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Screen and display collaborators supplied by the host
pub struct Display {
    pub width: u32,
    pub height: u32,
    pub images: Arc<dyn ImageSource>,
    pub refresh: Arc<dyn DisplayRefresh>,
}

impl Display {
    /// A surface without raster images or refresh latency
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            images: Arc::new(NoImages),
            refresh: Arc::new(NoopRefresh),
        }
    }

    pub fn with_images(mut self, images: Arc<dyn ImageSource>) -> Self {
        self.images = images;
        self
    }

    pub fn with_refresh(mut self, refresh: Arc<dyn DisplayRefresh>) -> Self {
        self.refresh = refresh;
        self
    }
}

pub struct Engine {
    config: EngineConfig,
    scheduler: Arc<JobScheduler>,
    pool: Option<WorkerPool>,
    events: EventBus<EngineEvent>,
    writer: Arc<WriteCoordinator>,
    cache: Arc<PageCacheManager>,
    editor: Arc<EditController>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("workers", &self.config.worker_count)
            .field("editor", &self.editor)
            .finish()
    }
}

impl Engine {
    /// Build and start an engine on top of `store`
    pub fn new(config: EngineConfig, store: Arc<dyn PageStore>, display: Display) -> EditResult<Self> {
        config.validate()?;

        let scheduler = Arc::new(JobScheduler::new());
        let pool = WorkerPool::new(
            scheduler.clone(),
            WorkerPoolConfig::new(config.worker_count).with_thread_name("inkpage-worker"),
        );
        let events = EventBus::new();

        let writer = Arc::new(WriteCoordinator::new(
            store.clone(),
            events.clone(),
            config.writer.clone(),
        ));
        writer.start();

        let cache = PageCacheManager::new(
            config.cache.clone(),
            store,
            scheduler.clone(),
            writer.clone(),
            events.clone(),
        );

        let (width, height) = (display.width, display.height);
        let viewport = ViewportRenderer::new(display.width, display.height, config.render.clone(), display.images)?;
        let editor = Arc::new(EditController::new(
            EditorSettings::from(&config),
            cache.clone(),
            viewport,
            events.clone(),
            display.refresh,
        ));

        info!(
            workers = config.worker_count,
            width,
            height,
            "engine started"
        );
        Ok(Self {
            config,
            scheduler,
            pool: Some(pool),
            events,
            writer,
            cache,
            editor,
        })
    }

    /// Engine over a [`FileStore`] at `root`, or the per-user data directory
    ///
    /// Relative image URIs resolve against the store root.
    pub fn with_file_store(
        config: EngineConfig,
        root: Option<&Path>,
        width: u32,
        height: u32,
        refresh: Arc<dyn DisplayRefresh>,
    ) -> EditResult<Self> {
        let store = match root {
            Some(root) => FileStore::with_root(root),
            None => FileStore::from_default_project()?,
        }
        .with_blob_limit(config.max_payload);
        info!(root = %store.root().display(), "using file store");
        let display = Display::new(width, height)
            .with_images(Arc::new(FileImageSource::with_root(store.root())))
            .with_refresh(refresh);
        Self::new(config, Arc::new(store), display)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn editor(&self) -> &Arc<EditController> {
        &self.editor
    }

    pub fn cache(&self) -> &Arc<PageCacheManager> {
        &self.cache
    }

    pub fn scheduler(&self) -> &Arc<JobScheduler> {
        &self.scheduler
    }

    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Pages in reading order, used for neighbor prefetch and navigation
    pub fn set_document_order(&self, pages: Vec<PageId>) {
        self.cache.set_document_order(pages);
    }

    /// Switch to `page` and draw it once loaded
    ///
    /// Blocks up to `timeout` for the load. A page still loading afterwards
    /// is drawn by a later [`EditController::show_page`].
    pub fn open_page(&self, page: PageId, timeout: Duration) -> EditResult<LoadHandle> {
        let handle = self.editor.switch_page(page)?;
        if handle.is_finished() {
            return Ok(handle);
        }
        match handle.wait_timeout(timeout) {
            Some(LoadStatus::Loaded) => {
                if self.editor.active_page().ok() == Some(page) {
                    self.editor.show_page()?;
                }
            }
            Some(status) => debug!(page = %page, ?status, "page did not load"),
            None => debug!(page = %page, "page still loading"),
        }
        Ok(handle)
    }

    /// Queue a finished input batch at interactive priority
    ///
    /// The batch is applied on a worker thread; failures are logged and the
    /// result reaches the UI through the event bus.
    pub fn submit_input(&self, batch: InputBatch) -> EditResult<JobId> {
        let page = self.editor.active_page()?;
        let editor = self.editor.clone();
        let (job_id, _) = self.scheduler.submit(
            JobPriority::Interactive,
            JobType::ApplyInput { page_id: page },
            move |token| {
                if token.is_cancelled() {
                    return;
                }
                if let Err(err) = editor.commit_input(&batch) {
                    warn!(page = %page, error = %err, "input batch not applied");
                }
            },
        );
        Ok(job_id)
    }

    /// Block until queued jobs have run; `false` on timeout
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.scheduler.wait_idle(timeout)
    }

    /// Persist every dirty page now
    pub fn flush(&self) -> EditResult<usize> {
        self.editor.flush_history();
        Ok(self.cache.flush_all()?)
    }

    /// Flush, stop the writer and join the workers
    pub fn shutdown(mut self) -> EditResult<()> {
        self.stop()
    }

    fn stop(&mut self) -> EditResult<()> {
        let Some(pool) = self.pool.take() else {
            return Ok(());
        };
        let flushed = self.flush();
        self.writer.stop();
        pool.shutdown();
        match flushed {
            Ok(pages) => {
                info!(pages, "engine stopped");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "final flush failed");
                Err(err)
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Failures are already logged by stop
        let _ = self.stop();
    }
}
