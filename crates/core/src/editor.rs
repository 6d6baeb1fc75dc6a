//! Edit control surface
//!
//! Coordinates input batches, scroll and zoom requests, selection, the
//! clipboard and undo/redo against the viewport renderer, the page cache and
//! the history of the active page.
//!
//! Locks are always taken in the same order: drawing lock, viewport, editor
//! state, history. The drawing lock is not reentrant, so public methods take
//! it once and call private helpers that expect it held.

use crate::clipboard::Clipboard;
use crate::config::EngineConfig;
use crate::error::{EditError, EditResult};
use crate::history::{History, Operation, OperationGroup};
use crate::input::{straighten, EditMode, EraserKind, InputBatch, InputPoint, InputTool, PenSettings};
use crate::refresh::DisplayRefresh;
use crate::selection::Selection;
use image::RgbaImage;
use inkpage_cache::{LoadHandle, PageCacheManager};
use inkpage_model::{
    encode_with_limit, Background, EngineEvent, IntRect, LoadStatus, Offset, PageId, Rect, Stroke,
    StrokePoint,
};
use inkpage_render::{
    erase_in_rect, erase_with_path, EraseResult, Exclusions, PreviewPen, RenderConfig, Scene,
    ViewportRenderer,
};
use inkpage_scheduler::{DrawingLock, EventBus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Editor knobs taken from [`EngineConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct EditorSettings {
    pub max_payload: usize,
    pub history_batch: Duration,
    pub history_limit: usize,
    pub eraser_radius: f32,
    pub duplicate_offset: f32,
    pub refresh_timeout: Duration,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for EditorSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_payload: config.max_payload,
            history_batch: Duration::from_millis(config.history_batch_ms),
            history_limit: config.history_limit,
            eraser_radius: config.eraser_radius,
            duplicate_offset: config.duplicate_offset,
            refresh_timeout: Duration::from_millis(config.refresh_timeout_ms),
        }
    }
}

/// Result of a scroll request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollResponse {
    /// Screen area to present again; `None` when nothing moved
    pub dirty: Option<IntRect>,
    /// Part of the request not applied because another scroll was running;
    /// the caller merges it into its next request
    pub unhandled: Offset,
}

#[derive(Debug)]
struct EditorState {
    page: Option<PageId>,
    mode: EditMode,
    pen: PenSettings,
    eraser: EraserKind,
    selection: Option<Selection>,
    clipboard: Clipboard,
    /// Stroke group still open for batching, with the time of its last commit
    pending: Option<(OperationGroup, Instant)>,
    /// Scroll held back while smooth scrolling is off
    deferred_scroll: Offset,
    /// A continuous zoom left upscaled pixels on screen
    owes_redraw: bool,
    drawing_enabled: bool,
}

impl EditorState {
    fn new(eraser_radius: f32) -> Self {
        Self {
            page: None,
            mode: EditMode::default(),
            pen: PenSettings::default(),
            eraser: EraserKind::Pen {
                radius: eraser_radius,
            },
            selection: None,
            clipboard: Clipboard::default(),
            pending: None,
            deferred_scroll: Offset::ZERO,
            owes_redraw: false,
            drawing_enabled: true,
        }
    }
}

/// Clears the scroll-in-progress flag when a scroll finishes
struct ScrollFlag<'a>(&'a AtomicBool);

impl Drop for ScrollFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The facade the UI and the input driver talk to
pub struct EditController {
    settings: EditorSettings,
    cache: Arc<PageCacheManager>,
    viewport: Mutex<ViewportRenderer>,
    drawing: DrawingLock,
    history: Mutex<History>,
    state: Mutex<EditorState>,
    scrolling: AtomicBool,
    events: EventBus<EngineEvent>,
    refresh: Arc<dyn DisplayRefresh>,
}

impl std::fmt::Debug for EditController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditController")
            .field("settings", &self.settings)
            .field("page", &self.state().page)
            .finish()
    }
}

impl EditController {
    pub fn new(
        settings: EditorSettings,
        cache: Arc<PageCacheManager>,
        viewport: ViewportRenderer,
        events: EventBus<EngineEvent>,
        refresh: Arc<dyn DisplayRefresh>,
    ) -> Self {
        Self {
            history: Mutex::new(History::new(settings.history_limit)),
            state: Mutex::new(EditorState::new(settings.eraser_radius)),
            settings,
            cache,
            viewport: Mutex::new(viewport),
            drawing: DrawingLock::new(),
            scrolling: AtomicBool::new(false),
            events,
            refresh,
        }
    }

    fn viewport(&self) -> MutexGuard<'_, ViewportRenderer> {
        self.viewport.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> MutexGuard<'_, EditorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn history(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn cache(&self) -> &Arc<PageCacheManager> {
        &self.cache
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    /// The page receiving input, once its content is in the cache
    pub fn active_page(&self) -> EditResult<PageId> {
        let page = self.state().page.ok_or(EditError::NoActivePage)?;
        if self.cache.contains(page) {
            Ok(page)
        } else if self.cache.is_loading(page) {
            Err(EditError::PageLoading(page))
        } else {
            Err(inkpage_cache::CacheError::PageNotCached(page).into())
        }
    }

    fn notify(&self, dirty: Option<IntRect>, full: bool) {
        if full {
            self.events.publish(EngineEvent::RegionDirty(None));
            self.refresh.request_refresh(None);
        } else if let Some(rect) = dirty {
            self.events.publish(EngineEvent::RegionDirty(Some(rect)));
            self.refresh.request_refresh(Some(rect));
        }
    }

    /// Run `f` with the scene of a cached page
    fn render<R, F>(&self, page: PageId, viewport: &mut ViewportRenderer, f: F) -> EditResult<R>
    where
        F: FnOnce(&mut ViewportRenderer, &Scene<'_>) -> R,
    {
        let width = viewport.page_width();
        Ok(self.cache.with_page(page, |entry| {
            let scene = Scene::new(entry.background(), entry.strokes(), entry.images(), width);
            f(viewport, &scene)
        })?)
    }

    /// Like [`render`](Self::render), falling back to an empty page when no
    /// page is shown
    fn render_current<R, F>(&self, viewport: &mut ViewportRenderer, mut f: F) -> R
    where
        F: FnMut(&mut ViewportRenderer, &Scene<'_>) -> R,
    {
        let width = viewport.page_width();
        let page = self.state().page;
        if let Some(page) = page {
            let rendered = self.cache.with_page(page, |entry| {
                let scene = Scene::new(entry.background(), entry.strokes(), entry.images(), width);
                f(viewport, &scene)
            });
            if let Ok(out) = rendered {
                return out;
            }
        }
        let blank = Background::Blank;
        f(viewport, &Scene::new(&blank, &[], &[], width))
    }

    // ---- history batching ----

    /// Move the open stroke group onto the undo stack
    fn commit_pending(&self, state: &mut EditorState) {
        if let Some((group, _)) = state.pending.take() {
            self.history().record(group);
        }
    }

    fn push_stroke_group(&self, state: &mut EditorState, group: OperationGroup) {
        let now = Instant::now();
        match state.pending.take() {
            Some((mut open, last))
                if open.page_id == group.page_id && now.duration_since(last) < self.settings.history_batch =>
            {
                open.merge(group);
                state.pending = Some((open, now));
            }
            previous => {
                let mut history = self.history();
                if let Some((open, _)) = previous {
                    history.record(open);
                }
                history.clear_redo();
                state.pending = Some((group, now));
            }
        }
    }

    /// Close the open stroke group so the next stroke starts a new undo step
    pub fn flush_history(&self) {
        let mut state = self.state();
        self.commit_pending(&mut state);
    }

    pub fn can_undo(&self) -> bool {
        let state = self.state();
        state.pending.is_some() || self.history().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        let state = self.state();
        state.pending.is_none() && self.history().can_redo()
    }

    /// Apply a group through the cache, record it and repaint what it touched
    fn apply_group(
        &self,
        page: PageId,
        viewport: &mut ViewportRenderer,
        state: &mut EditorState,
        mut group: OperationGroup,
    ) -> EditResult<Option<IntRect>> {
        if group.is_empty() {
            return Ok(None);
        }
        self.commit_pending(state);
        let recompute = group.has_deletions();
        let area = self.cache.edit(page, |edit| group.apply_in(edit, recompute))?;
        self.history().record(group);
        match area {
            Some(rect) => self.render(page, viewport, |v, scene| {
                v.draw_page_region(rect, scene, &Exclusions::none())
            }),
            None => Ok(None),
        }
    }

    // ---- input ----

    /// Draw live samples into the preview layer
    pub fn preview_input(&self, points: &[InputPoint]) -> EditResult<Option<IntRect>> {
        let (pen, mode, enabled) = {
            let state = self.state();
            (state.pen, state.mode, state.drawing_enabled)
        };
        if !enabled || points.is_empty() || !matches!(mode, EditMode::Draw | EditMode::Line) {
            return Ok(None);
        }
        let _guard = self.drawing.acquire();
        let mut viewport = self.viewport();
        if !viewport.is_previewing() {
            viewport.begin_preview(PreviewPen {
                pen: pen.pen,
                width: pen.width,
                color: pen.color,
            });
        }
        let transform = viewport.transform();
        let page_points: Vec<StrokePoint> = points.iter().map(|p| p.to_page(&transform)).collect();
        let dirty = viewport.preview_points(&page_points);
        drop(viewport);
        self.notify(dirty, false);
        Ok(dirty)
    }

    /// Process a finished input batch
    ///
    /// Waits for the display to acknowledge earlier refreshes first. The
    /// tool picks the operation; a pen batch follows the editing mode.
    pub fn commit_input(&self, batch: &InputBatch) -> EditResult<Option<IntRect>> {
        if batch.is_empty() || !self.state().drawing_enabled {
            return Ok(None);
        }
        if !self.refresh.wait_ready(self.settings.refresh_timeout) {
            debug!("display refresh not acknowledged, continuing");
        }

        let transform = self.viewport().transform();
        let mode = self.state().mode;
        match (batch.tool, mode) {
            (InputTool::Eraser, _) | (InputTool::Pen, EditMode::Erase) => {
                let path: Vec<Offset> = batch.to_page(&transform).iter().map(StrokePoint::position).collect();
                self.apply_erase_scaled(&path, transform.zoom)
            }
            (InputTool::Select, _) | (InputTool::Pen, EditMode::Select) => match batch.page_bounds(&transform) {
                Some(area) => self.select_region(area),
                None => Ok(None),
            },
            (InputTool::Pen, _) => self.apply_stroke(batch.to_page(&transform)),
        }
    }

    /// Commit a stroke with the current pen (page coordinates)
    ///
    /// A stroke whose encoding exceeds the payload ceiling is rejected before
    /// it touches the cache, and the preview is dropped.
    pub fn apply_stroke(&self, points: Vec<StrokePoint>) -> EditResult<Option<IntRect>> {
        let page = self.active_page()?;
        let (pen, mode) = {
            let state = self.state();
            (state.pen, state.mode)
        };
        let points = if mode == EditMode::Line {
            straighten(&points)
        } else {
            points
        };
        if points.is_empty() {
            self.cancel_preview();
            return Err(EditError::EmptyStroke);
        }
        if let Err(err) = encode_with_limit(&points, self.settings.max_payload) {
            warn!(page = %page, points = points.len(), error = %err, "stroke rejected");
            self.cancel_preview();
            return Err(err.into());
        }

        let stroke = Stroke::new(page, pen.pen, pen.width, pen.color, points);
        let _guard = self.drawing.acquire();
        let mut viewport = self.viewport();
        let mut group = OperationGroup::new(page).with(Operation::AddStrokes(vec![stroke.clone()]));
        if let Err(err) = self.cache.edit(page, |edit| group.apply_in(edit, false)) {
            let cleared = viewport.cancel_preview();
            drop(viewport);
            self.notify(cleared, false);
            return Err(err.into());
        }
        let dirty = self.render(page, &mut viewport, |v, scene| v.commit_stroke(&stroke, scene))?;
        drop(viewport);

        let mut state = self.state();
        self.push_stroke_group(&mut state, group);
        drop(state);

        debug!(page = %page, stroke = %stroke.id, points = stroke.points.len(), "stroke committed");
        self.notify(dirty, false);
        Ok(dirty)
    }

    fn cancel_preview(&self) {
        let _guard = self.drawing.acquire();
        let cleared = self.viewport().cancel_preview();
        self.notify(cleared, false);
    }

    /// Erase along a page-space path, or inside the rectangle it spans,
    /// depending on the eraser kind
    pub fn apply_erase(&self, path: &[Offset]) -> EditResult<Option<IntRect>> {
        let zoom = self.viewport().zoom();
        self.apply_erase_scaled(path, zoom)
    }

    /// The pen eraser radius is in screen pixels and shrinks in page space
    /// as the zoom grows
    fn apply_erase_scaled(&self, path: &[Offset], zoom: f32) -> EditResult<Option<IntRect>> {
        let page = self.active_page()?;
        let eraser = self.state().eraser;
        let _guard = self.drawing.acquire();
        let mut viewport = self.viewport();

        let result: EraseResult = self.cache.with_page(page, |entry| match eraser {
            EraserKind::Pen { radius } => erase_with_path(entry.strokes(), path, radius / zoom),
            EraserKind::Select => match Rect::bounding(path.iter().copied()) {
                Some(area) => erase_in_rect(entry.strokes(), entry.images(), area),
                None => EraseResult::default(),
            },
        })?;
        if result.is_empty() {
            return Ok(None);
        }

        let group = OperationGroup::new(page)
            .with(Operation::DeleteStrokes(result.removed_strokes))
            .with(Operation::AddStrokes(result.added_strokes))
            .with(Operation::DeleteImages(result.removed_images));
        let mut state = self.state();
        let dirty = self.apply_group(page, &mut viewport, &mut state, group)?;
        state.selection = None;
        drop(state);
        drop(viewport);
        debug!(page = %page, ?dirty, "erase applied");
        self.notify(dirty, false);
        Ok(dirty)
    }

    // ---- scroll and zoom ----

    /// Scroll by `delta` screen pixels
    ///
    /// A request arriving while another scroll is running is not applied;
    /// its delta comes back as `unhandled`.
    pub fn scroll_by(&self, delta: Offset) -> EditResult<ScrollResponse> {
        if self.scrolling.swap(true, Ordering::AcqRel) {
            return Ok(ScrollResponse {
                dirty: None,
                unhandled: delta,
            });
        }
        let _flag = ScrollFlag(&self.scrolling);

        let page = self.active_page()?;
        self.check_transformable(page)?;

        let smooth = self.viewport().config().smooth_scroll;
        if !smooth {
            let mut state = self.state();
            state.deferred_scroll = state.deferred_scroll + delta;
            return Ok(ScrollResponse {
                dirty: None,
                unhandled: Offset::ZERO,
            });
        }
        self.scroll_locked(page, delta)
    }

    /// Apply scroll held back while smooth scrolling is off
    pub fn finish_scroll(&self) -> EditResult<ScrollResponse> {
        let delta = std::mem::take(&mut self.state().deferred_scroll);
        if delta.is_zero() {
            return Ok(ScrollResponse {
                dirty: None,
                unhandled: Offset::ZERO,
            });
        }
        let page = self.active_page()?;
        self.scroll_locked(page, delta)
    }

    fn scroll_locked(&self, page: PageId, delta: Offset) -> EditResult<ScrollResponse> {
        let _guard = self.drawing.acquire();
        let mut viewport = self.viewport();
        let outcome = self.render(page, &mut viewport, |v, scene| v.scroll_by(delta, scene))?;
        self.cache.set_scroll(page, outcome.scroll)?;
        let dirty = outcome.moved().then(|| viewport.bounds());
        drop(viewport);

        self.notify(dirty, false);
        Ok(ScrollResponse {
            dirty,
            unhandled: Offset::ZERO,
        })
    }

    fn check_transformable(&self, page: PageId) -> EditResult<()> {
        let allowed = self.cache.with_page(page, |e| e.background().allows_transformation())?;
        if allowed {
            Ok(())
        } else {
            Err(EditError::TransformationNotAllowed)
        }
    }

    /// Zoom by a multiplicative `factor` around `pivot` (screen pixels)
    ///
    /// Ignored in select mode. The cached bitmap is replaced afterwards so
    /// that the page reopens at the new zoom.
    pub fn zoom_by(&self, factor: f32, pivot: Offset) -> EditResult<Option<IntRect>> {
        let page = self.active_page()?;
        if self.state().mode == EditMode::Select {
            debug!("zoom ignored in select mode");
            return Ok(None);
        }
        self.check_transformable(page)?;

        let _guard = self.drawing.acquire();
        let mut viewport = self.viewport();
        let outcome = self.render(page, &mut viewport, |v, scene| v.zoom_by(factor, pivot, scene))??;
        if !outcome.changed {
            return Ok(None);
        }
        self.cache.set_zoom(page, outcome.zoom)?;
        self.cache.set_scroll(page, outcome.scroll)?;
        self.cache
            .cache_bitmap(page, viewport.snapshot(), outcome.scroll, outcome.zoom)?;
        let dirty = Some(viewport.bounds());
        drop(viewport);

        self.state().owes_redraw |= outcome.approximate;
        self.notify(dirty, true);
        Ok(dirty)
    }

    /// Replace an upscaled stand-in with a proper repaint
    pub fn finish_zoom(&self) -> EditResult<Option<IntRect>> {
        if !std::mem::take(&mut self.state().owes_redraw) {
            return Ok(None);
        }
        self.redraw().map(Some)
    }

    /// Back to zoom 1 with the horizontal scroll reset
    pub fn reset_zoom(&self) -> EditResult<IntRect> {
        let page = self.active_page()?;
        let _guard = self.drawing.acquire();
        let mut viewport = self.viewport();
        let dirty = self.render(page, &mut viewport, |v, scene| v.reset_zoom(scene))?;
        self.cache.set_zoom(page, 1.0)?;
        self.cache.set_scroll(page, viewport.scroll())?;
        drop(viewport);
        self.state().owes_redraw = false;
        self.notify(Some(dirty), true);
        Ok(dirty)
    }

    // ---- history ----

    pub fn undo(&self) -> EditResult<Option<IntRect>> {
        self.replay(true)
    }

    pub fn redo(&self) -> EditResult<Option<IntRect>> {
        self.replay(false)
    }

    fn replay(&self, undo: bool) -> EditResult<Option<IntRect>> {
        let page = self.active_page()?;
        let _guard = self.drawing.acquire();
        let mut viewport = self.viewport();
        let replay = {
            let mut state = self.state();
            self.commit_pending(&mut state);
            let mut history = self.history();
            let replay = if undo {
                history.undo(&self.cache)?
            } else {
                history.redo(&self.cache)?
            };
            if replay.is_some() {
                state.selection = None;
            }
            replay
        };
        let Some(replay) = replay else {
            return Ok(None);
        };

        let dirty = match replay.dirty {
            Some(rect) if replay.page_id == page => self.render(page, &mut viewport, |v, scene| {
                v.draw_page_region(rect, scene, &Exclusions::none())
            })?,
            _ => None,
        };
        drop(viewport);
        debug!(page = %replay.page_id, undo, "history replayed");
        self.notify(dirty, false);
        Ok(dirty)
    }

    // ---- selection and clipboard ----

    /// Select the strokes and images whose bounds intersect `area` (page
    /// space); returns the screen rectangle of the selection
    pub fn select_region(&self, area: Rect) -> EditResult<Option<IntRect>> {
        let page = self.active_page()?;
        let selection = self
            .cache
            .with_page(page, |e| Selection::from_region(page, e.strokes(), e.images(), area))?;
        let transform = self.viewport().transform();
        let screen = selection.bounds().map(|b| transform.page_rect_to_pixels(b));
        debug!(page = %page, selected = selection.len(), "region selected");
        self.state().selection = (!selection.is_empty()).then_some(selection);
        Ok(screen)
    }

    pub fn selection(&self) -> Option<Selection> {
        self.state().selection.clone()
    }

    pub fn clear_selection(&self) {
        self.state().selection = None;
    }

    /// Replace the selection through `f`, which returns the group to apply
    /// and the new selection
    fn edit_selection<F>(&self, f: F) -> EditResult<Option<IntRect>>
    where
        F: FnOnce(&Selection) -> (OperationGroup, Option<Selection>),
    {
        let page = self.active_page()?;
        let _guard = self.drawing.acquire();
        let mut viewport = self.viewport();
        let mut state = self.state();
        let selection = state
            .selection
            .clone()
            .filter(|s| s.page_id == page && !s.is_empty())
            .ok_or(EditError::NothingSelected)?;
        let (group, next) = f(&selection);
        let dirty = self.apply_group(page, &mut viewport, &mut state, group)?;
        state.selection = next;
        drop(state);
        drop(viewport);
        self.notify(dirty, false);
        Ok(dirty)
    }

    /// Move the selection by `delta` page units
    pub fn displace_selection(&self, delta: Offset) -> EditResult<Option<IntRect>> {
        self.edit_selection(|sel| {
            let (group, moved) = sel.displaced(delta);
            (group, Some(moved))
        })
    }

    /// Scale the selection around its center
    pub fn resize_selection(&self, factor: f32) -> EditResult<Option<IntRect>> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(inkpage_render::RenderError::InvalidZoom(factor).into());
        }
        self.edit_selection(|sel| {
            let (group, resized) = sel.resized(factor);
            (group, Some(resized))
        })
    }

    pub fn delete_selection(&self) -> EditResult<Option<IntRect>> {
        self.edit_selection(|sel| (sel.deletion(), None))
    }

    /// Copy the selection next to the original; the copy becomes selected
    pub fn duplicate_selection(&self) -> EditResult<Option<IntRect>> {
        let offset = self.settings.duplicate_offset;
        self.edit_selection(|sel| {
            let (group, copy) = sel.duplicated(Offset::new(offset, offset));
            (group, Some(copy))
        })
    }

    /// Put the selection on the clipboard; returns the number of objects
    pub fn copy_selection(&self) -> EditResult<usize> {
        let scroll = self.viewport().scroll();
        let mut state = self.state();
        let selection = state
            .selection
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or(EditError::NothingSelected)?;
        state.clipboard = Clipboard::copy(&selection, scroll);
        Ok(selection.len())
    }

    pub fn cut_selection(&self) -> EditResult<Option<IntRect>> {
        self.copy_selection()?;
        self.delete_selection()
    }

    /// Paste the clipboard at the same screen position on the active page
    ///
    /// The pasted objects become the selection and undo as one step.
    pub fn paste(&self) -> EditResult<Option<IntRect>> {
        let page = self.active_page()?;
        let _guard = self.drawing.acquire();
        let mut viewport = self.viewport();
        let scroll = viewport.scroll();
        let mut state = self.state();
        if state.clipboard.is_empty() {
            return Err(EditError::EmptyClipboard);
        }
        let pasted = state.clipboard.paste(page, scroll);
        let group = OperationGroup::new(page)
            .with(Operation::AddStrokes(pasted.strokes.clone()))
            .with(Operation::AddImages(pasted.images.clone()));
        let dirty = self.apply_group(page, &mut viewport, &mut state, group)?;
        info!(page = %page, objects = pasted.len(), "pasted");
        state.selection = Some(pasted);
        drop(state);
        drop(viewport);
        self.notify(dirty, false);
        Ok(dirty)
    }

    /// Remove every stroke and image from the active page as one undo step
    pub fn clear_page(&self) -> EditResult<Option<IntRect>> {
        let page = self.active_page()?;
        let _guard = self.drawing.acquire();
        let mut viewport = self.viewport();
        let group = self.cache.with_page(page, |e| {
            OperationGroup::new(page)
                .with(Operation::DeleteStrokes(e.strokes().to_vec()))
                .with(Operation::DeleteImages(e.images().to_vec()))
        })?;
        let mut state = self.state();
        let dirty = self.apply_group(page, &mut viewport, &mut state, group)?;
        state.selection = None;
        drop(state);
        drop(viewport);
        self.notify(dirty, false);
        Ok(dirty)
    }

    // ---- pages ----

    /// Make `page` the active page
    ///
    /// Pending work on the previous page is committed, its bitmap cached and
    /// its changes flushed, and history is cleared. A cached bitmap of the
    /// new page is shown at once; the full content is drawn by
    /// [`show_page`](Self::show_page) when the returned load resolves (which
    /// this method does itself when the page is already cached).
    pub fn switch_page(&self, page: PageId) -> EditResult<LoadHandle> {
        let handle = {
            let _guard = self.drawing.acquire();
            let mut viewport = self.viewport();
            let mut state = self.state();
            self.commit_pending(&mut state);

            if let Some(old) = state.page.filter(|old| *old != page) {
                if self.cache.contains(old) {
                    if let Err(err) =
                        self.cache
                            .cache_bitmap(old, viewport.snapshot(), viewport.scroll(), viewport.zoom())
                    {
                        warn!(page = %old, error = %err, "could not cache bitmap");
                    }
                    if let Err(err) = self.cache.flush_page(old) {
                        warn!(page = %old, error = %err, "flush on page switch failed");
                    }
                    if let Err(err) = self.cache.forget_removed(old) {
                        debug!(page = %old, error = %err, "could not prune removed ids");
                    }
                }
            }

            let mut keep = self.cache.neighbors(page);
            keep.push(page);
            self.cache.cancel_loads_except(&keep);

            viewport.cancel_preview();
            self.history().clear();
            state.selection = None;
            state.deferred_scroll = Offset::ZERO;
            state.owes_redraw = false;
            state.page = Some(page);
            drop(state);

            let handle = self.cache.activate(page);
            if let Some(bitmap) = self.cache.bitmap(page) {
                if let Err(err) = viewport.load_bitmap(&bitmap.image, bitmap.scroll, bitmap.zoom) {
                    debug!(page = %page, error = %err, "cached bitmap not usable");
                }
            }
            handle
        };

        info!(page = %page, "page switched");
        self.events.publish(EngineEvent::PageChanged(page));
        if handle.status() == Some(LoadStatus::Loaded) {
            self.show_page()?;
        } else {
            self.notify(None, true);
        }
        Ok(handle)
    }

    /// Draw the active page from its cached content and view state
    pub fn show_page(&self) -> EditResult<IntRect> {
        let page = self.active_page()?;
        let _guard = self.drawing.acquire();
        let mut viewport = self.viewport();
        let (scroll, zoom) = self.cache.with_page(page, |e| (e.scroll(), e.zoom()))?;
        viewport.set_view(scroll, zoom)?;
        let dirty = self.render(page, &mut viewport, |v, scene| v.redraw_all(scene))?;
        drop(viewport);
        self.notify(Some(dirty), true);
        Ok(dirty)
    }

    fn step_page(&self, forward: bool) -> EditResult<Option<LoadHandle>> {
        let current = self.state().page.ok_or(EditError::NoActivePage)?;
        let order = self.cache.document_order();
        let Some(index) = order.iter().position(|p| *p == current) else {
            return Ok(None);
        };
        let target = if forward {
            order.get(index + 1)
        } else {
            index.checked_sub(1).and_then(|i| order.get(i))
        };
        match target {
            Some(&target) => self.switch_page(target).map(Some),
            None => Ok(None),
        }
    }

    /// Switch to the next page in document order; `None` on the last page
    pub fn next_page(&self) -> EditResult<Option<LoadHandle>> {
        self.step_page(true)
    }

    pub fn previous_page(&self) -> EditResult<Option<LoadHandle>> {
        self.step_page(false)
    }

    // ---- surface ----

    /// Recreate the surface for a new screen size
    pub fn resize(&self, width: u32, height: u32) -> EditResult<IntRect> {
        let _guard = self.drawing.acquire();
        let mut viewport = self.viewport();
        let dirty = self.render_current(&mut viewport, |v, scene| v.resize(width, height, scene))?;
        let page = self.state().page;
        if let Some(page) = page.filter(|p| self.cache.contains(*p)) {
            self.cache.set_zoom(page, 1.0)?;
        }
        drop(viewport);
        self.notify(Some(dirty), true);
        Ok(dirty)
    }

    /// Repaint the whole surface
    pub fn redraw(&self) -> EditResult<IntRect> {
        let _guard = self.drawing.acquire();
        let mut viewport = self.viewport();
        let dirty = self.render_current(&mut viewport, |v, scene| v.redraw_all(scene));
        drop(viewport);
        self.notify(Some(dirty), true);
        Ok(dirty)
    }

    pub fn set_render_config(&self, config: RenderConfig) -> EditResult<IntRect> {
        {
            let _guard = self.drawing.acquire();
            self.viewport().set_config(config)?;
        }
        self.redraw()
    }

    /// Consistent copy of the screen, preview included
    ///
    /// Waits for any batch being drawn to finish.
    pub fn present(&self) -> RgbaImage {
        let _guard = self.drawing.acquire();
        self.viewport().present_with_preview()
    }

    pub fn scroll(&self) -> Offset {
        self.viewport().scroll()
    }

    pub fn zoom(&self) -> f32 {
        self.viewport().zoom()
    }

    // ---- modes and tools ----

    pub fn mode(&self) -> EditMode {
        self.state().mode
    }

    pub fn set_mode(&self, mode: EditMode) {
        let mut state = self.state();
        if state.mode == mode {
            return;
        }
        if mode != EditMode::Select {
            state.selection = None;
        }
        debug!(from = ?state.mode, to = ?mode, "mode changed");
        state.mode = mode;
    }

    pub fn pen(&self) -> PenSettings {
        self.state().pen
    }

    pub fn set_pen(&self, pen: PenSettings) {
        self.state().pen = pen;
    }

    pub fn eraser(&self) -> EraserKind {
        self.state().eraser
    }

    pub fn set_eraser(&self, eraser: EraserKind) {
        self.state().eraser = eraser;
    }

    pub fn is_drawing_enabled(&self) -> bool {
        self.state().drawing_enabled
    }

    /// Enable or disable live input; changes are published
    pub fn set_drawing(&self, enabled: bool) {
        let changed = {
            let mut state = self.state();
            std::mem::replace(&mut state.drawing_enabled, enabled) != enabled
        };
        if changed {
            if !enabled {
                self.cancel_preview();
            }
            self.events.publish(EngineEvent::DrawingStateChanged(enabled));
        }
    }
}
