//! Undo/redo log of reversible page edits
//!
//! Every user gesture produces an [`OperationGroup`]. Groups are applied to
//! the page cache inside a single [`PageCacheManager::edit`] call, so either
//! every operation of a group lands or none does.

use crate::error::HistoryResult;
use inkpage_cache::{CacheResult, PageCacheManager, PageEdit};
use inkpage_model::{images_bounds, strokes_bounds, Image, PageId, Rect, Stroke};
use tracing::debug;

/// Default number of groups kept on the undo stack
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// A single reversible edit
///
/// Delete operations keep the full objects so that redo still works after the
/// page has been evicted and reloaded.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    AddStrokes(Vec<Stroke>),
    DeleteStrokes(Vec<Stroke>),
    AddImages(Vec<Image>),
    DeleteImages(Vec<Image>),
}

impl Operation {
    pub fn inverse(&self) -> Operation {
        match self {
            Operation::AddStrokes(s) => Operation::DeleteStrokes(s.clone()),
            Operation::DeleteStrokes(s) => Operation::AddStrokes(s.clone()),
            Operation::AddImages(i) => Operation::DeleteImages(i.clone()),
            Operation::DeleteImages(i) => Operation::AddImages(i.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Operation::AddStrokes(s) | Operation::DeleteStrokes(s) => s.is_empty(),
            Operation::AddImages(i) | Operation::DeleteImages(i) => i.is_empty(),
        }
    }

    /// Page-space area touched by this operation
    pub fn bounds(&self) -> Option<Rect> {
        match self {
            Operation::AddStrokes(s) | Operation::DeleteStrokes(s) => strokes_bounds(s),
            Operation::AddImages(i) | Operation::DeleteImages(i) => images_bounds(i),
        }
    }

    fn apply_to(&self, edit: &mut PageEdit<'_>) -> CacheResult<()> {
        match self {
            Operation::AddStrokes(strokes) => {
                edit.add_strokes(strokes.clone())?;
            }
            Operation::DeleteStrokes(strokes) => {
                let ids: Vec<_> = strokes.iter().map(|s| s.id).collect();
                edit.remove_strokes(&ids)?;
            }
            Operation::AddImages(images) => {
                edit.add_images(images.clone())?;
            }
            Operation::DeleteImages(images) => {
                let ids: Vec<_> = images.iter().map(|i| i.id).collect();
                edit.remove_images(&ids)?;
            }
        }
        Ok(())
    }
}

/// Operations produced by one gesture, undone and redone as a unit
#[derive(Debug, Clone, PartialEq)]
pub struct OperationGroup {
    pub page_id: PageId,
    pub operations: Vec<Operation>,
    /// Page height before the group was first applied
    pub height_before: Option<f32>,
    /// Page height right after the group was applied
    pub height_after: Option<f32>,
}

impl OperationGroup {
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            operations: Vec::new(),
            height_before: None,
            height_after: None,
        }
    }

    pub fn with(mut self, operation: Operation) -> Self {
        self.push(operation);
        self
    }

    pub fn push(&mut self, operation: Operation) {
        if !operation.is_empty() {
            self.operations.push(operation);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Whether applying the group takes content away, so height may shrink
    pub fn has_deletions(&self) -> bool {
        self.operations
            .iter()
            .any(|op| matches!(op, Operation::DeleteStrokes(_) | Operation::DeleteImages(_)))
    }

    /// Append a later group for the same page
    ///
    /// The merged group starts from this group's height and ends at the
    /// other's.
    pub fn merge(&mut self, other: OperationGroup) {
        debug_assert_eq!(self.page_id, other.page_id);
        self.operations.extend(other.operations);
        if self.height_before.is_none() {
            self.height_before = other.height_before;
        }
        if other.height_after.is_some() {
            self.height_after = other.height_after;
        }
    }

    /// Union of the bounds of every operation
    pub fn bounds(&self) -> Option<Rect> {
        self.operations
            .iter()
            .filter_map(Operation::bounds)
            .fold(None, Rect::union_opt)
    }

    /// Apply forward inside an open edit, recording the heights around it
    ///
    /// `recompute` shrinks the height to the content afterwards, which
    /// deletions need.
    pub fn apply_in(&mut self, edit: &mut PageEdit<'_>, recompute: bool) -> CacheResult<Option<Rect>> {
        let before = edit.entry().height();
        for operation in &self.operations {
            operation.apply_to(edit)?;
        }
        if recompute {
            edit.recompute_height();
        }
        self.height_before = Some(before);
        self.height_after = Some(edit.entry().height());
        Ok(self.bounds())
    }

    fn redo_in(&self, edit: &mut PageEdit<'_>) -> CacheResult<()> {
        for operation in &self.operations {
            operation.apply_to(edit)?;
        }
        if let Some(height) = self.height_after {
            edit.set_height(height);
        }
        Ok(())
    }

    fn undo_in(&self, edit: &mut PageEdit<'_>) -> CacheResult<()> {
        for operation in self.operations.iter().rev() {
            operation.inverse().apply_to(edit)?;
        }
        if let Some(height) = self.height_before {
            edit.set_height(height);
        }
        Ok(())
    }
}

/// Result of an undo or redo
#[derive(Debug, Clone, PartialEq)]
pub struct Replay {
    pub page_id: PageId,
    /// Page-space area to repaint
    pub dirty: Option<Rect>,
}

/// Undo and redo stacks for the active page
#[derive(Debug)]
pub struct History {
    undo: Vec<OperationGroup>,
    redo: Vec<OperationGroup>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Push an already applied group and clear the redo stack
    pub fn record(&mut self, group: OperationGroup) {
        if group.is_empty() {
            return;
        }
        self.undo.push(group);
        if self.undo.len() > self.limit {
            let excess = self.undo.len() - self.limit;
            self.undo.drain(..excess);
        }
        self.redo.clear();
    }

    /// Apply a group to the cache atomically, then record it
    pub fn apply(&mut self, cache: &PageCacheManager, mut group: OperationGroup) -> HistoryResult<Option<Rect>> {
        let page_id = group.page_id;
        let recompute = group.has_deletions();
        let dirty = cache.edit(page_id, |edit| group.apply_in(edit, recompute))?;
        self.record(group);
        Ok(dirty)
    }

    /// Revert the most recent group
    ///
    /// Returns `Ok(None)` when there is nothing to undo. A group that cannot
    /// be reverted stays on the undo stack.
    pub fn undo(&mut self, cache: &PageCacheManager) -> HistoryResult<Option<Replay>> {
        let Some(group) = self.undo.last() else {
            return Ok(None);
        };
        cache.edit(group.page_id, |edit| group.undo_in(edit))?;
        let replay = Replay {
            page_id: group.page_id,
            dirty: group.bounds(),
        };
        debug!(page_id = %group.page_id, operations = group.operations.len(), "undo");
        if let Some(group) = self.undo.pop() {
            self.redo.push(group);
        }
        Ok(Some(replay))
    }

    /// Re-apply the most recently undone group
    pub fn redo(&mut self, cache: &PageCacheManager) -> HistoryResult<Option<Replay>> {
        let Some(group) = self.redo.last() else {
            return Ok(None);
        };
        cache.edit(group.page_id, |edit| group.redo_in(edit))?;
        let replay = Replay {
            page_id: group.page_id,
            dirty: group.bounds(),
        };
        debug!(page_id = %group.page_id, operations = group.operations.len(), "redo");
        if let Some(group) = self.redo.pop() {
            self.undo.push(group);
        }
        Ok(Some(replay))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Forget undone groups once new content is drawn
    pub fn clear_redo(&mut self) {
        self.redo.clear();
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::HistoryError;
    use inkpage_cache::{CacheConfig, CacheError, WriteCoordinator, WriteCoordinatorConfig};
    use inkpage_model::{Background, Color, EngineEvent, PageContent, Pen, StrokePoint};
    use inkpage_scheduler::{EventBus, JobScheduler};
    use inkpage_storage::MemoryStore;
    use std::sync::Arc;

    pub(crate) fn cache_with_page(content: PageContent) -> (Arc<PageCacheManager>, PageId) {
        let store = Arc::new(MemoryStore::new());
        let events: EventBus<EngineEvent> = EventBus::new();
        let writer = Arc::new(WriteCoordinator::new(
            store.clone(),
            events.clone(),
            WriteCoordinatorConfig {
                enable_auto_save: false,
                ..Default::default()
            },
        ));
        let cache = PageCacheManager::new(
            CacheConfig::default(),
            store,
            Arc::new(JobScheduler::new()),
            writer,
            events,
        );
        let page_id = uuid::Uuid::new_v4();
        cache.insert(page_id, content);
        (cache, page_id)
    }

    fn stroke(page_id: PageId, y: f32) -> Stroke {
        Stroke::new(
            page_id,
            Pen::Ballpen,
            2.0,
            Color::BLACK,
            vec![StrokePoint::new(10.0, y), StrokePoint::new(40.0, y + 5.0)],
        )
    }

    fn snapshot(cache: &PageCacheManager, page_id: PageId) -> inkpage_cache::PageSnapshot {
        cache.with_page(page_id, |e| e.snapshot()).unwrap()
    }

    #[test]
    fn test_undo_redo_restores_identical_state() {
        let (cache, page) = cache_with_page(PageContent {
            background: Background::native("lined"),
            ..PageContent::empty()
        });
        let existing = stroke(page, 20.0);
        cache
            .edit(page, |e| e.add_strokes(vec![existing.clone()]).map(|_| ()))
            .unwrap();

        let before = snapshot(&cache, page);
        let mut history = History::default();
        let group = OperationGroup::new(page)
            .with(Operation::AddStrokes(vec![stroke(page, 800.0), stroke(page, 900.0)]))
            .with(Operation::DeleteStrokes(vec![existing]))
            .with(Operation::AddImages(vec![Image::new(page, 0.0, 1200.0, 50.0, 50.0, "a.png")]));
        let dirty = history.apply(&cache, group).unwrap();
        assert!(dirty.unwrap().bottom >= 1250.0);
        let after = snapshot(&cache, page);
        assert!(after.height > before.height);

        let replay = history.undo(&cache).unwrap().unwrap();
        assert_eq!(replay.page_id, page);
        assert_eq!(snapshot(&cache, page), before);

        history.redo(&cache).unwrap();
        assert_eq!(snapshot(&cache, page), after);
    }

    #[test]
    fn test_record_clears_redo() {
        let (cache, page) = cache_with_page(PageContent::empty());
        let mut history = History::default();
        history
            .apply(&cache, OperationGroup::new(page).with(Operation::AddStrokes(vec![stroke(page, 10.0)])))
            .unwrap();
        history.undo(&cache).unwrap();
        assert!(history.can_redo());

        history
            .apply(&cache, OperationGroup::new(page).with(Operation::AddStrokes(vec![stroke(page, 30.0)])))
            .unwrap();
        assert!(!history.can_redo());
        assert_eq!(history.undo_len(), 1);
    }

    #[test]
    fn test_rejected_group_leaves_everything_unchanged() {
        let (cache, page) = cache_with_page(PageContent::empty());
        let mut history = History::default();
        history
            .apply(&cache, OperationGroup::new(page).with(Operation::AddStrokes(vec![stroke(page, 10.0)])))
            .unwrap();
        let before = snapshot(&cache, page);

        // Second operation references a stroke that was never added
        let group = OperationGroup::new(page)
            .with(Operation::AddStrokes(vec![stroke(page, 500.0)]))
            .with(Operation::DeleteStrokes(vec![stroke(page, 60.0)]));
        let err = history.apply(&cache, group).unwrap_err();
        assert!(matches!(err, HistoryError::Rejected(CacheError::StrokeNotFound { .. })));
        assert_eq!(snapshot(&cache, page), before);
        assert_eq!(history.undo_len(), 1);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_undo_of_missing_page_keeps_stacks() {
        let (cache, page) = cache_with_page(PageContent::empty());
        let mut history = History::default();
        history.record(OperationGroup::new(page).with(Operation::AddStrokes(vec![stroke(page, 10.0)])));

        // Stroke was never applied, so its inverse cannot be either
        assert!(history.undo(&cache).is_err());
        assert_eq!(history.undo_len(), 1);
        assert_eq!(history.redo_len(), 0);

        let orphan = uuid::Uuid::new_v4();
        let mut other = History::default();
        other.record(OperationGroup::new(orphan).with(Operation::AddStrokes(vec![stroke(orphan, 10.0)])));
        let err = other.undo(&cache).unwrap_err();
        assert!(matches!(err, HistoryError::Rejected(CacheError::PageNotCached(_))));
        assert_eq!(other.undo_len(), 1);
    }

    #[test]
    fn test_limit_drops_oldest() {
        let page = uuid::Uuid::new_v4();
        let mut history = History::new(2);
        for y in [10.0, 20.0, 30.0] {
            history.record(OperationGroup::new(page).with(Operation::AddStrokes(vec![stroke(page, y)])));
        }
        assert_eq!(history.undo_len(), 2);
        history.record(OperationGroup::new(page));
        assert_eq!(history.undo_len(), 2);
    }

    #[test]
    fn test_merge_keeps_outer_heights() {
        let page = uuid::Uuid::new_v4();
        let mut first = OperationGroup::new(page).with(Operation::AddStrokes(vec![stroke(page, 10.0)]));
        first.height_before = Some(0.0);
        first.height_after = Some(100.0);
        let mut second = OperationGroup::new(page).with(Operation::AddStrokes(vec![stroke(page, 200.0)]));
        second.height_before = Some(100.0);
        second.height_after = Some(300.0);
        first.merge(second);
        assert_eq!(first.operations.len(), 2);
        assert_eq!(first.height_before, Some(0.0));
        assert_eq!(first.height_after, Some(300.0));
        assert!(first.bounds().unwrap().bottom > 200.0);
    }

    #[test]
    fn test_undo_of_deletion_after_recompute() {
        let (cache, page) = cache_with_page(PageContent::empty());
        let deep = stroke(page, 2000.0);
        cache.edit(page, |e| e.add_strokes(vec![deep.clone()]).map(|_| ())).unwrap();
        let before = snapshot(&cache, page);

        let mut group = OperationGroup::new(page).with(Operation::DeleteStrokes(vec![deep]));
        cache.edit(page, |e| group.apply_in(e, true)).unwrap();
        assert_eq!(cache.height(page).unwrap(), 0.0);
        let mut history = History::default();
        history.record(group);

        history.undo(&cache).unwrap();
        assert_eq!(snapshot(&cache, page), before);
    }
}
