//! Property tests: undoing a sequence of edits restores the page exactly,
//! and redoing it reproduces the edited page exactly

use inkpage_cache::{CacheConfig, PageCacheManager, PageSnapshot, WriteCoordinator, WriteCoordinatorConfig};
use inkpage_core::{History, Operation, OperationGroup};
use inkpage_model::{Color, EngineEvent, PageContent, PageId, Pen, Stroke, StrokePoint};
use inkpage_scheduler::{EventBus, JobScheduler};
use inkpage_storage::MemoryStore;
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Step {
    Draw { x: f32, y: f32, len: usize },
    /// Delete the stroke at this index (modulo the stroke count)
    Delete(usize),
    /// Replace the stroke at this index with a translated copy
    Move { index: usize, dy: f32 },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (0.0f32..500.0, 0.0f32..2000.0, 1usize..20).prop_map(|(x, y, len)| Step::Draw { x, y, len }),
        1 => any::<usize>().prop_map(Step::Delete),
        1 => (any::<usize>(), -300.0f32..300.0).prop_map(|(index, dy)| Step::Move { index, dy }),
    ]
}

fn cache() -> (Arc<PageCacheManager>, PageId) {
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
    let page = uuid::Uuid::new_v4();
    cache.insert(page, PageContent::empty());
    (cache, page)
}

fn snapshot(cache: &PageCacheManager, page: PageId) -> PageSnapshot {
    cache.with_page(page, |e| e.snapshot()).unwrap()
}

fn group_for(step: &Step, page: PageId, current: &[Stroke]) -> Option<OperationGroup> {
    match *step {
        Step::Draw { x, y, len } => {
            let points = (0..len)
                .map(|i| StrokePoint::new(x + i as f32 * 3.0, y + (i % 3) as f32))
                .collect();
            let stroke = Stroke::new(page, Pen::Ballpen, 2.0, Color::BLACK, points);
            Some(OperationGroup::new(page).with(Operation::AddStrokes(vec![stroke])))
        }
        Step::Delete(index) if !current.is_empty() => {
            let victim = current[index % current.len()].clone();
            Some(OperationGroup::new(page).with(Operation::DeleteStrokes(vec![victim])))
        }
        Step::Move { index, dy } if !current.is_empty() => {
            let original = current[index % current.len()].clone();
            let moved = original.translated(inkpage_model::Offset::new(0.0, dy));
            Some(
                OperationGroup::new(page)
                    .with(Operation::DeleteStrokes(vec![original]))
                    .with(Operation::AddStrokes(vec![moved])),
            )
        }
        _ => None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn undo_all_then_redo_all(steps in prop::collection::vec(step_strategy(), 1..25)) {
        let (cache, page) = cache();
        let mut history = History::new(100);
        let initial = snapshot(&cache, page);

        let mut applied = 0;
        for step in &steps {
            let current = cache.strokes(page).unwrap();
            if let Some(group) = group_for(step, page, &current) {
                history.apply(&cache, group).unwrap();
                applied += 1;
            }
        }
        let edited = snapshot(&cache, page);
        prop_assert_eq!(history.undo_len(), applied);

        while history.undo(&cache).unwrap().is_some() {}
        prop_assert_eq!(snapshot(&cache, page), initial);

        while history.redo(&cache).unwrap().is_some() {}
        prop_assert_eq!(snapshot(&cache, page), edited);
    }
}
