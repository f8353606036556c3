use tracing::{debug, info};

use crate::grouping::{CategoryGroup, find_subcategory_mut};
use crate::ordering::OrderingStore;
use crate::store::KeyValueStore;
use crate::task::{GroupKey, Task, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Dragging { task: TaskId, group: GroupKey },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    Moved { from: usize, to: usize },
    /// Dropped on itself or on its current slot.
    Unchanged,
    /// Target lives in another category or subcategory.
    Rejected,
    /// No drag in progress, or the ids are not in the bucket.
    Ignored,
}

/// Single drag gesture: `Idle -> Dragging -> (dropped | cancelled) -> Idle`.
#[derive(Debug, Clone)]
pub struct DragCoordinator {
    state: DragState,
}

impl Default for DragCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl DragCoordinator {
    pub fn new() -> Self {
        Self {
            state: DragState::Idle,
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn begin(&mut self, task: &Task) {
        debug!(task = %task.id, group = %task.group_key(), "drag started");
        self.state = DragState::Dragging {
            task: task.id.clone(),
            group: task.group_key(),
        };
    }

    pub fn cancel(&mut self) {
        if self.is_dragging() {
            debug!("drag cancelled");
        }
        self.state = DragState::Idle;
    }

    /// Ends the gesture on `target`. A legal drop moves the dragged id to the
    /// target's slot in the stored bucket and in `view`, without a reload.
    #[tracing::instrument(skip_all, fields(target = %target.id))]
    pub fn drop_on<S: KeyValueStore>(
        &mut self,
        target: &Task,
        store: &mut OrderingStore<S>,
        view: &mut [CategoryGroup<'_>],
    ) -> DropOutcome {
        let state = std::mem::replace(&mut self.state, DragState::Idle);
        let DragState::Dragging { task: dragged, group } = state else {
            return DropOutcome::Ignored;
        };

        if !target.in_group(&group) {
            debug!(dragged = %dragged, %group, target_group = %target.group_key(), "cross-group drop rejected");
            return DropOutcome::Rejected;
        }
        if dragged == target.id {
            return DropOutcome::Unchanged;
        }

        let bucket_key = group.storage_key();
        let view_bucket = find_subcategory_mut(view, &group);
        let mut ids = store
            .task_order()
            .remove(&bucket_key)
            .filter(|ids| !ids.is_empty())
            .or_else(|| view_bucket.as_ref().map(|sub| sub.task_ids()))
            .unwrap_or_default();

        let (Some(from), Some(to)) = (
            ids.iter().position(|id| *id == dragged),
            ids.iter().position(|id| *id == target.id),
        ) else {
            debug!(dragged = %dragged, bucket = %bucket_key, "dragged or target id missing from bucket");
            return DropOutcome::Ignored;
        };

        move_item(&mut ids, from, to);
        store.set_task_bucket(&bucket_key, ids);

        if let Some(sub) = view_bucket
            && let (Some(view_from), Some(view_to)) =
                (sub.position_of(&dragged), sub.position_of(&target.id))
        {
            move_item(&mut sub.tasks, view_from, view_to);
        }

        info!(dragged = %dragged, bucket = %bucket_key, from, to, "task reordered");
        DropOutcome::Moved { from, to }
    }
}

/// Remove-then-insert move. Out-of-range indices leave the list untouched.
pub fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) {
    if from >= items.len() || to >= items.len() || from == to {
        return;
    }
    let item = items.remove(from);
    items.insert(to, item);
}

fn swap_adjacent<T: PartialEq>(items: &mut [T], needle: &T, direction: Direction) -> bool {
    let Some(idx) = items.iter().position(|item| item == needle) else {
        return false;
    };
    let other = match direction {
        Direction::Up if idx > 0 => idx - 1,
        Direction::Down if idx + 1 < items.len() => idx + 1,
        _ => return false,
    };
    items.swap(idx, other);
    true
}

/// Moves a category header one slot. No-op at the edges.
pub fn move_category<S: KeyValueStore>(
    store: &mut OrderingStore<S>,
    category: &str,
    direction: Direction,
) -> bool {
    let mut order = store.category_order();
    if !swap_adjacent(&mut order, &category.to_string(), direction) {
        return false;
    }
    store.set_category_order(&order);
    info!(category, ?direction, "category moved");
    true
}

pub fn move_subcategory<S: KeyValueStore>(
    store: &mut OrderingStore<S>,
    category: &str,
    sub_category: &str,
    direction: Direction,
) -> bool {
    let mut order = store.subcategory_order();
    let Some(subs) = order.get_mut(category) else {
        return false;
    };
    if !swap_adjacent(subs, &sub_category.to_string(), direction) {
        return false;
    }
    store.set_subcategory_order(&order);
    info!(category, sub_category, ?direction, "subcategory moved");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::resolve;
    use crate::store::MemoryStore;

    fn task(id: &str, category: &str, sub: &str, display_order: i64) -> Task {
        Task::new(TaskId::from(id), id, category, sub, display_order)
    }

    fn ids(raw: &[&str]) -> Vec<TaskId> {
        raw.iter().map(|id| TaskId::from(*id)).collect()
    }

    fn fixture() -> Vec<Task> {
        vec![
            task("a", "Dev", "BE", 0),
            task("b", "Dev", "BE", 1),
            task("c", "Dev", "BE", 2),
            task("d", "Dev", "BE", 3),
            task("x", "Dev", "FE", 4),
        ]
    }

    #[test]
    fn move_item_is_remove_then_insert() {
        let mut list = vec![0, 1, 2, 3, 4];
        move_item(&mut list, 1, 3);
        assert_eq!(list, vec![0, 2, 3, 1, 4]);
        move_item(&mut list, 4, 0);
        assert_eq!(list, vec![4, 0, 2, 3, 1]);
        move_item(&mut list, 9, 0);
        assert_eq!(list, vec![4, 0, 2, 3, 1]);
    }

    #[test]
    fn legal_drop_updates_store_and_view() {
        let tasks = fixture();
        let mut store = OrderingStore::new(MemoryStore::new());
        let snapshot = store.refresh(&tasks);
        let mut view = resolve(&tasks, &snapshot);

        let mut drag = DragCoordinator::new();
        drag.begin(&tasks[0]);
        let outcome = drag.drop_on(&tasks[2], &mut store, &mut view);

        assert_eq!(outcome, DropOutcome::Moved { from: 0, to: 2 });
        assert_eq!(store.task_order()["Dev::BE"], ids(&["b", "c", "a", "d"]));
        assert_eq!(view[0].subcategories[0].task_ids(), ids(&["b", "c", "a", "d"]));
        assert_eq!(drag.state(), &DragState::Idle);
    }

    #[test]
    fn cross_group_drop_changes_nothing() {
        let tasks = fixture();
        let mut store = OrderingStore::new(MemoryStore::new());
        let snapshot = store.refresh(&tasks);
        let mut view = resolve(&tasks, &snapshot);

        let mut drag = DragCoordinator::new();
        drag.begin(&tasks[0]);
        let outcome = drag.drop_on(&tasks[4], &mut store, &mut view);

        assert_eq!(outcome, DropOutcome::Rejected);
        assert_eq!(store.snapshot(), snapshot);
        assert_eq!(view, resolve(&tasks, &snapshot));
        assert!(!drag.is_dragging());
    }

    #[test]
    fn drop_without_drag_or_after_cancel_is_ignored() {
        let tasks = fixture();
        let mut store = OrderingStore::new(MemoryStore::new());
        let snapshot = store.refresh(&tasks);
        let mut view = resolve(&tasks, &snapshot);

        let mut drag = DragCoordinator::new();
        assert_eq!(drag.drop_on(&tasks[1], &mut store, &mut view), DropOutcome::Ignored);

        drag.begin(&tasks[0]);
        drag.cancel();
        assert_eq!(drag.drop_on(&tasks[1], &mut store, &mut view), DropOutcome::Ignored);
        assert_eq!(store.snapshot(), snapshot);
    }

    #[test]
    fn unstored_bucket_falls_back_to_view_order() {
        let tasks = fixture();
        let mut store = OrderingStore::new(MemoryStore::new());
        let snapshot = store.snapshot();
        let mut view = resolve(&tasks, &snapshot);

        let mut drag = DragCoordinator::new();
        drag.begin(&tasks[3]);
        let outcome = drag.drop_on(&tasks[0], &mut store, &mut view);

        assert_eq!(outcome, DropOutcome::Moved { from: 3, to: 0 });
        assert_eq!(store.task_order()["Dev::BE"], ids(&["d", "a", "b", "c"]));
    }

    #[test]
    fn up_down_controls_stop_at_edges() {
        let tasks = vec![
            task("a", "Dev", "BE", 0),
            task("b", "Ops", "CI", 1),
            task("c", "Ops", "Infra", 2),
        ];
        let mut store = OrderingStore::new(MemoryStore::new());
        store.refresh(&tasks);

        assert!(!move_category(&mut store, "Dev", Direction::Up));
        assert!(!move_category(&mut store, "Ops", Direction::Down));
        assert!(move_category(&mut store, "Ops", Direction::Up));
        assert_eq!(store.category_order(), vec!["Ops".to_string(), "Dev".to_string()]);

        assert!(move_subcategory(&mut store, "Ops", "Infra", Direction::Up));
        assert_eq!(
            store.subcategory_order()["Ops"],
            vec!["Infra".to_string(), "CI".to_string()]
        );
        assert!(!move_subcategory(&mut store, "Ops", "Infra", Direction::Up));
        assert!(!move_subcategory(&mut store, "Nope", "CI", Direction::Down));
    }
}
