use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::store::KeyValueStore;
use crate::task::{GroupKey, Task, TaskId};

pub const CATEGORY_ORDER_KEY: &str = "gantt.category_order";
pub const SUBCATEGORY_ORDER_KEY: &str = "gantt.subcategory_order";
pub const TASK_ORDER_KEY: &str = "gantt.task_order";
pub const EXPANDED_CATEGORIES_KEY: &str = "gantt.expanded_categories";
pub const EXPANDED_SUBCATEGORIES_KEY: &str = "gantt.expanded_subcategories";

pub type SubcategoryOrder = BTreeMap<String, Vec<String>>;
pub type TaskOrder = BTreeMap<String, Vec<TaskId>>;

/// Everything the ordering store holds, read in one go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderSnapshot {
    pub categories: Vec<String>,
    pub subcategories: SubcategoryOrder,
    pub tasks: TaskOrder,
    pub expanded_categories: BTreeSet<String>,
    pub expanded_subcategories: BTreeSet<String>,
}

impl OrderSnapshot {
    pub fn is_category_expanded(&self, category: &str) -> bool {
        self.expanded_categories.contains(category)
    }

    pub fn is_subcategory_expanded(&self, key: &GroupKey) -> bool {
        self.expanded_subcategories.contains(&key.storage_key())
    }
}

/// Client-local ordering and expansion preferences on top of an injected
/// key-value backend. Nothing here returns an error: unreadable data reads
/// as empty and failed writes are logged.
#[derive(Debug)]
pub struct OrderingStore<S> {
    backend: S,
}

impl<S: KeyValueStore> OrderingStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn into_backend(self) -> S {
        self.backend
    }

    pub fn load<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let Some(raw) = self.backend.get(key) else {
            return T::default();
        };
        if raw.trim().is_empty() {
            return T::default();
        }
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "stored ordering unreadable; treating as empty");
                T::default()
            }
        }
    }

    pub fn save<T: Serialize>(&mut self, key: &str, value: &T) {
        if !self.backend.is_available() {
            debug!(key, "storage unavailable; skipping save");
            return;
        }
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key, error = %err, "failed serializing ordering");
                return;
            }
        };
        if let Err(err) = self.backend.set(key, &raw) {
            warn!(key, error = %format!("{err:#}"), "failed writing ordering");
        }
    }

    pub fn category_order(&self) -> Vec<String> {
        self.load(CATEGORY_ORDER_KEY)
    }

    pub fn subcategory_order(&self) -> SubcategoryOrder {
        self.load(SUBCATEGORY_ORDER_KEY)
    }

    pub fn task_order(&self) -> TaskOrder {
        self.load(TASK_ORDER_KEY)
    }

    pub fn expanded_categories(&self) -> BTreeSet<String> {
        self.load(EXPANDED_CATEGORIES_KEY)
    }

    pub fn expanded_subcategories(&self) -> BTreeSet<String> {
        self.load(EXPANDED_SUBCATEGORIES_KEY)
    }

    pub fn set_category_order(&mut self, order: &[String]) {
        self.save(CATEGORY_ORDER_KEY, &order);
    }

    pub fn set_subcategory_order(&mut self, order: &SubcategoryOrder) {
        self.save(SUBCATEGORY_ORDER_KEY, order);
    }

    pub fn set_task_order(&mut self, order: &TaskOrder) {
        self.save(TASK_ORDER_KEY, order);
    }

    /// Replaces a single `category::subcategory` bucket.
    pub fn set_task_bucket(&mut self, bucket_key: &str, ids: Vec<TaskId>) {
        let mut order = self.task_order();
        order.insert(bucket_key.to_string(), ids);
        self.set_task_order(&order);
    }

    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            categories: self.category_order(),
            subcategories: self.subcategory_order(),
            tasks: self.task_order(),
            expanded_categories: self.expanded_categories(),
            expanded_subcategories: self.expanded_subcategories(),
        }
    }

    /// Seeds each empty order structure from `display_order`. Structures
    /// that already hold a preference are returned untouched.
    #[tracing::instrument(skip(self, tasks), fields(tasks = tasks.len()))]
    pub fn initialize_if_absent(&mut self, tasks: &[Task]) -> OrderSnapshot {
        let mut by_display: Vec<&Task> = tasks.iter().collect();
        by_display.sort_by_key(|task| task.display_order);

        let mut categories = self.category_order();
        if categories.is_empty() {
            categories = derive_category_order(&by_display);
            if !categories.is_empty() {
                info!(count = categories.len(), "seeded category order");
                self.set_category_order(&categories);
            }
        }

        let mut subcategories = self.subcategory_order();
        if subcategories.is_empty() {
            subcategories = derive_subcategory_order(&by_display);
            if !subcategories.is_empty() {
                info!(count = subcategories.len(), "seeded subcategory order");
                self.set_subcategory_order(&subcategories);
            }
        }

        let mut task_order = self.task_order();
        if task_order.is_empty() {
            task_order = derive_task_order(&by_display);
            if !task_order.is_empty() {
                info!(buckets = task_order.len(), "seeded task order");
                self.set_task_order(&task_order);
            }
        }

        OrderSnapshot {
            categories,
            subcategories,
            tasks: task_order,
            expanded_categories: self.expanded_categories(),
            expanded_subcategories: self.expanded_subcategories(),
        }
    }

    /// Drops ids that are not in `existing` from every bucket.
    #[tracing::instrument(skip(self, existing), fields(existing = existing.len()))]
    pub fn prune_missing(&mut self, existing: &HashSet<TaskId>) -> bool {
        let mut order = self.task_order();
        let mut removed = 0usize;
        for ids in order.values_mut() {
            let before = ids.len();
            ids.retain(|id| existing.contains(id));
            removed += before - ids.len();
        }

        if removed > 0 {
            info!(removed, "pruned stale task ids");
            self.set_task_order(&order);
        }
        removed > 0
    }

    pub fn append_if_missing(&mut self, bucket_key: &str, id: &TaskId) -> bool {
        let mut order = self.task_order();
        let bucket = order.entry(bucket_key.to_string()).or_default();
        if bucket.contains(id) {
            return false;
        }
        bucket.push(id.clone());
        debug!(bucket = bucket_key, %id, "appended task to order");
        self.set_task_order(&order);
        true
    }

    pub fn append_category_if_missing(&mut self, category: &str) -> bool {
        let mut order = self.category_order();
        if order.iter().any(|name| name == category) {
            return false;
        }
        order.push(category.to_string());
        self.set_category_order(&order);
        true
    }

    pub fn append_subcategory_if_missing(&mut self, category: &str, sub_category: &str) -> bool {
        let mut order = self.subcategory_order();
        let subs = order.entry(category.to_string()).or_default();
        if subs.iter().any(|name| name == sub_category) {
            return false;
        }
        subs.push(sub_category.to_string());
        self.set_subcategory_order(&order);
        true
    }

    /// Keeps every live id in exactly one bucket, its own. Stale ids and ids
    /// left behind in a previous group are removed; unseen ids, categories
    /// and subcategories are appended at the end.
    #[tracing::instrument(skip(self, tasks), fields(tasks = tasks.len()))]
    pub fn reconcile(&mut self, tasks: &[Task]) -> bool {
        let home: HashMap<&TaskId, String> = tasks
            .iter()
            .map(|task| (&task.id, task.group_key().storage_key()))
            .collect();

        let mut order = self.task_order();
        let mut placed: HashSet<TaskId> = HashSet::new();
        let mut tasks_changed = false;
        for (key, ids) in order.iter_mut() {
            let before = ids.len();
            ids.retain(|id| {
                home.get(id).is_some_and(|own| own == key) && placed.insert(id.clone())
            });
            tasks_changed |= ids.len() != before;
        }
        for task in tasks {
            if placed.insert(task.id.clone()) {
                order
                    .entry(task.group_key().storage_key())
                    .or_default()
                    .push(task.id.clone());
                tasks_changed = true;
            }
        }
        if tasks_changed {
            self.set_task_order(&order);
        }

        let mut categories = self.category_order();
        let mut subcategories = self.subcategory_order();
        let mut groups_changed = false;
        for task in tasks {
            if !categories.contains(&task.category) {
                categories.push(task.category.clone());
                groups_changed = true;
            }
            let subs = subcategories.entry(task.category.clone()).or_default();
            if !subs.contains(&task.sub_category) {
                subs.push(task.sub_category.clone());
                groups_changed = true;
            }
        }
        if groups_changed {
            self.set_category_order(&categories);
            self.set_subcategory_order(&subcategories);
        }

        if tasks_changed || groups_changed {
            info!(tasks_changed, groups_changed, "reconciled ordering with task list");
        }
        tasks_changed || groups_changed
    }

    /// First-render path: seed what is missing, then reconcile. Without
    /// storage the seeded order is returned as is, since nothing was kept.
    pub fn refresh(&mut self, tasks: &[Task]) -> OrderSnapshot {
        let seeded = self.initialize_if_absent(tasks);
        if !self.backend.is_available() {
            return seeded;
        }
        self.reconcile(tasks);
        self.snapshot()
    }

    pub fn is_category_expanded(&self, category: &str) -> bool {
        self.expanded_categories().contains(category)
    }

    pub fn is_subcategory_expanded(&self, key: &GroupKey) -> bool {
        self.expanded_subcategories().contains(&key.storage_key())
    }

    pub fn set_category_expanded(&mut self, category: &str, expanded: bool) {
        let mut set = self.expanded_categories();
        let changed = if expanded {
            set.insert(category.to_string())
        } else {
            set.remove(category)
        };
        if changed {
            self.save(EXPANDED_CATEGORIES_KEY, &set);
        }
    }

    pub fn set_subcategory_expanded(&mut self, key: &GroupKey, expanded: bool) {
        let mut set = self.expanded_subcategories();
        let storage_key = key.storage_key();
        let changed = if expanded {
            set.insert(storage_key)
        } else {
            set.remove(&storage_key)
        };
        if changed {
            self.save(EXPANDED_SUBCATEGORIES_KEY, &set);
        }
    }

    /// Returns the new state.
    pub fn toggle_category(&mut self, category: &str) -> bool {
        let expanded = !self.is_category_expanded(category);
        self.set_category_expanded(category, expanded);
        expanded
    }

    pub fn toggle_subcategory(&mut self, key: &GroupKey) -> bool {
        let expanded = !self.is_subcategory_expanded(key);
        self.set_subcategory_expanded(key, expanded);
        expanded
    }
}

fn derive_category_order(tasks: &[&Task]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for task in tasks {
        if !out.contains(&task.category) {
            out.push(task.category.clone());
        }
    }
    out
}

fn derive_subcategory_order(tasks: &[&Task]) -> SubcategoryOrder {
    let mut out = SubcategoryOrder::new();
    for task in tasks {
        let subs = out.entry(task.category.clone()).or_default();
        if !subs.contains(&task.sub_category) {
            subs.push(task.sub_category.clone());
        }
    }
    out
}

fn derive_task_order(tasks: &[&Task]) -> TaskOrder {
    let mut out = TaskOrder::new();
    for task in tasks {
        out.entry(task.group_key().storage_key())
            .or_default()
            .push(task.id.clone());
    }
    out
}
