use std::fs;

use chrono::NaiveDate;
use gantt_core::datastore::DataStore;
use gantt_core::grouping::resolve;
use gantt_core::layout::{Granularity, RowKind, TimelineWindow};
use gantt_core::reorder::{DragCoordinator, DropOutcome};
use gantt_core::store::KeyValueStore;
use gantt_core::sync::{BulkSync, MemorySyncSink};
use gantt_core::task::{Task, TaskId};
use tempfile::tempdir;

fn task(id: &str, category: &str, sub: &str, display_order: i64) -> Task {
    Task::new(TaskId::from(id), format!("task {id}"), category, sub, display_order)
}

fn seed(store: &DataStore) -> Vec<Task> {
    for task in [
        task("ops-1", "Ops", "CI", 2),
        task("dev-1", "Dev", "BE", 0),
        task("dev-2", "Dev", "BE", 1),
        task("dev-3", "Dev", "FE", 3),
    ] {
        store.add_task(&task).expect("add task");
    }
    store.load_tasks().expect("load tasks")
}

fn names(ids: &[TaskId]) -> Vec<&str> {
    ids.iter().map(TaskId::as_str).collect()
}

#[test]
fn first_load_seeds_from_display_order_once() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let tasks = seed(&store);

    let mut ordering = store.ordering_store();
    let snapshot = ordering.refresh(&tasks);
    assert_eq!(snapshot.categories, vec!["Dev", "Ops"]);
    assert_eq!(snapshot.subcategories["Dev"], vec!["BE", "FE"]);
    assert_eq!(names(&snapshot.tasks["Dev::BE"]), vec!["dev-1", "dev-2"]);

    let category_file = store.ordering_dir.join("gantt.category_order.json");
    let task_file = store.ordering_dir.join("gantt.task_order.json");
    let before = (
        fs::read(&category_file).expect("category file"),
        fs::read(&task_file).expect("task file"),
    );

    let mut reopened = store.ordering_store();
    assert_eq!(reopened.refresh(&tasks), snapshot);
    let after = (
        fs::read(&category_file).expect("category file"),
        fs::read(&task_file).expect("task file"),
    );
    assert_eq!(before, after);
}

#[test]
fn dropped_task_order_survives_reopen() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let tasks = seed(&store);

    let mut ordering = store.ordering_store();
    let snapshot = ordering.refresh(&tasks);
    let mut view = resolve(&tasks, &snapshot);

    let by_id = |id: &str| tasks.iter().find(|t| t.id.as_str() == id).expect("task");
    let mut drag = DragCoordinator::new();
    drag.begin(by_id("dev-2"));
    assert_eq!(
        drag.drop_on(by_id("dev-1"), &mut ordering, &mut view),
        DropOutcome::Moved { from: 1, to: 0 }
    );
    assert_eq!(names(&view[0].subcategories[0].task_ids()), vec!["dev-2", "dev-1"]);

    drag.begin(by_id("dev-2"));
    assert_eq!(
        drag.drop_on(by_id("ops-1"), &mut ordering, &mut view),
        DropOutcome::Rejected
    );

    let mut reopened = store.ordering_store();
    let snapshot = reopened.refresh(&tasks);
    assert_eq!(names(&snapshot.tasks["Dev::BE"]), vec!["dev-2", "dev-1"]);

    let regrouped = resolve(&tasks, &snapshot);
    let first: Vec<&str> = regrouped[0].tasks().map(|t| t.id.as_str()).collect();
    assert_eq!(first, vec!["dev-2", "dev-1", "dev-3"]);
}

#[test]
fn deleted_tasks_leave_the_stored_order() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let tasks = seed(&store);
    store.ordering_store().refresh(&tasks);

    let mut records = store.load_records().expect("records");
    records.retain(|record| record.id != "dev-1");
    store.save_records(&records).expect("save records");
    let tasks = store.load_tasks().expect("reload");

    let snapshot = store.ordering_store().refresh(&tasks);
    assert_eq!(names(&snapshot.tasks["Dev::BE"]), vec!["dev-2"]);
    let stored: usize = snapshot.tasks.values().map(Vec::len).sum();
    assert_eq!(stored, tasks.len());
}

#[test]
fn corrupt_preferences_fall_back_to_display_order() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let tasks = seed(&store);

    let mut ordering = store.ordering_store();
    ordering.refresh(&tasks);
    ordering.set_category_order(&["Ops".to_string(), "Dev".to_string()]);

    let mut backend = ordering.into_backend();
    backend
        .set("gantt.category_order", "{not json")
        .expect("write garbage");

    let snapshot = store.ordering_store().refresh(&tasks);
    assert_eq!(snapshot.categories, vec!["Dev", "Ops"]);
}

#[test]
fn unavailable_ordering_storage_still_groups_tasks() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let tasks = seed(&store);
    fs::write(&store.ordering_dir, "blocked").expect("block ordering dir");

    let mut ordering = store.ordering_store();
    assert!(!ordering.backend().is_available());

    let snapshot = ordering.refresh(&tasks);
    assert_eq!(snapshot.categories, vec!["Dev", "Ops"]);
    assert_eq!(names(&snapshot.tasks["Dev::BE"]), vec!["dev-1", "dev-2"]);
    assert_eq!(resolve(&tasks, &snapshot).len(), 2);

    ordering.set_category_expanded("Dev", true);
    assert!(!ordering.is_category_expanded("Dev"));
    assert!(store.ordering_dir.is_file());
}

#[test]
fn invalid_records_are_skipped_on_load() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    seed(&store);

    let mut records = store.load_records().expect("records");
    records[0].category = "  ".to_string();
    records[1].start_date = Some("someday".to_string());
    store.save_records(&records).expect("save");

    let tasks = store.load_tasks().expect("load");
    assert_eq!(tasks.len(), 2);
    assert_eq!(store.next_display_order(&tasks), 4);
    assert!(store.add_task(&tasks[0]).is_err());
}

#[test]
fn timeline_rows_track_expansion_preferences() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let mut tasks = seed(&store);
    for task in &mut tasks {
        task.start_date = NaiveDate::from_ymd_opt(2024, 1, 2);
    }

    let mut ordering = store.ordering_store();
    ordering.refresh(&tasks);
    ordering.set_category_expanded("Dev", true);

    let snapshot = store.ordering_store().refresh(&tasks);
    let window = TimelineWindow::new(
        NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"),
        30,
        Granularity::Day,
        30.0,
    );
    let layout = window.layout_rows(&resolve(&tasks, &snapshot), &snapshot, None);
    let kinds: Vec<&str> = layout
        .rows
        .iter()
        .map(|row| match &row.kind {
            RowKind::Category { name, .. } => name.as_str(),
            RowKind::Subcategory { key, .. } => key.sub_category.as_str(),
            RowKind::Task { name, .. } => name.as_str(),
        })
        .collect();
    assert_eq!(kinds, vec!["Dev", "BE", "FE", "Ops"]);
}

#[tokio::test]
async fn bulk_save_reflects_local_reordering() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let tasks = seed(&store);

    let mut ordering = store.ordering_store();
    ordering.refresh(&tasks);
    ordering.set_task_bucket("Dev::BE", vec![TaskId::from("dev-2"), TaskId::from("dev-1")]);

    let sync = BulkSync::new(MemorySyncSink::new());
    assert!(sync.save(&ordering.snapshot()).await.is_saved());

    let orders = sync.sink().display_orders();
    assert_eq!(orders["dev-2"], 0);
    assert_eq!(orders["dev-1"], 1);
    assert_eq!(orders["dev-3"], 2);
    assert_eq!(orders["ops-1"], 3);
}
