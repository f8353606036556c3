use anyhow::{Context, anyhow, bail};
use gantt_shared::EventRecord;
use tracing::{debug, info, instrument, warn};

use crate::cli::{Command, LevelTarget};
use crate::config::Config;
use crate::datastore::DataStore;
use crate::datetime::{parse_date_expr, today};
use crate::grouping::resolve;
use crate::layout::derived_range;
use crate::ordering::{OrderSnapshot, OrderingStore};
use crate::render::Renderer;
use crate::reorder::{Direction, DragCoordinator, DropOutcome, move_category, move_subcategory};
use crate::store::LocalStore;
use crate::sync::{BulkSync, HttpSyncSink, SyncOutcome};
use crate::task::{GroupKey, Status, Task, TaskId};

#[instrument(skip(store, cfg, renderer, command))]
pub fn dispatch(
    store: &DataStore,
    cfg: &Config,
    renderer: &Renderer,
    command: Command,
) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");

    match command {
        Command::Tree => cmd_tree(store, renderer),
        Command::Timeline { from } => cmd_timeline(store, cfg, renderer, from.as_deref()),
        Command::Add {
            category,
            sub_category,
            name,
            start,
            end,
            assignee,
            status,
        } => cmd_add(
            store,
            NewTask {
                category,
                sub_category,
                name,
                start,
                end,
                assignee,
                status,
            },
        ),
        Command::Event {
            task,
            name,
            due,
            status,
        } => cmd_event(store, &task, &name, due.as_deref(), status.as_deref()),
        Command::Move { task, target } => cmd_move(store, &task, &target),
        Command::Up { target } => cmd_shift(store, target, Direction::Up),
        Command::Down { target } => cmd_shift(store, target, Direction::Down),
        Command::Expand {
            category,
            sub_category,
        } => cmd_set_expanded(store, &category, sub_category.as_deref(), true),
        Command::Collapse {
            category,
            sub_category,
        } => cmd_set_expanded(store, &category, sub_category.as_deref(), false),
        Command::Sync { endpoint } => cmd_sync(store, cfg, endpoint),
        Command::Show => cmd_show(cfg),
    }
}

/// Loads tasks and brings the stored ordering in line with them.
fn load_view(
    store: &DataStore,
) -> anyhow::Result<(Vec<Task>, OrderingStore<LocalStore>, OrderSnapshot)> {
    let tasks = store.load_tasks()?;
    let mut ordering = store.ordering_store();
    let snapshot = ordering.refresh(&tasks);
    Ok((tasks, ordering, snapshot))
}

#[instrument(skip(store, renderer))]
fn cmd_tree(store: &DataStore, renderer: &Renderer) -> anyhow::Result<()> {
    info!("command tree");
    let (tasks, _, snapshot) = load_view(store)?;
    let groups = resolve(&tasks, &snapshot);
    renderer.print_tree(&groups, &snapshot)
}

#[instrument(skip(store, cfg, renderer))]
fn cmd_timeline(
    store: &DataStore,
    cfg: &Config,
    renderer: &Renderer,
    from: Option<&str>,
) -> anyhow::Result<()> {
    info!("command timeline");
    let today = today();
    let (tasks, _, snapshot) = load_view(store)?;

    let start = match from.map(str::to_string).or_else(|| cfg.get("timeline.start")) {
        Some(raw) => parse_date_expr(&raw, today)?,
        None => derived_range(&tasks).map_or(today, |(start, _)| start),
    };
    let window = cfg.timeline_window(start)?;
    debug!(start = %window.start, end = %window.end(), "timeline window");

    let groups = resolve(&tasks, &snapshot);
    let layout = window.layout_rows(&groups, &snapshot, Some(today));
    renderer.print_timeline(&window, &layout)
}

#[derive(Debug)]
struct NewTask {
    category: String,
    sub_category: String,
    name: String,
    start: Option<String>,
    end: Option<String>,
    assignee: Option<String>,
    status: Option<String>,
}

#[instrument(skip(store, new))]
fn cmd_add(store: &DataStore, new: NewTask) -> anyhow::Result<()> {
    info!("command add");
    let today = today();
    let (tasks, mut ordering, _) = load_view(store)?;

    let mut task = Task::new(
        TaskId::generate(),
        new.name,
        new.category,
        new.sub_category,
        store.next_display_order(&tasks),
    );
    task.start_date = new
        .start
        .as_deref()
        .map(|raw| parse_date_expr(raw, today))
        .transpose()
        .context("invalid --start")?;
    task.end_date = new
        .end
        .as_deref()
        .map(|raw| parse_date_expr(raw, today))
        .transpose()
        .context("invalid --end")?;
    task.assignee = new.assignee;
    if let Some(status) = new.status.as_deref() {
        task.status = Status::parse(status);
        if !task.status.is_known() {
            warn!(status, "unrecognized status; stored as given");
        }
    }

    // Same checks the loader applies, so a bad add never reaches disk.
    let task = Task::try_from(gantt_shared::TaskRecord::from(&task))?;
    store.add_task(&task)?;

    ordering.append_category_if_missing(&task.category);
    ordering.append_subcategory_if_missing(&task.category, &task.sub_category);
    ordering.append_if_missing(&task.group_key().storage_key(), &task.id);

    println!("Created task {}.", task.id);
    Ok(())
}

#[instrument(skip(store))]
fn cmd_event(
    store: &DataStore,
    task_id: &str,
    name: &str,
    due: Option<&str>,
    status: Option<&str>,
) -> anyhow::Result<()> {
    info!("command event");
    let today = today();
    let due_date = due.map(|raw| parse_date_expr(raw, today)).transpose()?;

    let mut records = store.load_records()?;
    let record = records
        .iter_mut()
        .find(|record| record.id == task_id)
        .ok_or_else(|| anyhow!("no task with id {task_id}"))?;

    let event_id = TaskId::generate().to_string();
    record.events.push(EventRecord {
        id: event_id.clone(),
        name: name.to_string(),
        task_id: task_id.to_string(),
        due_date: due_date.map(crate::task::format_date),
        assignee: None,
        status: status.map_or_else(|| Status::ToDo.to_string(), str::to_string),
        note: None,
    });
    Task::try_from(record.clone())?;

    store.save_records(&records)?;
    println!("Added event {event_id} to task {task_id}.");
    Ok(())
}

#[instrument(skip(store))]
fn cmd_move(store: &DataStore, task_id: &str, target_id: &str) -> anyhow::Result<()> {
    info!("command move");
    let (tasks, mut ordering, snapshot) = load_view(store)?;
    let find = |id: &str| {
        tasks
            .iter()
            .find(|task| task.id.as_str() == id)
            .ok_or_else(|| anyhow!("no task with id {id}"))
    };
    let dragged = find(task_id)?;
    let target = find(target_id)?;

    let mut groups = resolve(&tasks, &snapshot);
    let mut drag = DragCoordinator::new();
    drag.begin(dragged);

    match drag.drop_on(target, &mut ordering, &mut groups) {
        DropOutcome::Moved { from, to } => {
            println!(
                "Moved {} from position {} to {} in {}.",
                dragged.name,
                from + 1,
                to + 1,
                dragged.group_key()
            );
            Ok(())
        }
        DropOutcome::Unchanged => {
            println!("Task {task_id} is already in place.");
            Ok(())
        }
        DropOutcome::Rejected => bail!(
            "{} and {} are in different subcategories ({} vs {})",
            dragged.id,
            target.id,
            dragged.group_key(),
            target.group_key()
        ),
        DropOutcome::Ignored => bail!("tasks {task_id} and {target_id} are not in the stored order"),
    }
}

#[instrument(skip(store))]
fn cmd_shift(store: &DataStore, target: LevelTarget, direction: Direction) -> anyhow::Result<()> {
    info!("command shift");
    let (_, mut ordering, snapshot) = load_view(store)?;

    let (label, moved) = match &target {
        LevelTarget::Category { name } => {
            if !snapshot.categories.contains(name) {
                bail!("unknown category {name}");
            }
            (name.clone(), move_category(&mut ordering, name, direction))
        }
        LevelTarget::Sub { category, name } => {
            let known = snapshot
                .subcategories
                .get(category)
                .is_some_and(|subs| subs.contains(name));
            if !known {
                bail!("unknown subcategory {category}{}{name}", GroupKey::SEPARATOR);
            }
            (
                GroupKey::new(category.as_str(), name.as_str()).to_string(),
                move_subcategory(&mut ordering, category, name, direction),
            )
        }
    };

    if moved {
        println!("Moved {label} {}.", direction_word(direction));
    } else {
        println!("{label} is already at the {}.", edge_word(direction));
    }
    Ok(())
}

fn direction_word(direction: Direction) -> &'static str {
    match direction {
        Direction::Up => "up",
        Direction::Down => "down",
    }
}

fn edge_word(direction: Direction) -> &'static str {
    match direction {
        Direction::Up => "top",
        Direction::Down => "bottom",
    }
}

#[instrument(skip(store))]
fn cmd_set_expanded(
    store: &DataStore,
    category: &str,
    sub_category: Option<&str>,
    expanded: bool,
) -> anyhow::Result<()> {
    info!("command expand/collapse");
    let mut ordering = store.ordering_store();
    match sub_category {
        Some(sub) => ordering.set_subcategory_expanded(&GroupKey::new(category, sub), expanded),
        None => ordering.set_category_expanded(category, expanded),
    }
    Ok(())
}

#[instrument(skip(store, cfg))]
fn cmd_sync(store: &DataStore, cfg: &Config, endpoint: Option<String>) -> anyhow::Result<()> {
    info!("command sync");
    let endpoint = endpoint
        .or_else(|| cfg.get("sync.endpoint"))
        .ok_or_else(|| anyhow!("no sync endpoint; pass --endpoint or set sync.endpoint"))?;
    let (_, _, snapshot) = load_view(store)?;

    let sync = BulkSync::new(HttpSyncSink::new(endpoint)?);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    match runtime.block_on(sync.save(&snapshot)) {
        SyncOutcome::Saved {
            categories,
            buckets,
        } => {
            println!(
                "Saved ordering to {} ({categories} categories, {buckets} task buckets).",
                sync.sink().endpoint()
            );
            Ok(())
        }
        SyncOutcome::Busy => bail!("a bulk save is already in progress"),
        SyncOutcome::Failed { message } => bail!("bulk save failed: {message}"),
    }
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<(&String, &String)> = cfg.iter().collect();
    entries.sort();
    for (key, value) in entries {
        println!("{key}={value}");
    }
    for file in &cfg.loaded_files {
        println!("# loaded {}", file.display());
    }
    Ok(())
}

