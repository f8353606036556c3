use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow, bail};
use gantt_shared::TaskRecord;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::ordering::OrderingStore;
use crate::store::LocalStore;
use crate::task::Task;

/// Local copy of the CRUD collaborator's task export plus the ordering
/// preferences that sit next to it.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub ordering_dir: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        let ordering_dir = data_dir.join("ordering");

        if !tasks_path.exists() {
            fs::write(&tasks_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            ordering = %ordering_dir.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            ordering_dir,
        })
    }

    /// Falls back to detached storage when `ordering/` cannot be used, so
    /// views still render in `display_order`.
    pub fn ordering_store(&self) -> OrderingStore<LocalStore> {
        OrderingStore::new(LocalStore::open_or_detached(&self.ordering_dir))
    }

    #[tracing::instrument(skip(self))]
    pub fn load_records(&self) -> anyhow::Result<Vec<TaskRecord>> {
        load_jsonl(&self.tasks_path).context("failed to load tasks.data")
    }

    /// Validated tasks. Records that fail validation are logged and left
    /// out so the engine only ever sees well-formed tasks.
    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        let records = self.load_records()?;
        let total = records.len();
        let tasks: Vec<Task> = records
            .into_iter()
            .filter_map(|record| {
                let id = record.id.clone();
                match Task::try_from(record) {
                    Ok(task) => Some(task),
                    Err(err) => {
                        warn!(id = %id, error = %format!("{err:#}"), "skipping invalid task record");
                        None
                    }
                }
            })
            .collect();
        debug!(total, valid = tasks.len(), "validated task records");
        Ok(tasks)
    }

    #[tracing::instrument(skip(self, records))]
    pub fn save_records(&self, records: &[TaskRecord]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, records).context("failed to save tasks.data")
    }

    pub fn next_display_order(&self, tasks: &[Task]) -> i64 {
        tasks
            .iter()
            .map(|task| task.display_order)
            .max()
            .map_or(0, |max| max + 1)
    }

    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    pub fn add_task(&self, task: &Task) -> anyhow::Result<()> {
        let mut records = self.load_records()?;
        if records.iter().any(|record| record.id == task.id.as_str()) {
            bail!("task {} already exists", task.id);
        }
        records.push(TaskRecord::from(task));
        self.save_records(&records)
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> anyhow::Result<Vec<TaskRecord>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: TaskRecord = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded task records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic(path: &Path, records: &[TaskRecord]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
