use std::fmt;

use anyhow::{Context, anyhow, bail};
use chrono::{DateTime, NaiveDate};
use gantt_shared::{EventRecord, TaskRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const NOTE_MAX_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    ToDo,
    InProgress,
    Confirmed,
    IceBox,
    Done,
    /// Anything the CRUD side sends that is not one of the known states.
    Unknown(String),
}

impl Status {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "ToDo" => Self::ToDo,
            "InProgress" => Self::InProgress,
            "Confirmed" => Self::Confirmed,
            "IceBox" => Self::IceBox,
            "Done" => Self::Done,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ToDo => "ToDo",
            Self::InProgress => "InProgress",
            Self::Confirmed => "Confirmed",
            Self::IceBox => "IceBox",
            Self::Done => "Done",
            Self::Unknown(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `category::subcategory` bucket a task belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub category: String,
    pub sub_category: String,
}

impl GroupKey {
    pub const SEPARATOR: &'static str = "::";

    pub fn new(category: impl Into<String>, sub_category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            sub_category: sub_category.into(),
        }
    }

    pub fn storage_key(&self) -> String {
        format!("{}{}{}", self.category, Self::SEPARATOR, self.sub_category)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (category, sub_category) = raw.split_once(Self::SEPARATOR)?;
        Some(Self::new(category, sub_category))
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.category, Self::SEPARATOR, self.sub_category)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub task_id: TaskId,
    pub due_date: Option<NaiveDate>,
    pub assignee: Option<String>,
    pub status: Status,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub category: String,
    pub sub_category: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub assignee: Option<String>,
    pub status: Status,
    pub display_order: i64,
    pub note: Option<String>,
    pub events: Vec<Event>,
}

impl Task {
    pub fn new(
        id: TaskId,
        name: impl Into<String>,
        category: impl Into<String>,
        sub_category: impl Into<String>,
        display_order: i64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            category: category.into(),
            sub_category: sub_category.into(),
            start_date: None,
            end_date: None,
            assignee: None,
            status: Status::ToDo,
            display_order,
            note: None,
            events: vec![],
        }
    }

    pub fn group_key(&self) -> GroupKey {
        GroupKey::new(self.category.clone(), self.sub_category.clone())
    }

    pub fn in_group(&self, key: &GroupKey) -> bool {
        self.category == key.category && self.sub_category == key.sub_category
    }

    /// Start/end used for the bar. A missing endpoint falls back to the
    /// earliest/latest event due date.
    pub fn effective_range(&self) -> (Option<NaiveDate>, Option<NaiveDate>) {
        let earliest_event = self.events.iter().filter_map(|e| e.due_date).min();
        let latest_event = self.events.iter().filter_map(|e| e.due_date).max();
        (
            self.start_date.or(earliest_event),
            self.end_date.or(latest_event),
        )
    }
}

impl TryFrom<TaskRecord> for Task {
    type Error = anyhow::Error;

    fn try_from(record: TaskRecord) -> Result<Self, Self::Error> {
        let id = required("id", &record.id)?;
        let context = || format!("invalid task record {id}");

        let name = required("name", &record.name).with_context(context)?;
        let category = required("category", &record.category).with_context(context)?;
        let sub_category =
            required("sub_category", &record.sub_category).with_context(context)?;
        group_name("category", &category).with_context(context)?;
        group_name("sub_category", &sub_category).with_context(context)?;
        let start_date = parse_optional_date(record.start_date.as_deref())
            .with_context(|| format!("invalid start_date on task {id}"))?;
        let end_date = parse_optional_date(record.end_date.as_deref())
            .with_context(|| format!("invalid end_date on task {id}"))?;
        let note = bounded_note(record.note).with_context(context)?;

        let task_id = TaskId::new(id.clone());
        let events = record
            .events
            .into_iter()
            .map(|event| parse_event(event, &task_id))
            .collect::<anyhow::Result<Vec<_>>>()
            .with_context(context)?;

        Ok(Self {
            id: task_id,
            name,
            category,
            sub_category,
            start_date,
            end_date,
            assignee: non_empty(record.assignee),
            status: Status::parse(&record.status),
            display_order: record.display_order,
            note,
            events,
        })
    }
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.to_string(),
            name: task.name.clone(),
            category: task.category.clone(),
            sub_category: task.sub_category.clone(),
            start_date: task.start_date.map(format_date),
            end_date: task.end_date.map(format_date),
            assignee: task.assignee.clone(),
            status: task.status.to_string(),
            display_order: task.display_order,
            note: task.note.clone(),
            events: task
                .events
                .iter()
                .map(|event| EventRecord {
                    id: event.id.clone(),
                    name: event.name.clone(),
                    task_id: event.task_id.to_string(),
                    due_date: event.due_date.map(format_date),
                    assignee: event.assignee.clone(),
                    status: event.status.to_string(),
                    note: event.note.clone(),
                })
                .collect(),
        }
    }
}

fn parse_event(record: EventRecord, parent: &TaskId) -> anyhow::Result<Event> {
    let id = required("event id", &record.id)?;
    if record.task_id.trim() != parent.as_str() {
        bail!(
            "event {id} references task {} but is nested under {parent}",
            record.task_id
        );
    }
    let due_date = parse_optional_date(record.due_date.as_deref())
        .with_context(|| format!("invalid due_date on event {id}"))?;
    let note = bounded_note(record.note).with_context(|| format!("invalid event {id}"))?;

    Ok(Event {
        name: record.name.trim().to_string(),
        task_id: parent.clone(),
        due_date,
        assignee: non_empty(record.assignee),
        status: Status::parse(&record.status),
        note,
        id,
    })
}

fn required(field: &str, raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("{field} must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// Group names end up joined into bucket keys, so they cannot carry the
/// separator themselves.
fn group_name(field: &str, name: &str) -> anyhow::Result<()> {
    if name.contains(GroupKey::SEPARATOR) {
        bail!("{field} {name:?} must not contain {:?}", GroupKey::SEPARATOR);
    }
    Ok(())
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn bounded_note(note: Option<String>) -> anyhow::Result<Option<String>> {
    let Some(note) = note else {
        return Ok(None);
    };
    let chars = note.chars().count();
    if chars > NOTE_MAX_CHARS {
        bail!("note is {chars} characters, limit is {NOTE_MAX_CHARS}");
    }
    Ok(Some(note))
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (date part only).
pub fn parse_optional_date(raw: Option<&str>) -> anyhow::Result<Option<NaiveDate>> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Some(date));
    }

    DateTime::parse_from_rfc3339(raw)
        .map(|dt| Some(dt.date_naive()))
        .map_err(|err| anyhow!("unrecognized date {raw:?}: {err}"))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> TaskRecord {
        TaskRecord {
            id: id.to_string(),
            name: "Write API".to_string(),
            category: "Dev".to_string(),
            sub_category: "BE".to_string(),
            start_date: Some("2024-01-03".to_string()),
            end_date: Some("2024-01-05T09:30:00Z".to_string()),
            assignee: Some("  ".to_string()),
            status: "InProgress".to_string(),
            display_order: 3,
            note: None,
            events: vec![],
        }
    }

    #[test]
    fn validates_and_converts_record() {
        let task = Task::try_from(record("a")).expect("valid record");
        assert_eq!(task.id, TaskId::from("a"));
        assert_eq!(task.start_date, NaiveDate::from_ymd_opt(2024, 1, 3));
        assert_eq!(task.end_date, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(task.assignee, None);
        assert_eq!(task.status, Status::InProgress);
        assert_eq!(task.group_key().storage_key(), "Dev::BE");
    }

    #[test]
    fn unknown_status_is_kept_not_rejected() {
        let mut raw = record("a");
        raw.status = "Blocked".to_string();
        let task = Task::try_from(raw).expect("valid record");
        assert_eq!(task.status, Status::Unknown("Blocked".to_string()));
        assert!(!task.status.is_known());
    }

    #[test]
    fn rejects_overlong_note_and_bad_dates() {
        let mut raw = record("a");
        raw.note = Some("x".repeat(NOTE_MAX_CHARS + 1));
        assert!(Task::try_from(raw).is_err());

        let mut raw = record("a");
        raw.start_date = Some("next tuesday".to_string());
        assert!(Task::try_from(raw).is_err());

        let mut raw = record("a");
        raw.category = " ".to_string();
        assert!(Task::try_from(raw).is_err());
    }

    #[test]
    fn rejects_group_names_that_collide_in_bucket_keys() {
        let mut nested_category = record("a");
        nested_category.category = "Dev::BE".to_string();
        nested_category.sub_category = "API".to_string();
        let err = Task::try_from(nested_category).expect_err("separator in category");
        assert!(format!("{err:#}").contains("category"));

        let mut nested_sub = record("b");
        nested_sub.sub_category = "BE::API".to_string();
        assert!(Task::try_from(nested_sub).is_err());

        let mut single_colon = record("c");
        single_colon.sub_category = "BE:API".to_string();
        assert!(Task::try_from(single_colon).is_ok());
    }

    #[test]
    fn rejects_event_with_foreign_parent() {
        let mut raw = record("a");
        raw.events.push(EventRecord {
            id: "e1".to_string(),
            name: "Review".to_string(),
            task_id: "b".to_string(),
            due_date: None,
            assignee: None,
            status: "ToDo".to_string(),
            note: None,
        });
        let err = Task::try_from(raw).expect_err("foreign parent");
        assert!(format!("{err:#}").contains("references task b"));
    }

    #[test]
    fn effective_range_falls_back_to_events() {
        let mut task = Task::new(TaskId::from("a"), "x", "Dev", "BE", 0);
        for (id, day) in [("e1", 9), ("e2", 4)] {
            task.events.push(Event {
                id: id.to_string(),
                name: id.to_string(),
                task_id: task.id.clone(),
                due_date: NaiveDate::from_ymd_opt(2024, 1, day),
                assignee: None,
                status: Status::ToDo,
                note: None,
            });
        }
        task.end_date = NaiveDate::from_ymd_opt(2024, 1, 20);

        let (start, end) = task.effective_range();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 4));
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 1, 20));
    }

    #[test]
    fn record_roundtrip_keeps_unknown_status_text() {
        let mut raw = record("a");
        raw.status = "Parked".to_string();
        raw.assignee = Some("kim".to_string());
        let task = Task::try_from(raw).expect("valid record");
        let back = TaskRecord::from(&task);
        assert_eq!(back.status, "Parked");
        assert_eq!(back.end_date.as_deref(), Some("2024-01-05"));
    }
}
