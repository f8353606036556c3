//! Fixed-width timeline geometry.
//!
//! The grid has one label column followed by `unit_count` cells of
//! `cell_width` pixels each. Column `i` of the window therefore starts at
//! `(i + 1) * cell_width`. Cell width is configuration, never derived from
//! the container, so the grid scrolls horizontally instead of reflowing.

use std::collections::HashMap;

use chrono::{Datelike, Days, Duration, NaiveDate};
use tracing::trace;

use crate::grouping::CategoryGroup;
use crate::ordering::OrderSnapshot;
use crate::task::{Event, GroupKey, Status, Task, TaskId};

pub const DEFAULT_UNIT_COUNT: usize = 120;
pub const DEFAULT_CELL_WIDTH: f32 = 30.0;
pub const DEFAULT_MARKER_SPACING: f32 = 24.0;
/// Upper bound on grid columns; boundaries are materialized per lookup.
pub const MAX_UNIT_COUNT: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Day,
    Week,
}

impl Granularity {
    pub fn days(self) -> i64 {
        match self {
            Self::Day => 1,
            Self::Week => 7,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "day" | "days" | "d" => Some(Self::Day),
            "week" | "weeks" | "w" => Some(Self::Week),
            _ => None,
        }
    }
}

/// Pixel rectangle of a bar, horizontal axis only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarRect {
    pub left: f32,
    pub width: f32,
    /// The range starts before the window.
    pub clipped_start: bool,
    /// The range ends at or after the window end.
    pub clipped_end: bool,
}

impl BarRect {
    pub fn right(&self) -> f32 {
        self.left + self.width
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventMarker {
    pub event_id: String,
    pub name: String,
    pub date: NaiveDate,
    pub status: Status,
    /// Center of the marker.
    pub x: f32,
    /// Offset from the row's center line.
    pub y_offset: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineWindow {
    pub start: NaiveDate,
    pub unit_count: usize,
    pub granularity: Granularity,
    pub cell_width: f32,
    pub padding: f32,
    pub marker_spacing: f32,
}

impl TimelineWindow {
    pub fn new(
        start: NaiveDate,
        unit_count: usize,
        granularity: Granularity,
        cell_width: f32,
    ) -> Self {
        Self {
            start,
            unit_count: unit_count.clamp(1, MAX_UNIT_COUNT),
            granularity,
            cell_width: cell_width.max(1.0),
            padding: 0.0,
            marker_spacing: DEFAULT_MARKER_SPACING,
        }
    }

    /// Week windows start on the Monday on or before `anchor`.
    pub fn week_aligned(anchor: NaiveDate, unit_count: usize, cell_width: f32) -> Self {
        let offset = u64::from(anchor.weekday().num_days_from_monday());
        Self::new(
            anchor.checked_sub_days(Days::new(offset)).unwrap_or(anchor),
            unit_count,
            Granularity::Week,
            cell_width,
        )
    }

    pub fn with_padding(mut self, padding: f32) -> Self {
        self.padding = padding.max(0.0);
        self
    }

    pub fn with_marker_spacing(mut self, spacing: f32) -> Self {
        self.marker_spacing = spacing.max(0.0);
        self
    }

    pub fn unit(&self) -> Duration {
        Duration::days(self.granularity.days())
    }

    /// First date after the window. Saturates at `NaiveDate::MAX`.
    pub fn end(&self) -> NaiveDate {
        self.offset(self.unit_count)
    }

    pub fn boundaries(&self) -> Vec<NaiveDate> {
        (0..self.unit_count).map(|i| self.offset(i)).collect()
    }

    /// Start of unit `units`, clamped to the last representable date.
    fn offset(&self, units: usize) -> NaiveDate {
        let days = self.granularity.days().unsigned_abs() * units as u64;
        self.start
            .checked_add_days(Days::new(days))
            .unwrap_or(NaiveDate::MAX)
    }

    /// Unit holding `date`, if the date falls inside the window.
    pub fn cell_index(&self, date: NaiveDate) -> Option<usize> {
        if date >= self.end() {
            return None;
        }
        let boundaries = self.boundaries();
        let past = boundaries.partition_point(|boundary| *boundary <= date);
        past.checked_sub(1)
    }

    /// Unit index relative to the window start, negative before it.
    fn signed_index(&self, date: NaiveDate) -> i64 {
        (date - self.start)
            .num_days()
            .div_euclid(self.granularity.days())
    }

    /// Full grid width including the label column.
    pub fn grid_width(&self) -> f32 {
        (self.unit_count as f32 + 1.0) * self.cell_width + self.padding
    }

    /// Bar for `[start, end]`, clipped to the window. A missing endpoint
    /// takes the other one's value; an inverted range collapses onto its
    /// start.
    pub fn resolve_range(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Option<BarRect> {
        let (start, end) = match (start, end) {
            (Some(start), Some(end)) => (start, end.max(start)),
            (Some(only), None) | (None, Some(only)) => (only, only),
            (None, None) => return None,
        };

        let window_end = self.end();
        if end < self.start || start >= window_end {
            return None;
        }

        let start_index = match self.cell_index(start) {
            Some(idx) => idx as i64,
            None => self.signed_index(start),
        };
        let end_index = self
            .cell_index(end)
            .unwrap_or(self.unit_count - 1) as i64;

        let cell = self.cell_width;
        let left = (start_index + 1) as f32 * cell + self.padding;
        let width = ((end_index - start_index + 1) as f32 * cell).max(cell);

        let rect = if left < 0.0 {
            BarRect {
                left: 0.0,
                width: width + left,
                clipped_start: true,
                clipped_end: end >= window_end,
            }
        } else {
            BarRect {
                left,
                width,
                clipped_start: start < self.start,
                clipped_end: end >= window_end,
            }
        };
        trace!(%start, %end, start_index, end_index, left = rect.left, width = rect.width, "resolved range");
        Some(rect)
    }

    /// Center of the cell holding `date`, on the same padded axis as bars.
    /// Points outside the window have no position; unlike ranges they are
    /// never clamped.
    pub fn resolve_point(&self, date: NaiveDate) -> Option<f32> {
        let idx = self.cell_index(date)?;
        Some((idx as f32 + 1.0) * self.cell_width + self.cell_width / 2.0 + self.padding)
    }

    pub fn today_marker(&self, today: NaiveDate) -> Option<f32> {
        self.resolve_point(today)
    }

    /// Markers for every in-window event. Events sharing a due date are
    /// spread vertically around the row center, `marker_spacing` apart.
    pub fn layout_event_markers(&self, events: &[Event]) -> Vec<EventMarker> {
        let visible: Vec<(&Event, NaiveDate, f32)> = events
            .iter()
            .filter_map(|event| {
                let date = event.due_date?;
                let x = self.resolve_point(date)?;
                Some((event, date, x))
            })
            .collect();

        let mut per_date: HashMap<NaiveDate, usize> = HashMap::new();
        for (_, date, _) in &visible {
            *per_date.entry(*date).or_default() += 1;
        }

        let mut placed: HashMap<NaiveDate, usize> = HashMap::new();
        visible
            .into_iter()
            .map(|(event, date, x)| {
                let total = per_date.get(&date).copied().unwrap_or(1);
                let slot = placed.entry(date).or_default();
                let y_offset = stack_offset(*slot, total, self.marker_spacing);
                *slot += 1;
                EventMarker {
                    event_id: event.id.clone(),
                    name: event.name.clone(),
                    date,
                    status: event.status.clone(),
                    x,
                    y_offset,
                }
            })
            .collect()
    }

    pub fn unit_labels(&self) -> Vec<String> {
        self.boundaries()
            .into_iter()
            .map(|date| match self.granularity {
                Granularity::Day => date.format("%m-%d").to_string(),
                Granularity::Week => format!("W{:02}", date.iso_week().week()),
            })
            .collect()
    }

    /// Row model for the current expansion state: a category row per
    /// category, its subcategories when expanded, and their tasks when the
    /// subcategory is expanded too.
    pub fn layout_rows(
        &self,
        groups: &[CategoryGroup<'_>],
        order: &OrderSnapshot,
        today: Option<NaiveDate>,
    ) -> TimelineLayout {
        let mut rows = Vec::new();

        for group in groups {
            let expanded = order.is_category_expanded(&group.name);
            let (start, end) = derived_range(group.tasks()).unzip();
            rows.push(TimelineRow {
                kind: RowKind::Category {
                    name: group.name.clone(),
                    expanded,
                },
                bar: self.resolve_range(start, end),
                markers: vec![],
            });
            if !expanded {
                continue;
            }

            for sub in &group.subcategories {
                let sub_expanded = order.is_subcategory_expanded(&sub.key);
                let (start, end) = derived_range(sub.tasks.iter().copied()).unzip();
                rows.push(TimelineRow {
                    kind: RowKind::Subcategory {
                        key: sub.key.clone(),
                        expanded: sub_expanded,
                    },
                    bar: self.resolve_range(start, end),
                    markers: vec![],
                });
                if !sub_expanded {
                    continue;
                }

                for task in &sub.tasks {
                    let (start, end) = task.effective_range();
                    rows.push(TimelineRow {
                        kind: RowKind::Task {
                            id: task.id.clone(),
                            name: task.name.clone(),
                            status: task.status.clone(),
                        },
                        bar: self.resolve_range(start, end),
                        markers: self.layout_event_markers(&task.events),
                    });
                }
            }
        }

        trace!(rows = rows.len(), "laid out timeline rows");
        TimelineLayout {
            rows,
            today_x: today.and_then(|today| self.today_marker(today)),
            grid_width: self.grid_width(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowKind {
    Category { name: String, expanded: bool },
    Subcategory { key: GroupKey, expanded: bool },
    Task { id: TaskId, name: String, status: Status },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineRow {
    pub kind: RowKind,
    pub bar: Option<BarRect>,
    pub markers: Vec<EventMarker>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineLayout {
    pub rows: Vec<TimelineRow>,
    pub today_x: Option<f32>,
    pub grid_width: f32,
}

fn stack_offset(slot: usize, total: usize, spacing: f32) -> f32 {
    let center = (total.saturating_sub(1)) as f32 / 2.0;
    (slot as f32 - center) * spacing
}

/// Min start / max end over the members' effective ranges.
pub fn derived_range<'a, I>(tasks: I) -> Option<(NaiveDate, NaiveDate)>
where
    I: IntoIterator<Item = &'a Task>,
{
    let mut min_start: Option<NaiveDate> = None;
    let mut max_end: Option<NaiveDate> = None;
    for task in tasks {
        let (start, end) = task.effective_range();
        let (start, end) = (start.or(end), end.or(start));
        if let Some(start) = start {
            min_start = Some(min_start.map_or(start, |cur| cur.min(start)));
        }
        if let Some(end) = end {
            max_end = Some(max_end.map_or(end, |cur| cur.max(end)));
        }
    }
    min_start.zip(max_end)
}
