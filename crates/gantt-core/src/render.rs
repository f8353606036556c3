use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::grouping::CategoryGroup;
use crate::layout::{BarRect, RowKind, TimelineLayout, TimelineRow, TimelineWindow};
use crate::ordering::OrderSnapshot;
use crate::task::{Status, format_date};

const BAR: char = '█';
const MARKER: char = '◆';
const TODAY: char = '│';

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => io::stdout().is_terminal(),
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all)]
    pub fn print_tree(
        &self,
        groups: &[CategoryGroup<'_>],
        order: &OrderSnapshot,
    ) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_tree(out, groups, order)
    }

    pub fn write_tree<W: Write>(
        &self,
        mut out: W,
        groups: &[CategoryGroup<'_>],
        order: &OrderSnapshot,
    ) -> anyhow::Result<()> {
        for group in groups {
            let expanded = order.is_category_expanded(&group.name);
            writeln!(
                out,
                "{} {}",
                fold_marker(expanded),
                self.paint(&group.name, "1")
            )?;
            if !expanded {
                continue;
            }

            for sub in &group.subcategories {
                let sub_expanded = order.is_subcategory_expanded(&sub.key);
                writeln!(
                    out,
                    "  {} {} ({})",
                    fold_marker(sub_expanded),
                    sub.name(),
                    sub.tasks.len()
                )?;
                if !sub_expanded {
                    continue;
                }

                let headers = vec![
                    "ID".to_string(),
                    "Name".to_string(),
                    "Status".to_string(),
                    "Start".to_string(),
                    "End".to_string(),
                    "Events".to_string(),
                ];
                let rows = sub
                    .tasks
                    .iter()
                    .map(|task| {
                        vec![
                            task.id.to_string(),
                            task.name.clone(),
                            self.paint_status(&task.status),
                            task.start_date.map(format_date).unwrap_or_default(),
                            task.end_date.map(format_date).unwrap_or_default(),
                            task.events.len().to_string(),
                        ]
                    })
                    .collect();
                write_table(&mut out, "      ", headers, rows)?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_timeline(
        &self,
        window: &TimelineWindow,
        layout: &TimelineLayout,
    ) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_timeline(out, window, layout)
    }

    pub fn write_timeline<W: Write>(
        &self,
        mut out: W,
        window: &TimelineWindow,
        layout: &TimelineLayout,
    ) -> anyhow::Result<()> {
        let labels: Vec<String> = layout.rows.iter().map(row_label).collect();
        let label_width = labels
            .iter()
            .map(|label| UnicodeWidthStr::width(label.as_str()))
            .max()
            .unwrap_or(0)
            .max(8);

        let header = header_line(window);
        writeln!(out, "{:label_width$} {header}", "")?;

        let today_col = layout.today_x.map(|x| marker_column(window, x));

        for (row, label) in layout.rows.iter().zip(&labels) {
            let mut cells = vec![' '; window.unit_count];
            if let Some(col) = today_col
                && let Some(cell) = cells.get_mut(col)
            {
                *cell = TODAY;
            }
            if let Some(bar) = row.bar {
                paint_bar(&mut cells, window, &bar);
            }
            for marker in &row.markers {
                if let Some(cell) = cells.get_mut(marker_column(window, marker.x)) {
                    *cell = MARKER;
                }
            }

            let padding = label_width.saturating_sub(UnicodeWidthStr::width(label.as_str()));
            let line: String = cells.into_iter().collect();
            let line = match &row.kind {
                RowKind::Task { status, .. } => self.paint(&line, status_code(status)),
                _ => line,
            };
            writeln!(out, "{label}{} {line}", " ".repeat(padding))?;
        }
        Ok(())
    }

    fn paint_status(&self, status: &Status) -> String {
        self.paint(status.as_str(), status_code(status))
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || code.is_empty() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn status_code(status: &Status) -> &'static str {
    match status {
        Status::ToDo => "",
        Status::InProgress => "33",
        Status::Confirmed => "36",
        Status::IceBox => "34",
        Status::Done => "32",
        Status::Unknown(_) => "35",
    }
}

fn fold_marker(expanded: bool) -> &'static str {
    if expanded { "▾" } else { "▸" }
}

fn row_label(row: &TimelineRow) -> String {
    match &row.kind {
        RowKind::Category { name, expanded } => format!("{} {name}", fold_marker(*expanded)),
        RowKind::Subcategory { key, expanded } => {
            format!("  {} {}", fold_marker(*expanded), key.sub_category)
        }
        RowKind::Task { name, .. } => format!("      {name}"),
    }
}

fn header_line(window: &TimelineWindow) -> String {
    let labels = window.unit_labels();
    let mut line = vec![' '; window.unit_count];
    let mut next_free = 0usize;
    for (idx, label) in labels.iter().enumerate() {
        if idx < next_free {
            continue;
        }
        let chars: Vec<char> = label.chars().collect();
        if idx + chars.len() > line.len() {
            break;
        }
        line[idx..idx + chars.len()].copy_from_slice(&chars);
        next_free = idx + chars.len() + 2;
    }
    line.into_iter().collect()
}

/// Grid column under a point marker's x.
fn marker_column(window: &TimelineWindow, x: f32) -> usize {
    (((x - window.padding) / window.cell_width).floor() as i64 - 1).max(0) as usize
}

fn paint_bar(cells: &mut [char], window: &TimelineWindow, bar: &BarRect) {
    let cell = window.cell_width;
    let first = (((bar.left - window.padding) / cell).floor() as i64 - 1).max(0) as usize;
    let end = (((bar.right() - window.padding) / cell).ceil() as i64 - 1)
        .clamp(0, cells.len() as i64) as usize;
    if first >= end {
        return;
    }
    for slot in &mut cells[first..end] {
        *slot = BAR;
    }
    if bar.clipped_start {
        cells[first] = '◀';
    }
    if bar.clipped_end {
        cells[end - 1] = '▶';
    }
}

fn write_table<W: Write>(
    mut writer: W,
    indent: &str,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    write!(writer, "{indent}")?;
    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        write!(writer, "{indent}")?;
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
