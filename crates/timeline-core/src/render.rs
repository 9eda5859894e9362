use std::io::{self, IsTerminal, Write};
use std::ops::Range;

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::calendar::format_iso_date;
use crate::check::{Issue, Severity};
use crate::config::Config;
use crate::layout::{RowGeometry, TimelineLayout};
use crate::model::{Task, TaskType};
use crate::rows::RowKind;

const MAX_LABEL_WIDTH: usize = 32;
const MIN_STRIP_WIDTH: usize = 10;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, out, layout))]
    pub fn write_rows<W: Write>(&self, out: W, layout: &TimelineLayout) -> anyhow::Result<()> {
        let headers = vec![
            "#".to_string(),
            "Kind".to_string(),
            "ID".to_string(),
            "Name".to_string(),
            "Activities".to_string(),
        ];

        let rows = layout
            .rows
            .iter()
            .map(|row| {
                let kind = match row.kind {
                    RowKind::Parent => self.paint("parent", "1"),
                    RowKind::Child => "child".to_string(),
                };
                vec![
                    row.index.to_string(),
                    kind,
                    self.paint(&row.task_id, "33"),
                    format!("{}{}", "  ".repeat(row.depth), row.name),
                    row.markers.len().to_string(),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip(self, out, layout))]
    pub fn write_ticks<W: Write>(&self, out: W, layout: &TimelineLayout) -> anyhow::Result<()> {
        let headers = vec!["Date".to_string(), "X".to_string(), "Label".to_string()];
        let rows = layout
            .ticks
            .iter()
            .map(|tick| {
                let mut label = tick.label.text.clone();
                if let Some(month) = &tick.label.month_text {
                    label.push(' ');
                    label.push_str(month);
                }
                if let Some(year) = &tick.label.year_text {
                    label.push(' ');
                    label.push_str(year);
                }
                vec![
                    format_iso_date(tick.date),
                    format!("{:.1}", tick.x),
                    label,
                ]
            })
            .collect();
        write_table(out, headers, rows)
    }

    pub fn write_window<W: Write>(&self, mut out: W, layout: &TimelineLayout) -> anyhow::Result<()> {
        writeln!(out, "start     {}", format_iso_date(layout.window.min_date))?;
        writeln!(out, "end       {}", format_iso_date(layout.window.max_date))?;
        writeln!(out, "days      {}", layout.window.span_days())?;
        writeln!(out, "zoom      {}", layout.zoom)?;
        writeln!(out, "scale     {}", layout.scale)?;
        writeln!(out, "px/day    {}", layout.pixels_per_day)?;
        writeln!(out, "width     {}", layout.width)?;
        writeln!(out, "today     {} (x = {})", format_iso_date(layout.today), layout.today_x)?;
        Ok(())
    }

    /// Character-cell rendition of the chart, `columns` cells wide,
    /// showing the horizontal pixel range `visible`.
    #[tracing::instrument(skip(self, out, layout))]
    pub fn write_chart<W: Write>(
        &self,
        mut out: W,
        layout: &TimelineLayout,
        columns: usize,
        visible: Range<f64>,
    ) -> anyhow::Result<()> {
        let label_width = layout
            .rows
            .iter()
            .map(|row| UnicodeWidthStr::width(row_label(row).as_str()))
            .max()
            .unwrap_or(0)
            .clamp(4, MAX_LABEL_WIDTH);
        let strip_width = columns
            .saturating_sub(label_width + 3)
            .max(MIN_STRIP_WIDTH);
        let span_px = visible.end - visible.start;
        let px_per_cell = (span_px / strip_width as f64).max(f64::MIN_POSITIVE);
        let cell_of = |x: f64| -> Option<usize> {
            let cell = ((x - visible.start) / px_per_cell).floor();
            (cell >= 0.0 && cell < strip_width as f64).then_some(cell as usize)
        };

        let mut axis = vec![' '; strip_width];
        let mut free_from = 0usize;
        for tick in &layout.ticks {
            let Some(cell) = cell_of(tick.x) else {
                continue;
            };
            if cell < free_from {
                continue;
            }
            axis[cell] = '|';
            for (offset, ch) in tick.label.text.chars().enumerate() {
                let idx = cell + 1 + offset;
                if idx >= strip_width {
                    break;
                }
                axis[idx] = ch;
            }
            free_from = cell + tick.label.text.chars().count() + 2;
        }
        let axis: String = axis.into_iter().collect();
        writeln!(out, "{} | {}", pad_to(" ", label_width), axis)?;

        let today_cell = cell_of(layout.today_x);
        for row in &layout.rows {
            let mut cells: Vec<String> = vec![" ".to_string(); strip_width];
            if let Some(cell) = today_cell {
                cells[cell] = self.paint(":", "2");
            }
            for marker in &row.markers {
                if let Some(cell) = cell_of(marker.x) {
                    cells[cell] = self.paint_hex("o", &marker.color);
                }
            }

            let label = truncate(&row_label(row), label_width);
            let label = if row.kind == RowKind::Parent {
                self.paint(&pad_to(&label, label_width), "1")
            } else {
                pad_to(&label, label_width)
            };
            writeln!(out, "{} | {}", label, cells.concat())?;
        }

        Ok(())
    }

    pub fn write_types<W: Write>(&self, out: W, types: &[TaskType]) -> anyhow::Result<()> {
        let headers = vec!["ID".to_string(), "Name".to_string(), "Color".to_string()];
        let rows = types
            .iter()
            .map(|ty| {
                vec![
                    self.paint(&ty.id, "33"),
                    ty.name.clone(),
                    self.paint_hex(&ty.color, &ty.color),
                ]
            })
            .collect();
        write_table(out, headers, rows)
    }

    /// Detail view of one task: fields, types in priority order, then its
    /// activities or sub-tasks.
    pub fn write_task<W: Write>(
        &self,
        mut out: W,
        task: &Task,
        parent: Option<&Task>,
        types: &[TaskType],
    ) -> anyhow::Result<()> {
        writeln!(out, "id          {}", self.paint(&task.id, "33"))?;
        writeln!(out, "name        {}", task.name)?;
        if !task.description.is_empty() {
            writeln!(out, "description {}", task.description)?;
        }
        if let Some(parent) = parent {
            writeln!(out, "parent      {} ({})", parent.id, parent.name)?;
        }
        let type_names: Vec<String> = task
            .type_ids
            .iter()
            .map(|id| match types.iter().find(|t| &t.id == id) {
                Some(ty) => self.paint_hex(&ty.name, &ty.color),
                None => format!("{id}?"),
            })
            .collect();
        writeln!(out, "types       {}", type_names.join(", "))?;

        if !task.is_leaf() {
            writeln!(out)?;
            let headers = vec!["ID".to_string(), "Name".to_string(), "Activities".to_string()];
            let rows = task
                .children
                .iter()
                .map(|child| {
                    vec![
                        self.paint(&child.id, "33"),
                        child.name.clone(),
                        child.activities.len().to_string(),
                    ]
                })
                .collect();
            return write_table(out, headers, rows);
        }

        if task.activities.is_empty() {
            return Ok(());
        }
        writeln!(out)?;
        let mut activities: Vec<_> = task.activities.iter().collect();
        activities.sort_by_key(|a| a.date);
        let headers = vec!["ID".to_string(), "Date".to_string(), "Description".to_string()];
        let rows = activities
            .into_iter()
            .map(|a| {
                vec![
                    self.paint(&a.id, "33"),
                    format_iso_date(a.date),
                    a.description.clone(),
                ]
            })
            .collect();
        write_table(out, headers, rows)
    }

    pub fn write_issues<W: Write>(&self, mut out: W, issues: &[Issue]) -> anyhow::Result<()> {
        if issues.is_empty() {
            writeln!(out, "no issues found")?;
            return Ok(());
        }
        for issue in issues {
            let tag = match issue.severity {
                Severity::Error => self.paint("error", "31"),
                Severity::Warning => self.paint("warning", "33"),
            };
            writeln!(out, "{tag}: [{}] {}", issue.subject, issue.message)?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }

    fn paint_hex(&self, text: &str, hex: &str) -> String {
        match parse_hex_color(hex) {
            Some((r, g, b)) => self.paint(text, &format!("38;2;{r};{g};{b}")),
            None => text.to_string(),
        }
    }
}

fn row_label(row: &RowGeometry) -> String {
    format!("{}{}", "  ".repeat(row.depth), row.name)
}

fn parse_hex_color(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.trim().strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(digits.get(range)?, 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

fn truncate(text: &str, width: usize) -> String {
    if UnicodeWidthStr::width(text) <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let ch_width = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + ch_width + 1 > width {
            break;
        }
        out.push(ch);
        used += ch_width;
    }
    out.push('…');
    out
}

fn pad_to(text: &str, width: usize) -> String {
    let visible = UnicodeWidthStr::width(strip_ansi(text).as_str());
    format!("{text}{}", " ".repeat(width.saturating_sub(visible)))
}

fn write_table<W: Write>(
    mut writer: W,
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

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            write!(writer, "{} ", pad_to(cell, widths[idx]))?;
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

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Renderer, parse_hex_color, strip_ansi, truncate};
    use crate::layout::TimelineLayout;
    use crate::model::TimelineState;

    fn sample_layout() -> TimelineLayout {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 9, 0, 0).unwrap();
        TimelineLayout::build(&TimelineState::sample(now), now)
    }

    #[test]
    fn chart_has_axis_and_one_line_per_row() {
        let layout = sample_layout();
        let mut buf = Vec::new();
        Renderer::plain()
            .write_chart(&mut buf, &layout, 100, 0.0..layout.width)
            .expect("render chart");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines.len(), 1 + layout.rows.len());
        assert!(lines[0].contains("|W"));
        assert!(lines[1].starts_with("Quarterly Planning"));
        assert!(lines[2].starts_with("  Stakeholder alignment"));
        assert!(lines[2].contains('o'));
        assert!(!lines[1].contains('o'));
    }

    #[test]
    fn cropped_chart_drops_markers_outside_the_range() {
        let layout = sample_layout();
        let start = layout.today_x + 20.0 * layout.pixels_per_day;
        let mut buf = Vec::new();
        Renderer::plain()
            .write_chart(&mut buf, &layout, 100, start..start + 700.0)
            .expect("render chart");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<_> = text.lines().collect();

        let strip = |line: &str| line.split(" | ").nth(1).unwrap_or("").to_string();
        assert!(!strip(lines[2]).contains('o'));
        assert!(!strip(lines[2]).contains(':'));
    }

    #[test]
    fn tables_list_rows_and_ticks() {
        let layout = sample_layout();
        let mut buf = Vec::new();
        let renderer = Renderer::plain();
        renderer.write_rows(&mut buf, &layout).expect("rows");
        renderer.write_ticks(&mut buf, &layout).expect("ticks");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("task-1-2"));
        assert!(text.contains("Budget adjustments"));
        assert!(text.contains("W8 2026"));
    }

    #[test]
    fn task_detail_lists_types_then_activities() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 9, 0, 0).unwrap();
        let state = TimelineState::sample(now);
        let (task, parent) = state.find_task("task-1-1").expect("task-1-1");
        let mut buf = Vec::new();
        Renderer::plain()
            .write_task(&mut buf, task, parent, &state.types)
            .expect("render task");
        let text = String::from_utf8(buf).expect("utf8");

        assert!(text.contains("parent      task-1 (Quarterly Planning)"));
        assert!(text.contains("types       Planning"));
        let kickoff = text.find("act-101").expect("act-101");
        let review = text.find("act-102").expect("act-102");
        assert!(kickoff < review);
        assert!(text.contains("2026-02-19"));
    }

    #[test]
    fn helpers_handle_edge_cases() {
        assert_eq!(parse_hex_color("#3A86FF"), Some((0x3a, 0x86, 0xff)));
        assert_eq!(parse_hex_color("blue"), None);
        assert_eq!(parse_hex_color("#fff"), None);
        assert_eq!(strip_ansi("\x1b[1mbold\x1b[0m"), "bold");
        assert_eq!(truncate("abcdef", 4), "abc…");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
