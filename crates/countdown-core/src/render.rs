use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::board::{Board, BoardStats};
use crate::config::Config;
use crate::datetime::LocalZone;
use crate::files::{FolderFile, format_file_size};
use crate::ics::{ParseReport, SkippedEvent};
use crate::item::{CountdownItem, IMPORTED_PREFIX, Priority, TaskType};
use crate::remaining::compute_remaining;

const DUE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    zone: LocalZone,
}

impl Renderer {
    pub fn new(cfg: &Config, zone: LocalZone) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color")?.unwrap_or(true);
        Ok(Self { color, zone })
    }

    #[tracing::instrument(skip(self, board, items, now), fields(count = items.len()))]
    pub fn print_countdown_table(
        &self,
        board: &Board,
        items: &[&CountdownItem],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec![
            "ID".to_string(),
            "Folder".to_string(),
            "Due".to_string(),
            "Remaining".to_string(),
            "Pri".to_string(),
            "Type".to_string(),
            "Title".to_string(),
        ];

        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let id = self.paint(short_id(&item.id), "33");

            let folder = match item.folder_id.as_deref().map(|id| board.folder(id)) {
                Some(Ok(folder)) => self.paint(&folder.name, &folder.color.ansi_code()),
                Some(Err(_)) | None => String::new(),
            };

            let due = self.zone.format_local(item.due, DUE_FORMAT);
            let due = if item.is_overdue(now) {
                self.paint(&due, "31")
            } else if item.is_upcoming(now) {
                self.paint(&due, "33")
            } else {
                due
            };

            rows.push(vec![
                id,
                folder,
                due,
                item.display(now),
                self.paint_priority(item.priority),
                task_type_label(item.task_type).to_string(),
                item.title.clone(),
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_stats(&self, stats: &BoardStats) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "{} total, {} completed, {} overdue, {} due within 24h",
            stats.total, stats.completed, stats.overdue, stats.upcoming
        )?;
        Ok(())
    }

    /// Numbered list of import candidates, 1-based to match `--select`.
    #[tracing::instrument(skip(self, report, now))]
    pub fn print_import_preview(&self, report: &ParseReport, now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec![
            "#".to_string(),
            "Kind".to_string(),
            "Start".to_string(),
            "Remaining".to_string(),
            "Pri".to_string(),
            "Type".to_string(),
            "Summary".to_string(),
        ];

        let rows = report
            .events
            .iter()
            .enumerate()
            .map(|(idx, event)| {
                let remaining = compute_remaining(event.start, now);
                vec![
                    (idx + 1).to_string(),
                    event.kind.to_string(),
                    self.zone.format_local(event.start, DUE_FORMAT),
                    remaining.to_string(),
                    self.paint_priority(Priority::from_ics(event.priority_raw, &event.summary)),
                    task_type_label(TaskType::from_recurrence(event.recurrence_rule.as_deref()))
                        .to_string(),
                    event.summary.clone(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        self.write_skipped(&mut out, &report.skipped)
    }

    /// Blocks the parser dropped, with the reason and closing line.
    pub fn print_skipped(&self, skipped: &[SkippedEvent]) -> anyhow::Result<()> {
        self.write_skipped(io::stdout().lock(), skipped)
    }

    fn write_skipped<W: Write>(&self, mut out: W, skipped: &[SkippedEvent]) -> anyhow::Result<()> {
        for block in skipped {
            let title = block
                .summary
                .as_deref()
                .map(|summary| format!(" '{summary}'"))
                .unwrap_or_default();
            writeln!(
                out,
                "{}",
                self.paint(
                    &format!(
                        "skipped {}{title} ending at line {}: {}",
                        block.kind, block.line, block.reason
                    ),
                    "31"
                )
            )?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, board, files), fields(count = files.len()))]
    pub fn print_files(&self, board: &Board, files: &[&FolderFile]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec![
            "ID".to_string(),
            "Folder".to_string(),
            "Name".to_string(),
            "Type".to_string(),
            "Size".to_string(),
            "Added".to_string(),
        ];
        let rows = files
            .iter()
            .map(|file| {
                let folder = match board.folder(&file.folder_id) {
                    Ok(folder) => self.paint(&folder.name, &folder.color.ansi_code()),
                    Err(_) => file.folder_id.clone(),
                };
                vec![
                    self.paint(short_id(&file.id), "33"),
                    folder,
                    file.name.clone(),
                    file.file_type.to_string(),
                    format_file_size(file.size),
                    self.zone.format_local(file.added_at, DUE_FORMAT),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)
    }

    pub fn print_folders(&self, board: &Board) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec![
            "ID".to_string(),
            "Name".to_string(),
            "Color".to_string(),
            "Count".to_string(),
            "Files".to_string(),
        ];
        let rows = board
            .folders
            .iter()
            .map(|folder| {
                vec![
                    folder.id.clone(),
                    self.paint(&folder.name, &folder.color.ansi_code()),
                    format!("{} {}", folder.color.key(), folder.color.hex()),
                    board.countdowns_in(&folder.id).count().to_string(),
                    board.folder_files(&folder.id).count().to_string(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    fn paint_priority(&self, priority: Priority) -> String {
        let code = match priority {
            Priority::High => "31",
            Priority::Medium => "33",
            Priority::Low => "32",
        };
        self.paint(priority.as_str(), code)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn task_type_label(task_type: TaskType) -> &'static str {
    match task_type {
        TaskType::OneTime => "once",
        TaskType::Recurring => "repeat",
    }
}

/// Enough of an id to select it again by prefix.
fn short_id(id: &str) -> &str {
    let keep = if id.starts_with(IMPORTED_PREFIX) {
        IMPORTED_PREFIX.len() + 8
    } else {
        8
    };
    match id.char_indices().nth(keep) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
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
