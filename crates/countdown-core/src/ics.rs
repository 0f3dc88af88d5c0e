//! Line-oriented reader for the subset of iCalendar used by countdown imports.
//!
//! Only flat `VEVENT` and `VTODO` properties are read. Folded lines,
//! `VTIMEZONE` definitions and RRULE expansion are out of scope: a rule is kept
//! verbatim and only marks the resulting countdown as recurring.

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::datetime::{LocalZone, parse_timestamp};
use crate::error::{CountdownError, CountdownResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IcsEventKind {
    #[serde(rename = "VEVENT")]
    VEvent,
    #[serde(rename = "VTODO")]
    VTodo,
}

impl IcsEventKind {
    fn from_begin(line: &str) -> Option<Self> {
        match line {
            "BEGIN:VEVENT" => Some(IcsEventKind::VEvent),
            "BEGIN:VTODO" => Some(IcsEventKind::VTodo),
            _ => None,
        }
    }

    fn is_end(line: &str) -> bool {
        line == "END:VEVENT" || line == "END:VTODO"
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IcsEventKind::VEvent => "VEVENT",
            IcsEventKind::VTodo => "VTODO",
        }
    }
}

impl fmt::Display for IcsEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One importable event. `summary` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedIcsEvent {
    pub kind: IcsEventKind,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub recurrence_rule: Option<String>,
    pub priority_raw: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    MissingSummary,
    MissingStart,
    InvalidStart,
    /// `BEGIN` without a matching `END` before the next `BEGIN` or end of input.
    Unterminated,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::MissingSummary => "missing SUMMARY",
            SkipReason::MissingStart => "missing DTSTART/DUE",
            SkipReason::InvalidStart => "unparseable start date",
            SkipReason::Unterminated => "no END line",
        };
        f.write_str(text)
    }
}

/// A block that was read but not emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEvent {
    pub kind: IcsEventKind,
    /// 1-based line that closed (or abandoned) the block.
    pub line: usize,
    pub summary: Option<String>,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParseReport {
    pub events: Vec<ParsedIcsEvent>,
    pub skipped: Vec<SkippedEvent>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum DateSlot {
    #[default]
    Unset,
    Invalid,
    At(DateTime<Utc>),
}

impl DateSlot {
    fn from_token(token: &str, zone: &LocalZone) -> Self {
        match parse_ics_date(token, zone) {
            Some(at) => DateSlot::At(at),
            None => {
                debug!(token, "unparseable ICS date");
                DateSlot::Invalid
            }
        }
    }

    fn instant(self) -> Option<DateTime<Utc>> {
        match self {
            DateSlot::At(at) => Some(at),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct PendingEvent {
    kind: IcsEventKind,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    start: DateSlot,
    end: DateSlot,
    due: DateSlot,
    recurrence_rule: Option<String>,
    priority_raw: Option<i64>,
    status: Option<String>,
    /// Depth of nested components such as `VALARM`.
    nested: usize,
}

impl PendingEvent {
    fn new(kind: IcsEventKind) -> Self {
        Self {
            kind,
            summary: None,
            description: None,
            location: None,
            start: DateSlot::Unset,
            end: DateSlot::Unset,
            due: DateSlot::Unset,
            recurrence_rule: None,
            priority_raw: None,
            status: None,
            nested: 0,
        }
    }

    fn apply_property(&mut self, line: &str, zone: &LocalZone) {
        if let Some(rest) = line.strip_prefix("SUMMARY:") {
            self.summary = Some(unescape_text(rest));
        } else if let Some(rest) = line.strip_prefix("DESCRIPTION:") {
            self.description = Some(unescape_text(rest));
        } else if line.starts_with("DTSTART") {
            self.start = DateSlot::from_token(date_token(line), zone);
        } else if line.starts_with("DTEND") {
            self.end = DateSlot::from_token(date_token(line), zone);
        } else if line.starts_with("DUE") {
            self.due = DateSlot::from_token(date_token(line), zone);
        } else if let Some(rest) = line.strip_prefix("RRULE:") {
            self.recurrence_rule = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("LOCATION:") {
            self.location = Some(unescape_text(rest));
        } else if let Some(rest) = line.strip_prefix("PRIORITY:") {
            self.priority_raw = leading_int(rest);
        } else if let Some(rest) = line.strip_prefix("STATUS:") {
            self.status = Some(rest.to_string());
        }
    }

    fn finish(mut self, line: usize) -> Result<ParsedIcsEvent, SkippedEvent> {
        if self.kind == IcsEventKind::VTodo && self.start == DateSlot::Unset {
            self.start = self.due;
        }

        let kind = self.kind;
        let skip = |summary: Option<String>, reason: SkipReason| SkippedEvent {
            kind,
            line,
            summary,
            reason,
        };

        let Some(summary) = self.summary.filter(|s| !s.is_empty()) else {
            return Err(skip(None, SkipReason::MissingSummary));
        };
        let start = match self.start {
            DateSlot::At(start) => start,
            DateSlot::Unset => return Err(skip(Some(summary), SkipReason::MissingStart)),
            DateSlot::Invalid => return Err(skip(Some(summary), SkipReason::InvalidStart)),
        };

        Ok(ParsedIcsEvent {
            kind,
            summary,
            description: self.description,
            location: self.location,
            start,
            end: self.end.instant(),
            recurrence_rule: self.recurrence_rule,
            priority_raw: self.priority_raw,
            status: self.status,
        })
    }

    fn abandon(self, line: usize) -> SkippedEvent {
        SkippedEvent {
            kind: self.kind,
            line,
            summary: self.summary,
            reason: SkipReason::Unterminated,
        }
    }
}

/// Scans `text` once and collects every complete `VEVENT`/`VTODO` block.
/// Blocks without a summary or a usable start are reported in
/// [`ParseReport::skipped`] instead of `events`.
#[tracing::instrument(skip(text, zone), fields(bytes = text.len()))]
pub fn parse(text: &str, zone: &LocalZone) -> ParseReport {
    let mut report = ParseReport::default();
    let mut current: Option<PendingEvent> = None;
    let mut line_no = 0;

    for raw_line in text.split('\n') {
        line_no += 1;
        let line = raw_line.trim();

        if let Some(kind) = IcsEventKind::from_begin(line) {
            if let Some(open) = current.take() {
                let skipped = open.abandon(line_no);
                warn!(line = line_no, kind = %skipped.kind, "event reopened before END; discarding");
                report.skipped.push(skipped);
            }
            current = Some(PendingEvent::new(kind));
            continue;
        }

        let Some(event) = current.as_mut() else {
            continue;
        };

        if event.nested > 0 {
            if line.starts_with("BEGIN:") {
                event.nested += 1;
            } else if line.starts_with("END:") {
                event.nested -= 1;
            }
            continue;
        }

        if IcsEventKind::is_end(line) {
            if let Some(done) = current.take() {
                match done.finish(line_no) {
                    Ok(parsed) => {
                        debug!(line = line_no, kind = %parsed.kind, summary = %parsed.summary, "parsed event");
                        report.events.push(parsed);
                    }
                    Err(skipped) => {
                        warn!(
                            line = line_no,
                            kind = %skipped.kind,
                            reason = %skipped.reason,
                            "dropping ICS event"
                        );
                        report.skipped.push(skipped);
                    }
                }
            }
        } else if line.starts_with("BEGIN:") {
            event.nested = 1;
        } else {
            event.apply_property(line, zone);
        }
    }

    if let Some(open) = current.take() {
        warn!(line = line_no, "input ended inside an event; discarding");
        report.skipped.push(open.abandon(line_no));
    }

    info!(
        events = report.events.len(),
        skipped = report.skipped.len(),
        "parsed ICS text"
    );
    report
}

/// Reads and parses an `.ics` file. An unreadable file yields no partial result.
#[tracing::instrument(skip(zone), fields(path = %path.display()))]
pub fn read_file(path: &Path, zone: &LocalZone) -> CountdownResult<ParseReport> {
    let text = fs::read_to_string(path).map_err(|source| CountdownError::IcsRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse(&text, zone))
}

/// Interprets an ICS date token. `YYYYMMDD` and `YYYYMMDDTHHMMSS` are
/// wall-clock values in `zone`; tokens carrying `T` and `Z` are UTC.
pub fn parse_ics_date(token: &str, zone: &LocalZone) -> Option<DateTime<Utc>> {
    let token = token.trim();

    if token.len() == 8 {
        let date = NaiveDate::parse_from_str(token, "%Y%m%d").ok()?;
        return zone.midnight(date, token).ok();
    }

    if token.len() == 15 {
        let ndt = NaiveDateTime::parse_from_str(token, "%Y%m%dT%H%M%S").ok()?;
        return zone.to_utc(ndt, token).ok();
    }

    if token.contains('T') && token.contains('Z') {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(token, "%Y%m%dT%H%M%SZ") {
            return Some(ndt.and_utc());
        }
        return DateTime::parse_from_rfc3339(token)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }

    parse_timestamp(token, zone).ok()
}

/// Value part of a date property: the text after the first `:`, or after the
/// first `;` when there is no colon.
fn date_token(line: &str) -> &str {
    line.split_once(':')
        .or_else(|| line.split_once(';'))
        .map(|(_, value)| value)
        .unwrap_or("")
}

fn unescape_text(raw: &str) -> String {
    raw.replace("\\,", ",").replace("\\;", ";")
}

fn leading_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let digits_end = trimmed
        .char_indices()
        .find(|&(idx, ch)| !(ch.is_ascii_digit() || (idx == 0 && (ch == '-' || ch == '+'))))
        .map(|(idx, _)| idx)
        .unwrap_or(trimmed.len());
    trimmed[..digits_end].parse().ok()
}
