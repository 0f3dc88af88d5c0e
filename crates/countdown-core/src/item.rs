use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ics::ParsedIcsEvent;
use crate::remaining::{Remaining, compute_remaining, format_display, is_upcoming};

/// Id prefix of countdowns created from calendar imports.
pub const IMPORTED_PREFIX: &str = "imported_";

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Buckets an ICS `PRIORITY` value (1 highest, 9 lowest). Missing or zero
    /// values fall back to keywords in the summary.
    pub fn from_ics(priority_raw: Option<i64>, summary: &str) -> Self {
        match priority_raw {
            Some(raw) if raw >= 1 => {
                if raw <= 4 {
                    Priority::High
                } else if raw >= 6 {
                    Priority::Low
                } else {
                    Priority::Medium
                }
            }
            _ => Self::from_keywords(summary),
        }
    }

    pub fn from_keywords(summary: &str) -> Self {
        let lower = summary.to_lowercase();
        if lower.contains("urgent") || lower.contains("important") {
            Priority::High
        } else if lower.contains("optional") || lower.contains("reminder") {
            Priority::Low
        } else {
            Priority::Medium
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h" | "high" => Ok(Priority::High),
            "m" | "medium" => Ok(Priority::Medium),
            "l" | "low" => Ok(Priority::Low),
            other => Err(anyhow!("invalid priority: {other} (expected high, medium or low)")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    #[default]
    OneTime,
    Recurring,
}

impl TaskType {
    /// An RRULE only tags the item; occurrences are never expanded.
    pub fn from_recurrence(rule: Option<&str>) -> Self {
        if rule.is_some() {
            TaskType::Recurring
        } else {
            TaskType::OneTime
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::OneTime => "one-time",
            TaskType::Recurring => "recurring",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Folder colors. Unknown keys read back as gray.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FolderColor {
    Emerald,
    Blue,
    Purple,
    Orange,
    Red,
    Pink,
    Indigo,
    #[serde(other)]
    Gray,
}

impl FolderColor {
    pub const PALETTE: [FolderColor; 8] = [
        FolderColor::Emerald,
        FolderColor::Blue,
        FolderColor::Purple,
        FolderColor::Orange,
        FolderColor::Red,
        FolderColor::Pink,
        FolderColor::Indigo,
        FolderColor::Gray,
    ];

    pub fn hex(&self) -> &'static str {
        match self {
            FolderColor::Emerald => "#10b981",
            FolderColor::Blue => "#3b82f6",
            FolderColor::Purple => "#8b5cf6",
            FolderColor::Orange => "#f59e0b",
            FolderColor::Red => "#ef4444",
            FolderColor::Pink => "#ec4899",
            FolderColor::Indigo => "#6366f1",
            FolderColor::Gray => "#6b7280",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            FolderColor::Emerald => "emerald",
            FolderColor::Blue => "blue",
            FolderColor::Purple => "purple",
            FolderColor::Orange => "orange",
            FolderColor::Red => "red",
            FolderColor::Pink => "pink",
            FolderColor::Indigo => "indigo",
            FolderColor::Gray => "gray",
        }
    }

    /// Truecolor ANSI foreground sequence body for terminal output.
    pub fn ansi_code(&self) -> String {
        let hex = self.hex().trim_start_matches('#');
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0);
        format!("38;2;{};{};{}", channel(0), channel(2), channel(4))
    }
}

impl FromStr for FolderColor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        FolderColor::PALETTE
            .into_iter()
            .find(|color| color.key() == key)
            .ok_or_else(|| anyhow!("unknown folder color: {s}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default = "default_folder_color")]
    pub color: FolderColor,
}

fn default_folder_color() -> FolderColor {
    FolderColor::Gray
}

impl Folder {
    pub fn new(name: impl Into<String>, color: FolderColor) -> Self {
        Self {
            id: format!("folder_{}", Uuid::new_v4().simple()),
            name: name.into(),
            color,
        }
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>, color: FolderColor) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CountdownItem {
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default, rename = "folder")]
    pub folder_id: Option<String>,

    #[serde(rename = "dueDate")]
    pub due: DateTime<Utc>,

    #[serde(default, rename = "type")]
    pub task_type: TaskType,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub is_completed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrule: Option<String>,
}

impl CountdownItem {
    pub fn new(title: impl Into<String>, due: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            title: title.into(),
            description: None,
            folder_id: None,
            due,
            task_type: TaskType::OneTime,
            priority: Priority::Medium,
            is_completed: false,
            rrule: None,
        }
    }

    /// Builds the countdown an accepted import candidate turns into.
    pub fn from_parsed_event(event: &ParsedIcsEvent, folder_id: &str) -> Self {
        let description = event
            .description
            .clone()
            .or_else(|| event.location.clone())
            .filter(|text| !text.is_empty());

        Self {
            id: format!("{IMPORTED_PREFIX}{}", Uuid::new_v4().simple()),
            title: event.summary.clone(),
            description,
            folder_id: Some(folder_id.to_string()),
            due: event.start,
            task_type: TaskType::from_recurrence(event.recurrence_rule.as_deref()),
            priority: Priority::from_ics(event.priority_raw, &event.summary),
            is_completed: event.status.as_deref() == Some("COMPLETED"),
            rrule: event.recurrence_rule.clone(),
        }
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Remaining {
        compute_remaining(self.due, now)
    }

    pub fn display(&self, now: DateTime<Utc>) -> String {
        format_display(&self.remaining(now), self.is_completed)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed && self.due < now
    }

    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed && is_upcoming(self.due, now)
    }
}

/// Field updates for [`crate::board::Board::update_countdown`].
#[derive(Debug, Clone, Default)]
pub struct CountdownPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub folder_id: Option<String>,
    pub due: Option<DateTime<Utc>>,
    pub task_type: Option<TaskType>,
    pub priority: Option<Priority>,
}

impl CountdownPatch {
    pub fn apply(self, item: &mut CountdownItem) {
        if let Some(title) = self.title {
            item.title = title;
        }
        if let Some(description) = self.description {
            item.description = Some(description).filter(|d| !d.is_empty());
        }
        if let Some(folder_id) = self.folder_id {
            item.folder_id = Some(folder_id);
        }
        if let Some(due) = self.due {
            item.due = due;
        }
        if let Some(task_type) = self.task_type {
            item.task_type = task_type;
        }
        if let Some(priority) = self.priority {
            item.priority = priority;
        }
    }
}
