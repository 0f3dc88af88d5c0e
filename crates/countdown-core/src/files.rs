//! Files attached to folders.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse file category, decided by extension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Document,
    Presentation,
    Spreadsheet,
    Image,
    Video,
    Audio,
    Text,
    Archive,
    #[default]
    #[serde(other)]
    Other,
}

impl FileKind {
    pub fn from_name(name: &str) -> Self {
        let Some((_, ext)) = name.rsplit_once('.') else {
            return FileKind::Other;
        };
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => FileKind::Pdf,
            "doc" | "docx" => FileKind::Document,
            "ppt" | "pptx" => FileKind::Presentation,
            "xls" | "xlsx" => FileKind::Spreadsheet,
            "jpg" | "jpeg" | "png" | "gif" | "webp" => FileKind::Image,
            "mp4" | "mov" | "avi" | "mkv" => FileKind::Video,
            "mp3" | "wav" | "aac" | "m4a" => FileKind::Audio,
            "txt" | "md" => FileKind::Text,
            "zip" | "rar" | "7z" => FileKind::Archive,
            _ => FileKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Pdf => "pdf",
            FileKind::Document => "document",
            FileKind::Presentation => "presentation",
            FileKind::Spreadsheet => "spreadsheet",
            FileKind::Image => "image",
            FileKind::Video => "video",
            FileKind::Audio => "audio",
            FileKind::Text => "text",
            FileKind::Archive => "archive",
            FileKind::Other => "other",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FolderFile {
    pub id: String,

    pub folder_id: String,

    /// Display name; renames change only this.
    pub name: String,

    pub original_name: String,

    #[serde(rename = "type")]
    pub file_type: FileKind,

    pub size: u64,

    #[serde(rename = "uploadDate")]
    pub added_at: DateTime<Utc>,

    /// Where the stored copy lives, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_path: Option<PathBuf>,
}

impl FolderFile {
    pub fn new(
        folder_id: impl Into<String>,
        name: impl Into<String>,
        size: u64,
        added_at: DateTime<Utc>,
    ) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4().simple().to_string(),
            folder_id: folder_id.into(),
            file_type: FileKind::from_name(&name),
            original_name: name.clone(),
            name,
            size,
            added_at,
            stored_path: None,
        }
    }
}

/// Human-readable size in B, KB, MB or GB with at most one decimal.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{rounded:.0} {}", UNITS[unit])
    } else {
        format!("{rounded:.1} {}", UNITS[unit])
    }
}
