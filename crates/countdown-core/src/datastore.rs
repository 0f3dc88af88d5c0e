use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::board::{Board, default_folders};
use crate::files::FolderFile;
use crate::item::{CountdownItem, Folder};

#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub countdowns_path: PathBuf,
    pub folders_path: PathBuf,
    pub files_path: PathBuf,
    /// Stored copies of attached files.
    pub attachments_dir: PathBuf,
}

impl DataStore {
    /// Opens (and on first use seeds) the data directory. A fresh store gets
    /// the default folders.
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let countdowns_path = data_dir.join("countdowns.data");
        let folders_path = data_dir.join("folders.data");
        let files_path = data_dir.join("folder_files.data");
        let attachments_dir = data_dir.join("folder_files");
        fs::create_dir_all(&attachments_dir)
            .with_context(|| format!("failed to create {}", attachments_dir.display()))?;

        if !countdowns_path.exists() {
            fs::write(&countdowns_path, "")?;
        }
        if !files_path.exists() {
            fs::write(&files_path, "")?;
        }
        if !folders_path.exists() {
            save_jsonl_atomic(&folders_path, &default_folders())
                .context("failed to seed folders.data")?;
            info!(folders = %folders_path.display(), "seeded default folders");
        }

        info!(
            data_dir = %data_dir.display(),
            countdowns = %countdowns_path.display(),
            folders = %folders_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            countdowns_path,
            folders_path,
            files_path,
            attachments_dir,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_countdowns(&self) -> anyhow::Result<Vec<CountdownItem>> {
        load_jsonl(&self.countdowns_path).context("failed to load countdowns.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_folders(&self) -> anyhow::Result<Vec<Folder>> {
        load_jsonl(&self.folders_path).context("failed to load folders.data")
    }

    #[tracing::instrument(skip(self, items))]
    pub fn save_countdowns(&self, items: &[CountdownItem]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.countdowns_path, items).context("failed to save countdowns.data")
    }

    #[tracing::instrument(skip(self, folders))]
    pub fn save_folders(&self, folders: &[Folder]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.folders_path, folders).context("failed to save folders.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_files(&self) -> anyhow::Result<Vec<FolderFile>> {
        load_jsonl(&self.files_path).context("failed to load folder_files.data")
    }

    #[tracing::instrument(skip(self, files))]
    pub fn save_files(&self, files: &[FolderFile]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.files_path, files).context("failed to save folder_files.data")
    }

    pub fn load_board(&self) -> anyhow::Result<Board> {
        let mut board = Board::new(self.load_folders()?, self.load_countdowns()?);
        board.files = self.load_files()?;
        Ok(board)
    }

    #[tracing::instrument(skip(self, board))]
    pub fn save_board(&self, board: &Board) -> anyhow::Result<()> {
        self.save_folders(&board.folders)?;
        self.save_countdowns(&board.countdowns)?;
        self.save_files(&board.files)
    }

    /// Copies `source` into the attachments directory and describes the copy.
    /// The record is not added to any board.
    #[tracing::instrument(skip(self, now))]
    pub fn store_attachment(
        &self,
        source: &Path,
        folder_id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<FolderFile> {
        let name = source
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| anyhow!("not a file path: {}", source.display()))?;

        let target = self
            .attachments_dir
            .join(format!("{}_{name}", now.timestamp_millis()));
        let size = fs::copy(source, &target).with_context(|| {
            format!("failed to copy {} to {}", source.display(), target.display())
        })?;
        info!(target = %target.display(), size, "stored attachment");

        let mut file = FolderFile::new(folder_id, name, size, now);
        file.stored_path = Some(target);
        Ok(file)
    }

    /// Deletes the stored copy of a detached file. A copy that is already
    /// gone is not an error.
    #[tracing::instrument(skip(self, file), fields(id = %file.id))]
    pub fn remove_attachment(&self, file: &FolderFile) -> anyhow::Result<()> {
        let Some(path) = file.stored_path.as_deref() else {
            return Ok(());
        };
        if !path.exists() {
            warn!(path = %path.display(), "stored copy already missing");
            return Ok(());
        }
        fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
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

        let record: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
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
