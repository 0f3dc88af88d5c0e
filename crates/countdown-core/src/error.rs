//! Error types for countdown operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the countdown library.
#[derive(Error, Debug)]
pub enum CountdownError {
    #[error("failed to parse ICS file {}", path.display())]
    IcsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("local time does not exist in the configured timezone: {0}")]
    NonexistentLocalTime(String),

    #[error("countdown not found: {0}")]
    CountdownNotFound(String),

    #[error("folder not found: {0}")]
    FolderNotFound(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("file name cannot be empty")]
    EmptyFileName,

    #[error("no events selected for import")]
    NothingSelected,

    #[error("folder name cannot be empty")]
    EmptyFolderName,
}

pub type CountdownResult<T> = Result<T, CountdownError>;
