use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::builder::ValueParser;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::item::{FolderColor, Priority};

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "countdown",
    version,
    about = "Countdowns to deadlines, with calendar (.ics) import",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "countdownrc")]
    pub countdownrc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Open countdowns, soonest first
    List {
        /// Only this folder (id or name)
        #[arg(long)]
        folder: Option<String>,

        /// Include completed countdowns
        #[arg(long)]
        all: bool,
    },

    Add {
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,

        /// now, today, tomorrow, +3d, 2025-06-01T09:00, ...
        #[arg(long, allow_hyphen_values = true)]
        due: String,

        /// Folder id or name
        #[arg(long)]
        folder: Option<String>,

        #[arg(long, value_parser = ValueParser::new(|s: &str| s.parse::<Priority>()))]
        priority: Option<Priority>,

        #[arg(long)]
        recurring: bool,

        #[arg(long)]
        description: Option<String>,
    },

    /// Change fields of an existing countdown
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long, allow_hyphen_values = true)]
        due: Option<String>,

        /// Folder id or name
        #[arg(long)]
        folder: Option<String>,

        #[arg(long, value_parser = ValueParser::new(|s: &str| s.parse::<Priority>()))]
        priority: Option<Priority>,

        /// Empty text clears the description
        #[arg(long)]
        description: Option<String>,
    },

    /// Toggle completion
    Done { id: String },

    Delete { id: String },

    /// Print the remaining-time line for a due date
    Remaining {
        #[arg(allow_hyphen_values = true)]
        due: String,

        #[arg(long)]
        completed: bool,
    },

    /// Reprint a countdown's remaining time on every tick
    Watch {
        id: String,

        /// Seconds between ticks (default: tick.interval)
        #[arg(long)]
        interval: Option<u64>,

        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,
    },

    /// Preview and import events and todos from an .ics file
    Import {
        file: PathBuf,

        /// Target folder name (default: import.folder)
        #[arg(long)]
        folder: Option<String>,

        /// 1-based preview numbers to import, comma separated
        #[arg(long, value_delimiter = ',')]
        select: Vec<usize>,

        #[arg(long)]
        dry_run: bool,
    },

    Folders,

    FolderAdd {
        name: String,

        #[arg(long, value_parser = ValueParser::new(|s: &str| s.parse::<FolderColor>()))]
        color: Option<FolderColor>,
    },

    /// Rename or recolor a folder
    FolderEdit {
        /// Folder id or name
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long, value_parser = ValueParser::new(|s: &str| s.parse::<FolderColor>()))]
        color: Option<FolderColor>,
    },

    FolderDelete { id: String },

    /// Attach a copy of a file to a folder
    FileAdd {
        /// Folder id or name
        folder: String,

        path: PathBuf,
    },

    /// Attached files, optionally of one folder
    Files { folder: Option<String> },

    FileRename { id: String, name: String },

    FileDelete { id: String },

    /// Countdowns due within the next week
    Digest,

    /// Effective configuration
    Show,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parses_import_selection() {
        let cli = GlobalCli::try_parse_from([
            "countdown",
            "--rc",
            "color=off",
            "import",
            "cal.ics",
            "--select",
            "1,3",
            "--dry-run",
        ])
        .expect("parse");

        assert_eq!(cli.rc_overrides.len(), 1);
        assert_eq!(cli.rc_overrides[0].key, "color");
        match cli.command {
            Some(Command::Import {
                select, dry_run, ..
            }) => {
                assert_eq!(select, vec![1, 3]);
                assert!(dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn add_joins_title_words_and_parses_priority() {
        let cli = GlobalCli::try_parse_from([
            "countdown", "add", "Midterm", "exam", "--due", "+3d", "--priority", "high",
        ])
        .expect("parse");

        match cli.command {
            Some(Command::Add {
                title, priority, ..
            }) => {
                assert_eq!(title.join(" "), "Midterm exam");
                assert_eq!(priority, Some(Priority::High));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn edit_and_folder_edit_take_optional_fields() {
        let cli = GlobalCli::try_parse_from([
            "countdown", "edit", "abc1", "--title", "Final", "--due", "+2d",
        ])
        .expect("parse");
        match cli.command {
            Some(Command::Edit {
                id,
                title,
                due,
                folder,
                priority,
                description,
            }) => {
                assert_eq!(id, "abc1");
                assert_eq!(title.as_deref(), Some("Final"));
                assert_eq!(due.as_deref(), Some("+2d"));
                assert!(folder.is_none() && priority.is_none() && description.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = GlobalCli::try_parse_from(["countdown", "folder-edit", "csc367", "--color", "red"])
            .expect("parse");
        match cli.command {
            Some(Command::FolderEdit { id, name, color }) => {
                assert_eq!(id, "csc367");
                assert!(name.is_none());
                assert_eq!(color, Some(FolderColor::Red));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn file_commands_parse() {
        let cli = GlobalCli::try_parse_from(["countdown", "file-add", "CSC367", "notes/a1.pdf"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Some(Command::FileAdd { ref folder, .. }) if folder == "CSC367"
        ));

        let cli = GlobalCli::try_parse_from(["countdown", "files"]).expect("parse");
        assert!(matches!(cli.command, Some(Command::Files { folder: None })));
    }

    #[test]
    fn negative_relative_dates_are_values() {
        let cli = GlobalCli::try_parse_from(["countdown", "remaining", "-2h"]).expect("parse");
        assert!(matches!(
            cli.command,
            Some(Command::Remaining { ref due, .. }) if due == "-2h"
        ));
    }

    #[test]
    fn rejects_unknown_color() {
        let err = GlobalCli::try_parse_from(["countdown", "folder-add", "x", "--color", "teal"]);
        assert!(err.is_err());
    }

    #[test]
    fn keyval_requires_equals() {
        assert!("color".parse::<KeyVal>().is_err());
    }
}
