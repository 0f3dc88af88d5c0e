use std::collections::BTreeSet;
use std::ops::ControlFlow;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::board::{Board, DEFAULT_FOLDER_NAME, select_all};
use crate::cli::Command;
use crate::config::Config;
use crate::datastore::DataStore;
use crate::datetime::{LocalZone, parse_date_expr};
use crate::digest;
use crate::error::CountdownError;
use crate::ics;
use crate::files::{FolderFile, format_file_size};
use crate::item::{CountdownItem, CountdownPatch, Folder, FolderColor, Priority, TaskType};
use crate::remaining::{compute_remaining, format_display};
use crate::render::Renderer;
use crate::ticker::{SystemClock, Ticker};

#[instrument(skip(store, cfg, zone, renderer, command))]
pub fn dispatch(
    store: &DataStore,
    cfg: &Config,
    zone: &LocalZone,
    renderer: &Renderer,
    command: Option<Command>,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let command = command.unwrap_or(Command::List {
        folder: None,
        all: false,
    });
    debug!(?command, "dispatching command");

    match command {
        Command::List { folder, all } => cmd_list(store, renderer, folder.as_deref(), all, now),
        Command::Add {
            title,
            due,
            folder,
            priority,
            recurring,
            description,
        } => cmd_add(
            store,
            zone,
            NewCountdown {
                title: title.join(" "),
                due,
                folder,
                priority,
                recurring,
                description,
            },
            now,
        ),
        Command::Edit {
            id,
            title,
            due,
            folder,
            priority,
            description,
        } => cmd_edit(
            store,
            zone,
            &id,
            CountdownEdit {
                title,
                due,
                folder,
                priority,
                description,
            },
            now,
        ),
        Command::Done { id } => cmd_done(store, &id),
        Command::Delete { id } => cmd_delete(store, &id),
        Command::Remaining { due, completed } => cmd_remaining(zone, &due, completed, now),
        Command::Watch {
            id,
            interval,
            ticks,
        } => cmd_watch(store, cfg, &id, interval, ticks),
        Command::Import {
            file,
            folder,
            select,
            dry_run,
        } => cmd_import(
            store,
            cfg,
            zone,
            renderer,
            &file,
            folder,
            &select,
            dry_run,
            now,
        ),
        Command::Folders => cmd_folders(store, renderer),
        Command::FolderAdd { name, color } => cmd_folder_add(store, &name, color),
        Command::FolderEdit { id, name, color } => cmd_folder_edit(store, &id, name, color),
        Command::FolderDelete { id } => cmd_folder_delete(store, &id),
        Command::FileAdd { folder, path } => cmd_file_add(store, &folder, &path, now),
        Command::Files { folder } => cmd_files(store, renderer, folder.as_deref()),
        Command::FileRename { id, name } => cmd_file_rename(store, &id, &name),
        Command::FileDelete { id } => cmd_file_delete(store, &id),
        Command::Digest => cmd_digest(store, zone, now),
        Command::Show => cmd_show(cfg),
    }
}

#[instrument(skip(store, renderer, now))]
fn cmd_list(
    store: &DataStore,
    renderer: &Renderer,
    folder: Option<&str>,
    all: bool,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command list");

    let board = store.load_board()?;
    let folder_id = match folder {
        Some(token) => Some(board.resolve_folder(token)?.id.clone()),
        None => None,
    };

    let mut items: Vec<&CountdownItem> = board
        .countdowns
        .iter()
        .filter(|item| all || !item.is_completed)
        .filter(|item| {
            folder_id
                .as_deref()
                .is_none_or(|id| item.folder_id.as_deref() == Some(id))
        })
        .collect();
    items.sort_by_key(|item| (item.is_completed, item.due));

    if items.is_empty() {
        println!("No countdowns.");
    } else {
        renderer.print_countdown_table(&board, &items, now)?;
    }
    renderer.print_stats(&board.stats(now))?;
    Ok(())
}

#[derive(Debug)]
struct NewCountdown {
    title: String,
    due: String,
    folder: Option<String>,
    priority: Option<Priority>,
    recurring: bool,
    description: Option<String>,
}

#[instrument(skip(store, zone, new, now), fields(title = %new.title))]
fn cmd_add(
    store: &DataStore,
    zone: &LocalZone,
    new: NewCountdown,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command add");

    let title = new.title.trim();
    if title.is_empty() {
        return Err(anyhow!("a countdown needs a title"));
    }
    let due = parse_date_expr(&new.due, now, zone)
        .with_context(|| format!("invalid --due value: {}", new.due))?;

    let mut board = store.load_board()?;
    let folder_id = match new.folder.as_deref() {
        Some(token) => Some(board.resolve_folder(token)?.id.clone()),
        None => board
            .folder_by_name(DEFAULT_FOLDER_NAME)
            .map(|folder| folder.id.clone()),
    };

    let mut item = CountdownItem::new(title, due);
    item.folder_id = folder_id;
    item.description = new.description.filter(|text| !text.trim().is_empty());
    item.priority = new.priority.unwrap_or_default();
    if new.recurring {
        item.task_type = TaskType::Recurring;
    }

    let id = item.id.clone();
    let display = item.display(now);
    board.add_countdown(item);
    store.save_board(&board)?;

    println!("Created countdown {id} ({display}).");
    Ok(())
}

#[derive(Debug, Default)]
struct CountdownEdit {
    title: Option<String>,
    due: Option<String>,
    folder: Option<String>,
    priority: Option<Priority>,
    description: Option<String>,
}

/// Turns edit flags into a patch, resolving the due expression and folder.
fn build_patch(
    board: &Board,
    zone: &LocalZone,
    edit: CountdownEdit,
    now: DateTime<Utc>,
) -> anyhow::Result<CountdownPatch> {
    let title = match edit.title {
        Some(title) if title.trim().is_empty() => {
            return Err(anyhow!("a countdown needs a title"));
        }
        Some(title) => Some(title.trim().to_string()),
        None => None,
    };
    let due = match edit.due.as_deref() {
        Some(expr) => Some(
            parse_date_expr(expr, now, zone)
                .with_context(|| format!("invalid --due value: {expr}"))?,
        ),
        None => None,
    };
    let folder_id = match edit.folder.as_deref() {
        Some(token) => Some(board.resolve_folder(token)?.id.clone()),
        None => None,
    };

    Ok(CountdownPatch {
        title,
        description: edit.description.map(|text| text.trim().to_string()),
        folder_id,
        due,
        task_type: None,
        priority: edit.priority,
    })
}

#[instrument(skip(store, zone, edit, now))]
fn cmd_edit(
    store: &DataStore,
    zone: &LocalZone,
    token: &str,
    edit: CountdownEdit,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command edit");

    let mut board = store.load_board()?;
    let id = board.resolve_countdown_id(token)?;
    let patch = build_patch(&board, zone, edit, now)?;
    board.update_countdown(&id, patch)?;
    store.save_board(&board)?;

    let item = board.countdown(&id)?;
    println!("Modified countdown '{}' ({}).", item.title, item.display(now));
    Ok(())
}

#[instrument(skip(store))]
fn cmd_done(store: &DataStore, token: &str) -> anyhow::Result<()> {
    info!("command done");

    let mut board = store.load_board()?;
    let id = board.resolve_countdown_id(token)?;
    let completed = board.toggle_complete(&id)?;
    store.save_board(&board)?;

    let title = &board.countdown(&id)?.title;
    if completed {
        println!("Completed countdown '{title}'.");
    } else {
        println!("Reopened countdown '{title}'.");
    }
    Ok(())
}

#[instrument(skip(store))]
fn cmd_delete(store: &DataStore, token: &str) -> anyhow::Result<()> {
    info!("command delete");

    let mut board = store.load_board()?;
    let id = board.resolve_countdown_id(token)?;
    let removed = board.delete_countdown(&id)?;
    store.save_board(&board)?;

    println!("Deleted countdown '{}'.", removed.title);
    Ok(())
}

#[instrument(skip(zone, now))]
fn cmd_remaining(
    zone: &LocalZone,
    due: &str,
    completed: bool,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let due = parse_date_expr(due, now, zone)?;
    println!("{}", format_display(&compute_remaining(due, now), completed));
    Ok(())
}

#[instrument(skip(store, cfg))]
fn cmd_watch(
    store: &DataStore,
    cfg: &Config,
    token: &str,
    interval: Option<u64>,
    ticks: Option<u64>,
) -> anyhow::Result<()> {
    info!("command watch");

    let board = store.load_board()?;
    let id = board.resolve_countdown_id(token)?;
    let item = board.countdown(&id)?.clone();

    let interval = match interval {
        Some(secs) => Duration::from_secs(secs.max(1)),
        None => cfg.tick_interval()?,
    };
    let mut ticker = Ticker::new(interval);
    if let Some(max) = ticks {
        ticker = ticker.with_max_ticks(max);
    }

    let ran = ticker.run(&SystemClock, |now, _| {
        println!("{}  {}", item.title, item.display(now));
        if item.is_completed {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    debug!(ticks = ran, "watch finished");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
#[instrument(skip(store, cfg, zone, renderer, folder, select, now))]
fn cmd_import(
    store: &DataStore,
    cfg: &Config,
    zone: &LocalZone,
    renderer: &Renderer,
    file: &Path,
    folder: Option<String>,
    select: &[usize],
    dry_run: bool,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command import");

    let report = ics::read_file(file, zone)?;
    if !report.skipped.is_empty() {
        warn!(
            skipped = report.skipped.len(),
            file = %file.display(),
            "some calendar blocks were not importable"
        );
    }

    if report.events.is_empty() {
        renderer.print_skipped(&report.skipped)?;
        println!("No importable events in {}.", file.display());
        return Ok(());
    }

    renderer.print_import_preview(&report, now)?;
    if dry_run {
        println!("Dry run: nothing imported.");
        return Ok(());
    }

    let selection = selection_from_numbers(select, report.events.len())?;
    let folder_name = folder.unwrap_or_else(|| cfg.import_folder());

    let mut board = store.load_board()?;
    let imported = board.import_events(&report.events, &folder_name, &selection)?;
    store.save_board(&board)?;

    println!("Imported {imported} countdown(s) into '{}'.", folder_name.trim());
    Ok(())
}

/// Maps 1-based preview numbers to event indices. No numbers selects all.
fn selection_from_numbers(numbers: &[usize], len: usize) -> anyhow::Result<BTreeSet<usize>> {
    if numbers.is_empty() {
        return Ok(select_all(len));
    }

    numbers
        .iter()
        .map(|&n| {
            if n == 0 || n > len {
                Err(anyhow!("selection {n} is out of range 1..={len}"))
            } else {
                Ok(n - 1)
            }
        })
        .collect()
}

fn cmd_folders(store: &DataStore, renderer: &Renderer) -> anyhow::Result<()> {
    let board = store.load_board()?;
    renderer.print_folders(&board)
}

#[instrument(skip(store))]
fn cmd_folder_add(
    store: &DataStore,
    name: &str,
    color: Option<FolderColor>,
) -> anyhow::Result<()> {
    info!("command folder-add");

    let name = name.trim();
    if name.is_empty() {
        return Err(CountdownError::EmptyFolderName.into());
    }

    let mut board = store.load_board()?;
    if board.folder_by_name(name).is_some() {
        return Err(anyhow!("folder '{name}' already exists"));
    }

    let folder = Folder::new(name, color.unwrap_or_else(|| board.unused_color()));
    let id = folder.id.clone();
    let color = folder.color;
    board.add_folder(folder);
    store.save_board(&board)?;

    println!("Created folder {id} ({}).", color.key());
    Ok(())
}

#[instrument(skip(store))]
fn cmd_folder_edit(
    store: &DataStore,
    token: &str,
    name: Option<String>,
    color: Option<FolderColor>,
) -> anyhow::Result<()> {
    info!("command folder-edit");

    let name = match name {
        Some(name) if name.trim().is_empty() => return Err(CountdownError::EmptyFolderName.into()),
        Some(name) => Some(name.trim().to_string()),
        None => None,
    };

    let mut board = store.load_board()?;
    let id = board.resolve_folder(token)?.id.clone();
    if let Some(name) = name.as_deref()
        && board.folder_by_name(name).is_some_and(|other| other.id != id)
    {
        return Err(anyhow!("folder '{name}' already exists"));
    }
    board.update_folder(&id, name, color)?;
    store.save_board(&board)?;

    let folder = board.folder(&id)?;
    println!("Modified folder '{}' ({}).", folder.name, folder.color.key());
    Ok(())
}

#[instrument(skip(store))]
fn cmd_folder_delete(store: &DataStore, token: &str) -> anyhow::Result<()> {
    info!("command folder-delete");

    let mut board = store.load_board()?;
    let folder = board.resolve_folder(token)?;
    let (id, name) = (folder.id.clone(), folder.name.clone());
    let removal = board.delete_folder(&id)?;
    store.save_board(&board)?;

    for file in &removal.cleared_files {
        if let Err(err) = store.remove_attachment(file) {
            warn!(id = %file.id, error = %err, "failed to remove stored copy");
        }
    }

    println!(
        "Deleted folder '{name}'; moved {} countdown(s), removed {} file(s).",
        removal.moved,
        removal.cleared_files.len()
    );
    Ok(())
}

#[instrument(skip(store, now))]
fn cmd_file_add(
    store: &DataStore,
    folder: &str,
    path: &Path,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command file-add");

    let mut board = store.load_board()?;
    let folder_id = board.resolve_folder(folder)?.id.clone();
    let file = store.store_attachment(path, &folder_id, now)?;
    let summary = format!("{} ({}, {})", file.name, file.file_type, format_file_size(file.size));
    let id = file.id.clone();
    board.add_file(file)?;
    store.save_board(&board)?;

    println!("Attached file {id}: {summary}.");
    Ok(())
}

fn cmd_files(store: &DataStore, renderer: &Renderer, folder: Option<&str>) -> anyhow::Result<()> {
    let board = store.load_board()?;
    let files: Vec<&FolderFile> = match folder {
        Some(token) => {
            let id = board.resolve_folder(token)?.id.as_str();
            board.folder_files(id).collect()
        }
        None => board.files.iter().collect(),
    };

    if files.is_empty() {
        println!("No files.");
        return Ok(());
    }
    renderer.print_files(&board, &files)
}

#[instrument(skip(store))]
fn cmd_file_rename(store: &DataStore, token: &str, name: &str) -> anyhow::Result<()> {
    info!("command file-rename");

    let mut board = store.load_board()?;
    let id = board.resolve_file_id(token)?;
    board.rename_file(&id, name)?;
    store.save_board(&board)?;

    println!("Renamed file to '{}'.", board.file(&id)?.name);
    Ok(())
}

#[instrument(skip(store))]
fn cmd_file_delete(store: &DataStore, token: &str) -> anyhow::Result<()> {
    info!("command file-delete");

    let mut board = store.load_board()?;
    let id = board.resolve_file_id(token)?;
    let removed = board.delete_file(&id)?;
    store.save_board(&board)?;
    store.remove_attachment(&removed)?;

    println!("Deleted file '{}'.", removed.name);
    Ok(())
}

#[instrument(skip(store, zone, now))]
fn cmd_digest(store: &DataStore, zone: &LocalZone, now: DateTime<Utc>) -> anyhow::Result<()> {
    let board = store.load_board()?;
    println!("{}", digest_text(&board, zone, now));
    Ok(())
}

fn digest_text(board: &Board, zone: &LocalZone, now: DateTime<Utc>) -> String {
    let upcoming = digest::upcoming(&board.countdowns, now);
    digest::compose(&upcoming, now, zone).unwrap_or_else(|| digest::EMPTY_DIGEST.to_string())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<(&String, &String)> = cfg.iter().collect();
    entries.sort();
    for (k, v) in entries {
        println!("{k}={v}");
    }
    for file in &cfg.loaded_files {
        println!("# loaded {}", file.display());
    }
    Ok(())
}
