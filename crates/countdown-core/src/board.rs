use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::{CountdownError, CountdownResult};
use crate::files::FolderFile;
use crate::ics::ParsedIcsEvent;
use crate::item::{CountdownItem, CountdownPatch, Folder, FolderColor};

/// Name of the folder that absorbs countdowns from deleted folders.
pub const DEFAULT_FOLDER_NAME: &str = "个人事务";

/// Folder name used when an import does not name one.
pub const DEFAULT_IMPORT_FOLDER: &str = "导入事件";

/// All folders, countdowns and attached files of one user.
#[derive(Debug, Clone, Default)]
pub struct Board {
    pub folders: Vec<Folder>,
    pub countdowns: Vec<CountdownItem>,
    pub files: Vec<FolderFile>,
}

/// What [`Board::delete_folder`] did besides dropping the folder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FolderRemoval {
    /// Countdowns moved to the fallback folder.
    pub moved: usize,
    /// Attachments detached from the board; their stored copies are the
    /// caller's to remove.
    pub cleared_files: Vec<FolderFile>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BoardStats {
    pub total: usize,
    pub completed: usize,
    pub overdue: usize,
    pub upcoming: usize,
}

impl Board {
    pub fn new(folders: Vec<Folder>, countdowns: Vec<CountdownItem>) -> Self {
        Self {
            folders,
            countdowns,
            files: vec![],
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(default_folders(), vec![])
    }

    /// Resolves an id or an unambiguous id prefix.
    pub fn resolve_countdown_id(&self, token: &str) -> CountdownResult<String> {
        if self.countdowns.iter().any(|c| c.id == token) {
            return Ok(token.to_string());
        }

        let mut matches = self
            .countdowns
            .iter()
            .filter(|c| !token.is_empty() && c.id.starts_with(token));
        match (matches.next(), matches.next()) {
            (Some(only), None) => Ok(only.id.clone()),
            _ => Err(CountdownError::CountdownNotFound(token.to_string())),
        }
    }

    pub fn countdown(&self, id: &str) -> CountdownResult<&CountdownItem> {
        self.countdowns
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| CountdownError::CountdownNotFound(id.to_string()))
    }

    fn countdown_mut(&mut self, id: &str) -> CountdownResult<&mut CountdownItem> {
        self.countdowns
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| CountdownError::CountdownNotFound(id.to_string()))
    }

    pub fn folder(&self, id: &str) -> CountdownResult<&Folder> {
        self.folders
            .iter()
            .find(|f| f.id == id)
            .ok_or_else(|| CountdownError::FolderNotFound(id.to_string()))
    }

    pub fn folder_by_name(&self, name: &str) -> Option<&Folder> {
        self.folders.iter().find(|f| f.name == name)
    }

    /// Looks a folder up by id first, then by name.
    pub fn resolve_folder(&self, token: &str) -> CountdownResult<&Folder> {
        let token = token.trim();
        self.folder(token).or_else(|err| self.folder_by_name(token).ok_or(err))
    }

    #[instrument(skip(self, item), fields(id = %item.id))]
    pub fn add_countdown(&mut self, item: CountdownItem) {
        debug!(title = %item.title, "adding countdown");
        self.countdowns.push(item);
    }

    #[instrument(skip(self, patch))]
    pub fn update_countdown(&mut self, id: &str, patch: CountdownPatch) -> CountdownResult<()> {
        let item = self.countdown_mut(id)?;
        patch.apply(item);
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn delete_countdown(&mut self, id: &str) -> CountdownResult<CountdownItem> {
        let idx = self
            .countdowns
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| CountdownError::CountdownNotFound(id.to_string()))?;
        Ok(self.countdowns.remove(idx))
    }

    /// Flips the completion flag and returns the new value.
    #[instrument(skip(self))]
    pub fn toggle_complete(&mut self, id: &str) -> CountdownResult<bool> {
        let item = self.countdown_mut(id)?;
        item.is_completed = !item.is_completed;
        Ok(item.is_completed)
    }

    #[instrument(skip(self, folder), fields(id = %folder.id, name = %folder.name))]
    pub fn add_folder(&mut self, folder: Folder) {
        self.folders.push(folder);
    }

    #[instrument(skip(self))]
    pub fn update_folder(
        &mut self,
        id: &str,
        name: Option<String>,
        color: Option<FolderColor>,
    ) -> CountdownResult<()> {
        let folder = self
            .folders
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| CountdownError::FolderNotFound(id.to_string()))?;
        if let Some(name) = name {
            folder.name = name;
        }
        if let Some(color) = color {
            folder.color = color;
        }
        Ok(())
    }

    /// Removes a folder. Its countdowns move to the `个人事务` folder, or the
    /// first other folder when that one is gone. Its files are cleared.
    #[instrument(skip(self))]
    pub fn delete_folder(&mut self, id: &str) -> CountdownResult<FolderRemoval> {
        self.folder(id)?;

        let fallback = self
            .folders
            .iter()
            .find(|f| f.id != id && f.name == DEFAULT_FOLDER_NAME)
            .or_else(|| self.folders.iter().find(|f| f.id != id))
            .map(|f| f.id.clone());

        let mut moved = 0;
        if let Some(fallback) = fallback {
            for item in &mut self.countdowns {
                if item.folder_id.as_deref() == Some(id) {
                    item.folder_id = Some(fallback.clone());
                    moved += 1;
                }
            }
        }

        self.folders.retain(|f| f.id != id);
        let cleared_files = self.clear_folder_files(id);
        info!(moved, cleared = cleared_files.len(), "deleted folder");
        Ok(FolderRemoval {
            moved,
            cleared_files,
        })
    }

    /// The first palette color no folder uses yet.
    pub fn unused_color(&self) -> FolderColor {
        let used: BTreeSet<&str> = self.folders.iter().map(|f| f.color.key()).collect();
        FolderColor::PALETTE
            .into_iter()
            .find(|color| !used.contains(color.key()))
            .unwrap_or(FolderColor::PALETTE[self.folders.len() % FolderColor::PALETTE.len()])
    }

    /// Returns the id of the folder called `name`, creating it when missing.
    #[instrument(skip(self))]
    pub fn find_or_create_folder(&mut self, name: &str) -> CountdownResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CountdownError::EmptyFolderName);
        }
        if let Some(existing) = self.folder_by_name(name) {
            return Ok(existing.id.clone());
        }

        let folder = Folder::new(name, self.unused_color());
        let id = folder.id.clone();
        info!(id = %id, color = folder.color.key(), "created folder for import");
        self.folders.push(folder);
        Ok(id)
    }

    /// Turns the selected events (indices into `events`) into countdowns in
    /// the folder named `folder_name`. Returns the number imported.
    #[instrument(skip(self, events, selection), fields(events = events.len()))]
    pub fn import_events(
        &mut self,
        events: &[ParsedIcsEvent],
        folder_name: &str,
        selection: &BTreeSet<usize>,
    ) -> CountdownResult<usize> {
        let chosen: Vec<&ParsedIcsEvent> = events
            .iter()
            .enumerate()
            .filter(|(idx, _)| selection.contains(idx))
            .map(|(_, event)| event)
            .collect();
        if chosen.is_empty() {
            return Err(CountdownError::NothingSelected);
        }

        let folder_id = self.find_or_create_folder(folder_name)?;
        for event in &chosen {
            self.countdowns
                .push(CountdownItem::from_parsed_event(event, &folder_id));
        }

        info!(imported = chosen.len(), folder = %folder_id, "imported events");
        Ok(chosen.len())
    }

    pub fn countdowns_in<'a>(
        &'a self,
        folder_id: &'a str,
    ) -> impl Iterator<Item = &'a CountdownItem> + 'a {
        self.countdowns
            .iter()
            .filter(move |c| c.folder_id.as_deref() == Some(folder_id))
    }

    /// Attaches a file to its folder, which must exist.
    #[instrument(skip(self, file), fields(id = %file.id, folder = %file.folder_id))]
    pub fn add_file(&mut self, file: FolderFile) -> CountdownResult<()> {
        self.folder(&file.folder_id)?;
        debug!(name = %file.name, size = file.size, "attaching file");
        self.files.push(file);
        Ok(())
    }

    pub fn folder_files<'a>(
        &'a self,
        folder_id: &'a str,
    ) -> impl Iterator<Item = &'a FolderFile> + 'a {
        self.files.iter().filter(move |f| f.folder_id == folder_id)
    }

    pub fn file(&self, id: &str) -> CountdownResult<&FolderFile> {
        self.files
            .iter()
            .find(|f| f.id == id)
            .ok_or_else(|| CountdownError::FileNotFound(id.to_string()))
    }

    /// Resolves a file id or an unambiguous id prefix.
    pub fn resolve_file_id(&self, token: &str) -> CountdownResult<String> {
        if self.files.iter().any(|f| f.id == token) {
            return Ok(token.to_string());
        }

        let mut matches = self
            .files
            .iter()
            .filter(|f| !token.is_empty() && f.id.starts_with(token));
        match (matches.next(), matches.next()) {
            (Some(only), None) => Ok(only.id.clone()),
            _ => Err(CountdownError::FileNotFound(token.to_string())),
        }
    }

    /// Changes the display name; the kind stays what the original name gave.
    #[instrument(skip(self))]
    pub fn rename_file(&mut self, id: &str, name: &str) -> CountdownResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CountdownError::EmptyFileName);
        }
        let file = self
            .files
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| CountdownError::FileNotFound(id.to_string()))?;
        file.name = name.to_string();
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn delete_file(&mut self, id: &str) -> CountdownResult<FolderFile> {
        let idx = self
            .files
            .iter()
            .position(|f| f.id == id)
            .ok_or_else(|| CountdownError::FileNotFound(id.to_string()))?;
        Ok(self.files.remove(idx))
    }

    /// Detaches every file of a folder and returns them.
    #[instrument(skip(self))]
    pub fn clear_folder_files(&mut self, folder_id: &str) -> Vec<FolderFile> {
        let (cleared, kept): (Vec<FolderFile>, Vec<FolderFile>) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|f| f.folder_id == folder_id);
        self.files = kept;
        cleared
    }

    pub fn stats(&self, now: DateTime<Utc>) -> BoardStats {
        BoardStats {
            total: self.countdowns.len(),
            completed: self.countdowns.iter().filter(|c| c.is_completed).count(),
            overdue: self.countdowns.iter().filter(|c| c.is_overdue(now)).count(),
            upcoming: self.countdowns.iter().filter(|c| c.is_upcoming(now)).count(),
        }
    }
}

pub fn default_folders() -> Vec<Folder> {
    vec![
        Folder::with_id("csc367", "CSC367", FolderColor::Emerald),
        Folder::with_id("csc387", "CSC387", FolderColor::Blue),
        Folder::with_id("personal", DEFAULT_FOLDER_NAME, FolderColor::Gray),
    ]
}

/// Selects every index below `len`.
pub fn select_all(len: usize) -> BTreeSet<usize> {
    (0..len).collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::files::FileKind;
    use crate::ics::IcsEventKind;
    use crate::item::{Priority, TaskType};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    fn item_in(folder: &str, title: &str, due: DateTime<Utc>) -> CountdownItem {
        let mut item = CountdownItem::new(title, due);
        item.folder_id = Some(folder.to_string());
        item
    }

    fn parsed(summary: &str, rrule: Option<&str>) -> ParsedIcsEvent {
        ParsedIcsEvent {
            kind: IcsEventKind::VEvent,
            summary: summary.to_string(),
            description: None,
            location: None,
            start: now() + Duration::days(2),
            end: None,
            recurrence_rule: rrule.map(str::to_string),
            priority_raw: None,
            status: None,
        }
    }

    #[test]
    fn toggle_flips_completion() {
        let mut board = Board::with_defaults();
        let item = item_in("csc367", "Assignment 1 Due", now());
        let id = item.id.clone();
        board.add_countdown(item);

        assert!(board.toggle_complete(&id).expect("toggle"));
        assert!(!board.toggle_complete(&id).expect("toggle back"));
        assert!(matches!(
            board.toggle_complete("nope"),
            Err(CountdownError::CountdownNotFound(_))
        ));
    }

    #[test]
    fn update_and_delete_countdown() {
        let mut board = Board::with_defaults();
        let item = item_in("csc387", "Project Presentation", now());
        let id = item.id.clone();
        board.add_countdown(item);

        board
            .update_countdown(
                &id,
                CountdownPatch {
                    title: Some("Final Presentation".to_string()),
                    priority: Some(Priority::High),
                    ..CountdownPatch::default()
                },
            )
            .expect("update");
        let updated = board.countdown(&id).expect("exists");
        assert_eq!(updated.title, "Final Presentation");
        assert_eq!(updated.priority, Priority::High);

        let removed = board.delete_countdown(&id).expect("delete");
        assert_eq!(removed.id, id);
        assert!(board.countdowns.is_empty());
    }

    #[test]
    fn deleting_folder_moves_items_to_personal() {
        let mut board = Board::with_defaults();
        board.add_countdown(item_in("csc367", "Midterm", now()));
        board.add_countdown(item_in("csc367", "Assignment", now()));
        board.add_countdown(item_in("csc387", "Talk", now()));

        let removal = board.delete_folder("csc367").expect("delete folder");
        assert_eq!(removal.moved, 2);
        assert!(board.folder("csc367").is_err());
        assert_eq!(board.countdowns_in("personal").count(), 2);
        assert_eq!(board.countdowns_in("csc387").count(), 1);
    }

    #[test]
    fn deleting_personal_folder_falls_back_to_first_other() {
        let mut board = Board::with_defaults();
        board.add_countdown(item_in("personal", "Weekly Meeting", now()));
        board.delete_folder("personal").expect("delete folder");
        assert_eq!(board.countdowns_in("csc367").count(), 1);
    }

    #[test]
    fn update_folder_renames_and_recolors() {
        let mut board = Board::with_defaults();
        board
            .update_folder("csc367", Some("Parallel Programming".to_string()), None)
            .expect("rename");
        board
            .update_folder("csc367", None, Some(FolderColor::Red))
            .expect("recolor");

        let folder = board.folder("csc367").expect("exists");
        assert_eq!(folder.name, "Parallel Programming");
        assert_eq!(folder.color, FolderColor::Red);

        assert!(matches!(
            board.update_folder("missing", Some("x".to_string()), None),
            Err(CountdownError::FolderNotFound(_))
        ));
    }

    #[test]
    fn files_attach_rename_and_delete() {
        let mut board = Board::with_defaults();
        let file = FolderFile::new("csc387", "slides.pptx", 4096, now());
        let id = file.id.clone();
        board.add_file(file).expect("attach");
        assert!(matches!(
            board.add_file(FolderFile::new("nowhere", "a.txt", 1, now())),
            Err(CountdownError::FolderNotFound(_))
        ));

        board.rename_file(&id, "  Week 1 slides ").expect("rename");
        let renamed = board.file(&id).expect("exists");
        assert_eq!(renamed.name, "Week 1 slides");
        assert_eq!(renamed.file_type, FileKind::Presentation);
        assert!(matches!(
            board.rename_file(&id, "   "),
            Err(CountdownError::EmptyFileName)
        ));

        assert_eq!(board.resolve_file_id(&id[..6]).expect("prefix"), id);
        assert_eq!(board.folder_files("csc387").count(), 1);

        let removed = board.delete_file(&id).expect("delete");
        assert_eq!(removed.original_name, "slides.pptx");
        assert!(matches!(
            board.delete_file(&id),
            Err(CountdownError::FileNotFound(_))
        ));
    }

    #[test]
    fn deleting_folder_clears_its_files() {
        let mut board = Board::with_defaults();
        board
            .add_file(FolderFile::new("csc367", "a.pdf", 10, now()))
            .expect("attach");
        board
            .add_file(FolderFile::new("csc367", "b.zip", 20, now()))
            .expect("attach");
        board
            .add_file(FolderFile::new("personal", "c.txt", 30, now()))
            .expect("attach");

        let removal = board.delete_folder("csc367").expect("delete folder");
        assert_eq!(removal.cleared_files.len(), 2);
        assert_eq!(board.files.len(), 1);
        assert_eq!(board.folder_files("personal").count(), 1);
    }

    #[test]
    fn folders_resolve_by_id_or_name() {
        let board = Board::with_defaults();
        assert_eq!(board.resolve_folder("csc387").expect("by id").name, "CSC387");
        assert_eq!(board.resolve_folder(" 个人事务 ").expect("by name").id, "personal");
        assert!(matches!(
            board.resolve_folder("nowhere"),
            Err(CountdownError::FolderNotFound(_))
        ));
    }

    #[test]
    fn unknown_folder_delete_is_error() {
        let mut board = Board::with_defaults();
        assert!(matches!(
            board.delete_folder("missing"),
            Err(CountdownError::FolderNotFound(_))
        ));
    }

    #[test]
    fn new_folders_take_unused_colors() {
        let mut board = Board::with_defaults();
        // emerald, blue and gray are taken by the defaults
        assert_eq!(board.unused_color(), FolderColor::Purple);

        let id = board.find_or_create_folder("Imported").expect("create");
        assert_eq!(board.folder(&id).expect("exists").color, FolderColor::Purple);

        let again = board.find_or_create_folder("  Imported ").expect("reuse");
        assert_eq!(again, id);
        assert_eq!(board.folders.len(), 4);
    }

    #[test]
    fn full_palette_cycles() {
        let folders = FolderColor::PALETTE
            .into_iter()
            .enumerate()
            .map(|(i, color)| Folder::with_id(format!("f{i}"), format!("F{i}"), color))
            .collect();
        let board = Board::new(folders, vec![]);
        assert_eq!(board.unused_color(), FolderColor::Emerald);
    }

    #[test]
    fn import_selected_events_into_named_folder() {
        let mut board = Board::with_defaults();
        let events = vec![
            parsed("Team Sync", Some("FREQ=WEEKLY")),
            parsed("Optional lunch", None),
            parsed("Urgent review", None),
        ];
        let selection: BTreeSet<usize> = [0, 2].into_iter().collect();

        let count = board
            .import_events(&events, DEFAULT_IMPORT_FOLDER, &selection)
            .expect("import");
        assert_eq!(count, 2);

        let folder_id = board
            .folder_by_name(DEFAULT_IMPORT_FOLDER)
            .expect("folder created")
            .id
            .clone();
        let imported: Vec<&CountdownItem> = board.countdowns_in(&folder_id).collect();
        assert_eq!(imported.len(), 2);
        assert_eq!(imported[0].task_type, TaskType::Recurring);
        assert_eq!(imported[1].priority, Priority::High);
    }

    #[test]
    fn import_requires_selection_and_folder_name() {
        let mut board = Board::with_defaults();
        let events = vec![parsed("x", None)];
        assert!(matches!(
            board.import_events(&events, "Inbox", &BTreeSet::new()),
            Err(CountdownError::NothingSelected)
        ));
        assert!(matches!(
            board.import_events(&events, "   ", &select_all(events.len())),
            Err(CountdownError::EmptyFolderName)
        ));
        assert!(board.countdowns.is_empty());
    }

    #[test]
    fn stats_count_states() {
        let mut board = Board::with_defaults();
        board.add_countdown(item_in("personal", "late", now() - Duration::hours(1)));
        board.add_countdown(item_in("personal", "soon", now() + Duration::hours(2)));
        let mut done = item_in("personal", "done", now() - Duration::days(1));
        done.is_completed = true;
        board.add_countdown(done);

        assert_eq!(
            board.stats(now()),
            BoardStats {
                total: 3,
                completed: 1,
                overdue: 1,
                upcoming: 1,
            }
        );
    }

    #[test]
    fn ids_resolve_by_unique_prefix() {
        let mut board = Board::new(vec![], vec![]);
        let mut a = CountdownItem::new("a", now());
        a.id = "abc123".to_string();
        let mut b = CountdownItem::new("b", now());
        b.id = "abd456".to_string();
        board.add_countdown(a);
        board.add_countdown(b);

        assert_eq!(board.resolve_countdown_id("abc").expect("unique"), "abc123");
        assert!(board.resolve_countdown_id("ab").is_err());
        assert!(board.resolve_countdown_id("zzz").is_err());
    }
}
