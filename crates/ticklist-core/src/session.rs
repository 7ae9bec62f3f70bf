use std::path::PathBuf;

use chrono::{DateTime, Local, Utc};
use tracing::{debug, error, info, instrument, warn};

use crate::deadline::{self, parse_duration_input};
use crate::error::StoreError;
use crate::storage::KeyValueStore;
use crate::store::TaskStore;
use crate::task::TaskId;
use crate::transfer::{self, ImportMode};
use crate::view::{self, ListView};

/// Blocking questions the session may put to the user.
pub trait Prompter {
    /// `None` when the user dismisses the question.
    fn ask(&mut self, message: &str) -> Option<String>;

    fn confirm(&mut self, message: &str) -> bool;

    fn notify(&mut self, message: &str);

    fn choose_import_mode(&mut self, count: usize) -> Option<ImportMode> {
        let answer = self.ask(&format!(
            "Import {count} task(s): [r]eplace the current list or [m]erge into it?"
        ))?;
        match answer.trim().to_lowercase().as_str() {
            "r" | "replace" => Some(ImportMode::Replace),
            "m" | "merge" => Some(ImportMode::Merge),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add(String),
    /// Adds the text as important, or flips the priority-on-add flag when
    /// the text is blank.
    AddImportant(String),
    TogglePriority,
    ToggleComplete(TaskId),
    ToggleImportant(TaskId),
    BeginEdit(TaskId),
    CommitEdit(String),
    SetDeadline(TaskId),
    Delete(TaskId),
    ClearAll,
    ToggleFold,
    OpenSettings,
    CloseSettings,
    Export,
    Import(PathBuf),
    Refresh,
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The view should be drawn again.
    Render,
    /// Nothing visible changed.
    Unchanged,
    /// A periodic refresh was held back by an active edit.
    Skipped,
    Quit,
}

pub struct Session<S, P> {
    store: TaskStore<S>,
    prompter: P,
    editing: Option<TaskId>,
    important_next: bool,
    settings_open: bool,
    export_dir: PathBuf,
}

impl<S: KeyValueStore, P: Prompter> Session<S, P> {
    pub fn new(store: TaskStore<S>, prompter: P, export_dir: PathBuf) -> Self {
        Self {
            store,
            prompter,
            editing: None,
            important_next: false,
            settings_open: false,
            export_dir,
        }
    }

    pub fn store(&self) -> &TaskStore<S> {
        &self.store
    }

    pub fn prompter(&self) -> &P {
        &self.prompter
    }

    pub fn prompter_mut(&mut self) -> &mut P {
        &mut self.prompter
    }

    pub fn editing(&self) -> Option<TaskId> {
        self.editing
    }

    pub fn important_next(&self) -> bool {
        self.important_next
    }

    pub fn settings_open(&self) -> bool {
        self.settings_open
    }

    pub fn export_dir(&self) -> &PathBuf {
        &self.export_dir
    }

    pub fn view(&self, now: DateTime<Local>) -> ListView {
        view::project(&self.store, now.with_timezone(&Utc))
    }

    #[instrument(skip(self, now))]
    pub fn handle(&mut self, command: Command, now: DateTime<Local>) -> Outcome {
        if let Some(id) = self.editing {
            match &command {
                Command::CommitEdit(_) => {}
                Command::Refresh => {
                    debug!(%id, "refresh held back during edit");
                    return Outcome::Skipped;
                }
                Command::ToggleComplete(target) if *target == id => {
                    debug!(%id, "toggle ignored while editing");
                    return Outcome::Unchanged;
                }
                _ => {
                    debug!(%id, "edit abandoned");
                    self.editing = None;
                }
            }
        }

        match self.dispatch(command, now) {
            Ok(outcome) => outcome,
            Err(err) if err.is_validation() => {
                warn!(error = %err, "command rejected");
                self.prompter.notify(&err.to_string());
                Outcome::Render
            }
            Err(err) => {
                error!(error = %err, "command failed");
                self.prompter.notify(&format!("Could not save changes: {err}"));
                Outcome::Render
            }
        }
    }

    fn dispatch(&mut self, command: Command, now: DateTime<Local>) -> Result<Outcome, StoreError> {
        match command {
            Command::Add(text) => self.add(&text, now),
            Command::AddImportant(text) => {
                if text.trim().is_empty() {
                    self.important_next = !self.important_next;
                    Ok(Outcome::Render)
                } else {
                    self.important_next = true;
                    self.add(&text, now)
                }
            }
            Command::TogglePriority => {
                self.important_next = !self.important_next;
                Ok(Outcome::Render)
            }
            Command::ToggleComplete(id) => {
                self.store.toggle_complete(id)?;
                Ok(Outcome::Render)
            }
            Command::ToggleImportant(id) => {
                self.store.toggle_important(id)?;
                Ok(Outcome::Render)
            }
            Command::BeginEdit(id) => {
                if self.store.get(id).is_none() {
                    return Err(StoreError::UnknownTask(id));
                }
                self.editing = Some(id);
                Ok(Outcome::Render)
            }
            Command::CommitEdit(text) => {
                let Some(id) = self.editing.take() else {
                    return Ok(Outcome::Unchanged);
                };
                let applied = self.store.set_text(id, &text)?;
                debug!(%id, applied, "edit committed");
                Ok(Outcome::Render)
            }
            Command::SetDeadline(id) => self.set_deadline(id, now),
            Command::Delete(id) => {
                self.store.remove(id)?;
                Ok(Outcome::Render)
            }
            Command::ClearAll => {
                if self.store.is_empty() {
                    return Ok(Outcome::Unchanged);
                }
                if !self.prompter.confirm("Remove all tasks?") {
                    return Ok(Outcome::Unchanged);
                }
                self.store.clear_all()?;
                Ok(Outcome::Render)
            }
            Command::ToggleFold => {
                self.store.toggle_folded()?;
                Ok(Outcome::Render)
            }
            Command::OpenSettings => {
                self.settings_open = true;
                Ok(Outcome::Render)
            }
            Command::CloseSettings => {
                self.settings_open = false;
                Ok(Outcome::Render)
            }
            Command::Export => {
                self.export(now);
                Ok(Outcome::Render)
            }
            Command::Import(path) => self.import(path),
            Command::Refresh => Ok(Outcome::Render),
            Command::Help => Ok(Outcome::Unchanged),
            Command::Quit => Ok(Outcome::Quit),
        }
    }

    fn add(&mut self, text: &str, now: DateTime<Local>) -> Result<Outcome, StoreError> {
        match self.store.add(text, self.important_next, now)? {
            Some(id) => {
                info!(%id, important = self.important_next, "task added");
                self.important_next = false;
                Ok(Outcome::Render)
            }
            None => Ok(Outcome::Unchanged),
        }
    }

    fn set_deadline(&mut self, id: TaskId, now: DateTime<Local>) -> Result<Outcome, StoreError> {
        if self.store.get(id).is_none() {
            return Err(StoreError::UnknownTask(id));
        }
        let Some(raw) = self.prompter.ask(deadline::INPUT_HINT) else {
            return Ok(Outcome::Unchanged);
        };
        match parse_duration_input(&raw) {
            Ok(minutes) => {
                self.store.set_deadline(id, Some(minutes), now)?;
                Ok(Outcome::Render)
            }
            Err(err) => {
                warn!(input = %raw, error = %err, "deadline input rejected");
                self.prompter.notify(&format!("Invalid deadline: {err}"));
                Ok(Outcome::Unchanged)
            }
        }
    }

    fn export(&mut self, now: DateTime<Local>) {
        let tasks = self.store.tasks();
        match transfer::write_export(&self.export_dir, &tasks, now.date_naive()) {
            Ok(path) => {
                self.prompter
                    .notify(&format!("Exported {} task(s) to {}", tasks.len(), path.display()));
            }
            Err(err) => {
                error!(error = %err, "export failed");
                self.prompter.notify(&format!("Export failed: {err:#}"));
            }
        }
        self.settings_open = false;
    }

    fn import(&mut self, path: PathBuf) -> Result<Outcome, StoreError> {
        self.settings_open = false;

        let raw = match transfer::read_import(&path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "import file unreadable");
                self.prompter.notify(&format!("Could not read file: {err:#}"));
                return Ok(Outcome::Render);
            }
        };
        let records = match transfer::parse_import(&raw) {
            Ok(records) => records,
            Err(err) => {
                warn!(file = %path.display(), error = %err, "import rejected");
                self.prompter.notify(&format!("Invalid file format: {err}"));
                return Ok(Outcome::Render);
            }
        };

        let count = match self.prompter.choose_import_mode(records.len()) {
            Some(ImportMode::Replace) => self.store.replace_all(records)?,
            Some(ImportMode::Merge) => self.store.merge_all(records)?,
            None => {
                debug!("import cancelled");
                return Ok(Outcome::Render);
            }
        };
        self.prompter.notify(&format!("Imported {count} task(s)"));
        Ok(Outcome::Render)
    }
}
