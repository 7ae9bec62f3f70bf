use anyhow::Context;
use chrono::{DateTime, Duration, Local, Utc};
use tracing::{debug, info, warn};

use crate::datetime::{deadline_instant, local_stamp};
use crate::error::StoreError;
use crate::storage::KeyValueStore;
use crate::task::{Task, TaskId};

pub const TASKS_KEY: &str = "tasks";
pub const FOLD_KEY: &str = "isCompletedFolded";

#[derive(Debug, Clone)]
struct Entry {
    id: TaskId,
    task: Task,
}

impl Entry {
    fn new(task: Task) -> Self {
        Self {
            id: TaskId::new(),
            task,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub active: usize,
    pub completed: usize,
}

/// Authoritative task list. Every mutation is written to storage first
/// and only applied in memory once the write has succeeded.
#[derive(Debug)]
pub struct TaskStore<S> {
    storage: S,
    entries: Vec<Entry>,
    folded: bool,
}

impl<S: KeyValueStore> TaskStore<S> {
    #[tracing::instrument(skip(storage))]
    pub fn open(storage: S) -> Result<Self, StoreError> {
        let tasks = match storage.get(TASKS_KEY)? {
            Some(raw) if !raw.trim().is_empty() => decode_stored(&raw),
            _ => Vec::new(),
        };
        let folded = storage
            .get(FOLD_KEY)?
            .map(|raw| raw.trim() == "true")
            .unwrap_or(false);

        info!(count = tasks.len(), folded, "loaded task list");
        Ok(Self {
            storage,
            entries: tasks.into_iter().map(Entry::new).collect(),
            folded,
        })
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn folded(&self) -> bool {
        self.folded
    }

    /// Records in insertion order with their ids.
    pub fn records(&self) -> impl Iterator<Item = (TaskId, &Task)> {
        self.entries.iter().map(|entry| (entry.id, &entry.task))
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.entries.iter().map(|entry| entry.task.clone()).collect()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| &entry.task)
    }

    pub fn counts(&self) -> Counts {
        let completed = self.entries.iter().filter(|e| e.task.completed).count();
        Counts {
            active: self.entries.len() - completed,
            completed,
        }
    }

    #[tracing::instrument(skip(self, text, now))]
    pub fn add(
        &mut self,
        text: &str,
        important: bool,
        now: DateTime<Local>,
    ) -> Result<Option<TaskId>, StoreError> {
        let text = text.trim();
        if text.is_empty() {
            debug!("ignoring blank task text");
            return Ok(None);
        }

        let entry = Entry::new(Task::new(text.to_string(), important, now));
        save_tasks(
            &mut self.storage,
            self.entries
                .iter()
                .map(|e| &e.task)
                .chain(std::iter::once(&entry.task)),
        )?;

        let id = entry.id;
        self.entries.push(entry);
        debug!(%id, count = self.entries.len(), "task added");
        Ok(Some(id))
    }

    /// Returns the new `completed` value.
    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn toggle_complete(&mut self, id: TaskId) -> Result<bool, StoreError> {
        self.update(id, |task| {
            task.completed = !task.completed;
            task.completed
        })
    }

    /// Returns the new `important` value.
    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn toggle_important(&mut self, id: TaskId) -> Result<bool, StoreError> {
        self.update(id, |task| {
            task.important = !task.important;
            task.important
        })
    }

    /// Applies an edit. Blank or unchanged text is discarded and `false`
    /// is returned; the stored text stays as it was.
    #[tracing::instrument(skip(self, new_text), fields(id = %id))]
    pub fn set_text(&mut self, id: TaskId, new_text: &str) -> Result<bool, StoreError> {
        let new_text = new_text.trim();
        let current = self.get(id).ok_or(StoreError::UnknownTask(id))?;
        if new_text.is_empty() || new_text == current.text {
            debug!("edit discarded");
            return Ok(false);
        }
        self.update(id, |task| task.text = new_text.to_string())?;
        Ok(true)
    }

    /// `None` or `Some(0)` clears the deadline; any other value sets it
    /// that many minutes past `now`.
    #[tracing::instrument(skip(self, now), fields(id = %id))]
    pub fn set_deadline(
        &mut self,
        id: TaskId,
        minutes: Option<u64>,
        now: DateTime<Local>,
    ) -> Result<(), StoreError> {
        let window = match minutes {
            None | Some(0) => None,
            Some(mins) => {
                let offset = i64::try_from(mins)
                    .ok()
                    .and_then(Duration::try_minutes)
                    .ok_or(StoreError::DeadlineOutOfRange)?;
                let deadline = now
                    .with_timezone(&Utc)
                    .checked_add_signed(offset)
                    .ok_or(StoreError::DeadlineOutOfRange)?;
                Some((deadline_instant(deadline), local_stamp(now)))
            }
        };

        self.update(id, |task| match window {
            Some((deadline, set_at)) => {
                task.deadline = Some(deadline);
                task.deadline_set_at = Some(set_at);
            }
            None => task.clear_deadline(),
        })
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn remove(&mut self, id: TaskId) -> Result<Task, StoreError> {
        let idx = self.index_of(id)?;
        save_tasks(
            &mut self.storage,
            self.entries
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != idx)
                .map(|(_, e)| &e.task),
        )?;
        Ok(self.entries.remove(idx).task)
    }

    /// Returns how many records were dropped. An empty list is left
    /// alone without a write.
    #[tracing::instrument(skip(self))]
    pub fn clear_all(&mut self) -> Result<usize, StoreError> {
        if self.entries.is_empty() {
            return Ok(0);
        }
        save_tasks(&mut self.storage, std::iter::empty())?;
        let removed = self.entries.len();
        self.entries.clear();
        info!(removed, "cleared all tasks");
        Ok(removed)
    }

    #[tracing::instrument(skip(self, records), fields(count = records.len()))]
    pub fn replace_all(&mut self, records: Vec<Task>) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Err(StoreError::EmptyImport);
        }
        save_tasks(&mut self.storage, records.iter())?;
        let count = records.len();
        self.entries = records.into_iter().map(Entry::new).collect();
        info!(count, "replaced task list");
        Ok(count)
    }

    #[tracing::instrument(skip(self, records), fields(count = records.len()))]
    pub fn merge_all(&mut self, records: Vec<Task>) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Err(StoreError::EmptyImport);
        }
        save_tasks(
            &mut self.storage,
            self.entries.iter().map(|e| &e.task).chain(records.iter()),
        )?;
        let count = records.len();
        self.entries.extend(records.into_iter().map(Entry::new));
        info!(count, total = self.entries.len(), "merged imported tasks");
        Ok(count)
    }

    #[tracing::instrument(skip(self))]
    pub fn set_folded(&mut self, folded: bool) -> Result<(), StoreError> {
        let raw = if folded { "true" } else { "false" };
        self.storage
            .set(FOLD_KEY, raw)
            .context("failed to save fold state")?;
        self.folded = folded;
        Ok(())
    }

    /// Returns the new fold state.
    pub fn toggle_folded(&mut self) -> Result<bool, StoreError> {
        let folded = !self.folded;
        self.set_folded(folded)?;
        Ok(folded)
    }

    fn index_of(&self, id: TaskId) -> Result<usize, StoreError> {
        self.entries
            .iter()
            .position(|entry| entry.id == id)
            .ok_or(StoreError::UnknownTask(id))
    }

    /// Edits a copy of one record, saves the list with the copy in place,
    /// then swaps it in.
    fn update<R>(&mut self, id: TaskId, edit: impl FnOnce(&mut Task) -> R) -> Result<R, StoreError> {
        let idx = self.index_of(id)?;
        let mut task = self.entries[idx].task.clone();
        let out = edit(&mut task);

        save_tasks(
            &mut self.storage,
            self.entries
                .iter()
                .enumerate()
                .map(|(i, e)| if i == idx { &task } else { &e.task }),
        )?;
        self.entries[idx].task = task;
        Ok(out)
    }
}

fn save_tasks<'a, S, I>(storage: &mut S, tasks: I) -> Result<(), StoreError>
where
    S: KeyValueStore,
    I: IntoIterator<Item = &'a Task>,
{
    let tasks: Vec<&Task> = tasks.into_iter().collect();
    let raw = serde_json::to_string(&tasks).context("failed to serialize task list")?;
    storage
        .set(TASKS_KEY, &raw)
        .context("failed to save task list")?;
    Ok(())
}

/// Unparsable payloads load as an empty list; records that break the
/// record invariants are dropped one by one.
fn decode_stored(raw: &str) -> Vec<Task> {
    let tasks = match serde_json::from_str::<Vec<Task>>(raw) {
        Ok(tasks) => tasks,
        Err(err) => {
            warn!(error = %err, "stored task list is unreadable, starting empty");
            return Vec::new();
        }
    };

    tasks
        .into_iter()
        .enumerate()
        .filter_map(|(index, task)| match task.check() {
            Ok(()) => Some(task),
            Err(reason) => {
                warn!(index, reason, "dropping invalid stored task");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use std::cell::Cell;
    use std::rc::Rc;

    use anyhow::bail;

    use super::*;
    use crate::storage::MemoryStore;

    /// Memory storage whose writes start failing once `broken` is set.
    struct BrittleStore {
        inner: MemoryStore,
        broken: Rc<Cell<bool>>,
    }

    impl KeyValueStore for BrittleStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
            if self.broken.get() {
                bail!("disk full");
            }
            self.inner.set(key, value)
        }
    }

    fn now() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 6, 1, 9, 30, 0)
            .single()
            .expect("valid local time")
    }

    fn open() -> TaskStore<MemoryStore> {
        TaskStore::open(MemoryStore::new()).expect("open store")
    }

    #[test]
    fn add_appends_fresh_record() {
        let mut store = open();
        let id = store
            .add("  Buy milk  ", false, now())
            .expect("add")
            .expect("task created");

        assert_eq!(store.len(), 1);
        let task = store.get(id).expect("stored task");
        assert_eq!(task.text, "Buy milk");
        assert!(!task.completed);
        assert!(task.deadline.is_none());
        assert!(task.deadline_set_at.is_none());
        assert_eq!(task.created_at, local_stamp(now()));
    }

    #[test]
    fn blank_add_is_a_no_op() {
        let mut store = open();
        assert_eq!(store.add("", false, now()).expect("add"), None);
        assert_eq!(store.add("   ", true, now()).expect("add"), None);
        assert!(store.is_empty());
        assert_eq!(store.into_storage().writes(), 0);
    }

    #[test]
    fn toggles_flip_back() {
        let mut store = open();
        let id = store.add("a", false, now()).expect("add").expect("created");

        assert!(store.toggle_complete(id).expect("toggle"));
        assert!(!store.toggle_complete(id).expect("toggle"));
        assert!(store.toggle_important(id).expect("toggle"));
        assert!(store.get(id).expect("task").important);
    }

    #[test]
    fn blank_or_same_edit_keeps_text() {
        let mut store = open();
        let id = store.add("draft", false, now()).expect("add").expect("created");

        assert!(!store.set_text(id, "").expect("edit"));
        assert!(!store.set_text(id, "  draft ").expect("edit"));
        assert_eq!(store.get(id).expect("task").text, "draft");

        assert!(store.set_text(id, " final ").expect("edit"));
        assert_eq!(store.get(id).expect("task").text, "final");
    }

    #[test]
    fn deadline_sets_and_clears_as_a_pair() {
        let mut store = open();
        let id = store.add("report", false, now()).expect("add").expect("created");

        store.set_deadline(id, Some(90), now()).expect("set deadline");
        let task = store.get(id).expect("task");
        assert_eq!(
            task.deadline,
            Some(now().with_timezone(&Utc) + Duration::minutes(90))
        );
        assert_eq!(task.deadline_set_at, Some(local_stamp(now())));

        store.set_deadline(id, Some(0), now()).expect("clear");
        let task = store.get(id).expect("task");
        assert!(task.deadline.is_none() && task.deadline_set_at.is_none());

        store.set_deadline(id, Some(5), now()).expect("set deadline");
        store.set_deadline(id, None, now()).expect("clear");
        let task = store.get(id).expect("task");
        assert!(task.deadline.is_none() && task.deadline_set_at.is_none());
    }

    #[test]
    fn unknown_id_is_rejected() {
        let mut store = open();
        store.add("a", false, now()).expect("add");
        let stranger = TaskId::new();

        assert!(matches!(
            store.toggle_complete(stranger),
            Err(StoreError::UnknownTask(id)) if id == stranger
        ));
        assert!(store.remove(stranger).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_and_clear() {
        let mut store = open();
        let a = store.add("a", false, now()).expect("add").expect("created");
        store.add("b", false, now()).expect("add");

        assert_eq!(store.remove(a).expect("remove").text, "a");
        assert_eq!(store.len(), 1);
        assert_eq!(store.clear_all().expect("clear"), 1);
        assert!(store.is_empty());

        let storage = store.into_storage();
        let writes = storage.writes();
        let mut store = TaskStore::open(storage).expect("reopen");
        assert_eq!(store.clear_all().expect("clear"), 0);
        assert_eq!(store.into_storage().writes(), writes);
    }

    #[test]
    fn import_replace_and_merge() {
        let mut store = open();
        store.add("keep", false, now()).expect("add");
        let incoming = vec![
            Task::new("one".to_string(), false, now()),
            Task::new("two".to_string(), true, now()),
        ];

        assert!(matches!(store.merge_all(vec![]), Err(StoreError::EmptyImport)));
        assert!(matches!(store.replace_all(vec![]), Err(StoreError::EmptyImport)));
        assert_eq!(store.len(), 1);

        store.merge_all(incoming.clone()).expect("merge");
        let texts: Vec<_> = store.records().map(|(_, t)| t.text.clone()).collect();
        assert_eq!(texts, ["keep", "one", "two"]);

        store.replace_all(incoming.clone()).expect("replace");
        assert_eq!(store.tasks(), incoming);
    }

    #[test]
    fn state_survives_reopen() {
        let mut store = open();
        let id = store.add("persist me", true, now()).expect("add").expect("created");
        store.set_deadline(id, Some(60), now()).expect("deadline");
        store.toggle_folded().expect("fold");
        let before = store.tasks();

        let reopened = TaskStore::open(store.into_storage()).expect("reopen");
        assert_eq!(reopened.tasks(), before);
        assert!(reopened.folded());
    }

    #[test]
    fn unreadable_payload_loads_empty() {
        let mut storage = MemoryStore::new();
        storage.set(TASKS_KEY, "{not json").expect("set");
        let store = TaskStore::open(storage).expect("open");
        assert!(store.is_empty());
    }

    #[test]
    fn invalid_stored_records_are_dropped() {
        let mut storage = MemoryStore::new();
        storage
            .set(
                TASKS_KEY,
                r#"[
                  {"text":"   ","completed":false,"createdAt":"2024-05-01 08:00:00"},
                  {"text":"lone","completed":false,"createdAt":"2024-05-01 08:00:00","deadline":"2024-05-02T08:00:00.000Z"},
                  {"text":"fine","completed":true,"createdAt":"2024-05-01 08:00:00"}
                ]"#,
            )
            .expect("set");

        let store = TaskStore::open(storage).expect("open");
        let texts: Vec<_> = store.records().map(|(_, t)| t.text.clone()).collect();
        assert_eq!(texts, ["fine"]);
        assert!(store.records().all(|(_, t)| t.check().is_ok()));
    }

    #[test]
    fn failed_write_leaves_memory_untouched() {
        let broken = Rc::new(Cell::new(false));
        let storage = BrittleStore {
            inner: MemoryStore::new(),
            broken: Rc::clone(&broken),
        };
        let mut store = TaskStore::open(storage).expect("open");
        let id = store.add("a", false, now()).expect("add").expect("created");
        let before = store.tasks();

        broken.set(true);
        assert!(matches!(store.toggle_complete(id), Err(StoreError::Storage(_))));
        assert!(store.toggle_important(id).is_err());
        assert!(store.set_text(id, "renamed").is_err());
        assert!(store.set_deadline(id, Some(30), now()).is_err());
        assert!(store.add("b", false, now()).is_err());
        assert!(store.remove(id).is_err());
        assert!(store.clear_all().is_err());
        assert!(store.merge_all(before.clone()).is_err());
        assert!(store.replace_all(vec![Task::new("x".to_string(), false, now())]).is_err());
        assert!(store.toggle_folded().is_err());

        assert_eq!(store.tasks(), before);
        assert!(!store.folded());

        broken.set(false);
        assert!(store.toggle_complete(id).expect("toggle"));
        let reopened = TaskStore::open(store.into_storage()).expect("reopen");
        assert_eq!(reopened.len(), 1);
        assert!(reopened.tasks()[0].completed);
    }

    #[test]
    fn counts_split_by_completion() {
        let mut store = open();
        let a = store.add("a", false, now()).expect("add").expect("created");
        store.add("b", false, now()).expect("add");
        store.toggle_complete(a).expect("toggle");

        assert_eq!(store.counts(), Counts { active: 1, completed: 1 });
    }
}
