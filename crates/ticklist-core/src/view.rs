//! Projection of the store into what the user sees: two groups, each
//! ordered important-first, plus the counter line. Rebuilt from scratch
//! on every render.

use chrono::{DateTime, Utc};

use crate::datetime::format_stamp;
use crate::deadline::{ProgressState, format_remaining, progress_percent, progress_state, remaining_minutes};
use crate::storage::KeyValueStore;
use crate::store::{Counts, TaskStore};
use crate::task::{Task, TaskId};

pub const EMPTY_PLACEHOLDER: &str = "No tasks yet, add one";
pub const ACTIVE_TITLE: &str = "Active";
pub const COMPLETED_TITLE: &str = "Completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub percent: u8,
    pub state: ProgressState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    /// 1-based position among visible items.
    pub position: usize,
    pub id: TaskId,
    pub text: String,
    pub completed: bool,
    pub important: bool,
    pub progress: Option<Progress>,
    pub remaining: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    Placeholder,
    Header { group: Group, folded: Option<bool> },
    Item(ItemView),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListView {
    pub rows: Vec<Row>,
    pub counter: String,
}

impl ListView {
    pub fn items(&self) -> impl Iterator<Item = &ItemView> {
        self.rows.iter().filter_map(|row| match row {
            Row::Item(item) => Some(item),
            _ => None,
        })
    }

    /// Resolves a displayed position back to the record it shows.
    pub fn id_at(&self, position: usize) -> Option<TaskId> {
        self.items()
            .find(|item| item.position == position)
            .map(|item| item.id)
    }
}

pub fn project<S: KeyValueStore>(store: &TaskStore<S>, now: DateTime<Utc>) -> ListView {
    let counts = store.counts();
    if store.is_empty() {
        return ListView {
            rows: vec![Row::Placeholder],
            counter: counter_line(counts),
        };
    }

    let (mut active, mut completed): (Vec<_>, Vec<_>) =
        store.records().partition(|(_, task)| !task.completed);

    // sort_by_key is stable, so equal-importance tasks keep insertion order
    active.sort_by_key(|(_, task)| !task.important);
    completed.sort_by_key(|(_, task)| !task.important);

    let mut rows = Vec::new();
    let mut position = 0;

    if !active.is_empty() {
        rows.push(Row::Header {
            group: Group::Active,
            folded: None,
        });
        for (id, task) in active {
            position += 1;
            rows.push(Row::Item(item_view(position, id, task, now)));
        }
    }

    if !completed.is_empty() {
        let folded = store.folded();
        rows.push(Row::Header {
            group: Group::Completed,
            folded: Some(folded),
        });
        if !folded {
            for (id, task) in completed {
                position += 1;
                rows.push(Row::Item(item_view(position, id, task, now)));
            }
        }
    }

    ListView {
        rows,
        counter: counter_line(counts),
    }
}

fn item_view(position: usize, id: TaskId, task: &Task, now: DateTime<Utc>) -> ItemView {
    let progress = if task.has_deadline() && !task.completed {
        let percent = progress_percent(task.deadline, task.deadline_set_instant(), now);
        Some(Progress {
            percent,
            state: progress_state(percent),
        })
    } else {
        None
    };

    ItemView {
        position,
        id,
        text: task.text.clone(),
        completed: task.completed,
        important: task.important,
        progress,
        remaining: task
            .deadline
            .map(|deadline| format_remaining(remaining_minutes(deadline, now))),
        created_at: format_stamp(task.created_at),
    }
}

pub fn counter_line(counts: Counts) -> String {
    let mut parts = Vec::new();
    if counts.active > 0 {
        parts.push(format!("active {}", counts.active));
    }
    if counts.completed > 0 {
        parts.push(format!("completed {}", counts.completed));
    }
    if parts.is_empty() {
        "0 tasks".to_string()
    } else {
        parts.join(", ")
    }
}
