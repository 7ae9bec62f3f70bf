use std::fmt;

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::{deadline_serde, local_stamp, stamp_serde, stamp_to_utc};

/// In-memory identity of a stored record. Never serialized; assigned
/// whenever a record enters the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub text: String,

    pub completed: bool,

    #[serde(default)]
    pub important: bool,

    #[serde(with = "stamp_serde")]
    pub created_at: NaiveDateTime,

    #[serde(default, with = "deadline_serde::option")]
    pub deadline: Option<DateTime<Utc>>,

    #[serde(default, with = "stamp_serde::option")]
    pub deadline_set_at: Option<NaiveDateTime>,
}

impl Task {
    pub fn new(text: String, important: bool, now: DateTime<Local>) -> Self {
        Self {
            text,
            completed: false,
            important,
            created_at: local_stamp(now),
            deadline: None,
            deadline_set_at: None,
        }
    }

    pub fn has_deadline(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn clear_deadline(&mut self) {
        self.deadline = None;
        self.deadline_set_at = None;
    }

    /// Instant the deadline window opened, if it can be resolved.
    pub fn deadline_set_instant(&self) -> Option<DateTime<Utc>> {
        self.deadline_set_at.and_then(stamp_to_utc)
    }

    /// Checks the record-level invariants: non-blank text and a deadline
    /// that always travels with the time it was set.
    pub fn check(&self) -> Result<(), &'static str> {
        if self.text.trim().is_empty() {
            return Err("text is empty");
        }
        match (self.deadline.is_some(), self.deadline_set_at.is_some()) {
            (true, false) => Err("deadline without deadlineSetAt"),
            (false, true) => Err("deadlineSetAt without deadline"),
            _ => Ok(()),
        }
    }
}
