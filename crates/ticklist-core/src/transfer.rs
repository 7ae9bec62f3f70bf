use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::storage::write_atomic;
use crate::task::Task;

const EXPORT_PREFIX: &str = "todo-list-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    Replace,
    Merge,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("file is not valid JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("expected a list of tasks")]
    NotAnArray,

    #[error("file contains no tasks")]
    Empty,

    #[error("task #{} is malformed: {reason}", .index + 1)]
    Malformed { index: usize, reason: String },
}

pub fn export_file_name(date: NaiveDate) -> String {
    format!("{EXPORT_PREFIX}{}.json", date.format("%Y-%m-%d"))
}

/// Pretty-printed payload used for backups.
pub fn export_json(tasks: &[Task]) -> anyhow::Result<String> {
    serde_json::to_string_pretty(tasks).context("failed to serialize export")
}

#[tracing::instrument(skip(tasks), fields(count = tasks.len()))]
pub fn write_export(dir: &Path, tasks: &[Task], date: NaiveDate) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(export_file_name(date));
    let payload = export_json(tasks)?;
    write_atomic(&path, &payload).with_context(|| format!("failed writing {}", path.display()))?;

    info!(file = %path.display(), "exported tasks");
    Ok(path)
}

/// Accepts only a non-empty array whose every entry is a well-formed task.
pub fn parse_import(raw: &str) -> Result<Vec<Task>, ImportError> {
    let value: Value = serde_json::from_str(raw.trim())?;
    let Value::Array(items) = value else {
        return Err(ImportError::NotAnArray);
    };
    if items.is_empty() {
        return Err(ImportError::Empty);
    }

    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let task: Task = serde_json::from_value(item).map_err(|err| ImportError::Malformed {
            index,
            reason: err.to_string(),
        })?;
        task.check().map_err(|reason| ImportError::Malformed {
            index,
            reason: reason.to_string(),
        })?;
        out.push(task);
    }

    debug!(count = out.len(), "parsed import payload");
    Ok(out)
}

pub fn read_import(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))
}
