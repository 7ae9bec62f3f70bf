use thiserror::Error;

use crate::task::TaskId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no task with id {0}")]
    UnknownTask(TaskId),

    #[error("import contains no tasks")]
    EmptyImport,

    #[error("deadline is out of range")]
    DeadlineOutOfRange,

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl StoreError {
    /// Validation failures leave state untouched and are safe to report
    /// as a plain notice.
    pub fn is_validation(&self) -> bool {
        !matches!(self, StoreError::Storage(_))
    }
}
