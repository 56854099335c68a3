use crate::domain::{BoardId, ListId, TaskId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TableroError>;

#[derive(Debug, Error)]
pub enum TableroError {
    #[error("Board not found: {0}")]
    BoardNotFound(BoardId),

    #[error("List not found: {0}")]
    ListNotFound(ListId),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Invalid move target: {0}")]
    InvalidTarget(String),

    #[error("Serialization conflict on ordered collection scope")]
    Contention,

    #[error("Deadline elapsed before the operation could commit")]
    DeadlineExceeded,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl TableroError {
    /// Whether the failure is transient and worth another attempt.
    ///
    /// Only scope contention qualifies; validation and not-found failures
    /// surface immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention)
    }
}
