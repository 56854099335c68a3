use crate::domain::BoardId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a task list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListId(Uuid);

impl ListId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ListId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered column of tasks within a board.
///
/// `position` is unique and dense among the lists of the same board:
/// the n lists of a board always hold positions 0..n-1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskList {
    pub id: ListId,
    pub name: String,
    pub board: BoardId,
    pub position: u32,
    pub created_at: DateTime<Utc>,
}

impl TaskList {
    pub fn new(board: BoardId, name: String, position: u32) -> Self {
        Self {
            id: ListId::new(),
            name,
            board,
            position,
            created_at: Utc::now(),
        }
    }

    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }
}
