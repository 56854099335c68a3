use crate::domain::{ListId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

/// A task card within a list.
///
/// `position` is unique and dense among the tasks of the same list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub list: ListId,
    pub position: u32,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<UserId>,
    /// Comma-separated labels, split on demand by [`Task::labels_list`].
    #[serde(default)]
    pub labels: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a new task at the given position within `list`.
    pub fn new(list: ListId, title: String, position: u32) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            title,
            description: String::new(),
            list,
            position,
            priority: Priority::default(),
            completed: false,
            due_date: None,
            assigned_to: None,
            labels: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_title(&mut self, title: String) {
        self.title = title;
        self.updated_at = Utc::now();
    }

    pub fn set_description(&mut self, description: String) {
        self.description = description;
        self.updated_at = Utc::now();
    }

    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
        self.updated_at = Utc::now();
    }

    pub fn assign_to(&mut self, user: Option<UserId>) {
        self.assigned_to = user;
        self.updated_at = Utc::now();
    }

    /// Flips the completion flag and returns the new value.
    pub fn toggle_completed(&mut self) -> bool {
        self.completed = !self.completed;
        self.updated_at = Utc::now();
        self.completed
    }

    /// Whether the due date has passed for a task that is still open.
    pub fn is_overdue(&self) -> bool {
        match self.due_date {
            Some(due) => due < Utc::now().date_naive() && !self.completed,
            None => false,
        }
    }

    /// Labels as a list, trimming whitespace and dropping empty entries.
    pub fn labels_list(&self) -> Vec<&str> {
        self.labels
            .split(',')
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .collect()
    }
}
