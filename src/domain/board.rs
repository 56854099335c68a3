use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoardId(Uuid);

impl BoardId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BoardId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user, owned by the surrounding application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A kanban board: the parent scope for an ordered collection of lists.
///
/// The owner is never also a member; membership mutations keep that
/// invariant rather than the reordering paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub id: BoardId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub owner: UserId,
    #[serde(default)]
    pub members: Vec<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Board {
    /// Creates a board owned by `owner`. Any occurrence of the owner in
    /// `members` is dropped.
    pub fn new(owner: UserId, name: String, description: String, members: Vec<UserId>) -> Self {
        let now = Utc::now();
        let mut board = Self {
            id: BoardId::new(),
            name,
            description,
            owner,
            members: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        for member in members {
            board.add_member(member);
        }
        board
    }

    /// Adds a member. The owner and existing members are skipped; returns
    /// whether the member was actually added.
    pub fn add_member(&mut self, user: UserId) -> bool {
        if user == self.owner || self.members.contains(&user) {
            return false;
        }
        self.members.push(user);
        self.updated_at = Utc::now();
        true
    }

    /// Removes a member; returns whether the member was present.
    pub fn remove_member(&mut self, user: UserId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| *m != user);
        let removed = self.members.len() != before;
        if removed {
            self.updated_at = Utc::now();
        }
        removed
    }

    /// Whether `user` may view or modify the board (owner or member).
    pub fn is_accessible_by(&self, user: UserId) -> bool {
        self.owner == user || self.members.contains(&user)
    }

    pub fn set_name(&mut self, name: String) {
        self.name = name;
        self.updated_at = Utc::now();
    }
}
