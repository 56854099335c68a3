use crate::{
    domain::{Board, BoardId, ListId, Task, TaskId, TaskList},
    error::Result,
};
use async_trait::async_trait;

pub mod memory;

/// A parent scope within which position uniqueness and density are enforced:
/// a board (parent of lists) or a list (parent of tasks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParentId {
    Board(BoardId),
    List(ListId),
}

/// A positioned child entity of a parent scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildId {
    List(ListId),
    Task(TaskId),
}

/// One row of an ordered sibling fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sibling {
    pub id: ChildId,
    pub position: u32,
}

/// The set of parents a transaction serializes over.
///
/// Parents are kept sorted ascending and deduplicated, so every transaction
/// acquires its scope locks in the same global order. Two simultaneous moves
/// exchanging tasks between the same pair of lists in opposite directions
/// therefore cannot deadlock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionScope {
    parents: Vec<ParentId>,
}

impl TransactionScope {
    pub fn new(parents: impl IntoIterator<Item = ParentId>) -> Self {
        let mut parents: Vec<ParentId> = parents.into_iter().collect();
        parents.sort_unstable();
        parents.dedup();
        Self { parents }
    }

    pub fn single(parent: ParentId) -> Self {
        Self {
            parents: vec![parent],
        }
    }

    /// The serialized parents, ascending.
    pub fn parents(&self) -> &[ParentId] {
        &self.parents
    }
}

/// Durable storage collaborator for boards, lists, and tasks.
///
/// Non-transactional reads serve entity resolution and the view layer; all
/// mutation goes through a [`StoreTransaction`] opened with [`begin`].
///
/// [`begin`]: OrderedCollectionStore::begin
#[async_trait]
pub trait OrderedCollectionStore: Send + Sync {
    /// Loads a board by id.
    async fn board(&self, id: BoardId) -> Result<Board>;

    /// Loads a list by id.
    async fn list(&self, id: ListId) -> Result<TaskList>;

    /// Loads a task by id.
    async fn task(&self, id: TaskId) -> Result<Task>;

    /// Lists of a board, ordered ascending by position.
    async fn lists_of(&self, board: BoardId) -> Result<Vec<TaskList>>;

    /// Tasks of a list, ordered ascending by position.
    async fn tasks_of(&self, list: ListId) -> Result<Vec<Task>>;

    /// Opens a transaction serialized over the parents named by `scope`.
    ///
    /// No other transaction touching any of those parents may interleave its
    /// reads and writes with this one. Transactions over disjoint parents
    /// proceed in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`TableroError::Contention`] when a scope lock cannot be
    /// acquired in time.
    ///
    /// [`TableroError::Contention`]: crate::error::TableroError::Contention
    async fn begin(&self, scope: TransactionScope) -> Result<Box<dyn StoreTransaction>>;
}

/// An open transaction against an [`OrderedCollectionStore`].
///
/// Writes become visible atomically on [`commit`]; dropping an uncommitted
/// transaction rolls every write back, so a partially applied reorder is
/// never observable.
///
/// [`commit`]: StoreTransaction::commit
#[async_trait]
pub trait StoreTransaction: Send {
    /// The authoritative sibling ordering of `parent`, ascending by position.
    ///
    /// Callers re-read through this inside the transaction rather than acting
    /// on a pre-fetched snapshot; stale positions lead straight to duplicate
    /// or missing position values.
    async fn siblings_of(&mut self, parent: ParentId) -> Result<Vec<Sibling>>;

    /// Queues a single position update for `child`.
    async fn write_position(&mut self, child: ChildId, position: u32) -> Result<()>;

    /// Queues moving `task` to `list` (cross-parent move).
    async fn reparent_task(&mut self, task: TaskId, list: ListId) -> Result<()>;

    /// Queues insertion of a new board.
    async fn insert_board(&mut self, board: Board) -> Result<()>;

    /// Queues insertion of a new list.
    async fn insert_list(&mut self, list: TaskList) -> Result<()>;

    /// Queues insertion of a new task.
    async fn insert_task(&mut self, task: Task) -> Result<()>;

    /// Queues removal of a board and everything it contains.
    async fn remove_board(&mut self, id: BoardId) -> Result<()>;

    /// Queues removal of a list and its tasks.
    async fn remove_list(&mut self, id: ListId) -> Result<()>;

    /// Queues removal of a task.
    async fn remove_task(&mut self, id: TaskId) -> Result<()>;

    /// Applies every queued write atomically and releases the scope.
    async fn commit(self: Box<Self>) -> Result<()>;
}
