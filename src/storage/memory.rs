//! In-memory implementation of the ordered collection store.
//!
//! Thread-safe and fully transactional, suitable for tests and for embedding
//! the engine without a database. Durable backends live with the surrounding
//! application; they implement the same traits.

use crate::{
    domain::{Board, BoardId, ListId, Task, TaskId, TaskList},
    error::{Result, TableroError},
    storage::{
        ChildId, OrderedCollectionStore, ParentId, Sibling, StoreTransaction, TransactionScope,
    },
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;

#[derive(Default)]
struct State {
    boards: HashMap<BoardId, Board>,
    lists: HashMap<ListId, TaskList>,
    tasks: HashMap<TaskId, Task>,
}

impl State {
    fn lists_of(&self, board: BoardId) -> Vec<TaskList> {
        let mut lists: Vec<TaskList> = self
            .lists
            .values()
            .filter(|list| list.board == board)
            .cloned()
            .collect();
        lists.sort_by_key(|list| list.position);
        lists
    }

    fn tasks_of(&self, list: ListId) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .values()
            .filter(|task| task.list == list)
            .cloned()
            .collect();
        tasks.sort_by_key(|task| task.position);
        tasks
    }
}

struct StoreInner {
    state: RwLock<State>,
    scope_locks: StdMutex<HashMap<ParentId, Arc<AsyncMutex<()>>>>,
    acquire_timeout: Duration,
}

/// In-memory [`OrderedCollectionStore`].
///
/// Each parent scope is backed by an async lock; [`begin`] acquires the locks
/// of the requested scope in its (ascending) order, bounded by the acquisition
/// timeout. Writes queue inside the transaction and apply atomically on
/// commit, so readers never observe a half-applied reorder.
///
/// [`begin`]: OrderedCollectionStore::begin
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(50);

    pub fn new() -> Self {
        Self::with_acquire_timeout(Self::DEFAULT_ACQUIRE_TIMEOUT)
    }

    /// Creates a store whose scope-lock acquisition gives up after `timeout`,
    /// surfacing the wait as contention.
    pub fn with_acquire_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(State::default()),
                scope_locks: StdMutex::new(HashMap::new()),
                acquire_timeout: timeout,
            }),
        }
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, State>> {
        self.inner
            .state
            .read()
            .map_err(|e| TableroError::StoreUnavailable(format!("state lock poisoned: {e}")))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderedCollectionStore for MemoryStore {
    async fn board(&self, id: BoardId) -> Result<Board> {
        self.read_state()?
            .boards
            .get(&id)
            .cloned()
            .ok_or(TableroError::BoardNotFound(id))
    }

    async fn list(&self, id: ListId) -> Result<TaskList> {
        self.read_state()?
            .lists
            .get(&id)
            .cloned()
            .ok_or(TableroError::ListNotFound(id))
    }

    async fn task(&self, id: TaskId) -> Result<Task> {
        self.read_state()?
            .tasks
            .get(&id)
            .cloned()
            .ok_or(TableroError::TaskNotFound(id))
    }

    async fn lists_of(&self, board: BoardId) -> Result<Vec<TaskList>> {
        let state = self.read_state()?;
        if !state.boards.contains_key(&board) {
            return Err(TableroError::BoardNotFound(board));
        }
        Ok(state.lists_of(board))
    }

    async fn tasks_of(&self, list: ListId) -> Result<Vec<Task>> {
        let state = self.read_state()?;
        if !state.lists.contains_key(&list) {
            return Err(TableroError::ListNotFound(list));
        }
        Ok(state.tasks_of(list))
    }

    async fn begin(&self, scope: TransactionScope) -> Result<Box<dyn StoreTransaction>> {
        let locks: Vec<Arc<AsyncMutex<()>>> = {
            let mut registry = self
                .inner
                .scope_locks
                .lock()
                .map_err(|e| TableroError::StoreUnavailable(format!("scope registry poisoned: {e}")))?;
            scope
                .parents()
                .iter()
                .map(|parent| Arc::clone(registry.entry(*parent).or_default()))
                .collect()
        };

        // Scope locks are acquired strictly in the scope's ascending parent
        // order; a lock that stays busy past the acquisition timeout is
        // reported as contention for the caller's retry policy.
        let mut guards = Vec::with_capacity(locks.len());
        for lock in locks {
            match timeout(self.inner.acquire_timeout, lock.lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => return Err(TableroError::Contention),
            }
        }

        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            _guards: guards,
            pending: Vec::new(),
        }))
    }
}

enum PendingWrite {
    ListPosition(ListId, u32),
    TaskPosition(TaskId, u32),
    TaskParent(TaskId, ListId),
    InsertBoard(Board),
    InsertList(TaskList),
    InsertTask(Task),
    RemoveBoard(BoardId),
    RemoveList(ListId),
    RemoveTask(TaskId),
}

/// A scope-holding transaction over [`MemoryStore`].
///
/// Reads reflect the last committed state; queued writes become visible only
/// at commit. Dropping the transaction releases the scope without applying
/// anything.
struct MemoryTransaction {
    inner: Arc<StoreInner>,
    _guards: Vec<tokio::sync::OwnedMutexGuard<()>>,
    pending: Vec<PendingWrite>,
}

impl MemoryTransaction {
    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, State>> {
        self.inner
            .state
            .read()
            .map_err(|e| TableroError::StoreUnavailable(format!("state lock poisoned: {e}")))
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn siblings_of(&mut self, parent: ParentId) -> Result<Vec<Sibling>> {
        let state = self.read_state()?;
        match parent {
            ParentId::Board(board) => {
                if !state.boards.contains_key(&board) {
                    return Err(TableroError::BoardNotFound(board));
                }
                Ok(state
                    .lists_of(board)
                    .iter()
                    .map(|list| Sibling {
                        id: ChildId::List(list.id),
                        position: list.position,
                    })
                    .collect())
            }
            ParentId::List(list) => {
                if !state.lists.contains_key(&list) {
                    return Err(TableroError::ListNotFound(list));
                }
                Ok(state
                    .tasks_of(list)
                    .iter()
                    .map(|task| Sibling {
                        id: ChildId::Task(task.id),
                        position: task.position,
                    })
                    .collect())
            }
        }
    }

    async fn write_position(&mut self, child: ChildId, position: u32) -> Result<()> {
        let state = self.read_state()?;
        match child {
            ChildId::List(id) => {
                if !state.lists.contains_key(&id) {
                    return Err(TableroError::ListNotFound(id));
                }
                drop(state);
                self.pending.push(PendingWrite::ListPosition(id, position));
            }
            ChildId::Task(id) => {
                if !state.tasks.contains_key(&id) {
                    return Err(TableroError::TaskNotFound(id));
                }
                drop(state);
                self.pending.push(PendingWrite::TaskPosition(id, position));
            }
        }
        Ok(())
    }

    async fn reparent_task(&mut self, task: TaskId, list: ListId) -> Result<()> {
        let state = self.read_state()?;
        if !state.tasks.contains_key(&task) {
            return Err(TableroError::TaskNotFound(task));
        }
        if !state.lists.contains_key(&list) {
            return Err(TableroError::ListNotFound(list));
        }
        drop(state);
        self.pending.push(PendingWrite::TaskParent(task, list));
        Ok(())
    }

    async fn insert_board(&mut self, board: Board) -> Result<()> {
        self.pending.push(PendingWrite::InsertBoard(board));
        Ok(())
    }

    async fn insert_list(&mut self, list: TaskList) -> Result<()> {
        self.pending.push(PendingWrite::InsertList(list));
        Ok(())
    }

    async fn insert_task(&mut self, task: Task) -> Result<()> {
        self.pending.push(PendingWrite::InsertTask(task));
        Ok(())
    }

    async fn remove_board(&mut self, id: BoardId) -> Result<()> {
        self.pending.push(PendingWrite::RemoveBoard(id));
        Ok(())
    }

    async fn remove_list(&mut self, id: ListId) -> Result<()> {
        self.pending.push(PendingWrite::RemoveList(id));
        Ok(())
    }

    async fn remove_task(&mut self, id: TaskId) -> Result<()> {
        self.pending.push(PendingWrite::RemoveTask(id));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let Self {
            inner,
            _guards,
            pending,
        } = *self;
        let mut state = inner
            .state
            .write()
            .map_err(|e| TableroError::StoreUnavailable(format!("state lock poisoned: {e}")))?;

        // Writes whose target row vanished are skipped: a cascade committed
        // by a transaction holding an overlapping scope wins over queued
        // updates from a disjoint one (last write wins).
        for write in pending {
            match write {
                PendingWrite::ListPosition(id, position) => {
                    if let Some(list) = state.lists.get_mut(&id) {
                        list.position = position;
                    }
                }
                PendingWrite::TaskPosition(id, position) => {
                    if let Some(task) = state.tasks.get_mut(&id) {
                        task.position = position;
                    }
                }
                PendingWrite::TaskParent(id, list) => {
                    if state.lists.contains_key(&list) {
                        if let Some(task) = state.tasks.get_mut(&id) {
                            task.list = list;
                        }
                    }
                }
                PendingWrite::InsertBoard(board) => {
                    state.boards.insert(board.id, board);
                }
                PendingWrite::InsertList(list) => {
                    if state.boards.contains_key(&list.board) {
                        state.lists.insert(list.id, list);
                    }
                }
                PendingWrite::InsertTask(task) => {
                    if state.lists.contains_key(&task.list) {
                        state.tasks.insert(task.id, task);
                    }
                }
                PendingWrite::RemoveBoard(id) => {
                    state.boards.remove(&id);
                    let lists: Vec<ListId> = state
                        .lists
                        .values()
                        .filter(|list| list.board == id)
                        .map(|list| list.id)
                        .collect();
                    for list in lists {
                        state.lists.remove(&list);
                        state.tasks.retain(|_, task| task.list != list);
                    }
                }
                PendingWrite::RemoveList(id) => {
                    state.lists.remove(&id);
                    state.tasks.retain(|_, task| task.list != id);
                }
                PendingWrite::RemoveTask(id) => {
                    state.tasks.remove(&id);
                }
            }
        }

        Ok(())
    }
}
