//! Creation and deletion of boards, lists, and tasks.
//!
//! Creation assigns initial positions by the append rule; deletion cascades
//! to children and compacts the surviving siblings so the dense ordering
//! survives every lifecycle change.

use crate::{
    coordinator::{run_with_retry, RetryPolicy},
    domain::sequencer,
    domain::{Board, BoardId, ListId, Priority, Task, TaskId, TaskList, UserId},
    error::{Result, TableroError},
    storage::{ChildId, OrderedCollectionStore, ParentId, TransactionScope},
};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;

/// Caller-supplied fields for a new task.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub assigned_to: Option<UserId>,
    pub labels: String,
    /// Where to place the task in its list. `None` appends; `Some(p)` opens
    /// a gap at `p` (clamped to the valid range). Callers that want the
    /// default drag-to-bottom behaviour simply leave this unset.
    pub position: Option<u32>,
}

impl TaskDraft {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Creates and deletes entities, keeping sibling positions dense throughout.
pub struct LifecycleManager {
    store: Arc<dyn OrderedCollectionStore>,
    retry: RetryPolicy,
}

impl LifecycleManager {
    /// Lists seeded on every new board.
    const DEFAULT_LISTS: [&'static str; 3] = ["To Do", "In Progress", "Done"];

    pub fn new(store: Arc<dyn OrderedCollectionStore>) -> Self {
        Self::with_retry_policy(store, RetryPolicy::default())
    }

    pub fn with_retry_policy(store: Arc<dyn OrderedCollectionStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Creates a board with the default lists at positions 0..2.
    ///
    /// The owner is dropped from `members` if present.
    pub async fn create_board(
        &self,
        owner: UserId,
        name: String,
        description: String,
        members: Vec<UserId>,
    ) -> Result<Board> {
        let board = Board::new(owner, name, description, members);

        let mut txn = self
            .store
            .begin(TransactionScope::single(ParentId::Board(board.id)))
            .await?;
        txn.insert_board(board.clone()).await?;
        for (i, list_name) in Self::DEFAULT_LISTS.iter().enumerate() {
            txn.insert_list(TaskList::new(board.id, (*list_name).to_string(), i as u32))
                .await?;
        }
        txn.commit().await?;

        debug!(board = %board.id, "board created");
        Ok(board)
    }

    /// Creates a list appended at the end of the board's ordering.
    pub async fn create_list(&self, board: BoardId, name: String) -> Result<TaskList> {
        run_with_retry(&self.retry, "create_list", || {
            self.try_create_list(board, &name)
        })
        .await
    }

    async fn try_create_list(&self, board: BoardId, name: &str) -> Result<TaskList> {
        self.store.board(board).await?;

        let parent = ParentId::Board(board);
        let mut txn = self.store.begin(TransactionScope::single(parent)).await?;
        let siblings = txn.siblings_of(parent).await?;
        let list = TaskList::new(
            board,
            name.to_string(),
            sequencer::append_position(siblings.len()),
        );
        txn.insert_list(list.clone()).await?;
        txn.commit().await?;

        debug!(list = %list.id, %board, position = list.position, "list created");
        Ok(list)
    }

    /// Creates a task in `list`, appending unless the draft names a position.
    pub async fn create_task(&self, list: ListId, draft: TaskDraft) -> Result<Task> {
        run_with_retry(&self.retry, "create_task", || {
            self.try_create_task(list, &draft)
        })
        .await
    }

    async fn try_create_task(&self, list: ListId, draft: &TaskDraft) -> Result<Task> {
        self.store.list(list).await?;

        let parent = ParentId::List(list);
        let mut txn = self.store.begin(TransactionScope::single(parent)).await?;
        let siblings: Vec<ChildId> = txn
            .siblings_of(parent)
            .await?
            .iter()
            .map(|sibling| sibling.id)
            .collect();

        let position = match draft.position {
            None => sequencer::append_position(siblings.len()),
            Some(at) => {
                let (slot, writes) = sequencer::plan_insert(&siblings, at);
                for (id, new_position) in writes {
                    txn.write_position(id, new_position).await?;
                }
                slot
            }
        };

        let mut task = Task::new(list, draft.title.clone(), position);
        task.description = draft.description.clone();
        task.priority = draft.priority;
        task.due_date = draft.due_date;
        task.assigned_to = draft.assigned_to;
        task.labels = draft.labels.clone();

        txn.insert_task(task.clone()).await?;
        txn.commit().await?;

        debug!(task = %task.id, %list, position, "task created");
        Ok(task)
    }

    /// Deletes a board together with its lists and their tasks.
    pub async fn delete_board(&self, board: BoardId) -> Result<()> {
        run_with_retry(&self.retry, "delete_board", || self.try_delete_board(board)).await
    }

    async fn try_delete_board(&self, board: BoardId) -> Result<()> {
        self.store.board(board).await?;
        let lists = self.store.lists_of(board).await?;

        // The scope covers the board and every child list, so in-flight task
        // reorders in any of them serialize against the cascade.
        let scope = TransactionScope::new(
            std::iter::once(ParentId::Board(board))
                .chain(lists.iter().map(|list| ParentId::List(list.id))),
        );
        let mut txn = self.store.begin(scope).await?;
        txn.remove_board(board).await?;
        txn.commit().await?;

        debug!(%board, "board deleted");
        Ok(())
    }

    /// Deletes a list, cascading to its tasks and compacting the board's
    /// surviving lists.
    pub async fn delete_list(&self, list: ListId) -> Result<()> {
        run_with_retry(&self.retry, "delete_list", || self.try_delete_list(list)).await
    }

    async fn try_delete_list(&self, list: ListId) -> Result<()> {
        let resolved = self.store.list(list).await?;

        let board_parent = ParentId::Board(resolved.board);
        let scope = TransactionScope::new([board_parent, ParentId::List(list)]);
        let mut txn = self.store.begin(scope).await?;

        let siblings: Vec<ChildId> = txn
            .siblings_of(board_parent)
            .await?
            .iter()
            .map(|sibling| sibling.id)
            .collect();
        let Some(at) = siblings.iter().position(|id| *id == ChildId::List(list)) else {
            return Err(TableroError::Contention);
        };
        for (id, position) in sequencer::plan_remove(&siblings, at as u32) {
            txn.write_position(id, position).await?;
        }
        txn.remove_list(list).await?;
        txn.commit().await?;

        debug!(%list, "list deleted");
        Ok(())
    }

    /// Deletes a task and compacts its list's surviving tasks.
    pub async fn delete_task(&self, task: TaskId) -> Result<()> {
        run_with_retry(&self.retry, "delete_task", || self.try_delete_task(task)).await
    }

    async fn try_delete_task(&self, task: TaskId) -> Result<()> {
        let resolved = self.store.task(task).await?;

        let parent = ParentId::List(resolved.list);
        let mut txn = self.store.begin(TransactionScope::single(parent)).await?;
        let siblings: Vec<ChildId> = txn
            .siblings_of(parent)
            .await?
            .iter()
            .map(|sibling| sibling.id)
            .collect();
        let Some(at) = siblings.iter().position(|id| *id == ChildId::Task(task)) else {
            return Err(TableroError::Contention);
        };
        for (id, position) in sequencer::plan_remove(&siblings, at as u32) {
            txn.write_position(id, position).await?;
        }
        txn.remove_task(task).await?;
        txn.commit().await?;

        debug!(%task, "task deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        coordinator::{EntityRef, ReorderCoordinator},
        storage::memory::MemoryStore,
    };

    fn manager(store: &MemoryStore) -> LifecycleManager {
        LifecycleManager::new(Arc::new(store.clone()))
    }

    async fn board_with_list(store: &MemoryStore) -> (BoardId, ListId) {
        let lifecycle = manager(store);
        let board = lifecycle
            .create_board(UserId::new(), "Sprint".to_string(), String::new(), Vec::new())
            .await
            .unwrap();
        let list = lifecycle
            .create_list(board.id, "Backlog".to_string())
            .await
            .unwrap();
        (board.id, list.id)
    }

    async fn assert_dense_lists(store: &MemoryStore, board: BoardId) {
        let lists = store.lists_of(board).await.unwrap();
        for (i, list) in lists.iter().enumerate() {
            assert_eq!(list.position, i as u32, "board lists must stay dense");
        }
    }

    async fn assert_dense_tasks(store: &MemoryStore, list: ListId) {
        let tasks = store.tasks_of(list).await.unwrap();
        for (i, task) in tasks.iter().enumerate() {
            assert_eq!(task.position, i as u32, "list tasks must stay dense");
        }
    }

    #[tokio::test]
    async fn test_create_board_seeds_default_lists() {
        let store = MemoryStore::new();
        let lifecycle = manager(&store);

        let board = lifecycle
            .create_board(UserId::new(), "Sprint".to_string(), String::new(), Vec::new())
            .await
            .unwrap();

        let lists = store.lists_of(board.id).await.unwrap();
        let names: Vec<&str> = lists.iter().map(|list| list.name.as_str()).collect();
        assert_eq!(names, vec!["To Do", "In Progress", "Done"]);
        assert_eq!(
            lists.iter().map(|list| list.position).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[tokio::test]
    async fn test_create_board_filters_owner_from_members() {
        let store = MemoryStore::new();
        let lifecycle = manager(&store);
        let owner = UserId::new();
        let member = UserId::new();

        let board = lifecycle
            .create_board(
                owner,
                "Sprint".to_string(),
                String::new(),
                vec![owner, member],
            )
            .await
            .unwrap();

        assert_eq!(board.members, vec![member]);
    }

    #[tokio::test]
    async fn test_created_lists_append() {
        let store = MemoryStore::new();
        let lifecycle = manager(&store);
        let board = lifecycle
            .create_board(UserId::new(), "Sprint".to_string(), String::new(), Vec::new())
            .await
            .unwrap();

        let list = lifecycle
            .create_list(board.id, "Review".to_string())
            .await
            .unwrap();

        // Three defaults occupy 0..2, the new list appends after them.
        assert_eq!(list.position, 3);
        assert_dense_lists(&store, board.id).await;
    }

    #[tokio::test]
    async fn test_created_tasks_append_in_creation_order() {
        let store = MemoryStore::new();
        let (_, list) = board_with_list(&store).await;
        let lifecycle = manager(&store);

        for i in 0..5 {
            let task = lifecycle
                .create_task(list, TaskDraft::titled(format!("task {i}")))
                .await
                .unwrap();
            assert_eq!(task.position, i);
        }

        let titles: Vec<String> = store
            .tasks_of(list)
            .await
            .unwrap()
            .into_iter()
            .map(|task| task.title)
            .collect();
        assert_eq!(titles, vec!["task 0", "task 1", "task 2", "task 3", "task 4"]);
    }

    #[tokio::test]
    async fn test_create_task_at_front() {
        let store = MemoryStore::new();
        let (_, list) = board_with_list(&store).await;
        let lifecycle = manager(&store);

        lifecycle
            .create_task(list, TaskDraft::titled("first"))
            .await
            .unwrap();
        let mut draft = TaskDraft::titled("cut in line");
        draft.position = Some(0);
        let task = lifecycle.create_task(list, draft).await.unwrap();

        assert_eq!(task.position, 0);
        let titles: Vec<String> = store
            .tasks_of(list)
            .await
            .unwrap()
            .into_iter()
            .map(|task| task.title)
            .collect();
        assert_eq!(titles, vec!["cut in line", "first"]);
    }

    #[tokio::test]
    async fn test_create_task_position_clamps_to_append() {
        let store = MemoryStore::new();
        let (_, list) = board_with_list(&store).await;
        let lifecycle = manager(&store);

        lifecycle
            .create_task(list, TaskDraft::titled("only"))
            .await
            .unwrap();
        let mut draft = TaskDraft::titled("far away");
        draft.position = Some(40);
        let task = lifecycle.create_task(list, draft).await.unwrap();

        assert_eq!(task.position, 1);
        assert_dense_tasks(&store, list).await;
    }

    #[tokio::test]
    async fn test_create_task_carries_draft_fields() {
        let store = MemoryStore::new();
        let (_, list) = board_with_list(&store).await;
        let lifecycle = manager(&store);
        let assignee = UserId::new();

        let mut draft = TaskDraft::titled("Ship it");
        draft.description = "Cut the release".to_string();
        draft.priority = Priority::Critical;
        draft.labels = "release, ops".to_string();
        draft.assigned_to = Some(assignee);
        let task = lifecycle.create_task(list, draft).await.unwrap();

        let stored = store.task(task.id).await.unwrap();
        assert_eq!(stored.priority, Priority::Critical);
        assert_eq!(stored.assigned_to, Some(assignee));
        assert_eq!(stored.labels_list(), vec!["release", "ops"]);
    }

    #[tokio::test]
    async fn test_create_task_on_unknown_list_fails() {
        let store = MemoryStore::new();
        let lifecycle = manager(&store);

        let result = lifecycle
            .create_task(ListId::new(), TaskDraft::titled("orphan"))
            .await;
        assert!(matches!(result, Err(TableroError::ListNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_task_compacts_siblings() {
        let store = MemoryStore::new();
        let (_, list) = board_with_list(&store).await;
        let lifecycle = manager(&store);

        let mut ids = Vec::new();
        for title in ["A", "B", "C"] {
            ids.push(
                lifecycle
                    .create_task(list, TaskDraft::titled(title))
                    .await
                    .unwrap()
                    .id,
            );
        }

        lifecycle.delete_task(ids[1]).await.unwrap();

        let tasks = store.tasks_of(list).await.unwrap();
        assert_eq!(
            tasks.iter().map(|task| task.title.as_str()).collect::<Vec<_>>(),
            vec!["A", "C"]
        );
        assert_dense_tasks(&store, list).await;
    }

    #[tokio::test]
    async fn test_delete_last_remaining_task_is_valid() {
        let store = MemoryStore::new();
        let (_, list) = board_with_list(&store).await;
        let lifecycle = manager(&store);

        let task = lifecycle
            .create_task(list, TaskDraft::titled("only"))
            .await
            .unwrap();
        lifecycle.delete_task(task.id).await.unwrap();

        assert!(store.tasks_of(list).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_list_cascades_and_compacts() {
        let store = MemoryStore::new();
        let lifecycle = manager(&store);
        let board = lifecycle
            .create_board(UserId::new(), "Sprint".to_string(), String::new(), Vec::new())
            .await
            .unwrap();

        let lists = store.lists_of(board.id).await.unwrap();
        let doomed = lists[1].clone();
        let task = lifecycle
            .create_task(doomed.id, TaskDraft::titled("goes with the list"))
            .await
            .unwrap();

        lifecycle.delete_list(doomed.id).await.unwrap();

        assert!(matches!(
            store.task(task.id).await,
            Err(TableroError::TaskNotFound(_))
        ));
        let remaining = store.lists_of(board.id).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert_dense_lists(&store, board.id).await;
    }

    #[tokio::test]
    async fn test_delete_board_cascades_everything() {
        let store = MemoryStore::new();
        let (board, list) = board_with_list(&store).await;
        let lifecycle = manager(&store);
        let task = lifecycle
            .create_task(list, TaskDraft::titled("gone soon"))
            .await
            .unwrap();

        lifecycle.delete_board(board).await.unwrap();

        assert!(matches!(
            store.board(board).await,
            Err(TableroError::BoardNotFound(_))
        ));
        assert!(matches!(
            store.list(list).await,
            Err(TableroError::ListNotFound(_))
        ));
        assert!(matches!(
            store.task(task.id).await,
            Err(TableroError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invariant_holds_across_mixed_operations() {
        let store = MemoryStore::new();
        let (board, list) = board_with_list(&store).await;
        let lifecycle = manager(&store);
        let coordinator = ReorderCoordinator::new(Arc::new(store.clone()));

        let mut ids = Vec::new();
        for title in ["A", "B", "C", "D", "E"] {
            ids.push(
                lifecycle
                    .create_task(list, TaskDraft::titled(title))
                    .await
                    .unwrap()
                    .id,
            );
            assert_dense_tasks(&store, list).await;
        }

        coordinator
            .reorder(EntityRef::Task(ids[4]), ParentId::List(list), 0)
            .await
            .unwrap();
        assert_dense_tasks(&store, list).await;

        lifecycle.delete_task(ids[2]).await.unwrap();
        assert_dense_tasks(&store, list).await;

        coordinator
            .reorder(EntityRef::Task(ids[0]), ParentId::List(list), 3)
            .await
            .unwrap();
        assert_dense_tasks(&store, list).await;

        let second = lifecycle
            .create_list(board, "Second".to_string())
            .await
            .unwrap();
        coordinator
            .reorder(EntityRef::Task(ids[1]), ParentId::List(second.id), 0)
            .await
            .unwrap();
        assert_dense_tasks(&store, list).await;
        assert_dense_tasks(&store, second.id).await;

        lifecycle.delete_task(ids[4]).await.unwrap();
        assert_dense_tasks(&store, list).await;
        assert_dense_lists(&store, board).await;
    }
}
