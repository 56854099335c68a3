//! End-to-end orchestration of a single reorder operation.

use crate::{
    domain::sequencer,
    domain::{BoardId, ListId, TaskId},
    error::{Result, TableroError},
    storage::{ChildId, OrderedCollectionStore, ParentId, TransactionScope},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, warn};

/// The entity being reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    List(ListId),
    Task(TaskId),
}

/// Where an entity sits after a successful reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub parent: ParentId,
    pub position: u32,
}

/// Bounded retry with exponential backoff for transient scope contention.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    /// Backoff to sleep after the given failed attempt (1-based).
    fn backoff_after(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Runs `op`, retrying transient contention per `retry`.
///
/// Non-retryable failures and successes return immediately; contention is
/// retried with exponential backoff until the attempt budget is spent.
pub(crate) async fn run_with_retry<T, F, Fut>(
    retry: &RetryPolicy,
    op_name: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Err(err) if err.is_retryable() => {
                if attempt >= retry.max_attempts {
                    warn!(op = op_name, attempt, "giving up after repeated contention");
                    return Err(err);
                }
                let backoff = retry.backoff_after(attempt);
                debug!(op = op_name, attempt, ?backoff, "contended, backing off");
                sleep(backoff).await;
            }
            result => return result,
        }
    }
}

/// Coordinates reorder operations against the store.
///
/// Each call resolves the entity and validates the destination, then runs the
/// read-compute-write cycle inside a transaction scoped to the affected
/// parent(s). Contention is retried per the [`RetryPolicy`]; validation
/// failures are surfaced immediately.
pub struct ReorderCoordinator {
    store: Arc<dyn OrderedCollectionStore>,
    retry: RetryPolicy,
}

impl ReorderCoordinator {
    pub fn new(store: Arc<dyn OrderedCollectionStore>) -> Self {
        Self::with_retry_policy(store, RetryPolicy::default())
    }

    pub fn with_retry_policy(store: Arc<dyn OrderedCollectionStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Moves `entity` to `target_position` under `target_parent`.
    ///
    /// Out-of-range positions clamp to the nearest valid slot; moving an
    /// entity onto its current position succeeds without touching any
    /// sibling. Returns the entity's new placement.
    pub async fn reorder(
        &self,
        entity: EntityRef,
        target_parent: ParentId,
        target_position: u32,
    ) -> Result<Placement> {
        run_with_retry(&self.retry, "reorder", || {
            self.try_reorder(entity, target_parent, target_position)
        })
        .await
    }

    /// Like [`reorder`], bounded by a caller-supplied deadline.
    ///
    /// If the deadline elapses, even while waiting on the transaction scope,
    /// the in-flight transaction is dropped and rolled back; no partial write
    /// is ever committed.
    ///
    /// [`reorder`]: ReorderCoordinator::reorder
    pub async fn reorder_with_deadline(
        &self,
        entity: EntityRef,
        target_parent: ParentId,
        target_position: u32,
        deadline: Instant,
    ) -> Result<Placement> {
        match timeout_at(deadline, self.reorder(entity, target_parent, target_position)).await {
            Ok(result) => result,
            Err(_) => Err(TableroError::DeadlineExceeded),
        }
    }

    async fn try_reorder(
        &self,
        entity: EntityRef,
        target_parent: ParentId,
        target_position: u32,
    ) -> Result<Placement> {
        match (entity, target_parent) {
            (EntityRef::Task(task), ParentId::List(list)) => {
                self.try_reorder_task(task, list, target_position).await
            }
            (EntityRef::List(list), ParentId::Board(board)) => {
                self.try_reorder_list(list, board, target_position).await
            }
            (EntityRef::Task(task), ParentId::Board(_)) => Err(TableroError::InvalidTarget(
                format!("task {task} can only be placed in a list"),
            )),
            (EntityRef::List(list), ParentId::List(_)) => Err(TableroError::InvalidTarget(
                format!("list {list} can only be placed in a board"),
            )),
        }
    }

    async fn try_reorder_list(
        &self,
        list_id: ListId,
        board_id: BoardId,
        to: u32,
    ) -> Result<Placement> {
        let list = self.store.list(list_id).await?;
        // Lists never change boards.
        if list.board != board_id {
            return Err(TableroError::InvalidTarget(format!(
                "list {list_id} does not belong to board {board_id}"
            )));
        }

        let parent = ParentId::Board(board_id);
        let mut txn = self.store.begin(TransactionScope::single(parent)).await?;

        let siblings: Vec<ChildId> = txn
            .siblings_of(parent)
            .await?
            .iter()
            .map(|sibling| sibling.id)
            .collect();
        let Some(from) = siblings
            .iter()
            .position(|id| *id == ChildId::List(list_id))
        else {
            // The list left this board between resolution and the scoped
            // read; treat as a transient conflict so the retry re-resolves.
            return Err(TableroError::Contention);
        };

        for (id, position) in sequencer::plan_move_within(&siblings, from as u32, to) {
            txn.write_position(id, position).await?;
        }
        let position = (to as usize).min(siblings.len() - 1) as u32;
        txn.commit().await?;

        debug!(%list_id, position, "list reordered");
        Ok(Placement { parent, position })
    }

    async fn try_reorder_task(
        &self,
        task_id: TaskId,
        target_list_id: ListId,
        to: u32,
    ) -> Result<Placement> {
        let task = self.store.task(task_id).await?;
        let current_list = self.store.list(task.list).await?;
        if target_list_id != current_list.id {
            let target_list = self.store.list(target_list_id).await?;
            // A task may only move between lists of its own board.
            if target_list.board != current_list.board {
                return Err(TableroError::InvalidTarget(format!(
                    "list {target_list_id} belongs to a different board than task {task_id}"
                )));
            }
        }

        let source = ParentId::List(current_list.id);
        let dest = ParentId::List(target_list_id);
        let mut txn = self
            .store
            .begin(TransactionScope::new([source, dest]))
            .await?;

        let source_siblings: Vec<ChildId> = txn
            .siblings_of(source)
            .await?
            .iter()
            .map(|sibling| sibling.id)
            .collect();
        let Some(from) = source_siblings
            .iter()
            .position(|id| *id == ChildId::Task(task_id))
        else {
            // Concurrently moved out of the resolved list; retry re-resolves.
            return Err(TableroError::Contention);
        };

        let position = if source == dest {
            for (id, position) in sequencer::plan_move_within(&source_siblings, from as u32, to) {
                txn.write_position(id, position).await?;
            }
            (to as usize).min(source_siblings.len() - 1) as u32
        } else {
            let dest_siblings: Vec<ChildId> = txn
                .siblings_of(dest)
                .await?
                .iter()
                .map(|sibling| sibling.id)
                .collect();
            let plan =
                sequencer::plan_move_across(&source_siblings, from as u32, &dest_siblings, to);
            for (id, position) in plan.source_writes.iter().chain(plan.dest_writes.iter()) {
                txn.write_position(*id, *position).await?;
            }
            txn.reparent_task(task_id, target_list_id).await?;
            txn.write_position(ChildId::Task(task_id), plan.position)
                .await?;
            plan.position
        };
        txn.commit().await?;

        debug!(%task_id, %target_list_id, position, "task reordered");
        Ok(Placement {
            parent: dest,
            position,
        })
    }
}
