//! Task store: single source of truth for all task reads and writes.
//!
//! # Responsibility
//! - Sole owner and mutator of the ordered task set.
//! - Enforce status-transition rules through the model layer.
//! - Synchronize the full set to the durable slot after every mutation.
//!
//! # Invariants
//! - Operations before `initialize()` fail with `NotInitialized`.
//! - A failed slot write never rolls back an in-memory mutation; it is
//!   surfaced as a `PersistenceWriteFailed` warning on the commit.
//! - Change listeners are notified after every successful mutation.

use crate::model::task::{
    now_epoch_ms, NewTask, Task, TaskId, TaskPatch, TaskStatus, TaskValidationError,
    TimestampPolicy,
};
use crate::repo::taskset_repo::{RepoError, TaskSetRepository};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Store-level operation failure. Never fatal to the process.
#[derive(Debug)]
pub enum StoreError {
    Validation(TaskValidationError),
    NotFound(TaskId),
    NotInitialized,
    Repo(RepoError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::NotInitialized => {
                write!(f, "store is not initialized; call initialize() first")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::NotFound(_) | Self::NotInitialized => None,
        }
    }
}

impl From<TaskValidationError> for StoreError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Non-fatal degradation attached to an otherwise successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWarning {
    /// The in-memory mutation applied, but the durable write failed. The
    /// in-memory set stays authoritative for the rest of the session.
    PersistenceWriteFailed(String),
}

impl Display for StoreWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PersistenceWriteFailed(message) => {
                write!(f, "mutation applied in memory but durable write failed: {message}")
            }
        }
    }
}

/// Result of a successful mutation, carrying any durability warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit<T> {
    pub value: T,
    pub warning: Option<StoreWarning>,
}

/// What a change notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Change notification delivered to subscribers after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreEvent {
    pub kind: ChangeKind,
    pub task_id: TaskId,
}

/// Handle returned by `subscribe`, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Derived counts over the current task set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub total: usize,
    pub waiting: usize,
    pub ongoing: usize,
    pub completed: usize,
    /// `round(100 * completed / total)`, `0` on an empty set.
    pub completion_rate: u32,
}

type Listener = Box<dyn Fn(&StoreEvent)>;

/// Single-threaded task store over an injected slot repository.
///
/// All operations run to completion without suspension; the only I/O on a
/// caller's path is the one-time slot load in `initialize()` and the
/// fire-and-forget slot write after each mutation.
pub struct TaskStore<R: TaskSetRepository> {
    repo: R,
    tasks: Vec<Task>,
    policy: TimestampPolicy,
    ready: bool,
    next_subscription: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
}

impl<R: TaskSetRepository> TaskStore<R> {
    /// Creates a store that is not yet ready; call `initialize()` before
    /// any operation.
    pub fn new(repo: R) -> Self {
        Self::with_policy(repo, TimestampPolicy::default())
    }

    /// Creates a store with an explicit backward-transition policy.
    pub fn with_policy(repo: R, policy: TimestampPolicy) -> Self {
        Self {
            repo,
            tasks: Vec::new(),
            policy,
            ready: false,
            next_subscription: 0,
            listeners: Vec::new(),
        }
    }

    /// Creates and initializes a store in one step.
    pub fn open(repo: R) -> StoreResult<Self> {
        let mut store = Self::new(repo);
        store.initialize()?;
        Ok(store)
    }

    /// Performs the one-time load from the durable slot.
    ///
    /// Idempotent once ready. On failure the store stays unready and every
    /// operation keeps rejecting with `NotInitialized`.
    pub fn initialize(&mut self) -> StoreResult<()> {
        if self.ready {
            return Ok(());
        }
        let tasks = self.repo.load().map_err(StoreError::Repo)?;
        info!(
            "event=store_init module=store status=ok tasks={} policy={:?}",
            tasks.len(),
            self.policy
        );
        self.tasks = tasks;
        self.ready = true;
        Ok(())
    }

    /// Creates a task from a draft and appends it to the set.
    ///
    /// Caller-supplied status defaults to Ongoing. `created_at` equals
    /// `updated_at`; the initial status records its lifecycle timestamp.
    pub fn create(&mut self, draft: NewTask) -> StoreResult<Commit<Task>> {
        self.ensure_ready()?;
        let task = Task::create(draft, now_epoch_ms())?;
        self.tasks.push(task.clone());
        debug!(
            "event=task_create module=store status=ok id={} task_status={:?}",
            task.id, task.status
        );
        let warning = self.persist();
        self.notify(ChangeKind::Created, task.id);
        Ok(Commit { value: task, warning })
    }

    /// Applies a partial update to the task with the given id.
    ///
    /// Only provided fields change. Transitions into Ongoing/Completed
    /// record their lifecycle timestamp on first entry; backward
    /// transitions follow the store's `TimestampPolicy`.
    pub fn update(&mut self, id: TaskId, patch: TaskPatch) -> StoreResult<Commit<Task>> {
        self.ensure_ready()?;
        let index = self.position(id)?;

        // Patch a copy first so a validation failure leaves the stored
        // task untouched.
        let mut updated = self.tasks[index].clone();
        updated.apply(&patch, now_epoch_ms(), self.policy)?;
        self.tasks[index] = updated.clone();

        debug!(
            "event=task_update module=store status=ok id={id} task_status={:?}",
            updated.status
        );
        let warning = self.persist();
        self.notify(ChangeKind::Updated, id);
        Ok(Commit {
            value: updated,
            warning,
        })
    }

    /// Convenience transition to Completed.
    pub fn mark_completed(&mut self, id: TaskId) -> StoreResult<Commit<Task>> {
        self.update(id, TaskPatch::status(TaskStatus::Completed))
    }

    /// Removes the task with the given id from the set.
    pub fn delete(&mut self, id: TaskId) -> StoreResult<Commit<()>> {
        self.ensure_ready()?;
        let index = self.position(id)?;
        self.tasks.remove(index);
        debug!("event=task_delete module=store status=ok id={id}");
        let warning = self.persist();
        self.notify(ChangeKind::Deleted, id);
        Ok(Commit {
            value: (),
            warning,
        })
    }

    /// Returns a copy of one task by id.
    pub fn get(&self, id: TaskId) -> StoreResult<Task> {
        self.ensure_ready()?;
        let index = self.position(id)?;
        Ok(self.tasks[index].clone())
    }

    /// Read-only view of the full set in insertion order.
    pub fn list(&self) -> StoreResult<&[Task]> {
        self.ensure_ready()?;
        Ok(&self.tasks)
    }

    /// Copies of the tasks matching `status`, relative order preserved.
    pub fn list_by_status(&self, status: TaskStatus) -> StoreResult<Vec<Task>> {
        self.ensure_ready()?;
        Ok(self
            .tasks
            .iter()
            .filter(|task| task.status == status)
            .cloned()
            .collect())
    }

    /// Derived counts over the current set. Pure; no stored state.
    pub fn stats(&self) -> StoreResult<TaskStats> {
        self.ensure_ready()?;
        let mut stats = TaskStats {
            total: self.tasks.len(),
            ..TaskStats::default()
        };
        for task in &self.tasks {
            match task.status {
                TaskStatus::Waiting => stats.waiting += 1,
                TaskStatus::Ongoing => stats.ongoing += 1,
                TaskStatus::Completed => stats.completed += 1,
            }
        }
        if stats.total > 0 {
            stats.completion_rate =
                ((stats.completed as f64 / stats.total as f64) * 100.0).round() as u32;
        }
        Ok(stats)
    }

    /// Registers a change listener fired after every successful mutation.
    ///
    /// Subscribing does not require the store to be initialized.
    pub fn subscribe(&mut self, listener: impl Fn(&StoreEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    fn ensure_ready(&self) -> StoreResult<()> {
        if self.ready {
            Ok(())
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    fn position(&self, id: TaskId) -> StoreResult<usize> {
        self.tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or(StoreError::NotFound(id))
    }

    fn persist(&mut self) -> Option<StoreWarning> {
        match self.repo.save(&self.tasks) {
            Ok(()) => None,
            Err(err) => {
                warn!("event=slot_save module=store status=degraded error={err}");
                Some(StoreWarning::PersistenceWriteFailed(err.to_string()))
            }
        }
    }

    fn notify(&self, kind: ChangeKind, task_id: TaskId) {
        let event = StoreEvent { kind, task_id };
        for (_, listener) in &self.listeners {
            listener(&event);
        }
    }
}
