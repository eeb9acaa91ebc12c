//! Task domain model.
//!
//! # Responsibility
//! - Define the canonical task record serialized into the durable slot.
//! - Own status-transition rules and the timestamps they record.
//!
//! # Invariants
//! - `id` is stable and never reused for another task.
//! - `created_at <= updated_at` always.
//! - `started_at`, when set, is never earlier than `created_at`.
//! - `completed_at`, when set, is never earlier than `started_at` (when
//!   present) or `created_at`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Stable identifier for every task owned by the store.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type TaskId = Uuid;

static DUE_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("due date pattern is valid"));

/// Returns the current wall clock as Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created but not yet started.
    Waiting,
    /// Work is in progress.
    Ongoing,
    /// Finished.
    Completed,
}

/// Policy for lifecycle timestamps when status moves backward
/// (Completed -> Ongoing, or any status -> Waiting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampPolicy {
    /// Keep previously recorded `started_at`/`completed_at` untouched.
    #[default]
    Preserve,
    /// Clear `completed_at` when leaving Completed, and both lifecycle
    /// timestamps when re-entering Waiting. A later re-entry records a
    /// fresh timestamp.
    Reset,
}

/// Canonical task record.
///
/// Serialized field names stay camelCase to match the external slot schema
/// (`dueDate`, `createdAt`, ...); absent optional fields are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Stable global ID.
    pub id: TaskId,
    /// Non-empty display label. Stored trimmed.
    pub title: String,
    /// Optional free-form body text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Calendar date `YYYY-MM-DD`, no time component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Unix epoch milliseconds. Set exactly once at creation.
    pub created_at: i64,
    /// Unix epoch milliseconds. Refreshed on every mutation.
    pub updated_at: i64,
    /// Recorded on first entry into Ongoing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    /// Recorded on first entry into Completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

/// Creation input. Unset fields take creation defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    /// Defaults to `TaskStatus::Ongoing` when omitted.
    pub status: Option<TaskStatus>,
}

impl NewTask {
    /// Creates a draft carrying only a title, the quick-add shape.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial update enumerating exactly the mutable fields.
///
/// `None` means "no change"; it never overwrites a field with an empty
/// value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub status: Option<TaskStatus>,
}

impl TaskPatch {
    /// Creates a patch changing only the status.
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Validation failure for a single task record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    NilId,
    EmptyTitle,
    MalformedDueDate(String),
    UpdatedBeforeCreated { created_at: i64, updated_at: i64 },
    StartedBeforeCreated { created_at: i64, started_at: i64 },
    CompletedTooEarly { lower_bound: i64, completed_at: i64 },
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilId => write!(f, "task id must not be nil"),
            Self::EmptyTitle => write!(f, "task title must not be empty"),
            Self::MalformedDueDate(value) => {
                write!(f, "due date `{value}` is not a valid YYYY-MM-DD date")
            }
            Self::UpdatedBeforeCreated {
                created_at,
                updated_at,
            } => write!(
                f,
                "updated_at ({updated_at}) must be >= created_at ({created_at})"
            ),
            Self::StartedBeforeCreated {
                created_at,
                started_at,
            } => write!(
                f,
                "started_at ({started_at}) must be >= created_at ({created_at})"
            ),
            Self::CompletedTooEarly {
                lower_bound,
                completed_at,
            } => write!(
                f,
                "completed_at ({completed_at}) must be >= {lower_bound}"
            ),
        }
    }
}

impl Error for TaskValidationError {}

impl Task {
    /// Materializes a draft into a task at the given creation instant.
    ///
    /// # Contract
    /// - Assigns a fresh v4 id.
    /// - `created_at == updated_at == now_ms`.
    /// - Initial Ongoing records `started_at`; initial Completed records
    ///   `completed_at`.
    pub fn create(draft: NewTask, now_ms: i64) -> Result<Self, TaskValidationError> {
        let status = draft.status.unwrap_or(TaskStatus::Ongoing);
        let task = Self {
            id: Uuid::new_v4(),
            title: draft.title.trim().to_string(),
            description: draft.description,
            status,
            due_date: draft.due_date,
            created_at: now_ms,
            updated_at: now_ms,
            started_at: (status == TaskStatus::Ongoing).then_some(now_ms),
            completed_at: (status == TaskStatus::Completed).then_some(now_ms),
        };
        task.validate()?;
        Ok(task)
    }

    /// Applies a partial update at the given instant.
    ///
    /// Only provided fields change; `updated_at` is refreshed
    /// unconditionally. Status transitions record lifecycle timestamps on
    /// first entry and defer backward-transition handling to `policy`.
    ///
    /// # Errors
    /// Returns the first invariant violation. Callers that must stay
    /// consistent on failure should apply the patch to a copy.
    pub fn apply(
        &mut self,
        patch: &TaskPatch,
        now_ms: i64,
        policy: TimestampPolicy,
    ) -> Result<(), TaskValidationError> {
        if let Some(title) = &patch.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(due_date) = &patch.due_date {
            self.due_date = Some(due_date.clone());
        }
        if let Some(status) = patch.status {
            self.transition_to(status, now_ms, policy);
        }
        self.updated_at = now_ms;
        self.validate()
    }

    /// Returns whether this task counts toward the completion rate.
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Checks every record-level invariant.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.id.is_nil() {
            return Err(TaskValidationError::NilId);
        }
        if self.title.trim().is_empty() {
            return Err(TaskValidationError::EmptyTitle);
        }
        if let Some(due_date) = &self.due_date {
            validate_due_date(due_date)?;
        }
        if self.updated_at < self.created_at {
            return Err(TaskValidationError::UpdatedBeforeCreated {
                created_at: self.created_at,
                updated_at: self.updated_at,
            });
        }
        if let Some(started_at) = self.started_at {
            if started_at < self.created_at {
                return Err(TaskValidationError::StartedBeforeCreated {
                    created_at: self.created_at,
                    started_at,
                });
            }
        }
        if let Some(completed_at) = self.completed_at {
            let lower_bound = self.started_at.unwrap_or(self.created_at);
            if completed_at < lower_bound {
                return Err(TaskValidationError::CompletedTooEarly {
                    lower_bound,
                    completed_at,
                });
            }
        }
        Ok(())
    }

    fn transition_to(&mut self, next: TaskStatus, now_ms: i64, policy: TimestampPolicy) {
        if self.status == next {
            return;
        }
        self.status = next;

        match next {
            TaskStatus::Ongoing => {
                if self.started_at.is_none() {
                    self.started_at = Some(now_ms);
                }
            }
            TaskStatus::Completed => {
                if self.completed_at.is_none() {
                    self.completed_at = Some(now_ms);
                }
            }
            TaskStatus::Waiting => {}
        }

        if policy == TimestampPolicy::Reset {
            match next {
                TaskStatus::Ongoing => self.completed_at = None,
                TaskStatus::Waiting => {
                    self.started_at = None;
                    self.completed_at = None;
                }
                TaskStatus::Completed => {}
            }
        }
    }
}

fn validate_due_date(value: &str) -> Result<(), TaskValidationError> {
    let malformed = || TaskValidationError::MalformedDueDate(value.to_string());
    let captures = DUE_DATE_RE.captures(value).ok_or_else(malformed)?;

    let month: u32 = captures[2].parse().map_err(|_| malformed())?;
    let day: u32 = captures[3].parse().map_err(|_| malformed())?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(malformed());
    }
    Ok(())
}
