//! Core task store for taskdeck.
//! This crate is the single source of truth for task lifecycle invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::task::{
    now_epoch_ms, NewTask, Task, TaskId, TaskPatch, TaskStatus, TaskValidationError,
    TimestampPolicy,
};
pub use repo::taskset_repo::{
    MemoryTaskSetRepository, RepoError, RepoResult, SqliteTaskSetRepository, TaskSetRepository,
};
pub use service::task_store::{
    ChangeKind, Commit, StoreError, StoreEvent, StoreResult, StoreWarning, SubscriptionId,
    TaskStats, TaskStore,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
