//! Domain model for the task store.
//!
//! # Responsibility
//! - Define the canonical task record and its partial-update shape.
//! - Enforce lifecycle-timestamp invariants on every write path.
//!
//! # Invariants
//! - Every task is identified by a stable, non-nil `TaskId`.
//! - `created_at <= updated_at` for every task at all times.
//! - `started_at`/`completed_at` are recorded on first entry into the
//!   corresponding status and are never overwritten once set.

pub mod task;
