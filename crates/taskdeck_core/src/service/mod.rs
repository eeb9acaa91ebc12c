//! Store orchestration layer.
//!
//! # Responsibility
//! - Own the authoritative in-memory task set and its lifecycle rules.
//! - Bridge every mutation to the injected durable slot repository.

pub mod task_store;
