//! Persistence adapters for the durable task slot.
//!
//! # Responsibility
//! - Define the slot contract the store is injected with.
//! - Isolate SQLite and serialization details from store orchestration.
//!
//! # Invariants
//! - Write paths validate every record before touching storage.
//! - Read paths reject invalid persisted state instead of masking it.

pub mod taskset_repo;
