//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `taskdeck_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

use taskdeck_core::{MemoryTaskSetRepository, NewTask, TaskStore};

fn main() {
    println!("taskdeck_core version={}", taskdeck_core::core_version());

    // Exercise the store end to end against the in-memory slot.
    let outcome = TaskStore::open(MemoryTaskSetRepository::new()).and_then(|mut store| {
        store.create(NewTask::titled("smoke check"))?;
        store.stats()
    });
    match outcome {
        Ok(stats) => println!(
            "taskdeck_core store ok total={} ongoing={}",
            stats.total, stats.ongoing
        ),
        Err(err) => eprintln!("taskdeck_core store error: {err}"),
    }
}
