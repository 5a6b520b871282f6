//! Memory-pressure eviction module

mod guardian;
mod outcome;

pub use guardian::{CacheGuardian, ExclusiveRun, assess_and_evict, spawn_guardian_task};
pub use outcome::{Assessment, EvictionOutcome};
