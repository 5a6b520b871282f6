//! Cacheguard Core Logic
//!
//! This crate decides when the shared cache is under memory pressure and
//! sweeps the evictable key namespace when it is.

pub mod config;
pub mod error;
pub mod eviction;

pub use config::{GuardConfig, LockConfig};
pub use error::{EvictionError, SweepStage};
pub use eviction::{
    Assessment, CacheGuardian, EvictionOutcome, ExclusiveRun, assess_and_evict,
    spawn_guardian_task,
};
