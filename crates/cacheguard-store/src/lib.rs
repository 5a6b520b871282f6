//! Cacheguard Store Layer
//!
//! This crate provides the store capability contract used by the eviction
//! guardian, plus a Redis backend and an in-process backend.

pub mod backend;
pub mod error;
pub mod memory;
pub mod pattern;
pub mod redis_store;

pub use backend::{CacheStore, MemoryReport, ScanBatch, ScanCursor, SweepLock};
pub use error::StoreError;
pub use memory::{MemoryStore, StoreStats};
pub use pattern::KeyPattern;
pub use redis_store::{RedisStore, RedisStoreConfig, parse_memory_info, parse_scan_reply};
