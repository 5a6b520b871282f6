//! Store capability traits

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::error::StoreError;

/// Memory usage reported by the store
///
/// `max_bytes == 0` means no ceiling is configured, which is common on
/// managed cache tiers and is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryReport {
    /// Bytes currently in use
    pub used_bytes: u64,
    /// Configured memory ceiling in bytes (0 = none)
    pub max_bytes: u64,
}

impl MemoryReport {
    pub fn new(used_bytes: u64, max_bytes: u64) -> Self {
        Self {
            used_bytes,
            max_bytes,
        }
    }

    /// Check if the store has a memory ceiling configured
    pub fn has_ceiling(&self) -> bool {
        self.max_bytes > 0
    }

    /// Usage as a percentage of the ceiling, `None` when there is no ceiling
    pub fn used_percent(&self) -> Option<f64> {
        if !self.has_ceiling() {
            return None;
        }
        Some(self.used_bytes as f64 * 100.0 / self.max_bytes as f64)
    }
}

/// Continuation token for a cursor-based key scan
///
/// `ScanCursor::START` both begins a walk and, when handed back by the
/// store, marks the walk as complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScanCursor(u64);

impl ScanCursor {
    pub const START: ScanCursor = ScanCursor(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_start(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ScanCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One page of a key scan
#[derive(Debug, Clone, Default)]
pub struct ScanBatch {
    /// Cursor to pass to the next call
    pub cursor: ScanCursor,
    /// Keys returned by this call (may be empty even when the walk continues)
    pub keys: Vec<String>,
}

impl ScanBatch {
    /// Check if the store signalled the end of the walk
    pub fn is_last(&self) -> bool {
        self.cursor.is_start()
    }
}

/// Store capabilities required by the eviction sweep
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch current and ceiling memory usage
    async fn memory_info(&self) -> Result<MemoryReport, StoreError>;

    /// Scan one page of keys matching a glob pattern
    ///
    /// `count` is a hint for how much of the keyspace to visit per call.
    async fn scan_keys(
        &self,
        cursor: ScanCursor,
        pattern: &str,
        count: usize,
    ) -> Result<ScanBatch, StoreError>;

    /// Delete keys in bulk, returning how many existed
    ///
    /// Deleting an empty slice or already-absent keys is not an error.
    async fn delete_keys(&self, keys: &[String]) -> Result<u64, StoreError>;
}

/// Named lease used to serialize sweeps across processes
#[async_trait]
pub trait SweepLock: Send + Sync {
    /// Try to take the lease; returns false if someone else holds it
    async fn try_acquire(&self, name: &str, token: &str, ttl: Duration)
        -> Result<bool, StoreError>;

    /// Release the lease if `token` still owns it
    async fn release(&self, name: &str, token: &str) -> Result<bool, StoreError>;
}
