//! Sweep outcome types

use std::fmt;

/// How the guardian judged memory pressure
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Assessment {
    /// Memory usage has not been read yet
    Pending,
    /// The store has no memory ceiling; fall back to TTL-based expiry
    CeilingUnknown,
    /// Usage at or below the threshold
    BelowThreshold { used_percent: f64 },
    /// Usage above the threshold
    OverThreshold { used_percent: f64 },
}

impl Assessment {
    pub fn used_percent(&self) -> Option<f64> {
        match self {
            Assessment::BelowThreshold { used_percent }
            | Assessment::OverThreshold { used_percent } => Some(*used_percent),
            Assessment::Pending | Assessment::CeilingUnknown => None,
        }
    }
}

/// Result of one guardian invocation
#[derive(Debug, Clone, PartialEq)]
pub struct EvictionOutcome {
    /// Batches that held evictable keys and were sent for deletion
    pub scanned_batches: u64,
    /// Scan round-trips made, including ones that returned no keys
    pub scan_calls: u64,
    /// Keys the store reported as deleted
    pub keys_deleted: u64,
    /// Whether usage was over the threshold and a sweep ran
    pub triggered: bool,
    pub assessment: Assessment,
    pub threshold_percent: f64,
}

impl EvictionOutcome {
    /// Empty outcome for an invocation that has not read memory usage yet
    pub fn new(threshold_percent: f64) -> Self {
        Self {
            scanned_batches: 0,
            scan_calls: 0,
            keys_deleted: 0,
            triggered: false,
            assessment: Assessment::Pending,
            threshold_percent,
        }
    }

    pub(crate) fn assessed(mut self, assessment: Assessment) -> Self {
        self.triggered = matches!(assessment, Assessment::OverThreshold { .. });
        self.assessment = assessment;
        self
    }
}

impl fmt::Display for EvictionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.assessment {
            Assessment::Pending => write!(f, "memory usage not read; nothing evicted"),
            Assessment::CeilingUnknown => write!(
                f,
                "no memory ceiling configured; eviction skipped, relying on TTL expiry"
            ),
            Assessment::BelowThreshold { used_percent } => write!(
                f,
                "memory at {:.1}% (threshold {:.1}%); no eviction needed",
                used_percent, self.threshold_percent
            ),
            Assessment::OverThreshold { used_percent } => write!(
                f,
                "memory at {:.1}% (threshold {:.1}%); evicted {} keys in {} batches",
                used_percent, self.threshold_percent, self.keys_deleted, self.scanned_batches
            ),
        }
    }
}
