//! Core error types

use cacheguard_store::StoreError;
use std::fmt;
use thiserror::Error;

use crate::eviction::EvictionOutcome;

/// Step of an invocation that talks to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepStage {
    /// Opening the store connection, before any invocation starts
    Connect,
    MemoryInfo,
    Scan,
    Delete,
    Lock,
}

impl fmt::Display for SweepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            SweepStage::Connect => "connecting to the store",
            SweepStage::MemoryInfo => "reading memory info",
            SweepStage::Scan => "scanning keys",
            SweepStage::Delete => "deleting keys",
            SweepStage::Lock => "managing the sweep lease",
        };
        f.write_str(stage)
    }
}

#[derive(Error, Debug)]
pub enum EvictionError {
    /// The store failed or timed out; `partial` is what was done before the abort
    #[error("Store unavailable while {stage}: {source}")]
    StoreUnavailable {
        stage: SweepStage,
        #[source]
        source: StoreError,
        partial: EvictionOutcome,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EvictionError {
    /// Outcome accumulated before the sweep was aborted
    pub fn partial(&self) -> Option<&EvictionOutcome> {
        match self {
            EvictionError::StoreUnavailable { partial, .. } => Some(partial),
            EvictionError::InvalidConfig(_) => None,
        }
    }

    pub fn stage(&self) -> Option<SweepStage> {
        match self {
            EvictionError::StoreUnavailable { stage, .. } => Some(*stage),
            EvictionError::InvalidConfig(_) => None,
        }
    }

    /// Check if the sweep had already started working through batches.
    /// The namespace glob is stable, so the next run picks up what is left.
    pub fn is_partial_sweep(&self) -> bool {
        self.partial().is_some_and(|p| p.scanned_batches > 0)
    }
}
