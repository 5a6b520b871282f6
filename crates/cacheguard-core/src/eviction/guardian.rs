//! Cache guardian implementation

use cacheguard_store::{CacheStore, KeyPattern, ScanCursor, StoreError, SweepLock};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::outcome::{Assessment, EvictionOutcome};
use crate::config::{GuardConfig, LockConfig};
use crate::error::{EvictionError, SweepStage};

/// Result of an exclusive (lease-guarded) invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ExclusiveRun {
    Completed(EvictionOutcome),
    /// Another process holds the sweep lease
    Skipped,
}

/// Keeps the cache under its memory ceiling by sweeping the evictable namespace
pub struct CacheGuardian {
    config: GuardConfig,
    pattern: KeyPattern,
}

impl CacheGuardian {
    /// Create a new guardian, validating the configuration
    pub fn new(config: GuardConfig) -> Result<Self, EvictionError> {
        let pattern = config.validate()?;

        info!(
            "Initializing cache guardian (pattern: {}, threshold: {}%, batch: {}, timeout: {:?})",
            config.key_pattern, config.threshold_percent, config.batch_size, config.operation_timeout
        );

        Ok(Self { config, pattern })
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Check memory pressure and sweep the evictable namespace if needed
    ///
    /// Below the threshold this reads memory info once and does nothing else.
    pub async fn assess_and_evict<S>(&self, store: &S) -> Result<EvictionOutcome, EvictionError>
    where
        S: CacheStore + ?Sized,
    {
        let outcome = EvictionOutcome::new(self.config.threshold_percent);

        let report = match self.bounded(SweepStage::MemoryInfo, store.memory_info()).await {
            Ok(report) => report,
            Err(source) => return Err(abort(SweepStage::MemoryInfo, source, outcome)),
        };

        let Some(used_percent) = report.used_percent() else {
            warn!(
                "Cache reports no memory ceiling (used: {} bytes); skipping threshold eviction, rely on TTL expiry",
                report.used_bytes
            );
            return Ok(outcome.assessed(Assessment::CeilingUnknown));
        };

        if used_percent <= self.config.threshold_percent {
            debug!(
                "Memory at {:.1}% ({} / {} bytes), below threshold {}%",
                used_percent, report.used_bytes, report.max_bytes, self.config.threshold_percent
            );
            return Ok(outcome.assessed(Assessment::BelowThreshold { used_percent }));
        }

        info!(
            used_bytes = report.used_bytes,
            max_bytes = report.max_bytes,
            "Memory at {:.1}% exceeds threshold {}%, sweeping {}",
            used_percent,
            self.config.threshold_percent,
            self.config.key_pattern
        );

        let mut outcome = outcome.assessed(Assessment::OverThreshold { used_percent });
        let started = Instant::now();
        self.sweep(store, &mut outcome).await?;

        info!(
            batches = outcome.scanned_batches,
            scan_calls = outcome.scan_calls,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Evicted {} keys matching {}",
            outcome.keys_deleted,
            self.config.key_pattern
        );
        Ok(outcome)
    }

    /// Cursor walk over the evictable namespace, deleting one batch at a time
    async fn sweep<S>(&self, store: &S, outcome: &mut EvictionOutcome) -> Result<(), EvictionError>
    where
        S: CacheStore + ?Sized,
    {
        let timeout = self.config.operation_timeout;
        let mut cursor = ScanCursor::START;

        loop {
            let scan = store.scan_keys(cursor, self.pattern.as_str(), self.config.batch_size);
            let batch = match self.bounded(SweepStage::Scan, scan).await {
                Ok(batch) => batch,
                Err(source) => return Err(abort(SweepStage::Scan, source, outcome.clone())),
            };
            outcome.scan_calls += 1;

            let (keys, foreign): (Vec<String>, Vec<String>) =
                batch.keys.into_iter().partition(|k| self.pattern.is_match(k));
            if !foreign.is_empty() {
                warn!(
                    "Store returned {} keys outside {}, leaving them untouched",
                    foreign.len(),
                    self.pattern
                );
            }

            if !keys.is_empty() {
                outcome.scanned_batches += 1;
                debug!("Deleting batch {} ({} keys)", outcome.scanned_batches, keys.len());

                let delete = store.delete_keys(&keys);
                tokio::pin!(delete);

                match tokio::time::timeout(timeout, &mut delete).await {
                    Ok(Ok(deleted)) => outcome.keys_deleted += deleted,
                    Ok(Err(source)) => {
                        return Err(abort(SweepStage::Delete, source, outcome.clone()));
                    }
                    Err(_) => {
                        // An issued DEL is never abandoned halfway; let it settle, then abort
                        warn!(
                            "Deleting {} keys exceeded {:?}, waiting for it to finish before aborting",
                            keys.len(),
                            timeout
                        );
                        let source = match delete.await {
                            Ok(deleted) => {
                                outcome.keys_deleted += deleted;
                                StoreError::Timeout(format!(
                                    "{} exceeded {:?}",
                                    SweepStage::Delete,
                                    timeout
                                ))
                            }
                            // The late failure is the real cause
                            Err(source) => source,
                        };
                        return Err(abort(SweepStage::Delete, source, outcome.clone()));
                    }
                }
            }

            if batch.cursor.is_start() {
                return Ok(());
            }
            cursor = batch.cursor;
        }
    }

    /// Run under the sweep lease so overlapping schedules do not double-scan
    ///
    /// The lease is released on every exit path once acquired.
    pub async fn assess_and_evict_exclusive<S>(
        &self,
        store: &S,
        lock: &LockConfig,
    ) -> Result<ExclusiveRun, EvictionError>
    where
        S: CacheStore + SweepLock + ?Sized,
    {
        let token = Uuid::new_v4().to_string();

        let acquired = self
            .bounded(SweepStage::Lock, store.try_acquire(&lock.name, &token, lock.ttl))
            .await
            .map_err(|source| {
                abort(
                    SweepStage::Lock,
                    source,
                    EvictionOutcome::new(self.config.threshold_percent),
                )
            })?;

        if !acquired {
            info!("Sweep lease {} is held elsewhere, skipping", lock.name);
            return Ok(ExclusiveRun::Skipped);
        }

        debug!("Acquired sweep lease {}", lock.name);
        let result = self.assess_and_evict(store).await;

        match self.bounded(SweepStage::Lock, store.release(&lock.name, &token)).await {
            Ok(true) => debug!("Released sweep lease {}", lock.name),
            Ok(false) => warn!("Sweep lease {} expired before release", lock.name),
            Err(e) => warn!("Failed to release sweep lease {}: {}", lock.name, e),
        }

        result.map(ExclusiveRun::Completed)
    }

    /// Bound a store call by the configured operation timeout
    async fn bounded<T, F>(&self, stage: SweepStage, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let timeout = self.config.operation_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(format!("{} exceeded {:?}", stage, timeout))),
        }
    }
}

fn abort(stage: SweepStage, source: StoreError, partial: EvictionOutcome) -> EvictionError {
    warn!(
        batches = partial.scanned_batches,
        keys_deleted = partial.keys_deleted,
        "Aborting eviction while {}: {}",
        stage,
        source
    );
    EvictionError::StoreUnavailable {
        stage,
        source,
        partial,
    }
}

/// One-off invocation: validate `config`, then assess and evict
pub async fn assess_and_evict<S>(
    store: &S,
    config: &GuardConfig,
) -> Result<EvictionOutcome, EvictionError>
where
    S: CacheStore + ?Sized,
{
    CacheGuardian::new(config.clone())?
        .assess_and_evict(store)
        .await
}

/// Spawn a background task that assesses the cache periodically
///
/// Each tick is an independent invocation; a failed tick is logged and the
/// next tick starts over.
pub fn spawn_guardian_task<S>(
    guardian: Arc<CacheGuardian>,
    store: Arc<S>,
    interval: Duration,
    lock: Option<LockConfig>,
) -> tokio::task::JoinHandle<()>
where
    S: CacheStore + SweepLock + 'static,
{
    info!("Starting background cache guardian (interval: {:?})", interval);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        // Skip the first tick (which fires immediately)
        ticker.tick().await;

        loop {
            ticker.tick().await;
            debug!("Running scheduled memory assessment");

            let result = match &lock {
                Some(lock) => guardian.assess_and_evict_exclusive(store.as_ref(), lock).await,
                None => guardian
                    .assess_and_evict(store.as_ref())
                    .await
                    .map(ExclusiveRun::Completed),
            };

            match result {
                Ok(ExclusiveRun::Completed(outcome)) => {
                    if outcome.triggered {
                        info!("Scheduled assessment: {}", outcome);
                    }
                }
                Ok(ExclusiveRun::Skipped) => {}
                Err(e) => warn!("Error during scheduled assessment: {}", e),
            }
        }
    })
}
