//! Cacheguard - memory-pressure eviction for a shared Redis cache

use anyhow::Result;
use cacheguard_core::{
    CacheGuardian, EvictionError, EvictionOutcome, ExclusiveRun, SweepStage, spawn_guardian_task,
};
use cacheguard_store::RedisStore;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::Config;

/// Cacheguard - evicts the cache namespace when Redis nears its memory ceiling
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Redis connection URL
    #[arg(long, env = "CACHEGUARD_REDIS_URL")]
    redis_url: Option<String>,

    /// Glob of evictable keys
    #[arg(long, env = "CACHEGUARD_KEY_PATTERN")]
    key_pattern: Option<String>,

    /// Usage percentage that triggers a sweep
    #[arg(long, env = "CACHEGUARD_THRESHOLD")]
    threshold: Option<f64>,

    /// Keys requested per scan call
    #[arg(long, env = "CACHEGUARD_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Keep running and assess on the configured interval
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let (mut config, source) = Config::load(&args.config)?;
    apply_overrides(&mut config, &args);

    // Initialize logging
    init_logging(&config.logging.level, &config.logging.format);

    info!("Starting Cacheguard v{}", env!("CARGO_PKG_VERSION"));
    info!("{}", source);

    if args.watch {
        run_watch(&config).await
    } else {
        run_once(&config).await
    }
}

/// Command-line and environment values win over the file
fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(url) = &args.redis_url {
        config.redis.url = url.clone();
    }
    if let Some(pattern) = &args.key_pattern {
        config.eviction.key_pattern = pattern.clone();
    }
    if let Some(threshold) = args.threshold {
        config.eviction.threshold_percent = threshold;
    }
    if let Some(batch_size) = args.batch_size {
        config.eviction.batch_size = batch_size;
    }
}

/// Assess once, print a one-line summary and exit
///
/// Every failure, including a rejected config or an unreachable store,
/// still prints its summary line before the non-zero exit.
async fn run_once(config: &Config) -> Result<()> {
    let result = sweep_once(config).await;
    println!("{}", summary_line(&result));
    result.map(|_| ()).map_err(anyhow::Error::from)
}

/// Validate, connect and run one assessment
async fn sweep_once(config: &Config) -> Result<ExclusiveRun, EvictionError> {
    let guardian = CacheGuardian::new(config.guard_config())?;

    // The connection lives for this scope only and is closed on every exit path
    let store = RedisStore::connect(&config.store_config())
        .await
        .map_err(|source| EvictionError::StoreUnavailable {
            stage: SweepStage::Connect,
            source,
            partial: EvictionOutcome::new(guardian.config().threshold_percent),
        })?;

    match config.lock_config() {
        Some(lock) => guardian.assess_and_evict_exclusive(&store, &lock).await,
        None => guardian
            .assess_and_evict(&store)
            .await
            .map(ExclusiveRun::Completed),
    }
}

/// Assess on a fixed interval until Ctrl-C
async fn run_watch(config: &Config) -> Result<()> {
    let guardian = CacheGuardian::new(config.guard_config())?;
    let store = Arc::new(RedisStore::connect(&config.store_config()).await?);

    let task = spawn_guardian_task(
        Arc::new(guardian),
        store,
        config.interval(),
        config.lock_config(),
    );

    shutdown_signal().await;
    task.abort();

    info!("Guardian stopped");
    Ok(())
}

fn summary_line(result: &Result<ExclusiveRun, EvictionError>) -> String {
    match result {
        Ok(ExclusiveRun::Completed(outcome)) => outcome.to_string(),
        Ok(ExclusiveRun::Skipped) => "another sweep holds the lease; nothing to do".to_string(),
        Err(e) => failure_summary(e),
    }
}

fn failure_summary(error: &EvictionError) -> String {
    match error.partial() {
        Some(partial) if error.is_partial_sweep() => format!(
            "sweep aborted after {} batches ({} keys deleted): {}",
            partial.scanned_batches, partial.keys_deleted, error
        ),
        _ => format!("eviction failed: {}", error),
    }
}

/// Initialize logging
///
/// Logs go to stderr so stdout carries only the summary line.
fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use cacheguard_core::Assessment;
    use cacheguard_store::StoreError;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["cacheguard"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut config = Config::default();
        let args = args(&[
            "--redis-url",
            "redis://other:6379",
            "--key-pattern",
            "tmp:*",
            "--threshold",
            "65",
            "--batch-size",
            "500",
        ]);
        apply_overrides(&mut config, &args);

        assert_eq!(config.redis.url, "redis://other:6379");
        let guard = config.guard_config();
        assert_eq!(guard.key_pattern, "tmp:*");
        assert_eq!(guard.threshold_percent, 65.0);
        assert_eq!(guard.batch_size, 500);
    }

    #[test]
    fn test_no_overrides_keeps_file_values() {
        let mut config = Config::default();
        config.eviction.batch_size = 42;
        apply_overrides(&mut config, &args(&[]));
        assert_eq!(config.eviction.batch_size, 42);
        assert!(!args(&[]).watch);
    }

    #[tokio::test]
    async fn test_rejected_config_still_summarized() {
        let mut config = Config::default();
        apply_overrides(&mut config, &args(&["--key-pattern", "*"]));

        let result = sweep_once(&config).await;

        assert!(matches!(result, Err(EvictionError::InvalidConfig(_))));
        assert!(
            summary_line(&result).starts_with("eviction failed: Invalid configuration: "),
            "{}",
            summary_line(&result)
        );
    }

    #[tokio::test]
    async fn test_connect_failure_still_summarized() {
        let mut config = Config::default();
        apply_overrides(&mut config, &args(&["--redis-url", "not a redis url"]));

        let result = sweep_once(&config).await;

        let error = result.as_ref().unwrap_err();
        assert_eq!(error.stage(), Some(SweepStage::Connect));
        assert_eq!(error.partial().unwrap().assessment, Assessment::Pending);
        assert!(
            summary_line(&result)
                .starts_with("eviction failed: Store unavailable while connecting to the store: "),
            "{}",
            summary_line(&result)
        );
    }

    #[test]
    fn test_summary_line_for_successes() {
        let outcome = EvictionOutcome {
            scanned_batches: 0,
            scan_calls: 0,
            keys_deleted: 0,
            triggered: false,
            assessment: Assessment::BelowThreshold { used_percent: 75.0 },
            threshold_percent: 80.0,
        };
        assert_eq!(
            summary_line(&Ok(ExclusiveRun::Completed(outcome))),
            "memory at 75.0% (threshold 80.0%); no eviction needed"
        );
        assert_eq!(
            summary_line(&Ok(ExclusiveRun::Skipped)),
            "another sweep holds the lease; nothing to do"
        );
    }

    #[test]
    fn test_failure_summary_for_partial_sweep() {
        let partial = EvictionOutcome {
            scanned_batches: 2,
            scan_calls: 2,
            keys_deleted: 100,
            triggered: true,
            assessment: Assessment::OverThreshold { used_percent: 95.0 },
            threshold_percent: 80.0,
        };
        let error = EvictionError::StoreUnavailable {
            stage: SweepStage::Delete,
            source: StoreError::Timeout("DEL".to_string()),
            partial,
        };
        assert_eq!(
            failure_summary(&error),
            "sweep aborted after 2 batches (100 keys deleted): \
             Store unavailable while deleting keys: Operation timed out: DEL"
        );
    }

    #[test]
    fn test_failure_summary_before_any_batch() {
        let partial = EvictionOutcome {
            scanned_batches: 0,
            scan_calls: 0,
            keys_deleted: 0,
            triggered: false,
            assessment: Assessment::Pending,
            threshold_percent: 80.0,
        };
        let error = EvictionError::StoreUnavailable {
            stage: SweepStage::MemoryInfo,
            source: StoreError::Connection("refused".to_string()),
            partial,
        };
        assert!(failure_summary(&error).starts_with("eviction failed: "));
    }
}
