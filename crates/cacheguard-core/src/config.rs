//! Guardian configuration types
//!
//! File and CLI loading lives in the `cacheguard` binary; these are the
//! validated settings the guardian itself runs with.

use cacheguard_store::KeyPattern;
use std::time::Duration;

use crate::error::EvictionError;

/// Configuration for the cache guardian
#[derive(Debug, Clone, PartialEq)]
pub struct GuardConfig {
    /// Glob naming the evictable namespace
    pub key_pattern: String,
    /// Usage percentage above which a sweep runs
    pub threshold_percent: f64,
    /// Keys requested per scan call
    pub batch_size: usize,
    /// Upper bound for each store call
    pub operation_timeout: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            key_pattern: "cache:*".to_string(),
            threshold_percent: 80.0,
            batch_size: 100,
            operation_timeout: Duration::from_secs(5),
        }
    }
}

impl GuardConfig {
    /// Validate the settings and compile the key pattern
    pub fn validate(&self) -> Result<KeyPattern, EvictionError> {
        if self.batch_size == 0 {
            return Err(EvictionError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }

        if !self.threshold_percent.is_finite()
            || self.threshold_percent <= 0.0
            || self.threshold_percent > 100.0
        {
            return Err(EvictionError::InvalidConfig(format!(
                "threshold_percent must be in (0, 100], got {}",
                self.threshold_percent
            )));
        }

        if self.operation_timeout.is_zero() {
            return Err(EvictionError::InvalidConfig(
                "operation_timeout must be greater than zero".to_string(),
            ));
        }

        validate_key_pattern(&self.key_pattern)
    }
}

/// Validate an evictable namespace pattern
///
/// The pattern must start with literal text; anything that can match from
/// the first character (`*`, `?x`, `[ab]*`) would reach keys of unrelated
/// namespaces such as sessions or auth tokens.
pub fn validate_key_pattern(pattern: &str) -> Result<KeyPattern, EvictionError> {
    if pattern.trim().is_empty() {
        return Err(EvictionError::InvalidConfig(
            "key_pattern cannot be empty".to_string(),
        ));
    }

    let compiled =
        KeyPattern::parse(pattern).map_err(|e| EvictionError::InvalidConfig(e.to_string()))?;

    if compiled.literal_prefix().is_empty() {
        return Err(EvictionError::InvalidConfig(format!(
            "key_pattern '{}' must begin with a literal namespace prefix",
            pattern
        )));
    }

    Ok(compiled)
}

/// Lease settings for exclusive sweeps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// Key holding the lease
    pub name: String,
    /// Lease lifetime; bounds how long a crashed holder blocks others
    pub ttl: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            name: "cacheguard:lock".to_string(),
            ttl: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(pattern: &str, threshold: f64, batch: usize) -> GuardConfig {
        GuardConfig {
            key_pattern: pattern.to_string(),
            threshold_percent: threshold,
            batch_size: batch,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = GuardConfig::default();
        assert_eq!(config.key_pattern, "cache:*");
        assert_eq!(config.threshold_percent, 80.0);
        assert_eq!(config.batch_size, 100);

        let pattern = config.validate().unwrap();
        assert_eq!(pattern.literal_prefix(), "cache:");
    }

    #[test]
    fn test_rejects_whole_keyspace_patterns() {
        for pattern in ["*", "**", "?cache", "[ab]:*", "", "   "] {
            assert!(
                validate_key_pattern(pattern).is_err(),
                "pattern {:?} should be rejected",
                pattern
            );
        }
    }

    #[test]
    fn test_rejects_malformed_pattern() {
        assert!(matches!(
            validate_key_pattern("cache:[oops"),
            Err(EvictionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_bad_threshold() {
        assert!(config_with("cache:*", 0.0, 100).validate().is_err());
        assert!(config_with("cache:*", -5.0, 100).validate().is_err());
        assert!(config_with("cache:*", 150.0, 100).validate().is_err());
        assert!(config_with("cache:*", f64::NAN, 100).validate().is_err());
        assert!(config_with("cache:*", 100.0, 100).validate().is_ok());
        assert!(config_with("cache:*", 0.5, 100).validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_batch() {
        assert!(config_with("cache:*", 80.0, 0).validate().is_err());
        assert!(config_with("cache:*", 80.0, 1).validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config = GuardConfig {
            operation_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
