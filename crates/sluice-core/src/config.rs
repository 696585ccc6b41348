use std::time::Duration;

use crate::CoreError;

/// Default upper bound on simultaneous workers
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Default visibility timeout for in-progress runs
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default dispatcher pause when no run was dispatched
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(100);

/// Default dispatcher pause after an internal error
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_millis(1000);

/// Configuration for the queued executor
///
/// The visibility timeout is carried here so all recognized options
/// live in one place, but it is enforced by the queue: hand it to the
/// queue implementation at construction (the in-memory queue takes it
/// in `new`). It must be larger than the longest expected inter-element
/// gap of any flow, or healthy runs will be spuriously requeued.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on simultaneous workers
    pub max_concurrent: usize,

    /// Threshold after which an in-progress run with no recent
    /// heartbeat is considered stuck and requeued
    pub visibility_timeout: Duration,

    /// Dispatcher sleep between ticks that dispatched nothing
    pub idle_interval: Duration,

    /// Dispatcher sleep after an internal store or queue error
    pub error_backoff: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            idle_interval: DEFAULT_IDLE_INTERVAL,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }
}

impl ExecutorConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_concurrent < 1 {
            return Err(CoreError::ConfigurationError(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.visibility_timeout < Duration::from_secs(1) {
            return Err(CoreError::ConfigurationError(
                "visibility_timeout must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::default();

        assert_eq!(config.max_concurrent, 5);
        assert_eq!(config.visibility_timeout, Duration::from_secs(30));
        assert_eq!(config.idle_interval, Duration::from_millis(100));
        assert_eq!(config.error_backoff, Duration::from_millis(1000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let config = ExecutorConfig {
            max_concurrent: 0,
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(CoreError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_rejects_subsecond_visibility_timeout() {
        let config = ExecutorConfig {
            visibility_timeout: Duration::from_millis(100),
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(CoreError::ConfigurationError(_))
        ));
    }
}
