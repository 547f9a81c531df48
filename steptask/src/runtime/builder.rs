use super::Scheduler;
use crate::error::TaskError;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time a shutdown waits for outstanding tasks.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(18);

/// Default number of post-queue passes per tick.
pub const DEFAULT_POST_PASSES: usize = 5;

/// Tunables of a [`Scheduler`].
///
/// Every field has a default, so a partial document is enough:
///
/// ```rust,ignore
/// let config = SchedulerConfig::from_json(r#"{ "shutdown_timeout_ms": 500 }"#)?;
/// let scheduler = SchedulerBuilder::new().config(config).build();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How long `shutdown` waits before force-cancelling stragglers.
    pub shutdown_timeout_ms: u64,

    /// Upper bound on post-queue drain passes per tick iteration.
    pub post_passes: usize,

    /// Report reentrant `tick` calls through the internal-error listeners.
    pub detect_reentrancy: bool,
}

impl SchedulerConfig {
    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json(document: &str) -> Result<Self, TaskError> {
        let config: Self = serde_json::from_str(document).map_err(TaskError::new)?;

        if config.post_passes == 0 {
            return Err(TaskError::InvalidArgument("post_passes must be > 0"));
        }

        Ok(config)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT.as_millis() as u64,
            post_passes: DEFAULT_POST_PASSES,
            detect_reentrancy: cfg!(debug_assertions),
        }
    }
}

/// Builder for configuring and creating a scheduler.
///
/// # Examples
///
/// ```rust,ignore
/// let scheduler = SchedulerBuilder::new()
///     .shutdown_timeout(Duration::from_millis(100))
///     .post_passes(3)
///     .build();
/// ```
pub struct SchedulerBuilder {
    config: SchedulerConfig,
}

impl SchedulerBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets how long a shutdown may wait for outstanding tasks.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the number of post-queue passes per tick iteration.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn post_passes(mut self, n: usize) -> Self {
        assert!(n > 0, "post_passes must be > 0");

        self.config.post_passes = n;
        self
    }

    pub fn detect_reentrancy(mut self, enabled: bool) -> Self {
        self.config.detect_reentrancy = enabled;
        self
    }

    pub fn build(self) -> Scheduler {
        Scheduler::with_config(self.config)
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
