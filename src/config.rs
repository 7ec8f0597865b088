//! Immutable configuration records with validated builders
//!
//! Configs are built once, validated at `build()` time and then shared
//! freely. Durations serialize in human-readable form ("60s", "500ns").

use crate::classifier::{record_all, FailureClassifier};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

fn default_failure_rate_threshold() -> f32 {
    50.0
}

fn default_ring_buffer_size_closed() -> usize {
    100
}

fn default_ring_buffer_size_half_open() -> usize {
    10
}

fn default_wait_duration_in_open() -> Duration {
    Duration::from_secs(60)
}

fn default_classifier() -> Arc<dyn FailureClassifier> {
    Arc::new(record_all)
}

/// Circuit breaker configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failure rate percentage in (0, 100] at or above which the breaker trips
    #[serde(default = "default_failure_rate_threshold")]
    failure_rate_threshold: f32,

    /// Number of calls sampled while closed
    #[serde(default = "default_ring_buffer_size_closed")]
    ring_buffer_size_closed: usize,

    /// Number of trial calls sampled while half-open
    #[serde(default = "default_ring_buffer_size_half_open")]
    ring_buffer_size_half_open: usize,

    /// How long the breaker stays open before permitting a trial call
    #[serde(with = "humantime_serde", default = "default_wait_duration_in_open")]
    wait_duration_in_open: Duration,

    /// Decides which errors are recorded; not serializable, deserializes
    /// to the record-everything default
    #[serde(skip, default = "default_classifier")]
    classifier: Arc<dyn FailureClassifier>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: default_failure_rate_threshold(),
            ring_buffer_size_closed: default_ring_buffer_size_closed(),
            ring_buffer_size_half_open: default_ring_buffer_size_half_open(),
            wait_duration_in_open: default_wait_duration_in_open(),
            classifier: default_classifier(),
        }
    }
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("failure_rate_threshold", &self.failure_rate_threshold)
            .field("ring_buffer_size_closed", &self.ring_buffer_size_closed)
            .field("ring_buffer_size_half_open", &self.ring_buffer_size_half_open)
            .field("wait_duration_in_open", &self.wait_duration_in_open)
            .field("classifier", &"<dyn FailureClassifier>")
            .finish()
    }
}

// Classifiers are opaque closures; equality covers the numeric shape only.
impl PartialEq for CircuitBreakerConfig {
    fn eq(&self, other: &Self) -> bool {
        self.failure_rate_threshold == other.failure_rate_threshold
            && self.ring_buffer_size_closed == other.ring_buffer_size_closed
            && self.ring_buffer_size_half_open == other.ring_buffer_size_half_open
            && self.wait_duration_in_open == other.wait_duration_in_open
    }
}

impl CircuitBreakerConfig {
    /// Start building a configuration from the defaults
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    pub fn failure_rate_threshold(&self) -> f32 {
        self.failure_rate_threshold
    }

    pub fn ring_buffer_size_closed(&self) -> usize {
        self.ring_buffer_size_closed
    }

    pub fn ring_buffer_size_half_open(&self) -> usize {
        self.ring_buffer_size_half_open
    }

    pub fn wait_duration_in_open(&self) -> Duration {
        self.wait_duration_in_open
    }

    pub fn classifier(&self) -> &Arc<dyn FailureClassifier> {
        &self.classifier
    }
}

/// Builder for [`CircuitBreakerConfig`] with fluent API
#[derive(Clone)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl fmt::Debug for CircuitBreakerConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CircuitBreakerConfig::default(),
        }
    }

    /// Set the failure rate percentage at or above which the breaker trips
    pub fn failure_rate_threshold(mut self, threshold: f32) -> Self {
        self.config.failure_rate_threshold = threshold;
        self
    }

    /// Set how many calls are sampled while closed
    pub fn ring_buffer_size_closed(mut self, size: usize) -> Self {
        self.config.ring_buffer_size_closed = size;
        self
    }

    /// Set how many trial calls are sampled while half-open
    pub fn ring_buffer_size_half_open(mut self, size: usize) -> Self {
        self.config.ring_buffer_size_half_open = size;
        self
    }

    /// Set how long the breaker stays open before probing recovery
    pub fn wait_duration_in_open(mut self, wait: Duration) -> Self {
        self.config.wait_duration_in_open = wait;
        self
    }

    /// Set the classifier deciding which errors are recorded as failures
    pub fn classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.config.classifier = classifier;
        self
    }

    /// Validate and produce the configuration
    pub fn build(self) -> Result<CircuitBreakerConfig, ConfigError> {
        let c = &self.config;
        if !(c.failure_rate_threshold > 0.0 && c.failure_rate_threshold <= 100.0) {
            return Err(ConfigError::FailureRateThreshold(c.failure_rate_threshold));
        }
        if c.ring_buffer_size_closed < 1 {
            return Err(ConfigError::RingBufferSizeClosed(c.ring_buffer_size_closed));
        }
        if c.ring_buffer_size_half_open < 1 {
            return Err(ConfigError::RingBufferSizeHalfOpen(
                c.ring_buffer_size_half_open,
            ));
        }
        Ok(self.config)
    }
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_timeout_duration() -> Duration {
    Duration::from_secs(5)
}

fn default_limit_refresh_period() -> Duration {
    Duration::from_nanos(500)
}

fn default_limit_for_period() -> u64 {
    50
}

/// Rate limiter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// How long a caller is willing to wait for a permit
    #[serde(with = "humantime_serde", default = "default_timeout_duration")]
    timeout_duration: Duration,

    /// Length of one permission cycle
    #[serde(with = "humantime_serde", default = "default_limit_refresh_period")]
    limit_refresh_period: Duration,

    /// Permits issued per cycle
    #[serde(default = "default_limit_for_period")]
    limit_for_period: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            timeout_duration: default_timeout_duration(),
            limit_refresh_period: default_limit_refresh_period(),
            limit_for_period: default_limit_for_period(),
        }
    }
}

impl RateLimiterConfig {
    /// Start building a configuration from the defaults
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout_duration
    }

    pub fn limit_refresh_period(&self) -> Duration {
        self.limit_refresh_period
    }

    pub fn limit_for_period(&self) -> u64 {
        self.limit_for_period
    }

    pub(crate) fn with_limit_for_period(&self, limit: u64) -> Self {
        Self {
            limit_for_period: limit,
            ..self.clone()
        }
    }

    pub(crate) fn with_timeout_duration(&self, timeout: Duration) -> Self {
        Self {
            timeout_duration: timeout,
            ..self.clone()
        }
    }
}

/// Builder for [`RateLimiterConfig`] with fluent API
#[derive(Debug, Clone)]
pub struct RateLimiterConfigBuilder {
    config: RateLimiterConfig,
}

impl RateLimiterConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RateLimiterConfig::default(),
        }
    }

    /// Set how long callers wait for a permit before giving up
    pub fn timeout_duration(mut self, timeout: Duration) -> Self {
        self.config.timeout_duration = timeout;
        self
    }

    /// Set the cycle length after which permits are replenished
    pub fn limit_refresh_period(mut self, period: Duration) -> Self {
        self.config.limit_refresh_period = period;
        self
    }

    /// Set how many permits each cycle grants
    pub fn limit_for_period(mut self, limit: u64) -> Self {
        self.config.limit_for_period = limit;
        self
    }

    /// Validate and produce the configuration
    pub fn build(self) -> Result<RateLimiterConfig, ConfigError> {
        if self.config.limit_refresh_period.is_zero() {
            return Err(ConfigError::LimitRefreshPeriod);
        }
        if self.config.limit_for_period < 1 {
            return Err(ConfigError::LimitForPeriod(self.config.limit_for_period));
        }
        Ok(self.config)
    }
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
