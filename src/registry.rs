//! Registries interning named circuit breakers and rate limiters
//!
//! A registry hands out one shared instance per name, creating it on first
//! use. Typically held as a process-wide singleton so every call site that
//! guards the same backend shares the same state.

use crate::circuit::CircuitBreaker;
use crate::config::{CircuitBreakerConfig, RateLimiterConfig};
use crate::error::ConfigError;
use crate::rate_limiter::AtomicRateLimiter;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Concurrent name→instance map with create-on-miss semantics
#[derive(Debug)]
pub struct Registry<T> {
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the instance registered under `name`, creating it with `init`
    /// if absent. Idempotent per name: every caller gets the same instance.
    pub fn get_or_create<F>(&self, name: &str, init: F) -> Arc<T>
    where
        F: FnOnce() -> Arc<T>,
    {
        if let Some(existing) = self.entries.read().get(name) {
            return Arc::clone(existing);
        }
        let mut entries = self.entries.write();
        Arc::clone(entries.entry(name.to_string()).or_insert_with(init))
    }

    /// Return the instance registered under `name`, if any.
    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries.read().get(name).map(Arc::clone)
    }

    /// All registered instances, in no particular order.
    pub fn all(&self) -> Vec<Arc<T>> {
        self.entries.read().values().map(Arc::clone).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Manages all [`CircuitBreaker`] instances of an application
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    default_config: CircuitBreakerConfig,
    breakers: Registry<CircuitBreaker>,
}

impl CircuitBreakerRegistry {
    /// Create a registry whose on-miss instances use `default_config`.
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            breakers: Registry::new(),
        }
    }

    /// Create a registry using the default breaker configuration.
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Return the breaker named `name`, creating it with the registry's
    /// default configuration if absent.
    pub fn breaker(&self, name: &str) -> Result<Arc<CircuitBreaker>, ConfigError> {
        self.breaker_with(name, || self.default_config.clone())
    }

    /// Return the breaker named `name`, creating it with the supplied
    /// configuration if absent. The supplier only runs on a miss.
    pub fn breaker_with<F>(&self, name: &str, config: F) -> Result<Arc<CircuitBreaker>, ConfigError>
    where
        F: FnOnce() -> CircuitBreakerConfig,
    {
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        Ok(self.breakers.get_or_create(name, || {
            tracing::debug!(circuit = %name, "registered circuit breaker");
            Arc::new(CircuitBreaker::new_unchecked(name.to_string(), config()))
        }))
    }

    /// All breakers created so far.
    pub fn all(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers.all()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Manages all rate limiter instances of an application
#[derive(Debug)]
pub struct RateLimiterRegistry {
    default_config: RateLimiterConfig,
    limiters: Registry<AtomicRateLimiter>,
}

impl RateLimiterRegistry {
    /// Create a registry whose on-miss instances use `default_config`.
    pub fn new(default_config: RateLimiterConfig) -> Self {
        Self {
            default_config,
            limiters: Registry::new(),
        }
    }

    /// Create a registry using the default limiter configuration.
    pub fn with_defaults() -> Self {
        Self::new(RateLimiterConfig::default())
    }

    /// Return the limiter named `name`, creating it with the registry's
    /// default configuration if absent.
    pub fn limiter(&self, name: &str) -> Result<Arc<AtomicRateLimiter>, ConfigError> {
        self.limiter_with(name, || self.default_config.clone())
    }

    /// Return the limiter named `name`, creating it with the supplied
    /// configuration if absent. The supplier only runs on a miss.
    pub fn limiter_with<F>(&self, name: &str, config: F) -> Result<Arc<AtomicRateLimiter>, ConfigError>
    where
        F: FnOnce() -> RateLimiterConfig,
    {
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        Ok(self.limiters.get_or_create(name, || {
            tracing::debug!(limiter = %name, "registered rate limiter");
            Arc::new(AtomicRateLimiter::new_unchecked(
                name.to_string(),
                config(),
            ))
        }))
    }

    /// All limiters created so far.
    pub fn all(&self) -> Vec<Arc<AtomicRateLimiter>> {
        self.limiters.all()
    }
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
