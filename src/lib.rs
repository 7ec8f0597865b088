//! fusebox - fault-tolerance primitives
//!
//! This crate provides two coupled resilience mechanisms:
//! - A circuit breaker that trips open when the observed failure rate over a
//!   sliding window of recent calls reaches a threshold
//! - Rate limiters that cap how many permits are issued per time cycle
//!
//! Both are safe to share across threads, publish their state changes and
//! call outcomes on per-instance event streams, and come with `call`
//! decorators that wrap arbitrary fallible operations.
//!
//! # Example
//!
//! ```rust
//! use fusebox::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
//!
//! let config = CircuitBreakerConfig::builder()
//!     .failure_rate_threshold(50.0)
//!     .ring_buffer_size_closed(10)
//!     .build()
//!     .expect("valid configuration");
//! let breaker = CircuitBreaker::new("backend", config).expect("valid name");
//!
//! let response = breaker.call(|| {
//!     // Your service call here
//!     Ok::<_, std::io::Error>("success")
//! });
//!
//! assert!(response.is_ok());
//! assert_eq!(breaker.state(), CircuitState::Closed);
//! ```
//!
//! Rate limiting works the same way through the [`RateLimiter`] trait:
//!
//! ```rust
//! use fusebox::{AtomicRateLimiter, RateLimiter, RateLimiterConfig};
//! use std::time::Duration;
//!
//! let config = RateLimiterConfig::builder()
//!     .limit_for_period(10)
//!     .limit_refresh_period(Duration::from_millis(100))
//!     .timeout_duration(Duration::ZERO)
//!     .build()
//!     .expect("valid configuration");
//! let limiter = AtomicRateLimiter::new("api", config).expect("valid name");
//!
//! assert!(limiter.acquire_permission(Duration::ZERO));
//! ```

pub mod circuit;
pub mod classifier;
pub mod config;
pub mod error;
pub mod events;
pub mod rate_limiter;
pub mod registry;
pub mod ring_buffer;

pub use circuit::{CircuitBreaker, CircuitBreakerMetrics, CircuitState};
pub use classifier::{ignore_errors, record_all, FailureClassifier, FailureContext};
pub use config::{
    CircuitBreakerConfig, CircuitBreakerConfigBuilder, RateLimiterConfig, RateLimiterConfigBuilder,
};
pub use error::{CallError, ConfigError};
pub use events::{
    CircuitBreakerEvent, CircuitBreakerEventKind, EventStream, RateLimiterEvent,
    RateLimiterEventKind, SubscriptionId,
};
pub use rate_limiter::{
    AtomicRateLimiter, RateLimiter, RateLimiterMetrics, SemaphoreRateLimiter,
};
pub use registry::{CircuitBreakerRegistry, RateLimiterRegistry, Registry};
pub use ring_buffer::RingBitBuffer;
