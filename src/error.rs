//! Error types for circuit breaker and rate limiter operations

use std::fmt;
use thiserror::Error;

/// Errors raised while building configuration objects or constructing
/// named instances. Each variant names the offending field.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// `failure_rate_threshold` must lie within (0, 100]
    #[error("failure_rate_threshold must be within (0, 100], got {0}")]
    FailureRateThreshold(f32),
    /// `ring_buffer_size_closed` must hold at least one call
    #[error("ring_buffer_size_closed must be at least 1, got {0}")]
    RingBufferSizeClosed(usize),
    /// `ring_buffer_size_half_open` must hold at least one call
    #[error("ring_buffer_size_half_open must be at least 1, got {0}")]
    RingBufferSizeHalfOpen(usize),
    /// `limit_refresh_period` must be a positive duration
    #[error("limit_refresh_period must be greater than zero")]
    LimitRefreshPeriod,
    /// `limit_for_period` must issue at least one permit per cycle
    #[error("limit_for_period must be at least 1, got {0}")]
    LimitForPeriod(u64),
    /// Instance names identify registry entries and must be non-empty
    #[error("name must not be empty")]
    EmptyName,
}

/// Errors returned by the `call` decorators.
///
/// Policy denials (`CircuitOpen`, `RequestNotPermitted`) mean the guarded
/// closure never ran. `Execution` carries the closure's own error back to
/// the caller unchanged.
#[derive(Debug)]
pub enum CallError<E = Box<dyn std::error::Error + Send + Sync>> {
    /// The circuit is open, calls are rejected without running
    CircuitOpen { circuit: String },
    /// No permit could be acquired within the configured timeout
    RequestNotPermitted { limiter: String },
    /// The guarded call ran and failed
    Execution(E),
}

impl<E: fmt::Display> fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::CircuitOpen { circuit } => {
                write!(f, "circuit '{}' is open", circuit)
            }
            CallError::RequestNotPermitted { limiter } => {
                write!(f, "rate limiter '{}' did not permit the call", limiter)
            }
            CallError::Execution(e) => write!(f, "guarded call failed: {}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for CallError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CallError::Execution(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> CallError<E> {
    /// True when the error is a policy denial rather than a failure of the
    /// guarded call itself.
    pub fn is_denial(&self) -> bool {
        !matches!(self, CallError::Execution(_))
    }

    /// Recover the original error of the guarded call, if it ran.
    pub fn into_execution_error(self) -> Option<E> {
        match self {
            CallError::Execution(e) => Some(e),
            _ => None,
        }
    }
}
