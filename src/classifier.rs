//! Failure classification for error filtering
//!
//! Decides which errors reported to a circuit breaker count toward its
//! failure rate and which are rethrown without being recorded.

use std::error::Error;

/// Context handed to classifiers for each reported error
#[derive(Debug)]
pub struct FailureContext<'a> {
    /// Circuit name
    pub circuit_name: &'a str,
    /// The error that occurred (can be downcast to specific types)
    pub error: &'a (dyn Error + 'static),
}

/// Decides whether an error counts as a recorded failure.
///
/// Returning `true` records the error in the failure statistics; returning
/// `false` leaves the statistics untouched and the error is only published
/// as an ignored-error event. Every `Fn(&FailureContext) -> bool` closure
/// is a classifier, so common filters need no dedicated type:
///
/// ```rust
/// use fusebox::{CircuitBreakerConfig, FailureContext};
/// use std::sync::Arc;
///
/// // Timeouts trip the circuit, everything else is rethrown unrecorded
/// let config = CircuitBreakerConfig::builder()
///     .classifier(Arc::new(|ctx: &FailureContext| {
///         ctx.error
///             .downcast_ref::<std::io::Error>()
///             .map(|e| e.kind() == std::io::ErrorKind::TimedOut)
///             .unwrap_or(true)
///     }))
///     .build()
///     .unwrap();
/// # let _ = config;
/// ```
pub trait FailureClassifier: Send + Sync {
    /// Determine whether this error should count as a recorded failure.
    fn should_record(&self, ctx: &FailureContext<'_>) -> bool;
}

impl<F> FailureClassifier for F
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    fn should_record(&self, ctx: &FailureContext<'_>) -> bool {
        self(ctx)
    }
}

/// The default classifier: every error counts toward the failure rate.
pub fn record_all(_ctx: &FailureContext<'_>) -> bool {
    true
}

/// Classifier skipping errors that downcast to `T` and recording the rest.
/// Keeps expected error types such as validation failures from tripping a
/// circuit.
pub fn ignore_errors<T>() -> impl Fn(&FailureContext<'_>) -> bool + Send + Sync
where
    T: Error + 'static,
{
    |ctx: &FailureContext<'_>| ctx.error.downcast_ref::<T>().is_none()
}
