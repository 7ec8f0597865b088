//! Event stream for circuit breaker and rate limiter observability
//!
//! Each core instance owns a hot multi-subscriber stream. Subscribers see
//! every event published after their subscription, in publication order per
//! publisher. Listener panics are caught so one misbehaving subscriber
//! cannot poison the publishing call.

use crate::circuit::CircuitState;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::error::Error;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What happened on a circuit breaker
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerEventKind {
    /// A guarded call succeeded
    Success,
    /// A guarded call failed and the failure was recorded
    Error { cause: String },
    /// A guarded call failed but the classifier declined to record it
    IgnoredError { cause: String },
    /// The breaker moved between states
    StateTransition {
        from: CircuitState,
        to: CircuitState,
    },
}

/// An immutable record of a single circuit breaker occurrence
#[derive(Debug, Clone)]
pub struct CircuitBreakerEvent {
    /// Name of the breaker that published the event
    pub circuit: String,
    /// Wall-clock creation time
    pub created_at: DateTime<Utc>,
    pub kind: CircuitBreakerEventKind,
}

impl CircuitBreakerEvent {
    pub(crate) fn success(circuit: &str) -> Self {
        Self {
            circuit: circuit.to_string(),
            created_at: Utc::now(),
            kind: CircuitBreakerEventKind::Success,
        }
    }

    pub(crate) fn error(circuit: &str, cause: &(dyn Error + 'static)) -> Self {
        Self {
            circuit: circuit.to_string(),
            created_at: Utc::now(),
            kind: CircuitBreakerEventKind::Error {
                cause: cause.to_string(),
            },
        }
    }

    pub(crate) fn ignored_error(circuit: &str, cause: &(dyn Error + 'static)) -> Self {
        Self {
            circuit: circuit.to_string(),
            created_at: Utc::now(),
            kind: CircuitBreakerEventKind::IgnoredError {
                cause: cause.to_string(),
            },
        }
    }

    pub(crate) fn transition(circuit: &str, from: CircuitState, to: CircuitState) -> Self {
        Self {
            circuit: circuit.to_string(),
            created_at: Utc::now(),
            kind: CircuitBreakerEventKind::StateTransition { from, to },
        }
    }
}

/// What happened on a rate limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimiterEventKind {
    /// A permit was acquired within the timeout
    AcquireSucceeded,
    /// The caller was denied, timed out or was interrupted
    AcquireFailed,
}

/// An immutable record of a single permit acquisition attempt
#[derive(Debug, Clone)]
pub struct RateLimiterEvent {
    /// Name of the limiter that published the event
    pub limiter: String,
    /// Wall-clock creation time
    pub created_at: DateTime<Utc>,
    pub kind: RateLimiterEventKind,
}

impl RateLimiterEvent {
    pub(crate) fn acquire_succeeded(limiter: &str) -> Self {
        Self {
            limiter: limiter.to_string(),
            created_at: Utc::now(),
            kind: RateLimiterEventKind::AcquireSucceeded,
        }
    }

    pub(crate) fn acquire_failed(limiter: &str) -> Self {
        Self {
            limiter: limiter.to_string(),
            created_at: Utc::now(),
            kind: RateLimiterEventKind::AcquireFailed,
        }
    }
}

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle identifying a subscription, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Hot publish-subscribe stream of events from one core instance.
///
/// Listeners run synchronously on the publishing thread; slow or buffering
/// subscribers are expected to hand events off to their own machinery.
pub struct EventStream<E> {
    subscribers: RwLock<Vec<(u64, Listener<E>)>>,
    next_id: AtomicU64,
}

impl<E> EventStream<E> {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a listener for all events published after this call.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.write().push((id, Arc::new(listener)));
        SubscriptionId(id)
    }

    /// Remove a listener. Returns false if the id was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id.0);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver an event to every subscriber, catching listener panics so
    /// publication never unwinds into the core.
    pub(crate) fn publish(&self, event: &E) {
        let subscribers = self.subscribers.read();
        for (_, listener) in subscribers.iter() {
            let _ = catch_unwind(AssertUnwindSafe(|| listener(event)));
        }
    }
}

impl<E> Default for EventStream<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventStream<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
