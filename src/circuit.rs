//! Circuit breaker state machine
//!
//! A breaker guards one backend. While `Closed` it samples call outcomes
//! into a ring bit buffer; once the buffer is full and the failure rate
//! reaches the configured threshold it trips `Open` and rejects calls until
//! the wait duration elapses. The first permitted call then moves it to
//! `HalfOpen`, where a smaller buffer samples trial calls and decides
//! between closing again and re-opening.
//!
//! All operations take `&self` and may be invoked concurrently. The state
//! and its live buffer are guarded by one mutex held only for short
//! critical sections; outcome bits are written outside of it, so permission
//! checks are never blocked behind a recording call.

use crate::classifier::FailureContext;
use crate::config::CircuitBreakerConfig;
use crate::error::{CallError, ConfigError};
use crate::events::{CircuitBreakerEvent, EventStream};
use crate::ring_buffer::RingBitBuffer;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;
use std::time::Instant;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests pass through normally while outcomes are sampled
    Closed,
    /// Requests are rejected until the wait duration elapses
    Open,
    /// A limited sample of trial requests probes recovery
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Read-only projection of the breaker's live sampling window
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerMetrics {
    /// Failure rate in percent, or `-1.0` while the window is not yet full
    pub failure_rate: f32,
    /// Outcomes currently held in the window
    pub buffered_calls: usize,
    /// Failure outcomes currently held
    pub failed_calls: usize,
    /// Success outcomes currently held
    pub successful_calls: usize,
    /// Capacity of the window backing the current state
    pub max_buffered_calls: usize,
}

impl CircuitBreakerMetrics {
    fn of_buffer(buffer: &RingBitBuffer) -> Self {
        let (recorded, failed, rate) = buffer.counters();
        Self {
            failure_rate: rate,
            buffered_calls: recorded,
            failed_calls: failed,
            successful_calls: recorded - failed,
            max_buffered_calls: buffer.size(),
        }
    }
}

/// The critical pair: which state the breaker is in, together with the
/// buffer or deadline that state owns. Only one buffer is alive at a time.
#[derive(Debug)]
enum Inner {
    Closed {
        buffer: Arc<RingBitBuffer>,
    },
    Open {
        /// When a trial call becomes permissible
        retry_at: Instant,
        /// Last view of the window that tripped the breaker
        frozen: CircuitBreakerMetrics,
    },
    HalfOpen {
        buffer: Arc<RingBitBuffer>,
    },
}

impl Inner {
    fn kind(&self) -> CircuitState {
        match self {
            Inner::Closed { .. } => CircuitState::Closed,
            Inner::Open { .. } => CircuitState::Open,
            Inner::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    fn metrics(&self) -> CircuitBreakerMetrics {
        match self {
            Inner::Closed { buffer } | Inner::HalfOpen { buffer } => {
                CircuitBreakerMetrics::of_buffer(buffer)
            }
            Inner::Open { frozen, .. } => frozen.clone(),
        }
    }
}

/// Thread-safe circuit breaker guarding one named backend
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    events: EventStream<CircuitBreakerEvent>,
}

impl CircuitBreaker {
    /// Create a breaker with the given configuration.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        Ok(Self::new_unchecked(name, config))
    }

    /// Create a breaker with the default configuration.
    pub fn with_defaults(name: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(name, CircuitBreakerConfig::default())
    }

    pub(crate) fn new_unchecked(name: String, config: CircuitBreakerConfig) -> Self {
        let buffer = Arc::new(RingBitBuffer::new(config.ring_buffer_size_closed()));
        Self {
            name,
            config,
            inner: Mutex::new(Inner::Closed { buffer }),
            events: EventStream::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().kind()
    }

    pub fn event_stream(&self) -> &EventStream<CircuitBreakerEvent> {
        &self.events
    }

    /// Metrics of the window backing the current state. While open, the
    /// last view of the window that tripped the breaker is served.
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.inner.lock().metrics()
    }

    /// Whether a call may proceed right now.
    ///
    /// Always true while closed or half-open. While open, becomes true once
    /// the wait duration has elapsed; the first such check moves the breaker
    /// to half-open, and exactly one transition event is published no matter
    /// how many threads race on it.
    pub fn is_call_permitted(&self) -> bool {
        let transition = {
            let mut inner = self.inner.lock();
            let expired = match &*inner {
                Inner::Closed { .. } | Inner::HalfOpen { .. } => return true,
                Inner::Open { retry_at, .. } => Instant::now() >= *retry_at,
            };
            if !expired {
                return false;
            }
            self.install(&mut inner, CircuitState::HalfOpen)
        };
        self.publish_transition(Some(transition));
        true
    }

    /// Report a successful call outcome.
    pub fn on_success(&self) {
        let transition = self.record_outcome(false);
        self.events.publish(&CircuitBreakerEvent::success(&self.name));
        self.publish_transition(transition);
    }

    /// Report a failed call outcome.
    ///
    /// The configured classifier decides whether the failure is recorded in
    /// the window or only published as an ignored-error event. The caller
    /// keeps ownership of the error either way and rethrows it unchanged.
    pub fn on_error(&self, cause: &(dyn Error + 'static)) {
        let ctx = FailureContext {
            circuit_name: &self.name,
            error: cause,
        };
        if !self.config.classifier().should_record(&ctx) {
            self.events
                .publish(&CircuitBreakerEvent::ignored_error(&self.name, cause));
            return;
        }
        let transition = self.record_outcome(true);
        self.events
            .publish(&CircuitBreakerEvent::error(&self.name, cause));
        self.publish_transition(transition);
    }

    /// Run a fallible operation under this breaker.
    ///
    /// Permission is checked first; on rejection the closure never runs and
    /// [`CallError::CircuitOpen`] is returned. Otherwise the outcome is
    /// reported and the closure's own error is handed back unchanged.
    pub fn call<T, E, F>(&self, f: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        E: Error + 'static,
    {
        if !self.is_call_permitted() {
            return Err(CallError::CircuitOpen {
                circuit: self.name.clone(),
            });
        }
        match f() {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_error(&err);
                Err(CallError::Execution(err))
            }
        }
    }

    /// Forcibly return to closed with a fresh window.
    pub fn reset(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            let from = inner.kind();
            *inner = Inner::Closed {
                buffer: Arc::new(RingBitBuffer::new(self.config.ring_buffer_size_closed())),
            };
            if from == CircuitState::Closed {
                None
            } else {
                tracing::info!(circuit = %self.name, from = %from, "circuit reset to closed");
                Some((from, CircuitState::Closed))
            }
        };
        self.publish_transition(transition);
    }

    /// Force the breaker open, for administration and testing.
    pub fn transition_to_open(&self) {
        self.force_transition(CircuitState::Open);
    }

    /// Force the breaker closed, for administration and testing.
    pub fn transition_to_closed(&self) {
        self.force_transition(CircuitState::Closed);
    }

    /// Force the breaker half-open, for administration and testing.
    pub fn transition_to_half_open(&self) {
        self.force_transition(CircuitState::HalfOpen);
    }

    fn force_transition(&self, to: CircuitState) {
        let transition = {
            let mut inner = self.inner.lock();
            if inner.kind() == to {
                None
            } else {
                Some(self.install(&mut inner, to))
            }
        };
        self.publish_transition(transition);
    }

    /// Write one outcome bit into the live buffer and evaluate the failure
    /// rate once the window is full. The buffer is captured under the lock
    /// but written outside of it; a transition is only performed if that
    /// same buffer is still the live one, so exactly one thread commits any
    /// given transition. Outcomes arriving while open have no live window
    /// and are not recorded.
    fn record_outcome(&self, failure: bool) -> Option<(CircuitState, CircuitState)> {
        let (origin, buffer) = {
            let inner = self.inner.lock();
            match &*inner {
                Inner::Closed { buffer } => (CircuitState::Closed, Arc::clone(buffer)),
                Inner::HalfOpen { buffer } => (CircuitState::HalfOpen, Arc::clone(buffer)),
                Inner::Open { .. } => return None,
            }
        };

        let rate = buffer.record(failure);
        if rate < 0.0 {
            return None;
        }

        let mut inner = self.inner.lock();
        let live = match (&*inner, origin) {
            (Inner::Closed { buffer: current }, CircuitState::Closed) => {
                Arc::ptr_eq(current, &buffer)
            }
            (Inner::HalfOpen { buffer: current }, CircuitState::HalfOpen) => {
                Arc::ptr_eq(current, &buffer)
            }
            _ => false,
        };
        if !live {
            return None;
        }

        if rate >= self.config.failure_rate_threshold() {
            Some(self.install(&mut inner, CircuitState::Open))
        } else if origin == CircuitState::HalfOpen {
            Some(self.install(&mut inner, CircuitState::Closed))
        } else {
            None
        }
    }

    fn install(&self, inner: &mut Inner, to: CircuitState) -> (CircuitState, CircuitState) {
        let from = inner.kind();
        let next = match to {
            CircuitState::Closed => Inner::Closed {
                buffer: Arc::new(RingBitBuffer::new(self.config.ring_buffer_size_closed())),
            },
            CircuitState::HalfOpen => Inner::HalfOpen {
                buffer: Arc::new(RingBitBuffer::new(self.config.ring_buffer_size_half_open())),
            },
            CircuitState::Open => Inner::Open {
                retry_at: Instant::now() + self.config.wait_duration_in_open(),
                frozen: inner.metrics(),
            },
        };
        *inner = next;
        match to {
            CircuitState::Open => {
                tracing::warn!(circuit = %self.name, from = %from, to = %to, "circuit opened")
            }
            CircuitState::HalfOpen => {
                tracing::info!(circuit = %self.name, from = %from, to = %to, "circuit probing recovery")
            }
            CircuitState::Closed => {
                tracing::info!(circuit = %self.name, from = %from, to = %to, "circuit closed")
            }
        }
        (from, to)
    }

    fn publish_transition(&self, transition: Option<(CircuitState, CircuitState)>) {
        if let Some((from, to)) = transition {
            self.events
                .publish(&CircuitBreakerEvent::transition(&self.name, from, to));
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}
