//! Rate limiters capping permit issuance per time cycle
//!
//! Two implementations share one trait:
//! - [`AtomicRateLimiter`]: permit accounting through a single atomically
//!   swapped state snapshot. Time is divided into cycles from a monotonic
//!   start; each cycle grants `limit_for_period` fresh permits and callers
//!   may reserve permits from future cycles by waiting them out.
//! - [`SemaphoreRateLimiter`]: a counted semaphore topped back up to the
//!   limit by a background tick every refresh period. Simpler, but permit
//!   availability is only as precise as the tick.

use crate::config::RateLimiterConfig;
use crate::error::{CallError, ConfigError};
use crate::events::{EventStream, RateLimiterEvent};
use arc_swap::ArcSwap;
use parking_lot::{Condvar, Mutex};
use std::error::Error;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

/// Read-only view of a limiter's current permit situation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterMetrics {
    /// Permits currently available; never reported below zero even while
    /// callers have reserved permits from future cycles
    pub available_permissions: i64,
    /// Estimate of callers currently blocked waiting for a permit
    pub waiting_threads: usize,
}

/// Common surface of the limiter implementations
pub trait RateLimiter: Send + Sync {
    fn name(&self) -> &str;

    /// Try to acquire one permit, waiting at most `timeout`.
    ///
    /// Returns false when the permit cannot be obtained in time or the
    /// caller was interrupted via [`RateLimiter::interrupt_waiters`].
    fn acquire_permission(&self, timeout: Duration) -> bool;

    fn config(&self) -> Arc<RateLimiterConfig>;

    /// Change how many permits each cycle grants, effective from the next
    /// accounting step.
    fn change_limit_for_period(&self, limit: u64) -> Result<(), ConfigError>;

    /// Change the default timeout used by the `call` decorator.
    fn change_timeout_duration(&self, timeout: Duration);

    fn metrics(&self) -> RateLimiterMetrics;

    fn event_stream(&self) -> &EventStream<RateLimiterEvent>;

    /// Wake every caller currently blocked in `acquire_permission`; the
    /// woken calls return false promptly. A permit already reserved by a
    /// woken caller is not refunded.
    fn interrupt_waiters(&self);

    /// Run a fallible operation under this limiter, waiting up to the
    /// configured timeout for a permit. On denial the closure never runs
    /// and [`CallError::RequestNotPermitted`] is returned.
    fn call<T, E, F>(&self, f: F) -> Result<T, CallError<E>>
    where
        Self: Sized,
        F: FnOnce() -> Result<T, E>,
        E: Error + 'static,
    {
        let timeout = self.config().timeout_duration();
        if !self.acquire_permission(timeout) {
            return Err(CallError::RequestNotPermitted {
                limiter: self.name().to_string(),
            });
        }
        f().map_err(CallError::Execution)
    }
}

/// Roster entry for a parked caller, withdrawn when the slot drops so an
/// interrupted or panicking waiter never lingers in the roster.
struct WaiterSlot<'a> {
    waiters: &'a Mutex<Vec<Thread>>,
}

impl<'a> WaiterSlot<'a> {
    fn register(waiters: &'a Mutex<Vec<Thread>>) -> Self {
        waiters.lock().push(thread::current());
        Self { waiters }
    }
}

impl Drop for WaiterSlot<'_> {
    fn drop(&mut self) {
        let current = thread::current().id();
        self.waiters.lock().retain(|t| t.id() != current);
    }
}

/// Waiting-thread count held while a caller blocks on the semaphore,
/// released when the guard drops.
struct WaitingGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> WaitingGuard<'a> {
    fn register(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One immutable accounting snapshot, swapped atomically as a whole
#[derive(Debug, Clone, Copy)]
struct LimiterState {
    /// Cycle number the snapshot was computed in
    active_cycle: u64,
    /// Permits left in that cycle; negative while callers have reserved
    /// permits from future cycles
    active_permissions: i64,
    /// How long the caller owning this snapshot had to wait
    nanos_to_wait: u64,
}

/// Rate limiter backed by a single atomically swapped state cell.
///
/// Acquisition is a copy→compare-and-swap loop: the winning caller owns the
/// installed snapshot and, if it had to borrow from a future cycle, parks
/// for exactly the computed wait.
pub struct AtomicRateLimiter {
    name: String,
    start: Instant,
    config: ArcSwap<RateLimiterConfig>,
    state: ArcSwap<LimiterState>,
    waiters: Mutex<Vec<Thread>>,
    interrupt_epoch: AtomicU64,
    events: EventStream<RateLimiterEvent>,
}

impl AtomicRateLimiter {
    /// Create a limiter with the given configuration.
    pub fn new(name: impl Into<String>, config: RateLimiterConfig) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        Ok(Self::new_unchecked(name, config))
    }

    /// Create a limiter with the default configuration.
    pub fn with_defaults(name: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(name, RateLimiterConfig::default())
    }

    pub(crate) fn new_unchecked(name: String, config: RateLimiterConfig) -> Self {
        let initial = LimiterState {
            active_cycle: 0,
            active_permissions: config.limit_for_period() as i64,
            nanos_to_wait: 0,
        };
        Self {
            name,
            start: Instant::now(),
            config: ArcSwap::from_pointee(config),
            state: ArcSwap::from_pointee(initial),
            waiters: Mutex::new(Vec::new()),
            interrupt_epoch: AtomicU64::new(0),
            events: EventStream::new(),
        }
    }

    fn elapsed_nanos(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    fn try_acquire(&self, timeout: Duration) -> bool {
        let config = self.config.load_full();
        let period = config.limit_refresh_period().as_nanos() as u64;
        let limit = config.limit_for_period().min(i64::MAX as u64) as i64;

        loop {
            let prev = self.state.load();
            let now = self.elapsed_nanos();
            let current_cycle = now / period;

            let mut permissions = prev.active_permissions;
            let elapsed_cycles = current_cycle.saturating_sub(prev.active_cycle);
            if elapsed_cycles > 0 {
                let refill = (elapsed_cycles.min(i64::MAX as u64) as i64).saturating_mul(limit);
                permissions = permissions.saturating_add(refill).min(limit);
            }
            let permissions = permissions - 1;

            let nanos_to_wait = if permissions >= 0 {
                0
            } else {
                let deficit = permissions.unsigned_abs();
                let cycles_needed = deficit.div_ceil(limit as u64);
                cycles_needed.saturating_mul(period) - now % period
            };

            // The caller loses without reserving anything; the next caller
            // recomputes the refill itself.
            if u128::from(nanos_to_wait) > timeout.as_nanos() {
                return false;
            }

            let next = Arc::new(LimiterState {
                active_cycle: current_cycle,
                active_permissions: permissions,
                nanos_to_wait,
            });
            let witness = self.state.compare_and_swap(&*prev, next);
            if !Arc::ptr_eq(&*witness, &*prev) {
                continue;
            }

            // The snapshot is ours: either proceed immediately or sleep out
            // the borrowed portion of future cycles.
            if nanos_to_wait > 0 {
                return self.park_for(nanos_to_wait);
            }
            return true;
        }
    }

    /// Park until the wait elapses. Returns false if the wait was cut short
    /// by an interrupt; the reservation stays consumed either way.
    fn park_for(&self, nanos: u64) -> bool {
        let deadline = Instant::now() + Duration::from_nanos(nanos);
        let epoch = self.interrupt_epoch.load(Ordering::SeqCst);
        let _slot = WaiterSlot::register(&self.waiters);

        loop {
            if self.interrupt_epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::park_timeout(deadline - now);
        }
    }
}

impl RateLimiter for AtomicRateLimiter {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire_permission(&self, timeout: Duration) -> bool {
        let acquired = self.try_acquire(timeout);
        if acquired {
            self.events
                .publish(&RateLimiterEvent::acquire_succeeded(&self.name));
        } else {
            tracing::debug!(limiter = %self.name, "permit denied");
            self.events
                .publish(&RateLimiterEvent::acquire_failed(&self.name));
        }
        acquired
    }

    fn config(&self) -> Arc<RateLimiterConfig> {
        self.config.load_full()
    }

    fn change_limit_for_period(&self, limit: u64) -> Result<(), ConfigError> {
        if limit < 1 {
            return Err(ConfigError::LimitForPeriod(limit));
        }
        self.config.rcu(|current| current.with_limit_for_period(limit));
        Ok(())
    }

    fn change_timeout_duration(&self, timeout: Duration) {
        self.config
            .rcu(|current| current.with_timeout_duration(timeout));
    }

    fn metrics(&self) -> RateLimiterMetrics {
        let config = self.config.load_full();
        let period = config.limit_refresh_period().as_nanos() as u64;
        let limit = config.limit_for_period().min(i64::MAX as u64) as i64;

        let state = self.state.load();
        let now = self.elapsed_nanos();
        let current_cycle = now / period;

        let mut permissions = state.active_permissions;
        let elapsed_cycles = current_cycle.saturating_sub(state.active_cycle);
        if elapsed_cycles > 0 {
            let refill = (elapsed_cycles.min(i64::MAX as u64) as i64).saturating_mul(limit);
            permissions = permissions.saturating_add(refill).min(limit);
        }

        RateLimiterMetrics {
            available_permissions: permissions.max(0),
            waiting_threads: self.waiters.lock().len(),
        }
    }

    fn event_stream(&self) -> &EventStream<RateLimiterEvent> {
        &self.events
    }

    fn interrupt_waiters(&self) {
        self.interrupt_epoch.fetch_add(1, Ordering::SeqCst);
        for waiter in self.waiters.lock().iter() {
            waiter.unpark();
        }
    }
}

impl std::fmt::Debug for AtomicRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.load();
        f.debug_struct("AtomicRateLimiter")
            .field("name", &self.name)
            .field("active_cycle", &state.active_cycle)
            .field("active_permissions", &state.active_permissions)
            .finish()
    }
}

struct SemaphoreShared {
    name: String,
    config: ArcSwap<RateLimiterConfig>,
    permits: Mutex<u64>,
    permits_cv: Condvar,
    waiting: AtomicUsize,
    stop: Mutex<bool>,
    stop_cv: Condvar,
    interrupt_epoch: AtomicU64,
    events: EventStream<RateLimiterEvent>,
}

impl SemaphoreShared {
    fn run_refresh_loop(&self) {
        loop {
            let period = self.config.load().limit_refresh_period();
            let mut stop = self.stop.lock();
            if *stop {
                break;
            }
            let timed_out = self.stop_cv.wait_for(&mut stop, period).timed_out();
            if *stop {
                break;
            }
            drop(stop);
            if timed_out {
                self.refresh_limit();
            }
        }
    }

    /// Top the semaphore back up to the per-cycle limit, never beyond it.
    fn refresh_limit(&self) {
        let limit = self.config.load().limit_for_period();
        let mut permits = self.permits.lock();
        if *permits < limit {
            *permits = limit;
            self.permits_cv.notify_all();
        }
    }

    fn try_acquire(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let epoch = self.interrupt_epoch.load(Ordering::SeqCst);
        let mut slot: Option<WaitingGuard<'_>> = None;

        let mut permits = self.permits.lock();
        let acquired = loop {
            if *permits > 0 {
                *permits -= 1;
                break true;
            }
            if self.interrupt_epoch.load(Ordering::SeqCst) != epoch {
                break false;
            }
            if Instant::now() >= deadline {
                break false;
            }
            if slot.is_none() {
                slot = Some(WaitingGuard::register(&self.waiting));
            }
            self.permits_cv.wait_until(&mut permits, deadline);
        };
        drop(permits);
        acquired
    }
}

/// Rate limiter backed by a counted semaphore and a refresh tick.
///
/// A dedicated thread tops the semaphore back up to the limit once per
/// refresh period; the thread is signalled and joined when the limiter is
/// dropped.
pub struct SemaphoreRateLimiter {
    shared: Arc<SemaphoreShared>,
    refresher: Option<thread::JoinHandle<()>>,
}

impl SemaphoreRateLimiter {
    /// Create a limiter with the given configuration and start its refresh
    /// thread.
    pub fn new(name: impl Into<String>, config: RateLimiterConfig) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        Ok(Self::new_unchecked(name, config))
    }

    /// Create a limiter with the default configuration.
    pub fn with_defaults(name: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(name, RateLimiterConfig::default())
    }

    pub(crate) fn new_unchecked(name: String, config: RateLimiterConfig) -> Self {
        let shared = Arc::new(SemaphoreShared {
            permits: Mutex::new(config.limit_for_period()),
            config: ArcSwap::from_pointee(config),
            name,
            permits_cv: Condvar::new(),
            waiting: AtomicUsize::new(0),
            stop: Mutex::new(false),
            stop_cv: Condvar::new(),
            interrupt_epoch: AtomicU64::new(0),
            events: EventStream::new(),
        });

        let worker = Arc::clone(&shared);
        let refresher = thread::Builder::new()
            .name(format!("{}-limit-refresh", shared.name))
            .spawn(move || worker.run_refresh_loop())
            .expect("failed to spawn limit refresh thread");

        Self {
            shared,
            refresher: Some(refresher),
        }
    }
}

impl RateLimiter for SemaphoreRateLimiter {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn acquire_permission(&self, timeout: Duration) -> bool {
        let acquired = self.shared.try_acquire(timeout);
        if acquired {
            self.shared
                .events
                .publish(&RateLimiterEvent::acquire_succeeded(&self.shared.name));
        } else {
            tracing::debug!(limiter = %self.shared.name, "permit denied");
            self.shared
                .events
                .publish(&RateLimiterEvent::acquire_failed(&self.shared.name));
        }
        acquired
    }

    fn config(&self) -> Arc<RateLimiterConfig> {
        self.shared.config.load_full()
    }

    fn change_limit_for_period(&self, limit: u64) -> Result<(), ConfigError> {
        if limit < 1 {
            return Err(ConfigError::LimitForPeriod(limit));
        }
        self.shared
            .config
            .rcu(|current| current.with_limit_for_period(limit));
        Ok(())
    }

    fn change_timeout_duration(&self, timeout: Duration) {
        self.shared
            .config
            .rcu(|current| current.with_timeout_duration(timeout));
    }

    fn metrics(&self) -> RateLimiterMetrics {
        RateLimiterMetrics {
            available_permissions: *self.shared.permits.lock() as i64,
            waiting_threads: self.shared.waiting.load(Ordering::SeqCst),
        }
    }

    fn event_stream(&self) -> &EventStream<RateLimiterEvent> {
        &self.shared.events
    }

    fn interrupt_waiters(&self) {
        self.shared.interrupt_epoch.fetch_add(1, Ordering::SeqCst);
        self.shared.permits_cv.notify_all();
    }
}

impl Drop for SemaphoreRateLimiter {
    fn drop(&mut self) {
        *self.shared.stop.lock() = true;
        self.shared.stop_cv.notify_all();
        if let Some(handle) = self.refresher.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for SemaphoreRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemaphoreRateLimiter")
            .field("name", &self.shared.name)
            .field("available_permits", &*self.shared.permits.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RateLimiterEventKind;
    use parking_lot::Mutex as PlMutex;

    fn config(limit: u64, period: Duration, timeout: Duration) -> RateLimiterConfig {
        RateLimiterConfig::builder()
            .limit_for_period(limit)
            .limit_refresh_period(period)
            .timeout_duration(timeout)
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_name_rejected() {
        assert_eq!(
            AtomicRateLimiter::with_defaults("").unwrap_err(),
            ConfigError::EmptyName
        );
        assert_eq!(
            SemaphoreRateLimiter::with_defaults("").unwrap_err(),
            ConfigError::EmptyName
        );
    }

    #[test]
    fn test_atomic_grants_limit_then_denies_until_refresh() {
        let limiter = AtomicRateLimiter::new(
            "test",
            config(2, Duration::from_millis(100), Duration::ZERO),
        )
        .unwrap();

        assert!(limiter.acquire_permission(Duration::ZERO));
        assert!(limiter.acquire_permission(Duration::ZERO));
        assert!(!limiter.acquire_permission(Duration::ZERO));

        thread::sleep(Duration::from_millis(150));
        assert!(limiter.acquire_permission(Duration::ZERO));
    }

    #[test]
    fn test_atomic_reserves_permit_from_next_cycle() {
        let limiter = AtomicRateLimiter::new(
            "test",
            config(1, Duration::from_millis(200), Duration::from_secs(1)),
        )
        .unwrap();

        assert!(limiter.acquire_permission(Duration::from_secs(1)));

        let started = Instant::now();
        assert!(limiter.acquire_permission(Duration::from_secs(1)));
        let waited = started.elapsed();
        assert!(
            waited >= Duration::from_millis(100),
            "expected to wait out the cycle, waited {:?}",
            waited
        );
        assert!(waited < Duration::from_secs(1));

        // The reserved permit belongs to the cycle that just started
        assert!(!limiter.acquire_permission(Duration::ZERO));
    }

    #[test]
    fn test_atomic_interruption_returns_false_promptly_without_refund() {
        let limiter = Arc::new(
            AtomicRateLimiter::new(
                "test",
                config(1, Duration::from_secs(2), Duration::from_secs(5)),
            )
            .unwrap(),
        );
        assert!(limiter.acquire_permission(Duration::ZERO));

        let worker = Arc::clone(&limiter);
        let handle = thread::spawn(move || {
            let started = Instant::now();
            let acquired = worker.acquire_permission(Duration::from_secs(5));
            (acquired, started.elapsed())
        });

        thread::sleep(Duration::from_millis(200));
        assert_eq!(limiter.metrics().waiting_threads, 1);

        limiter.interrupt_waiters();
        let (acquired, waited) = handle.join().unwrap();
        assert!(!acquired);
        assert!(waited < Duration::from_secs(1), "waited {:?}", waited);

        // The reservation is not refunded
        assert!(!limiter.acquire_permission(Duration::ZERO));
        assert_eq!(limiter.metrics().waiting_threads, 0);
    }

    #[test]
    fn test_atomic_concurrent_acquisition_grants_exactly_limit() {
        // A period far longer than the test keeps refills out of the picture
        let limiter = Arc::new(
            AtomicRateLimiter::new("test", config(100, Duration::from_secs(60), Duration::ZERO))
                .unwrap(),
        );

        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = Arc::clone(&limiter);
            handles.push(thread::spawn(move || {
                let mut granted = 0u32;
                for _ in 0..20 {
                    if limiter.acquire_permission(Duration::ZERO) {
                        granted += 1;
                    }
                }
                granted
            }));
        }

        let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 100);
        assert_eq!(limiter.metrics().available_permissions, 0);
    }

    #[test]
    fn test_atomic_metrics_report_available_permits() {
        let limiter =
            AtomicRateLimiter::new("test", config(5, Duration::from_secs(60), Duration::ZERO))
                .unwrap();
        assert_eq!(limiter.metrics().available_permissions, 5);

        limiter.acquire_permission(Duration::ZERO);
        limiter.acquire_permission(Duration::ZERO);
        assert_eq!(limiter.metrics().available_permissions, 3);

        for _ in 0..3 {
            limiter.acquire_permission(Duration::ZERO);
        }
        assert!(!limiter.acquire_permission(Duration::ZERO));
        assert_eq!(limiter.metrics().available_permissions, 0);
    }

    #[test]
    fn test_change_limit_validation_and_config_swap() {
        let limiter = AtomicRateLimiter::with_defaults("test").unwrap();

        assert_eq!(
            limiter.change_limit_for_period(0).unwrap_err(),
            ConfigError::LimitForPeriod(0)
        );

        limiter.change_limit_for_period(7).unwrap();
        assert_eq!(limiter.config().limit_for_period(), 7);

        limiter.change_timeout_duration(Duration::from_millis(42));
        assert_eq!(
            limiter.config().timeout_duration(),
            Duration::from_millis(42)
        );
    }

    #[test]
    fn test_acquisition_events_published() {
        let limiter = AtomicRateLimiter::new(
            "test",
            config(1, Duration::from_secs(60), Duration::ZERO),
        )
        .unwrap();

        let seen = Arc::new(PlMutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        limiter.event_stream().subscribe(move |event| {
            seen_clone.lock().push(event.kind);
        });

        limiter.acquire_permission(Duration::ZERO);
        limiter.acquire_permission(Duration::ZERO);

        assert_eq!(
            *seen.lock(),
            vec![
                RateLimiterEventKind::AcquireSucceeded,
                RateLimiterEventKind::AcquireFailed
            ]
        );
    }

    #[test]
    fn test_semaphore_grants_limit_then_refreshes() {
        let limiter = SemaphoreRateLimiter::new(
            "test",
            config(2, Duration::from_millis(100), Duration::ZERO),
        )
        .unwrap();

        assert!(limiter.acquire_permission(Duration::ZERO));
        assert!(limiter.acquire_permission(Duration::ZERO));
        assert!(!limiter.acquire_permission(Duration::ZERO));

        thread::sleep(Duration::from_millis(250));
        assert!(limiter.acquire_permission(Duration::ZERO));
    }

    #[test]
    fn test_semaphore_refresh_never_exceeds_limit() {
        let limiter = SemaphoreRateLimiter::new(
            "test",
            config(3, Duration::from_millis(50), Duration::ZERO),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(200));
        assert_eq!(limiter.metrics().available_permissions, 3);
    }

    #[test]
    fn test_semaphore_waiter_woken_by_refresh() {
        let limiter = Arc::new(
            SemaphoreRateLimiter::new(
                "test",
                config(1, Duration::from_millis(50), Duration::from_secs(1)),
            )
            .unwrap(),
        );
        assert!(limiter.acquire_permission(Duration::ZERO));

        let worker = Arc::clone(&limiter);
        let handle = thread::spawn(move || {
            let started = Instant::now();
            let acquired = worker.acquire_permission(Duration::from_secs(1));
            (acquired, started.elapsed())
        });

        let (acquired, waited) = handle.join().unwrap();
        assert!(acquired);
        assert!(
            waited < Duration::from_millis(500),
            "refresh should wake the waiter, waited {:?}",
            waited
        );
    }

    #[test]
    fn test_semaphore_interruption_returns_false_promptly() {
        let limiter = Arc::new(
            SemaphoreRateLimiter::new(
                "test",
                config(1, Duration::from_secs(10), Duration::from_secs(5)),
            )
            .unwrap(),
        );
        assert!(limiter.acquire_permission(Duration::ZERO));

        let worker = Arc::clone(&limiter);
        let handle = thread::spawn(move || {
            let started = Instant::now();
            let acquired = worker.acquire_permission(Duration::from_secs(5));
            (acquired, started.elapsed())
        });

        thread::sleep(Duration::from_millis(200));
        assert_eq!(limiter.metrics().waiting_threads, 1);

        limiter.interrupt_waiters();
        let (acquired, waited) = handle.join().unwrap();
        assert!(!acquired);
        assert!(waited < Duration::from_secs(1), "waited {:?}", waited);
    }

    #[test]
    fn test_semaphore_drop_stops_refresh_thread_promptly() {
        let started = Instant::now();
        let limiter = SemaphoreRateLimiter::new(
            "test",
            config(1, Duration::from_secs(30), Duration::ZERO),
        )
        .unwrap();
        drop(limiter);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_call_decorator_denies_and_rethrows() {
        let limiter = AtomicRateLimiter::new(
            "test",
            config(2, Duration::from_secs(60), Duration::ZERO),
        )
        .unwrap();

        let ok = limiter.call(|| Ok::<_, std::io::Error>(7));
        assert_eq!(ok.unwrap(), 7);

        let err = limiter.call(|| {
            Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
        });
        assert!(matches!(err, Err(CallError::Execution(_))));

        // Both permits are consumed now
        let denied = limiter.call(|| Ok::<_, std::io::Error>(0));
        match denied {
            Err(CallError::RequestNotPermitted { limiter }) => assert_eq!(limiter, "test"),
            other => panic!("expected denial, got {:?}", other),
        }
    }
}
