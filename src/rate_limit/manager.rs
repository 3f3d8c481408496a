//! Rate Limiter
//!
//! Service that owns the usage ledger, the FIFO admission queue and the two
//! background tasks (drain loop and periodic resync).
//!
//! A single drain loop pops requests in arrival order, sleeps until the gate
//! opens, runs the request, records it and persists the ledger before the
//! caller is answered. Any failure to load or persist the ledger closes the
//! gate until `init` succeeds again.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::{LedgerConfig, RateLimitConfig};
use super::dashboard::{DashboardData, UsageStats};
use super::gate::{self, GateDecision};
use super::ledger::{UsageLedger, UsageRecord};
use super::queue::{AdmissionQueue, QueueReceiver, QueuedRequest};
use super::retry::retry_with_backoff;
use super::store::UsageStore;
use crate::clock::{duration_until, Clock, SystemClock};
use crate::error::{GateError, StoreError};
use crate::metrics;

/// How long shutdown waits for the in-flight request before aborting it
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Lifecycle of the usage ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerState {
    /// Not loaded yet; queued requests wait
    Loading,
    /// Loaded and in sync with the store
    Ready,
    /// Load or persist failed; every request is rejected
    Unavailable,
    /// `shutdown` was called
    ShutDown,
}

impl std::fmt::Display for LedgerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LedgerState::Loading => "loading",
            LedgerState::Ready => "ready",
            LedgerState::Unavailable => "unavailable",
            LedgerState::ShutDown => "shut_down",
        };
        write!(f, "{}", s)
    }
}

/// Why the drain loop cannot dispatch the head of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Blocked {
    DailyLimit,
    Unavailable,
    ShutDown,
}

impl Blocked {
    fn to_error(self) -> GateError {
        match self {
            Blocked::DailyLimit => GateError::DailyLimitReached,
            Blocked::Unavailable => {
                GateError::Unavailable("usage ledger is not available".to_string())
            }
            Blocked::ShutDown => GateError::ShuttingDown,
        }
    }
}

/// Rate-gated FIFO request queue
///
/// Cheap to clone; clones share the same ledger and queue.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    limits: RateLimitConfig,
    ledger_config: LedgerConfig,
    store: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,

    ledger: Mutex<UsageLedger>,

    /// Whether the in-memory ledger reflects the store and may be written back
    loaded: AtomicBool,

    state: watch::Sender<LedgerState>,
    queue: AdmissionQueue,

    /// Parked until `init` starts the drain loop
    receiver: Mutex<Option<QueueReceiver>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    init_lock: tokio::sync::Mutex<()>,
}

impl RateLimiter {
    /// Create a rate limiter; nothing is loaded until `init`
    pub fn new(
        limits: RateLimitConfig,
        ledger_config: LedgerConfig,
        store: Arc<dyn UsageStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        if let Err(e) = limits.validate() {
            warn!("Invalid rate limits: {}", e);
        }
        let (queue, receiver) = AdmissionQueue::new();
        let (state, _) = watch::channel(LedgerState::Loading);
        let ledger = UsageLedger::new();

        Self {
            shared: Arc::new(Shared {
                limits,
                ledger_config,
                store,
                clock,
                ledger: Mutex::new(ledger),
                loaded: AtomicBool::new(false),
                state,
                queue,
                receiver: Mutex::new(Some(receiver)),
                tasks: Mutex::new(Vec::new()),
                init_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Create a rate limiter on the system clock
    pub fn with_store(
        limits: RateLimitConfig,
        ledger_config: LedgerConfig,
        store: Arc<dyn UsageStore>,
    ) -> Self {
        Self::new(limits, ledger_config, store, Arc::new(SystemClock))
    }

    /// Load the ledger and start the background tasks
    ///
    /// Retries the load per `ledger.load_retry`. On failure the service is
    /// left `Unavailable` and every request is rejected; calling `init`
    /// again retries the load.
    pub async fn init(&self) -> Result<(), GateError> {
        let _guard = self.shared.init_lock.lock().await;
        match self.state() {
            LedgerState::Ready => return Ok(()),
            LedgerState::ShutDown => return Err(GateError::ShuttingDown),
            LedgerState::Loading | LedgerState::Unavailable => {}
        }

        self.spawn_background_tasks();
        self.shared.state.send_replace(LedgerState::Loading);

        let shared = &self.shared;
        let result = retry_with_backoff(
            &shared.ledger_config.load_retry,
            "Load usage ledger",
            || shared.load_once(),
        )
        .await;

        match result {
            Ok(()) => {
                let requests_today = {
                    let ledger = shared.lock_ledger();
                    ledger.requests_today(shared.clock.now())
                };
                metrics::REQUESTS_TODAY.set(i64::from(requests_today));
                shared.loaded.store(true, Ordering::SeqCst);
                shared.state.send_replace(LedgerState::Ready);
                info!(
                    "Rate limiter initialized. Usage today: {}/{} (store: {})",
                    requests_today,
                    shared.limits.rpd,
                    shared.store.name()
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "CRITICAL: Failed to load usage ledger from {} store: {}. All requests will be blocked.",
                    shared.store.name(),
                    e
                );
                shared.mark_unavailable();
                Err(GateError::Unavailable(format!(
                    "failed to load usage ledger: {}",
                    e
                )))
            }
        }
    }

    /// Queue `execute` behind the gate and wait for its outcome
    ///
    /// Requests are dispatched one at a time in submission order. `model`
    /// is recorded in the ledger once the request has been dispatched.
    /// Dropping the returned future does not withdraw the request.
    pub async fn submit<T, F, Fut>(&self, model: impl Into<String>, execute: F) -> Result<T, GateError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let shared = &self.shared;
        match self.state() {
            LedgerState::Unavailable => {
                return Err(rejected(GateError::Unavailable(
                    "usage ledger is not available".to_string(),
                )))
            }
            LedgerState::ShutDown => return Err(rejected(GateError::ShuttingDown)),
            LedgerState::Ready => {
                let now = shared.clock.now();
                let requests_today = shared.lock_ledger().requests_today(now);
                if requests_today >= shared.limits.rpd {
                    warn!(
                        "Daily limit reached ({}/{}). Request rejected.",
                        requests_today, shared.limits.rpd
                    );
                    return Err(rejected(GateError::DailyLimitReached));
                }
            }
            LedgerState::Loading => {}
        }

        let (request, rx) = QueuedRequest::new(model, execute);
        debug!(
            request_id = %request.id,
            model = %request.model,
            queue_length = shared.queue.len(),
            "Request queued"
        );
        if let Err(request) = shared.queue.push(request) {
            request.reject(GateError::ShuttingDown);
        }

        rx.await.unwrap_or(Err(GateError::ShuttingDown))
    }

    /// Write the in-memory ledger to the store
    ///
    /// Refused unless the ledger is `Ready`. Exhausting the persist retries
    /// makes the service `Unavailable`.
    pub async fn sync(&self) -> Result<(), GateError> {
        if self.state() != LedgerState::Ready {
            return Err(GateError::Unavailable(format!(
                "refusing to persist while ledger is {}",
                self.state()
            )));
        }
        self.shared.persist().await
    }

    /// Stop the background tasks and flush the ledger
    ///
    /// Queued requests are rejected with `ShuttingDown`; the request in
    /// flight, if any, is given a grace period to finish.
    pub async fn shutdown(&self) {
        let previous = self.shared.state.send_replace(LedgerState::ShutDown);
        if previous == LedgerState::ShutDown {
            return;
        }

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.shared.lock_tasks());
        for handle in tasks {
            let abort = handle.abort_handle();
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("Background task did not stop within {:?}, aborting", SHUTDOWN_GRACE);
                abort.abort();
            }
        }

        // Never initialized: requests are still parked in the channel.
        let parked = self
            .shared
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(mut rx) = parked {
            reject_remaining(&self.shared.queue, &mut rx, Blocked::ShutDown);
        }

        if self.shared.loaded.load(Ordering::SeqCst) {
            if let Err(e) = self.shared.persist().await {
                warn!("Final usage sync failed: {}", e);
            }
        }
        info!("Rate limiter shut down");
    }

    /// Current budget utilization
    pub fn usage_stats(&self) -> UsageStats {
        let shared = &self.shared;
        let now = shared.clock.now();
        let ledger = shared.lock_ledger();
        UsageStats::compute(
            &shared.limits,
            &ledger,
            now,
            self.state() == LedgerState::Ready,
            shared.queue.len(),
        )
    }

    /// Whether callers should switch to their non-AI path
    ///
    /// Advisory only: true when the ledger is not ready or either budget is
    /// at or above the fallback threshold.
    pub fn should_use_fallback(&self) -> bool {
        let state = self.state();
        if state != LedgerState::Ready {
            warn!("Rate limiter is {}. Using fallback.", state);
            return true;
        }
        self.usage_stats()
            .exceeds(self.shared.limits.fallback_threshold_percent)
    }

    /// Dashboard payload
    pub fn dashboard(&self) -> DashboardData {
        let shared = &self.shared;
        let now = shared.clock.now();
        let ledger = shared.lock_ledger();
        DashboardData::build(&shared.limits, &ledger, now, self.state(), shared.queue.len())
    }

    /// Current ledger state
    pub fn state(&self) -> LedgerState {
        *self.shared.state.borrow()
    }

    /// Subscribe to ledger state changes
    pub fn subscribe(&self) -> watch::Receiver<LedgerState> {
        self.shared.state.subscribe()
    }

    /// Active budgets
    pub fn limits(&self) -> &RateLimitConfig {
        &self.shared.limits
    }

    /// Requests waiting for admission
    pub fn queue_length(&self) -> usize {
        self.shared.queue.len()
    }

    fn spawn_background_tasks(&self) {
        let receiver = self
            .shared
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(receiver) = receiver else {
            return;
        };

        let drain = tokio::spawn(drain_loop(self.shared.clone(), receiver));
        let sync = tokio::spawn(sync_loop(self.shared.clone()));
        self.shared.lock_tasks().extend([drain, sync]);
    }
}

impl Shared {
    fn lock_ledger(&self) -> MutexGuard<'_, UsageLedger> {
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current_state(&self) -> LedgerState {
        *self.state.borrow()
    }

    fn mark_unavailable(&self) {
        self.loaded.store(false, Ordering::SeqCst);
        self.state.send_if_modified(|state| {
            if matches!(*state, LedgerState::ShutDown | LedgerState::Unavailable) {
                return false;
            }
            *state = LedgerState::Unavailable;
            true
        });
    }

    /// One load attempt; resets and writes back the row on a new day
    async fn load_once(&self) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut ledger = match self.store.load().await? {
            Some(record) if record.last_reset_date == now.date_naive() => {
                let ledger = UsageLedger::from_record(&record, now);
                let logged = ledger.requests_today(now);
                if record.requests_today != logged {
                    warn!(
                        "Stored requestsToday ({}) disagrees with the request log ({}); using the log",
                        record.requests_today, logged
                    );
                }
                ledger
            }
            Some(record) => {
                info!(
                    "New day detected (last reset {}), resetting usage counters",
                    record.last_reset_date
                );
                let ledger = UsageLedger::from_record(&record, now);
                self.store.save(&ledger.snapshot(now)).await?;
                ledger
            }
            None => {
                info!("No usage record found, creating one");
                self.store.save(&UsageRecord::fresh(now)).await?;
                UsageLedger::new()
            }
        };

        let mut current = self.lock_ledger();
        ledger.absorb(&current);
        *current = ledger;
        Ok(())
    }

    /// Snapshot the ledger and write it with retries
    async fn persist(&self) -> Result<(), GateError> {
        if !self.loaded.load(Ordering::SeqCst) {
            return Err(GateError::Unavailable(
                "usage ledger is not loaded".to_string(),
            ));
        }

        let record = {
            let now = self.clock.now();
            let mut ledger = self.lock_ledger();
            ledger.prune(now);
            ledger.snapshot(now)
        };

        let result = retry_with_backoff(
            &self.ledger_config.persist_retry,
            "Persist usage ledger",
            || self.store.save(&record),
        )
        .await;

        match result {
            Ok(()) => {
                debug!(requests_today = record.requests_today, "Usage ledger persisted");
                Ok(())
            }
            Err(e) => {
                metrics::PERSIST_FAILURES_TOTAL.inc();
                error!(
                    "CRITICAL: Failed to persist usage data: {}. Blocking all requests.",
                    e
                );
                self.mark_unavailable();
                Err(GateError::Unavailable(format!(
                    "failed to persist usage data: {}",
                    e
                )))
            }
        }
    }

    /// Wait until the gate admits the head of the queue
    async fn wait_for_slot(&self, state_rx: &mut watch::Receiver<LedgerState>) -> Result<(), Blocked> {
        loop {
            let state = *state_rx.borrow_and_update();
            match state {
                LedgerState::Ready => {}
                LedgerState::Loading => {
                    debug!("Usage ledger still loading, holding queue");
                    if state_rx.changed().await.is_err() {
                        return Err(Blocked::ShutDown);
                    }
                    continue;
                }
                LedgerState::Unavailable => return Err(Blocked::Unavailable),
                LedgerState::ShutDown => return Err(Blocked::ShutDown),
            }

            let now = self.clock.now();
            let decision = {
                let mut ledger = self.lock_ledger();
                let pruned = ledger.prune(now);
                if pruned > 0 {
                    debug!("Pruned {} entries older than 24h from the usage log", pruned);
                }
                gate::evaluate(&self.limits, &ledger, now)
            };

            match decision {
                GateDecision::Admit => return Ok(()),
                GateDecision::DailyLimitReached => return Err(Blocked::DailyLimit),
                GateDecision::Wait { until, reason } => {
                    let delay = duration_until(now, until);
                    metrics::GATE_WAITS_TOTAL
                        .with_label_values(&[reason.as_str()])
                        .inc();
                    debug!(
                        reason = reason.as_str(),
                        wait_ms = delay.as_millis() as u64,
                        "Gate closed, waiting"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        changed = state_rx.changed() => {
                            if changed.is_err() {
                                return Err(Blocked::ShutDown);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Run one admitted request, record it, persist, then answer the caller
    async fn dispatch(&self, request: QueuedRequest) {
        let request_id = request.id;
        let model = request.model.clone();
        metrics::QUEUE_WAIT_SECONDS.observe(request.enqueued_at.elapsed().as_secs_f64());

        let started = self.clock.now();
        debug!(request_id = %request_id, model = %model, "Dispatching request");
        let completion = request.execute().await;
        let outcome = if completion.succeeded() { "success" } else { "error" };

        // Failed calls still reached the provider and count against the budget.
        let requests_today = {
            let mut ledger = self.lock_ledger();
            ledger.record_request(started, model.clone());
            ledger.requests_today(self.clock.now())
        };
        metrics::REQUESTS_DISPATCHED_TOTAL
            .with_label_values(&[model.as_str(), outcome])
            .inc();
        metrics::REQUESTS_TODAY.set(i64::from(requests_today));
        debug!(
            request_id = %request_id,
            outcome,
            requests_today,
            rpd = self.limits.rpd,
            "Request dispatched"
        );

        let persisted = self.persist().await.is_ok();
        completion.settle(persisted);
    }
}

async fn drain_loop(shared: Arc<Shared>, mut rx: QueueReceiver) {
    let mut state_rx = shared.state.subscribe();

    loop {
        let request = tokio::select! {
            request = rx.recv() => match request {
                Some(request) => request,
                None => break,
            },
            _ = shutdown_signal(&mut state_rx) => break,
        };

        match shared.wait_for_slot(&mut state_rx).await {
            Ok(()) => {
                shared.queue.mark_taken();
                shared.dispatch(request).await;
            }
            Err(blocked) => {
                shared.queue.mark_taken();
                if blocked == Blocked::DailyLimit {
                    warn!(
                        "Daily limit reached ({}). Rejecting {} queued request(s).",
                        shared.limits.rpd,
                        shared.queue.len() + 1
                    );
                }
                request.reject(blocked.to_error());
                reject_remaining(&shared.queue, &mut rx, blocked);
            }
        }

        if shared.current_state() == LedgerState::ShutDown {
            break;
        }
    }

    rx.close();
    reject_remaining(&shared.queue, &mut rx, Blocked::ShutDown);
    debug!("Drain loop stopped");
}

async fn sync_loop(shared: Arc<Shared>) {
    let period = shared.ledger_config.sync_interval();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut state_rx = shared.state.subscribe();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if shared.current_state() == LedgerState::Ready {
                    if let Err(e) = shared.persist().await {
                        warn!("Periodic usage sync failed: {}", e);
                    }
                }
            }
            _ = shutdown_signal(&mut state_rx) => break,
        }
    }
    debug!("Sync loop stopped");
}

async fn shutdown_signal(state_rx: &mut watch::Receiver<LedgerState>) {
    let _ = state_rx
        .wait_for(|state| *state == LedgerState::ShutDown)
        .await;
}

/// Reject everything currently in the channel
fn reject_remaining(queue: &AdmissionQueue, rx: &mut QueueReceiver, blocked: Blocked) {
    while let Ok(request) = rx.try_recv() {
        queue.mark_taken();
        request.reject(blocked.to_error());
    }
}

fn rejected(error: GateError) -> GateError {
    metrics::REQUESTS_REJECTED_TOTAL
        .with_label_values(&[error.reason()])
        .inc();
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MonotonicClock;
    use crate::rate_limit::ledger::RequestLogEntry;
    use crate::rate_limit::store::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn limiter(store: MemoryStore, limits: RateLimitConfig) -> RateLimiter {
        let start = Utc.with_ymd_and_hms(2026, 6, 10, 9, 0, 0).unwrap();
        RateLimiter::new(
            limits,
            LedgerConfig::in_memory(),
            Arc::new(store),
            Arc::new(MonotonicClock::starting_at(start)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_creates_row() {
        let store = MemoryStore::new();
        let limiter = limiter(store.clone(), RateLimitConfig::default());
        assert_eq!(limiter.state(), LedgerState::Loading);

        limiter.init().await.unwrap();
        assert_eq!(limiter.state(), LedgerState::Ready);

        let row = store.current().await.unwrap();
        assert_eq!(row.requests_today, 0);
        assert_eq!(row.last_reset_date.to_string(), "2026-06-10");
        limiter.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_records_and_persists() {
        let store = MemoryStore::new();
        let limiter = limiter(store.clone(), RateLimitConfig::default());
        limiter.init().await.unwrap();

        let value = limiter
            .submit("gemini-2.5-flash", || async { Ok("hello".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "hello");

        let row = store.current().await.unwrap();
        assert_eq!(row.requests_today, 1);
        assert_eq!(row.request_log[0].model, "gemini-2.5-flash");
        assert_eq!(limiter.usage_stats().requests_today, 1);
        limiter.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_before_init_waits_for_load() {
        let limiter = limiter(MemoryStore::new(), RateLimitConfig::default());

        let pending = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.submit("m", || async { Ok(1_u8) }).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(limiter.queue_length(), 1);

        limiter.init().await.unwrap();
        assert_eq!(pending.await.unwrap().unwrap(), 1);
        limiter.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_reject_at_daily_cap() {
        let now = Utc.with_ymd_and_hms(2026, 6, 10, 9, 0, 0).unwrap();
        let mut record = UsageRecord::fresh(now);
        record.request_log = (0..3)
            .map(|i| RequestLogEntry {
                timestamp: now - chrono::Duration::minutes(30 + i),
                model: "m".to_string(),
            })
            .collect();
        record.requests_today = 3;

        let limits = RateLimitConfig::with_limits(8, 3, Duration::from_secs(8));
        let limiter = limiter(MemoryStore::with_record(record), limits);
        limiter.init().await.unwrap();

        let result = limiter.submit("m", || async { Ok(()) }).await;
        assert!(matches!(result, Err(GateError::DailyLimitReached)));
        assert!(limiter.should_use_fallback());
        limiter.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_rpm_rejects_instead_of_panicking() {
        let limits = RateLimitConfig::with_limits(0, 100, Duration::from_secs(1));
        let limiter = limiter(MemoryStore::new(), limits);
        limiter.init().await.unwrap();

        let stats = limiter.usage_stats();
        assert!(!stats.can_make_request);
        assert!(limiter.should_use_fallback());

        let result = limiter.submit("m", || async { Ok(()) }).await;
        assert!(matches!(result, Err(GateError::DailyLimitReached)));
        assert_eq!(limiter.state(), LedgerState::Ready);
        limiter.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_state_changes() {
        let limiter = limiter(MemoryStore::new(), RateLimitConfig::default());
        let mut state_rx = limiter.subscribe();
        assert_eq!(*state_rx.borrow(), LedgerState::Loading);

        limiter.init().await.unwrap();
        state_rx.changed().await.unwrap();
        assert_eq!(*state_rx.borrow_and_update(), LedgerState::Ready);

        limiter.shutdown().await;
        state_rx.changed().await.unwrap();
        assert_eq!(*state_rx.borrow(), LedgerState::ShutDown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_refused_before_init() {
        let limiter = limiter(MemoryStore::new(), RateLimitConfig::default());
        assert!(matches!(limiter.sync().await, Err(GateError::Unavailable(_))));
        assert!(limiter.should_use_fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_rejects_parked_requests() {
        let limiter = limiter(MemoryStore::new(), RateLimitConfig::default());
        let pending = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.submit("m", || async { Ok(()) }).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        limiter.shutdown().await;
        assert!(matches!(pending.await.unwrap(), Err(GateError::ShuttingDown)));
        assert_eq!(limiter.state(), LedgerState::ShutDown);
        assert!(matches!(limiter.init().await, Err(GateError::ShuttingDown)));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LedgerState::ShutDown.to_string(), "shut_down");
        assert_eq!(
            serde_json::to_string(&LedgerState::Unavailable).unwrap(),
            "\"unavailable\""
        );
    }
}
