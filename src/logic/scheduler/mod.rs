//! Sync Scheduler
//!
//! One independent repeating timer per policy category. Each tick claims the
//! category in the ReconciliationEngine without waiting: if the previous
//! cycle is still running the tick is dropped, never queued.
//!
//! Features:
//! - First run immediate on start, then every category interval
//! - Missed ticks skipped (no bursts after a long cycle or suspend)
//! - `trigger_now` for on-demand sync, subject to the same single-flight rule
//! - `stop` cancels the timers, then gives in-flight cycles a bounded grace
//!   period before abandoning them

pub mod shutdown;


pub use shutdown::{ShutdownSignal, ShutdownTrigger};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::constants::{DEFAULT_SHUTDOWN_GRACE, DEFAULT_SOFTWARE_INTERVAL, DEFAULT_WEBSITE_INTERVAL};
use crate::logic::policy::PolicyCategory;
use crate::logic::reconcile::ReconciliationEngine;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A cycle was spawned
    Started,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A cycle for the category is already running
    InFlight,
    ShuttingDown,
    /// No enforcer registered for the category
    Unregistered,
}

/// Default cadence of a category
pub fn default_interval(category: PolicyCategory) -> Duration {
    match category {
        PolicyCategory::Website => Duration::from_secs(DEFAULT_WEBSITE_INTERVAL),
        PolicyCategory::Software => Duration::from_secs(DEFAULT_SOFTWARE_INTERVAL),
    }
}

/// State shared between the scheduler handle and its timer tasks
struct Shared {
    engine: Arc<ReconciliationEngine>,
    signal: ShutdownSignal,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    fn trigger(&self, category: PolicyCategory) -> TriggerOutcome {
        if !self.engine.categories().contains(&category) {
            return TriggerOutcome::Skipped(SkipReason::Unregistered);
        }

        // `stop` fires before it drains `in_flight`: checked under the lock,
        // every spawned cycle is seen by the drain
        let mut in_flight = self.in_flight.lock();
        if self.signal.is_triggered() {
            return TriggerOutcome::Skipped(SkipReason::ShuttingDown);
        }

        let guard = match self.engine.try_begin(category) {
            Some(guard) => guard,
            None => return TriggerOutcome::Skipped(SkipReason::InFlight),
        };

        let engine = Arc::clone(&self.engine);
        let signal = self.signal.clone();
        let handle = tokio::spawn(async move {
            let report = engine.run_cycle(guard, &signal).await;
            log::debug!(
                "{} cycle {} finished: {} applied, {} failed",
                report.category,
                report.cycle_id,
                report.applied(),
                report.failed()
            );
        });

        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);

        TriggerOutcome::Started
    }
}

// ============================================================================
// SCHEDULER
// ============================================================================

pub struct SyncScheduler {
    shared: Arc<Shared>,
    trigger: ShutdownTrigger,
    intervals: BTreeMap<PolicyCategory, Duration>,
    grace: Duration,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncScheduler {
    pub fn new(engine: Arc<ReconciliationEngine>) -> Self {
        let (trigger, signal) = shutdown::channel();
        let intervals = PolicyCategory::ALL
            .iter()
            .map(|c| (*c, default_interval(*c)))
            .collect();

        Self {
            shared: Arc::new(Shared {
                engine,
                signal,
                in_flight: Mutex::new(Vec::new()),
            }),
            trigger,
            intervals,
            grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE),
            timers: Mutex::new(Vec::new()),
        }
    }

    /// Override the cadence of `category`. Zero is raised to one second.
    pub fn with_interval(mut self, category: PolicyCategory, period: Duration) -> Self {
        self.intervals.insert(category, period.max(Duration::from_secs(1)));
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Signal fired by `stop`, for tasks that share the scheduler's lifetime
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.trigger.signal()
    }

    pub fn is_running(&self) -> bool {
        !self.timers.lock().is_empty() && !self.trigger.is_fired()
    }

    /// Start one timer per registered category. No-op if already started or
    /// stopped.
    pub fn start(&self) {
        if self.trigger.is_fired() {
            log::warn!("Sync scheduler already stopped; not restarting");
            return;
        }

        let mut timers = self.timers.lock();
        if !timers.is_empty() {
            return;
        }

        for category in self.shared.engine.categories() {
            let period = self
                .intervals
                .get(&category)
                .copied()
                .unwrap_or_else(|| default_interval(category));
            log::info!("Scheduling {} sync every {}s", category, period.as_secs());
            timers.push(tokio::spawn(run_timer(Arc::clone(&self.shared), category, period)));
        }
    }

    /// Run a cycle for `category` now, outside the cadence
    pub fn trigger_now(&self, category: PolicyCategory) -> TriggerOutcome {
        let outcome = self.shared.trigger(category);
        if let TriggerOutcome::Skipped(reason) = outcome {
            log::info!("Manual {} sync skipped: {:?}", category, reason);
        }
        outcome
    }

    /// Stop issuing ticks, then wait up to the grace period for in-flight
    /// cycles. Cycles still running afterwards are aborted; their actions are
    /// idempotent and retried on the next start.
    pub async fn stop(&self) {
        self.trigger.fire();

        let timers = std::mem::take(&mut *self.timers.lock());
        for timer in timers {
            let _ = timer.await;
        }

        let cycles = std::mem::take(&mut *self.shared.in_flight.lock());
        let deadline = Instant::now() + self.grace;
        let mut abandoned = 0;

        for mut cycle in cycles {
            if tokio::time::timeout_at(deadline, &mut cycle).await.is_err() {
                cycle.abort();
                // Wait for the cancelled task to drop its category lock
                let _ = cycle.await;
                abandoned += 1;
            }
        }

        if abandoned > 0 {
            log::warn!(
                "Abandoned {} in-flight cycles after {}s grace period",
                abandoned,
                self.grace.as_secs()
            );
        }
        log::info!("Sync scheduler stopped");
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.trigger.fire();
    }
}

async fn run_timer(shared: Arc<Shared>, category: PolicyCategory, period: Duration) {
    let mut signal = shared.signal.clone();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = signal.wait() => break,
            _ = ticker.tick() => match shared.trigger(category) {
                TriggerOutcome::Started => {}
                TriggerOutcome::Skipped(SkipReason::InFlight) => {
                    log::debug!("{} tick skipped: previous cycle still running", category);
                }
                TriggerOutcome::Skipped(_) => break,
            },
        }
    }

    log::debug!("{} timer stopped", category);
}
