//! Periodic balance check loop.

use crate::source::BalanceSource;
use bondwatch_core::{crossed_below, BreachEvent, StoreError, SubscriptionStore};
use bondwatch_notify::Dispatcher;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Upper bound on a single balance fetch.
    pub fetch_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Counts for one completed tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    /// Subscriptions whose balance was fetched and persisted.
    pub checked: usize,
    /// Subscriptions not yet due for a check.
    pub skipped: usize,
    /// Threshold crossings dispatched.
    pub breaches: usize,
    /// Fetch or persistence failures.
    pub failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResult {
    Completed(TickSummary),
    /// The previous tick was still in flight; nothing ran and nothing
    /// was queued.
    Skipped,
}

/// Walks all active subscriptions on each tick, fetches balances for
/// the due ones, persists the readings, and hands threshold crossings
/// to the dispatcher.
pub struct BalanceChecker {
    subscriptions: Arc<dyn SubscriptionStore>,
    source: Arc<dyn BalanceSource>,
    dispatcher: Arc<Dispatcher>,
    config: MonitorConfig,
    running: AtomicBool,
}

impl BalanceChecker {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        source: Arc<dyn BalanceSource>,
        dispatcher: Arc<Dispatcher>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            subscriptions,
            source,
            dispatcher,
            config,
            running: AtomicBool::new(false),
        }
    }

    pub async fn run_tick(&self) -> Result<TickResult, StoreError> {
        self.run_tick_at(Utc::now().timestamp()).await
    }

    pub async fn run_tick_at(&self, now: i64) -> Result<TickResult, StoreError> {
        // Overlapping ticks are dropped, not queued; a slow pass must
        // never pile up behind itself.
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Previous balance check still running, skipping tick");
            return Ok(TickResult::Skipped);
        }

        let result = self.tick_inner(now).await;
        self.running.store(false, Ordering::SeqCst);
        result.map(TickResult::Completed)
    }

    async fn tick_inner(&self, now: i64) -> Result<TickSummary, StoreError> {
        let subscriptions = self.subscriptions.find_active_subscriptions().await?;
        let mut summary = TickSummary::default();

        for sub in subscriptions {
            if !sub.due_at(now) {
                summary.skipped += 1;
                continue;
            }

            let fetched = tokio::time::timeout(
                self.config.fetch_timeout,
                self.source.balance(&sub.address),
            )
            .await;
            let balance = match fetched {
                Ok(Ok(balance)) => balance,
                Ok(Err(e)) => {
                    error!(address = %sub.address, error = %e, "Balance fetch failed");
                    summary.failures += 1;
                    continue;
                }
                Err(_) => {
                    error!(address = %sub.address, "Balance fetch timed out");
                    summary.failures += 1;
                    continue;
                }
            };

            // Persist every successful reading, breach or not; the
            // previous value is what the next crossing check compares
            // against.
            let previous = sub.last_balance;
            if let Err(e) = self
                .subscriptions
                .record_balance_check(sub.id, balance, now)
                .await
            {
                error!(subscription_id = sub.id, error = %e, "Failed to persist balance");
                summary.failures += 1;
                continue;
            }
            summary.checked += 1;

            if crossed_below(previous, balance, sub.threshold) {
                info!(
                    subscription_id = sub.id,
                    address = %sub.address,
                    balance,
                    threshold = sub.threshold,
                    "Balance crossed below threshold"
                );
                summary.breaches += 1;
                let event = BreachEvent {
                    subscription_id: sub.id,
                    address: sub.address.clone(),
                    current_balance: balance,
                    threshold: sub.threshold,
                    previous_balance: previous,
                    brand: sub.brand,
                };
                if let Err(e) = self.dispatcher.dispatch_breach(&event).await {
                    error!(subscription_id = sub.id, error = %e, "Breach dispatch failed");
                }
            }
        }

        info!(
            checked = summary.checked,
            skipped = summary.skipped,
            breaches = summary.breaches,
            failures = summary.failures,
            "Balance check tick complete"
        );
        Ok(summary)
    }
}
