//! Persistence traits the monitor, coordinator, and dispatcher depend on.
//!
//! The concrete SQLite implementation lives in `bondwatch-store`; tests use
//! its in-memory implementation. The contract only requires atomic
//! single-record read-modify-write and a uniqueness constraint on
//! (subscription, kind).

use crate::{Brand, ChannelKind, NotificationChannel, Subscription};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(i64),
    #[error("channel not found: {0}")]
    ChannelNotFound(i64),
    #[error("channel already exists for subscription {subscription_id} kind {kind}")]
    DuplicateChannel {
        subscription_id: i64,
        kind: ChannelKind,
    },
}

/// Fields for a newly created channel.
#[derive(Debug, Clone)]
pub struct NewChannel {
    pub subscription_id: i64,
    pub kind: ChannelKind,
    pub destination: Option<String>,
    pub verified: bool,
    pub verification_code: Option<String>,
    pub verification_expires: Option<i64>,
}

/// Durable store of monitored subscriptions.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Create a subscription for `address`, or update threshold, interval,
    /// and brand if one already exists. Reactivates a deactivated record.
    async fn upsert_subscription(
        &self,
        address: &str,
        threshold: f64,
        check_interval_secs: i64,
        brand: Brand,
    ) -> Result<Subscription, StoreError>;

    async fn find_subscription(&self, id: i64) -> Result<Option<Subscription>, StoreError>;

    async fn find_by_address(&self, address: &str) -> Result<Option<Subscription>, StoreError>;

    async fn find_active_subscriptions(&self) -> Result<Vec<Subscription>, StoreError>;

    /// Persist the observed balance and check timestamp after a successful
    /// balance fetch. Runs whether or not a breach was detected.
    async fn record_balance_check(
        &self,
        id: i64,
        balance: f64,
        checked_at: i64,
    ) -> Result<(), StoreError>;

    /// Deactivate or reactivate a subscription. The core never deletes.
    async fn set_active(&self, id: i64, active: bool) -> Result<(), StoreError>;
}

/// Durable registry of notification channels.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// Insert a channel. Fails with [`StoreError::DuplicateChannel`] when a
    /// channel for the same (subscription, kind) already exists.
    async fn create_channel(&self, new: NewChannel) -> Result<NotificationChannel, StoreError>;

    async fn find_channel(&self, id: i64) -> Result<Option<NotificationChannel>, StoreError>;

    /// All channels of a subscription, optionally restricted to verified
    /// ones (the dispatcher only ever reads verified channels).
    async fn find_by_subscription(
        &self,
        subscription_id: i64,
        only_verified: bool,
    ) -> Result<Vec<NotificationChannel>, StoreError>;

    async fn find_by_kind(
        &self,
        subscription_id: i64,
        kind: ChannelKind,
    ) -> Result<Option<NotificationChannel>, StoreError>;

    /// Overwrite the pending code and expiry, resetting the channel to
    /// unverified. Used when a subscriber re-requests verification.
    /// `destination` replaces the stored destination (None clears it for
    /// bot/OAuth kinds awaiting a platform id).
    async fn reset_pending(
        &self,
        id: i64,
        code: &str,
        expires_at: i64,
        destination: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Mark a channel verified, clearing any pending code and expiry.
    /// `destination`, when given, overwrites the stored destination
    /// (bot/OAuth kinds learn it here; re-linking overwrites it).
    async fn mark_verified(&self, id: i64, destination: Option<&str>) -> Result<(), StoreError>;
}
