//! In-memory store used by tests.

use async_trait::async_trait;
use bondwatch_core::{
    Brand, ChannelKind, ChannelStore, NewChannel, NotificationChannel, StoreError, Subscription,
    SubscriptionStore,
};
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    subscriptions: Vec<Subscription>,
    channels: Vec<NotificationChannel>,
    next_subscription_id: i64,
    next_channel_id: i64,
}

/// Mutex-guarded in-memory implementation of the store traits. Mirrors
/// the SQLite semantics, including the (subscription, kind) uniqueness
/// constraint.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn upsert_subscription(
        &self,
        address: &str,
        threshold: f64,
        check_interval_secs: i64,
        brand: Brand,
    ) -> Result<Subscription, StoreError> {
        let mut inner = self.lock();
        if let Some(sub) = inner
            .subscriptions
            .iter_mut()
            .find(|s| s.address == address)
        {
            sub.threshold = threshold;
            sub.check_interval_secs = check_interval_secs;
            sub.brand = brand;
            sub.active = true;
            return Ok(sub.clone());
        }

        inner.next_subscription_id += 1;
        let sub = Subscription {
            id: inner.next_subscription_id,
            address: address.to_string(),
            threshold,
            check_interval_secs,
            last_balance: None,
            last_checked: None,
            active: true,
            brand,
        };
        inner.subscriptions.push(sub.clone());
        Ok(sub)
    }

    async fn find_subscription(&self, id: i64) -> Result<Option<Subscription>, StoreError> {
        Ok(self.lock().subscriptions.iter().find(|s| s.id == id).cloned())
    }

    async fn find_by_address(&self, address: &str) -> Result<Option<Subscription>, StoreError> {
        Ok(self
            .lock()
            .subscriptions
            .iter()
            .find(|s| s.address == address)
            .cloned())
    }

    async fn find_active_subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        Ok(self
            .lock()
            .subscriptions
            .iter()
            .filter(|s| s.active)
            .cloned()
            .collect())
    }

    async fn record_balance_check(
        &self,
        id: i64,
        balance: f64,
        checked_at: i64,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let sub = inner
            .subscriptions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::SubscriptionNotFound(id))?;
        sub.last_balance = Some(balance);
        sub.last_checked = Some(checked_at);
        Ok(())
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let sub = inner
            .subscriptions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::SubscriptionNotFound(id))?;
        sub.active = active;
        Ok(())
    }
}

#[async_trait]
impl ChannelStore for MemoryStore {
    async fn create_channel(&self, new: NewChannel) -> Result<NotificationChannel, StoreError> {
        let mut inner = self.lock();
        if inner
            .channels
            .iter()
            .any(|c| c.subscription_id == new.subscription_id && c.kind == new.kind)
        {
            return Err(StoreError::DuplicateChannel {
                subscription_id: new.subscription_id,
                kind: new.kind,
            });
        }

        inner.next_channel_id += 1;
        let channel = NotificationChannel {
            id: inner.next_channel_id,
            subscription_id: new.subscription_id,
            kind: new.kind,
            destination: new.destination,
            verified: new.verified,
            verification_code: new.verification_code,
            verification_expires: new.verification_expires,
        };
        inner.channels.push(channel.clone());
        Ok(channel)
    }

    async fn find_channel(&self, id: i64) -> Result<Option<NotificationChannel>, StoreError> {
        Ok(self.lock().channels.iter().find(|c| c.id == id).cloned())
    }

    async fn find_by_subscription(
        &self,
        subscription_id: i64,
        only_verified: bool,
    ) -> Result<Vec<NotificationChannel>, StoreError> {
        Ok(self
            .lock()
            .channels
            .iter()
            .filter(|c| c.subscription_id == subscription_id && (!only_verified || c.verified))
            .cloned()
            .collect())
    }

    async fn find_by_kind(
        &self,
        subscription_id: i64,
        kind: ChannelKind,
    ) -> Result<Option<NotificationChannel>, StoreError> {
        Ok(self
            .lock()
            .channels
            .iter()
            .find(|c| c.subscription_id == subscription_id && c.kind == kind)
            .cloned())
    }

    async fn reset_pending(
        &self,
        id: i64,
        code: &str,
        expires_at: i64,
        destination: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let channel = inner
            .channels
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(StoreError::ChannelNotFound(id))?;
        channel.verification_code = Some(code.to_string());
        channel.verification_expires = Some(expires_at);
        channel.verified = false;
        channel.destination = destination.map(str::to_string);
        Ok(())
    }

    async fn mark_verified(&self, id: i64, destination: Option<&str>) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let channel = inner
            .channels
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(StoreError::ChannelNotFound(id))?;
        channel.verified = true;
        channel.verification_code = None;
        channel.verification_expires = None;
        if let Some(dest) = destination {
            channel.destination = Some(dest.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_matches_sqlite_semantics() {
        let store = MemoryStore::new();
        let sub = store
            .upsert_subscription("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM", 5.0, 900, Brand::Jpool)
            .await
            .unwrap();

        let channel = store
            .create_channel(NewChannel {
                subscription_id: sub.id,
                kind: ChannelKind::Sms,
                destination: Some("+14155550100".to_string()),
                verified: false,
                verification_code: Some("123456".to_string()),
                verification_expires: Some(600),
            })
            .await
            .unwrap();

        let dup = store
            .create_channel(NewChannel {
                subscription_id: sub.id,
                kind: ChannelKind::Sms,
                destination: Some("+14155550199".to_string()),
                verified: false,
                verification_code: None,
                verification_expires: None,
            })
            .await;
        assert!(matches!(dup, Err(StoreError::DuplicateChannel { .. })));

        assert!(store
            .find_by_subscription(sub.id, true)
            .await
            .unwrap()
            .is_empty());

        store.mark_verified(channel.id, None).await.unwrap();
        assert_eq!(store.find_by_subscription(sub.id, true).await.unwrap().len(), 1);
    }
}
