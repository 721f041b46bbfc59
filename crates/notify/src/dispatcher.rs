//! Fan-out of breach alerts to a subscription's verified channels.

use bondwatch_channels::TransportRegistry;
use bondwatch_core::{BreachEvent, ChannelKind, ChannelStore, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// Result of one delivery attempt.
#[derive(Debug, Clone)]
pub struct ChannelDelivery {
    pub channel_id: i64,
    pub kind: ChannelKind,
    pub destination: String,
    pub error: Option<String>,
}

impl ChannelDelivery {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub deliveries: Vec<ChannelDelivery>,
}

impl DispatchReport {
    pub fn sent_count(&self) -> usize {
        self.deliveries.iter().filter(|d| d.succeeded()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.deliveries.len() - self.sent_count()
    }

    pub fn by_kind(&self) -> HashMap<ChannelKind, Vec<&ChannelDelivery>> {
        let mut map: HashMap<ChannelKind, Vec<&ChannelDelivery>> = HashMap::new();
        for delivery in &self.deliveries {
            map.entry(delivery.kind).or_default().push(delivery);
        }
        map
    }
}

/// Delivers one breach event to every verified channel of the affected
/// subscription. A failing channel never blocks the others, and nothing
/// is retried; the next breach triggers the next attempt.
pub struct Dispatcher {
    store: Arc<dyn ChannelStore>,
    transports: Arc<TransportRegistry>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn ChannelStore>, transports: Arc<TransportRegistry>) -> Self {
        Self { store, transports }
    }

    pub async fn dispatch_breach(&self, event: &BreachEvent) -> Result<DispatchReport, StoreError> {
        let channels = self
            .store
            .find_by_subscription(event.subscription_id, true)
            .await?;
        let mut report = DispatchReport::default();

        if channels.is_empty() {
            info!(
                subscription_id = event.subscription_id,
                "Breach detected but no verified channels to notify"
            );
            return Ok(report);
        }

        for channel in channels {
            let Some(destination) = channel.destination.clone() else {
                error!(
                    channel_id = channel.id,
                    kind = %channel.kind,
                    "Verified channel has no destination"
                );
                report.deliveries.push(ChannelDelivery {
                    channel_id: channel.id,
                    kind: channel.kind,
                    destination: String::new(),
                    error: Some("missing destination".to_string()),
                });
                continue;
            };

            let result = match self.transports.get(channel.kind) {
                Ok(transport) => transport.send_breach_alert(&destination, event).await,
                Err(e) => Err(e),
            };
            let error = match result {
                Ok(()) => None,
                Err(e) => {
                    error!(
                        channel_id = channel.id,
                        kind = %channel.kind,
                        error = %e,
                        "Alert delivery failed"
                    );
                    Some(e.to_string())
                }
            };
            report.deliveries.push(ChannelDelivery {
                channel_id: channel.id,
                kind: channel.kind,
                destination,
                error,
            });
        }

        info!(
            subscription_id = event.subscription_id,
            sent = report.sent_count(),
            failed = report.failure_count(),
            "Breach dispatch complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RecordingTransport;
    use bondwatch_core::{Brand, NewChannel, SubscriptionStore};
    use bondwatch_store::MemoryStore;

    async fn seed_channel(
        store: &MemoryStore,
        subscription_id: i64,
        kind: ChannelKind,
        destination: &str,
        verified: bool,
    ) {
        store
            .create_channel(NewChannel {
                subscription_id,
                kind,
                destination: Some(destination.to_string()),
                verified,
                verification_code: None,
                verification_expires: None,
            })
            .await
            .unwrap();
    }

    fn event(subscription_id: i64) -> BreachEvent {
        BreachEvent {
            subscription_id,
            address: "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM".to_string(),
            current_balance: 4.5,
            threshold: 5.0,
            previous_balance: Some(6.0),
            brand: Brand::Jpool,
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_block_other_channels() {
        let store = Arc::new(MemoryStore::new());
        let sub = store
            .upsert_subscription("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM", 5.0, 900, Brand::Jpool)
            .await
            .unwrap();
        seed_channel(&store, sub.id, ChannelKind::Sms, "+14155550100", true).await;
        seed_channel(&store, sub.id, ChannelKind::Email, "user@example.com", true).await;

        let sms = Arc::new(RecordingTransport::failing(ChannelKind::Sms));
        let email = Arc::new(RecordingTransport::new(ChannelKind::Email));
        let mut registry = TransportRegistry::new();
        registry.register(sms.clone());
        registry.register(email.clone());

        let dispatcher = Dispatcher::new(store, Arc::new(registry));
        let report = dispatcher.dispatch_breach(&event(sub.id)).await.unwrap();

        assert_eq!(report.deliveries.len(), 2);
        assert_eq!(report.sent_count(), 1);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(email.sent().len(), 1);
        assert_eq!(email.sent()[0].0, "user@example.com");
    }

    #[tokio::test]
    async fn test_unverified_channels_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let sub = store
            .upsert_subscription("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM", 5.0, 900, Brand::Jpool)
            .await
            .unwrap();
        seed_channel(&store, sub.id, ChannelKind::Sms, "+14155550100", false).await;

        let sms = Arc::new(RecordingTransport::new(ChannelKind::Sms));
        let mut registry = TransportRegistry::new();
        registry.register(sms.clone());

        let dispatcher = Dispatcher::new(store, Arc::new(registry));
        let report = dispatcher.dispatch_breach(&event(sub.id)).await.unwrap();

        assert!(report.deliveries.is_empty());
        assert!(sms.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_transport_recorded_as_failure() {
        let store = Arc::new(MemoryStore::new());
        let sub = store
            .upsert_subscription("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM", 5.0, 900, Brand::Jpool)
            .await
            .unwrap();
        seed_channel(&store, sub.id, ChannelKind::Discord, "123456789012345678", true).await;

        let dispatcher = Dispatcher::new(store, Arc::new(TransportRegistry::new()));
        let report = dispatcher.dispatch_breach(&event(sub.id)).await.unwrap();

        assert_eq!(report.failure_count(), 1);
        let by_kind = report.by_kind();
        assert!(by_kind.contains_key(&ChannelKind::Discord));
    }
}
