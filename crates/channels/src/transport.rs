//! Transport trait and per-kind registry.

use bondwatch_core::{Brand, BreachEvent, ChannelKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no transport configured for channel kind: {0}")]
    NotConfigured(ChannelKind),
    #[error("invalid destination: {0}")]
    InvalidDestination(String),
    #[error("Telegram API error: {0}")]
    Telegram(#[from] teloxide::RequestError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider rejected request: {0}")]
    Api(String),
    #[error("email error: {0}")]
    Email(String),
}

/// One notification transport (SMS, email, Telegram DM, Discord DM).
///
/// Each transport owns its own message formatting so alerts render
/// natively per platform (Markdown for Telegram, HTML email, plain SMS).
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Deliver a one-time verification code to a destination.
    async fn send_verification_code(
        &self,
        destination: &str,
        code: &str,
        brand: Brand,
    ) -> Result<(), TransportError>;

    /// Deliver a low-balance alert to a destination.
    async fn send_breach_alert(
        &self,
        destination: &str,
        event: &BreachEvent,
    ) -> Result<(), TransportError>;
}

/// Registry of configured transports, keyed by channel kind.
///
/// Transports with missing credentials are simply never registered; the
/// lookup then fails with [`TransportError::NotConfigured`].
#[derive(Default)]
pub struct TransportRegistry {
    transports: HashMap<ChannelKind, Arc<dyn ChannelTransport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport under its own kind.
    pub fn register(&mut self, transport: Arc<dyn ChannelTransport>) {
        self.transports.insert(transport.kind(), transport);
    }

    pub fn get(&self, kind: ChannelKind) -> Result<&Arc<dyn ChannelTransport>, TransportError> {
        self.transports
            .get(&kind)
            .ok_or(TransportError::NotConfigured(kind))
    }

    pub fn is_configured(&self, kind: ChannelKind) -> bool {
        self.transports.contains_key(&kind)
    }

    pub fn configured_kinds(&self) -> Vec<ChannelKind> {
        let mut kinds: Vec<ChannelKind> = self.transports.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}
