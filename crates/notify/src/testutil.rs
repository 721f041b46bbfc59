//! Shared fakes for coordinator and dispatcher tests.

use bondwatch_channels::{ChannelTransport, OauthProvider, OauthUser, TransportError};
use bondwatch_core::{Brand, BreachEvent, ChannelKind};
use async_trait::async_trait;
use std::sync::Mutex;

pub struct RecordingTransport {
    kind: ChannelKind,
    fail: bool,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingTransport {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            fail: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(kind: ChannelKind) -> Self {
        Self {
            kind,
            fail: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// (destination, payload) pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelTransport for RecordingTransport {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send_verification_code(
        &self,
        destination: &str,
        code: &str,
        _brand: Brand,
    ) -> Result<(), TransportError> {
        if self.fail {
            return Err(TransportError::Api("transport down".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), format!("code:{}", code)));
        Ok(())
    }

    async fn send_breach_alert(
        &self,
        destination: &str,
        event: &BreachEvent,
    ) -> Result<(), TransportError> {
        if self.fail {
            return Err(TransportError::Api("transport down".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), format!("alert:{}", event.subscription_id)));
        Ok(())
    }
}

pub struct FakeOauth;

#[async_trait]
impl OauthProvider for FakeOauth {
    fn authorization_url(&self, state: &str) -> Result<String, TransportError> {
        Ok(format!("https://oauth.test/authorize?state={}", state))
    }

    async fn exchange_code(&self, code: &str) -> Result<OauthUser, TransportError> {
        if code == "bad" {
            return Err(TransportError::Api("invalid grant".to_string()));
        }
        Ok(OauthUser {
            id: "123456789012345678".to_string(),
            username: "tester".to_string(),
        })
    }
}
