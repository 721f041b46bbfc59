//! SMS delivery through the Twilio REST API.

use crate::transport::{ChannelTransport, TransportError};
use bondwatch_core::{validate::is_valid_phone, Brand, BreachEvent, ChannelKind};
use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

pub struct TwilioTransport {
    http: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioTransport {
    pub fn new(http: Client, account_sid: String, auth_token: String, from_number: String) -> Self {
        Self {
            http,
            account_sid,
            auth_token,
            from_number,
        }
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<(), TransportError> {
        if !is_valid_phone(to) {
            return Err(TransportError::InvalidDestination(to.to_string()));
        }

        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Api(format!(
                "Twilio rejected message ({}): {}",
                status, body
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl ChannelTransport for TwilioTransport {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn send_verification_code(
        &self,
        destination: &str,
        code: &str,
        brand: Brand,
    ) -> Result<(), TransportError> {
        self.send_sms(destination, &format_verification_message(code, brand))
            .await
    }

    async fn send_breach_alert(
        &self,
        destination: &str,
        event: &BreachEvent,
    ) -> Result<(), TransportError> {
        self.send_sms(destination, &format_alert_message(event)).await?;
        info!(destination = destination, "SMS alert sent");
        Ok(())
    }
}

fn format_verification_message(code: &str, brand: Brand) -> String {
    format!(
        "{} verification code: {}. Expires in 10 minutes.",
        brand.display_name(),
        code
    )
}

fn format_alert_message(event: &BreachEvent) -> String {
    format!(
        "{} Balance Alert: bond {} is at {} SOL, below your threshold of {} SOL.",
        event.brand.display_name(),
        event.short_address(),
        event.balance_display(),
        event.threshold
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sms_messages_are_plain_and_short() {
        let msg = format_verification_message("987654", Brand::Jpool);
        assert_eq!(msg, "Jpool verification code: 987654. Expires in 10 minutes.");

        let alert = format_alert_message(&BreachEvent {
            subscription_id: 3,
            address: "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM".to_string(),
            current_balance: 0.5,
            threshold: 1.0,
            previous_balance: None,
            brand: Brand::Jpool,
        });
        assert!(alert.contains("0.5000 SOL"));
        assert!(!alert.contains('*'));
    }
}
