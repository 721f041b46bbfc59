//! Discord DM delivery through the bot REST API.

use crate::transport::{ChannelTransport, TransportError};
use bondwatch_core::{Brand, BreachEvent, ChannelKind};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

const DISCORD_API: &str = "https://discord.com/api/v10";

#[derive(Deserialize)]
struct DmChannel {
    id: String,
}

/// Sends DMs to Discord users. The destination is the numeric Discord
/// user id captured during the OAuth link flow.
pub struct DiscordTransport {
    http: Client,
    bot_token: String,
}

impl DiscordTransport {
    pub fn new(http: Client, bot_token: String) -> Self {
        Self { http, bot_token }
    }

    /// Discord snowflake ids are 17 to 19 decimal digits.
    fn check_destination(destination: &str) -> Result<(), TransportError> {
        let valid = (17..=19).contains(&destination.len())
            && destination.chars().all(|c| c.is_ascii_digit());
        if valid {
            Ok(())
        } else {
            Err(TransportError::InvalidDestination(destination.to_string()))
        }
    }

    /// DMs require opening (or reusing) a DM channel with the user first.
    async fn open_dm(&self, user_id: &str) -> Result<String, TransportError> {
        let resp = self
            .http
            .post(format!("{}/users/@me/channels", DISCORD_API))
            .header("Authorization", format!("Bot {}", self.bot_token))
            .json(&json!({ "recipient_id": user_id }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Api(format!(
                "open DM failed ({}): {}",
                status, body
            )));
        }

        let channel: DmChannel = resp.json().await?;
        Ok(channel.id)
    }

    async fn send_dm(&self, user_id: &str, content: &str) -> Result<(), TransportError> {
        Self::check_destination(user_id)?;
        let channel_id = self.open_dm(user_id).await?;

        let resp = self
            .http
            .post(format!("{}/channels/{}/messages", DISCORD_API, channel_id))
            .header("Authorization", format!("Bot {}", self.bot_token))
            .json(&json!({ "content": content }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Api(format!(
                "send DM failed ({}): {}",
                status, body
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl ChannelTransport for DiscordTransport {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Discord
    }

    async fn send_verification_code(
        &self,
        destination: &str,
        code: &str,
        brand: Brand,
    ) -> Result<(), TransportError> {
        self.send_dm(destination, &format_verification_message(code, brand))
            .await
    }

    async fn send_breach_alert(
        &self,
        destination: &str,
        event: &BreachEvent,
    ) -> Result<(), TransportError> {
        self.send_dm(destination, &format_alert_message(event)).await?;
        info!(destination = destination, "Discord alert sent");
        Ok(())
    }
}

fn format_verification_message(code: &str, brand: Brand) -> String {
    format!(
        "🔐 **{} Balance Notification Verification**\n\n\
         Your verification code is: **{}**\n\
         This code expires in 10 minutes.",
        brand.display_name(),
        code
    )
}

fn format_alert_message(event: &BreachEvent) -> String {
    format!(
        "⚠️ **{} Balance Alert**\n\n\
         **Bond Address:** `{}`\n\
         **Current Balance:** {} SOL\n\
         **Threshold:** {} SOL\n\n\
         Your balance has dropped below your set threshold!",
        event.brand.display_name(),
        event.short_address(),
        event.balance_display(),
        event.threshold
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_must_be_snowflake() {
        assert!(DiscordTransport::check_destination("123456789012345678").is_ok());
        assert!(DiscordTransport::check_destination("12345").is_err());
        assert!(DiscordTransport::check_destination("not-a-snowflake-id").is_err());
    }

    #[test]
    fn test_alert_message_uses_markdown_bold() {
        let msg = format_alert_message(&BreachEvent {
            subscription_id: 7,
            address: "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM".to_string(),
            current_balance: 1.25,
            threshold: 2.0,
            previous_balance: Some(3.0),
            brand: Brand::Jpool,
        });
        assert!(msg.contains("**Jpool Balance Alert**"));
        assert!(msg.contains("1.2500 SOL"));
        assert!(msg.contains("`9WzDXwBb...`"));
    }
}
