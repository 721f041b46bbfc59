//! Notification channel transports for bondwatch.
//!
//! This crate provides:
//! - The `ChannelTransport` trait and per-kind transport registry
//! - Telegram bot integration (outbound alerts + inbound verification DMs)
//! - Discord DM delivery and OAuth account linking
//! - Twilio SMS and SMTP email delivery

pub mod discord;
pub mod email;
pub mod oauth;
pub mod sms;
pub mod telegram;
pub mod transport;

pub use discord::DiscordTransport;
pub use email::{EmailConfig, EmailTransport};
pub use oauth::{DiscordOauth, OauthProvider, OauthUser};
pub use sms::TwilioTransport;
pub use telegram::{bot_deep_link, ChatVerifier, ChatVerifyOutcome, TelegramBot, TelegramTransport};
pub use transport::{ChannelTransport, TransportError, TransportRegistry};
