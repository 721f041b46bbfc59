//! Telegram bot: outbound alert delivery and inbound verification DMs.

use crate::transport::{ChannelTransport, TransportError};
use bondwatch_core::{Brand, BreachEvent, ChannelKind};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

/// Outcome of an inbound chat verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatVerifyOutcome {
    /// Code matched; the sender is now a verified destination.
    Verified,
    /// The sender has a pending code, but submitted a different one.
    InvalidCode,
    /// No pending code for this submission (never issued, expired, or
    /// already consumed).
    NoPending,
    /// Verification could not be completed (store failure).
    Error,
}

/// Inbound verification hook the bot calls when a subscriber DMs a code.
/// Implemented by the verification coordinator; the bot only renders the
/// outcome.
#[async_trait]
pub trait ChatVerifier: Send + Sync {
    async fn confirm_chat_code(&self, code: &str, platform_user_id: &str) -> ChatVerifyOutcome;
}

/// Bot commands.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Start the bot")]
    Start,
    #[command(description = "Verify your account. Usage: /verify <code>")]
    Verify(String),
    #[command(description = "Show help")]
    Help,
}

/// Telegram bot wrapper driving the inbound DM verification flow.
pub struct TelegramBot {
    bot: Bot,
    verifier: Arc<dyn ChatVerifier>,
}

/// Bot deep link (`https://t.me/<username>`), if the token is valid.
pub async fn bot_deep_link(bot: &Bot) -> Option<String> {
    match bot.get_me().await {
        Ok(me) => me
            .user
            .username
            .as_ref()
            .map(|name| format!("https://t.me/{}", name)),
        Err(e) => {
            warn!(error = %e, "Failed to look up bot username");
            None
        }
    }
}

impl TelegramBot {
    pub fn new(bot: Bot, verifier: Arc<dyn ChatVerifier>) -> Self {
        Self { bot, verifier }
    }

    /// Run the bot update handler until shutdown.
    pub async fn run(self: Arc<Self>) {
        let bot = self.bot.clone();

        let command_handler = {
            let this = Arc::clone(&self);
            dptree::entry().filter_command::<Command>().endpoint(
                move |bot: Bot, msg: Message, cmd: Command| {
                    let this = Arc::clone(&this);
                    async move { this.handle_command(bot, msg, cmd).await }
                },
            )
        };

        let text_handler = {
            let this = Arc::clone(&self);
            dptree::endpoint(move |bot: Bot, msg: Message| {
                let this = Arc::clone(&this);
                async move { this.handle_text(bot, msg).await }
            })
        };

        let handler = Update::filter_message()
            .branch(command_handler)
            .branch(text_handler);

        Dispatcher::builder(bot, handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    }

    async fn handle_command(&self, bot: Bot, msg: Message, cmd: Command) -> ResponseResult<()> {
        match cmd {
            Command::Start => {
                bot.send_message(
                    msg.chat.id,
                    "👋 Welcome to Balance Notifications!\n\n\
                     To verify your Telegram account, use the command:\n\
                     /verify <code>\n\n\
                     You will receive a verification code after subscribing on the website.",
                )
                .await?;
            }

            Command::Verify(code) => {
                let code = code.trim();
                if code.is_empty() {
                    bot.send_message(
                        msg.chat.id,
                        "Usage: /verify <code>\n\n\
                         Enter the 6-digit verification code you received from the website.",
                    )
                    .await?;
                    return Ok(());
                }

                let Some(user_id) = sender_id(&msg) else {
                    return Ok(());
                };
                let outcome = self.verifier.confirm_chat_code(code, &user_id).await;
                bot.send_message(msg.chat.id, outcome_reply(outcome)).await?;
            }

            Command::Help => {
                bot.send_message(msg.chat.id, Command::descriptions().to_string())
                    .await?;
            }
        }

        Ok(())
    }

    /// Bare 6-digit messages are treated as verification codes.
    async fn handle_text(&self, bot: Bot, msg: Message) -> ResponseResult<()> {
        let Some(text) = msg.text() else {
            return Ok(());
        };
        let text = text.trim();
        if text.len() != 6 || !text.chars().all(|c| c.is_ascii_digit()) {
            return Ok(());
        }
        let Some(user_id) = sender_id(&msg) else {
            return Ok(());
        };

        match self.verifier.confirm_chat_code(text, &user_id).await {
            // Stay silent when nothing was pending; random numbers in chat
            // should not trigger error replies.
            ChatVerifyOutcome::NoPending => {}
            outcome => {
                bot.send_message(msg.chat.id, outcome_reply(outcome)).await?;
            }
        }

        Ok(())
    }
}

fn sender_id(msg: &Message) -> Option<String> {
    msg.from.as_ref().map(|user| user.id.to_string())
}

fn outcome_reply(outcome: ChatVerifyOutcome) -> &'static str {
    match outcome {
        ChatVerifyOutcome::Verified => {
            "✅ Verification successful! You will now receive balance notifications."
        }
        ChatVerifyOutcome::InvalidCode => "❌ Invalid verification code. Please try again.",
        ChatVerifyOutcome::NoPending => {
            "❌ Invalid or expired verification code. Please get a new code from the website."
        }
        ChatVerifyOutcome::Error => "❌ Something went wrong. Please try again later.",
    }
}

/// Outbound Telegram transport. The destination is the numeric Telegram
/// user id recorded during verification.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn chat_id(destination: &str) -> Result<ChatId, TransportError> {
        destination
            .parse::<i64>()
            .map(ChatId)
            .map_err(|_| TransportError::InvalidDestination(destination.to_string()))
    }
}

#[async_trait]
impl ChannelTransport for TelegramTransport {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    async fn send_verification_code(
        &self,
        destination: &str,
        code: &str,
        brand: Brand,
    ) -> Result<(), TransportError> {
        let chat_id = Self::chat_id(destination)?;
        self.bot
            .send_message(chat_id, format_verification_message(code, brand))
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    async fn send_breach_alert(
        &self,
        destination: &str,
        event: &BreachEvent,
    ) -> Result<(), TransportError> {
        let chat_id = Self::chat_id(destination)?;
        self.bot
            .send_message(chat_id, format_alert_message(event))
            .parse_mode(ParseMode::Html)
            .await?;
        info!(destination = destination, "Telegram alert sent");
        Ok(())
    }
}

fn format_verification_message(code: &str, brand: Brand) -> String {
    format!(
        "🔐 <b>{} Balance Notification Verification</b>\n\n\
         Your verification code is: <b>{}</b>\n\
         This code expires in 10 minutes.\n\n\
         To verify, send the command:\n\
         /verify {}",
        brand.display_name(),
        code,
        code
    )
}

fn format_alert_message(event: &BreachEvent) -> String {
    format!(
        "⚠️ <b>{} Balance Alert</b>\n\n\
         <b>Bond Address:</b> <code>{}</code>\n\
         <b>Current Balance:</b> {} SOL\n\
         <b>Threshold:</b> {} SOL\n\n\
         Your balance has dropped below your set threshold!",
        event.brand.display_name(),
        event.short_address(),
        event.balance_display(),
        event.threshold
    )
}
