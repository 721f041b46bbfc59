//! Environment-driven application configuration.
//!
//! Provider credentials are all optional: a missing set disables that
//! channel and the server logs what is off. Only the Solana RPC URL is
//! required.

use bondwatch_channels::EmailConfig;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {name}: {value}")]
    InvalidVar { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct TwilioSettings {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

#[derive(Debug, Clone)]
pub struct DiscordSettings {
    pub bot_token: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: String,
    pub solana_rpc_url: String,
    /// How often the scheduler wakes up. Per-subscription intervals
    /// gate the actual fetches.
    pub tick_interval: Duration,
    pub fetch_timeout: Duration,
    pub telegram_token: Option<String>,
    pub twilio: Option<TwilioSettings>,
    pub smtp: Option<EmailConfig>,
    pub discord: Option<DiscordSettings>,
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_secs(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match env_opt(name) {
        Some(value) => value
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidVar { name, value }),
        None => Ok(Duration::from_secs(default)),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let solana_rpc_url =
            env_opt("SOLANA_RPC_URL").ok_or(ConfigError::MissingVar("SOLANA_RPC_URL"))?;

        let telegram_token = env_opt("TELEGRAM_BOT_TOKEN");
        if telegram_token.is_none() {
            warn!("TELEGRAM_BOT_TOKEN not set, Telegram channel disabled");
        }

        let twilio = match (
            env_opt("TWILIO_ACCOUNT_SID"),
            env_opt("TWILIO_AUTH_TOKEN"),
            env_opt("TWILIO_PHONE_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioSettings {
                account_sid,
                auth_token,
                from_number,
            }),
            _ => {
                warn!("Twilio credentials not set, SMS channel disabled");
                None
            }
        };

        let smtp = match (
            env_opt("SMTP_HOST"),
            env_opt("SMTP_USER"),
            env_opt("SMTP_PASS"),
            env_opt("SMTP_FROM"),
        ) {
            (Some(host), Some(username), Some(password), Some(from)) => {
                let port = match env_opt("SMTP_PORT") {
                    Some(value) => value.parse::<u16>().map_err(|_| ConfigError::InvalidVar {
                        name: "SMTP_PORT",
                        value,
                    })?,
                    None => 587,
                };
                Some(EmailConfig {
                    host,
                    port,
                    username,
                    password,
                    from,
                })
            }
            _ => {
                warn!("SMTP credentials not set, email channel disabled");
                None
            }
        };

        let discord = match (
            env_opt("DISCORD_BOT_TOKEN"),
            env_opt("DISCORD_CLIENT_ID"),
            env_opt("DISCORD_CLIENT_SECRET"),
            env_opt("DISCORD_REDIRECT_URI"),
        ) {
            (Some(bot_token), Some(client_id), Some(client_secret), Some(redirect_uri)) => {
                Some(DiscordSettings {
                    bot_token,
                    client_id,
                    client_secret,
                    redirect_uri,
                })
            }
            _ => {
                warn!("Discord credentials not set, Discord channel disabled");
                None
            }
        };

        Ok(Self {
            bind_addr: env_opt("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            database_url: env_opt("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:bondwatch.db".to_string()),
            solana_rpc_url,
            tick_interval: env_secs("CHECK_TICK_SECS", 60)?,
            fetch_timeout: env_secs("RPC_TIMEOUT_SECS", 10)?,
            telegram_token,
            twilio,
            smtp,
            discord,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_secs_parsing() {
        std::env::remove_var("TEST_TICK_A");
        assert_eq!(env_secs("TEST_TICK_A", 60).unwrap(), Duration::from_secs(60));

        std::env::set_var("TEST_TICK_B", "120");
        assert_eq!(env_secs("TEST_TICK_B", 60).unwrap(), Duration::from_secs(120));

        std::env::set_var("TEST_TICK_C", "not-a-number");
        assert!(env_secs("TEST_TICK_C", 60).is_err());
    }

    #[test]
    fn test_env_opt_ignores_blank() {
        std::env::set_var("TEST_BLANK", "   ");
        assert_eq!(env_opt("TEST_BLANK"), None);
    }
}
