//! bondwatch - Headless Server
//!
//! Watches Solana bond account balances and alerts subscribers over
//! SMS, email, Telegram, and Discord when a balance drops below its
//! threshold.

mod api;
mod config;

use api::AppState;
use bondwatch_channels::{
    bot_deep_link, DiscordOauth, DiscordTransport, EmailTransport, TelegramBot, TelegramTransport,
    TransportRegistry, TwilioTransport,
};
use bondwatch_core::{ChannelStore, SubscriptionStore};
use bondwatch_monitor::{BalanceChecker, MonitorConfig, RpcBalanceSource};
use bondwatch_notify::{Dispatcher, VerificationCoordinator};
use bondwatch_store::Database;
use clap::Parser;
use config::AppConfig;
use std::sync::Arc;
use teloxide::Bot;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// bondwatch server CLI
#[derive(Parser, Debug)]
#[command(name = "bondwatch-server")]
#[command(about = "Bond balance monitoring and alerting server", long_about = None)]
struct Args {
    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    warn!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_logging(&args.log_level);

    info!("🚀 bondwatch server starting...");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return;
        }
    };
    info!("  RPC: {}", config.solana_rpc_url);
    info!("  Tick interval: {:?}", config.tick_interval);

    let db = match Database::connect(&config.database_url).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to open database {}: {}", config.database_url, e);
            return;
        }
    };

    let http = reqwest::Client::new();
    let bot = config
        .telegram_token
        .as_ref()
        .map(|token| Bot::new(token.clone()));

    let mut registry = TransportRegistry::new();
    if let Some(bot) = &bot {
        registry.register(Arc::new(TelegramTransport::new(bot.clone())));
    }
    if let Some(twilio) = &config.twilio {
        registry.register(Arc::new(TwilioTransport::new(
            http.clone(),
            twilio.account_sid.clone(),
            twilio.auth_token.clone(),
            twilio.from_number.clone(),
        )));
    }
    if let Some(smtp) = config.smtp.clone() {
        match EmailTransport::new(smtp) {
            Ok(transport) => registry.register(Arc::new(transport)),
            Err(e) => warn!("Failed to initialize SMTP transport: {}", e),
        }
    }
    if let Some(discord) = &config.discord {
        registry.register(Arc::new(DiscordTransport::new(
            http.clone(),
            discord.bot_token.clone(),
        )));
    }
    info!(
        "  Channels: {:?}",
        registry
            .configured_kinds()
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
    );
    let registry = Arc::new(registry);

    let mut coordinator = VerificationCoordinator::new(
        db.clone() as Arc<dyn ChannelStore>,
        registry.clone(),
    );
    if let Some(discord) = &config.discord {
        coordinator = coordinator.with_oauth(Arc::new(DiscordOauth::new(
            http.clone(),
            discord.client_id.clone(),
            discord.client_secret.clone(),
            discord.redirect_uri.clone(),
        )));
    }
    if let Some(bot) = &bot {
        match bot_deep_link(bot).await {
            Some(url) => coordinator = coordinator.with_bot_url(url),
            None => warn!("Telegram bot link unavailable, link flow disabled"),
        }
    }
    let coordinator = Arc::new(coordinator);

    if let Some(bot) = bot.clone() {
        let telegram_bot = Arc::new(TelegramBot::new(bot, coordinator.clone()));
        tokio::spawn(async move {
            telegram_bot.run().await;
        });
        info!("Telegram bot started");
    }

    let dispatcher = Arc::new(Dispatcher::new(
        db.clone() as Arc<dyn ChannelStore>,
        registry.clone(),
    ));
    let source = Arc::new(RpcBalanceSource::new(
        http.clone(),
        config.solana_rpc_url.clone(),
    ));
    let checker = Arc::new(BalanceChecker::new(
        db.clone() as Arc<dyn SubscriptionStore>,
        source,
        dispatcher,
        MonitorConfig {
            fetch_timeout: config.fetch_timeout,
        },
    ));

    // Balance check scheduler. The first tick fires immediately; the
    // checker itself skips overlapping runs.
    let tick_checker = checker.clone();
    let tick_coordinator = coordinator.clone();
    let tick_interval = config.tick_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Err(e) = tick_checker.run_tick().await {
                error!("Balance check tick failed: {}", e);
            }
            tick_coordinator.purge_expired();
        }
    });

    let state = AppState {
        subscriptions: db.clone() as Arc<dyn SubscriptionStore>,
        channels: db.clone() as Arc<dyn ChannelStore>,
        coordinator: coordinator.clone(),
    };
    let app = api::router(state);

    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", config.bind_addr, e);
            return;
        }
    };
    info!("Listening on {}", config.bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    info!("👋 bondwatch server stopped");
}
