//! HTTP API for subscriptions and channel verification.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bondwatch_core::{
    validate::{validate_subscription, ValidationError},
    Brand, ChannelKind, ChannelStore, NotificationChannel, StoreError, Subscription,
    SubscriptionStore, DEFAULT_CHECK_INTERVAL_SECS,
};
use bondwatch_notify::{ChannelSetup, Confirmation, VerificationCoordinator, VerifyError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub channels: Arc<dyn ChannelStore>,
    pub coordinator: Arc<VerificationCoordinator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/subscribe", post(subscribe))
        .route("/api/verify/:kind", post(verify_channel))
        .route("/api/subscription/:address", get(subscription_by_address))
        .route("/api/subscription/:address/channels", get(subscription_channels))
        .route("/api/auth/discord/url", post(discord_auth_url))
        .route("/api/auth/discord/callback", get(discord_callback))
        .route("/api/auth/telegram/link", post(telegram_link))
        // The subscribe widget is served from brand sites on other origins.
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub enum ApiError {
    Verify(VerifyError),
    Store(StoreError),
    Validation(ValidationError),
    NotFound(&'static str),
    BadRequest(String),
}

impl From<VerifyError> for ApiError {
    fn from(e: VerifyError) -> Self {
        ApiError::Verify(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            ApiError::Validation(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Verify(e) => match e {
                VerifyError::NotFound => (StatusCode::NOT_FOUND, e.to_string()),
                VerifyError::Duplicate(_) => (StatusCode::CONFLICT, e.to_string()),
                VerifyError::Transport(inner) => {
                    error!(error = %inner, "Transport error");
                    (
                        StatusCode::BAD_GATEWAY,
                        "notification provider error".to_string(),
                    )
                }
                VerifyError::Store(inner) => {
                    error!(error = %inner, "Store error");
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
                }
                _ => (StatusCode::BAD_REQUEST, e.to_string()),
            },
            ApiError::Store(e) => {
                error!(error = %e, "Store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ChannelRequest {
    pub kind: ChannelKind,
    pub destination: Option<String>,
}

fn default_interval() -> i64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub address: String,
    pub threshold: f64,
    #[serde(default = "default_interval")]
    pub check_interval_secs: i64,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub channels: Vec<ChannelRequest>,
}

/// Per-channel outcome in the subscribe response. Failures are reported
/// inline so one bad channel does not fail the whole request.
#[derive(Serialize)]
#[serde(untagged)]
enum SetupOutcome {
    Ok {
        kind: ChannelKind,
        #[serde(flatten)]
        setup: ChannelSetup,
    },
    Error {
        kind: ChannelKind,
        status: &'static str,
        error: String,
    },
}

async fn subscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscribeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    validate_subscription(&req.address, req.threshold, req.check_interval_secs)?;
    let brand = Brand::parse_or_default(req.brand.as_deref().unwrap_or_default());

    let subscription = state
        .subscriptions
        .upsert_subscription(&req.address, req.threshold, req.check_interval_secs, brand)
        .await?;

    let mut outcomes = Vec::with_capacity(req.channels.len());
    for channel in &req.channels {
        match state
            .coordinator
            .request_channel_verification(&subscription, channel.kind, channel.destination.as_deref())
            .await
        {
            Ok(setup) => outcomes.push(SetupOutcome::Ok {
                kind: channel.kind,
                setup,
            }),
            Err(e) => {
                warn!(kind = %channel.kind, error = %e, "Channel setup failed");
                outcomes.push(SetupOutcome::Error {
                    kind: channel.kind,
                    status: "error",
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(Json(json!({
        "subscription": subscription,
        "channels": outcomes,
    })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub channel_id: i64,
    pub code: String,
}

async fn verify_channel(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let kind = ChannelKind::parse(&kind)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown channel kind: {}", kind)))?;
    let confirmation = state
        .coordinator
        .confirm_code(req.channel_id, kind, req.code.trim())
        .await?;
    let status = match confirmation {
        Confirmation::Verified => "verified",
        Confirmation::AlreadyVerified => "already_verified",
    };
    Ok(Json(json!({ "status": status })))
}

async fn subscription_by_address(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Subscription>, ApiError> {
    let subscription = state
        .subscriptions
        .find_by_address(&address)
        .await?
        .ok_or(ApiError::NotFound("subscription"))?;
    Ok(Json(subscription))
}

/// Channel as exposed over the API; pending codes never leave the
/// server.
#[derive(Serialize)]
struct ChannelView {
    id: i64,
    kind: ChannelKind,
    destination: Option<String>,
    verified: bool,
}

impl From<NotificationChannel> for ChannelView {
    fn from(channel: NotificationChannel) -> Self {
        Self {
            id: channel.id,
            kind: channel.kind,
            destination: channel.destination,
            verified: channel.verified,
        }
    }
}

async fn subscription_channels(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Vec<ChannelView>>, ApiError> {
    let subscription = state
        .subscriptions
        .find_by_address(&address)
        .await?
        .ok_or(ApiError::NotFound("subscription"))?;
    let channels = state
        .channels
        .find_by_subscription(subscription.id, false)
        .await?;
    Ok(Json(channels.into_iter().map(ChannelView::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionRef {
    pub subscription_id: i64,
}

async fn discord_auth_url(
    State(state): State<AppState>,
    Json(req): Json<SubscriptionRef>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .subscriptions
        .find_subscription(req.subscription_id)
        .await?
        .ok_or(ApiError::NotFound("subscription"))?;
    let url = state.coordinator.oauth_authorization_url(req.subscription_id)?;
    Ok(Json(json!({ "url": url })))
}

#[derive(Debug, Deserialize)]
pub struct OauthCallback {
    pub code: String,
    pub state: String,
}

async fn discord_callback(
    State(state): State<AppState>,
    Query(query): Query<OauthCallback>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let completion = state
        .coordinator
        .complete_oauth(&query.code, &query.state)
        .await?;
    Ok(Json(json!({
        "status": "linked",
        "subscription_id": completion.subscription_id,
        "channel_id": completion.channel_id,
        "username": completion.user.username,
    })))
}

async fn telegram_link(
    State(state): State<AppState>,
    Json(req): Json<SubscriptionRef>,
) -> Result<Json<ChannelSetup>, ApiError> {
    let subscription = state
        .subscriptions
        .find_subscription(req.subscription_id)
        .await?
        .ok_or(ApiError::NotFound("subscription"))?;
    let setup = state
        .coordinator
        .request_channel_verification(&subscription, ChannelKind::Telegram, None)
        .await?;
    Ok(Json(setup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_subscribe_request_defaults() {
        let req: SubscribeRequest = serde_json::from_str(
            r#"{"address":"9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM","threshold":5.0}"#,
        )
        .unwrap();
        assert_eq!(req.check_interval_secs, 900);
        assert!(req.channels.is_empty());
        assert_eq!(req.brand, None);
    }

    #[test]
    fn test_channel_request_kinds() {
        let req: ChannelRequest =
            serde_json::from_str(r#"{"kind":"sms","destination":"+14155550100"}"#).unwrap();
        assert_eq!(req.kind, ChannelKind::Sms);

        let req: ChannelRequest = serde_json::from_str(r#"{"kind":"telegram"}"#).unwrap();
        assert_eq!(req.kind, ChannelKind::Telegram);
        assert_eq!(req.destination, None);
    }

    #[test]
    fn test_channel_view_hides_pending_code() {
        let view = ChannelView::from(NotificationChannel {
            id: 1,
            subscription_id: 2,
            kind: ChannelKind::Email,
            destination: Some("user@example.com".to_string()),
            verified: false,
            verification_code: Some("123456".to_string()),
            verification_expires: Some(1_700_000_600),
        });
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("123456"));
        assert!(json.contains("user@example.com"));
    }
}
