//! Channel verification lifecycle.
//!
//! Every channel starts unverified and only becomes an alert destination
//! after its proof step completes: a one-time code for SMS and email, a
//! bot DM for Telegram, an OAuth grant for Discord. The coordinator owns
//! the short-lived state those flows need (pending chat codes, OAuth
//! state tokens) and mediates all channel mutations in the store.

use crate::ttl_cache::TtlCache;
use bondwatch_channels::{
    ChatVerifier, ChatVerifyOutcome, OauthProvider, OauthUser, TransportError, TransportRegistry,
};
use bondwatch_core::{
    validate::{is_valid_email, is_valid_phone, ValidationError},
    ChannelKind, ChannelStore, NewChannel, NotificationChannel, StoreError, Subscription,
    VERIFICATION_TTL_SECS,
};
use async_trait::async_trait;
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("channel not found")]
    NotFound,
    #[error("verification does not apply to a {0} channel")]
    InvalidKind(ChannelKind),
    #[error("verification code expired, request a new one")]
    Expired,
    #[error("incorrect verification code")]
    CodeMismatch,
    #[error("unknown or already used authorization state")]
    UnknownState,
    #[error("subscription already has a verified {0} channel")]
    Duplicate(ChannelKind),
    #[error("a destination is required for {0} channels")]
    MissingDestination(ChannelKind),
    #[error(transparent)]
    InvalidInput(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// What the subscriber does next after requesting a channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChannelSetup {
    /// A code was delivered to the destination; submit it back to verify.
    CodeSent { channel_id: i64 },
    /// DM the code to the bot at `bot_url`.
    BotLink {
        channel_id: i64,
        code: String,
        bot_url: String,
    },
    /// Complete the OAuth grant at `url`.
    OauthRedirect { channel_id: i64, url: String },
    /// The channel already exists with the same destination.
    Duplicate { channel_id: i64, verified: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Verified,
    /// Submitting a code for an already verified channel is a no-op, not
    /// an error.
    AlreadyVerified,
}

#[derive(Debug, Clone)]
pub struct OauthCompletion {
    pub subscription_id: i64,
    pub channel_id: i64,
    pub user: OauthUser,
}

#[derive(Clone)]
struct DirectCode {
    code: String,
    subscription_id: Option<i64>,
}

pub struct VerificationCoordinator {
    store: Arc<dyn ChannelStore>,
    transports: Arc<TransportRegistry>,
    oauth: Option<Arc<dyn OauthProvider>>,
    bot_url: Option<String>,
    /// Pending Telegram link codes, keyed by code value.
    chat_codes: TtlCache<i64>,
    /// Pending codes issued directly against a chat account, keyed by
    /// platform user id.
    direct_codes: TtlCache<DirectCode>,
    /// Single-use OAuth state tokens, keyed by token value.
    oauth_states: TtlCache<i64>,
}

fn now_ts() -> i64 {
    Utc::now().timestamp()
}

fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

impl VerificationCoordinator {
    pub fn new(store: Arc<dyn ChannelStore>, transports: Arc<TransportRegistry>) -> Self {
        Self {
            store,
            transports,
            oauth: None,
            bot_url: None,
            chat_codes: TtlCache::new(),
            direct_codes: TtlCache::new(),
            oauth_states: TtlCache::new(),
        }
    }

    pub fn with_oauth(mut self, oauth: Arc<dyn OauthProvider>) -> Self {
        self.oauth = Some(oauth);
        self
    }

    pub fn with_bot_url(mut self, bot_url: String) -> Self {
        self.bot_url = Some(bot_url);
        self
    }

    /// Start (or restart) verification of a channel for a subscription.
    pub async fn request_channel_verification(
        &self,
        subscription: &Subscription,
        kind: ChannelKind,
        destination: Option<&str>,
    ) -> Result<ChannelSetup, VerifyError> {
        self.request_channel_verification_at(subscription, kind, destination, now_ts())
            .await
    }

    pub async fn request_channel_verification_at(
        &self,
        subscription: &Subscription,
        kind: ChannelKind,
        destination: Option<&str>,
        now: i64,
    ) -> Result<ChannelSetup, VerifyError> {
        let destination = match kind {
            ChannelKind::Sms => {
                let dest = destination.ok_or(VerifyError::MissingDestination(kind))?;
                if !is_valid_phone(dest) {
                    return Err(ValidationError::InvalidPhone.into());
                }
                Some(dest)
            }
            ChannelKind::Email => {
                let dest = destination.ok_or(VerifyError::MissingDestination(kind))?;
                if !is_valid_email(dest) {
                    return Err(ValidationError::InvalidEmail.into());
                }
                Some(dest)
            }
            // Destination is learned during verification.
            ChannelKind::Telegram | ChannelKind::Discord => None,
        };

        let existing = self.store.find_by_kind(subscription.id, kind).await?;
        if let Some(channel) = &existing {
            if channel.verified {
                let same_destination = match destination {
                    Some(dest) => channel.destination.as_deref() == Some(dest),
                    None => true,
                };
                if same_destination {
                    return Ok(ChannelSetup::Duplicate {
                        channel_id: channel.id,
                        verified: true,
                    });
                }
                // Replacing a verified destination requires an explicit
                // re-verification, not a silent overwrite.
                return Err(VerifyError::Duplicate(kind));
            }
        }

        match kind {
            ChannelKind::Sms | ChannelKind::Email => {
                // Checked above.
                let dest = destination.ok_or(VerifyError::MissingDestination(kind))?;
                let code = generate_code();
                let expires = now + VERIFICATION_TTL_SECS;
                let channel_id = self
                    .upsert_pending(subscription, kind, &code, expires, Some(dest), existing)
                    .await?;
                let transport = self.transports.get(kind)?;
                transport
                    .send_verification_code(dest, &code, subscription.brand)
                    .await?;
                info!(channel_id, kind = %kind, "Verification code sent");
                Ok(ChannelSetup::CodeSent { channel_id })
            }

            ChannelKind::Telegram => {
                let bot_url = self
                    .bot_url
                    .clone()
                    .ok_or(VerifyError::Transport(TransportError::NotConfigured(kind)))?;
                let code = generate_code();
                let expires = now + VERIFICATION_TTL_SECS;
                let channel_id = self
                    .upsert_pending(subscription, kind, &code, expires, None, existing)
                    .await?;
                self.chat_codes.put(&code, channel_id, expires);
                info!(channel_id, "Telegram link code issued");
                Ok(ChannelSetup::BotLink {
                    channel_id,
                    code,
                    bot_url,
                })
            }

            ChannelKind::Discord => {
                let oauth = self
                    .oauth
                    .as_ref()
                    .ok_or(VerifyError::Transport(TransportError::NotConfigured(kind)))?;
                // The OAuth state token drives verification; the channel
                // row carries no pending code.
                let channel_id = match existing {
                    Some(channel) => channel.id,
                    None => {
                        self.store
                            .create_channel(NewChannel {
                                subscription_id: subscription.id,
                                kind,
                                destination: None,
                                verified: false,
                                verification_code: None,
                                verification_expires: None,
                            })
                            .await?
                            .id
                    }
                };
                let state = generate_state();
                self.oauth_states
                    .put(&state, subscription.id, now + VERIFICATION_TTL_SECS);
                let url = oauth.authorization_url(&state)?;
                info!(channel_id, "Discord OAuth redirect issued");
                Ok(ChannelSetup::OauthRedirect { channel_id, url })
            }
        }
    }

    async fn upsert_pending(
        &self,
        subscription: &Subscription,
        kind: ChannelKind,
        code: &str,
        expires_at: i64,
        destination: Option<&str>,
        existing: Option<NotificationChannel>,
    ) -> Result<i64, VerifyError> {
        match existing {
            Some(channel) => {
                self.store
                    .reset_pending(channel.id, code, expires_at, destination)
                    .await?;
                Ok(channel.id)
            }
            None => {
                let channel = self
                    .store
                    .create_channel(NewChannel {
                        subscription_id: subscription.id,
                        kind,
                        destination: destination.map(str::to_string),
                        verified: false,
                        verification_code: Some(code.to_string()),
                        verification_expires: Some(expires_at),
                    })
                    .await?;
                Ok(channel.id)
            }
        }
    }

    /// Confirm a code submitted through the API for an SMS or email
    /// channel. The checks run in a fixed order so callers get the most
    /// specific error.
    pub async fn confirm_code(
        &self,
        channel_id: i64,
        kind: ChannelKind,
        code: &str,
    ) -> Result<Confirmation, VerifyError> {
        self.confirm_code_at(channel_id, kind, code, now_ts()).await
    }

    pub async fn confirm_code_at(
        &self,
        channel_id: i64,
        kind: ChannelKind,
        code: &str,
        now: i64,
    ) -> Result<Confirmation, VerifyError> {
        let channel = self
            .store
            .find_channel(channel_id)
            .await?
            .ok_or(VerifyError::NotFound)?;
        if channel.kind != kind {
            return Err(VerifyError::InvalidKind(channel.kind));
        }
        if channel.verified {
            return Ok(Confirmation::AlreadyVerified);
        }
        if !channel.code_pending_at(now) {
            return Err(VerifyError::Expired);
        }
        if channel.verification_code.as_deref() != Some(code) {
            return Err(VerifyError::CodeMismatch);
        }
        self.store.mark_verified(channel.id, None).await?;
        info!(channel_id, kind = %kind, "Channel verified");
        Ok(Confirmation::Verified)
    }

    /// Issue a code bound to a chat account rather than a channel row.
    /// When `subscription_id` is set, a successful confirmation creates
    /// or verifies that subscription's Telegram channel.
    pub fn issue_direct_chat_code(
        &self,
        platform_user_id: &str,
        subscription_id: Option<i64>,
    ) -> String {
        self.issue_direct_chat_code_at(platform_user_id, subscription_id, now_ts())
    }

    pub fn issue_direct_chat_code_at(
        &self,
        platform_user_id: &str,
        subscription_id: Option<i64>,
        now: i64,
    ) -> String {
        let code = generate_code();
        self.direct_codes.put(
            platform_user_id,
            DirectCode {
                code: code.clone(),
                subscription_id,
            },
            now + VERIFICATION_TTL_SECS,
        );
        code
    }

    /// Authorization URL for linking Discord outside the subscribe flow.
    pub fn oauth_authorization_url(&self, subscription_id: i64) -> Result<String, VerifyError> {
        self.oauth_authorization_url_at(subscription_id, now_ts())
    }

    pub fn oauth_authorization_url_at(
        &self,
        subscription_id: i64,
        now: i64,
    ) -> Result<String, VerifyError> {
        let oauth = self.oauth.as_ref().ok_or(VerifyError::Transport(
            TransportError::NotConfigured(ChannelKind::Discord),
        ))?;
        let state = generate_state();
        self.oauth_states
            .put(&state, subscription_id, now + VERIFICATION_TTL_SECS);
        Ok(oauth.authorization_url(&state)?)
    }

    /// Handle the OAuth callback: consume the state token, exchange the
    /// grant code, and verify the Discord channel with the granting
    /// user's id as destination.
    pub async fn complete_oauth(
        &self,
        code: &str,
        state: &str,
    ) -> Result<OauthCompletion, VerifyError> {
        self.complete_oauth_at(code, state, now_ts()).await
    }

    pub async fn complete_oauth_at(
        &self,
        code: &str,
        state: &str,
        now: i64,
    ) -> Result<OauthCompletion, VerifyError> {
        let oauth = self.oauth.as_ref().ok_or(VerifyError::Transport(
            TransportError::NotConfigured(ChannelKind::Discord),
        ))?;
        // Consuming up front makes replayed callbacks fail even when the
        // code exchange below errors out.
        let subscription_id = self
            .oauth_states
            .consume(state, now)
            .ok_or(VerifyError::UnknownState)?;
        let user = oauth.exchange_code(code).await?;

        let channel_id = match self
            .store
            .find_by_kind(subscription_id, ChannelKind::Discord)
            .await?
        {
            Some(channel) => {
                self.store.mark_verified(channel.id, Some(&user.id)).await?;
                channel.id
            }
            None => {
                self.store
                    .create_channel(NewChannel {
                        subscription_id,
                        kind: ChannelKind::Discord,
                        destination: Some(user.id.clone()),
                        verified: true,
                        verification_code: None,
                        verification_expires: None,
                    })
                    .await?
                    .id
            }
        };
        info!(subscription_id, channel_id, "Discord channel linked");
        Ok(OauthCompletion {
            subscription_id,
            channel_id,
            user,
        })
    }

    async fn chat_confirm_at(
        &self,
        code: &str,
        platform_user_id: &str,
        now: i64,
    ) -> Result<ChatVerifyOutcome, VerifyError> {
        // Subscription-linked codes, indexed by code value.
        if let Some(channel_id) = self.chat_codes.consume(code, now) {
            let Some(channel) = self.store.find_channel(channel_id).await? else {
                return Ok(ChatVerifyOutcome::NoPending);
            };
            if !channel.code_pending_at(now) || channel.verification_code.as_deref() != Some(code) {
                return Ok(ChatVerifyOutcome::NoPending);
            }
            self.store
                .mark_verified(channel.id, Some(platform_user_id))
                .await?;
            info!(channel_id, "Telegram channel verified via chat");
            return Ok(ChatVerifyOutcome::Verified);
        }

        // Codes issued directly against the chat account.
        match self.direct_codes.get(platform_user_id, now) {
            Some(direct) if direct.code == code => {
                self.direct_codes.remove(platform_user_id);
                if let Some(subscription_id) = direct.subscription_id {
                    match self
                        .store
                        .find_by_kind(subscription_id, ChannelKind::Telegram)
                        .await?
                    {
                        Some(channel) => {
                            self.store
                                .mark_verified(channel.id, Some(platform_user_id))
                                .await?;
                        }
                        None => {
                            self.store
                                .create_channel(NewChannel {
                                    subscription_id,
                                    kind: ChannelKind::Telegram,
                                    destination: Some(platform_user_id.to_string()),
                                    verified: true,
                                    verification_code: None,
                                    verification_expires: None,
                                })
                                .await?;
                        }
                    }
                }
                Ok(ChatVerifyOutcome::Verified)
            }
            Some(_) => Ok(ChatVerifyOutcome::InvalidCode),
            None => Ok(ChatVerifyOutcome::NoPending),
        }
    }

    /// Drop dead in-memory verification state. The scheduler calls this
    /// periodically; persisted codes expire through their own timestamps.
    pub fn purge_expired(&self) {
        self.purge_expired_at(now_ts());
    }

    pub fn purge_expired_at(&self, now: i64) {
        self.chat_codes.purge_expired(now);
        self.direct_codes.purge_expired(now);
        self.oauth_states.purge_expired(now);
    }
}

#[async_trait]
impl ChatVerifier for VerificationCoordinator {
    async fn confirm_chat_code(&self, code: &str, platform_user_id: &str) -> ChatVerifyOutcome {
        match self.chat_confirm_at(code, platform_user_id, now_ts()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Chat verification failed");
                ChatVerifyOutcome::Error
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeOauth, RecordingTransport};
    use bondwatch_core::{Brand, SubscriptionStore};
    use bondwatch_store::MemoryStore;
    use pretty_assertions::assert_eq;

    const NOW: i64 = 1_700_000_000;

    async fn subscription(store: &MemoryStore) -> Subscription {
        store
            .upsert_subscription(
                "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM",
                5.0,
                900,
                Brand::Jpool,
            )
            .await
            .unwrap()
    }

    fn coordinator_with_sms(
        store: Arc<MemoryStore>,
    ) -> (Arc<RecordingTransport>, VerificationCoordinator) {
        let sms = Arc::new(RecordingTransport::new(ChannelKind::Sms));
        let mut registry = TransportRegistry::new();
        registry.register(sms.clone());
        let coordinator = VerificationCoordinator::new(store, Arc::new(registry));
        (sms, coordinator)
    }

    fn sent_code(transport: &RecordingTransport) -> String {
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        sent[0].1.strip_prefix("code:").unwrap().to_string()
    }

    #[tokio::test]
    async fn test_sms_code_sent_then_verified() {
        let store = Arc::new(MemoryStore::new());
        let sub = subscription(&store).await;
        let (sms, coordinator) = coordinator_with_sms(store.clone());

        let setup = coordinator
            .request_channel_verification_at(&sub, ChannelKind::Sms, Some("+14155550100"), NOW)
            .await
            .unwrap();
        let ChannelSetup::CodeSent { channel_id } = setup else {
            panic!("expected CodeSent, got {:?}", setup);
        };
        let code = sent_code(&sms);

        let wrong = coordinator
            .confirm_code_at(channel_id, ChannelKind::Sms, "000000", NOW + 10)
            .await;
        assert!(matches!(wrong, Err(VerifyError::CodeMismatch)));

        let confirmed = coordinator
            .confirm_code_at(channel_id, ChannelKind::Sms, &code, NOW + 10)
            .await
            .unwrap();
        assert_eq!(confirmed, Confirmation::Verified);

        let again = coordinator
            .confirm_code_at(channel_id, ChannelKind::Sms, &code, NOW + 10)
            .await
            .unwrap();
        assert_eq!(again, Confirmation::AlreadyVerified);

        let channel = store.find_channel(channel_id).await.unwrap().unwrap();
        assert!(channel.verified);
        assert!(channel.verification_code.is_none());
    }

    #[tokio::test]
    async fn test_code_expires_after_ttl() {
        let store = Arc::new(MemoryStore::new());
        let sub = subscription(&store).await;
        let (sms, coordinator) = coordinator_with_sms(store);

        let ChannelSetup::CodeSent { channel_id } = coordinator
            .request_channel_verification_at(&sub, ChannelKind::Sms, Some("+14155550100"), NOW)
            .await
            .unwrap()
        else {
            panic!("expected CodeSent");
        };
        let code = sent_code(&sms);

        let expired = coordinator
            .confirm_code_at(channel_id, ChannelKind::Sms, &code, NOW + 601)
            .await;
        assert!(matches!(expired, Err(VerifyError::Expired)));
    }

    #[tokio::test]
    async fn test_kind_mismatch_rejected() {
        let store = Arc::new(MemoryStore::new());
        let sub = subscription(&store).await;
        let (_, coordinator) = coordinator_with_sms(store);

        let ChannelSetup::CodeSent { channel_id } = coordinator
            .request_channel_verification_at(&sub, ChannelKind::Sms, Some("+14155550100"), NOW)
            .await
            .unwrap()
        else {
            panic!("expected CodeSent");
        };

        let result = coordinator
            .confirm_code_at(channel_id, ChannelKind::Email, "123456", NOW)
            .await;
        assert!(matches!(result, Err(VerifyError::InvalidKind(ChannelKind::Sms))));

        let missing = coordinator
            .confirm_code_at(9999, ChannelKind::Sms, "123456", NOW)
            .await;
        assert!(matches!(missing, Err(VerifyError::NotFound)));
    }

    #[tokio::test]
    async fn test_repeat_request_reissues_code() {
        let store = Arc::new(MemoryStore::new());
        let sub = subscription(&store).await;
        let (sms, coordinator) = coordinator_with_sms(store);

        let ChannelSetup::CodeSent { channel_id: first } = coordinator
            .request_channel_verification_at(&sub, ChannelKind::Sms, Some("+14155550100"), NOW)
            .await
            .unwrap()
        else {
            panic!("expected CodeSent");
        };
        let ChannelSetup::CodeSent { channel_id: second } = coordinator
            .request_channel_verification_at(&sub, ChannelKind::Sms, Some("+14155550199"), NOW + 60)
            .await
            .unwrap()
        else {
            panic!("expected CodeSent");
        };

        // Same channel row, fresh code, new destination.
        assert_eq!(first, second);
        assert_eq!(sms.sent().len(), 2);
        assert_eq!(sms.sent()[1].0, "+14155550199");
    }

    #[tokio::test]
    async fn test_verified_duplicate_handling() {
        let store = Arc::new(MemoryStore::new());
        let sub = subscription(&store).await;
        let (sms, coordinator) = coordinator_with_sms(store);

        let ChannelSetup::CodeSent { channel_id } = coordinator
            .request_channel_verification_at(&sub, ChannelKind::Sms, Some("+14155550100"), NOW)
            .await
            .unwrap()
        else {
            panic!("expected CodeSent");
        };
        let code = sent_code(&sms);
        coordinator
            .confirm_code_at(channel_id, ChannelKind::Sms, &code, NOW)
            .await
            .unwrap();

        let same = coordinator
            .request_channel_verification_at(&sub, ChannelKind::Sms, Some("+14155550100"), NOW)
            .await
            .unwrap();
        assert!(matches!(
            same,
            ChannelSetup::Duplicate { verified: true, .. }
        ));

        let other = coordinator
            .request_channel_verification_at(&sub, ChannelKind::Sms, Some("+14155550199"), NOW)
            .await;
        assert!(matches!(other, Err(VerifyError::Duplicate(ChannelKind::Sms))));
    }

    #[tokio::test]
    async fn test_missing_or_invalid_destination() {
        let store = Arc::new(MemoryStore::new());
        let sub = subscription(&store).await;
        let (_, coordinator) = coordinator_with_sms(store);

        let missing = coordinator
            .request_channel_verification_at(&sub, ChannelKind::Sms, None, NOW)
            .await;
        assert!(matches!(
            missing,
            Err(VerifyError::MissingDestination(ChannelKind::Sms))
        ));

        let invalid = coordinator
            .request_channel_verification_at(&sub, ChannelKind::Sms, Some("555-0100"), NOW)
            .await;
        assert!(matches!(
            invalid,
            Err(VerifyError::InvalidInput(ValidationError::InvalidPhone))
        ));
    }

    #[tokio::test]
    async fn test_telegram_link_flow() {
        let store = Arc::new(MemoryStore::new());
        let sub = subscription(&store).await;
        let coordinator = VerificationCoordinator::new(store.clone(), Arc::new(TransportRegistry::new()))
            .with_bot_url("https://t.me/testbot".to_string());

        let setup = coordinator
            .request_channel_verification_at(&sub, ChannelKind::Telegram, None, NOW)
            .await
            .unwrap();
        let ChannelSetup::BotLink {
            channel_id, code, bot_url,
        } = setup
        else {
            panic!("expected BotLink, got {:?}", setup);
        };
        assert_eq!(bot_url, "https://t.me/testbot");

        let outcome = coordinator
            .chat_confirm_at(&code, "987654321", NOW + 30)
            .await
            .unwrap();
        assert_eq!(outcome, ChatVerifyOutcome::Verified);

        let channel = store.find_channel(channel_id).await.unwrap().unwrap();
        assert!(channel.verified);
        assert_eq!(channel.destination.as_deref(), Some("987654321"));

        // Codes are single use.
        let replay = coordinator
            .chat_confirm_at(&code, "987654321", NOW + 31)
            .await
            .unwrap();
        assert_eq!(replay, ChatVerifyOutcome::NoPending);
    }

    #[tokio::test]
    async fn test_telegram_link_code_expires() {
        let store = Arc::new(MemoryStore::new());
        let sub = subscription(&store).await;
        let coordinator = VerificationCoordinator::new(store, Arc::new(TransportRegistry::new()))
            .with_bot_url("https://t.me/testbot".to_string());

        let ChannelSetup::BotLink { code, .. } = coordinator
            .request_channel_verification_at(&sub, ChannelKind::Telegram, None, NOW)
            .await
            .unwrap()
        else {
            panic!("expected BotLink");
        };

        let outcome = coordinator
            .chat_confirm_at(&code, "987654321", NOW + 601)
            .await
            .unwrap();
        assert_eq!(outcome, ChatVerifyOutcome::NoPending);
    }

    #[tokio::test]
    async fn test_direct_chat_code() {
        let store = Arc::new(MemoryStore::new());
        let sub = subscription(&store).await;
        let coordinator = VerificationCoordinator::new(store.clone(), Arc::new(TransportRegistry::new()));

        let code = coordinator.issue_direct_chat_code_at("555000111", Some(sub.id), NOW);

        let wrong = coordinator
            .chat_confirm_at("000000", "555000111", NOW + 5)
            .await
            .unwrap();
        assert_eq!(wrong, ChatVerifyOutcome::InvalidCode);

        let outcome = coordinator
            .chat_confirm_at(&code, "555000111", NOW + 5)
            .await
            .unwrap();
        assert_eq!(outcome, ChatVerifyOutcome::Verified);

        let channel = store
            .find_by_kind(sub.id, ChannelKind::Telegram)
            .await
            .unwrap()
            .unwrap();
        assert!(channel.verified);
        assert_eq!(channel.destination.as_deref(), Some("555000111"));
    }

    #[tokio::test]
    async fn test_oauth_state_single_use() {
        let store = Arc::new(MemoryStore::new());
        let sub = subscription(&store).await;
        let coordinator = VerificationCoordinator::new(store.clone(), Arc::new(TransportRegistry::new()))
            .with_oauth(Arc::new(FakeOauth));

        let setup = coordinator
            .request_channel_verification_at(&sub, ChannelKind::Discord, None, NOW)
            .await
            .unwrap();
        let ChannelSetup::OauthRedirect { channel_id, url } = setup else {
            panic!("expected OauthRedirect, got {:?}", setup);
        };
        let state = url.rsplit("state=").next().unwrap().to_string();

        let completion = coordinator
            .complete_oauth_at("grant-code", &state, NOW + 10)
            .await
            .unwrap();
        assert_eq!(completion.subscription_id, sub.id);
        assert_eq!(completion.channel_id, channel_id);

        let channel = store.find_channel(channel_id).await.unwrap().unwrap();
        assert!(channel.verified);
        assert_eq!(channel.destination, Some(completion.user.id));

        let replay = coordinator
            .complete_oauth_at("grant-code", &state, NOW + 11)
            .await;
        assert!(matches!(replay, Err(VerifyError::UnknownState)));
    }

    #[tokio::test]
    async fn test_oauth_state_consumed_even_when_exchange_fails() {
        let store = Arc::new(MemoryStore::new());
        let sub = subscription(&store).await;
        let coordinator = VerificationCoordinator::new(store, Arc::new(TransportRegistry::new()))
            .with_oauth(Arc::new(FakeOauth));

        let url = coordinator.oauth_authorization_url_at(sub.id, NOW).unwrap();
        let state = url.rsplit("state=").next().unwrap().to_string();

        let failed = coordinator.complete_oauth_at("bad", &state, NOW + 1).await;
        assert!(matches!(failed, Err(VerifyError::Transport(_))));

        let retry = coordinator
            .complete_oauth_at("grant-code", &state, NOW + 2)
            .await;
        assert!(matches!(retry, Err(VerifyError::UnknownState)));
    }
}
