//! Discord OAuth2 code exchange for account linking.

use crate::transport::TransportError;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

/// The linked platform account resolved from an OAuth grant.
#[derive(Debug, Clone)]
pub struct OauthUser {
    pub id: String,
    pub username: String,
}

/// OAuth provider seam. Lets the verification flow be tested without
/// hitting the real Discord endpoints.
#[async_trait]
pub trait OauthProvider: Send + Sync {
    /// Authorization URL the subscriber is redirected to, carrying our
    /// single-use state token.
    fn authorization_url(&self, state: &str) -> Result<String, TransportError>;

    /// Exchange the callback `code` for the granting user's identity.
    async fn exchange_code(&self, code: &str) -> Result<OauthUser, TransportError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct DiscordUser {
    id: String,
    username: String,
}

pub struct DiscordOauth {
    http: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl DiscordOauth {
    pub fn new(
        http: Client,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            http,
            client_id,
            client_secret,
            redirect_uri,
        }
    }
}

#[async_trait]
impl OauthProvider for DiscordOauth {
    fn authorization_url(&self, state: &str) -> Result<String, TransportError> {
        let url = Url::parse_with_params(
            "https://discord.com/api/oauth2/authorize",
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "identify guilds"),
                ("state", state),
            ],
        )
        .map_err(|e| TransportError::Api(format!("bad authorize URL: {}", e)))?;
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<OauthUser, TransportError> {
        let resp = self
            .http
            .post("https://discord.com/api/oauth2/token")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Api(format!(
                "token exchange failed ({}): {}",
                status, body
            )));
        }
        let token: TokenResponse = resp.json().await?;

        let resp = self
            .http
            .get("https://discord.com/api/users/@me")
            .bearer_auth(&token.access_token)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Api(format!(
                "user lookup failed ({}): {}",
                status, body
            )));
        }
        let user: DiscordUser = resp.json().await?;

        Ok(OauthUser {
            id: user.id,
            username: user.username,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_url_carries_state() {
        let oauth = DiscordOauth::new(
            Client::new(),
            "client123".to_string(),
            "secret".to_string(),
            "https://example.com/api/auth/discord/callback".to_string(),
        );
        let url = oauth.authorization_url("st4te-tok3n").unwrap();
        assert!(url.starts_with("https://discord.com/api/oauth2/authorize?"));
        assert!(url.contains("client_id=client123"));
        assert!(url.contains("state=st4te-tok3n"));
        assert!(url.contains("response_type=code"));
    }
}
