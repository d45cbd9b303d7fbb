//! `OAuth2` client-credentials tokens and their cache.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// Scope granting application access to Microsoft Graph.
pub const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN: u32 = 3599;

/// Seconds before expiry at which a cached token is no longer handed out.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// `OAuth2` access token with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Access token string.
    pub access_token: String,
    /// Token type (usually "Bearer").
    pub token_type: String,
    /// Expiration time.
    pub expires_at: DateTime<Utc>,
}

impl Token {
    /// Creates a token from a token response received now.
    #[must_use]
    pub fn from_response(response: TokenResponse) -> Self {
        let secs = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            expires_at: Utc::now() + Duration::seconds(i64::from(secs)),
        }
    }

    /// Checks if the token is expired (with 60 second buffer).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() + Duration::seconds(EXPIRY_BUFFER_SECS) >= self.expires_at
    }
}

/// Token response from the `OAuth2` server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Token type.
    #[serde(default = "bearer")]
    pub token_type: String,
    /// Expires in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u32>,
}

fn bearer() -> String {
    "Bearer".to_string()
}

/// Error response from the `OAuth2` server.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub error: String,
    /// Error description.
    #[serde(default)]
    pub error_description: String,
}

impl ErrorResponse {
    /// Converts to an Error.
    #[must_use]
    pub fn into_error(self) -> Error {
        Error::oauth_error(self.error, self.error_description)
    }
}

/// Acquires app-only tokens with the client-credentials grant.
///
/// Tokens are cached per scope and reused until shortly before they expire.
/// Share one provider between clients through an `Arc`.
#[derive(Debug)]
pub struct TokenProvider {
    token_url: Url,
    client_id: String,
    client_secret: SecretString,
    http_client: Client,
    cache: Mutex<HashMap<String, Token>>,
}

impl TokenProvider {
    /// Creates a provider for a tenant.
    ///
    /// `login_url` is the identity platform authority, e.g.
    /// `https://login.microsoftonline.com`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token URL cannot be built.
    pub fn new(
        login_url: &str,
        tenant_id: &str,
        client_id: impl Into<String>,
        client_secret: SecretString,
        http_client: Client,
    ) -> Result<Self> {
        let token_url = Url::parse(&format!(
            "{}/{tenant_id}/oauth2/v2.0/token",
            login_url.trim_end_matches('/')
        ))?;

        Ok(Self {
            token_url,
            client_id: client_id.into(),
            client_secret,
            http_client,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// The token endpoint in use.
    #[must_use]
    pub const fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Returns a valid access token for `scope`, fetching one when the cache
    /// has none or it is about to expire.
    ///
    /// # Errors
    ///
    /// Returns an error if the token request fails or is rejected.
    pub async fn access_token(&self, scope: &str) -> Result<String> {
        let mut cache = self.cache.lock().await;

        if let Some(token) = cache.get(scope).filter(|t| !t.is_expired()) {
            return Ok(token.access_token.clone());
        }

        debug!(scope, "Requesting client-credentials token");
        let token = self.request_token(scope).await?;
        let access_token = token.access_token.clone();
        cache.insert(scope.to_string(), token);
        drop(cache);

        Ok(access_token)
    }

    /// Drops any cached token for `scope`.
    pub async fn invalidate(&self, scope: &str) {
        self.cache.lock().await.remove(scope);
    }

    async fn request_token(&self, scope: &str) -> Result<Token> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("scope", scope),
        ];

        let response = self
            .http_client
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let error: ErrorResponse = response.json().await?;
            return Err(error.into_error());
        }

        let token_response: TokenResponse = response.json().await?;
        Ok(Token::from_response(token_response))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn token(expires_in: Option<u32>) -> Token {
        Token::from_response(TokenResponse {
            access_token: "abc".to_string(),
            token_type: "Bearer".to_string(),
            expires_in,
        })
    }

    #[test]
    fn test_token_expiration_buffer() {
        assert!(!token(Some(3600)).is_expired());
        assert!(token(Some(30)).is_expired());
        assert!(token(Some(60)).is_expired());
    }

    #[test]
    fn test_default_lifetime() {
        let t = token(None);
        let remaining = (t.expires_at - Utc::now()).num_seconds();
        assert!((3590..=3599).contains(&remaining));
    }

    #[test]
    fn test_token_response_defaults() {
        let parsed: TokenResponse = serde_json::from_str(r#"{"access_token":"x"}"#).unwrap();
        assert_eq!(parsed.token_type, "Bearer");
        assert!(parsed.expires_in.is_none());
    }

    #[test]
    fn test_token_url() {
        let provider = TokenProvider::new(
            "https://login.microsoftonline.com/",
            "tenant-1",
            "client",
            SecretString::from("secret"),
            Client::new(),
        )
        .unwrap();
        assert_eq!(
            provider.token_url().as_str(),
            "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/token"
        );
    }
}
