//! Graph connection settings.

use std::time::Duration;

use secrecy::SecretString;

/// Default Graph API root.
pub const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
/// Default identity platform authority.
pub const DEFAULT_LOGIN_URL: &str = "https://login.microsoftonline.com";
/// Default `$top` for paged folder listings.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Credentials and endpoints for the Graph adapter.
#[derive(Debug)]
pub struct GraphSettings {
    /// Entra ID tenant.
    pub tenant_id: String,
    /// Application (client) id.
    pub client_id: String,
    /// Application secret.
    pub client_secret: SecretString,
    /// Graph API root, without trailing slash.
    pub base_url: String,
    /// Identity platform authority, without trailing slash.
    pub login_url: String,
    /// Page size for folder message listings.
    pub page_size: usize,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub request_timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Backoff before the first retry; doubled on every further retry.
    pub backoff_base: Duration,
}

impl GraphSettings {
    /// Settings with default endpoints and tuning.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret,
            base_url: DEFAULT_BASE_URL.to_string(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            connect_timeout: Duration::from_millis(3050),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
        }
    }

    /// Override the Graph API root.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the identity platform authority.
    #[must_use]
    pub fn with_login_url(mut self, url: impl Into<String>) -> Self {
        self.login_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the retry backoff base.
    #[must_use]
    pub const fn with_backoff_base(mut self, backoff: Duration) -> Self {
        self.backoff_base = backoff;
        self
    }

    /// Load settings from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns the names of missing or invalid variables.
    pub fn from_env() -> Result<Self, Vec<String>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns a message for every missing or invalid variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Vec<String>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut errors = Vec::new();
        let mut required = |key: &str| {
            let value = lookup(key).map(|v| v.trim().to_string()).unwrap_or_default();
            if value.is_empty() {
                errors.push(format!("{key} is required"));
            }
            value
        };

        let tenant_id = required("TENANT_ID");
        let client_id = required("CLIENT_ID");
        let client_secret = required("CLIENT_SECRET");

        let page_size = match lookup("GRAPH_PAGE_SIZE") {
            None => DEFAULT_PAGE_SIZE,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    errors.push(format!("GRAPH_PAGE_SIZE must be a positive integer, got {raw:?}"));
                    DEFAULT_PAGE_SIZE
                }
            },
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        let mut settings = Self::new(tenant_id, client_id, SecretString::from(client_secret));
        settings.page_size = page_size;
        if let Some(url) = lookup("GRAPH_BASE_URL") {
            settings = settings.with_base_url(url.trim());
        }
        if let Some(url) = lookup("GRAPH_LOGIN_URL") {
            settings = settings.with_login_url(url.trim());
        }
        Ok(settings)
    }
}
