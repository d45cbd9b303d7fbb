//! Error types for Graph operations.

/// Result type alias for Graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Graph adapter error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `OAuth2` error from the token endpoint.
    #[error("OAuth2 error: {error} - {description}")]
    OAuth {
        /// Error code (e.g., `invalid_client`).
        error: String,
        /// Human-readable description.
        description: String,
    },

    /// Graph answered with a non-success status after all retries.
    #[error("Graph returned {status} for {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// A message or folder payload could not be decoded.
    #[error("Invalid Graph payload: {0}")]
    InvalidPayload(String),

    /// No mail folder matched the configured Sent folder name.
    #[error("Sent folder {folder:?} not found for {account}")]
    SentFolderNotFound {
        /// Mailbox searched.
        account: String,
        /// Folder display name looked for.
        folder: String,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// URL parsing error.
    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl Error {
    /// Creates an OAuth error from error code and description.
    #[must_use]
    pub fn oauth_error(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::OAuth {
            error: error.into(),
            description: description.into(),
        }
    }
}
