//! Microsoft Graph mail client.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};
use url::Url;

use sentmetrics_core::{MessageSource, SentMessage};

use crate::dto::{GraphMessage, MESSAGE_SELECT, MailFolder, Page};
use crate::error::{Error, Result};
use crate::settings::GraphSettings;
use crate::token::{GRAPH_DEFAULT_SCOPE, TokenProvider};

/// Statuses answered with a retry.
pub const RETRY_STATUSES: [u16; 7] = [401, 403, 429, 500, 502, 503, 504];

/// Read-only access to users' mailboxes through Microsoft Graph.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http_client: Client,
    tokens: Arc<TokenProvider>,
    base_url: Url,
    page_size: usize,
    max_retries: u32,
    backoff_base: Duration,
    sent_folder_name: String,
}

impl GraphClient {
    /// Creates a client and its token provider from settings.
    ///
    /// `sent_folder_name` is the display name of the Sent folder used by
    /// [`MessageSource::sent_messages`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or a URL is invalid.
    pub fn new(settings: GraphSettings, sent_folder_name: impl Into<String>) -> Result<Self> {
        let http_client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()?;

        let tokens = Arc::new(TokenProvider::new(
            &settings.login_url,
            &settings.tenant_id,
            settings.client_id.clone(),
            settings.client_secret,
            http_client.clone(),
        )?);

        Ok(Self {
            http_client,
            tokens,
            base_url: Url::parse(&settings.base_url)?,
            page_size: settings.page_size,
            max_retries: settings.max_retries,
            backoff_base: settings.backoff_base,
            sent_folder_name: sent_folder_name.into().trim().to_lowercase(),
        })
    }

    /// The shared token provider.
    #[must_use]
    pub fn token_provider(&self) -> Arc<TokenProvider> {
        Arc::clone(&self.tokens)
    }

    /// Lists every mail folder of `account`.
    ///
    /// # Errors
    ///
    /// Returns an error if a request fails after retries or a page cannot be decoded.
    pub async fn list_mail_folders(&self, account: &str) -> Result<Vec<MailFolder>> {
        info!(account, "Fetching mail folders");
        let url = self.user_url(account, &["mailFolders"])?;
        let folders: Vec<MailFolder> = self.paginate(url).await?;
        info!(account, total = folders.len(), "Fetched mail folders");
        Ok(folders)
    }

    /// Finds the folder whose display name matches the configured Sent folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SentFolderNotFound`] when no folder matches, or any
    /// request error.
    pub async fn find_sent_folder(&self, account: &str) -> Result<MailFolder> {
        self.list_mail_folders(account)
            .await?
            .into_iter()
            .find(|f| f.is_named(&self.sent_folder_name))
            .ok_or_else(|| Error::SentFolderNotFound {
                account: account.to_string(),
                folder: self.sent_folder_name.clone(),
            })
    }

    /// All messages in a folder, newest first.
    ///
    /// Messages that cannot be decoded are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a request fails after retries or a page cannot be decoded.
    pub async fn messages_in_folder(
        &self,
        account: &str,
        folder_id: &str,
    ) -> Result<Vec<SentMessage>> {
        info!(account, folder_id, page_size = self.page_size, "Fetching folder messages");
        let mut url = self.user_url(account, &["mailFolders", folder_id, "messages"])?;
        url.query_pairs_mut()
            .append_pair("$orderby", "sentDateTime desc")
            .append_pair("$top", &self.page_size.to_string());

        let raw: Vec<GraphMessage> = self.paginate(url).await?;
        let messages = decode_messages(account, raw);
        info!(account, folder_id, emails = messages.len(), "Fetched folder messages");
        Ok(messages)
    }

    /// Up to `limit` messages of a conversation, from any folder.
    ///
    /// Single page, no ordering guarantee.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after retries or the page cannot be decoded.
    pub async fn conversation_head(
        &self,
        account: &str,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<SentMessage>> {
        let mut url = self.user_url(account, &["messages"])?;
        url.query_pairs_mut()
            .append_pair(
                "$filter",
                &format!("conversationId eq '{}'", conversation_id.replace('\'', "''")),
            )
            .append_pair("$top", &limit.to_string())
            .append_pair("$select", MESSAGE_SELECT);

        let page: Page<GraphMessage> = self.get_json(&url).await?;
        Ok(decode_messages(account, page.value))
    }

    fn user_url(&self, account: &str, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                Error::InvalidConfig(format!("base URL {} cannot have a path", self.base_url))
            })?
            .pop_if_empty()
            .push("users")
            .push(account)
            .extend(segments);
        Ok(url)
    }

    /// Follows `@odata.nextLink` until exhausted, stopping early when a link
    /// repeats.
    async fn paginate<T: DeserializeOwned>(&self, first: Url) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(first);
        let mut page_num = 0_u32;

        while let Some(url) = next.take() {
            if !seen.insert(url.to_string()) {
                error!(url = %url, "Pagination loop detected, stopping");
                break;
            }
            page_num += 1;
            debug!(page = page_num, url = %url, "Fetching page");

            let page: Page<T> = self.get_json(&url).await?;
            items.extend(page.value);
            next = page.next_link.as_deref().map(Url::parse).transpose()?;
        }

        Ok(items)
    }

    /// Authenticated GET with retries and exponential backoff.
    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        let mut attempt = 0_u32;

        loop {
            let token = self.tokens.access_token(GRAPH_DEFAULT_SCOPE).await?;
            let reason = match self.http_client.get(url.clone()).bearer_auth(&token).send().await {
                Ok(response) if response.status().is_success() => {
                    return Ok(response.json().await?);
                }
                Ok(response) => {
                    let status = response.status();
                    if !RETRY_STATUSES.contains(&status.as_u16()) || attempt >= self.max_retries {
                        error!(url = %url, status = status.as_u16(), "Graph request failed");
                        return Err(Error::Status {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }
                    if status == StatusCode::UNAUTHORIZED {
                        self.tokens.invalidate(GRAPH_DEFAULT_SCOPE).await;
                    }
                    format!("status {status}")
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        error!(url = %url, error = %e, "Graph request failed");
                        return Err(e.into());
                    }
                    e.to_string()
                }
            };

            let delay = self
                .backoff_base
                .checked_mul(2_u32.saturating_pow(attempt))
                .unwrap_or(Duration::MAX);
            attempt += 1;
            warn!(
                url = %url,
                attempt,
                reason = %reason,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Retrying Graph request"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn decode_messages(account: &str, raw: Vec<GraphMessage>) -> Vec<SentMessage> {
    raw.into_iter()
        .filter_map(|m| {
            let id = m.id().to_string();
            match m.into_sent_message() {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(account, message_id = %id, error = %e, "Skipping undecodable message");
                    None
                }
            }
        })
        .collect()
}

impl MessageSource for GraphClient {
    type Error = Error;

    async fn sent_messages(&self, account: &str) -> Result<Vec<SentMessage>> {
        let folder = self.find_sent_folder(account).await?;
        debug!(account, folder_id = %folder.id, total = folder.total_count, "Found Sent folder");
        self.messages_in_folder(account, &folder.id).await
    }

    async fn conversation_head(
        &self,
        account: &str,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<SentMessage>> {
        Self::conversation_head(self, account, conversation_id, limit).await
    }
}
