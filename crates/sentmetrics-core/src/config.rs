//! Runtime settings read from the environment.

use std::path::PathBuf;

use crate::engine::{DEFAULT_IGNORED_PREFIXES, EngineConfig, IgnoredPrefixes};
use crate::filter::SendFilter;
use crate::source::DEFAULT_HEAD_LIMIT;

/// Default display name of the Sent folder (Outlook, Portuguese locale).
pub const DEFAULT_SENT_FOLDER_NAME: &str = "itens enviados";
/// Default subject fragments identifying test sends.
pub const DEFAULT_EXCLUDED_SUBJECT_PATTERNS: &[&str] = &["oportunidade de acordo: - parte:"];
/// Default schedule: every day at 02:00.
pub const DEFAULT_SCHEDULE: &str = "0 0 2 * * *";

/// A problem found while loading settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Neither `EMAIL_ACCOUNTS` nor `EMAIL_ACCOUNT` is set.
    #[error("no mailbox configured: set EMAIL_ACCOUNTS or EMAIL_ACCOUNT")]
    NoAccounts,

    /// An account is not an email address.
    #[error("invalid account address: {0}")]
    InvalidAccount(String),

    /// A numeric variable could not be parsed.
    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidNumber {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },

    /// The Sent folder name is blank.
    #[error("SENT_FOLDER_NAME must not be empty")]
    EmptySentFolderName,

    /// No database path given and no platform data directory available.
    #[error("SENTMETRICS_DB_PATH is not set and no data directory could be determined")]
    NoDatabasePath,
}

impl ConfigError {
    /// The environment variable this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::NoAccounts | Self::InvalidAccount(_) => "EMAIL_ACCOUNTS",
            Self::InvalidNumber { key, .. } => key,
            Self::EmptySentFolderName => "SENT_FOLDER_NAME",
            Self::NoDatabasePath => "SENTMETRICS_DB_PATH",
        }
    }
}

/// Service settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Mailboxes to process, in order.
    pub accounts: Vec<String>,
    /// Display name of the Sent folder (compared trimmed, lower-cased).
    pub sent_folder_name: String,
    /// Subject fragments a message must contain one of. Empty keeps all.
    pub subject_filter: Vec<String>,
    /// Subject fragments marking test sends.
    pub excluded_subject_patterns: Vec<String>,
    /// Recipient fragments marking internal or ignored sends.
    pub ignored_recipient_patterns: Vec<String>,
    /// Reply/forward prefixes.
    pub ignored_subject_prefixes: Vec<String>,
    /// Messages fetched per conversation head.
    pub head_limit: usize,
    /// Conversation heads fetched concurrently.
    pub concurrency: usize,
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Cron expression for scheduled runs.
    pub schedule: String,
}

impl Settings {
    /// Load settings from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns every configuration problem found.
    pub fn from_env() -> Result<Self, Vec<ConfigError>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns every configuration problem found.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Vec<ConfigError>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut errors = Vec::new();

        let mut accounts = split_list(lookup("EMAIL_ACCOUNTS").as_deref());
        if accounts.is_empty() {
            accounts = split_list(lookup("EMAIL_ACCOUNT").as_deref());
        }
        if accounts.is_empty() {
            errors.push(ConfigError::NoAccounts);
        }
        for account in &accounts {
            if !is_valid_address(account) {
                errors.push(ConfigError::InvalidAccount(account.clone()));
            }
        }

        let sent_folder_name = lookup("SENT_FOLDER_NAME")
            .unwrap_or_else(|| DEFAULT_SENT_FOLDER_NAME.to_string())
            .trim()
            .to_lowercase();
        if sent_folder_name.is_empty() {
            errors.push(ConfigError::EmptySentFolderName);
        }

        let excluded_subject_patterns = lookup("EXCLUDED_SUBJECT_PATTERNS").map_or_else(
            || owned(DEFAULT_EXCLUDED_SUBJECT_PATTERNS),
            |v| split_list(Some(&v)),
        );
        let ignored_subject_prefixes = lookup("IGNORED_SUBJECT_PREFIXES").map_or_else(
            || owned(DEFAULT_IGNORED_PREFIXES),
            |v| split_list(Some(&v)),
        );

        let head_limit = parse_positive(
            &lookup,
            "CONVERSATION_HEAD_LIMIT",
            DEFAULT_HEAD_LIMIT,
            &mut errors,
        );
        let concurrency = parse_positive(&lookup, "CLASSIFY_CONCURRENCY", 1, &mut errors);

        let database_path = lookup("SENTMETRICS_DB_PATH")
            .map(PathBuf::from)
            .or_else(|| dirs::data_dir().map(|d| d.join("sentmetrics").join("sentmetrics.db")));
        if database_path.is_none() {
            errors.push(ConfigError::NoDatabasePath);
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            accounts,
            sent_folder_name,
            subject_filter: split_list(lookup("SUBJECT_FILTER").as_deref()),
            excluded_subject_patterns,
            ignored_recipient_patterns: split_list(lookup("IGNORED_RECIPIENT_PATTERNS").as_deref()),
            ignored_subject_prefixes,
            head_limit,
            concurrency,
            database_path: database_path.unwrap_or_default(),
            schedule: lookup("SENTMETRICS_SCHEDULE")
                .map_or_else(|| DEFAULT_SCHEDULE.to_string(), |s| s.trim().to_string()),
        })
    }

    /// Engine tuning derived from these settings.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            head_limit: self.head_limit,
            concurrency: self.concurrency,
            prefixes: IgnoredPrefixes::new(&self.ignored_subject_prefixes),
        }
    }

    /// Upstream sent-message filter derived from these settings.
    #[must_use]
    pub fn send_filter(&self) -> SendFilter {
        SendFilter::new(
            &self.subject_filter,
            &self.excluded_subject_patterns,
            &self.ignored_recipient_patterns,
        )
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
#[must_use]
pub fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

fn parse_positive<F>(
    lookup: &F,
    key: &'static str,
    default: usize,
    errors: &mut Vec<ConfigError>,
) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => {
            errors.push(ConfigError::InvalidNumber { key, value: raw });
            default
        }
    }
}

fn is_valid_address(address: &str) -> bool {
    let mut parts = address.splitn(2, '@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}
