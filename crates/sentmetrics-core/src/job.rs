//! Per-account collection job.

use tracing::{error, info, warn};

use crate::engine::{EngagementEngine, EngineConfig};
use crate::filter::SendFilter;
use crate::model::MetricsSnapshot;
use crate::repository::MetricsRepository;
use crate::source::MessageSource;
use crate::{Error, Result};

/// Outcome of one job run for one account.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRun {
    /// Mailbox processed.
    pub account: String,
    /// Snapshot stored for the account.
    pub snapshot: MetricsSnapshot,
}

/// Fetches, filters, classifies and stores sent mail for every account.
pub struct MetricsJob<S> {
    engine: EngagementEngine<S>,
    filter: SendFilter,
    repository: MetricsRepository,
    accounts: Vec<String>,
}

impl<S: MessageSource> MetricsJob<S> {
    /// Create a job.
    #[must_use]
    pub const fn new(
        source: S,
        config: EngineConfig,
        filter: SendFilter,
        repository: MetricsRepository,
        accounts: Vec<String>,
    ) -> Self {
        Self {
            engine: EngagementEngine::new(source, config),
            filter,
            repository,
            accounts,
        }
    }

    /// The repository snapshots are written to.
    #[must_use]
    pub const fn repository(&self) -> &MetricsRepository {
        &self.repository
    }

    /// Process every configured account in order.
    ///
    /// A failing account is logged and left out of the result; it never
    /// stops the others.
    pub async fn run(&self) -> Vec<AccountRun> {
        let mut runs = Vec::with_capacity(self.accounts.len());

        for account in &self.accounts {
            match self.run_account(account).await {
                Ok(snapshot) => runs.push(AccountRun {
                    account: account.clone(),
                    snapshot,
                }),
                Err(e) => error!(account = %account, error = %e, "Account run failed"),
            }
        }

        info!(
            accounts = self.accounts.len(),
            succeeded = runs.len(),
            "Metrics job finished"
        );
        runs
    }

    /// Process a single account.
    ///
    /// # Errors
    ///
    /// Returns an error if the sent messages cannot be fetched or the results
    /// cannot be stored.
    pub async fn run_account(&self, account: &str) -> Result<MetricsSnapshot> {
        let fetched = self
            .engine
            .source()
            .sent_messages(account)
            .await
            .map_err(|e| {
                warn!(account, error = %e, "Failed to fetch sent messages");
                Error::Source(Box::new(e))
            })?;

        let fetched_count = fetched.len();
        let mut messages = self.filter.apply(fetched);
        info!(
            account,
            fetched = fetched_count,
            kept = messages.len(),
            "Filtered sent messages"
        );

        let snapshot = self.engine.classify(&mut messages, account).await;

        if !messages.is_empty() {
            self.repository.upsert_messages(account, &messages).await?;
        }
        self.repository.upsert_metrics(account, &snapshot).await?;

        Ok(snapshot)
    }
}
