//! Cron-driven repetition of the metrics job.

use std::future::Future;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::{info, warn};

/// A parsed cron expression (seconds field first).
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    /// Parse a six- or seven-field cron expression.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression is invalid.
    pub fn parse(expression: &str) -> Result<Self> {
        let schedule = cron::Schedule::from_str(expression)
            .with_context(|| format!("invalid cron expression {expression:?}"))?;
        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    /// The expression as configured.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        self.schedule.after(&now).next()
    }
}

/// Run `task` at every fire time of `schedule` until `shutdown` completes.
///
/// A task already running is allowed to finish before shutdown is honoured.
pub async fn run_until<F, Fut, S>(schedule: &CronSchedule, shutdown: S, mut task: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let now = Local::now();
        let Some(next) = schedule.next_after(now) else {
            warn!(schedule = schedule.expression(), "Schedule has no future fire times");
            return;
        };
        let delay = (next - now).to_std().unwrap_or_default();
        info!(next_run = %next, "Waiting for next scheduled run");

        tokio::select! {
            biased;
            () = &mut shutdown => {
                info!("Shutdown requested, stopping scheduler");
                return;
            }
            () = tokio::time::sleep(delay) => task().await,
        }
    }
}
