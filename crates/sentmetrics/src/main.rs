//! `sentmetrics` - daily engagement metrics for Outlook Sent folders
//!
//! Reads each configured mailbox through Microsoft Graph, classifies sent
//! conversations as bounced, replied or unanswered, and stores one snapshot
//! per account and day in `SQLite`.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod scheduler;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use sentmetrics_core::{ConfigError, MessageSource, MetricsJob, MetricsRepository, Settings};
use sentmetrics_graph::{GraphClient, GraphSettings};

use scheduler::CronSchedule;

const DEFAULT_LOG_FILTER: &str = "sentmetrics=info,sentmetrics_core=info,sentmetrics_graph=info";

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "sentmetrics", version, about)]
struct Cli {
    /// Run the job a single time and exit.
    #[arg(long)]
    once: bool,

    /// Cron expression overriding `SENTMETRICS_SCHEDULE`.
    #[arg(long, value_name = "CRON")]
    schedule: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging();

    let settings = Settings::from_env().map_err(|errors| config_error(&errors))?;
    let graph_settings = GraphSettings::from_env()
        .map_err(|errors| anyhow!("invalid Graph configuration: {}", errors.join("; ")))?;

    info!(
        accounts = settings.accounts.len(),
        database = %settings.database_path.display(),
        "Starting sentmetrics"
    );

    let client = GraphClient::new(graph_settings, &settings.sent_folder_name)
        .context("failed to build Graph client")?;
    let repository = MetricsRepository::new(&settings.database_path)
        .await
        .with_context(|| format!("failed to open {}", settings.database_path.display()))?;

    let job = MetricsJob::new(
        client,
        settings.engine_config(),
        settings.send_filter(),
        repository,
        settings.accounts.clone(),
    );

    if cli.once {
        run_job(&job).await;
        return Ok(());
    }

    let expression = cli.schedule.as_deref().unwrap_or(&settings.schedule);
    let schedule = CronSchedule::parse(expression)?;
    info!(schedule = schedule.expression(), "Scheduler started");

    let job = &job;
    scheduler::run_until(&schedule, shutdown_signal(), move || run_job(job)).await;
    Ok(())
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json =
        std::env::var("SENTMETRICS_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let (json_layer, text_layer) = if json {
        (Some(fmt::layer().json()), None)
    } else {
        (None, Some(fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

async fn run_job<S: MessageSource>(job: &MetricsJob<S>) {
    for run in job.run().await {
        info!(
            account = %run.account,
            date = %run.snapshot.date,
            total_sent = run.snapshot.clean.sent,
            total_replied = run.snapshot.clean.replied,
            total_bounced = run.snapshot.clean.bounced,
            temperature = %run.snapshot.temperature,
            "Stored daily metrics"
        );
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

fn config_error(errors: &[ConfigError]) -> anyhow::Error {
    let lines: Vec<_> = errors.iter().map(|e| format!("  - {e}")).collect();
    anyhow!("invalid configuration:\n{}", lines.join("\n"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from(["sentmetrics", "--once"]).unwrap();
        assert!(cli.once);
        assert!(cli.schedule.is_none());

        let cli = Cli::try_parse_from(["sentmetrics", "--schedule", "0 30 6 * * *"]).unwrap();
        assert!(!cli.once);
        assert_eq!(cli.schedule.as_deref(), Some("0 30 6 * * *"));
    }

    #[test]
    fn test_config_error_lists_every_problem() {
        let err = config_error(&[ConfigError::NoAccounts, ConfigError::EmptySentFolderName]);
        let text = err.to_string();
        assert!(text.contains("EMAIL_ACCOUNTS"));
        assert!(text.contains("SENT_FOLDER_NAME"));
    }
}
