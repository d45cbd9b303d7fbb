//! Storage for classified messages and daily metrics.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::debug;
use uuid::Uuid;

use crate::model::{Counters, MetricsSnapshot, SentMessage, TemperatureLabel};
use crate::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A snapshot as stored for one account and day.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMetrics {
    /// Mailbox the snapshot belongs to.
    pub account: String,
    /// The snapshot.
    pub snapshot: MetricsSnapshot,
}

/// Repository for classified messages and metrics snapshots.
pub struct MetricsRepository {
    pool: SqlitePool,
}

impl MetricsRepository {
    /// Open (or create) the database at `database_path`.
    ///
    /// Creates the parent directory and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the database
    /// connection fails or schema creation fails.
    pub async fn new(database_path: &Path) -> Result<Self> {
        if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let url = format!("sqlite:{}?mode=rwc", database_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS emails (
                account TEXT NOT NULL,
                message_id TEXT NOT NULL,
                id TEXT NOT NULL,
                internet_message_id TEXT,
                conversation_id TEXT NOT NULL,
                subject TEXT,
                body_preview TEXT,
                sent_at TEXT NOT NULL,
                from_address TEXT,
                to_addresses TEXT NOT NULL DEFAULT '[]',
                is_read INTEGER NOT NULL DEFAULT 0,
                has_attachments INTEGER NOT NULL DEFAULT 0,
                importance TEXT,
                is_read_receipt_requested INTEGER NOT NULL DEFAULT 0,
                is_bounced INTEGER NOT NULL DEFAULT 0,
                is_replied INTEGER NOT NULL DEFAULT 0,
                reply_latency_secs REAL,
                engagement_score INTEGER NOT NULL DEFAULT 0,
                temperature TEXT NOT NULL DEFAULT 'frio',
                updated_at TEXT NOT NULL,
                PRIMARY KEY (account, message_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_emails_conversation
            ON emails(account, conversation_id)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS metrics (
                account TEXT NOT NULL,
                date TEXT NOT NULL,
                run_id TEXT NOT NULL,
                run_at TEXT NOT NULL,
                total_sent INTEGER NOT NULL,
                total_delivered INTEGER NOT NULL,
                total_bounced INTEGER NOT NULL,
                total_replied INTEGER NOT NULL,
                total_no_reply INTEGER NOT NULL,
                raw_total_sent INTEGER NOT NULL,
                raw_total_delivered INTEGER NOT NULL,
                raw_total_bounced INTEGER NOT NULL,
                raw_total_replied INTEGER NOT NULL,
                raw_total_no_reply INTEGER NOT NULL,
                delivery_rate INTEGER NOT NULL,
                reply_rate INTEGER NOT NULL,
                avg_reply_latency_secs REAL,
                temperature TEXT NOT NULL,
                PRIMARY KEY (account, date)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or update messages for an account.
    ///
    /// Content columns are always refreshed. Derived columns (bounce, reply,
    /// latency, score, label) are only written for messages marked
    /// `classified`, so a conversation skipped in this run keeps the result
    /// stored by an earlier one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn upsert_messages(&self, account: &str, messages: &[SentMessage]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let mut classified = 0_usize;

        for message in messages {
            sqlx::query(
                r"
                INSERT INTO emails
                    (account, message_id, id, internet_message_id, conversation_id, subject,
                     body_preview, sent_at, from_address, to_addresses, is_read,
                     has_attachments, importance, is_read_receipt_requested, is_bounced,
                     is_replied, reply_latency_secs, engagement_score, temperature, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(account, message_id) DO UPDATE SET
                    internet_message_id = excluded.internet_message_id,
                    conversation_id = excluded.conversation_id,
                    subject = excluded.subject,
                    body_preview = excluded.body_preview,
                    sent_at = excluded.sent_at,
                    from_address = excluded.from_address,
                    to_addresses = excluded.to_addresses,
                    is_read = excluded.is_read,
                    has_attachments = excluded.has_attachments,
                    importance = excluded.importance,
                    is_read_receipt_requested = excluded.is_read_receipt_requested,
                    updated_at = excluded.updated_at
                ",
            )
            .bind(account)
            .bind(&message.message_id)
            .bind(message.id.to_string())
            .bind(&message.internet_message_id)
            .bind(&message.conversation_id)
            .bind(&message.subject)
            .bind(&message.body_preview)
            .bind(message.sent_at.to_rfc3339())
            .bind(&message.from_address)
            .bind(serde_json::to_string(&message.to_addresses)?)
            .bind(message.is_read)
            .bind(message.has_attachments)
            .bind(&message.importance)
            .bind(message.is_read_receipt_requested)
            .bind(message.is_bounced)
            .bind(message.is_replied)
            .bind(message.reply_latency_secs)
            .bind(message.engagement_score)
            .bind(message.temperature.as_str())
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            if !message.classified {
                continue;
            }
            classified += 1;

            sqlx::query(
                r"
                UPDATE emails SET
                    is_bounced = ?,
                    is_replied = ?,
                    reply_latency_secs = ?,
                    engagement_score = ?,
                    temperature = ?
                WHERE account = ? AND message_id = ?
                ",
            )
            .bind(message.is_bounced)
            .bind(message.is_replied)
            .bind(message.reply_latency_secs)
            .bind(message.engagement_score)
            .bind(message.temperature.as_str())
            .bind(account)
            .bind(&message.message_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(account, count = messages.len(), classified, "Upserted messages");
        Ok(())
    }

    /// Insert or replace the snapshot for an account and its business date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn upsert_metrics(&self, account: &str, snapshot: &MetricsSnapshot) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO metrics
                (account, date, run_id, run_at,
                 total_sent, total_delivered, total_bounced, total_replied, total_no_reply,
                 raw_total_sent, raw_total_delivered, raw_total_bounced, raw_total_replied,
                 raw_total_no_reply, delivery_rate, reply_rate, avg_reply_latency_secs,
                 temperature)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(account, date) DO UPDATE SET
                run_id = excluded.run_id,
                run_at = excluded.run_at,
                total_sent = excluded.total_sent,
                total_delivered = excluded.total_delivered,
                total_bounced = excluded.total_bounced,
                total_replied = excluded.total_replied,
                total_no_reply = excluded.total_no_reply,
                raw_total_sent = excluded.raw_total_sent,
                raw_total_delivered = excluded.raw_total_delivered,
                raw_total_bounced = excluded.raw_total_bounced,
                raw_total_replied = excluded.raw_total_replied,
                raw_total_no_reply = excluded.raw_total_no_reply,
                delivery_rate = excluded.delivery_rate,
                reply_rate = excluded.reply_rate,
                avg_reply_latency_secs = excluded.avg_reply_latency_secs,
                temperature = excluded.temperature
            ",
        )
        .bind(account)
        .bind(snapshot.date.format(DATE_FORMAT).to_string())
        .bind(snapshot.id.to_string())
        .bind(snapshot.run_at.to_rfc3339())
        .bind(snapshot.clean.sent)
        .bind(snapshot.clean.delivered)
        .bind(snapshot.clean.bounced)
        .bind(snapshot.clean.replied)
        .bind(snapshot.clean.no_reply)
        .bind(snapshot.raw.sent)
        .bind(snapshot.raw.delivered)
        .bind(snapshot.raw.bounced)
        .bind(snapshot.raw.replied)
        .bind(snapshot.raw.no_reply)
        .bind(basis_points(snapshot.delivery_rate()))
        .bind(basis_points(snapshot.reply_rate()))
        .bind(snapshot.avg_reply_latency_secs)
        .bind(snapshot.temperature.as_str())
        .execute(&self.pool)
        .await?;

        debug!(account, date = %snapshot.date, "Upserted metrics snapshot");
        Ok(())
    }

    /// Snapshot for an account on a given date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a stored value is corrupt.
    pub async fn metrics_for(
        &self,
        account: &str,
        date: NaiveDate,
    ) -> Result<Option<StoredMetrics>> {
        let row = sqlx::query(
            r"
            SELECT * FROM metrics
            WHERE account = ? AND date = ?
            ",
        )
        .bind(account)
        .bind(date.format(DATE_FORMAT).to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(metrics_from_row).transpose()
    }

    /// All snapshots for an account, newest date first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a stored value is corrupt.
    pub async fn list_metrics(&self, account: &str) -> Result<Vec<StoredMetrics>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM metrics
            WHERE account = ?
            ORDER BY date DESC
            ",
        )
        .bind(account)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(metrics_from_row).collect()
    }

    /// Messages of an account whose conversation bounced, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a stored value is corrupt.
    pub async fn list_bounced(&self, account: &str) -> Result<Vec<SentMessage>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM emails
            WHERE account = ? AND is_bounced = 1
            ORDER BY sent_at ASC
            ",
        )
        .bind(account)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    /// Number of stored messages for an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count_messages(&self, account: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM emails WHERE account = ?")
            .bind(account)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

/// A rate in `[0, 1]` as an integer scaled by 10 000.
#[allow(clippy::cast_possible_truncation)] // Rates are bounded by 1
fn basis_points(rate: f64) -> i64 {
    (rate * 10_000.0).round() as i64
}

fn metrics_from_row(row: &SqliteRow) -> Result<StoredMetrics> {
    let clean = Counters {
        sent: row.get("total_sent"),
        delivered: row.get("total_delivered"),
        bounced: row.get("total_bounced"),
        replied: row.get("total_replied"),
        no_reply: row.get("total_no_reply"),
    };
    let raw = Counters {
        sent: row.get("raw_total_sent"),
        delivered: row.get("raw_total_delivered"),
        bounced: row.get("raw_total_bounced"),
        replied: row.get("raw_total_replied"),
        no_reply: row.get("raw_total_no_reply"),
    };

    let date_str: String = row.get("date");
    let date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT).map_err(|_| Error::Corrupt {
        column: "date",
        value: date_str.clone(),
    })?;

    Ok(StoredMetrics {
        account: row.get("account"),
        snapshot: MetricsSnapshot {
            id: parse_uuid(row.get("run_id"), "run_id")?,
            run_at: parse_timestamp(row.get("run_at"), "run_at")?,
            date,
            clean,
            raw,
            avg_reply_latency_secs: row.get("avg_reply_latency_secs"),
            temperature: TemperatureLabel::parse(row.get("temperature")),
        },
    })
}

fn message_from_row(row: &SqliteRow) -> Result<SentMessage> {
    let to_json: String = row.get("to_addresses");

    Ok(SentMessage {
        id: parse_uuid(row.get("id"), "id")?,
        message_id: row.get("message_id"),
        internet_message_id: row.get("internet_message_id"),
        conversation_id: row.get("conversation_id"),
        subject: row.get("subject"),
        body_preview: row.get("body_preview"),
        sent_at: parse_timestamp(row.get("sent_at"), "sent_at")?,
        from_address: row.get("from_address"),
        to_addresses: serde_json::from_str(&to_json)?,
        is_read: row.get("is_read"),
        has_attachments: row.get("has_attachments"),
        importance: row.get("importance"),
        is_read_receipt_requested: row.get("is_read_receipt_requested"),
        is_bounced: row.get("is_bounced"),
        is_replied: row.get("is_replied"),
        reply_latency_secs: row.get("reply_latency_secs"),
        engagement_score: row.get("engagement_score"),
        temperature: TemperatureLabel::parse(row.get("temperature")),
        classified: false,
    })
}

fn parse_uuid(value: String, column: &'static str) -> Result<Uuid> {
    Uuid::parse_str(&value).map_err(|_| Error::Corrupt { column, value })
}

fn parse_timestamp(value: String, column: &'static str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::Corrupt { column, value })
}
