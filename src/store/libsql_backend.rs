//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};

use crate::campaign::{LogRecord, SendStatus};
use crate::error::DatabaseError;
use crate::sequence::model::{Sequence, SequenceStep};
use crate::store::migrations;
use crate::store::traits::Database;
use crate::warmup::WarmupSettings;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn stored_sequence_version(&self, campaign_id: &str) -> Result<u64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT version FROM campaign_sequences WHERE campaign_id = ?1",
                params![campaign_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("sequence_version: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let version: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("sequence_version row parse: {e}")))?;
                Ok(version as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("sequence_version: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn row_to_log(row: &libsql::Row) -> Result<LogRecord, libsql::Error> {
    let status: String = row.get(5)?;
    let sent_at: String = row.get(6)?;
    Ok(LogRecord {
        lead_id: row.get(0)?,
        campaign_id: row.get(1)?,
        sequence_step_id: row.get::<String>(2).ok(),
        subject: row.get(3)?,
        body: row.get(4)?,
        status: SendStatus::parse(&status),
        sent_at: parse_datetime(&sent_at),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const LOG_COLUMNS: &str = "lead_id, campaign_id, sequence_step_id, subject, body, status, sent_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Sequences ───────────────────────────────────────────────────

    async fn load_sequence(&self, campaign_id: &str) -> Result<Sequence, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT steps, version FROM campaign_sequences WHERE campaign_id = ?1",
                params![campaign_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_sequence: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let steps_json: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("load_sequence row parse: {e}")))?;
                let version: i64 = row
                    .get(1)
                    .map_err(|e| DatabaseError::Query(format!("load_sequence row parse: {e}")))?;
                let steps: Vec<SequenceStep> = serde_json::from_str(&steps_json)
                    .map_err(|e| DatabaseError::Serialization(format!("sequence {campaign_id}: {e}")))?;
                let sequence = Sequence::from(steps).with_version(version as u64);
                sequence.validate()?;
                Ok(sequence)
            }
            Ok(None) => Ok(Sequence::new()),
            Err(e) => Err(DatabaseError::Query(format!("load_sequence: {e}"))),
        }
    }

    async fn save_sequence(&self, campaign_id: &str, sequence: &Sequence) -> Result<u64, DatabaseError> {
        sequence.validate()?;
        let steps_json = serde_json::to_string(&sequence.steps)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        let expected = sequence.version;

        let result = if expected == 0 {
            self.conn()
                .execute(
                    "INSERT INTO campaign_sequences (campaign_id, steps, version, updated_at)
                     VALUES (?1, ?2, 1, ?3)
                     ON CONFLICT (campaign_id) DO NOTHING",
                    params![campaign_id, steps_json, now],
                )
                .await
        } else {
            self.conn()
                .execute(
                    "UPDATE campaign_sequences SET steps = ?2, version = version + 1, updated_at = ?3
                     WHERE campaign_id = ?1 AND version = ?4",
                    params![campaign_id, steps_json, now, expected as i64],
                )
                .await
        };
        let changed = result.map_err(|e| DatabaseError::Query(format!("save_sequence: {e}")))?;

        if changed == 0 {
            let found = self.stored_sequence_version(campaign_id).await?;
            warn!(campaign_id, expected, found, "Sequence write lost to a concurrent editor");
            return Err(DatabaseError::VersionConflict {
                entity: "sequence".into(),
                id: campaign_id.to_string(),
                expected,
                found,
            });
        }

        let version = expected + 1;
        debug!(campaign_id, version, steps = sequence.len(), "Sequence saved");
        Ok(version)
    }

    // ── Send logs ───────────────────────────────────────────────────

    async fn insert_email_log(&self, record: &LogRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO email_logs ({LOG_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    record.lead_id.as_str(),
                    record.campaign_id.as_str(),
                    opt_text(record.sequence_step_id.as_deref()),
                    record.subject.as_str(),
                    record.body.as_str(),
                    record.status.as_str(),
                    record.sent_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_email_log: {e}")))?;

        debug!(lead_id = %record.lead_id, status = record.status.as_str(), "Email log recorded");
        Ok(())
    }

    async fn list_email_logs(
        &self,
        campaign_id: &str,
        lead_id: Option<&str>,
    ) -> Result<Vec<LogRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {LOG_COLUMNS} FROM email_logs
                     WHERE campaign_id = ?1 AND (?2 IS NULL OR lead_id = ?2)
                     ORDER BY sent_at ASC, id ASC"
                ),
                params![campaign_id, opt_text(lead_id)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_email_logs: {e}")))?;

        let mut logs = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_email_logs: {e}")))?
        {
            let log = row_to_log(&row)
                .map_err(|e| DatabaseError::Query(format!("list_email_logs row parse: {e}")))?;
            logs.push(log);
        }
        Ok(logs)
    }

    // ── Warmup ──────────────────────────────────────────────────────

    async fn try_reserve_send(
        &self,
        account_id: &str,
        day: NaiveDate,
        limit: u32,
    ) -> Result<bool, DatabaseError> {
        if limit == 0 {
            return Ok(false);
        }

        let changed = self
            .conn()
            .execute(
                "INSERT INTO send_counters (account_id, day, count) VALUES (?1, ?2, 1)
                 ON CONFLICT (account_id, day) DO UPDATE SET count = send_counters.count + 1
                 WHERE send_counters.count < ?3",
                params![account_id, day_key(day), i64::from(limit)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("try_reserve_send: {e}")))?;

        Ok(changed > 0)
    }

    async fn release_send(&self, account_id: &str, day: NaiveDate) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE send_counters SET count = count - 1
                 WHERE account_id = ?1 AND day = ?2 AND count > 0",
                params![account_id, day_key(day)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("release_send: {e}")))?;
        Ok(())
    }

    async fn sends_on(&self, account_id: &str, day: NaiveDate) -> Result<u32, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT count FROM send_counters WHERE account_id = ?1 AND day = ?2",
                params![account_id, day_key(day)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("sends_on: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).unwrap_or(0);
                Ok(count.max(0) as u32)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("sends_on: {e}"))),
        }
    }

    async fn load_warmup_settings(
        &self,
        account_id: &str,
    ) -> Result<Option<WarmupSettings>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT settings FROM warmup_settings WHERE account_id = ?1",
                params![account_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_warmup_settings: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("load_warmup_settings row parse: {e}")))?;
                let settings = serde_json::from_str(&raw)
                    .map_err(|e| DatabaseError::Serialization(format!("warmup {account_id}: {e}")))?;
                Ok(Some(settings))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("load_warmup_settings: {e}"))),
        }
    }

    async fn save_warmup_settings(
        &self,
        account_id: &str,
        settings: &WarmupSettings,
    ) -> Result<(), DatabaseError> {
        let raw = serde_json::to_string(settings)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        self.conn()
            .execute(
                "INSERT INTO warmup_settings (account_id, settings, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (account_id) DO UPDATE SET settings = ?2, updated_at = ?3",
                params![account_id, raw, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_warmup_settings: {e}")))?;
        Ok(())
    }
}
