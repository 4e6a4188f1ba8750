//! `Database` trait: single async interface for all engine persistence.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::campaign::LogRecord;
use crate::error::DatabaseError;
use crate::sequence::model::Sequence;
use crate::warmup::WarmupSettings;

/// Backend-agnostic persistence for sequences, send logs and warmup counters.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Sequences ───────────────────────────────────────────────────

    /// Load a campaign's sequence with its stored version. A campaign with no
    /// stored sequence yields an empty one at version 0.
    async fn load_sequence(&self, campaign_id: &str) -> Result<Sequence, DatabaseError>;

    /// Write the whole sequence if the stored version still equals
    /// `sequence.version`. Returns the new version.
    ///
    /// Fails with [`DatabaseError::VersionConflict`] when another writer got there first.
    async fn save_sequence(&self, campaign_id: &str, sequence: &Sequence) -> Result<u64, DatabaseError>;

    // ── Send logs ───────────────────────────────────────────────────

    async fn insert_email_log(&self, record: &LogRecord) -> Result<(), DatabaseError>;

    /// Logs for a campaign, oldest first, optionally narrowed to one lead.
    async fn list_email_logs(
        &self,
        campaign_id: &str,
        lead_id: Option<&str>,
    ) -> Result<Vec<LogRecord>, DatabaseError>;

    // ── Warmup ──────────────────────────────────────────────────────

    /// Atomically take one send slot for `day` if fewer than `limit` are taken.
    async fn try_reserve_send(
        &self,
        account_id: &str,
        day: NaiveDate,
        limit: u32,
    ) -> Result<bool, DatabaseError>;

    /// Give back one slot taken on `day`. Never goes below zero.
    async fn release_send(&self, account_id: &str, day: NaiveDate) -> Result<(), DatabaseError>;

    /// Slots taken on `day`.
    async fn sends_on(&self, account_id: &str, day: NaiveDate) -> Result<u32, DatabaseError>;

    async fn load_warmup_settings(
        &self,
        account_id: &str,
    ) -> Result<Option<WarmupSettings>, DatabaseError>;

    async fn save_warmup_settings(
        &self,
        account_id: &str,
        settings: &WarmupSettings,
    ) -> Result<(), DatabaseError>;
}
