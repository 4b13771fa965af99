//! `ReportStore` trait: the persistence operations the pipeline needs.
//!
//! Authors are always passed as hashes (see `pipeline::types::hash_identity`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::pipeline::types::{GeoPoint, IncomingMessage};

/// A report row as written to the confirmed or non-spatial report tables.
#[derive(Debug, Clone)]
pub struct ReportRecord {
    pub posted_at: DateTime<Utc>,
    pub text: String,
    /// JSON array text.
    pub hashtags: String,
    /// JSON array text.
    pub urls: String,
    /// JSON array text.
    pub user_mentions: String,
    pub language: Option<String>,
    pub link: Option<String>,
    /// Numeric id of the source message.
    pub source_id: Option<String>,
    pub geo: Option<GeoPoint>,
}

impl ReportRecord {
    pub fn from_message(message: &IncomingMessage) -> Self {
        Self {
            posted_at: message.posted_at,
            text: message.body.clone(),
            hashtags: message.entities.hashtags.to_string(),
            urls: message.entities.urls.to_string(),
            user_mentions: message.entities.user_mentions.to_string(),
            language: message.languages.first().cloned(),
            link: message.link.clone(),
            source_id: message.numeric_id().map(String::from),
            geo: message.geo,
        }
    }

    /// Same record without coordinates, for the non-spatial table.
    pub fn without_geo(mut self) -> Self {
        self.geo = None;
        self
    }
}

/// Backend-agnostic report persistence.
#[async_trait]
pub trait ReportStore: Send + Sync {
    // ── Reports ─────────────────────────────────────────────────────

    /// Insert a confirmed report. Returns the report's primary key.
    async fn insert_confirmed_report(&self, report: &ReportRecord) -> Result<i64, DatabaseError>;

    /// Reference id the public sees for a confirmed report (the all-reports key).
    async fn report_reference(&self, report_id: i64) -> Result<Option<i64>, DatabaseError>;

    /// Insert a geo-only report from an author who didn't address us.
    async fn insert_unconfirmed_report(
        &self,
        posted_at: DateTime<Utc>,
        geo: GeoPoint,
    ) -> Result<(), DatabaseError>;

    /// Insert an addressed report that had no coordinates.
    async fn insert_nonspatial_report(&self, report: &ReportRecord) -> Result<(), DatabaseError>;

    /// Find a confirmed report by the numeric id of its source message.
    async fn find_report_by_source_id(&self, source_id: &str) -> Result<Option<i64>, DatabaseError>;

    /// Mark a confirmed report as verified.
    async fn mark_report_verified(&self, report_id: i64) -> Result<(), DatabaseError>;

    /// Status of a confirmed report in the all-reports table (`confirmed` or `verified`).
    async fn report_status(&self, report_id: i64) -> Result<Option<String>, DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Record a reporting user, counting repeat reports.
    async fn upsert_reporter(&self, user_hash: &str) -> Result<(), DatabaseError>;

    /// Record an author who sent an addressed message without coordinates.
    async fn insert_nonspatial_user(&self, user_hash: &str) -> Result<(), DatabaseError>;

    /// Record an author we invited.
    async fn insert_invitee(&self, user_hash: &str) -> Result<(), DatabaseError>;

    /// Whether we've had any contact with this author before.
    async fn is_known_user(&self, user_hash: &str) -> Result<bool, DatabaseError>;
}
