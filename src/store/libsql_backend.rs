//! libSQL backend: async `ReportStore` implementation.
//!
//! Supports local file and in-memory databases. Table names come from
//! configuration and are validated before being spliced into SQL.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::config::TableNames;
use crate::error::DatabaseError;
use crate::pipeline::types::GeoPoint;
use crate::store::migrations;
use crate::store::traits::{ReportRecord, ReportStore};

/// Source label for reports collected from the stream.
const REPORT_SOURCE: &str = "twitter";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    tables: TableNames,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path, tables: TableNames) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path).build().await.map_err(|e| {
            DatabaseError::Connection(format!("Failed to open libSQL database: {e}"))
        })?;

        let backend = Self::from_database(db, tables).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory(tables: TableNames) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db, tables).await
    }

    async fn from_database(db: LibSqlDatabase, tables: TableNames) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn, &tables).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            tables,
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run a single-row, single-column integer query.
    async fn query_i64(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Option<i64>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}")))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }

    /// Insert a user hash into a single-column user table, ignoring repeats.
    async fn insert_user_hash(
        &self,
        op: &str,
        table: &str,
        user_hash: &str,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT OR IGNORE INTO {table} (user_hash) VALUES (?1)"),
                params![user_hash],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;
        Ok(())
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl ReportStore for LibSqlBackend {
    // ── Reports ─────────────────────────────────────────────────────

    async fn insert_confirmed_report(&self, report: &ReportRecord) -> Result<i64, DatabaseError> {
        let geo = report.geo.ok_or_else(|| {
            DatabaseError::Query("insert_confirmed_report: report has no coordinates".into())
        })?;

        let sql = format!(
            "INSERT INTO {} (created_at, text, hashtags, text_urls, user_mentions, lang, url, tweet_id, latitude, longitude)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             RETURNING pkey",
            self.tables.reports
        );
        let pkey = self
            .query_i64(
                "insert_confirmed_report",
                &sql,
                params![
                    report.posted_at.to_rfc3339(),
                    report.text.as_str(),
                    report.hashtags.as_str(),
                    report.urls.as_str(),
                    report.user_mentions.as_str(),
                    opt_text(report.language.as_deref()),
                    opt_text(report.link.as_deref()),
                    opt_text(report.source_id.as_deref()),
                    geo.latitude,
                    geo.longitude,
                ],
            )
            .await?
            .ok_or_else(|| DatabaseError::Query("insert_confirmed_report: no key returned".into()))?;

        debug!(pkey, "Confirmed report inserted");
        Ok(pkey)
    }

    async fn report_reference(&self, report_id: i64) -> Result<Option<i64>, DatabaseError> {
        let sql = format!(
            "SELECT pkey FROM {} WHERE fkey = ?1 AND source = ?2",
            self.tables.all_reports
        );
        self.query_i64("report_reference", &sql, params![report_id, REPORT_SOURCE])
            .await
    }

    async fn insert_unconfirmed_report(
        &self,
        posted_at: DateTime<Utc>,
        geo: GeoPoint,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO {} (created_at, latitude, longitude) VALUES (?1, ?2, ?3)",
                    self.tables.unconfirmed
                ),
                params![posted_at.to_rfc3339(), geo.latitude, geo.longitude],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_unconfirmed_report: {e}")))?;

        debug!("Unconfirmed report inserted");
        Ok(())
    }

    async fn insert_nonspatial_report(&self, report: &ReportRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO {} (created_at, text, hashtags, urls, user_mentions, lang)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    self.tables.nonspatial_reports
                ),
                params![
                    report.posted_at.to_rfc3339(),
                    report.text.as_str(),
                    report.hashtags.as_str(),
                    report.urls.as_str(),
                    report.user_mentions.as_str(),
                    opt_text(report.language.as_deref()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_nonspatial_report: {e}")))?;

        debug!("Non-spatial report inserted");
        Ok(())
    }

    async fn find_report_by_source_id(&self, source_id: &str) -> Result<Option<i64>, DatabaseError> {
        let sql = format!("SELECT pkey FROM {} WHERE tweet_id = ?1", self.tables.reports);
        self.query_i64("find_report_by_source_id", &sql, params![source_id])
            .await
    }

    async fn mark_report_verified(&self, report_id: i64) -> Result<(), DatabaseError> {
        let updated = self
            .conn()
            .execute(
                &format!(
                    "UPDATE {} SET status = 'verified' WHERE fkey = ?1 AND source = ?2",
                    self.tables.all_reports
                ),
                params![report_id, REPORT_SOURCE],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_report_verified: {e}")))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "report".into(),
                id: report_id.to_string(),
            });
        }
        Ok(())
    }

    async fn report_status(&self, report_id: i64) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT status FROM {} WHERE fkey = ?1 AND source = ?2",
                    self.tables.all_reports
                ),
                params![report_id, REPORT_SOURCE],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("report_status: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let status: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("report_status row parse: {e}")))?;
                Ok(Some(status))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("report_status: {e}"))),
        }
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn upsert_reporter(&self, user_hash: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO {} (user_hash) VALUES (?1)
                     ON CONFLICT (user_hash) DO UPDATE
                     SET reports_count = reports_count + 1, updated_at = datetime('now')",
                    self.tables.users
                ),
                params![user_hash],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_reporter: {e}")))?;
        Ok(())
    }

    async fn insert_nonspatial_user(&self, user_hash: &str) -> Result<(), DatabaseError> {
        self.insert_user_hash("insert_nonspatial_user", &self.tables.nonspatial_users, user_hash)
            .await
    }

    async fn insert_invitee(&self, user_hash: &str) -> Result<(), DatabaseError> {
        self.insert_user_hash("insert_invitee", &self.tables.invitees, user_hash)
            .await
    }

    async fn is_known_user(&self, user_hash: &str) -> Result<bool, DatabaseError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE user_hash = ?1",
            self.tables.all_users
        );
        let count = self
            .query_i64("is_known_user", &sql, params![user_hash])
            .await?
            .unwrap_or(0);
        Ok(count > 0)
    }
}
