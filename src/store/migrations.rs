//! Version-tracked database migrations for the libSQL backend.
//!
//! Table names come from configuration, so the migration SQL is rendered per
//! deployment. `run_migrations()` checks the current version and applies only
//! the new ones sequentially.

use libsql::Connection;

use crate::config::TableNames;
use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: String,
}

/// All migrations in order. Add new versions to the end.
fn migrations(t: &TableNames) -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "report_tables",
            sql: format!(
                r#"
                CREATE TABLE IF NOT EXISTS {reports} (
                    pkey INTEGER PRIMARY KEY AUTOINCREMENT,
                    created_at TEXT NOT NULL,
                    text TEXT NOT NULL,
                    hashtags TEXT,
                    text_urls TEXT,
                    user_mentions TEXT,
                    lang TEXT,
                    url TEXT,
                    tweet_id TEXT,
                    latitude REAL NOT NULL,
                    longitude REAL NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{reports}_tweet_id ON {reports}(tweet_id);

                CREATE TABLE IF NOT EXISTS {unconfirmed} (
                    pkey INTEGER PRIMARY KEY AUTOINCREMENT,
                    created_at TEXT NOT NULL,
                    latitude REAL NOT NULL,
                    longitude REAL NOT NULL
                );

                CREATE TABLE IF NOT EXISTS {nonspatial_reports} (
                    pkey INTEGER PRIMARY KEY AUTOINCREMENT,
                    created_at TEXT NOT NULL,
                    text TEXT NOT NULL,
                    hashtags TEXT,
                    urls TEXT,
                    user_mentions TEXT,
                    lang TEXT
                );

                CREATE TABLE IF NOT EXISTS {all_reports} (
                    pkey INTEGER PRIMARY KEY AUTOINCREMENT,
                    fkey INTEGER NOT NULL,
                    source TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'confirmed',
                    created_at TEXT NOT NULL,
                    text TEXT NOT NULL,
                    lang TEXT,
                    url TEXT,
                    latitude REAL NOT NULL,
                    longitude REAL NOT NULL,
                    UNIQUE (fkey, source)
                );

                CREATE TRIGGER IF NOT EXISTS trg_{reports}_all_reports
                AFTER INSERT ON {reports}
                BEGIN
                    INSERT INTO {all_reports} (fkey, source, created_at, text, lang, url, latitude, longitude)
                    VALUES (NEW.pkey, 'twitter', NEW.created_at, NEW.text, NEW.lang, NEW.url, NEW.latitude, NEW.longitude);
                END;
                "#,
                reports = t.reports,
                unconfirmed = t.unconfirmed,
                nonspatial_reports = t.nonspatial_reports,
                all_reports = t.all_reports,
            ),
        },
        Migration {
            version: 2,
            name: "user_tables",
            sql: format!(
                r#"
                CREATE TABLE IF NOT EXISTS {users} (
                    user_hash TEXT PRIMARY KEY,
                    reports_count INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS {invitees} (
                    user_hash TEXT PRIMARY KEY,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS {nonspatial_users} (
                    user_hash TEXT PRIMARY KEY,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE VIEW IF NOT EXISTS {all_users} AS
                    SELECT user_hash FROM {users}
                    UNION SELECT user_hash FROM {invitees}
                    UNION SELECT user_hash FROM {nonspatial_users};
                "#,
                users = t.users,
                invitees = t.invitees,
                nonspatial_users = t.nonspatial_users,
                all_users = t.all_users,
            ),
        },
    ]
}

/// Table names are spliced into SQL, so only plain identifiers are allowed.
pub fn validate_table_names(t: &TableNames) -> Result<(), DatabaseError> {
    let names = [
        &t.reports,
        &t.users,
        &t.invitees,
        &t.unconfirmed,
        &t.nonspatial_reports,
        &t.nonspatial_users,
        &t.all_reports,
        &t.all_users,
    ];
    for name in names {
        let valid = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !name.starts_with(|c: char| c.is_ascii_digit());
        if !valid {
            return Err(DatabaseError::Migration(format!(
                "Invalid table name '{name}'"
            )));
        }
    }
    Ok(())
}

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection, tables: &TableNames) -> Result<(), DatabaseError> {
    validate_table_names(tables)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in migrations(tables) {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(&migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    tracing::info!(
        "Database migrations complete (at V{})",
        get_current_version(conn).await?
    );
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_conn() -> Connection {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap();
        db.connect().unwrap()
    }

    async fn object_exists(conn: &Connection, kind: &str, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2",
                libsql::params![kind, name],
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let count: i64 = row.get(0).unwrap();
        count == 1
    }

    #[tokio::test]
    async fn migrations_create_all_tables() {
        let conn = test_conn().await;
        let tables = TableNames::default();
        run_migrations(&conn, &tables).await.unwrap();

        for table in [
            &tables.reports,
            &tables.users,
            &tables.invitees,
            &tables.unconfirmed,
            &tables.nonspatial_reports,
            &tables.nonspatial_users,
            &tables.all_reports,
        ] {
            assert!(object_exists(&conn, "table", table).await, "Table '{table}' should exist");
        }
        assert!(object_exists(&conn, "view", &tables.all_users).await);
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let conn = test_conn().await;
        let tables = TableNames::default();
        run_migrations(&conn, &tables).await.unwrap();
        run_migrations(&conn, &tables).await.unwrap();

        let version = get_current_version(&conn).await.unwrap();
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn custom_table_names_are_used() {
        let conn = test_conn().await;
        let tables = TableNames {
            reports: "flood_reports".into(),
            ..TableNames::default()
        };
        run_migrations(&conn, &tables).await.unwrap();
        assert!(object_exists(&conn, "table", "flood_reports").await);
        assert!(!object_exists(&conn, "table", "tweet_reports").await);
    }

    #[test]
    fn rejects_unsafe_table_names() {
        let tables = TableNames {
            users: "users; DROP TABLE x".into(),
            ..TableNames::default()
        };
        assert!(validate_table_names(&tables).is_err());

        let tables = TableNames {
            invitees: "1invitees".into(),
            ..TableNames::default()
        };
        assert!(validate_table_names(&tables).is_err());
        assert!(validate_table_names(&TableNames::default()).is_ok());
    }
}
