//! Database lifecycle and schema migrations.
//!
//! Migrations are ordered lists of DDL statements, applied inside one
//! transaction each and recorded in `schema_migrations`. Opening the
//! database is idempotent: reopening an up-to-date file applies nothing.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use std::path::Path;

use super::Database;

/// Newest schema version this build understands
const LATEST_VERSION: i64 = 1;

/// v1: series registry, per-series sources, and the sync task queue
const MIGRATION_V1: &[&str] = &[
    r#"
    CREATE TABLE series (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        external_id TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        manga_url TEXT,
        source_domain TEXT,
        manga_slug TEXT,
        auto_sync_enabled INTEGER NOT NULL DEFAULT 1,
        check_interval_minutes INTEGER NOT NULL DEFAULT 360,
        priority INTEGER NOT NULL DEFAULT 0,
        source_chapter_count INTEGER NOT NULL DEFAULT 0,
        source_last_chapter REAL,
        backend_chapter_count INTEGER NOT NULL DEFAULT 0,
        backend_last_chapter REAL,
        status INTEGER NOT NULL DEFAULT 0,
        sync_progress_total INTEGER NOT NULL DEFAULT 0,
        sync_progress_completed INTEGER NOT NULL DEFAULT 0,
        sync_progress_failed INTEGER NOT NULL DEFAULT 0,
        last_scanned_at INTEGER,
        last_synced_at INTEGER,
        next_scan_at INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        last_error TEXT,
        last_error_at INTEGER,
        consecutive_failures INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX idx_series_status ON series(status)",
    "CREATE INDEX idx_series_due ON series(auto_sync_enabled, next_scan_at)",
    r#"
    CREATE TABLE sources (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        series_id INTEGER NOT NULL REFERENCES series(id) ON DELETE CASCADE,
        source_url TEXT NOT NULL,
        source_domain TEXT NOT NULL,
        manga_slug TEXT NOT NULL,
        priority INTEGER NOT NULL DEFAULT 1,
        is_enabled INTEGER NOT NULL DEFAULT 1,
        last_chapter_count INTEGER,
        last_chapter_number REAL,
        last_scan_status INTEGER,
        last_scan_error TEXT,
        last_scan_at INTEGER,
        created_at INTEGER NOT NULL,
        UNIQUE(series_id, source_url)
    )
    "#,
    "CREATE INDEX idx_sources_series ON sources(series_id, priority)",
    "CREATE INDEX idx_sources_domain ON sources(source_domain)",
    r#"
    CREATE TABLE sync_tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        series_id INTEGER NOT NULL REFERENCES series(id) ON DELETE CASCADE,
        source_id INTEGER REFERENCES sources(id) ON DELETE SET NULL,
        chapter_url TEXT NOT NULL,
        chapter_number REAL NOT NULL,
        weight INTEGER NOT NULL DEFAULT 0,
        status INTEGER NOT NULL DEFAULT 0,
        zip_url TEXT,
        error TEXT,
        retry_count INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        UNIQUE(series_id, chapter_number)
    )
    "#,
    "CREATE INDEX idx_sync_tasks_series_status ON sync_tasks(series_id, status, weight)",
];

fn open_err(message: String) -> Error {
    Error::Database(DatabaseError::ConnectionFailed(message))
}

fn migration_err(version: i64, e: impl std::fmt::Display) -> Error {
    Error::Database(DatabaseError::MigrationFailed(format!(
        "schema migration v{} did not apply: {}",
        version, e
    )))
}

impl Database {
    /// Open (creating if necessary) the SQLite database at `path` and bring
    /// its schema up to date.
    pub async fn new(path: &Path) -> Result<Self> {
        // SQLite creates the file on demand but not its directory
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| open_err(format!("cannot create {}: {}", dir.display(), e)))?;
        }

        // WAL keeps the API's reads from blocking behind scanner/processor
        // writes; foreign keys enforce the series -> sources/tasks cascades.
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            open_err(format!("cannot open {}: {}", path.display(), e))
        })?;

        let db = Self { pool };
        db.migrate_to_latest().await?;
        Ok(db)
    }

    /// Apply every migration newer than what the file already carries
    async fn migrate_to_latest(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| migration_err(0, e))?;

        let applied: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| migration_err(0, e))?;

        for version in (applied + 1)..=LATEST_VERSION {
            self.apply_migration(version).await?;
        }

        Ok(())
    }

    /// Run one migration's statement list atomically and record it
    async fn apply_migration(&self, version: i64) -> Result<()> {
        let statements = match version {
            1 => MIGRATION_V1,
            other => {
                return Err(migration_err(
                    other,
                    "no such migration is defined in this build",
                ));
            }
        };

        tracing::info!(version, "Applying schema migration");

        // One transaction per version; a dropped tx rolls everything back
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| migration_err(version, e))?;

        for statement in statements {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| migration_err(version, e))?;
        }

        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await
            .map_err(|e| migration_err(version, e))?;

        tx.commit().await.map_err(|e| migration_err(version, e))?;

        tracing::info!(version, "Schema migration applied");
        Ok(())
    }

    /// Release the connection pool; pending borrowed connections finish first
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Direct pool access for hosts and tests
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
