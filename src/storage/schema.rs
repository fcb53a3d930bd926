use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::live::ChangeTracker;
use super::types::{DatabaseError, Table};

// ============================================================================
// Database
// ============================================================================

/// Handle to the durable article store.
///
/// Cheap to clone: clones share the connection pool and the change tracker,
/// so a write through any clone wakes live queries opened on any other.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
    pub(crate) changes: Arc<ChangeTracker>,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// `":memory:"` opens a private in-memory database backed by a single
    /// connection; anything else is a file path opened in WAL mode.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process holds the
    /// database locked (SQLITE_BUSY, SQLITE_LOCKED).
    /// Returns `DatabaseError::Other` for other database errors.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let in_memory = path == ":memory:";
        let url = format!("sqlite:{}?mode=rwc", path);

        // Pre-create the file user-only so it never exists with umask permissions
        #[cfg(unix)]
        if !in_memory {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            let db_path = std::path::Path::new(path);
            if db_path.exists() {
                let perms = std::fs::Permissions::from_mode(0o600);
                if let Err(e) = std::fs::set_permissions(db_path, perms) {
                    tracing::warn!(path = %path, error = %e, "Failed to set database file permissions");
                }
            } else if db_path.parent().is_some_and(|p| p.as_os_str().is_empty() || p.exists()) {
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok(); // If creation fails, SQLite will report the error at connect_with.
            }
        }

        // busy_timeout=5000: wait up to 5 seconds for a competing writer before SQLITE_BUSY.
        let mut options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");

        let pool_options = if in_memory {
            // All connections to :memory: share one cache and would contend on
            // table locks; one long-lived connection keeps the database alive
            // and serializes access instead.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            // WAL lets live-query readers run while a save transaction is open.
            options = options.journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let db = Self {
            pool,
            changes: Arc::new(ChangeTracker::new()),
        };
        db.migrate().await.map_err(|e| match DatabaseError::from_sqlx(e) {
            DatabaseError::Other(e) => DatabaseError::Migration(e.to_string()),
            locked => locked,
        })?;
        tracing::debug!(path = %path, "Database opened");
        Ok(db)
    }

    /// Close every pooled connection.
    ///
    /// Live queries opened on this handle stop producing values.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Wake live queries that depend on `tables`. Call only after commit.
    pub(crate) fn notify(&self, tables: &[Table]) {
        self.changes.notify(tables);
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All migrations use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // One row per article URL; bookmark state lives here
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS news_articles (
                url TEXT PRIMARY KEY NOT NULL,
                title TEXT,
                thumbnail_url TEXT,
                is_bookmarked INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Current server ordering of the breaking news feed (id order)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS breaking_news (
                id INTEGER PRIMARY KEY,
                article_url TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS search_results (
                search_query TEXT NOT NULL,
                article_url TEXT NOT NULL,
                query_position INTEGER NOT NULL,
                PRIMARY KEY (search_query, article_url)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Next page to request per search query
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS search_query_remote_keys (
                search_query TEXT PRIMARY KEY NOT NULL,
                next_page_key INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Key/value state that must survive restarts (e.g. search.current_query)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_search_results_position ON search_results(search_query, query_position)",
        )
        .execute(&mut *tx)
        .await?;

        // Partial index for the bookmarks list
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_news_articles_bookmarked ON news_articles(updated_at DESC) WHERE is_bookmarked = 1",
        )
        .execute(&mut *tx)
        .await?;

        // Retention cleanup scans non-bookmarked rows by age
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_news_articles_updated ON news_articles(is_bookmarked, updated_at)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
