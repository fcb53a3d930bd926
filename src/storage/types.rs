use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another instance of the application has locked the database
    #[error("Another instance of headlines appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6). CANTOPEN is a bad path, not a lock.
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A cached news article.
///
/// One row per URL, shared by every feed that surfaced it, so the bookmark
/// flag follows the article across breaking news, search results and the
/// bookmarks list.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Article {
    pub url: String,
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
    pub is_bookmarked: bool,
    /// Unix milliseconds of the last save that touched this row
    pub updated_at: i64,
}

/// Article data as received from the remote source, before it is stored.
///
/// Carries no bookmark flag: the stored flag always wins on upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArticle {
    pub url: String,
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Tables that live queries can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Articles,
    BreakingNews,
    SearchResults,
    SearchCursors,
}

impl Table {
    pub(crate) const ALL: [Table; 4] = [
        Table::Articles,
        Table::BreakingNews,
        Table::SearchResults,
        Table::SearchCursors,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            Table::Articles => 0,
            Table::BreakingNews => 1,
            Table::SearchResults => 2,
            Table::SearchCursors => 3,
        }
    }
}
