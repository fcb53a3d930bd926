use sqlx::{QueryBuilder, SqliteConnection};

use super::live::LiveQuery;
use super::schema::Database;
use super::types::{Article, DatabaseError, NewArticle, Table};

// ============================================================================
// Query Limit Constants
// ============================================================================

/// Maximum number of bookmarks returned from a single query (OOM protection)
const MAX_BOOKMARKS: i64 = 2000;

/// Rows per multi-row INSERT.
///
/// 4 columns * 50 = 200 bound parameters, well under SQLite's 999 limit.
const BATCH_SIZE: usize = 50;

/// Upsert articles by URL on an open connection or transaction.
///
/// Title, thumbnail and `updated_at` come from the remote copy. The stored
/// `is_bookmarked` flag is never touched, so a bookmark applied while a fetch
/// was in flight survives the save. New rows start unbookmarked.
///
/// Callers run this inside the same transaction as the association rows and
/// notify `Table::Articles` after commit.
pub(crate) async fn upsert_articles(
    conn: &mut SqliteConnection,
    articles: &[NewArticle],
    now: i64,
) -> Result<(), sqlx::Error> {
    for chunk in articles.chunks(BATCH_SIZE) {
        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "INSERT INTO news_articles (url, title, thumbnail_url, updated_at) ",
        );
        builder.push_values(chunk, |mut b, article| {
            b.push_bind(&article.url)
                .push_bind(&article.title)
                .push_bind(&article.thumbnail_url)
                .push_bind(now);
        });
        builder.push(
            " ON CONFLICT(url) DO UPDATE SET \
             title = excluded.title, \
             thumbnail_url = excluded.thumbnail_url, \
             updated_at = excluded.updated_at",
        );
        builder.build().execute(&mut *conn).await?;
    }
    Ok(())
}

impl Database {
    // ========================================================================
    // Article Queries
    // ========================================================================

    /// Get a single article by URL.
    pub async fn get_article(&self, url: &str) -> Result<Option<Article>, DatabaseError> {
        let article = sqlx::query_as::<_, Article>(
            r#"
            SELECT url, title, thumbnail_url, is_bookmarked, updated_at
            FROM news_articles
            WHERE url = ?
        "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(article)
    }

    /// Get bookmarked articles, most recently updated first
    pub async fn bookmarked_articles(&self) -> Result<Vec<Article>, DatabaseError> {
        let articles = sqlx::query_as::<_, Article>(
            r#"
            SELECT url, title, thumbnail_url, is_bookmarked, updated_at
            FROM news_articles
            WHERE is_bookmarked = 1
            ORDER BY updated_at DESC, url
            LIMIT ?
        "#,
        )
        .bind(MAX_BOOKMARKS)
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    /// Live view of the bookmarks list.
    pub fn live_bookmarks(&self) -> LiveQuery<Vec<Article>> {
        self.live(&[Table::Articles], |db| async move {
            db.bookmarked_articles().await
        })
    }

    // ========================================================================
    // Bookmark Mutations
    // ========================================================================

    /// Toggle the bookmark flag of an article and return the new state.
    ///
    /// Uses SQLite's RETURNING clause to perform the toggle and read the
    /// result in one statement. Returns `None` if no article has this URL.
    pub async fn toggle_bookmark(&self, url: &str) -> Result<Option<bool>, DatabaseError> {
        let row: Option<(bool,)> = sqlx::query_as(
            "UPDATE news_articles SET is_bookmarked = NOT is_bookmarked WHERE url = ? RETURNING is_bookmarked",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        if row.is_some() {
            self.notify(&[Table::Articles]);
        }
        Ok(row.map(|(bookmarked,)| bookmarked))
    }

    /// Set the bookmark flag of an article explicitly.
    ///
    /// Idempotent: returns `true` only if the stored flag actually changed.
    pub async fn set_bookmarked(&self, url: &str, bookmarked: bool) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE news_articles SET is_bookmarked = ? WHERE url = ? AND is_bookmarked != ?",
        )
        .bind(bookmarked)
        .bind(url)
        .bind(bookmarked)
        .execute(&self.pool)
        .await?;

        let changed = result.rows_affected() > 0;
        if changed {
            self.notify(&[Table::Articles]);
        }
        Ok(changed)
    }

    /// Clear every bookmark. Returns the number of articles unbookmarked.
    pub async fn reset_all_bookmarks(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("UPDATE news_articles SET is_bookmarked = 0 WHERE is_bookmarked = 1")
            .execute(&self.pool)
            .await?;

        let cleared = result.rows_affected();
        if cleared > 0 {
            self.notify(&[Table::Articles]);
        }
        Ok(cleared)
    }

    // ========================================================================
    // Retention
    // ========================================================================

    /// Delete non-bookmarked articles last updated before `cutoff` (unix millis).
    ///
    /// Association rows pointing at deleted articles go with them, so feeds
    /// never reference a missing article. Returns the number of articles deleted.
    pub async fn delete_non_bookmarked_older_than(&self, cutoff: i64) -> Result<u64, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            "DELETE FROM news_articles WHERE is_bookmarked = 0 AND updated_at < ?",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if deleted == 0 {
            tx.commit().await?;
            return Ok(0);
        }

        sqlx::query(
            "DELETE FROM breaking_news WHERE article_url NOT IN (SELECT url FROM news_articles)",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM search_results WHERE article_url NOT IN (SELECT url FROM news_articles)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.notify(&[Table::Articles, Table::BreakingNews, Table::SearchResults]);

        tracing::debug!(deleted, cutoff, "Deleted expired articles");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn test_article(url: &str, title: &str) -> NewArticle {
        NewArticle {
            url: url.to_string(),
            title: Some(title.to_string()),
            thumbnail_url: Some(format!("{url}/thumb.jpg")),
        }
    }

    async fn insert(db: &Database, articles: &[NewArticle], now: i64) {
        let mut conn = db.pool.acquire().await.unwrap();
        upsert_articles(&mut conn, articles, now).await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_articles_insert() {
        let db = test_db().await;
        insert(&db, &[test_article("https://a.example/1", "One")], 1_000).await;

        let article = db.get_article("https://a.example/1").await.unwrap().unwrap();
        assert_eq!(article.title.as_deref(), Some("One"));
        assert!(!article.is_bookmarked);
        assert_eq!(article.updated_at, 1_000);
    }

    #[tokio::test]
    async fn test_upsert_articles_updates_metadata_and_keeps_bookmark() {
        let db = test_db().await;
        insert(&db, &[test_article("https://a.example/1", "Old")], 1_000).await;
        db.set_bookmarked("https://a.example/1", true).await.unwrap();

        insert(&db, &[test_article("https://a.example/1", "New")], 2_000).await;

        let article = db.get_article("https://a.example/1").await.unwrap().unwrap();
        assert_eq!(article.title.as_deref(), Some("New"));
        assert_eq!(article.updated_at, 2_000);
        assert!(article.is_bookmarked, "bookmark must survive re-save");
    }

    #[tokio::test]
    async fn test_upsert_articles_more_than_one_batch() {
        let db = test_db().await;
        let articles: Vec<NewArticle> = (0..120)
            .map(|i| test_article(&format!("https://a.example/{i}"), "t"))
            .collect();
        insert(&db, &articles, 1_000).await;

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM news_articles")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 120);
    }

    #[tokio::test]
    async fn test_toggle_bookmark() {
        let db = test_db().await;
        insert(&db, &[test_article("https://a.example/1", "One")], 1_000).await;

        assert_eq!(db.toggle_bookmark("https://a.example/1").await.unwrap(), Some(true));
        assert_eq!(db.toggle_bookmark("https://a.example/1").await.unwrap(), Some(false));
    }

    #[tokio::test]
    async fn test_toggle_bookmark_unknown_url() {
        let db = test_db().await;
        assert_eq!(db.toggle_bookmark("https://missing.example").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_bookmarked_idempotent() {
        let db = test_db().await;
        insert(&db, &[test_article("https://a.example/1", "One")], 1_000).await;

        assert!(db.set_bookmarked("https://a.example/1", true).await.unwrap());
        assert!(!db.set_bookmarked("https://a.example/1", true).await.unwrap());
    }

    #[tokio::test]
    async fn test_bookmarked_articles_and_reset() {
        let db = test_db().await;
        insert(
            &db,
            &[
                test_article("https://a.example/1", "One"),
                test_article("https://a.example/2", "Two"),
                test_article("https://a.example/3", "Three"),
            ],
            1_000,
        )
        .await;
        db.set_bookmarked("https://a.example/1", true).await.unwrap();
        db.set_bookmarked("https://a.example/3", true).await.unwrap();

        let urls: Vec<String> = db
            .bookmarked_articles()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.url)
            .collect();
        assert_eq!(urls, vec!["https://a.example/1", "https://a.example/3"]);

        assert_eq!(db.reset_all_bookmarks().await.unwrap(), 2);
        assert!(db.bookmarked_articles().await.unwrap().is_empty());
        assert_eq!(db.reset_all_bookmarks().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_non_bookmarked_older_than() {
        let db = test_db().await;
        insert(
            &db,
            &[
                test_article("https://a.example/old", "Old"),
                test_article("https://a.example/old-kept", "Old but bookmarked"),
            ],
            1_000,
        )
        .await;
        insert(&db, &[test_article("https://a.example/new", "New")], 5_000).await;
        db.set_bookmarked("https://a.example/old-kept", true).await.unwrap();

        let deleted = db.delete_non_bookmarked_older_than(2_000).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(db.get_article("https://a.example/old").await.unwrap().is_none());
        assert!(db.get_article("https://a.example/old-kept").await.unwrap().is_some());
        assert!(db.get_article("https://a.example/new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_removes_dangling_associations() {
        let db = test_db().await;
        db.replace_breaking_news(&[test_article("https://a.example/1", "One")])
            .await
            .unwrap();
        sqlx::query("UPDATE news_articles SET updated_at = 0")
            .execute(&db.pool)
            .await
            .unwrap();

        assert_eq!(db.delete_non_bookmarked_older_than(1).await.unwrap(), 1);
        assert!(db.breaking_articles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_live_bookmarks_reflect_toggle() {
        use futures::StreamExt;

        let db = test_db().await;
        insert(&db, &[test_article("https://a.example/1", "One")], 1_000).await;

        let mut live = db.live_bookmarks();
        assert!(live.next().await.unwrap().unwrap().is_empty());

        db.toggle_bookmark("https://a.example/1").await.unwrap();
        let bookmarks = live.next().await.unwrap().unwrap();
        assert_eq!(bookmarks.len(), 1);
        assert!(bookmarks[0].is_bookmarked);
    }
}
