use sqlx::{QueryBuilder, SqliteConnection};

use super::articles::upsert_articles;
use super::live::LiveQuery;
use super::schema::Database;
use super::types::{Article, DatabaseError, NewArticle, Table};

/// Highest position recorded for `query`, or 0 when it has no results.
async fn max_position(conn: &mut SqliteConnection, query: &str) -> Result<i64, sqlx::Error> {
    let (max,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(MAX(query_position), 0) FROM search_results WHERE search_query = ?",
    )
    .bind(query)
    .fetch_one(conn)
    .await?;
    Ok(max)
}

impl Database {
    // ========================================================================
    // Search Results
    // ========================================================================

    /// Articles stored for a search query, ordered by position.
    ///
    /// Unbounded: every appended page must stay visible to the pager, and a
    /// refresh is what shrinks the set back to page 1.
    pub async fn search_articles(&self, query: &str) -> Result<Vec<Article>, DatabaseError> {
        let articles = sqlx::query_as::<_, Article>(
            r#"
            SELECT a.url, a.title, a.thumbnail_url, a.is_bookmarked, a.updated_at
            FROM search_results s
            JOIN news_articles a ON a.url = s.article_url
            WHERE s.search_query = ?
            ORDER BY s.query_position
        "#,
        )
        .bind(query)
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    /// Live view of one query's results.
    pub fn live_search_results(&self, query: &str) -> LiveQuery<Vec<Article>> {
        let query = query.to_string();
        self.live(&[Table::SearchResults, Table::Articles], move |db| {
            let query = query.clone();
            async move { db.search_articles(&query).await }
        })
    }

    /// Next page to request for `query`, if a page was ever stored.
    pub async fn search_cursor(&self, query: &str) -> Result<Option<i64>, DatabaseError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT next_page_key FROM search_query_remote_keys WHERE search_query = ?",
        )
        .bind(query)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(page,)| page))
    }

    /// Persist one fetched page of search results.
    ///
    /// Everything happens in one transaction so results and cursor never
    /// disagree:
    /// 1. With `clear_existing`, drop this query's results (other queries untouched)
    /// 2. Overwrite the cursor with `page + 1`
    /// 3. Upsert the articles, keeping stored bookmark flags
    /// 4. Append association rows after the current maximum position
    ///
    /// Positions continue from `MAX(query_position)`, or from 0 after a clear.
    pub async fn store_search_page(
        &self,
        query: &str,
        page: i64,
        articles: &[NewArticle],
        clear_existing: bool,
    ) -> Result<(), DatabaseError> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        if clear_existing {
            sqlx::query("DELETE FROM search_results WHERE search_query = ?")
                .bind(query)
                .execute(&mut *tx)
                .await?;
        }

        // Written before any read so the transaction holds the write lock
        // from its first statement.
        sqlx::query(
            r#"
            INSERT INTO search_query_remote_keys (search_query, next_page_key)
            VALUES (?, ?)
            ON CONFLICT(search_query) DO UPDATE SET next_page_key = excluded.next_page_key
        "#,
        )
        .bind(query)
        .bind(page + 1)
        .execute(&mut *tx)
        .await?;

        if !articles.is_empty() {
            upsert_articles(&mut *tx, articles, now).await?;

            let start = if clear_existing {
                0
            } else {
                max_position(&mut *tx, query).await?
            };

            for (offset, chunk) in articles.chunks(50).enumerate() {
                let base = start + (offset * 50) as i64;
                let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                    "INSERT OR REPLACE INTO search_results (search_query, article_url, query_position) ",
                );
                builder.push_values(chunk.iter().enumerate(), |mut b, (i, article)| {
                    b.push_bind(query)
                        .push_bind(&article.url)
                        .push_bind(base + i as i64 + 1);
                });
                builder.build().execute(&mut *tx).await?;
            }
        }

        tx.commit().await?;

        let mut changed = vec![Table::SearchCursors];
        if clear_existing || !articles.is_empty() {
            changed.push(Table::SearchResults);
        }
        if !articles.is_empty() {
            changed.push(Table::Articles);
        }
        self.notify(&changed);

        tracing::debug!(
            query = %query,
            page,
            count = articles.len(),
            cleared = clear_existing,
            "Stored search page"
        );
        Ok(())
    }
}
