use sqlx::QueryBuilder;

use super::articles::upsert_articles;
use super::live::LiveQuery;
use super::schema::Database;
use super::types::{Article, DatabaseError, NewArticle, Table};

impl Database {
    // ========================================================================
    // Breaking News
    // ========================================================================

    /// Articles of the breaking news feed in server order.
    pub async fn breaking_articles(&self) -> Result<Vec<Article>, DatabaseError> {
        let articles = sqlx::query_as::<_, Article>(
            r#"
            SELECT a.url, a.title, a.thumbnail_url, a.is_bookmarked, a.updated_at
            FROM breaking_news b
            JOIN news_articles a ON a.url = b.article_url
            ORDER BY b.id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    /// Live view of the breaking news feed.
    ///
    /// Depends on both the association table and the articles, so a bookmark
    /// toggle re-emits the feed.
    pub fn live_breaking_news(&self) -> LiveQuery<Vec<Article>> {
        self.live(&[Table::BreakingNews, Table::Articles], |db| async move {
            db.breaking_articles().await
        })
    }

    /// Replace the breaking news feed with a freshly fetched list.
    ///
    /// One transaction: clear the association, upsert the articles (keeping
    /// stored bookmark flags), then re-insert the association in list order.
    /// A rollback leaves the previous feed untouched.
    pub async fn replace_breaking_news(&self, articles: &[NewArticle]) -> Result<(), DatabaseError> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM breaking_news")
            .execute(&mut *tx)
            .await?;

        upsert_articles(&mut *tx, articles, now).await?;

        for chunk in articles.chunks(100) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("INSERT INTO breaking_news (article_url) ");
            builder.push_values(chunk, |mut b, article| {
                b.push_bind(&article.url);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        self.notify(&[Table::BreakingNews, Table::Articles]);

        tracing::debug!(count = articles.len(), "Replaced breaking news");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, NewArticle};
    use pretty_assertions::assert_eq;

    fn test_article(url: &str) -> NewArticle {
        NewArticle {
            url: url.to_string(),
            title: Some(format!("Title {url}")),
            thumbnail_url: None,
        }
    }

    #[tokio::test]
    async fn test_replace_breaking_news_keeps_server_order() {
        let db = Database::open(":memory:").await.unwrap();
        let urls = ["https://n.example/c", "https://n.example/a", "https://n.example/b"];
        let articles: Vec<NewArticle> = urls.iter().map(|u| test_article(u)).collect();

        db.replace_breaking_news(&articles).await.unwrap();

        let stored: Vec<String> = db
            .breaking_articles()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.url)
            .collect();
        assert_eq!(stored, urls);
    }

    #[tokio::test]
    async fn test_replace_breaking_news_replaces_previous_feed() {
        let db = Database::open(":memory:").await.unwrap();
        db.replace_breaking_news(&[test_article("https://n.example/old")])
            .await
            .unwrap();
        db.replace_breaking_news(&[test_article("https://n.example/new")])
            .await
            .unwrap();

        let stored = db.breaking_articles().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].url, "https://n.example/new");
        // The article row itself is kept for bookmarks and retention
        assert!(db.get_article("https://n.example/old").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_replace_breaking_news_preserves_bookmark() {
        let db = Database::open(":memory:").await.unwrap();
        db.replace_breaking_news(&[test_article("https://n.example/a")])
            .await
            .unwrap();
        db.set_bookmarked("https://n.example/a", true).await.unwrap();

        db.replace_breaking_news(&[test_article("https://n.example/a")])
            .await
            .unwrap();

        let stored = db.breaking_articles().await.unwrap();
        assert!(stored[0].is_bookmarked);
    }

    #[tokio::test]
    async fn test_replace_breaking_news_empty_clears_feed() {
        let db = Database::open(":memory:").await.unwrap();
        db.replace_breaking_news(&[test_article("https://n.example/a")])
            .await
            .unwrap();
        db.replace_breaking_news(&[]).await.unwrap();
        assert!(db.breaking_articles().await.unwrap().is_empty());
    }
}
