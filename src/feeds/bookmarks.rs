use crate::repository::NewsRepository;
use crate::storage::{Article, DatabaseError, LiveQuery};

/// Presentation-facing controller of the bookmarks list.
#[derive(Clone)]
pub struct BookmarksFeed {
    repo: NewsRepository,
}

impl BookmarksFeed {
    pub fn new(repo: NewsRepository) -> Self {
        Self { repo }
    }

    pub fn bookmarks(&self) -> LiveQuery<Vec<Article>> {
        self.repo.bookmarks()
    }

    pub async fn toggle_bookmark(&self, article: &Article) -> Result<Option<bool>, DatabaseError> {
        self.repo.toggle_bookmark(article).await
    }

    /// Unbookmark everything. Returns how many articles were affected.
    pub async fn clear_all(&self) -> Result<u64, DatabaseError> {
        let cleared = self.repo.clear_all_bookmarks().await?;
        tracing::info!(cleared, "Cleared all bookmarks");
        Ok(cleared)
    }
}
