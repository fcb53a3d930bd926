//! Article repository: binds the sync engines to the news store and API.

mod breaking;
mod search;

pub use breaking::{needs_refresh, BreakingNewsResource};
pub use search::{SearchMediator, SearchPager};

use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::api::{ApiError, ArticleDto, NewsApi};
use crate::config::Config;
use crate::storage::{Article, Database, DatabaseError, LiveQuery, NewArticle};
use crate::sync::{network_bound_resource, PagingConfig, Pager, ResourceStream, SyncError};

/// One-shot notifications about a breaking news refresh.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// New headlines were saved; consumers typically scroll to the top
    FetchSucceeded,
    /// The refresh failed; cached data is still shown
    ShowErrorMessage(Arc<ApiError>),
    /// Reconciliation stopped on a non-transport failure (e.g. the store)
    SyncFailed(Arc<SyncError>),
}

/// Tunables of the repository.
#[derive(Debug, Clone, Copy)]
pub struct RepositorySettings {
    /// Breaking news younger than this is served without a fetch (millis)
    pub freshness_millis: i64,
    /// Non-bookmarked articles older than this are deleted by cleanup (millis)
    pub retention_millis: i64,
    pub paging: PagingConfig,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            freshness_millis: 5 * 60 * 1000,
            retention_millis: 7 * 24 * 60 * 60 * 1000,
            paging: PagingConfig::default(),
        }
    }
}

impl RepositorySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            freshness_millis: config.freshness_millis(),
            retention_millis: config.retention_millis(),
            paging: PagingConfig {
                page_size: config.search_page_size,
                ..PagingConfig::default()
            },
        }
    }
}

impl From<ArticleDto> for NewArticle {
    fn from(dto: ArticleDto) -> Self {
        Self {
            url: dto.url,
            title: dto.title,
            thumbnail_url: dto.url_to_image,
        }
    }
}

#[derive(Clone)]
pub struct NewsRepository {
    db: Database,
    api: Arc<NewsApi>,
    settings: RepositorySettings,
}

impl NewsRepository {
    pub fn new(db: Database, api: NewsApi, settings: RepositorySettings) -> Self {
        Self {
            db,
            api: Arc::new(api),
            settings,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> RepositorySettings {
        self.settings
    }

    // ========================================================================
    // Breaking News
    // ========================================================================

    /// Cached breaking news, refreshed from the API when stale or `force`d.
    ///
    /// `events` receives `FetchSucceeded` or `ShowErrorMessage` once the
    /// refresh resolves.
    pub fn breaking_news(
        &self,
        force: bool,
        events: Option<mpsc::Sender<FeedEvent>>,
    ) -> ResourceStream<Vec<Article>> {
        network_bound_resource(BreakingNewsResource {
            db: self.db.clone(),
            api: Arc::clone(&self.api),
            force,
            freshness_millis: self.settings.freshness_millis,
            events,
        })
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Pager for one search query.
    ///
    /// With `refresh_on_init`, [`Pager::initialize`] fetches page 1; without
    /// it the stored pages are served as they are.
    pub fn search_results(&self, query: &str, refresh_on_init: bool) -> SearchPager {
        let mediator = SearchMediator::new(
            query,
            self.db.clone(),
            Arc::clone(&self.api),
            refresh_on_init,
        );
        Pager::new(mediator, self.settings.paging)
    }

    /// Live stored results of `query`, in position order.
    pub fn search_rows(&self, query: &str) -> BoxStream<'static, Result<Vec<Article>, SyncError>> {
        self.db
            .live_search_results(query)
            .map(|rows| rows.map_err(SyncError::from))
            .boxed()
    }

    // ========================================================================
    // Bookmarks and Articles
    // ========================================================================

    pub fn bookmarks(&self) -> LiveQuery<Vec<Article>> {
        self.db.live_bookmarks()
    }

    /// Flip the stored bookmark flag of `article`. Returns the new flag, or
    /// `None` if the article is no longer stored.
    pub async fn toggle_bookmark(&self, article: &Article) -> Result<Option<bool>, DatabaseError> {
        let bookmarked = self.db.toggle_bookmark(&article.url).await?;
        tracing::debug!(url = %article.url, ?bookmarked, "Toggled bookmark");
        Ok(bookmarked)
    }

    pub async fn set_bookmarked(&self, url: &str, bookmarked: bool) -> Result<bool, DatabaseError> {
        self.db.set_bookmarked(url, bookmarked).await
    }

    pub async fn clear_all_bookmarks(&self) -> Result<u64, DatabaseError> {
        self.db.reset_all_bookmarks().await
    }

    pub async fn article(&self, url: &str) -> Result<Option<Article>, DatabaseError> {
        self.db.get_article(url).await
    }

    // ========================================================================
    // Retention
    // ========================================================================

    pub async fn delete_non_bookmarked_articles_older_than(
        &self,
        cutoff_millis: i64,
    ) -> Result<u64, DatabaseError> {
        self.db.delete_non_bookmarked_older_than(cutoff_millis).await
    }

    /// Delete non-bookmarked articles outside the retention window.
    pub async fn cleanup_expired(&self) -> Result<u64, DatabaseError> {
        let cutoff = chrono::Utc::now()
            .timestamp_millis()
            .saturating_sub(self.settings.retention_millis);
        let deleted = self.delete_non_bookmarked_articles_older_than(cutoff).await?;
        if deleted > 0 {
            tracing::info!(deleted, "Removed expired articles");
        }
        Ok(deleted)
    }
}
