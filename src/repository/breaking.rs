use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::FeedEvent;
use crate::api::{ArticleDto, NewsApi};
use crate::storage::{Article, Database, NewArticle};
use crate::sync::{BoundResource, SyncError, TransportError};

/// Staleness predicate for cached breaking news.
///
/// Stale when there is no timestamp (empty cache) or when the oldest cached
/// article was updated before `now_millis - window_millis`.
pub fn needs_refresh(oldest_updated_at: Option<i64>, now_millis: i64, window_millis: i64) -> bool {
    match oldest_updated_at {
        None => true,
        Some(updated_at) => updated_at < now_millis.saturating_sub(window_millis),
    }
}

/// The breaking news feed as a cache-or-fetch resource.
pub struct BreakingNewsResource {
    pub(super) db: Database,
    pub(super) api: Arc<NewsApi>,
    pub(super) force: bool,
    pub(super) freshness_millis: i64,
    pub(super) events: Option<mpsc::Sender<FeedEvent>>,
}

impl BreakingNewsResource {
    /// Hand `event` to the listener without waiting. A full or closed
    /// channel drops the event; reconciliation never blocks on a consumer.
    fn emit(&self, event: FeedEvent) {
        if let Some(events) = &self.events {
            if let Err(e) = events.try_send(event) {
                tracing::debug!(error = %e, "Feed event dropped");
            }
        }
    }
}

#[async_trait]
impl BoundResource for BreakingNewsResource {
    type Cached = Vec<Article>;
    type Remote = Vec<ArticleDto>;

    fn query(&self) -> BoxStream<'static, Result<Vec<Article>, SyncError>> {
        self.db
            .live_breaking_news()
            .map(|rows| rows.map_err(SyncError::from))
            .boxed()
    }

    async fn fetch(&self) -> Result<Vec<ArticleDto>, SyncError> {
        Ok(self.api.top_headlines().await?)
    }

    async fn save(&self, remote: Vec<ArticleDto>) -> Result<(), SyncError> {
        let articles: Vec<NewArticle> = remote.into_iter().map(NewArticle::from).collect();
        self.db.replace_breaking_news(&articles).await?;
        Ok(())
    }

    fn should_fetch(&self, cached: Option<&Vec<Article>>) -> bool {
        if self.force {
            return true;
        }
        let oldest = cached.and_then(|articles| articles.iter().map(|a| a.updated_at).min());
        let stale = needs_refresh(
            oldest,
            chrono::Utc::now().timestamp_millis(),
            self.freshness_millis,
        );
        tracing::debug!(?oldest, stale, "Checked breaking news freshness");
        stale
    }

    async fn on_fetch_success(&self) {
        self.emit(FeedEvent::FetchSucceeded);
    }

    async fn on_fetch_failed(&self, error: Arc<TransportError>) {
        self.emit(FeedEvent::ShowErrorMessage(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WINDOW: i64 = 5 * 60 * 1000;

    #[test]
    fn test_empty_cache_needs_refresh() {
        assert!(needs_refresh(None, 1_000_000, WINDOW));
    }

    #[test]
    fn test_boundary_is_fresh() {
        let now = 10 * WINDOW;
        assert!(!needs_refresh(Some(now - WINDOW), now, WINDOW));
        assert!(needs_refresh(Some(now - WINDOW - 1), now, WINDOW));
    }

    proptest! {
        #[test]
        fn prop_missing_timestamp_always_stale(now in any::<i64>(), window in 0i64..i64::MAX) {
            prop_assert!(needs_refresh(None, now, window));
        }

        #[test]
        fn prop_within_window_is_fresh(
            now in 0i64..4_000_000_000_000,
            window in 0i64..86_400_000,
            age in 0i64..86_400_000,
        ) {
            let age = age % (window + 1);
            prop_assert!(!needs_refresh(Some(now - age), now, window));
        }

        #[test]
        fn prop_older_than_window_is_stale(
            now in 0i64..4_000_000_000_000,
            window in 0i64..86_400_000,
            extra in 1i64..86_400_000,
        ) {
            prop_assert!(needs_refresh(Some(now - window - extra), now, window));
        }
    }
}
