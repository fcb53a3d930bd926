use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::repository::{NewsRepository, SearchPager};
use crate::storage::{Article, DatabaseError};
use crate::sync::{LoadStates, MediatorResult, PagedData, SyncError};

/// Session key of the last submitted query
pub const CURRENT_QUERY_KEY: &str = "search.current_query";

type ResultsStream = BoxStream<'static, Result<PagedData<Article>, SyncError>>;

#[derive(Clone)]
struct ActiveSearch {
    query: String,
    pager: Arc<SearchPager>,
}

/// Presentation-facing controller of the search feed.
///
/// One query is active at a time. The submitted query is persisted so the
/// feed can be restored after a restart without refetching page 1.
pub struct SearchFeed {
    repo: NewsRepository,
    active: watch::Sender<Option<ActiveSearch>>,
    new_query_in_progress: AtomicBool,
    pending_scroll_to_top: AtomicBool,
}

impl SearchFeed {
    /// A feed with no active query.
    pub fn new(repo: NewsRepository) -> Self {
        let (active, _) = watch::channel(None);
        Self {
            repo,
            active,
            new_query_in_progress: AtomicBool::new(false),
            pending_scroll_to_top: AtomicBool::new(false),
        }
    }

    /// Reopen the persisted query, serving its stored pages.
    ///
    /// Performs no network request: the stored cursor lets
    /// [`load_more`](Self::load_more) continue from the next page.
    pub async fn restore(repo: NewsRepository) -> Result<Self, SyncError> {
        let feed = Self::new(repo);
        if let Some(query) = feed.repo.db().get_session_value(CURRENT_QUERY_KEY).await? {
            tracing::debug!(query = %query, "Restoring search query");
            feed.activate(&query, false).await?;
        }
        Ok(feed)
    }

    /// Make `query` the active search and load its first page.
    ///
    /// Blank queries are ignored (`Ok(None)`). The query is trimmed and
    /// persisted before anything is fetched. Once its first page lands, the
    /// feed asks for a scroll to the top (see
    /// [`take_scroll_to_top`](Self::take_scroll_to_top)).
    pub async fn submit_query(&self, query: &str) -> Result<Option<MediatorResult>, SyncError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        self.new_query_in_progress.store(true, Ordering::Release);
        let result = self.submit(query).await;
        self.new_query_in_progress.store(false, Ordering::Release);

        if let Ok(Some(first_page)) = &result {
            if first_page.is_success() {
                self.pending_scroll_to_top.store(true, Ordering::Release);
            }
        }
        result
    }

    async fn submit(&self, query: &str) -> Result<Option<MediatorResult>, SyncError> {
        self.repo
            .db()
            .set_session_value(CURRENT_QUERY_KEY, query)
            .await?;
        self.activate(query, true).await
    }

    /// Whether a submitted query is still loading its first page.
    pub fn is_new_query_in_progress(&self) -> bool {
        self.new_query_in_progress.load(Ordering::Acquire)
    }

    /// Whether a new query's first page landed since the last call.
    pub fn take_scroll_to_top(&self) -> bool {
        self.pending_scroll_to_top.swap(false, Ordering::AcqRel)
    }

    async fn activate(
        &self,
        query: &str,
        refresh_on_init: bool,
    ) -> Result<Option<MediatorResult>, SyncError> {
        let pager = Arc::new(self.repo.search_results(query, refresh_on_init));
        self.active.send_replace(Some(ActiveSearch {
            query: query.to_string(),
            pager: Arc::clone(&pager),
        }));
        pager.initialize().await
    }

    fn pager(&self) -> Option<Arc<SearchPager>> {
        self.active
            .borrow()
            .as_ref()
            .map(|active| Arc::clone(&active.pager))
    }

    pub fn current_query(&self) -> Option<String> {
        self.active.borrow().as_ref().map(|active| active.query.clone())
    }

    /// Load the next page of the active query. `None` without a query.
    pub async fn load_more(&self) -> Result<Option<MediatorResult>, SyncError> {
        match self.pager() {
            Some(pager) => pager.load_more().await.map(Some),
            None => Ok(None),
        }
    }

    /// Reload the active query from page 1.
    pub async fn refresh(&self) -> Result<Option<MediatorResult>, SyncError> {
        match self.pager() {
            Some(pager) => pager.refresh().await.map(Some),
            None => Ok(None),
        }
    }

    /// Repeat the last failed load of the active query, if any.
    pub async fn retry(&self) -> Result<Option<MediatorResult>, SyncError> {
        match self.pager() {
            Some(pager) => pager.retry().await,
            None => Ok(None),
        }
    }

    pub fn load_states(&self) -> Option<LoadStates> {
        self.pager().map(|pager| pager.load_states())
    }

    /// Results of whichever query is active, switching when a new query is
    /// submitted. Ends when the feed is dropped.
    pub fn results(&self) -> ResultsStream {
        let mut active = self.active.subscribe();
        let repo = self.repo.clone();
        let current = active
            .borrow_and_update()
            .as_ref()
            .map(|search| open_results(&repo, search));

        stream::unfold(Some((active, current, repo)), |seed| async move {
            let (mut active, mut current, repo) = seed?;
            loop {
                tokio::select! {
                    changed = active.changed() => {
                        changed.ok()?;
                        current = active
                            .borrow_and_update()
                            .as_ref()
                            .map(|search| open_results(&repo, search));
                    }
                    item = next_or_pending(&mut current) => match item {
                        Some(item) => return Some((item, Some((active, current, repo)))),
                        // This query's stream ended; wait for the next one
                        None => current = None,
                    },
                }
            }
        })
        .boxed()
    }

    pub async fn toggle_bookmark(&self, article: &Article) -> Result<Option<bool>, DatabaseError> {
        self.repo.toggle_bookmark(article).await
    }
}

fn open_results(repo: &NewsRepository, search: &ActiveSearch) -> ResultsStream {
    search.pager.stream(repo.search_rows(&search.query))
}

async fn next_or_pending(
    current: &mut Option<ResultsStream>,
) -> Option<Result<PagedData<Article>, SyncError>> {
    match current {
        Some(results) => results.next().await,
        None => future::pending().await,
    }
}
