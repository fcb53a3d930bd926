use async_trait::async_trait;
use std::sync::Arc;

use crate::api::NewsApi;
use crate::storage::{Database, NewArticle};
use crate::sync::{
    InitializeAction, LoadType, MediatorResult, Pager, PagingState, RemoteMediator, SyncError,
    STARTING_PAGE_INDEX,
};

pub type SearchPager = Pager<SearchMediator>;

/// Loads pages of one search query into the store.
///
/// Stateless between loads: the next page number is read from the stored
/// cursor, so a mediator created after a restart continues where the last
/// one stopped.
pub struct SearchMediator {
    query: String,
    db: Database,
    api: Arc<NewsApi>,
    refresh_on_init: bool,
}

impl SearchMediator {
    pub fn new(query: &str, db: Database, api: Arc<NewsApi>, refresh_on_init: bool) -> Self {
        Self {
            query: query.to_string(),
            db,
            api,
            refresh_on_init,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

#[async_trait]
impl RemoteMediator for SearchMediator {
    async fn initialize(&self) -> InitializeAction {
        if self.refresh_on_init {
            InitializeAction::LaunchInitialRefresh
        } else {
            InitializeAction::SkipInitialRefresh
        }
    }

    async fn load(
        &self,
        load_type: LoadType,
        state: &PagingState,
    ) -> Result<MediatorResult, SyncError> {
        let page = match load_type {
            LoadType::Refresh => STARTING_PAGE_INDEX,
            // Results only grow forward from page 1
            LoadType::Prepend => {
                return Ok(MediatorResult::Success {
                    end_of_pagination_reached: true,
                })
            }
            LoadType::Append => self
                .db
                .search_cursor(&self.query)
                .await?
                .ok_or_else(|| SyncError::MissingCursor(self.query.clone()))?,
        };

        let fetched = match self.api.search(&self.query, page, state.config.page_size).await {
            Ok(articles) => articles,
            Err(e) => {
                tracing::warn!(query = %self.query, page, error = %e, "Search page fetch failed");
                return Ok(MediatorResult::Error(Arc::new(e)));
            }
        };

        let end_of_pagination_reached = fetched.is_empty();
        let articles: Vec<NewArticle> = fetched.into_iter().map(NewArticle::from).collect();
        self.db
            .store_search_page(&self.query, page, &articles, load_type == LoadType::Refresh)
            .await?;

        tracing::debug!(
            query = %self.query,
            page,
            count = articles.len(),
            end_of_pagination_reached,
            "Loaded search page"
        );
        Ok(MediatorResult::Success {
            end_of_pagination_reached,
        })
    }
}
