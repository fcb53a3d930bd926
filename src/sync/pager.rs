//! Pagination layer driving a [`RemoteMediator`].
//!
//! The pager decides *when* to load (initial refresh, manual refresh,
//! load-more, retry), runs one load at a time, and publishes per-direction
//! [`LoadState`]s. The rows themselves always come from the store through a
//! live query; [`Pager::stream`] combines the two for rendering.

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use super::error::{SyncError, TransportError};
use super::mediator::{
    InitializeAction, LoadType, MediatorResult, PagingConfig, PagingState, RemoteMediator,
};

/// Progress of loads in one direction.
#[derive(Debug, Clone)]
pub enum LoadState {
    NotLoading { end_of_pagination_reached: bool },
    Loading,
    Error(Arc<TransportError>),
}

impl LoadState {
    const INCOMPLETE: LoadState = LoadState::NotLoading {
        end_of_pagination_reached: false,
    };

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn end_of_pagination_reached(&self) -> bool {
        matches!(
            self,
            LoadState::NotLoading {
                end_of_pagination_reached: true
            }
        )
    }

    pub fn error(&self) -> Option<&Arc<TransportError>> {
        match self {
            LoadState::Error(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadStates {
    pub refresh: LoadState,
    pub prepend: LoadState,
    pub append: LoadState,
}

impl Default for LoadStates {
    fn default() -> Self {
        Self {
            refresh: LoadState::INCOMPLETE,
            prepend: LoadState::INCOMPLETE,
            append: LoadState::INCOMPLETE,
        }
    }
}

impl LoadStates {
    pub fn get(&self, load_type: LoadType) -> &LoadState {
        match load_type {
            LoadType::Refresh => &self.refresh,
            LoadType::Prepend => &self.prepend,
            LoadType::Append => &self.append,
        }
    }

    fn get_mut(&mut self, load_type: LoadType) -> &mut LoadState {
        match load_type {
            LoadType::Refresh => &mut self.refresh,
            LoadType::Prepend => &mut self.prepend,
            LoadType::Append => &mut self.append,
        }
    }
}

/// Rows currently in the store plus the load states at the time they were read.
#[derive(Debug, Clone)]
pub struct PagedData<T> {
    pub items: Vec<T>,
    pub load_states: LoadStates,
}

struct PagerState {
    last_failed: Option<LoadType>,
    pages_loaded: u32,
}

pub struct Pager<M> {
    mediator: M,
    config: PagingConfig,
    states: watch::Sender<LoadStates>,
    /// Held for the duration of a load
    inner: Mutex<PagerState>,
}

impl<M: RemoteMediator> Pager<M> {
    pub fn new(mediator: M, config: PagingConfig) -> Self {
        let config = PagingConfig {
            page_size: config.page_size.max(1),
            max_size: config.max_size.max(config.page_size.max(1)),
        };
        let (states, _) = watch::channel(LoadStates::default());
        Self {
            mediator,
            config,
            states,
            inner: Mutex::new(PagerState {
                last_failed: None,
                pages_loaded: 0,
            }),
        }
    }

    pub fn mediator(&self) -> &M {
        &self.mediator
    }

    pub fn config(&self) -> PagingConfig {
        self.config
    }

    /// Ask the mediator whether to start with a refresh, and run it if so.
    ///
    /// Returns `None` when the refresh was skipped.
    pub async fn initialize(&self) -> Result<Option<MediatorResult>, SyncError> {
        match self.mediator.initialize().await {
            InitializeAction::LaunchInitialRefresh => self.load(LoadType::Refresh).await.map(Some),
            InitializeAction::SkipInitialRefresh => {
                tracing::debug!("Skipping initial refresh, serving stored pages");
                Ok(None)
            }
        }
    }

    pub async fn refresh(&self) -> Result<MediatorResult, SyncError> {
        self.load(LoadType::Refresh).await
    }

    pub async fn load_more(&self) -> Result<MediatorResult, SyncError> {
        self.load(LoadType::Append).await
    }

    /// Repeat the most recent failed load. Returns `None` if nothing failed.
    pub async fn retry(&self) -> Result<Option<MediatorResult>, SyncError> {
        let last_failed = self.inner.lock().await.last_failed;
        match last_failed {
            Some(load_type) => {
                tracing::debug!(?load_type, "Retrying failed load");
                self.load(load_type).await.map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn load_states(&self) -> LoadStates {
        self.states.borrow().clone()
    }

    pub fn subscribe_load_states(&self) -> watch::Receiver<LoadStates> {
        self.states.subscribe()
    }

    /// Run one load. Concurrent calls queue behind each other.
    ///
    /// Prepend and Append are answered without calling the mediator once
    /// their direction reported end of pagination; a successful Refresh
    /// reopens both directions.
    pub async fn load(&self, load_type: LoadType) -> Result<MediatorResult, SyncError> {
        let mut inner = self.inner.lock().await;

        if load_type != LoadType::Refresh
            && self.states.borrow().get(load_type).end_of_pagination_reached()
        {
            return Ok(MediatorResult::Success {
                end_of_pagination_reached: true,
            });
        }

        self.set_state(load_type, LoadState::Loading);
        let paging_state = PagingState {
            config: self.config,
            pages_loaded: inner.pages_loaded,
        };

        let result = match self.mediator.load(load_type, &paging_state).await {
            Ok(result) => result,
            // A mediator may surface transport failures as errors; they stay retryable
            Err(SyncError::Transport(e)) => MediatorResult::Error(Arc::new(e)),
            Err(e) => {
                self.set_state(load_type, LoadState::INCOMPLETE);
                return Err(e);
            }
        };

        match &result {
            MediatorResult::Success {
                end_of_pagination_reached,
            } => {
                let end = *end_of_pagination_reached;
                if inner.last_failed == Some(load_type) || load_type == LoadType::Refresh {
                    inner.last_failed = None;
                }
                match load_type {
                    LoadType::Refresh => {
                        inner.pages_loaded = u32::from(!end);
                        self.states.send_modify(|states| {
                            states.refresh = LoadState::INCOMPLETE;
                            states.prepend = LoadState::INCOMPLETE;
                            states.append = LoadState::NotLoading {
                                end_of_pagination_reached: end,
                            };
                        });
                    }
                    LoadType::Prepend | LoadType::Append => {
                        if !end {
                            inner.pages_loaded += 1;
                        }
                        self.set_state(
                            load_type,
                            LoadState::NotLoading {
                                end_of_pagination_reached: end,
                            },
                        );
                    }
                }
                tracing::debug!(?load_type, end, pages = inner.pages_loaded, "Load finished");
            }
            MediatorResult::Error(error) => {
                tracing::warn!(?load_type, error = %error, "Load failed");
                inner.last_failed = Some(load_type);
                self.set_state(load_type, LoadState::Error(Arc::clone(error)));
            }
        }

        Ok(result)
    }

    fn set_state(&self, load_type: LoadType, state: LoadState) {
        self.states.send_modify(|states| *states.get_mut(load_type) = state);
    }

    /// Combine a live row stream with this pager's load states.
    ///
    /// Emits whenever the rows change, and whenever a load state changes
    /// once the first rows have arrived. A failed load never clears rows that
    /// were already emitted. The stream ends when `rows` ends, after the first
    /// `Err` from `rows`, or when the pager is dropped.
    pub fn stream<T>(
        &self,
        rows: BoxStream<'static, Result<Vec<T>, SyncError>>,
    ) -> BoxStream<'static, Result<PagedData<T>, SyncError>>
    where
        T: Clone + Send + 'static,
    {
        let states = self.subscribe_load_states();

        stream::unfold(
            Some((rows, states, None::<Vec<T>>)),
            |seed| async move {
                let (mut rows, mut states, items) = seed?;
                tokio::select! {
                    next = rows.next() => match next {
                        Some(Ok(items)) => {
                            let data = PagedData {
                                items: items.clone(),
                                load_states: states.borrow_and_update().clone(),
                            };
                            Some((Ok(data), Some((rows, states, Some(items)))))
                        }
                        Some(Err(e)) => Some((Err(e), None)),
                        None => None,
                    },
                    changed = states.changed(), if items.is_some() => {
                        changed.ok()?;
                        let items = items.unwrap_or_default();
                        let data = PagedData {
                            items: items.clone(),
                            load_states: states.borrow_and_update().clone(),
                        };
                        Some((Ok(data), Some((rows, states, Some(items)))))
                    }
                }
            },
        )
        .boxed()
    }
}
