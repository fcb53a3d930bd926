use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::repository::{FeedEvent, NewsRepository};
use crate::resource::Resource;
use crate::storage::{Article, DatabaseError};

type BreakingState = Option<Resource<Vec<Article>>>;

/// Presentation-facing controller of the breaking news feed.
///
/// Holds the latest [`Resource`] on a watch channel. Each refresh replaces
/// the running reconciliation (latest wins). Dropping the feed cancels it.
pub struct BreakingNewsFeed {
    repo: NewsRepository,
    state: Arc<watch::Sender<BreakingState>>,
    events: mpsc::Sender<FeedEvent>,
    pending_scroll_to_top: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BreakingNewsFeed {
    /// Create the feed and run retention cleanup.
    ///
    /// Returns the feed and the receiver for its one-shot events. Nothing is
    /// loaded until [`start`](Self::start) is called.
    pub async fn open(
        repo: NewsRepository,
    ) -> Result<(Self, mpsc::Receiver<FeedEvent>), DatabaseError> {
        repo.cleanup_expired().await?;

        let (events, events_rx) = mpsc::channel(16);
        let (state, _) = watch::channel(None);
        let feed = Self {
            repo,
            state: Arc::new(state),
            events,
            pending_scroll_to_top: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        };
        Ok((feed, events_rx))
    }

    /// Load the feed, fetching only if the cache is stale.
    pub fn start(&self) {
        self.launch(false);
    }

    /// Load the feed and always fetch.
    pub fn force_refresh(&self) {
        self.launch(true);
    }

    fn launch(&self, force: bool) {
        if self.state.borrow().as_ref().is_some_and(Resource::is_loading) {
            tracing::debug!(force, "Breaking news already loading, ignoring refresh");
            return;
        }

        // Restored if this run ends without settling
        let previous = self.state.borrow().clone();
        let (inner_tx, mut inner_rx) = mpsc::channel(4);
        let mut updates = self.repo.breaking_news(force, Some(inner_tx));
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let pending_scroll_to_top = Arc::clone(&self.pending_scroll_to_top);

        let task = tokio::spawn(async move {
            let mut events_open = true;
            loop {
                tokio::select! {
                    update = updates.next() => match update {
                        Some(Ok(resource)) => {
                            state.send_replace(Some(resource));
                        }
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "Breaking news reconciliation failed");
                            settle(&state, previous.clone());
                            if events.try_send(FeedEvent::SyncFailed(Arc::new(e))).is_err() {
                                tracing::debug!("Feed event dropped, receiver full or closed");
                            }
                            break;
                        }
                        None => {
                            settle(&state, previous.clone());
                            break;
                        }
                    },
                    event = inner_rx.recv(), if events_open => match event {
                        Some(event) => {
                            if let FeedEvent::FetchSucceeded = event {
                                pending_scroll_to_top.store(true, Ordering::Release);
                            }
                            if events.try_send(event).is_err() {
                                tracing::debug!("Feed event dropped, receiver full or closed");
                            }
                        }
                        None => events_open = false,
                    },
                }
            }
        });

        let mut slot = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    /// Current state; `None` before the first emission.
    pub fn current(&self) -> BreakingState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BreakingState> {
        self.state.subscribe()
    }

    /// Whether a successful refresh landed since the last call.
    pub fn take_scroll_to_top(&self) -> bool {
        self.pending_scroll_to_top.swap(false, Ordering::AcqRel)
    }

    pub async fn toggle_bookmark(&self, article: &Article) -> Result<Option<bool>, DatabaseError> {
        self.repo.toggle_bookmark(article).await
    }
}

/// Leave `Loading` behind so later refreshes are not ignored.
fn settle(state: &watch::Sender<BreakingState>, previous: BreakingState) {
    state.send_if_modified(|current| {
        if current.as_ref().is_some_and(Resource::is_loading) {
            *current = previous;
            true
        } else {
            false
        }
    });
}

impl Drop for BreakingNewsFeed {
    fn drop(&mut self) {
        let slot = self.task.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = slot.take() {
            task.abort();
        }
    }
}
