//! Remote-backed pagination protocol.
//!
//! A [`RemoteMediator`] loads pages from a remote source into the store and
//! reports, per load, whether the end of the data was reached. It keeps no
//! state in memory; cursors and positions live in the store, so a mediator
//! recreated after a restart picks up where the previous one stopped.

use async_trait::async_trait;
use std::sync::Arc;

use super::error::{SyncError, TransportError};

/// First page requested by a refresh.
pub const STARTING_PAGE_INDEX: i64 = 1;

/// Which boundary of the loaded data a load extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadType {
    /// Replace everything with the first page
    Refresh,
    /// Load before the first item
    Prepend,
    /// Load after the last item
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingConfig {
    pub page_size: u32,
    /// Upper bound on items the pager keeps loaded
    pub max_size: u32,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            max_size: 200,
        }
    }
}

/// Snapshot of the pager handed to each load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingState {
    pub config: PagingConfig,
    /// Pages loaded since the last refresh
    pub pages_loaded: u32,
}

/// Outcome of one load.
///
/// Transport failures are a result, not an error, so the pager can offer a
/// retry. Other failures are returned as `Err(SyncError)`.
#[derive(Debug, Clone)]
pub enum MediatorResult {
    Success { end_of_pagination_reached: bool },
    Error(Arc<TransportError>),
}

impl MediatorResult {
    pub fn is_success(&self) -> bool {
        matches!(self, MediatorResult::Success { .. })
    }

    pub fn end_of_pagination_reached(&self) -> bool {
        matches!(
            self,
            MediatorResult::Success {
                end_of_pagination_reached: true
            }
        )
    }
}

/// Whether opening a pager should start with a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializeAction {
    LaunchInitialRefresh,
    /// Cached pages are current (e.g. reopened after a restart)
    SkipInitialRefresh,
}

#[async_trait]
pub trait RemoteMediator: Send + Sync + 'static {
    /// Evaluated once when a pager starts.
    async fn initialize(&self) -> InitializeAction {
        InitializeAction::LaunchInitialRefresh
    }

    async fn load(
        &self,
        load_type: LoadType,
        state: &PagingState,
    ) -> Result<MediatorResult, SyncError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;

    #[test]
    fn test_default_paging_config() {
        let config = PagingConfig::default();
        assert_eq!(config.page_size, 20);
        assert_eq!(config.max_size, 200);
    }

    #[test]
    fn test_result_predicates() {
        let end = MediatorResult::Success {
            end_of_pagination_reached: true,
        };
        let more = MediatorResult::Success {
            end_of_pagination_reached: false,
        };
        let failed = MediatorResult::Error(Arc::new(ApiError::Timeout));

        assert!(end.is_success() && end.end_of_pagination_reached());
        assert!(more.is_success() && !more.end_of_pagination_reached());
        assert!(!failed.is_success() && !failed.end_of_pagination_reached());
    }
}
