//! Fetch-progress envelope emitted by the cache reconciliation engine.

use std::sync::Arc;

use crate::api::ApiError;

/// Best-available data plus the state of the refresh that produced it.
///
/// Every state carries the latest cache snapshot, so a consumer can always
/// render something: `Loading` shows cached data while a fetch runs, `Error`
/// keeps the cached data on screen next to the failure.
#[derive(Debug, Clone)]
pub enum Resource<T> {
    /// A fetch is in flight; `T` is the current cache content.
    Loading(T),
    /// The fetch completed, or was skipped because the cache was fresh.
    Success(T),
    /// The fetch failed with a transport error; `data` is the cache fallback.
    Error { error: Arc<ApiError>, data: T },
}

impl<T> Resource<T> {
    pub fn data(&self) -> &T {
        match self {
            Resource::Loading(data) | Resource::Success(data) => data,
            Resource::Error { data, .. } => data,
        }
    }

    pub fn into_data(self) -> T {
        match self {
            Resource::Loading(data) | Resource::Success(data) => data,
            Resource::Error { data, .. } => data,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Resource::Loading(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Resource::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Resource::Error { .. })
    }

    /// The failure behind an `Error` state.
    pub fn error(&self) -> Option<&Arc<ApiError>> {
        match self {
            Resource::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Transform the data, keeping the state.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resource<U> {
        match self {
            Resource::Loading(data) => Resource::Loading(f(data)),
            Resource::Success(data) => Resource::Success(f(data)),
            Resource::Error { error, data } => Resource::Error {
                error,
                data: f(data),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_state_exposes_data() {
        let error = Arc::new(ApiError::Timeout);
        let states = [
            Resource::Loading(vec![1]),
            Resource::Success(vec![1]),
            Resource::Error {
                error,
                data: vec![1],
            },
        ];
        for state in states {
            assert_eq!(state.data(), &vec![1]);
            assert_eq!(state.into_data(), vec![1]);
        }
    }

    #[test]
    fn test_state_predicates() {
        assert!(Resource::Loading(()).is_loading());
        assert!(Resource::Success(()).is_success());
        let failed = Resource::Error {
            error: Arc::new(ApiError::HttpStatus(500)),
            data: (),
        };
        assert!(failed.is_error());
        assert!(!failed.is_loading());
        assert!(matches!(
            failed.error().map(|e| e.as_ref()),
            Some(ApiError::HttpStatus(500))
        ));
        assert!(Resource::Success(()).error().is_none());
    }

    #[test]
    fn test_map_keeps_state_and_error() {
        let error = Arc::new(ApiError::Timeout);
        let mapped = Resource::Error {
            error: Arc::clone(&error),
            data: vec![1, 2, 3],
        }
        .map(|v| v.len());

        assert_eq!(*mapped.data(), 3);
        assert!(Arc::ptr_eq(mapped.error().unwrap(), &error));
    }
}
