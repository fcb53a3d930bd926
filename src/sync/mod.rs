//! Offline-first synchronization engines.
//!
//! - [`bound`]: cache-or-fetch reconciliation producing [`Resource`] states
//! - [`mediator`]: the paginated remote-load protocol
//! - [`pager`]: drives a mediator and pairs its load states with live rows
//!
//! [`Resource`]: crate::resource::Resource

pub mod bound;
mod error;
pub mod mediator;
pub mod pager;

pub use bound::{network_bound_resource, BoundResource, ResourceStream};
pub use error::{SyncError, TransportError};
pub use mediator::{
    InitializeAction, LoadType, MediatorResult, PagingConfig, PagingState, RemoteMediator,
    STARTING_PAGE_INDEX,
};
pub use pager::{LoadState, LoadStates, PagedData, Pager};
