//! Cache-or-fetch reconciliation ("network-bound resource").
//!
//! A [`BoundResource`] supplies four operations: read the cache, fetch from
//! the remote, persist the fetch, and decide whether the cache is stale.
//! [`network_bound_resource`] turns it into a stream of [`Resource`] states:
//!
//! ```text
//! snapshot = first(query())
//! if !should_fetch(snapshot):  query() as Success, forever
//! else:
//!     race { query() as Loading } against { fetch(); save() }
//!     ok            => on_fetch_success(); query() as Success, forever
//!     transport err => on_fetch_failed(e); query() as Error(e), forever
//!     other err     => emit Err and stop
//! ```
//!
//! The whole reconciliation is one future polled by the returned stream.
//! Dropping the stream drops the loading forwarder and the in-flight
//! fetch/save together; an uncommitted save transaction rolls back.

use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::error::{SyncError, TransportError};
use crate::resource::Resource;

/// Output of [`network_bound_resource`].
///
/// `Err` is emitted at most once, for a non-transport failure, and is always
/// the last item.
pub type ResourceStream<T> = BoxStream<'static, Result<Resource<T>, SyncError>>;

/// Buffered emissions between the reconciliation and the consumer
const CHANNEL_CAPACITY: usize = 64;

/// The pluggable operations of one cache-or-fetch reconciliation.
#[async_trait]
pub trait BoundResource: Send + Sync + 'static {
    /// What the cache yields (e.g. a list of articles).
    type Cached: Send + 'static;
    /// What the remote returns.
    type Remote: Send + 'static;

    /// A fresh live subscription to the cache.
    ///
    /// Must deliver the current value first, then a value after every
    /// change. Called once per phase.
    fn query(&self) -> BoxStream<'static, Result<Self::Cached, SyncError>>;

    async fn fetch(&self) -> Result<Self::Remote, SyncError>;

    /// Persist a fetch result. Must be atomic.
    async fn save(&self, remote: Self::Remote) -> Result<(), SyncError>;

    /// Decide from the pre-fetch snapshot whether to go to the remote.
    ///
    /// Receives `None` when the cache yielded nothing; implementations must
    /// treat that as stale.
    fn should_fetch(&self, _cached: Option<&Self::Cached>) -> bool {
        true
    }

    async fn on_fetch_success(&self) {}

    async fn on_fetch_failed(&self, _error: Arc<TransportError>) {}
}

type Emission<T> = Result<Resource<T>, SyncError>;

/// How a mirroring phase ended.
enum Mirror {
    /// The consumer went away
    Closed,
    /// The cache stream ended
    Exhausted,
}

/// Which side of the loading race finished first.
enum Race {
    Refreshed(Result<(), SyncError>),
    LoadingEnded(Result<Mirror, SyncError>),
}

/// Reconcile the cache behind `resource` with its remote source.
///
/// The stream is cold: nothing is read or fetched until it is first polled.
/// At most one fetch and one save happen per call.
pub fn network_bound_resource<R>(resource: R) -> ResourceStream<R::Cached>
where
    R: BoundResource,
{
    let (tx, rx) = mpsc::channel::<Emission<R::Cached>>(CHANNEL_CAPACITY);

    let driver = async move {
        if let Err(e) = reconcile(&resource, &tx).await {
            tracing::error!(error = %e, "Reconciliation failed");
            let _ = tx.send(Err(e)).await;
        }
        // Closing the channel ends the stream once buffered emissions drain
        drop(tx);
    };

    let emissions = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    let driver = stream::once(driver).filter_map(|()| future::ready(None::<Emission<R::Cached>>));

    stream::select(emissions, driver).boxed()
}

async fn reconcile<R>(resource: &R, tx: &mpsc::Sender<Emission<R::Cached>>) -> Result<(), SyncError>
where
    R: BoundResource,
{
    let snapshot = resource.query().next().await.transpose()?;

    if !resource.should_fetch(snapshot.as_ref()) {
        tracing::debug!("Cache is fresh, skipping fetch");
        mirror(resource.query(), tx, Resource::Success).await?;
        return Ok(());
    }

    let refreshed = {
        let loading = mirror(resource.query(), tx, Resource::Loading);
        let refresh = async {
            let remote = resource.fetch().await?;
            resource.save(remote).await
        };
        tokio::pin!(loading, refresh);

        let race = tokio::select! {
            result = &mut refresh => Race::Refreshed(result),
            mirrored = &mut loading => Race::LoadingEnded(mirrored),
        };

        match race {
            Race::Refreshed(result) => result,
            Race::LoadingEnded(mirrored) => match mirrored? {
                Mirror::Closed => return Ok(()),
                // Nothing left to forward; still finish the refresh
                Mirror::Exhausted => refresh.await,
            },
        }
        // The loading forwarder is dropped here, before the terminal phase
    };

    match refreshed {
        Ok(()) => {
            tracing::debug!("Fetch saved");
            resource.on_fetch_success().await;
            mirror(resource.query(), tx, Resource::Success).await?;
        }
        Err(SyncError::Transport(e)) => {
            let error = Arc::new(e);
            tracing::warn!(error = %error, "Fetch failed, serving cached data");
            resource.on_fetch_failed(Arc::clone(&error)).await;
            mirror(resource.query(), tx, move |data| Resource::Error {
                error: Arc::clone(&error),
                data,
            })
            .await?;
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

/// Forward every cache emission, wrapped by `wrap`, until either end closes.
async fn mirror<T>(
    mut source: BoxStream<'static, Result<T, SyncError>>,
    tx: &mpsc::Sender<Emission<T>>,
    wrap: impl Fn(T) -> Resource<T>,
) -> Result<Mirror, SyncError> {
    while let Some(item) = source.next().await {
        if tx.send(Ok(wrap(item?))).await.is_err() {
            return Ok(Mirror::Closed);
        }
    }
    Ok(Mirror::Exhausted)
}
