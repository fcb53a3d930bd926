//! Change notification and live queries.
//!
//! Every write path bumps a per-table generation counter after its
//! transaction commits. A live query subscribes to the tables it reads,
//! yields the current result immediately, and re-runs whenever one of those
//! tables changes. Bursts of writes between two reads are coalesced into a
//! single re-read.

use futures::future::{self, BoxFuture};
use futures::stream::{self, BoxStream, StreamExt};
use std::future::Future;
use tokio::sync::watch;

use super::schema::Database;
use super::types::{DatabaseError, Table};

/// A live, re-subscribable view of a query result.
///
/// Each call to a `live_*` method returns a fresh subscription that delivers
/// the current value first, then a new value after every committed change.
pub type LiveQuery<T> = BoxStream<'static, Result<T, DatabaseError>>;

pub(crate) struct ChangeTracker {
    channels: Vec<watch::Sender<u64>>,
}

impl ChangeTracker {
    pub(crate) fn new() -> Self {
        let channels = Table::ALL.iter().map(|_| watch::channel(0).0).collect();
        Self { channels }
    }

    /// Bump the generation of each table, waking every subscriber.
    pub(crate) fn notify(&self, tables: &[Table]) {
        for table in tables {
            self.channels[table.index()].send_modify(|generation| {
                *generation = generation.wrapping_add(1);
            });
        }
        tracing::trace!(?tables, "Tables invalidated");
    }

    fn subscribe(&self, tables: &[Table]) -> Vec<watch::Receiver<u64>> {
        tables
            .iter()
            .map(|table| self.channels[table.index()].subscribe())
            .collect()
    }
}

/// Wait until any of the receivers observes a new generation.
///
/// Returns `false` once the tracker is gone. All receivers are marked as seen
/// afterwards so simultaneous changes to several tables cause one re-read.
async fn changed(receivers: &mut [watch::Receiver<u64>]) -> bool {
    if receivers.is_empty() {
        return false;
    }

    let waits: Vec<BoxFuture<'_, Result<(), watch::error::RecvError>>> = receivers
        .iter_mut()
        .map(|rx| Box::pin(rx.changed()) as BoxFuture<'_, _>)
        .collect();
    let (result, _, _) = future::select_all(waits).await;
    if result.is_err() {
        return false;
    }

    for rx in receivers.iter_mut() {
        rx.borrow_and_update();
    }
    true
}

impl Database {
    /// Build a live query over `tables` that re-runs `query` on every change.
    ///
    /// The subscription is taken before the first read, so a write landing
    /// between subscribe and read is never missed (it costs one extra read).
    pub fn live<T, F, Fut>(&self, tables: &[Table], query: F) -> LiveQuery<T>
    where
        T: Send + 'static,
        F: Fn(Database) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, DatabaseError>> + Send + 'static,
    {
        let receivers = self.changes.subscribe(tables);
        let db = self.clone();

        stream::unfold(
            (db, query, receivers, true),
            |(db, query, mut receivers, first)| async move {
                if !first && !changed(&mut receivers).await {
                    return None;
                }
                let result = query(db.clone()).await;
                Some((result, (db, query, receivers, false)))
            },
        )
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, NewArticle};
    use futures::StreamExt;
    use std::time::Duration;

    fn article(url: &str) -> NewArticle {
        NewArticle {
            url: url.to_string(),
            title: Some(format!("Title for {url}")),
            thumbnail_url: None,
        }
    }

    #[tokio::test]
    async fn test_live_query_yields_current_value_first() {
        let db = Database::open(":memory:").await.unwrap();
        db.replace_breaking_news(&[article("https://example.com/a")])
            .await
            .unwrap();

        let mut live = db.live_breaking_news();
        let first = live.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);
    }

    #[tokio::test]
    async fn test_live_query_re_reads_after_write() {
        let db = Database::open(":memory:").await.unwrap();
        let mut live = db.live_breaking_news();
        assert!(live.next().await.unwrap().unwrap().is_empty());

        db.replace_breaking_news(&[article("https://example.com/a")])
            .await
            .unwrap();

        let next = tokio::time::timeout(Duration::from_secs(5), live.next())
            .await
            .expect("live query should wake after commit")
            .unwrap()
            .unwrap();
        assert_eq!(next.len(), 1);
    }

    #[tokio::test]
    async fn test_live_query_ignores_unrelated_tables() {
        let db = Database::open(":memory:").await.unwrap();
        let mut live = db.live_breaking_news();
        live.next().await.unwrap().unwrap();

        db.store_search_page("cats", 1, &[], true).await.unwrap();

        let woke = tokio::time::timeout(Duration::from_millis(100), live.next()).await;
        assert!(woke.is_err(), "cursor writes must not wake breaking news");
    }

    #[tokio::test]
    async fn test_concurrent_subscribers_each_get_replay() {
        let db = Database::open(":memory:").await.unwrap();
        db.replace_breaking_news(&[article("https://example.com/a")])
            .await
            .unwrap();

        let mut first = db.live_breaking_news();
        let mut second = db.live_breaking_news();
        assert_eq!(first.next().await.unwrap().unwrap().len(), 1);
        assert_eq!(second.next().await.unwrap().unwrap().len(), 1);
    }
}
