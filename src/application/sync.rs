//! Shared stale-while-revalidate plumbing for the content repositories.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use metrics::counter;
use tracing::{debug, error, warn};

use crate::domain::entities::Snapshot;
use crate::domain::error::FetchError;

use super::repos::SyncFeed;
use super::revalidation::Revalidation;

pub(crate) const METRIC_CACHE_HIT: &str = "folio_sync_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "folio_sync_cache_miss_total";
pub(crate) const METRIC_REFRESH_APPLIED: &str = "folio_sync_refresh_applied_total";
pub(crate) const METRIC_REFRESH_FAILED: &str = "folio_sync_refresh_failed_total";

/// Writes a snapshot into the cache.
pub(crate) type SnapshotWriter =
    Box<dyn FnOnce(Snapshot) -> BoxFuture<'static, Result<(), FetchError>> + Send>;

/// How a cache lookup steers the protocol.
pub(crate) enum CacheOutcome<T> {
    Hit(T),
    Miss,
    Failed(FetchError),
}

impl<T> From<Result<T, FetchError>> for CacheOutcome<T> {
    fn from(result: Result<T, FetchError>) -> Self {
        match result {
            Ok(value) => Self::Hit(value),
            Err(FetchError::NonExistent) => Self::Miss,
            Err(
                error @ (FetchError::MalformedInput { .. }
                | FetchError::Transport { .. }
                | FetchError::Storage { .. }),
            ) => Self::Failed(error),
        }
    }
}

pub(crate) fn record_hit(shape: &'static str) {
    counter!(METRIC_CACHE_HIT, "shape" => shape).increment(1);
}

pub(crate) fn record_miss(shape: &'static str) {
    counter!(METRIC_CACHE_MISS, "shape" => shape).increment(1);
}

pub(crate) fn record_applied(shape: &'static str) {
    counter!(METRIC_REFRESH_APPLIED, "shape" => shape).increment(1);
}

pub(crate) fn record_failed(shape: &'static str) {
    counter!(METRIC_REFRESH_FAILED, "shape" => shape).increment(1);
}

/// A lookup whose remote counterpart is the bulk snapshot feed.
pub(crate) struct SnapshotLookup<Present, Stale, Requery> {
    pub shape: &'static str,
    pub feed: Arc<dyn SyncFeed>,
    pub writer: SnapshotWriter,
    /// Miss path: whether the snapshot carries what was asked for.
    pub present: Present,
    /// Hit path: whether the snapshot makes the delivered value stale.
    pub stale: Stale,
    /// Re-runs the lookup's cache query.
    pub requery: Requery,
}

impl<Present, Stale, Requery> SnapshotLookup<Present, Stale, Requery> {
    pub(crate) async fn serve<T>(self, cached: Result<T, FetchError>) -> Revalidation<T>
    where
        T: Clone + Send + 'static,
        Present: FnOnce(&Snapshot) -> bool + Send + 'static,
        Stale: FnOnce(&Snapshot, &T) -> bool + Send + 'static,
        Requery: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let Self {
            shape,
            feed,
            writer,
            present,
            stale,
            requery,
        } = self;

        match CacheOutcome::from(cached) {
            CacheOutcome::Hit(value) => {
                record_hit(shape);
                let delivered = value.clone();
                Revalidation::revalidate(
                    value,
                    refresh_from_snapshot(
                        feed,
                        shape,
                        move |snapshot| stale(snapshot, &delivered),
                        writer,
                        requery,
                    ),
                )
            }
            CacheOutcome::Miss => {
                record_miss(shape);
                Revalidation::settled(
                    load_from_snapshot(feed, present, writer, requery).await,
                )
            }
            CacheOutcome::Failed(error) => Revalidation::settled(Err(error)),
        }
    }
}

async fn load_from_snapshot<T>(
    feed: Arc<dyn SyncFeed>,
    present: impl FnOnce(&Snapshot) -> bool,
    writer: SnapshotWriter,
    requery: impl Future<Output = Result<T, FetchError>>,
) -> Result<T, FetchError> {
    let snapshot = feed.fetch_snapshot().await?;
    if !present(&snapshot) {
        return Err(FetchError::NonExistent);
    }

    writer(snapshot).await?;
    requery.await
}

async fn refresh_from_snapshot<T>(
    feed: Arc<dyn SyncFeed>,
    shape: &'static str,
    stale: impl FnOnce(&Snapshot) -> bool,
    writer: SnapshotWriter,
    requery: impl Future<Output = Result<T, FetchError>>,
) -> Option<T> {
    let snapshot = match feed.fetch_snapshot().await {
        Ok(snapshot) => snapshot,
        Err(error) => {
            record_failed(shape);
            warn!(shape, error = %error, "background snapshot fetch failed");
            return None;
        }
    };

    if !stale(&snapshot) {
        debug!(
            shape,
            posts = snapshot.posts.len(),
            terms = snapshot.terms.len(),
            "cached result is up to date"
        );
        return None;
    }

    if let Err(error) = writer(snapshot).await {
        record_failed(shape);
        error!(shape, error = %error, "could not save remote snapshot locally");
        return None;
    }

    match requery.await {
        Ok(value) => {
            record_applied(shape);
            Some(value)
        }
        Err(error) => {
            record_failed(shape);
            error!(shape, error = %error, "could not reload refreshed result from cache");
            None
        }
    }
}
