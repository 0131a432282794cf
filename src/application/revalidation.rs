//! Ordered delivery of a lookup's results.
//!
//! A lookup yields an initial result as soon as it returns. When that result
//! came from a cache hit, a detached task may later produce one refreshed
//! value that supersedes it. The refreshed value is always a success; failures
//! on the background path are logged where they happen and never delivered.

use std::future::Future;

use futures::future;
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::domain::error::FetchError;

pub struct Revalidation<T> {
    initial: Result<T, FetchError>,
    refresh: Refresh<T>,
}

/// Pending background refresh of a [`Revalidation`].
pub struct Refresh<T> {
    receiver: Option<oneshot::Receiver<T>>,
}

impl<T> Refresh<T> {
    /// Wait for the background task; `None` when it found nothing newer,
    /// failed, or was never started.
    pub async fn wait(self) -> Option<T> {
        match self.receiver {
            Some(receiver) => receiver.await.ok(),
            None => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.receiver.is_some()
    }
}

impl<T> Revalidation<T> {
    /// A lookup that delivers exactly once.
    pub(crate) fn settled(result: Result<T, FetchError>) -> Self {
        Self {
            initial: result,
            refresh: Refresh { receiver: None },
        }
    }

    /// Deliver `cached` now and run `refresh` on a detached task.
    ///
    /// The task runs to completion even if the caller drops the handle.
    pub(crate) fn revalidate<Fut>(cached: T, refresh: Fut) -> Self
    where
        T: Send + 'static,
        Fut: Future<Output = Option<T>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        tokio::spawn(async move {
            if let Some(value) = refresh.await {
                let _ = sender.send(value);
            }
        });

        Self {
            initial: Ok(cached),
            refresh: Refresh {
                receiver: Some(receiver),
            },
        }
    }

    pub fn initial(&self) -> Result<&T, &FetchError> {
        self.initial.as_ref()
    }

    /// Whether a background refresh was started for this lookup.
    pub fn is_revalidating(&self) -> bool {
        self.refresh.is_pending()
    }

    pub fn into_parts(self) -> (Result<T, FetchError>, Refresh<T>) {
        (self.initial, self.refresh)
    }

    pub async fn refreshed(self) -> Option<T> {
        self.refresh.wait().await
    }

    /// Every delivery in order: the initial result, then the refreshed value
    /// if one arrives.
    pub async fn settle(self) -> Vec<Result<T, FetchError>> {
        let (initial, refresh) = self.into_parts();
        let mut deliveries = vec![initial];
        if let Some(value) = refresh.wait().await {
            deliveries.push(Ok(value));
        }
        deliveries
    }

    /// The last delivery once the background refresh has finished.
    pub async fn latest(self) -> Result<T, FetchError> {
        let (initial, refresh) = self.into_parts();
        match refresh.wait().await {
            Some(value) => Ok(value),
            None => initial,
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<T, FetchError>> {
        let (initial, refresh) = self.into_parts();
        stream::once(future::ready(initial)).chain(
            stream::once(refresh.wait()).filter_map(|value| future::ready(value.map(Ok))),
        )
    }

    /// Completion-callback adapter.
    ///
    /// `callback` runs immediately with the initial result and, if the lookup
    /// is revalidating, once more from a spawned task with the refreshed value.
    pub fn notify<F>(self, mut callback: F) -> Option<JoinHandle<()>>
    where
        T: Send + 'static,
        F: FnMut(Result<T, FetchError>) + Send + 'static,
    {
        let (initial, refresh) = self.into_parts();
        callback(initial);

        if !refresh.is_pending() {
            return None;
        }

        Some(tokio::spawn(async move {
            if let Some(value) = refresh.wait().await {
                callback(Ok(value));
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use tokio::sync::Notify;

    use super::*;

    #[tokio::test]
    async fn settled_delivers_once() {
        let lookup = Revalidation::settled(Err::<u32, _>(FetchError::NonExistent));
        assert!(!lookup.is_revalidating());
        assert_eq!(lookup.settle().await, vec![Err(FetchError::NonExistent)]);
    }

    #[tokio::test]
    async fn refreshed_value_follows_initial() {
        let lookup = Revalidation::revalidate(1u32, async { Some(2) });
        assert_eq!(lookup.initial(), Ok(&1));
        assert_eq!(lookup.settle().await, vec![Ok(1), Ok(2)]);
    }

    #[tokio::test]
    async fn up_to_date_refresh_delivers_once() {
        let lookup = Revalidation::revalidate(1u32, async { None });
        assert!(lookup.is_revalidating());
        assert_eq!(lookup.settle().await, vec![Ok(1)]);
    }

    #[tokio::test]
    async fn latest_prefers_refreshed_value() {
        let lookup = Revalidation::revalidate(1u32, async { Some(5) });
        assert_eq!(lookup.latest().await, Ok(5));

        let lookup = Revalidation::revalidate(1u32, async { None });
        assert_eq!(lookup.latest().await, Ok(1));
    }

    #[tokio::test]
    async fn stream_yields_deliveries_in_order() {
        let lookup = Revalidation::revalidate(String::from("cached"), async {
            Some(String::from("remote"))
        });
        let items: Vec<_> = lookup.into_stream().collect().await;
        assert_eq!(items, vec![Ok("cached".to_string()), Ok("remote".to_string())]);
    }

    #[tokio::test]
    async fn notify_calls_back_immediately_then_again() {
        let gate = Arc::new(Notify::new());
        let release = gate.clone();
        let lookup = Revalidation::revalidate(1u32, async move {
            gate.notified().await;
            Some(2)
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handle = lookup
            .notify(move |result| sink.lock().expect("sink").push(result))
            .expect("refresh task");

        assert_eq!(*seen.lock().expect("seen"), vec![Ok(1)]);

        release.notify_one();
        handle.await.expect("callback task");
        assert_eq!(*seen.lock().expect("seen"), vec![Ok(1), Ok(2)]);
    }

    #[tokio::test]
    async fn notify_without_refresh_returns_no_task() {
        let lookup = Revalidation::settled(Ok(3u32));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = lookup.notify(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(handle.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
