//! Taxonomy term lookups.
//!
//! Terms carry no modification timestamp, so every term lookup revalidates
//! against the snapshot feed: a cached term is stale when the snapshot holds a
//! different copy of it.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, instrument};

use crate::domain::entities::{Snapshot, TermRecord};
use crate::domain::error::FetchError;
use crate::domain::slug::slug_from_url;

use super::repos::{SyncFeed, TermsCache};
use super::revalidation::Revalidation;
use super::sync::{SnapshotLookup, SnapshotWriter};

#[derive(Clone)]
pub struct TermRepository {
    cache: Arc<dyn TermsCache>,
    feed: Arc<dyn SyncFeed>,
}

impl TermRepository {
    pub fn new(cache: Arc<dyn TermsCache>, feed: Arc<dyn SyncFeed>) -> Self {
        Self { cache, feed }
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self, id: i64) -> Revalidation<TermRecord> {
        let cache = self.cache.clone();

        SnapshotLookup {
            shape: "term_by_id",
            feed: self.feed.clone(),
            writer: self.snapshot_writer(),
            present: move |snapshot: &Snapshot| snapshot.term(id).is_some(),
            stale: move |snapshot: &Snapshot, cached: &TermRecord| {
                snapshot.term(id).is_some_and(|term| term != cached)
            },
            requery: async move { cache.fetch(id).await },
        }
        .serve(self.cache.fetch(id).await)
        .await
    }

    #[instrument(skip(self))]
    pub async fn fetch_by_slug(&self, slug: &str) -> Revalidation<TermRecord> {
        let wanted = slug.to_string();
        let changed = slug.to_string();
        let requery_slug = slug.to_string();
        let cache = self.cache.clone();

        SnapshotLookup {
            shape: "term_by_slug",
            feed: self.feed.clone(),
            writer: self.snapshot_writer(),
            present: move |snapshot: &Snapshot| snapshot.term_with_slug(&wanted).is_some(),
            stale: move |snapshot: &Snapshot, cached: &TermRecord| {
                snapshot
                    .term_with_slug(&changed)
                    .is_some_and(|term| term != cached)
            },
            requery: async move { cache.fetch_by_slug(&requery_slug).await },
        }
        .serve(self.cache.fetch_by_slug(slug).await)
        .await
    }

    #[instrument(skip(self))]
    pub async fn fetch_by_url(&self, url: &str) -> Revalidation<TermRecord> {
        match slug_from_url(url) {
            Ok(slug) => self.fetch_by_slug(&slug).await,
            Err(error) => {
                debug!(url, error = %error, "url does not resolve to a term slug");
                Revalidation::settled(Err(FetchError::NonExistent))
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn fetch_by_ids(&self, ids: &BTreeSet<i64>) -> Revalidation<Vec<TermRecord>> {
        let present_ids = ids.clone();
        let stale_ids = ids.clone();
        let requery_ids = ids.clone();
        let cache = self.cache.clone();

        SnapshotLookup {
            shape: "terms_by_ids",
            feed: self.feed.clone(),
            writer: self.snapshot_writer(),
            present: move |snapshot: &Snapshot| carries_any(snapshot, &present_ids),
            stale: move |snapshot: &Snapshot, _: &Vec<TermRecord>| {
                carries_any(snapshot, &stale_ids)
            },
            requery: async move { cache.fetch_by_ids(&requery_ids).await },
        }
        .serve(self.cache.fetch_by_ids(ids).await)
        .await
    }

    #[instrument(skip(self))]
    pub async fn fetch_all(&self) -> Revalidation<Vec<TermRecord>> {
        let cache = self.cache.clone();

        SnapshotLookup {
            shape: "all_terms",
            feed: self.feed.clone(),
            writer: self.snapshot_writer(),
            present: has_terms,
            stale: |snapshot: &Snapshot, _: &Vec<TermRecord>| has_terms(snapshot),
            requery: async move { cache.fetch_all().await },
        }
        .serve(self.cache.fetch_all().await)
        .await
    }

    #[instrument(skip(self))]
    pub async fn fetch_by_taxonomy(
        &self,
        taxonomy: &str,
        limit: Option<usize>,
    ) -> Revalidation<Vec<TermRecord>> {
        let present_taxonomy = taxonomy.to_string();
        let stale_taxonomy = taxonomy.to_string();
        let requery_taxonomy = taxonomy.to_string();
        let cache = self.cache.clone();

        SnapshotLookup {
            shape: "terms_by_taxonomy",
            feed: self.feed.clone(),
            writer: self.snapshot_writer(),
            present: move |snapshot: &Snapshot| carries_taxonomy(snapshot, &present_taxonomy),
            stale: move |snapshot: &Snapshot, _: &Vec<TermRecord>| {
                carries_taxonomy(snapshot, &stale_taxonomy)
            },
            requery: async move { cache.fetch_by_taxonomy(&requery_taxonomy, limit).await },
        }
        .serve(self.cache.fetch_by_taxonomy(taxonomy, limit).await)
        .await
    }

    pub fn id_by_slug(&self, slug: &str) -> Option<i64> {
        self.cache.id_by_slug(slug)
    }

    pub fn id_by_url(&self, url: &str) -> Option<i64> {
        let slug = slug_from_url(url).ok()?;
        self.id_by_slug(&slug)
    }

    fn snapshot_writer(&self) -> SnapshotWriter {
        let cache = self.cache.clone();
        Box::new(move |snapshot: Snapshot| {
            async move { cache.upsert_terms(&snapshot.terms).await }.boxed()
        })
    }
}

fn has_terms(snapshot: &Snapshot) -> bool {
    !snapshot.terms.is_empty()
}

fn carries_any(snapshot: &Snapshot, ids: &BTreeSet<i64>) -> bool {
    snapshot.terms.iter().any(|term| ids.contains(&term.id))
}

fn carries_taxonomy(snapshot: &Snapshot, taxonomy: &str) -> bool {
    snapshot
        .terms
        .iter()
        .any(|term| term.taxonomy.eq_ignore_ascii_case(taxonomy))
}
