//! Post lookups served stale-while-revalidate.
//!
//! Every lookup reads the cache first. A hit is delivered at once and checked
//! against the remote in the background; a miss goes to the remote and is
//! delivered once, after the cache has been updated.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, instrument, warn};

use crate::config::ContentSettings;
use crate::domain::entities::{ExtendedPost, PostRecord, Snapshot};
use crate::domain::error::FetchError;
use crate::domain::slug::{slug_from_url, slugs_match};

use super::repos::{
    PostItemRequest, PostListRequest, PostSearchRequest, PostsCache, PostsService, SyncFeed,
};
use super::revalidation::Revalidation;
use super::sync::{self, CacheOutcome, SnapshotLookup, SnapshotWriter};

#[derive(Clone)]
pub struct PostRepository {
    service: Arc<dyn PostsService>,
    cache: Arc<dyn PostsCache>,
    feed: Arc<dyn SyncFeed>,
    content: Arc<ContentSettings>,
}

impl PostRepository {
    pub fn new(
        service: Arc<dyn PostsService>,
        cache: Arc<dyn PostsCache>,
        feed: Arc<dyn SyncFeed>,
        content: ContentSettings,
    ) -> Self {
        Self {
            service,
            cache,
            feed,
            content: Arc::new(content),
        }
    }

    /// Post by id, with its terms resolved.
    ///
    /// A cached post is replaced only when the remote copy was modified
    /// strictly later.
    #[instrument(skip(self))]
    pub async fn fetch(&self, id: i64) -> Revalidation<ExtendedPost> {
        const SHAPE: &str = "post_by_id";
        let request = self.item_request();

        match CacheOutcome::from(self.cache.fetch(id).await) {
            CacheOutcome::Hit(cached) => {
                sync::record_hit(SHAPE);
                let this = self.clone();
                let delivered = cached.clone();
                Revalidation::revalidate(cached, async move {
                    this.refresh_post(id, request, delivered).await
                })
            }
            CacheOutcome::Miss => {
                sync::record_miss(SHAPE);
                let result = match self.service.fetch(id, &request).await {
                    Ok(item) => self.cache.upsert(item).await,
                    Err(error) => Err(error),
                };
                Revalidation::settled(result)
            }
            CacheOutcome::Failed(error) => Revalidation::settled(Err(error)),
        }
    }

    #[instrument(skip(self))]
    pub async fn fetch_by_slug(&self, slug: &str) -> Revalidation<PostRecord> {
        let wanted = slug.to_string();
        let newer = slug.to_string();
        let cache = self.cache.clone();
        let requery_slug = slug.to_string();

        SnapshotLookup {
            shape: "post_by_slug",
            feed: self.feed.clone(),
            writer: self.snapshot_writer(),
            present: move |snapshot: &Snapshot| {
                snapshot.post_with_slug(&wanted).is_some()
            },
            stale: move |snapshot: &Snapshot, cached: &PostRecord| {
                snapshot.posts.iter().any(|post| {
                    slugs_match(&post.slug, &newer) && post.modified_at > cached.modified_at
                })
            },
            requery: async move { cache.fetch_by_slug(&requery_slug).await },
        }
        .serve(self.cache.fetch_by_slug(slug).await)
        .await
    }

    /// Resolves the permalink to a slug first; links that yield no slug
    /// complete with [`FetchError::NonExistent`] without touching the cache.
    #[instrument(skip(self))]
    pub async fn fetch_by_url(&self, url: &str) -> Revalidation<PostRecord> {
        match slug_from_url(url) {
            Ok(slug) => self.fetch_by_slug(&slug).await,
            Err(error) => {
                debug!(url, error = %error, "url does not resolve to a post slug");
                Revalidation::settled(Err(FetchError::NonExistent))
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn fetch_by_ids(&self, ids: &BTreeSet<i64>) -> Revalidation<Vec<PostRecord>> {
        let present_ids = ids.clone();
        let stale_ids = ids.clone();
        let requery_ids = ids.clone();
        let cache = self.cache.clone();

        SnapshotLookup {
            shape: "posts_by_ids",
            feed: self.feed.clone(),
            writer: self.snapshot_writer(),
            present: move |snapshot: &Snapshot| {
                snapshot.contains_post_id(&present_ids)
            },
            stale: move |snapshot: &Snapshot, _: &Vec<PostRecord>| {
                snapshot.contains_post_id(&stale_ids)
            },
            requery: async move { cache.fetch_by_ids(&requery_ids).await },
        }
        .serve(self.cache.fetch_by_ids(ids).await)
        .await
    }

    /// Any change on the remote re-runs the list query.
    #[instrument(skip(self))]
    pub async fn fetch_list(&self, request: &PostListRequest) -> Revalidation<Vec<PostRecord>> {
        let cache = self.cache.clone();
        let requery = request.clone();

        SnapshotLookup {
            shape: "post_list",
            feed: self.feed.clone(),
            writer: self.snapshot_writer(),
            present: has_posts,
            stale: |snapshot: &Snapshot, _: &Vec<PostRecord>| {
                has_posts(snapshot)
            },
            requery: async move { cache.fetch_list(&requery).await },
        }
        .serve(self.cache.fetch_list(request).await)
        .await
    }

    #[instrument(skip(self))]
    pub async fn fetch_popular(
        &self,
        request: &PostListRequest,
    ) -> Revalidation<Vec<PostRecord>> {
        let cache = self.cache.clone();
        let requery = request.clone();

        SnapshotLookup {
            shape: "popular_posts",
            feed: self.feed.clone(),
            writer: self.snapshot_writer(),
            present: has_posts,
            stale: |snapshot: &Snapshot, _: &Vec<PostRecord>| {
                has_posts(snapshot)
            },
            requery: async move { cache.fetch_popular(&requery).await },
        }
        .serve(self.cache.fetch_popular(request).await)
        .await
    }

    /// Posts filed under the configured featured category.
    pub async fn fetch_top_picks(
        &self,
        request: &PostListRequest,
    ) -> Revalidation<Vec<PostRecord>> {
        let featured = BTreeSet::from([self.content.featured_category_id]);
        self.fetch_by_term_ids(&featured, request).await
    }

    #[instrument(skip(self))]
    pub async fn fetch_by_term_ids(
        &self,
        term_ids: &BTreeSet<i64>,
        request: &PostListRequest,
    ) -> Revalidation<Vec<PostRecord>> {
        let present_ids = term_ids.clone();
        let stale_ids = term_ids.clone();
        let requery_ids = term_ids.clone();
        let requery = request.clone();
        let cache = self.cache.clone();

        SnapshotLookup {
            shape: "posts_by_term_ids",
            feed: self.feed.clone(),
            writer: self.snapshot_writer(),
            present: move |snapshot: &Snapshot| {
                touches_terms(snapshot, &present_ids)
            },
            stale: move |snapshot: &Snapshot, _: &Vec<PostRecord>| {
                touches_terms(snapshot, &stale_ids)
            },
            requery: async move { cache.fetch_by_term_ids(&requery_ids, &requery).await },
        }
        .serve(self.cache.fetch_by_term_ids(term_ids, request).await)
        .await
    }

    /// Cache-only; search results are never revalidated.
    #[instrument(skip(self))]
    pub async fn search(&self, request: &PostSearchRequest) -> Revalidation<Vec<PostRecord>> {
        Revalidation::settled(self.cache.search(request).await)
    }

    pub fn id_by_slug(&self, slug: &str) -> Option<i64> {
        self.cache.id_by_slug(slug)
    }

    pub fn id_by_url(&self, url: &str) -> Option<i64> {
        let slug = slug_from_url(url).ok()?;
        self.id_by_slug(&slug)
    }

    fn item_request(&self) -> PostItemRequest {
        PostItemRequest {
            taxonomies: self.content.taxonomies.clone(),
            post_meta_keys: self.content.post_meta_keys.clone(),
        }
    }

    fn snapshot_writer(&self) -> SnapshotWriter {
        let cache = self.cache.clone();
        Box::new(move |snapshot: Snapshot| {
            async move { cache.upsert_snapshot(&snapshot).await }.boxed()
        })
    }

    async fn refresh_post(
        &self,
        id: i64,
        request: PostItemRequest,
        cached: ExtendedPost,
    ) -> Option<ExtendedPost> {
        const SHAPE: &str = "post_by_id";

        let fetched = match self.service.fetch(id, &request).await {
            Ok(fetched) => fetched,
            Err(error) => {
                sync::record_failed(SHAPE);
                warn!(post_id = id, error = %error, "background post fetch failed");
                return None;
            }
        };

        if fetched.modified_at() <= cached.modified_at() {
            debug!(post_id = id, "cached post is up to date");
            return None;
        }

        match self.cache.upsert(fetched).await {
            Ok(saved) => {
                sync::record_applied(SHAPE);
                Some(saved)
            }
            Err(error) => {
                sync::record_failed(SHAPE);
                error!(
                    post_id = id,
                    error = %error,
                    "could not save updated post locally from remote"
                );
                None
            }
        }
    }
}

fn has_posts(snapshot: &Snapshot) -> bool {
    !snapshot.posts.is_empty()
}

fn touches_terms(snapshot: &Snapshot, term_ids: &BTreeSet<i64>) -> bool {
    let modified = snapshot.referenced_term_ids();
    term_ids.iter().any(|id| modified.contains(id))
}
