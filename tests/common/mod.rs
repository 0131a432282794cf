//! Fakes and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use time::macros::datetime;

use folio::application::repos::{
    PostItemRequest, PostListRequest, PostSearchRequest, PostsCache, PostsService, SyncFeed,
};
use folio::cache::MemoryStore;
use folio::config::ContentSettings;
use folio::domain::entities::{ExtendedPost, PostRecord, Snapshot, TermRecord};
use folio::domain::error::FetchError;

pub fn base_time() -> OffsetDateTime {
    datetime!(2020-01-15 08:00 UTC)
}

pub fn post(id: i64, slug: &str, modified_at: OffsetDateTime, terms: &[i64]) -> PostRecord {
    PostRecord {
        id,
        slug: slug.to_string(),
        title: format!("Post {id}"),
        content: format!("<p>Body of post {id}</p>"),
        excerpt: format!("Excerpt {id}"),
        link: format!("https://example.org/2020/01/15/{slug}/"),
        author_id: 3,
        media_id: None,
        comment_count: 0,
        terms: terms.to_vec(),
        meta: BTreeMap::new(),
        created_at: base_time(),
        modified_at,
    }
}

pub fn term(id: i64, slug: &str, taxonomy: &str) -> TermRecord {
    TermRecord {
        id,
        parent_id: 0,
        slug: slug.to_string(),
        name: slug.to_uppercase(),
        taxonomy: taxonomy.to_string(),
        count: 1,
    }
}

pub fn extended(post: PostRecord, terms: Vec<TermRecord>) -> ExtendedPost {
    ExtendedPost { post, terms }
}

pub fn content() -> ContentSettings {
    ContentSettings {
        taxonomies: vec!["category".to_string(), "post_tag".to_string()],
        post_meta_keys: vec!["subtitle".to_string()],
        featured_category_id: 5,
    }
}

/// Remote double serving both the point fetch and the snapshot feed.
#[derive(Default)]
pub struct FakeRemote {
    posts: Mutex<HashMap<i64, ExtendedPost>>,
    snapshot: Mutex<Snapshot>,
    service_failure: Mutex<Option<FetchError>>,
    feed_failure: Mutex<Option<FetchError>>,
    last_request: Mutex<Option<PostItemRequest>>,
    service_calls: AtomicUsize,
    feed_calls: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_post(&self, item: ExtendedPost) {
        self.posts
            .lock()
            .expect("posts")
            .insert(item.post.id, item);
    }

    pub fn set_snapshot(&self, snapshot: Snapshot) {
        *self.snapshot.lock().expect("snapshot") = snapshot;
    }

    pub fn fail_service(&self, error: FetchError) {
        *self.service_failure.lock().expect("service failure") = Some(error);
    }

    pub fn fail_feed(&self, error: FetchError) {
        *self.feed_failure.lock().expect("feed failure") = Some(error);
    }

    pub fn service_calls(&self) -> usize {
        self.service_calls.load(Ordering::SeqCst)
    }

    pub fn feed_calls(&self) -> usize {
        self.feed_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<PostItemRequest> {
        self.last_request.lock().expect("last request").clone()
    }
}

#[async_trait]
impl PostsService for FakeRemote {
    async fn fetch(&self, id: i64, request: &PostItemRequest) -> Result<ExtendedPost, FetchError> {
        self.service_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().expect("last request") = Some(request.clone());

        if let Some(error) = self.service_failure.lock().expect("service failure").clone() {
            return Err(error);
        }
        self.posts
            .lock()
            .expect("posts")
            .get(&id)
            .cloned()
            .ok_or(FetchError::NonExistent)
    }
}

#[async_trait]
impl SyncFeed for FakeRemote {
    async fn fetch_snapshot(&self) -> Result<Snapshot, FetchError> {
        self.feed_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.feed_failure.lock().expect("feed failure").clone() {
            return Err(error);
        }
        Ok(self.snapshot.lock().expect("snapshot").clone())
    }
}

/// Post cache that can be told to fail reads or writes.
pub struct FlakyCache {
    pub inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_reads_after_write: AtomicBool,
    written: AtomicBool,
}

impl FlakyCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_reads_after_write: AtomicBool::new(false),
            written: AtomicBool::new(false),
        })
    }

    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Reads succeed until a write goes through this cache, then fail.
    pub fn fail_reads_after_write(&self) {
        self.fail_reads_after_write.store(true, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<(), FetchError> {
        let after_write = self.fail_reads_after_write.load(Ordering::SeqCst)
            && self.written.load(Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) || after_write {
            return Err(FetchError::storage("read refused"));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), FetchError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(FetchError::storage("write refused"));
        }
        self.written.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl PostsCache for FlakyCache {
    async fn fetch(&self, id: i64) -> Result<ExtendedPost, FetchError> {
        self.check_read()?;
        PostsCache::fetch(&self.inner, id).await
    }

    async fn fetch_by_slug(&self, slug: &str) -> Result<PostRecord, FetchError> {
        self.check_read()?;
        PostsCache::fetch_by_slug(&self.inner, slug).await
    }

    async fn fetch_by_ids(&self, ids: &BTreeSet<i64>) -> Result<Vec<PostRecord>, FetchError> {
        self.check_read()?;
        PostsCache::fetch_by_ids(&self.inner, ids).await
    }

    async fn fetch_list(&self, request: &PostListRequest) -> Result<Vec<PostRecord>, FetchError> {
        self.check_read()?;
        self.inner.fetch_list(request).await
    }

    async fn fetch_popular(
        &self,
        request: &PostListRequest,
    ) -> Result<Vec<PostRecord>, FetchError> {
        self.check_read()?;
        self.inner.fetch_popular(request).await
    }

    async fn fetch_by_term_ids(
        &self,
        term_ids: &BTreeSet<i64>,
        request: &PostListRequest,
    ) -> Result<Vec<PostRecord>, FetchError> {
        self.check_read()?;
        self.inner.fetch_by_term_ids(term_ids, request).await
    }

    async fn search(&self, request: &PostSearchRequest) -> Result<Vec<PostRecord>, FetchError> {
        self.check_read()?;
        self.inner.search(request).await
    }

    fn id_by_slug(&self, slug: &str) -> Option<i64> {
        PostsCache::id_by_slug(&self.inner, slug)
    }

    async fn upsert(&self, item: ExtendedPost) -> Result<ExtendedPost, FetchError> {
        self.check_write()?;
        self.inner.upsert(item).await
    }

    async fn upsert_snapshot(&self, snapshot: &Snapshot) -> Result<(), FetchError> {
        self.check_write()?;
        self.inner.upsert_snapshot(snapshot).await
    }
}
