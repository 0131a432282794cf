//! Collaborator traits consumed by the synchronization engine.
//!
//! The cache traits describe the local store, `PostsService` the remote point
//! fetch and `SyncFeed` the bulk recent-changes feed. Every method reports
//! absence through [`FetchError::NonExistent`] so callers can branch on it.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::domain::entities::{ExtendedPost, PostRecord, Snapshot, TermRecord};
use crate::domain::error::FetchError;

/// Request context forwarded to the remote when fetching a single post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostItemRequest {
    pub taxonomies: Vec<String>,
    pub post_meta_keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostOrder {
    #[default]
    Newest,
    Oldest,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PostListRequest {
    pub limit: Option<usize>,
    pub offset: usize,
    pub order: PostOrder,
}

impl PostListRequest {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    #[default]
    All,
    Title,
    Content,
    Terms,
}

impl SearchScope {
    pub fn includes_terms(self) -> bool {
        matches!(self, Self::All | Self::Terms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PostSearchRequest {
    pub query: String,
    pub scope: SearchScope,
    /// Restricts term-name matches to one taxonomy.
    pub taxonomy: Option<String>,
    pub limit: Option<usize>,
}

impl PostSearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait PostsCache: Send + Sync {
    async fn fetch(&self, id: i64) -> Result<ExtendedPost, FetchError>;

    async fn fetch_by_slug(&self, slug: &str) -> Result<PostRecord, FetchError>;

    async fn fetch_by_ids(&self, ids: &BTreeSet<i64>) -> Result<Vec<PostRecord>, FetchError>;

    async fn fetch_list(&self, request: &PostListRequest) -> Result<Vec<PostRecord>, FetchError>;

    async fn fetch_popular(
        &self,
        request: &PostListRequest,
    ) -> Result<Vec<PostRecord>, FetchError>;

    async fn fetch_by_term_ids(
        &self,
        term_ids: &BTreeSet<i64>,
        request: &PostListRequest,
    ) -> Result<Vec<PostRecord>, FetchError>;

    async fn search(&self, request: &PostSearchRequest) -> Result<Vec<PostRecord>, FetchError>;

    fn id_by_slug(&self, slug: &str) -> Option<i64>;

    /// Store the post and the terms it carries, then return the stored value.
    ///
    /// A stored post modified later than `item` is kept.
    async fn upsert(&self, item: ExtendedPost) -> Result<ExtendedPost, FetchError>;

    async fn upsert_snapshot(&self, snapshot: &Snapshot) -> Result<(), FetchError>;
}

#[async_trait]
pub trait TermsCache: Send + Sync {
    async fn fetch(&self, id: i64) -> Result<TermRecord, FetchError>;

    async fn fetch_by_slug(&self, slug: &str) -> Result<TermRecord, FetchError>;

    async fn fetch_by_ids(&self, ids: &BTreeSet<i64>) -> Result<Vec<TermRecord>, FetchError>;

    async fn fetch_all(&self) -> Result<Vec<TermRecord>, FetchError>;

    async fn fetch_by_taxonomy(
        &self,
        taxonomy: &str,
        limit: Option<usize>,
    ) -> Result<Vec<TermRecord>, FetchError>;

    fn id_by_slug(&self, slug: &str) -> Option<i64>;

    async fn upsert_terms(&self, terms: &[TermRecord]) -> Result<(), FetchError>;
}

#[async_trait]
pub trait PostsService: Send + Sync {
    async fn fetch(&self, id: i64, request: &PostItemRequest) -> Result<ExtendedPost, FetchError>;
}

#[async_trait]
pub trait SyncFeed: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<Snapshot, FetchError>;
}
