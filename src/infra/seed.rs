//! Remote source backed by a JSON seed document on disk.
//!
//! The document is re-read on every call so edits show up as remote changes
//! on the next revalidation.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use folio_api_types::{PostPayload, SeedPayload, TermPayload};
use tracing::{debug, instrument};

use crate::application::repos::{PostItemRequest, PostsService, SyncFeed};
use crate::config::SeedSettings;
use crate::domain::entities::{ExtendedPost, PostRecord, Snapshot, TermRecord};
use crate::domain::error::FetchError;

#[derive(Debug, Clone)]
pub struct SeedRemote {
    path: Option<PathBuf>,
    snapshot_limit: NonZeroUsize,
}

impl SeedRemote {
    pub fn new(path: Option<PathBuf>, snapshot_limit: NonZeroUsize) -> Self {
        Self {
            path,
            snapshot_limit,
        }
    }

    pub fn from_settings(settings: &SeedSettings) -> Self {
        Self::new(settings.path.clone(), settings.snapshot_limit)
    }

    async fn load(&self) -> Result<SeedPayload, FetchError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(SeedPayload::default());
        };

        let body = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| seed_error(path, "read", err))?;
        SeedPayload::from_json(&body).map_err(|err| seed_error(path, "decode", err))
    }
}

fn seed_error(path: &Path, action: &str, err: impl std::fmt::Display) -> FetchError {
    FetchError::transport(format!(
        "failed to {action} seed `{}`: {err}",
        path.display()
    ))
}

#[async_trait]
impl PostsService for SeedRemote {
    #[instrument(skip(self, request))]
    async fn fetch(&self, id: i64, request: &PostItemRequest) -> Result<ExtendedPost, FetchError> {
        let seed = self.load().await?;
        let payload = seed
            .posts
            .into_iter()
            .find(|post| post.id == id)
            .ok_or(FetchError::NonExistent)?;

        let included: Vec<TermRecord> = seed
            .terms
            .into_iter()
            .filter(|term| payload.terms.contains(&term.id))
            .filter(|term| {
                request
                    .taxonomies
                    .iter()
                    .any(|taxonomy| taxonomy.eq_ignore_ascii_case(&term.taxonomy))
            })
            .map(TermRecord::from)
            .collect();

        let mut post = PostRecord::from(payload);
        post.terms.retain(|id| included.iter().any(|term| term.id == *id));
        post.meta
            .retain(|key, _| request.post_meta_keys.iter().any(|wanted| wanted == key));

        // Keep the post's own term order.
        let terms = post
            .terms
            .iter()
            .filter_map(|id| included.iter().find(|term| term.id == *id).cloned())
            .collect();

        debug!(post_id = id, "served post from seed");
        Ok(ExtendedPost { post, terms })
    }
}

#[async_trait]
impl SyncFeed for SeedRemote {
    #[instrument(skip(self))]
    async fn fetch_snapshot(&self) -> Result<Snapshot, FetchError> {
        let seed = self.load().await?;

        let mut posts: Vec<PostRecord> = seed.posts.into_iter().map(PostRecord::from).collect();
        posts.sort_by(|a, b| b.modified_at.cmp(&a.modified_at).then(b.id.cmp(&a.id)));
        posts.truncate(self.snapshot_limit.get());

        let terms: Vec<TermRecord> = seed.terms.into_iter().map(TermRecord::from).collect();

        debug!(
            posts = posts.len(),
            terms = terms.len(),
            "served snapshot from seed"
        );
        Ok(Snapshot { posts, terms })
    }
}

impl From<PostPayload> for PostRecord {
    fn from(payload: PostPayload) -> Self {
        Self {
            id: payload.id,
            slug: payload.slug,
            title: payload.title,
            content: payload.content,
            excerpt: payload.excerpt,
            link: payload.link,
            author_id: payload.author,
            media_id: payload.featured_media,
            comment_count: payload.comment_count,
            terms: payload.terms,
            meta: payload.meta,
            created_at: payload.created,
            modified_at: payload.modified,
        }
    }
}

impl From<TermPayload> for TermRecord {
    fn from(payload: TermPayload) -> Self {
        Self {
            id: payload.id,
            parent_id: payload.parent,
            slug: payload.slug,
            name: payload.name,
            taxonomy: payload.taxonomy,
            count: payload.count,
        }
    }
}
