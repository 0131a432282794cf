//! Content entities held by the cache and served by the remote source.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub link: String,
    pub author_id: i64,
    pub media_id: Option<i64>,
    pub comment_count: i64,
    pub terms: Vec<i64>,
    pub meta: BTreeMap<String, String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modified_at: OffsetDateTime,
}

impl PostRecord {
    pub fn has_any_term(&self, term_ids: &BTreeSet<i64>) -> bool {
        self.terms.iter().any(|id| term_ids.contains(id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRecord {
    pub id: i64,
    pub parent_id: i64,
    pub slug: String,
    pub name: String,
    pub taxonomy: String,
    pub count: i64,
}

/// A post together with the taxonomy terms it references.
///
/// Assembled on every read; only the post and the terms themselves are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedPost {
    pub post: PostRecord,
    pub terms: Vec<TermRecord>,
}

impl ExtendedPost {
    pub fn id(&self) -> i64 {
        self.post.id
    }

    pub fn modified_at(&self) -> OffsetDateTime {
        self.post.modified_at
    }
}

/// Bounded batch of recently changed entities published by the sync feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub posts: Vec<PostRecord>,
    pub terms: Vec<TermRecord>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty() && self.terms.is_empty()
    }

    pub fn contains_post_id(&self, ids: &BTreeSet<i64>) -> bool {
        self.posts.iter().any(|post| ids.contains(&post.id))
    }

    pub fn post_with_slug(&self, slug: &str) -> Option<&PostRecord> {
        self.posts
            .iter()
            .find(|post| super::slug::slugs_match(&post.slug, slug))
    }

    /// Term ids referenced by any post in the snapshot.
    pub fn referenced_term_ids(&self) -> BTreeSet<i64> {
        self.posts
            .iter()
            .flat_map(|post| post.terms.iter().copied())
            .collect()
    }

    pub fn term(&self, id: i64) -> Option<&TermRecord> {
        self.terms.iter().find(|term| term.id == id)
    }

    pub fn term_with_slug(&self, slug: &str) -> Option<&TermRecord> {
        self.terms
            .iter()
            .find(|term| super::slug::slugs_match(&term.slug, slug))
    }
}
