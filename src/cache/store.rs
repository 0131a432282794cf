//! In-process cache backing the content repositories.
//!
//! Posts and terms live in separate tables, each keyed by id with a
//! case-insensitive slug index. Extended posts are assembled on read from the
//! post row and whatever of its terms the term table currently holds.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use crate::application::repos::{
    PostListRequest, PostOrder, PostSearchRequest, PostsCache, SearchScope, TermsCache,
};
use crate::domain::entities::{ExtendedPost, PostRecord, Snapshot, TermRecord};
use crate::domain::error::FetchError;
use crate::domain::slug::slug_key;

use super::lock::{rw_read, rw_write};

trait Row: Clone {
    fn id(&self) -> i64;
    fn slug(&self) -> &str;

    /// Whether this row may replace `stored`.
    fn supersedes(&self, _stored: &Self) -> bool {
        true
    }
}

impl Row for PostRecord {
    fn id(&self) -> i64 {
        self.id
    }

    fn slug(&self) -> &str {
        &self.slug
    }

    // modified_at never moves backwards for an id.
    fn supersedes(&self, stored: &Self) -> bool {
        self.modified_at >= stored.modified_at
    }
}

impl Row for TermRecord {
    fn id(&self) -> i64 {
        self.id
    }

    fn slug(&self) -> &str {
        &self.slug
    }
}

struct Table<R> {
    rows: HashMap<i64, R>,
    ids_by_slug: HashMap<String, i64>,
}

impl<R> Default for Table<R> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            ids_by_slug: HashMap::new(),
        }
    }
}

impl<R: Row> Table<R> {
    /// Store `row` unless the stored row with its id supersedes it.
    /// Returns whether the row was written.
    fn put(&mut self, row: R) -> bool {
        let id = row.id();
        if let Some(previous) = self.rows.get(&id) {
            if !row.supersedes(previous) {
                return false;
            }
            let previous_key = slug_key(previous.slug());
            if self.ids_by_slug.get(&previous_key) == Some(&id) {
                self.ids_by_slug.remove(&previous_key);
            }
        }

        self.ids_by_slug.insert(slug_key(row.slug()), id);
        self.rows.insert(id, row);
        true
    }

    fn get(&self, id: i64) -> Option<&R> {
        self.rows.get(&id)
    }

    fn id_by_slug(&self, slug: &str) -> Option<i64> {
        self.ids_by_slug.get(&slug_key(slug)).copied()
    }

    fn by_slug(&self, slug: &str) -> Option<&R> {
        self.id_by_slug(slug).and_then(|id| self.rows.get(&id))
    }

    fn select(&self, mut keep: impl FnMut(&R) -> bool) -> Vec<R> {
        self.rows.values().filter(|&row| keep(row)).cloned().collect()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    posts: RwLock<Table<PostRecord>>,
    terms: RwLock<Table<TermRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post_count(&self) -> usize {
        rw_read(&self.posts, "posts", "post_count").rows.len()
    }

    pub fn term_count(&self) -> usize {
        rw_read(&self.terms, "terms", "term_count").rows.len()
    }

    /// Every stored row, ordered by id.
    pub fn dump(&self) -> Snapshot {
        let mut posts = rw_read(&self.posts, "posts", "dump").select(|_| true);
        posts.sort_by_key(|post| post.id);
        let mut terms = rw_read(&self.terms, "terms", "dump").select(|_| true);
        terms.sort_by_key(|term| term.id);
        Snapshot { posts, terms }
    }

    fn extend(post: &PostRecord, terms: &Table<TermRecord>) -> ExtendedPost {
        ExtendedPost {
            post: post.clone(),
            terms: post
                .terms
                .iter()
                .filter_map(|id| terms.get(*id).cloned())
                .collect(),
        }
    }
}

fn sort_posts(posts: &mut [PostRecord], order: PostOrder) {
    match order {
        PostOrder::Newest => posts.sort_by_key(|post| Reverse((post.created_at, post.id))),
        PostOrder::Oldest => posts.sort_by_key(|post| (post.created_at, post.id)),
    }
}

fn paginate<R>(rows: Vec<R>, offset: usize, limit: Option<usize>) -> Vec<R> {
    let rows = rows.into_iter().skip(offset);
    match limit {
        Some(limit) => rows.take(limit).collect(),
        None => rows.collect(),
    }
}

fn contains_folded(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

#[async_trait]
impl PostsCache for MemoryStore {
    async fn fetch(&self, id: i64) -> Result<ExtendedPost, FetchError> {
        let posts = rw_read(&self.posts, "posts", "fetch");
        let post = posts.get(id).ok_or(FetchError::NonExistent)?;
        let terms = rw_read(&self.terms, "terms", "fetch");
        Ok(Self::extend(post, &terms))
    }

    async fn fetch_by_slug(&self, slug: &str) -> Result<PostRecord, FetchError> {
        rw_read(&self.posts, "posts", "fetch_by_slug")
            .by_slug(slug)
            .cloned()
            .ok_or(FetchError::NonExistent)
    }

    async fn fetch_by_ids(&self, ids: &BTreeSet<i64>) -> Result<Vec<PostRecord>, FetchError> {
        let mut found = rw_read(&self.posts, "posts", "fetch_by_ids")
            .select(|post| ids.contains(&post.id));
        if found.is_empty() {
            return Err(FetchError::NonExistent);
        }

        sort_posts(&mut found, PostOrder::Newest);
        Ok(found)
    }

    async fn fetch_list(&self, request: &PostListRequest) -> Result<Vec<PostRecord>, FetchError> {
        let mut posts = rw_read(&self.posts, "posts", "fetch_list").select(|_| true);
        if posts.is_empty() {
            return Err(FetchError::NonExistent);
        }

        sort_posts(&mut posts, request.order);
        Ok(paginate(posts, request.offset, request.limit))
    }

    async fn fetch_popular(
        &self,
        request: &PostListRequest,
    ) -> Result<Vec<PostRecord>, FetchError> {
        let mut posts = rw_read(&self.posts, "posts", "fetch_popular").select(|_| true);
        if posts.is_empty() {
            return Err(FetchError::NonExistent);
        }

        sort_posts(&mut posts, PostOrder::Newest);
        posts.sort_by_key(|post| Reverse(post.comment_count));
        Ok(paginate(posts, request.offset, request.limit))
    }

    async fn fetch_by_term_ids(
        &self,
        term_ids: &BTreeSet<i64>,
        request: &PostListRequest,
    ) -> Result<Vec<PostRecord>, FetchError> {
        let mut posts = rw_read(&self.posts, "posts", "fetch_by_term_ids")
            .select(|post| post.has_any_term(term_ids));
        if posts.is_empty() {
            return Err(FetchError::NonExistent);
        }

        sort_posts(&mut posts, request.order);
        Ok(paginate(posts, request.offset, request.limit))
    }

    async fn search(&self, request: &PostSearchRequest) -> Result<Vec<PostRecord>, FetchError> {
        let needle = request.query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let scope = request.scope;
        let posts = rw_read(&self.posts, "posts", "search");
        let terms = rw_read(&self.terms, "terms", "search");

        let matching_terms: BTreeSet<i64> = if scope.includes_terms() {
            terms
                .select(|term| {
                    request
                        .taxonomy
                        .as_deref()
                        .is_none_or(|taxonomy| term.taxonomy.eq_ignore_ascii_case(taxonomy))
                        && contains_folded(&term.name, &needle)
                })
                .into_iter()
                .map(|term| term.id)
                .collect()
        } else {
            BTreeSet::new()
        };

        let mut found = posts.select(|post| {
            let text = match scope {
                SearchScope::Title => contains_folded(&post.title, &needle),
                SearchScope::Content => {
                    contains_folded(&post.content, &needle)
                        || contains_folded(&post.excerpt, &needle)
                }
                SearchScope::All => {
                    contains_folded(&post.title, &needle)
                        || contains_folded(&post.excerpt, &needle)
                        || contains_folded(&post.content, &needle)
                }
                SearchScope::Terms => false,
            };
            text || post.has_any_term(&matching_terms)
        });

        sort_posts(&mut found, PostOrder::Newest);
        Ok(paginate(found, 0, request.limit))
    }

    fn id_by_slug(&self, slug: &str) -> Option<i64> {
        rw_read(&self.posts, "posts", "id_by_slug").id_by_slug(slug)
    }

    async fn upsert(&self, item: ExtendedPost) -> Result<ExtendedPost, FetchError> {
        let id = item.id();
        let mut posts = rw_write(&self.posts, "posts", "upsert");
        let mut terms = rw_write(&self.terms, "terms", "upsert");

        for term in item.terms {
            terms.put(term);
        }
        if posts.put(item.post) {
            debug!(post_id = id, "stored post");
        } else {
            debug!(post_id = id, "kept newer stored post");
        }

        let post = posts.get(id).ok_or_else(|| {
            FetchError::storage(format!("post {id} missing right after it was stored"))
        })?;
        Ok(Self::extend(post, &terms))
    }

    async fn upsert_snapshot(&self, snapshot: &Snapshot) -> Result<(), FetchError> {
        let mut posts = rw_write(&self.posts, "posts", "upsert_snapshot");
        let mut terms = rw_write(&self.terms, "terms", "upsert_snapshot");

        for term in &snapshot.terms {
            terms.put(term.clone());
        }
        let skipped = snapshot
            .posts
            .iter()
            .filter(|post| !posts.put((*post).clone()))
            .count();

        debug!(
            posts = snapshot.posts.len(),
            skipped,
            terms = snapshot.terms.len(),
            "stored snapshot"
        );
        Ok(())
    }
}

#[async_trait]
impl TermsCache for MemoryStore {
    async fn fetch(&self, id: i64) -> Result<TermRecord, FetchError> {
        rw_read(&self.terms, "terms", "fetch")
            .get(id)
            .cloned()
            .ok_or(FetchError::NonExistent)
    }

    async fn fetch_by_slug(&self, slug: &str) -> Result<TermRecord, FetchError> {
        rw_read(&self.terms, "terms", "fetch_by_slug")
            .by_slug(slug)
            .cloned()
            .ok_or(FetchError::NonExistent)
    }

    async fn fetch_by_ids(&self, ids: &BTreeSet<i64>) -> Result<Vec<TermRecord>, FetchError> {
        let mut found = rw_read(&self.terms, "terms", "fetch_by_ids")
            .select(|term| ids.contains(&term.id));
        if found.is_empty() {
            return Err(FetchError::NonExistent);
        }

        found.sort_by_key(|term| term.id);
        Ok(found)
    }

    async fn fetch_all(&self) -> Result<Vec<TermRecord>, FetchError> {
        let mut terms = rw_read(&self.terms, "terms", "fetch_all").select(|_| true);
        if terms.is_empty() {
            return Err(FetchError::NonExistent);
        }

        terms.sort_by(|a, b| a.taxonomy.cmp(&b.taxonomy).then(a.name.cmp(&b.name)));
        Ok(terms)
    }

    async fn fetch_by_taxonomy(
        &self,
        taxonomy: &str,
        limit: Option<usize>,
    ) -> Result<Vec<TermRecord>, FetchError> {
        let mut terms = rw_read(&self.terms, "terms", "fetch_by_taxonomy")
            .select(|term| term.taxonomy.eq_ignore_ascii_case(taxonomy));
        if terms.is_empty() {
            return Err(FetchError::NonExistent);
        }

        // Most used first.
        terms.sort_by(|a, b| b.count.cmp(&a.count).then(a.name.cmp(&b.name)));
        Ok(paginate(terms, 0, limit))
    }

    fn id_by_slug(&self, slug: &str) -> Option<i64> {
        rw_read(&self.terms, "terms", "id_by_slug").id_by_slug(slug)
    }

    async fn upsert_terms(&self, terms: &[TermRecord]) -> Result<(), FetchError> {
        let mut table = rw_write(&self.terms, "terms", "upsert_terms");
        for term in terms {
            table.put(term.clone());
        }

        debug!(terms = terms.len(), "stored terms");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use time::macros::datetime;
    use time::{Duration, OffsetDateTime};

    use super::*;

    fn post(id: i64, slug: &str, terms: &[i64], created_at: OffsetDateTime) -> PostRecord {
        PostRecord {
            id,
            slug: slug.to_string(),
            title: format!("Post {id}"),
            content: format!("Body of post {id}"),
            excerpt: String::new(),
            link: format!("https://example.org/{slug}/"),
            author_id: 1,
            media_id: None,
            comment_count: 0,
            terms: terms.to_vec(),
            meta: BTreeMap::new(),
            created_at,
            modified_at: created_at,
        }
    }

    fn term(id: i64, slug: &str, taxonomy: &str) -> TermRecord {
        TermRecord {
            id,
            parent_id: 0,
            slug: slug.to_string(),
            name: slug.replace('-', " "),
            taxonomy: taxonomy.to_string(),
            count: 0,
        }
    }

    fn base() -> OffsetDateTime {
        datetime!(2021-03-01 12:00 UTC)
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .upsert_snapshot(&Snapshot {
                posts: vec![
                    post(1, "first", &[10], base()),
                    post(2, "second", &[10, 11], base() + Duration::days(1)),
                    post(3, "third", &[11], base() + Duration::days(2)),
                ],
                terms: vec![term(10, "news", "category"), term(11, "rust", "post_tag")],
            })
            .await
            .expect("seed");
        store
    }

    #[tokio::test]
    async fn upsert_returns_the_stored_post_with_terms() {
        let store = MemoryStore::new();
        let item = ExtendedPost {
            post: post(7, "hello", &[3, 4], base()),
            terms: vec![term(3, "news", "category"), term(4, "rust", "post_tag")],
        };

        let saved = store.upsert(item.clone()).await.expect("upsert");
        assert_eq!(saved, item);
        assert_eq!(PostsCache::fetch(&store, 7).await, Ok(item));
    }

    #[tokio::test]
    async fn older_upsert_keeps_the_newer_stored_post() {
        let store = MemoryStore::new();
        let newer = ExtendedPost {
            post: post(7, "hello", &[], base() + Duration::hours(5)),
            terms: Vec::new(),
        };
        store.upsert(newer.clone()).await.expect("upsert newer");

        let mut older = post(7, "renamed", &[], base());
        older.title = "Older".to_string();
        let saved = store
            .upsert(ExtendedPost {
                post: older,
                terms: Vec::new(),
            })
            .await
            .expect("upsert older");

        assert_eq!(saved, newer);
        assert_eq!(PostsCache::id_by_slug(&store, "hello"), Some(7));
        assert_eq!(PostsCache::id_by_slug(&store, "renamed"), None);
    }

    #[tokio::test]
    async fn lagging_snapshot_does_not_roll_posts_back() {
        let store = seeded().await;
        let mut lagging = post(3, "third", &[11], base() - Duration::days(1));
        lagging.title = "Stale".to_string();

        store
            .upsert_snapshot(&Snapshot {
                posts: vec![lagging, post(4, "fourth", &[], base())],
                terms: Vec::new(),
            })
            .await
            .expect("snapshot");

        let kept = PostsCache::fetch(&store, 3).await.expect("post 3");
        assert_eq!(kept.post.title, "Post 3");
        assert_eq!(kept.post.modified_at, base() + Duration::days(2));
        assert_eq!(store.post_count(), 4);
    }

    #[tokio::test]
    async fn unknown_terms_are_skipped_on_read() {
        let store = MemoryStore::new();
        let saved = store
            .upsert(ExtendedPost {
                post: post(1, "a", &[99], base()),
                terms: Vec::new(),
            })
            .await
            .expect("upsert");
        assert!(saved.terms.is_empty());
    }

    #[tokio::test]
    async fn slug_index_follows_renames() {
        let store = seeded().await;
        let mut renamed = post(1, "renamed", &[10], base());
        renamed.title = "Renamed".to_string();
        store
            .upsert(ExtendedPost {
                post: renamed,
                terms: Vec::new(),
            })
            .await
            .expect("upsert");

        assert_eq!(PostsCache::id_by_slug(&store, "RENAMED"), Some(1));
        assert_eq!(PostsCache::id_by_slug(&store, "first"), None);
        assert_eq!(
            PostsCache::fetch_by_slug(&store, "first").await,
            Err(FetchError::NonExistent)
        );
    }

    #[tokio::test]
    async fn empty_store_reports_absence() {
        let store = MemoryStore::new();
        assert_eq!(
            store.fetch_list(&PostListRequest::default()).await,
            Err(FetchError::NonExistent)
        );
        assert_eq!(
            PostsCache::fetch_by_ids(&store, &BTreeSet::from([1])).await,
            Err(FetchError::NonExistent)
        );
        assert_eq!(store.fetch_all().await, Err(FetchError::NonExistent));
    }

    #[tokio::test]
    async fn list_orders_and_pages() {
        let store = seeded().await;

        let newest = store
            .fetch_list(&PostListRequest::with_limit(2))
            .await
            .expect("list");
        assert_eq!(newest.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3, 2]);

        let oldest = store
            .fetch_list(&PostListRequest {
                limit: Some(2),
                offset: 1,
                order: PostOrder::Oldest,
            })
            .await
            .expect("list");
        assert_eq!(oldest.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[tokio::test]
    async fn popular_ranks_by_comments() {
        let store = seeded().await;
        let mut busy = post(1, "first", &[10], base());
        busy.comment_count = 12;
        store
            .upsert(ExtendedPost {
                post: busy,
                terms: Vec::new(),
            })
            .await
            .expect("upsert");

        let popular = store
            .fetch_popular(&PostListRequest::default())
            .await
            .expect("popular");
        assert_eq!(popular.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 3, 2]);
    }

    #[tokio::test]
    async fn term_filter_matches_any_listed_term() {
        let store = seeded().await;
        let found = store
            .fetch_by_term_ids(&BTreeSet::from([10]), &PostListRequest::default())
            .await
            .expect("by terms");
        assert_eq!(found.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[tokio::test]
    async fn search_covers_text_and_term_names() {
        let store = seeded().await;

        let by_title = store
            .search(&PostSearchRequest {
                query: "post 2".to_string(),
                scope: SearchScope::Title,
                ..Default::default()
            })
            .await
            .expect("search");
        assert_eq!(by_title.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2]);

        let by_term = store
            .search(&PostSearchRequest {
                query: "RUST".to_string(),
                scope: SearchScope::Terms,
                taxonomy: Some("post_tag".to_string()),
                limit: None,
            })
            .await
            .expect("search");
        assert_eq!(by_term.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3, 2]);

        let blank = store.search(&PostSearchRequest::new("  ")).await;
        assert_eq!(blank, Ok(Vec::new()));
    }

    #[tokio::test]
    async fn taxonomy_lookup_ranks_by_usage() {
        let store = MemoryStore::new();
        let mut popular = term(2, "popular", "category");
        popular.count = 9;
        store
            .upsert_terms(&[
                term(1, "quiet", "category"),
                popular,
                term(3, "tagged", "post_tag"),
            ])
            .await
            .expect("terms");

        let found = store
            .fetch_by_taxonomy("Category", Some(5))
            .await
            .expect("taxonomy");
        assert_eq!(found.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(TermsCache::id_by_slug(&store, "Tagged"), Some(3));
        assert_eq!(store.term_count(), 3);
    }
}
