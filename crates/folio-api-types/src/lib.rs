//! Payloads served by the remote content source.
//!
//! A seed document carries every post and taxonomy term the remote knows
//! about. Timestamps are RFC 3339 strings on the wire.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedPayload {
    pub posts: Vec<PostPayload>,
    pub terms: Vec<TermPayload>,
}

impl SeedPayload {
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostPayload {
    pub id: i64,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub author: i64,
    #[serde(default)]
    pub featured_media: Option<i64>,
    #[serde(default)]
    pub comment_count: i64,
    #[serde(default)]
    pub terms: Vec<i64>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modified: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermPayload {
    pub id: i64,
    #[serde(default)]
    pub parent: i64,
    pub slug: String,
    pub name: String,
    pub taxonomy: String,
    #[serde(default)]
    pub count: i64,
}
