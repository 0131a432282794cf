//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroUsize, path::PathBuf, str::FromStr};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{
    CliArgs, Command, ListArgs, Overrides, PostArgs, PostLookup, Scope, TermArgs, TermLookup,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const DEFAULT_TAXONOMIES: [&str; 2] = ["category", "post_tag"];
const DEFAULT_FEATURED_CATEGORY_ID: i64 = 1;
const DEFAULT_SNAPSHOT_LIMIT: usize = 50;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub content: ContentSettings,
    pub seed: SeedSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// What a single-post fetch asks the remote to include.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSettings {
    pub taxonomies: Vec<String>,
    pub post_meta_keys: Vec<String>,
    pub featured_category_id: i64,
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            taxonomies: DEFAULT_TAXONOMIES.iter().map(|name| name.to_string()).collect(),
            post_meta_keys: Vec::new(),
            featured_category_id: DEFAULT_FEATURED_CATEGORY_ID,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SeedSettings {
    /// Seed document backing the remote; `None` runs against an empty remote.
    pub path: Option<PathBuf>,
    pub snapshot_limit: NonZeroUsize,
}

/// Where the local cache is persisted between runs; `None` keeps it in memory only.
#[derive(Debug, Clone, Default)]
pub struct CacheSettings {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("FOLIO")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("content.taxonomies")
            .with_list_parse_key("content.post_meta_keys")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    content: RawContentSettings,
    seed: RawSeedSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(path) = overrides.seed_file.as_ref() {
            self.seed.path = Some(path.clone());
        }
        if let Some(limit) = overrides.snapshot_limit {
            self.seed.snapshot_limit = Some(limit);
        }
        if let Some(path) = overrides.cache_file.as_ref() {
            self.cache.path = Some(path.clone());
        }
        if let Some(id) = overrides.featured_category_id {
            self.content.featured_category_id = Some(id);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            content,
            seed,
            cache,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            content: build_content_settings(content)?,
            seed: build_seed_settings(seed)?,
            cache: CacheSettings {
                path: cache.path.filter(|path| !path.as_os_str().is_empty()),
            },
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_content_settings(content: RawContentSettings) -> Result<ContentSettings, LoadError> {
    let defaults = ContentSettings::default();

    let taxonomies = match content.taxonomies {
        Some(names) => normalized_names(names),
        None => defaults.taxonomies,
    };
    if taxonomies.is_empty() {
        return Err(LoadError::invalid(
            "content.taxonomies",
            "at least one taxonomy is required",
        ));
    }

    let post_meta_keys = content
        .post_meta_keys
        .map(normalized_names)
        .unwrap_or(defaults.post_meta_keys);

    let featured_category_id = content
        .featured_category_id
        .unwrap_or(defaults.featured_category_id);
    if featured_category_id <= 0 {
        return Err(LoadError::invalid(
            "content.featured_category_id",
            "must be greater than zero",
        ));
    }

    Ok(ContentSettings {
        taxonomies,
        post_meta_keys,
        featured_category_id,
    })
}

fn build_seed_settings(seed: RawSeedSettings) -> Result<SeedSettings, LoadError> {
    let path = seed.path.filter(|path| !path.as_os_str().is_empty());

    let snapshot_limit = seed.snapshot_limit.unwrap_or(DEFAULT_SNAPSHOT_LIMIT);
    let snapshot_limit = NonZeroUsize::new(snapshot_limit)
        .ok_or_else(|| LoadError::invalid("seed.snapshot_limit", "must be greater than zero"))?;

    Ok(SeedSettings {
        path,
        snapshot_limit,
    })
}

/// Trim entries and drop blanks and repeats, keeping first-seen order.
fn normalized_names(names: Vec<String>) -> Vec<String> {
    let mut kept: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let trimmed = name.trim();
        if !trimmed.is_empty() && !kept.iter().any(|existing| existing == trimmed) {
            kept.push(trimmed.to_string());
        }
    }
    kept
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawContentSettings {
    taxonomies: Option<Vec<String>>,
    post_meta_keys: Option<Vec<String>>,
    featured_category_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSeedSettings {
    path: Option<PathBuf>,
    snapshot_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    path: Option<PathBuf>,
}
