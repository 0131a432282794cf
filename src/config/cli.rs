use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the folio binary.
#[derive(Debug, Parser)]
#[command(
    name = "folio",
    version,
    about = "Stale-while-revalidate lookups over a cached content store"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FOLIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the seed document served as the remote source.
    #[arg(long = "seed-file", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub seed_file: Option<PathBuf>,

    /// Persist the local cache to this file between runs.
    #[arg(long = "cache-file", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub cache_file: Option<PathBuf>,

    /// Override how many recently modified posts the sync feed publishes.
    #[arg(long = "snapshot-limit", value_name = "COUNT")]
    pub snapshot_limit: Option<usize>,

    /// Override the featured category used for top picks.
    #[arg(long = "featured-category", value_name = "ID")]
    pub featured_category_id: Option<i64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Look up posts.
    Post(PostArgs),
    /// Look up taxonomy terms.
    Term(TermArgs),
    /// Print the slug a permalink resolves to.
    Slug {
        #[arg(value_name = "URL")]
        url: String,
    },
}

#[derive(Debug, Args, Clone)]
pub struct PostArgs {
    #[command(subcommand)]
    pub lookup: PostLookup,
}

#[derive(Debug, Subcommand, Clone)]
pub enum PostLookup {
    /// A single post with its terms.
    Id { id: i64 },
    Slug { slug: String },
    Url { url: String },
    /// Posts whose id is in the given set.
    Ids {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<i64>,
    },
    List(ListArgs),
    Popular(ListArgs),
    /// Posts filed under the featured category.
    #[command(name = "top-picks")]
    TopPicks(ListArgs),
    /// Posts carrying any of the given term ids.
    Terms {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<i64>,

        #[command(flatten)]
        list: ListArgs,
    },
    /// Search the local cache only.
    Search {
        query: String,

        #[arg(long, value_enum, default_value_t = Scope::All)]
        scope: Scope,

        /// Restrict term-name matches to one taxonomy.
        #[arg(long)]
        taxonomy: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Debug, Args, Clone)]
pub struct TermArgs {
    #[command(subcommand)]
    pub lookup: TermLookup,
}

#[derive(Debug, Subcommand, Clone)]
pub enum TermLookup {
    Id { id: i64 },
    Slug { slug: String },
    Url { url: String },
    Ids {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<i64>,
    },
    All,
    Taxonomy {
        taxonomy: String,

        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Debug, Args, Default, Clone)]
pub struct ListArgs {
    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Oldest first instead of newest first.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub oldest: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scope {
    All,
    Title,
    Content,
    Terms,
}
