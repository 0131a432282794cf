use std::{
    collections::BTreeSet,
    io::{self, Write},
    process,
    sync::Arc,
};

use folio::{
    application::{
        error::AppError,
        posts::PostRepository,
        repos::{PostListRequest, PostOrder, PostSearchRequest, SearchScope},
        revalidation::Revalidation,
        terms::TermRepository,
    },
    cache::MemoryStore,
    config::{self, Command, ListArgs, PostLookup, Scope, TermLookup},
    domain::{error::FetchError, slug::slug_from_url},
    infra::{cache_file, error::InfraError, seed::SeedRemote, telemetry},
};
use futures::{StreamExt, pin_mut};
use serde::Serialize;
use tracing::{Dispatch, Level, debug, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    if let Command::Slug { url } = &cli_args.command {
        let slug = slug_from_url(url)?;
        return write_line(&SlugLine {
            url: url.as_str(),
            slug: &slug,
        });
    }

    let store = Arc::new(MemoryStore::new());
    if let Some(path) = settings.cache.path.as_deref() {
        cache_file::restore(path, &store).await?;
    }

    let remote = Arc::new(SeedRemote::from_settings(&settings.seed));
    let posts = PostRepository::new(
        remote.clone(),
        store.clone(),
        remote.clone(),
        settings.content.clone(),
    );
    let terms = TermRepository::new(store.clone(), remote);

    let outcome = match cli_args.command {
        Command::Post(args) => run_post(&posts, args.lookup).await,
        Command::Term(args) => run_term(&terms, args.lookup).await,
        Command::Slug { .. } => Ok(()),
    };

    if let Some(path) = settings.cache.path.as_deref() {
        cache_file::persist(path, &store).await?;
    }
    debug!(
        posts = store.post_count(),
        terms = store.term_count(),
        "cache state after lookup"
    );

    outcome
}

async fn run_post(posts: &PostRepository, lookup: PostLookup) -> Result<(), AppError> {
    match lookup {
        PostLookup::Id { id } => deliver(posts.fetch(id).await).await,
        PostLookup::Slug { slug } => deliver(posts.fetch_by_slug(&slug).await).await,
        PostLookup::Url { url } => deliver(posts.fetch_by_url(&url).await).await,
        PostLookup::Ids { ids } => deliver(posts.fetch_by_ids(&id_set(ids)).await).await,
        PostLookup::List(list) => deliver(posts.fetch_list(&list_request(&list)).await).await,
        PostLookup::Popular(list) => {
            deliver(posts.fetch_popular(&list_request(&list)).await).await
        }
        PostLookup::TopPicks(list) => {
            deliver(posts.fetch_top_picks(&list_request(&list)).await).await
        }
        PostLookup::Terms { ids, list } => {
            let request = list_request(&list);
            deliver(posts.fetch_by_term_ids(&id_set(ids), &request).await).await
        }
        PostLookup::Search {
            query,
            scope,
            taxonomy,
            limit,
        } => {
            let request = PostSearchRequest {
                query,
                scope: search_scope(scope),
                taxonomy,
                limit,
            };
            deliver(posts.search(&request).await).await
        }
    }
}

async fn run_term(terms: &TermRepository, lookup: TermLookup) -> Result<(), AppError> {
    match lookup {
        TermLookup::Id { id } => deliver(terms.fetch(id).await).await,
        TermLookup::Slug { slug } => deliver(terms.fetch_by_slug(&slug).await).await,
        TermLookup::Url { url } => deliver(terms.fetch_by_url(&url).await).await,
        TermLookup::Ids { ids } => deliver(terms.fetch_by_ids(&id_set(ids)).await).await,
        TermLookup::All => deliver(terms.fetch_all().await).await,
        TermLookup::Taxonomy { taxonomy, limit } => {
            deliver(terms.fetch_by_taxonomy(&taxonomy, limit).await).await
        }
    }
}

/// Print every delivery of `lookup` as it arrives; fails when any delivery
/// carried an error.
async fn deliver<T: Serialize>(lookup: Revalidation<T>) -> Result<(), AppError> {
    let deliveries = lookup.into_stream().enumerate();
    pin_mut!(deliveries);

    let mut outcome = Ok(());
    while let Some((index, result)) = deliveries.next().await {
        let delivery = if index == 0 { "initial" } else { "refreshed" };
        write_line(&DeliveryLine::new(delivery, &result))?;

        if let Err(error) = result {
            outcome = Err(AppError::from(error));
        }
    }
    outcome
}

fn write_line(line: &impl Serialize) -> Result<(), AppError> {
    let json = serde_json::to_string(line).map_err(InfraError::from)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}").map_err(InfraError::from)?;
    Ok(())
}

#[derive(Serialize)]
struct DeliveryLine<'a, T> {
    delivery: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a, T> DeliveryLine<'a, T> {
    fn new(delivery: &'static str, result: &'a Result<T, FetchError>) -> Self {
        match result {
            Ok(value) => Self {
                delivery,
                value: Some(value),
                error: None,
            },
            Err(error) => Self {
                delivery,
                value: None,
                error: Some(error.to_string()),
            },
        }
    }
}

#[derive(Serialize)]
struct SlugLine<'a> {
    url: &'a str,
    slug: &'a str,
}

fn id_set(ids: Vec<i64>) -> BTreeSet<i64> {
    ids.into_iter().collect()
}

fn list_request(args: &ListArgs) -> PostListRequest {
    PostListRequest {
        limit: args.limit,
        offset: args.offset,
        order: if args.oldest {
            PostOrder::Oldest
        } else {
            PostOrder::Newest
        },
    }
}

fn search_scope(scope: Scope) -> SearchScope {
    match scope {
        Scope::All => SearchScope::All,
        Scope::Title => SearchScope::Title,
        Scope::Content => SearchScope::Content,
        Scope::Terms => SearchScope::Terms,
    }
}
