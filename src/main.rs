use std::{
    io::{self, Write},
    process,
    sync::Arc,
};

use cached_pagination::{
    application::{
        engine::QueryError,
        error::AppError,
        pagination::{
            DEFAULT_CURSOR_PARAM, DEFAULT_PAGE_PARAM, Fields, Page, PaginationDescriptor,
            Position, Strategy, resolve_position,
        },
    },
    cache::{CacheConfig, CacheLookup, CacheStore, CachedPaginator, MemoryStore, page_key, tag_for},
    config::{self, Command, FetchArgs, KeyArgs, PageRequestArgs, StrategyArg},
    domain::{query::LogicalQuery, record_set::RecordSet},
    infra::{db::PostgresQueryEngine, error::InfraError, telemetry},
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let causes = error.chain();
    if dispatcher::has_been_set() {
        error!(error = %error, causes = ?causes, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, causes = ?causes, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Key(args) => run_key(&settings, args),
        Command::Fetch(args) => run_fetch(&settings, *args).await,
    }
}

/// A fully resolved page request.
struct PageRequest {
    record_set: RecordSet,
    query: LogicalQuery,
    pagination: PaginationDescriptor,
    fields: Fields,
}

fn build_request(
    settings: &config::Settings,
    args: PageRequestArgs,
) -> Result<PageRequest, AppError> {
    let record_set = RecordSet::new(args.record_set)?.with_per_page(settings.cache.per_page);
    let query = LogicalQuery::new(&args.sql, args.bindings)?;
    let fields = Fields::new(args.fields);
    let page_size = args.per_page.unwrap_or_else(|| record_set.per_page());

    let strategy = match args.strategy {
        StrategyArg::Paginate => Strategy::Offset,
        StrategyArg::SimplePaginate => Strategy::SimpleOffset,
        StrategyArg::CursorPaginate => Strategy::Cursor,
    };
    let param = args.param.unwrap_or_else(|| match strategy {
        Strategy::Cursor => DEFAULT_CURSOR_PARAM.to_string(),
        Strategy::Offset | Strategy::SimpleOffset => DEFAULT_PAGE_PARAM.to_string(),
    });

    let position = match (args.request_query, args.page, args.cursor) {
        (Some(request_query), _, _) => resolve_position(&request_query, &param, strategy),
        (None, Some(page), _) => Position::Page(page),
        (None, None, Some(cursor)) => Position::Cursor(Some(cursor)),
        (None, None, None) => match strategy {
            Strategy::Cursor => Position::Cursor(None),
            Strategy::Offset | Strategy::SimpleOffset => Position::first_page(),
        },
    };

    let pagination = match (strategy, position) {
        (Strategy::Offset, Position::Page(page)) => {
            PaginationDescriptor::offset(page_size, param, page)
        }
        (Strategy::SimpleOffset, Position::Page(page)) => {
            PaginationDescriptor::simple(page_size, param, page)
        }
        (Strategy::Cursor, Position::Cursor(cursor)) => {
            PaginationDescriptor::cursor(page_size, param, cursor)
        }
        (Strategy::Cursor, Position::Page(_)) => {
            return Err(AppError::validation(
                "--page applies to offset strategies; use --cursor",
            ));
        }
        (_, Position::Cursor(_)) => {
            return Err(AppError::validation(
                "--cursor applies to cursor-paginate; use --page",
            ));
        }
    };
    pagination.validate().map_err(QueryError::from)?;

    Ok(PageRequest {
        record_set,
        query,
        pagination,
        fields,
    })
}

fn run_key(settings: &config::Settings, args: KeyArgs) -> Result<(), AppError> {
    let request = build_request(settings, args.request)?;
    let key = page_key(
        &request.query,
        request.record_set.name(),
        &request.pagination,
        &request.fields,
    );
    let tag = tag_for(request.record_set.name());

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "key: {key}").map_err(InfraError::from)?;
    writeln!(stdout, "tag: {tag}").map_err(InfraError::from)?;
    Ok(())
}

#[derive(Serialize)]
struct FetchReport<'a> {
    attempt: u32,
    lookup: &'static str,
    page: &'a Page<serde_json::Value>,
}

async fn run_fetch(settings: &config::Settings, args: FetchArgs) -> Result<(), AppError> {
    let request = build_request(settings, args.request)?;

    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;
    let pool =
        PostgresQueryEngine::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(InfraError::from)?;
    let engine = Arc::new(PostgresQueryEngine::new(pool).with_key_column(args.key_column));

    let cache_config = CacheConfig::from(&settings.cache);
    let store: Arc<dyn CacheStore> = if args.untagged {
        Arc::new(MemoryStore::untagged(&cache_config))
    } else {
        Arc::new(MemoryStore::tagged(&cache_config))
    };
    let paginator = CachedPaginator::new(engine, store, cache_config);

    info!(
        target: "cached_pagination::fetch",
        record_set = request.record_set.name(),
        strategy = %request.pagination.strategy(),
        repeat = args.repeat,
        "Starting fetch"
    );

    let mut stdout = io::stdout().lock();
    for attempt in 1..=args.repeat {
        let (page, lookup) = paginator
            .fetch_with_lookup(
                &request.query,
                &request.record_set,
                &request.pagination,
                &request.fields,
                args.ttl,
            )
            .await?;

        if lookup == CacheLookup::Bypass {
            info!(
                target: "cached_pagination::fetch",
                attempt, "Store has no tag support; page was not cached"
            );
        }

        let report = FetchReport {
            attempt,
            lookup: lookup.as_str(),
            page: &page,
        };
        let line = serde_json::to_string(&report)
            .map_err(|err| AppError::unexpected(format!("failed to encode page: {err}")))?;
        writeln!(stdout, "{line}").map_err(InfraError::from)?;
    }

    Ok(())
}
