use std::num::{NonZeroU32, NonZeroU64};
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand, ValueEnum, builder::BoolishValueParser};

use crate::domain::query::BindValue;

/// Command-line arguments for the cached-pagination binary.
#[derive(Debug, Parser)]
#[command(
    name = "cached-pagination",
    version,
    about = "Tag-scoped caching of paginated query results"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "CACHED_PAGINATION_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the cache key and tag a page request resolves to.
    Key(KeyArgs),
    /// Fetch a page from Postgres through the page cache.
    Fetch(Box<FetchArgs>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Offset pagination with a total count.
    Paginate,
    /// Offset pagination without a total count.
    SimplePaginate,
    /// Keyset pagination addressed by a cursor token.
    CursorPaginate,
}

/// Describes one page request.
#[derive(Debug, Args, Clone)]
pub struct PageRequestArgs {
    /// Record set (table or collection) the query reads from.
    #[arg(long = "record-set", value_name = "NAME")]
    pub record_set: String,

    /// Query text without LIMIT/OFFSET.
    #[arg(long = "sql", value_name = "SQL")]
    pub sql: String,

    /// Positional binding as `kind:value` (int, float, bool, text) or `null`; repeatable.
    #[arg(long = "bind", value_name = "KIND:VALUE", value_parser = BindValue::from_str)]
    pub bindings: Vec<BindValue>,

    #[arg(long, value_enum, default_value_t = StrategyArg::Paginate)]
    pub strategy: StrategyArg,

    /// Page size; defaults to the configured per-page value.
    #[arg(long = "per-page", value_name = "COUNT")]
    pub per_page: Option<NonZeroU32>,

    /// Position parameter name; `page` or `cursor` by default.
    #[arg(long = "param", value_name = "NAME")]
    pub param: Option<String>,

    /// Page number for offset strategies.
    #[arg(long, value_name = "N", conflicts_with = "cursor")]
    pub page: Option<NonZeroU64>,

    /// Cursor token for the cursor strategy.
    #[arg(long, value_name = "TOKEN")]
    pub cursor: Option<String>,

    /// Resolve the position from a request query string such as `page=2&sort=name`.
    #[arg(
        long = "request-query",
        value_name = "QUERY",
        conflicts_with_all = ["page", "cursor"]
    )]
    pub request_query: Option<String>,

    /// Comma-separated column selection.
    #[arg(long, value_name = "COLUMNS", value_delimiter = ',')]
    pub fields: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct KeyArgs {
    #[command(flatten)]
    pub request: PageRequestArgs,
}

#[derive(Debug, Args, Clone)]
pub struct FetchArgs {
    #[command(flatten)]
    pub request: PageRequestArgs,

    #[command(flatten)]
    pub overrides: FetchOverrides,

    /// Number of times to fetch the page.
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..))]
    pub repeat: u32,

    /// Column used for keyset pagination.
    #[arg(long = "key-column", value_name = "COLUMN", default_value = "id")]
    pub key_column: String,

    /// Call-time TTL such as `90s` or `15m`, overriding the configured default.
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub ttl: Option<std::time::Duration>,

    /// Serve pages without tag support, so every fetch reaches the database.
    #[arg(long = "untagged", action = clap::ArgAction::SetTrue)]
    pub untagged: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct FetchOverrides {
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

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the default cache TTL (seconds or a duration such as `30m`).
    #[arg(long = "cache-ttl", value_name = "DURATION")]
    pub cache_ttl: Option<String>,

    /// Override the in-memory page store capacity.
    #[arg(long = "cache-capacity", value_name = "COUNT")]
    pub cache_capacity: Option<usize>,

    /// Override the default page size.
    #[arg(long = "cache-per-page", value_name = "COUNT")]
    pub cache_per_page: Option<u32>,

    /// Flush cached pages when a record is created.
    #[arg(
        long = "cache-clear-on-create",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_clear_on_create: Option<bool>,

    /// Flush cached pages when a record is updated.
    #[arg(
        long = "cache-clear-on-update",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_clear_on_update: Option<bool>,

    /// Flush cached pages when a record is deleted.
    #[arg(
        long = "cache-clear-on-delete",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_clear_on_delete: Option<bool>,
}
