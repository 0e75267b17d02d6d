//! Cached read path.
//!
//! [`CachedPaginator`] composes a [`QueryEngine`] with a [`CacheStore`].
//! Stores without tag support are bypassed entirely: a page that cannot be
//! invalidated selectively is never cached.

use std::future::Future;
use std::num::{NonZeroU32, NonZeroU64};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use metrics::{counter, histogram};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::application::engine::{QueryEngine, QueryError};
use crate::application::pagination::{
    DEFAULT_CURSOR_PARAM, DEFAULT_PAGE_PARAM, Fields, Page, PaginationDescriptor,
};
use crate::domain::query::LogicalQuery;
use crate::domain::record_set::RecordSet;

use super::config::CacheConfig;
use super::keys::{CacheKey, RecordSetTag, page_key, tag_for};
use super::store::{CacheStore, StoreError, TaggedCache};

pub(crate) const METRIC_HIT_TOTAL: &str = "cached_pagination_hit_total";
pub(crate) const METRIC_MISS_TOTAL: &str = "cached_pagination_miss_total";
pub(crate) const METRIC_BYPASS_TOTAL: &str = "cached_pagination_bypass_total";
pub(crate) const METRIC_COMPUTE_MS: &str = "cached_pagination_compute_ms";

#[derive(Debug, Error)]
pub enum PaginateError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How a page was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    Hit,
    Miss,
    /// The store has no tag support; the engine ran without caching.
    Bypass,
}

impl CacheLookup {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheLookup::Hit => "hit",
            CacheLookup::Miss => "miss",
            CacheLookup::Bypass => "bypass",
        }
    }
}

/// Get the value under `key` or compute, store and return it.
///
/// Values are stored as JSON. A failed computation stores nothing.
pub async fn remember<T, F, Fut>(
    cache: &dyn TaggedCache,
    tag: &RecordSetTag,
    key: &CacheKey,
    ttl: Duration,
    compute: F,
) -> Result<(T, CacheLookup), PaginateError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, QueryError>>,
{
    if let Some(bytes) = cache.get(tag, key).await? {
        let value = serde_json::from_slice(&bytes).map_err(StoreError::codec)?;
        return Ok((value, CacheLookup::Hit));
    }

    let value = compute().await?;
    let encoded = serde_json::to_vec(&value).map_err(StoreError::codec)?;
    cache.put(tag, key, Bytes::from(encoded), ttl).await?;
    Ok((value, CacheLookup::Miss))
}

pub struct CachedPaginator<E: QueryEngine> {
    engine: Arc<E>,
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
}

impl<E: QueryEngine> CachedPaginator<E> {
    pub fn new(engine: Arc<E>, store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self {
            engine,
            store,
            config,
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Bind a query to a record set for the `cached_*` entry points.
    pub fn query(&self, record_set: &RecordSet, query: LogicalQuery) -> CachedQuery<'_, E> {
        CachedQuery {
            paginator: self,
            record_set: record_set.clone(),
            query,
        }
    }

    pub async fn fetch_cached_page(
        &self,
        query: &LogicalQuery,
        record_set: &RecordSet,
        pagination: &PaginationDescriptor,
        fields: &Fields,
        ttl: Option<Duration>,
    ) -> Result<Page<E::Row>, PaginateError> {
        self.fetch_with_lookup(query, record_set, pagination, fields, ttl)
            .await
            .map(|(page, _)| page)
    }

    /// Like [`Self::fetch_cached_page`], also reporting how the page was served.
    #[instrument(
        skip_all,
        fields(record_set = record_set.name(), strategy = %pagination.strategy())
    )]
    pub async fn fetch_with_lookup(
        &self,
        query: &LogicalQuery,
        record_set: &RecordSet,
        pagination: &PaginationDescriptor,
        fields: &Fields,
        ttl: Option<Duration>,
    ) -> Result<(Page<E::Row>, CacheLookup), PaginateError> {
        pagination.validate().map_err(QueryError::from)?;

        let Some(tagged) = self.store.tags() else {
            counter!(METRIC_BYPASS_TOTAL, "record_set" => record_set.name().to_string())
                .increment(1);
            debug!("Cache store lacks tag support; executing directly");
            let page = self.execute(query, pagination, fields).await?;
            return Ok((page, CacheLookup::Bypass));
        };

        let key = page_key(query, record_set.name(), pagination, fields);
        let tag = tag_for(record_set.name());
        let ttl = self.config.resolve_ttl(ttl);

        let (page, lookup) = remember(tagged, &tag, &key, ttl, || {
            self.execute(query, pagination, fields)
        })
        .await?;

        let metric = match lookup {
            CacheLookup::Hit => METRIC_HIT_TOTAL,
            _ => METRIC_MISS_TOTAL,
        };
        counter!(metric, "record_set" => record_set.name().to_string()).increment(1);
        debug!(
            cache_key = %key,
            result = lookup.as_str(),
            ttl_secs = ttl.as_secs(),
            "Cached page lookup"
        );

        Ok((page, lookup))
    }

    async fn execute(
        &self,
        query: &LogicalQuery,
        pagination: &PaginationDescriptor,
        fields: &Fields,
    ) -> Result<Page<E::Row>, QueryError> {
        let started_at = Instant::now();
        let result = self.engine.execute_page(query, pagination, fields).await;
        histogram!(METRIC_COMPUTE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        result
    }
}

/// Arguments for the offset-based entry points.
#[derive(Debug, Clone)]
pub struct PaginateArgs {
    pub ttl: Option<Duration>,
    /// Falls back to the record set's page size.
    pub per_page: Option<NonZeroU32>,
    pub fields: Fields,
    pub page_param: String,
    /// First page when absent.
    pub page: Option<NonZeroU64>,
}

impl Default for PaginateArgs {
    fn default() -> Self {
        Self {
            ttl: None,
            per_page: None,
            fields: Fields::all(),
            page_param: DEFAULT_PAGE_PARAM.to_string(),
            page: None,
        }
    }
}

/// Arguments for the cursor entry point.
#[derive(Debug, Clone)]
pub struct CursorArgs {
    pub ttl: Option<Duration>,
    pub per_page: Option<NonZeroU32>,
    pub fields: Fields,
    pub cursor_param: String,
    /// Start of the result set when absent.
    pub cursor: Option<String>,
}

impl Default for CursorArgs {
    fn default() -> Self {
        Self {
            ttl: None,
            per_page: None,
            fields: Fields::all(),
            cursor_param: DEFAULT_CURSOR_PARAM.to_string(),
            cursor: None,
        }
    }
}

/// A query bound to its record set, exposing the cached pagination methods.
pub struct CachedQuery<'a, E: QueryEngine> {
    paginator: &'a CachedPaginator<E>,
    record_set: RecordSet,
    query: LogicalQuery,
}

impl<E: QueryEngine> CachedQuery<'_, E> {
    /// Offset pagination with a total count.
    pub async fn cached_paginate(&self, args: PaginateArgs) -> Result<Page<E::Row>, PaginateError> {
        let pagination = PaginationDescriptor::offset(
            self.page_size(args.per_page),
            args.page_param,
            args.page.unwrap_or(NonZeroU64::MIN),
        );
        self.fetch(&pagination, &args.fields, args.ttl).await
    }

    /// Offset pagination without a total count.
    pub async fn cached_simple_paginate(
        &self,
        args: PaginateArgs,
    ) -> Result<Page<E::Row>, PaginateError> {
        let pagination = PaginationDescriptor::simple(
            self.page_size(args.per_page),
            args.page_param,
            args.page.unwrap_or(NonZeroU64::MIN),
        );
        self.fetch(&pagination, &args.fields, args.ttl).await
    }

    pub async fn cached_cursor_paginate(
        &self,
        args: CursorArgs,
    ) -> Result<Page<E::Row>, PaginateError> {
        let pagination = PaginationDescriptor::cursor(
            self.page_size(args.per_page),
            args.cursor_param,
            args.cursor,
        );
        self.fetch(&pagination, &args.fields, args.ttl).await
    }

    pub fn cache_key(&self, pagination: &PaginationDescriptor, fields: &Fields) -> CacheKey {
        page_key(&self.query, self.record_set.name(), pagination, fields)
    }

    pub fn tag(&self) -> RecordSetTag {
        tag_for(self.record_set.name())
    }

    pub fn record_set(&self) -> &RecordSet {
        &self.record_set
    }

    fn page_size(&self, requested: Option<NonZeroU32>) -> NonZeroU32 {
        requested.unwrap_or_else(|| self.record_set.per_page())
    }

    async fn fetch(
        &self,
        pagination: &PaginationDescriptor,
        fields: &Fields,
        ttl: Option<Duration>,
    ) -> Result<Page<E::Row>, PaginateError> {
        self.paginator
            .fetch_cached_page(&self.query, &self.record_set, pagination, fields, ttl)
            .await
    }
}
