use std::num::{NonZeroU32, NonZeroU64};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use cached_pagination::application::engine::{QueryEngine, QueryError};
use cached_pagination::application::pagination::{
    CursorDirection, Fields, KeysetCursor, Page, PageMeta, PaginationDescriptor, Strategy,
};
use cached_pagination::cache::{
    CacheConfig, CacheStore, CachedPaginator, CursorArgs, FlushOutcome, MemoryStore,
    PaginateArgs, SaveOutcome, TagInvalidator, TaggedCache, page_key, remember, tag_for,
};
use cached_pagination::domain::query::LogicalQuery;
use cached_pagination::domain::record_set::RecordSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TestModel {
    id: i64,
    name: String,
}

/// In-memory table standing in for a database; counts every page execution.
struct TableEngine {
    rows: RwLock<Vec<TestModel>>,
    executions: AtomicUsize,
}

impl TableEngine {
    fn seeded(count: i64) -> Self {
        let rows = (1..=count)
            .map(|id| TestModel {
                id,
                name: format!("model-{id}"),
            })
            .collect();
        Self {
            rows: RwLock::new(rows),
            executions: AtomicUsize::new(0),
        }
    }

    fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    fn rename(&self, id: i64, name: &str) {
        let mut rows = self.rows.write().expect("rows lock");
        if let Some(row) = rows.iter_mut().find(|row| row.id == id) {
            row.name = name.to_string();
        }
    }

    fn insert(&self, name: &str) -> i64 {
        let mut rows = self.rows.write().expect("rows lock");
        let id = rows.last().map_or(1, |row| row.id + 1);
        rows.push(TestModel {
            id,
            name: name.to_string(),
        });
        id
    }

    fn delete(&self, id: i64) {
        self.rows.write().expect("rows lock").retain(|row| row.id != id);
    }
}

#[async_trait]
impl QueryEngine for TableEngine {
    type Row = TestModel;

    async fn execute_page(
        &self,
        _query: &LogicalQuery,
        pagination: &PaginationDescriptor,
        _fields: &Fields,
    ) -> Result<Page<TestModel>, QueryError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.read().expect("rows lock").clone();
        let size = pagination.page_size().get() as usize;

        match pagination.strategy() {
            Strategy::Offset | Strategy::SimpleOffset => {
                let offset = pagination.offset_rows() as usize;
                let items: Vec<_> = rows.iter().skip(offset).take(size).cloned().collect();
                if pagination.strategy() == Strategy::Offset {
                    Ok(Page::length_aware(items, rows.len() as u64, pagination))
                } else {
                    let has_more = rows.len() > offset + size;
                    Ok(Page::simple(items, has_more, pagination))
                }
            }
            Strategy::Cursor => {
                let after = match pagination.cursor_token() {
                    Some(token) => {
                        let cursor = KeysetCursor::decode(token)?;
                        assert_eq!(cursor.direction(), CursorDirection::Next);
                        cursor.key().as_i64().unwrap_or(0)
                    }
                    None => 0,
                };
                let remaining: Vec<_> = rows.into_iter().filter(|row| row.id > after).collect();
                let has_more = remaining.len() > size;
                let items: Vec<_> = remaining.into_iter().take(size).collect();
                let next = items
                    .last()
                    .filter(|_| has_more)
                    .map(|row| KeysetCursor::next(serde_json::json!(row.id)).encode());
                Ok(Page::cursor(items, next, None, pagination))
            }
        }
    }
}

struct Harness {
    engine: Arc<TableEngine>,
    store: Arc<MemoryStore>,
    paginator: CachedPaginator<TableEngine>,
    invalidator: TagInvalidator,
    records: RecordSet,
}

impl Harness {
    fn new(config: CacheConfig) -> Self {
        Self::with_store(config.clone(), Arc::new(MemoryStore::tagged(&config)))
    }

    fn with_store(config: CacheConfig, store: Arc<MemoryStore>) -> Self {
        let engine = Arc::new(TableEngine::seeded(20));
        let shared: Arc<dyn CacheStore> = store.clone();
        Self {
            paginator: CachedPaginator::new(engine.clone(), shared.clone(), config.clone()),
            invalidator: TagInvalidator::new(config, shared),
            engine,
            store,
            records: RecordSet::new("test_models").expect("record set"),
        }
    }

    async fn first_page(&self) -> Page<TestModel> {
        self.paginator
            .query(&self.records, query())
            .cached_paginate(PaginateArgs::default())
            .await
            .expect("first page")
    }
}

fn query() -> LogicalQuery {
    LogicalQuery::new("select * from test_models order by id", vec![]).expect("query")
}

#[tokio::test]
async fn twenty_records_fifteen_per_page() {
    let harness = Harness::new(CacheConfig::default());

    let first = harness.first_page().await;
    assert_eq!(harness.engine.executions(), 1);
    assert_eq!(first.len(), 15);
    assert_eq!(
        first.meta,
        PageMeta::LengthAware {
            current_page: 1,
            total: 20,
            last_page: 2
        }
    );

    let second = harness.first_page().await;
    assert_eq!(harness.engine.executions(), 1);
    assert_eq!(second, first);

    harness.engine.rename(1, "renamed");
    let outcome = harness
        .invalidator
        .on_record_updated("test_models")
        .await
        .expect("flush");
    assert_eq!(outcome, FlushOutcome::Flushed);

    let third = harness.first_page().await;
    assert_eq!(harness.engine.executions(), 2);
    assert_eq!(third.items[0].name, "renamed");
}

#[tokio::test]
async fn invalidation_evicts_every_cached_page_of_the_record_set() {
    let harness = Harness::new(CacheConfig::default());
    let cached = harness.paginator.query(&harness.records, query());

    for page in [1, 2] {
        let args = PaginateArgs {
            page: NonZeroU64::new(page),
            ..Default::default()
        };
        cached.cached_paginate(args.clone()).await.expect("page");
        cached.cached_simple_paginate(args).await.expect("simple page");
    }
    assert_eq!(harness.engine.executions(), 4);
    assert_eq!(harness.store.keys_for(&tag_for("test_models")), 4);

    harness
        .invalidator
        .on_record_deleted("test_models")
        .await
        .expect("flush");

    assert_eq!(harness.store.keys_for(&tag_for("test_models")), 0);
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn disabled_update_policy_keeps_serving_cached_page() {
    let harness = Harness::new(CacheConfig {
        clear_on_update: false,
        ..Default::default()
    });

    let before = harness.first_page().await;
    harness.engine.rename(1, "renamed");
    let outcome = harness
        .invalidator
        .on_record_updated("test_models")
        .await
        .expect("hook");
    let after = harness.first_page().await;

    assert_eq!(outcome, FlushOutcome::Skipped);
    assert_eq!(harness.engine.executions(), 1);
    assert_eq!(after, before);
}

#[tokio::test]
async fn created_record_applies_only_the_create_policy() {
    let harness = Harness::new(CacheConfig {
        clear_on_create: false,
        clear_on_update: true,
        ..Default::default()
    });

    harness.first_page().await;
    harness.engine.insert("fresh");
    let outcome = harness
        .invalidator
        .on_record_saved("test_models", SaveOutcome::Created)
        .await
        .expect("hook");
    harness.first_page().await;

    assert_eq!(outcome, FlushOutcome::Skipped);
    assert_eq!(harness.engine.executions(), 1);

    harness.engine.rename(2, "edited");
    let outcome = harness
        .invalidator
        .on_record_saved("test_models", SaveOutcome::Updated)
        .await
        .expect("hook");
    let page = harness.first_page().await;

    assert_eq!(outcome, FlushOutcome::Flushed);
    assert_eq!(harness.engine.executions(), 2);
    assert_eq!(page.items[1].name, "edited");
}

#[tokio::test]
async fn store_without_tags_never_caches() {
    let config = CacheConfig::default();
    let harness = Harness::with_store(config.clone(), Arc::new(MemoryStore::untagged(&config)));

    harness.first_page().await;
    harness.engine.rename(1, "untracked write");
    let page = harness.first_page().await;

    assert_eq!(harness.engine.executions(), 2);
    assert_eq!(page.items[0].name, "untracked write");
    assert!(harness.store.is_empty());

    let outcome = harness
        .invalidator
        .on_record_updated("test_models")
        .await
        .expect("hook");
    assert_eq!(outcome, FlushOutcome::Unsupported);
}

#[tokio::test(start_paused = true)]
async fn pages_expire_after_their_ttl() {
    let harness = Harness::new(CacheConfig::default());
    let cached = harness.paginator.query(&harness.records, query());
    let args = PaginateArgs {
        ttl: Some(Duration::from_secs(60)),
        ..Default::default()
    };

    cached.cached_paginate(args.clone()).await.expect("page");
    tokio::time::advance(Duration::from_secs(30)).await;
    cached.cached_paginate(args.clone()).await.expect("page");
    assert_eq!(harness.engine.executions(), 1);

    tokio::time::advance(Duration::from_secs(31)).await;
    cached.cached_paginate(args).await.expect("page");
    assert_eq!(harness.engine.executions(), 2);
}

#[tokio::test(start_paused = true)]
async fn configured_ttl_applies_without_explicit_value() {
    let harness = Harness::new(CacheConfig {
        ttl: Some(Duration::from_secs(10)),
        ..Default::default()
    });

    harness.first_page().await;
    tokio::time::advance(Duration::from_secs(11)).await;
    harness.first_page().await;

    assert_eq!(harness.engine.executions(), 2);
}

#[tokio::test]
async fn flushing_one_record_set_leaves_others_cached() {
    let harness = Harness::new(CacheConfig::default());
    let orders = RecordSet::new("orders").expect("record set");

    harness.first_page().await;
    harness
        .paginator
        .query(&orders, query())
        .cached_paginate(PaginateArgs::default())
        .await
        .expect("orders page");
    assert_eq!(harness.engine.executions(), 2);

    harness
        .invalidator
        .on_record_created("orders")
        .await
        .expect("flush");
    harness.first_page().await;

    assert_eq!(harness.engine.executions(), 2);
}

#[tokio::test]
async fn cursor_pages_are_cached_per_token() {
    let harness = Harness::new(CacheConfig::default());
    let cached = harness.paginator.query(&harness.records, query());
    let per_page = NonZeroU32::new(8);

    let mut walk = Vec::new();
    let mut cursor = None;
    loop {
        let page = cached
            .cached_cursor_paginate(CursorArgs {
                per_page,
                cursor: cursor.clone(),
                ..Default::default()
            })
            .await
            .expect("cursor page");
        walk.extend(page.items.iter().map(|row| row.id));
        let PageMeta::Cursor { next_cursor, .. } = page.meta else {
            panic!("cursor page metadata expected");
        };
        match next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(walk, (1..=20).collect::<Vec<_>>());
    assert_eq!(harness.engine.executions(), 3);

    let again = cached
        .cached_cursor_paginate(CursorArgs {
            per_page,
            ..Default::default()
        })
        .await
        .expect("cursor page");
    assert_eq!(again.len(), 8);
    assert_eq!(harness.engine.executions(), 3);
}

#[tokio::test]
async fn deleted_record_disappears_after_flush() {
    let harness = Harness::new(CacheConfig::default());

    harness.first_page().await;
    harness.engine.delete(1);
    harness
        .invalidator
        .on_record_deleted("test_models")
        .await
        .expect("flush");
    let page = harness.first_page().await;

    assert_eq!(page.items[0].id, 2);
    assert!(matches!(page.meta, PageMeta::LengthAware { total: 19, .. }));
}

/// A flush that lands while a miss is still computing does not stop the
/// computed page from being stored afterwards. Staleness in that window is
/// bounded only by the TTL; this test pins the behavior rather than
/// guaranteeing freshness.
#[tokio::test]
async fn flush_during_compute_may_repopulate_entry() {
    let config = CacheConfig::default();
    let store = Arc::new(MemoryStore::tagged(&config));
    let tag = tag_for("test_models");
    let pagination = PaginationDescriptor::offset(
        NonZeroU32::new(15).expect("size"),
        "page",
        NonZeroU64::MIN,
    );
    let key = page_key(&query(), "test_models", &pagination, &Fields::all());

    let tagged: &dyn TaggedCache = store.as_ref();
    let racing_tag = tag.clone();
    let (value, _) = remember(tagged, &tag, &key, Duration::from_secs(60), move || async move {
        tagged.flush(&racing_tag).await.expect("flush mid-compute");
        Ok::<_, QueryError>(vec![1_u32, 2, 3])
    })
    .await
    .expect("remember");

    assert_eq!(value, vec![1, 2, 3]);
    assert!(store.contains(&key));
}
