//! Tag-scoped page cache.
//!
//! - **Keys** ([`keys`]): every cached page is addressed by a key derived from
//!   the record set, a SHA-256 digest of the query and its bindings, and the
//!   pagination position.
//! - **Read path** ([`paginate`]): get-or-compute through a [`CacheStore`]
//!   that supports tags; stores without tag support are bypassed.
//! - **Invalidation** ([`invalidator`]): a committed mutation flushes every
//!   page of its record set, gated by the [`CacheConfig`] policy.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! ttl = "1h"
//! clear_on_create = true
//! clear_on_update = true
//! clear_on_delete = true
//! capacity = 1024
//! ```

mod config;
mod invalidator;
pub mod keys;
mod lock;
mod paginate;
mod registry;
mod store;

pub use config::{CacheConfig, FALLBACK_TTL};
pub use invalidator::{FlushOutcome, MutationKind, SaveOutcome, TagInvalidator};
pub use keys::{CacheKey, KeyPart, RecordSetTag, derive_key, page_key, tag_for};
pub use paginate::{
    CacheLookup, CachedPaginator, CachedQuery, CursorArgs, PaginateArgs, PaginateError, remember,
};
pub use registry::TagIndex;
pub use store::{CacheStore, MemoryStore, StoreError, TaggedCache};
