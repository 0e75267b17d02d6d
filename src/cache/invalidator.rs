//! Tag-scoped invalidation.
//!
//! The data layer calls one hook per committed mutation. Each hook consults
//! the invalidation policy and, when enabled, flushes every cached page of
//! the record set in a single store operation.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, warn};

use super::config::CacheConfig;
use super::keys::{self, RecordSetTag};
use super::store::{CacheStore, StoreError};

pub(crate) const METRIC_FLUSH_TOTAL: &str = "cached_pagination_flush_total";

/// Kind of mutation reported by the data layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Created,
    Updated,
    Deleted,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::Created => "created",
            MutationKind::Updated => "updated",
            MutationKind::Deleted => "deleted",
        }
    }
}

/// Result of a single persist: a new record or a pre-existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Updated,
}

impl From<SaveOutcome> for MutationKind {
    fn from(outcome: SaveOutcome) -> Self {
        match outcome {
            SaveOutcome::Created => MutationKind::Created,
            SaveOutcome::Updated => MutationKind::Updated,
        }
    }
}

/// What an invalidation attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Every entry under the tag was removed.
    Flushed,
    /// The policy disables invalidation for this mutation kind.
    Skipped,
    /// The store cannot evict by tag; nothing was removed.
    Unsupported,
}

pub struct TagInvalidator {
    config: CacheConfig,
    store: Arc<dyn CacheStore>,
}

impl TagInvalidator {
    pub fn new(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        Self { config, store }
    }

    pub fn tag_for(&self, record_set: &str) -> RecordSetTag {
        keys::tag_for(record_set)
    }

    /// Flush every entry under `tag`.
    ///
    /// Reports [`FlushOutcome::Unsupported`] rather than falling back to a
    /// whole-store flush when the store has no tag support.
    pub async fn flush(&self, tag: &RecordSetTag) -> Result<FlushOutcome, StoreError> {
        let Some(tagged) = self.store.tags() else {
            warn!(
                tag = %tag,
                "Cache store does not support tags; pages for this record set are not cached"
            );
            return Ok(FlushOutcome::Unsupported);
        };

        tagged.flush(tag).await?;
        counter!(METRIC_FLUSH_TOTAL).increment(1);
        info!(tag = %tag, "Flushed cached pages");
        Ok(FlushOutcome::Flushed)
    }

    pub async fn on_record_created(&self, record_set: &str) -> Result<FlushOutcome, StoreError> {
        self.on_mutation(record_set, MutationKind::Created).await
    }

    pub async fn on_record_updated(&self, record_set: &str) -> Result<FlushOutcome, StoreError> {
        self.on_mutation(record_set, MutationKind::Updated).await
    }

    pub async fn on_record_deleted(&self, record_set: &str) -> Result<FlushOutcome, StoreError> {
        self.on_mutation(record_set, MutationKind::Deleted).await
    }

    /// Dispatch one persist to exactly one of the create or update hooks.
    pub async fn on_record_saved(
        &self,
        record_set: &str,
        outcome: SaveOutcome,
    ) -> Result<FlushOutcome, StoreError> {
        self.on_mutation(record_set, outcome.into()).await
    }

    pub async fn on_mutation(
        &self,
        record_set: &str,
        kind: MutationKind,
    ) -> Result<FlushOutcome, StoreError> {
        if !self.policy_allows(kind) {
            debug!(
                record_set,
                mutation = kind.as_str(),
                "Invalidation skipped: disabled by policy"
            );
            return Ok(FlushOutcome::Skipped);
        }

        self.flush(&self.tag_for(record_set)).await
    }

    fn policy_allows(&self, kind: MutationKind) -> bool {
        match kind {
            MutationKind::Created => self.config.clear_on_create,
            MutationKind::Updated => self.config.clear_on_update,
            MutationKind::Deleted => self.config.clear_on_delete,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}
