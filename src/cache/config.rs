//! Cache configuration: invalidation policy, TTL defaults and store sizing.

use std::num::NonZeroUsize;
use std::time::Duration;

/// TTL used when neither the call site nor the configuration supplies one.
pub const FALLBACK_TTL: Duration = Duration::from_secs(3600);

const DEFAULT_TTL_SECS: u64 = 3600;
const DEFAULT_CAPACITY: usize = 1024;

/// Invalidation policy plus TTL and capacity settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Default TTL for cached pages.
    pub ttl: Option<Duration>,
    /// Flush a record set's pages when one of its records is created.
    pub clear_on_create: bool,
    /// Flush a record set's pages when a pre-existing record is updated.
    pub clear_on_update: bool,
    /// Flush a record set's pages when one of its records is deleted.
    pub clear_on_delete: bool,
    /// Maximum number of pages held by the in-memory store.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Some(Duration::from_secs(DEFAULT_TTL_SECS)),
            clear_on_create: true,
            clear_on_update: true,
            clear_on_delete: true,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            ttl: Some(settings.ttl),
            clear_on_create: settings.clear_on_create,
            clear_on_update: settings.clear_on_update,
            clear_on_delete: settings.clear_on_delete,
            capacity: settings.capacity.get(),
        }
    }
}

impl CacheConfig {
    /// Explicit call-time TTL, else the configured default, else one hour.
    pub fn resolve_ttl(&self, explicit: Option<Duration>) -> Duration {
        explicit.or(self.ttl).unwrap_or(FALLBACK_TTL)
    }

    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
