use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

/// Acquire a read guard, recovering the inner state if a writer panicked.
pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!(
            op,
            source_module = source,
            lock_kind = "rwlock.read",
            result = "poisoned_recovered",
            "Recovered from poisoned page store lock"
        );
        poisoned.into_inner()
    })
}

/// Acquire a write guard, recovering the inner state if a writer panicked.
pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!(
            op,
            source_module = source,
            lock_kind = "rwlock.write",
            result = "poisoned_recovered",
            "Recovered from poisoned page store lock"
        );
        poisoned.into_inner()
    })
}
