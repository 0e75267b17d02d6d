//! Cache key and tag derivation.
//!
//! Keys are colon-joined: the namespace, the record set name, a SHA-256 hex
//! digest over the canonical query text and its bindings, then the extra
//! parts (strategy, page size, position parameter, position token, fields).

use std::fmt;

use sha2::{Digest, Sha256};

use crate::application::pagination::{Fields, PaginationDescriptor};
use crate::domain::query::LogicalQuery;

pub const KEY_NAMESPACE: &str = "cached-pagination";

/// Deterministic address of one cached page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Groups every cache key derived from one record set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordSetTag(String);

impl RecordSetTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordSetTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A primitive value appended to a key after the digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Text(String),
    Int(u64),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Text(value) => f.write_str(value),
            KeyPart::Int(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Text(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Text(value)
    }
}

impl From<u64> for KeyPart {
    fn from(value: u64) -> Self {
        KeyPart::Int(value)
    }
}

impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        KeyPart::Int(u64::from(value))
    }
}

/// Tag for all cached pages of `record_set`.
pub fn tag_for(record_set: &str) -> RecordSetTag {
    RecordSetTag(format!("{KEY_NAMESPACE}:{record_set}"))
}

/// Hex SHA-256 over the length-prefixed canonical query text followed by
/// each binding's type-tagged fingerprint, in binding order.
pub fn query_digest(query: &LogicalQuery) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:", query.sql().len()).as_bytes());
    hasher.update(query.sql().as_bytes());
    hasher.update(format!("#{};", query.bindings().len()).as_bytes());
    for binding in query.bindings() {
        hasher.update(binding.fingerprint().as_bytes());
    }
    hex::encode(hasher.finalize())
}

pub fn derive_key(query: &LogicalQuery, record_set: &str, extra: &[KeyPart]) -> CacheKey {
    let mut segments = Vec::with_capacity(3 + extra.len());
    segments.push(KEY_NAMESPACE.to_string());
    segments.push(record_set.to_string());
    segments.push(query_digest(query));
    segments.extend(extra.iter().map(ToString::to_string));
    CacheKey(segments.join(":"))
}

/// Extra key parts for a pagination descriptor, in fixed order.
pub fn pagination_parts(pagination: &PaginationDescriptor) -> Vec<KeyPart> {
    vec![
        KeyPart::from(pagination.strategy().as_str()),
        KeyPart::from(pagination.page_size().get()),
        KeyPart::from(pagination.position_param()),
        KeyPart::from(pagination.position().token()),
    ]
}

/// Key for one page of `query` with the given column selection.
pub fn page_key(
    query: &LogicalQuery,
    record_set: &str,
    pagination: &PaginationDescriptor,
    fields: &Fields,
) -> CacheKey {
    let mut parts = pagination_parts(pagination);
    parts.push(KeyPart::Text(fields.joined()));
    derive_key(query, record_set, &parts)
}
