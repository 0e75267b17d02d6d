//! Tag-scoped caching of paginated query results.
//!
//! A page is cached under a key derived from its query, bindings and
//! position, grouped under a tag for its record set. Writes to a record set
//! flush its tag, so no page of it is served stale.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
