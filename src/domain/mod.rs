//! Domain layer types and invariants.

pub mod error;
pub mod query;
pub mod record_set;
