//! Application layer: pagination types and the query engine port.

pub mod engine;
pub mod error;
pub mod pagination;
