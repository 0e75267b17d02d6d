//! Query engine port: executes one page of a logical query.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::application::pagination::{Fields, Page, PaginationDescriptor, PaginationError};
use crate::domain::query::LogicalQuery;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query execution failed: {0}")]
    Execution(String),
    #[error("invalid query input: {message}")]
    InvalidInput { message: String },
    #[error("query timed out")]
    Timeout,
    #[error(transparent)]
    Pagination(#[from] PaginationError),
}

impl QueryError {
    pub fn execution(err: impl std::fmt::Display) -> Self {
        Self::Execution(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Runs a logical query and returns the requested page.
///
/// Implementations must support all three strategies. Errors are returned
/// as-is to callers; the caching layer never retries or masks them.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    type Row: Serialize + DeserializeOwned + Send + Sync + 'static;

    async fn execute_page(
        &self,
        query: &LogicalQuery,
        pagination: &PaginationDescriptor,
        fields: &Fields,
    ) -> Result<Page<Self::Row>, QueryError>;
}
