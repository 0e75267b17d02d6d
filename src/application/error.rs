use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::engine::QueryError, cache::PaginateError, config::LoadError,
    domain::error::DomainError, infra::error::InfraError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Paginate(#[from] PaginateError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code: 2 for bad input or configuration, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Domain(DomainError::Validation { .. })
            | AppError::Validation(_)
            | AppError::Config(_)
            | AppError::Query(QueryError::InvalidInput { .. } | QueryError::Pagination(_))
            | AppError::Paginate(PaginateError::Query(
                QueryError::InvalidInput { .. } | QueryError::Pagination(_),
            )) => 2,
            _ => 1,
        }
    }

    /// This error's message followed by each of its sources.
    pub fn chain(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = self.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pagination::PaginationError;
    use crate::cache::StoreError;

    #[test]
    fn input_errors_exit_with_two() {
        assert_eq!(AppError::validation("bad").exit_code(), 2);
        assert_eq!(
            AppError::from(PaginateError::Query(QueryError::Pagination(
                PaginationError::InvalidCursor("x".to_string())
            )))
            .exit_code(),
            2
        );
        assert_eq!(
            AppError::from(PaginateError::Store(StoreError::Timeout)).exit_code(),
            1
        );
    }

    #[test]
    fn chain_lists_sources() {
        let err = AppError::from(InfraError::database("connection refused"));
        assert_eq!(err.chain(), vec!["database error: connection refused".to_string()]);
    }
}
