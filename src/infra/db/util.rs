use crate::application::engine::QueryError;

pub fn map_sqlx_error(err: sqlx::Error) -> QueryError {
    match err {
        sqlx::Error::PoolTimedOut => QueryError::Timeout,
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to statement timeout")
                || db
                    .message()
                    .contains("canceling statement due to user request") =>
        {
            QueryError::Timeout
        }
        sqlx::Error::Database(db)
            if db.message().contains("invalid input syntax")
                || db.message().contains("syntax error") =>
        {
            QueryError::invalid_input(db.message())
        }
        other => QueryError::execution(other),
    }
}

pub fn convert_count(count: i64) -> Result<u64, QueryError> {
    u64::try_from(count)
        .map_err(|_| QueryError::execution(format!("row count {count} is out of range")))
}
