//! Postgres-backed query engine.

mod sql;
mod util;

pub use util::map_sqlx_error;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{
    Postgres,
    postgres::{PgArguments, PgPool, PgPoolOptions},
    query::QueryScalar,
};

use crate::application::engine::{QueryEngine, QueryError};
use crate::application::pagination::{
    CursorDirection, Fields, KeysetCursor, Page, PaginationDescriptor, PaginationError, Strategy,
};
use crate::domain::query::{BindValue, LogicalQuery};

use self::sql::{count_statement, keyset_statement, offset_statement};
use self::util::convert_count;

pub const DEFAULT_KEY_COLUMN: &str = "id";

/// Runs logical queries against Postgres and returns rows as JSON objects.
///
/// Keyset pagination orders by a single key column, whose values must be
/// integers or strings.
#[derive(Clone)]
pub struct PostgresQueryEngine {
    pool: PgPool,
    key_column: String,
}

impl PostgresQueryEngine {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            key_column: DEFAULT_KEY_COLUMN.to_string(),
        }
    }

    pub fn with_key_column(mut self, key_column: impl Into<String>) -> Self {
        self.key_column = key_column.into();
        self
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    async fn fetch_rows(
        &self,
        statement: &str,
        query: &LogicalQuery,
        paging: &[BindValue],
    ) -> Result<Vec<Value>, QueryError> {
        let mut scalar = sqlx::query_scalar::<Postgres, Value>(statement);
        for value in query.bindings().iter().chain(paging) {
            scalar = bind_value(scalar, value);
        }
        scalar.fetch_all(&self.pool).await.map_err(map_sqlx_error)
    }

    async fn count(&self, query: &LogicalQuery) -> Result<u64, QueryError> {
        let statement = count_statement(query);
        let mut scalar = sqlx::query_scalar::<Postgres, i64>(&statement);
        for value in query.bindings() {
            scalar = bind_value(scalar, value);
        }
        let count = scalar.fetch_one(&self.pool).await.map_err(map_sqlx_error)?;
        convert_count(count)
    }

    async fn offset_page(
        &self,
        query: &LogicalQuery,
        pagination: &PaginationDescriptor,
        fields: &Fields,
    ) -> Result<Page<Value>, QueryError> {
        let total = self.count(query).await?;
        let statement = offset_statement(query, fields)?;
        let paging = [
            BindValue::Int(i64::from(pagination.page_size().get())),
            BindValue::Int(offset_rows(pagination)?),
        ];
        let rows = self.fetch_rows(&statement, query, &paging).await?;
        Ok(Page::length_aware(rows, total, pagination))
    }

    async fn simple_page(
        &self,
        query: &LogicalQuery,
        pagination: &PaginationDescriptor,
        fields: &Fields,
    ) -> Result<Page<Value>, QueryError> {
        let size = pagination.page_size().get();
        let statement = offset_statement(query, fields)?;
        let paging = [
            BindValue::Int(i64::from(size) + 1),
            BindValue::Int(offset_rows(pagination)?),
        ];
        let mut rows = self.fetch_rows(&statement, query, &paging).await?;
        let has_more = rows.len() > size as usize;
        rows.truncate(size as usize);
        Ok(Page::simple(rows, has_more, pagination))
    }

    async fn cursor_page(
        &self,
        query: &LogicalQuery,
        pagination: &PaginationDescriptor,
        fields: &Fields,
    ) -> Result<Page<Value>, QueryError> {
        let cursor = pagination
            .cursor_token()
            .map(KeysetCursor::decode)
            .transpose()?;
        let direction = cursor.as_ref().map(KeysetCursor::direction);
        let statement = keyset_statement(query, fields, &self.key_column, direction)?;

        let size = pagination.page_size().get();
        let mut paging = Vec::with_capacity(2);
        if let Some(cursor) = cursor.as_ref() {
            paging.push(key_binding(cursor.key())?);
        }
        paging.push(BindValue::Int(i64::from(size) + 1));

        let mut rows = self.fetch_rows(&statement, query, &paging).await?;
        let has_more = rows.len() > size as usize;
        rows.truncate(size as usize);
        if direction == Some(CursorDirection::Prev) {
            rows.reverse();
        }

        let first_key = rows.first().map(|row| self.row_key(row)).transpose()?;
        let last_key = rows.last().map(|row| self.row_key(row)).transpose()?;

        let (next_cursor, prev_cursor) = match direction {
            None => (last_key.filter(|_| has_more).map(KeysetCursor::next), None),
            Some(CursorDirection::Next) => (
                last_key.filter(|_| has_more).map(KeysetCursor::next),
                first_key.map(KeysetCursor::prev),
            ),
            Some(CursorDirection::Prev) => (
                last_key.map(KeysetCursor::next),
                first_key.filter(|_| has_more).map(KeysetCursor::prev),
            ),
        };

        Ok(Page::cursor(
            rows,
            next_cursor.map(|cursor| cursor.encode()),
            prev_cursor.map(|cursor| cursor.encode()),
            pagination,
        ))
    }

    fn row_key(&self, row: &Value) -> Result<Value, QueryError> {
        row.get(&self.key_column).cloned().ok_or_else(|| {
            QueryError::invalid_input(format!(
                "selected fields must include the key column `{}`",
                self.key_column
            ))
        })
    }
}

#[async_trait]
impl QueryEngine for PostgresQueryEngine {
    type Row = Value;

    async fn execute_page(
        &self,
        query: &LogicalQuery,
        pagination: &PaginationDescriptor,
        fields: &Fields,
    ) -> Result<Page<Value>, QueryError> {
        match pagination.strategy() {
            Strategy::Offset => self.offset_page(query, pagination, fields).await,
            Strategy::SimpleOffset => self.simple_page(query, pagination, fields).await,
            Strategy::Cursor => self.cursor_page(query, pagination, fields).await,
        }
    }
}

fn bind_value<'q, O>(
    scalar: QueryScalar<'q, Postgres, O, PgArguments>,
    value: &BindValue,
) -> QueryScalar<'q, Postgres, O, PgArguments> {
    match value {
        BindValue::Null => scalar.bind(None::<String>),
        BindValue::Bool(value) => scalar.bind(*value),
        BindValue::Int(value) => scalar.bind(*value),
        BindValue::Float(value) => scalar.bind(*value),
        BindValue::Text(value) => scalar.bind(value.clone()),
    }
}

fn key_binding(key: &Value) -> Result<BindValue, QueryError> {
    match key {
        Value::Number(number) => number.as_i64().map(BindValue::Int).ok_or_else(|| {
            PaginationError::InvalidCursor(format!("unsupported numeric key `{number}`")).into()
        }),
        Value::String(text) => Ok(BindValue::Text(text.clone())),
        other => Err(PaginationError::InvalidCursor(format!("unsupported key `{other}`")).into()),
    }
}

fn offset_rows(pagination: &PaginationDescriptor) -> Result<i64, QueryError> {
    i64::try_from(pagination.offset_rows())
        .map_err(|_| QueryError::invalid_input("page number is out of range"))
}
