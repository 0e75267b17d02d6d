//! Statement text for paging a logical query.
//!
//! The logical query is wrapped as a subquery, so its own `$1..$n`
//! placeholders stay valid; paging parameters take the positions after it.

use crate::application::engine::QueryError;
use crate::application::pagination::{CursorDirection, Fields};
use crate::domain::query::LogicalQuery;

const SOURCE_ALIAS: &str = "cached_pagination_source";
const PAGE_ALIAS: &str = "cached_pagination_page";

/// Quote a plain column name; anything but `[A-Za-z_][A-Za-z0-9_]*` is rejected.
pub fn quote_ident(name: &str) -> Result<String, QueryError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');
    if !valid_start || !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(QueryError::invalid_input(format!(
            "`{name}` is not a plain column name"
        )));
    }
    Ok(format!("\"{name}\""))
}

pub fn select_list(fields: &Fields) -> Result<String, QueryError> {
    if fields.is_all() {
        return Ok("*".to_string());
    }
    let quoted = fields
        .as_slice()
        .iter()
        .map(|field| quote_ident(field))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(quoted.join(", "))
}

pub fn count_statement(query: &LogicalQuery) -> String {
    format!(
        "SELECT COUNT(*) FROM ({sql}) AS {SOURCE_ALIAS}",
        sql = query.sql()
    )
}

/// Rows as JSON objects with `LIMIT` and `OFFSET` bound after the query's own
/// parameters.
pub fn offset_statement(query: &LogicalQuery, fields: &Fields) -> Result<String, QueryError> {
    let next = query.bindings().len() + 1;
    Ok(format!(
        "SELECT row_to_json({PAGE_ALIAS}) FROM (SELECT {columns} FROM ({sql}) AS {SOURCE_ALIAS} \
         LIMIT ${limit} OFFSET ${offset}) AS {PAGE_ALIAS}",
        columns = select_list(fields)?,
        sql = query.sql(),
        limit = next,
        offset = next + 1,
    ))
}

/// Keyset page ordered by `key_column`. With a direction, the key value is
/// bound first and the limit second; without one only the limit is bound.
pub fn keyset_statement(
    query: &LogicalQuery,
    fields: &Fields,
    key_column: &str,
    direction: Option<CursorDirection>,
) -> Result<String, QueryError> {
    let key = format!("{SOURCE_ALIAS}.{}", quote_ident(key_column)?);
    let next = query.bindings().len() + 1;

    let (filter, order, limit) = match direction {
        None => (String::new(), "ASC", next),
        Some(CursorDirection::Next) => (format!(" WHERE {key} > ${next}"), "ASC", next + 1),
        Some(CursorDirection::Prev) => (format!(" WHERE {key} < ${next}"), "DESC", next + 1),
    };

    Ok(format!(
        "SELECT row_to_json({PAGE_ALIAS}) FROM (SELECT {columns} FROM ({sql}) AS {SOURCE_ALIAS}\
         {filter} ORDER BY {key} {order} LIMIT ${limit}) AS {PAGE_ALIAS}",
        columns = select_list(fields)?,
        sql = query.sql(),
    ))
}
