//! Pagination descriptors, page results and cursor tokens.

use std::fmt;
use std::num::{NonZeroU32, NonZeroU64};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PAGE_PARAM: &str = "page";
pub const DEFAULT_CURSOR_PARAM: &str = "cursor";

/// How a page is addressed and what metadata it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Offset-based with a total count.
    Offset,
    /// Offset-based without a total count.
    SimpleOffset,
    /// Keyset pagination addressed by an opaque cursor.
    Cursor,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Offset => "paginate",
            Strategy::SimpleOffset => "simple_paginate",
            Strategy::Cursor => "cursor_paginate",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in the result set a page starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Position {
    Page(NonZeroU64),
    Cursor(Option<String>),
}

impl Position {
    pub fn first_page() -> Self {
        Position::Page(NonZeroU64::MIN)
    }

    /// Parse a page number into canonical form, so `"01"`, `" 1"` and `1`
    /// all address the same page.
    pub fn parse_page(raw: &str) -> Result<Self, PaginationError> {
        let number: u64 = raw
            .trim()
            .parse()
            .map_err(|_| PaginationError::InvalidPage(raw.to_string()))?;
        NonZeroU64::new(number)
            .map(Position::Page)
            .ok_or_else(|| PaginationError::InvalidPage(raw.to_string()))
    }

    /// Canonical textual token; an absent cursor is the empty string.
    pub fn token(&self) -> String {
        match self {
            Position::Page(page) => page.get().to_string(),
            Position::Cursor(Some(cursor)) => cursor.clone(),
            Position::Cursor(None) => String::new(),
        }
    }
}

/// Full description of which page to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaginationDescriptor {
    strategy: Strategy,
    page_size: NonZeroU32,
    position_param: String,
    position: Position,
}

impl PaginationDescriptor {
    pub fn offset(page_size: NonZeroU32, page_param: impl Into<String>, page: NonZeroU64) -> Self {
        Self {
            strategy: Strategy::Offset,
            page_size,
            position_param: page_param.into(),
            position: Position::Page(page),
        }
    }

    pub fn simple(page_size: NonZeroU32, page_param: impl Into<String>, page: NonZeroU64) -> Self {
        Self {
            strategy: Strategy::SimpleOffset,
            page_size,
            position_param: page_param.into(),
            position: Position::Page(page),
        }
    }

    pub fn cursor(
        page_size: NonZeroU32,
        cursor_param: impl Into<String>,
        cursor: Option<String>,
    ) -> Self {
        Self {
            strategy: Strategy::Cursor,
            page_size,
            position_param: cursor_param.into(),
            position: Position::Cursor(cursor.filter(|value| !value.is_empty())),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn page_size(&self) -> NonZeroU32 {
        self.page_size
    }

    pub fn position_param(&self) -> &str {
        &self.position_param
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    /// One-based page number for offset strategies.
    pub fn page_number(&self) -> Option<u64> {
        match &self.position {
            Position::Page(page) => Some(page.get()),
            Position::Cursor(_) => None,
        }
    }

    pub fn cursor_token(&self) -> Option<&str> {
        match &self.position {
            Position::Cursor(cursor) => cursor.as_deref(),
            Position::Page(_) => None,
        }
    }

    /// Reject parameter names and cursor tokens containing `:`, which would
    /// make the colon-joined cache key ambiguous.
    pub fn validate(&self) -> Result<(), PaginationError> {
        if self.position_param.contains(':') {
            return Err(PaginationError::InvalidParam(self.position_param.clone()));
        }
        match self.cursor_token() {
            Some(token) if token.contains(':') => Err(PaginationError::InvalidCursor(format!(
                "cursor `{token}` must not contain `:`"
            ))),
            _ => Ok(()),
        }
    }

    /// Row offset of the first item for offset strategies.
    pub fn offset_rows(&self) -> u64 {
        self.page_number()
            .map(|page| (page - 1).saturating_mul(u64::from(self.page_size.get())))
            .unwrap_or(0)
    }
}

/// Column selection; `*` when empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fields(Vec<String>);

impl Fields {
    pub fn all() -> Self {
        Self(vec!["*".to_string()])
    }

    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields
            .into_iter()
            .map(Into::into)
            .filter(|field| !field.trim().is_empty())
            .collect();
        if fields.is_empty() {
            Self::all()
        } else {
            Self(fields)
        }
    }

    pub fn is_all(&self) -> bool {
        self.0.len() == 1 && self.0[0] == "*"
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn joined(&self) -> String {
        self.0.join(",")
    }
}

impl Default for Fields {
    fn default() -> Self {
        Self::all()
    }
}

/// Strategy-specific page metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PageMeta {
    LengthAware {
        current_page: u64,
        total: u64,
        last_page: u64,
    },
    Simple {
        current_page: u64,
        has_more: bool,
    },
    Cursor {
        next_cursor: Option<String>,
        prev_cursor: Option<String>,
    },
}

/// A materialized page of rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub per_page: u32,
    pub param: String,
    pub meta: PageMeta,
}

impl<T> Page<T> {
    pub fn length_aware(items: Vec<T>, total: u64, pagination: &PaginationDescriptor) -> Self {
        let per_page = u64::from(pagination.page_size().get());
        Self {
            items,
            per_page: pagination.page_size().get(),
            param: pagination.position_param().to_string(),
            meta: PageMeta::LengthAware {
                current_page: pagination.page_number().unwrap_or(1),
                total,
                last_page: total.div_ceil(per_page).max(1),
            },
        }
    }

    pub fn simple(items: Vec<T>, has_more: bool, pagination: &PaginationDescriptor) -> Self {
        Self {
            items,
            per_page: pagination.page_size().get(),
            param: pagination.position_param().to_string(),
            meta: PageMeta::Simple {
                current_page: pagination.page_number().unwrap_or(1),
                has_more,
            },
        }
    }

    pub fn cursor(
        items: Vec<T>,
        next_cursor: Option<String>,
        prev_cursor: Option<String>,
        pagination: &PaginationDescriptor,
    ) -> Self {
        Self {
            items,
            per_page: pagination.page_size().get(),
            param: pagination.position_param().to_string(),
            meta: PageMeta::Cursor {
                next_cursor,
                prev_cursor,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorDirection {
    Next,
    Prev,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct KeysetCursorPayload {
    key: serde_json::Value,
    direction: CursorDirection,
}

/// Cursor pointing past the last (or before the first) row of a page,
/// identified by the value of the keyset column.
#[derive(Debug, Clone, PartialEq)]
pub struct KeysetCursor {
    key: serde_json::Value,
    direction: CursorDirection,
}

impl KeysetCursor {
    pub fn next(key: serde_json::Value) -> Self {
        Self {
            key,
            direction: CursorDirection::Next,
        }
    }

    pub fn prev(key: serde_json::Value) -> Self {
        Self {
            key,
            direction: CursorDirection::Prev,
        }
    }

    pub fn key(&self) -> &serde_json::Value {
        &self.key
    }

    pub fn direction(&self) -> CursorDirection {
        self.direction
    }

    pub fn encode(&self) -> String {
        let payload = KeysetCursorPayload {
            key: self.key.clone(),
            direction: self.direction,
        };
        let serialized = serde_json::to_vec(&payload)
            .expect("serializing keyset cursor payload should succeed");
        URL_SAFE_NO_PAD.encode(serialized)
    }

    pub fn decode(cursor: &str) -> Result<Self, PaginationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        let payload: KeysetCursorPayload = serde_json::from_slice(&bytes)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        Ok(Self {
            key: payload.key,
            direction: payload.direction,
        })
    }
}

/// Resolve the current position from a URL query string.
///
/// Missing, non-numeric or zero page numbers resolve to the first page; a
/// missing or empty cursor resolves to the start of the result set.
pub fn resolve_position(query_string: &str, param: &str, strategy: Strategy) -> Position {
    let raw = url::form_urlencoded::parse(query_string.trim_start_matches('?').as_bytes())
        .find(|(name, _)| name == param)
        .map(|(_, value)| value.into_owned());

    match strategy {
        Strategy::Offset | Strategy::SimpleOffset => raw
            .as_deref()
            .and_then(|value| Position::parse_page(value).ok())
            .unwrap_or_else(Position::first_page),
        Strategy::Cursor => Position::Cursor(raw.filter(|value| !value.is_empty())),
    }
}

#[derive(Debug, Error)]
pub enum PaginationError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("invalid page number `{0}`")]
    InvalidPage(String),
    #[error("invalid position parameter `{0}`: must not contain `:`")]
    InvalidParam(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).expect("non-zero size")
    }

    fn page(n: u64) -> NonZeroU64 {
        NonZeroU64::new(n).expect("non-zero page")
    }

    #[test]
    fn page_numbers_normalize() {
        assert_eq!(Position::parse_page("01").unwrap(), Position::Page(page(1)));
        assert_eq!(Position::parse_page(" 7 ").unwrap().token(), "7");
        assert!(matches!(
            Position::parse_page("0"),
            Err(PaginationError::InvalidPage(_))
        ));
        assert!(Position::parse_page("two").is_err());
    }

    #[test]
    fn offset_rows_follow_page_number() {
        let descriptor = PaginationDescriptor::offset(size(15), "page", page(3));
        assert_eq!(descriptor.offset_rows(), 30);
        assert_eq!(descriptor.page_number(), Some(3));
        assert_eq!(descriptor.cursor_token(), None);
    }

    #[test]
    fn empty_cursor_is_treated_as_absent() {
        let descriptor = PaginationDescriptor::cursor(size(10), "cursor", Some(String::new()));
        assert_eq!(descriptor.position(), &Position::Cursor(None));
        assert_eq!(descriptor.position().token(), "");
    }

    #[test]
    fn colons_in_param_or_cursor_are_rejected() {
        let param = PaginationDescriptor::cursor(size(10), "c:x", Some("y".to_string()));
        assert!(matches!(
            param.validate(),
            Err(PaginationError::InvalidParam(name)) if name == "c:x"
        ));

        let cursor = PaginationDescriptor::cursor(size(10), "c", Some("x:y".to_string()));
        assert!(matches!(cursor.validate(), Err(PaginationError::InvalidCursor(_))));

        let fine = PaginationDescriptor::offset(size(10), "users_page", page(2));
        assert!(fine.validate().is_ok());
    }

    #[test]
    fn length_aware_page_computes_last_page() {
        let descriptor = PaginationDescriptor::offset(size(15), "page", page(1));
        let result = Page::length_aware(vec![1; 15], 20, &descriptor);
        assert_eq!(
            result.meta,
            PageMeta::LengthAware {
                current_page: 1,
                total: 20,
                last_page: 2
            }
        );

        let empty: Page<u8> = Page::length_aware(vec![], 0, &descriptor);
        assert!(matches!(empty.meta, PageMeta::LengthAware { last_page: 1, .. }));
    }

    #[test]
    fn keyset_cursor_round_trip() {
        let cursor = KeysetCursor::next(serde_json::json!(42));
        let decoded = KeysetCursor::decode(&cursor.encode()).expect("decoded cursor");
        assert_eq!(decoded, cursor);
        assert_eq!(decoded.direction(), CursorDirection::Next);
    }

    #[test]
    fn decoding_invalid_cursor_reports_error() {
        let err = KeysetCursor::decode("not-base64!").expect_err("invalid cursor rejected");
        assert!(matches!(err, PaginationError::InvalidCursor(_)));
    }

    #[test]
    fn resolve_position_from_query_string() {
        assert_eq!(
            resolve_position("?page=3&sort=name", "page", Strategy::Offset),
            Position::Page(page(3))
        );
        assert_eq!(
            resolve_position("users_page=2", "page", Strategy::SimpleOffset),
            Position::first_page()
        );
        assert_eq!(
            resolve_position("page=-4", "page", Strategy::Offset),
            Position::first_page()
        );
        assert_eq!(
            resolve_position("cursor=abc", "cursor", Strategy::Cursor),
            Position::Cursor(Some("abc".to_string()))
        );
        assert_eq!(
            resolve_position("cursor=", "cursor", Strategy::Cursor),
            Position::Cursor(None)
        );
    }

    #[test]
    fn fields_default_to_star() {
        assert!(Fields::default().is_all());
        assert!(Fields::new(Vec::<String>::new()).is_all());
        assert_eq!(Fields::new(["id", "name"]).joined(), "id,name");
    }
}
