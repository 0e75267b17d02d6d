//! Logical queries: canonical query text plus ordered parameter bindings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// A single bound parameter value.
///
/// Variants are distinguished in every fingerprint, so `Int(1)` and
/// `Text("1")` never address the same cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum BindValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl BindValue {
    /// Type-tagged, length-prefixed encoding used for key hashing.
    pub fn fingerprint(&self) -> String {
        match self {
            BindValue::Null => "n;".to_string(),
            BindValue::Bool(value) => format!("b:{};", u8::from(*value)),
            BindValue::Int(value) => format!("i:{value};"),
            BindValue::Float(value) => format!("d:{:016x};", value.to_bits()),
            BindValue::Text(value) => format!("s:{}:{value};", value.len()),
        }
    }
}

impl fmt::Display for BindValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindValue::Null => f.write_str("null"),
            BindValue::Bool(value) => write!(f, "bool:{value}"),
            BindValue::Int(value) => write!(f, "int:{value}"),
            BindValue::Float(value) => write!(f, "float:{value}"),
            BindValue::Text(value) => write!(f, "text:{value}"),
        }
    }
}

/// Parses the `kind:value` form used on the command line (`int:42`,
/// `text:alice`, `bool:true`, `float:1.5`, `null`).
impl FromStr for BindValue {
    type Err = DomainError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input == "null" {
            return Ok(BindValue::Null);
        }

        let (kind, raw) = input.split_once(':').ok_or_else(|| {
            DomainError::validation(format!("binding `{input}` must look like `kind:value`"))
        })?;

        match kind {
            "int" => raw
                .trim()
                .parse()
                .map(BindValue::Int)
                .map_err(|err| DomainError::validation(format!("invalid int binding: {err}"))),
            "float" => raw
                .trim()
                .parse()
                .map(BindValue::Float)
                .map_err(|err| DomainError::validation(format!("invalid float binding: {err}"))),
            "bool" => raw
                .trim()
                .parse()
                .map(BindValue::Bool)
                .map_err(|err| DomainError::validation(format!("invalid bool binding: {err}"))),
            "text" => Ok(BindValue::Text(raw.to_string())),
            other => Err(DomainError::validation(format!(
                "unknown binding kind `{other}`"
            ))),
        }
    }
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        BindValue::Int(value)
    }
}

impl From<bool> for BindValue {
    fn from(value: bool) -> Self {
        BindValue::Bool(value)
    }
}

impl From<f64> for BindValue {
    fn from(value: f64) -> Self {
        BindValue::Float(value)
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        BindValue::Text(value.to_string())
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        BindValue::Text(value)
    }
}

/// Immutable description of a data fetch, independent of pagination.
///
/// The text is stored in canonical form: comments are dropped, whitespace
/// runs outside quoted literals and identifiers collapse to a single space,
/// and surrounding whitespace and trailing semicolons are removed. Quoted
/// text (including `E'...'` escape strings and dollar-quoted bodies) is kept
/// byte for byte. The text must not carry a
/// per-page `LIMIT`/`OFFSET`; engines append those themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalQuery {
    sql: String,
    bindings: Vec<BindValue>,
}

impl LogicalQuery {
    pub fn new(sql: &str, bindings: Vec<BindValue>) -> Result<Self, DomainError> {
        let sql = normalize_sql(sql);
        if sql.is_empty() {
            return Err(DomainError::validation("query text must not be empty"));
        }
        Ok(Self { sql, bindings })
    }

    /// Query text in canonical form.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn bindings(&self) -> &[BindValue] {
        &self.bindings
    }
}

fn normalize_sql(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;
    let mut terminated = true;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();

        let skip_to = if ch.is_whitespace() {
            Some(i + 1)
        } else if ch == '-' && next == Some('-') {
            Some(line_comment_end(&chars, i))
        } else if ch == '/' && next == Some('*') {
            Some(block_comment_end(&chars, i))
        } else {
            None
        };
        if let Some(end) = skip_to {
            i = end;
            pending_space = !out.is_empty();
            continue;
        }

        if pending_space {
            out.push(' ');
            pending_space = false;
        }

        match literal_end(&chars, i, out.chars().next_back(), escape_prefix(&out)) {
            Some((end, closed)) => {
                out.extend(&chars[i..end]);
                terminated = closed;
                i = end;
            }
            None => {
                out.push(ch);
                i += 1;
            }
        }
    }

    if terminated {
        while out.ends_with(';') || out.ends_with(' ') {
            out.pop();
        }
    }
    out
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

/// True when `out` ends with a standalone `E`, which makes a following
/// quote an escape string.
fn escape_prefix(out: &str) -> bool {
    let mut tail = out.chars().rev();
    matches!(tail.next(), Some('E' | 'e')) && !tail.next().is_some_and(is_ident_char)
}

/// Index just past the newline ending a `--` comment.
fn line_comment_end(chars: &[char], start: usize) -> usize {
    chars[start..]
        .iter()
        .position(|&ch| ch == '\n')
        .map_or(chars.len(), |offset| start + offset + 1)
}

/// Index just past a `/* */` comment; these nest.
fn block_comment_end(chars: &[char], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < chars.len() {
        match (chars[i], chars[i + 1]) {
            ('/', '*') => {
                depth += 1;
                i += 2;
            }
            ('*', '/') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    chars.len()
}

/// End of the quoted literal or identifier starting at `start`, copied
/// verbatim, and whether it was closed. `None` when no literal starts there.
fn literal_end(
    chars: &[char],
    start: usize,
    previous: Option<char>,
    escapes: bool,
) -> Option<(usize, bool)> {
    match chars[start] {
        '\'' => Some(quoted_end(chars, start, '\'', escapes)),
        '"' => Some(quoted_end(chars, start, '"', false)),
        '$' if !previous.is_some_and(is_ident_char) => dollar_quoted_end(chars, start),
        _ => None,
    }
}

fn quoted_end(chars: &[char], start: usize, quote: char, escapes: bool) -> (usize, bool) {
    let mut i = start + 1;
    while i < chars.len() {
        let ch = chars[i];
        if escapes && ch == '\\' {
            i += 2;
        } else if ch == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
            } else {
                return (i + 1, true);
            }
        } else {
            i += 1;
        }
    }
    (chars.len(), false)
}

/// `$$...$$` or `$tag$...$tag$`. Positional parameters such as `$1` are not
/// dollar quotes because a tag cannot start with a digit.
fn dollar_quoted_end(chars: &[char], start: usize) -> Option<(usize, bool)> {
    let mut i = start + 1;
    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
        i += 1;
    }
    if chars.get(i) != Some(&'$') || chars.get(start + 1).is_some_and(char::is_ascii_digit) {
        return None;
    }

    let delimiter = &chars[start..=i];
    let body = i + 1;
    let close = chars[body..]
        .windows(delimiter.len())
        .position(|window| window == delimiter);
    Some(match close {
        Some(offset) => (body + offset + delimiter.len(), true),
        None => (chars.len(), false),
    })
}
