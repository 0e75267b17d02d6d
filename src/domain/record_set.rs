//! Named record sets (tables or collections) that cached pages derive from.

use std::num::NonZeroU32;

use super::error::DomainError;

pub const DEFAULT_PER_PAGE: u32 = 15;

/// A logical collection of records plus its default page size.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordSet {
    name: String,
    per_page: NonZeroU32,
}

impl RecordSet {
    /// Names may not be empty or contain `:` or whitespace, since they are
    /// embedded verbatim in colon-joined cache keys and tags.
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.is_empty() {
            return Err(DomainError::validation("record set name must not be empty"));
        }
        if name.chars().any(|ch| ch == ':' || ch.is_whitespace()) {
            return Err(DomainError::validation(format!(
                "record set name `{name}` must not contain `:` or whitespace"
            )));
        }
        Ok(Self {
            name,
            per_page: NonZeroU32::new(DEFAULT_PER_PAGE).unwrap_or(NonZeroU32::MIN),
        })
    }

    pub fn with_per_page(mut self, per_page: NonZeroU32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn per_page(&self) -> NonZeroU32 {
        self.per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_fifteen_per_page() {
        let set = RecordSet::new("test_models").expect("valid name");
        assert_eq!(set.name(), "test_models");
        assert_eq!(set.per_page().get(), 15);
    }

    #[test]
    fn rejects_names_that_break_key_layout() {
        assert!(RecordSet::new("").is_err());
        assert!(RecordSet::new("a:b").is_err());
        assert!(RecordSet::new("a b").is_err());
    }
}
