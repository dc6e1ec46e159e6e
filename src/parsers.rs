//! Parsers for filter and tag-name lists
//!
//! Filter strings use the grammar
//!
//! ```text
//! FILTERS ::= FILTER ( ';' FILTER )*
//! FILTER  ::= NAME '=' VALUE ( ',' VALUE )*
//! ```
//!
//! and tag-name lists are comma separated names. Whitespace around the
//! separators is ignored. Both parsers are pure and run before any network
//! activity, so a bad configuration is rejected at startup.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

static FILTER_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*;\s*").expect("filter separator pattern is valid"));
static KEY_VALUE_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*=\s*").expect("key/value separator pattern is valid"));
static LIST_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*,\s*").expect("list separator pattern is valid"));

/// Malformed filter or tag-name configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Could not process key value pair '{segment}'")]
    InvalidFilterSyntax { segment: String },

    #[error("empty value for filter {name}")]
    EmptyFilterValue { name: String },

    #[error("empty tag name in {input}")]
    EmptyTagName { input: String },
}

/// Result type for configuration parsing
pub type ParseResult<T> = Result<T, ParseError>;

/// A named set of acceptable values for a DescribeInstances query.
///
/// Always has a non-empty name and at least one non-empty value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilterCriterion {
    name: String,
    values: Vec<String>,
}

impl FilterCriterion {
    pub fn new<N, I, V>(name: N, values: I) -> ParseResult<Self>
    where
        N: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();

        if name.trim().is_empty() {
            return Err(ParseError::InvalidFilterSyntax {
                segment: format!("={}", values.join(",")),
            });
        }
        if values.is_empty() || values.iter().any(|v| v.trim().is_empty()) {
            return Err(ParseError::EmptyFilterValue { name });
        }

        Ok(Self { name, values })
    }

    /// Filter matching instances that carry `key` with the given value
    pub fn for_tag(key: &str, value: impl Into<String>) -> ParseResult<Self> {
        Self::new(format!("tag:{}", key), [value.into()])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }
}

impl fmt::Display for FilterCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.values.join(","))
    }
}

/// A tag key used to derive filters from the local instance's own tags
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TagName(String);

impl TagName {
    pub fn new(name: impl Into<String>) -> ParseResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ParseError::EmptyTagName { input: name });
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TagName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parses a filter string into the criteria for a DescribeInstances call.
///
/// Empty segments are skipped, so `""` and `"a=b;"` are both fine.
pub fn filters(input: &str) -> ParseResult<Vec<FilterCriterion>> {
    let mut criteria = Vec::new();

    for segment in FILTER_SEPARATOR.split(input) {
        let trimmed = segment.trim();
        if trimmed.is_empty() {
            continue;
        }

        let key_values: Vec<&str> = KEY_VALUE_SEPARATOR.split(trimmed).collect();
        if key_values.len() != 2 || key_values[0].is_empty() {
            return Err(ParseError::InvalidFilterSyntax {
                segment: segment.to_string(),
            });
        }

        let name = key_values[0];
        let value_part = key_values[1].trim();
        if value_part.is_empty() {
            return Err(ParseError::EmptyFilterValue {
                name: name.to_string(),
            });
        }

        let values: Vec<&str> = LIST_SEPARATOR.split(value_part).collect();
        criteria.push(FilterCriterion::new(name, values)?);
    }

    Ok(criteria)
}

/// Parses a comma separated list of tag names.
///
/// `None` and blank input yield an empty list. Order and duplicates are kept.
pub fn tag_names(input: Option<&str>) -> ParseResult<Vec<TagName>> {
    let trimmed = match input.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return Ok(Vec::new()),
    };

    LIST_SEPARATOR
        .split(trimmed)
        .map(|name| {
            TagName::new(name).map_err(|_| ParseError::EmptyTagName {
                input: trimmed.to_string(),
            })
        })
        .collect()
}
