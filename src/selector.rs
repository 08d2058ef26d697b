/// Attribute selectors for change-log queries.
///
/// A selector decides which entries a [`ChangeLog::filter`] keeps and which
/// a [`ChangeLog::exclude`] drops. An absent or empty selector matches every
/// attribute, so `filter` with no attributes keeps the whole log and
/// `exclude` with no attributes drops all of it.
///
/// [`ChangeLog::filter`]: crate::ChangeLog::filter
/// [`ChangeLog::exclude`]: crate::ChangeLog::exclude
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::error::{TrackError, TrackResult};

/// Which attributes a query applies to.
#[derive(Debug, Clone, Default)]
pub enum AttributeSelector {
    /// Every attribute.
    #[default]
    All,
    /// Attributes whose name is in the list. An empty list behaves like `All`.
    Names(Vec<String>),
    /// Attributes whose name matches the regex.
    Pattern(Regex),
}

impl AttributeSelector {
    /// Select a list of attribute names.
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Names(names.into_iter().map(Into::into).collect())
    }

    /// Select attributes by regex.
    pub fn pattern(pattern: &str) -> TrackResult<Self> {
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|e| TrackError::invalid_argument(format!("bad attribute pattern: {e}")))
    }

    /// Whether this selector matches every attribute.
    pub fn is_all(&self) -> bool {
        match self {
            Self::All => true,
            Self::Names(names) => names.is_empty(),
            Self::Pattern(_) => false,
        }
    }

    /// Evaluate the selector against an attribute name.
    pub fn matches(&self, attribute: &str) -> bool {
        match self {
            Self::All => true,
            Self::Names(names) => names.is_empty() || names.iter().any(|n| n == attribute),
            Self::Pattern(re) => re.is_match(attribute),
        }
    }
}

impl From<&str> for AttributeSelector {
    fn from(name: &str) -> Self {
        if name.is_empty() {
            Self::All
        } else {
            Self::Names(vec![name.to_string()])
        }
    }
}

impl From<String> for AttributeSelector {
    fn from(name: String) -> Self {
        name.as_str().into()
    }
}

impl From<Vec<String>> for AttributeSelector {
    fn from(names: Vec<String>) -> Self {
        Self::Names(names)
    }
}

impl From<Vec<&str>> for AttributeSelector {
    fn from(names: Vec<&str>) -> Self {
        Self::names(names)
    }
}

impl From<&[&str]> for AttributeSelector {
    fn from(names: &[&str]) -> Self {
        Self::names(names.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for AttributeSelector {
    fn from(names: [&str; N]) -> Self {
        Self::names(names)
    }
}

impl<S: Into<AttributeSelector>> From<Option<S>> for AttributeSelector {
    fn from(selector: Option<S>) -> Self {
        selector.map_or(Self::All, Into::into)
    }
}

impl TryFrom<&JsonValue> for AttributeSelector {
    type Error = TrackError;

    /// Accepts `null`, a string, or an array of strings; anything else is
    /// rejected rather than silently matching nothing.
    fn try_from(value: &JsonValue) -> TrackResult<Self> {
        match value {
            JsonValue::Null => Ok(Self::All),
            JsonValue::String(name) => Ok(name.as_str().into()),
            JsonValue::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        TrackError::invalid_argument(format!(
                            "attribute list must contain only strings, found {item}"
                        ))
                    })
                })
                .collect::<TrackResult<Vec<_>>>()
                .map(Self::Names),
            other => Err(TrackError::invalid_argument(format!(
                "attributes must be a string or a list of strings, found {other}"
            ))),
        }
    }
}
