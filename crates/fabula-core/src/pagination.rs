//! Pagination primitives shared by offset- and cursor-paginated lists

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Limit applied when the caller passes zero
pub const DEFAULT_LIMIT: i64 = 50;
/// Hard upper bound; larger limits are clamped silently
pub const MAX_LIMIT: i64 = 100;

/// Resolve a caller-supplied limit
///
/// Negative values are rejected, zero becomes [`DEFAULT_LIMIT`] and anything
/// above [`MAX_LIMIT`] is clamped.
pub fn clamp_limit(limit: i64) -> Result<i64> {
    match limit {
        l if l < 0 => Err(Error::validation("limit", format!("must not be negative, got {l}"))),
        0 => Ok(DEFAULT_LIMIT),
        l => Ok(l.min(MAX_LIMIT)),
    }
}

/// Validated limit/offset pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Rows to return (already clamped)
    pub limit: i64,
    /// Rows to skip
    pub offset: i64,
}

impl Page {
    /// Validate and clamp a limit/offset pair
    pub fn new(limit: i64, offset: i64) -> Result<Self> {
        if offset < 0 {
            return Err(Error::validation(
                "offset",
                format!("must not be negative, got {offset}"),
            ));
        }
        Ok(Self {
            limit: clamp_limit(limit)?,
            offset,
        })
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

/// Sort direction for cursor-paginated lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending (default)
    #[default]
    Asc,
    /// Descending
    Desc,
}

impl SortDirection {
    /// SQL keyword
    #[must_use]
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Comparison operator that selects rows strictly after a cursor
    #[must_use]
    pub fn after_operator(&self) -> &'static str {
        match self {
            Self::Asc => ">",
            Self::Desc => "<",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(Error::validation(
                "direction",
                format!("unknown sort direction: {other}"),
            )),
        }
    }
}

/// One page of a cursor-paginated list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResult<T> {
    /// Rows on this page
    pub items: Vec<T>,
    /// Whether another page follows
    pub has_more: bool,
    /// Cursor for the next page, present iff `has_more`
    pub next_cursor: Option<String>,
}

impl<T> ListResult<T> {
    /// An empty last page
    #[must_use]
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            has_more: false,
            next_cursor: None,
        }
    }

    /// Number of rows on this page
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the page holds no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0).unwrap(), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(7).unwrap(), 7);
        assert_eq!(clamp_limit(100).unwrap(), 100);
        assert_eq!(clamp_limit(5000).unwrap(), MAX_LIMIT);
        assert!(clamp_limit(-1).unwrap_err().is_validation());
    }

    #[test]
    fn test_page() {
        let page = Page::new(500, 20).unwrap();
        assert_eq!(page.limit, MAX_LIMIT);
        assert_eq!(page.offset, 20);
        assert!(Page::new(10, -1).unwrap_err().is_validation());
        assert_eq!(Page::default(), Page::new(0, 0).unwrap());
    }

    #[test]
    fn test_direction() {
        assert_eq!("DESC".parse::<SortDirection>().unwrap(), SortDirection::Desc);
        assert_eq!(SortDirection::default().as_sql(), "ASC");
        assert_eq!(SortDirection::Desc.after_operator(), "<");
        assert!("sideways".parse::<SortDirection>().is_err());
    }
}
