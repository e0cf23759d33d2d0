use crate::error::{require_non_empty, Error, Result};
use crate::time::now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Chapter status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    /// Being written
    #[default]
    Draft,
    /// Visible to readers
    Published,
    /// Retired
    Archived,
}

impl ChapterStatus {
    /// Persisted representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ChapterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChapterStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("unknown chapter status: {s}")),
        }
    }
}

/// Numbered chapter of a story version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Story version the chapter belongs to
    pub story_id: Uuid,
    /// Position in the story, starting at 1
    pub number: i32,
    /// Title
    pub title: String,
    /// Status
    pub status: ChapterStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Chapter {
    /// Create a draft chapter
    #[must_use]
    pub fn new(tenant_id: Uuid, story_id: Uuid, number: i32, title: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            story_id,
            number,
            title: title.into(),
            status: ChapterStatus::Draft,
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Check the invariants enforced on write
    pub fn validate(&self) -> Result<()> {
        require_non_empty("title", &self.title)?;
        if self.number < 1 {
            return Err(Error::validation("number", "must be at least 1"));
        }
        Ok(())
    }
}
