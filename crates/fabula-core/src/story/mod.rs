//! Story - versioned narratives and their structure
//!
//! A story is split into chapters, scenes and beats. Every edit that needs a
//! new revision produces a new `Story` row in the same lineage: all versions
//! share `root_story_id` and each points at its predecessor.

mod beat;
mod chapter;
mod content;
mod scene;

pub use beat::{Beat, BeatType};
pub use chapter::{Chapter, ChapterStatus};
pub use content::{ContentAnchor, ContentBlock, ContentBlockReference, ContentKind, ContentType};
pub use scene::{Scene, SceneReference};

use crate::error::{require_non_empty, Error, Result};
use crate::time::now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Publication status shared by stories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    /// Being written
    #[default]
    Draft,
    /// Visible to readers
    Published,
    /// Retired
    Archived,
}

impl StoryStatus {
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

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoryStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("unknown story status: {s}")),
        }
    }
}

/// One version of a story
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// World the story is set in
    pub world_id: Option<Uuid>,
    /// Title
    pub title: String,
    /// Publication status
    pub status: StoryStatus,
    /// Position in the lineage, starting at 1
    pub version_number: i32,
    /// First version of the lineage (itself for version 1)
    pub root_story_id: Uuid,
    /// Direct predecessor; `None` iff `version_number == 1`
    pub previous_story_id: Option<Uuid>,
    /// Author
    pub created_by_user_id: Option<Uuid>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Story {
    /// Create version 1 of a new lineage
    #[must_use]
    pub fn new(tenant_id: Uuid, title: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        let ts = now();
        Self {
            id,
            tenant_id,
            world_id: None,
            title: title.into(),
            status: StoryStatus::Draft,
            version_number: 1,
            root_story_id: id,
            previous_story_id: None,
            created_by_user_id: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Derive the next version with the given number, as a draft
    #[must_use]
    pub fn next_version(&self, version_number: i32) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4(),
            tenant_id: self.tenant_id,
            world_id: self.world_id,
            title: self.title.clone(),
            status: StoryStatus::Draft,
            version_number,
            root_story_id: self.root_story_id,
            previous_story_id: Some(self.id),
            created_by_user_id: self.created_by_user_id,
            created_at: ts,
            updated_at: ts,
        }
    }

    /// True for the first version of a lineage
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.id == self.root_story_id
    }

    /// Check the invariants enforced on write
    pub fn validate(&self) -> Result<()> {
        require_non_empty("title", &self.title)?;
        if self.version_number < 1 {
            return Err(Error::validation("version_number", "must be at least 1"));
        }
        match (self.version_number, self.previous_story_id) {
            (1, Some(_)) => Err(Error::validation(
                "previous_story_id",
                "version 1 cannot have a previous version",
            )),
            (v, None) if v > 1 => Err(Error::validation(
                "previous_story_id",
                format!("version {v} must point at its previous version"),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_story_is_its_own_root() {
        let story = Story::new(Uuid::new_v4(), "The Long Night");
        assert!(story.is_root());
        assert_eq!(story.version_number, 1);
        assert!(story.validate().is_ok());
    }

    #[test]
    fn test_next_version_shares_root() {
        let v1 = Story::new(Uuid::new_v4(), "The Long Night");
        let v2 = v1.next_version(2);
        assert_eq!(v2.root_story_id, v1.id);
        assert_eq!(v2.previous_story_id, Some(v1.id));
        assert!(!v2.is_root());
        assert!(v2.validate().is_ok());
    }

    #[test]
    fn test_lineage_validation() {
        let mut story = Story::new(Uuid::new_v4(), "Orphan");
        story.version_number = 3;
        assert!(story.validate().unwrap_err().is_validation());

        story.version_number = 0;
        assert!(story.validate().is_err());

        let mut v1 = Story::new(Uuid::new_v4(), "Bad root");
        v1.previous_story_id = Some(Uuid::new_v4());
        assert!(v1.validate().is_err());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("archived".parse::<StoryStatus>().unwrap(), StoryStatus::Archived);
        assert!("lost".parse::<StoryStatus>().is_err());
    }
}
