use crate::entity_type::EntityType;
use crate::error::{Error, Result};
use crate::time::now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Media type of a content block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Prose
    #[default]
    Text,
    /// Image URL or reference
    Image,
    /// Video URL
    Video,
    /// Audio URL
    Audio,
    /// Embedded widget
    Embed,
    /// Plain hyperlink
    Link,
}

impl ContentType {
    /// Persisted representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Embed => "embed",
            Self::Link => "link",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "embed" => Ok(Self::Embed),
            "link" => Ok(Self::Link),
            _ => Err(format!("unknown content type: {s}")),
        }
    }
}

/// Editorial variant of a content block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Accepted text
    Final,
    /// First alternative
    AltA,
    /// Second alternative
    AltB,
    /// Copy-edited
    Cleaned,
    /// Translated
    Localized,
    /// Work in progress
    #[default]
    Draft,
    /// Preview image
    Thumbnail,
}

impl ContentKind {
    /// Persisted representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Final => "final",
            Self::AltA => "alt_a",
            Self::AltB => "alt_b",
            Self::Cleaned => "cleaned",
            Self::Localized => "localized",
            Self::Draft => "draft",
            Self::Thumbnail => "thumbnail",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "final" => Ok(Self::Final),
            "alt_a" => Ok(Self::AltA),
            "alt_b" => Ok(Self::AltB),
            "cleaned" => Ok(Self::Cleaned),
            "localized" => Ok(Self::Localized),
            "draft" => Ok(Self::Draft),
            "thumbnail" => Ok(Self::Thumbnail),
            _ => Err(format!("unknown content kind: {s}")),
        }
    }
}

/// A block of content (prose, media) optionally placed in a chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Chapter the block is placed in
    pub chapter_id: Option<Uuid>,
    /// Position within the chapter
    pub order_num: Option<i32>,
    /// Media type
    pub content_type: ContentType,
    /// Editorial variant
    pub kind: ContentKind,
    /// Body
    pub content: String,
    /// Free-form metadata (always an object, `{}` when empty)
    pub metadata: Map<String, Value>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl ContentBlock {
    /// Create a draft text block
    #[must_use]
    pub fn new(tenant_id: Uuid, chapter_id: Option<Uuid>, content: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            chapter_id,
            order_num: None,
            content_type: ContentType::Text,
            kind: ContentKind::Draft,
            content: content.into(),
            metadata: Map::new(),
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Set the editorial variant
    #[must_use]
    pub fn with_kind(mut self, kind: ContentKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the position
    #[must_use]
    pub fn at(mut self, order_num: i32) -> Self {
        self.order_num = Some(order_num);
        self
    }
}

/// Anchors a content block to a world entity it mentions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAnchor {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Content block side
    pub content_block_id: Uuid,
    /// Kind of the anchored entity
    pub entity_type: EntityType,
    /// Anchored entity
    pub entity_id: Uuid,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl ContentAnchor {
    /// Create an anchor
    #[must_use]
    pub fn new(
        tenant_id: Uuid,
        content_block_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            content_block_id,
            entity_type,
            entity_id,
            created_at: now(),
        }
    }

    /// Content anchors point at characters, locations and artifacts
    pub fn validate(&self) -> Result<()> {
        match self.entity_type {
            EntityType::Character | EntityType::Location | EntityType::Artifact => Ok(()),
            other => Err(Error::validation(
                "entity_type",
                format!("content block cannot be anchored to {other}"),
            )),
        }
    }
}

/// References any entity (story or world side) from a content block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlockReference {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant (taken from the content block on write)
    pub tenant_id: Uuid,
    /// Content block side
    pub content_block_id: Uuid,
    /// Kind of the referenced entity
    pub entity_type: EntityType,
    /// Referenced entity
    pub entity_id: Uuid,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl ContentBlockReference {
    /// Create a reference
    #[must_use]
    pub fn new(content_block_id: Uuid, entity_type: EntityType, entity_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            content_block_id,
            entity_type,
            entity_id,
            created_at: now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in [
            ContentKind::Final,
            ContentKind::AltA,
            ContentKind::AltB,
            ContentKind::Cleaned,
            ContentKind::Localized,
            ContentKind::Draft,
            ContentKind::Thumbnail,
        ] {
            assert_eq!(kind.as_str().parse::<ContentKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_anchor_targets() {
        let tenant = Uuid::new_v4();
        let block = Uuid::new_v4();
        let ok = ContentAnchor::new(tenant, block, EntityType::Artifact, Uuid::new_v4());
        assert!(ok.validate().is_ok());
        let bad = ContentAnchor::new(tenant, block, EntityType::Scene, Uuid::new_v4());
        assert!(bad.validate().unwrap_err().is_validation());
    }
}
