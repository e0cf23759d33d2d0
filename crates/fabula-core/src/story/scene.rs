use crate::entity_type::EntityType;
use crate::error::{Error, Result};
use crate::time::now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scene of a story, optionally placed in a chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Story version the scene belongs to
    pub story_id: Uuid,
    /// Chapter the scene is placed in
    pub chapter_id: Option<Uuid>,
    /// Position within the chapter (or the story when unplaced)
    pub order_num: i32,
    /// Point-of-view character
    pub pov_character_id: Option<Uuid>,
    /// Free-form time reference ("dawn, day three")
    pub time_ref: String,
    /// What the scene must achieve
    pub goal: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Scene {
    /// Create a scene
    #[must_use]
    pub fn new(tenant_id: Uuid, story_id: Uuid, chapter_id: Option<Uuid>, order_num: i32) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            story_id,
            chapter_id,
            order_num,
            pov_character_id: None,
            time_ref: String::new(),
            goal: String::new(),
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Check the invariants enforced on write
    pub fn validate(&self) -> Result<()> {
        if self.order_num < 0 {
            return Err(Error::validation("order_num", "must not be negative"));
        }
        Ok(())
    }
}

/// Binds a scene to a world entity appearing in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneReference {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Scene side
    pub scene_id: Uuid,
    /// Kind of the referenced entity
    pub entity_type: EntityType,
    /// Referenced entity
    pub entity_id: Uuid,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl SceneReference {
    /// Create a reference
    #[must_use]
    pub fn new(tenant_id: Uuid, scene_id: Uuid, entity_type: EntityType, entity_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            scene_id,
            entity_type,
            entity_id,
            created_at: now(),
        }
    }

    /// Scenes reference characters, locations and artifacts
    pub fn validate(&self) -> Result<()> {
        match self.entity_type {
            EntityType::Character | EntityType::Location | EntityType::Artifact => Ok(()),
            other => Err(Error::validation(
                "entity_type",
                format!("scene cannot reference {other}"),
            )),
        }
    }
}
