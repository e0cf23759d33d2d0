//! Artifacts and the references attaching them to holders

use crate::entity_type::EntityType;
use crate::error::{require_non_empty, Error, Result};
use crate::time::now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A notable object inside a world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// World the artifact belongs to
    pub world_id: Uuid,
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Rarity label (e.g. "legendary")
    pub rarity: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Artifact {
    /// Create an artifact
    #[must_use]
    pub fn new(tenant_id: Uuid, world_id: Uuid, name: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            world_id,
            name: name.into(),
            description: String::new(),
            rarity: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Check the invariants enforced on write
    pub fn validate(&self) -> Result<()> {
        require_non_empty("name", &self.name)
    }
}

/// Attaches an artifact to the character carrying it or the location holding it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactReference {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant (taken from the artifact on write)
    pub tenant_id: Uuid,
    /// Artifact side
    pub artifact_id: Uuid,
    /// Kind of the referenced entity
    pub entity_type: EntityType,
    /// Referenced entity
    pub entity_id: Uuid,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl ArtifactReference {
    /// Create a reference
    #[must_use]
    pub fn new(artifact_id: Uuid, entity_type: EntityType, entity_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            artifact_id,
            entity_type,
            entity_id,
            created_at: now(),
        }
    }

    /// Only characters and locations can hold an artifact
    pub fn validate(&self) -> Result<()> {
        match self.entity_type {
            EntityType::Character | EntityType::Location => Ok(()),
            other => Err(Error::validation(
                "entity_type",
                format!("artifact cannot be attached to {other}"),
            )),
        }
    }
}
