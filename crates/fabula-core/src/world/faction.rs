//! Factions and the references attaching them to other entities

use super::hierarchy::impl_hierarchical;
use crate::entity_type::EntityType;
use crate::error::{require_non_empty, Result};
use crate::time::now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An organisation; sub-factions point at their parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faction {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// World the faction belongs to
    pub world_id: Uuid,
    /// Parent faction
    pub parent_id: Option<Uuid>,
    /// Display name
    pub name: String,
    /// Kind of organisation (e.g. "guild")
    pub faction_type: Option<String>,
    /// Free-form description
    pub description: String,
    /// What the faction believes
    pub beliefs: String,
    /// How it is organised
    pub structure: String,
    /// Heraldry, colours, emblems
    pub symbols: String,
    /// Depth in the faction tree (root = 0)
    pub hierarchy_level: i32,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Faction {
    /// Create a root faction
    #[must_use]
    pub fn new(tenant_id: Uuid, world_id: Uuid, name: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            world_id,
            parent_id: None,
            name: name.into(),
            faction_type: None,
            description: String::new(),
            beliefs: String::new(),
            structure: String::new(),
            symbols: String::new(),
            hierarchy_level: 0,
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Nest under `parent_id` (the level is derived on write)
    #[must_use]
    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Check the invariants enforced on write
    pub fn validate(&self) -> Result<()> {
        require_non_empty("name", &self.name)
    }
}

impl_hierarchical!(Faction, "faction");

/// Attaches a faction to an entity, with an optional role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactionReference {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant (taken from the faction on write)
    pub tenant_id: Uuid,
    /// Faction side
    pub faction_id: Uuid,
    /// Kind of the referenced entity
    pub entity_type: EntityType,
    /// Referenced entity
    pub entity_id: Uuid,
    /// Role of the entity in the faction (e.g. "leader")
    pub role: Option<String>,
    /// Free-form notes
    pub notes: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl FactionReference {
    /// Create a reference
    #[must_use]
    pub fn new(faction_id: Uuid, entity_type: EntityType, entity_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            faction_id,
            entity_type,
            entity_id,
            role: None,
            notes: String::new(),
            created_at: now(),
        }
    }

    /// Set the role
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}
