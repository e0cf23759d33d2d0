//! Lore entries (magic systems, religions, histories) and their references

use super::hierarchy::impl_hierarchical;
use crate::entity_type::EntityType;
use crate::error::{require_non_empty, Result};
use crate::time::now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A lore entry; sub-entries point at their parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lore {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// World the entry belongs to
    pub world_id: Uuid,
    /// Parent entry
    pub parent_id: Option<Uuid>,
    /// Display name
    pub name: String,
    /// Grouping label (e.g. "magic")
    pub category: Option<String>,
    /// Free-form description
    pub description: String,
    /// How it works
    pub rules: String,
    /// What it cannot do
    pub limitations: String,
    /// What it takes
    pub requirements: String,
    /// Depth in the lore tree (root = 0)
    pub hierarchy_level: i32,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Lore {
    /// Create a root lore entry
    #[must_use]
    pub fn new(tenant_id: Uuid, world_id: Uuid, name: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            world_id,
            parent_id: None,
            name: name.into(),
            category: None,
            description: String::new(),
            rules: String::new(),
            limitations: String::new(),
            requirements: String::new(),
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

impl_hierarchical!(Lore, "lore");

/// Attaches a lore entry to an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoreReference {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant (taken from the lore entry on write)
    pub tenant_id: Uuid,
    /// Lore side
    pub lore_id: Uuid,
    /// Kind of the referenced entity
    pub entity_type: EntityType,
    /// Referenced entity
    pub entity_id: Uuid,
    /// How the entity relates to the lore (e.g. "practitioner")
    pub relationship_type: Option<String>,
    /// Free-form notes
    pub notes: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl LoreReference {
    /// Create a reference
    #[must_use]
    pub fn new(lore_id: Uuid, entity_type: EntityType, entity_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            lore_id,
            entity_type,
            entity_id,
            relationship_type: None,
            notes: String::new(),
            created_at: now(),
        }
    }
}
