//! World - containers of fictional world-state and the entities inside them

mod artifact;
mod catalogue;
mod character;
mod event;
mod faction;
pub mod hierarchy;
mod location;
mod lore;

pub use artifact::{Artifact, ArtifactReference};
pub use catalogue::{Archetype, ArchetypeTrait, Trait};
pub use character::{Character, CharacterRelationship, CharacterTrait};
pub use event::{Event, EventArtifact, EventCharacter, EventLocation, EventReference};
pub use faction::{Faction, FactionReference};
pub use hierarchy::{Hierarchical, MAX_HIERARCHY_DEPTH};
pub use location::Location;
pub use lore::{Lore, LoreReference};

use crate::error::{require_non_empty, Result};
use crate::time::now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A world owned by a tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct World {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Genre label
    pub genre: Option<String>,
    /// Created implicitly (e.g. alongside a story) rather than by the author
    pub is_implicit: bool,
    /// Attached RPG rule system
    pub rpg_system_id: Option<Uuid>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl World {
    /// Create an explicit world
    #[must_use]
    pub fn new(tenant_id: Uuid, name: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.into(),
            description: String::new(),
            genre: None,
            is_implicit: false,
            rpg_system_id: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Check the invariants enforced on write
    pub fn validate(&self) -> Result<()> {
        require_non_empty("name", &self.name)
    }
}
