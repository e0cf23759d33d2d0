//! Characters, their trait bindings and their pairwise relationships

use super::catalogue::Trait;
use crate::error::{require_non_empty, Error, Result};
use crate::time::now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// World-scoped character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// World the character lives in
    pub world_id: Uuid,
    /// Archetype the character was built from
    pub archetype_id: Option<Uuid>,
    /// Current RPG class
    pub current_class_id: Option<Uuid>,
    /// Level in the current class (starts at 1)
    pub class_level: i32,
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Character {
    /// Create a character at class level 1
    #[must_use]
    pub fn new(tenant_id: Uuid, world_id: Uuid, name: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            world_id,
            archetype_id: None,
            current_class_id: None,
            class_level: 1,
            name: name.into(),
            description: String::new(),
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Check the invariants enforced on write
    pub fn validate(&self) -> Result<()> {
        require_non_empty("name", &self.name)?;
        if self.class_level < 1 {
            return Err(Error::validation("class_level", "must be at least 1"));
        }
        Ok(())
    }
}

/// A trait bound to a character
///
/// The trait's name, category and description are copied at bind time and
/// do not follow later edits of the trait until the snapshot is refreshed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterTrait {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant (taken from the character on write)
    pub tenant_id: Uuid,
    /// Character side
    pub character_id: Uuid,
    /// Trait side
    pub trait_id: Uuid,
    /// Snapshot of the trait name
    pub trait_name: String,
    /// Snapshot of the trait category
    pub trait_category: Option<String>,
    /// Snapshot of the trait description
    pub trait_description: String,
    /// Per-character value
    pub value: String,
    /// Per-character notes
    pub notes: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl CharacterTrait {
    /// Bind `trait_` to a character, snapshotting its current fields
    #[must_use]
    pub fn bind(character_id: Uuid, trait_: &Trait, value: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4(),
            tenant_id: trait_.tenant_id,
            character_id,
            trait_id: trait_.id,
            trait_name: trait_.name.clone(),
            trait_category: trait_.category.clone(),
            trait_description: trait_.description.clone(),
            value: value.into(),
            notes: String::new(),
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Copy the current fields of `trait_` into the snapshot
    pub fn refresh_snapshot(&mut self, trait_: &Trait) {
        self.trait_name = trait_.name.clone();
        self.trait_category = trait_.category.clone();
        self.trait_description = trait_.description.clone();
    }
}

/// Pairwise relationship between two characters
///
/// Unlike an entity relation, a bidirectional relationship is a single row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRelationship {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// First character
    pub character1_id: Uuid,
    /// Second character
    pub character2_id: Uuid,
    /// Relationship label (e.g. "rival")
    pub relationship_type: String,
    /// Free-form description
    pub description: String,
    /// Whether the relationship reads the same from both sides
    pub bidirectional: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl CharacterRelationship {
    /// Create a one-directional relationship
    #[must_use]
    pub fn new(
        tenant_id: Uuid,
        character1_id: Uuid,
        character2_id: Uuid,
        relationship_type: impl Into<String>,
    ) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            character1_id,
            character2_id,
            relationship_type: relationship_type.into(),
            description: String::new(),
            bidirectional: false,
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Check the invariants enforced on write
    pub fn validate(&self) -> Result<()> {
        require_non_empty("relationship_type", &self.relationship_type)?;
        if self.character1_id == self.character2_id {
            return Err(Error::validation(
                "character2_id",
                "a character cannot relate to itself",
            ));
        }
        Ok(())
    }

    /// The other side of the relationship, if `character_id` is one side
    #[must_use]
    pub fn counterpart(&self, character_id: Uuid) -> Option<Uuid> {
        if character_id == self.character1_id {
            Some(self.character2_id)
        } else if character_id == self.character2_id {
            Some(self.character1_id)
        } else {
            None
        }
    }
}
