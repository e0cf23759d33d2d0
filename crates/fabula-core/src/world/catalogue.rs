//! Tenant-scoped catalogue: archetypes, traits and their bindings

use crate::error::{require_non_empty, Result};
use crate::time::now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Character archetype (e.g. "Mentor", "Trickster")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archetype {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Archetype {
    /// Create an archetype
    #[must_use]
    pub fn new(tenant_id: Uuid, name: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.into(),
            description: String::new(),
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Check the invariants enforced on write
    pub fn validate(&self) -> Result<()> {
        require_non_empty("name", &self.name)
    }
}

/// Reusable character trait definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trait {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Display name
    pub name: String,
    /// Grouping label (e.g. "Physical")
    pub category: Option<String>,
    /// Free-form description
    pub description: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Trait {
    /// Create a trait
    #[must_use]
    pub fn new(tenant_id: Uuid, name: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.into(),
            category: None,
            description: String::new(),
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Set the category
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Check the invariants enforced on write
    pub fn validate(&self) -> Result<()> {
        require_non_empty("name", &self.name)
    }
}

/// Trait suggested by an archetype, with a default value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeTrait {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Archetype side
    pub archetype_id: Uuid,
    /// Trait side
    pub trait_id: Uuid,
    /// Value a new character of this archetype starts with
    pub default_value: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl ArchetypeTrait {
    /// Bind a trait to an archetype
    #[must_use]
    pub fn new(
        tenant_id: Uuid,
        archetype_id: Uuid,
        trait_id: Uuid,
        default_value: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            archetype_id,
            trait_id,
            default_value: default_value.into(),
            created_at: now(),
        }
    }
}
