//! World events and their participants

use super::hierarchy::impl_hierarchical;
use crate::entity_type::EntityType;
use crate::error::{require_non_empty, Error, Result};
use crate::time::now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inclusive importance range
pub const IMPORTANCE_RANGE: std::ops::RangeInclusive<i32> = 0..=10;

/// Something that happened in a world
///
/// Events may be nested (an epoch containing battles) and positioned on the
/// world timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// World the event happened in
    pub world_id: Uuid,
    /// Enclosing event
    pub parent_id: Option<Uuid>,
    /// Display name
    pub name: String,
    /// Kind of event (e.g. "battle")
    pub event_type: Option<String>,
    /// Free-form description
    pub description: String,
    /// In-world date label
    pub timeline: Option<String>,
    /// Importance in `0..=10`
    pub importance: i32,
    /// Depth in the event tree (root = 0)
    pub hierarchy_level: i32,
    /// Sort key on the world timeline
    pub timeline_position: Option<f64>,
    /// Marks an era rather than a single happening
    pub is_epoch: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Create a root event of middling importance
    #[must_use]
    pub fn new(tenant_id: Uuid, world_id: Uuid, name: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            world_id,
            parent_id: None,
            name: name.into(),
            event_type: None,
            description: String::new(),
            timeline: None,
            importance: 5,
            hierarchy_level: 0,
            timeline_position: None,
            is_epoch: false,
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
        require_non_empty("name", &self.name)?;
        if !IMPORTANCE_RANGE.contains(&self.importance) {
            return Err(Error::validation(
                "importance",
                format!("must be between 0 and 10, got {}", self.importance),
            ));
        }
        Ok(())
    }
}

impl_hierarchical!(Event, "event");

/// A character taking part in an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCharacter {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Event side
    pub event_id: Uuid,
    /// Character side
    pub character_id: Uuid,
    /// Part played (e.g. "instigator")
    pub role: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl EventCharacter {
    /// Create a participation row
    #[must_use]
    pub fn new(tenant_id: Uuid, event_id: Uuid, character_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            event_id,
            character_id,
            role: None,
            created_at: now(),
        }
    }
}

/// An artifact involved in an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventArtifact {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Event side
    pub event_id: Uuid,
    /// Artifact side
    pub artifact_id: Uuid,
    /// Part played (e.g. "forged")
    pub role: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl EventArtifact {
    /// Create an involvement row
    #[must_use]
    pub fn new(tenant_id: Uuid, event_id: Uuid, artifact_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            event_id,
            artifact_id,
            role: None,
            created_at: now(),
        }
    }
}

/// A location where an event took place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLocation {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Event side
    pub event_id: Uuid,
    /// Location side
    pub location_id: Uuid,
    /// Why the place matters for the event
    pub significance: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl EventLocation {
    /// Create a venue row
    #[must_use]
    pub fn new(tenant_id: Uuid, event_id: Uuid, location_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            event_id,
            location_id,
            significance: None,
            created_at: now(),
        }
    }
}

/// Attaches an event to any entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventReference {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant (taken from the event on write)
    pub tenant_id: Uuid,
    /// Event side
    pub event_id: Uuid,
    /// Kind of the referenced entity
    pub entity_type: EntityType,
    /// Referenced entity
    pub entity_id: Uuid,
    /// How the entity relates to the event
    pub relationship_type: Option<String>,
    /// Free-form notes
    pub notes: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl EventReference {
    /// Create a reference
    #[must_use]
    pub fn new(event_id: Uuid, entity_type: EntityType, entity_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            event_id,
            entity_type,
            entity_id,
            relationship_type: None,
            notes: String::new(),
            created_at: now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_importance_bounds() {
        let mut event = Event::new(Uuid::new_v4(), Uuid::new_v4(), "Sundering");
        for ok in [0, 10] {
            event.importance = ok;
            assert!(event.validate().is_ok());
        }
        for bad in [-1, 11] {
            event.importance = bad;
            assert!(event.validate().unwrap_err().is_validation());
        }
    }
}
