//! Locations - hierarchical places inside a world

use super::hierarchy::impl_hierarchical;
use crate::error::{require_non_empty, Result};
use crate::time::now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A place; may be nested inside another location of the same world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// World the location belongs to
    pub world_id: Uuid,
    /// Enclosing location
    pub parent_id: Option<Uuid>,
    /// Display name
    pub name: String,
    /// Kind of place (e.g. "city", "tavern")
    pub location_type: Option<String>,
    /// Free-form description
    pub description: String,
    /// Depth in the location tree (root = 0)
    pub hierarchy_level: i32,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Location {
    /// Create a root location
    #[must_use]
    pub fn new(tenant_id: Uuid, world_id: Uuid, name: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            world_id,
            parent_id: None,
            name: name.into(),
            location_type: None,
            description: String::new(),
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

impl_hierarchical!(Location, "location");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::Hierarchical;

    #[test]
    fn test_attach_to_recomputes_level() {
        let tenant = Uuid::new_v4();
        let world = Uuid::new_v4();
        let mut root = Location::new(tenant, world, "Continent");
        root.hierarchy_level = 0;
        let mut city = Location::new(tenant, world, "City");
        city.attach_to(Some(&root));
        assert_eq!(city.parent_id, Some(root.id));
        assert_eq!(city.hierarchy_level, 1);

        let mut inn = Location::new(tenant, world, "Inn");
        inn.attach_to(Some(&city));
        assert_eq!(inn.hierarchy_level, 2);

        inn.attach_to(None);
        assert_eq!(inn.parent_id, None);
        assert_eq!(inn.hierarchy_level, 0);
    }
}
