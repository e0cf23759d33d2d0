//! Entity relation graph
//!
//! A relation is a directed, typed edge between two entities of one world.
//! A relation may have a mirror: the reverse edge carrying the inverse type
//! (`parent_of` mirrored by `child_of`), created and deleted as a pair.

use crate::entity_type::EntityType;
use crate::error::{require_non_empty, Error, Result};
use crate::pagination::{clamp_limit, SortDirection};
use crate::time::now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Inverse pairs; each entry also maps right to left
const INVERSE_PAIRS: &[(&str, &str)] = &[
    ("parent_of", "child_of"),
    ("member_of", "has_member"),
    ("leader_of", "led_by"),
    ("located_in", "contains"),
    ("owns", "owned_by"),
    ("mentor_of", "mentored_by"),
];

/// Relation type of the mirror edge
///
/// Unknown and symmetric types (`sibling_of`, `ally_of`, ...) map to
/// themselves.
#[must_use]
pub fn inverse_relation_type(relation_type: &str) -> &str {
    for &(left, right) in INVERSE_PAIRS {
        if left == relation_type {
            return right;
        }
        if right == relation_type {
            return left;
        }
    }
    relation_type
}

/// Directed edge between two entities of a world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRelation {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// World both endpoints live in
    pub world_id: Uuid,
    /// Kind of the source entity
    pub source_type: EntityType,
    /// Source entity
    pub source_id: Uuid,
    /// Kind of the target entity
    pub target_type: EntityType,
    /// Target entity
    pub target_id: Uuid,
    /// Edge label (e.g. `parent_of`)
    pub relation_type: String,
    /// Kind of the object the relation was stated in (e.g. `scene`)
    pub context_type: Option<String>,
    /// Object the relation was stated in
    pub context_id: Option<Uuid>,
    /// Free-form attributes (always an object, `{}` when empty)
    pub attributes: Map<String, Value>,
    /// Short prose summary
    pub summary: String,
    /// The reverse edge, when created as a pair
    pub mirror_id: Option<Uuid>,
    /// Author
    pub created_by_user_id: Option<Uuid>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl EntityRelation {
    /// Create a relation without context or attributes
    #[must_use]
    pub fn new(
        tenant_id: Uuid,
        world_id: Uuid,
        source: (EntityType, Uuid),
        relation_type: impl Into<String>,
        target: (EntityType, Uuid),
    ) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            world_id,
            source_type: source.0,
            source_id: source.1,
            target_type: target.0,
            target_id: target.1,
            relation_type: relation_type.into(),
            context_type: None,
            context_id: None,
            attributes: Map::new(),
            summary: String::new(),
            mirror_id: None,
            created_by_user_id: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Set one attribute
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set the context the relation was stated in
    #[must_use]
    pub fn in_context(mut self, context_type: impl Into<String>, context_id: Uuid) -> Self {
        self.context_type = Some(context_type.into());
        self.context_id = Some(context_id);
        self
    }

    /// Derive the reverse edge
    ///
    /// Endpoints are swapped and the type is inverted; context, attributes,
    /// summary, author and timestamps are copied. The mirror points back at
    /// `self`.
    #[must_use]
    pub fn mirror(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: self.tenant_id,
            world_id: self.world_id,
            source_type: self.target_type,
            source_id: self.target_id,
            target_type: self.source_type,
            target_id: self.source_id,
            relation_type: inverse_relation_type(&self.relation_type).to_string(),
            context_type: self.context_type.clone(),
            context_id: self.context_id,
            attributes: self.attributes.clone(),
            summary: self.summary.clone(),
            mirror_id: Some(self.id),
            created_by_user_id: self.created_by_user_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Human-readable natural key: `<source>-<type>-<target>`
    #[must_use]
    pub fn natural_key(&self) -> String {
        format!("{}-{}-{}", self.source_id, self.relation_type, self.target_id)
    }

    /// True when this row is the higher-id half of a mirror pair
    #[must_use]
    pub fn is_mirror_half(&self) -> bool {
        matches!(self.mirror_id, Some(m) if self.id > m)
    }

    /// Check the invariants enforced on write
    pub fn validate(&self) -> Result<()> {
        require_non_empty("relation_type", &self.relation_type)?;
        if self.context_id.is_some() && self.context_type.is_none() {
            return Err(Error::validation(
                "context_type",
                "required when context_id is set",
            ));
        }
        Ok(())
    }
}

/// Column allowed as the primary sort key of cursor lists
pub const CURSOR_ORDER_FIELD: &str = "created_at";

/// Query options for cursor-paginated relation lists
#[derive(Debug, Clone, Default)]
pub struct RelationQuery {
    /// Page size; 0 means the default, values above the maximum are clamped
    pub limit: i64,
    /// Opaque cursor from a previous page
    pub cursor: Option<String>,
    /// Sort column (only `created_at` is supported)
    pub order_by: Option<String>,
    /// Sort direction
    pub direction: SortDirection,
    /// Only relations of this type
    pub relation_type: Option<String>,
    /// Hide the higher-id half of every mirror pair
    pub exclude_mirrors: bool,
}

impl RelationQuery {
    /// Create a query with default paging
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page size
    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Continue after a cursor
    #[must_use]
    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Continue after an optional cursor
    #[must_use]
    pub fn after_opt(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }

    /// Set the sort column
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    /// Set the sort direction
    #[must_use]
    pub fn direction(mut self, direction: SortDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Filter by relation type
    #[must_use]
    pub fn of_type(mut self, relation_type: impl Into<String>) -> Self {
        self.relation_type = Some(relation_type.into());
        self
    }

    /// Hide mirror halves
    #[must_use]
    pub fn exclude_mirrors(mut self) -> Self {
        self.exclude_mirrors = true;
        self
    }

    /// Clamped page size
    pub fn resolved_limit(&self) -> Result<i64> {
        clamp_limit(self.limit)
    }

    /// Validated sort column
    pub fn resolved_order_by(&self) -> Result<&'static str> {
        match self.order_by.as_deref() {
            None | Some(CURSOR_ORDER_FIELD) => Ok(CURSOR_ORDER_FIELD),
            Some(other) => Err(Error::validation(
                "order_by",
                format!("unsupported order field: {other}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EntityRelation {
        EntityRelation::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            (EntityType::Character, Uuid::new_v4()),
            "parent_of",
            (EntityType::Character, Uuid::new_v4()),
        )
    }

    #[test]
    fn test_inverse_mapping() {
        assert_eq!(inverse_relation_type("parent_of"), "child_of");
        assert_eq!(inverse_relation_type("child_of"), "parent_of");
        assert_eq!(inverse_relation_type("located_in"), "contains");
        assert_eq!(inverse_relation_type("ally_of"), "ally_of");
        assert_eq!(inverse_relation_type("befriends"), "befriends");
    }

    #[test]
    fn test_mirror_swaps_endpoints() {
        let rel = sample().with_attribute("since", "childhood");
        let mirror = rel.mirror();

        assert_ne!(mirror.id, rel.id);
        assert_eq!(mirror.source_id, rel.target_id);
        assert_eq!(mirror.target_id, rel.source_id);
        assert_eq!(mirror.relation_type, "child_of");
        assert_eq!(mirror.mirror_id, Some(rel.id));
        assert_eq!(mirror.attributes, rel.attributes);
    }

    #[test]
    fn test_natural_key() {
        let rel = sample();
        assert_eq!(
            rel.natural_key(),
            format!("{}-parent_of-{}", rel.source_id, rel.target_id)
        );
    }

    #[test]
    fn test_query_resolution() {
        let q = RelationQuery::new();
        assert_eq!(q.resolved_limit().unwrap(), 50);
        assert_eq!(q.resolved_order_by().unwrap(), "created_at");

        let q = RelationQuery::new().limit(1000).order_by("name");
        assert_eq!(q.resolved_limit().unwrap(), 100);
        assert!(q.resolved_order_by().unwrap_err().is_validation());

        assert!(RelationQuery::new().limit(-5).resolved_limit().is_err());
    }

    #[test]
    fn test_validate_context_pairing() {
        let mut rel = sample();
        rel.context_id = Some(Uuid::new_v4());
        assert!(rel.validate().unwrap_err().is_validation());
        let rel = sample().in_context("scene", Uuid::new_v4());
        assert!(rel.validate().is_ok());
    }
}
