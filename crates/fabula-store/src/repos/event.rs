//! Event repositories: the event tree, its timeline, references and participants

use super::{count, expect_rows, owner_tenant};
use crate::codec::{
    flag, int, opt_id, opt_real, opt_text, opt_uuid, parse, text, timestamp, ts, uuid,
};
use crate::db::Database;
use crate::error::{db_error, unique_error};
use crate::hierarchy::HierarchicalRepository;
use async_trait::async_trait;
use fabula_core::pagination::Page;
use fabula_core::world::{Event, EventArtifact, EventCharacter, EventLocation, EventReference};
use fabula_core::{EntityType, Error, Result};
use sqlx::sqlite::SqliteRow;
use tracing::{debug, instrument};
use uuid::Uuid;

const COLUMNS: &str = "id, tenant_id, world_id, parent_id, name, type, description, timeline, importance, hierarchy_level, timeline_position, is_epoch, created_at, updated_at";
const REFERENCE_COLUMNS: &str =
    "id, tenant_id, event_id, entity_type, entity_id, relationship_type, notes, created_at";

fn row_to_event(row: SqliteRow) -> Result<Event> {
    Ok(Event {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        world_id: uuid(&row, "world_id")?,
        parent_id: opt_uuid(&row, "parent_id")?,
        name: text(&row, "name")?,
        event_type: opt_text(&row, "type")?,
        description: text(&row, "description")?,
        timeline: opt_text(&row, "timeline")?,
        importance: int(&row, "importance")?,
        hierarchy_level: int(&row, "hierarchy_level")?,
        timeline_position: opt_real(&row, "timeline_position")?,
        is_epoch: flag(&row, "is_epoch")?,
        created_at: timestamp(&row, "created_at")?,
        updated_at: timestamp(&row, "updated_at")?,
    })
}

fn row_to_reference(row: SqliteRow) -> Result<EventReference> {
    Ok(EventReference {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        event_id: uuid(&row, "event_id")?,
        entity_type: parse(&row, "entity_type")?,
        entity_id: uuid(&row, "entity_id")?,
        relationship_type: opt_text(&row, "relationship_type")?,
        notes: text(&row, "notes")?,
        created_at: timestamp(&row, "created_at")?,
    })
}

fn row_to_event_character(row: SqliteRow) -> Result<EventCharacter> {
    Ok(EventCharacter {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        event_id: uuid(&row, "event_id")?,
        character_id: uuid(&row, "character_id")?,
        role: opt_text(&row, "role")?,
        created_at: timestamp(&row, "created_at")?,
    })
}

fn row_to_event_artifact(row: SqliteRow) -> Result<EventArtifact> {
    Ok(EventArtifact {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        event_id: uuid(&row, "event_id")?,
        artifact_id: uuid(&row, "artifact_id")?,
        role: opt_text(&row, "role")?,
        created_at: timestamp(&row, "created_at")?,
    })
}

fn row_to_event_location(row: SqliteRow) -> Result<EventLocation> {
    Ok(EventLocation {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        event_id: uuid(&row, "event_id")?,
        location_id: uuid(&row, "location_id")?,
        significance: opt_text(&row, "significance")?,
        created_at: timestamp(&row, "created_at")?,
    })
}

// =============================================================================
// Events
// =============================================================================

/// Events of a world
///
/// Events nest (an epoch holds its battles) and can be placed on the world
/// timeline through `timeline_position`.
#[derive(Clone)]
pub struct EventRepository {
    db: Database,
}

impl EventRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert an event, deriving its level from the parent
    #[instrument(skip(self, event), fields(event_id = %event.id, parent_id = ?event.parent_id))]
    pub async fn create(&self, event: &mut Event) -> Result<()> {
        event.validate()?;
        self.derive_level(event).await?;

        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO events (
                        id, tenant_id, world_id, parent_id, name, type, description, timeline,
                        importance, hierarchy_level, timeline_position, is_epoch, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                    "#,
                )
                .bind(event.id.to_string())
                .bind(event.tenant_id.to_string())
                .bind(event.world_id.to_string())
                .bind(opt_id(event.parent_id))
                .bind(&event.name)
                .bind(&event.event_type)
                .bind(&event.description)
                .bind(&event.timeline)
                .bind(event.importance)
                .bind(event.hierarchy_level)
                .bind(event.timeline_position)
                .bind(event.is_epoch)
                .bind(ts(&event.created_at))
                .bind(ts(&event.updated_at)),
            )
            .await
            .map_err(db_error("event", event.id))?;

        debug!(level = event.hierarchy_level, "Event created");
        Ok(())
    }

    /// Fetch an event
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Event> {
        let sql = format!("SELECT {COLUMNS} FROM events WHERE tenant_id = ?1 AND id = ?2");
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("event", id))?
            .ok_or_else(|| Error::not_found("event", id))?;
        row_to_event(row)
    }

    /// Events of a world, newest first
    #[instrument(skip(self))]
    pub async fn list_by_world(
        &self,
        tenant_id: Uuid,
        world_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Event>> {
        let page = Page::new(limit, offset)?;
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM events
            WHERE tenant_id = ?1 AND world_id = ?2
            ORDER BY created_at DESC, id DESC
            LIMIT ?3 OFFSET ?4
            "#
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(world_id.to_string())
                    .bind(page.limit)
                    .bind(page.offset),
            )
            .await
            .map_err(db_error("event", world_id))?;
        rows.into_iter().map(row_to_event).collect()
    }

    /// Events of a world in timeline order; unplaced events come last
    #[instrument(skip(self))]
    pub async fn list_by_world_timeline(
        &self,
        tenant_id: Uuid,
        world_id: Uuid,
    ) -> Result<Vec<Event>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM events
            WHERE tenant_id = ?1 AND world_id = ?2
            ORDER BY timeline_position ASC NULLS LAST, created_at ASC, id ASC
            "#
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(world_id.to_string()),
            )
            .await
            .map_err(db_error("event", world_id))?;
        rows.into_iter().map(row_to_event).collect()
    }

    /// Number of events in a world
    pub async fn count_by_world(&self, tenant_id: Uuid, world_id: Uuid) -> Result<i64> {
        count(
            &self.db,
            sqlx::query("SELECT COUNT(*) FROM events WHERE tenant_id = ?1 AND world_id = ?2")
                .bind(tenant_id.to_string())
                .bind(world_id.to_string()),
            "event",
            world_id,
        )
        .await
    }

    /// Update the mutable columns (`hierarchy_level` is stored as given)
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn update(&self, event: &Event) -> Result<()> {
        event.validate()?;
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    UPDATE events
                    SET parent_id = ?3, name = ?4, type = ?5, description = ?6, timeline = ?7,
                        importance = ?8, hierarchy_level = ?9, timeline_position = ?10,
                        is_epoch = ?11, updated_at = ?12
                    WHERE tenant_id = ?1 AND id = ?2
                    "#,
                )
                .bind(event.tenant_id.to_string())
                .bind(event.id.to_string())
                .bind(opt_id(event.parent_id))
                .bind(&event.name)
                .bind(&event.event_type)
                .bind(&event.description)
                .bind(&event.timeline)
                .bind(event.importance)
                .bind(event.hierarchy_level)
                .bind(event.timeline_position)
                .bind(event.is_epoch)
                .bind(ts(&event.updated_at)),
            )
            .await
            .map_err(db_error("event", event.id))?;
        expect_rows(result, "event", event.id)
    }

    /// Delete an event with its participants and references; sub-events become roots
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM events WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("event", id))?;
        Ok(())
    }
}

#[async_trait]
impl HierarchicalRepository for EventRepository {
    type Node = Event;

    const TABLE: &'static str = "events";
    const COLUMNS: &'static str = COLUMNS;

    fn database(&self) -> &Database {
        &self.db
    }

    fn decode(row: SqliteRow) -> Result<Event> {
        row_to_event(row)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Event> {
        EventRepository::get_by_id(self, tenant_id, id).await
    }
}

// =============================================================================
// Event references
// =============================================================================

/// Links from an event to any entity it concerns
///
/// `update`, `delete` and `delete_by_event_and_entity` report `NotFound`
/// when nothing matched.
#[derive(Clone)]
pub struct EventReferenceRepository {
    db: Database,
}

impl EventReferenceRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a reference; the tenant is taken from the event
    #[instrument(skip(self, reference), fields(event_id = %reference.event_id, entity = %reference.entity_type))]
    pub async fn create(&self, reference: &mut EventReference) -> Result<()> {
        reference.tenant_id = owner_tenant(&self.db, "events", "event", reference.event_id).await?;

        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO event_references (
                        id, tenant_id, event_id, entity_type, entity_id, relationship_type, notes, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                )
                .bind(reference.id.to_string())
                .bind(reference.tenant_id.to_string())
                .bind(reference.event_id.to_string())
                .bind(reference.entity_type.as_str())
                .bind(reference.entity_id.to_string())
                .bind(&reference.relationship_type)
                .bind(&reference.notes)
                .bind(ts(&reference.created_at)),
            )
            .await
            .map_err(unique_error(
                "event_reference",
                "event_id,entity_type,entity_id",
                format!(
                    "{}/{}/{}",
                    reference.event_id, reference.entity_type, reference.entity_id
                ),
            ))?;

        debug!("Event reference created");
        Ok(())
    }

    /// Fetch a reference
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<EventReference> {
        let sql = format!(
            "SELECT {REFERENCE_COLUMNS} FROM event_references WHERE tenant_id = ?1 AND id = ?2"
        );
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("event_reference", id))?
            .ok_or_else(|| Error::not_found("event_reference", id))?;
        row_to_reference(row)
    }

    /// References of an event, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_event(
        &self,
        tenant_id: Uuid,
        event_id: Uuid,
    ) -> Result<Vec<EventReference>> {
        let sql = format!(
            r#"
            SELECT {REFERENCE_COLUMNS} FROM event_references
            WHERE tenant_id = ?1 AND event_id = ?2
            ORDER BY created_at ASC, id ASC
            "#
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(event_id.to_string()),
            )
            .await
            .map_err(db_error("event_reference", event_id))?;
        rows.into_iter().map(row_to_reference).collect()
    }

    /// References pointing at one entity, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_entity(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Vec<EventReference>> {
        let sql = format!(
            r#"
            SELECT {REFERENCE_COLUMNS} FROM event_references
            WHERE tenant_id = ?1 AND entity_type = ?2 AND entity_id = ?3
            ORDER BY created_at ASC, id ASC
            "#
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(entity_type.as_str())
                    .bind(entity_id.to_string()),
            )
            .await
            .map_err(db_error("event_reference", entity_id))?;
        rows.into_iter().map(row_to_reference).collect()
    }

    /// Update relationship type and notes
    #[instrument(skip(self, reference), fields(reference_id = %reference.id))]
    pub async fn update(&self, reference: &EventReference) -> Result<()> {
        let result = self
            .db
            .execute(
                sqlx::query(
                    "UPDATE event_references SET relationship_type = ?3, notes = ?4 WHERE tenant_id = ?1 AND id = ?2",
                )
                .bind(reference.tenant_id.to_string())
                .bind(reference.id.to_string())
                .bind(&reference.relationship_type)
                .bind(&reference.notes),
            )
            .await
            .map_err(db_error("event_reference", reference.id))?;
        expect_rows(result, "event_reference", reference.id)
    }

    /// Delete a reference (`NotFound` when absent)
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        let result = self
            .db
            .execute(
                sqlx::query("DELETE FROM event_references WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("event_reference", id))?;
        expect_rows(result, "event_reference", id)
    }

    /// Delete every reference of an event
    #[instrument(skip(self))]
    pub async fn delete_by_event(&self, tenant_id: Uuid, event_id: Uuid) -> Result<u64> {
        let result = self
            .db
            .execute(
                sqlx::query("DELETE FROM event_references WHERE tenant_id = ?1 AND event_id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(event_id.to_string()),
            )
            .await
            .map_err(db_error("event_reference", event_id))?;
        Ok(result.rows_affected())
    }

    /// Delete the reference between an event and one entity (`NotFound` when absent)
    #[instrument(skip(self))]
    pub async fn delete_by_event_and_entity(
        &self,
        tenant_id: Uuid,
        event_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<()> {
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    DELETE FROM event_references
                    WHERE tenant_id = ?1 AND event_id = ?2 AND entity_type = ?3 AND entity_id = ?4
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(event_id.to_string())
                .bind(entity_type.as_str())
                .bind(entity_id.to_string()),
            )
            .await
            .map_err(db_error("event_reference", event_id))?;
        expect_rows(
            result,
            "event_reference",
            format!("{event_id}/{entity_type}/{entity_id}"),
        )
    }
}

// =============================================================================
// Event characters
// =============================================================================

/// Characters taking part in events
#[derive(Clone)]
pub struct EventCharacterRepository {
    db: Database,
}

impl EventCharacterRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a participation
    #[instrument(skip(self, row), fields(event_id = %row.event_id, character_id = %row.character_id))]
    pub async fn create(&self, row: &EventCharacter) -> Result<()> {
        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO event_characters (id, tenant_id, event_id, character_id, role, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .bind(row.id.to_string())
                .bind(row.tenant_id.to_string())
                .bind(row.event_id.to_string())
                .bind(row.character_id.to_string())
                .bind(&row.role)
                .bind(ts(&row.created_at)),
            )
            .await
            .map_err(unique_error(
                "event_character",
                "event_id,character_id",
                format!("{}/{}", row.event_id, row.character_id),
            ))?;
        Ok(())
    }

    /// Fetch a participation
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<EventCharacter> {
        let row = self
            .db
            .fetch_optional(
                sqlx::query(
                    r#"
                    SELECT id, tenant_id, event_id, character_id, role, created_at
                    FROM event_characters
                    WHERE tenant_id = ?1 AND id = ?2
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(id.to_string()),
            )
            .await
            .map_err(db_error("event_character", id))?
            .ok_or_else(|| Error::not_found("event_character", id))?;

        row_to_event_character(row)
    }

    /// Participants of an event, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_event(
        &self,
        tenant_id: Uuid,
        event_id: Uuid,
    ) -> Result<Vec<EventCharacter>> {
        let rows = self
            .db
            .fetch_all(
                sqlx::query(
                    r#"
                    SELECT id, tenant_id, event_id, character_id, role, created_at
                    FROM event_characters
                    WHERE tenant_id = ?1 AND event_id = ?2
                    ORDER BY created_at ASC, id ASC
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(event_id.to_string()),
            )
            .await
            .map_err(db_error("event_character", event_id))?;
        rows.into_iter().map(row_to_event_character).collect()
    }

    /// Events a character took part in, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_character(
        &self,
        tenant_id: Uuid,
        character_id: Uuid,
    ) -> Result<Vec<EventCharacter>> {
        let rows = self
            .db
            .fetch_all(
                sqlx::query(
                    r#"
                    SELECT id, tenant_id, event_id, character_id, role, created_at
                    FROM event_characters
                    WHERE tenant_id = ?1 AND character_id = ?2
                    ORDER BY created_at ASC, id ASC
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(character_id.to_string()),
            )
            .await
            .map_err(db_error("event_character", character_id))?;
        rows.into_iter().map(row_to_event_character).collect()
    }

    /// Delete one participation
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM event_characters WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("event_character", id))?;
        Ok(())
    }

    /// Remove a character from an event
    #[instrument(skip(self))]
    pub async fn delete_by_event_and_character(
        &self,
        tenant_id: Uuid,
        event_id: Uuid,
        character_id: Uuid,
    ) -> Result<()> {
        self.db
            .execute(
                sqlx::query(
                    "DELETE FROM event_characters WHERE tenant_id = ?1 AND event_id = ?2 AND character_id = ?3",
                )
                .bind(tenant_id.to_string())
                .bind(event_id.to_string())
                .bind(character_id.to_string()),
            )
            .await
            .map_err(db_error("event_character", event_id))?;
        Ok(())
    }

    /// Remove every participant of an event
    #[instrument(skip(self))]
    pub async fn delete_by_event(&self, tenant_id: Uuid, event_id: Uuid) -> Result<u64> {
        let result = self
            .db
            .execute(
                sqlx::query("DELETE FROM event_characters WHERE tenant_id = ?1 AND event_id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(event_id.to_string()),
            )
            .await
            .map_err(db_error("event_character", event_id))?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Event artifacts
// =============================================================================

/// Artifacts involved in events
#[derive(Clone)]
pub struct EventArtifactRepository {
    db: Database,
}

impl EventArtifactRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record an involvement
    #[instrument(skip(self, row), fields(event_id = %row.event_id, artifact_id = %row.artifact_id))]
    pub async fn create(&self, row: &EventArtifact) -> Result<()> {
        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO event_artifacts (id, tenant_id, event_id, artifact_id, role, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .bind(row.id.to_string())
                .bind(row.tenant_id.to_string())
                .bind(row.event_id.to_string())
                .bind(row.artifact_id.to_string())
                .bind(&row.role)
                .bind(ts(&row.created_at)),
            )
            .await
            .map_err(unique_error(
                "event_artifact",
                "event_id,artifact_id",
                format!("{}/{}", row.event_id, row.artifact_id),
            ))?;
        Ok(())
    }

    /// Fetch an artifact link
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<EventArtifact> {
        let row = self
            .db
            .fetch_optional(
                sqlx::query(
                    r#"
                    SELECT id, tenant_id, event_id, artifact_id, role, created_at
                    FROM event_artifacts
                    WHERE tenant_id = ?1 AND id = ?2
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(id.to_string()),
            )
            .await
            .map_err(db_error("event_artifact", id))?
            .ok_or_else(|| Error::not_found("event_artifact", id))?;

        row_to_event_artifact(row)
    }

    /// Artifacts of an event, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_event(&self, tenant_id: Uuid, event_id: Uuid) -> Result<Vec<EventArtifact>> {
        let rows = self
            .db
            .fetch_all(
                sqlx::query(
                    r#"
                    SELECT id, tenant_id, event_id, artifact_id, role, created_at
                    FROM event_artifacts
                    WHERE tenant_id = ?1 AND event_id = ?2
                    ORDER BY created_at ASC, id ASC
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(event_id.to_string()),
            )
            .await
            .map_err(db_error("event_artifact", event_id))?;
        rows.into_iter().map(row_to_event_artifact).collect()
    }

    /// Events an artifact was involved in, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_artifact(
        &self,
        tenant_id: Uuid,
        artifact_id: Uuid,
    ) -> Result<Vec<EventArtifact>> {
        let rows = self
            .db
            .fetch_all(
                sqlx::query(
                    r#"
                    SELECT id, tenant_id, event_id, artifact_id, role, created_at
                    FROM event_artifacts
                    WHERE tenant_id = ?1 AND artifact_id = ?2
                    ORDER BY created_at ASC, id ASC
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(artifact_id.to_string()),
            )
            .await
            .map_err(db_error("event_artifact", artifact_id))?;
        rows.into_iter().map(row_to_event_artifact).collect()
    }

    /// Delete one involvement
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM event_artifacts WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("event_artifact", id))?;
        Ok(())
    }

    /// Remove an artifact from an event
    #[instrument(skip(self))]
    pub async fn delete_by_event_and_artifact(
        &self,
        tenant_id: Uuid,
        event_id: Uuid,
        artifact_id: Uuid,
    ) -> Result<()> {
        self.db
            .execute(
                sqlx::query(
                    "DELETE FROM event_artifacts WHERE tenant_id = ?1 AND event_id = ?2 AND artifact_id = ?3",
                )
                .bind(tenant_id.to_string())
                .bind(event_id.to_string())
                .bind(artifact_id.to_string()),
            )
            .await
            .map_err(db_error("event_artifact", event_id))?;
        Ok(())
    }

    /// Remove every artifact of an event
    #[instrument(skip(self))]
    pub async fn delete_by_event(&self, tenant_id: Uuid, event_id: Uuid) -> Result<u64> {
        let result = self
            .db
            .execute(
                sqlx::query("DELETE FROM event_artifacts WHERE tenant_id = ?1 AND event_id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(event_id.to_string()),
            )
            .await
            .map_err(db_error("event_artifact", event_id))?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Event locations
// =============================================================================

/// Places where events happened
#[derive(Clone)]
pub struct EventLocationRepository {
    db: Database,
}

impl EventLocationRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a venue
    #[instrument(skip(self, row), fields(event_id = %row.event_id, location_id = %row.location_id))]
    pub async fn create(&self, row: &EventLocation) -> Result<()> {
        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO event_locations (id, tenant_id, event_id, location_id, significance, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .bind(row.id.to_string())
                .bind(row.tenant_id.to_string())
                .bind(row.event_id.to_string())
                .bind(row.location_id.to_string())
                .bind(&row.significance)
                .bind(ts(&row.created_at)),
            )
            .await
            .map_err(unique_error(
                "event_location",
                "event_id,location_id",
                format!("{}/{}", row.event_id, row.location_id),
            ))?;
        Ok(())
    }

    /// Fetch a venue link
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<EventLocation> {
        let row = self
            .db
            .fetch_optional(
                sqlx::query(
                    r#"
                    SELECT id, tenant_id, event_id, location_id, significance, created_at
                    FROM event_locations
                    WHERE tenant_id = ?1 AND id = ?2
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(id.to_string()),
            )
            .await
            .map_err(db_error("event_location", id))?
            .ok_or_else(|| Error::not_found("event_location", id))?;

        row_to_event_location(row)
    }

    /// Venues of an event, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_event(&self, tenant_id: Uuid, event_id: Uuid) -> Result<Vec<EventLocation>> {
        let rows = self
            .db
            .fetch_all(
                sqlx::query(
                    r#"
                    SELECT id, tenant_id, event_id, location_id, significance, created_at
                    FROM event_locations
                    WHERE tenant_id = ?1 AND event_id = ?2
                    ORDER BY created_at ASC, id ASC
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(event_id.to_string()),
            )
            .await
            .map_err(db_error("event_location", event_id))?;
        rows.into_iter().map(row_to_event_location).collect()
    }

    /// Events that happened at a location, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_location(
        &self,
        tenant_id: Uuid,
        location_id: Uuid,
    ) -> Result<Vec<EventLocation>> {
        let rows = self
            .db
            .fetch_all(
                sqlx::query(
                    r#"
                    SELECT id, tenant_id, event_id, location_id, significance, created_at
                    FROM event_locations
                    WHERE tenant_id = ?1 AND location_id = ?2
                    ORDER BY created_at ASC, id ASC
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(location_id.to_string()),
            )
            .await
            .map_err(db_error("event_location", location_id))?;
        rows.into_iter().map(row_to_event_location).collect()
    }

    /// Delete one venue
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM event_locations WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("event_location", id))?;
        Ok(())
    }

    /// Remove a location from an event
    #[instrument(skip(self))]
    pub async fn delete_by_event_and_location(
        &self,
        tenant_id: Uuid,
        event_id: Uuid,
        location_id: Uuid,
    ) -> Result<()> {
        self.db
            .execute(
                sqlx::query(
                    "DELETE FROM event_locations WHERE tenant_id = ?1 AND event_id = ?2 AND location_id = ?3",
                )
                .bind(tenant_id.to_string())
                .bind(event_id.to_string())
                .bind(location_id.to_string()),
            )
            .await
            .map_err(db_error("event_location", event_id))?;
        Ok(())
    }

    /// Remove every venue of an event
    #[instrument(skip(self))]
    pub async fn delete_by_event(&self, tenant_id: Uuid, event_id: Uuid) -> Result<u64> {
        let result = self
            .db
            .execute(
                sqlx::query("DELETE FROM event_locations WHERE tenant_id = ?1 AND event_id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(event_id.to_string()),
            )
            .await
            .map_err(db_error("event_location", event_id))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::{
        ArtifactRepository, CharacterRepository, LocationRepository, TenantRepository,
        WorldRepository,
    };
    use fabula_core::world::{Artifact, Character, Location, World};
    use fabula_core::Tenant;

    async fn setup() -> (Database, Uuid, Uuid) {
        let db = Database::in_memory().await.unwrap();
        let tenant = Tenant::new("acme");
        TenantRepository::new(db.clone())
            .create(&tenant)
            .await
            .unwrap();
        let world = World::new(tenant.id, "Eldoria");
        WorldRepository::new(db.clone())
            .create(&world)
            .await
            .unwrap();
        (db, tenant.id, world.id)
    }

    #[tokio::test]
    async fn test_importance_is_validated() {
        let (db, tenant_id, world_id) = setup().await;
        let repo = EventRepository::new(db);
        let mut event = Event::new(tenant_id, world_id, "Sundering");
        event.importance = 11;
        assert!(repo.create(&mut event).await.unwrap_err().is_validation());

        event.importance = 10;
        repo.create(&mut event).await.unwrap();
        event.importance = -1;
        assert!(repo.update(&event).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_timeline_order_puts_unplaced_last() {
        let (db, tenant_id, world_id) = setup().await;
        let repo = EventRepository::new(db);

        let mut unplaced = Event::new(tenant_id, world_id, "Rumour");
        unplaced.created_at -= chrono::Duration::seconds(60);
        repo.create(&mut unplaced).await.unwrap();
        let mut late = Event::new(tenant_id, world_id, "Coronation");
        late.timeline_position = Some(20.0);
        repo.create(&mut late).await.unwrap();
        let mut early = Event::new(tenant_id, world_id, "Founding");
        early.timeline_position = Some(-5.5);
        repo.create(&mut early).await.unwrap();

        let names: Vec<_> = repo
            .list_by_world_timeline(tenant_id, world_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["Founding", "Coronation", "Rumour"]);
    }

    #[tokio::test]
    async fn test_epochs_nest_events() {
        let (db, tenant_id, world_id) = setup().await;
        let repo = EventRepository::new(db);
        let mut age = Event::new(tenant_id, world_id, "Age of Ash");
        age.is_epoch = true;
        repo.create(&mut age).await.unwrap();
        let mut battle = Event::new(tenant_id, world_id, "Battle of Fords").with_parent(age.id);
        repo.create(&mut battle).await.unwrap();

        assert_eq!(battle.hierarchy_level, 1);
        let children = repo.get_children(tenant_id, age.id).await.unwrap();
        assert_eq!(children, vec![battle]);
        assert!(repo.get_by_id(tenant_id, age.id).await.unwrap().is_epoch);
    }

    #[tokio::test]
    async fn test_references_report_missing_rows() {
        let (db, tenant_id, world_id) = setup().await;
        let events = EventRepository::new(db.clone());
        let refs = EventReferenceRepository::new(db);
        let mut event = Event::new(tenant_id, world_id, "Sundering");
        events.create(&mut event).await.unwrap();

        let faction = Uuid::new_v4();
        let mut reference = EventReference::new(event.id, EntityType::Faction, faction);
        refs.create(&mut reference).await.unwrap();
        assert_eq!(refs.list_by_event(tenant_id, event.id).await.unwrap().len(), 1);

        reference.relationship_type = Some("caused".into());
        refs.update(&reference).await.unwrap();
        assert_eq!(
            refs.get_by_id(tenant_id, reference.id)
                .await
                .unwrap()
                .relationship_type
                .as_deref(),
            Some("caused")
        );

        refs.delete(tenant_id, reference.id).await.unwrap();
        assert!(refs.delete(tenant_id, reference.id).await.unwrap_err().is_not_found());
        assert!(refs
            .delete_by_event_and_entity(tenant_id, event.id, EntityType::Faction, faction)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_participants() {
        let (db, tenant_id, world_id) = setup().await;
        let mut event = Event::new(tenant_id, world_id, "Sundering");
        EventRepository::new(db.clone())
            .create(&mut event)
            .await
            .unwrap();
        let hero = Character::new(tenant_id, world_id, "Aria");
        CharacterRepository::new(db.clone())
            .create(&hero)
            .await
            .unwrap();
        let sword = Artifact::new(tenant_id, world_id, "Dawnblade");
        ArtifactRepository::new(db.clone())
            .create(&sword)
            .await
            .unwrap();
        let mut keep = Location::new(tenant_id, world_id, "Keep");
        LocationRepository::new(db.clone())
            .create(&mut keep)
            .await
            .unwrap();

        let characters = EventCharacterRepository::new(db.clone());
        let artifacts = EventArtifactRepository::new(db.clone());
        let locations = EventLocationRepository::new(db);

        let mut took_part = EventCharacter::new(tenant_id, event.id, hero.id);
        took_part.role = Some("instigator".into());
        characters.create(&took_part).await.unwrap();
        assert!(characters
            .create(&EventCharacter::new(tenant_id, event.id, hero.id))
            .await
            .unwrap_err()
            .is_already_exists());
        artifacts
            .create(&EventArtifact::new(tenant_id, event.id, sword.id))
            .await
            .unwrap();
        locations
            .create(&EventLocation::new(tenant_id, event.id, keep.id))
            .await
            .unwrap();

        assert_eq!(
            characters.list_by_character(tenant_id, hero.id).await.unwrap(),
            vec![took_part]
        );
        assert_eq!(artifacts.list_by_artifact(tenant_id, sword.id).await.unwrap().len(), 1);
        assert_eq!(locations.list_by_location(tenant_id, keep.id).await.unwrap().len(), 1);

        characters
            .delete_by_event_and_character(tenant_id, event.id, hero.id)
            .await
            .unwrap();
        assert!(characters.list_by_event(tenant_id, event.id).await.unwrap().is_empty());
        assert_eq!(artifacts.delete_by_event(tenant_id, event.id).await.unwrap(), 1);
        assert_eq!(locations.delete_by_event(tenant_id, event.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_participant_lookup_is_tenant_scoped() {
        let (db, tenant_id, world_id) = setup().await;
        let other = Tenant::new("globex");
        TenantRepository::new(db.clone())
            .create(&other)
            .await
            .unwrap();

        let mut event = Event::new(tenant_id, world_id, "Coronation");
        EventRepository::new(db.clone())
            .create(&mut event)
            .await
            .unwrap();
        let hero = Character::new(tenant_id, world_id, "Aria");
        CharacterRepository::new(db.clone())
            .create(&hero)
            .await
            .unwrap();
        let crown = Artifact::new(tenant_id, world_id, "Crown");
        ArtifactRepository::new(db.clone())
            .create(&crown)
            .await
            .unwrap();
        let mut hall = Location::new(tenant_id, world_id, "Great Hall");
        LocationRepository::new(db.clone())
            .create(&mut hall)
            .await
            .unwrap();

        let characters = EventCharacterRepository::new(db.clone());
        let artifacts = EventArtifactRepository::new(db.clone());
        let locations = EventLocationRepository::new(db);

        let mut crowned = EventCharacter::new(tenant_id, event.id, hero.id);
        crowned.role = Some("heir".into());
        characters.create(&crowned).await.unwrap();
        let mut worn = EventArtifact::new(tenant_id, event.id, crown.id);
        worn.role = Some("regalia".into());
        artifacts.create(&worn).await.unwrap();
        let mut venue = EventLocation::new(tenant_id, event.id, hall.id);
        venue.significance = Some("throne room".into());
        locations.create(&venue).await.unwrap();

        assert_eq!(characters.get_by_id(tenant_id, crowned.id).await.unwrap(), crowned);
        assert_eq!(artifacts.get_by_id(tenant_id, worn.id).await.unwrap(), worn);
        assert_eq!(locations.get_by_id(tenant_id, venue.id).await.unwrap(), venue);

        let err = characters.get_by_id(other.id, crowned.id).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("event_character"));
        let err = artifacts.get_by_id(other.id, worn.id).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("event_artifact"));
        let err = locations.get_by_id(other.id, venue.id).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("event_location"));
    }
}
