//! Scene and scene-reference repositories

use super::expect_rows;
use crate::codec::{int, opt_id, opt_uuid, parse, text, timestamp, ts, uuid};
use crate::db::Database;
use crate::error::{db_error, unique_error};
use fabula_core::story::{Scene, SceneReference};
use fabula_core::{EntityType, Error, Result};
use sqlx::sqlite::SqliteRow;
use tracing::{debug, instrument};
use uuid::Uuid;

pub(crate) const COLUMNS: &str = "id, tenant_id, story_id, chapter_id, order_num, pov_character_id, time_ref, goal, created_at, updated_at";
pub(crate) const REFERENCE_COLUMNS: &str =
    "id, tenant_id, scene_id, entity_type, entity_id, created_at";

pub(crate) fn row_to_scene(row: SqliteRow) -> Result<Scene> {
    Ok(Scene {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        story_id: uuid(&row, "story_id")?,
        chapter_id: opt_uuid(&row, "chapter_id")?,
        order_num: int(&row, "order_num")?,
        pov_character_id: opt_uuid(&row, "pov_character_id")?,
        time_ref: text(&row, "time_ref")?,
        goal: text(&row, "goal")?,
        created_at: timestamp(&row, "created_at")?,
        updated_at: timestamp(&row, "updated_at")?,
    })
}

pub(crate) fn row_to_reference(row: SqliteRow) -> Result<SceneReference> {
    Ok(SceneReference {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        scene_id: uuid(&row, "scene_id")?,
        entity_type: parse(&row, "entity_type")?,
        entity_id: uuid(&row, "entity_id")?,
        created_at: timestamp(&row, "created_at")?,
    })
}

/// Bind a scene onto an insert statement
pub(crate) fn bind_insert(scene: &Scene) -> crate::db::SqliteQuery<'static> {
    sqlx::query(
        r#"
        INSERT INTO scenes (
            id, tenant_id, story_id, chapter_id, order_num, pov_character_id,
            time_ref, goal, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(scene.id.to_string())
    .bind(scene.tenant_id.to_string())
    .bind(scene.story_id.to_string())
    .bind(opt_id(scene.chapter_id))
    .bind(scene.order_num)
    .bind(opt_id(scene.pov_character_id))
    .bind(scene.time_ref.clone())
    .bind(scene.goal.clone())
    .bind(ts(&scene.created_at))
    .bind(ts(&scene.updated_at))
}

/// Bind a scene reference onto an insert statement
pub(crate) fn bind_reference_insert(reference: &SceneReference) -> crate::db::SqliteQuery<'static> {
    sqlx::query(
        r#"
        INSERT INTO scene_references (id, tenant_id, scene_id, entity_type, entity_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(reference.id.to_string())
    .bind(reference.tenant_id.to_string())
    .bind(reference.scene_id.to_string())
    .bind(reference.entity_type.as_str())
    .bind(reference.entity_id.to_string())
    .bind(ts(&reference.created_at))
}

// =============================================================================
// Scenes
// =============================================================================

/// Scenes of a story, optionally grouped into chapters
#[derive(Clone)]
pub struct SceneRepository {
    db: Database,
}

impl SceneRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a scene
    #[instrument(skip(self, scene), fields(scene_id = %scene.id, story_id = %scene.story_id))]
    pub async fn create(&self, scene: &Scene) -> Result<()> {
        scene.validate()?;
        self.db
            .execute(bind_insert(scene))
            .await
            .map_err(db_error("scene", scene.id))?;
        debug!(order = scene.order_num, "Scene created");
        Ok(())
    }

    /// Fetch a scene
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Scene> {
        let sql = format!("SELECT {COLUMNS} FROM scenes WHERE tenant_id = ?1 AND id = ?2");
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("scene", id))?
            .ok_or_else(|| Error::not_found("scene", id))?;
        row_to_scene(row)
    }

    /// Scenes of a chapter in order
    #[instrument(skip(self))]
    pub async fn list_by_chapter(&self, tenant_id: Uuid, chapter_id: Uuid) -> Result<Vec<Scene>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM scenes WHERE tenant_id = ?1 AND chapter_id = ?2 ORDER BY order_num ASC, id ASC"
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(chapter_id.to_string()),
            )
            .await
            .map_err(db_error("scene", chapter_id))?;
        rows.into_iter().map(row_to_scene).collect()
    }

    /// Scenes of a story, grouped by chapter then in order
    ///
    /// Scenes outside any chapter come first.
    #[instrument(skip(self))]
    pub async fn list_by_story(&self, tenant_id: Uuid, story_id: Uuid) -> Result<Vec<Scene>> {
        let rows = self
            .db
            .fetch_all(
                sqlx::query(
                    r#"
                    SELECT s.id, s.tenant_id, s.story_id, s.chapter_id, s.order_num,
                           s.pov_character_id, s.time_ref, s.goal, s.created_at, s.updated_at
                    FROM scenes s
                    LEFT JOIN chapters c ON c.id = s.chapter_id
                    WHERE s.tenant_id = ?1 AND s.story_id = ?2
                    ORDER BY COALESCE(c.number, 0) ASC, s.order_num ASC, s.id ASC
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(story_id.to_string()),
            )
            .await
            .map_err(db_error("scene", story_id))?;
        rows.into_iter().map(row_to_scene).collect()
    }

    /// Update the mutable columns
    #[instrument(skip(self, scene), fields(scene_id = %scene.id))]
    pub async fn update(&self, scene: &Scene) -> Result<()> {
        scene.validate()?;
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    UPDATE scenes
                    SET chapter_id = ?3, order_num = ?4, pov_character_id = ?5, time_ref = ?6,
                        goal = ?7, updated_at = ?8
                    WHERE tenant_id = ?1 AND id = ?2
                    "#,
                )
                .bind(scene.tenant_id.to_string())
                .bind(scene.id.to_string())
                .bind(opt_id(scene.chapter_id))
                .bind(scene.order_num)
                .bind(opt_id(scene.pov_character_id))
                .bind(&scene.time_ref)
                .bind(&scene.goal)
                .bind(ts(&scene.updated_at)),
            )
            .await
            .map_err(db_error("scene", scene.id))?;
        expect_rows(result, "scene", scene.id)
    }

    /// Delete a scene with its beats and references
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM scenes WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("scene", id))?;
        Ok(())
    }

    /// Delete every scene of a chapter
    #[instrument(skip(self))]
    pub async fn delete_by_chapter(&self, tenant_id: Uuid, chapter_id: Uuid) -> Result<u64> {
        let result = self
            .db
            .execute(
                sqlx::query("DELETE FROM scenes WHERE tenant_id = ?1 AND chapter_id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(chapter_id.to_string()),
            )
            .await
            .map_err(db_error("scene", chapter_id))?;
        Ok(result.rows_affected())
    }

    /// Delete every scene of a story
    #[instrument(skip(self))]
    pub async fn delete_by_story(&self, tenant_id: Uuid, story_id: Uuid) -> Result<u64> {
        let result = self
            .db
            .execute(
                sqlx::query("DELETE FROM scenes WHERE tenant_id = ?1 AND story_id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(story_id.to_string()),
            )
            .await
            .map_err(db_error("scene", story_id))?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Scene references
// =============================================================================

/// World entities appearing in a scene
#[derive(Clone)]
pub struct SceneReferenceRepository {
    db: Database,
}

impl SceneReferenceRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a reference
    #[instrument(skip(self, reference), fields(scene_id = %reference.scene_id, entity = %reference.entity_type))]
    pub async fn create(&self, reference: &SceneReference) -> Result<()> {
        reference.validate()?;
        self.db
            .execute(bind_reference_insert(reference))
            .await
            .map_err(unique_error(
                "scene_reference",
                "scene_id,entity_type,entity_id",
                format!(
                    "{}/{}/{}",
                    reference.scene_id, reference.entity_type, reference.entity_id
                ),
            ))?;
        Ok(())
    }

    /// Fetch a reference
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<SceneReference> {
        let sql = format!(
            "SELECT {REFERENCE_COLUMNS} FROM scene_references WHERE tenant_id = ?1 AND id = ?2"
        );
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("scene_reference", id))?
            .ok_or_else(|| Error::not_found("scene_reference", id))?;
        row_to_reference(row)
    }

    /// References of a scene, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_scene(
        &self,
        tenant_id: Uuid,
        scene_id: Uuid,
    ) -> Result<Vec<SceneReference>> {
        let sql = format!(
            r#"
            SELECT {REFERENCE_COLUMNS} FROM scene_references
            WHERE tenant_id = ?1 AND scene_id = ?2
            ORDER BY created_at ASC, id ASC
            "#
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(scene_id.to_string()),
            )
            .await
            .map_err(db_error("scene_reference", scene_id))?;
        rows.into_iter().map(row_to_reference).collect()
    }

    /// Scenes an entity appears in, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_entity(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Vec<SceneReference>> {
        let sql = format!(
            r#"
            SELECT {REFERENCE_COLUMNS} FROM scene_references
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
            .map_err(db_error("scene_reference", entity_id))?;
        rows.into_iter().map(row_to_reference).collect()
    }

    /// Delete a reference
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM scene_references WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("scene_reference", id))?;
        Ok(())
    }

    /// Delete every reference of a scene
    #[instrument(skip(self))]
    pub async fn delete_by_scene(&self, tenant_id: Uuid, scene_id: Uuid) -> Result<u64> {
        let result = self
            .db
            .execute(
                sqlx::query("DELETE FROM scene_references WHERE tenant_id = ?1 AND scene_id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(scene_id.to_string()),
            )
            .await
            .map_err(db_error("scene_reference", scene_id))?;
        Ok(result.rows_affected())
    }

    /// Delete the reference between a scene and one entity
    #[instrument(skip(self))]
    pub async fn delete_by_scene_and_entity(
        &self,
        tenant_id: Uuid,
        scene_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<()> {
        self.db
            .execute(
                sqlx::query(
                    r#"
                    DELETE FROM scene_references
                    WHERE tenant_id = ?1 AND scene_id = ?2 AND entity_type = ?3 AND entity_id = ?4
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(scene_id.to_string())
                .bind(entity_type.as_str())
                .bind(entity_id.to_string()),
            )
            .await
            .map_err(db_error("scene_reference", scene_id))?;
        Ok(())
    }
}
