//! Beat repository

use super::expect_rows;
use crate::codec::{int, parse, text, timestamp, ts, uuid};
use crate::db::Database;
use crate::error::db_error;
use fabula_core::story::Beat;
use fabula_core::{Error, Result};
use sqlx::sqlite::SqliteRow;
use tracing::{debug, instrument};
use uuid::Uuid;

pub(crate) const COLUMNS: &str =
    "id, tenant_id, scene_id, order_num, type, intent, outcome, created_at, updated_at";

pub(crate) fn row_to_beat(row: SqliteRow) -> Result<Beat> {
    Ok(Beat {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        scene_id: uuid(&row, "scene_id")?,
        order_num: int(&row, "order_num")?,
        beat_type: parse(&row, "type")?,
        intent: text(&row, "intent")?,
        outcome: text(&row, "outcome")?,
        created_at: timestamp(&row, "created_at")?,
        updated_at: timestamp(&row, "updated_at")?,
    })
}

/// Bind a beat onto an insert statement
pub(crate) fn bind_insert(beat: &Beat) -> crate::db::SqliteQuery<'static> {
    sqlx::query(
        r#"
        INSERT INTO beats (id, tenant_id, scene_id, order_num, type, intent, outcome, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(beat.id.to_string())
    .bind(beat.tenant_id.to_string())
    .bind(beat.scene_id.to_string())
    .bind(beat.order_num)
    .bind(beat.beat_type.as_str())
    .bind(beat.intent.clone())
    .bind(beat.outcome.clone())
    .bind(ts(&beat.created_at))
    .bind(ts(&beat.updated_at))
}

/// Beats of a scene
#[derive(Clone)]
pub struct BeatRepository {
    db: Database,
}

impl BeatRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a beat
    #[instrument(skip(self, beat), fields(beat_id = %beat.id, scene_id = %beat.scene_id))]
    pub async fn create(&self, beat: &Beat) -> Result<()> {
        beat.validate()?;
        self.db
            .execute(bind_insert(beat))
            .await
            .map_err(db_error("beat", beat.id))?;
        debug!(order = beat.order_num, beat_type = %beat.beat_type, "Beat created");
        Ok(())
    }

    /// Fetch a beat
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Beat> {
        let sql = format!("SELECT {COLUMNS} FROM beats WHERE tenant_id = ?1 AND id = ?2");
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("beat", id))?
            .ok_or_else(|| Error::not_found("beat", id))?;
        row_to_beat(row)
    }

    /// Beats of a scene in order
    #[instrument(skip(self))]
    pub async fn list_by_scene_ordered(&self, tenant_id: Uuid, scene_id: Uuid) -> Result<Vec<Beat>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM beats WHERE tenant_id = ?1 AND scene_id = ?2 ORDER BY order_num ASC, id ASC"
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(scene_id.to_string()),
            )
            .await
            .map_err(db_error("beat", scene_id))?;
        rows.into_iter().map(row_to_beat).collect()
    }

    /// Beats of every scene of a story, by scene order then beat order
    #[instrument(skip(self))]
    pub async fn list_by_story(&self, tenant_id: Uuid, story_id: Uuid) -> Result<Vec<Beat>> {
        let rows = self
            .db
            .fetch_all(
                sqlx::query(
                    r#"
                    SELECT b.id, b.tenant_id, b.scene_id, b.order_num, b.type, b.intent,
                           b.outcome, b.created_at, b.updated_at
                    FROM beats b
                    JOIN scenes s ON s.id = b.scene_id
                    WHERE b.tenant_id = ?1 AND s.tenant_id = ?1 AND s.story_id = ?2
                    ORDER BY s.order_num ASC, s.id ASC, b.order_num ASC, b.id ASC
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(story_id.to_string()),
            )
            .await
            .map_err(db_error("beat", story_id))?;
        rows.into_iter().map(row_to_beat).collect()
    }

    /// Update order, type, intent and outcome
    #[instrument(skip(self, beat), fields(beat_id = %beat.id))]
    pub async fn update(&self, beat: &Beat) -> Result<()> {
        beat.validate()?;
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    UPDATE beats
                    SET order_num = ?3, type = ?4, intent = ?5, outcome = ?6, updated_at = ?7
                    WHERE tenant_id = ?1 AND id = ?2
                    "#,
                )
                .bind(beat.tenant_id.to_string())
                .bind(beat.id.to_string())
                .bind(beat.order_num)
                .bind(beat.beat_type.as_str())
                .bind(&beat.intent)
                .bind(&beat.outcome)
                .bind(ts(&beat.updated_at)),
            )
            .await
            .map_err(db_error("beat", beat.id))?;
        expect_rows(result, "beat", beat.id)
    }

    /// Delete a beat
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM beats WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("beat", id))?;
        Ok(())
    }

    /// Delete every beat of a scene
    #[instrument(skip(self))]
    pub async fn delete_by_scene(&self, tenant_id: Uuid, scene_id: Uuid) -> Result<u64> {
        let result = self
            .db
            .execute(
                sqlx::query("DELETE FROM beats WHERE tenant_id = ?1 AND scene_id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(scene_id.to_string()),
            )
            .await
            .map_err(db_error("beat", scene_id))?;
        Ok(result.rows_affected())
    }
}
