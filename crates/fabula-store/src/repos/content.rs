//! Content blocks and the anchors tying them to world entities

use super::{expect_rows, owner_tenant};
use crate::codec::{json_object, json_text, opt_id, opt_int, opt_uuid, parse, text, timestamp, ts, uuid};
use crate::db::Database;
use crate::error::{db_error, unique_error};
use fabula_core::story::{ContentAnchor, ContentBlock, ContentBlockReference, ContentKind};
use fabula_core::{EntityType, Error, Result};
use sqlx::sqlite::SqliteRow;
use tracing::{debug, instrument};
use uuid::Uuid;

pub(crate) const COLUMNS: &str =
    "id, tenant_id, chapter_id, order_num, type, kind, content, metadata, created_at, updated_at";
const ANCHOR_COLUMNS: &str = "id, tenant_id, content_block_id, entity_type, entity_id, created_at";

pub(crate) fn row_to_block(row: SqliteRow) -> Result<ContentBlock> {
    Ok(ContentBlock {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        chapter_id: opt_uuid(&row, "chapter_id")?,
        order_num: opt_int(&row, "order_num")?,
        content_type: parse(&row, "type")?,
        kind: parse(&row, "kind")?,
        content: text(&row, "content")?,
        metadata: json_object(&row, "metadata"),
        created_at: timestamp(&row, "created_at")?,
        updated_at: timestamp(&row, "updated_at")?,
    })
}

fn row_to_anchor(row: SqliteRow) -> Result<ContentAnchor> {
    Ok(ContentAnchor {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        content_block_id: uuid(&row, "content_block_id")?,
        entity_type: parse(&row, "entity_type")?,
        entity_id: uuid(&row, "entity_id")?,
        created_at: timestamp(&row, "created_at")?,
    })
}

fn row_to_reference(row: SqliteRow) -> Result<ContentBlockReference> {
    Ok(ContentBlockReference {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        content_block_id: uuid(&row, "content_block_id")?,
        entity_type: parse(&row, "entity_type")?,
        entity_id: uuid(&row, "entity_id")?,
        created_at: timestamp(&row, "created_at")?,
    })
}

/// Bind a content block onto an insert statement
pub(crate) fn bind_insert(block: &ContentBlock) -> crate::db::SqliteQuery<'static> {
    sqlx::query(
        r#"
        INSERT INTO content_blocks (
            id, tenant_id, chapter_id, order_num, type, kind, content, metadata, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(block.id.to_string())
    .bind(block.tenant_id.to_string())
    .bind(opt_id(block.chapter_id))
    .bind(block.order_num)
    .bind(block.content_type.as_str())
    .bind(block.kind.as_str())
    .bind(block.content.clone())
    .bind(json_text(&block.metadata))
    .bind(ts(&block.created_at))
    .bind(ts(&block.updated_at))
}

// =============================================================================
// Content blocks
// =============================================================================

/// Prose and media blocks, optionally placed in a chapter
#[derive(Clone)]
pub struct ContentBlockRepository {
    db: Database,
}

impl ContentBlockRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a content block
    #[instrument(skip(self, block), fields(block_id = %block.id, kind = %block.kind))]
    pub async fn create(&self, block: &ContentBlock) -> Result<()> {
        self.db
            .execute(bind_insert(block))
            .await
            .map_err(db_error("content_block", block.id))?;
        debug!(chapter_id = ?block.chapter_id, "Content block created");
        Ok(())
    }

    /// Fetch a content block
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<ContentBlock> {
        let sql = format!("SELECT {COLUMNS} FROM content_blocks WHERE tenant_id = ?1 AND id = ?2");
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("content_block", id))?
            .ok_or_else(|| Error::not_found("content_block", id))?;
        row_to_block(row)
    }

    /// Blocks of a chapter in order; unordered blocks sort as position 0
    #[instrument(skip(self))]
    pub async fn list_by_chapter(
        &self,
        tenant_id: Uuid,
        chapter_id: Uuid,
    ) -> Result<Vec<ContentBlock>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM content_blocks
            WHERE tenant_id = ?1 AND chapter_id = ?2
            ORDER BY COALESCE(order_num, 0) ASC, created_at ASC, id ASC
            "#
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(chapter_id.to_string()),
            )
            .await
            .map_err(db_error("content_block", chapter_id))?;
        rows.into_iter().map(row_to_block).collect()
    }

    /// The block of a chapter with the given kind (e.g. its final text)
    #[instrument(skip(self))]
    pub async fn get_by_chapter_and_kind(
        &self,
        tenant_id: Uuid,
        chapter_id: Uuid,
        kind: ContentKind,
    ) -> Result<ContentBlock> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM content_blocks
            WHERE tenant_id = ?1 AND chapter_id = ?2 AND kind = ?3
            ORDER BY COALESCE(order_num, 0) ASC, created_at ASC
            LIMIT 1
            "#
        );
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(chapter_id.to_string())
                    .bind(kind.as_str()),
            )
            .await
            .map_err(db_error("content_block", chapter_id))?
            .ok_or_else(|| Error::not_found("content_block", format!("{chapter_id}/{kind}")))?;
        row_to_block(row)
    }

    /// Update placement, type, kind, body and metadata
    #[instrument(skip(self, block), fields(block_id = %block.id))]
    pub async fn update(&self, block: &ContentBlock) -> Result<()> {
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    UPDATE content_blocks
                    SET chapter_id = ?3, order_num = ?4, type = ?5, kind = ?6, content = ?7,
                        metadata = ?8, updated_at = ?9
                    WHERE tenant_id = ?1 AND id = ?2
                    "#,
                )
                .bind(block.tenant_id.to_string())
                .bind(block.id.to_string())
                .bind(opt_id(block.chapter_id))
                .bind(block.order_num)
                .bind(block.content_type.as_str())
                .bind(block.kind.as_str())
                .bind(&block.content)
                .bind(json_text(&block.metadata))
                .bind(ts(&block.updated_at)),
            )
            .await
            .map_err(db_error("content_block", block.id))?;
        expect_rows(result, "content_block", block.id)
    }

    /// Delete a block with its anchors and references
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM content_blocks WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("content_block", id))?;
        Ok(())
    }

    /// Delete every block of a chapter
    #[instrument(skip(self))]
    pub async fn delete_by_chapter(&self, tenant_id: Uuid, chapter_id: Uuid) -> Result<u64> {
        let result = self
            .db
            .execute(
                sqlx::query("DELETE FROM content_blocks WHERE tenant_id = ?1 AND chapter_id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(chapter_id.to_string()),
            )
            .await
            .map_err(db_error("content_block", chapter_id))?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Content anchors
// =============================================================================

/// Characters, locations and artifacts mentioned by a content block
#[derive(Clone)]
pub struct ContentAnchorRepository {
    db: Database,
}

impl ContentAnchorRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert an anchor
    #[instrument(skip(self, anchor), fields(block_id = %anchor.content_block_id, entity = %anchor.entity_type))]
    pub async fn create(&self, anchor: &ContentAnchor) -> Result<()> {
        anchor.validate()?;
        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO content_anchors (id, tenant_id, content_block_id, entity_type, entity_id, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .bind(anchor.id.to_string())
                .bind(anchor.tenant_id.to_string())
                .bind(anchor.content_block_id.to_string())
                .bind(anchor.entity_type.as_str())
                .bind(anchor.entity_id.to_string())
                .bind(ts(&anchor.created_at)),
            )
            .await
            .map_err(unique_error(
                "content_anchor",
                "content_block_id,entity_type,entity_id",
                format!(
                    "{}/{}/{}",
                    anchor.content_block_id, anchor.entity_type, anchor.entity_id
                ),
            ))?;
        Ok(())
    }

    /// Fetch an anchor
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<ContentAnchor> {
        let sql =
            format!("SELECT {ANCHOR_COLUMNS} FROM content_anchors WHERE tenant_id = ?1 AND id = ?2");
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("content_anchor", id))?
            .ok_or_else(|| Error::not_found("content_anchor", id))?;
        row_to_anchor(row)
    }

    /// Anchors of a block, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_content_block(
        &self,
        tenant_id: Uuid,
        content_block_id: Uuid,
    ) -> Result<Vec<ContentAnchor>> {
        let sql = format!(
            r#"
            SELECT {ANCHOR_COLUMNS} FROM content_anchors
            WHERE tenant_id = ?1 AND content_block_id = ?2
            ORDER BY created_at ASC, id ASC
            "#
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(content_block_id.to_string()),
            )
            .await
            .map_err(db_error("content_anchor", content_block_id))?;
        rows.into_iter().map(row_to_anchor).collect()
    }

    /// Blocks anchored to one entity, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_entity(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Vec<ContentAnchor>> {
        let sql = format!(
            r#"
            SELECT {ANCHOR_COLUMNS} FROM content_anchors
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
            .map_err(db_error("content_anchor", entity_id))?;
        rows.into_iter().map(row_to_anchor).collect()
    }

    /// Delete an anchor
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM content_anchors WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("content_anchor", id))?;
        Ok(())
    }

    /// Delete every anchor of a block
    #[instrument(skip(self))]
    pub async fn delete_by_content_block(
        &self,
        tenant_id: Uuid,
        content_block_id: Uuid,
    ) -> Result<u64> {
        let result = self
            .db
            .execute(
                sqlx::query(
                    "DELETE FROM content_anchors WHERE tenant_id = ?1 AND content_block_id = ?2",
                )
                .bind(tenant_id.to_string())
                .bind(content_block_id.to_string()),
            )
            .await
            .map_err(db_error("content_anchor", content_block_id))?;
        Ok(result.rows_affected())
    }

    /// Delete the anchor between a block and one entity
    #[instrument(skip(self))]
    pub async fn delete_by_content_block_and_entity(
        &self,
        tenant_id: Uuid,
        content_block_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<()> {
        self.db
            .execute(
                sqlx::query(
                    r#"
                    DELETE FROM content_anchors
                    WHERE tenant_id = ?1 AND content_block_id = ?2 AND entity_type = ?3 AND entity_id = ?4
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(content_block_id.to_string())
                .bind(entity_type.as_str())
                .bind(entity_id.to_string()),
            )
            .await
            .map_err(db_error("content_anchor", content_block_id))?;
        Ok(())
    }
}

// =============================================================================
// Content block references
// =============================================================================

/// Any entity, story-side or world-side, referenced by a content block
#[derive(Clone)]
pub struct ContentBlockReferenceRepository {
    db: Database,
}

impl ContentBlockReferenceRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a reference; the tenant is taken from the content block
    #[instrument(skip(self, reference), fields(block_id = %reference.content_block_id, entity = %reference.entity_type))]
    pub async fn create(&self, reference: &mut ContentBlockReference) -> Result<()> {
        reference.tenant_id = owner_tenant(
            &self.db,
            "content_blocks",
            "content_block",
            reference.content_block_id,
        )
        .await?;

        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO content_block_references (
                        id, tenant_id, content_block_id, entity_type, entity_id, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .bind(reference.id.to_string())
                .bind(reference.tenant_id.to_string())
                .bind(reference.content_block_id.to_string())
                .bind(reference.entity_type.as_str())
                .bind(reference.entity_id.to_string())
                .bind(ts(&reference.created_at)),
            )
            .await
            .map_err(unique_error(
                "content_block_reference",
                "content_block_id,entity_type,entity_id",
                format!(
                    "{}/{}/{}",
                    reference.content_block_id, reference.entity_type, reference.entity_id
                ),
            ))?;
        Ok(())
    }

    /// Fetch a reference
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<ContentBlockReference> {
        let sql = format!(
            "SELECT {ANCHOR_COLUMNS} FROM content_block_references WHERE tenant_id = ?1 AND id = ?2"
        );
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("content_block_reference", id))?
            .ok_or_else(|| Error::not_found("content_block_reference", id))?;
        row_to_reference(row)
    }

    /// References of a block, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_content_block(
        &self,
        tenant_id: Uuid,
        content_block_id: Uuid,
    ) -> Result<Vec<ContentBlockReference>> {
        let sql = format!(
            r#"
            SELECT {ANCHOR_COLUMNS} FROM content_block_references
            WHERE tenant_id = ?1 AND content_block_id = ?2
            ORDER BY created_at ASC, id ASC
            "#
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(content_block_id.to_string()),
            )
            .await
            .map_err(db_error("content_block_reference", content_block_id))?;
        rows.into_iter().map(row_to_reference).collect()
    }

    /// Blocks referencing one entity, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_entity(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Vec<ContentBlockReference>> {
        let sql = format!(
            r#"
            SELECT {ANCHOR_COLUMNS} FROM content_block_references
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
            .map_err(db_error("content_block_reference", entity_id))?;
        rows.into_iter().map(row_to_reference).collect()
    }

    /// Delete a reference
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM content_block_references WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("content_block_reference", id))?;
        Ok(())
    }

    /// Delete every reference of a block
    #[instrument(skip(self))]
    pub async fn delete_by_content_block(
        &self,
        tenant_id: Uuid,
        content_block_id: Uuid,
    ) -> Result<u64> {
        let result = self
            .db
            .execute(
                sqlx::query(
                    "DELETE FROM content_block_references WHERE tenant_id = ?1 AND content_block_id = ?2",
                )
                .bind(tenant_id.to_string())
                .bind(content_block_id.to_string()),
            )
            .await
            .map_err(db_error("content_block_reference", content_block_id))?;
        Ok(result.rows_affected())
    }

    /// Delete the reference between a block and one entity
    #[instrument(skip(self))]
    pub async fn delete_by_content_block_and_entity(
        &self,
        tenant_id: Uuid,
        content_block_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<()> {
        self.db
            .execute(
                sqlx::query(
                    r#"
                    DELETE FROM content_block_references
                    WHERE tenant_id = ?1 AND content_block_id = ?2 AND entity_type = ?3 AND entity_id = ?4
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(content_block_id.to_string())
                .bind(entity_type.as_str())
                .bind(entity_id.to_string()),
            )
            .await
            .map_err(db_error("content_block_reference", content_block_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::{ChapterRepository, StoryRepository, TenantRepository};
    use fabula_core::story::{Chapter, Story};
    use fabula_core::Tenant;
    use serde_json::json;

    async fn setup() -> (Database, Uuid, Uuid) {
        let db = Database::in_memory().await.unwrap();
        let tenant = Tenant::new("acme");
        TenantRepository::new(db.clone())
            .create(&tenant)
            .await
            .unwrap();
        let story = Story::new(tenant.id, "The Long Night");
        StoryRepository::new(db.clone())
            .create(&story)
            .await
            .unwrap();
        let chapter = Chapter::new(tenant.id, story.id, 1, "Dusk");
        ChapterRepository::new(db.clone())
            .create(&chapter)
            .await
            .unwrap();
        (db, tenant.id, chapter.id)
    }

    #[tokio::test]
    async fn test_chapter_order_treats_missing_as_zero() {
        let (db, tenant_id, chapter_id) = setup().await;
        let repo = ContentBlockRepository::new(db);
        let second = ContentBlock::new(tenant_id, Some(chapter_id), "second").at(2);
        let first = ContentBlock::new(tenant_id, Some(chapter_id), "first").at(1);
        let mut unplaced = ContentBlock::new(tenant_id, Some(chapter_id), "unplaced");
        unplaced.created_at -= chrono::Duration::seconds(5);
        for block in [&second, &first, &unplaced] {
            repo.create(block).await.unwrap();
        }

        let bodies: Vec<_> = repo
            .list_by_chapter(tenant_id, chapter_id)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.content)
            .collect();
        assert_eq!(bodies, vec!["unplaced", "first", "second"]);
        assert_eq!(repo.delete_by_chapter(tenant_id, chapter_id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_get_by_chapter_and_kind() {
        let (db, tenant_id, chapter_id) = setup().await;
        let repo = ContentBlockRepository::new(db);
        let draft = ContentBlock::new(tenant_id, Some(chapter_id), "rough");
        repo.create(&draft).await.unwrap();

        let err = repo
            .get_by_chapter_and_kind(tenant_id, chapter_id, ContentKind::Final)
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::NotFound { ref id, .. } if *id == format!("{chapter_id}/final"))
        );

        let mut fin = ContentBlock::new(tenant_id, Some(chapter_id), "polished")
            .with_kind(ContentKind::Final);
        fin.metadata.insert("words".into(), json!(2));
        repo.create(&fin).await.unwrap();
        let found = repo
            .get_by_chapter_and_kind(tenant_id, chapter_id, ContentKind::Final)
            .await
            .unwrap();
        assert_eq!(found, fin);
    }

    #[tokio::test]
    async fn test_anchors_and_references() {
        let (db, tenant_id, chapter_id) = setup().await;
        let block = ContentBlock::new(tenant_id, Some(chapter_id), "Aria drew the blade.");
        ContentBlockRepository::new(db.clone())
            .create(&block)
            .await
            .unwrap();

        let anchors = ContentAnchorRepository::new(db.clone());
        let hero = Uuid::new_v4();
        let anchor = ContentAnchor::new(tenant_id, block.id, EntityType::Character, hero);
        anchors.create(&anchor).await.unwrap();
        assert!(anchors
            .create(&ContentAnchor::new(tenant_id, block.id, EntityType::Character, hero))
            .await
            .unwrap_err()
            .is_already_exists());
        assert_eq!(anchors.get_by_id(tenant_id, anchor.id).await.unwrap(), anchor);
        assert_eq!(
            anchors
                .list_by_entity(tenant_id, EntityType::Character, hero)
                .await
                .unwrap()
                .len(),
            1
        );

        let refs = ContentBlockReferenceRepository::new(db);
        let mut reference = ContentBlockReference::new(block.id, EntityType::Scene, Uuid::new_v4());
        refs.create(&mut reference).await.unwrap();
        assert_eq!(reference.tenant_id, tenant_id);
        assert_eq!(refs.list_by_content_block(tenant_id, block.id).await.unwrap(), vec![reference]);

        let mut dangling =
            ContentBlockReference::new(Uuid::new_v4(), EntityType::Scene, Uuid::new_v4());
        let err = refs.create(&mut dangling).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { ref resource, .. } if resource == "content_block"));

        assert_eq!(anchors.delete_by_content_block(tenant_id, block.id).await.unwrap(), 1);
        anchors.delete(tenant_id, anchor.id).await.unwrap();
    }
}
