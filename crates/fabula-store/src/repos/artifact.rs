//! Artifact and artifact-reference repositories

use super::{count, expect_rows, owner_tenant};
use crate::codec::{opt_text, parse, text, timestamp, ts, uuid};
use crate::db::Database;
use crate::error::{db_error, unique_error};
use fabula_core::pagination::Page;
use fabula_core::world::{Artifact, ArtifactReference};
use fabula_core::{EntityType, Error, Result};
use sqlx::sqlite::SqliteRow;
use tracing::{debug, instrument};
use uuid::Uuid;

const COLUMNS: &str = "id, tenant_id, world_id, name, description, rarity, created_at, updated_at";
const REFERENCE_COLUMNS: &str = "id, tenant_id, artifact_id, entity_type, entity_id, created_at";

fn row_to_artifact(row: SqliteRow) -> Result<Artifact> {
    Ok(Artifact {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        world_id: uuid(&row, "world_id")?,
        name: text(&row, "name")?,
        description: text(&row, "description")?,
        rarity: opt_text(&row, "rarity")?,
        created_at: timestamp(&row, "created_at")?,
        updated_at: timestamp(&row, "updated_at")?,
    })
}

fn row_to_reference(row: SqliteRow) -> Result<ArtifactReference> {
    Ok(ArtifactReference {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        artifact_id: uuid(&row, "artifact_id")?,
        entity_type: parse(&row, "entity_type")?,
        entity_id: uuid(&row, "entity_id")?,
        created_at: timestamp(&row, "created_at")?,
    })
}

// =============================================================================
// Artifacts
// =============================================================================

/// Artifacts of a world
#[derive(Clone)]
pub struct ArtifactRepository {
    db: Database,
}

impl ArtifactRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert an artifact
    #[instrument(skip(self, artifact), fields(artifact_id = %artifact.id))]
    pub async fn create(&self, artifact: &Artifact) -> Result<()> {
        artifact.validate()?;
        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO artifacts (
                        id, tenant_id, world_id, name, description, rarity, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                )
                .bind(artifact.id.to_string())
                .bind(artifact.tenant_id.to_string())
                .bind(artifact.world_id.to_string())
                .bind(&artifact.name)
                .bind(&artifact.description)
                .bind(&artifact.rarity)
                .bind(ts(&artifact.created_at))
                .bind(ts(&artifact.updated_at)),
            )
            .await
            .map_err(db_error("artifact", artifact.id))?;

        debug!("Artifact created");
        Ok(())
    }

    /// Fetch an artifact
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Artifact> {
        let sql = format!("SELECT {COLUMNS} FROM artifacts WHERE tenant_id = ?1 AND id = ?2");
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("artifact", id))?
            .ok_or_else(|| Error::not_found("artifact", id))?;
        row_to_artifact(row)
    }

    /// Artifacts of a world, newest first
    #[instrument(skip(self))]
    pub async fn list_by_world(
        &self,
        tenant_id: Uuid,
        world_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Artifact>> {
        let page = Page::new(limit, offset)?;
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM artifacts
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
            .map_err(db_error("artifact", world_id))?;
        rows.into_iter().map(row_to_artifact).collect()
    }

    /// Number of artifacts in a world
    pub async fn count_by_world(&self, tenant_id: Uuid, world_id: Uuid) -> Result<i64> {
        count(
            &self.db,
            sqlx::query("SELECT COUNT(*) FROM artifacts WHERE tenant_id = ?1 AND world_id = ?2")
                .bind(tenant_id.to_string())
                .bind(world_id.to_string()),
            "artifact",
            world_id,
        )
        .await
    }

    /// Update the mutable columns
    #[instrument(skip(self, artifact), fields(artifact_id = %artifact.id))]
    pub async fn update(&self, artifact: &Artifact) -> Result<()> {
        artifact.validate()?;
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    UPDATE artifacts
                    SET name = ?3, description = ?4, rarity = ?5, updated_at = ?6
                    WHERE tenant_id = ?1 AND id = ?2
                    "#,
                )
                .bind(artifact.tenant_id.to_string())
                .bind(artifact.id.to_string())
                .bind(&artifact.name)
                .bind(&artifact.description)
                .bind(&artifact.rarity)
                .bind(ts(&artifact.updated_at)),
            )
            .await
            .map_err(db_error("artifact", artifact.id))?;
        expect_rows(result, "artifact", artifact.id)
    }

    /// Delete an artifact and its references
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM artifacts WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("artifact", id))?;
        Ok(())
    }
}

// =============================================================================
// Artifact references
// =============================================================================

/// Who carries an artifact, or where it is kept
#[derive(Clone)]
pub struct ArtifactReferenceRepository {
    db: Database,
}

impl ArtifactReferenceRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a reference; the tenant is taken from the artifact
    #[instrument(skip(self, reference), fields(artifact_id = %reference.artifact_id, entity = %reference.entity_type))]
    pub async fn create(&self, reference: &mut ArtifactReference) -> Result<()> {
        reference.validate()?;
        reference.tenant_id =
            owner_tenant(&self.db, "artifacts", "artifact", reference.artifact_id).await?;

        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO artifact_references (
                        id, tenant_id, artifact_id, entity_type, entity_id, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .bind(reference.id.to_string())
                .bind(reference.tenant_id.to_string())
                .bind(reference.artifact_id.to_string())
                .bind(reference.entity_type.as_str())
                .bind(reference.entity_id.to_string())
                .bind(ts(&reference.created_at)),
            )
            .await
            .map_err(unique_error(
                "artifact_reference",
                "artifact_id,entity_type,entity_id",
                format!(
                    "{}/{}/{}",
                    reference.artifact_id, reference.entity_type, reference.entity_id
                ),
            ))?;

        debug!("Artifact reference created");
        Ok(())
    }

    /// Fetch a reference
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<ArtifactReference> {
        let sql = format!(
            "SELECT {REFERENCE_COLUMNS} FROM artifact_references WHERE tenant_id = ?1 AND id = ?2"
        );
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("artifact_reference", id))?
            .ok_or_else(|| Error::not_found("artifact_reference", id))?;
        row_to_reference(row)
    }

    /// Holders of an artifact, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_artifact(
        &self,
        tenant_id: Uuid,
        artifact_id: Uuid,
    ) -> Result<Vec<ArtifactReference>> {
        let sql = format!(
            r#"
            SELECT {REFERENCE_COLUMNS} FROM artifact_references
            WHERE tenant_id = ?1 AND artifact_id = ?2
            ORDER BY created_at ASC, id ASC
            "#
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(artifact_id.to_string()),
            )
            .await
            .map_err(db_error("artifact_reference", artifact_id))?;
        rows.into_iter().map(row_to_reference).collect()
    }

    /// Artifacts held by one entity, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_entity(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Vec<ArtifactReference>> {
        let sql = format!(
            r#"
            SELECT {REFERENCE_COLUMNS} FROM artifact_references
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
            .map_err(db_error("artifact_reference", entity_id))?;
        rows.into_iter().map(row_to_reference).collect()
    }

    /// Delete a reference
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM artifact_references WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("artifact_reference", id))?;
        Ok(())
    }

    /// Delete every reference of an artifact
    #[instrument(skip(self))]
    pub async fn delete_by_artifact(&self, tenant_id: Uuid, artifact_id: Uuid) -> Result<u64> {
        let result = self
            .db
            .execute(
                sqlx::query(
                    "DELETE FROM artifact_references WHERE tenant_id = ?1 AND artifact_id = ?2",
                )
                .bind(tenant_id.to_string())
                .bind(artifact_id.to_string()),
            )
            .await
            .map_err(db_error("artifact_reference", artifact_id))?;
        Ok(result.rows_affected())
    }

    /// Delete the reference between an artifact and one entity
    #[instrument(skip(self))]
    pub async fn delete_by_artifact_and_entity(
        &self,
        tenant_id: Uuid,
        artifact_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<()> {
        self.db
            .execute(
                sqlx::query(
                    r#"
                    DELETE FROM artifact_references
                    WHERE tenant_id = ?1 AND artifact_id = ?2 AND entity_type = ?3 AND entity_id = ?4
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(artifact_id.to_string())
                .bind(entity_type.as_str())
                .bind(entity_id.to_string()),
            )
            .await
            .map_err(db_error("artifact_reference", artifact_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::{TenantRepository, WorldRepository};
    use fabula_core::world::World;
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
    async fn test_artifact_crud() {
        let (db, tenant_id, world_id) = setup().await;
        let repo = ArtifactRepository::new(db);
        let mut sword = Artifact::new(tenant_id, world_id, "Dawnblade");
        sword.rarity = Some("legendary".into());
        repo.create(&sword).await.unwrap();
        assert_eq!(repo.get_by_id(tenant_id, sword.id).await.unwrap(), sword);

        sword.description = "Forged at first light".into();
        repo.update(&sword).await.unwrap();
        assert_eq!(
            repo.get_by_id(tenant_id, sword.id).await.unwrap().description,
            "Forged at first light"
        );
        assert_eq!(repo.count_by_world(tenant_id, world_id).await.unwrap(), 1);

        repo.delete(tenant_id, sword.id).await.unwrap();
        assert!(repo.list_by_world(tenant_id, world_id, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reference_holders() {
        let (db, tenant_id, world_id) = setup().await;
        let artifacts = ArtifactRepository::new(db.clone());
        let refs = ArtifactReferenceRepository::new(db);
        let sword = Artifact::new(tenant_id, world_id, "Dawnblade");
        artifacts.create(&sword).await.unwrap();

        let hero = Uuid::new_v4();
        let mut held = ArtifactReference::new(sword.id, EntityType::Character, hero);
        refs.create(&mut held).await.unwrap();
        assert_eq!(held.tenant_id, tenant_id);
        assert_eq!(
            refs.list_by_entity(tenant_id, EntityType::Character, hero)
                .await
                .unwrap()
                .len(),
            1
        );

        refs.delete_by_artifact_and_entity(tenant_id, sword.id, EntityType::Character, hero)
            .await
            .unwrap();
        refs.delete_by_artifact_and_entity(tenant_id, sword.id, EntityType::Character, hero)
            .await
            .unwrap();
        assert!(refs.list_by_artifact(tenant_id, sword.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_holder_must_be_character_or_location() {
        let (db, tenant_id, world_id) = setup().await;
        let artifacts = ArtifactRepository::new(db.clone());
        let sword = Artifact::new(tenant_id, world_id, "Dawnblade");
        artifacts.create(&sword).await.unwrap();

        let mut reference = ArtifactReference::new(sword.id, EntityType::Faction, Uuid::new_v4());
        let err = ArtifactReferenceRepository::new(db)
            .create(&mut reference)
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }
}
