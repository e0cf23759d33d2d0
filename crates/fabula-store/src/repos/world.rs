//! World repository

use super::{count, expect_rows};
use crate::codec::{flag, opt_id, opt_text, opt_uuid, text, timestamp, ts, uuid};
use crate::db::Database;
use crate::error::db_error;
use fabula_core::pagination::Page;
use fabula_core::world::World;
use fabula_core::{Error, Result};
use sqlx::sqlite::SqliteRow;
use tracing::{debug, instrument};
use uuid::Uuid;

const COLUMNS: &str =
    "id, tenant_id, name, description, genre, is_implicit, rpg_system_id, created_at, updated_at";

fn row_to_world(row: SqliteRow) -> Result<World> {
    Ok(World {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        name: text(&row, "name")?,
        description: text(&row, "description")?,
        genre: opt_text(&row, "genre")?,
        is_implicit: flag(&row, "is_implicit")?,
        rpg_system_id: opt_uuid(&row, "rpg_system_id")?,
        created_at: timestamp(&row, "created_at")?,
        updated_at: timestamp(&row, "updated_at")?,
    })
}

/// Worlds owned by a tenant
#[derive(Clone)]
pub struct WorldRepository {
    db: Database,
}

impl WorldRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a world
    #[instrument(skip(self, world), fields(world_id = %world.id, tenant_id = %world.tenant_id))]
    pub async fn create(&self, world: &World) -> Result<()> {
        world.validate()?;
        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO worlds (
                        id, tenant_id, name, description, genre, is_implicit,
                        rpg_system_id, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    "#,
                )
                .bind(world.id.to_string())
                .bind(world.tenant_id.to_string())
                .bind(&world.name)
                .bind(&world.description)
                .bind(&world.genre)
                .bind(world.is_implicit)
                .bind(opt_id(world.rpg_system_id))
                .bind(ts(&world.created_at))
                .bind(ts(&world.updated_at)),
            )
            .await
            .map_err(db_error("world", world.id))?;

        debug!("World created");
        Ok(())
    }

    /// Fetch a world
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<World> {
        let sql = format!("SELECT {COLUMNS} FROM worlds WHERE tenant_id = ?1 AND id = ?2");
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("world", id))?
            .ok_or_else(|| Error::not_found("world", id))?;
        row_to_world(row)
    }

    /// Worlds of a tenant, newest first
    #[instrument(skip(self))]
    pub async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<World>> {
        let page = Page::new(limit, offset)?;
        let sql = format!(
            "SELECT {COLUMNS} FROM worlds WHERE tenant_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(page.limit)
                    .bind(page.offset),
            )
            .await
            .map_err(db_error("world", tenant_id))?;
        rows.into_iter().map(row_to_world).collect()
    }

    /// Number of worlds owned by a tenant
    pub async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<i64> {
        count(
            &self.db,
            sqlx::query("SELECT COUNT(*) FROM worlds WHERE tenant_id = ?1")
                .bind(tenant_id.to_string()),
            "world",
            tenant_id,
        )
        .await
    }

    /// Update the mutable columns
    #[instrument(skip(self, world), fields(world_id = %world.id))]
    pub async fn update(&self, world: &World) -> Result<()> {
        world.validate()?;
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    UPDATE worlds
                    SET name = ?3, description = ?4, genre = ?5, is_implicit = ?6,
                        rpg_system_id = ?7, updated_at = ?8
                    WHERE tenant_id = ?1 AND id = ?2
                    "#,
                )
                .bind(world.tenant_id.to_string())
                .bind(world.id.to_string())
                .bind(&world.name)
                .bind(&world.description)
                .bind(&world.genre)
                .bind(world.is_implicit)
                .bind(opt_id(world.rpg_system_id))
                .bind(ts(&world.updated_at)),
            )
            .await
            .map_err(db_error("world", world.id))?;
        expect_rows(result, "world", world.id)
    }

    /// Delete a world and, by cascade, its entities
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM worlds WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("world", id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::TenantRepository;
    use fabula_core::Tenant;

    async fn setup() -> (WorldRepository, Uuid) {
        let db = Database::in_memory().await.unwrap();
        let tenant = Tenant::new("acme");
        TenantRepository::new(db.clone())
            .create(&tenant)
            .await
            .unwrap();
        (WorldRepository::new(db), tenant.id)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (repo, tenant_id) = setup().await;
        let mut world = World::new(tenant_id, "Eldoria");
        world.genre = Some("fantasy".into());
        world.rpg_system_id = Some(Uuid::new_v4());
        repo.create(&world).await.unwrap();

        assert_eq!(repo.get_by_id(tenant_id, world.id).await.unwrap(), world);
        assert_eq!(repo.count_by_tenant(tenant_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_conflict() {
        let (repo, _) = setup().await;
        let err = repo
            .create(&World::new(Uuid::new_v4(), "Orphan"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let (repo, tenant_id) = setup().await;
        let mut old = World::new(tenant_id, "Old");
        old.created_at -= chrono::Duration::seconds(60);
        let new = World::new(tenant_id, "New");
        repo.create(&old).await.unwrap();
        repo.create(&new).await.unwrap();

        let names: Vec<_> = repo
            .list_by_tenant(tenant_id, 0, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.name)
            .collect();
        assert_eq!(names, vec!["New", "Old"]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (repo, tenant_id) = setup().await;
        let world = World::new(tenant_id, "Eldoria");
        repo.create(&world).await.unwrap();

        repo.delete(tenant_id, world.id).await.unwrap();
        repo.delete(tenant_id, world.id).await.unwrap();
        assert!(repo
            .get_by_id(tenant_id, world.id)
            .await
            .unwrap_err()
            .is_not_found());
    }
}
