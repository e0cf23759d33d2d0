//! Location repository

use super::{count, expect_rows};
use crate::codec::{int, opt_id, opt_text, opt_uuid, text, timestamp, ts, uuid};
use crate::db::Database;
use crate::error::db_error;
use crate::hierarchy::{depth_first, HierarchicalRepository};
use async_trait::async_trait;
use fabula_core::pagination::Page;
use fabula_core::world::Location;
use fabula_core::{Error, Result};
use sqlx::sqlite::SqliteRow;
use tracing::{debug, instrument};
use uuid::Uuid;

const COLUMNS: &str = "id, tenant_id, world_id, parent_id, name, type, description, hierarchy_level, created_at, updated_at";

fn row_to_location(row: SqliteRow) -> Result<Location> {
    Ok(Location {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        world_id: uuid(&row, "world_id")?,
        parent_id: opt_uuid(&row, "parent_id")?,
        name: text(&row, "name")?,
        location_type: opt_text(&row, "type")?,
        description: text(&row, "description")?,
        hierarchy_level: int(&row, "hierarchy_level")?,
        created_at: timestamp(&row, "created_at")?,
        updated_at: timestamp(&row, "updated_at")?,
    })
}

/// Locations of a world, arranged in a tree
#[derive(Clone)]
pub struct LocationRepository {
    db: Database,
}

impl LocationRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a location
    ///
    /// `hierarchy_level` is derived from the parent, which must exist in the
    /// same tenant.
    #[instrument(skip(self, location), fields(location_id = %location.id, parent_id = ?location.parent_id))]
    pub async fn create(&self, location: &mut Location) -> Result<()> {
        location.validate()?;
        self.derive_level(location).await?;

        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO locations (
                        id, tenant_id, world_id, parent_id, name, type, description,
                        hierarchy_level, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    "#,
                )
                .bind(location.id.to_string())
                .bind(location.tenant_id.to_string())
                .bind(location.world_id.to_string())
                .bind(opt_id(location.parent_id))
                .bind(&location.name)
                .bind(&location.location_type)
                .bind(&location.description)
                .bind(location.hierarchy_level)
                .bind(ts(&location.created_at))
                .bind(ts(&location.updated_at)),
            )
            .await
            .map_err(db_error("location", location.id))?;

        debug!(level = location.hierarchy_level, "Location created");
        Ok(())
    }

    /// Fetch a location
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Location> {
        let sql = format!("SELECT {COLUMNS} FROM locations WHERE tenant_id = ?1 AND id = ?2");
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("location", id))?
            .ok_or_else(|| Error::not_found("location", id))?;
        row_to_location(row)
    }

    /// Locations of a world by level, then name
    #[instrument(skip(self))]
    pub async fn list_by_world(
        &self,
        tenant_id: Uuid,
        world_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Location>> {
        let page = Page::new(limit, offset)?;
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM locations
            WHERE tenant_id = ?1 AND world_id = ?2
            ORDER BY hierarchy_level ASC, name ASC, id ASC
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
            .map_err(db_error("location", world_id))?;
        rows.into_iter().map(row_to_location).collect()
    }

    /// Every location of a world in depth-first order (siblings by name)
    #[instrument(skip(self))]
    pub async fn list_by_world_tree(&self, tenant_id: Uuid, world_id: Uuid) -> Result<Vec<Location>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM locations
            WHERE tenant_id = ?1 AND world_id = ?2
            ORDER BY hierarchy_level ASC, name ASC, id ASC
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
            .map_err(db_error("location", world_id))?;
        let flat = rows
            .into_iter()
            .map(row_to_location)
            .collect::<Result<Vec<_>>>()?;
        Ok(depth_first(flat))
    }

    /// Number of locations in a world
    pub async fn count_by_world(&self, tenant_id: Uuid, world_id: Uuid) -> Result<i64> {
        count(
            &self.db,
            sqlx::query("SELECT COUNT(*) FROM locations WHERE tenant_id = ?1 AND world_id = ?2")
                .bind(tenant_id.to_string())
                .bind(world_id.to_string()),
            "location",
            world_id,
        )
        .await
    }

    /// Update the mutable columns
    ///
    /// `parent_id` and `hierarchy_level` are stored as given; use
    /// [`HierarchicalRepository::reparent`] to move a location and have the
    /// levels recomputed.
    #[instrument(skip(self, location), fields(location_id = %location.id))]
    pub async fn update(&self, location: &Location) -> Result<()> {
        location.validate()?;
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    UPDATE locations
                    SET parent_id = ?3, name = ?4, type = ?5, description = ?6,
                        hierarchy_level = ?7, updated_at = ?8
                    WHERE tenant_id = ?1 AND id = ?2
                    "#,
                )
                .bind(location.tenant_id.to_string())
                .bind(location.id.to_string())
                .bind(opt_id(location.parent_id))
                .bind(&location.name)
                .bind(&location.location_type)
                .bind(&location.description)
                .bind(location.hierarchy_level)
                .bind(ts(&location.updated_at)),
            )
            .await
            .map_err(db_error("location", location.id))?;
        expect_rows(result, "location", location.id)
    }

    /// Delete a location; its children become roots
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM locations WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("location", id))?;
        Ok(())
    }
}

#[async_trait]
impl HierarchicalRepository for LocationRepository {
    type Node = Location;

    const TABLE: &'static str = "locations";
    const COLUMNS: &'static str = COLUMNS;

    fn database(&self) -> &Database {
        &self.db
    }

    fn decode(row: SqliteRow) -> Result<Location> {
        row_to_location(row)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Location> {
        LocationRepository::get_by_id(self, tenant_id, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::{TenantRepository, WorldRepository};
    use fabula_core::world::World;
    use fabula_core::Tenant;

    async fn setup() -> (LocationRepository, Uuid, Uuid) {
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
        (LocationRepository::new(db), tenant.id, world.id)
    }

    #[tokio::test]
    async fn test_levels_follow_parents() {
        let (repo, tenant_id, world_id) = setup().await;
        let mut continent = Location::new(tenant_id, world_id, "Continent");
        repo.create(&mut continent).await.unwrap();
        let mut city = Location::new(tenant_id, world_id, "City").with_parent(continent.id);
        repo.create(&mut city).await.unwrap();
        let mut tavern = Location::new(tenant_id, world_id, "Tavern").with_parent(city.id);
        tavern.hierarchy_level = 42;
        repo.create(&mut tavern).await.unwrap();

        assert_eq!(continent.hierarchy_level, 0);
        assert_eq!(city.hierarchy_level, 1);
        assert_eq!(
            repo.get_by_id(tenant_id, tavern.id).await.unwrap().hierarchy_level,
            2
        );
    }

    #[tokio::test]
    async fn test_parent_from_other_tenant_is_not_found() {
        let (repo, tenant_id, world_id) = setup().await;
        let mut root = Location::new(tenant_id, world_id, "Root");
        repo.create(&mut root).await.unwrap();

        let mut stray = Location::new(Uuid::new_v4(), world_id, "Stray").with_parent(root.id);
        let err = repo.create(&mut stray).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_children_and_tree() {
        let (repo, tenant_id, world_id) = setup().await;
        let mut north = Location::new(tenant_id, world_id, "North");
        let mut south = Location::new(tenant_id, world_id, "South");
        repo.create(&mut north).await.unwrap();
        repo.create(&mut south).await.unwrap();
        let mut port = Location::new(tenant_id, world_id, "Port").with_parent(south.id);
        let mut keep = Location::new(tenant_id, world_id, "Keep").with_parent(north.id);
        let mut forge = Location::new(tenant_id, world_id, "Forge").with_parent(north.id);
        repo.create(&mut port).await.unwrap();
        repo.create(&mut keep).await.unwrap();
        repo.create(&mut forge).await.unwrap();

        let children: Vec<_> = repo
            .get_children(tenant_id, north.id)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(children, vec!["Forge", "Keep"]);

        let tree: Vec<_> = repo
            .list_by_world_tree(tenant_id, world_id)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(tree, vec!["North", "Forge", "Keep", "South", "Port"]);

        let flat: Vec<_> = repo
            .list_by_world(tenant_id, world_id, 2, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(flat, vec!["North", "South"]);
        assert_eq!(repo.count_by_world(tenant_id, world_id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_reparent_shifts_subtree() {
        let (repo, tenant_id, world_id) = setup().await;
        let mut a = Location::new(tenant_id, world_id, "A");
        let mut b = Location::new(tenant_id, world_id, "B");
        repo.create(&mut a).await.unwrap();
        repo.create(&mut b).await.unwrap();
        let mut b1 = Location::new(tenant_id, world_id, "B1").with_parent(b.id);
        repo.create(&mut b1).await.unwrap();
        let mut b2 = Location::new(tenant_id, world_id, "B2").with_parent(b1.id);
        repo.create(&mut b2).await.unwrap();

        let moved = repo.reparent(tenant_id, b.id, Some(a.id)).await.unwrap();
        assert_eq!(moved.parent_id, Some(a.id));
        assert_eq!(moved.hierarchy_level, 1);
        assert_eq!(
            repo.get_by_id(tenant_id, b2.id).await.unwrap().hierarchy_level,
            3
        );

        let root = repo.reparent(tenant_id, b.id, None).await.unwrap();
        assert_eq!(root.hierarchy_level, 0);
        assert_eq!(
            repo.get_by_id(tenant_id, b1.id).await.unwrap().hierarchy_level,
            1
        );
    }

    #[tokio::test]
    async fn test_reparent_rejects_cycles() {
        let (repo, tenant_id, world_id) = setup().await;
        let mut a = Location::new(tenant_id, world_id, "A");
        repo.create(&mut a).await.unwrap();
        let mut b = Location::new(tenant_id, world_id, "B").with_parent(a.id);
        repo.create(&mut b).await.unwrap();

        assert!(repo
            .reparent(tenant_id, a.id, Some(a.id))
            .await
            .unwrap_err()
            .is_conflict());
        assert!(repo
            .reparent(tenant_id, a.id, Some(b.id))
            .await
            .unwrap_err()
            .is_conflict());
    }

    #[tokio::test]
    async fn test_crossed_reparents_cannot_form_cycle() {
        let (repo, tenant_id, world_id) = setup().await;
        let mut a = Location::new(tenant_id, world_id, "A");
        let mut b = Location::new(tenant_id, world_id, "B");
        repo.create(&mut a).await.unwrap();
        repo.create(&mut b).await.unwrap();

        let (first, second) = tokio::join!(
            repo.reparent(tenant_id, a.id, Some(b.id)),
            repo.reparent(tenant_id, b.id, Some(a.id)),
        );
        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| r.as_ref().is_err_and(|e| e.is_conflict())));

        let a = repo.get_by_id(tenant_id, a.id).await.unwrap();
        let b = repo.get_by_id(tenant_id, b.id).await.unwrap();
        assert!(a.parent_id.is_none() || b.parent_id.is_none());
        assert_eq!(a.hierarchy_level + b.hierarchy_level, 1);
    }

    #[tokio::test]
    async fn test_reparent_under_missing_parent() {
        let (repo, tenant_id, world_id) = setup().await;
        let mut a = Location::new(tenant_id, world_id, "A");
        repo.create(&mut a).await.unwrap();

        let err = repo
            .reparent(tenant_id, a.id, Some(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(repo
            .reparent(tenant_id, Uuid::new_v4(), None)
            .await
            .unwrap_err()
            .is_not_found());
        assert_eq!(repo.get_by_id(tenant_id, a.id).await.unwrap().parent_id, None);
    }

    #[tokio::test]
    async fn test_delete_orphans_children() {
        let (repo, tenant_id, world_id) = setup().await;
        let mut a = Location::new(tenant_id, world_id, "A");
        repo.create(&mut a).await.unwrap();
        let mut b = Location::new(tenant_id, world_id, "B").with_parent(a.id);
        repo.create(&mut b).await.unwrap();

        repo.delete(tenant_id, a.id).await.unwrap();
        repo.delete(tenant_id, a.id).await.unwrap();
        let orphan = repo.get_by_id(tenant_id, b.id).await.unwrap();
        assert_eq!(orphan.parent_id, None);
    }
}
