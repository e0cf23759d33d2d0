//! Lore and lore-reference repositories

use super::{count, expect_rows, owner_tenant};
use crate::codec::{int, opt_id, opt_text, opt_uuid, parse, text, timestamp, ts, uuid};
use crate::db::Database;
use crate::error::{db_error, unique_error};
use crate::hierarchy::{depth_first, HierarchicalRepository};
use async_trait::async_trait;
use fabula_core::pagination::Page;
use fabula_core::world::{Lore, LoreReference};
use fabula_core::{EntityType, Error, Result};
use sqlx::sqlite::SqliteRow;
use tracing::{debug, instrument};
use uuid::Uuid;

const COLUMNS: &str = "id, tenant_id, world_id, parent_id, name, category, description, rules, limitations, requirements, hierarchy_level, created_at, updated_at";
const REFERENCE_COLUMNS: &str =
    "id, tenant_id, lore_id, entity_type, entity_id, relationship_type, notes, created_at";

fn row_to_lore(row: SqliteRow) -> Result<Lore> {
    Ok(Lore {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        world_id: uuid(&row, "world_id")?,
        parent_id: opt_uuid(&row, "parent_id")?,
        name: text(&row, "name")?,
        category: opt_text(&row, "category")?,
        description: text(&row, "description")?,
        rules: text(&row, "rules")?,
        limitations: text(&row, "limitations")?,
        requirements: text(&row, "requirements")?,
        hierarchy_level: int(&row, "hierarchy_level")?,
        created_at: timestamp(&row, "created_at")?,
        updated_at: timestamp(&row, "updated_at")?,
    })
}

fn row_to_reference(row: SqliteRow) -> Result<LoreReference> {
    Ok(LoreReference {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        lore_id: uuid(&row, "lore_id")?,
        entity_type: parse(&row, "entity_type")?,
        entity_id: uuid(&row, "entity_id")?,
        relationship_type: opt_text(&row, "relationship_type")?,
        notes: text(&row, "notes")?,
        created_at: timestamp(&row, "created_at")?,
    })
}

// =============================================================================
// Lores
// =============================================================================

/// Lore entries of a world, arranged in a tree
#[derive(Clone)]
pub struct LoreRepository {
    db: Database,
}

impl LoreRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a lore entry, deriving its level from the parent
    #[instrument(skip(self, lore), fields(lore_id = %lore.id, parent_id = ?lore.parent_id))]
    pub async fn create(&self, lore: &mut Lore) -> Result<()> {
        lore.validate()?;
        self.derive_level(lore).await?;

        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO lores (
                        id, tenant_id, world_id, parent_id, name, category, description,
                        rules, limitations, requirements, hierarchy_level, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                    "#,
                )
                .bind(lore.id.to_string())
                .bind(lore.tenant_id.to_string())
                .bind(lore.world_id.to_string())
                .bind(opt_id(lore.parent_id))
                .bind(&lore.name)
                .bind(&lore.category)
                .bind(&lore.description)
                .bind(&lore.rules)
                .bind(&lore.limitations)
                .bind(&lore.requirements)
                .bind(lore.hierarchy_level)
                .bind(ts(&lore.created_at))
                .bind(ts(&lore.updated_at)),
            )
            .await
            .map_err(db_error("lore", lore.id))?;

        debug!(level = lore.hierarchy_level, "Lore created");
        Ok(())
    }

    /// Fetch a lore entry
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Lore> {
        let sql = format!("SELECT {COLUMNS} FROM lores WHERE tenant_id = ?1 AND id = ?2");
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("lore", id))?
            .ok_or_else(|| Error::not_found("lore", id))?;
        row_to_lore(row)
    }

    /// Lore entries of a world by level, then name
    #[instrument(skip(self))]
    pub async fn list_by_world(
        &self,
        tenant_id: Uuid,
        world_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Lore>> {
        let page = Page::new(limit, offset)?;
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM lores
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
            .map_err(db_error("lore", world_id))?;
        rows.into_iter().map(row_to_lore).collect()
    }

    /// Every lore entry of a world, depth-first
    #[instrument(skip(self))]
    pub async fn list_by_world_tree(&self, tenant_id: Uuid, world_id: Uuid) -> Result<Vec<Lore>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM lores WHERE tenant_id = ?1 AND world_id = ?2 ORDER BY name ASC, id ASC"
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(world_id.to_string()),
            )
            .await
            .map_err(db_error("lore", world_id))?;
        let lores = rows
            .into_iter()
            .map(row_to_lore)
            .collect::<Result<Vec<_>>>()?;
        Ok(depth_first(lores))
    }

    /// Number of lore entries in a world
    pub async fn count_by_world(&self, tenant_id: Uuid, world_id: Uuid) -> Result<i64> {
        count(
            &self.db,
            sqlx::query("SELECT COUNT(*) FROM lores WHERE tenant_id = ?1 AND world_id = ?2")
                .bind(tenant_id.to_string())
                .bind(world_id.to_string()),
            "lore",
            world_id,
        )
        .await
    }

    /// Update the mutable columns (`hierarchy_level` is stored as given)
    #[instrument(skip(self, lore), fields(lore_id = %lore.id))]
    pub async fn update(&self, lore: &Lore) -> Result<()> {
        lore.validate()?;
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    UPDATE lores
                    SET parent_id = ?3, name = ?4, category = ?5, description = ?6, rules = ?7,
                        limitations = ?8, requirements = ?9, hierarchy_level = ?10, updated_at = ?11
                    WHERE tenant_id = ?1 AND id = ?2
                    "#,
                )
                .bind(lore.tenant_id.to_string())
                .bind(lore.id.to_string())
                .bind(opt_id(lore.parent_id))
                .bind(&lore.name)
                .bind(&lore.category)
                .bind(&lore.description)
                .bind(&lore.rules)
                .bind(&lore.limitations)
                .bind(&lore.requirements)
                .bind(lore.hierarchy_level)
                .bind(ts(&lore.updated_at)),
            )
            .await
            .map_err(db_error("lore", lore.id))?;
        expect_rows(result, "lore", lore.id)
    }

    /// Delete a lore entry; its children become roots
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM lores WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("lore", id))?;
        Ok(())
    }
}

#[async_trait]
impl HierarchicalRepository for LoreRepository {
    type Node = Lore;

    const TABLE: &'static str = "lores";
    const COLUMNS: &'static str = COLUMNS;

    fn database(&self) -> &Database {
        &self.db
    }

    fn decode(row: SqliteRow) -> Result<Lore> {
        row_to_lore(row)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Lore> {
        LoreRepository::get_by_id(self, tenant_id, id).await
    }
}

// =============================================================================
// Lore references
// =============================================================================

/// Links from a lore entry to the entities it touches
///
/// `update`, `delete` and `delete_by_lore_and_entity` report `NotFound`
/// when nothing matched.
#[derive(Clone)]
pub struct LoreReferenceRepository {
    db: Database,
}

impl LoreReferenceRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a reference; the tenant is taken from the lore entry
    #[instrument(skip(self, reference), fields(lore_id = %reference.lore_id, entity = %reference.entity_type))]
    pub async fn create(&self, reference: &mut LoreReference) -> Result<()> {
        reference.tenant_id = owner_tenant(&self.db, "lores", "lore", reference.lore_id).await?;

        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO lore_references (
                        id, tenant_id, lore_id, entity_type, entity_id, relationship_type, notes, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                )
                .bind(reference.id.to_string())
                .bind(reference.tenant_id.to_string())
                .bind(reference.lore_id.to_string())
                .bind(reference.entity_type.as_str())
                .bind(reference.entity_id.to_string())
                .bind(&reference.relationship_type)
                .bind(&reference.notes)
                .bind(ts(&reference.created_at)),
            )
            .await
            .map_err(unique_error(
                "lore_reference",
                "lore_id,entity_type,entity_id",
                format!(
                    "{}/{}/{}",
                    reference.lore_id, reference.entity_type, reference.entity_id
                ),
            ))?;

        debug!("Lore reference created");
        Ok(())
    }

    /// Fetch a reference
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<LoreReference> {
        let sql = format!(
            "SELECT {REFERENCE_COLUMNS} FROM lore_references WHERE tenant_id = ?1 AND id = ?2"
        );
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("lore_reference", id))?
            .ok_or_else(|| Error::not_found("lore_reference", id))?;
        row_to_reference(row)
    }

    /// References of a lore entry, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_lore(&self, tenant_id: Uuid, lore_id: Uuid) -> Result<Vec<LoreReference>> {
        let sql = format!(
            r#"
            SELECT {REFERENCE_COLUMNS} FROM lore_references
            WHERE tenant_id = ?1 AND lore_id = ?2
            ORDER BY created_at ASC, id ASC
            "#
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(lore_id.to_string()),
            )
            .await
            .map_err(db_error("lore_reference", lore_id))?;
        rows.into_iter().map(row_to_reference).collect()
    }

    /// References pointing at one entity, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_entity(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Vec<LoreReference>> {
        let sql = format!(
            r#"
            SELECT {REFERENCE_COLUMNS} FROM lore_references
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
            .map_err(db_error("lore_reference", entity_id))?;
        rows.into_iter().map(row_to_reference).collect()
    }

    /// Update relationship type and notes
    #[instrument(skip(self, reference), fields(reference_id = %reference.id))]
    pub async fn update(&self, reference: &LoreReference) -> Result<()> {
        let result = self
            .db
            .execute(
                sqlx::query(
                    "UPDATE lore_references SET relationship_type = ?3, notes = ?4 WHERE tenant_id = ?1 AND id = ?2",
                )
                .bind(reference.tenant_id.to_string())
                .bind(reference.id.to_string())
                .bind(&reference.relationship_type)
                .bind(&reference.notes),
            )
            .await
            .map_err(db_error("lore_reference", reference.id))?;
        expect_rows(result, "lore_reference", reference.id)
    }

    /// Delete a reference (`NotFound` when absent)
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        let result = self
            .db
            .execute(
                sqlx::query("DELETE FROM lore_references WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("lore_reference", id))?;
        expect_rows(result, "lore_reference", id)
    }

    /// Delete every reference of a lore entry
    #[instrument(skip(self))]
    pub async fn delete_by_lore(&self, tenant_id: Uuid, lore_id: Uuid) -> Result<u64> {
        let result = self
            .db
            .execute(
                sqlx::query("DELETE FROM lore_references WHERE tenant_id = ?1 AND lore_id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(lore_id.to_string()),
            )
            .await
            .map_err(db_error("lore_reference", lore_id))?;
        Ok(result.rows_affected())
    }

    /// Delete the reference between a lore entry and one entity (`NotFound` when absent)
    #[instrument(skip(self))]
    pub async fn delete_by_lore_and_entity(
        &self,
        tenant_id: Uuid,
        lore_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<()> {
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    DELETE FROM lore_references
                    WHERE tenant_id = ?1 AND lore_id = ?2 AND entity_type = ?3 AND entity_id = ?4
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(lore_id.to_string())
                .bind(entity_type.as_str())
                .bind(entity_id.to_string()),
            )
            .await
            .map_err(db_error("lore_reference", lore_id))?;
        expect_rows(
            result,
            "lore_reference",
            format!("{lore_id}/{entity_type}/{entity_id}"),
        )
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
    async fn test_tree_listing() {
        let (db, tenant_id, world_id) = setup().await;
        let repo = LoreRepository::new(db);
        let mut magic = Lore::new(tenant_id, world_id, "Magic");
        repo.create(&mut magic).await.unwrap();
        let mut religion = Lore::new(tenant_id, world_id, "Religion");
        repo.create(&mut religion).await.unwrap();
        let mut runes = Lore::new(tenant_id, world_id, "Runes").with_parent(magic.id);
        repo.create(&mut runes).await.unwrap();

        let tree: Vec<_> = repo
            .list_by_world_tree(tenant_id, world_id)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(tree, vec!["Magic", "Runes", "Religion"]);

        let children = repo.get_children(tenant_id, magic.id).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].hierarchy_level, 1);
        assert_eq!(repo.count_by_world(tenant_id, world_id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_reparent_under_own_child_is_conflict() {
        let (db, tenant_id, world_id) = setup().await;
        let repo = LoreRepository::new(db);
        let mut root = Lore::new(tenant_id, world_id, "Root");
        repo.create(&mut root).await.unwrap();
        let mut leaf = Lore::new(tenant_id, world_id, "Leaf").with_parent(root.id);
        repo.create(&mut leaf).await.unwrap();

        let err = repo
            .reparent(tenant_id, root.id, Some(leaf.id))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_references() {
        let (db, tenant_id, world_id) = setup().await;
        let lores = LoreRepository::new(db.clone());
        let refs = LoreReferenceRepository::new(db);
        let mut magic = Lore::new(tenant_id, world_id, "Magic");
        lores.create(&mut magic).await.unwrap();

        let mage = Uuid::new_v4();
        let mut reference = LoreReference::new(magic.id, EntityType::Character, mage);
        reference.relationship_type = Some("practitioner".into());
        refs.create(&mut reference).await.unwrap();
        let mut place = LoreReference::new(magic.id, EntityType::Location, Uuid::new_v4());
        refs.create(&mut place).await.unwrap();

        assert_eq!(refs.list_by_lore(tenant_id, magic.id).await.unwrap().len(), 2);
        assert_eq!(
            refs.list_by_entity(tenant_id, EntityType::Character, mage)
                .await
                .unwrap(),
            vec![reference.clone()]
        );

        assert_eq!(refs.delete_by_lore(tenant_id, magic.id).await.unwrap(), 2);
        assert!(refs
            .get_by_id(tenant_id, reference.id)
            .await
            .unwrap_err()
            .is_not_found());

        reference.notes = "gone".into();
        assert!(refs.update(&reference).await.unwrap_err().is_not_found());
    }
}
