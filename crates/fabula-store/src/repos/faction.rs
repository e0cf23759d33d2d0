//! Faction and faction-reference repositories

use super::{count, expect_rows, owner_tenant};
use crate::codec::{int, opt_id, opt_text, opt_uuid, parse, text, timestamp, ts, uuid};
use crate::db::Database;
use crate::error::{db_error, unique_error};
use crate::hierarchy::HierarchicalRepository;
use async_trait::async_trait;
use fabula_core::pagination::Page;
use fabula_core::world::{Faction, FactionReference};
use fabula_core::{EntityType, Error, Result};
use sqlx::sqlite::SqliteRow;
use tracing::{debug, instrument};
use uuid::Uuid;

const COLUMNS: &str = "id, tenant_id, world_id, parent_id, name, type, description, beliefs, structure, symbols, hierarchy_level, created_at, updated_at";
const REFERENCE_COLUMNS: &str =
    "id, tenant_id, faction_id, entity_type, entity_id, role, notes, created_at";

fn row_to_faction(row: SqliteRow) -> Result<Faction> {
    Ok(Faction {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        world_id: uuid(&row, "world_id")?,
        parent_id: opt_uuid(&row, "parent_id")?,
        name: text(&row, "name")?,
        faction_type: opt_text(&row, "type")?,
        description: text(&row, "description")?,
        beliefs: text(&row, "beliefs")?,
        structure: text(&row, "structure")?,
        symbols: text(&row, "symbols")?,
        hierarchy_level: int(&row, "hierarchy_level")?,
        created_at: timestamp(&row, "created_at")?,
        updated_at: timestamp(&row, "updated_at")?,
    })
}

fn row_to_reference(row: SqliteRow) -> Result<FactionReference> {
    Ok(FactionReference {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        faction_id: uuid(&row, "faction_id")?,
        entity_type: parse(&row, "entity_type")?,
        entity_id: uuid(&row, "entity_id")?,
        role: opt_text(&row, "role")?,
        notes: text(&row, "notes")?,
        created_at: timestamp(&row, "created_at")?,
    })
}

// =============================================================================
// Factions
// =============================================================================

/// Factions of a world, arranged in a tree
#[derive(Clone)]
pub struct FactionRepository {
    db: Database,
}

impl FactionRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a faction, deriving its level from the parent
    #[instrument(skip(self, faction), fields(faction_id = %faction.id, parent_id = ?faction.parent_id))]
    pub async fn create(&self, faction: &mut Faction) -> Result<()> {
        faction.validate()?;
        self.derive_level(faction).await?;

        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO factions (
                        id, tenant_id, world_id, parent_id, name, type, description,
                        beliefs, structure, symbols, hierarchy_level, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                    "#,
                )
                .bind(faction.id.to_string())
                .bind(faction.tenant_id.to_string())
                .bind(faction.world_id.to_string())
                .bind(opt_id(faction.parent_id))
                .bind(&faction.name)
                .bind(&faction.faction_type)
                .bind(&faction.description)
                .bind(&faction.beliefs)
                .bind(&faction.structure)
                .bind(&faction.symbols)
                .bind(faction.hierarchy_level)
                .bind(ts(&faction.created_at))
                .bind(ts(&faction.updated_at)),
            )
            .await
            .map_err(db_error("faction", faction.id))?;

        debug!(level = faction.hierarchy_level, "Faction created");
        Ok(())
    }

    /// Fetch a faction
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Faction> {
        let sql = format!("SELECT {COLUMNS} FROM factions WHERE tenant_id = ?1 AND id = ?2");
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("faction", id))?
            .ok_or_else(|| Error::not_found("faction", id))?;
        row_to_faction(row)
    }

    /// Factions of a world by level, then name
    #[instrument(skip(self))]
    pub async fn list_by_world(
        &self,
        tenant_id: Uuid,
        world_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Faction>> {
        let page = Page::new(limit, offset)?;
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM factions
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
            .map_err(db_error("faction", world_id))?;
        rows.into_iter().map(row_to_faction).collect()
    }

    /// Number of factions in a world
    pub async fn count_by_world(&self, tenant_id: Uuid, world_id: Uuid) -> Result<i64> {
        count(
            &self.db,
            sqlx::query("SELECT COUNT(*) FROM factions WHERE tenant_id = ?1 AND world_id = ?2")
                .bind(tenant_id.to_string())
                .bind(world_id.to_string()),
            "faction",
            world_id,
        )
        .await
    }

    /// Update the mutable columns (`hierarchy_level` is stored as given)
    #[instrument(skip(self, faction), fields(faction_id = %faction.id))]
    pub async fn update(&self, faction: &Faction) -> Result<()> {
        faction.validate()?;
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    UPDATE factions
                    SET parent_id = ?3, name = ?4, type = ?5, description = ?6, beliefs = ?7,
                        structure = ?8, symbols = ?9, hierarchy_level = ?10, updated_at = ?11
                    WHERE tenant_id = ?1 AND id = ?2
                    "#,
                )
                .bind(faction.tenant_id.to_string())
                .bind(faction.id.to_string())
                .bind(opt_id(faction.parent_id))
                .bind(&faction.name)
                .bind(&faction.faction_type)
                .bind(&faction.description)
                .bind(&faction.beliefs)
                .bind(&faction.structure)
                .bind(&faction.symbols)
                .bind(faction.hierarchy_level)
                .bind(ts(&faction.updated_at)),
            )
            .await
            .map_err(db_error("faction", faction.id))?;
        expect_rows(result, "faction", faction.id)
    }

    /// Delete a faction; its children become roots
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM factions WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("faction", id))?;
        Ok(())
    }
}

#[async_trait]
impl HierarchicalRepository for FactionRepository {
    type Node = Faction;

    const TABLE: &'static str = "factions";
    const COLUMNS: &'static str = COLUMNS;

    fn database(&self) -> &Database {
        &self.db
    }

    fn decode(row: SqliteRow) -> Result<Faction> {
        row_to_faction(row)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Faction> {
        FactionRepository::get_by_id(self, tenant_id, id).await
    }
}

// =============================================================================
// Faction references
// =============================================================================

/// Membership-like links from a faction to other entities
///
/// Missing rows are errors here: `update`, `delete` and
/// `delete_by_faction_and_entity` report `NotFound` when nothing matched.
#[derive(Clone)]
pub struct FactionReferenceRepository {
    db: Database,
}

impl FactionReferenceRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a reference; the tenant is taken from the faction
    #[instrument(skip(self, reference), fields(faction_id = %reference.faction_id, entity = %reference.entity_type))]
    pub async fn create(&self, reference: &mut FactionReference) -> Result<()> {
        reference.tenant_id =
            owner_tenant(&self.db, "factions", "faction", reference.faction_id).await?;

        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO faction_references (
                        id, tenant_id, faction_id, entity_type, entity_id, role, notes, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                )
                .bind(reference.id.to_string())
                .bind(reference.tenant_id.to_string())
                .bind(reference.faction_id.to_string())
                .bind(reference.entity_type.as_str())
                .bind(reference.entity_id.to_string())
                .bind(&reference.role)
                .bind(&reference.notes)
                .bind(ts(&reference.created_at)),
            )
            .await
            .map_err(unique_error(
                "faction_reference",
                "faction_id,entity_type,entity_id",
                format!(
                    "{}/{}/{}",
                    reference.faction_id, reference.entity_type, reference.entity_id
                ),
            ))?;

        debug!("Faction reference created");
        Ok(())
    }

    /// Fetch a reference
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<FactionReference> {
        let sql = format!(
            "SELECT {REFERENCE_COLUMNS} FROM faction_references WHERE tenant_id = ?1 AND id = ?2"
        );
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("faction_reference", id))?
            .ok_or_else(|| Error::not_found("faction_reference", id))?;
        row_to_reference(row)
    }

    /// References of a faction, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_faction(
        &self,
        tenant_id: Uuid,
        faction_id: Uuid,
    ) -> Result<Vec<FactionReference>> {
        let sql = format!(
            r#"
            SELECT {REFERENCE_COLUMNS} FROM faction_references
            WHERE tenant_id = ?1 AND faction_id = ?2
            ORDER BY created_at ASC, id ASC
            "#
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(faction_id.to_string()),
            )
            .await
            .map_err(db_error("faction_reference", faction_id))?;
        rows.into_iter().map(row_to_reference).collect()
    }

    /// References pointing at one entity, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_entity(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Vec<FactionReference>> {
        let sql = format!(
            r#"
            SELECT {REFERENCE_COLUMNS} FROM faction_references
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
            .map_err(db_error("faction_reference", entity_id))?;
        rows.into_iter().map(row_to_reference).collect()
    }

    /// Update role and notes
    #[instrument(skip(self, reference), fields(reference_id = %reference.id))]
    pub async fn update(&self, reference: &FactionReference) -> Result<()> {
        let result = self
            .db
            .execute(
                sqlx::query(
                    "UPDATE faction_references SET role = ?3, notes = ?4 WHERE tenant_id = ?1 AND id = ?2",
                )
                .bind(reference.tenant_id.to_string())
                .bind(reference.id.to_string())
                .bind(&reference.role)
                .bind(&reference.notes),
            )
            .await
            .map_err(db_error("faction_reference", reference.id))?;
        expect_rows(result, "faction_reference", reference.id)
    }

    /// Delete a reference (`NotFound` when absent)
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        let result = self
            .db
            .execute(
                sqlx::query("DELETE FROM faction_references WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("faction_reference", id))?;
        expect_rows(result, "faction_reference", id)
    }

    /// Delete every reference of a faction
    #[instrument(skip(self))]
    pub async fn delete_by_faction(&self, tenant_id: Uuid, faction_id: Uuid) -> Result<u64> {
        let result = self
            .db
            .execute(
                sqlx::query(
                    "DELETE FROM faction_references WHERE tenant_id = ?1 AND faction_id = ?2",
                )
                .bind(tenant_id.to_string())
                .bind(faction_id.to_string()),
            )
            .await
            .map_err(db_error("faction_reference", faction_id))?;
        Ok(result.rows_affected())
    }

    /// Delete the reference between a faction and one entity (`NotFound` when absent)
    #[instrument(skip(self))]
    pub async fn delete_by_faction_and_entity(
        &self,
        tenant_id: Uuid,
        faction_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<()> {
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    DELETE FROM faction_references
                    WHERE tenant_id = ?1 AND faction_id = ?2 AND entity_type = ?3 AND entity_id = ?4
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(faction_id.to_string())
                .bind(entity_type.as_str())
                .bind(entity_id.to_string()),
            )
            .await
            .map_err(db_error("faction_reference", faction_id))?;
        expect_rows(
            result,
            "faction_reference",
            format!("{faction_id}/{entity_type}/{entity_id}"),
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
    async fn test_faction_tree() {
        let (db, tenant_id, world_id) = setup().await;
        let repo = FactionRepository::new(db);
        let mut order = Faction::new(tenant_id, world_id, "Order");
        repo.create(&mut order).await.unwrap();
        let mut chapter = Faction::new(tenant_id, world_id, "Chapter").with_parent(order.id);
        repo.create(&mut chapter).await.unwrap();
        let mut cell = Faction::new(tenant_id, world_id, "Cell").with_parent(chapter.id);
        repo.create(&mut cell).await.unwrap();

        assert_eq!(cell.hierarchy_level, 2);
        let ancestors: Vec<_> = repo
            .get_ancestors(tenant_id, cell.id)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(ancestors, vec!["Order", "Chapter"]);
        assert_eq!(repo.get_descendants(tenant_id, order.id).await.unwrap().len(), 2);

        let listed: Vec<_> = repo
            .list_by_world(tenant_id, world_id, 10, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.hierarchy_level)
            .collect();
        assert_eq!(listed, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_references() {
        let (db, tenant_id, world_id) = setup().await;
        let factions = FactionRepository::new(db.clone());
        let refs = FactionReferenceRepository::new(db);
        let mut guild = Faction::new(tenant_id, world_id, "Guild");
        factions.create(&mut guild).await.unwrap();

        let member = Uuid::new_v4();
        let mut reference =
            FactionReference::new(guild.id, EntityType::Character, member).with_role("treasurer");
        refs.create(&mut reference).await.unwrap();
        assert_eq!(reference.tenant_id, tenant_id);
        assert_eq!(refs.get_by_id(tenant_id, reference.id).await.unwrap(), reference);

        let mut again = FactionReference::new(guild.id, EntityType::Character, member);
        assert!(refs.create(&mut again).await.unwrap_err().is_already_exists());

        reference.notes = "keeps the ledger".into();
        refs.update(&reference).await.unwrap();
        let listed = refs
            .list_by_entity(tenant_id, EntityType::Character, member)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].notes, "keeps the ledger");

        refs.delete_by_faction_and_entity(tenant_id, guild.id, EntityType::Character, member)
            .await
            .unwrap();
        assert!(refs
            .delete_by_faction_and_entity(tenant_id, guild.id, EntityType::Character, member)
            .await
            .unwrap_err()
            .is_not_found());
        assert!(refs.delete(tenant_id, reference.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_reference_to_missing_faction() {
        let (db, _, _) = setup().await;
        let mut reference =
            FactionReference::new(Uuid::new_v4(), EntityType::Location, Uuid::new_v4());
        let err = FactionReferenceRepository::new(db)
            .create(&mut reference)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { ref resource, .. } if resource == "faction"));
    }
}
