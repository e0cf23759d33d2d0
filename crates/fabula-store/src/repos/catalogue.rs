//! Archetype, trait and archetype-trait repositories

use super::{count, expect_rows};
use crate::codec::{opt_text, text, timestamp, ts, uuid};
use crate::db::Database;
use crate::error::{db_error, unique_error};
use fabula_core::pagination::Page;
use fabula_core::world::{Archetype, ArchetypeTrait, Trait};
use fabula_core::{Error, Result};
use sqlx::sqlite::SqliteRow;
use tracing::{debug, instrument};
use uuid::Uuid;

const ARCHETYPE_COLUMNS: &str = "id, tenant_id, name, description, created_at, updated_at";
const TRAIT_COLUMNS: &str = "id, tenant_id, name, category, description, created_at, updated_at";
const ARCHETYPE_TRAIT_COLUMNS: &str =
    "id, tenant_id, archetype_id, trait_id, default_value, created_at";

fn row_to_archetype(row: SqliteRow) -> Result<Archetype> {
    Ok(Archetype {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        name: text(&row, "name")?,
        description: text(&row, "description")?,
        created_at: timestamp(&row, "created_at")?,
        updated_at: timestamp(&row, "updated_at")?,
    })
}

fn row_to_trait(row: SqliteRow) -> Result<Trait> {
    Ok(Trait {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        name: text(&row, "name")?,
        category: opt_text(&row, "category")?,
        description: text(&row, "description")?,
        created_at: timestamp(&row, "created_at")?,
        updated_at: timestamp(&row, "updated_at")?,
    })
}

fn row_to_archetype_trait(row: SqliteRow) -> Result<ArchetypeTrait> {
    Ok(ArchetypeTrait {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        archetype_id: uuid(&row, "archetype_id")?,
        trait_id: uuid(&row, "trait_id")?,
        default_value: text(&row, "default_value")?,
        created_at: timestamp(&row, "created_at")?,
    })
}

// =============================================================================
// Archetypes
// =============================================================================

/// Character archetypes of a tenant
#[derive(Clone)]
pub struct ArchetypeRepository {
    db: Database,
}

impl ArchetypeRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert an archetype
    #[instrument(skip(self, archetype), fields(archetype_id = %archetype.id))]
    pub async fn create(&self, archetype: &Archetype) -> Result<()> {
        archetype.validate()?;
        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO archetypes (id, tenant_id, name, description, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .bind(archetype.id.to_string())
                .bind(archetype.tenant_id.to_string())
                .bind(&archetype.name)
                .bind(&archetype.description)
                .bind(ts(&archetype.created_at))
                .bind(ts(&archetype.updated_at)),
            )
            .await
            .map_err(db_error("archetype", archetype.id))?;
        debug!("Archetype created");
        Ok(())
    }

    /// Fetch an archetype
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Archetype> {
        let sql =
            format!("SELECT {ARCHETYPE_COLUMNS} FROM archetypes WHERE tenant_id = ?1 AND id = ?2");
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("archetype", id))?
            .ok_or_else(|| Error::not_found("archetype", id))?;
        row_to_archetype(row)
    }

    /// Archetypes of a tenant, newest first
    #[instrument(skip(self))]
    pub async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Archetype>> {
        let page = Page::new(limit, offset)?;
        let sql = format!(
            "SELECT {ARCHETYPE_COLUMNS} FROM archetypes WHERE tenant_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
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
            .map_err(db_error("archetype", tenant_id))?;
        rows.into_iter().map(row_to_archetype).collect()
    }

    /// Number of archetypes of a tenant
    pub async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<i64> {
        count(
            &self.db,
            sqlx::query("SELECT COUNT(*) FROM archetypes WHERE tenant_id = ?1")
                .bind(tenant_id.to_string()),
            "archetype",
            tenant_id,
        )
        .await
    }

    /// Update name and description
    #[instrument(skip(self, archetype), fields(archetype_id = %archetype.id))]
    pub async fn update(&self, archetype: &Archetype) -> Result<()> {
        archetype.validate()?;
        let result = self
            .db
            .execute(
                sqlx::query(
                    "UPDATE archetypes SET name = ?3, description = ?4, updated_at = ?5 WHERE tenant_id = ?1 AND id = ?2",
                )
                .bind(archetype.tenant_id.to_string())
                .bind(archetype.id.to_string())
                .bind(&archetype.name)
                .bind(&archetype.description)
                .bind(ts(&archetype.updated_at)),
            )
            .await
            .map_err(db_error("archetype", archetype.id))?;
        expect_rows(result, "archetype", archetype.id)
    }

    /// Delete an archetype
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM archetypes WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("archetype", id))?;
        Ok(())
    }
}

// =============================================================================
// Traits
// =============================================================================

/// Trait catalogue of a tenant
#[derive(Clone)]
pub struct TraitRepository {
    db: Database,
}

impl TraitRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a trait
    #[instrument(skip(self, trait_), fields(trait_id = %trait_.id))]
    pub async fn create(&self, trait_: &Trait) -> Result<()> {
        trait_.validate()?;
        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO traits (id, tenant_id, name, category, description, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                )
                .bind(trait_.id.to_string())
                .bind(trait_.tenant_id.to_string())
                .bind(&trait_.name)
                .bind(&trait_.category)
                .bind(&trait_.description)
                .bind(ts(&trait_.created_at))
                .bind(ts(&trait_.updated_at)),
            )
            .await
            .map_err(db_error("trait", trait_.id))?;
        debug!("Trait created");
        Ok(())
    }

    /// Fetch a trait
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Trait> {
        let sql = format!("SELECT {TRAIT_COLUMNS} FROM traits WHERE tenant_id = ?1 AND id = ?2");
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("trait", id))?
            .ok_or_else(|| Error::not_found("trait", id))?;
        row_to_trait(row)
    }

    /// Traits of a tenant, newest first
    #[instrument(skip(self))]
    pub async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Trait>> {
        let page = Page::new(limit, offset)?;
        let sql = format!(
            "SELECT {TRAIT_COLUMNS} FROM traits WHERE tenant_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
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
            .map_err(db_error("trait", tenant_id))?;
        rows.into_iter().map(row_to_trait).collect()
    }

    /// Number of traits of a tenant
    pub async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<i64> {
        count(
            &self.db,
            sqlx::query("SELECT COUNT(*) FROM traits WHERE tenant_id = ?1")
                .bind(tenant_id.to_string()),
            "trait",
            tenant_id,
        )
        .await
    }

    /// Update name, category and description
    ///
    /// Character bindings keep their snapshot until
    /// [`super::CharacterTraitRepository::update_trait_snapshot`] is called.
    #[instrument(skip(self, trait_), fields(trait_id = %trait_.id))]
    pub async fn update(&self, trait_: &Trait) -> Result<()> {
        trait_.validate()?;
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    UPDATE traits SET name = ?3, category = ?4, description = ?5, updated_at = ?6
                    WHERE tenant_id = ?1 AND id = ?2
                    "#,
                )
                .bind(trait_.tenant_id.to_string())
                .bind(trait_.id.to_string())
                .bind(&trait_.name)
                .bind(&trait_.category)
                .bind(&trait_.description)
                .bind(ts(&trait_.updated_at)),
            )
            .await
            .map_err(db_error("trait", trait_.id))?;
        expect_rows(result, "trait", trait_.id)
    }

    /// Delete a trait (its bindings go with it)
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM traits WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("trait", id))?;
        Ok(())
    }
}

// =============================================================================
// Archetype traits
// =============================================================================

/// Default traits of an archetype
#[derive(Clone)]
pub struct ArchetypeTraitRepository {
    db: Database,
}

impl ArchetypeTraitRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Bind a trait to an archetype
    #[instrument(skip(self, binding), fields(archetype_id = %binding.archetype_id, trait_id = %binding.trait_id))]
    pub async fn create(&self, binding: &ArchetypeTrait) -> Result<()> {
        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO archetype_traits (id, tenant_id, archetype_id, trait_id, default_value, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .bind(binding.id.to_string())
                .bind(binding.tenant_id.to_string())
                .bind(binding.archetype_id.to_string())
                .bind(binding.trait_id.to_string())
                .bind(&binding.default_value)
                .bind(ts(&binding.created_at)),
            )
            .await
            .map_err(unique_error(
                "archetype_trait",
                "archetype_id,trait_id",
                format!("{}/{}", binding.archetype_id, binding.trait_id),
            ))?;
        Ok(())
    }

    async fn list_where(&self, column: &str, tenant_id: Uuid, id: Uuid) -> Result<Vec<ArchetypeTrait>> {
        let sql = format!(
            "SELECT {ARCHETYPE_TRAIT_COLUMNS} FROM archetype_traits WHERE tenant_id = ?1 AND {column} = ?2 ORDER BY created_at ASC, id ASC"
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("archetype_trait", id))?;
        rows.into_iter().map(row_to_archetype_trait).collect()
    }

    /// Traits bound to an archetype
    #[instrument(skip(self))]
    pub async fn list_by_archetype(
        &self,
        tenant_id: Uuid,
        archetype_id: Uuid,
    ) -> Result<Vec<ArchetypeTrait>> {
        self.list_where("archetype_id", tenant_id, archetype_id).await
    }

    /// Archetypes a trait is bound to
    #[instrument(skip(self))]
    pub async fn list_by_trait(&self, tenant_id: Uuid, trait_id: Uuid) -> Result<Vec<ArchetypeTrait>> {
        self.list_where("trait_id", tenant_id, trait_id).await
    }

    /// Unbind one trait from an archetype
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, archetype_id: Uuid, trait_id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query(
                    "DELETE FROM archetype_traits WHERE tenant_id = ?1 AND archetype_id = ?2 AND trait_id = ?3",
                )
                .bind(tenant_id.to_string())
                .bind(archetype_id.to_string())
                .bind(trait_id.to_string()),
            )
            .await
            .map_err(db_error("archetype_trait", archetype_id))?;
        Ok(())
    }

    /// Unbind every trait of an archetype
    #[instrument(skip(self))]
    pub async fn delete_by_archetype(&self, tenant_id: Uuid, archetype_id: Uuid) -> Result<u64> {
        let result = self
            .db
            .execute(
                sqlx::query("DELETE FROM archetype_traits WHERE tenant_id = ?1 AND archetype_id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(archetype_id.to_string()),
            )
            .await
            .map_err(db_error("archetype_trait", archetype_id))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::TenantRepository;
    use fabula_core::Tenant;

    async fn setup() -> (Database, Uuid) {
        let db = Database::in_memory().await.unwrap();
        let tenant = Tenant::new("acme");
        TenantRepository::new(db.clone())
            .create(&tenant)
            .await
            .unwrap();
        (db, tenant.id)
    }

    #[tokio::test]
    async fn test_trait_round_trip_and_update() {
        let (db, tenant_id) = setup().await;
        let repo = TraitRepository::new(db);
        let mut brave = Trait::new(tenant_id, "Brave").with_category("Physical");
        repo.create(&brave).await.unwrap();
        assert_eq!(repo.get_by_id(tenant_id, brave.id).await.unwrap(), brave);

        brave.name = "Courageous".into();
        repo.update(&brave).await.unwrap();
        assert_eq!(
            repo.get_by_id(tenant_id, brave.id).await.unwrap().name,
            "Courageous"
        );

        let mut stranger = brave.clone();
        stranger.tenant_id = Uuid::new_v4();
        assert!(repo.update(&stranger).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_archetype_traits() {
        let (db, tenant_id) = setup().await;
        let archetypes = ArchetypeRepository::new(db.clone());
        let traits = TraitRepository::new(db.clone());
        let bindings = ArchetypeTraitRepository::new(db);

        let hero = Archetype::new(tenant_id, "Hero");
        archetypes.create(&hero).await.unwrap();
        let brave = Trait::new(tenant_id, "Brave");
        let loyal = Trait::new(tenant_id, "Loyal");
        traits.create(&brave).await.unwrap();
        traits.create(&loyal).await.unwrap();

        bindings
            .create(&ArchetypeTrait::new(tenant_id, hero.id, brave.id, "8"))
            .await
            .unwrap();
        bindings
            .create(&ArchetypeTrait::new(tenant_id, hero.id, loyal.id, "6"))
            .await
            .unwrap();
        let err = bindings
            .create(&ArchetypeTrait::new(tenant_id, hero.id, brave.id, "1"))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());

        assert_eq!(bindings.list_by_archetype(tenant_id, hero.id).await.unwrap().len(), 2);
        assert_eq!(bindings.list_by_trait(tenant_id, brave.id).await.unwrap().len(), 1);

        bindings.delete(tenant_id, hero.id, brave.id).await.unwrap();
        assert_eq!(bindings.delete_by_archetype(tenant_id, hero.id).await.unwrap(), 1);
        assert!(bindings.list_by_archetype(tenant_id, hero.id).await.unwrap().is_empty());
        assert_eq!(archetypes.count_by_tenant(tenant_id).await.unwrap(), 1);
    }
}
