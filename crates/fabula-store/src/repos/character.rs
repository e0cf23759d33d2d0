//! Character, character-trait and character-relationship repositories

use super::{count, expect_rows, owner_tenant};
use crate::codec::{flag, int, opt_id, opt_text, opt_uuid, text, timestamp, ts, uuid};
use crate::db::Database;
use crate::error::{db_error, unique_error};
use fabula_core::pagination::Page;
use fabula_core::time::now;
use fabula_core::world::{Character, CharacterRelationship, CharacterTrait};
use fabula_core::{Error, Result};
use sqlx::sqlite::SqliteRow;
use tracing::{debug, instrument};
use uuid::Uuid;

const CHARACTER_COLUMNS: &str = "id, tenant_id, world_id, archetype_id, current_class_id, class_level, name, description, created_at, updated_at";
const CHARACTER_TRAIT_COLUMNS: &str = "id, tenant_id, character_id, trait_id, trait_name, trait_category, trait_description, value, notes, created_at, updated_at";
const RELATIONSHIP_COLUMNS: &str = "id, tenant_id, character1_id, character2_id, relationship_type, description, bidirectional, created_at, updated_at";

fn row_to_character(row: SqliteRow) -> Result<Character> {
    Ok(Character {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        world_id: uuid(&row, "world_id")?,
        archetype_id: opt_uuid(&row, "archetype_id")?,
        current_class_id: opt_uuid(&row, "current_class_id")?,
        class_level: int(&row, "class_level")?,
        name: text(&row, "name")?,
        description: text(&row, "description")?,
        created_at: timestamp(&row, "created_at")?,
        updated_at: timestamp(&row, "updated_at")?,
    })
}

fn row_to_character_trait(row: SqliteRow) -> Result<CharacterTrait> {
    Ok(CharacterTrait {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        character_id: uuid(&row, "character_id")?,
        trait_id: uuid(&row, "trait_id")?,
        trait_name: text(&row, "trait_name")?,
        trait_category: opt_text(&row, "trait_category")?,
        trait_description: text(&row, "trait_description")?,
        value: text(&row, "value")?,
        notes: text(&row, "notes")?,
        created_at: timestamp(&row, "created_at")?,
        updated_at: timestamp(&row, "updated_at")?,
    })
}

fn row_to_relationship(row: SqliteRow) -> Result<CharacterRelationship> {
    Ok(CharacterRelationship {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        character1_id: uuid(&row, "character1_id")?,
        character2_id: uuid(&row, "character2_id")?,
        relationship_type: text(&row, "relationship_type")?,
        description: text(&row, "description")?,
        bidirectional: flag(&row, "bidirectional")?,
        created_at: timestamp(&row, "created_at")?,
        updated_at: timestamp(&row, "updated_at")?,
    })
}

// =============================================================================
// Characters
// =============================================================================

/// Characters of a world
#[derive(Clone)]
pub struct CharacterRepository {
    db: Database,
}

impl CharacterRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a character
    #[instrument(skip(self, character), fields(character_id = %character.id, world_id = %character.world_id))]
    pub async fn create(&self, character: &Character) -> Result<()> {
        character.validate()?;
        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO characters (
                        id, tenant_id, world_id, archetype_id, current_class_id, class_level,
                        name, description, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    "#,
                )
                .bind(character.id.to_string())
                .bind(character.tenant_id.to_string())
                .bind(character.world_id.to_string())
                .bind(opt_id(character.archetype_id))
                .bind(opt_id(character.current_class_id))
                .bind(character.class_level)
                .bind(&character.name)
                .bind(&character.description)
                .bind(ts(&character.created_at))
                .bind(ts(&character.updated_at)),
            )
            .await
            .map_err(db_error("character", character.id))?;

        debug!("Character created");
        Ok(())
    }

    /// Fetch a character
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Character> {
        let sql =
            format!("SELECT {CHARACTER_COLUMNS} FROM characters WHERE tenant_id = ?1 AND id = ?2");
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("character", id))?
            .ok_or_else(|| Error::not_found("character", id))?;
        row_to_character(row)
    }

    /// Characters of a world, newest first
    #[instrument(skip(self))]
    pub async fn list_by_world(
        &self,
        tenant_id: Uuid,
        world_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Character>> {
        let page = Page::new(limit, offset)?;
        let sql = format!(
            r#"
            SELECT {CHARACTER_COLUMNS} FROM characters
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
            .map_err(db_error("character", world_id))?;
        rows.into_iter().map(row_to_character).collect()
    }

    /// Number of characters in a world
    pub async fn count_by_world(&self, tenant_id: Uuid, world_id: Uuid) -> Result<i64> {
        count(
            &self.db,
            sqlx::query("SELECT COUNT(*) FROM characters WHERE tenant_id = ?1 AND world_id = ?2")
                .bind(tenant_id.to_string())
                .bind(world_id.to_string()),
            "character",
            world_id,
        )
        .await
    }

    /// Update the mutable columns
    #[instrument(skip(self, character), fields(character_id = %character.id))]
    pub async fn update(&self, character: &Character) -> Result<()> {
        character.validate()?;
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    UPDATE characters
                    SET archetype_id = ?3, current_class_id = ?4, class_level = ?5,
                        name = ?6, description = ?7, updated_at = ?8
                    WHERE tenant_id = ?1 AND id = ?2
                    "#,
                )
                .bind(character.tenant_id.to_string())
                .bind(character.id.to_string())
                .bind(opt_id(character.archetype_id))
                .bind(opt_id(character.current_class_id))
                .bind(character.class_level)
                .bind(&character.name)
                .bind(&character.description)
                .bind(ts(&character.updated_at)),
            )
            .await
            .map_err(db_error("character", character.id))?;
        expect_rows(result, "character", character.id)
    }

    /// Delete a character (its trait bindings and relationships go with it)
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM characters WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("character", id))?;
        Ok(())
    }
}

// =============================================================================
// Character traits
// =============================================================================

/// Trait bindings of characters
///
/// A binding keeps a snapshot of the trait's name, category and description
/// taken when it was created; later edits of the trait only reach the binding
/// through [`CharacterTraitRepository::update_trait_snapshot`].
#[derive(Clone)]
pub struct CharacterTraitRepository {
    db: Database,
}

impl CharacterTraitRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a binding; the tenant is taken from the character
    #[instrument(skip(self, binding), fields(character_id = %binding.character_id, trait_id = %binding.trait_id))]
    pub async fn create(&self, binding: &mut CharacterTrait) -> Result<()> {
        binding.tenant_id =
            owner_tenant(&self.db, "characters", "character", binding.character_id).await?;

        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO character_traits (
                        id, tenant_id, character_id, trait_id, trait_name, trait_category,
                        trait_description, value, notes, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                    "#,
                )
                .bind(binding.id.to_string())
                .bind(binding.tenant_id.to_string())
                .bind(binding.character_id.to_string())
                .bind(binding.trait_id.to_string())
                .bind(&binding.trait_name)
                .bind(&binding.trait_category)
                .bind(&binding.trait_description)
                .bind(&binding.value)
                .bind(&binding.notes)
                .bind(ts(&binding.created_at))
                .bind(ts(&binding.updated_at)),
            )
            .await
            .map_err(unique_error(
                "character_trait",
                "character_id,trait_id",
                format!("{}/{}", binding.character_id, binding.trait_id),
            ))?;

        debug!("Character trait bound");
        Ok(())
    }

    /// Fetch a binding
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<CharacterTrait> {
        let sql = format!(
            "SELECT {CHARACTER_TRAIT_COLUMNS} FROM character_traits WHERE tenant_id = ?1 AND id = ?2"
        );
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("character_trait", id))?
            .ok_or_else(|| Error::not_found("character_trait", id))?;
        row_to_character_trait(row)
    }

    /// The binding of one trait to one character
    #[instrument(skip(self))]
    pub async fn get_by_character_and_trait(
        &self,
        tenant_id: Uuid,
        character_id: Uuid,
        trait_id: Uuid,
    ) -> Result<CharacterTrait> {
        let sql = format!(
            r#"
            SELECT {CHARACTER_TRAIT_COLUMNS} FROM character_traits
            WHERE tenant_id = ?1 AND character_id = ?2 AND trait_id = ?3
            "#
        );
        let key = format!("{character_id}/{trait_id}");
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(character_id.to_string())
                    .bind(trait_id.to_string()),
            )
            .await
            .map_err(db_error("character_trait", &key))?
            .ok_or_else(|| Error::not_found("character_trait", &key))?;
        row_to_character_trait(row)
    }

    /// Every binding of a character, by trait name
    #[instrument(skip(self))]
    pub async fn list_by_character(
        &self,
        tenant_id: Uuid,
        character_id: Uuid,
    ) -> Result<Vec<CharacterTrait>> {
        let sql = format!(
            r#"
            SELECT {CHARACTER_TRAIT_COLUMNS} FROM character_traits
            WHERE tenant_id = ?1 AND character_id = ?2
            ORDER BY trait_name ASC, id ASC
            "#
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(character_id.to_string()),
            )
            .await
            .map_err(db_error("character_trait", character_id))?;
        rows.into_iter().map(row_to_character_trait).collect()
    }

    /// Update the per-character value and notes
    #[instrument(skip(self, binding), fields(character_trait_id = %binding.id))]
    pub async fn update(&self, binding: &CharacterTrait) -> Result<()> {
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    UPDATE character_traits SET value = ?3, notes = ?4, updated_at = ?5
                    WHERE tenant_id = ?1 AND id = ?2
                    "#,
                )
                .bind(binding.tenant_id.to_string())
                .bind(binding.id.to_string())
                .bind(&binding.value)
                .bind(&binding.notes)
                .bind(ts(&binding.updated_at)),
            )
            .await
            .map_err(db_error("character_trait", binding.id))?;
        expect_rows(result, "character_trait", binding.id)
    }

    /// Copy the trait's current name, category and description into every
    /// binding of it; returns how many bindings were refreshed
    #[instrument(skip(self))]
    pub async fn update_trait_snapshot(&self, tenant_id: Uuid, trait_id: Uuid) -> Result<u64> {
        let row = self
            .db
            .fetch_optional(
                sqlx::query(
                    "SELECT name, category, description FROM traits WHERE tenant_id = ?1 AND id = ?2",
                )
                .bind(tenant_id.to_string())
                .bind(trait_id.to_string()),
            )
            .await
            .map_err(db_error("trait", trait_id))?
            .ok_or_else(|| Error::not_found("trait", trait_id))?;
        let name = text(&row, "name")?;
        let category = opt_text(&row, "category")?;
        let description = text(&row, "description")?;

        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    UPDATE character_traits
                    SET trait_name = ?3, trait_category = ?4, trait_description = ?5, updated_at = ?6
                    WHERE tenant_id = ?1 AND trait_id = ?2
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(trait_id.to_string())
                .bind(&name)
                .bind(&category)
                .bind(&description)
                .bind(ts(&now())),
            )
            .await
            .map_err(db_error("character_trait", trait_id))?;

        debug!(refreshed = result.rows_affected(), "Trait snapshot refreshed");
        Ok(result.rows_affected())
    }

    /// Remove a binding
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM character_traits WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("character_trait", id))?;
        Ok(())
    }

    /// Remove every binding of a character
    #[instrument(skip(self))]
    pub async fn delete_by_character(&self, tenant_id: Uuid, character_id: Uuid) -> Result<u64> {
        let result = self
            .db
            .execute(
                sqlx::query(
                    "DELETE FROM character_traits WHERE tenant_id = ?1 AND character_id = ?2",
                )
                .bind(tenant_id.to_string())
                .bind(character_id.to_string()),
            )
            .await
            .map_err(db_error("character_trait", character_id))?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Character relationships
// =============================================================================

/// Pairwise character relationships
///
/// A relationship is stored once; `bidirectional` marks it as holding both
/// ways without a second row.
#[derive(Clone)]
pub struct CharacterRelationshipRepository {
    db: Database,
}

impl CharacterRelationshipRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a relationship
    #[instrument(skip(self, rel), fields(relationship_id = %rel.id))]
    pub async fn create(&self, rel: &CharacterRelationship) -> Result<()> {
        rel.validate()?;
        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO character_relationships (
                        id, tenant_id, character1_id, character2_id, relationship_type,
                        description, bidirectional, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    "#,
                )
                .bind(rel.id.to_string())
                .bind(rel.tenant_id.to_string())
                .bind(rel.character1_id.to_string())
                .bind(rel.character2_id.to_string())
                .bind(&rel.relationship_type)
                .bind(&rel.description)
                .bind(rel.bidirectional)
                .bind(ts(&rel.created_at))
                .bind(ts(&rel.updated_at)),
            )
            .await
            .map_err(unique_error(
                "character_relationship",
                "relationship",
                format!(
                    "{}-{}-{}",
                    rel.character1_id, rel.relationship_type, rel.character2_id
                ),
            ))?;
        Ok(())
    }

    /// Fetch a relationship
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<CharacterRelationship> {
        let sql = format!(
            "SELECT {RELATIONSHIP_COLUMNS} FROM character_relationships WHERE tenant_id = ?1 AND id = ?2"
        );
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("character_relationship", id))?
            .ok_or_else(|| Error::not_found("character_relationship", id))?;
        row_to_relationship(row)
    }

    /// Relationships where the character is on either side, oldest first
    #[instrument(skip(self))]
    pub async fn list_by_character(
        &self,
        tenant_id: Uuid,
        character_id: Uuid,
    ) -> Result<Vec<CharacterRelationship>> {
        let sql = format!(
            r#"
            SELECT {RELATIONSHIP_COLUMNS} FROM character_relationships
            WHERE tenant_id = ?1 AND (character1_id = ?2 OR character2_id = ?2)
            ORDER BY created_at ASC, id ASC
            "#
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(character_id.to_string()),
            )
            .await
            .map_err(db_error("character_relationship", character_id))?;
        rows.into_iter().map(row_to_relationship).collect()
    }

    /// Update type, description and direction
    #[instrument(skip(self, rel), fields(relationship_id = %rel.id))]
    pub async fn update(&self, rel: &CharacterRelationship) -> Result<()> {
        rel.validate()?;
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    UPDATE character_relationships
                    SET relationship_type = ?3, description = ?4, bidirectional = ?5, updated_at = ?6
                    WHERE tenant_id = ?1 AND id = ?2
                    "#,
                )
                .bind(rel.tenant_id.to_string())
                .bind(rel.id.to_string())
                .bind(&rel.relationship_type)
                .bind(&rel.description)
                .bind(rel.bidirectional)
                .bind(ts(&rel.updated_at)),
            )
            .await
            .map_err(db_error("character_relationship", rel.id))?;
        expect_rows(result, "character_relationship", rel.id)
    }

    /// Delete a relationship
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM character_relationships WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("character_relationship", id))?;
        Ok(())
    }

    /// Delete every relationship the character takes part in
    #[instrument(skip(self))]
    pub async fn delete_by_character(&self, tenant_id: Uuid, character_id: Uuid) -> Result<u64> {
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    DELETE FROM character_relationships
                    WHERE tenant_id = ?1 AND (character1_id = ?2 OR character2_id = ?2)
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(character_id.to_string()),
            )
            .await
            .map_err(db_error("character_relationship", character_id))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::{TenantRepository, TraitRepository, WorldRepository};
    use fabula_core::world::{Trait, World};
    use fabula_core::Tenant;

    struct Fixture {
        db: Database,
        tenant_id: Uuid,
        world_id: Uuid,
    }

    async fn fixture() -> Fixture {
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
        Fixture {
            db,
            tenant_id: tenant.id,
            world_id: world.id,
        }
    }

    #[tokio::test]
    async fn test_character_round_trip() {
        let fx = fixture().await;
        let repo = CharacterRepository::new(fx.db.clone());
        let mut aria = Character::new(fx.tenant_id, fx.world_id, "Aria");
        aria.current_class_id = Some(Uuid::new_v4());
        aria.class_level = 3;
        repo.create(&aria).await.unwrap();

        assert_eq!(repo.get_by_id(fx.tenant_id, aria.id).await.unwrap(), aria);
        assert_eq!(repo.count_by_world(fx.tenant_id, fx.world_id).await.unwrap(), 1);
        assert!(repo
            .get_by_id(Uuid::new_v4(), aria.id)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_invalid_class_level_rejected() {
        let fx = fixture().await;
        let repo = CharacterRepository::new(fx.db.clone());
        let mut aria = Character::new(fx.tenant_id, fx.world_id, "Aria");
        aria.class_level = 0;
        assert!(repo.create(&aria).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_trait_binding_takes_character_tenant() {
        let fx = fixture().await;
        let characters = CharacterRepository::new(fx.db.clone());
        let traits = TraitRepository::new(fx.db.clone());
        let bindings = CharacterTraitRepository::new(fx.db.clone());

        let aria = Character::new(fx.tenant_id, fx.world_id, "Aria");
        characters.create(&aria).await.unwrap();
        let brave = Trait::new(fx.tenant_id, "Brave");
        traits.create(&brave).await.unwrap();

        let mut binding = CharacterTrait::bind(aria.id, &brave, "5");
        binding.tenant_id = Uuid::nil();
        bindings.create(&mut binding).await.unwrap();
        assert_eq!(binding.tenant_id, fx.tenant_id);

        let fetched = bindings
            .get_by_character_and_trait(fx.tenant_id, aria.id, brave.id)
            .await
            .unwrap();
        assert_eq!(fetched, binding);

        let mut duplicate = CharacterTrait::bind(aria.id, &brave, "7");
        assert!(bindings
            .create(&mut duplicate)
            .await
            .unwrap_err()
            .is_already_exists());
    }

    #[tokio::test]
    async fn test_trait_binding_for_missing_character() {
        let fx = fixture().await;
        let brave = Trait::new(fx.tenant_id, "Brave");
        let mut binding = CharacterTrait::bind(Uuid::new_v4(), &brave, "5");
        let err = CharacterTraitRepository::new(fx.db.clone())
            .create(&mut binding)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { ref resource, .. } if resource == "character"));
    }

    #[tokio::test]
    async fn test_update_value_and_delete_by_character() {
        let fx = fixture().await;
        let characters = CharacterRepository::new(fx.db.clone());
        let traits = TraitRepository::new(fx.db.clone());
        let bindings = CharacterTraitRepository::new(fx.db.clone());

        let aria = Character::new(fx.tenant_id, fx.world_id, "Aria");
        characters.create(&aria).await.unwrap();
        let brave = Trait::new(fx.tenant_id, "Brave");
        let wise = Trait::new(fx.tenant_id, "Wise");
        traits.create(&brave).await.unwrap();
        traits.create(&wise).await.unwrap();

        let mut first = CharacterTrait::bind(aria.id, &brave, "5");
        let mut second = CharacterTrait::bind(aria.id, &wise, "2");
        bindings.create(&mut first).await.unwrap();
        bindings.create(&mut second).await.unwrap();

        first.value = "9".into();
        first.notes = "after the siege".into();
        bindings.update(&first).await.unwrap();
        let fetched = bindings.get_by_id(fx.tenant_id, first.id).await.unwrap();
        assert_eq!(fetched.value, "9");
        assert_eq!(fetched.notes, "after the siege");

        let names: Vec<_> = bindings
            .list_by_character(fx.tenant_id, aria.id)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.trait_name)
            .collect();
        assert_eq!(names, vec!["Brave", "Wise"]);

        assert_eq!(
            bindings.delete_by_character(fx.tenant_id, aria.id).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_trait_snapshot_refresh() {
        let fx = fixture().await;
        let characters = CharacterRepository::new(fx.db.clone());
        let traits = TraitRepository::new(fx.db.clone());
        let bindings = CharacterTraitRepository::new(fx.db.clone());

        let aria = Character::new(fx.tenant_id, fx.world_id, "Aria");
        characters.create(&aria).await.unwrap();
        let mut brave = Trait::new(fx.tenant_id, "Brave").with_category("Physical");
        traits.create(&brave).await.unwrap();
        let mut binding = CharacterTrait::bind(aria.id, &brave, "5");
        bindings.create(&mut binding).await.unwrap();

        brave.name = "Courageous".into();
        brave.description = "Stands firm".into();
        traits.update(&brave).await.unwrap();

        // Bindings keep the old snapshot until refreshed.
        let stale = bindings.get_by_id(fx.tenant_id, binding.id).await.unwrap();
        assert_eq!(stale.trait_name, "Brave");

        assert_eq!(
            bindings
                .update_trait_snapshot(fx.tenant_id, brave.id)
                .await
                .unwrap(),
            1
        );
        let fresh = bindings.get_by_id(fx.tenant_id, binding.id).await.unwrap();
        assert_eq!(fresh.trait_name, "Courageous");
        assert_eq!(fresh.trait_category.as_deref(), Some("Physical"));
        assert_eq!(fresh.trait_description, "Stands firm");
        assert_eq!(fresh.value, "5");

        let err = bindings
            .update_trait_snapshot(fx.tenant_id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { ref resource, .. } if resource == "trait"));
    }

    #[tokio::test]
    async fn test_relationships_either_side() {
        let fx = fixture().await;
        let characters = CharacterRepository::new(fx.db.clone());
        let repo = CharacterRelationshipRepository::new(fx.db.clone());

        let aria = Character::new(fx.tenant_id, fx.world_id, "Aria");
        let bran = Character::new(fx.tenant_id, fx.world_id, "Bran");
        let cass = Character::new(fx.tenant_id, fx.world_id, "Cass");
        for c in [&aria, &bran, &cass] {
            characters.create(c).await.unwrap();
        }

        let mut siblings = CharacterRelationship::new(fx.tenant_id, aria.id, bran.id, "sibling");
        siblings.bidirectional = true;
        repo.create(&siblings).await.unwrap();
        repo.create(&CharacterRelationship::new(fx.tenant_id, cass.id, aria.id, "rival"))
            .await
            .unwrap();

        assert!(repo
            .create(&CharacterRelationship::new(fx.tenant_id, aria.id, bran.id, "sibling"))
            .await
            .unwrap_err()
            .is_already_exists());

        assert_eq!(repo.list_by_character(fx.tenant_id, aria.id).await.unwrap().len(), 2);
        assert_eq!(repo.list_by_character(fx.tenant_id, bran.id).await.unwrap().len(), 1);

        siblings.description = "twins".into();
        repo.update(&siblings).await.unwrap();
        let fetched = repo.get_by_id(fx.tenant_id, siblings.id).await.unwrap();
        assert_eq!(fetched.description, "twins");
        assert!(fetched.bidirectional);

        assert_eq!(repo.delete_by_character(fx.tenant_id, aria.id).await.unwrap(), 2);
    }
}
