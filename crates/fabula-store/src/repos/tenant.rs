//! Tenant repository

use super::{count, expect_rows};
use crate::codec::{opt_id, opt_uuid, parse, text, timestamp, ts, uuid};
use crate::db::Database;
use crate::error::{db_error, unique_error};
use fabula_core::pagination::Page;
use fabula_core::{Error, Result, Tenant};
use sqlx::sqlite::SqliteRow;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const COLUMNS: &str = "id, name, status, created_by_user_id, created_at, updated_at";

fn row_to_tenant(row: SqliteRow) -> Result<Tenant> {
    Ok(Tenant {
        id: uuid(&row, "id")?,
        name: text(&row, "name")?,
        status: parse(&row, "status")?,
        created_by_user_id: opt_uuid(&row, "created_by_user_id")?,
        created_at: timestamp(&row, "created_at")?,
        updated_at: timestamp(&row, "updated_at")?,
    })
}

/// Tenants are created explicitly and never implied by other writes
#[derive(Clone)]
pub struct TenantRepository {
    db: Database,
}

impl TenantRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a tenant (`AlreadyExists(tenant, name, ..)` on a taken name)
    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.id))]
    pub async fn create(&self, tenant: &Tenant) -> Result<()> {
        tenant.validate()?;
        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO tenants (id, name, status, created_by_user_id, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .bind(tenant.id.to_string())
                .bind(&tenant.name)
                .bind(tenant.status.as_str())
                .bind(opt_id(tenant.created_by_user_id))
                .bind(ts(&tenant.created_at))
                .bind(ts(&tenant.updated_at)),
            )
            .await
            .map_err(unique_error("tenant", "name", &tenant.name))?;

        info!(name = %tenant.name, "Tenant created");
        Ok(())
    }

    /// Fetch a tenant by id
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: Uuid) -> Result<Tenant> {
        let sql = format!("SELECT {COLUMNS} FROM tenants WHERE id = ?1");
        let row = self
            .db
            .fetch_optional(sqlx::query(&sql).bind(id.to_string()))
            .await
            .map_err(db_error("tenant", id))?
            .ok_or_else(|| Error::not_found("tenant", id))?;
        row_to_tenant(row)
    }

    /// Fetch a tenant by its unique name
    #[instrument(skip(self))]
    pub async fn get_by_name(&self, name: &str) -> Result<Tenant> {
        let sql = format!("SELECT {COLUMNS} FROM tenants WHERE name = ?1");
        let row = self
            .db
            .fetch_optional(sqlx::query(&sql).bind(name))
            .await
            .map_err(db_error("tenant", name))?
            .ok_or_else(|| Error::not_found("tenant", name))?;
        row_to_tenant(row)
    }

    /// Newest first
    #[instrument(skip(self))]
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Tenant>> {
        let page = Page::new(limit, offset)?;
        let sql = format!(
            "SELECT {COLUMNS} FROM tenants ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
        );
        let rows = self
            .db
            .fetch_all(sqlx::query(&sql).bind(page.limit).bind(page.offset))
            .await
            .map_err(db_error("tenant", "*"))?;
        rows.into_iter().map(row_to_tenant).collect()
    }

    /// Number of tenants
    pub async fn count(&self) -> Result<i64> {
        count(&self.db, sqlx::query("SELECT COUNT(*) FROM tenants"), "tenant", "*").await
    }

    /// Update name and status
    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.id))]
    pub async fn update(&self, tenant: &Tenant) -> Result<()> {
        tenant.validate()?;
        let result = self
            .db
            .execute(
                sqlx::query("UPDATE tenants SET name = ?2, status = ?3, updated_at = ?4 WHERE id = ?1")
                    .bind(tenant.id.to_string())
                    .bind(&tenant.name)
                    .bind(tenant.status.as_str())
                    .bind(ts(&tenant.updated_at)),
            )
            .await
            .map_err(unique_error("tenant", "name", &tenant.name))?;
        expect_rows(result, "tenant", tenant.id)?;

        debug!("Tenant updated");
        Ok(())
    }

    /// Delete a tenant and, by cascade, everything it owns
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let result = self
            .db
            .execute(sqlx::query("DELETE FROM tenants WHERE id = ?1").bind(id.to_string()))
            .await
            .map_err(db_error("tenant", id))?;

        debug!(removed = result.rows_affected(), "Tenant deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabula_core::TenantStatus;

    async fn repo() -> TenantRepository {
        TenantRepository::new(Database::in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = repo().await;
        let tenant = Tenant::new("acme");
        repo.create(&tenant).await.unwrap();

        assert_eq!(repo.get_by_id(tenant.id).await.unwrap(), tenant);
        assert_eq!(repo.get_by_name("acme").await.unwrap().id, tenant.id);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_name() {
        let repo = repo().await;
        repo.create(&Tenant::new("acme")).await.unwrap();

        let err = repo.create(&Tenant::new("acme")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::AlreadyExists { ref field, ref value, .. } if field == "name" && value == "acme"
        ));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let repo = repo().await;
        let err = repo.update(&Tenant::new("ghost")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = repo().await;
        let mut tenant = Tenant::new("acme");
        repo.create(&tenant).await.unwrap();

        tenant.status = TenantStatus::Suspended;
        repo.update(&tenant).await.unwrap();
        assert_eq!(
            repo.get_by_id(tenant.id).await.unwrap().status,
            TenantStatus::Suspended
        );

        repo.delete(tenant.id).await.unwrap();
        repo.delete(tenant.id).await.unwrap();
        assert!(repo.get_by_id(tenant.id).await.unwrap_err().is_not_found());
        assert!(repo.list(10, 0).await.unwrap().is_empty());
    }
}
