//! Story repository and version lineage queries

use super::{count, expect_rows};
use crate::codec::{int, opt_id, opt_uuid, parse, text, timestamp, ts, uuid};
use crate::db::Database;
use crate::error::db_error;
use fabula_core::pagination::Page;
use fabula_core::story::Story;
use fabula_core::{Error, Result};
use sqlx::sqlite::SqliteRow;
use tracing::{debug, instrument};
use uuid::Uuid;

pub(crate) const COLUMNS: &str = "id, tenant_id, world_id, title, status, version_number, root_story_id, previous_story_id, created_by_user_id, created_at, updated_at";

pub(crate) fn row_to_story(row: SqliteRow) -> Result<Story> {
    Ok(Story {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        world_id: opt_uuid(&row, "world_id")?,
        title: text(&row, "title")?,
        status: parse(&row, "status")?,
        version_number: int(&row, "version_number")?,
        root_story_id: uuid(&row, "root_story_id")?,
        previous_story_id: opt_uuid(&row, "previous_story_id")?,
        created_by_user_id: opt_uuid(&row, "created_by_user_id")?,
        created_at: timestamp(&row, "created_at")?,
        updated_at: timestamp(&row, "updated_at")?,
    })
}

pub(crate) const INSERT: &str = r#"
    INSERT INTO stories (
        id, tenant_id, world_id, title, status, version_number, root_story_id,
        previous_story_id, created_by_user_id, created_at, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
"#;

/// Bind a story onto [`INSERT`]
pub(crate) fn bind_insert(story: &Story) -> crate::db::SqliteQuery<'static> {
    sqlx::query(INSERT)
        .bind(story.id.to_string())
        .bind(story.tenant_id.to_string())
        .bind(opt_id(story.world_id))
        .bind(story.title.clone())
        .bind(story.status.as_str())
        .bind(story.version_number)
        .bind(story.root_story_id.to_string())
        .bind(opt_id(story.previous_story_id))
        .bind(opt_id(story.created_by_user_id))
        .bind(ts(&story.created_at))
        .bind(ts(&story.updated_at))
}

/// Stories and their versions
///
/// Every version is its own row. Versions of one story share
/// `root_story_id`; [`crate::StoryCloner`] produces new versions with their
/// chapters, scenes and beats.
#[derive(Clone)]
pub struct StoryRepository {
    db: Database,
}

impl StoryRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a story version
    #[instrument(skip(self, story), fields(story_id = %story.id, version = story.version_number))]
    pub async fn create(&self, story: &Story) -> Result<()> {
        story.validate()?;
        self.db
            .execute(bind_insert(story))
            .await
            .map_err(db_error("story", story.id))?;

        debug!(root_story_id = %story.root_story_id, "Story created");
        Ok(())
    }

    /// Fetch a story version
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Story> {
        let sql = format!("SELECT {COLUMNS} FROM stories WHERE tenant_id = ?1 AND id = ?2");
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("story", id))?
            .ok_or_else(|| Error::not_found("story", id))?;
        row_to_story(row)
    }

    /// Stories of a tenant, newest first (every version is listed)
    #[instrument(skip(self))]
    pub async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Story>> {
        let page = Page::new(limit, offset)?;
        let sql = format!(
            "SELECT {COLUMNS} FROM stories WHERE tenant_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
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
            .map_err(db_error("story", tenant_id))?;
        rows.into_iter().map(row_to_story).collect()
    }

    /// Number of story rows owned by a tenant
    pub async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<i64> {
        count(
            &self.db,
            sqlx::query("SELECT COUNT(*) FROM stories WHERE tenant_id = ?1")
                .bind(tenant_id.to_string()),
            "story",
            tenant_id,
        )
        .await
    }

    /// Every version sharing `root_story_id`, oldest version first
    #[instrument(skip(self))]
    pub async fn list_versions_by_root(
        &self,
        tenant_id: Uuid,
        root_story_id: Uuid,
    ) -> Result<Vec<Story>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM stories
            WHERE tenant_id = ?1 AND root_story_id = ?2
            ORDER BY version_number ASC, created_at ASC
            "#
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(root_story_id.to_string()),
            )
            .await
            .map_err(db_error("story", root_story_id))?;
        rows.into_iter().map(row_to_story).collect()
    }

    /// The versions of a lineage, for callers assembling the version DAG
    ///
    /// Same rows as [`Self::list_versions_by_root`]; `previous_story_id`
    /// carries the edges.
    pub async fn get_version_graph(
        &self,
        tenant_id: Uuid,
        root_story_id: Uuid,
    ) -> Result<Vec<Story>> {
        self.list_versions_by_root(tenant_id, root_story_id).await
    }

    /// Highest version of a lineage
    #[instrument(skip(self))]
    pub async fn get_latest_version(&self, tenant_id: Uuid, root_story_id: Uuid) -> Result<Story> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM stories
            WHERE tenant_id = ?1 AND root_story_id = ?2
            ORDER BY version_number DESC, created_at DESC
            LIMIT 1
            "#
        );
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(root_story_id.to_string()),
            )
            .await
            .map_err(db_error("story", root_story_id))?
            .ok_or_else(|| Error::not_found("story", root_story_id))?;
        row_to_story(row)
    }

    /// Update title, status, version number and world
    #[instrument(skip(self, story), fields(story_id = %story.id))]
    pub async fn update(&self, story: &Story) -> Result<()> {
        story.validate()?;
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    UPDATE stories
                    SET world_id = ?3, title = ?4, status = ?5, version_number = ?6, updated_at = ?7
                    WHERE tenant_id = ?1 AND id = ?2
                    "#,
                )
                .bind(story.tenant_id.to_string())
                .bind(story.id.to_string())
                .bind(opt_id(story.world_id))
                .bind(&story.title)
                .bind(story.status.as_str())
                .bind(story.version_number)
                .bind(ts(&story.updated_at)),
            )
            .await
            .map_err(db_error("story", story.id))?;
        expect_rows(result, "story", story.id)
    }

    /// Delete one story version; other versions of the lineage stay
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM stories WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("story", id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::TenantRepository;
    use fabula_core::story::StoryStatus;
    use fabula_core::Tenant;

    async fn setup() -> (StoryRepository, Uuid) {
        let db = Database::in_memory().await.unwrap();
        let tenant = Tenant::new("acme");
        TenantRepository::new(db.clone())
            .create(&tenant)
            .await
            .unwrap();
        (StoryRepository::new(db), tenant.id)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (repo, tenant_id) = setup().await;
        let mut story = Story::new(tenant_id, "The Long Night");
        story.created_by_user_id = Some(Uuid::new_v4());
        repo.create(&story).await.unwrap();
        assert_eq!(repo.get_by_id(tenant_id, story.id).await.unwrap(), story);

        story.status = StoryStatus::Published;
        repo.update(&story).await.unwrap();
        assert_eq!(
            repo.get_by_id(tenant_id, story.id).await.unwrap().status,
            StoryStatus::Published
        );
    }

    #[tokio::test]
    async fn test_versions_by_root() {
        let (repo, tenant_id) = setup().await;
        let v1 = Story::new(tenant_id, "The Long Night");
        let v2 = v1.next_version(2);
        let v3 = v2.next_version(3);
        // inserted out of order on purpose
        repo.create(&v1).await.unwrap();
        repo.create(&v3).await.unwrap();
        repo.create(&v2).await.unwrap();

        let versions: Vec<_> = repo
            .list_versions_by_root(tenant_id, v1.id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.version_number)
            .collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(repo.get_version_graph(tenant_id, v1.id).await.unwrap().len(), 3);
        assert_eq!(repo.get_latest_version(tenant_id, v1.id).await.unwrap().id, v3.id);
        assert_eq!(repo.count_by_tenant(tenant_id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_latest_version_of_unknown_root() {
        let (repo, tenant_id) = setup().await;
        assert!(repo
            .get_latest_version(tenant_id, Uuid::new_v4())
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_broken_lineage_is_rejected() {
        let (repo, tenant_id) = setup().await;
        let mut story = Story::new(tenant_id, "Orphan");
        story.version_number = 2;
        assert!(repo.create(&story).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_other_tenant_cannot_read() {
        let (repo, tenant_id) = setup().await;
        let story = Story::new(tenant_id, "Private");
        repo.create(&story).await.unwrap();
        assert!(repo
            .get_by_id(Uuid::new_v4(), story.id)
            .await
            .unwrap_err()
            .is_not_found());
    }
}
