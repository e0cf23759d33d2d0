//! Chapter repository

use super::expect_rows;
use crate::codec::{int, parse, text, timestamp, ts, uuid};
use crate::db::Database;
use crate::error::db_error;
use fabula_core::story::Chapter;
use fabula_core::{Error, Result};
use sqlx::sqlite::SqliteRow;
use tracing::{debug, instrument};
use uuid::Uuid;

pub(crate) const COLUMNS: &str =
    "id, tenant_id, story_id, number, title, status, created_at, updated_at";

pub(crate) fn row_to_chapter(row: SqliteRow) -> Result<Chapter> {
    Ok(Chapter {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        story_id: uuid(&row, "story_id")?,
        number: int(&row, "number")?,
        title: text(&row, "title")?,
        status: parse(&row, "status")?,
        created_at: timestamp(&row, "created_at")?,
        updated_at: timestamp(&row, "updated_at")?,
    })
}

/// Bind a chapter onto an insert statement
pub(crate) fn bind_insert(chapter: &Chapter) -> crate::db::SqliteQuery<'static> {
    sqlx::query(
        r#"
        INSERT INTO chapters (id, tenant_id, story_id, number, title, status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(chapter.id.to_string())
    .bind(chapter.tenant_id.to_string())
    .bind(chapter.story_id.to_string())
    .bind(chapter.number)
    .bind(chapter.title.clone())
    .bind(chapter.status.as_str())
    .bind(ts(&chapter.created_at))
    .bind(ts(&chapter.updated_at))
}

/// Chapters of a story
#[derive(Clone)]
pub struct ChapterRepository {
    db: Database,
}

impl ChapterRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a chapter
    #[instrument(skip(self, chapter), fields(chapter_id = %chapter.id, story_id = %chapter.story_id))]
    pub async fn create(&self, chapter: &Chapter) -> Result<()> {
        chapter.validate()?;
        self.db
            .execute(bind_insert(chapter))
            .await
            .map_err(db_error("chapter", chapter.id))?;
        debug!(number = chapter.number, "Chapter created");
        Ok(())
    }

    /// Fetch a chapter
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Chapter> {
        let sql = format!("SELECT {COLUMNS} FROM chapters WHERE tenant_id = ?1 AND id = ?2");
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("chapter", id))?
            .ok_or_else(|| Error::not_found("chapter", id))?;
        row_to_chapter(row)
    }

    /// Chapters of a story by number
    #[instrument(skip(self))]
    pub async fn list_by_story(&self, tenant_id: Uuid, story_id: Uuid) -> Result<Vec<Chapter>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM chapters WHERE tenant_id = ?1 AND story_id = ?2 ORDER BY number ASC, id ASC"
        );
        let rows = self
            .db
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(story_id.to_string()),
            )
            .await
            .map_err(db_error("chapter", story_id))?;
        rows.into_iter().map(row_to_chapter).collect()
    }

    /// Update number, title and status
    #[instrument(skip(self, chapter), fields(chapter_id = %chapter.id))]
    pub async fn update(&self, chapter: &Chapter) -> Result<()> {
        chapter.validate()?;
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    UPDATE chapters
                    SET number = ?3, title = ?4, status = ?5, updated_at = ?6
                    WHERE tenant_id = ?1 AND id = ?2
                    "#,
                )
                .bind(chapter.tenant_id.to_string())
                .bind(chapter.id.to_string())
                .bind(chapter.number)
                .bind(&chapter.title)
                .bind(chapter.status.as_str())
                .bind(ts(&chapter.updated_at)),
            )
            .await
            .map_err(db_error("chapter", chapter.id))?;
        expect_rows(result, "chapter", chapter.id)
    }

    /// Delete a chapter; its scenes and content blocks are detached
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        self.db
            .execute(
                sqlx::query("DELETE FROM chapters WHERE tenant_id = ?1 AND id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("chapter", id))?;
        Ok(())
    }

    /// Delete every chapter of a story
    #[instrument(skip(self))]
    pub async fn delete_by_story(&self, tenant_id: Uuid, story_id: Uuid) -> Result<u64> {
        let result = self
            .db
            .execute(
                sqlx::query("DELETE FROM chapters WHERE tenant_id = ?1 AND story_id = ?2")
                    .bind(tenant_id.to_string())
                    .bind(story_id.to_string()),
            )
            .await
            .map_err(db_error("chapter", story_id))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::{StoryRepository, TenantRepository};
    use fabula_core::story::{ChapterStatus, Story};
    use fabula_core::Tenant;

    async fn setup() -> (ChapterRepository, Uuid, Uuid) {
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
        (ChapterRepository::new(db), tenant.id, story.id)
    }

    #[tokio::test]
    async fn test_list_by_number() {
        let (repo, tenant_id, story_id) = setup().await;
        for (number, title) in [(3, "Dawn"), (1, "Dusk"), (2, "Midnight")] {
            repo.create(&Chapter::new(tenant_id, story_id, number, title))
                .await
                .unwrap();
        }
        let titles: Vec<_> = repo
            .list_by_story(tenant_id, story_id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["Dusk", "Midnight", "Dawn"]);

        assert_eq!(repo.delete_by_story(tenant_id, story_id).await.unwrap(), 3);
        assert!(repo.list_by_story(tenant_id, story_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_chapter() {
        let (repo, tenant_id, story_id) = setup().await;
        let mut chapter = Chapter::new(tenant_id, story_id, 1, "Dusk");
        assert!(repo.update(&chapter).await.unwrap_err().is_not_found());

        repo.create(&chapter).await.unwrap();
        chapter.status = ChapterStatus::Published;
        repo.update(&chapter).await.unwrap();
        assert_eq!(repo.get_by_id(tenant_id, chapter.id).await.unwrap(), chapter);
    }
}
