//! Story versioning
//!
//! A new version of a story is a deep copy of an existing one: the story row
//! itself plus its chapters, scenes, beats, chapter content blocks and scene
//! references. Every copied row gets a fresh id and foreign keys inside the
//! copy are remapped to the new ids. The copy runs in a single transaction.

use crate::db::Database;
use crate::error::db_error;
use crate::repos::{beat, chapter, content, scene, story};
use crate::tx::Tx;
use fabula_core::story::Story;
use fabula_core::{Error, Result};
use sqlx::Row;
use std::collections::HashMap;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Row counts of one copy
#[derive(Debug, Default, Clone, Copy)]
struct Copied {
    chapters: usize,
    scenes: usize,
    beats: usize,
    content_blocks: usize,
    scene_references: usize,
}

/// Creates new story versions by deep copy
#[derive(Clone)]
pub struct StoryCloner {
    db: Database,
}

impl StoryCloner {
    /// Create a cloner over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Copy `source_id` into the next version of its lineage
    ///
    /// The new version number is one past the highest version of the
    /// lineage, not of the source, so cloning an older version never
    /// collides with a newer one. The copy starts as a draft authored by
    /// `created_by_user_id`.
    #[instrument(skip(self))]
    pub async fn clone_story(
        &self,
        tenant_id: Uuid,
        source_id: Uuid,
        created_by_user_id: Option<Uuid>,
    ) -> Result<Story> {
        let (story, copied) = self
            .db
            .with_tx(move |tx| {
                Box::pin(
                    async move { copy_story(tx, tenant_id, source_id, created_by_user_id).await },
                )
            })
            .await?;

        info!(
            story_id = %story.id,
            version = story.version_number,
            chapters = copied.chapters,
            scenes = copied.scenes,
            beats = copied.beats,
            content_blocks = copied.content_blocks,
            scene_references = copied.scene_references,
            "Story version created"
        );
        Ok(story)
    }
}

async fn copy_story(
    tx: &mut Tx,
    tenant_id: Uuid,
    source_id: Uuid,
    created_by_user_id: Option<Uuid>,
) -> Result<(Story, Copied)> {
    let tenant = tenant_id.to_string();
    let source_key = source_id.to_string();
    let mut copied = Copied::default();

    // Source and lineage head
    let sql = format!(
        "SELECT {} FROM stories WHERE tenant_id = ?1 AND id = ?2",
        story::COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(&tenant)
        .bind(&source_key)
        .fetch_optional(tx.conn())
        .await
        .map_err(db_error("story", source_id))?
        .ok_or_else(|| Error::not_found("story", source_id))?;
    let source = story::row_to_story(row)?;

    let max_version: Option<i32> = sqlx::query(
        "SELECT MAX(version_number) FROM stories WHERE tenant_id = ?1 AND root_story_id = ?2",
    )
    .bind(&tenant)
    .bind(source.root_story_id.to_string())
    .fetch_one(tx.conn())
    .await
    .map_err(db_error("story", source.root_story_id))?
    .try_get(0)
    .map_err(Error::internal)?;

    let mut next = source.next_version(max_version.unwrap_or(source.version_number) + 1);
    next.created_by_user_id = created_by_user_id;
    next.validate()?;
    story::bind_insert(&next)
        .execute(tx.conn())
        .await
        .map_err(db_error("story", next.id))?;
    debug!(story_id = %next.id, version = next.version_number, "Story row copied");

    let stamp = next.created_at;

    // Chapters
    let sql = format!(
        "SELECT {} FROM chapters WHERE tenant_id = ?1 AND story_id = ?2 ORDER BY number ASC, id ASC",
        chapter::COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(&tenant)
        .bind(&source_key)
        .fetch_all(tx.conn())
        .await
        .map_err(db_error("chapter", source_id))?;
    let mut chapter_ids = HashMap::with_capacity(rows.len());
    for row in rows {
        let mut item = chapter::row_to_chapter(row)?;
        let new_id = Uuid::new_v4();
        chapter_ids.insert(item.id, new_id);
        item.id = new_id;
        item.story_id = next.id;
        item.created_at = stamp;
        item.updated_at = stamp;
        chapter::bind_insert(&item)
            .execute(tx.conn())
            .await
            .map_err(db_error("chapter", item.id))?;
        copied.chapters += 1;
    }

    // Scenes
    let sql = format!(
        "SELECT {} FROM scenes WHERE tenant_id = ?1 AND story_id = ?2 ORDER BY order_num ASC, id ASC",
        scene::COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(&tenant)
        .bind(&source_key)
        .fetch_all(tx.conn())
        .await
        .map_err(db_error("scene", source_id))?;
    let mut scene_ids = HashMap::with_capacity(rows.len());
    for row in rows {
        let mut item = scene::row_to_scene(row)?;
        let new_id = Uuid::new_v4();
        scene_ids.insert(item.id, new_id);
        item.id = new_id;
        item.story_id = next.id;
        item.chapter_id = item.chapter_id.and_then(|id| chapter_ids.get(&id).copied());
        item.created_at = stamp;
        item.updated_at = stamp;
        scene::bind_insert(&item)
            .execute(tx.conn())
            .await
            .map_err(db_error("scene", item.id))?;
        copied.scenes += 1;
    }

    // Beats of the copied scenes
    let sql = format!(
        "SELECT {} FROM beats WHERE tenant_id = ?1 AND scene_id IN (SELECT id FROM scenes WHERE story_id = ?2) ORDER BY order_num ASC, id ASC",
        beat::COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(&tenant)
        .bind(&source_key)
        .fetch_all(tx.conn())
        .await
        .map_err(db_error("beat", source_id))?;
    for row in rows {
        let mut item = beat::row_to_beat(row)?;
        let Some(scene_id) = scene_ids.get(&item.scene_id).copied() else {
            continue;
        };
        item.id = Uuid::new_v4();
        item.scene_id = scene_id;
        item.created_at = stamp;
        item.updated_at = stamp;
        beat::bind_insert(&item)
            .execute(tx.conn())
            .await
            .map_err(db_error("beat", item.id))?;
        copied.beats += 1;
    }

    // Content blocks placed in the copied chapters
    let sql = format!(
        "SELECT {} FROM content_blocks WHERE tenant_id = ?1 AND chapter_id IN (SELECT id FROM chapters WHERE story_id = ?2)",
        content::COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(&tenant)
        .bind(&source_key)
        .fetch_all(tx.conn())
        .await
        .map_err(db_error("content_block", source_id))?;
    for row in rows {
        let mut item = content::row_to_block(row)?;
        item.id = Uuid::new_v4();
        item.chapter_id = item.chapter_id.and_then(|id| chapter_ids.get(&id).copied());
        item.created_at = stamp;
        item.updated_at = stamp;
        content::bind_insert(&item)
            .execute(tx.conn())
            .await
            .map_err(db_error("content_block", item.id))?;
        copied.content_blocks += 1;
    }

    // Scene references
    let sql = format!(
        "SELECT {} FROM scene_references WHERE tenant_id = ?1 AND scene_id IN (SELECT id FROM scenes WHERE story_id = ?2)",
        scene::REFERENCE_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(&tenant)
        .bind(&source_key)
        .fetch_all(tx.conn())
        .await
        .map_err(db_error("scene_reference", source_id))?;
    for row in rows {
        let mut item = scene::row_to_reference(row)?;
        let Some(scene_id) = scene_ids.get(&item.scene_id).copied() else {
            continue;
        };
        item.id = Uuid::new_v4();
        item.scene_id = scene_id;
        item.created_at = stamp;
        scene::bind_reference_insert(&item)
            .execute(tx.conn())
            .await
            .map_err(db_error("scene_reference", item.id))?;
        copied.scene_references += 1;
    }

    Ok((next, copied))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::Repositories;
    use fabula_core::story::{
        Beat, BeatType, Chapter, ContentBlock, ContentKind, Scene, SceneReference, StoryStatus,
    };
    use fabula_core::{EntityType, Tenant};

    struct Seeded {
        repos: Repositories,
        cloner: StoryCloner,
        tenant_id: Uuid,
        story: Story,
    }

    async fn seed() -> Seeded {
        let db = Database::in_memory().await.unwrap();
        let repos = Repositories::new(db.clone());
        let tenant = Tenant::new("acme");
        repos.tenants.create(&tenant).await.unwrap();

        let mut story = Story::new(tenant.id, "The Long Night");
        story.status = StoryStatus::Published;
        repos.stories.create(&story).await.unwrap();

        let one = Chapter::new(tenant.id, story.id, 1, "Dusk");
        let two = Chapter::new(tenant.id, story.id, 2, "Dawn");
        repos.chapters.create(&one).await.unwrap();
        repos.chapters.create(&two).await.unwrap();

        let placed = Scene::new(tenant.id, story.id, Some(one.id), 1);
        let loose = Scene::new(tenant.id, story.id, None, 2);
        repos.scenes.create(&placed).await.unwrap();
        repos.scenes.create(&loose).await.unwrap();

        repos
            .beats
            .create(&Beat::new(tenant.id, placed.id, 1, BeatType::Setup))
            .await
            .unwrap();
        repos
            .beats
            .create(&Beat::new(tenant.id, loose.id, 1, BeatType::Resolution))
            .await
            .unwrap();

        repos
            .content_blocks
            .create(&ContentBlock::new(tenant.id, Some(two.id), "The sun rose.").at(1))
            .await
            .unwrap();
        repos
            .content_blocks
            .create(&ContentBlock::new(tenant.id, None, "Unplaced note"))
            .await
            .unwrap();

        repos
            .scene_references
            .create(&SceneReference::new(
                tenant.id,
                placed.id,
                EntityType::Character,
                Uuid::new_v4(),
            ))
            .await
            .unwrap();

        Seeded {
            cloner: StoryCloner::new(db),
            repos,
            tenant_id: tenant.id,
            story,
        }
    }

    #[tokio::test]
    async fn test_clone_copies_structure() {
        let s = seed().await;
        let v2 = s
            .cloner
            .clone_story(s.tenant_id, s.story.id, None)
            .await
            .unwrap();

        assert_eq!(v2.version_number, 2);
        assert_eq!(v2.root_story_id, s.story.id);
        assert_eq!(v2.previous_story_id, Some(s.story.id));
        assert_eq!(v2.status, StoryStatus::Draft);

        let chapters = s.repos.chapters.list_by_story(s.tenant_id, v2.id).await.unwrap();
        assert_eq!(
            chapters.iter().map(|c| c.title.as_str()).collect::<Vec<_>>(),
            vec!["Dusk", "Dawn"]
        );

        let scenes = s.repos.scenes.list_by_story(s.tenant_id, v2.id).await.unwrap();
        assert_eq!(scenes.len(), 2);
        let placed = scenes.iter().find(|sc| sc.chapter_id.is_some()).unwrap();
        assert_eq!(placed.chapter_id, Some(chapters[0].id));

        assert_eq!(s.repos.beats.list_by_story(s.tenant_id, v2.id).await.unwrap().len(), 2);
        let blocks = s
            .repos
            .content_blocks
            .list_by_chapter(s.tenant_id, chapters[1].id)
            .await
            .unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, ContentKind::Draft);
        assert_eq!(
            s.repos.scene_references.list_by_scene(s.tenant_id, placed.id).await.unwrap().len(),
            1
        );

        // The source is untouched.
        let original = s.repos.scenes.list_by_story(s.tenant_id, s.story.id).await.unwrap();
        assert!(original.iter().all(|sc| !scenes.iter().any(|c| c.id == sc.id)));
    }

    #[tokio::test]
    async fn test_clone_of_old_version_takes_next_free_number() {
        let s = seed().await;
        let author = Uuid::new_v4();
        let v2 = s
            .cloner
            .clone_story(s.tenant_id, s.story.id, None)
            .await
            .unwrap();
        let v3 = s
            .cloner
            .clone_story(s.tenant_id, s.story.id, Some(author))
            .await
            .unwrap();

        assert_eq!(v3.version_number, 3);
        assert_eq!(v3.previous_story_id, Some(s.story.id));
        assert_eq!(v3.created_by_user_id, Some(author));

        let latest = s
            .repos
            .stories
            .get_latest_version(s.tenant_id, s.story.id)
            .await
            .unwrap();
        assert_eq!(latest.id, v3.id);
        assert_ne!(latest.id, v2.id);
    }

    #[tokio::test]
    async fn test_clone_missing_story() {
        let s = seed().await;
        let missing = Uuid::new_v4();
        let err = s
            .cloner
            .clone_story(s.tenant_id, missing, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let other_tenant = Uuid::new_v4();
        assert!(s
            .cloner
            .clone_story(other_tenant, s.story.id, None)
            .await
            .unwrap_err()
            .is_not_found());
    }
}
