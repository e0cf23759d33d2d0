//! Integration tests for fabula-store
//!
//! These tests drive the public API end to end:
//! - file-backed stores: reopen, re-migration and concurrent writers
//! - tenant isolation and cascading deletes
//! - hierarchy moves, mirrored relations and story versions together

use fabula_core::relation::{EntityRelation, RelationQuery};
use fabula_core::story::{Chapter, Scene, Story};
use fabula_core::world::{Character, Location, World};
use fabula_core::{EntityType, Tenant};
use fabula_store::{
    Database, HierarchicalRepository, MigrationSource, Migrator, Repositories, StoreConfig,
    StoryCloner,
};
use tempfile::TempDir;
use uuid::Uuid;

async fn seeded(db: &Database) -> (Repositories, Tenant, World) {
    let repos = Repositories::new(db.clone());
    let tenant = Tenant::new(format!("tenant-{}", Uuid::new_v4()));
    repos.tenants.create(&tenant).await.unwrap();
    let world = World::new(tenant.id, "Eldoria");
    repos.worlds.create(&world).await.unwrap();
    (repos, tenant, world)
}

// ============================================================================
// File-backed store
// ============================================================================

#[tokio::test]
async fn test_reopen_keeps_data_and_remigrates_cleanly() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("fabula.db");

    let db = Database::from_path(&path).await.unwrap();
    let (_, tenant, world) = seeded(&db).await;
    db.close().await;

    let db = Database::from_path(&path).await.unwrap();
    let report = Migrator::new(MigrationSource::Embedded).run(&db).await.unwrap();
    assert!(report.files_applied.len() >= 8);

    let repos = Repositories::new(db);
    assert_eq!(repos.tenants.get_by_id(tenant.id).await.unwrap().name, tenant.name);
    assert_eq!(repos.worlds.get_by_id(tenant.id, world.id).await.unwrap(), world);
}

#[tokio::test]
async fn test_concurrent_writers_are_serialized() {
    let dir = TempDir::new().unwrap();
    let mut config = StoreConfig::file(dir.path().join("fabula.db").display().to_string());
    config.max_connections = 4;
    let db = Database::connect(&config).await.unwrap();
    let (repos, tenant, world) = seeded(&db).await;

    let (tenant_id, world_id) = (tenant.id, world.id);
    let mut handles = Vec::new();
    for i in 0..16 {
        let repos = repos.clone();
        handles.push(tokio::spawn(async move {
            let character = Character::new(tenant_id, world_id, format!("Character {i}"));
            repos.characters.create(&character).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(
        repos.characters.count_by_world(tenant.id, world.id).await.unwrap(),
        16
    );
}

// ============================================================================
// Tenancy
// ============================================================================

#[tokio::test]
async fn test_rows_are_invisible_to_other_tenants() {
    let db = Database::in_memory().await.unwrap();
    let (repos, tenant, world) = seeded(&db).await;
    let (_, intruder, _) = seeded(&db).await;

    assert!(repos
        .worlds
        .get_by_id(intruder.id, world.id)
        .await
        .unwrap_err()
        .is_not_found());

    let rel = EntityRelation::new(
        tenant.id,
        world.id,
        (EntityType::Character, Uuid::new_v4()),
        "ally_of",
        (EntityType::Faction, Uuid::new_v4()),
    );
    repos.relations.create(&rel).await.unwrap();
    let page = repos
        .relations
        .list_by_world(intruder.id, world.id, &RelationQuery::new())
        .await
        .unwrap();
    assert!(page.is_empty());
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_tenant_delete_cascades() {
    let db = Database::in_memory().await.unwrap();
    let (repos, tenant, world) = seeded(&db).await;
    let story = Story::new(tenant.id, "The Long Night");
    repos.stories.create(&story).await.unwrap();

    repos.tenants.delete(tenant.id).await.unwrap();

    assert_eq!(repos.worlds.count_by_tenant(tenant.id).await.unwrap(), 0);
    assert!(repos
        .worlds
        .get_by_id(tenant.id, world.id)
        .await
        .unwrap_err()
        .is_not_found());
    assert!(repos
        .stories
        .get_by_id(tenant.id, story.id)
        .await
        .unwrap_err()
        .is_not_found());
    // Deleting again is a no-op.
    repos.tenants.delete(tenant.id).await.unwrap();
}

// ============================================================================
// Hierarchy
// ============================================================================

#[tokio::test]
async fn test_reparent_shifts_subtree_levels() {
    let db = Database::in_memory().await.unwrap();
    let (repos, tenant, world) = seeded(&db).await;

    let mut continent = Location::new(tenant.id, world.id, "Continent");
    repos.locations.create(&mut continent).await.unwrap();
    let mut kingdom = Location::new(tenant.id, world.id, "Kingdom").with_parent(continent.id);
    repos.locations.create(&mut kingdom).await.unwrap();
    let mut city = Location::new(tenant.id, world.id, "City").with_parent(kingdom.id);
    repos.locations.create(&mut city).await.unwrap();
    assert_eq!(city.hierarchy_level, 2);

    let moved = repos
        .locations
        .reparent(tenant.id, kingdom.id, None)
        .await
        .unwrap();
    assert_eq!(moved.hierarchy_level, 0);
    assert_eq!(moved.parent_id, None);

    let city = repos.locations.get_by_id(tenant.id, city.id).await.unwrap();
    assert_eq!(city.hierarchy_level, 1);

    let ancestors = repos
        .locations
        .get_ancestors(tenant.id, city.id)
        .await
        .unwrap();
    assert_eq!(
        ancestors.iter().map(|l| l.name.as_str()).collect::<Vec<_>>(),
        vec!["Kingdom"]
    );

    let err = repos
        .locations
        .reparent(tenant.id, kingdom.id, Some(city.id))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

// ============================================================================
// Relations and versions
// ============================================================================

#[tokio::test]
async fn test_mirrored_relation_lifecycle() {
    let db = Database::in_memory().await.unwrap();
    let (repos, tenant, world) = seeded(&db).await;

    let mentor = Character::new(tenant.id, world.id, "Aldric");
    let pupil = Character::new(tenant.id, world.id, "Mira");
    repos.characters.create(&mentor).await.unwrap();
    repos.characters.create(&pupil).await.unwrap();

    let mut rel = EntityRelation::new(
        tenant.id,
        world.id,
        (EntityType::Character, mentor.id),
        "mentor_of",
        (EntityType::Character, pupil.id),
    );
    let mirror = repos.relations.create_with_mirror(&mut rel).await.unwrap();

    let incoming = repos
        .relations
        .list_by_source(
            tenant.id,
            EntityType::Character,
            pupil.id,
            &RelationQuery::new(),
        )
        .await
        .unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming.items[0].id, mirror.id);
    assert_eq!(incoming.items[0].relation_type, "mentored_by");

    let removed = repos
        .relations
        .delete_by_entity(tenant.id, EntityType::Character, pupil.id)
        .await
        .unwrap();
    assert_eq!(removed, 2);
}

#[tokio::test]
async fn test_version_lineage() {
    let db = Database::in_memory().await.unwrap();
    let (repos, tenant, _) = seeded(&db).await;
    let cloner = StoryCloner::new(db.clone());

    let v1 = Story::new(tenant.id, "The Long Night");
    repos.stories.create(&v1).await.unwrap();
    let chapter = Chapter::new(tenant.id, v1.id, 1, "Dusk");
    repos.chapters.create(&chapter).await.unwrap();
    repos
        .scenes
        .create(&Scene::new(tenant.id, v1.id, Some(chapter.id), 1))
        .await
        .unwrap();

    let v2 = cloner.clone_story(tenant.id, v1.id, None).await.unwrap();
    let v3 = cloner.clone_story(tenant.id, v2.id, None).await.unwrap();

    let versions = repos
        .stories
        .list_versions_by_root(tenant.id, v1.id)
        .await
        .unwrap();
    assert_eq!(
        versions.iter().map(|s| s.version_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(v3.previous_story_id, Some(v2.id));
    assert_eq!(v3.root_story_id, v1.id);

    let scenes = repos.scenes.list_by_story(tenant.id, v3.id).await.unwrap();
    assert_eq!(scenes.len(), 1);
    let copied_chapter = repos.chapters.list_by_story(tenant.id, v3.id).await.unwrap();
    assert_eq!(scenes[0].chapter_id, Some(copied_chapter[0].id));
}
