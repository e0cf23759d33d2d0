//! Repositories - one per entity kind
//!
//! Every repository is a cheap clone over the shared [`Database`] and scopes
//! every statement by `tenant_id`. Mutations that match no row report
//! `NotFound`; top-level deletes are idempotent.

mod artifact;
pub(crate) mod beat;
mod catalogue;
pub(crate) mod chapter;
mod character;
pub(crate) mod content;
mod event;
mod faction;
mod location;
mod lore;
mod relation;
pub(crate) mod scene;
pub(crate) mod story;
mod tenant;
mod world;

pub use artifact::{ArtifactReferenceRepository, ArtifactRepository};
pub use beat::BeatRepository;
pub use catalogue::{ArchetypeRepository, ArchetypeTraitRepository, TraitRepository};
pub use chapter::ChapterRepository;
pub use character::{
    CharacterRelationshipRepository, CharacterRepository, CharacterTraitRepository,
};
pub use content::{
    ContentAnchorRepository, ContentBlockReferenceRepository, ContentBlockRepository,
};
pub use event::{
    EventArtifactRepository, EventCharacterRepository, EventLocationRepository,
    EventReferenceRepository, EventRepository,
};
pub use faction::{FactionReferenceRepository, FactionRepository};
pub use location::LocationRepository;
pub use lore::{LoreReferenceRepository, LoreRepository};
pub use relation::EntityRelationRepository;
pub use scene::{SceneReferenceRepository, SceneRepository};
pub use story::StoryRepository;
pub use tenant::TenantRepository;
pub use world::WorldRepository;

use crate::db::Database;
use crate::error::db_error;
use fabula_core::{Error, Result};
use sqlx::sqlite::SqliteQueryResult;
use sqlx::Row;
use std::fmt::Display;

/// Every repository over one store handle
#[derive(Clone)]
pub struct Repositories {
    /// Tenants
    pub tenants: TenantRepository,
    /// Worlds
    pub worlds: WorldRepository,
    /// Archetypes
    pub archetypes: ArchetypeRepository,
    /// Traits
    pub traits: TraitRepository,
    /// Archetype ↔ trait bindings
    pub archetype_traits: ArchetypeTraitRepository,
    /// Characters
    pub characters: CharacterRepository,
    /// Character ↔ trait bindings with snapshots
    pub character_traits: CharacterTraitRepository,
    /// Pairwise character relationships
    pub character_relationships: CharacterRelationshipRepository,
    /// Locations
    pub locations: LocationRepository,
    /// Factions
    pub factions: FactionRepository,
    /// Faction references
    pub faction_references: FactionReferenceRepository,
    /// Lores
    pub lores: LoreRepository,
    /// Lore references
    pub lore_references: LoreReferenceRepository,
    /// Artifacts
    pub artifacts: ArtifactRepository,
    /// Artifact references
    pub artifact_references: ArtifactReferenceRepository,
    /// Events
    pub events: EventRepository,
    /// Event references
    pub event_references: EventReferenceRepository,
    /// Event participants
    pub event_characters: EventCharacterRepository,
    /// Artifacts involved in events
    pub event_artifacts: EventArtifactRepository,
    /// Locations of events
    pub event_locations: EventLocationRepository,
    /// Stories
    pub stories: StoryRepository,
    /// Chapters
    pub chapters: ChapterRepository,
    /// Scenes
    pub scenes: SceneRepository,
    /// Scene references
    pub scene_references: SceneReferenceRepository,
    /// Beats
    pub beats: BeatRepository,
    /// Content blocks
    pub content_blocks: ContentBlockRepository,
    /// Content anchors
    pub content_anchors: ContentAnchorRepository,
    /// Content block references
    pub content_block_references: ContentBlockReferenceRepository,
    /// Entity relation graph
    pub relations: EntityRelationRepository,
}

impl Repositories {
    /// Build every repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            tenants: TenantRepository::new(db.clone()),
            worlds: WorldRepository::new(db.clone()),
            archetypes: ArchetypeRepository::new(db.clone()),
            traits: TraitRepository::new(db.clone()),
            archetype_traits: ArchetypeTraitRepository::new(db.clone()),
            characters: CharacterRepository::new(db.clone()),
            character_traits: CharacterTraitRepository::new(db.clone()),
            character_relationships: CharacterRelationshipRepository::new(db.clone()),
            locations: LocationRepository::new(db.clone()),
            factions: FactionRepository::new(db.clone()),
            faction_references: FactionReferenceRepository::new(db.clone()),
            lores: LoreRepository::new(db.clone()),
            lore_references: LoreReferenceRepository::new(db.clone()),
            artifacts: ArtifactRepository::new(db.clone()),
            artifact_references: ArtifactReferenceRepository::new(db.clone()),
            events: EventRepository::new(db.clone()),
            event_references: EventReferenceRepository::new(db.clone()),
            event_characters: EventCharacterRepository::new(db.clone()),
            event_artifacts: EventArtifactRepository::new(db.clone()),
            event_locations: EventLocationRepository::new(db.clone()),
            stories: StoryRepository::new(db.clone()),
            chapters: ChapterRepository::new(db.clone()),
            scenes: SceneRepository::new(db.clone()),
            scene_references: SceneReferenceRepository::new(db.clone()),
            beats: BeatRepository::new(db.clone()),
            content_blocks: ContentBlockRepository::new(db.clone()),
            content_anchors: ContentAnchorRepository::new(db.clone()),
            content_block_references: ContentBlockReferenceRepository::new(db.clone()),
            relations: EntityRelationRepository::new(db),
        }
    }
}

/// `NotFound` when a mutation matched nothing
pub(crate) fn expect_rows(
    result: SqliteQueryResult,
    resource: &'static str,
    id: impl Display,
) -> Result<()> {
    if result.rows_affected() == 0 {
        return Err(Error::not_found(resource, id));
    }
    Ok(())
}

/// Run a `SELECT COUNT(*)` statement
pub(crate) async fn count(
    db: &Database,
    query: crate::db::SqliteQuery<'_>,
    resource: &'static str,
    scope: impl Display,
) -> Result<i64> {
    let row = db.fetch_one(query).await.map_err(db_error(resource, scope))?;
    row.try_get::<i64, _>(0).map_err(Error::internal)
}

/// Tenant that owns the row `id` of `table`, or `NotFound(resource, id)`
///
/// Used by join tables whose tenant is derived from the owning row.
pub(crate) async fn owner_tenant(
    db: &Database,
    table: &'static str,
    resource: &'static str,
    id: uuid::Uuid,
) -> Result<uuid::Uuid> {
    let sql = format!("SELECT tenant_id FROM {table} WHERE id = ?1");
    let row = db
        .fetch_optional(sqlx::query(&sql).bind(id.to_string()))
        .await
        .map_err(db_error(resource, id))?
        .ok_or_else(|| Error::not_found(resource, id))?;
    crate::codec::uuid(&row, "tenant_id")
}
