//! Entity relation repository
//!
//! Relations are directed edges between two entities of a world. A relation
//! created through [`EntityRelationRepository::create_with_mirror`] gets a
//! reverse edge in the same transaction, and the two rows point at each other
//! through `mirror_id`. Deleting either half removes both.
//!
//! The list methods page with an opaque [`Cursor`] over `(created_at, id)`.

use super::{count, expect_rows};
use crate::codec::{json_object, json_text, opt_id, opt_text, opt_uuid, parse, text, timestamp, ts, uuid};
use crate::db::{Database, SqliteQuery};
use crate::error::{db_error, unique_error};
use fabula_core::relation::{EntityRelation, RelationQuery};
use fabula_core::{Cursor, EntityType, Error, ListResult, Result};
use sqlx::sqlite::SqliteRow;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const COLUMNS: &str = "id, tenant_id, world_id, source_type, source_id, target_type, target_id, relation_type, context_type, context_id, attributes, summary, mirror_id, created_by_user_id, created_at, updated_at";

fn row_to_relation(row: SqliteRow) -> Result<EntityRelation> {
    Ok(EntityRelation {
        id: uuid(&row, "id")?,
        tenant_id: uuid(&row, "tenant_id")?,
        world_id: uuid(&row, "world_id")?,
        source_type: parse(&row, "source_type")?,
        source_id: uuid(&row, "source_id")?,
        target_type: parse(&row, "target_type")?,
        target_id: uuid(&row, "target_id")?,
        relation_type: text(&row, "relation_type")?,
        context_type: opt_text(&row, "context_type")?,
        context_id: opt_uuid(&row, "context_id")?,
        attributes: json_object(&row, "attributes"),
        summary: text(&row, "summary")?,
        mirror_id: opt_uuid(&row, "mirror_id")?,
        created_by_user_id: opt_uuid(&row, "created_by_user_id")?,
        created_at: timestamp(&row, "created_at")?,
        updated_at: timestamp(&row, "updated_at")?,
    })
}

fn bind_insert(rel: &EntityRelation) -> SqliteQuery<'static> {
    sqlx::query(
        r#"
        INSERT INTO entity_relations (
            id, tenant_id, world_id, source_type, source_id, target_type, target_id,
            relation_type, context_type, context_id, attributes, summary, mirror_id,
            created_by_user_id, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        "#,
    )
    .bind(rel.id.to_string())
    .bind(rel.tenant_id.to_string())
    .bind(rel.world_id.to_string())
    .bind(rel.source_type.as_str())
    .bind(rel.source_id.to_string())
    .bind(rel.target_type.as_str())
    .bind(rel.target_id.to_string())
    .bind(rel.relation_type.clone())
    .bind(rel.context_type.clone())
    .bind(opt_id(rel.context_id))
    .bind(json_text(&rel.attributes))
    .bind(rel.summary.clone())
    .bind(opt_id(rel.mirror_id))
    .bind(opt_id(rel.created_by_user_id))
    .bind(ts(&rel.created_at))
    .bind(ts(&rel.updated_at))
}

fn bind_update(rel: &EntityRelation) -> SqliteQuery<'static> {
    sqlx::query(
        r#"
        UPDATE entity_relations
        SET relation_type = ?3, context_type = ?4, context_id = ?5, attributes = ?6,
            summary = ?7, updated_at = ?8
        WHERE tenant_id = ?1 AND id = ?2
        "#,
    )
    .bind(rel.tenant_id.to_string())
    .bind(rel.id.to_string())
    .bind(rel.relation_type.clone())
    .bind(rel.context_type.clone())
    .bind(opt_id(rel.context_id))
    .bind(json_text(&rel.attributes))
    .bind(rel.summary.clone())
    .bind(ts(&rel.updated_at))
}

/// Which endpoint a cursor list is anchored on
enum Scope {
    Source(EntityType, Uuid),
    Target(EntityType, Uuid),
    World(Uuid),
}

impl Scope {
    fn describe(&self) -> String {
        match self {
            Self::Source(kind, id) => format!("source {kind}/{id}"),
            Self::Target(kind, id) => format!("target {kind}/{id}"),
            Self::World(id) => format!("world {id}"),
        }
    }
}

/// The relation graph
#[derive(Clone)]
pub struct EntityRelationRepository {
    db: Database,
}

impl EntityRelationRepository {
    /// Create a repository over `db`
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a single relation
    ///
    /// A duplicate `(source, relation_type, target)` in the same world is
    /// reported as `AlreadyExists` keyed by the relation's natural key.
    #[instrument(skip(self, rel), fields(relation_id = %rel.id, relation_type = %rel.relation_type))]
    pub async fn create(&self, rel: &EntityRelation) -> Result<()> {
        rel.validate()?;
        self.db
            .execute(bind_insert(rel))
            .await
            .map_err(unique_error("entity_relation", "relation", rel.natural_key()))?;

        debug!("Entity relation created");
        Ok(())
    }

    /// Insert a relation together with its reverse edge
    ///
    /// Both rows are written in one transaction: the relation without a
    /// mirror, then the mirror pointing back, then the relation is patched to
    /// point at the mirror. On success `rel.mirror_id` holds the mirror's id
    /// and the mirror row is returned. On failure nothing is written and
    /// `rel` is left as the caller passed it.
    #[instrument(skip(self, rel), fields(relation_id = %rel.id, relation_type = %rel.relation_type))]
    pub async fn create_with_mirror(&self, rel: &mut EntityRelation) -> Result<EntityRelation> {
        rel.validate()?;

        let mut primary = rel.clone();
        primary.mirror_id = None;
        let mirror = primary.mirror();

        let (first, second) = (primary, mirror.clone());
        self.db
            .with_tx(move |tx| {
                Box::pin(async move {
                    bind_insert(&first)
                        .execute(tx.conn())
                        .await
                        .map_err(unique_error("entity_relation", "relation", first.natural_key()))?;
                    bind_insert(&second)
                        .execute(tx.conn())
                        .await
                        .map_err(unique_error(
                            "entity_relation",
                            "relation",
                            second.natural_key(),
                        ))?;
                    sqlx::query("UPDATE entity_relations SET mirror_id = ?1 WHERE id = ?2")
                        .bind(second.id.to_string())
                        .bind(first.id.to_string())
                        .execute(tx.conn())
                        .await
                        .map_err(db_error("entity_relation", first.id))?;
                    Ok(())
                })
            })
            .await?;

        rel.mirror_id = Some(mirror.id);
        info!(mirror_id = %mirror.id, mirror_type = %mirror.relation_type, "Mirrored relation created");
        Ok(mirror)
    }

    /// Fetch a relation
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<EntityRelation> {
        let sql = format!("SELECT {COLUMNS} FROM entity_relations WHERE tenant_id = ?1 AND id = ?2");
        let row = self
            .db
            .fetch_optional(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string()),
            )
            .await
            .map_err(db_error("entity_relation", id))?
            .ok_or_else(|| Error::not_found("entity_relation", id))?;
        row_to_relation(row)
    }

    /// Update type, context, attributes and summary (endpoints are fixed)
    ///
    /// When the row has a mirror, the mirror is rewritten in the same
    /// transaction with the inverse type and the same payload.
    #[instrument(skip(self, rel), fields(relation_id = %rel.id))]
    pub async fn update(&self, rel: &EntityRelation) -> Result<()> {
        rel.validate()?;
        let rel = rel.clone();
        let mirror_id = self
            .db
            .with_tx(move |tx| {
                Box::pin(async move {
                    let row = sqlx::query(
                        "SELECT mirror_id FROM entity_relations WHERE tenant_id = ?1 AND id = ?2",
                    )
                    .bind(rel.tenant_id.to_string())
                    .bind(rel.id.to_string())
                    .fetch_optional(tx.conn())
                    .await
                    .map_err(db_error("entity_relation", rel.id))?
                    .ok_or_else(|| Error::not_found("entity_relation", rel.id))?;
                    let mirror_id = opt_uuid(&row, "mirror_id")?;

                    let result = bind_update(&rel)
                        .execute(tx.conn())
                        .await
                        .map_err(unique_error("entity_relation", "relation", rel.natural_key()))?;
                    expect_rows(result, "entity_relation", rel.id)?;

                    if let Some(mirror_id) = mirror_id {
                        let mut mirror = rel.mirror();
                        mirror.id = mirror_id;
                        let result = bind_update(&mirror)
                            .execute(tx.conn())
                            .await
                            .map_err(unique_error(
                                "entity_relation",
                                "relation",
                                mirror.natural_key(),
                            ))?;
                        expect_rows(result, "entity_relation", mirror_id)?;
                    }
                    Ok(mirror_id)
                })
            })
            .await?;

        debug!(?mirror_id, "Relation updated");
        Ok(())
    }

    /// Relations leaving an entity
    pub async fn list_by_source(
        &self,
        tenant_id: Uuid,
        source_type: EntityType,
        source_id: Uuid,
        query: &RelationQuery,
    ) -> Result<ListResult<EntityRelation>> {
        self.list_page(tenant_id, Scope::Source(source_type, source_id), query)
            .await
    }

    /// Relations arriving at an entity
    pub async fn list_by_target(
        &self,
        tenant_id: Uuid,
        target_type: EntityType,
        target_id: Uuid,
        query: &RelationQuery,
    ) -> Result<ListResult<EntityRelation>> {
        self.list_page(tenant_id, Scope::Target(target_type, target_id), query)
            .await
    }

    /// Every relation of a world
    pub async fn list_by_world(
        &self,
        tenant_id: Uuid,
        world_id: Uuid,
        query: &RelationQuery,
    ) -> Result<ListResult<EntityRelation>> {
        self.list_page(tenant_id, Scope::World(world_id), query).await
    }

    /// Number of relations leaving an entity (mirror halves included)
    pub async fn count_by_source(
        &self,
        tenant_id: Uuid,
        source_type: EntityType,
        source_id: Uuid,
    ) -> Result<i64> {
        count(
            &self.db,
            sqlx::query(
                "SELECT COUNT(*) FROM entity_relations WHERE tenant_id = ?1 AND source_type = ?2 AND source_id = ?3",
            )
            .bind(tenant_id.to_string())
            .bind(source_type.as_str())
            .bind(source_id.to_string()),
            "entity_relation",
            source_id,
        )
        .await
    }

    /// Delete a relation and its mirror (`NotFound` when absent)
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        let rel = self.get_by_id(tenant_id, id).await?;
        let mirror_id = rel.mirror_id;

        let removed = self
            .db
            .with_tx(move |tx| {
                Box::pin(async move {
                    let mut removed = sqlx::query(
                        "DELETE FROM entity_relations WHERE tenant_id = ?1 AND id = ?2",
                    )
                    .bind(tenant_id.to_string())
                    .bind(id.to_string())
                    .execute(tx.conn())
                    .await
                    .map_err(db_error("entity_relation", id))?
                    .rows_affected();

                    if let Some(mirror_id) = mirror_id {
                        removed += sqlx::query(
                            "DELETE FROM entity_relations WHERE tenant_id = ?1 AND id = ?2",
                        )
                        .bind(tenant_id.to_string())
                        .bind(mirror_id.to_string())
                        .execute(tx.conn())
                        .await
                        .map_err(db_error("entity_relation", mirror_id))?
                        .rows_affected();
                    }
                    Ok(removed)
                })
            })
            .await?;

        debug!(removed, "Entity relation deleted");
        Ok(())
    }

    /// Delete every relation that has the entity as source or target
    #[instrument(skip(self))]
    pub async fn delete_by_entity(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<u64> {
        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    DELETE FROM entity_relations
                    WHERE tenant_id = ?1
                      AND ((source_type = ?2 AND source_id = ?3) OR (target_type = ?2 AND target_id = ?3))
                    "#,
                )
                .bind(tenant_id.to_string())
                .bind(entity_type.as_str())
                .bind(entity_id.to_string()),
            )
            .await
            .map_err(db_error("entity_relation", entity_id))?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Cursor pagination
    // =========================================================================

    #[instrument(skip(self, scope, query), fields(scope = %scope.describe(), limit = query.limit))]
    async fn list_page(
        &self,
        tenant_id: Uuid,
        scope: Scope,
        query: &RelationQuery,
    ) -> Result<ListResult<EntityRelation>> {
        let limit = query.resolved_limit()?;
        let order_by = query.resolved_order_by()?;
        let cursor = query.cursor.as_deref().map(Cursor::decode).transpose()?;

        let mut conditions = vec!["tenant_id = ?".to_string()];
        let mut args = vec![tenant_id.to_string()];
        match &scope {
            Scope::Source(kind, id) => {
                conditions.push("source_type = ? AND source_id = ?".into());
                args.push(kind.as_str().to_string());
                args.push(id.to_string());
            }
            Scope::Target(kind, id) => {
                conditions.push("target_type = ? AND target_id = ?".into());
                args.push(kind.as_str().to_string());
                args.push(id.to_string());
            }
            Scope::World(id) => {
                conditions.push("world_id = ?".into());
                args.push(id.to_string());
            }
        }
        if let Some(relation_type) = &query.relation_type {
            conditions.push("relation_type = ?".into());
            args.push(relation_type.clone());
        }
        if query.exclude_mirrors {
            conditions.push("(mirror_id IS NULL OR id < mirror_id)".into());
        }
        if let Some(cursor) = &cursor {
            conditions.push(format!(
                "({order_by}, id) {} (?, ?)",
                query.direction.after_operator()
            ));
            args.push(cursor.created_at_key());
            args.push(cursor.id.to_string());
        }

        let direction = query.direction.as_sql();
        let sql = format!(
            "SELECT {COLUMNS} FROM entity_relations WHERE {} ORDER BY {order_by} {direction}, id {direction} LIMIT ?",
            conditions.join(" AND "),
        );

        let mut statement = sqlx::query(&sql);
        for arg in args {
            statement = statement.bind(arg);
        }
        statement = statement.bind(limit + 1);

        let rows = self
            .db
            .fetch_all(statement)
            .await
            .map_err(db_error("entity_relation", scope.describe()))?;
        let mut items = rows
            .into_iter()
            .map(row_to_relation)
            .collect::<Result<Vec<_>>>()?;

        let has_more = items.len() as i64 > limit;
        if has_more {
            items.truncate(limit as usize);
        }
        let next_cursor = if has_more {
            items
                .last()
                .map(|last| Cursor::new(last.created_at, last.id).encode())
        } else {
            None
        };

        Ok(ListResult {
            items,
            has_more,
            next_cursor,
        })
    }
}
