//! Traversal of parent-pointer trees
//!
//! Locations, factions, lores and events share one table shape: a nullable
//! `parent_id` into the same table and a cached `hierarchy_level`. The
//! recursive queries here are tenant-scoped at every step and carry a depth
//! counter, so a cycle introduced behind the store's back ends the walk at
//! [`MAX_HIERARCHY_DEPTH`] instead of looping.

use crate::codec::ts;
use crate::db::Database;
use crate::error::{db_error, map_internal};
use async_trait::async_trait;
use fabula_core::time::now;
use fabula_core::world::{Hierarchical, MAX_HIERARCHY_DEPTH};
use fabula_core::{Error, Result};
use sqlx::sqlite::SqliteRow;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Tree operations shared by every hierarchical repository
///
/// Implementors supply the table, the selected columns, row decoding and a
/// primary-key lookup; traversal, level derivation and re-parenting come for
/// free.
#[async_trait]
pub trait HierarchicalRepository: Send + Sync {
    /// Node type stored in the table
    type Node: Hierarchical + Send + Sync + 'static;

    /// Table holding the nodes
    const TABLE: &'static str;
    /// Column list selected for a node
    const COLUMNS: &'static str;

    /// Store handle
    fn database(&self) -> &Database;

    /// Decode one row
    fn decode(row: SqliteRow) -> Result<Self::Node>;

    /// Load one node (`NotFound` when absent or owned by another tenant)
    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Self::Node>;

    /// Set `hierarchy_level` from the node's parent (root = 0)
    ///
    /// The parent must exist in the node's tenant.
    async fn derive_level(&self, node: &mut Self::Node) -> Result<()> {
        let parent = match node.parent_id() {
            Some(parent_id) => Some(self.get_by_id(node.tenant_id(), parent_id).await?),
            None => None,
        };
        node.attach_to(parent.as_ref());
        Ok(())
    }

    /// Direct children, by name
    #[instrument(skip(self))]
    async fn get_children(&self, tenant_id: Uuid, parent_id: Uuid) -> Result<Vec<Self::Node>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE tenant_id = ?1 AND parent_id = ?2 ORDER BY name ASC, id ASC",
            Self::COLUMNS,
            Self::TABLE
        );
        let rows = self
            .database()
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(parent_id.to_string()),
            )
            .await
            .map_err(db_error(<Self::Node as Hierarchical>::RESOURCE, parent_id))?;

        rows.into_iter().map(Self::decode).collect()
    }

    /// Every ancestor of `id`, root first (the node itself is excluded)
    #[instrument(skip(self))]
    async fn get_ancestors(&self, tenant_id: Uuid, id: Uuid) -> Result<Vec<Self::Node>> {
        let sql = format!(
            r#"
            WITH RECURSIVE ancestors(id, parent_id, depth) AS (
                SELECT id, parent_id, 0 FROM {table}
                WHERE tenant_id = ?1 AND id = ?2
                UNION ALL
                SELECT t.id, t.parent_id, a.depth + 1
                FROM {table} t
                JOIN ancestors a ON t.id = a.parent_id
                WHERE t.tenant_id = ?1 AND a.depth < ?3
            )
            SELECT {columns} FROM {table}
            WHERE tenant_id = ?1 AND id != ?2
              AND id IN (SELECT id FROM ancestors WHERE depth > 0)
            ORDER BY hierarchy_level ASC, name ASC
            "#,
            table = Self::TABLE,
            columns = Self::COLUMNS,
        );
        let rows = self
            .database()
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string())
                    .bind(MAX_HIERARCHY_DEPTH),
            )
            .await
            .map_err(db_error(<Self::Node as Hierarchical>::RESOURCE, id))?;

        rows.into_iter().map(Self::decode).collect()
    }

    /// Every descendant of `id`, by level then name (the node itself is excluded)
    #[instrument(skip(self))]
    async fn get_descendants(&self, tenant_id: Uuid, id: Uuid) -> Result<Vec<Self::Node>> {
        let sql = descendants_sql(Self::TABLE, Self::COLUMNS);
        let rows = self
            .database()
            .fetch_all(
                sqlx::query(&sql)
                    .bind(tenant_id.to_string())
                    .bind(id.to_string())
                    .bind(MAX_HIERARCHY_DEPTH),
            )
            .await
            .map_err(db_error(<Self::Node as Hierarchical>::RESOURCE, id))?;

        rows.into_iter().map(Self::decode).collect()
    }

    /// Move `id` under `new_parent` (or make it a root)
    ///
    /// The node's level is recomputed from the new parent and every
    /// descendant is shifted by the same amount, in one transaction. A new
    /// parent that is the node itself or one of its descendants is a
    /// `Conflict`.
    #[instrument(skip(self))]
    async fn reparent(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        new_parent: Option<Uuid>,
    ) -> Result<Self::Node> {
        let resource = <Self::Node as Hierarchical>::RESOURCE;
        let decode: fn(SqliteRow) -> Result<Self::Node> = Self::decode;
        let select_node = format!(
            "SELECT {} FROM {} WHERE tenant_id = ?1 AND id = ?2",
            Self::COLUMNS,
            Self::TABLE
        );
        let select_descendants = descendants_sql(Self::TABLE, Self::COLUMNS);
        let node_update = format!(
            "UPDATE {} SET parent_id = ?3, hierarchy_level = ?4, updated_at = ?5 WHERE tenant_id = ?1 AND id = ?2",
            Self::TABLE
        );
        let level_update = format!(
            "UPDATE {} SET hierarchy_level = ?3 WHERE tenant_id = ?1 AND id = ?2",
            Self::TABLE
        );
        let updated_at = ts(&now());

        let level = self
            .database()
            .with_tx(move |tx| {
                Box::pin(async move {
                    let mut node = sqlx::query(&select_node)
                        .bind(tenant_id.to_string())
                        .bind(id.to_string())
                        .fetch_optional(tx.conn())
                        .await
                        .map_err(db_error(resource, id))?
                        .ok_or_else(|| Error::not_found(resource, id))
                        .and_then(decode)?;
                    let descendants = sqlx::query(&select_descendants)
                        .bind(tenant_id.to_string())
                        .bind(id.to_string())
                        .bind(MAX_HIERARCHY_DEPTH)
                        .fetch_all(tx.conn())
                        .await
                        .map_err(db_error(resource, id))?
                        .into_iter()
                        .map(decode)
                        .collect::<Result<Vec<_>>>()?;

                    let parent = match new_parent {
                        Some(parent_id) if parent_id == id => {
                            return Err(Error::conflict(
                                resource,
                                "a node cannot be its own parent",
                            ));
                        }
                        Some(parent_id) if descendants.iter().any(|d| d.id() == parent_id) => {
                            return Err(Error::conflict(
                                resource,
                                format!("{parent_id} is a descendant of {id}"),
                            ));
                        }
                        Some(parent_id) => Some(
                            sqlx::query(&select_node)
                                .bind(tenant_id.to_string())
                                .bind(parent_id.to_string())
                                .fetch_optional(tx.conn())
                                .await
                                .map_err(db_error(resource, parent_id))?
                                .ok_or_else(|| Error::not_found(resource, parent_id))
                                .and_then(decode)?,
                        ),
                        None => None,
                    };

                    let old_level = node.hierarchy_level();
                    node.attach_to(parent.as_ref());
                    let level = node.hierarchy_level();
                    let delta = level - old_level;

                    sqlx::query(&node_update)
                        .bind(tenant_id.to_string())
                        .bind(id.to_string())
                        .bind(node.parent_id().map(|p| p.to_string()))
                        .bind(level)
                        .bind(updated_at)
                        .execute(tx.conn())
                        .await
                        .map_err(db_error(resource, id))?;

                    if delta != 0 {
                        for descendant in &descendants {
                            sqlx::query(&level_update)
                                .bind(tenant_id.to_string())
                                .bind(descendant.id().to_string())
                                .bind(descendant.hierarchy_level() + delta)
                                .execute(tx.conn())
                                .await
                                .map_err(map_internal)?;
                        }
                    }
                    Ok(level)
                })
            })
            .await?;

        debug!(resource, %id, level, "Node re-parented");
        self.get_by_id(tenant_id, id).await
    }
}

fn descendants_sql(table: &str, columns: &str) -> String {
    format!(
        r#"
        WITH RECURSIVE descendants(id, depth) AS (
            SELECT id, 0 FROM {table}
            WHERE tenant_id = ?1 AND id = ?2
            UNION ALL
            SELECT t.id, d.depth + 1
            FROM {table} t
            JOIN descendants d ON t.parent_id = d.id
            WHERE t.tenant_id = ?1 AND d.depth < ?3
        )
        SELECT {columns} FROM {table}
        WHERE tenant_id = ?1 AND id != ?2
          AND id IN (SELECT id FROM descendants WHERE depth > 0)
        ORDER BY hierarchy_level ASC, name ASC
        "#
    )
}

/// Reorder `nodes` depth-first, keeping the input order among siblings
///
/// Nodes whose parent is not in the set are treated as roots. Nodes caught in
/// a cycle are unreachable from any root and are appended at the end.
pub(crate) fn depth_first<N: Hierarchical>(nodes: Vec<N>) -> Vec<N> {
    let ids: HashSet<Uuid> = nodes.iter().map(Hierarchical::id).collect();
    let mut children: HashMap<Option<Uuid>, Vec<usize>> = HashMap::new();
    for (i, node) in nodes.iter().enumerate() {
        let parent = node.parent_id().filter(|p| ids.contains(p));
        children.entry(parent).or_default().push(i);
    }

    let mut visited = vec![false; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    let mut stack: Vec<usize> = children
        .get(&None)
        .map(|roots| roots.iter().rev().copied().collect())
        .unwrap_or_default();
    while let Some(i) = stack.pop() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        order.push(i);
        if let Some(kids) = children.get(&Some(nodes[i].id())) {
            stack.extend(kids.iter().rev().copied());
        }
    }
    order.extend((0..nodes.len()).filter(|&i| !visited[i]));

    let mut slots: Vec<Option<N>> = nodes.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabula_core::world::Location;

    #[test]
    fn test_depth_first_order() {
        let tenant = Uuid::new_v4();
        let world = Uuid::new_v4();
        let north = Location::new(tenant, world, "North");
        let south = Location::new(tenant, world, "South");
        let mut city = Location::new(tenant, world, "City");
        city.attach_to(Some(&north));
        let mut port = Location::new(tenant, world, "Port");
        port.attach_to(Some(&south));

        let flat = vec![north.clone(), south.clone(), city.clone(), port.clone()];
        let names: Vec<_> = depth_first(flat).into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["North", "City", "South", "Port"]);
    }

    #[test]
    fn test_depth_first_keeps_cycles() {
        let tenant = Uuid::new_v4();
        let world = Uuid::new_v4();
        let mut a = Location::new(tenant, world, "A");
        let mut b = Location::new(tenant, world, "B");
        a.parent_id = Some(b.id);
        b.parent_id = Some(a.id);

        assert_eq!(depth_first(vec![a, b]).len(), 2);
    }
}
