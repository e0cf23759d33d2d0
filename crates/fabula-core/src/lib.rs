//! Fabula Core - Domain model
//!
//! This crate provides the domain types for the Fabula persistence layer:
//! - Tenant: top-level isolation boundary
//! - World: worlds and the entities living in them (characters, locations, factions, ...)
//! - Story: versioned stories with chapters, scenes, beats and content blocks
//! - Relation: the tenant-scoped entity relation graph with mirror edges
//! - Error / Cursor / Pagination: the contract shared by every repository

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cursor;
pub mod entity_type;
pub mod error;
pub mod pagination;
pub mod relation;
pub mod story;
pub mod tenant;
pub mod time;
pub mod world;

pub use cursor::Cursor;
pub use entity_type::EntityType;
pub use error::{Error, Result};
pub use pagination::{ListResult, Page, SortDirection, DEFAULT_LIMIT, MAX_LIMIT};
pub use relation::{inverse_relation_type, EntityRelation, RelationQuery};
pub use tenant::{Tenant, TenantStatus};
