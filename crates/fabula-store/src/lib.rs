//! Fabula Store - SQLite persistence
//!
//! This crate provides the persistence layer for Fabula:
//! - Database: shared store handle with serialized writers
//! - Migrations: idempotent `*.up.sql` migration engine
//! - Transactions: `begin_tx` / `with_tx` with rollback on error, panic and cancellation
//! - Repositories: one per entity kind, all tenant-scoped
//!
//! It uses sqlx for async SQLite access (embedded, no server required).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod codec;
pub mod config;
pub mod db;
pub mod error;
mod hierarchy;
pub mod migrate;
pub mod repos;
pub mod tx;
pub mod versioning;

pub use config::StoreConfig;
pub use db::{Database, TableStat, SCHEMA_TABLES};
pub use fabula_core::{Error, Result};
pub use hierarchy::HierarchicalRepository;
pub use migrate::{discover_migrations_dir, MigrationReport, MigrationSource, Migrator};
pub use repos::Repositories;
pub use tx::Tx;
pub use versioning::StoryCloner;
