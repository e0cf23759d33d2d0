use anyhow::Context;
use fabula_store::{Database, MigrationSource, Migrator, StoreConfig};
use std::path::PathBuf;
use tracing::info;

pub async fn run(store: &StoreConfig, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let source = match dir.or_else(|| store.migrations_dir.clone()) {
        Some(dir) => MigrationSource::Directory(dir),
        None => MigrationSource::Embedded,
    };

    let db = Database::open(store)
        .await
        .with_context(|| format!("Failed to open store at {}", store.path))?;
    let report = Migrator::new(source.clone())
        .run(&db)
        .await
        .context("Migration failed")?;
    db.close().await;

    info!(?source, "Migrations applied");
    println!("📦 Fabula Migrate\n");
    println!("Store:      {}", store.path);
    for file in &report.files_applied {
        println!("  ✅ {file}");
    }
    println!();
    println!("Statements executed:   {}", report.statements_executed);
    println!("Statements suppressed: {}", report.statements_suppressed);

    Ok(())
}
