use super::open_store;
use fabula_store::StoreConfig;

pub async fn run(store: &StoreConfig) -> anyhow::Result<()> {
    println!("🏥 Fabula Doctor\n");
    println!("Store: {}", store.path);
    if let Some(dir) = &store.migrations_dir {
        println!("Migrations: {}", dir.display());
    } else {
        println!("Migrations: embedded");
    }
    println!();

    let db = open_store(store).await?;
    let stats = db.table_stats().await?;
    db.close().await;

    let width = stats.iter().map(|s| s.name.len()).max().unwrap_or(0);
    let mut missing = 0;
    for stat in &stats {
        match stat.rows {
            Some(rows) => println!("  ✅ {:width$}  {rows} rows", stat.name),
            None => {
                missing += 1;
                println!("  ❌ {:width$}  missing", stat.name);
            }
        }
    }

    println!();
    if missing == 0 {
        println!("✅ All {} tables present.", stats.len());
    } else {
        println!("⚠️  {missing} table(s) missing. Run 'fabula migrate'.");
        std::process::exit(1);
    }

    Ok(())
}
