use super::open_store;
use anyhow::Context;
use clap::Subcommand;
use fabula_core::Tenant;
use fabula_store::repos::TenantRepository;
use fabula_store::StoreConfig;

#[derive(Subcommand, Debug)]
pub enum TenantCommand {
    /// Create a tenant
    Create {
        /// Unique tenant name
        name: String,
    },
    /// List tenants, newest first
    List {
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
}

pub async fn run(store: &StoreConfig, command: TenantCommand) -> anyhow::Result<()> {
    let db = open_store(store).await?;
    let tenants = TenantRepository::new(db.clone());

    match command {
        TenantCommand::Create { name } => {
            let tenant = Tenant::new(name);
            tenants
                .create(&tenant)
                .await
                .with_context(|| format!("Failed to create tenant '{}'", tenant.name))?;
            println!("✅ Created tenant {} ({})", tenant.name, tenant.id);
        }
        TenantCommand::List { limit, offset } => {
            let total = tenants.count().await?;
            let page = tenants.list(limit, offset).await?;
            for tenant in &page {
                println!(
                    "{}  {:<8}  {}  {}",
                    tenant.id,
                    tenant.status,
                    tenant.created_at.format("%Y-%m-%d %H:%M"),
                    tenant.name
                );
            }
            println!("\n{} of {total} tenant(s)", page.len());
        }
    }

    db.close().await;
    Ok(())
}
