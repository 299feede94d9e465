use anyhow::{Context, Result};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use tracing::{debug, info};

/// Connects and applies every pending migration.
pub async fn init_database(database_url: &str) -> Result<()> {
    info!("Initializing database");
    debug!("Database URL: {}", database_url);

    let db = Database::connect(database_url)
        .await
        .with_context(|| format!("Failed to connect to database '{database_url}'"))?;

    let pending = Migrator::get_pending_migrations(&db).await?.len();
    debug!("{} pending migrations", pending);

    Migrator::up(&db, None)
        .await
        .context("Failed to run database migrations")?;

    info!("Database is up to date, applied {} migrations", pending);
    Ok(())
}
