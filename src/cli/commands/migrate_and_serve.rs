use anyhow::Result;
use tracing::info;

use super::{init_database, serve};

pub async fn migrate_and_serve(database_url: &str, bind_address: &str) -> Result<()> {
    info!("Applying database migrations before starting the server");
    init_database(database_url).await?;
    serve(database_url, bind_address).await
}
