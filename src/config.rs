use anyhow::Result;
use config::{Config, ConfigError, Environment};
use moka::future::Cache;
use sea_orm::{Database, DatabaseConnection};
use serde::Deserialize;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::schemas::AppState;

const DEVELOPMENT_SECRET: &str = "foodgram-development-secret";

/// Application settings read from `FOODGRAM_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// HMAC secret for signing JWTs
    pub jwt_secret: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_hours: i64,
    /// Default page size of paginated lists
    pub page_size: u64,
    /// Directory uploaded images are written to
    pub media_root: PathBuf,
    /// Public URL prefix of `media_root`
    pub media_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            jwt_secret: DEVELOPMENT_SECRET.to_string(),
            access_token_ttl_minutes: 5,
            refresh_token_ttl_hours: 24,
            page_size: 6,
            media_root: PathBuf::from("media"),
            media_url: "/media/".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the environment on top of the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Settings::default();
        let settings: Settings = Config::builder()
            .set_default("jwt_secret", defaults.jwt_secret)?
            .set_default("access_token_ttl_minutes", defaults.access_token_ttl_minutes)?
            .set_default("refresh_token_ttl_hours", defaults.refresh_token_ttl_hours)?
            .set_default("page_size", defaults.page_size)?
            .set_default("media_root", defaults.media_root.to_string_lossy().to_string())?
            .set_default("media_url", defaults.media_url)?
            .add_source(Environment::with_prefix("FOODGRAM").try_parsing(true))
            .build()?
            .try_deserialize()?;

        if settings.jwt_secret == DEVELOPMENT_SECRET {
            warn!("FOODGRAM_JWT_SECRET is not set, using the development secret");
        }
        Ok(settings)
    }
}

/// Build the shared state around an open connection.
pub fn build_app_state(db: DatabaseConnection, settings: Settings) -> AppState {
    let cache = Cache::builder()
        .max_capacity(1000)
        .time_to_live(Duration::from_secs(300)) // 5 minutes
        .build();

    AppState {
        db,
        cache,
        settings: Arc::new(settings),
    }
}

/// Initialize application configuration and state for the given database
pub async fn initialize_app_state_with_url(database_url: &str) -> Result<AppState> {
    let settings = Settings::load()?;
    debug!("Loaded settings: page_size={}, media_root={}", settings.page_size, settings.media_root.display());

    info!("Connecting to database: {}", database_url);
    let db = Database::connect(database_url).await?;

    tokio::fs::create_dir_all(&settings.media_root).await?;

    Ok(build_app_state(db, settings))
}
