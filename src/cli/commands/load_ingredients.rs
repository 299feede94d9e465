use anyhow::{Context, Result};
use model::entities::ingredient;
use sea_orm::{ConnectionTrait, Database, EntityTrait, QuerySelect, Set, TransactionTrait};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// One catalog entry of the ingredient fixture
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct IngredientRecord {
    pub name: String,
    pub measurement_unit: String,
}

pub async fn load_ingredients(json_path: &str, database_url: &str) -> Result<()> {
    info!("Loading ingredients from {}", json_path);

    let raw = tokio::fs::read_to_string(Path::new(json_path))
        .await
        .with_context(|| format!("Failed to read {json_path}"))?;
    let records = parse_records(&raw)?;
    debug!("Parsed {} ingredient records", records.len());

    let db = Database::connect(database_url)
        .await
        .with_context(|| format!("Failed to connect to database '{database_url}'"))?;

    let txn = db.begin().await?;
    let inserted = import_records(&txn, records).await?;
    txn.commit().await?;

    info!("Loaded {} new ingredients", inserted);
    Ok(())
}

pub fn parse_records(raw: &str) -> Result<Vec<IngredientRecord>> {
    serde_json::from_str(raw).context("Ingredient file must be a JSON array of {name, measurement_unit}")
}

/// Inserts records that are not in the catalog yet. Returns how many were inserted.
pub async fn import_records<C>(db: &C, records: Vec<IngredientRecord>) -> Result<usize>
where
    C: ConnectionTrait,
{
    let mut known: HashSet<(String, String)> = ingredient::Entity::find()
        .select_only()
        .column(ingredient::Column::Name)
        .column(ingredient::Column::MeasurementUnit)
        .into_tuple::<(String, String)>()
        .all(db)
        .await?
        .into_iter()
        .collect();

    let mut fresh = Vec::new();
    for record in records {
        let name = record.name.trim().to_string();
        let unit = record.measurement_unit.trim().to_string();
        if name.is_empty() || unit.is_empty() {
            warn!("Skipping ingredient with an empty name or unit: {:?}", record);
            continue;
        }
        if known.insert((name.clone(), unit.clone())) {
            fresh.push(ingredient::ActiveModel {
                name: Set(name),
                measurement_unit: Set(unit),
                ..Default::default()
            });
        }
    }

    let count = fresh.len();
    // Chunked to stay below SQLite's bound parameter limit
    for chunk in fresh.chunks(500) {
        ingredient::Entity::insert_many(chunk.to_vec()).exec(db).await?;
    }
    Ok(count)
}
