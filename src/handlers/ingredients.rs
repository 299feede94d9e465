use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use model::entities::ingredient;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::auth::AdminUser;
use crate::helpers::{json::ApiJson, query::ApiQuery};
use crate::error::{ApiError, ApiResult};
use crate::schemas::{AppState, CachedData, INGREDIENTS_CACHE_KEY};

/// Request structure for creating a catalog ingredient
#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct CreateIngredientRequest {
    #[validate(length(min = 1, max = 100, message = "Ensure this field has 1 to 100 characters."))]
    pub name: String,
    #[validate(length(min = 1, max = 50, message = "Ensure this field has 1 to 50 characters."))]
    pub measurement_unit: String,
}

/// Request structure for updating a catalog ingredient
#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct UpdateIngredientRequest {
    #[validate(length(min = 1, max = 100, message = "Ensure this field has 1 to 100 characters."))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 50, message = "Ensure this field has 1 to 50 characters."))]
    pub measurement_unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngredientResponse {
    pub id: i32,
    pub name: String,
    pub measurement_unit: String,
}

impl From<ingredient::Model> for IngredientResponse {
    fn from(model: ingredient::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            measurement_unit: model.measurement_unit,
        }
    }
}

/// Prefix search over ingredient names
#[derive(Debug, Deserialize, IntoParams, Validate)]
pub struct IngredientSearchQuery {
    /// Case-insensitive name prefix
    #[validate(length(max = 100))]
    pub name: Option<String>,
}

/// Search the ingredient catalog
#[utoipa::path(
    get,
    path = "/api/ingredients/",
    params(IngredientSearchQuery),
    responses(
        (status = 200, description = "Matching ingredients", body = Vec<IngredientResponse>),
        (status = 400, description = "Invalid query", body = crate::schemas::ErrorResponse)
    ),
    tag = "ingredients"
)]
#[instrument(skip(state))]
pub async fn list_ingredients(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<IngredientSearchQuery>,
) -> ApiResult<Json<Vec<IngredientResponse>>> {
    query.validate()?;
    let catalog = load_ingredients(&state).await?;
    let matches: Vec<IngredientResponse> = match query.name.as_deref() {
        Some(prefix) if !prefix.is_empty() => filter_by_prefix(&catalog, prefix),
        _ => catalog.as_ref().clone(),
    };

    debug!("Ingredient search matched {} of {}", matches.len(), catalog.len());
    Ok(Json(matches))
}

/// Get an ingredient by ID
#[utoipa::path(
    get,
    path = "/api/ingredients/{ingredient_id}/",
    params(
        ("ingredient_id" = i32, Path, description = "Ingredient ID")
    ),
    responses(
        (status = 200, description = "Ingredient details", body = IngredientResponse),
        (status = 404, description = "Ingredient not found", body = crate::schemas::ErrorResponse)
    ),
    tag = "ingredients"
)]
#[instrument(skip(state))]
pub async fn get_ingredient(
    State(state): State<AppState>,
    Path(ingredient_id): Path<i32>,
) -> ApiResult<Json<IngredientResponse>> {
    let model = find_ingredient(&state, ingredient_id).await?;
    Ok(Json(IngredientResponse::from(model)))
}

/// Add an ingredient to the catalog (admin only)
#[utoipa::path(
    post,
    path = "/api/ingredients/",
    request_body = CreateIngredientRequest,
    responses(
        (status = 201, description = "Ingredient created", body = IngredientResponse),
        (status = 400, description = "Invalid request data", body = crate::schemas::ErrorResponse),
        (status = 403, description = "Not an admin", body = crate::schemas::ErrorResponse)
    ),
    tag = "ingredients"
)]
#[instrument(skip(state, _admin))]
pub async fn create_ingredient(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiJson(request): ApiJson<CreateIngredientRequest>,
) -> ApiResult<(StatusCode, Json<IngredientResponse>)> {
    request.validate()?;

    let model = ingredient::ActiveModel {
        name: Set(request.name),
        measurement_unit: Set(request.measurement_unit),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    invalidate_ingredients(&state).await;
    info!("Created ingredient with ID: {}", model.id);
    Ok((StatusCode::CREATED, Json(IngredientResponse::from(model))))
}

/// Update a catalog ingredient (admin only)
#[utoipa::path(
    patch,
    path = "/api/ingredients/{ingredient_id}/",
    params(
        ("ingredient_id" = i32, Path, description = "Ingredient ID")
    ),
    request_body = UpdateIngredientRequest,
    responses(
        (status = 200, description = "Ingredient updated", body = IngredientResponse),
        (status = 400, description = "Invalid request data", body = crate::schemas::ErrorResponse),
        (status = 403, description = "Not an admin", body = crate::schemas::ErrorResponse),
        (status = 404, description = "Ingredient not found", body = crate::schemas::ErrorResponse)
    ),
    tag = "ingredients"
)]
#[instrument(skip(state, _admin))]
pub async fn update_ingredient(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(ingredient_id): Path<i32>,
    ApiJson(request): ApiJson<UpdateIngredientRequest>,
) -> ApiResult<Json<IngredientResponse>> {
    request.validate()?;
    let mut active: ingredient::ActiveModel = find_ingredient(&state, ingredient_id).await?.into();

    if let Some(name) = request.name {
        active.name = Set(name);
    }
    if let Some(unit) = request.measurement_unit {
        active.measurement_unit = Set(unit);
    }

    let model = active.update(&state.db).await?;
    invalidate_ingredients(&state).await;
    info!("Updated ingredient {}", model.id);
    Ok(Json(IngredientResponse::from(model)))
}

/// Remove an ingredient from the catalog (admin only)
#[utoipa::path(
    delete,
    path = "/api/ingredients/{ingredient_id}/",
    params(
        ("ingredient_id" = i32, Path, description = "Ingredient ID")
    ),
    responses(
        (status = 204, description = "Ingredient deleted"),
        (status = 403, description = "Not an admin", body = crate::schemas::ErrorResponse),
        (status = 404, description = "Ingredient not found", body = crate::schemas::ErrorResponse)
    ),
    tag = "ingredients"
)]
#[instrument(skip(state, _admin))]
pub async fn delete_ingredient(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(ingredient_id): Path<i32>,
) -> ApiResult<StatusCode> {
    let result = ingredient::Entity::delete_by_id(ingredient_id)
        .exec(&state.db)
        .await?;
    if result.rows_affected == 0 {
        return Err(ApiError::not_found());
    }
    invalidate_ingredients(&state).await;
    info!("Deleted ingredient {}", ingredient_id);
    Ok(StatusCode::NO_CONTENT)
}

// Helper functions

/// Case-insensitive name prefix match, catalog order preserved.
pub fn filter_by_prefix(catalog: &[IngredientResponse], prefix: &str) -> Vec<IngredientResponse> {
    let prefix = prefix.to_lowercase();
    catalog
        .iter()
        .filter(|item| item.name.to_lowercase().starts_with(&prefix))
        .cloned()
        .collect()
}

/// The full ingredient catalog ordered by name, read through the cache.
pub async fn load_ingredients(state: &AppState) -> ApiResult<Arc<Vec<IngredientResponse>>> {
    if let Some(CachedData::Ingredients(items)) = state.cache.get(INGREDIENTS_CACHE_KEY).await {
        return Ok(items);
    }

    let items: Vec<IngredientResponse> = ingredient::Entity::find()
        .order_by_asc(ingredient::Column::Name)
        .order_by_asc(ingredient::Column::Id)
        .all(&state.db)
        .await?
        .into_iter()
        .map(IngredientResponse::from)
        .collect();
    let items = Arc::new(items);
    state
        .cache
        .insert(
            INGREDIENTS_CACHE_KEY.to_string(),
            CachedData::Ingredients(items.clone()),
        )
        .await;
    Ok(items)
}

async fn invalidate_ingredients(state: &AppState) {
    state.cache.invalidate(INGREDIENTS_CACHE_KEY).await;
}

async fn find_ingredient(state: &AppState, ingredient_id: i32) -> ApiResult<ingredient::Model> {
    ingredient::Entity::find_by_id(ingredient_id)
        .one(&state.db)
        .await?
        .ok_or_else(ApiError::not_found)
}
