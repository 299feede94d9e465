use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use model::entities::favorite_recipe;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use tracing::{info, instrument};

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult, unique_as_bad_request};
use crate::handlers::recipes::{ShortRecipeResponse, find_recipe};
use crate::schemas::AppState;

const ALREADY_FAVORITED: &str = "Recipe is already in favorites.";

/// Add a recipe to favorites
#[utoipa::path(
    post,
    path = "/api/recipes/{recipe_id}/favorite/",
    params(
        ("recipe_id" = i32, Path, description = "Recipe ID")
    ),
    responses(
        (status = 201, description = "Recipe added to favorites", body = ShortRecipeResponse),
        (status = 400, description = "Already in favorites", body = crate::schemas::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::schemas::ErrorResponse),
        (status = 404, description = "Recipe not found", body = crate::schemas::ErrorResponse)
    ),
    tag = "favorites"
)]
#[instrument(skip(state, me), fields(user_id = me.id))]
pub async fn add_favorite(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(recipe_id): Path<i32>,
) -> ApiResult<(StatusCode, Json<ShortRecipeResponse>)> {
    let recipe = find_recipe(&state.db, recipe_id).await?;

    let existing = favorite_recipe::Entity::find()
        .filter(favorite_recipe::Column::UserId.eq(me.id))
        .filter(favorite_recipe::Column::RecipeId.eq(recipe.id))
        .count(&state.db)
        .await?;
    if existing > 0 {
        return Err(ApiError::BadRequest(ALREADY_FAVORITED.to_string()));
    }

    favorite_recipe::ActiveModel {
        user_id: Set(me.id),
        recipe_id: Set(recipe.id),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(|e| unique_as_bad_request(e, ALREADY_FAVORITED))?;

    info!("User {} favorited recipe {}", me.id, recipe.id);
    Ok((
        StatusCode::CREATED,
        Json(ShortRecipeResponse::new(&recipe, &state.settings.media_url)),
    ))
}

/// Remove a recipe from favorites
#[utoipa::path(
    delete,
    path = "/api/recipes/{recipe_id}/favorite/",
    params(
        ("recipe_id" = i32, Path, description = "Recipe ID")
    ),
    responses(
        (status = 204, description = "Recipe removed from favorites"),
        (status = 401, description = "Not authenticated", body = crate::schemas::ErrorResponse),
        (status = 404, description = "Recipe not found or not in favorites", body = crate::schemas::ErrorResponse)
    ),
    tag = "favorites"
)]
#[instrument(skip(state, me), fields(user_id = me.id))]
pub async fn remove_favorite(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(recipe_id): Path<i32>,
) -> ApiResult<StatusCode> {
    let recipe = find_recipe(&state.db, recipe_id).await?;

    let result = favorite_recipe::Entity::delete_many()
        .filter(favorite_recipe::Column::UserId.eq(me.id))
        .filter(favorite_recipe::Column::RecipeId.eq(recipe.id))
        .exec(&state.db)
        .await?;
    if result.rows_affected == 0 {
        return Err(ApiError::NotFound("Recipe is not in favorites.".to_string()));
    }

    info!("User {} removed recipe {} from favorites", me.id, recipe.id);
    Ok(StatusCode::NO_CONTENT)
}
