use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Json},
};
use compute::{Selection, ShoppingListComputer, default_renderer, renderer_for};
use model::entities::{shopping_list, shopping_list_recipe};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, Set, TransactionTrait, sea_query::OnConflict,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult, unique_as_bad_request};
use crate::handlers::recipes::{ShortRecipeResponse, find_recipe};
use crate::helpers::query::ApiQuery;
use crate::schemas::AppState;

const ALREADY_IN_CART: &str = "Recipe is already in the shopping cart.";

/// Query parameters of the shopping list download
#[derive(Debug, Default, Serialize, Deserialize, ToSchema, IntoParams, Validate)]
pub struct DownloadQuery {
    /// `pdf` (default) or `txt`
    #[validate(length(min = 1, max = 8))]
    pub format: Option<String>,
    /// Also aggregate favorited recipes (`1`/`true`)
    pub include_favorites: Option<String>,
}

impl DownloadQuery {
    fn selection(&self) -> Selection {
        match self.include_favorites.as_deref() {
            Some("1" | "true" | "True") => Selection::with_favorites(),
            _ => Selection::cart_only(),
        }
    }
}

/// Add a recipe to the shopping cart
#[utoipa::path(
    post,
    path = "/api/recipes/{recipe_id}/shopping_cart/",
    params(
        ("recipe_id" = i32, Path, description = "Recipe ID")
    ),
    responses(
        (status = 201, description = "Recipe added to the cart", body = ShortRecipeResponse),
        (status = 400, description = "Already in the cart", body = crate::schemas::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::schemas::ErrorResponse),
        (status = 404, description = "Recipe not found", body = crate::schemas::ErrorResponse)
    ),
    tag = "shopping_cart"
)]
#[instrument(skip(state, me), fields(user_id = me.id))]
pub async fn add_to_shopping_cart(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(recipe_id): Path<i32>,
) -> ApiResult<(StatusCode, Json<ShortRecipeResponse>)> {
    let recipe = find_recipe(&state.db, recipe_id).await?;

    let txn = state.db.begin().await?;
    let list = get_or_create_list(&txn, me.id).await?;

    let existing = shopping_list_recipe::Entity::find()
        .filter(shopping_list_recipe::Column::ShoppingListId.eq(list.id))
        .filter(shopping_list_recipe::Column::RecipeId.eq(recipe.id))
        .count(&txn)
        .await?;
    if existing > 0 {
        return Err(ApiError::BadRequest(ALREADY_IN_CART.to_string()));
    }

    shopping_list_recipe::ActiveModel {
        shopping_list_id: Set(list.id),
        recipe_id: Set(recipe.id),
    }
    .insert(&txn)
    .await
    .map_err(|e| unique_as_bad_request(e, ALREADY_IN_CART))?;
    txn.commit().await?;

    info!("User {} added recipe {} to the cart", me.id, recipe.id);
    Ok((
        StatusCode::CREATED,
        Json(ShortRecipeResponse::new(&recipe, &state.settings.media_url)),
    ))
}

/// Remove a recipe from the shopping cart
#[utoipa::path(
    delete,
    path = "/api/recipes/{recipe_id}/shopping_cart/",
    params(
        ("recipe_id" = i32, Path, description = "Recipe ID")
    ),
    responses(
        (status = 204, description = "Recipe removed from the cart"),
        (status = 400, description = "Recipe is not in the cart", body = crate::schemas::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::schemas::ErrorResponse),
        (status = 404, description = "Recipe not found", body = crate::schemas::ErrorResponse)
    ),
    tag = "shopping_cart"
)]
#[instrument(skip(state, me), fields(user_id = me.id))]
pub async fn remove_from_shopping_cart(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(recipe_id): Path<i32>,
) -> ApiResult<StatusCode> {
    let recipe = find_recipe(&state.db, recipe_id).await?;
    let not_in_cart = || ApiError::BadRequest("Recipe is not in the shopping cart.".to_string());

    let list = shopping_list::Entity::find()
        .filter(shopping_list::Column::UserId.eq(me.id))
        .one(&state.db)
        .await?
        .ok_or_else(not_in_cart)?;

    let result = shopping_list_recipe::Entity::delete_many()
        .filter(shopping_list_recipe::Column::ShoppingListId.eq(list.id))
        .filter(shopping_list_recipe::Column::RecipeId.eq(recipe.id))
        .exec(&state.db)
        .await?;
    if result.rows_affected == 0 {
        return Err(not_in_cart());
    }

    info!("User {} removed recipe {} from the cart", me.id, recipe.id);
    Ok(StatusCode::NO_CONTENT)
}

/// Download the aggregated shopping list
#[utoipa::path(
    get,
    path = "/api/recipes/download_shopping_cart/",
    params(DownloadQuery),
    responses(
        (status = 200, description = "Shopping list document", content_type = "application/pdf"),
        (status = 400, description = "Unknown format", body = crate::schemas::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::schemas::ErrorResponse)
    ),
    tag = "shopping_cart"
)]
#[instrument(skip(state, me), fields(user_id = me.id))]
pub async fn download_shopping_cart(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    ApiQuery(query): ApiQuery<DownloadQuery>,
) -> ApiResult<impl IntoResponse> {
    query.validate()?;
    let renderer = match query.format.as_deref() {
        None => default_renderer(),
        Some(format) => renderer_for(format)
            .ok_or_else(|| ApiError::field("format", format!("Unsupported format \"{format}\".")))?,
    };

    let list = ShoppingListComputer::new()
        .compute_for_user(&state.db, me.id, query.selection())
        .await?;
    let title = format!("Shopping list of {}", me.username);
    let body = renderer.render(&title, &list)?;
    debug!("Rendered {} bytes for {} items", body.len(), list.len());

    let filename = attachment_name(&me.username, renderer.file_extension());
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(renderer.content_type()));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
            .map_err(|e| ApiError::Internal(e.to_string()))?,
    );

    Ok((StatusCode::OK, headers, body))
}

// Helper functions

async fn get_or_create_list<C>(db: &C, user_id: i32) -> Result<shopping_list::Model, DbErr>
where
    C: ConnectionTrait,
{
    if let Some(list) = find_list(db, user_id).await? {
        return Ok(list);
    }
    create_list(db, user_id).await
}

async fn find_list<C>(db: &C, user_id: i32) -> Result<Option<shopping_list::Model>, DbErr>
where
    C: ConnectionTrait,
{
    shopping_list::Entity::find()
        .filter(shopping_list::Column::UserId.eq(user_id))
        .one(db)
        .await
}

/// Inserts the user's list unless another request already did, then returns the stored row.
async fn create_list<C>(db: &C, user_id: i32) -> Result<shopping_list::Model, DbErr>
where
    C: ConnectionTrait,
{
    debug!("Creating shopping list for user {}", user_id);
    let list = shopping_list::ActiveModel {
        user_id: Set(user_id),
        ..Default::default()
    };
    shopping_list::Entity::insert(list)
        .on_conflict(
            OnConflict::column(shopping_list::Column::UserId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    find_list(db, user_id)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("shopping list of user {user_id}")))
}

/// Usernames may only contain `[\w.@+-]`, but quotes are stripped anyway.
fn attachment_name(username: &str, extension: &str) -> String {
    let safe: String = username
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '@' | '+' | '-' | '_'))
        .collect();
    format!("{safe}_shopping_cart.{extension}")
}
