use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use model::entities::{
    favorite_recipe, ingredient, ingredient_amount, recipe, recipe_tag, shopping_list,
    shopping_list_recipe, tag, user,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, instrument, trace};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::{CurrentUser, MaybeUser, permissions::require_author_or_admin};
use crate::error::{ApiError, ApiResult, FieldErrors};
use crate::handlers::tags::TagResponse;
use crate::handlers::users::UserResponse;
use crate::helpers::{
    images::{decode_data_url, image_url, remove_image, save_image},
    json::ApiJson,
    pagination::{PageRequest, paginate},
    viewer::Viewer,
};
use crate::schemas::{AppState, PaginatedRecipes};

/// One ingredient line of a recipe write request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngredientAmountRequest {
    /// Ingredient ID from the catalog
    pub id: i32,
    pub amount: i32,
}

/// Request structure for publishing a recipe
#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct CreateRecipeRequest {
    pub ingredients: Vec<IngredientAmountRequest>,
    /// Tag IDs
    #[validate(length(min = 1, message = "This list may not be empty."))]
    pub tags: Vec<i32>,
    /// `data:image/<ext>;base64,<payload>`
    pub image: Option<String>,
    #[validate(length(min = 1, max = 200, message = "Ensure this field has 1 to 200 characters."))]
    pub name: String,
    #[validate(length(min = 1, message = "This field may not be blank."))]
    pub text: String,
    /// Minutes
    #[validate(range(min = 1, message = "Ensure this value is greater than or equal to 1."))]
    pub cooking_time: i32,
}

/// Partial recipe update; `ingredients` and `tags` replace the current sets when present
#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct UpdateRecipeRequest {
    pub ingredients: Option<Vec<IngredientAmountRequest>>,
    #[validate(length(min = 1, message = "This list may not be empty."))]
    pub tags: Option<Vec<i32>>,
    pub image: Option<String>,
    #[validate(length(min = 1, max = 200, message = "Ensure this field has 1 to 200 characters."))]
    pub name: Option<String>,
    #[validate(length(min = 1, message = "This field may not be blank."))]
    pub text: Option<String>,
    #[validate(range(min = 1, message = "Ensure this value is greater than or equal to 1."))]
    pub cooking_time: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecipeIngredientResponse {
    pub id: i32,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

/// Full recipe representation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecipeResponse {
    pub id: i32,
    pub tags: Vec<TagResponse>,
    pub author: UserResponse,
    pub ingredients: Vec<RecipeIngredientResponse>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    /// Public URL of the image
    pub image: Option<String>,
    pub text: String,
    pub cooking_time: i32,
}

/// Compact recipe representation used by favorites, cart and subscriptions
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShortRecipeResponse {
    pub id: i32,
    pub name: String,
    pub image: Option<String>,
    pub cooking_time: i32,
}

impl ShortRecipeResponse {
    pub fn new(model: &recipe::Model, media_url: &str) -> Self {
        Self {
            id: model.id,
            name: model.name.clone(),
            image: model.image.as_deref().map(|path| image_url(media_url, path)),
            cooking_time: model.cooking_time,
        }
    }
}

/// List recipes
#[utoipa::path(
    get,
    path = "/api/recipes/",
    params(
        ("page" = Option<u64>, Query, description = "Page number"),
        ("limit" = Option<u64>, Query, description = "Page size, switches to limit/offset pagination"),
        ("offset" = Option<u64>, Query, description = "Offset for limit/offset pagination"),
        ("tags" = Option<Vec<String>>, Query, description = "Tag slugs, repeatable, any of them matches"),
        ("author" = Option<i32>, Query, description = "Author user ID"),
        ("is_favorited" = Option<String>, Query, description = "`1` to list only the viewer's favorites"),
        ("is_in_shopping_cart" = Option<String>, Query, description = "`1` to list only recipes in the viewer's cart")
    ),
    responses(
        (status = 200, description = "One page of recipes", body = PaginatedRecipes),
        (status = 400, description = "Invalid filter", body = crate::schemas::ErrorResponse),
        (status = 404, description = "Invalid page", body = crate::schemas::ErrorResponse)
    ),
    tag = "recipes"
)]
#[instrument(skip(state, viewer_user))]
pub async fn list_recipes(
    State(state): State<AppState>,
    viewer_user: MaybeUser,
    OriginalUri(uri): OriginalUri,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Json<PaginatedRecipes>> {
    let request = PageRequest::from_pairs(&pairs, state.settings.page_size)?;
    let filters = RecipeFilters::from_pairs(&pairs)?;
    let viewer = Viewer::load(&state.db, viewer_user.id()).await?;

    // Anonymous viewers have no favorites and no cart
    if (filters.is_favorited || filters.is_in_shopping_cart) && !viewer.is_authenticated() {
        debug!("Anonymous viewer asked for personal filters, returning an empty page");
        return Ok(Json(paginate(Vec::new(), 0, &request, uri.path(), &pairs)));
    }

    let mut query = recipe::Entity::find();
    if !filters.tags.is_empty() {
        let tagged = recipe_tag::Entity::find()
            .select_only()
            .column(recipe_tag::Column::RecipeId)
            .inner_join(tag::Entity)
            .filter(tag::Column::Slug.is_in(filters.tags.iter().cloned()))
            .into_query();
        query = query.filter(recipe::Column::Id.in_subquery(tagged));
    }
    if let Some(author_id) = filters.author {
        query = query.filter(recipe::Column::AuthorId.eq(author_id));
    }
    if let Some(user_id) = viewer.user_id {
        if filters.is_favorited {
            let favorites = favorite_recipe::Entity::find()
                .select_only()
                .column(favorite_recipe::Column::RecipeId)
                .filter(favorite_recipe::Column::UserId.eq(user_id))
                .into_query();
            query = query.filter(recipe::Column::Id.in_subquery(favorites));
        }
        if filters.is_in_shopping_cart {
            let cart = shopping_list_recipe::Entity::find()
                .select_only()
                .column(shopping_list_recipe::Column::RecipeId)
                .inner_join(shopping_list::Entity)
                .filter(shopping_list::Column::UserId.eq(user_id))
                .into_query();
            query = query.filter(recipe::Column::Id.in_subquery(cart));
        }
    }

    let count = query.clone().count(&state.db).await?;
    request.check_range(count)?;

    let recipes = query
        .order_by_asc(recipe::Column::Id)
        .offset(request.offset())
        .limit(request.limit())
        .all(&state.db)
        .await?;

    let results =
        build_recipe_responses(&state.db, recipes, &viewer, &state.settings.media_url).await?;
    debug!("Listing {} recipes of {}", results.len(), count);
    Ok(Json(paginate(results, count, &request, uri.path(), &pairs)))
}

/// Publish a recipe
#[utoipa::path(
    post,
    path = "/api/recipes/",
    request_body = CreateRecipeRequest,
    responses(
        (status = 201, description = "Recipe created", body = RecipeResponse),
        (status = 400, description = "Invalid request data", body = crate::schemas::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::schemas::ErrorResponse)
    ),
    tag = "recipes"
)]
#[instrument(skip(state, author, request), fields(author_id = author.id))]
pub async fn create_recipe(
    State(state): State<AppState>,
    CurrentUser(author): CurrentUser,
    ApiJson(request): ApiJson<CreateRecipeRequest>,
) -> ApiResult<(StatusCode, Json<RecipeResponse>)> {
    request.validate()?;
    check_ingredient_lines(&request.ingredients)?;
    let image = request.image.as_deref().map(decode_data_url).transpose()?;

    let image_path = match image {
        Some(image) => Some(save_image(&state.settings.media_root, image).await?),
        None => None,
    };

    let stored = async {
        let txn = state.db.begin().await?;
        ensure_catalog_ids(&txn, &request.ingredients, &request.tags).await?;

        let model = recipe::ActiveModel {
            author_id: Set(author.id),
            name: Set(request.name.clone()),
            image: Set(image_path.clone()),
            text: Set(request.text.clone()),
            cooking_time: Set(request.cooking_time),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        replace_tags(&txn, model.id, &request.tags).await?;
        replace_ingredients(&txn, model.id, &request.ingredients).await?;
        txn.commit().await?;
        Ok::<_, ApiError>(model)
    }
    .await;

    let model = match stored {
        Ok(model) => model,
        Err(e) => {
            if let Some(path) = &image_path {
                remove_image(&state.settings.media_root, path).await;
            }
            return Err(e);
        }
    };

    info!("Created recipe with ID: {}", model.id);
    let viewer = Viewer::load(&state.db, Some(author.id)).await?;
    let response = build_one(&state, model, &viewer).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Get a recipe
#[utoipa::path(
    get,
    path = "/api/recipes/{recipe_id}/",
    params(
        ("recipe_id" = i32, Path, description = "Recipe ID")
    ),
    responses(
        (status = 200, description = "Recipe details", body = RecipeResponse),
        (status = 404, description = "Recipe not found", body = crate::schemas::ErrorResponse)
    ),
    tag = "recipes"
)]
#[instrument(skip(state, viewer_user))]
pub async fn get_recipe(
    State(state): State<AppState>,
    viewer_user: MaybeUser,
    Path(recipe_id): Path<i32>,
) -> ApiResult<Json<RecipeResponse>> {
    let model = find_recipe(&state.db, recipe_id).await?;
    let viewer = Viewer::load(&state.db, viewer_user.id()).await?;
    Ok(Json(build_one(&state, model, &viewer).await?))
}

/// Update a recipe (author or admin)
#[utoipa::path(
    patch,
    path = "/api/recipes/{recipe_id}/",
    params(
        ("recipe_id" = i32, Path, description = "Recipe ID")
    ),
    request_body = UpdateRecipeRequest,
    responses(
        (status = 200, description = "Recipe updated", body = RecipeResponse),
        (status = 400, description = "Invalid request data", body = crate::schemas::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::schemas::ErrorResponse),
        (status = 403, description = "Not the author", body = crate::schemas::ErrorResponse),
        (status = 404, description = "Recipe not found", body = crate::schemas::ErrorResponse)
    ),
    tag = "recipes"
)]
#[instrument(skip(state, editor, request), fields(editor_id = editor.id))]
pub async fn update_recipe(
    State(state): State<AppState>,
    CurrentUser(editor): CurrentUser,
    Path(recipe_id): Path<i32>,
    ApiJson(request): ApiJson<UpdateRecipeRequest>,
) -> ApiResult<Json<RecipeResponse>> {
    let existing = find_recipe(&state.db, recipe_id).await?;
    require_author_or_admin(&editor, &existing)?;

    request.validate()?;
    if let Some(lines) = &request.ingredients {
        check_ingredient_lines(lines)?;
    }
    let image = request.image.as_deref().map(decode_data_url).transpose()?;
    let new_image_path = match image {
        Some(image) => Some(save_image(&state.settings.media_root, image).await?),
        None => None,
    };
    let old_image_path = existing.image.clone();

    let stored = async {
        let txn = state.db.begin().await?;
        ensure_catalog_ids(
            &txn,
            request.ingredients.as_deref().unwrap_or_default(),
            request.tags.as_deref().unwrap_or_default(),
        )
        .await?;

        let mut active: recipe::ActiveModel = existing.into();
        if let Some(name) = &request.name {
            active.name = Set(name.clone());
        }
        if let Some(text) = &request.text {
            active.text = Set(text.clone());
        }
        if let Some(cooking_time) = request.cooking_time {
            active.cooking_time = Set(cooking_time);
        }
        if let Some(path) = &new_image_path {
            active.image = Set(Some(path.clone()));
        }
        let model = active.update(&txn).await?;

        if let Some(tags) = &request.tags {
            replace_tags(&txn, model.id, tags).await?;
        }
        if let Some(lines) = &request.ingredients {
            replace_ingredients(&txn, model.id, lines).await?;
        }
        txn.commit().await?;
        Ok::<_, ApiError>(model)
    }
    .await;

    let model = match stored {
        Ok(model) => model,
        Err(e) => {
            if let Some(path) = &new_image_path {
                remove_image(&state.settings.media_root, path).await;
            }
            return Err(e);
        }
    };

    if let (Some(_), Some(old)) = (&new_image_path, &old_image_path) {
        remove_image(&state.settings.media_root, old).await;
    }

    info!("Updated recipe {}", model.id);
    let viewer = Viewer::load(&state.db, Some(editor.id)).await?;
    Ok(Json(build_one(&state, model, &viewer).await?))
}

/// Delete a recipe (author or admin)
#[utoipa::path(
    delete,
    path = "/api/recipes/{recipe_id}/",
    params(
        ("recipe_id" = i32, Path, description = "Recipe ID")
    ),
    responses(
        (status = 204, description = "Recipe deleted"),
        (status = 401, description = "Not authenticated", body = crate::schemas::ErrorResponse),
        (status = 403, description = "Not the author", body = crate::schemas::ErrorResponse),
        (status = 404, description = "Recipe not found", body = crate::schemas::ErrorResponse)
    ),
    tag = "recipes"
)]
#[instrument(skip(state, editor), fields(editor_id = editor.id))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    CurrentUser(editor): CurrentUser,
    Path(recipe_id): Path<i32>,
) -> ApiResult<StatusCode> {
    let existing = find_recipe(&state.db, recipe_id).await?;
    require_author_or_admin(&editor, &existing)?;

    recipe::Entity::delete_by_id(existing.id)
        .exec(&state.db)
        .await?;
    if let Some(path) = &existing.image {
        remove_image(&state.settings.media_root, path).await;
    }

    info!("Deleted recipe {}", recipe_id);
    Ok(StatusCode::NO_CONTENT)
}

// Helper functions

/// Filters of the recipe list, parsed from raw query pairs.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecipeFilters {
    pub tags: Vec<String>,
    pub author: Option<i32>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

impl RecipeFilters {
    pub fn from_pairs(pairs: &[(String, String)]) -> ApiResult<Self> {
        let mut filters = RecipeFilters::default();
        for (key, value) in pairs {
            match key.as_str() {
                "tags" if !value.is_empty() => filters.tags.push(value.clone()),
                "author" if !value.is_empty() => {
                    let author = value
                        .parse::<i32>()
                        .map_err(|_| ApiError::field("author", "Enter a number."))?;
                    filters.author = Some(author);
                }
                "is_favorited" => filters.is_favorited = is_truthy(value),
                "is_in_shopping_cart" => filters.is_in_shopping_cart = is_truthy(value),
                _ => {}
            }
        }
        Ok(filters)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "True")
}

pub async fn find_recipe<C>(db: &C, recipe_id: i32) -> ApiResult<recipe::Model>
where
    C: ConnectionTrait,
{
    recipe::Entity::find_by_id(recipe_id)
        .one(db)
        .await?
        .ok_or_else(ApiError::not_found)
}

/// Non-empty, positive amounts, no ingredient listed twice.
fn check_ingredient_lines(lines: &[IngredientAmountRequest]) -> ApiResult<()> {
    if lines.is_empty() {
        return Err(ApiError::field("ingredients", "This list may not be empty."));
    }

    let mut errors = FieldErrors::new();
    let mut seen = BTreeSet::new();
    for (index, line) in lines.iter().enumerate() {
        if line.amount < 1 {
            errors.insert(
                format!("ingredients[{index}].amount"),
                vec!["Ensure this value is greater than or equal to 1.".into()],
            );
        }
        if !seen.insert(line.id) {
            errors
                .entry("ingredients".into())
                .or_default()
                .push(format!("Ingredient {} is listed more than once.", line.id));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

/// Every referenced ingredient and tag must exist.
async fn ensure_catalog_ids(
    txn: &DatabaseTransaction,
    lines: &[IngredientAmountRequest],
    tag_ids: &[i32],
) -> ApiResult<()> {
    let mut errors = FieldErrors::new();

    let wanted: BTreeSet<i32> = lines.iter().map(|line| line.id).collect();
    if !wanted.is_empty() {
        let found: BTreeSet<i32> = ingredient::Entity::find()
            .select_only()
            .column(ingredient::Column::Id)
            .filter(ingredient::Column::Id.is_in(wanted.iter().copied()))
            .into_tuple::<i32>()
            .all(txn)
            .await?
            .into_iter()
            .collect();
        for missing in wanted.difference(&found) {
            errors
                .entry("ingredients".into())
                .or_default()
                .push(format!("Invalid pk \"{missing}\" - object does not exist."));
        }
    }

    let wanted: BTreeSet<i32> = tag_ids.iter().copied().collect();
    if !wanted.is_empty() {
        let found: BTreeSet<i32> = tag::Entity::find()
            .select_only()
            .column(tag::Column::Id)
            .filter(tag::Column::Id.is_in(wanted.iter().copied()))
            .into_tuple::<i32>()
            .all(txn)
            .await?
            .into_iter()
            .collect();
        for missing in wanted.difference(&found) {
            errors
                .entry("tags".into())
                .or_default()
                .push(format!("Invalid pk \"{missing}\" - object does not exist."));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

async fn replace_tags(txn: &DatabaseTransaction, recipe_id: i32, tag_ids: &[i32]) -> Result<(), DbErr> {
    recipe_tag::Entity::delete_many()
        .filter(recipe_tag::Column::RecipeId.eq(recipe_id))
        .exec(txn)
        .await?;

    let unique: BTreeSet<i32> = tag_ids.iter().copied().collect();
    if unique.is_empty() {
        return Ok(());
    }
    let rows = unique.into_iter().map(|tag_id| recipe_tag::ActiveModel {
        recipe_id: Set(recipe_id),
        tag_id: Set(tag_id),
    });
    recipe_tag::Entity::insert_many(rows).exec(txn).await?;
    Ok(())
}

/// Amount rows are dropped and recreated, never diffed.
async fn replace_ingredients(
    txn: &DatabaseTransaction,
    recipe_id: i32,
    lines: &[IngredientAmountRequest],
) -> Result<(), DbErr> {
    ingredient_amount::Entity::delete_many()
        .filter(ingredient_amount::Column::RecipeId.eq(recipe_id))
        .exec(txn)
        .await?;

    if lines.is_empty() {
        return Ok(());
    }
    let rows = lines.iter().map(|line| ingredient_amount::ActiveModel {
        recipe_id: Set(recipe_id),
        ingredient_id: Set(line.id),
        amount: Set(line.amount),
        ..Default::default()
    });
    ingredient_amount::Entity::insert_many(rows).exec(txn).await?;
    trace!("Stored {} ingredient lines for recipe {}", lines.len(), recipe_id);
    Ok(())
}

async fn build_one(state: &AppState, model: recipe::Model, viewer: &Viewer) -> ApiResult<RecipeResponse> {
    build_recipe_responses(&state.db, vec![model], viewer, &state.settings.media_url)
        .await?
        .pop()
        .ok_or_else(|| ApiError::Internal("Recipe vanished while rendering".to_string()))
}

/// Loads tags, ingredients and authors of all given recipes in three queries.
pub async fn build_recipe_responses<C>(
    db: &C,
    recipes: Vec<recipe::Model>,
    viewer: &Viewer,
    media_url: &str,
) -> Result<Vec<RecipeResponse>, DbErr>
where
    C: ConnectionTrait,
{
    if recipes.is_empty() {
        return Ok(Vec::new());
    }
    let recipe_ids: Vec<i32> = recipes.iter().map(|r| r.id).collect();
    let author_ids: BTreeSet<i32> = recipes.iter().map(|r| r.author_id).collect();

    let mut tags_by_recipe: HashMap<i32, Vec<TagResponse>> = HashMap::new();
    for (link, tag) in recipe_tag::Entity::find()
        .filter(recipe_tag::Column::RecipeId.is_in(recipe_ids.iter().copied()))
        .order_by_asc(recipe_tag::Column::TagId)
        .find_also_related(tag::Entity)
        .all(db)
        .await?
    {
        if let Some(tag) = tag {
            tags_by_recipe
                .entry(link.recipe_id)
                .or_default()
                .push(TagResponse::from(tag));
        }
    }

    let mut ingredients_by_recipe: HashMap<i32, Vec<RecipeIngredientResponse>> = HashMap::new();
    for (amount, ingredient) in ingredient_amount::Entity::find()
        .filter(ingredient_amount::Column::RecipeId.is_in(recipe_ids.iter().copied()))
        .order_by_asc(ingredient_amount::Column::Id)
        .find_also_related(ingredient::Entity)
        .all(db)
        .await?
    {
        if let Some(ingredient) = ingredient {
            ingredients_by_recipe
                .entry(amount.recipe_id)
                .or_default()
                .push(RecipeIngredientResponse {
                    id: ingredient.id,
                    name: ingredient.name,
                    measurement_unit: ingredient.measurement_unit,
                    amount: amount.amount,
                });
        }
    }

    let authors: HashMap<i32, user::Model> = user::Entity::find()
        .filter(user::Column::Id.is_in(author_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let mut responses = Vec::with_capacity(recipes.len());
    for model in recipes {
        let Some(author) = authors.get(&model.author_id) else {
            return Err(DbErr::RecordNotFound(format!(
                "author {} of recipe {}",
                model.author_id, model.id
            )));
        };
        let flags = viewer.flags_for_recipe(model.id);
        responses.push(RecipeResponse {
            id: model.id,
            tags: tags_by_recipe.remove(&model.id).unwrap_or_default(),
            author: UserResponse::new(author, viewer),
            ingredients: ingredients_by_recipe.remove(&model.id).unwrap_or_default(),
            is_favorited: flags.is_favorited,
            is_in_shopping_cart: flags.is_in_shopping_cart,
            name: model.name,
            image: model.image.as_deref().map(|path| image_url(media_url, path)),
            text: model.text,
            cooking_time: model.cooking_time,
        });
    }
    Ok(responses)
}
