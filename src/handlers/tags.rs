use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use model::entities::tag;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::auth::AdminUser;
use crate::helpers::json::ApiJson;
use crate::error::{ApiError, ApiResult, unique_as_bad_request};
use crate::schemas::{AppState, CachedData, TAGS_CACHE_KEY};

/// Request structure for creating a new tag
#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct CreateTagRequest {
    #[validate(length(min = 1, max = 50, message = "Ensure this field has 1 to 50 characters."))]
    pub name: String,
    /// Hex color such as `#E26C2D`
    #[validate(custom(function = "validate_color"))]
    pub color: String,
    #[validate(custom(function = "validate_slug"))]
    pub slug: String,
}

/// Request structure for updating an existing tag
#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct UpdateTagRequest {
    #[validate(length(min = 1, max = 50, message = "Ensure this field has 1 to 50 characters."))]
    pub name: Option<String>,
    #[validate(custom(function = "validate_color"))]
    pub color: Option<String>,
    #[validate(custom(function = "validate_slug"))]
    pub slug: Option<String>,
}

/// Response structure for tag operations
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TagResponse {
    pub id: i32,
    pub name: String,
    pub color: String,
    pub slug: String,
}

impl From<tag::Model> for TagResponse {
    fn from(model: tag::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            color: model.color,
            slug: model.slug,
        }
    }
}

/// Exact-match filters of the tag list
#[derive(Debug, Deserialize, IntoParams)]
pub struct TagListQuery {
    pub name: Option<String>,
    pub slug: Option<String>,
}

/// List all tags
#[utoipa::path(
    get,
    path = "/api/tags/",
    params(TagListQuery),
    responses(
        (status = 200, description = "List of all tags", body = Vec<TagResponse>),
        (status = 500, description = "Internal server error", body = crate::schemas::ErrorResponse)
    ),
    tag = "tags"
)]
#[instrument(skip(state))]
pub async fn list_tags(
    State(state): State<AppState>,
    Query(query): Query<TagListQuery>,
) -> ApiResult<Json<Vec<TagResponse>>> {
    let tags = load_tags(&state).await?;
    let filtered: Vec<TagResponse> = tags
        .iter()
        .filter(|t| query.name.as_ref().is_none_or(|name| &t.name == name))
        .filter(|t| query.slug.as_ref().is_none_or(|slug| &t.slug == slug))
        .cloned()
        .collect();

    debug!("Returning {} of {} tags", filtered.len(), tags.len());
    Ok(Json(filtered))
}

/// Get a specific tag by ID
#[utoipa::path(
    get,
    path = "/api/tags/{tag_id}/",
    params(
        ("tag_id" = i32, Path, description = "Tag ID")
    ),
    responses(
        (status = 200, description = "Tag details", body = TagResponse),
        (status = 404, description = "Tag not found", body = crate::schemas::ErrorResponse)
    ),
    tag = "tags"
)]
#[instrument(skip(state))]
pub async fn get_tag(
    State(state): State<AppState>,
    Path(tag_id): Path<i32>,
) -> ApiResult<Json<TagResponse>> {
    let tag = find_tag(&state, tag_id).await?;
    Ok(Json(TagResponse::from(tag)))
}

/// Create a new tag (admin only)
#[utoipa::path(
    post,
    path = "/api/tags/",
    request_body = CreateTagRequest,
    responses(
        (status = 201, description = "Tag created successfully", body = TagResponse),
        (status = 400, description = "Invalid request data", body = crate::schemas::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::schemas::ErrorResponse),
        (status = 403, description = "Not an admin", body = crate::schemas::ErrorResponse)
    ),
    tag = "tags"
)]
#[instrument(skip(state, admin))]
pub async fn create_tag(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(request): ApiJson<CreateTagRequest>,
) -> ApiResult<(StatusCode, Json<TagResponse>)> {
    request.validate()?;
    debug!("Admin {} creates tag {}", admin.id, request.slug);

    let model = tag::ActiveModel {
        name: Set(request.name),
        color: Set(request.color),
        slug: Set(request.slug),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(slug_taken)?;

    invalidate_tags(&state).await;
    info!("Created tag with ID: {}", model.id);
    Ok((StatusCode::CREATED, Json(TagResponse::from(model))))
}

/// Update a tag (admin only)
#[utoipa::path(
    patch,
    path = "/api/tags/{tag_id}/",
    params(
        ("tag_id" = i32, Path, description = "Tag ID")
    ),
    request_body = UpdateTagRequest,
    responses(
        (status = 200, description = "Tag updated successfully", body = TagResponse),
        (status = 400, description = "Invalid request data", body = crate::schemas::ErrorResponse),
        (status = 403, description = "Not an admin", body = crate::schemas::ErrorResponse),
        (status = 404, description = "Tag not found", body = crate::schemas::ErrorResponse)
    ),
    tag = "tags"
)]
#[instrument(skip(state, _admin))]
pub async fn update_tag(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(tag_id): Path<i32>,
    ApiJson(request): ApiJson<UpdateTagRequest>,
) -> ApiResult<Json<TagResponse>> {
    request.validate()?;
    let mut active: tag::ActiveModel = find_tag(&state, tag_id).await?.into();

    if let Some(name) = request.name {
        active.name = Set(name);
    }
    if let Some(color) = request.color {
        active.color = Set(color);
    }
    if let Some(slug) = request.slug {
        active.slug = Set(slug);
    }

    let model = active.update(&state.db).await.map_err(slug_taken)?;
    invalidate_tags(&state).await;
    info!("Updated tag {}", model.id);
    Ok(Json(TagResponse::from(model)))
}

/// Delete a tag (admin only)
#[utoipa::path(
    delete,
    path = "/api/tags/{tag_id}/",
    params(
        ("tag_id" = i32, Path, description = "Tag ID")
    ),
    responses(
        (status = 204, description = "Tag deleted"),
        (status = 403, description = "Not an admin", body = crate::schemas::ErrorResponse),
        (status = 404, description = "Tag not found", body = crate::schemas::ErrorResponse)
    ),
    tag = "tags"
)]
#[instrument(skip(state, _admin))]
pub async fn delete_tag(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(tag_id): Path<i32>,
) -> ApiResult<StatusCode> {
    let result = tag::Entity::delete_by_id(tag_id).exec(&state.db).await?;
    if result.rows_affected == 0 {
        return Err(ApiError::not_found());
    }
    invalidate_tags(&state).await;
    info!("Deleted tag {}", tag_id);
    Ok(StatusCode::NO_CONTENT)
}

// Helper functions

/// The full tag catalog, read through the cache.
pub async fn load_tags(state: &AppState) -> ApiResult<Arc<Vec<TagResponse>>> {
    if let Some(CachedData::Tags(tags)) = state.cache.get(TAGS_CACHE_KEY).await {
        return Ok(tags);
    }

    let tags: Vec<TagResponse> = tag::Entity::find()
        .order_by_asc(tag::Column::Id)
        .all(&state.db)
        .await?
        .into_iter()
        .map(TagResponse::from)
        .collect();
    let tags = Arc::new(tags);
    state
        .cache
        .insert(TAGS_CACHE_KEY.to_string(), CachedData::Tags(tags.clone()))
        .await;
    Ok(tags)
}

async fn invalidate_tags(state: &AppState) {
    state.cache.invalidate(TAGS_CACHE_KEY).await;
}

async fn find_tag(state: &AppState, tag_id: i32) -> ApiResult<tag::Model> {
    tag::Entity::find_by_id(tag_id)
        .one(&state.db)
        .await?
        .ok_or_else(ApiError::not_found)
}

fn slug_taken(err: sea_orm::DbErr) -> ApiError {
    match unique_as_bad_request(err, "Tag with this slug already exists.") {
        ApiError::BadRequest(message) => ApiError::field("slug", message),
        other => other,
    }
}

fn validate_color(color: &str) -> Result<(), validator::ValidationError> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(())
    } else {
        let mut err = validator::ValidationError::new("color");
        err.message = Some("Enter a valid hex color, e.g. #E26C2D.".into());
        Err(err)
    }
}

fn validate_slug(slug: &str) -> Result<(), validator::ValidationError> {
    let valid = !slug.is_empty()
        && slug.len() <= 50
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        let mut err = validator::ValidationError::new("slug");
        err.message = Some(
            "Enter a valid slug of letters, numbers, underscores or hyphens.".into(),
        );
        Err(err)
    }
}
