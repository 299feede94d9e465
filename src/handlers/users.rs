use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use model::entities::user::{self, UserRole};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::auth::{
    CurrentUser, MaybeUser,
    password::{hash_password, verify_password},
};
use crate::error::{ApiError, ApiResult, FieldErrors, unique_as_bad_request};
use crate::helpers::{
    json::ApiJson,
    pagination::{PageRequest, paginate},
    viewer::Viewer,
};
use crate::schemas::{AppState, PaginatedUsers};

/// Public representation of a user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub email: String,
    pub id: i32,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    /// Whether the viewer follows this user
    pub is_subscribed: bool,
}

impl UserResponse {
    pub fn new(model: &user::Model, viewer: &Viewer) -> Self {
        Self {
            email: model.email.clone(),
            id: model.id,
            username: model.username.clone(),
            first_name: model.first_name.clone(),
            last_name: model.last_name.clone(),
            is_subscribed: viewer.is_subscribed_to(model.id),
        }
    }
}

/// Returned by registration; never contains the password
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisteredUserResponse {
    pub email: String,
    pub id: i32,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<user::Model> for RegisteredUserResponse {
    fn from(model: user::Model) -> Self {
        Self {
            email: model.email,
            id: model.id,
            username: model.username,
            first_name: model.first_name,
            last_name: model.last_name,
        }
    }
}

/// Registration request
#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct CreateUserRequest {
    #[validate(email(message = "Enter a valid email address."), length(max = 254))]
    pub email: String,
    #[validate(
        length(min = 1, max = 150, message = "Ensure this field has 1 to 150 characters."),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[validate(length(min = 1, max = 150, message = "Ensure this field has 1 to 150 characters."))]
    pub first_name: String,
    #[validate(length(min = 1, max = 150, message = "Ensure this field has 1 to 150 characters."))]
    pub last_name: String,
    #[validate(length(
        min = 8,
        message = "This password is too short. It must contain at least 8 characters."
    ))]
    pub password: String,
}

/// Partial update of the current user's profile
#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct UpdateMeRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
    #[validate(
        length(min = 1, max = 150, message = "Ensure this field has 1 to 150 characters."),
        custom(function = "validate_username")
    )]
    pub username: Option<String>,
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SetPasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

/// List users
#[utoipa::path(
    get,
    path = "/api/users/",
    params(
        ("page" = Option<u64>, Query, description = "Page number"),
        ("limit" = Option<u64>, Query, description = "Page size, switches to limit/offset pagination"),
        ("offset" = Option<u64>, Query, description = "Offset for limit/offset pagination")
    ),
    responses(
        (status = 200, description = "One page of users", body = PaginatedUsers),
        (status = 404, description = "Invalid page", body = crate::schemas::ErrorResponse)
    ),
    tag = "users"
)]
#[instrument(skip(state, viewer_user))]
pub async fn list_users(
    State(state): State<AppState>,
    viewer_user: MaybeUser,
    OriginalUri(uri): OriginalUri,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Json<PaginatedUsers>> {
    let request = PageRequest::from_pairs(&pairs, state.settings.page_size)?;
    let count = user::Entity::find().count(&state.db).await?;
    request.check_range(count)?;

    let users = user::Entity::find()
        .order_by_asc(user::Column::Id)
        .offset(request.offset())
        .limit(request.limit())
        .all(&state.db)
        .await?;

    let viewer = Viewer::load(&state.db, viewer_user.id()).await?;
    let results = users.iter().map(|u| UserResponse::new(u, &viewer)).collect();
    debug!("Listing {} users of {}", users.len(), count);
    Ok(Json(paginate(results, count, &request, uri.path(), &pairs)))
}

/// Register a new user
#[utoipa::path(
    post,
    path = "/api/users/",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User registered", body = RegisteredUserResponse),
        (status = 400, description = "Invalid request data", body = crate::schemas::ErrorResponse)
    ),
    tag = "users"
)]
#[instrument(skip(state, request), fields(username = %request.username))]
pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<RegisteredUserResponse>)> {
    request.validate()?;
    ensure_identity_free(&state.db, Some(&request.email), Some(&request.username), None).await?;

    let model = user::ActiveModel {
        email: Set(request.email),
        username: Set(request.username),
        first_name: Set(request.first_name),
        last_name: Set(request.last_name),
        password_hash: Set(hash_password(&request.password)?),
        role: Set(UserRole::User),
        bio: Set(String::new()),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(|e| unique_as_bad_request(e, "A user with that username or email already exists."))?;

    info!("Registered user with ID: {}", model.id);
    Ok((StatusCode::CREATED, Json(RegisteredUserResponse::from(model))))
}

/// Get a user profile
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/",
    params(
        ("user_id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User profile", body = UserResponse),
        (status = 404, description = "User not found", body = crate::schemas::ErrorResponse)
    ),
    tag = "users"
)]
#[instrument(skip(state, viewer_user))]
pub async fn get_user(
    State(state): State<AppState>,
    viewer_user: MaybeUser,
    Path(user_id): Path<i32>,
) -> ApiResult<Json<UserResponse>> {
    let model = user::Entity::find_by_id(user_id)
        .one(&state.db)
        .await?
        .ok_or_else(ApiError::not_found)?;
    let viewer = Viewer::load(&state.db, viewer_user.id()).await?;
    Ok(Json(UserResponse::new(&model, &viewer)))
}

/// Get the current user's profile
#[utoipa::path(
    get,
    path = "/api/users/me/",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not authenticated", body = crate::schemas::ErrorResponse)
    ),
    tag = "users"
)]
#[instrument(skip(state, me))]
pub async fn get_me(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
) -> ApiResult<Json<UserResponse>> {
    let viewer = Viewer::load(&state.db, Some(me.id)).await?;
    Ok(Json(UserResponse::new(&me, &viewer)))
}

/// Update the current user's profile
#[utoipa::path(
    patch,
    path = "/api/users/me/",
    request_body = UpdateMeRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 400, description = "Invalid request data", body = crate::schemas::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::schemas::ErrorResponse)
    ),
    tag = "users"
)]
#[instrument(skip(state, me, request))]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    ApiJson(request): ApiJson<UpdateMeRequest>,
) -> ApiResult<Json<UserResponse>> {
    request.validate()?;
    ensure_identity_free(
        &state.db,
        request.email.as_deref(),
        request.username.as_deref(),
        Some(me.id),
    )
    .await?;

    let mut active: user::ActiveModel = me.into();
    if let Some(email) = request.email {
        active.email = Set(email);
    }
    if let Some(username) = request.username {
        active.username = Set(username);
    }
    if let Some(first_name) = request.first_name {
        active.first_name = Set(first_name);
    }
    if let Some(last_name) = request.last_name {
        active.last_name = Set(last_name);
    }
    if let Some(bio) = request.bio {
        active.bio = Set(bio);
    }

    let updated = active
        .update(&state.db)
        .await
        .map_err(|e| unique_as_bad_request(e, "A user with that username or email already exists."))?;
    let viewer = Viewer::load(&state.db, Some(updated.id)).await?;
    info!("Updated profile of user {}", updated.id);
    Ok(Json(UserResponse::new(&updated, &viewer)))
}

/// Change the current user's password
#[utoipa::path(
    post,
    path = "/api/users/set_password/",
    request_body = SetPasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Wrong current password or missing new password", body = crate::schemas::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::schemas::ErrorResponse)
    ),
    tag = "users"
)]
#[instrument(skip(state, me, request))]
pub async fn set_password(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    ApiJson(request): ApiJson<SetPasswordRequest>,
) -> ApiResult<StatusCode> {
    let mut errors = FieldErrors::new();

    let new_password = request.new_password.filter(|p| !p.is_empty());
    match new_password.as_deref() {
        None => {
            errors.insert("new_password".into(), vec!["This field is required.".into()]);
        }
        Some(password) if password.chars().count() < 8 => {
            errors.insert(
                "new_password".into(),
                vec!["This password is too short. It must contain at least 8 characters.".into()],
            );
        }
        Some(_) => {}
    }

    let current_ok = request
        .current_password
        .as_deref()
        .is_some_and(|current| verify_password(current, &me.password_hash));
    if !current_ok {
        warn!("User {} supplied a wrong current password", me.id);
        errors.insert("current_password".into(), vec!["Wrong password.".into()]);
    }

    let Some(new_password) = new_password else {
        return Err(ApiError::Validation(errors));
    };
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let user_id = me.id;
    let mut active: user::ActiveModel = me.into();
    active.password_hash = Set(hash_password(&new_password)?);
    active.update(&state.db).await?;

    info!("User {} changed their password", user_id);
    Ok(StatusCode::NO_CONTENT)
}

// Helper functions

/// Email and username must not belong to another user.
async fn ensure_identity_free(
    db: &DatabaseConnection,
    email: Option<&str>,
    username: Option<&str>,
    except_id: Option<i32>,
) -> ApiResult<()> {
    let mut errors = FieldErrors::new();

    if let Some(email) = email {
        let mut query = user::Entity::find().filter(user::Column::Email.eq(email));
        if let Some(id) = except_id {
            query = query.filter(user::Column::Id.ne(id));
        }
        if query.count(db).await? > 0 {
            errors.insert("email".into(), vec!["A user with that email already exists.".into()]);
        }
    }

    if let Some(username) = username {
        let mut query = user::Entity::find().filter(user::Column::Username.eq(username));
        if let Some(id) = except_id {
            query = query.filter(user::Column::Id.ne(id));
        }
        if query.count(db).await? > 0 {
            errors.insert(
                "username".into(),
                vec!["A user with that username already exists.".into()],
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

/// Letters, digits and `@ . + - _` only.
fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username
        .chars()
        .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
    {
        Ok(())
    } else {
        let mut err = ValidationError::new("username");
        err.message = Some(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
                .into(),
        );
        Err(err)
    }
}
