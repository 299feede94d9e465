use axum::{extract::State, http::StatusCode, response::Json};
use model::entities::user;
use sea_orm::{
    Condition, DatabaseConnection, EntityTrait, QueryFilter,
    sea_query::{Expr, Func},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use crate::auth::{
    CurrentUser,
    jwt::{JwtKeys, TokenType},
    password::verify_password,
    tokens::{issue_token, revoke_token},
};
use crate::error::{ApiError, ApiResult};
use crate::helpers::json::ApiJson;
use crate::schemas::AppState;

/// Credentials; `email` also accepts a username
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenLoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthTokenResponse {
    pub auth_token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenPairResponse {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccessTokenResponse {
    pub access: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyRequest {
    pub token: String,
}

/// Obtain an opaque API token
#[utoipa::path(
    post,
    path = "/api/auth/token/login/",
    request_body = TokenLoginRequest,
    responses(
        (status = 200, description = "Token issued", body = AuthTokenResponse),
        (status = 400, description = "Missing or wrong credentials", body = crate::schemas::ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip(state, request))]
pub async fn token_login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<TokenLoginRequest>,
) -> ApiResult<Json<AuthTokenResponse>> {
    let user = authenticate(&state.db, &request).await?;
    let token = issue_token(&state.db, user.id).await?;
    info!("User {} logged in with an API token", user.id);
    Ok(Json(AuthTokenResponse {
        auth_token: token.key,
    }))
}

/// Delete the current API token
#[utoipa::path(
    post,
    path = "/api/auth/token/logout/",
    responses(
        (status = 204, description = "Token deleted"),
        (status = 401, description = "Not authenticated", body = crate::schemas::ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip(state, me), fields(user_id = me.id))]
pub async fn token_logout(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
) -> ApiResult<StatusCode> {
    let removed = revoke_token(&state.db, me.id).await?;
    debug!("Removed {} tokens of user {}", removed, me.id);
    Ok(StatusCode::NO_CONTENT)
}

/// Obtain an access/refresh JWT pair
#[utoipa::path(
    post,
    path = "/api/token/",
    request_body = TokenLoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = TokenPairResponse),
        (status = 400, description = "Missing or wrong credentials", body = crate::schemas::ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip(state, request))]
pub async fn jwt_create(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<TokenLoginRequest>,
) -> ApiResult<Json<TokenPairResponse>> {
    let user = authenticate(&state.db, &request).await?;
    let keys = JwtKeys::from_settings(&state.settings);
    let response = TokenPairResponse {
        access: keys.issue(user.id, TokenType::Access)?,
        refresh: keys.issue(user.id, TokenType::Refresh)?,
    };
    info!("Issued JWT pair for user {}", user.id);
    Ok(Json(response))
}

/// Exchange a refresh JWT for a new access JWT
#[utoipa::path(
    post,
    path = "/api/token/refresh/",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Access token issued", body = AccessTokenResponse),
        (status = 401, description = "Invalid or expired refresh token", body = crate::schemas::ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip(state, request))]
pub async fn jwt_refresh(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> ApiResult<Json<AccessTokenResponse>> {
    let keys = JwtKeys::from_settings(&state.settings);
    let claims = keys.verify(&request.refresh, TokenType::Refresh)?;

    let active = user::Entity::find_by_id(claims.user_id)
        .one(&state.db)
        .await?
        .is_some_and(|u| u.is_active);
    if !active {
        return Err(ApiError::InvalidToken("User not found".to_string()));
    }

    Ok(Json(AccessTokenResponse {
        access: keys.issue(claims.user_id, TokenType::Access)?,
    }))
}

/// Check that a JWT is valid
#[utoipa::path(
    post,
    path = "/api/token/verify/",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Token is valid, body is an empty object"),
        (status = 401, description = "Token is invalid or expired", body = crate::schemas::ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip(state, request))]
pub async fn jwt_verify(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<VerifyRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let keys = JwtKeys::from_settings(&state.settings);
    keys.verify(&request.token, TokenType::Access)
        .or_else(|_| keys.verify(&request.token, TokenType::Refresh))?;
    Ok(Json(serde_json::json!({})))
}

// Helper functions

/// Looks the user up by email or username, case-insensitively, and checks the password.
async fn authenticate(db: &DatabaseConnection, request: &TokenLoginRequest) -> ApiResult<user::Model> {
    let (Some(identifier), Some(password)) = (
        request.email.as_deref().filter(|s| !s.is_empty()),
        request.password.as_deref().filter(|s| !s.is_empty()),
    ) else {
        return Err(ApiError::BadRequest(
            "Must include \"email\" and \"password\".".to_string(),
        ));
    };

    let needle = identifier.to_lowercase();
    let candidate = user::Entity::find()
        .filter(
            Condition::any()
                .add(Expr::expr(Func::lower(Expr::col(user::Column::Email))).eq(needle.clone()))
                .add(Expr::expr(Func::lower(Expr::col(user::Column::Username))).eq(needle)),
        )
        .one(db)
        .await?;

    match candidate {
        Some(user) if user.is_active && verify_password(password, &user.password_hash) => Ok(user),
        _ => {
            warn!("Failed login attempt");
            Err(ApiError::BadRequest(
                "Unable to log in with provided credentials.".to_string(),
            ))
        }
    }
}
