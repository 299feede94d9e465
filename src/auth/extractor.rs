use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use model::entities::user;
use sea_orm::EntityTrait;
use tracing::{debug, trace};

use super::jwt::{JwtKeys, TokenType};
use super::permissions;
use super::tokens::find_user_by_token;
use crate::error::ApiError;
use crate::schemas::AppState;

/// The authenticated user; rejects anonymous requests with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub user::Model);

/// The authenticated user if credentials were sent.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<user::Model>);

/// An authenticated user with the admin role; 403 for everyone else.
#[derive(Debug, Clone)]
pub struct AdminUser(pub user::Model);

impl MaybeUser {
    pub fn id(&self) -> Option<i32> {
        self.0.as_ref().map(|user| user.id)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            trace!("No Authorization header, anonymous request");
            return Ok(MaybeUser(None));
        };
        let header = header
            .to_str()
            .map_err(|_| ApiError::InvalidToken("Invalid token header.".to_string()))?;

        let Some((scheme, credential)) = header.trim().split_once(' ') else {
            return Err(ApiError::InvalidToken(
                "Invalid token header. No credentials provided.".to_string(),
            ));
        };
        let credential = credential.trim();

        let user = match scheme {
            "Token" => find_user_by_token(&state.db, credential).await?,
            "Bearer" => {
                let claims = JwtKeys::from_settings(&state.settings)
                    .verify(credential, TokenType::Access)?;
                user::Entity::find_by_id(claims.user_id).one(&state.db).await?
            }
            other => {
                debug!("Ignoring unsupported authorization scheme {}", other);
                return Ok(MaybeUser(None));
            }
        };

        match user {
            Some(user) if user.is_active => Ok(MaybeUser(Some(user))),
            Some(_) => Err(ApiError::InvalidToken("User inactive or deleted.".to_string())),
            None => Err(ApiError::InvalidToken("Invalid token.".to_string())),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match MaybeUser::from_request_parts(parts, state).await? {
            MaybeUser(Some(user)) => Ok(CurrentUser(user)),
            MaybeUser(None) => Err(ApiError::Unauthorized),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        permissions::require_admin(&user)?;
        Ok(AdminUser(user))
    }
}
