use moka::future::Cache;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use utoipa::{OpenApi, ToSchema};

use crate::config::Settings;
use crate::handlers::{
    auth::{
        AccessTokenResponse, AuthTokenResponse, RefreshRequest, TokenLoginRequest,
        TokenPairResponse, VerifyRequest,
    },
    ingredients::{CreateIngredientRequest, IngredientResponse, UpdateIngredientRequest},
    recipes::{
        CreateRecipeRequest, IngredientAmountRequest, RecipeIngredientResponse,
        RecipeResponse, ShortRecipeResponse, UpdateRecipeRequest,
    },
    subscriptions::{SubscribedAuthorResponse, SubscriberResponse, SubscriptionResponse},
    tags::{CreateTagRequest, TagResponse, UpdateTagRequest},
    users::{CreateUserRequest, RegisteredUserResponse, SetPasswordRequest, UpdateMeRequest, UserResponse},
};

/// Application state shared across handlers
#[derive(Clone, Debug)]
pub struct AppState {
    /// Database connection
    pub db: DatabaseConnection,
    /// Cache of the tag and ingredient catalogs
    pub cache: Cache<String, CachedData>,
    /// Settings loaded at startup
    pub settings: Arc<Settings>,
}

/// Cached data types
#[derive(Clone, Debug)]
pub enum CachedData {
    Tags(Arc<Vec<TagResponse>>),
    Ingredients(Arc<Vec<IngredientResponse>>),
}

pub const TAGS_CACHE_KEY: &str = "catalog:tags";
pub const INGREDIENTS_CACHE_KEY: &str = "catalog:ingredients";

/// Error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    pub code: String,
    /// Success status (always false for errors)
    pub success: bool,
    /// Messages per invalid field, present on validation errors
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fields: Option<BTreeMap<String, Vec<String>>>,
}

/// Health check response
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Database connection status
    pub database: String,
}

/// One page of a paginated list
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[aliases(
    PaginatedRecipes = Paginated<RecipeResponse>,
    PaginatedUsers = Paginated<UserResponse>,
    PaginatedSubscriptions = Paginated<SubscribedAuthorResponse>
)]
pub struct Paginated<T> {
    /// Total number of items across all pages
    pub count: u64,
    /// Relative link to the next page
    pub next: Option<String>,
    /// Relative link to the previous page
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::health_check,
        crate::handlers::recipes::list_recipes,
        crate::handlers::recipes::create_recipe,
        crate::handlers::recipes::get_recipe,
        crate::handlers::recipes::update_recipe,
        crate::handlers::recipes::delete_recipe,
        crate::handlers::favorites::add_favorite,
        crate::handlers::favorites::remove_favorite,
        crate::handlers::shopping_cart::add_to_shopping_cart,
        crate::handlers::shopping_cart::remove_from_shopping_cart,
        crate::handlers::shopping_cart::download_shopping_cart,
        crate::handlers::ingredients::list_ingredients,
        crate::handlers::ingredients::get_ingredient,
        crate::handlers::ingredients::create_ingredient,
        crate::handlers::ingredients::update_ingredient,
        crate::handlers::ingredients::delete_ingredient,
        crate::handlers::tags::list_tags,
        crate::handlers::tags::get_tag,
        crate::handlers::tags::create_tag,
        crate::handlers::tags::update_tag,
        crate::handlers::tags::delete_tag,
        crate::handlers::users::list_users,
        crate::handlers::users::create_user,
        crate::handlers::users::get_user,
        crate::handlers::users::get_me,
        crate::handlers::users::update_me,
        crate::handlers::users::set_password,
        crate::handlers::subscriptions::subscribe,
        crate::handlers::subscriptions::unsubscribe,
        crate::handlers::subscriptions::list_subscriptions,
        crate::handlers::subscriptions::list_subscribers,
        crate::handlers::auth::token_login,
        crate::handlers::auth::token_logout,
        crate::handlers::auth::jwt_create,
        crate::handlers::auth::jwt_refresh,
        crate::handlers::auth::jwt_verify,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            PaginatedRecipes,
            PaginatedUsers,
            PaginatedSubscriptions,
            RecipeResponse,
            RecipeIngredientResponse,
            ShortRecipeResponse,
            CreateRecipeRequest,
            UpdateRecipeRequest,
            IngredientAmountRequest,
            IngredientResponse,
            CreateIngredientRequest,
            UpdateIngredientRequest,
            TagResponse,
            CreateTagRequest,
            UpdateTagRequest,
            UserResponse,
            RegisteredUserResponse,
            CreateUserRequest,
            UpdateMeRequest,
            SetPasswordRequest,
            SubscriptionResponse,
            SubscribedAuthorResponse,
            SubscriberResponse,
            TokenLoginRequest,
            AuthTokenResponse,
            TokenPairResponse,
            RefreshRequest,
            AccessTokenResponse,
            VerifyRequest,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "recipes", description = "Recipe publishing and browsing"),
        (name = "favorites", description = "Favorite recipes"),
        (name = "shopping_cart", description = "Shopping cart and shopping list download"),
        (name = "ingredients", description = "Ingredient catalog"),
        (name = "tags", description = "Recipe tags"),
        (name = "users", description = "User accounts"),
        (name = "subscriptions", description = "Following other authors"),
        (name = "auth", description = "Token and JWT authentication"),
    ),
    info(
        title = "Foodgram API",
        description = "Recipe sharing service: recipes, favorites, subscriptions and shopping lists",
        version = "0.1.0",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
pub struct ApiDoc;
