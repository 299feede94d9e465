use crate::handlers::{
    auth::{jwt_create, jwt_refresh, jwt_verify, token_login, token_logout},
    favorites::{add_favorite, remove_favorite},
    health::health_check,
    ingredients::{
        create_ingredient, delete_ingredient, get_ingredient, list_ingredients, update_ingredient,
    },
    recipes::{create_recipe, delete_recipe, get_recipe, list_recipes, update_recipe},
    shopping_cart::{add_to_shopping_cart, download_shopping_cart, remove_from_shopping_cart},
    subscriptions::{list_subscribers, list_subscriptions, subscribe, unsubscribe},
    tags::{create_tag, delete_tag, get_tag, list_tags, update_tag},
    users::{create_user, get_me, get_user, list_users, set_password, update_me},
};
use crate::schemas::{ApiDoc, AppState};
use axum::{
    Router,
    routing::{get, post},
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, services::ServeDir, timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Create application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let media = ServeDir::new(&state.settings.media_root);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Recipes, favorites and the shopping cart
        .route("/api/recipes/", get(list_recipes).post(create_recipe))
        .route(
            "/api/recipes/download_shopping_cart/",
            get(download_shopping_cart),
        )
        .route(
            "/api/recipes/:recipe_id/",
            get(get_recipe).patch(update_recipe).delete(delete_recipe),
        )
        .route(
            "/api/recipes/:recipe_id/favorite/",
            post(add_favorite).delete(remove_favorite),
        )
        .route(
            "/api/recipes/:recipe_id/shopping_cart/",
            post(add_to_shopping_cart).delete(remove_from_shopping_cart),
        )
        // Catalogs
        .route("/api/ingredients/", get(list_ingredients).post(create_ingredient))
        .route(
            "/api/ingredients/:ingredient_id/",
            get(get_ingredient)
                .patch(update_ingredient)
                .delete(delete_ingredient),
        )
        .route("/api/tags/", get(list_tags).post(create_tag))
        .route(
            "/api/tags/:tag_id/",
            get(get_tag).patch(update_tag).delete(delete_tag),
        )
        // Users and subscriptions
        .route("/api/users/", get(list_users).post(create_user))
        .route("/api/users/me/", get(get_me).patch(update_me))
        .route("/api/users/set_password/", post(set_password))
        .route("/api/users/subscriptions/", get(list_subscriptions))
        .route("/api/users/subscribers/", get(list_subscribers))
        .route("/api/users/:user_id/", get(get_user))
        .route(
            "/api/users/:user_id/subscribe/",
            post(subscribe).delete(unsubscribe),
        )
        // Authentication
        .route("/api/auth/token/login/", post(token_login))
        .route("/api/auth/token/logout/", post(token_logout))
        .route("/api/token/", post(jwt_create))
        .route("/api/token/refresh/", post(jwt_refresh))
        .route("/api/token/verify/", post(jwt_verify))
        // Uploaded images
        .nest_service("/media", media)
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(Duration::from_secs(30)))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
