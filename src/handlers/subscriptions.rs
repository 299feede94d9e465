use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use model::entities::{recipe, subscription, user};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, QueryTrait, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, instrument};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult, unique_as_bad_request};
use crate::handlers::recipes::ShortRecipeResponse;
use crate::helpers::{
    pagination::{PageRequest, paginate},
    query::ApiQuery,
    viewer::Viewer,
};
use crate::schemas::{AppState, PaginatedSubscriptions};

const DEFAULT_RECIPES_LIMIT: u64 = 3;
const ALREADY_SUBSCRIBED: &str = "You are already subscribed to this user.";

/// Result of a subscribe call, as usernames
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionResponse {
    pub subscriber: String,
    pub subscribed_to: String,
}

/// A followed author with a preview of their recipes
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscribedAuthorResponse {
    pub email: String,
    pub id: i32,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    /// Newest first, at most `recipes_limit`
    pub recipes: Vec<ShortRecipeResponse>,
    pub recipes_count: u64,
}

/// A follower of the current user together with their own follow graph
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscriberResponse {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    /// Usernames following this follower
    pub subscribers: Vec<String>,
    /// Usernames this follower follows
    pub subscribed_to: Vec<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema, IntoParams, Validate)]
pub struct RecipesLimitQuery {
    /// Embedded recipes per author (default 3)
    #[validate(range(min = 0, max = 1000))]
    pub recipes_limit: Option<u64>,
}

/// Follow a user
#[utoipa::path(
    post,
    path = "/api/users/{user_id}/subscribe/",
    params(
        ("user_id" = i32, Path, description = "User to follow")
    ),
    responses(
        (status = 201, description = "Subscribed", body = SubscriptionResponse),
        (status = 400, description = "Already subscribed", body = crate::schemas::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::schemas::ErrorResponse),
        (status = 404, description = "User not found", body = crate::schemas::ErrorResponse)
    ),
    tag = "subscriptions"
)]
#[instrument(skip(state, me), fields(subscriber_id = me.id))]
pub async fn subscribe(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(user_id): Path<i32>,
) -> ApiResult<(StatusCode, Json<SubscriptionResponse>)> {
    let author = user::Entity::find_by_id(user_id)
        .one(&state.db)
        .await?
        .ok_or_else(ApiError::not_found)?;

    let existing = subscription::Entity::find()
        .filter(subscription::Column::SubscriberId.eq(me.id))
        .filter(subscription::Column::SubscribedToId.eq(author.id))
        .count(&state.db)
        .await?;
    if existing > 0 {
        return Err(ApiError::BadRequest(ALREADY_SUBSCRIBED.to_string()));
    }

    subscription::ActiveModel {
        subscriber_id: Set(me.id),
        subscribed_to_id: Set(author.id),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(|e| unique_as_bad_request(e, ALREADY_SUBSCRIBED))?;

    info!("User {} subscribed to user {}", me.id, author.id);
    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse {
            subscriber: me.username,
            subscribed_to: author.username,
        }),
    ))
}

/// Stop following a user
#[utoipa::path(
    delete,
    path = "/api/users/{user_id}/subscribe/",
    params(
        ("user_id" = i32, Path, description = "User to unfollow")
    ),
    responses(
        (status = 204, description = "Unsubscribed"),
        (status = 400, description = "Not subscribed", body = crate::schemas::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::schemas::ErrorResponse),
        (status = 404, description = "User not found", body = crate::schemas::ErrorResponse)
    ),
    tag = "subscriptions"
)]
#[instrument(skip(state, me), fields(subscriber_id = me.id))]
pub async fn unsubscribe(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(user_id): Path<i32>,
) -> ApiResult<StatusCode> {
    let author = user::Entity::find_by_id(user_id)
        .one(&state.db)
        .await?
        .ok_or_else(ApiError::not_found)?;

    let result = subscription::Entity::delete_many()
        .filter(subscription::Column::SubscriberId.eq(me.id))
        .filter(subscription::Column::SubscribedToId.eq(author.id))
        .exec(&state.db)
        .await?;
    if result.rows_affected == 0 {
        return Err(ApiError::BadRequest(
            "You are not subscribed to this user.".to_string(),
        ));
    }

    info!("User {} unsubscribed from user {}", me.id, author.id);
    Ok(StatusCode::NO_CONTENT)
}

/// Authors the current user follows
#[utoipa::path(
    get,
    path = "/api/users/subscriptions/",
    params(
        ("page" = Option<u64>, Query, description = "Page number"),
        ("limit" = Option<u64>, Query, description = "Page size, switches to limit/offset pagination"),
        ("offset" = Option<u64>, Query, description = "Offset for limit/offset pagination"),
        RecipesLimitQuery
    ),
    responses(
        (status = 200, description = "One page of followed authors", body = PaginatedSubscriptions),
        (status = 401, description = "Not authenticated", body = crate::schemas::ErrorResponse),
        (status = 404, description = "Invalid page", body = crate::schemas::ErrorResponse)
    ),
    tag = "subscriptions"
)]
#[instrument(skip(state, me), fields(user_id = me.id))]
pub async fn list_subscriptions(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    OriginalUri(uri): OriginalUri,
    Query(pairs): Query<Vec<(String, String)>>,
    ApiQuery(limits): ApiQuery<RecipesLimitQuery>,
) -> ApiResult<Json<PaginatedSubscriptions>> {
    limits.validate()?;
    let request = PageRequest::from_pairs(&pairs, state.settings.page_size)?;
    let recipes_limit = limits.recipes_limit.unwrap_or(DEFAULT_RECIPES_LIMIT) as usize;

    let followed = subscription::Entity::find()
        .select_only()
        .column(subscription::Column::SubscribedToId)
        .filter(subscription::Column::SubscriberId.eq(me.id))
        .into_query();
    let query = user::Entity::find().filter(user::Column::Id.in_subquery(followed));

    let count = query.clone().count(&state.db).await?;
    request.check_range(count)?;

    let authors = query
        .order_by_asc(user::Column::Id)
        .offset(request.offset())
        .limit(request.limit())
        .all(&state.db)
        .await?;

    let mut recipes_by_author: HashMap<i32, Vec<recipe::Model>> = HashMap::new();
    if !authors.is_empty() {
        for model in recipe::Entity::find()
            .filter(recipe::Column::AuthorId.is_in(authors.iter().map(|a| a.id)))
            .order_by_desc(recipe::Column::Id)
            .all(&state.db)
            .await?
        {
            recipes_by_author.entry(model.author_id).or_default().push(model);
        }
    }

    let viewer = Viewer::load(&state.db, Some(me.id)).await?;
    let media_url = &state.settings.media_url;
    let results = authors
        .into_iter()
        .map(|author| {
            let recipes = recipes_by_author.remove(&author.id).unwrap_or_default();
            SubscribedAuthorResponse {
                is_subscribed: viewer.is_subscribed_to(author.id),
                recipes_count: recipes.len() as u64,
                recipes: recipes
                    .iter()
                    .take(recipes_limit)
                    .map(|r| ShortRecipeResponse::new(r, media_url))
                    .collect(),
                email: author.email,
                id: author.id,
                username: author.username,
                first_name: author.first_name,
                last_name: author.last_name,
            }
        })
        .collect::<Vec<_>>();

    debug!("Listing {} followed authors of {}", results.len(), count);
    Ok(Json(paginate(results, count, &request, uri.path(), &pairs)))
}

/// Users following the current user
#[utoipa::path(
    get,
    path = "/api/users/subscribers/",
    responses(
        (status = 200, description = "Followers", body = Vec<SubscriberResponse>),
        (status = 401, description = "Not authenticated", body = crate::schemas::ErrorResponse)
    ),
    tag = "subscriptions"
)]
#[instrument(skip(state, me), fields(user_id = me.id))]
pub async fn list_subscribers(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
) -> ApiResult<Json<Vec<SubscriberResponse>>> {
    let following_me = subscription::Entity::find()
        .select_only()
        .column(subscription::Column::SubscriberId)
        .filter(subscription::Column::SubscribedToId.eq(me.id))
        .into_query();
    let followers = user::Entity::find()
        .filter(user::Column::Id.in_subquery(following_me))
        .order_by_asc(user::Column::Id)
        .all(&state.db)
        .await?;
    if followers.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let follower_ids: Vec<i32> = followers.iter().map(|f| f.id).collect();
    let edges = subscription::Entity::find()
        .filter(
            Condition::any()
                .add(subscription::Column::SubscriberId.is_in(follower_ids.iter().copied()))
                .add(subscription::Column::SubscribedToId.is_in(follower_ids.iter().copied())),
        )
        .order_by_asc(subscription::Column::Id)
        .all(&state.db)
        .await?;

    let involved: BTreeSet<i32> = edges
        .iter()
        .flat_map(|edge| [edge.subscriber_id, edge.subscribed_to_id])
        .collect();
    let usernames: HashMap<i32, String> = user::Entity::find()
        .select_only()
        .column(user::Column::Id)
        .column(user::Column::Username)
        .filter(user::Column::Id.is_in(involved))
        .into_tuple::<(i32, String)>()
        .all(&state.db)
        .await?
        .into_iter()
        .collect();

    let name_of = |id: i32| usernames.get(&id).cloned();
    let results = followers
        .into_iter()
        .map(|follower| SubscriberResponse {
            subscribers: edges
                .iter()
                .filter(|edge| edge.subscribed_to_id == follower.id)
                .filter_map(|edge| name_of(edge.subscriber_id))
                .collect(),
            subscribed_to: edges
                .iter()
                .filter(|edge| edge.subscriber_id == follower.id)
                .filter_map(|edge| name_of(edge.subscribed_to_id))
                .collect(),
            id: follower.id,
            email: follower.email,
            username: follower.username,
            first_name: follower.first_name,
            last_name: follower.last_name,
        })
        .collect::<Vec<_>>();

    debug!("User {} has {} followers", me.id, results.len());
    Ok(Json(results))
}
