//! Per-request context of the viewing user, used to derive `is_favorited`,
//! `is_in_shopping_cart` and `is_subscribed` without further queries.

use model::entities::{favorite_recipe, shopping_list, shopping_list_recipe, subscription};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect};
use std::collections::HashSet;
use tracing::trace;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: Option<i32>,
    pub favorites: HashSet<i32>,
    pub cart: HashSet<i32>,
    pub following: HashSet<i32>,
}

/// Derived flags of one recipe for one viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecipeFlags {
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(
        user_id: i32,
        favorites: HashSet<i32>,
        cart: HashSet<i32>,
        following: HashSet<i32>,
    ) -> Self {
        Self {
            user_id: Some(user_id),
            favorites,
            cart,
            following,
        }
    }

    /// Loads the viewer's favorite, cart and subscription ids.
    pub async fn load<C>(db: &C, user_id: Option<i32>) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let Some(user_id) = user_id else {
            return Ok(Self::anonymous());
        };

        let favorites: Vec<i32> = favorite_recipe::Entity::find()
            .filter(favorite_recipe::Column::UserId.eq(user_id))
            .select_only()
            .column(favorite_recipe::Column::RecipeId)
            .into_tuple()
            .all(db)
            .await?;

        let cart: Vec<i32> = shopping_list_recipe::Entity::find()
            .inner_join(shopping_list::Entity)
            .filter(shopping_list::Column::UserId.eq(user_id))
            .select_only()
            .column(shopping_list_recipe::Column::RecipeId)
            .into_tuple()
            .all(db)
            .await?;

        let following: Vec<i32> = subscription::Entity::find()
            .filter(subscription::Column::SubscriberId.eq(user_id))
            .select_only()
            .column(subscription::Column::SubscribedToId)
            .into_tuple()
            .all(db)
            .await?;

        trace!(
            "Viewer {} has {} favorites, {} cart recipes, {} subscriptions",
            user_id,
            favorites.len(),
            cart.len(),
            following.len()
        );
        Ok(Self::new(
            user_id,
            favorites.into_iter().collect(),
            cart.into_iter().collect(),
            following.into_iter().collect(),
        ))
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn flags_for_recipe(&self, recipe_id: i32) -> RecipeFlags {
        RecipeFlags {
            is_favorited: self.favorites.contains(&recipe_id),
            is_in_shopping_cart: self.cart.contains(&recipe_id),
        }
    }

    pub fn is_subscribed_to(&self, author_id: i32) -> bool {
        self.following.contains(&author_id)
    }
}
