//! Root of the SeaORM entity modules: users and their tokens, the tag and
//! ingredient catalogs, recipes with their join tables, favorites, shopping
//! lists and subscriptions.

pub mod auth_token;
pub mod favorite_recipe;
pub mod ingredient;
pub mod ingredient_amount;
pub mod recipe;
pub mod recipe_tag;
pub mod shopping_list;
pub mod shopping_list_recipe;
pub mod subscription;
pub mod tag;
pub mod user;

pub mod prelude {
    //! A prelude module for easy importing of all entities.
    pub use super::auth_token::Entity as AuthToken;
    pub use super::favorite_recipe::Entity as FavoriteRecipe;
    pub use super::ingredient::Entity as Ingredient;
    pub use super::ingredient_amount::Entity as IngredientAmount;
    pub use super::recipe::Entity as Recipe;
    pub use super::recipe_tag::Entity as RecipeTag;
    pub use super::shopping_list::Entity as ShoppingList;
    pub use super::shopping_list_recipe::Entity as ShoppingListRecipe;
    pub use super::subscription::Entity as Subscription;
    pub use super::tag::Entity as Tag;
    pub use super::user::Entity as User;
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{
        ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, DbErr,
        EntityTrait, ModelTrait, PaginatorTrait, QueryFilter, Set,
    };

    use super::*;
    use prelude::*;

    async fn setup_db() -> Result<DatabaseConnection, DbErr> {
        let db = Database::connect("sqlite::memory:").await?;
        db.execute_unprepared("PRAGMA foreign_keys = ON;").await?;
        Migrator::up(&db, None).await.expect("Migrations failed.");
        Ok(db)
    }

    async fn create_user(db: &DatabaseConnection, name: &str) -> Result<user::Model, DbErr> {
        user::ActiveModel {
            email: Set(format!("{name}@example.com")),
            username: Set(name.to_string()),
            first_name: Set("First".to_string()),
            last_name: Set("Last".to_string()),
            password_hash: Set("hash".to_string()),
            role: Set(user::UserRole::User),
            bio: Set(String::new()),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    async fn create_recipe(
        db: &DatabaseConnection,
        author: &user::Model,
        name: &str,
    ) -> Result<recipe::Model, DbErr> {
        recipe::ActiveModel {
            author_id: Set(author.id),
            name: Set(name.to_string()),
            image: Set(None),
            text: Set("Mix and bake.".to_string()),
            cooking_time: Set(30),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    #[tokio::test]
    async fn test_entity_integration() -> Result<(), DbErr> {
        let db = setup_db().await?;

        let author = create_user(&db, "author").await?;
        let reader = create_user(&db, "reader").await?;

        let breakfast = tag::ActiveModel {
            name: Set("Breakfast".to_string()),
            color: Set("#E26C2D".to_string()),
            slug: Set("breakfast".to_string()),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        let flour = ingredient::ActiveModel {
            name: Set("flour".to_string()),
            measurement_unit: Set("g".to_string()),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        let pancakes = create_recipe(&db, &author, "Pancakes").await?;

        recipe_tag::ActiveModel {
            recipe_id: Set(pancakes.id),
            tag_id: Set(breakfast.id),
        }
        .insert(&db)
        .await?;

        ingredient_amount::ActiveModel {
            recipe_id: Set(pancakes.id),
            ingredient_id: Set(flour.id),
            amount: Set(200),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        // Many-to-many traversal through the join tables
        let tags = pancakes.find_related(Tag).all(&db).await?;
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].slug, "breakfast");

        let ingredients = pancakes.find_related(Ingredient).all(&db).await?;
        assert_eq!(ingredients.len(), 1);
        assert_eq!(ingredients[0].name, "flour");

        let tagged = Recipe::find()
            .inner_join(Tag)
            .filter(tag::Column::Slug.eq("breakfast"))
            .all(&db)
            .await?;
        assert_eq!(tagged.len(), 1);

        // Shopping list with a recipe
        let list = shopping_list::ActiveModel {
            user_id: Set(reader.id),
            ..Default::default()
        }
        .insert(&db)
        .await?;
        shopping_list_recipe::ActiveModel {
            shopping_list_id: Set(list.id),
            recipe_id: Set(pancakes.id),
        }
        .insert(&db)
        .await?;
        let in_cart = list.find_related(Recipe).all(&db).await?;
        assert_eq!(in_cart.len(), 1);

        // Subscription
        subscription::ActiveModel {
            subscriber_id: Set(reader.id),
            subscribed_to_id: Set(author.id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&db)
        .await?;
        let followers = Subscription::find()
            .filter(subscription::Column::SubscribedToId.eq(author.id))
            .count(&db)
            .await?;
        assert_eq!(followers, 1);

        // Deleting the recipe cascades to its dependent rows
        Recipe::delete_by_id(pancakes.id).exec(&db).await?;
        assert_eq!(IngredientAmount::find().count(&db).await?, 0);
        assert_eq!(RecipeTag::find().count(&db).await?, 0);
        assert_eq!(ShoppingListRecipe::find().count(&db).await?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_favorite_is_unique_per_user_and_recipe() -> Result<(), DbErr> {
        let db = setup_db().await?;
        let author = create_user(&db, "author").await?;
        let recipe = create_recipe(&db, &author, "Soup").await?;

        let favorite = || favorite_recipe::ActiveModel {
            user_id: Set(author.id),
            recipe_id: Set(recipe.id),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        favorite().insert(&db).await?;
        let duplicate = favorite().insert(&db).await;
        assert!(duplicate.is_err());
        assert_eq!(FavoriteRecipe::find().count(&db).await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_favorites_are_reachable_from_both_sides() -> Result<(), DbErr> {
        let db = setup_db().await?;
        let author = create_user(&db, "author").await?;
        let fan = create_user(&db, "fan").await?;
        let recipe = create_recipe(&db, &author, "Pie").await?;

        let favorite = favorite_recipe::ActiveModel {
            user_id: Set(fan.id),
            recipe_id: Set(recipe.id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        let fan_favorites = fan.find_related(FavoriteRecipe).all(&db).await?;
        assert_eq!(fan_favorites.len(), 1);
        assert_eq!(fan_favorites[0].recipe_id, recipe.id);
        assert!(author.find_related(FavoriteRecipe).all(&db).await?.is_empty());

        let owner = favorite.find_related(User).one(&db).await?;
        assert_eq!(owner.map(|u| u.username), Some("fan".to_string()));

        Ok(())
    }

    #[tokio::test]
    async fn test_non_positive_amount_is_rejected() -> Result<(), DbErr> {
        let db = setup_db().await?;
        let author = create_user(&db, "author").await?;
        let recipe = create_recipe(&db, &author, "Water").await?;
        let salt = ingredient::ActiveModel {
            name: Set("salt".to_string()),
            measurement_unit: Set("g".to_string()),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        let result = ingredient_amount::ActiveModel {
            recipe_id: Set(recipe.id),
            ingredient_id: Set(salt.id),
            amount: Set(0),
            ..Default::default()
        }
        .insert(&db)
        .await;
        assert!(result.is_err());

        Ok(())
    }
}
