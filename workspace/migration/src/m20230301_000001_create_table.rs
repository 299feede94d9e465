use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create users table
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_auto(Users::Id))
                    .col(string_len(Users::Email, 254).unique_key())
                    .col(string_len(Users::Username, 150).unique_key())
                    .col(string_len(Users::FirstName, 150))
                    .col(string_len(Users::LastName, 150))
                    .col(string(Users::PasswordHash))
                    .col(string_len(Users::Role, 20).default("user"))
                    .col(text(Users::Bio).default(""))
                    .col(boolean(Users::IsActive).default(true))
                    .to_owned(),
            )
            .await?;

        // Create auth_tokens table, one token per user
        manager
            .create_table(
                Table::create()
                    .table(AuthTokens::Table)
                    .if_not_exists()
                    .col(string_len(AuthTokens::Key, 40).primary_key())
                    .col(integer(AuthTokens::UserId).unique_key())
                    .col(
                        timestamp_with_time_zone(AuthTokens::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_auth_token_user")
                            .from(AuthTokens::Table, AuthTokens::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create tags table
        manager
            .create_table(
                Table::create()
                    .table(Tags::Table)
                    .if_not_exists()
                    .col(pk_auto(Tags::Id))
                    .col(string_len(Tags::Name, 50))
                    .col(string_len(Tags::Color, 7))
                    .col(string_len(Tags::Slug, 50).unique_key())
                    .to_owned(),
            )
            .await?;

        // Create ingredients table
        manager
            .create_table(
                Table::create()
                    .table(Ingredients::Table)
                    .if_not_exists()
                    .col(pk_auto(Ingredients::Id))
                    .col(string_len(Ingredients::Name, 100))
                    .col(string_len(Ingredients::MeasurementUnit, 50))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ingredients_name")
                    .table(Ingredients::Table)
                    .col(Ingredients::Name)
                    .to_owned(),
            )
            .await?;

        // Create recipes table
        manager
            .create_table(
                Table::create()
                    .table(Recipes::Table)
                    .if_not_exists()
                    .col(pk_auto(Recipes::Id))
                    .col(integer(Recipes::AuthorId))
                    .col(string_len(Recipes::Name, 200))
                    .col(string_null(Recipes::Image))
                    .col(text(Recipes::Text))
                    .col(integer(Recipes::CookingTime).check(Expr::col(Recipes::CookingTime).gte(1)))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_recipe_author")
                            .from(Recipes::Table, Recipes::AuthorId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create recipe_tags table (join table)
        manager
            .create_table(
                Table::create()
                    .table(RecipeTags::Table)
                    .if_not_exists()
                    .col(integer(RecipeTags::RecipeId))
                    .col(integer(RecipeTags::TagId))
                    .primary_key(
                        Index::create()
                            .name("pk_recipe_tags")
                            .col(RecipeTags::RecipeId)
                            .col(RecipeTags::TagId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_recipe_tags_recipe")
                            .from(RecipeTags::Table, RecipeTags::RecipeId)
                            .to(Recipes::Table, Recipes::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_recipe_tags_tag")
                            .from(RecipeTags::Table, RecipeTags::TagId)
                            .to(Tags::Table, Tags::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create ingredient_amounts table (recipe <-> ingredient with quantity)
        manager
            .create_table(
                Table::create()
                    .table(IngredientAmounts::Table)
                    .if_not_exists()
                    .col(pk_auto(IngredientAmounts::Id))
                    .col(integer(IngredientAmounts::RecipeId))
                    .col(integer(IngredientAmounts::IngredientId))
                    .col(
                        integer(IngredientAmounts::Amount)
                            .check(Expr::col(IngredientAmounts::Amount).gt(0)),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ingredient_amount_recipe")
                            .from(IngredientAmounts::Table, IngredientAmounts::RecipeId)
                            .to(Recipes::Table, Recipes::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ingredient_amount_ingredient")
                            .from(IngredientAmounts::Table, IngredientAmounts::IngredientId)
                            .to(Ingredients::Table, Ingredients::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create favorite_recipes table
        manager
            .create_table(
                Table::create()
                    .table(FavoriteRecipes::Table)
                    .if_not_exists()
                    .col(pk_auto(FavoriteRecipes::Id))
                    .col(integer(FavoriteRecipes::UserId))
                    .col(integer(FavoriteRecipes::RecipeId))
                    .col(
                        timestamp_with_time_zone(FavoriteRecipes::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_favorite_recipe_user")
                            .from(FavoriteRecipes::Table, FavoriteRecipes::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_favorite_recipe_recipe")
                            .from(FavoriteRecipes::Table, FavoriteRecipes::RecipeId)
                            .to(Recipes::Table, Recipes::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_favorite_recipes_user_recipe")
                    .table(FavoriteRecipes::Table)
                    .col(FavoriteRecipes::UserId)
                    .col(FavoriteRecipes::RecipeId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create shopping_lists table, one list per user
        manager
            .create_table(
                Table::create()
                    .table(ShoppingLists::Table)
                    .if_not_exists()
                    .col(pk_auto(ShoppingLists::Id))
                    .col(integer(ShoppingLists::UserId).unique_key())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_shopping_list_user")
                            .from(ShoppingLists::Table, ShoppingLists::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create shopping_list_recipes table (join table)
        manager
            .create_table(
                Table::create()
                    .table(ShoppingListRecipes::Table)
                    .if_not_exists()
                    .col(integer(ShoppingListRecipes::ShoppingListId))
                    .col(integer(ShoppingListRecipes::RecipeId))
                    .primary_key(
                        Index::create()
                            .name("pk_shopping_list_recipes")
                            .col(ShoppingListRecipes::ShoppingListId)
                            .col(ShoppingListRecipes::RecipeId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_shopping_list_recipes_list")
                            .from(ShoppingListRecipes::Table, ShoppingListRecipes::ShoppingListId)
                            .to(ShoppingLists::Table, ShoppingLists::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_shopping_list_recipes_recipe")
                            .from(ShoppingListRecipes::Table, ShoppingListRecipes::RecipeId)
                            .to(Recipes::Table, Recipes::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create subscriptions table
        manager
            .create_table(
                Table::create()
                    .table(Subscriptions::Table)
                    .if_not_exists()
                    .col(pk_auto(Subscriptions::Id))
                    .col(integer(Subscriptions::SubscriberId))
                    .col(integer(Subscriptions::SubscribedToId))
                    .col(
                        timestamp_with_time_zone(Subscriptions::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_subscription_subscriber")
                            .from(Subscriptions::Table, Subscriptions::SubscriberId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_subscription_subscribed_to")
                            .from(Subscriptions::Table, Subscriptions::SubscribedToId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_subscriptions_pair")
                    .table(Subscriptions::Table)
                    .col(Subscriptions::SubscriberId)
                    .col(Subscriptions::SubscribedToId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop tables in reverse order to avoid foreign key constraints
        manager
            .drop_table(Table::drop().table(Subscriptions::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ShoppingListRecipes::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ShoppingLists::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(FavoriteRecipes::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(IngredientAmounts::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(RecipeTags::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Recipes::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Ingredients::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Tags::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(AuthTokens::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Email,
    Username,
    FirstName,
    LastName,
    PasswordHash,
    Role,
    Bio,
    IsActive,
}

#[derive(DeriveIden)]
enum AuthTokens {
    Table,
    Key,
    UserId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Tags {
    Table,
    Id,
    Name,
    Color,
    Slug,
}

#[derive(DeriveIden)]
enum Ingredients {
    Table,
    Id,
    Name,
    MeasurementUnit,
}

#[derive(DeriveIden)]
enum Recipes {
    Table,
    Id,
    AuthorId,
    Name,
    Image,
    Text,
    CookingTime,
}

#[derive(DeriveIden)]
enum RecipeTags {
    Table,
    RecipeId,
    TagId,
}

#[derive(DeriveIden)]
enum IngredientAmounts {
    Table,
    Id,
    RecipeId,
    IngredientId,
    Amount,
}

#[derive(DeriveIden)]
enum FavoriteRecipes {
    Table,
    Id,
    UserId,
    RecipeId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ShoppingLists {
    Table,
    Id,
    UserId,
}

#[derive(DeriveIden)]
enum ShoppingListRecipes {
    Table,
    ShoppingListId,
    RecipeId,
}

#[derive(DeriveIden)]
enum Subscriptions {
    Table,
    Id,
    SubscriberId,
    SubscribedToId,
    CreatedAt,
}
