use model::entities::{
    favorite_recipe, ingredient, ingredient_amount, shopping_list, shopping_list_recipe,
};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, instrument, warn};

use crate::error::Result;

/// One ingredient-amount row as it is fed to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientRow {
    pub name: String,
    pub amount: i64,
    pub measurement_unit: String,
}

impl IngredientRow {
    pub fn new(name: impl Into<String>, amount: i64, measurement_unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            amount,
            measurement_unit: measurement_unit.into(),
        }
    }
}

/// A consolidated shopping list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingItem {
    pub name: String,
    pub amount: i64,
    pub measurement_unit: String,
}

/// Ingredient totals in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShoppingList {
    items: Vec<ShoppingItem>,
    unit_conflicts: Vec<String>,
}

impl ShoppingList {
    pub fn items(&self) -> &[ShoppingItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ShoppingItem> {
        self.items.iter().find(|item| item.name == name)
    }

    /// Names that were seen with more than one measurement unit.
    /// Their totals keep the unit of the first row.
    pub fn unit_conflicts(&self) -> &[String] {
        &self.unit_conflicts
    }
}

/// Sums amounts per ingredient name.
///
/// Names are compared exactly, without any case or whitespace folding. The
/// unit of the first row seen for a name is kept even if later rows
/// disagree; such names are reported through [`ShoppingList::unit_conflicts`].
pub fn aggregate<I>(rows: I) -> ShoppingList
where
    I: IntoIterator<Item = IngredientRow>,
{
    let mut list = ShoppingList::default();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        match index.get(&row.name) {
            Some(&position) => {
                let item = &mut list.items[position];
                item.amount += row.amount;
                if item.measurement_unit != row.measurement_unit
                    && !list.unit_conflicts.contains(&row.name)
                {
                    list.unit_conflicts.push(row.name);
                }
            }
            None => {
                index.insert(row.name.clone(), list.items.len());
                list.items.push(ShoppingItem {
                    name: row.name,
                    amount: row.amount,
                    measurement_unit: row.measurement_unit,
                });
            }
        }
    }

    list
}

/// Which of a user's recipe collections feed the shopping list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub include_favorites: bool,
}

impl Selection {
    pub fn cart_only() -> Self {
        Self::default()
    }

    pub fn with_favorites() -> Self {
        Self {
            include_favorites: true,
        }
    }
}

/// Builds a user's shopping list from the recipes in their cart.
#[derive(Debug, Default)]
pub struct ShoppingListComputer;

impl ShoppingListComputer {
    pub fn new() -> Self {
        Self
    }

    /// Collects every ingredient row of the selected recipes, in storage order,
    /// and aggregates them.
    #[instrument(skip(self, db), fields(user_id = user_id, include_favorites = selection.include_favorites))]
    pub async fn compute_for_user<C>(
        &self,
        db: &C,
        user_id: i32,
        selection: Selection,
    ) -> Result<ShoppingList>
    where
        C: ConnectionTrait,
    {
        let recipe_ids = self.selected_recipe_ids(db, user_id, selection).await?;
        if recipe_ids.is_empty() {
            debug!("No recipes selected, shopping list is empty");
            return Ok(ShoppingList::default());
        }

        let rows = ingredient_amount::Entity::find()
            .filter(ingredient_amount::Column::RecipeId.is_in(recipe_ids.iter().copied()))
            .find_also_related(ingredient::Entity)
            .order_by_asc(ingredient_amount::Column::Id)
            .all(db)
            .await?;

        let rows = rows.into_iter().filter_map(|(amount, ingredient)| {
            ingredient.map(|ingredient| {
                IngredientRow::new(
                    ingredient.name,
                    i64::from(amount.amount),
                    ingredient.measurement_unit,
                )
            })
        });

        let list = aggregate(rows);
        for name in list.unit_conflicts() {
            warn!(ingredient = %name, "Ingredient appears with different measurement units, keeping the first one");
        }

        info!(
            "Aggregated {} ingredients from {} recipes",
            list.len(),
            recipe_ids.len()
        );
        Ok(list)
    }

    async fn selected_recipe_ids<C>(
        &self,
        db: &C,
        user_id: i32,
        selection: Selection,
    ) -> Result<BTreeSet<i32>>
    where
        C: ConnectionTrait,
    {
        let mut ids: BTreeSet<i32> = shopping_list_recipe::Entity::find()
            .inner_join(shopping_list::Entity)
            .filter(shopping_list::Column::UserId.eq(user_id))
            .select_only()
            .column(shopping_list_recipe::Column::RecipeId)
            .into_tuple::<i32>()
            .all(db)
            .await?
            .into_iter()
            .collect();

        if selection.include_favorites {
            let favorites: Vec<i32> = favorite_recipe::Entity::find()
                .filter(favorite_recipe::Column::UserId.eq(user_id))
                .select_only()
                .column(favorite_recipe::Column::RecipeId)
                .into_tuple()
                .all(db)
                .await?;
            ids.extend(favorites);
        }

        debug!("Selected {} recipes for user {}", ids.len(), user_id);
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use migration::{Migrator, MigratorTrait};
    use model::entities::{recipe, user};
    use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};

    async fn setup_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn create_user(db: &DatabaseConnection, name: &str) -> user::Model {
        user::ActiveModel {
            email: Set(format!("{name}@example.com")),
            username: Set(name.to_string()),
            first_name: Set(String::new()),
            last_name: Set(String::new()),
            password_hash: Set(String::new()),
            role: Set(user::UserRole::User),
            bio: Set(String::new()),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    async fn create_ingredient(db: &DatabaseConnection, name: &str, unit: &str) -> ingredient::Model {
        ingredient::ActiveModel {
            name: Set(name.to_string()),
            measurement_unit: Set(unit.to_string()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    async fn create_recipe(
        db: &DatabaseConnection,
        author: &user::Model,
        name: &str,
        ingredients: &[(&ingredient::Model, i32)],
    ) -> recipe::Model {
        let recipe = recipe::ActiveModel {
            author_id: Set(author.id),
            name: Set(name.to_string()),
            image: Set(None),
            text: Set(String::new()),
            cooking_time: Set(10),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();

        for (ingredient, amount) in ingredients {
            ingredient_amount::ActiveModel {
                recipe_id: Set(recipe.id),
                ingredient_id: Set(ingredient.id),
                amount: Set(*amount),
                ..Default::default()
            }
            .insert(db)
            .await
            .unwrap();
        }
        recipe
    }

    async fn add_to_cart(db: &DatabaseConnection, user: &user::Model, recipe: &recipe::Model) {
        let list = match shopping_list::Entity::find()
            .filter(shopping_list::Column::UserId.eq(user.id))
            .one(db)
            .await
            .unwrap()
        {
            Some(list) => list,
            None => shopping_list::ActiveModel {
                user_id: Set(user.id),
                ..Default::default()
            }
            .insert(db)
            .await
            .unwrap(),
        };
        shopping_list_recipe::ActiveModel {
            shopping_list_id: Set(list.id),
            recipe_id: Set(recipe.id),
        }
        .insert(db)
        .await
        .unwrap();
    }

    #[test]
    fn test_aggregate_sums_by_name_in_first_seen_order() {
        let list = aggregate(vec![
            IngredientRow::new("flour", 200, "g"),
            IngredientRow::new("flour", 100, "g"),
            IngredientRow::new("sugar", 50, "g"),
        ]);

        assert_eq!(list.len(), 2);
        assert_eq!(list.items()[0].name, "flour");
        assert_eq!(list.items()[0].amount, 300);
        assert_eq!(list.items()[1].name, "sugar");
        assert_eq!(list.items()[1].amount, 50);
        assert!(list.unit_conflicts().is_empty());
    }

    #[test]
    fn test_aggregate_empty_input() {
        let list = aggregate(Vec::new());
        assert!(list.is_empty());
    }

    #[test]
    fn test_aggregate_keeps_first_unit_and_reports_conflict() {
        let list = aggregate(vec![
            IngredientRow::new("milk", 200, "ml"),
            IngredientRow::new("milk", 1, "cup"),
        ]);

        let milk = list.get("milk").unwrap();
        assert_eq!(milk.amount, 201);
        assert_eq!(milk.measurement_unit, "ml");
        assert_eq!(list.unit_conflicts(), ["milk".to_string()]);
    }

    #[test]
    fn test_aggregate_does_not_fold_case() {
        let list = aggregate(vec![
            IngredientRow::new("Salt", 1, "g"),
            IngredientRow::new("salt", 2, "g"),
        ]);
        assert_eq!(list.len(), 2);
    }

    #[tokio::test]
    async fn test_compute_for_user_aggregates_cart() {
        let db = setup_db().await;
        let cook = create_user(&db, "cook").await;
        let flour = create_ingredient(&db, "flour", "g").await;
        let sugar = create_ingredient(&db, "sugar", "g").await;

        let bread = create_recipe(&db, &cook, "Bread", &[(&flour, 200)]).await;
        let cake = create_recipe(&db, &cook, "Cake", &[(&flour, 100), (&sugar, 50)]).await;
        create_recipe(&db, &cook, "Unrelated", &[(&sugar, 999)]).await;

        add_to_cart(&db, &cook, &bread).await;
        add_to_cart(&db, &cook, &cake).await;

        let list = ShoppingListComputer::new()
            .compute_for_user(&db, cook.id, Selection::cart_only())
            .await
            .unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(list.get("flour").unwrap().amount, 300);
        assert_eq!(list.get("sugar").unwrap().amount, 50);
    }

    #[tokio::test]
    async fn test_compute_for_user_with_empty_cart() {
        let db = setup_db().await;
        let cook = create_user(&db, "cook").await;

        let list = ShoppingListComputer::new()
            .compute_for_user(&db, cook.id, Selection::cart_only())
            .await
            .unwrap();

        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn test_compute_for_user_includes_favorites_once() {
        let db = setup_db().await;
        let cook = create_user(&db, "cook").await;
        let eggs = create_ingredient(&db, "eggs", "pcs").await;
        let omelette = create_recipe(&db, &cook, "Omelette", &[(&eggs, 3)]).await;
        let scramble = create_recipe(&db, &cook, "Scramble", &[(&eggs, 2)]).await;

        add_to_cart(&db, &cook, &omelette).await;
        for recipe in [&omelette, &scramble] {
            favorite_recipe::ActiveModel {
                user_id: Set(cook.id),
                recipe_id: Set(recipe.id),
                created_at: Set(Utc::now()),
                ..Default::default()
            }
            .insert(&db)
            .await
            .unwrap();
        }

        let computer = ShoppingListComputer::new();
        let cart_only = computer
            .compute_for_user(&db, cook.id, Selection::cart_only())
            .await
            .unwrap();
        assert_eq!(cart_only.get("eggs").unwrap().amount, 3);

        let with_favorites = computer
            .compute_for_user(&db, cook.id, Selection::with_favorites())
            .await
            .unwrap();
        assert_eq!(with_favorites.get("eggs").unwrap().amount, 5);
    }
}
