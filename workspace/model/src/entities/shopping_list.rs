use super::{recipe, user};
use sea_orm::entity::prelude::*;

/// The shopping cart of a user. Each user owns at most one.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "shopping_lists")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub user_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(belongs_to = "user::Entity", from = "Column::UserId", to = "user::Column::Id")]
    User,
    #[sea_orm(has_many = "super::shopping_list_recipe::Entity")]
    ShoppingListRecipe,
}

impl Related<user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<recipe::Entity> for Entity {
    fn to() -> RelationDef {
        super::shopping_list_recipe::Relation::Recipe.def()
    }
    fn via() -> Option<RelationDef> {
        Some(super::shopping_list_recipe::Relation::ShoppingList.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
