use super::user;
use sea_orm::entity::prelude::*;

/// Directed follow relation: `subscriber_id` follows `subscribed_to_id`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub subscriber_id: i32,
    pub subscribed_to_id: i32,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "user::Entity",
        from = "Column::SubscriberId",
        to = "user::Column::Id"
    )]
    Subscriber,
    #[sea_orm(
        belongs_to = "user::Entity",
        from = "Column::SubscribedToId",
        to = "user::Column::Id"
    )]
    SubscribedTo,
}

impl ActiveModelBehavior for ActiveModel {}
