//! Opaque API tokens, sent as `Authorization: Token <key>`.

use chrono::Utc;
use model::entities::{auth_token, user};
use rand::RngCore;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};
use tracing::debug;

/// 40 hex characters from 20 random bytes.
pub fn generate_key() -> String {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Returns the user's existing token, creating one if there is none.
pub async fn issue_token<C>(db: &C, user_id: i32) -> Result<auth_token::Model, DbErr>
where
    C: ConnectionTrait,
{
    if let Some(existing) = auth_token::Entity::find()
        .filter(auth_token::Column::UserId.eq(user_id))
        .one(db)
        .await?
    {
        return Ok(existing);
    }

    debug!("Issuing a new API token for user {}", user_id);
    auth_token::ActiveModel {
        key: Set(generate_key()),
        user_id: Set(user_id),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
}

/// Deletes the user's token. Returns how many tokens were removed.
pub async fn revoke_token<C>(db: &C, user_id: i32) -> Result<u64, DbErr>
where
    C: ConnectionTrait,
{
    let result = auth_token::Entity::delete_many()
        .filter(auth_token::Column::UserId.eq(user_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

pub async fn find_user_by_token<C>(db: &C, key: &str) -> Result<Option<user::Model>, DbErr>
where
    C: ConnectionTrait,
{
    let found = auth_token::Entity::find_by_id(key.to_string())
        .find_also_related(user::Entity)
        .one(db)
        .await?;
    Ok(found.and_then(|(_, user)| user))
}
