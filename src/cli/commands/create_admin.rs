use anyhow::{Context, Result, bail};
use model::entities::user::{self, UserRole};
use sea_orm::{ActiveModelTrait, ConnectionTrait, Database, Set};
use tracing::info;

use crate::auth::password::hash_password;

pub async fn create_admin(database_url: &str, email: &str, username: &str, password: &str) -> Result<()> {
    let db = Database::connect(database_url)
        .await
        .with_context(|| format!("Failed to connect to database '{database_url}'"))?;

    let admin = insert_admin(&db, email, username, password).await?;
    info!("Created admin {} with ID {}", admin.username, admin.id);
    Ok(())
}

pub async fn insert_admin<C>(db: &C, email: &str, username: &str, password: &str) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    if password.chars().count() < 8 {
        bail!("Password must contain at least 8 characters");
    }

    let model = user::ActiveModel {
        email: Set(email.to_string()),
        username: Set(username.to_string()),
        first_name: Set(String::new()),
        last_name: Set(String::new()),
        password_hash: Set(hash_password(password)?),
        role: Set(UserRole::Admin),
        bio: Set(String::new()),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .with_context(|| format!("Failed to create admin '{username}'"))?;

    Ok(model)
}
