use model::entities::{recipe, user};

use crate::error::ApiError;

pub fn require_admin(user: &user::Model) -> Result<(), ApiError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// Recipe writes are open to their author and to admins.
pub fn require_author_or_admin(user: &user::Model, recipe: &recipe::Model) -> Result<(), ApiError> {
    if recipe.author_id == user.id || user.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}
