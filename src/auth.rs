//! Authentication: password hashing, opaque API tokens, JWTs and the
//! request extractors that resolve the current user.

pub mod extractor;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod tokens;

pub use extractor::{AdminUser, CurrentUser, MaybeUser};
