use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use compute::error::ComputeError;
use sea_orm::{DbErr, SqlErr};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{error, warn};
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::schemas::ErrorResponse;

/// Field name to messages, e.g. `{"amount": ["Ensure this value is greater than or equal to 1."]}`.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Errors returned by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input.")]
    Validation(FieldErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication credentials were not provided.")]
    Unauthorized,

    #[error("{0}")]
    InvalidToken(String),

    #[error("You do not have permission to perform this action.")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Compute error: {0}")]
    Compute(#[from] ComputeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// A validation error on a single field.
    pub fn field(name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(name.into(), vec![message.into()]);
        ApiError::Validation(fields)
    }

    pub fn not_found() -> Self {
        ApiError::NotFound("Not found.".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized | ApiError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Database(_) | ApiError::Compute(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized => "NOT_AUTHENTICATED",
            ApiError::InvalidToken(_) => "AUTHENTICATION_FAILED",
            ApiError::Forbidden => "PERMISSION_DENIED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Database(_) => "DATABASE_ERROR",
            ApiError::Compute(_) | ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let error = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        let code = self.code().to_string();
        let fields = match self {
            ApiError::Validation(fields) => Some(fields),
            _ => None,
        };

        let body = ErrorResponse {
            error,
            code,
            success: false,
            fields,
        };
        (status, Json(body)).into_response()
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        flatten_validation_errors(&errors, None, &mut fields);
        ApiError::Validation(fields)
    }
}

/// Nested struct and list errors become dotted / indexed keys like `ingredients[0].amount`.
fn flatten_validation_errors(errors: &ValidationErrors, prefix: Option<&str>, out: &mut FieldErrors) {
    for (field, kind) in errors.errors() {
        let key = match prefix {
            Some(prefix) => format!("{prefix}.{field}"),
            None => field.to_string(),
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                let messages = out.entry(key).or_default();
                for err in field_errors {
                    let message = match &err.message {
                        Some(message) => message.to_string(),
                        None => format!("Invalid value ({}).", err.code),
                    };
                    messages.push(message);
                }
            }
            ValidationErrorsKind::Struct(inner) => {
                flatten_validation_errors(inner, Some(&key), out);
            }
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    let item_key = format!("{key}[{index}]");
                    flatten_validation_errors(inner, Some(&item_key), out);
                }
            }
        }
    }
}

/// True when the error comes from a unique index or primary key collision.
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Maps a unique violation to a 400 with the given message, anything else to a storage error.
pub fn unique_as_bad_request(err: DbErr, message: &str) -> ApiError {
    if is_unique_violation(&err) {
        ApiError::BadRequest(message.to_string())
    } else {
        ApiError::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use validator::Validate;

    #[derive(Debug, Deserialize, Validate)]
    struct Item {
        #[validate(range(min = 1, message = "Must be at least 1."))]
        amount: i32,
    }

    #[derive(Debug, Deserialize, Validate)]
    struct Body {
        #[validate(length(min = 1, message = "This field may not be blank."))]
        name: String,
        #[validate(nested)]
        items: Vec<Item>,
    }

    #[test]
    fn test_validation_errors_are_flattened() {
        let body = Body {
            name: String::new(),
            items: vec![Item { amount: 2 }, Item { amount: 0 }],
        };
        let err = ApiError::from(body.validate().unwrap_err());

        match err {
            ApiError::Validation(fields) => {
                assert_eq!(fields["name"], vec!["This field may not be blank."]);
                assert_eq!(fields["items[1].amount"], vec!["Must be at least 1."]);
                assert!(!fields.contains_key("items[0].amount"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_status_and_codes() {
        assert_eq!(ApiError::field("x", "y").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized.code(), "NOT_AUTHENTICATED");
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found().to_string(), "Not found.");
        assert_eq!(
            ApiError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
