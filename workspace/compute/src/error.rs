use thiserror::Error;

/// Error types for the compute module
#[derive(Error, Debug)]
pub enum ComputeError {
    /// Error from the database operations
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Error while producing a document
    #[error("Render error: {0}")]
    Render(String),
}

impl From<lopdf::Error> for ComputeError {
    fn from(error: lopdf::Error) -> Self {
        ComputeError::Render(error.to_string())
    }
}

impl From<std::io::Error> for ComputeError {
    fn from(error: std::io::Error) -> Self {
        ComputeError::Render(error.to_string())
    }
}

/// Type alias for Result with ComputeError
pub type Result<T> = std::result::Result<T, ComputeError>;
