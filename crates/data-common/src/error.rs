//! Error types for the data service

use thiserror::Error;

/// Data service error types
#[derive(Error, Debug)]
pub enum Error {
    // Request validation
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Resource {id} not found in collection {collection}")]
    ResourceNotFound { collection: String, id: String },

    #[error("No data provided")]
    NoData,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid query parameter: {0}")]
    InvalidQueryParam(String),

    // Database
    #[error("Execution failure: {0}")]
    Execution(String),

    // General
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for data service operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP status code for each error type
impl Error {
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::BadRequest(_) | Self::InvalidFilter(_) | Self::InvalidQueryParam(_) => 400,

            // 404 Not Found
            Self::CollectionNotFound(_) | Self::ResourceNotFound { .. } => 404,

            // 422 Unprocessable Entity
            Self::NoData => 422,

            // 500 Internal Server Error
            Self::Execution(_) | Self::Config(_) | Self::Io(_) | Self::Json(_) => 500,
        }
    }

    /// Machine-readable error code for API responses
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CollectionNotFound(_) => "collection_not_found",
            Self::ResourceNotFound { .. } => "resource_not_found",
            Self::NoData => "no_data",
            Self::BadRequest(_) => "bad_request",
            Self::InvalidFilter(_) => "invalid_filter",
            Self::InvalidQueryParam(_) => "invalid_param",
            Self::Execution(_) => "execution_failure",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
        }
    }

    /// Message safe to return to clients.
    ///
    /// Database and internal failures are opaque; their detail only goes to the log.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self.status_code() {
            500 => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}
