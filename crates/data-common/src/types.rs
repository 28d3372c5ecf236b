//! Common types for the data service

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Error;

/// A single row: column name to value
pub type Document = serde_json::Map<String, JsonValue>;

/// Envelope used for both request and response bodies
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Body {
    #[serde(default)]
    pub data: Vec<Document>,
}

impl Body {
    pub fn new(data: Vec<Document>) -> Self {
        Self { data }
    }
}

/// One entry of an error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub status: String,
    pub code: String,
    pub title: String,
}

impl ApiError {
    pub fn new(status: u16, code: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            status: status.to_string(),
            code: code.into(),
            title: title.into(),
        }
    }
}

impl From<&Error> for ApiError {
    fn from(err: &Error) -> Self {
        Self::new(err.status_code(), err.error_code(), err.public_message())
    }
}

/// Error response body: `{"errors": [...]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub errors: Vec<ApiError>,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        Self {
            errors: vec![ApiError::from(err)],
        }
    }
}
