//! HTTP handlers for the collection endpoints

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::{error, info};

use data_common::error::{Error, Result};
use data_common::types::{ApiError, Body, Document, ErrorBody};

use crate::executor::Executor;
use crate::params::QueryParams;

/// Shared handler state
pub struct DataState {
    pub executor: Executor,
}

impl DataState {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }
}

/// GET /{collection} - Read matching documents
pub async fn read_handler(
    state: web::Data<DataState>,
    path: web::Path<String>,
    req: HttpRequest,
) -> HttpResponse {
    let collection = path.into_inner();
    let params = QueryParams::parse(req.query_string());

    match state.executor.read(&collection, &params).await {
        Ok(data) => HttpResponse::Ok().json(Body::new(data)),
        Err(e) => error_response(&e),
    }
}

/// GET /{collection}/{id} - Read one document
pub async fn find_handler(
    state: web::Data<DataState>,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> HttpResponse {
    let (collection, id) = path.into_inner();
    let params = QueryParams::parse(req.query_string());

    match state.executor.find(&collection, &id, &params).await {
        Ok(data) => HttpResponse::Ok().json(Body::new(data)),
        Err(e) => error_response(&e),
    }
}

/// POST /{collection} - Create a document
pub async fn create_handler(
    state: web::Data<DataState>,
    path: web::Path<String>,
    body: web::Bytes,
) -> HttpResponse {
    let collection = path.into_inner();

    let result = match decode_body(&body) {
        Ok(documents) => state.executor.create(&collection, documents).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(data) => {
            info!(collection = %collection, "document created");
            HttpResponse::Created().json(Body::new(data))
        }
        Err(e) => error_response(&e),
    }
}

/// PUT /{collection}/{id} - Update one document
pub async fn update_handler(
    state: web::Data<DataState>,
    path: web::Path<(String, String)>,
    body: web::Bytes,
    req: HttpRequest,
) -> HttpResponse {
    let (collection, id) = path.into_inner();
    let params = QueryParams::parse(req.query_string());

    let result = match decode_body(&body) {
        Ok(documents) => {
            state
                .executor
                .update(&collection, &id, documents, &params)
                .await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(data) => HttpResponse::Ok().json(Body::new(data)),
        Err(e) => error_response(&e),
    }
}

/// DELETE /{collection}/{id} - Delete one document
pub async fn delete_handler(
    state: web::Data<DataState>,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> HttpResponse {
    let (collection, id) = path.into_inner();
    let params = QueryParams::parse(req.query_string());

    match state.executor.delete(&collection, &id, &params).await {
        Ok(deleted) => {
            info!(collection = %collection, id = %id, deleted, "document deleted");
            HttpResponse::NoContent().finish()
        }
        Err(e) => error_response(&e),
    }
}

/// Health check
pub async fn health_handler() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "data",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Fallback for unmatched routes and methods
pub async fn not_found_handler() -> HttpResponse {
    HttpResponse::NotFound().json(ErrorBody {
        errors: vec![ApiError::new(404, "not_found", "Not found")],
    })
}

/// Map an error to its status and `{"errors": [...]}` body
pub fn error_response(err: &Error) -> HttpResponse {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(error = %err, "request failed");
    }
    HttpResponse::build(status).json(ErrorBody::from(err))
}

/// Decode a `{"data": [...]}` write body.
///
/// An empty body yields no documents; the executor rejects that with `NoData`.
fn decode_body(raw: &[u8]) -> Result<Vec<Document>> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice::<Body>(raw)
        .map(|body| body.data)
        .map_err(|e| Error::BadRequest(format!("invalid request body: {e}")))
}
