use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::engine::EngineError;
use crate::store::StoreError;

/// Error taxonomy surfaced by the ingress.
///
/// Validation, unknown-order and wrong-state failures are the caller's fault
/// (400); store and engine failures are ours (500). Every response carries
/// the `{error, result}` envelope.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("order not exist")]
    NotFound,
    #[error("order status not init")]
    InvalidState,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) | AppError::NotFound | AppError::InvalidState => {
                StatusCode::BAD_REQUEST
            }
            AppError::Store(_) | AppError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "error": self.to_string(),
            "result": {},
        }));
        (status, body).into_response()
    }
}
