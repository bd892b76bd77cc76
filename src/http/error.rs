//! Maps every error kind the HTTP layer can produce onto a status code and
//! the `{"error": {"message": "..."}}` body shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::error::EngineError;
use crate::store::StorageError;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Request body failed validation (e.g. empty `source`).
    #[error("{0}")]
    Validation(String),

    /// Referenced function, deployment, or live deployment does not exist.
    #[error("not found")]
    NotFound,

    /// A failure from the JS execution core (compile/contract/runtime/serialization).
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A failure talking to the metadata store.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorMessage,
}

#[derive(Serialize)]
struct ErrorMessage {
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            error: ErrorMessage {
                message: self.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}
