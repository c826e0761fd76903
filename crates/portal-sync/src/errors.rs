use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use portal_types::ports::order_gateway::GatewayError;
use serde::Serialize;
use thiserror::Error;

use crate::application::status::StatusUpdateError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Order endpoint failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl From<StatusUpdateError> for AppError {
    fn from(err: StatusUpdateError) -> Self {
        match err {
            StatusUpdateError::NotFound(id) => AppError::NotFound(format!("order {id}")),
            e @ StatusUpdateError::InvalidTransition { .. } => AppError::Conflict(e.to_string()),
            StatusUpdateError::Gateway(e) => AppError::Gateway(e),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, msg) = match &self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            AppError::Gateway(GatewayError::Timeout) => {
                (StatusCode::GATEWAY_TIMEOUT, GatewayError::Timeout.to_string())
            }
            AppError::Gateway(e) => (
                StatusCode::BAD_GATEWAY,
                e.server_message().map_or_else(|| e.to_string(), str::to_string),
            ),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into()),
        };

        let body = serde_json::to_string(&ErrorBody { error: msg })
            .unwrap_or_else(|_| "{\"error\":\"internal serialization\"}".into());
        (code, [("content-type", "application/json")], body).into_response()
    }
}
