use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{AdapterError, EngineError, OptimizeError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream failure: {0}")]
    BadGateway(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn bad_gateway(msg: impl Into<String>) -> Self {
        Self::BadGateway(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Input(e) => ApiError::bad_request(e.to_string()),
            EngineError::Busy { .. } => ApiError::conflict(err.to_string()),
            EngineError::NotFound(_) => ApiError::not_found(err.to_string()),
            EngineError::UnknownBackend(_) => ApiError::bad_request(err.to_string()),
        }
    }
}

impl From<OptimizeError> for ApiError {
    fn from(err: OptimizeError) -> Self {
        match err {
            OptimizeError::Input(e) => ApiError::bad_request(e.to_string()),
            OptimizeError::ProvidersExhausted { .. } => ApiError::bad_gateway(err.to_string()),
        }
    }
}

impl From<AdapterError> for ApiError {
    fn from(err: AdapterError) -> Self {
        match &err {
            AdapterError::Connect { .. } | AdapterError::Timeout(_) => {
                ApiError::bad_gateway(err.to_string())
            }
            AdapterError::Auth { .. } => ApiError::bad_gateway(err.to_string()),
            AdapterError::Unsupported { .. } => ApiError::bad_request(err.to_string()),
            AdapterError::Protocol(_) => ApiError::bad_gateway(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(err.to_string())
    }
}
