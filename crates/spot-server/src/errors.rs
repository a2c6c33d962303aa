//! Maps `spot_core::Error` onto HTTP status codes: 5xx for
//! what the caller should retry, 4xx for what's terminal for that
//! request.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use spot_core::Error;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError(Error::from(err))
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError(Error::TransientUpstream(err.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::TransientUpstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::DataGap(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::SafetyAbort(_) => StatusCode::OK,
            Error::ExecutionFailure(_) => StatusCode::BAD_GATEWAY,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.0.to_string(),
            "kind": self.0.kind_name(),
        }));

        (status, body).into_response()
    }
}
