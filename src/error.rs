/*
 * Responsibility
 * - Error type returned by handlers and middleware
 * - IntoResponse (HTTP status / JSON error body / DPoP challenge)
 * - DpopError -> wire code; the specific variant is only logged, never returned
 */
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::dpop::{DpopError, ErrorCode};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Dpop(#[from] DpopError),

    // Missing or non-DPoP Authorization header.
    #[error("invalid token")]
    InvalidToken,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Dpop(e) => {
                let code = e.code();
                let status = match code {
                    ErrorCode::InvalidDpopProof => StatusCode::BAD_REQUEST,
                    ErrorCode::InvalidClient => StatusCode::UNAUTHORIZED,
                    ErrorCode::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, code.as_str(), code.message().to_string())
            }
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "Invalid Token".to_string(),
            ),
            AppError::InvalidRequest(message) => {
                (StatusCode::BAD_REQUEST, "invalid_request", message.clone())
            }
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "Internal Server Error".to_string(),
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        let mut response = (status, Json(body)).into_response();

        // RFC 9449 section 7.1: 401s carry a DPoP challenge
        if status == StatusCode::UNAUTHORIZED {
            let challenge = format!("DPoP error=\"{code}\"");
            if let Ok(value) = HeaderValue::from_str(&challenge) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, value);
            }
        }

        response
    }
}
