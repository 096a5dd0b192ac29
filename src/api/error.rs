use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sprintify_core::StoreError;
use thiserror::Error;

use crate::ai::GeminiError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{message}")]
    TooManyRequests {
        message: String,
        retry_after: Option<u64>,
    },

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(m) => Self::NotFound(m),
            StoreError::Conflict(m) => Self::Conflict(m),
            StoreError::Invalid(m) => Self::BadRequest(m),
            StoreError::Forbidden(m) => Self::Forbidden(m),
            StoreError::QuotaExceeded(q) => Self::TooManyRequests {
                message: q.to_string(),
                retry_after: None,
            },
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<GeminiError> for ApiError {
    fn from(e: GeminiError) -> Self {
        match e {
            GeminiError::NotConfigured => Self::ServiceUnavailable(e.to_string()),
            GeminiError::RateLimited => {
                Self::ServiceUnavailable("AI service is busy, try again later".into())
            }
            GeminiError::Blocked(_) => {
                Self::BadRequest("the AI service refused this goal, try rephrasing it".into())
            }
            other => {
                tracing::warn!(error = %other, "AI plan generation failed");
                Self::BadGateway("AI service returned an unusable answer".into())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut response = (status, Json(json!({ "success": false, "error": message }))).into_response();
        if let Self::TooManyRequests {
            retry_after: Some(secs),
            ..
        } = self
        {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
