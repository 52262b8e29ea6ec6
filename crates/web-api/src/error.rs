//! API 错误到 HTTP 响应的映射
//!
//! 响应体形态是对外契约的一部分：
//! 401 返回 `{"error": "..."}`，429 返回 `{"error", "message", "retryAfter"}`。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use application::{ApplicationError, RateLimitError};
use domain::TokenError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: serde_json::Value,
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: json!({ "error": message.into() }),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({ "error": message.into() }),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: json!({ "error": message.into() }),
        }
    }

    pub fn too_many_requests(err: &RateLimitError) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: json!({
                "error": "Too many requests",
                "message": err.to_string(),
                "retryAfter": err.retry_after(),
            }),
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: json!({ "error": message.into() }),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: json!({ "error": message.into() }),
        }
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match error {
            ApplicationError::RateLimit(ref err) => ApiError::too_many_requests(err),
            ApplicationError::Token(TokenError::Expired) => ApiError::unauthorized("Token expired"),
            ApplicationError::Token(TokenError::Invalid) => ApiError::unauthorized("Invalid token"),
            ApplicationError::SessionStore(err) => ApiError::service_unavailable(err.to_string()),
            ApplicationError::Crypto(_) => ApiError::internal("encryption failure"),
            ApplicationError::Hub(err) => ApiError::bad_request(err.to_string()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(error: TokenError) -> Self {
        ApiError::from(ApplicationError::Token(error))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_body_shape() {
        let err = RateLimitError::Exceeded {
            limit: 10,
            window_seconds: 60,
        };
        let api = ApiError::too_many_requests(&err);
        assert_eq!(api.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(api.body["retryAfter"], 60);
        assert!(api.body["message"]
            .as_str()
            .unwrap()
            .contains("10 requests per 60 seconds"));
    }

    #[test]
    fn test_token_errors_map_to_401() {
        let api = ApiError::from(TokenError::Expired);
        assert_eq!(api.status, StatusCode::UNAUTHORIZED);
        assert_eq!(api.body["error"], "Token expired");

        let api = ApiError::from(TokenError::Invalid);
        assert_eq!(api.status, StatusCode::UNAUTHORIZED);
        assert_eq!(api.body["error"], "Invalid token");
    }
}
