use crate::api::responses::{ErrorCode, ErrorResponse, format_timestamp};
use crate::error::{AppError, DomainError, StoreError};
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use time::OffsetDateTime;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("admin access required")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::Unauthorized => ErrorCode::Unauthorized,
            ApiError::Forbidden => ErrorCode::Forbidden,
            ApiError::NotFound(_) => ErrorCode::NotFound,
            ApiError::Conflict(_) => ErrorCode::Conflict,
            ApiError::Validation(_) => ErrorCode::ValidationError,
            ApiError::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn body(&self, now: OffsetDateTime) -> ErrorResponse {
        let error_message = match self {
            ApiError::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            other => capitalize(&other.to_string()),
        };
        ErrorResponse {
            error_code: self.code(),
            error_message,
            timestamp: format_timestamp(now),
        }
    }
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(message) = &self {
            error!(message = message.as_str(), "Internal error while handling request");
        }
        let body = self.body(OffsetDateTime::now_utc());
        (self.status(), Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LocationNotFound(_) => ApiError::NotFound("location not found".to_string()),
            StoreError::SensorNotFound(_) => ApiError::NotFound("sensor not found".to_string()),
            StoreError::PlanNotFound(_) => ApiError::NotFound("plan not found".to_string()),
            StoreError::FavoriteNotFound(_) => {
                ApiError::NotFound("favorite not found".to_string())
            }
            StoreError::Conflict(message) => ApiError::Conflict(message),
            StoreError::Domain(err) => err.into(),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Store(err) => err.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn store_errors_map_to_http_statuses() {
        let cases = [
            (StoreError::LocationNotFound(1), StatusCode::NOT_FOUND),
            (StoreError::PlanNotFound(2), StatusCode::NOT_FOUND),
            (
                StoreError::Conflict("duplicate".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                StoreError::Domain(DomainError::InvalidCapacity(0)),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn time_range_error_message_is_user_facing() {
        let body = ApiError::from(DomainError::EndBeforeStart).body(datetime!(2026-01-11 12:00 UTC));

        assert_eq!(body.error_code, ErrorCode::ValidationError);
        assert_eq!(body.error_message, "End time must be after start time");
        assert_eq!(body.timestamp, "2026-01-11T12:00:00Z");
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = ApiError::from(AppError::StateLock);
        let body = err.body(datetime!(2026-01-11 12:00 UTC));

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error_code, ErrorCode::InternalError);
        assert_eq!(body.error_message, "Internal server error");
    }
}
