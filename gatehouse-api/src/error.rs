use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gatehouse_core::CoreError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    ValidationError(String),
    InternalServerError(String),
    RateLimited,
    Domain(CoreError),
}

impl AppError {
    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            AppError::RateLimited => {
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", "Rate limit exceeded".to_string())
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "Internal Server Error".to_string())
            }
            AppError::Domain(err) => {
                let message = err.to_string();
                match err {
                    CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
                    CoreError::CapacityExceeded { .. } | CoreError::SoldOut { .. } => {
                        (StatusCode::CONFLICT, "SOLD_OUT", message)
                    }
                    CoreError::AlreadyResolved { .. } => (StatusCode::CONFLICT, "ALREADY_RESOLVED", message),
                    CoreError::StateConflict { .. } => (StatusCode::CONFLICT, "STATE_CONFLICT", message),
                    CoreError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION", message),
                    CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
                    CoreError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", format!("{} not found", msg)),
                    CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
                    CoreError::Storage(msg) => {
                        tracing::error!("Storage failure: {}", msg);
                        (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "Internal Server Error".to_string())
                    }
                }
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let body = Json(json!({
            "error": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        Self::Domain(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::TicketStatus;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CoreError::Validation("x".into()), StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            (CoreError::SoldOut { requested: 3, available: 2 }, StatusCode::CONFLICT, "SOLD_OUT"),
            (
                CoreError::AlreadyResolved { status: TicketStatus::Declined },
                StatusCode::CONFLICT,
                "ALREADY_RESOLVED",
            ),
            (CoreError::NotFound("ticket".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (CoreError::Forbidden("no".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (CoreError::Storage("db down".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        ];
        for (err, status, code) in cases {
            let (s, c, _) = AppError::from(err).parts();
            assert_eq!((s, c), (status, code));
        }
    }

    #[tokio::test]
    async fn test_rate_limit_uses_error_body() {
        let response = AppError::RateLimited.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "RATE_LIMITED");
        assert_eq!(body["message"], "Rate limit exceeded");
    }

    #[test]
    fn test_storage_details_are_not_leaked() {
        let (_, _, message) = AppError::from(CoreError::Storage("password=hunter2".into())).parts();
        assert_eq!(message, "Internal Server Error");
    }
}
