use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use thiserror::Error;

/// Request-level error taxonomy. Every failure path in the service maps to
/// exactly one of these kinds; the HTTP layer renders them as
/// `{"error": "..."}` with the matching status.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    /// Missing or unresolvable bearer credential.
    #[error("{0}")]
    Unauthorized(String),

    /// Order, product or coupon absent (or not owned by the caller).
    #[error("{0}")]
    NotFound(String),

    /// Business-rule conflict: wrong order status, duplicate coupon,
    /// usage caps, insufficient stock, below-minimum totals.
    #[error("{0}")]
    Conflict(String),

    /// Unexpected database failure or invariant violation. The detail is
    /// logged but never leaked to the caller.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<diesel::result::Error> for AppError {
    fn from(e: diesel::result::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<r2d2::Error> for AppError {
    fn from(e: r2d2::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl actix_web::ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Internal(detail) => {
                log::error!("internal error: {}", detail);
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Internal server error"
                }))
            }
            other => HttpResponse::build(other.status_code()).json(serde_json::json!({
                "error": other.to_string()
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;

    #[test]
    fn validation_returns_400() {
        let resp = AppError::Validation("bad input".to_string()).error_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn conflict_returns_400() {
        let resp = AppError::Conflict("already applied".to_string()).error_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unauthorized_returns_401() {
        let resp = AppError::Unauthorized("Unauthorized".to_string()).error_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn not_found_returns_404() {
        let resp = AppError::NotFound("Order not found".to_string()).error_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_error_returns_500() {
        let err = AppError::Internal("something went wrong".to_string());
        assert_eq!(
            err.error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn business_errors_display_their_message() {
        assert_eq!(
            AppError::NotFound("Coupon not found".to_string()).to_string(),
            "Coupon not found"
        );
        assert_eq!(
            AppError::Conflict("Order already has a coupon".to_string()).to_string(),
            "Order already has a coupon"
        );
    }

    #[test]
    fn internal_display_keeps_detail_for_logs() {
        assert_eq!(
            AppError::Internal("msg".to_string()).to_string(),
            "Internal error: msg"
        );
    }

    #[test]
    fn diesel_error_maps_to_internal() {
        let app_err: AppError = diesel::result::Error::NotFound.into();
        assert!(matches!(app_err, AppError::Internal(_)));
    }
}
