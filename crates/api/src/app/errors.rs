use axum::http::{HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use serde_json::json;

use invista_infra::StockError;

/// Map a stock failure to its HTTP response.
///
/// Internal details are logged and never returned to the caller.
pub fn stock_error_to_response(err: StockError) -> axum::response::Response {
    match err {
        StockError::InvalidInput(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_input", msg),
        StockError::NotFound => json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "inventory record not found",
        ),
        StockError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StockError::StateConflict(msg) => json_error(StatusCode::CONFLICT, "state_conflict", msg),
        StockError::Unavailable(msg) => {
            tracing::warn!(reason = %msg, "stock operation unavailable");
            let mut res = json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                "stock service is temporarily unavailable, retry later",
            );
            res.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
            res
        }
        StockError::Internal(msg) => {
            tracing::error!(reason = %msg, "stock operation failed");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal server error",
            )
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
