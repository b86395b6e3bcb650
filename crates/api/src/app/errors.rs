use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockledger_infra::LedgerError;

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    match err {
        LedgerError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        LedgerError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        LedgerError::Consistency(e) if e.is_conflict() => json_error(StatusCode::CONFLICT, "conflict", e.to_string()),
        LedgerError::Consistency(e) => {
            tracing::error!(error = %e, "unit of work failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "consistency_error", e.to_string())
        }
        LedgerError::Storage(e) => {
            tracing::error!(error = %e, "storage read failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", e.to_string())
        }
    }
}

/// Malformed or mistyped bodies are validation errors; a wrong content type keeps its status.
pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    match rejection {
        JsonRejection::JsonDataError(_) | JsonRejection::JsonSyntaxError(_) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
        }
        other => json_error(other.status(), "invalid_request", other.body_text()),
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
