use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use fleetops_core::DomainError;
use fleetops_infra::DispatchError;
use fleetops_machines::FieldErrors;

pub fn dispatch_error_to_response(err: DispatchError) -> Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Domain(e) => domain_error_to_response(e),
        DispatchError::Deserialize(msg) => {
            tracing::error!(error = %msg, "stored event no longer deserializes");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => {
            tracing::error!(error = %e, "event store failure");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                e.to_string(),
            )
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::CONFLICT, "invariant_violation", msg)
        }
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::Unauthorized(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
    }
}

/// 422 with the per-field messages of a rejected form.
pub fn field_errors_to_response(fields: &FieldErrors) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        axum::Json(json!({
            "error": "invalid_fields",
            "message": format!("{} field(s) need attention", fields.len()),
            "fields": fields,
        })),
    )
        .into_response()
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn not_found(what: &str) -> Response {
    json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
}

/// Parse a path identifier, answering 400 on garbage.
pub fn parse_id<T: core::str::FromStr>(raw: &str, what: &str) -> Result<T, Response> {
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}
