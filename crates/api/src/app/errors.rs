use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use dbadmin_auth::{AuthFailure, CapabilityError};
use dbadmin_core::DomainError;
use dbadmin_infra::ServiceError;

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Domain(e) => domain_error_to_response(e),
        ServiceError::Capability(e) => capability_error_to_response(e),
        ServiceError::MissingIdentifier(what) => json_error(
            StatusCode::BAD_REQUEST,
            "missing_identifier",
            format!("missing {what}"),
        ),
        ServiceError::Store(e) => {
            tracing::error!(error = %e, "user store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DomainError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{msg} not found")),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::Unauthorized => json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized"),
    }
}

pub fn capability_error_to_response(err: CapabilityError) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "parse_error", err.to_string())
}

/// Denied credential checks are 401s carrying the failure code.
pub fn auth_failure_to_response(failure: AuthFailure) -> axum::response::Response {
    let message = match failure {
        AuthFailure::UnknownUser | AuthFailure::WrongPassword => "invalid username or password",
        AuthFailure::Locked => "account is locked",
        AuthFailure::NoAccess => "account is not enabled for this kind of login",
        AuthFailure::NoPassword => "no credential of this kind is set",
    };
    json_error(StatusCode::UNAUTHORIZED, failure.as_str(), message)
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
