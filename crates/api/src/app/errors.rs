use core::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use bloodline_auth::AuthzError;
use bloodline_core::DomainError;
use bloodline_infra::{ApproveError, RejectError, ServiceError, StoreError};

pub fn approve_error_to_response(err: ApproveError) -> axum::response::Response {
    let msg = err.to_string();
    match err {
        ApproveError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        ApproveError::AlreadyProcessed(_) => {
            json_error(StatusCode::CONFLICT, "already_processed", msg)
        }
        ApproveError::NoInventory(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "no_inventory", msg)
        }
        ApproveError::InsufficientStock { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "insufficient_stock", msg)
        }
        ApproveError::Store(e) => store_error_to_response(e),
    }
}

pub fn reject_error_to_response(err: RejectError) -> axum::response::Response {
    let msg = err.to_string();
    match err {
        RejectError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        RejectError::AlreadyProcessed(_) => {
            json_error(StatusCode::CONFLICT, "already_processed", msg)
        }
        RejectError::Store(e) => store_error_to_response(e),
    }
}

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Domain(e) => domain_error_to_response(e),
        ServiceError::Store(e) => store_error_to_response(e),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let msg = err.to_string();
    match err {
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        DomainError::InvalidUnits(_) => json_error(StatusCode::BAD_REQUEST, "invalid_units", msg),
        DomainError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(_) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Duplicate(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        other => {
            tracing::error!(error = %other, "store failure");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                other.to_string(),
            )
        }
    }
}

pub fn forbidden(err: AuthzError) -> axum::response::Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
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

/// Map a rejected JSON body to a 400 `validation_error`.
pub fn json_rejection_to_response(err: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", err.body_text())
}

/// Parse a path identifier, answering 400 on malformed input.
pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse().map_err(domain_error_to_response)
}
