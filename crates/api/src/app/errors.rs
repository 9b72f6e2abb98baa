use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use shopkeep_bot::UserError;
use shopkeep_catalog::CatalogError;
use shopkeep_core::DomainError;
use shopkeep_inventory::LedgerError;
use shopkeep_orders::OrderError;

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

pub fn domain_error_to_response(err: DomainError) -> Response {
    let message = err.to_string();
    match err {
        DomainError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        DomainError::InvalidId(_) => json_error(StatusCode::BAD_REQUEST, "invalid_id", message),
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", message),
        DomainError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
        DomainError::InvariantViolation(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", message)
        }
        DomainError::InvalidTransition { .. } => {
            json_error(StatusCode::CONFLICT, "invalid_transition", message)
        }
    }
}

pub fn ledger_error_to_response(err: LedgerError) -> Response {
    let message = err.to_string();
    match err {
        LedgerError::InsufficientStock { .. } => {
            json_error(StatusCode::CONFLICT, "insufficient_stock", message)
        }
        LedgerError::ReservationTimeout(_) => {
            json_error(StatusCode::CONFLICT, "reservation_timeout", message)
        }
        LedgerError::UnknownReservation(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        LedgerError::ZeroQuantity => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        LedgerError::BelowReserved { .. } => json_error(StatusCode::CONFLICT, "below_reserved", message),
        LedgerError::Overflow { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", message)
        }
    }
}

pub fn order_error_to_response(err: OrderError) -> Response {
    match err {
        OrderError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        OrderError::InvalidTransition { .. } => {
            json_error(StatusCode::CONFLICT, "invalid_transition", err.to_string())
        }
        OrderError::Ledger(e) => ledger_error_to_response(e),
        OrderError::Domain(e) => domain_error_to_response(e),
    }
}

pub fn catalog_error_to_response(err: CatalogError) -> Response {
    match err {
        CatalogError::NotFound { .. } => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        CatalogError::Duplicate { .. } => json_error(StatusCode::CONFLICT, "conflict", err.to_string()),
        CatalogError::Domain(e) => domain_error_to_response(e),
    }
}

pub fn user_error_to_response(err: UserError) -> Response {
    match err {
        UserError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
    }
}

/// Parse a path id, answering 400 on failure.
pub fn parse_id<T>(raw: &str, what: &'static str) -> Result<T, Response>
where
    T: core::str::FromStr,
{
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}
