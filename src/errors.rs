use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::order::OrderStatus;

/// Standard JSON error body returned by every handler.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Error type shared by every service in the crate.
///
/// The variants map one-to-one onto the client-facing taxonomy: validation,
/// not-found, conflict (stock/voucher/state-machine), signature rejection,
/// and transient persistence failure. Conflicts carry enough context to tell
/// the buyer exactly what went wrong; signature failures deliberately carry
/// nothing.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient stock for product {product_id} variant {variant_id}: requested {requested}")]
    InsufficientStock {
        product_id: Uuid,
        variant_id: Uuid,
        requested: i32,
    },

    #[error("Voucher {0} has no remaining uses")]
    VoucherExhausted(String),

    #[error("Voucher {0} is not currently active")]
    VoucherNotActive(String),

    #[error("Invalid order status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Payment callback rejected")]
    SignatureError,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::ValidationError(_) | ServiceError::InvalidOperation(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InsufficientStock { .. }
            | ServiceError::VoucherExhausted(_)
            | ServiceError::VoucherNotActive(_)
            | ServiceError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ServiceError::SignatureError => StatusCode::UNAUTHORIZED,
            ServiceError::DatabaseError(_) | ServiceError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to hand back to the client.
    ///
    /// Conflicts keep their specific reason. Signature failures and
    /// persistence errors are collapsed to generic text: the former to avoid
    /// aiding forgery attempts, the latter because they are retryable and
    /// the underlying cause belongs in the logs.
    pub fn response_message(&self) -> String {
        match self {
            ServiceError::SignatureError => "Payment callback rejected".to_string(),
            ServiceError::DatabaseError(_) | ServiceError::InternalError(_) => {
                "A transient error occurred, please try again".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Whether retrying the identical request could succeed without any
    /// state changing first.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::DatabaseError(_) | ServiceError::InternalError(_)
        )
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_map_to_409() {
        let err = ServiceError::InsufficientStock {
            product_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            requested: 3,
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(!err.is_transient());

        let err = ServiceError::InvalidTransition {
            from: OrderStatus::Delivering,
            to: OrderStatus::Cancelled,
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn signature_failures_are_generic() {
        let err = ServiceError::SignatureError;
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.response_message(), "Payment callback rejected");
    }

    #[test]
    fn database_errors_are_transient_and_opaque() {
        let err = ServiceError::DatabaseError(sea_orm::error::DbErr::Custom("boom".into()));
        assert!(err.is_transient());
        assert!(!err.response_message().contains("boom"));
    }
}
