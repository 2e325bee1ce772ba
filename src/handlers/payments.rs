use crate::{
    errors::ServiceError,
    events::Event,
    services::{
        carts::LineSelection,
        orders::CreateOrderRequest,
        payment::{OrderIntent, PARAM_TXN_REF},
    },
    ApiResponse, AppState,
};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/redirect", post(create_payment_redirect))
        .route("/callback", get(payment_callback))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PaymentRedirectRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, message = "Delivery address is required"))]
    pub shipping_address: String,
    pub voucher_code: Option<String>,
    #[validate(length(min = 1, message = "Order must contain at least one line"))]
    pub lines: Vec<LineSelection>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentRedirectResponse {
    pub redirect_url: String,
    pub txn_ref: String,
    pub total_amount: Decimal,
}

/// POST /api/v1/payments/redirect
///
/// Prices the requested lines and returns the signed gateway URL. No order
/// exists yet and no stock is reserved: an abandoned payment leaves no state
/// behind. The priced intent rides inside the URL itself.
#[utoipa::path(
    post,
    path = "/api/v1/payments/redirect",
    request_body = PaymentRedirectRequest,
    responses(
        (status = 200, description = "Signed redirect URL"),
        (status = 404, description = "Catalog item or voucher unknown", body = crate::errors::ErrorResponse),
        (status = 409, description = "Voucher unusable", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn create_payment_redirect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PaymentRedirectRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    request
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let snapshot = state
        .services
        .carts
        .price_lines(&*state.db, &request.lines)
        .await?;

    let discount = match request.voucher_code.as_deref() {
        Some(code) => {
            let voucher = state.services.vouchers.require_active(&*state.db, code).await?;
            voucher.discount_amount.min(snapshot.subtotal)
        }
        None => Decimal::ZERO,
    };
    let total_amount = snapshot.subtotal - discount;

    let intent = OrderIntent {
        txn_ref: Uuid::new_v4().simple().to_string(),
        user_id: request.user_id,
        payment_method: "gateway".to_string(),
        shipping_address: request.shipping_address,
        voucher_code: request.voucher_code,
        lines: request.lines,
        total_amount,
    };

    let url = state
        .services
        .payment
        .build_redirect(&intent, &client_ip(&headers), Utc::now())?;

    info!(txn_ref = %intent.txn_ref, %total_amount, "payment redirect issued");
    Ok(Json(ApiResponse::success(PaymentRedirectResponse {
        redirect_url: url.to_string(),
        txn_ref: intent.txn_ref,
        total_amount,
    })))
}

/// GET /api/v1/payments/callback
///
/// The untrusted gateway callback. Signature and amount verification happen
/// in the payment service; only a verified, approved callback reaches order
/// creation, keyed by the intent's deterministic order code so redelivery
/// cannot create a second order.
#[utoipa::path(
    get,
    path = "/api/v1/payments/callback",
    responses(
        (status = 200, description = "Callback processed"),
        (status = 401, description = "Signature rejected", body = crate::errors::ErrorResponse),
        (status = 409, description = "Stock or voucher conflict", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_callback(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ServiceError> {
    let verified = match state.services.payment.verify_callback(&params) {
        Ok(verified) => verified,
        Err(err) => {
            state
                .event_sender
                .send_or_log(Event::PaymentCallbackRejected {
                    txn_ref: params.get(PARAM_TXN_REF).cloned(),
                })
                .await;
            return Err(err);
        }
    };

    if !verified.payment_approved() {
        warn!(
            txn_ref = %verified.intent.txn_ref,
            response_code = %verified.response_code,
            "gateway reported an unsuccessful payment, no order created"
        );
        return Ok((
            StatusCode::OK,
            Json(ApiResponse::<crate::services::orders::OrderResponse>::error(
                "payment was not approved; no order was created".to_string(),
            )),
        ));
    }

    let order_number = verified.intent.order_number();
    let request = CreateOrderRequest {
        user_id: verified.intent.user_id,
        payment_method: verified.intent.payment_method.clone(),
        shipping_address: verified.intent.shipping_address.clone(),
        voucher_code: verified.intent.voucher_code.clone(),
        lines: verified.intent.lines.clone(),
    };

    let outcome = state
        .services
        .orders
        .create_order(request, Some(order_number))
        .await?;

    if !outcome.created {
        info!(
            order_number = %outcome.order.order_number,
            "duplicate payment callback absorbed"
        );
    }
    Ok((StatusCode::OK, Json(ApiResponse::success(outcome.order))))
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "0.0.0.0".to_string())
}
