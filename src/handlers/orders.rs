use crate::{
    entities::order::OrderStatus,
    errors::ServiceError,
    services::orders::CreateOrderRequest,
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order).delete(delete_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/status", post(advance_order_status))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct OrderListQuery {
    /// 1-based page number
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
    /// Restrict to one buyer
    pub user_id: Option<Uuid>,
}

fn default_page() -> u64 {
    1
}
fn default_per_page() -> u64 {
    20
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdvanceStatusRequest {
    pub status: OrderStatus,
}

/// POST /api/v1/orders
///
/// Direct checkout: prices the requested lines, persists the order, reserves
/// stock, redeems the voucher, and clears the staged cart in one
/// transaction.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created"),
        (status = 404, description = "Catalog item or voucher unknown", body = crate::errors::ErrorResponse),
        (status = 409, description = "Out of stock or voucher unusable", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.services.orders.create_order(request, None).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(outcome.order)),
    ))
}

/// GET /api/v1/orders/{id}
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with line items"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// GET /api/v1/orders
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(OrderListQuery),
    responses((status = 200, description = "Paginated orders")),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let list = state
        .services
        .orders
        .list_orders(query.user_id, query.page, query.per_page)
        .await?;
    Ok(Json(ApiResponse::success(list)))
}

/// POST /api/v1/orders/{id}/cancel
///
/// Only a pending order can be cancelled; anything further along returns a
/// conflict rather than silently ignoring the request.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Order cancelled, stock and voucher released"),
        (status = 409, description = "Order is no longer pending", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelOrderRequest>>,
) -> Result<impl IntoResponse, ServiceError> {
    let reason = body.and_then(|Json(b)| b.reason);
    let order = state.services.orders.cancel_order(id, reason).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// POST /api/v1/orders/{id}/status
///
/// Administrative fulfillment progression; never touches inventory.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = AdvanceStatusRequest,
    responses(
        (status = 200, description = "Status advanced"),
        (status = 409, description = "Illegal transition", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn advance_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AdvanceStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .advance_status(id, request.status)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// DELETE /api/v1/orders/{id}
///
/// Administrative soft delete; the financial record survives, hidden from
/// the buyer surface.
#[utoipa::path(
    delete,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 204, description = "Order soft-deleted"),
        (status = 409, description = "Order already terminal", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.orders.delete_order(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
