use crate::{
    entities::cart_line_item,
    errors::ServiceError,
    services::carts::AddToCartInput,
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:user_id", get(get_cart))
        .route("/:user_id/items", post(add_cart_item))
        .route(
            "/:user_id/items/:item_id",
            axum::routing::delete(remove_cart_item),
        )
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartLineItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i32,
    /// Display estimate only; authoritative pricing happens at checkout.
    pub price_estimate: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl From<cart_line_item::Model> for CartLineItemResponse {
    fn from(model: cart_line_item::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            variant_id: model.variant_id,
            quantity: model.quantity,
            price_estimate: model.price_estimate,
            updated_at: model.updated_at,
        }
    }
}

/// GET /api/v1/carts/{user_id}
#[utoipa::path(
    get,
    path = "/api/v1/carts/{user_id}",
    params(("user_id" = Uuid, Path, description = "Cart owner")),
    responses((status = 200, description = "Current cart lines")),
    tag = "Carts"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let items = state.services.carts.get_cart(user_id).await?;
    let items: Vec<CartLineItemResponse> = items.into_iter().map(Into::into).collect();
    Ok(Json(ApiResponse::success(items)))
}

/// POST /api/v1/carts/{user_id}/items
#[utoipa::path(
    post,
    path = "/api/v1/carts/{user_id}/items",
    params(("user_id" = Uuid, Path, description = "Cart owner")),
    request_body = AddToCartInput,
    responses(
        (status = 201, description = "Line staged"),
        (status = 404, description = "Unknown catalog item", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn add_cart_item(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(input): Json<AddToCartInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state.services.carts.add_item(user_id, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(CartLineItemResponse::from(item))),
    ))
}

/// DELETE /api/v1/carts/{user_id}/items/{item_id}
#[utoipa::path(
    delete,
    path = "/api/v1/carts/{user_id}/items/{item_id}",
    params(
        ("user_id" = Uuid, Path, description = "Cart owner"),
        ("item_id" = Uuid, Path, description = "Cart line to remove")
    ),
    responses(
        (status = 204, description = "Line removed"),
        (status = 404, description = "Line not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.carts.remove_item(user_id, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
