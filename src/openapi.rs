use utoipa::OpenApi;

/// OpenAPI document for the order-fulfillment surface, served at
/// `/api/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        description = "Order fulfillment core: carts, orders, inventory reservation, voucher redemption, and payment gateway reconciliation"
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::carts::get_cart,
        crate::handlers::carts::add_cart_item,
        crate::handlers::carts::remove_cart_item,
        crate::handlers::orders::create_order,
        crate::handlers::orders::get_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::advance_order_status,
        crate::handlers::orders::delete_order,
        crate::handlers::payments::create_payment_redirect,
        crate::handlers::payments::payment_callback,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::entities::order::OrderStatus,
        crate::services::carts::LineSelection,
        crate::services::carts::AddToCartInput,
        crate::services::orders::CreateOrderRequest,
        crate::services::orders::OrderResponse,
        crate::services::orders::OrderLineItemResponse,
        crate::services::orders::OrderListResponse,
        crate::handlers::carts::CartLineItemResponse,
        crate::handlers::orders::CancelOrderRequest,
        crate::handlers::orders::AdvanceStatusRequest,
        crate::handlers::payments::PaymentRedirectRequest,
        crate::handlers::payments::PaymentRedirectResponse,
    )),
    tags(
        (name = "Orders", description = "Order lifecycle"),
        (name = "Carts", description = "Cart staging"),
        (name = "Payments", description = "Payment gateway round-trip"),
        (name = "Health", description = "Operational probes")
    )
)]
pub struct ApiDoc;
