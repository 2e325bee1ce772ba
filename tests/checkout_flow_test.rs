mod common;

use common::{
    inventory_levels, seed_expired_voucher, seed_variant, seed_voucher, voucher_remaining,
    TestApp,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use storefront_api::{
    entities::{cart_line_item, order, order_line_item},
    errors::ServiceError,
    services::{
        carts::{AddToCartInput, LineSelection},
        orders::CreateOrderRequest,
    },
};
use uuid::Uuid;

fn request(user_id: Uuid, lines: Vec<LineSelection>) -> CreateOrderRequest {
    CreateOrderRequest {
        user_id,
        payment_method: "cash_on_delivery".to_string(),
        shipping_address: "1 Main St, Springfield".to_string(),
        voucher_code: None,
        lines,
    }
}

#[tokio::test]
async fn create_order_freezes_prices_and_conserves_totals() {
    let app = TestApp::new().await;
    let (product_a, variant_a) = seed_variant(&app, dec!(120.00), dec!(20.00), 10).await;
    let (product_b, variant_b) = seed_variant(&app, dec!(35.50), dec!(0.00), 5).await;
    let user_id = Uuid::new_v4();

    let outcome = app
        .state
        .services
        .orders
        .create_order(
            request(
                user_id,
                vec![
                    LineSelection {
                        product_id: product_a,
                        variant_id: variant_a,
                        quantity: 2,
                    },
                    LineSelection {
                        product_id: product_b,
                        variant_id: variant_b,
                        quantity: 3,
                    },
                ],
            ),
            None,
        )
        .await
        .expect("order creation failed");
    assert!(outcome.created);

    let order = outcome.order;
    assert_eq!(order.status, order::OrderStatus::Pending);
    // Conservation: subtotal equals the sum over frozen line prices.
    let computed: Decimal = order
        .items
        .iter()
        .map(|item| item.unit_price * Decimal::from(item.quantity))
        .sum();
    assert_eq!(order.subtotal, computed);
    // 2 * (120 - 20) + 3 * 35.50
    assert_eq!(order.subtotal, dec!(306.50));
    assert_eq!(order.discount_total, Decimal::ZERO);
    assert_eq!(order.total_amount, dec!(306.50));

    // Stock moved from available to sold.
    assert_eq!(inventory_levels(&app, product_a, variant_a).await, (8, 2));
    assert_eq!(inventory_levels(&app, product_b, variant_b).await, (2, 3));

    // Line items denormalize display data.
    assert!(order.items.iter().all(|i| !i.product_name.is_empty()));
}

#[tokio::test]
async fn voucher_discount_is_applied_and_decremented() {
    let app = TestApp::new().await;
    let (product_id, variant_id) = seed_variant(&app, dec!(50.00), dec!(0.00), 10).await;
    seed_voucher(&app, "WELCOME10", dec!(10.00), 3).await;

    let mut req = request(
        Uuid::new_v4(),
        vec![LineSelection {
            product_id,
            variant_id,
            quantity: 2,
        }],
    );
    req.voucher_code = Some("WELCOME10".to_string());

    let outcome = app
        .state
        .services
        .orders
        .create_order(req, None)
        .await
        .expect("order creation failed");

    assert_eq!(outcome.order.subtotal, dec!(100.00));
    assert_eq!(outcome.order.discount_total, dec!(10.00));
    assert_eq!(outcome.order.total_amount, dec!(90.00));
    assert_eq!(voucher_remaining(&app, "WELCOME10").await, 2);
}

#[tokio::test]
async fn voucher_discount_never_exceeds_the_subtotal() {
    let app = TestApp::new().await;
    let (product_id, variant_id) = seed_variant(&app, dec!(4.00), dec!(0.00), 10).await;
    seed_voucher(&app, "BIGCUT", dec!(100.00), 5).await;

    let mut req = request(
        Uuid::new_v4(),
        vec![LineSelection {
            product_id,
            variant_id,
            quantity: 1,
        }],
    );
    req.voucher_code = Some("BIGCUT".to_string());

    let outcome = app
        .state
        .services
        .orders
        .create_order(req, None)
        .await
        .expect("order creation failed");
    assert_eq!(outcome.order.discount_total, dec!(4.00));
    assert_eq!(outcome.order.total_amount, Decimal::ZERO);
}

#[tokio::test]
async fn insufficient_stock_aborts_the_entire_order() {
    let app = TestApp::new().await;
    let (product_a, variant_a) = seed_variant(&app, dec!(10.00), dec!(0.00), 10).await;
    let (product_b, variant_b) = seed_variant(&app, dec!(10.00), dec!(0.00), 1).await;

    let err = app
        .state
        .services
        .orders
        .create_order(
            request(
                Uuid::new_v4(),
                vec![
                    LineSelection {
                        product_id: product_a,
                        variant_id: variant_a,
                        quantity: 2,
                    },
                    LineSelection {
                        product_id: product_b,
                        variant_id: variant_b,
                        quantity: 5,
                    },
                ],
            ),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock { .. }));

    // The first line's tentative reservation rolled back with the rest.
    assert_eq!(inventory_levels(&app, product_a, variant_a).await, (10, 0));
    assert_eq!(inventory_levels(&app, product_b, variant_b).await, (1, 0));

    let orders = order::Entity::find()
        .count(&*app.state.db)
        .await
        .expect("count failed");
    assert_eq!(orders, 0);
    let items = order_line_item::Entity::find()
        .count(&*app.state.db)
        .await
        .expect("count failed");
    assert_eq!(items, 0);
}

#[tokio::test]
async fn failed_voucher_rolls_back_inventory_and_order() {
    let app = TestApp::new().await;
    let (product_id, variant_id) = seed_variant(&app, dec!(10.00), dec!(0.00), 10).await;
    seed_expired_voucher(&app, "EXPIRED", dec!(5.00)).await;

    let mut req = request(
        Uuid::new_v4(),
        vec![LineSelection {
            product_id,
            variant_id,
            quantity: 1,
        }],
    );
    req.voucher_code = Some("EXPIRED".to_string());

    let err = app
        .state
        .services
        .orders
        .create_order(req, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::VoucherNotActive(_)));

    assert_eq!(inventory_levels(&app, product_id, variant_id).await, (10, 0));
    let orders = order::Entity::find()
        .count(&*app.state.db)
        .await
        .expect("count failed");
    assert_eq!(orders, 0);
}

#[tokio::test]
async fn unknown_catalog_item_fails_the_build_explicitly() {
    let app = TestApp::new().await;
    let err = app
        .state
        .services
        .orders
        .create_order(
            request(
                Uuid::new_v4(),
                vec![LineSelection {
                    product_id: Uuid::new_v4(),
                    variant_id: Uuid::new_v4(),
                    quantity: 1,
                }],
            ),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn checkout_clears_the_converted_cart_lines() {
    let app = TestApp::new().await;
    let (product_a, variant_a) = seed_variant(&app, dec!(10.00), dec!(0.00), 10).await;
    let (product_b, variant_b) = seed_variant(&app, dec!(20.00), dec!(0.00), 10).await;
    let user_id = Uuid::new_v4();

    let carts = &app.state.services.carts;
    carts
        .add_item(
            user_id,
            AddToCartInput {
                product_id: product_a,
                variant_id: variant_a,
                quantity: 2,
            },
        )
        .await
        .expect("staging failed");
    carts
        .add_item(
            user_id,
            AddToCartInput {
                product_id: product_b,
                variant_id: variant_b,
                quantity: 1,
            },
        )
        .await
        .expect("staging failed");

    // Only the first line converts; the other stays staged.
    app.state
        .services
        .orders
        .create_order(
            request(
                user_id,
                vec![LineSelection {
                    product_id: product_a,
                    variant_id: variant_a,
                    quantity: 2,
                }],
            ),
            None,
        )
        .await
        .expect("order creation failed");

    let remaining = cart_line_item::Entity::find()
        .filter(cart_line_item::Column::ProductId.eq(product_b))
        .count(&*app.state.db)
        .await
        .expect("count failed");
    assert_eq!(remaining, 1);
    let converted = cart_line_item::Entity::find()
        .filter(cart_line_item::Column::ProductId.eq(product_a))
        .count(&*app.state.db)
        .await
        .expect("count failed");
    assert_eq!(converted, 0);
}
