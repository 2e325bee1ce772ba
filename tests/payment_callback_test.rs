mod common;

use chrono::Utc;
use common::{inventory_levels, seed_variant, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use std::collections::HashMap;
use storefront_api::{
    entities::order,
    errors::ServiceError,
    services::{
        carts::LineSelection,
        orders::CreateOrderRequest,
        payment::{OrderIntent, PARAM_RESPONSE_CODE, PARAM_SECURE_HASH, PARAM_TRANSACTION_NO},
    },
};
use url::Url;
use uuid::Uuid;

fn intent_for(
    user_id: Uuid,
    product_id: Uuid,
    variant_id: Uuid,
    quantity: i32,
    total: rust_decimal::Decimal,
) -> OrderIntent {
    OrderIntent {
        txn_ref: Uuid::new_v4().simple().to_string(),
        user_id,
        payment_method: "gateway".to_string(),
        shipping_address: "1 Main St".to_string(),
        voucher_code: None,
        lines: vec![LineSelection {
            product_id,
            variant_id,
            quantity,
        }],
        total_amount: total,
    }
}

/// Simulates the gateway: echoes the redirect parameters back, appends its
/// own response fields, and signs the full set with the shared secret.
fn gateway_approves(app: &TestApp, url: &Url) -> HashMap<String, String> {
    let mut params: HashMap<String, String> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.insert(PARAM_RESPONSE_CODE.to_string(), "00".to_string());
    params.insert(PARAM_TRANSACTION_NO.to_string(), "77001122".to_string());
    resign(app, &mut params);
    params
}

fn resign(app: &TestApp, params: &mut HashMap<String, String>) {
    use hmac::{Hmac, Mac};
    use sha2::Sha512;

    params.remove(PARAM_SECURE_HASH);
    let sorted: std::collections::BTreeMap<&String, &String> = params.iter().collect();
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in sorted {
        serializer.append_pair(k, v);
    }
    let canonical = serializer.finish();

    let mut mac =
        Hmac::<Sha512>::new_from_slice(app.state.config.gateway.secret_key.as_bytes()).unwrap();
    mac.update(canonical.as_bytes());
    let hash = hex::encode(mac.finalize().into_bytes());
    params.insert(PARAM_SECURE_HASH.to_string(), hash);
}

#[tokio::test]
async fn approved_callback_creates_the_order_it_describes() {
    let app = TestApp::new().await;
    let (product_id, variant_id) = seed_variant(&app, dec!(80.00), dec!(0.00), 4).await;
    let user_id = Uuid::new_v4();

    let intent = intent_for(user_id, product_id, variant_id, 2, dec!(160.00));
    let url = app
        .state
        .services
        .payment
        .build_redirect(&intent, "203.0.113.9", Utc::now())
        .expect("redirect build failed");

    let params = gateway_approves(&app, &url);
    let verified = app
        .state
        .services
        .payment
        .verify_callback(&params)
        .expect("verification failed");
    assert!(verified.payment_approved());

    let outcome = app
        .state
        .services
        .orders
        .create_order(
            CreateOrderRequest {
                user_id: verified.intent.user_id,
                payment_method: verified.intent.payment_method.clone(),
                shipping_address: verified.intent.shipping_address.clone(),
                voucher_code: verified.intent.voucher_code.clone(),
                lines: verified.intent.lines.clone(),
            },
            Some(verified.intent.order_number()),
        )
        .await
        .expect("order creation failed");

    assert!(outcome.created);
    assert_eq!(outcome.order.order_number, intent.order_number());
    assert_eq!(outcome.order.total_amount, dec!(160.00));
    assert_eq!(inventory_levels(&app, product_id, variant_id).await, (2, 2));
}

#[tokio::test]
async fn redelivered_callback_produces_exactly_one_order() {
    let app = TestApp::new().await;
    let (product_id, variant_id) = seed_variant(&app, dec!(80.00), dec!(0.00), 4).await;
    let user_id = Uuid::new_v4();

    let intent = intent_for(user_id, product_id, variant_id, 1, dec!(80.00));
    let url = app
        .state
        .services
        .payment
        .build_redirect(&intent, "203.0.113.9", Utc::now())
        .expect("redirect build failed");
    let params = gateway_approves(&app, &url);

    for delivery in 0..2 {
        let verified = app
            .state
            .services
            .payment
            .verify_callback(&params)
            .expect("verification failed");
        let outcome = app
            .state
            .services
            .orders
            .create_order(
                CreateOrderRequest {
                    user_id: verified.intent.user_id,
                    payment_method: verified.intent.payment_method.clone(),
                    shipping_address: verified.intent.shipping_address.clone(),
                    voucher_code: verified.intent.voucher_code.clone(),
                    lines: verified.intent.lines.clone(),
                },
                Some(verified.intent.order_number()),
            )
            .await
            .expect("order creation failed");
        assert_eq!(outcome.created, delivery == 0);
    }

    let count = order::Entity::find()
        .count(&*app.state.db)
        .await
        .expect("count failed");
    assert_eq!(count, 1);
    // One order, one reservation.
    assert_eq!(inventory_levels(&app, product_id, variant_id).await, (3, 1));
}

#[tokio::test]
async fn tampered_callback_is_rejected_and_creates_nothing() {
    let app = TestApp::new().await;
    let (product_id, variant_id) = seed_variant(&app, dec!(80.00), dec!(0.00), 4).await;

    let intent = intent_for(Uuid::new_v4(), product_id, variant_id, 1, dec!(80.00));
    let url = app
        .state
        .services
        .payment
        .build_redirect(&intent, "203.0.113.9", Utc::now())
        .expect("redirect build failed");

    let mut params = gateway_approves(&app, &url);
    // Flip the amount without re-signing.
    params.insert("amount".to_string(), "1".to_string());

    let err = app
        .state
        .services
        .payment
        .verify_callback(&params)
        .unwrap_err();
    assert!(matches!(err, ServiceError::SignatureError));

    let count = order::Entity::find()
        .count(&*app.state.db)
        .await
        .expect("count failed");
    assert_eq!(count, 0);
    assert_eq!(inventory_levels(&app, product_id, variant_id).await, (4, 0));
}

#[tokio::test]
async fn declined_payment_verifies_but_is_not_approved() {
    let app = TestApp::new().await;
    let (product_id, variant_id) = seed_variant(&app, dec!(80.00), dec!(0.00), 4).await;

    let intent = intent_for(Uuid::new_v4(), product_id, variant_id, 1, dec!(80.00));
    let url = app
        .state
        .services
        .payment
        .build_redirect(&intent, "203.0.113.9", Utc::now())
        .expect("redirect build failed");

    let mut params = gateway_approves(&app, &url);
    params.insert(PARAM_RESPONSE_CODE.to_string(), "24".to_string());
    resign(&app, &mut params);

    let verified = app
        .state
        .services
        .payment
        .verify_callback(&params)
        .expect("verification failed");
    assert!(!verified.payment_approved());
}
