#![allow(dead_code)]

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use std::path::PathBuf;
use std::sync::Arc;
use storefront_api::{
    config::AppConfig,
    db,
    entities::{inventory_record, product, product_variant, voucher},
    events,
    handlers::AppServices,
    AppState,
};
use uuid::Uuid;

/// Test harness: application state over a throwaway SQLite database with
/// migrations applied.
pub struct TestApp {
    pub state: AppState,
    db_file: PathBuf,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_file = std::env::temp_dir().join(format!(
            "storefront_test_{}.db",
            Uuid::new_v4().simple()
        ));

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_file.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 5;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_sender, event_rx) = events::channel(64);
        let event_task = tokio::spawn(events::process_events(event_rx));
        let services = AppServices::new(db_arc.clone(), event_sender.clone(), &cfg);

        Self {
            state: AppState {
                db: db_arc,
                config: cfg,
                event_sender,
                services,
            },
            db_file,
            _event_task: event_task,
        }
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_file);
    }
}

/// Seeds one product/variant pair with stock and returns the ids.
pub async fn seed_variant(
    app: &TestApp,
    price: Decimal,
    discount: Decimal,
    stock: i32,
) -> (Uuid, Uuid) {
    let now = Utc::now();
    let product_id = Uuid::new_v4();
    let variant_id = Uuid::new_v4();

    product::ActiveModel {
        id: Set(product_id),
        name: Set(format!("Product {product_id}")),
        image_url: Set(Some("https://cdn.example/p.jpg".to_string())),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*app.state.db)
    .await
    .expect("failed to seed product");

    product_variant::ActiveModel {
        id: Set(variant_id),
        product_id: Set(product_id),
        name: Set("Default".to_string()),
        price: Set(price),
        discount: Set(discount),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*app.state.db)
    .await
    .expect("failed to seed variant");

    inventory_record::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        variant_id: Set(variant_id),
        available: Set(stock),
        sold: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*app.state.db)
    .await
    .expect("failed to seed inventory");

    (product_id, variant_id)
}

/// Seeds a currently-active voucher.
pub async fn seed_voucher(
    app: &TestApp,
    code: &str,
    discount_amount: Decimal,
    remaining: i32,
) -> Uuid {
    let now = Utc::now();
    let id = Uuid::new_v4();
    voucher::ActiveModel {
        id: Set(id),
        code: Set(code.to_string()),
        discount_amount: Set(discount_amount),
        remaining_quantity: Set(remaining),
        starts_at: Set(now - Duration::days(1)),
        ends_at: Set(now + Duration::days(1)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*app.state.db)
    .await
    .expect("failed to seed voucher");
    id
}

/// Seeds a voucher whose validity window has already closed.
pub async fn seed_expired_voucher(app: &TestApp, code: &str, discount_amount: Decimal) -> Uuid {
    let now = Utc::now();
    let id = Uuid::new_v4();
    voucher::ActiveModel {
        id: Set(id),
        code: Set(code.to_string()),
        discount_amount: Set(discount_amount),
        remaining_quantity: Set(10),
        starts_at: Set(now - Duration::days(30)),
        ends_at: Set(now - Duration::days(1)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*app.state.db)
    .await
    .expect("failed to seed voucher");
    id
}

/// Current (available, sold) for a seeded pair, read through the ledger.
pub async fn inventory_levels(app: &TestApp, product_id: Uuid, variant_id: Uuid) -> (i32, i32) {
    let record = app
        .state
        .services
        .inventory
        .get(product_id, variant_id)
        .await
        .expect("inventory query failed")
        .expect("inventory record missing");
    (record.available, record.sold)
}

/// Remaining uses on a voucher, read through the redemption service.
pub async fn voucher_remaining(app: &TestApp, code: &str) -> i32 {
    app.state
        .services
        .vouchers
        .find_by_code(code)
        .await
        .expect("voucher query failed")
        .expect("voucher missing")
        .remaining_quantity
}
