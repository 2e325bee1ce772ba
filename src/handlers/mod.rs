pub mod carts;
pub mod health;
pub mod orders;
pub mod payments;

use crate::{
    config::AppConfig,
    events::EventSender,
    services::{
        carts::CartService, catalog::CatalogService, inventory::InventoryService,
        orders::OrderService, payment::PaymentGatewayService, vouchers::VoucherService,
    },
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Every service the HTTP surface needs, constructed once at startup and
/// injected through application state. No service reaches for a global
/// handle.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: CatalogService,
    pub inventory: InventoryService,
    pub vouchers: VoucherService,
    pub carts: CartService,
    pub orders: Arc<OrderService>,
    pub payment: PaymentGatewayService,
}

impl AppServices {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender, cfg: &AppConfig) -> Self {
        let catalog = CatalogService::new(db.clone());
        let inventory = InventoryService::new(db.clone());
        let vouchers = VoucherService::new(db.clone());
        let carts = CartService::new(db.clone(), catalog.clone());
        let orders = Arc::new(OrderService::new(
            db,
            event_sender,
            inventory.clone(),
            vouchers.clone(),
            carts.clone(),
            cfg.currency.clone(),
        ));
        let payment = PaymentGatewayService::new(cfg.gateway.clone());

        Self {
            catalog,
            inventory,
            vouchers,
            carts,
            orders,
            payment,
        }
    }
}
