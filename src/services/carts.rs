use crate::{
    entities::{
        cart::{self, Entity as CartEntity},
        cart_line_item::{self, Entity as CartLineItemEntity},
    },
    errors::ServiceError,
    services::catalog::CatalogService,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// One requested (product, variant, quantity), the unit of buyer intent.
/// Used by the cart, the direct checkout request, and the payment intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct LineSelection {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddToCartInput {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

/// A priced, frozen line produced by the snapshot builder.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub product_name: String,
    pub variant_name: String,
    pub image_url: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl PricedLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Output of the snapshot builder: authoritative priced lines and their sum.
#[derive(Debug, Clone)]
pub struct CartSnapshot {
    pub lines: Vec<PricedLine>,
    pub subtotal: Decimal,
}

/// Cart staging plus the snapshot builder.
///
/// The cart rows are only a source of intent; pricing and stock are
/// re-derived by [`CartService::price_lines`] at order-creation time, which
/// discards whatever estimate the cart had cached.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    catalog: CatalogService,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, catalog: CatalogService) -> Self {
        Self { db, catalog }
    }

    /// The user's cart lines, empty if the user has no cart yet.
    pub async fn get_cart(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<cart_line_item::Model>, ServiceError> {
        let Some(cart) = self.find_cart(&*self.db, user_id).await? else {
            return Ok(Vec::new());
        };
        let items = CartLineItemEntity::find()
            .filter(cart_line_item::Column::CartId.eq(cart.id))
            .all(&*self.db)
            .await?;
        Ok(items)
    }

    /// Adds a line to the user's cart, creating the cart on first use.
    /// An existing (product, variant) line has its quantity incremented and
    /// its price estimate refreshed from the catalog.
    #[instrument(skip(self, input), fields(user_id = %user_id))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        input: AddToCartInput,
    ) -> Result<cart_line_item::Model, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        // Estimate only; the authoritative price is frozen at checkout.
        let catalog_line = self
            .catalog
            .resolve_from_pool(input.product_id, input.variant_id)
            .await?;

        let now = Utc::now();
        let cart = match self.find_cart(&*self.db, user_id).await? {
            Some(cart) => cart,
            None => {
                cart::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?
            }
        };

        let existing = CartLineItemEntity::find()
            .filter(cart_line_item::Column::CartId.eq(cart.id))
            .filter(cart_line_item::Column::ProductId.eq(input.product_id))
            .filter(cart_line_item::Column::VariantId.eq(input.variant_id))
            .one(&*self.db)
            .await?;

        let item = match existing {
            Some(line) => {
                let quantity = line.quantity + input.quantity;
                let mut update: cart_line_item::ActiveModel = line.into();
                update.quantity = Set(quantity);
                update.price_estimate = Set(catalog_line.unit_price);
                update.updated_at = Set(now);
                update.update(&*self.db).await?
            }
            None => {
                cart_line_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(input.product_id),
                    variant_id: Set(input.variant_id),
                    quantity: Set(input.quantity),
                    price_estimate: Set(catalog_line.unit_price),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?
            }
        };

        info!(cart_id = %cart.id, item_id = %item.id, "cart line staged");
        Ok(item)
    }

    /// Removes one line from the user's cart.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, item_id: Uuid) -> Result<(), ServiceError> {
        let cart = self
            .find_cart(&*self.db, user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no cart for user {user_id}")))?;

        let deleted = CartLineItemEntity::delete_many()
            .filter(cart_line_item::Column::Id.eq(item_id))
            .filter(cart_line_item::Column::CartId.eq(cart.id))
            .exec(&*self.db)
            .await?;

        if deleted.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "cart line {item_id} not found"
            )));
        }
        Ok(())
    }

    /// The snapshot builder: resolves authoritative catalog pricing for each
    /// requested line and returns the frozen set plus its subtotal.
    ///
    /// Pure read-and-compute; does not touch inventory. Any unavailable
    /// catalog item fails the whole build.
    pub async fn price_lines<C: ConnectionTrait>(
        &self,
        conn: &C,
        lines: &[LineSelection],
    ) -> Result<CartSnapshot, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "order must contain at least one line".to_string(),
            ));
        }

        let mut priced = Vec::with_capacity(lines.len());
        let mut subtotal = Decimal::ZERO;
        for line in lines {
            line.validate()
                .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
            let catalog_line = self
                .catalog
                .resolve(conn, line.product_id, line.variant_id)
                .await?;
            let priced_line = PricedLine {
                product_id: catalog_line.product_id,
                variant_id: catalog_line.variant_id,
                product_name: catalog_line.product_name,
                variant_name: catalog_line.variant_name,
                image_url: catalog_line.image_url,
                quantity: line.quantity,
                unit_price: catalog_line.unit_price,
            };
            subtotal += priced_line.line_total();
            priced.push(priced_line);
        }

        Ok(CartSnapshot {
            lines: priced,
            subtotal,
        })
    }

    /// Deletes the cart lines that were just converted into an order. Runs
    /// inside the order-creation transaction.
    pub async fn clear_converted<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        converted: &[(Uuid, Uuid)],
    ) -> Result<(), ServiceError> {
        let Some(cart) = self.find_cart(conn, user_id).await? else {
            // Direct checkout without a staged cart is legal.
            return Ok(());
        };

        for (product_id, variant_id) in converted {
            CartLineItemEntity::delete_many()
                .filter(cart_line_item::Column::CartId.eq(cart.id))
                .filter(cart_line_item::Column::ProductId.eq(*product_id))
                .filter(cart_line_item::Column::VariantId.eq(*variant_id))
                .exec(conn)
                .await?;
        }
        Ok(())
    }

    async fn find_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
    ) -> Result<Option<cart::Model>, ServiceError> {
        let cart = CartEntity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(conn)
            .await?;
        Ok(cart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn priced(unit: Decimal, quantity: i32) -> PricedLine {
        PricedLine {
            product_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            product_name: "widget".to_string(),
            variant_name: "blue".to_string(),
            image_url: None,
            quantity,
            unit_price: unit,
        }
    }

    #[test]
    fn line_total_multiplies_unit_price() {
        assert_eq!(priced(dec!(19.99), 3).line_total(), dec!(59.97));
        assert_eq!(priced(dec!(0.00), 5).line_total(), Decimal::ZERO);
    }
}
