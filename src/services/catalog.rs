use crate::{
    entities::{product::Entity as ProductEntity, product_variant::Entity as ProductVariantEntity},
    errors::ServiceError,
};
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait};
use std::sync::Arc;
use uuid::Uuid;

/// Read-side boundary to the catalog subsystem.
///
/// The order core never writes these tables; it only resolves the current
/// effective price, discount, and display fields for a (product, variant)
/// pair so the snapshot builder can freeze them into order line items.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

/// Everything the order core needs to know about one catalog entry at
/// snapshot time.
#[derive(Debug, Clone)]
pub struct CatalogLine {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub product_name: String,
    pub variant_name: String,
    pub image_url: Option<String>,
    /// Price after catalog discount, floored at zero.
    pub unit_price: Decimal,
}

/// Effective per-unit price: list price minus catalog discount, never
/// negative.
pub fn effective_unit_price(price: Decimal, discount: Decimal) -> Decimal {
    (price - discount).max(Decimal::ZERO)
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Resolves one (product, variant) pair to its current pricing and
    /// display data. A missing product or variant, or a variant belonging
    /// to a different product, is a hard "catalog item unavailable" failure;
    /// lines are never silently dropped.
    pub async fn resolve<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        variant_id: Uuid,
    ) -> Result<CatalogLine, ServiceError> {
        let product = ProductEntity::find_by_id(product_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("catalog item unavailable: product {product_id}"))
            })?;

        let variant = ProductVariantEntity::find_by_id(variant_id)
            .one(conn)
            .await?
            .filter(|v| v.product_id == product_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "catalog item unavailable: variant {variant_id} of product {product_id}"
                ))
            })?;

        Ok(CatalogLine {
            product_id,
            variant_id,
            product_name: product.name,
            variant_name: variant.name,
            image_url: product.image_url,
            unit_price: effective_unit_price(variant.price, variant.discount),
        })
    }

    /// Convenience read against the service's own pool, for handlers that
    /// are not inside a transaction.
    pub async fn resolve_from_pool(
        &self,
        product_id: Uuid,
        variant_id: Uuid,
    ) -> Result<CatalogLine, ServiceError> {
        self.resolve(&*self.db, product_id, variant_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn discount_is_subtracted_per_unit() {
        assert_eq!(effective_unit_price(dec!(120.00), dec!(20.00)), dec!(100.00));
    }

    #[test]
    fn price_never_goes_negative() {
        assert_eq!(effective_unit_price(dec!(5.00), dec!(9.99)), Decimal::ZERO);
        assert_eq!(effective_unit_price(dec!(5.00), dec!(5.00)), Decimal::ZERO);
    }
}
