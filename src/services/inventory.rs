use crate::{
    entities::inventory_record::{self, Entity as InventoryRecordEntity},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

/// The inventory ledger.
///
/// Reserve and release are single conditional UPDATE statements checked by
/// affected-row count, so concurrent requests against the same
/// (product, variant) can never drive `available` negative. No in-process
/// lock is involved; the row predicate is evaluated atomically with the
/// write by the database.
///
/// Both mutations take a [`ConnectionTrait`] so they participate in the
/// caller's transaction; the order workflow owns the commit point.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Current ledger row for a (product, variant), if any.
    pub async fn get(
        &self,
        product_id: Uuid,
        variant_id: Uuid,
    ) -> Result<Option<inventory_record::Model>, ServiceError> {
        let record = InventoryRecordEntity::find()
            .filter(inventory_record::Column::ProductId.eq(product_id))
            .filter(inventory_record::Column::VariantId.eq(variant_id))
            .one(&*self.db)
            .await?;
        Ok(record)
    }

    /// Atomically moves `quantity` units from available to sold.
    ///
    /// `UPDATE inventory_records SET available = available - q, sold = sold + q
    ///  WHERE product_id = ? AND variant_id = ? AND available >= q`
    ///
    /// Zero rows affected means the stock was not there (or the record does
    /// not exist); nothing changes in that case.
    #[instrument(skip(self, conn))]
    pub async fn reserve<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "reservation quantity must be positive".to_string(),
            ));
        }

        let result = InventoryRecordEntity::update_many()
            .col_expr(
                inventory_record::Column::Available,
                Expr::col(inventory_record::Column::Available).sub(quantity),
            )
            .col_expr(
                inventory_record::Column::Sold,
                Expr::col(inventory_record::Column::Sold).add(quantity),
            )
            .col_expr(inventory_record::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_record::Column::ProductId.eq(product_id))
            .filter(inventory_record::Column::VariantId.eq(variant_id))
            .filter(inventory_record::Column::Available.gte(quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            let existing = InventoryRecordEntity::find()
                .filter(inventory_record::Column::ProductId.eq(product_id))
                .filter(inventory_record::Column::VariantId.eq(variant_id))
                .one(conn)
                .await?;
            return Err(match existing {
                None => ServiceError::NotFound(format!(
                    "no inventory record for product {product_id} variant {variant_id}"
                )),
                Some(_) => {
                    warn!(%product_id, %variant_id, quantity, "reservation rejected, insufficient stock");
                    ServiceError::InsufficientStock {
                        product_id,
                        variant_id,
                        requested: quantity,
                    }
                }
            });
        }

        Ok(())
    }

    /// Atomically returns `quantity` units from sold to available. Called
    /// exactly once per cancellation; the order state machine guarantees a
    /// cancelled order cannot be cancelled again.
    #[instrument(skip(self, conn))]
    pub async fn release<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "release quantity must be positive".to_string(),
            ));
        }

        let result = InventoryRecordEntity::update_many()
            .col_expr(
                inventory_record::Column::Available,
                Expr::col(inventory_record::Column::Available).add(quantity),
            )
            .col_expr(
                inventory_record::Column::Sold,
                Expr::col(inventory_record::Column::Sold).sub(quantity),
            )
            .col_expr(inventory_record::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_record::Column::ProductId.eq(product_id))
            .filter(inventory_record::Column::VariantId.eq(variant_id))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "no inventory record for product {product_id} variant {variant_id}"
            )));
        }

        Ok(())
    }
}
