use crate::{
    entities::voucher::{self, Entity as VoucherEntity},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Voucher redemption with the same conditional-update discipline as the
/// inventory ledger: the decrement and its precondition (validity window,
/// remaining uses) are one atomic statement.
#[derive(Clone)]
pub struct VoucherService {
    db: Arc<DatabaseConnection>,
}

impl VoucherService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Looks up a voucher by business code and verifies it is currently
    /// active. Used by the order workflow to price the discount before the
    /// atomic redeem; the redeem itself re-checks everything.
    pub async fn require_active<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
    ) -> Result<voucher::Model, ServiceError> {
        let voucher = VoucherEntity::find()
            .filter(voucher::Column::Code.eq(code))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("voucher {code} not found")))?;

        let now = Utc::now();
        if voucher.starts_at > now || now > voucher.ends_at {
            return Err(ServiceError::VoucherNotActive(code.to_string()));
        }
        if voucher.remaining_quantity <= 0 {
            return Err(ServiceError::VoucherExhausted(code.to_string()));
        }
        Ok(voucher)
    }

    /// Atomically consumes one use of the voucher.
    ///
    /// `UPDATE vouchers SET remaining_quantity = remaining_quantity - 1
    ///  WHERE id = ? AND remaining_quantity > 0
    ///    AND starts_at <= now AND ends_at >= now`
    ///
    /// Zero rows affected means the voucher raced to exhaustion or left its
    /// validity window; a follow-up read picks the precise client-facing
    /// reason but never participates in the decision.
    #[instrument(skip(self, conn))]
    pub async fn redeem<C: ConnectionTrait>(
        &self,
        conn: &C,
        voucher_id: Uuid,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        let result = VoucherEntity::update_many()
            .col_expr(
                voucher::Column::RemainingQuantity,
                Expr::col(voucher::Column::RemainingQuantity).sub(1),
            )
            .col_expr(voucher::Column::UpdatedAt, Expr::value(now))
            .filter(voucher::Column::Id.eq(voucher_id))
            .filter(voucher::Column::RemainingQuantity.gt(0))
            .filter(voucher::Column::StartsAt.lte(now))
            .filter(voucher::Column::EndsAt.gte(now))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            let existing = VoucherEntity::find_by_id(voucher_id).one(conn).await?;
            return Err(match existing {
                None => ServiceError::NotFound(format!("voucher {voucher_id} not found")),
                Some(v) if v.starts_at > now || now > v.ends_at => {
                    ServiceError::VoucherNotActive(v.code)
                }
                Some(v) => {
                    warn!(code = %v.code, "voucher redemption rejected, no remaining uses");
                    ServiceError::VoucherExhausted(v.code)
                }
            });
        }

        Ok(())
    }

    /// Atomically returns one use; called only when an order that redeemed
    /// this voucher is cancelled.
    #[instrument(skip(self, conn))]
    pub async fn release<C: ConnectionTrait>(
        &self,
        conn: &C,
        voucher_id: Uuid,
    ) -> Result<(), ServiceError> {
        let result = VoucherEntity::update_many()
            .col_expr(
                voucher::Column::RemainingQuantity,
                Expr::col(voucher::Column::RemainingQuantity).add(1),
            )
            .col_expr(voucher::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(voucher::Column::Id.eq(voucher_id))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "voucher {voucher_id} not found"
            )));
        }
        Ok(())
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Option<voucher::Model>, ServiceError> {
        let voucher = VoucherEntity::find()
            .filter(voucher::Column::Code.eq(code))
            .one(&*self.db)
            .await?;
        Ok(voucher)
    }
}
