use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discount voucher with a redemption counter and a validity window.
///
/// Active iff `starts_at <= now <= ends_at` and `remaining_quantity > 0`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vouchers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Business code the buyer types in, unique.
    pub code: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub discount_amount: Decimal,
    pub remaining_quantity: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order::Entity")]
    Orders,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.remaining_quantity > 0 && self.starts_at <= now && now <= self.ends_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn voucher(remaining: i32, start_offset: i64, end_offset: i64) -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            code: "TEST".to_string(),
            discount_amount: dec!(5.00),
            remaining_quantity: remaining,
            starts_at: now + Duration::hours(start_offset),
            ends_at: now + Duration::hours(end_offset),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn active_requires_window_and_remaining_uses() {
        let now = Utc::now();
        assert!(voucher(1, -1, 1).is_active(now));
        assert!(!voucher(0, -1, 1).is_active(now), "exhausted");
        assert!(!voucher(1, 1, 2).is_active(now), "not started");
        assert!(!voucher(1, -2, -1).is_active(now), "expired");
    }
}
