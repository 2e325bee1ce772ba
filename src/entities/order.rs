use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A durable order. Totals are computed once at creation and never
/// recomputed afterward: this row is a financial record, not a live view of
/// the catalog.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Externally exposed opaque order code, unique.
    pub order_number: String,
    pub user_id: Uuid,
    #[sea_orm(nullable)]
    pub voucher_id: Option<Uuid>,
    /// Sum of line item unit_price * quantity, before the voucher.
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub subtotal: Decimal,
    /// Voucher discount applied at creation, capped at the subtotal.
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub discount_total: Decimal,
    /// Payable amount: subtotal - discount_total.
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total_amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub shipping_address: String,
    pub status: OrderStatus,
    #[sea_orm(nullable)]
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_line_item::Entity")]
    LineItems,
    #[sea_orm(
        belongs_to = "super::voucher::Entity",
        from = "Column::VoucherId",
        to = "super::voucher::Column::Id"
    )]
    Voucher,
}

impl Related<super::order_line_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LineItems.def()
    }
}

impl Related<super::voucher::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Voucher.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Order lifecycle states.
///
/// `Pending -> Delivering -> Succeeded` is the fulfillment path;
/// `Pending -> Cancelled` releases inventory and voucher; `Deleted` is an
/// administrative soft delete reachable from any non-terminal state.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "delivering")]
    Delivering,
    #[sea_orm(string_value = "succeeded")]
    Succeeded,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "deleted")]
    Deleted,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Succeeded | OrderStatus::Cancelled | OrderStatus::Deleted
        )
    }

    /// Central transition table. Every status change goes through this check
    /// before persistence is touched.
    pub fn can_transition(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, to) {
            (Pending, Delivering) => true,
            (Delivering, Succeeded) => true,
            (Pending, Cancelled) => true,
            (from, Deleted) => !from.is_terminal(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Pending, Delivering, true)]
    #[case(Delivering, Succeeded, true)]
    #[case(Pending, Cancelled, true)]
    #[case(Pending, Deleted, true)]
    #[case(Delivering, Deleted, true)]
    #[case(Delivering, Cancelled, false)]
    #[case(Succeeded, Cancelled, false)]
    #[case(Succeeded, Deleted, false)]
    #[case(Cancelled, Delivering, false)]
    #[case(Deleted, Deleted, false)]
    #[case(Pending, Succeeded, false)]
    fn transition_table(
        #[case] from: OrderStatus,
        #[case] to: OrderStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition(to), allowed, "{from} -> {to}");
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [Pending, Delivering, Succeeded, Cancelled, Deleted] {
            let text = status.to_string();
            let parsed: OrderStatus = text.parse().expect("parse back");
            assert_eq!(parsed, status);
        }
    }
}
