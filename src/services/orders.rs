use crate::{
    entities::{
        order::{self, Entity as OrderEntity, OrderStatus},
        order_line_item::{self, Entity as OrderLineItemEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        carts::{CartService, LineSelection},
        inventory::InventoryService,
        vouchers::VoucherService,
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveEnum, ActiveModelTrait, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, message = "Payment method is required"))]
    pub payment_method: String,
    #[validate(length(min = 1, message = "Delivery address is required"))]
    pub shipping_address: String,
    pub voucher_code: Option<String>,
    #[validate(length(min = 1, message = "Order must contain at least one line"))]
    pub lines: Vec<LineSelection>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderLineItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub product_name: String,
    pub variant_name: String,
    pub image_url: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub shipping_address: String,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderLineItemResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Outcome of an order-creation attempt: the order, and whether this call
/// created it. A repeated payment callback yields `created == false`.
#[derive(Debug)]
pub struct CreationOutcome {
    pub order: OrderResponse,
    pub created: bool,
}

/// The order workflow: owns the state machine and every transaction in
/// which orders change.
///
/// Creation is all-or-nothing: pricing, order + line-item inserts, inventory
/// reservations, voucher redemption, and cart clearing either all commit or
/// none do. The transaction value rolls back when dropped, so each `?` on
/// the way is a structural rollback, not a convention.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    inventory: InventoryService,
    vouchers: VoucherService,
    carts: CartService,
    currency: String,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        inventory: InventoryService,
        vouchers: VoucherService,
        carts: CartService,
        currency: String,
    ) -> Self {
        Self {
            db,
            event_sender,
            inventory,
            vouchers,
            carts,
            currency,
        }
    }

    /// Creates an order (the `None -> PENDING` transition).
    ///
    /// When `order_number` is supplied (payment callback path) it is the
    /// idempotency key: an order that already carries it is returned as
    /// already-satisfied instead of being created again, both via the
    /// up-front lookup and, for two racing callbacks, via the unique index
    /// on the column.
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
        order_number: Option<String>,
    ) -> Result<CreationOutcome, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        if let Some(number) = &order_number {
            if let Some(existing) = self.find_by_order_number(number).await? {
                info!(%number, "order already exists for this reference, treating as satisfied");
                return Ok(CreationOutcome {
                    order: self.to_response_with_items(existing).await?,
                    created: false,
                });
            }
        }

        let txn = self.db.begin().await?;

        // Authoritative prices; whatever the cart estimated is discarded.
        let snapshot = self.carts.price_lines(&txn, &request.lines).await?;

        let voucher = match request.voucher_code.as_deref() {
            Some(code) => Some(self.vouchers.require_active(&txn, code).await?),
            None => None,
        };
        let discount_total = voucher
            .as_ref()
            .map(|v| v.discount_amount.min(snapshot.subtotal))
            .unwrap_or(Decimal::ZERO);
        let total_amount = snapshot.subtotal - discount_total;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let number =
            order_number.unwrap_or_else(|| format!("ORD-{}", Uuid::new_v4().simple()));

        let inserted = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(number.clone()),
            user_id: Set(request.user_id),
            voucher_id: Set(voucher.as_ref().map(|v| v.id)),
            subtotal: Set(snapshot.subtotal),
            discount_total: Set(discount_total),
            total_amount: Set(total_amount),
            currency: Set(self.currency.clone()),
            payment_method: Set(request.payment_method.clone()),
            shipping_address: Set(request.shipping_address.clone()),
            status: Set(OrderStatus::Pending),
            cancel_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&txn)
        .await;

        let order_model = match inserted {
            Ok(model) => model,
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                // A concurrent delivery of the same callback won the race.
                // Nothing has been reserved yet; abandon this attempt and
                // report the winner's order.
                txn.rollback().await?;
                let existing = self.find_by_order_number(&number).await?.ok_or_else(|| {
                    ServiceError::InternalError(format!(
                        "order {number} vanished after duplicate insert"
                    ))
                })?;
                return Ok(CreationOutcome {
                    order: self.to_response_with_items(existing).await?,
                    created: false,
                });
            }
            Err(err) => {
                error!(error = %err, %number, "failed to insert order");
                return Err(err.into());
            }
        };

        let mut item_models = Vec::with_capacity(snapshot.lines.len());
        for line in &snapshot.lines {
            let item = order_line_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                variant_id: Set(line.variant_id),
                product_name: Set(line.product_name.clone()),
                variant_name: Set(line.variant_name.clone()),
                image_url: Set(line.image_url.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                feedback_submitted: Set(false),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            item_models.push(item);
        }

        for line in &snapshot.lines {
            self.inventory
                .reserve(&txn, line.product_id, line.variant_id, line.quantity)
                .await?;
        }

        if let Some(voucher) = &voucher {
            self.vouchers.redeem(&txn, voucher.id).await?;
        }

        let converted: Vec<(Uuid, Uuid)> = snapshot
            .lines
            .iter()
            .map(|l| (l.product_id, l.variant_id))
            .collect();
        self.carts
            .clear_converted(&txn, request.user_id, &converted)
            .await?;

        txn.commit().await?;

        info!(%order_id, order_number = %number, %total_amount, "order created");
        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id,
                order_number: number,
                user_id: request.user_id,
                total_amount,
            })
            .await;

        Ok(CreationOutcome {
            order: Self::assemble_response(order_model, item_models),
            created: true,
        })
    }

    /// Cancels a `PENDING` order, releasing every line's reservation and the
    /// redeemed voucher. Cancelling an order in any other state is an
    /// invalid-transition conflict, never a silent no-op.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<OrderResponse, ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id} not found")))?;

        if !order.status.can_transition(OrderStatus::Cancelled) {
            return Err(ServiceError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Cancelled,
            });
        }

        // Conditional transition: the status predicate rides on the UPDATE,
        // so two racing cancellations cannot both reach the release step.
        let updated = self
            .transition(
                &txn,
                order_id,
                order.status,
                OrderStatus::Cancelled,
                reason.clone(),
            )
            .await?;
        if !updated {
            let current = self.current_status(&txn, order_id).await?;
            return Err(ServiceError::InvalidTransition {
                from: current,
                to: OrderStatus::Cancelled,
            });
        }

        let items = OrderLineItemEntity::find()
            .filter(order_line_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;

        for item in &items {
            self.inventory
                .release(&txn, item.product_id, item.variant_id, item.quantity)
                .await?;
        }

        if let Some(voucher_id) = order.voucher_id {
            self.vouchers.release(&txn, voucher_id).await?;
        }

        txn.commit().await?;

        info!(%order_id, "order cancelled");
        self.event_sender
            .send_or_log(Event::OrderCancelled {
                order_id,
                order_number: order.order_number.clone(),
                user_id: order.user_id,
                reason: reason.clone(),
            })
            .await;

        let refreshed = self.require_order(order_id).await?;
        Ok(self.to_response_with_items(refreshed).await?)
    }

    /// Administrative status progression (`PENDING -> DELIVERING ->
    /// SUCCEEDED`). Touches neither inventory nor the voucher.
    #[instrument(skip(self))]
    pub async fn advance_status(
        &self,
        order_id: Uuid,
        to: OrderStatus,
    ) -> Result<OrderResponse, ServiceError> {
        if !matches!(to, OrderStatus::Delivering | OrderStatus::Succeeded) {
            return Err(ServiceError::InvalidOperation(format!(
                "status {to} cannot be set through the fulfillment progression"
            )));
        }

        let order = self.require_order(order_id).await?;
        if !order.status.can_transition(to) {
            return Err(ServiceError::InvalidTransition {
                from: order.status,
                to,
            });
        }

        let updated = self
            .transition(&*self.db, order_id, order.status, to, None)
            .await?;
        if !updated {
            let current = self.current_status(&*self.db, order_id).await?;
            return Err(ServiceError::InvalidTransition { from: current, to });
        }

        info!(%order_id, from = %order.status, %to, "order status advanced");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: order.status.to_string(),
                new_status: to.to_string(),
            })
            .await;

        let refreshed = self.require_order(order_id).await?;
        Ok(self.to_response_with_items(refreshed).await?)
    }

    /// Administrative soft delete. Historical fulfillment already happened,
    /// so inventory is deliberately not reversed.
    #[instrument(skip(self))]
    pub async fn delete_order(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let order = self.require_order(order_id).await?;
        if !order.status.can_transition(OrderStatus::Deleted) {
            return Err(ServiceError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Deleted,
            });
        }

        let updated = self
            .transition(&*self.db, order_id, order.status, OrderStatus::Deleted, None)
            .await?;
        if !updated {
            let current = self.current_status(&*self.db, order_id).await?;
            return Err(ServiceError::InvalidTransition {
                from: current,
                to: OrderStatus::Deleted,
            });
        }

        info!(%order_id, "order soft-deleted");
        Ok(())
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let order = self.require_order(order_id).await?;
        if order.status == OrderStatus::Deleted {
            // Soft-deleted orders are hidden from the buyer surface.
            return Err(ServiceError::NotFound(format!("order {order_id} not found")));
        }
        self.to_response_with_items(order).await
    }

    pub async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        let order = OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?;
        Ok(order)
    }

    /// Paginated listing, optionally scoped to one buyer. Soft-deleted
    /// orders are excluded.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        user_id: Option<Uuid>,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let mut query = OrderEntity::find()
            .filter(order::Column::Status.ne(OrderStatus::Deleted.to_value()))
            .order_by_desc(order::Column::CreatedAt);
        if let Some(user_id) = user_id {
            query = query.filter(order::Column::UserId.eq(user_id));
        }

        let paginator = query.paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(OrderListResponse {
            orders: orders
                .into_iter()
                .map(|o| Self::assemble_response(o, Vec::new()))
                .collect(),
            total,
            page,
            per_page,
        })
    }

    async fn require_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id} not found")))
    }

    async fn current_status<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<OrderStatus, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id} not found")))?;
        Ok(order.status)
    }

    /// One conditional UPDATE moving `order_id` from `from` to `to`.
    /// Returns whether the row was actually transitioned; `false` means a
    /// concurrent writer got there first.
    async fn transition<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        cancel_reason: Option<String>,
    ) -> Result<bool, ServiceError> {
        let mut stmt = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(to.to_value()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(from.to_value()));
        if let Some(reason) = cancel_reason {
            stmt = stmt.col_expr(order::Column::CancelReason, Expr::value(Some(reason)));
        }
        let result = stmt.exec(conn).await?;
        Ok(result.rows_affected == 1)
    }

    async fn to_response_with_items(
        &self,
        order: order::Model,
    ) -> Result<OrderResponse, ServiceError> {
        let items = OrderLineItemEntity::find()
            .filter(order_line_item::Column::OrderId.eq(order.id))
            .all(&*self.db)
            .await?;
        Ok(Self::assemble_response(order, items))
    }

    fn assemble_response(
        order: order::Model,
        items: Vec<order_line_item::Model>,
    ) -> OrderResponse {
        OrderResponse {
            id: order.id,
            order_number: order.order_number,
            user_id: order.user_id,
            status: order.status,
            subtotal: order.subtotal,
            discount_total: order.discount_total,
            total_amount: order.total_amount,
            currency: order.currency,
            payment_method: order.payment_method,
            shipping_address: order.shipping_address,
            cancel_reason: order.cancel_reason,
            created_at: order.created_at,
            items: items
                .into_iter()
                .map(|item| OrderLineItemResponse {
                    id: item.id,
                    product_id: item.product_id,
                    variant_id: item.variant_id,
                    product_name: item.product_name,
                    variant_name: item.variant_name,
                    image_url: item.image_url,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
        }
    }
}
