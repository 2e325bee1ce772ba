use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted after a transaction commits.
///
/// The notification collaborator (email/SMS) hangs off this channel; sends
/// are fire-and-forget and can never block or roll back the transaction
/// that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        user_id: Uuid,
        total_amount: Decimal,
    },
    OrderCancelled {
        order_id: Uuid,
        order_number: String,
        user_id: Uuid,
        reason: Option<String>,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    /// A payment callback failed signature or amount verification. Security
    /// event: recorded, never retried.
    PaymentCallbackRejected {
        txn_ref: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("failed to send event: {e}"))
    }

    /// Sends an event, logging instead of failing when the channel is gone.
    /// Post-commit side effects use this: the order is already durable.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!(error = %e, ?event, "dropping post-commit event");
        }
    }
}

/// Builds a connected sender/receiver pair.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Event loop spawned at startup. Stands in for the notification service:
/// each event is handed off (here: logged) and failures are swallowed.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated {
                order_number,
                user_id,
                total_amount,
                ..
            } => {
                info!(%order_number, %user_id, %total_amount, "dispatching order confirmation notification");
            }
            Event::OrderCancelled {
                order_number,
                user_id,
                reason,
                ..
            } => {
                info!(%order_number, %user_id, ?reason, "dispatching order cancellation notification");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            Event::PaymentCallbackRejected { txn_ref } => {
                warn!(?txn_ref, "payment callback rejected; recorded as security event");
            }
        }
    }
}
