use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Facts emitted by the core after a durable state change. Consumed by the
/// spawned processor, which is the fire-and-forget seam towards the
/// notification collaborators: delivery failure never fails the
/// originating transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    StockReceived {
        unit_id: Uuid,
        entry_id: Uuid,
        quantity: i32,
    },
    StockAdjusted {
        unit_id: Uuid,
        quantity_change: i32,
        available_after: i32,
        reason: String,
    },
    StockReserved {
        unit_id: Uuid,
        quantity: i32,
    },
    StockReleased {
        unit_id: Uuid,
        quantity: i32,
    },
    StockSold {
        unit_id: Uuid,
        quantity: i32,
    },
    StockAudited {
        unit_id: Uuid,
        difference: i32,
        audited_by: String,
    },
    InvoicePaid {
        order_id: Uuid,
        invoice_id: Uuid,
        amount: Decimal,
        currency: String,
        transaction_id: String,
        paid_at: DateTime<Utc>,
    },
    InvoiceCancelled {
        order_id: Uuid,
        invoice_id: Uuid,
        reason: String,
    },
    InvoiceRefunded {
        order_id: Uuid,
        invoice_id: Uuid,
        refunded_amount: Decimal,
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

    /// Sends an event. Failure is logged by callers that care; transitions
    /// never depend on delivery.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Creates a connected sender/receiver pair with a bounded channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Consumes events off the channel and logs them. Notification triggers
/// (email/SMS on Paid/Cancelled) hang off this loop in deployments.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::InvoicePaid {
                order_id, amount, currency, ..
            } => {
                info!(order_id = %order_id, amount = %amount, currency = %currency, "Invoice paid");
            }
            Event::InvoiceCancelled { order_id, reason, .. } => {
                info!(order_id = %order_id, reason = %reason, "Invoice cancelled");
            }
            Event::InvoiceRefunded {
                order_id,
                refunded_amount,
                ..
            } => {
                info!(order_id = %order_id, refunded_amount = %refunded_amount, "Invoice refunded");
            }
            Event::StockAudited {
                unit_id,
                difference,
                audited_by,
            } => {
                if *difference != 0 {
                    warn!(unit_id = %unit_id, difference, audited_by = %audited_by, "Stock audit found discrepancy");
                } else {
                    info!(unit_id = %unit_id, audited_by = %audited_by, "Stock audit clean");
                }
            }
            other => {
                info!(event = ?other, "Stock event");
            }
        }
    }
    info!("Event channel closed, processor exiting");
}
