use crate::{
    db::DbPool,
    entities::{
        invoice::{self, derive_invoice_number, Entity as Invoices, InvoiceStatus},
        payment::{self, Entity as Payments},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    gateways::{GatewayKind, GatewayOutcome, GatewayResult},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// The single state machine over {Draft, Paid, Cancelled, Refunded}. The
/// only writer of invoice status; consumes normalized gateway outcomes and
/// never branches on gateway identity. All transitions are conditional
/// updates against the current status, so duplicate gateway notifications
/// collapse into no-ops instead of double-applying.
#[derive(Clone)]
pub struct InvoiceService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl InvoiceService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Opens a checkout attempt: one Draft invoice per order, with its
    /// payments mirror row. An existing non-cancelled invoice for the
    /// order is returned as-is so a double-submitted checkout does not
    /// fork the financial record.
    #[instrument(skip(self))]
    pub async fn create_invoice(
        &self,
        order_id: Uuid,
        amount: Decimal,
        currency: &str,
        gateway: GatewayKind,
    ) -> Result<invoice::Model, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "invoice amount must be positive".to_string(),
            ));
        }
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ServiceError::ValidationError(
                "currency must be a 3-letter ISO code".to_string(),
            ));
        }

        if let Some(existing) = self.find_active_by_order(order_id).await? {
            info!(order_id = %order_id, invoice_id = %existing.id, "Reusing active invoice for order");
            return Ok(existing);
        }

        let now = Utc::now();
        let invoice_id = Uuid::new_v4();
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let model = invoice::ActiveModel {
            id: Set(invoice_id),
            order_id: Set(order_id),
            invoice_number: Set(derive_invoice_number(order_id, now)),
            status: Set(InvoiceStatus::Draft.as_str().to_string()),
            amount: Set(amount),
            currency: Set(currency.to_uppercase()),
            gateway: Set(gateway.as_str().to_string()),
            gateway_order_id: Set(None),
            transaction_id: Set(None),
            card_metadata: Set(None),
            paid_at: Set(None),
            cancelled_at: Set(None),
            cancellation_reason: Set(None),
            refunded_amount: Set(None),
            refunded_at: Set(None),
            refund_transaction_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let created = model.insert(&txn).await.map_err(ServiceError::db_error)?;

        let mirror = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_id: Set(invoice_id),
            method: Set(gateway.as_str().to_string()),
            status: Set(InvoiceStatus::Draft.as_str().to_string()),
            transaction_id: Set(None),
            paid_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        mirror.insert(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(order_id = %order_id, invoice_id = %invoice_id, invoice_number = %created.invoice_number, "Created draft invoice");
        Ok(created)
    }

    pub async fn get_by_order(&self, order_id: Uuid) -> Result<invoice::Model, ServiceError> {
        self.find_active_by_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No invoice for order {}", order_id)))
    }

    async fn find_active_by_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<invoice::Model>, ServiceError> {
        // Cancelled invoices are terminal per checkout attempt; a retried
        // order gets a fresh draft.
        Invoices::find()
            .filter(invoice::Column::OrderId.eq(order_id))
            .filter(invoice::Column::Status.ne(InvoiceStatus::Cancelled.as_str()))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Lookup for gateway-driven transitions. Prefers the active invoice,
    /// falling back to the latest cancelled one so redelivered
    /// notifications for a dead attempt resolve to a no-op or a refused
    /// transition instead of a 404.
    async fn find_for_reconciliation(
        &self,
        order_id: Uuid,
    ) -> Result<invoice::Model, ServiceError> {
        if let Some(active) = self.find_active_by_order(order_id).await? {
            return Ok(active);
        }
        Invoices::find()
            .filter(invoice::Column::OrderId.eq(order_id))
            .order_by_desc(invoice::Column::CreatedAt)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("No invoice for order {}", order_id)))
    }

    /// Records the gateway order id handed back by `begin_checkout`.
    pub async fn attach_gateway_order(
        &self,
        invoice_id: Uuid,
        gateway_order_id: &str,
    ) -> Result<(), ServiceError> {
        let mut active = invoice::ActiveModel {
            id: Set(invoice_id),
            ..Default::default()
        };
        active.gateway_order_id = Set(Some(gateway_order_id.to_string()));
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await.map_err(ServiceError::db_error)?;
        Ok(())
    }

    /// Maps a normalized gateway outcome onto the invoice lifecycle and
    /// returns the resulting status. Both gateways may redeliver the same
    /// confirmation; delivery is made idempotent here, not in the adapters.
    #[instrument(skip(self, result), fields(outcome = ?result.outcome))]
    pub async fn reconcile(
        &self,
        order_id: Uuid,
        result: &GatewayResult,
    ) -> Result<InvoiceStatus, ServiceError> {
        match result.outcome {
            GatewayOutcome::Settled => self.settle(order_id, result).await,
            GatewayOutcome::Failed => {
                self.cancel(order_id, "payment failed at gateway").await
            }
            GatewayOutcome::Cancelled => {
                self.cancel(order_id, "payment cancelled by customer").await
            }
        }
    }

    /// Draft -> Paid, guarded by a conditional update so a duplicate
    /// settlement observes Paid and mutates nothing.
    async fn settle(
        &self,
        order_id: Uuid,
        result: &GatewayResult,
    ) -> Result<InvoiceStatus, ServiceError> {
        let invoice = self.find_for_reconciliation(order_id).await?;

        if let Some(actual) = result.amount {
            if actual != invoice.amount {
                warn!(order_id = %order_id, expected = %invoice.amount, actual = %actual, "Settlement amount mismatch");
                return Err(ServiceError::ValidationError(format!(
                    "settled amount {} does not match invoice amount {}",
                    actual, invoice.amount
                )));
            }
        }

        let paid_at = result.paid_at.unwrap_or_else(Utc::now);
        let transaction_id = result
            .transaction_id
            .clone()
            .ok_or_else(|| ServiceError::ValidationError("settled result lacks a transaction id".to_string()))?;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let updated = Invoices::update_many()
            .col_expr(
                invoice::Column::Status,
                Expr::value(InvoiceStatus::Paid.as_str()),
            )
            .col_expr(invoice::Column::PaidAt, Expr::value(paid_at))
            .col_expr(
                invoice::Column::TransactionId,
                Expr::value(transaction_id.clone()),
            )
            .col_expr(
                invoice::Column::GatewayOrderId,
                Expr::value(
                    result
                        .gateway_order_id
                        .clone()
                        .or(invoice.gateway_order_id.clone()),
                ),
            )
            .col_expr(
                invoice::Column::CardMetadata,
                Expr::value(result.metadata.clone()),
            )
            .col_expr(invoice::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(invoice::Column::Id.eq(invoice.id))
            .filter(invoice::Column::Status.eq(InvoiceStatus::Draft.as_str()))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        if updated.rows_affected == 0 {
            txn.rollback().await.map_err(ServiceError::db_error)?;
            // A concurrent delivery may have won the race after our read,
            // so classify on the current row, not the stale snapshot.
            let current = self.find_for_reconciliation(order_id).await?;
            return match current.status_enum() {
                Some(InvoiceStatus::Paid) => {
                    // Duplicate delivery; the first settlement stands.
                    info!(order_id = %order_id, "Duplicate settlement for paid invoice, ignoring");
                    Ok(InvoiceStatus::Paid)
                }
                other => Err(ServiceError::InvalidStateTransition(format!(
                    "invoice for order {} is {:?}, cannot settle",
                    order_id, other
                ))),
            };
        }

        self.mirror_status(&txn, invoice.id, InvoiceStatus::Paid, Some(&transaction_id), Some(paid_at))
            .await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(order_id = %order_id, invoice_id = %invoice.id, transaction_id = %transaction_id, "Invoice settled");
        if let Err(e) = self
            .event_sender
            .send(Event::InvoicePaid {
                order_id,
                invoice_id: invoice.id,
                amount: invoice.amount,
                currency: invoice.currency.clone(),
                transaction_id,
                paid_at,
            })
            .await
        {
            warn!(error = %e, "Failed to send invoice paid event");
        }
        Ok(InvoiceStatus::Paid)
    }

    /// Draft -> Cancelled; explicit user cancellation and failed/cancelled
    /// gateway outcomes share this path. Terminal for the checkout
    /// attempt; duplicate deliveries are no-ops.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        order_id: Uuid,
        reason: &str,
    ) -> Result<InvoiceStatus, ServiceError> {
        let invoice = self.find_for_reconciliation(order_id).await?;
        let now = Utc::now();

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let updated = Invoices::update_many()
            .col_expr(
                invoice::Column::Status,
                Expr::value(InvoiceStatus::Cancelled.as_str()),
            )
            .col_expr(invoice::Column::CancelledAt, Expr::value(now))
            .col_expr(
                invoice::Column::CancellationReason,
                Expr::value(reason.to_string()),
            )
            .col_expr(invoice::Column::UpdatedAt, Expr::value(now))
            .filter(invoice::Column::Id.eq(invoice.id))
            .filter(invoice::Column::Status.eq(InvoiceStatus::Draft.as_str()))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        if updated.rows_affected == 0 {
            txn.rollback().await.map_err(ServiceError::db_error)?;
            let current = self.find_for_reconciliation(order_id).await?;
            return match current.status_enum() {
                Some(InvoiceStatus::Cancelled) => {
                    info!(order_id = %order_id, "Invoice already cancelled, ignoring");
                    Ok(InvoiceStatus::Cancelled)
                }
                other => Err(ServiceError::InvalidStateTransition(format!(
                    "invoice for order {} is {:?}, cannot cancel",
                    order_id, other
                ))),
            };
        }

        self.mirror_status(&txn, invoice.id, InvoiceStatus::Cancelled, None, None)
            .await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(order_id = %order_id, invoice_id = %invoice.id, reason = %reason, "Invoice cancelled");
        if let Err(e) = self
            .event_sender
            .send(Event::InvoiceCancelled {
                order_id,
                invoice_id: invoice.id,
                reason: reason.to_string(),
            })
            .await
        {
            warn!(error = %e, "Failed to send invoice cancelled event");
        }
        Ok(InvoiceStatus::Cancelled)
    }

    /// Paid -> Refunded, administrative action only; never driven by a
    /// gateway callback.
    #[instrument(skip(self))]
    pub async fn refund(
        &self,
        order_id: Uuid,
        amount: Decimal,
        refund_transaction_id: &str,
    ) -> Result<InvoiceStatus, ServiceError> {
        let invoice = self.find_for_reconciliation(order_id).await?;

        if amount <= Decimal::ZERO || amount > invoice.amount {
            return Err(ServiceError::ValidationError(format!(
                "refund amount {} must be positive and at most the invoice amount {}",
                amount, invoice.amount
            )));
        }

        let now = Utc::now();
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let updated = Invoices::update_many()
            .col_expr(
                invoice::Column::Status,
                Expr::value(InvoiceStatus::Refunded.as_str()),
            )
            .col_expr(invoice::Column::RefundedAmount, Expr::value(amount))
            .col_expr(invoice::Column::RefundedAt, Expr::value(now))
            .col_expr(
                invoice::Column::RefundTransactionId,
                Expr::value(refund_transaction_id.to_string()),
            )
            .col_expr(invoice::Column::UpdatedAt, Expr::value(now))
            .filter(invoice::Column::Id.eq(invoice.id))
            .filter(invoice::Column::Status.eq(InvoiceStatus::Paid.as_str()))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        if updated.rows_affected == 0 {
            txn.rollback().await.map_err(ServiceError::db_error)?;
            return Err(ServiceError::InvalidStateTransition(format!(
                "invoice for order {} is {:?}, only Paid can be refunded",
                order_id,
                invoice.status_enum()
            )));
        }

        self.mirror_status(&txn, invoice.id, InvoiceStatus::Refunded, None, None)
            .await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(order_id = %order_id, invoice_id = %invoice.id, amount = %amount, "Invoice refunded");
        if let Err(e) = self
            .event_sender
            .send(Event::InvoiceRefunded {
                order_id,
                invoice_id: invoice.id,
                refunded_amount: amount,
            })
            .await
        {
            warn!(error = %e, "Failed to send invoice refunded event");
        }
        Ok(InvoiceStatus::Refunded)
    }

    /// Keeps the operational payments row coarsely in step with the
    /// invoice, inside the same transaction as the status write.
    async fn mirror_status(
        &self,
        txn: &DatabaseTransaction,
        invoice_id: Uuid,
        status: InvoiceStatus,
        transaction_id: Option<&str>,
        paid_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<(), ServiceError> {
        let mut update = Payments::update_many()
            .col_expr(payment::Column::Status, Expr::value(status.as_str()))
            .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()));
        if let Some(tx_id) = transaction_id {
            update = update.col_expr(
                payment::Column::TransactionId,
                Expr::value(tx_id.to_string()),
            );
        }
        if let Some(paid_at) = paid_at {
            update = update.col_expr(payment::Column::PaidAt, Expr::value(paid_at));
        }
        update
            .filter(payment::Column::InvoiceId.eq(invoice_id))
            .exec(txn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(())
    }
}
