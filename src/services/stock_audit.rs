use crate::{
    entities::{stock_transaction::TransactionType, stock_unit},
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock_ledger::{ApplyTransaction, Reference, StockLedgerService},
};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Result of reconciling a physical count against the system quantity.
#[derive(Debug, Clone, Serialize)]
pub struct AuditOutcome {
    pub audit_id: Uuid,
    /// `actual - available` at the moment of the audit
    pub difference: i32,
    pub unit: stock_unit::Model,
}

/// Compares counted stock to the system's view and writes a signed
/// adjustment. A clean count still records a zero-change transaction as
/// proof the audit happened.
#[derive(Clone)]
pub struct StockAuditService {
    ledger: StockLedgerService,
    event_sender: EventSender,
}

impl StockAuditService {
    pub fn new(ledger: StockLedgerService, event_sender: EventSender) -> Self {
        Self {
            ledger,
            event_sender,
        }
    }

    #[instrument(skip(self, notes))]
    pub async fn audit(
        &self,
        unit_id: Uuid,
        actual_quantity: i32,
        audited_by: &str,
        notes: Option<&str>,
    ) -> Result<AuditOutcome, ServiceError> {
        if actual_quantity < 0 {
            return Err(ServiceError::ValidationError(
                "counted quantity cannot be negative".to_string(),
            ));
        }

        let unit = self.ledger.get_unit(unit_id).await?;
        let difference = actual_quantity - unit.available_quantity;
        let audit_id = Uuid::new_v4();

        let mut reason = format!(
            "Stock audit: counted {}, system {}, difference {:+}",
            actual_quantity, unit.available_quantity, difference
        );
        if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
            reason.push_str("; ");
            reason.push_str(notes.trim());
        }

        // A zero difference is still an Adjustment row; history readers
        // tell it apart from corrections by its quantity_change of 0.
        let unit = self
            .ledger
            .apply_transaction(ApplyTransaction {
                unit_id,
                transaction_type: TransactionType::Adjustment,
                quantity_change: difference,
                reason,
                reference: Some(Reference::stock_audit(audit_id)),
                actor: audited_by.to_string(),
            })
            .await?;

        info!(
            unit_id = %unit_id,
            audit_id = %audit_id,
            difference,
            audited_by = %audited_by,
            "Recorded stock audit"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::StockAudited {
                unit_id,
                difference,
                audited_by: audited_by.to_string(),
            })
            .await
        {
            warn!(error = %e, "Failed to send stock audit event");
        }

        Ok(AuditOutcome {
            audit_id,
            difference,
            unit,
        })
    }
}
