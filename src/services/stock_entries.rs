use crate::{
    db::DbPool,
    entities::{
        stock_entry::{self, Entity as StockEntries},
        stock_transaction::{self, Entity as StockTransactions, TransactionType},
        stock_unit::{self, Entity as StockUnits},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock_ledger::{apply_effect, Reference, StockLedgerService},
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

/// A supplier receipt to be recorded for later processing.
#[derive(Debug, Clone)]
pub struct CreateStockEntry {
    pub sku: String,
    pub supplier_id: Option<Uuid>,
    pub quantity_received: i32,
    pub unit_cost: Option<Decimal>,
    pub batch_number: Option<String>,
    pub received_by: String,
}

/// Converts pending supplier receipts into stock, exactly once per entry.
#[derive(Clone)]
pub struct StockEntryService {
    db: Arc<DbPool>,
    ledger: StockLedgerService,
    event_sender: EventSender,
}

impl StockEntryService {
    pub fn new(db: Arc<DbPool>, ledger: StockLedgerService, event_sender: EventSender) -> Self {
        Self {
            db,
            ledger,
            event_sender,
        }
    }

    /// Records an unprocessed receipt, creating the stock unit lazily on
    /// first contact with the sku.
    #[instrument(skip(self, cmd), fields(sku = %cmd.sku))]
    pub async fn create_entry(
        &self,
        cmd: CreateStockEntry,
    ) -> Result<stock_entry::Model, ServiceError> {
        if cmd.quantity_received <= 0 {
            return Err(ServiceError::ValidationError(
                "received quantity must be positive".to_string(),
            ));
        }

        let unit = self
            .ledger
            .find_or_create_unit(&cmd.sku, &cmd.received_by)
            .await?;

        let model = stock_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            unit_id: Set(unit.id),
            supplier_id: Set(cmd.supplier_id),
            quantity_received: Set(cmd.quantity_received),
            unit_cost: Set(cmd.unit_cost),
            batch_number: Set(cmd.batch_number),
            is_processed: Set(false),
            received_by: Set(cmd.received_by.clone()),
            processed_by: Set(None),
            processed_at: Set(None),
            entry_date: Set(Utc::now()),
        };

        let entry = model.insert(&*self.db).await.map_err(ServiceError::db_error)?;
        info!(entry_id = %entry.id, unit_id = %unit.id, quantity = entry.quantity_received, "Recorded stock entry");
        Ok(entry)
    }

    pub async fn get_entry(&self, entry_id: Uuid) -> Result<stock_entry::Model, ServiceError> {
        StockEntries::find_by_id(entry_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Stock entry {} not found", entry_id)))
    }

    /// Processes a receipt exactly once: credits the unit through the
    /// ledger and flips `is_processed`, both in one transaction. Repeated
    /// calls fail with `AlreadyProcessed`, which callers treat as a
    /// success-equivalent no-op. A leftover StockIn referencing this entry
    /// without the flag set (a crash between the two writes, or an
    /// operator repair) is detected and only the flip is redone, so stock
    /// is never credited twice.
    #[instrument(skip(self))]
    pub async fn process(&self, entry_id: Uuid, processed_by: &str) -> Result<(), ServiceError> {
        crate::db::retry_once("process_stock_entry", || {
            self.process_with_retries(entry_id, processed_by)
        })
        .await?;

        let entry = self.get_entry(entry_id).await?;
        if let Err(e) = self
            .event_sender
            .send(Event::StockReceived {
                unit_id: entry.unit_id,
                entry_id,
                quantity: entry.quantity_received,
            })
            .await
        {
            warn!(error = %e, "Failed to send stock received event");
        }
        Ok(())
    }

    async fn process_with_retries(
        &self,
        entry_id: Uuid,
        processed_by: &str,
    ) -> Result<(), ServiceError> {
        // Same bounded-retry discipline as the ledger's version check.
        for attempt in 0..5 {
            match self.process_once(entry_id, processed_by).await {
                Err(ServiceError::ConcurrentModification(unit_id)) => {
                    warn!(entry_id = %entry_id, unit_id = %unit_id, attempt, "Stock unit version race lost, retrying entry processing");
                }
                other => return other,
            }
        }
        Err(ServiceError::Unavailable(format!(
            "stock entry {} could not be processed under contention",
            entry_id
        )))
    }

    async fn process_once(&self, entry_id: Uuid, processed_by: &str) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let entry = StockEntries::find_by_id(entry_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Stock entry {} not found", entry_id)))?;

        if entry.is_processed {
            txn.rollback().await.map_err(ServiceError::db_error)?;
            info!(entry_id = %entry_id, "Stock entry already processed, ignoring");
            return Err(ServiceError::AlreadyProcessed(entry_id.to_string()));
        }

        let existing_credit = StockTransactions::find()
            .filter(stock_transaction::Column::ReferenceType.eq("stock_entry"))
            .filter(stock_transaction::Column::ReferenceId.eq(entry_id.to_string()))
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        if existing_credit.is_none() {
            self.credit_stock(&txn, &entry, processed_by).await?;
        } else {
            // The ledger already carries this receipt; finish the flip only.
            warn!(entry_id = %entry_id, "Ledger already credited this entry, completing the processed flag");
        }

        let mut active: stock_entry::ActiveModel = entry.into();
        active.is_processed = Set(true);
        active.processed_by = Set(Some(processed_by.to_string()));
        active.processed_at = Set(Some(Utc::now()));
        active.update(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(entry_id = %entry_id, processed_by = %processed_by, "Processed stock entry");
        Ok(())
    }

    /// StockIn against the unit inside the caller's transaction, with the
    /// same version discipline as the ledger service.
    async fn credit_stock(
        &self,
        txn: &DatabaseTransaction,
        entry: &stock_entry::Model,
        processed_by: &str,
    ) -> Result<(), ServiceError> {
        let unit = StockUnits::find_by_id(entry.unit_id)
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Stock unit {} not found", entry.unit_id))
            })?;

        let (new_available, new_reserved) = apply_effect(
            TransactionType::StockIn,
            entry.quantity_received,
            unit.available_quantity,
            unit.reserved_quantity,
        )?;

        let now = Utc::now();
        let updated = StockUnits::update_many()
            .col_expr(
                stock_unit::Column::AvailableQuantity,
                Expr::value(new_available),
            )
            .col_expr(
                stock_unit::Column::ReservedQuantity,
                Expr::value(new_reserved),
            )
            .col_expr(stock_unit::Column::Version, Expr::value(unit.version + 1))
            .col_expr(
                stock_unit::Column::LastUpdatedBy,
                Expr::value(processed_by.to_string()),
            )
            .col_expr(stock_unit::Column::UpdatedAt, Expr::value(now))
            .filter(stock_unit::Column::Id.eq(unit.id))
            .filter(stock_unit::Column::Version.eq(unit.version))
            .exec(txn)
            .await
            .map_err(ServiceError::db_error)?;

        if updated.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(unit.id));
        }

        let reference = Reference::stock_entry(entry.id);
        let ledger_row = stock_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            unit_id: Set(unit.id),
            transaction_type: Set(TransactionType::StockIn.as_str().to_string()),
            quantity_change: Set(entry.quantity_received),
            available_before: Set(unit.available_quantity),
            available_after: Set(new_available),
            reserved_before: Set(unit.reserved_quantity),
            reserved_after: Set(new_reserved),
            reason: Set(format!(
                "Supplier receipt{}",
                entry
                    .batch_number
                    .as_deref()
                    .map(|b| format!(" batch {}", b))
                    .unwrap_or_default()
            )),
            reference_type: Set(Some(reference.reference_type)),
            reference_id: Set(Some(reference.reference_id)),
            created_by: Set(processed_by.to_string()),
            occurred_at: Set(now),
        };
        ledger_row.insert(txn).await.map_err(ServiceError::db_error)?;
        Ok(())
    }

    /// Unprocessed receipts, oldest first, for the receiving queue.
    pub async fn list_pending(&self, limit: u64) -> Result<Vec<stock_entry::Model>, ServiceError> {
        use sea_orm::QuerySelect;
        StockEntries::find()
            .filter(stock_entry::Column::IsProcessed.eq(false))
            .order_by_asc(stock_entry::Column::EntryDate)
            .limit(limit)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }
}
