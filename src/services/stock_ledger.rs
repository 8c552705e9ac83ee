use crate::{
    db::DbPool,
    entities::{
        stock_transaction::{self, Entity as StockTransactions, TransactionType},
        stock_unit::{self, Entity as StockUnits},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// How often a lost optimistic-version race is retried before giving up.
const MAX_VERSION_RETRIES: u32 = 5;

/// A requested quantity change against one unit.
#[derive(Debug, Clone)]
pub struct ApplyTransaction {
    pub unit_id: Uuid,
    pub transaction_type: TransactionType,
    /// Positive for StockIn/Reservation/Release/Sale; signed for Adjustment
    pub quantity_change: i32,
    pub reason: String,
    pub reference: Option<Reference>,
    pub actor: String,
}

/// What caused a ledger entry, e.g. ("stock_entry", entry id).
#[derive(Debug, Clone)]
pub struct Reference {
    pub reference_type: String,
    pub reference_id: String,
}

impl Reference {
    pub fn stock_entry(id: Uuid) -> Self {
        Self {
            reference_type: "stock_entry".to_string(),
            reference_id: id.to_string(),
        }
    }

    pub fn stock_audit(id: Uuid) -> Self {
        Self {
            reference_type: "stock_audit".to_string(),
            reference_id: id.to_string(),
        }
    }

    pub fn order(id: Uuid) -> Self {
        Self {
            reference_type: "order".to_string(),
            reference_id: id.to_string(),
        }
    }
}

fn add_quantity(current: i32, delta: i32) -> Result<i32, ServiceError> {
    current.checked_add(delta).ok_or_else(|| {
        ServiceError::ValidationError(format!(
            "quantity {} plus {} overflows",
            current, delta
        ))
    })
}

/// Computes the post-transaction quantities for a unit, enforcing the
/// non-negativity floor. Pure; shared between the live write path and
/// ledger replay so both always agree.
pub fn apply_effect(
    transaction_type: TransactionType,
    quantity_change: i32,
    available: i32,
    reserved: i32,
) -> Result<(i32, i32), ServiceError> {
    match transaction_type {
        TransactionType::StockIn => {
            if quantity_change <= 0 {
                return Err(ServiceError::ValidationError(
                    "stock-in quantity must be positive".to_string(),
                ));
            }
            Ok((add_quantity(available, quantity_change)?, reserved))
        }
        TransactionType::Reservation => {
            if quantity_change <= 0 {
                return Err(ServiceError::ValidationError(
                    "reservation quantity must be positive".to_string(),
                ));
            }
            if available < quantity_change {
                return Err(ServiceError::InsufficientStock(format!(
                    "available {} cannot cover reservation of {}",
                    available, quantity_change
                )));
            }
            Ok((available - quantity_change, add_quantity(reserved, quantity_change)?))
        }
        TransactionType::Release => {
            if quantity_change <= 0 {
                return Err(ServiceError::ValidationError(
                    "release quantity must be positive".to_string(),
                ));
            }
            if reserved < quantity_change {
                return Err(ServiceError::ValidationError(format!(
                    "cannot release {} with only {} reserved",
                    quantity_change, reserved
                )));
            }
            Ok((add_quantity(available, quantity_change)?, reserved - quantity_change))
        }
        TransactionType::Sale => {
            if quantity_change <= 0 {
                return Err(ServiceError::ValidationError(
                    "sale quantity must be positive".to_string(),
                ));
            }
            if reserved < quantity_change {
                return Err(ServiceError::InsufficientStock(format!(
                    "reserved {} cannot cover sale of {}",
                    reserved, quantity_change
                )));
            }
            Ok((available, reserved - quantity_change))
        }
        TransactionType::Adjustment => {
            let target = add_quantity(available, quantity_change)?;
            if target < 0 {
                return Err(ServiceError::ValidationError(format!(
                    "adjustment of {} would drive available below zero (currently {})",
                    quantity_change, available
                )));
            }
            Ok((target, reserved))
        }
    }
}

/// Service owning the stock store and its append-only transaction ledger.
/// Every mutation of a stock unit goes through `apply_transaction`, which
/// writes the unit row and exactly one ledger row in a single durable
/// transaction. The ledger is the source of truth; the unit row is the
/// replayable projection.
#[derive(Clone)]
pub struct StockLedgerService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl StockLedgerService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Looks up a unit by id.
    pub async fn get_unit(&self, unit_id: Uuid) -> Result<stock_unit::Model, ServiceError> {
        StockUnits::find_by_id(unit_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Stock unit {} not found", unit_id)))
    }

    pub async fn get_unit_by_sku(&self, sku: &str) -> Result<Option<stock_unit::Model>, ServiceError> {
        StockUnits::find()
            .filter(stock_unit::Column::Sku.eq(sku))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Returns the unit for `sku`, creating it lazily with zero quantities
    /// on first receipt or reservation. A lost race on the unique sku
    /// resolves by re-reading the winner's row.
    #[instrument(skip(self))]
    pub async fn find_or_create_unit(
        &self,
        sku: &str,
        actor: &str,
    ) -> Result<stock_unit::Model, ServiceError> {
        if let Some(unit) = self.get_unit_by_sku(sku).await? {
            return Ok(unit);
        }

        let now = Utc::now();
        let model = stock_unit::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(sku.to_string()),
            available_quantity: Set(0),
            reserved_quantity: Set(0),
            version: Set(0),
            last_updated_by: Set(actor.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match model.insert(&*self.db).await {
            Ok(unit) => {
                info!(unit_id = %unit.id, sku = %sku, "Created stock unit");
                Ok(unit)
            }
            Err(insert_err) => {
                // Unique violation means a concurrent creator won.
                match self.get_unit_by_sku(sku).await? {
                    Some(unit) => Ok(unit),
                    None => Err(ServiceError::db_error(insert_err)),
                }
            }
        }
    }

    /// Applies one quantity change atomically: reads the unit, computes the
    /// new quantities, conditionally updates the row against its version
    /// stamp, and appends the ledger row with before/after snapshots. A
    /// lost version race retries the whole read-compute-write; transient
    /// store failures are retried once before surfacing `Unavailable`.
    #[instrument(skip(self, cmd), fields(unit_id = %cmd.unit_id, transaction_type = %cmd.transaction_type))]
    pub async fn apply_transaction(
        &self,
        cmd: ApplyTransaction,
    ) -> Result<stock_unit::Model, ServiceError> {
        let applied =
            crate::db::retry_once("apply_transaction", || self.apply_with_retries(&cmd)).await?;

        self.emit_stock_event(&cmd, &applied).await;
        Ok(applied)
    }

    async fn apply_with_retries(
        &self,
        cmd: &ApplyTransaction,
    ) -> Result<stock_unit::Model, ServiceError> {
        for attempt in 0..MAX_VERSION_RETRIES {
            match self.apply_once(cmd).await {
                Ok(unit) => return Ok(unit),
                Err(ServiceError::ConcurrentModification(_)) => {
                    warn!(
                        unit_id = %cmd.unit_id,
                        attempt,
                        "Stock unit version race lost, retrying"
                    );
                }
                Err(other) => return Err(other),
            }
        }
        Err(ServiceError::ConcurrentModification(cmd.unit_id))
    }

    async fn apply_once(&self, cmd: &ApplyTransaction) -> Result<stock_unit::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let unit = StockUnits::find_by_id(cmd.unit_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Stock unit {} not found", cmd.unit_id))
            })?;

        let (new_available, new_reserved) = apply_effect(
            cmd.transaction_type,
            cmd.quantity_change,
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
                Expr::value(cmd.actor.clone()),
            )
            .col_expr(stock_unit::Column::UpdatedAt, Expr::value(now))
            .filter(stock_unit::Column::Id.eq(unit.id))
            .filter(stock_unit::Column::Version.eq(unit.version))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        if updated.rows_affected == 0 {
            // Another writer bumped the version between our read and write.
            txn.rollback().await.map_err(ServiceError::db_error)?;
            return Err(ServiceError::ConcurrentModification(unit.id));
        }

        let entry = stock_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            unit_id: Set(unit.id),
            transaction_type: Set(cmd.transaction_type.as_str().to_string()),
            quantity_change: Set(cmd.quantity_change),
            available_before: Set(unit.available_quantity),
            available_after: Set(new_available),
            reserved_before: Set(unit.reserved_quantity),
            reserved_after: Set(new_reserved),
            reason: Set(cmd.reason.clone()),
            reference_type: Set(cmd.reference.as_ref().map(|r| r.reference_type.clone())),
            reference_id: Set(cmd.reference.as_ref().map(|r| r.reference_id.clone())),
            created_by: Set(cmd.actor.clone()),
            occurred_at: Set(now),
        };
        entry.insert(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            unit_id = %unit.id,
            transaction_type = %cmd.transaction_type,
            quantity_change = cmd.quantity_change,
            available = new_available,
            reserved = new_reserved,
            "Applied stock transaction"
        );

        Ok(stock_unit::Model {
            available_quantity: new_available,
            reserved_quantity: new_reserved,
            version: unit.version + 1,
            last_updated_by: cmd.actor.clone(),
            updated_at: now,
            ..unit
        })
    }

    /// Paginated ledger history for a unit, newest first.
    #[instrument(skip(self))]
    pub async fn history(
        &self,
        unit_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<stock_transaction::Model>, u64), ServiceError> {
        let paginator = StockTransactions::find()
            .filter(stock_transaction::Column::UnitId.eq(unit_id))
            .order_by_desc(stock_transaction::Column::OccurredAt)
            .order_by_desc(stock_transaction::Column::Id)
            .paginate(&*self.db, limit.max(1));

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let items = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((items, total))
    }

    /// Folds the unit's full ledger, oldest first, back into quantities.
    /// The result must match the live row exactly; a divergence means the
    /// projection was written outside a recorded transaction.
    #[instrument(skip(self))]
    pub async fn replay(&self, unit_id: Uuid) -> Result<(i32, i32), ServiceError> {
        let rows = StockTransactions::find()
            .filter(stock_transaction::Column::UnitId.eq(unit_id))
            .order_by_asc(stock_transaction::Column::OccurredAt)
            .order_by_asc(stock_transaction::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut available = 0i32;
        let mut reserved = 0i32;
        for row in rows {
            let kind = TransactionType::parse(&row.transaction_type).ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "unknown transaction type '{}' in ledger row {}",
                    row.transaction_type, row.id
                ))
            })?;
            let (a, r) = apply_effect(kind, row.quantity_change, available, reserved)?;
            available = a;
            reserved = r;
        }
        Ok((available, reserved))
    }

    /// Re-derives the projection from the ledger and compares it to the
    /// live row.
    pub async fn verify_unit(&self, unit_id: Uuid) -> Result<bool, ServiceError> {
        let unit = self.get_unit(unit_id).await?;
        let (available, reserved) = self.replay(unit_id).await?;
        Ok(unit.available_quantity == available && unit.reserved_quantity == reserved)
    }

    async fn emit_stock_event(&self, cmd: &ApplyTransaction, unit: &stock_unit::Model) {
        let event = match cmd.transaction_type {
            TransactionType::Reservation => Event::StockReserved {
                unit_id: unit.id,
                quantity: cmd.quantity_change,
            },
            TransactionType::Release => Event::StockReleased {
                unit_id: unit.id,
                quantity: cmd.quantity_change,
            },
            TransactionType::Sale => Event::StockSold {
                unit_id: unit.id,
                quantity: cmd.quantity_change,
            },
            TransactionType::StockIn | TransactionType::Adjustment => Event::StockAdjusted {
                unit_id: unit.id,
                quantity_change: cmd.quantity_change,
                available_after: unit.available_quantity,
                reason: cmd.reason.clone(),
            },
        };
        if let Err(e) = self.event_sender.send(event).await {
            warn!(error = %e, "Failed to send stock event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservation_respects_available_floor() {
        assert!(matches!(
            apply_effect(TransactionType::Reservation, 6, 5, 0),
            Err(ServiceError::InsufficientStock(_))
        ));
        assert_eq!(
            apply_effect(TransactionType::Reservation, 3, 5, 0).unwrap(),
            (2, 3)
        );
    }

    #[test]
    fn sale_respects_reserved_floor() {
        assert!(matches!(
            apply_effect(TransactionType::Sale, 1, 3, 0),
            Err(ServiceError::InsufficientStock(_))
        ));
        assert_eq!(apply_effect(TransactionType::Sale, 2, 3, 2).unwrap(), (3, 0));
    }

    #[test]
    fn adjustment_accepts_zero_and_signed_deltas() {
        assert_eq!(
            apply_effect(TransactionType::Adjustment, 0, 7, 1).unwrap(),
            (7, 1)
        );
        assert_eq!(
            apply_effect(TransactionType::Adjustment, -3, 7, 1).unwrap(),
            (4, 1)
        );
        assert!(apply_effect(TransactionType::Adjustment, -8, 7, 1).is_err());
    }

    #[test]
    fn overflowing_additions_are_rejected() {
        assert!(matches!(
            apply_effect(TransactionType::StockIn, i32::MAX, 1, 0),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            apply_effect(TransactionType::Adjustment, i32::MAX, 1, 0),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            apply_effect(TransactionType::Release, i32::MAX, 1, i32::MAX),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn reserve_release_sell_walkthrough() {
        // (5,0) reserve 3 -> (2,3); release 1 -> (3,2); sell 2 -> (3,0);
        // selling one more must fail on the reserved floor.
        let (a, r) = apply_effect(TransactionType::Reservation, 3, 5, 0).unwrap();
        assert_eq!((a, r), (2, 3));
        let (a, r) = apply_effect(TransactionType::Release, 1, a, r).unwrap();
        assert_eq!((a, r), (3, 2));
        let (a, r) = apply_effect(TransactionType::Sale, 2, a, r).unwrap();
        assert_eq!((a, r), (3, 0));
        assert!(matches!(
            apply_effect(TransactionType::Sale, 1, a, r),
            Err(ServiceError::InsufficientStock(_))
        ));
    }

    #[test]
    fn non_adjustment_types_reject_non_positive_quantities() {
        for t in [
            TransactionType::StockIn,
            TransactionType::Reservation,
            TransactionType::Release,
            TransactionType::Sale,
        ] {
            assert!(apply_effect(t, 0, 10, 10).is_err());
            assert!(apply_effect(t, -1, 10, 10).is_err());
        }
    }
}
