use crate::entities::stock_transaction::TransactionType;
use crate::errors::ServiceError;
use crate::services::stock_entries::CreateStockEntry;
use crate::services::stock_ledger::{ApplyTransaction, Reference};
use crate::services::{StockAuditService, StockEntryService, StockLedgerService};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

// State the stock routes need; the app state implements this.
pub trait StockHandlerState: Clone + Send + Sync + 'static {
    fn stock_ledger(&self) -> &StockLedgerService;
    fn stock_entries(&self) -> &StockEntryService;
    fn stock_audit(&self) -> &StockAuditService;
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyTransactionRequest {
    pub unit_id: Uuid,
    /// "stock_in" | "reservation" | "release" | "sale" | "adjustment"
    pub transaction_type: String,
    pub quantity_change: i32,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub actor: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateStockEntryRequest {
    #[validate(length(min = 1, max = 100))]
    pub sku: String,
    pub supplier_id: Option<Uuid>,
    pub quantity_received: i32,
    pub unit_cost: Option<Decimal>,
    pub batch_number: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub received_by: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProcessEntryRequest {
    #[validate(length(min = 1, max = 100))]
    pub processed_by: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AuditRequest {
    pub actual_quantity: i32,
    #[validate(length(min = 1, max = 100))]
    pub audited_by: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PendingParams {
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct VerificationResponse {
    pub unit_id: Uuid,
    pub consistent: bool,
    pub replayed_available: i32,
    pub replayed_reserved: i32,
}

pub fn stock_router<S>() -> Router<S>
where
    S: StockHandlerState,
{
    Router::new()
        .route("/transactions", post(apply_transaction::<S>))
        .route(
            "/entries",
            get(list_pending_entries::<S>).post(create_entry::<S>),
        )
        .route("/entries/:id/process", post(process_entry::<S>))
        .route("/units/:id", get(get_unit::<S>))
        .route("/units/:id/history", get(unit_history::<S>))
        .route("/units/:id/verify", get(verify_unit::<S>))
        .route("/units/:id/audit", post(audit_unit::<S>))
}

/// Append one transaction to a unit's ledger.
pub async fn apply_transaction<S>(
    State(state): State<S>,
    Json(payload): Json<ApplyTransactionRequest>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: StockHandlerState,
{
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let transaction_type = TransactionType::parse(&payload.transaction_type).ok_or_else(|| {
        ServiceError::ValidationError(format!(
            "unknown transaction type '{}'",
            payload.transaction_type
        ))
    })?;
    let reference = match (payload.reference_type, payload.reference_id) {
        (Some(reference_type), Some(reference_id)) => Some(Reference {
            reference_type,
            reference_id,
        }),
        (None, None) => None,
        _ => {
            return Err(ServiceError::ValidationError(
                "reference_type and reference_id must be provided together".to_string(),
            ))
        }
    };

    let unit = state
        .stock_ledger()
        .apply_transaction(ApplyTransaction {
            unit_id: payload.unit_id,
            transaction_type,
            quantity_change: payload.quantity_change,
            reason: payload.reason,
            reference,
            actor: payload.actor,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(json!({
        "success": true,
        "data": unit
    }))))
}

/// Record a supplier receipt for later processing.
pub async fn create_entry<S>(
    State(state): State<S>,
    Json(payload): Json<CreateStockEntryRequest>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: StockHandlerState,
{
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let entry = state
        .stock_entries()
        .create_entry(CreateStockEntry {
            sku: payload.sku,
            supplier_id: payload.supplier_id,
            quantity_received: payload.quantity_received,
            unit_cost: payload.unit_cost,
            batch_number: payload.batch_number,
            received_by: payload.received_by,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(json!({
        "success": true,
        "data": entry
    }))))
}

/// Convert a pending receipt into stock. A repeat call reports the entry
/// as already processed without moving stock again.
pub async fn process_entry<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProcessEntryRequest>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: StockHandlerState,
{
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    match state.stock_entries().process(id, &payload.processed_by).await {
        Ok(()) => Ok((StatusCode::OK, Json(json!({
            "success": true,
            "data": { "entry_id": id, "processed": true }
        })))),
        Err(ServiceError::AlreadyProcessed(_)) => Ok((StatusCode::OK, Json(json!({
            "success": true,
            "data": { "entry_id": id, "processed": true, "already_processed": true }
        })))),
        Err(e) => Err(e),
    }
}

pub async fn list_pending_entries<S>(
    State(state): State<S>,
    Query(params): Query<PendingParams>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: StockHandlerState,
{
    let entries = state
        .stock_entries()
        .list_pending(params.limit.unwrap_or(50).min(200))
        .await?;
    Ok((StatusCode::OK, Json(json!({
        "success": true,
        "data": { "entries": entries }
    }))))
}

pub async fn get_unit<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: StockHandlerState,
{
    let unit = state.stock_ledger().get_unit(id).await?;
    Ok((StatusCode::OK, Json(json!({
        "success": true,
        "data": unit
    }))))
}

/// Paginated ledger history for one unit, newest first.
pub async fn unit_history<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: StockHandlerState,
{
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(50).min(200);
    let (transactions, total) = state.stock_ledger().history(id, page, limit).await?;
    Ok((StatusCode::OK, Json(json!({
        "success": true,
        "data": {
            "transactions": transactions,
            "total": total,
            "page": page,
            "limit": limit
        }
    }))))
}

/// Replays the unit's ledger and compares it to the live quantities.
pub async fn verify_unit<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: StockHandlerState,
{
    let unit = state.stock_ledger().get_unit(id).await?;
    let (available, reserved) = state.stock_ledger().replay(id).await?;
    let consistent =
        unit.available_quantity == available && unit.reserved_quantity == reserved;
    Ok((StatusCode::OK, Json(json!({
        "success": true,
        "data": VerificationResponse {
            unit_id: id,
            consistent,
            replayed_available: available,
            replayed_reserved: reserved,
        }
    }))))
}

/// Record a physical count against the unit.
pub async fn audit_unit<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AuditRequest>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: StockHandlerState,
{
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let outcome = state
        .stock_audit()
        .audit(
            id,
            payload.actual_quantity,
            &payload.audited_by,
            payload.notes.as_deref(),
        )
        .await?;

    Ok((StatusCode::OK, Json(json!({
        "success": true,
        "data": outcome
    }))))
}
