use crate::errors::ServiceError;
use crate::gateways::{
    CaptureGateway, GatewayKind, GatewayLineItem, GatewayOrderRequest, PaymentGateway,
    RedirectGateway,
};
use crate::services::InvoiceService;
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

// State the payment routes need; the app state implements this.
pub trait PaymentHandlerState: Clone + Send + Sync + 'static {
    fn invoices(&self) -> &InvoiceService;
    fn capture_gateway(&self) -> &Arc<CaptureGateway>;
    fn redirect_gateway(&self) -> &Arc<RedirectGateway>;
}

#[derive(Debug, Deserialize, Validate)]
pub struct LineItemRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub quantity: i32,
    pub unit_amount: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentOrderRequest {
    pub order_id: Uuid,
    pub amount: Decimal,
    #[validate(length(equal = 3))]
    pub currency: String,
    /// "capture" | "redirect"
    pub gateway: String,
    #[validate]
    pub line_items: Vec<LineItemRequest>,
    #[validate(url)]
    pub return_url: String,
    #[validate(url)]
    pub cancel_url: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefundRequest {
    pub amount: Decimal,
    #[validate(length(min = 1, max = 200))]
    pub refund_transaction_id: String,
}

pub fn payments_router<S>() -> Router<S>
where
    S: PaymentHandlerState,
{
    Router::new()
        .route("/orders", post(create_payment_order::<S>))
        .route("/return", get(gateway_return::<S>))
        .route("/:order_id", get(get_payment::<S>))
        .route("/:order_id/capture", post(capture_payment::<S>))
        .route("/:order_id/cancel", post(cancel_payment::<S>))
        .route("/:order_id/refund", post(refund_payment::<S>))
}

/// Opens a checkout: creates the draft invoice, then hands the customer
/// off to the selected gateway.
pub async fn create_payment_order<S>(
    State(state): State<S>,
    Json(payload): Json<CreatePaymentOrderRequest>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: PaymentHandlerState,
{
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let gateway_kind = GatewayKind::parse(&payload.gateway).ok_or_else(|| {
        ServiceError::ValidationError(format!("unknown gateway '{}'", payload.gateway))
    })?;

    let invoice = state
        .invoices()
        .create_invoice(
            payload.order_id,
            payload.amount,
            &payload.currency,
            gateway_kind,
        )
        .await?;

    let request = GatewayOrderRequest {
        order_id: payload.order_id,
        amount: payload.amount,
        currency: payload.currency.to_uppercase(),
        line_items: payload
            .line_items
            .into_iter()
            .map(|li| GatewayLineItem {
                name: li.name,
                quantity: li.quantity,
                unit_amount: li.unit_amount,
            })
            .collect(),
        return_url: payload.return_url,
        cancel_url: payload.cancel_url,
    };

    let handoff = match gateway_kind {
        GatewayKind::Capture => state.capture_gateway().begin_checkout(&request).await?,
        GatewayKind::Redirect => state.redirect_gateway().begin_checkout(&request).await?,
    };
    state
        .invoices()
        .attach_gateway_order(invoice.id, &handoff.gateway_order_id)
        .await?;

    info!(order_id = %payload.order_id, invoice_id = %invoice.id, gateway = %gateway_kind, "Checkout opened");
    Ok((StatusCode::CREATED, Json(json!({
        "success": true,
        "data": {
            "invoice": invoice,
            "gateway_order_id": handoff.gateway_order_id,
            "redirect_url": handoff.redirect_url
        }
    }))))
}

/// The redirect gateway's browser return. Query parameters are
/// signature-verified before any field is trusted, then reconciled.
pub async fn gateway_return<S>(
    State(state): State<S>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: PaymentHandlerState,
{
    let result = state.redirect_gateway().handle_return(&params)?;

    // order_id is part of the signed payload, trusted once verified
    let order_id = params
        .get("order_id")
        .ok_or_else(|| ServiceError::ValidationError("missing order_id parameter".to_string()))?
        .parse::<Uuid>()
        .map_err(|_| ServiceError::ValidationError("malformed order_id parameter".to_string()))?;

    let status = state.invoices().reconcile(order_id, &result).await?;
    Ok((StatusCode::OK, Json(json!({
        "success": true,
        "data": { "order_id": order_id, "status": status }
    }))))
}

/// Settles a capture-gateway order after the customer approves it. The
/// capture call is the settlement point; its outcome drives the invoice.
pub async fn capture_payment<S>(
    State(state): State<S>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: PaymentHandlerState,
{
    let invoice = state.invoices().get_by_order(order_id).await?;
    let gateway_order_id = invoice.gateway_order_id.clone().ok_or_else(|| {
        ServiceError::ValidationError(format!(
            "invoice for order {} has no gateway order to capture",
            order_id
        ))
    })?;

    let result = state.capture_gateway().capture(&gateway_order_id).await?;
    let status = state.invoices().reconcile(order_id, &result).await?;
    Ok((StatusCode::OK, Json(json!({
        "success": true,
        "data": { "order_id": order_id, "status": status }
    }))))
}

pub async fn get_payment<S>(
    State(state): State<S>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: PaymentHandlerState,
{
    let invoice = state.invoices().get_by_order(order_id).await?;
    Ok((StatusCode::OK, Json(json!({
        "success": true,
        "data": invoice
    }))))
}

/// Customer- or operator-driven cancellation of an unpaid checkout.
pub async fn cancel_payment<S>(
    State(state): State<S>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: PaymentHandlerState,
{
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let status = state.invoices().cancel(order_id, &payload.reason).await?;
    Ok((StatusCode::OK, Json(json!({
        "success": true,
        "data": { "order_id": order_id, "status": status }
    }))))
}

/// Administrative refund of a paid invoice.
pub async fn refund_payment<S>(
    State(state): State<S>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<RefundRequest>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: PaymentHandlerState,
{
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let status = state
        .invoices()
        .refund(order_id, payload.amount, &payload.refund_transaction_id)
        .await?;
    Ok((StatusCode::OK, Json(json!({
        "success": true,
        "data": { "order_id": order_id, "status": status }
    }))))
}
