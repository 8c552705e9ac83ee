pub mod capture;
pub mod redirect;

use crate::errors::ServiceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use capture::CaptureGateway;
pub use redirect::RedirectGateway;

/// Which adapter owns a checkout. Persisted on the invoice so duplicate
/// notifications route to the same protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    Capture,
    Redirect,
}

impl GatewayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayKind::Capture => "capture",
            GatewayKind::Redirect => "redirect",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "capture" => Some(GatewayKind::Capture),
            "redirect" => Some(GatewayKind::Redirect),
            _ => None,
        }
    }
}

impl std::fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a settlement attempt ended, independent of protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayOutcome {
    /// Funds actually captured; the only outcome that may mark Paid
    Settled,
    Failed,
    Cancelled,
}

/// The single normalized shape both adapters produce. The reconciliation
/// service consumes this and nothing else, so it never branches on
/// gateway identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResult {
    pub outcome: GatewayOutcome,
    pub gateway_order_id: Option<String>,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Major units, already descaled where the protocol requires it
    pub amount: Option<Decimal>,
    pub metadata: Option<serde_json::Value>,
}

impl GatewayResult {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            outcome: GatewayOutcome::Failed,
            gateway_order_id: None,
            transaction_id: None,
            paid_at: None,
            amount: None,
            metadata: Some(serde_json::json!({ "reason": reason.into() })),
        }
    }
}

/// One line of the remote order expressed to the capture gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayLineItem {
    pub name: String,
    pub quantity: i32,
    pub unit_amount: Decimal,
}

/// Everything a gateway needs to start a checkout.
#[derive(Debug, Clone)]
pub struct GatewayOrderRequest {
    pub order_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub line_items: Vec<GatewayLineItem>,
    pub return_url: String,
    pub cancel_url: String,
}

/// Where to send the customer after a checkout begins.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutHandoff {
    pub gateway_order_id: String,
    /// Present for redirect-style gateways
    pub redirect_url: Option<String>,
}

/// The one capability both protocols share: begin a checkout and hand
/// back where the customer goes next. Settlement arrives through
/// protocol-specific paths (`capture` / `handle_return`) that normalize
/// into `GatewayResult`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    async fn begin_checkout(
        &self,
        request: &GatewayOrderRequest,
    ) -> Result<CheckoutHandoff, ServiceError>;
}
