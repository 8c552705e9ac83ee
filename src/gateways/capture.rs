use super::{
    CheckoutHandoff, GatewayKind, GatewayOrderRequest, GatewayOutcome, GatewayResult,
    PaymentGateway,
};
use crate::{config::CaptureGatewayConfig, errors::ServiceError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration as StdDuration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Refresh the cached token this long before the gateway expires it.
const TOKEN_EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Utc::now() + Duration::seconds(TOKEN_EXPIRY_SKEW_SECS) < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct RemoteOrderResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CaptureResponse {
    id: String,
    status: String,
    #[serde(default)]
    capture_id: Option<String>,
}

/// REST/OAuth capture-flow adapter. Authenticates with client
/// credentials (token cached until near expiry), creates a remote order,
/// and captures it later: capture is the settlement point, authorization
/// alone is not.
pub struct CaptureGateway {
    http: reqwest::Client,
    config: CaptureGatewayConfig,
    token: RwLock<Option<CachedToken>>,
}

impl CaptureGateway {
    pub fn new(config: CaptureGatewayConfig, timeout: StdDuration) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client build failed: {}", e)))?;
        Ok(Self {
            http,
            config,
            token: RwLock::new(None),
        })
    }

    /// Returns a bearer token, exchanging client credentials only when the
    /// cached one is missing or close to expiry.
    async fn access_token(&self) -> Result<String, ServiceError> {
        if let Some(cached) = self.token.read().await.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.access_token.clone());
            }
        }

        let mut guard = self.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = guard.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.access_token.clone());
            }
        }

        debug!("Exchanging client credentials for gateway token");
        let response = self
            .http
            .post(format!("{}/oauth2/token", self.config.base_url))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| ServiceError::GatewayAuthFailure(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, "Gateway token exchange rejected");
            return Err(ServiceError::GatewayAuthFailure(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayAuthFailure(format!("malformed token response: {}", e)))?;

        let cached = CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        };
        *guard = Some(cached);
        Ok(token.access_token)
    }

    /// Captures a previously created remote order. The gateway may retry
    /// a capture notification; the reconciliation layer absorbs that.
    #[instrument(skip(self))]
    pub async fn capture(&self, gateway_order_id: &str) -> Result<GatewayResult, ServiceError> {
        let token = self.access_token().await?;

        let response = self
            .http
            .post(format!(
                "{}/checkout/orders/{}/capture",
                self.config.base_url, gateway_order_id
            ))
            .bearer_auth(&token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(transport_failure)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, gateway_order_id, body = %body, "Gateway capture rejected");
            return Err(ServiceError::GatewayRequestFailure { status, body });
        }

        let captured: CaptureResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayRequestFailure {
                status: 200,
                body: format!("malformed capture response: {}", e),
            })?;

        if captured.status != "COMPLETED" {
            info!(gateway_order_id, status = %captured.status, "Capture did not settle");
            return Ok(GatewayResult {
                outcome: GatewayOutcome::Failed,
                gateway_order_id: Some(captured.id),
                transaction_id: captured.capture_id,
                paid_at: None,
                amount: None,
                metadata: Some(json!({ "gateway_status": captured.status })),
            });
        }

        info!(gateway_order_id, "Gateway capture settled");
        Ok(GatewayResult {
            outcome: GatewayOutcome::Settled,
            gateway_order_id: Some(captured.id.clone()),
            transaction_id: captured.capture_id.or(Some(captured.id)),
            paid_at: Some(Utc::now()),
            amount: None,
            metadata: None,
        })
    }
}

#[async_trait]
impl PaymentGateway for CaptureGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Capture
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn begin_checkout(
        &self,
        request: &GatewayOrderRequest,
    ) -> Result<CheckoutHandoff, ServiceError> {
        let token = self.access_token().await?;

        let body = json!({
            "reference_id": request.order_id,
            "amount": {
                "value": request.amount.to_string(),
                "currency_code": request.currency,
            },
            "items": request.line_items.iter().map(|item| json!({
                "name": item.name,
                "quantity": item.quantity,
                "unit_amount": item.unit_amount.to_string(),
            })).collect::<Vec<_>>(),
            "return_url": request.return_url,
            "cancel_url": request.cancel_url,
        });

        let response = self
            .http
            .post(format!("{}/checkout/orders", self.config.base_url))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(transport_failure)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, order_id = %request.order_id, body = %body, "Gateway order creation rejected");
            return Err(ServiceError::GatewayRequestFailure { status, body });
        }

        let remote: RemoteOrderResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayRequestFailure {
                status: 200,
                body: format!("malformed order response: {}", e),
            })?;

        info!(order_id = %request.order_id, gateway_order_id = %remote.id, "Created gateway order");
        Ok(CheckoutHandoff {
            gateway_order_id: remote.id,
            redirect_url: None,
        })
    }
}

/// Transport-level failures (timeouts, refused connections) carry no HTTP
/// status; 0 marks them apart from real gateway responses. A timed-out
/// capture is a failed outcome upstream, never left pending.
fn transport_failure(err: reqwest::Error) -> ServiceError {
    ServiceError::GatewayRequestFailure {
        status: err.status().map(|s| s.as_u16()).unwrap_or(0),
        body: err.to_string(),
    }
}
