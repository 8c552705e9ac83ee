use super::{
    CheckoutHandoff, GatewayKind, GatewayOrderRequest, GatewayOutcome, GatewayResult,
    PaymentGateway,
};
use crate::{config::RedirectGatewayConfig, errors::ServiceError};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sha2::Sha512;
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};
use url::form_urlencoded;

type HmacSha512 = Hmac<Sha512>;

/// Query parameter carrying the keyed hash; excluded from the canonical
/// string on both sides.
const SIGNATURE_PARAM: &str = "signature";

/// The protocol quotes amounts in minor units; divide by this before use.
const AMOUNT_SCALE: u32 = 2;

/// Redirect-flow adapter. The outbound URL's query parameters are
/// deterministically ordered and signed with HMAC-SHA512; on return the
/// same canonicalization is re-applied and the recomputed signature must
/// match byte-for-byte (hex compared case-insensitively) before any
/// field is trusted.
pub struct RedirectGateway {
    config: RedirectGatewayConfig,
}

impl RedirectGateway {
    pub fn new(config: RedirectGatewayConfig) -> Self {
        Self { config }
    }

    /// Canonical `key=value&...` over lexicographically ordered keys with
    /// percent-encoded values. Identical for signing and verification.
    fn canonical_string(params: &BTreeMap<String, String>) -> String {
        params
            .iter()
            .filter(|(key, _)| key.as_str() != SIGNATURE_PARAM)
            .map(|(key, value)| {
                let encoded: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();
                format!("{}={}", key, encoded)
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    fn sign(&self, canonical: &str) -> String {
        let mut mac = HmacSha512::new_from_slice(self.config.secret_key.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(canonical.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Builds the outbound checkout URL: ordered params plus signature.
    pub fn build_redirect_url(&self, request: &GatewayOrderRequest) -> (String, String) {
        let gateway_order_id = format!("R-{}", request.order_id.simple());
        let minor_units = (request.amount * Decimal::from(10i64.pow(AMOUNT_SCALE)))
            .round()
            .to_string();

        let mut params = BTreeMap::new();
        params.insert("merchant_id".to_string(), self.config.merchant_id.clone());
        params.insert("gateway_order_id".to_string(), gateway_order_id.clone());
        params.insert("order_id".to_string(), request.order_id.to_string());
        params.insert("amount".to_string(), minor_units);
        params.insert("currency".to_string(), request.currency.clone());
        params.insert("return_url".to_string(), request.return_url.clone());
        params.insert("cancel_url".to_string(), request.cancel_url.clone());

        let canonical = Self::canonical_string(&params);
        let signature = self.sign(&canonical);

        let url = format!(
            "{}?{}&{}={}",
            self.config.endpoint, canonical, SIGNATURE_PARAM, signature
        );
        (url, gateway_order_id)
    }

    /// Verifies and normalizes the parameters the gateway appended to the
    /// return redirect. The signature check is the sole authenticity
    /// gate: missing, malformed or mismatched input is rejected before
    /// any field is read.
    #[instrument(skip(self, params))]
    pub fn handle_return(
        &self,
        params: &BTreeMap<String, String>,
    ) -> Result<GatewayResult, ServiceError> {
        let provided = params.get(SIGNATURE_PARAM).ok_or_else(|| {
            warn!(?params, "Gateway return missing signature");
            ServiceError::SignatureMismatch("missing signature parameter".to_string())
        })?;

        let canonical = Self::canonical_string(params);
        let expected = self.sign(&canonical);
        if !constant_time_eq_ci(&expected, provided) {
            // Full parameter context for forensics; the key never appears.
            warn!(?params, "Gateway return signature mismatch");
            return Err(ServiceError::SignatureMismatch(
                "computed signature does not match".to_string(),
            ));
        }

        let status = params
            .get("status")
            .ok_or_else(|| ServiceError::ValidationError("missing status parameter".to_string()))?;
        let outcome = match status.as_str() {
            "success" => GatewayOutcome::Settled,
            "failed" => GatewayOutcome::Failed,
            "cancelled" => GatewayOutcome::Cancelled,
            other => {
                return Err(ServiceError::ValidationError(format!(
                    "unknown gateway status '{}'",
                    other
                )))
            }
        };

        // Minor units on the wire; scale down before comparison upstream.
        let amount = params
            .get("amount")
            .map(|raw| {
                raw.parse::<i64>().map_err(|_| {
                    ServiceError::ValidationError(format!("malformed amount '{}'", raw))
                })
            })
            .transpose()?
            .map(|minor| Decimal::new(minor, AMOUNT_SCALE));

        let result = GatewayResult {
            outcome,
            gateway_order_id: params.get("gateway_order_id").cloned(),
            transaction_id: params.get("transaction_id").cloned(),
            paid_at: matches!(outcome, GatewayOutcome::Settled).then(Utc::now),
            amount,
            metadata: None,
        };
        info!(outcome = ?result.outcome, transaction_id = ?result.transaction_id, "Verified gateway return");
        Ok(result)
    }
}

#[async_trait]
impl PaymentGateway for RedirectGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Redirect
    }

    async fn begin_checkout(
        &self,
        request: &GatewayOrderRequest,
    ) -> Result<CheckoutHandoff, ServiceError> {
        let (url, gateway_order_id) = self.build_redirect_url(request);
        Ok(CheckoutHandoff {
            gateway_order_id,
            redirect_url: Some(url),
        })
    }
}

/// Case-insensitive constant-time hex comparison.
fn constant_time_eq_ci(a: &str, b: &str) -> bool {
    let a = a.to_ascii_lowercase();
    let b = b.to_ascii_lowercase();
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedirectGatewayConfig;

    fn gateway() -> RedirectGateway {
        RedirectGateway::new(RedirectGatewayConfig {
            endpoint: "https://pay.example/checkout".to_string(),
            merchant_id: "M123".to_string(),
            secret_key: "test-secret".to_string(),
        })
    }

    fn known_params() -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("amount".to_string(), "100000".to_string());
        params.insert("currency".to_string(), "USD".to_string());
        params.insert("merchant_id".to_string(), "M123".to_string());
        params.insert("order_id".to_string(), "ORD-1".to_string());
        params.insert("status".to_string(), "success".to_string());
        params.insert("transaction_id".to_string(), "TXN-1".to_string());
        params
    }

    // HMAC-SHA512("test-secret",
    //   "amount=100000&currency=USD&merchant_id=M123&order_id=ORD-1&status=success&transaction_id=TXN-1")
    const KNOWN_SIGNATURE: &str = "80d1a2e6f9c1afbb6625df074c4b5a288851a906d811615c8b7d1ed4343f1f17a0e981b5cfebf0cfc2150dddd77c7447dc6a4099e3788cef7f32a51a5a0301bb";

    #[test]
    fn signature_matches_precomputed_reference() {
        let gw = gateway();
        let canonical = RedirectGateway::canonical_string(&known_params());
        assert_eq!(
            canonical,
            "amount=100000&currency=USD&merchant_id=M123&order_id=ORD-1&status=success&transaction_id=TXN-1"
        );
        assert_eq!(gw.sign(&canonical), KNOWN_SIGNATURE);
    }

    #[test]
    fn valid_return_is_normalized() {
        let gw = gateway();
        let mut params = known_params();
        let signature = gw.sign(&RedirectGateway::canonical_string(&params));
        params.insert(SIGNATURE_PARAM.to_string(), signature);

        let result = gw.handle_return(&params).unwrap();
        assert_eq!(result.outcome, GatewayOutcome::Settled);
        assert_eq!(result.transaction_id.as_deref(), Some("TXN-1"));
        // 100000 minor units -> 1000.00 major
        assert_eq!(result.amount, Some(Decimal::new(100000, 2)));
    }

    #[test]
    fn uppercase_signature_is_accepted() {
        let gw = gateway();
        let mut params = known_params();
        let signature = gw
            .sign(&RedirectGateway::canonical_string(&params))
            .to_ascii_uppercase();
        params.insert(SIGNATURE_PARAM.to_string(), signature);
        assert!(gw.handle_return(&params).is_ok());
    }

    #[test]
    fn flipping_any_parameter_character_fails_verification() {
        let gw = gateway();
        let baseline = known_params();
        let signature = gw.sign(&RedirectGateway::canonical_string(&baseline));

        for key in baseline.keys() {
            let mut params = baseline.clone();
            let mut value = params[key].clone();
            // Flip the first character to something else.
            let first = value.remove(0);
            let flipped = if first == 'z' { 'y' } else { 'z' };
            params.insert(key.clone(), format!("{}{}", flipped, value));
            params.insert(SIGNATURE_PARAM.to_string(), signature.clone());

            assert!(
                matches!(
                    gw.handle_return(&params),
                    Err(ServiceError::SignatureMismatch(_))
                ),
                "perturbing '{}' should break the signature",
                key
            );
        }
    }

    #[test]
    fn missing_signature_is_rejected() {
        let gw = gateway();
        assert!(matches!(
            gw.handle_return(&known_params()),
            Err(ServiceError::SignatureMismatch(_))
        ));
    }

    #[test]
    fn failed_status_normalizes_to_failed_outcome() {
        let gw = gateway();
        let mut params = known_params();
        params.insert("status".to_string(), "failed".to_string());
        let signature = gw.sign(&RedirectGateway::canonical_string(&params));
        params.insert(SIGNATURE_PARAM.to_string(), signature);

        let result = gw.handle_return(&params).unwrap();
        assert_eq!(result.outcome, GatewayOutcome::Failed);
        assert!(result.paid_at.is_none());
    }

    #[test]
    fn redirect_url_is_deterministic_and_signed() {
        let gw = gateway();
        let request = GatewayOrderRequest {
            order_id: uuid::Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap(),
            amount: Decimal::new(100000, 2),
            currency: "USD".to_string(),
            line_items: vec![],
            return_url: "https://shop.example/return".to_string(),
            cancel_url: "https://shop.example/cancel".to_string(),
        };
        let (url_a, id_a) = gw.build_redirect_url(&request);
        let (url_b, id_b) = gw.build_redirect_url(&request);
        assert_eq!(url_a, url_b);
        assert_eq!(id_a, id_b);
        assert!(url_a.contains("signature="));
        // 1000.00 major -> 100000 minor on the wire
        assert!(url_a.contains("amount=100000"));
    }
}
